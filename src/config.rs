//! Defines [`SiteConfig`], the immutable configuration for a single build, and
//! the logic for loading it from `<site_dir>/_config.yml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// The name of the configuration file inside the site directory.
pub const CONFIG_FILE_NAME: &str = "_config.yml";

/// Author details rendered in the banner at the top of each page.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub photo_url: Option<String>,

    /// Twitter handle without the leading `@`.
    #[serde(default)]
    pub twitter: Option<String>,

    /// GitHub user name.
    #[serde(default)]
    pub github: Option<String>,
}

#[derive(Deserialize)]
struct OutputDir(PathBuf);
impl Default for OutputDir {
    fn default() -> Self {
        OutputDir(PathBuf::from("_site"))
    }
}

#[derive(Deserialize)]
struct ThemeDir(PathBuf);
impl Default for ThemeDir {
    fn default() -> Self {
        ThemeDir(PathBuf::from("theme"))
    }
}

#[derive(Deserialize)]
struct CodeTheme(String);
impl Default for CodeTheme {
    fn default() -> Self {
        CodeTheme(String::from("zenburn.css"))
    }
}

#[derive(Deserialize)]
struct Bundles(Vec<String>);
impl Default for Bundles {
    fn default() -> Self {
        Bundles(
            ["vendor", "client", "components"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
        )
    }
}

/// The raw contents of `_config.yml`. Every field but `title` has a default.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    #[serde(default)]
    title: String,

    #[serde(default)]
    author: Author,

    #[serde(default)]
    output_dir: OutputDir,

    #[serde(default)]
    root_url: String,

    #[serde(default)]
    theme_dir: ThemeDir,

    #[serde(default)]
    code_theme: CodeTheme,

    #[serde(default)]
    bundles: Bundles,

    #[serde(default)]
    template: Option<PathBuf>,

    #[serde(default)]
    comments: Option<String>,
}

/// The configuration for one build. It is constructed once from the parsed
/// `_config.yml` plus defaults and never mutated afterwards. All paths are
/// resolved against the site directory.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    /// The site directory containing `_config.yml`, `_posts/`, etc.
    pub input_dir: PathBuf,

    /// The directory the site is rendered into.
    pub output_dir: PathBuf,

    /// The URL prefix under which the site is served, without a trailing
    /// slash (e.g., `""` or `/blog`).
    pub root_url: String,

    /// The directory searched for view overrides before the built-in views.
    pub components_dir: PathBuf,

    pub title: String,

    pub author: Author,

    /// The directory holding `theme.css`, `images/`, `highlight/` and
    /// `bundles/`.
    pub theme_dir: PathBuf,

    /// The file name of the syntax-highlighting stylesheet in
    /// `{theme_dir}/highlight/`.
    pub code_theme: String,

    /// The client bundle names; each is served as `{name}.bundle.js`.
    pub bundles: Vec<String>,

    /// An optional document template replacing the built-in one.
    pub template: Option<PathBuf>,

    /// The Disqus short name; when set, post pages carry a comment box.
    pub comments: Option<String>,
}

impl SiteConfig {
    /// Loads the configuration from `{dir}/_config.yml`. Fails with
    /// [`Error::NotFound`] if the file doesn't exist. `dir` is made absolute
    /// first, so every path in the config is absolute too.
    pub fn from_directory(dir: &Path) -> Result<SiteConfig> {
        if !dir.join(CONFIG_FILE_NAME).is_file() {
            return Err(Error::NotFound(dir.to_owned()));
        }
        let dir = dir.canonicalize().map_err(|err| Error::Open {
            path: dir.to_owned(),
            err,
        })?;
        let path = dir.join(CONFIG_FILE_NAME);
        let file = File::open(&path).map_err(|err| Error::Open {
            path: path.clone(),
            err,
        })?;
        let project: Project = serde_yaml::from_reader(file)?;
        Ok(SiteConfig::from_project(&dir, project))
    }

    /// Parses the configuration from YAML text as if it had been read from
    /// `{dir}/_config.yml`.
    pub fn parse(dir: &Path, yaml: &str) -> Result<SiteConfig> {
        Ok(SiteConfig::from_project(dir, serde_yaml::from_str(yaml)?))
    }

    fn from_project(dir: &Path, project: Project) -> SiteConfig {
        SiteConfig {
            input_dir: dir.to_owned(),
            output_dir: dir.join(project.output_dir.0),
            root_url: project.root_url.trim_end_matches('/').to_owned(),
            components_dir: dir.join("components"),
            title: project.title,
            author: project.author,
            theme_dir: dir.join(project.theme_dir.0),
            code_theme: project.code_theme.0,
            bundles: project.bundles.0,
            template: project.template.map(|path| dir.join(path)),
            comments: project.comments,
        }
    }

    /// The directory containing the post source files.
    pub fn posts_dir(&self) -> PathBuf {
        self.input_dir.join("_posts")
    }

    /// The directory containing site assets copied verbatim to
    /// `{output_dir}/assets`.
    pub fn assets_dir(&self) -> PathBuf {
        self.input_dir.join("assets")
    }

    /// Prefixes a site path (e.g., `/posts/hello`) with the root URL.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.root_url, path)
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem loading the site configuration.
#[derive(Debug)]
pub enum Error {
    /// Returned when the site directory has no `_config.yml`.
    NotFound(PathBuf),

    /// Returned when `_config.yml` exists but can't be opened.
    Open { path: PathBuf, err: std::io::Error },

    /// Returned when `_config.yml` isn't valid YAML or has the wrong shape.
    Deserialize(serde_yaml::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(dir) => write!(
                f,
                "No {} file found in {}",
                CONFIG_FILE_NAME,
                dir.display()
            ),
            Error::Open { path, err } => {
                write!(f, "Opening config file '{}': {}", path.display(), err)
            }
            Error::Deserialize(err) => write!(f, "Parsing config: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Open { path: _, err } => Some(err),
            Error::Deserialize(err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts [`serde_yaml::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: serde_yaml::Error) -> Error {
        Error::Deserialize(err)
    }
}
