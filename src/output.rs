//! Keeps the output directory in sync with a build: [`Output::prepare`]
//! clears out the previous build, [`Output::write_page`] writes rendered
//! routes and [`Output::copy_static`] copies the theme, client bundles and
//! site assets.

use crate::config::SiteConfig;
use crate::route::Route;
use log::{debug, error, warn};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The file each route is written to, relative to the route's directory.
pub const PAGE_FILE_NAME: &str = "index.html";

/// The file the build snapshot is written to, relative to the output root.
pub const DATA_FILE_NAME: &str = "data.json";

const REMOVE_ATTEMPTS: usize = 3;

/// One item of the static manifest: a file or directory copied from `src` to
/// `dest` (relative to the output root).
#[derive(Clone, Debug, PartialEq)]
pub struct CopyItem {
    pub src: PathBuf,
    pub dest: PathBuf,

    /// Optional items are skipped without complaint when `src` doesn't exist.
    pub optional: bool,
}

/// Returns the static items every build copies: one bundle per configured
/// client bundle, the theme stylesheet and images, the syntax-highlighting
/// stylesheet, and the site's own `assets` directory.
pub fn manifest(config: &SiteConfig) -> Vec<CopyItem> {
    let required = |src: PathBuf, dest: PathBuf| CopyItem {
        src,
        dest,
        optional: false,
    };
    let theme = &config.theme_dir;
    let theme_output = Path::new("theme");

    let mut items: Vec<CopyItem> = config
        .bundles
        .iter()
        .map(|name| {
            let file_name = format!("{}.bundle.js", name);
            required(theme.join("bundles").join(&file_name), PathBuf::from(file_name))
        })
        .collect();
    items.push(required(theme.join("theme.css"), theme_output.join("theme.css")));
    items.push(required(theme.join("images"), theme_output.join("images")));
    items.push(required(
        theme.join("highlight").join(&config.code_theme),
        theme_output.join(&config.code_theme),
    ));
    items.push(CopyItem {
        src: config.assets_dir(),
        dest: PathBuf::from("assets"),
        optional: true,
    });
    items
}

/// The output directory of a build.
pub struct Output {
    root: PathBuf,
    protected: Vec<PathBuf>,
}

impl Output {
    pub fn new<P: Into<PathBuf>>(root: P) -> Output {
        Output {
            root: root.into(),
            protected: Vec::new(),
        }
    }

    /// Marks `path` as off limits: [`Output::prepare`] refuses to clean an
    /// output directory that is, or contains, a protected path.
    pub fn protect<P: Into<PathBuf>>(mut self, path: P) -> Output {
        self.protected.push(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Ensures the output directory exists and removes every entry directly
    /// under it whose name doesn't start with `.`. Hidden entries are left
    /// alone (and not descended into); symlinks are removed, not followed.
    /// This must complete before any page is written.
    pub fn prepare(&self) -> Result<()> {
        self.check_protected()?;
        fs::create_dir_all(&self.root).map_err(|err| Error::Clean {
            path: self.root.clone(),
            err,
        })?;
        let entries = fs::read_dir(&self.root).map_err(|err| Error::Clean {
            path: self.root.clone(),
            err,
        })?;

        for result in entries {
            let entry = result.map_err(|err| Error::Clean {
                path: self.root.clone(),
                err,
            })?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                debug!("Keeping hidden entry {}", entry.path().display());
                continue;
            }
            let path = entry.path();
            let is_dir = entry
                .file_type()
                .map_err(|err| Error::Clean {
                    path: path.clone(),
                    err,
                })?
                .is_dir();
            remove(&path, is_dir)?;
        }
        Ok(())
    }

    fn check_protected(&self) -> Result<()> {
        let clean_error = |err: io::Error| Error::Clean {
            path: self.root.clone(),
            err,
        };
        let root = resolve(&self.root).map_err(clean_error)?;
        for protected in &self.protected {
            if resolve(protected).map_err(clean_error)?.starts_with(&root) {
                return Err(Error::Overlap {
                    root: self.root.clone(),
                    protected: protected.clone(),
                });
            }
        }
        Ok(())
    }

    /// The path of the file a route is written to:
    /// `{root}{route}/index.html`.
    pub fn page_path(&self, route: &Route) -> PathBuf {
        self.root
            .join(route.as_str().trim_start_matches('/'))
            .join(PAGE_FILE_NAME)
    }

    /// Writes a rendered route, creating parent directories as needed and
    /// replacing any existing file. The page is written to a sibling file and
    /// renamed into place, so a reader never sees a partially written page.
    pub fn write_page(&self, route: &Route, html: &str) -> Result<PathBuf> {
        let path = self.page_path(route);
        write_atomic(&path, html.as_bytes())?;
        Ok(path)
    }

    /// Writes `data` as pretty-printed JSON to `{root}/data.json`.
    pub fn write_data<T: Serialize>(&self, data: &T) -> Result<PathBuf> {
        let path = self.root.join(DATA_FILE_NAME);
        let json = serde_json::to_vec_pretty(data).map_err(|err| Error::Write {
            path: path.clone(),
            err: err.into(),
        })?;
        write_atomic(&path, &json)?;
        Ok(path)
    }

    /// Copies every manifest item into the output directory. The copies run
    /// concurrently and independently: a failed item is logged and returned
    /// but doesn't stop the others. Returns once every copy has finished.
    pub fn copy_static(&self, items: &[CopyItem]) -> Vec<Error> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = items
                .iter()
                .map(|item| scope.spawn(move || self.copy_item(item)))
                .collect();
            handles
                .into_iter()
                .zip(items)
                .filter_map(|(handle, item)| match handle.join() {
                    Ok(result) => result.err(),
                    Err(_) => Some(Error::Copy {
                        src: item.src.clone(),
                        dest: self.root.join(&item.dest),
                        err: io::Error::new(io::ErrorKind::Other, "copy thread panicked"),
                    }),
                })
                .inspect(|err| error!("{}", err))
                .collect()
        })
    }

    fn copy_item(&self, item: &CopyItem) -> Result<()> {
        let dest = self.root.join(&item.dest);
        let copy_error = |err: io::Error| Error::Copy {
            src: item.src.clone(),
            dest: dest.clone(),
            err,
        };

        let metadata = match fs::metadata(&item.src) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound && item.optional => {
                debug!("Skipping missing {}", item.src.display());
                return Ok(());
            }
            Err(err) => return Err(copy_error(err)),
        };

        if metadata.is_dir() {
            copy_dir(&item.src, &dest).map_err(copy_error)
        } else {
            copy_file(&item.src, &dest).map_err(copy_error)
        }
    }
}

/// Makes `path` absolute with symlinks resolved. Only the longest existing
/// prefix is canonicalized; the rest is normalized lexically.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let mut existing = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut rest = Vec::new();
    while fs::symlink_metadata(&existing).is_err() {
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                rest.push(name.to_owned());
                existing = parent.to_owned();
            }
            // `..` or `/`, neither of which can be missing
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for component in rest.iter().rev() {
        match component.to_str() {
            Some("..") => {
                resolved.pop();
            }
            Some(".") => {}
            _ => resolved.push(component),
        }
    }
    Ok(resolved)
}

fn remove(path: &Path, is_dir: bool) -> Result<()> {
    let mut attempt = 1;
    loop {
        let result = match is_dir {
            true => fs::remove_dir_all(path),
            false => fs::remove_file(path),
        };
        match result {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) if attempt < REMOVE_ATTEMPTS => {
                warn!("Removing {} (attempt {}): {}", path.display(), attempt, err);
                attempt += 1;
            }
            Err(err) => {
                return Err(Error::Clean {
                    path: path.to_owned(),
                    err,
                })
            }
        }
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let write_error = |err: io::Error| Error::Write {
        path: path.to_owned(),
        err,
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_error)?;
    }
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    fs::write(&partial, contents).map_err(write_error)?;
    fs::rename(&partial, path).map_err(write_error)
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::copy(src, dest).map(|_| ())
}

fn copy_dir(src: &Path, dest: &Path) -> io::Result<()> {
    for result in WalkDir::new(src) {
        let entry = result?;
        // strip_prefix() can't fail; every entry is below `src`
        let relative = entry.path().strip_prefix(src).unwrap_or_else(|_| entry.path());
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to synchronize the output directory.
#[derive(Debug)]
pub enum Error {
    /// Returned when the output directory can't be created or cleaned.
    Clean { path: PathBuf, err: io::Error },

    /// Returned when the output directory is, or contains, a protected path
    /// such as the site directory.
    Overlap { root: PathBuf, protected: PathBuf },

    /// Returned when a page or the data file can't be written.
    Write { path: PathBuf, err: io::Error },

    /// Returned when a static item can't be copied.
    Copy {
        src: PathBuf,
        dest: PathBuf,
        err: io::Error,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Overlap { root, protected } => write!(
                f,
                "Refusing to clean output directory '{}': it contains '{}'",
                root.display(),
                protected.display()
            ),
            Error::Write { path, err } => {
                write!(f, "Writing '{}': {}", path.display(), err)
            }
            Error::Copy { src, dest, err } => write!(
                f,
                "Failed to copy {} to {}: {}",
                src.display(),
                dest.display(),
                err
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Clean { path: _, err } => Some(err),
            Error::Overlap { .. } => None,
            Error::Write { path: _, err } => Some(err),
            Error::Copy { err, .. } => Some(err),
        }
    }
}
