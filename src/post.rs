//! Defines the [`PostRecord`] type and the logic for parsing posts from the
//! file system into memory.

use crate::markdown;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::read_dir;
use std::path::{Path, PathBuf};

const MARKDOWN_EXTENSION: &str = "md";

/// Everything about a post except its body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Metadata {
    /// The post's identifier in URLs (`/posts/{slug}`). Unique per build.
    pub slug: String,

    /// The post date, formatted `YYYY-MM-DD` (optionally followed by a time)
    /// so that the lexicographical and chronological orders agree.
    pub date: String,

    pub title: String,

    /// Slugified tag names, without duplicates, in front matter order.
    pub tags: Vec<String>,
}

/// A parsed post. The body is HTML rendered from the markdown source.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PostRecord {
    pub metadata: Metadata,
    pub body: String,
}

impl PostRecord {
    /// Returns the part of the body above the `<!-- more -->` fold, and
    /// whether the body was actually folded.
    pub fn summary(&self) -> (&str, bool) {
        const FOLD_TAG: &str = "<!-- more -->";
        match self.body.find(FOLD_TAG) {
            Some(i) => (&self.body[..i], true),
            None => (&self.body, false),
        }
    }
}

#[derive(Deserialize)]
struct Frontmatter {
    #[serde(alias = "Title")]
    title: String,

    #[serde(alias = "Date")]
    date: String,

    #[serde(default, alias = "Tags")]
    tags: Vec<String>,

    #[serde(default, alias = "Slug")]
    slug: Option<String>,
}

/// Parses a single post from the contents of the file at `path`. The file must
/// be structured as follows:
///
/// 1. Initial frontmatter fence (`---`)
/// 2. YAML frontmatter with fields `title`, `date`, and optionally `tags` and
///    `slug`
/// 3. Terminal frontmatter fence (`---`) on its own line
/// 4. Post body
///
/// For example:
///
/// ```md
/// ---
/// title: Hello, world!
/// date: 2021-04-16
/// tags: [greet]
/// ---
/// # Hello
///
/// World
/// ```
///
/// When `slug` is absent, the slugified file stem is used. A `slug` given in
/// the front matter must already be a slug (lowercase ASCII letters, digits
/// and single dashes), since it's used verbatim in URLs and file paths.
pub fn parse_post(path: &Path, input: &str) -> Result<PostRecord> {
    parse(path, input).map_err(|err| Error::Annotated(path.to_owned(), Box::new(err)))
}

fn parse(path: &Path, input: &str) -> Result<PostRecord> {
    fn frontmatter_indices(input: &str) -> Result<(usize, usize, usize)> {
        const FENCE: &str = "---";
        const END_FENCE: &str = "\n---";
        if !input.starts_with(FENCE) {
            return Err(Error::FrontmatterMissingStartFence);
        }
        match input[FENCE.len()..].find(END_FENCE) {
            None => Err(Error::FrontmatterMissingEndFence),
            Some(offset) => Ok((
                FENCE.len(),                            // yaml_start
                FENCE.len() + offset,                   // yaml_stop
                FENCE.len() + offset + END_FENCE.len(), // body_start
            )),
        }
    }

    let (yaml_start, yaml_stop, body_start) = frontmatter_indices(input)?;
    let frontmatter: Frontmatter = serde_yaml::from_str(&input[yaml_start..yaml_stop])?;

    // Front matter slugs must already be URL-safe; file stems are slugified.
    let slug = match frontmatter.slug {
        Some(slug) if !slug.is_empty() && slug::slugify(&slug) == slug => slug,
        Some(slug) => return Err(Error::InvalidSlug(slug)),
        None => {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .ok_or_else(|| Error::InvalidFileName(path.to_owned()))?;
            match slug::slugify(stem) {
                slug if slug.is_empty() => return Err(Error::InvalidSlug(stem.to_owned())),
                slug => slug,
            }
        }
    };

    let mut seen = HashSet::new();
    let tags = frontmatter
        .tags
        .iter()
        .map(|tag| slug::slugify(tag))
        .filter(|tag| !tag.is_empty() && seen.insert(tag.clone()))
        .collect();

    let mut body = String::new();
    markdown::to_html(&mut body, &input[body_start..]);

    Ok(PostRecord {
        metadata: Metadata {
            slug,
            date: frontmatter.date,
            title: frontmatter.title,
            tags,
        },
        body,
    })
}

/// Sorts posts in descending date order. Posts with the same date are ordered
/// by slug so the order is stable across runs.
pub fn sort_posts(posts: &mut [PostRecord]) {
    posts.sort_by(|a, b| {
        b.metadata
            .date
            .cmp(&a.metadata.date)
            .then_with(|| a.metadata.slug.cmp(&b.metadata.slug))
    });
}

/// Parses every `.md` file directly inside `dir` and returns the posts sorted
/// by date (most recent first). Fails if two posts share a slug.
pub fn load_posts(dir: &Path) -> Result<Vec<PostRecord>> {
    let entries = read_dir(dir).map_err(|err| Error::Io {
        path: dir.to_owned(),
        err,
    })?;

    let mut posts = Vec::new();
    for result in entries {
        let entry = result.map_err(|err| Error::Io {
            path: dir.to_owned(),
            err,
        })?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != MARKDOWN_EXTENSION) {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|err| Error::Io {
            path: path.clone(),
            err,
        })?;
        posts.push(parse_post(&path, &contents)?);
    }

    let mut slugs = HashSet::new();
    for post in &posts {
        if !slugs.insert(post.metadata.slug.as_str()) {
            return Err(Error::DuplicateSlug(post.metadata.slug.clone()));
        }
    }

    sort_posts(&mut posts);
    log::debug!("Loaded {} posts from {}", posts.len(), dir.display());
    Ok(posts)
}

/// Represents the result of a post-parse operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error parsing a [`PostRecord`].
#[derive(Debug)]
pub enum Error {
    /// Returned when a post source file is missing its starting frontmatter
    /// fence (`---`).
    FrontmatterMissingStartFence,

    /// Returned when a post source file is missing its terminal frontmatter
    /// fence (i.e., the starting fence was found but the ending one was
    /// missing).
    FrontmatterMissingEndFence,

    /// Returned when there was an error parsing the frontmatter as YAML.
    DeserializeYaml(serde_yaml::Error),

    /// Returned when a post has no `slug` and its file name isn't valid UTF-8.
    InvalidFileName(PathBuf),

    /// Returned when a front matter slug isn't URL-safe, or a file stem has
    /// nothing to slugify.
    InvalidSlug(String),

    /// Returned when two posts have the same slug.
    DuplicateSlug(String),

    /// Returned for I/O errors reading the posts directory or a post file.
    Io { path: PathBuf, err: std::io::Error },

    /// An error annotated with the path of the offending post.
    Annotated(PathBuf, Box<Error>),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::FrontmatterMissingStartFence => {
                write!(f, "Post must begin with `---`")
            }
            Error::FrontmatterMissingEndFence => {
                write!(f, "Missing closing `---`")
            }
            Error::DeserializeYaml(err) => err.fmt(f),
            Error::InvalidFileName(path) => {
                write!(f, "invalid file name: {:?}", path)
            }
            Error::InvalidSlug(slug) => write!(f, "invalid slug `{}`", slug),
            Error::DuplicateSlug(slug) => {
                write!(f, "more than one post has the slug `{}`", slug)
            }
            Error::Io { path, err } => {
                write!(f, "reading '{}': {}", path.display(), err)
            }
            Error::Annotated(path, err) => {
                write!(f, "parsing post '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::FrontmatterMissingStartFence => None,
            Error::FrontmatterMissingEndFence => None,
            Error::DeserializeYaml(err) => Some(err),
            Error::InvalidFileName(_) => None,
            Error::InvalidSlug(_) => None,
            Error::DuplicateSlug(_) => None,
            Error::Io { path: _, err } => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<serde_yaml::Error> for Error {
    /// Converts a [`serde_yaml::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for [`serde_yaml`] deserialization functions.
    fn from(err: serde_yaml::Error) -> Error {
        Error::DeserializeYaml(err)
    }
}
