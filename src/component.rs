//! Resolves symbolic view names to [`View`]s. A [`Resolver`] searches an
//! ordered list of [`Registry`]s; the first registry that has a view with the
//! requested name wins. A registry that simply doesn't have the name returns
//! `Ok(None)` and the search moves on, while any other failure (an unreadable
//! file, a malformed template) stops the search and is returned to the
//! caller.

use gtmpl::Template;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// The file extension of view templates in a [`DirectoryRegistry`].
pub const VIEW_EXTENSION: &str = "html";

/// A named, stateless template that renders props into an HTML fragment.
/// Views are validated when they're loaded, so a [`View`] always holds
/// syntactically valid template source.
#[derive(Clone, Debug)]
pub struct View {
    name: String,
    origin: String,
    source: String,
}

impl View {
    /// Validates `source` and wraps it in a [`View`]. `origin` describes where
    /// the source came from and is only used for diagnostics.
    pub fn parse(name: &str, origin: &str, source: String) -> LoadResult<View> {
        let mut template = Template::default();
        template
            .parse(source.as_str())
            .map_err(|message| LoadError::Malformed {
                origin: origin.to_owned(),
                message,
            })?;
        Ok(View {
            name: name.to_owned(),
            origin: origin.to_owned(),
            source,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns true if the view has its own `{{define "name"}}` block.
    pub fn defines(&self, name: &str) -> bool {
        self.source.split("{{").skip(1).any(|action| {
            action
                .trim_start_matches('-')
                .trim_start()
                .strip_prefix("define")
                .map(|rest| rest.trim_start())
                .and_then(|rest| rest.strip_prefix('"'))
                .and_then(|rest| rest.strip_prefix(name))
                .map_or(false, |rest| rest.starts_with('"'))
        })
    }
}

/// A source of views.
pub trait Registry: Send + Sync {
    /// Looks up the view called `name`. Returns `Ok(None)` if this registry
    /// has no such view.
    fn lookup(&self, name: &str) -> LoadResult<Option<View>>;
}

/// Loads views from `{dir}/{name}.html`. A missing directory is treated as an
/// empty registry.
pub struct DirectoryRegistry {
    dir: PathBuf,
}

impl DirectoryRegistry {
    pub fn new<P: Into<PathBuf>>(dir: P) -> DirectoryRegistry {
        DirectoryRegistry { dir: dir.into() }
    }
}

impl Registry for DirectoryRegistry {
    fn lookup(&self, name: &str) -> LoadResult<Option<View>> {
        let path = self.dir.join(format!("{}.{}", name, VIEW_EXTENSION));
        match std::fs::read_to_string(&path) {
            Ok(source) => View::parse(name, &path.display().to_string(), source).map(Some),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(LoadError::Io { path, err }),
        }
    }
}

const BUILTIN_VIEWS: &[(&str, &str)] = &[
    ("banner", include_str!("components/banner.html")),
    ("home", include_str!("components/home.html")),
    ("post", include_str!("components/post.html")),
    ("tagged", include_str!("components/tagged.html")),
];

/// The views compiled into the binary.
pub struct BuiltinRegistry;

impl Registry for BuiltinRegistry {
    fn lookup(&self, name: &str) -> LoadResult<Option<View>> {
        match BUILTIN_VIEWS.iter().find(|(builtin, _)| *builtin == name) {
            Some((_, source)) => {
                View::parse(name, &format!("builtin:{}", name), source.to_string()).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Resolves view names against an ordered list of registries. Successful
/// resolutions are cached, so each name is loaded at most once.
pub struct Resolver {
    registries: Vec<Box<dyn Registry>>,
    cache: Mutex<HashMap<String, Arc<View>>>,
}

impl Resolver {
    pub fn new(registries: Vec<Box<dyn Registry>>) -> Resolver {
        Resolver {
            registries,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// A resolver that searches `components_dir` before the built-in views.
    pub fn with_overrides<P: Into<PathBuf>>(components_dir: P) -> Resolver {
        Resolver::new(vec![
            Box::new(DirectoryRegistry::new(components_dir)),
            Box::new(BuiltinRegistry),
        ])
    }

    /// Returns the view called `name` from the first registry that has it.
    pub fn resolve(&self, name: &str) -> Result<Arc<View>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(view) = cache.get(name) {
            return Ok(view.clone());
        }

        for registry in &self.registries {
            match registry.lookup(name) {
                Ok(Some(view)) => {
                    log::debug!("Resolved view `{}` from {}", view.name(), view.origin());
                    let view = Arc::new(view);
                    cache.insert(name.to_owned(), view.clone());
                    return Ok(view);
                }
                Ok(None) => continue,
                Err(err) => {
                    return Err(Error::Load {
                        name: name.to_owned(),
                        err,
                    })
                }
            }
        }
        Err(Error::NotFound(name.to_owned()))
    }

    /// The number of views loaded so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Represents a failure to load a view that exists in a registry.
#[derive(Debug)]
pub enum LoadError {
    /// Returned when the view file exists but can't be read.
    Io { path: PathBuf, err: io::Error },

    /// Returned when the view source isn't a valid template.
    Malformed { origin: String, message: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LoadError::Io { path, err } => {
                write!(f, "reading '{}': {}", path.display(), err)
            }
            LoadError::Malformed { origin, message } => {
                write!(f, "parsing template {}: {}", origin, message)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io { path: _, err } => Some(err),
            LoadError::Malformed { .. } => None,
        }
    }
}

type Result<T> = std::result::Result<T, Error>;

type LoadResult<T> = std::result::Result<T, LoadError>;

/// Represents a failure to resolve a view.
#[derive(Debug)]
pub enum Error {
    /// Returned when no registry has a view with the given name.
    NotFound(String),

    /// Returned when a registry has the view but loading it failed.
    Load { name: String, err: LoadError },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(name) => write!(f, "Failed to load component {}", name),
            Error::Load { name, err } => {
                write!(f, "Loading component {}: {}", name, err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::Load { name: _, err } => Some(err),
        }
    }
}
