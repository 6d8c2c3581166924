//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output site: loading the config ([`crate::config`])
//! and posts ([`crate::post`]), enumerating routes ([`crate::route`]),
//! resolving views ([`crate::component`]), clearing the output directory and
//! then rendering and writing every route ([`crate::render`],
//! [`crate::output`]) while the static files are copied alongside.
//!
//! Everything that can fail before the output directory is touched (config,
//! posts, views, the document template) is done first, so a broken site
//! never wipes out the previous build.

use crate::component::{self, Resolver};
use crate::config::{self, SiteConfig};
use crate::data::{DataSource, SiteData, Snapshot};
use crate::output::{self, manifest, Output};
use crate::post::{self, load_posts};
use crate::render::{self, PageTemplate, Renderer};
use crate::route::{enumerate, Route, Router};
use crate::tag::TagIndex;
use crossbeam_channel::unbounded;
use log::{debug, error, info};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Knobs for a single build that don't come from `_config.yml`.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// The number of worker threads rendering routes. `None` uses one thread
    /// per CPU.
    pub threads: Option<usize>,

    /// When set, a failed route doesn't stop the remaining routes from being
    /// rendered; all failures are reported at the end. Otherwise the first
    /// failure stops the workers from picking up new routes.
    pub keep_going: bool,

    /// Overrides the theme directory from the config.
    pub theme_dir: Option<PathBuf>,
}

/// What a successful build produced.
#[derive(Debug)]
pub struct Report {
    /// Every route that was written, in enumeration order.
    pub routes: Vec<Route>,

    /// Static items that couldn't be copied. The site is usable without them
    /// but the build should still be reported as failed.
    pub asset_errors: Vec<output::Error>,
}

impl Report {
    pub fn is_complete(&self) -> bool {
        self.asset_errors.is_empty()
    }
}

/// Builds the site in `site_dir`.
pub fn build_site(site_dir: &Path, options: &Options) -> Result<Report> {
    let mut config = SiteConfig::from_directory(site_dir)?;
    if let Some(theme_dir) = &options.theme_dir {
        config.theme_dir = theme_dir.clone();
    }
    build(&config, options)
}

/// Builds the site described by `config`.
pub fn build(config: &SiteConfig, options: &Options) -> Result<Report> {
    let posts = load_posts(&config.posts_dir())?;
    let tags = TagIndex::build(&posts);
    let routes = enumerate(&posts, &tags);
    info!(
        "Building {} routes from {} posts and {} tags",
        routes.len(),
        posts.len(),
        tags.len()
    );

    let router = Router::default();
    let resolver = Resolver::with_overrides(&config.components_dir);
    let template = PageTemplate::load(config).map_err(Error::Template)?;
    let renderer = Renderer::new(config, &router, &resolver, template)?;
    let data = SiteData::new(config, &posts, &tags);

    let output = Output::new(&config.output_dir)
        .protect(&config.input_dir)
        .protect(&config.theme_dir);
    output.prepare()?;

    let items = manifest(config);
    let threads = match options.threads {
        None | Some(0) => num_cpus::get(),
        Some(threads) => threads,
    };
    let (failures, asset_errors) = std::thread::scope(|scope| {
        let copies = scope.spawn(|| output.copy_static(&items));
        let failures = write_routes(&routes, &renderer, &data, &output, threads, options.keep_going);
        let asset_errors = match copies.join() {
            Ok(errors) => errors,
            Err(_) => vec![output::Error::Copy {
                src: config.theme_dir.clone(),
                dest: output.root().to_owned(),
                err: std::io::Error::new(std::io::ErrorKind::Other, "copy thread panicked"),
            }],
        };
        (failures, asset_errors)
    });

    if !failures.is_empty() {
        return Err(Error::Pages(failures));
    }

    // Only a build in which every route made it gets a data file.
    output.write_data(&Snapshot {
        config,
        posts: &posts,
        tags: &tags,
    })?;

    Ok(Report {
        routes,
        asset_errors,
    })
}

/// Renders and writes `routes` on a pool of `threads` workers. Returns the
/// routes that failed.
fn write_routes(
    routes: &[Route],
    renderer: &Renderer,
    data: &dyn DataSource,
    output: &Output,
    threads: usize,
    keep_going: bool,
) -> Vec<PageFailure> {
    let (tx, rx) = unbounded::<&Route>();
    for route in routes {
        // the receiver outlives this loop, so sending can't fail
        let _ = tx.send(route);
    }
    drop(tx);

    let cancelled = AtomicBool::new(false);
    let failures = Mutex::new(Vec::new());
    let workers = threads.max(1).min(routes.len().max(1));
    debug!("Rendering on {} threads", workers);

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let cancelled = &cancelled;
            let failures = &failures;
            scope.spawn(move || {
                for route in rx {
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Err(err) = write_route(route, renderer, data, output) {
                        error!("{}: {}", route, err);
                        if !keep_going {
                            cancelled.store(true, Ordering::SeqCst);
                        }
                        failures
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(PageFailure {
                                route: route.clone(),
                                err,
                            });
                    }
                }
            });
        }
    });

    let mut failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
    failures.sort_by(|a, b| a.route.cmp(&b.route));
    failures
}

fn write_route(
    route: &Route,
    renderer: &Renderer,
    data: &dyn DataSource,
    output: &Output,
) -> std::result::Result<(), PageError> {
    info!("Creating {}", route);
    let html = renderer.render(route, data)?;
    output.write_page(route, &html)?;
    Ok(())
}

/// A route that couldn't be built.
#[derive(Debug)]
pub struct PageFailure {
    pub route: Route,
    pub err: PageError,
}

/// The reason a route couldn't be built.
#[derive(Debug)]
pub enum PageError {
    Render(render::Error),
    Write(output::Error),
}

impl fmt::Display for PageError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PageError::Render(err) => err.fmt(f),
            PageError::Write(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for PageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PageError::Render(err) => Some(err),
            PageError::Write(err) => Some(err),
        }
    }
}

impl From<render::Error> for PageError {
    fn from(err: render::Error) -> PageError {
        PageError::Render(err)
    }
}

impl From<output::Error> for PageError {
    fn from(err: output::Error) -> PageError {
        PageError::Write(err)
    }
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site.
#[derive(Debug)]
pub enum Error {
    /// Returned when the config is missing or invalid.
    Config(config::Error),

    /// Returned when a post can't be parsed.
    Content(post::Error),

    /// Returned when a view can't be resolved.
    Component(component::Error),

    /// Returned when the document template can't be loaded.
    Template(render::Error),

    /// Returned when the output directory can't be prepared or the data file
    /// can't be written.
    Output(output::Error),

    /// Returned when one or more routes failed to render or write.
    Pages(Vec<PageFailure>),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Config(err) => err.fmt(f),
            Error::Content(err) => err.fmt(f),
            Error::Component(err) => err.fmt(f),
            Error::Template(err) => err.fmt(f),
            Error::Output(err) => err.fmt(f),
            Error::Pages(failures) => {
                write!(f, "{} route(s) failed:", failures.len())?;
                for failure in failures {
                    write!(f, "\n  {}: {}", failure.route, failure.err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(err) => Some(err),
            Error::Content(err) => Some(err),
            Error::Component(err) => Some(err),
            Error::Template(err) => Some(err),
            Error::Output(err) => Some(err),
            Error::Pages(failures) => failures.first().map(|failure| {
                let err: &(dyn std::error::Error + 'static) = &failure.err;
                err
            }),
        }
    }
}

impl From<config::Error> for Error {
    /// Converts [`config::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: config::Error) -> Error {
        Error::Config(err)
    }
}

impl From<post::Error> for Error {
    /// Converts [`post::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: post::Error) -> Error {
        Error::Content(err)
    }
}

impl From<component::Error> for Error {
    /// Converts [`component::Error`]s into [`Error`]. This allows us to use
    /// the `?` operator.
    fn from(err: component::Error) -> Error {
        Error::Component(err)
    }
}

impl From<output::Error> for Error {
    /// Converts [`output::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: output::Error) -> Error {
        Error::Output(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    struct Site {
        dir: tempfile::TempDir,
    }

    impl Site {
        fn new(config: &str) -> Site {
            let site = Site {
                dir: tempfile::tempdir().unwrap(),
            };
            site.write("_config.yml", config);
            fs::create_dir_all(site.path().join("_posts")).unwrap();
            site.write("theme/theme.css", "body {}");
            site.write("theme/images/logo.png", "png");
            site.write("theme/highlight/zenburn.css", "pre {}");
            for bundle in &["vendor", "client", "components"] {
                site.write(&format!("theme/bundles/{}.bundle.js", bundle), "0;");
            }
            site
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, relative: &str, contents: &str) {
            let path = self.path().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn post(&self, slug: &str, date: &str, tags: &[&str]) {
            self.write(
                &format!("_posts/{}.md", slug),
                &format!(
                    "---\ntitle: Post {}\ndate: {}\ntags: [{}]\n---\nBody of {}.\n",
                    slug,
                    date,
                    tags.join(", "),
                    slug
                ),
            );
        }

        fn read(&self, relative: &str) -> String {
            fs::read_to_string(self.path().join(relative)).unwrap()
        }
    }

    fn options() -> Options {
        Options {
            threads: Some(2),
            ..Options::default()
        }
    }

    #[test]
    fn test_end_to_end() {
        let site = Site::new("title: T\nrootUrl: \"\"\noutputDir: _site\n");
        site.post("hello", "2024-01-01", &["go"]);

        let report = build_site(site.path(), &options()).unwrap();

        let routes: Vec<&str> = report.routes.iter().map(Route::as_str).collect();
        assert_eq!(routes, vec!["/", "/posts/hello", "/posts/tagged/go"]);
        assert!(report.is_complete());
        for page in &[
            "_site/index.html",
            "_site/posts/hello/index.html",
            "_site/posts/tagged/go/index.html",
        ] {
            assert!(site.read(page).contains("<title>"), "{}", page);
            assert!(site.read(page).contains("T"), "{}", page);
        }
        assert!(site.read("_site/index.html").contains("<title>T</title>"));
        assert!(site.read("_site/posts/hello/index.html").contains("<p>Body of hello.</p>"));
        assert_eq!(site.read("_site/theme/theme.css"), "body {}");
        assert_eq!(site.read("_site/theme/zenburn.css"), "pre {}");
        assert_eq!(site.read("_site/theme/images/logo.png"), "png");
        assert_eq!(site.read("_site/client.bundle.js"), "0;");

        let data: serde_json::Value = serde_json::from_str(&site.read("_site/data.json")).unwrap();
        assert_eq!(data["config"]["title"], "T");
        assert_eq!(data["posts"][0]["metadata"]["slug"], "hello");
        assert_eq!(data["tags"]["go"][0], "hello");
    }

    #[test]
    fn test_rebuild_is_idempotent_and_removes_stale_output() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &["old"]);
        site.post("b", "2022-01-01", &["go"]);
        site.write("_site/.keep", "hidden");

        build_site(site.path(), &options()).unwrap();
        let first: Vec<String> = ["_site/index.html", "_site/posts/b/index.html", "_site/posts/tagged/go/index.html"]
            .iter()
            .map(|page| site.read(page))
            .collect();
        assert!(site.path().join("_site/posts/tagged/old/index.html").is_file());

        fs::remove_file(site.path().join("_posts/a.md")).unwrap();
        build_site(site.path(), &options()).unwrap();
        let second: Vec<String> = ["_site/index.html", "_site/posts/b/index.html", "_site/posts/tagged/go/index.html"]
            .iter()
            .map(|page| site.read(page))
            .collect();

        // the home page lists one post fewer; the others are unchanged
        assert_ne!(first[0], second[0]);
        assert_eq!(first[1..], second[1..]);
        assert!(!site.path().join("_site/posts/a").exists());
        assert!(!site.path().join("_site/posts/tagged/old").exists());
        assert_eq!(site.read("_site/.keep"), "hidden");
    }

    #[test]
    fn test_unchanged_rebuild_is_byte_identical() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &["x", "y"]);
        site.post("b", "2022-01-01", &["y"]);

        let report = build_site(site.path(), &options()).unwrap();
        let output = Output::new(site.path().join("_site"));
        let first: Vec<String> = report
            .routes
            .iter()
            .map(|route| fs::read_to_string(output.page_path(route)).unwrap())
            .collect();

        build_site(site.path(), &Options::default()).unwrap();
        let second: Vec<String> = report
            .routes
            .iter()
            .map(|route| fs::read_to_string(output.page_path(route)).unwrap())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        match build_site(dir.path(), &options()) {
            Err(Error::Config(config::Error::NotFound(_))) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_bad_post_leaves_previous_build_alone() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &[]);
        build_site(site.path(), &options()).unwrap();

        site.write("_posts/broken.md", "no front matter");
        match build_site(site.path(), &options()) {
            Err(Error::Content(_)) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(site.path().join("_site/posts/a/index.html").is_file());
    }

    #[test]
    fn test_missing_asset_is_reported_but_not_fatal() {
        let site = Site::new("title: T\nbundles: [client, extra]\n");
        site.post("a", "2021-01-01", &[]);

        let report = build_site(site.path(), &options()).unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.asset_errors.len(), 1);
        assert!(site.path().join("_site/posts/a/index.html").is_file());
        assert!(site.path().join("_site/client.bundle.js").is_file());
        assert!(site.path().join("_site/data.json").is_file());
    }

    #[test]
    fn test_override_component() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &[]);
        site.write("components/post.html", "<article>{{.title}}</article>");

        build_site(site.path(), &options()).unwrap();
        assert!(site.read("_site/posts/a/index.html").contains("<article>Post a</article>"));
    }

    #[test]
    fn test_failing_route_fails_build_without_data_file() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &[]);
        site.post("b", "2022-01-01", &[]);
        // executing a template that isn't defined fails at render time
        site.write("components/post.html", r#"{{template "nope" .}}"#);

        for keep_going in &[false, true] {
            let options = Options {
                threads: Some(1),
                keep_going: *keep_going,
                theme_dir: None,
            };
            match build_site(site.path(), &options) {
                Err(Error::Pages(failures)) => {
                    assert!(!failures.is_empty());
                    if *keep_going {
                        assert_eq!(failures.len(), 2);
                    }
                }
                other => panic!("unexpected result: {:?}", other),
            }
            assert!(!site.path().join("_site/data.json").exists());
        }
    }

    #[test]
    fn test_unmatched_route_is_fatal() {
        let config = SiteConfig::parse(Path::new("/srv/blog"), "title: T\n").unwrap();
        let router = Router::default();
        let resolver = Resolver::with_overrides(&config.components_dir);
        let renderer = Renderer::new(&config, &router, &resolver, PageTemplate::builtin()).unwrap();
        let tags = TagIndex::default();
        let data = SiteData::new(&config, &[], &tags);
        let dir = tempfile::tempdir().unwrap();
        let output = Output::new(dir.path());

        let failures = write_routes(
            &[Route::home(), Route::new("/about")],
            &renderer,
            &data,
            &output,
            1,
            false,
        );
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].route.as_str(), "/about");
        assert!(matches!(
            failures[0].err,
            PageError::Render(render::Error::RouteUnmatched(_))
        ));
        assert!(!dir.path().join("about").exists());
    }

    #[test]
    fn test_bad_template_leaves_previous_build_alone() {
        let site = Site::new("title: T\n");
        site.post("a", "2021-01-01", &[]);
        build_site(site.path(), &options()).unwrap();

        site.write("_config.yml", "title: T\ntemplate: layout.html\n");
        site.write("layout.html", "<title>{{ .title");
        match build_site(site.path(), &options()) {
            Err(Error::Template(render::Error::Template { .. })) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        site.write("_config.yml", "title: T\ntemplate: missing.html\n");
        match build_site(site.path(), &options()) {
            Err(Error::Template(render::Error::TemplateFile { .. })) => {}
            other => panic!("unexpected result: {:?}", other),
        }

        assert!(site.path().join("_site/posts/a/index.html").is_file());
        assert!(site.path().join("_site/data.json").is_file());
    }

    #[test]
    fn test_custom_template() {
        let site = Site::new("title: T\ntemplate: layout.html\n");
        site.post("a", "2021-01-01", &[]);
        site.write(
            "layout.html",
            "<html><head><title>{{.title}}</title></head><body class=\"custom\">{{.body}}</body></html>",
        );

        build_site(site.path(), &options()).unwrap();
        let page = site.read("_site/posts/a/index.html");
        assert!(page.starts_with("<html><head><title>Post a</title></head><body class=\"custom\">"));
        assert!(page.contains("<p>Body of a.</p>"));
    }

    #[test]
    fn test_output_dir_may_not_contain_the_site() {
        for output_dir in &[".", ".."] {
            let site = Site::new(&format!("title: T\noutputDir: \"{}\"\n", output_dir));
            site.post("a", "2021-01-01", &[]);

            match build_site(site.path(), &options()) {
                Err(Error::Output(output::Error::Overlap { .. })) => {}
                other => panic!("{}: unexpected result: {:?}", output_dir, other),
            }
            assert!(site.path().join("_config.yml").is_file());
            assert!(site.path().join("_posts/a.md").is_file());
            assert!(site.path().join("theme/theme.css").is_file());
        }
    }

    #[test]
    fn test_output_dir_may_not_contain_the_theme() {
        let site = Site::new("title: T\noutputDir: public\nthemeDir: public/theme\n");
        site.post("a", "2021-01-01", &[]);
        site.write("public/theme/theme.css", "body {}");

        match build_site(site.path(), &options()) {
            Err(Error::Output(output::Error::Overlap { .. })) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(site.path().join("public/theme/theme.css").is_file());
    }
}
