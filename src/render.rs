//! The render engine. [`Renderer::render`] turns a [`Route`] into a complete
//! HTML document in four steps:
//!
//! 1. Match the route against the routing table ([`Router`]) to find the view
//!    and the route parameters. A route the table doesn't understand is an
//!    error; we never emit an empty page for it.
//! 2. Ask the [`DataSource`] for the view's props.
//! 3. Render the view with the props into an HTML fragment.
//! 4. Merge the fragment into the document template through the fixed set of
//!    [`Slots`].
//!
//! Rendering is a pure function of the configuration, the route, the props
//! and the templates, so rendering the same route twice yields the same
//! document.

use crate::component::{self, Resolver, View};
use crate::config::SiteConfig;
use crate::data::{self, DataSource, Props};
use crate::markdown::escape;
use crate::route::{Route, Router};
use gtmpl::{Context, Template, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Views that aren't routed to but that routed views may include with
/// `{{template "name" .}}`.
pub const PARTIALS: &[&str] = &["banner"];

const BUILTIN_TEMPLATE: &str = include_str!("index.html");

/// The values interpolated into the document template. Every field is ready
/// for interpolation into HTML.
#[derive(Clone, Debug, PartialEq)]
pub struct Slots {
    /// The escaped page title.
    pub title: String,

    /// The rendered view.
    pub body: String,

    /// The URL of the theme stylesheet.
    pub app_theme: String,

    /// The root URL of the site, for the client app.
    pub app_root: String,

    /// The URL of the syntax-highlighting stylesheet.
    pub code_theme: String,

    /// The URLs of the client bundles.
    pub bundles: Vec<String>,
}

impl Slots {
    pub fn new(config: &SiteConfig, title: &str, body: String) -> Slots {
        Slots {
            title: escape(title),
            body,
            app_theme: escape(&config.url("/theme/theme.css")),
            app_root: escape(&config.root_url),
            code_theme: escape(&config.url(&format!("/theme/{}", config.code_theme))),
            bundles: config
                .bundles
                .iter()
                .map(|name| escape(&config.url(&format!("/{}.bundle.js", name))))
                .collect(),
        }
    }
}

impl From<&Slots> for Value {
    /// Converts [`Slots`] into a [`Value`] for templating.
    fn from(slots: &Slots) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(slots.title.clone()));
        m.insert("body".to_owned(), Value::String(slots.body.clone()));
        m.insert("appTheme".to_owned(), Value::String(slots.app_theme.clone()));
        m.insert("appRoot".to_owned(), Value::String(slots.app_root.clone()));
        m.insert("codeTheme".to_owned(), Value::String(slots.code_theme.clone()));
        m.insert(
            "bundles".to_owned(),
            Value::Array(slots.bundles.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(m)
    }
}

/// The document skeleton every rendered view is merged into.
#[derive(Clone, Debug)]
pub struct PageTemplate {
    origin: String,
    source: String,
}

impl PageTemplate {
    /// The document template shipped with the binary.
    pub fn builtin() -> PageTemplate {
        PageTemplate {
            origin: String::from("builtin:index"),
            source: BUILTIN_TEMPLATE.to_owned(),
        }
    }

    /// Reads and validates a document template from disk.
    pub fn from_file(path: &Path) -> Result<PageTemplate> {
        let source = std::fs::read_to_string(path).map_err(|err| Error::TemplateFile {
            path: path.to_owned(),
            err,
        })?;
        let origin = path.display().to_string();
        Template::default()
            .parse(source.as_str())
            .map_err(|message| Error::Template {
                origin: origin.clone(),
                message,
            })?;
        Ok(PageTemplate { origin, source })
    }

    /// The configured document template, or the built-in one.
    pub fn load(config: &SiteConfig) -> Result<PageTemplate> {
        match &config.template {
            Some(path) => PageTemplate::from_file(path),
            None => Ok(PageTemplate::builtin()),
        }
    }

    pub fn render(&self, slots: &Slots) -> Result<String> {
        execute(&self.origin, &self.source, slots.into())
    }
}

/// Renders routes into HTML documents. All views the routing table can route
/// to are resolved up front, so a missing view fails the build before any
/// page is rendered.
pub struct Renderer<'a> {
    config: &'a SiteConfig,
    router: &'a Router,
    views: HashMap<&'static str, Arc<View>>,
    partials: Vec<Arc<View>>,
    template: PageTemplate,
}

impl<'a> Renderer<'a> {
    pub fn new(
        config: &'a SiteConfig,
        router: &'a Router,
        resolver: &Resolver,
        template: PageTemplate,
    ) -> std::result::Result<Renderer<'a>, component::Error> {
        let mut views = HashMap::new();
        for name in router.views() {
            views.insert(name, resolver.resolve(name)?);
        }
        let partials = PARTIALS
            .iter()
            .map(|name| resolver.resolve(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Renderer {
            config,
            router,
            views,
            partials,
            template,
        })
    }

    /// Renders `route` into a complete HTML document with props from `data`.
    pub fn render(&self, route: &Route, data: &dyn DataSource) -> Result<String> {
        let matched = self
            .router
            .matches(route)
            .ok_or_else(|| Error::RouteUnmatched(route.clone()))?;
        let view = self
            .views
            .get(matched.view)
            .ok_or_else(|| Error::ViewNotLoaded(matched.view.to_owned()))?;
        let props = data.fetch(route, &matched)?;
        let body = self.render_view(view, &props)?;
        self.template
            .render(&Slots::new(self.config, props.title(), body))
    }

    /// Renders a single view into an HTML fragment. The view is parsed
    /// together with the partials so it can include them; a partial the view
    /// defines itself is left out.
    pub fn render_view(&self, view: &View, props: &Props) -> Result<String> {
        let mut source = String::from(view.source());
        for partial in &self.partials {
            if view.defines(partial.name()) {
                continue;
            }
            source.push('\n');
            source.push_str(partial.source());
        }
        execute(view.origin(), &source, props.to_value())
    }
}

fn execute(origin: &str, source: &str, value: Value) -> Result<String> {
    let template_error = |message: String| Error::Template {
        origin: origin.to_owned(),
        message,
    };
    let mut template = Template::default();
    template.parse(source).map_err(template_error)?;
    let context = Context::from(value).map_err(template_error)?;
    let mut out: Vec<u8> = Vec::new();
    template.execute(&mut out, &context).map_err(template_error)?;
    String::from_utf8(out).map_err(|err| template_error(err.to_string()))
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to render a route.
#[derive(Debug)]
pub enum Error {
    /// Returned when no routing rule matches the route.
    RouteUnmatched(Route),

    /// Returned when the routing table names a view the renderer didn't load.
    ViewNotLoaded(String),

    /// Returned when the data source can't supply the props.
    Data(data::Error),

    /// Returned when the document template file can't be read.
    TemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned when a template fails to parse or execute.
    Template { origin: String, message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::RouteUnmatched(route) => {
                write!(f, "no routing rule matches route {}", route)
            }
            Error::ViewNotLoaded(view) => write!(f, "view `{}` was not loaded", view),
            Error::Data(err) => err.fmt(f),
            Error::TemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::Template { origin, message } => {
                write!(f, "template {}: {}", origin, message)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::RouteUnmatched(_) => None,
            Error::ViewNotLoaded(_) => None,
            Error::Data(err) => Some(err),
            Error::TemplateFile { path: _, err } => Some(err),
            Error::Template { .. } => None,
        }
    }
}

impl From<data::Error> for Error {
    /// Converts [`data::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: data::Error) -> Error {
        Error::Data(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::component::{BuiltinRegistry, DirectoryRegistry};
    use crate::data::SiteData;
    use crate::post::{Metadata, PostRecord};
    use crate::route::{RouteMatch, Rule};
    use crate::tag::TagIndex;

    fn config() -> SiteConfig {
        SiteConfig::parse(
            Path::new("/srv/blog"),
            "title: T\nrootUrl: /blog\nauthor:\n  name: Ada\n  twitter: ada\n",
        )
        .unwrap()
    }

    fn posts() -> Vec<PostRecord> {
        vec![PostRecord {
            metadata: Metadata {
                slug: String::from("hello"),
                date: String::from("2024-01-01"),
                title: String::from("Hello"),
                tags: vec![String::from("go")],
            },
            body: String::from("<p>Hi there.</p>\n"),
        }]
    }

    fn builtins() -> Resolver {
        Resolver::new(vec![Box::new(BuiltinRegistry)])
    }

    #[test]
    fn test_slots() {
        let slots = Slots::new(&config(), "A & B", String::from("<p>x</p>"));
        assert_eq!(slots.title, "A &amp; B");
        assert_eq!(slots.body, "<p>x</p>");
        assert_eq!(slots.app_theme, "/blog/theme/theme.css");
        assert_eq!(slots.app_root, "/blog");
        assert_eq!(slots.code_theme, "/blog/theme/zenburn.css");
        assert_eq!(
            slots.bundles,
            vec![
                "/blog/vendor.bundle.js",
                "/blog/client.bundle.js",
                "/blog/components.bundle.js"
            ]
        );
    }

    #[test]
    fn test_builtin_template() -> Result<()> {
        let slots = Slots::new(&config(), "Title", String::from("<p>body</p>"));
        let html = PageTemplate::builtin().render(&slots)?;
        assert!(html.contains("<title>Title</title>"));
        assert!(html.contains("<p>body</p>"));
        assert!(html.contains(r#"href="/blog/theme/theme.css""#));
        assert!(html.contains(r#"href="/blog/theme/zenburn.css""#));
        assert!(html.contains(r#"<script src="/blog/client.bundle.js"></script>"#));
        Ok(())
    }

    #[test]
    fn test_unreadable_template_file() {
        let dir = tempfile::tempdir().unwrap();
        match PageTemplate::from_file(&dir.path().join("missing.html")) {
            Err(Error::TemplateFile { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_render_post() -> Result<()> {
        let config = config();
        let posts = posts();
        let tags = TagIndex::build(&posts);
        let router = Router::default();
        let renderer = Renderer::new(&config, &router, &builtins(), PageTemplate::builtin()).unwrap();
        let data = SiteData::new(&config, &posts, &tags);

        let html = renderer.render(&Route::post("hello"), &data)?;
        assert!(html.contains("<title>Hello</title>"));
        assert!(html.contains("<p>Hi there.</p>"));
        assert!(html.contains("Mon Jan 01 2024"));
        assert!(html.contains(r#"href="/blog/posts/tagged/go""#));
        assert!(html.contains("https://twitter.com/ada"));
        assert!(!html.contains("disqus"));
        Ok(())
    }

    #[test]
    fn test_render_is_deterministic() -> Result<()> {
        let config = config();
        let posts = posts();
        let tags = TagIndex::build(&posts);
        let router = Router::default();
        let renderer = Renderer::new(&config, &router, &builtins(), PageTemplate::builtin()).unwrap();
        let data = SiteData::new(&config, &posts, &tags);

        for route in crate::route::enumerate(&posts, &tags) {
            assert_eq!(renderer.render(&route, &data)?, renderer.render(&route, &data)?);
        }
        Ok(())
    }

    #[test]
    fn test_unmatched_route() {
        let config = config();
        let posts = posts();
        let tags = TagIndex::build(&posts);
        let router = Router::default();
        let renderer = Renderer::new(&config, &router, &builtins(), PageTemplate::builtin()).unwrap();
        let data = SiteData::new(&config, &posts, &tags);

        match renderer.render(&Route::new("/about"), &data) {
            Err(Error::RouteUnmatched(route)) => assert_eq!(route.as_str(), "/about"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_missing_view_fails_up_front() {
        let config = config();
        let router = Router::new(vec![Rule {
            pattern: "/about",
            view: "about",
        }]);
        match Renderer::new(&config, &router, &builtins(), PageTemplate::builtin()) {
            Err(component::Error::NotFound(name)) => assert_eq!(name, "about"),
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("expected an error"),
        }
    }

    struct Fixed;

    impl DataSource for Fixed {
        fn fetch(&self, _: &Route, matched: &RouteMatch) -> data::Result<Props> {
            Ok(Props::new("About").with("who", Value::String(matched.view.to_owned())))
        }
    }

    #[test]
    fn test_override_view_and_custom_source() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("about.html"),
            r#"{{template "banner" .}}<h1>{{.title}} {{.who}}</h1>"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("banner.html"),
            r#"{{define "banner"}}<nav>custom</nav>{{end}}"#,
        )
        .unwrap();
        let resolver = Resolver::new(vec![
            Box::new(DirectoryRegistry::new(dir.path())),
            Box::new(BuiltinRegistry),
        ]);
        let config = config();
        let router = Router::new(vec![Rule {
            pattern: "/about",
            view: "about",
        }]);
        let renderer = Renderer::new(&config, &router, &resolver, PageTemplate::builtin()).unwrap();

        let html = renderer.render(&Route::new("/about"), &Fixed)?;
        assert!(html.contains("<nav>custom</nav><h1>About about</h1>"));
        Ok(())
    }

    #[test]
    fn test_view_defining_a_partial_replaces_it() -> Result<()> {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("home.html"),
            r#"{{define "banner"}}<nav>{{.name}}</nav>{{end}}{{template "banner" .site}}<main></main>"#,
        )
        .unwrap();
        let config = config();
        let posts = posts();
        let tags = TagIndex::build(&posts);
        let router = Router::default();
        let resolver = Resolver::with_overrides(dir.path());
        let renderer = Renderer::new(&config, &router, &resolver, PageTemplate::builtin()).unwrap();
        let data = SiteData::new(&config, &posts, &tags);

        let html = renderer.render(&Route::home(), &data)?;
        assert!(html.contains("<nav>Ada</nav><main></main>"));
        assert!(!html.contains("top-banner"));

        // other views still get the built-in partial
        let html = renderer.render(&Route::post("hello"), &data)?;
        assert!(html.contains("top-banner"));
        Ok(())
    }
}
