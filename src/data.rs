//! Supplies the props each view renders. The [`DataSource`] trait is the seam
//! between the render engine and the site's content; [`SiteData`] is the
//! implementation backed by the parsed posts and tag index.

use crate::config::SiteConfig;
use crate::markdown::escape;
use crate::post::PostRecord;
use crate::route::{Route, RouteMatch};
use crate::tag::TagIndex;
use chrono::NaiveDate;
use gtmpl::Value;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// The data a view needs to render one route. Every page has a title; the
/// remaining fields depend on the view. Field values are ready for
/// interpolation into HTML, i.e. text is already escaped.
#[derive(Clone, Debug)]
pub struct Props {
    title: String,
    fields: HashMap<String, Value>,
}

impl Props {
    /// Creates props with the given (unescaped) page title.
    pub fn new<S: Into<String>>(title: S) -> Props {
        Props {
            title: title.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: Value) -> Props {
        self.fields.insert(key.to_owned(), value);
        self
    }

    /// The unescaped page title.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Converts the props into a template value: an object holding every
    /// field plus the escaped `title`.
    pub fn to_value(&self) -> Value {
        let mut m = self.fields.clone();
        m.insert("title".to_owned(), Value::String(escape(&self.title)));
        Value::Object(m)
    }
}

/// Looks up the props for a matched route.
pub trait DataSource: Sync {
    fn fetch(&self, route: &Route, matched: &RouteMatch) -> Result<Props>;
}

/// The [`DataSource`] for a blog: the home page lists every post, post pages
/// show a single post, and tag pages list the posts carrying a tag.
pub struct SiteData<'a> {
    config: &'a SiteConfig,
    posts: &'a [PostRecord],
    tags: &'a TagIndex,
    by_slug: HashMap<&'a str, &'a PostRecord>,
}

impl<'a> SiteData<'a> {
    pub fn new(config: &'a SiteConfig, posts: &'a [PostRecord], tags: &'a TagIndex) -> SiteData<'a> {
        SiteData {
            config,
            posts,
            tags,
            by_slug: posts
                .iter()
                .map(|post| (post.metadata.slug.as_str(), post))
                .collect(),
        }
    }

    fn post(&self, slug: &str) -> Result<&'a PostRecord> {
        self.by_slug
            .get(slug)
            .copied()
            .ok_or_else(|| Error::UnknownPost(slug.to_owned()))
    }

    fn home(&self) -> Props {
        Props::new(&self.config.title)
            .with("site", self.site())
            .with("posts", self.summaries(self.posts.iter()))
    }

    fn single(&self, slug: &str) -> Result<Props> {
        let post = self.post(slug)?;
        let tags = post
            .metadata
            .tags
            .iter()
            .map(|tag| self.tag_link(tag))
            .collect();
        Ok(Props::new(&post.metadata.title)
            .with("site", self.site())
            .with("date", Value::String(display_date(&post.metadata.date)))
            .with("datetime", Value::String(escape(&post.metadata.date)))
            .with("body", Value::String(post.body.clone()))
            .with("tags", Value::Array(tags))
            .with(
                "comments",
                Value::String(self.config.comments.as_deref().map(escape).unwrap_or_default()),
            ))
    }

    fn tagged(&self, tag: &str) -> Result<Props> {
        let slugs = self
            .tags
            .get(tag)
            .ok_or_else(|| Error::UnknownTag(tag.to_owned()))?;
        let posts = slugs
            .iter()
            .map(|slug| self.post(slug))
            .collect::<Result<Vec<_>>>()?;
        Ok(Props::new(format!("Posts tagged {}", tag))
            .with("site", self.site())
            .with("tag", Value::String(escape(tag)))
            .with("posts", self.summaries(posts.into_iter())))
    }

    /// Site-wide values shared by every view, mostly for the banner.
    fn site(&self) -> Value {
        let author = &self.config.author;
        let name = match author.name.is_empty() {
            true => &self.config.title,
            false => &author.name,
        };
        let optional = |value: &Option<String>| Value::String(value.as_deref().map(escape).unwrap_or_default());

        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("title".to_owned(), Value::String(escape(&self.config.title)));
        m.insert("rootUrl".to_owned(), Value::String(escape(&self.config.root_url)));
        m.insert("home".to_owned(), Value::String(escape(&self.config.url("/"))));
        m.insert("name".to_owned(), Value::String(escape(name)));
        m.insert("photoUrl".to_owned(), optional(&author.photo_url));
        m.insert("twitter".to_owned(), optional(&author.twitter));
        m.insert("github".to_owned(), optional(&author.github));
        Value::Object(m)
    }

    fn tag_link(&self, tag: &str) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("name".to_owned(), Value::String(escape(tag)));
        m.insert(
            "url".to_owned(),
            Value::String(escape(&self.config.url(Route::tagged(tag).as_str()))),
        );
        Value::Object(m)
    }

    fn summaries<'p, I: Iterator<Item = &'p PostRecord>>(&self, posts: I) -> Value {
        Value::Array(
            posts
                .map(|post| {
                    let (summary, folded) = post.summary();
                    let url = self.config.url(Route::post(&post.metadata.slug).as_str());
                    let mut m: HashMap<String, Value> = HashMap::new();
                    m.insert("title".to_owned(), Value::String(escape(&post.metadata.title)));
                    m.insert("url".to_owned(), Value::String(escape(&url)));
                    m.insert("date".to_owned(), Value::String(display_date(&post.metadata.date)));
                    m.insert("summary".to_owned(), Value::String(summary.to_owned()));
                    m.insert("folded".to_owned(), Value::Bool(folded));
                    Value::Object(m)
                })
                .collect(),
        )
    }
}

impl DataSource for SiteData<'_> {
    fn fetch(&self, route: &Route, matched: &RouteMatch) -> Result<Props> {
        let param = |name: &str| {
            matched
                .params
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| Error::MissingParam {
                    route: route.clone(),
                    name: name.to_owned(),
                })
        };
        match matched.view {
            "home" => Ok(self.home()),
            "post" => self.single(param("slug")?),
            "tagged" => self.tagged(param("tag")?),
            view => Err(Error::UnknownView(view.to_owned())),
        }
    }
}

/// Formats a stored `YYYY-MM-DD` date as e.g. `Mon Jan 01 2024`. The result
/// depends only on the stored date. Dates in any other format are returned
/// unchanged (but escaped).
pub fn display_date(date: &str) -> String {
    let day = date.get(..10).unwrap_or(date);
    match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
        Ok(parsed) => parsed.format("%a %b %d %Y").to_string(),
        Err(_) => escape(date),
    }
}

/// The structured dump of everything a build was made from, written to
/// `data.json` in the output directory.
#[derive(Serialize)]
pub struct Snapshot<'a> {
    pub config: &'a SiteConfig,
    pub posts: &'a [PostRecord],
    pub tags: &'a TagIndex,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failure to supply props for a route.
#[derive(Debug)]
pub enum Error {
    /// Returned when a route names a post that doesn't exist.
    UnknownPost(String),

    /// Returned when a route names a tag no post carries.
    UnknownTag(String),

    /// Returned when the routing table names a view this source has no data
    /// for.
    UnknownView(String),

    /// Returned when a matched route lacks a parameter the view needs.
    MissingParam { route: Route, name: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnknownPost(slug) => write!(f, "no post with slug `{}`", slug),
            Error::UnknownTag(tag) => write!(f, "no posts tagged `{}`", tag),
            Error::UnknownView(view) => write!(f, "no data for view `{}`", view),
            Error::MissingParam { route, name } => {
                write!(f, "route {} has no `{}` parameter", route, name)
            }
        }
    }
}

impl std::error::Error for Error {}
