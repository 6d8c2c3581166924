//! Defines [`Route`], the enumeration of the routes a site consists of, and
//! the routing table that maps each route onto a view.

use crate::post::PostRecord;
use crate::tag::TagIndex;
use std::collections::BTreeMap;
use std::fmt;

/// A logical site path such as `/`, `/posts/{slug}` or `/posts/tagged/{tag}`.
/// Routes are plain values; two routes are equal when their paths are.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Route(String);

impl Route {
    pub fn new<S: Into<String>>(path: S) -> Route {
        Route(path.into())
    }

    /// The home route, `/`.
    pub fn home() -> Route {
        Route::new("/")
    }

    /// The route for a single post, `/posts/{slug}`.
    pub fn post(slug: &str) -> Route {
        Route(format!("/posts/{}", slug))
    }

    /// The route for the listing of posts tagged `tag`, `/posts/tagged/{tag}`.
    pub fn tagged(tag: &str) -> Route {
        Route(format!("/posts/tagged/{}", tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Returns every route of the site: the home route, then one route per post
/// in the order of `posts` (which is sorted by date, most recent first), then
/// one route per tag in the iteration order of `tags`.
pub fn enumerate(posts: &[PostRecord], tags: &TagIndex) -> Vec<Route> {
    let mut routes = Vec::with_capacity(1 + posts.len() + tags.len());
    routes.push(Route::home());
    routes.extend(posts.iter().map(|post| Route::post(&post.metadata.slug)));
    routes.extend(tags.tags().map(Route::tagged));
    routes
}

/// The parameters captured from a route by a [`Rule`] pattern, keyed by
/// parameter name (without the leading `:`).
pub type Params = BTreeMap<String, String>;

/// One entry in the routing table: a pattern such as `/posts/:slug` and the
/// name of the view that renders matching routes.
#[derive(Clone, Debug)]
pub struct Rule {
    pub pattern: &'static str,
    pub view: &'static str,
}

impl Rule {
    fn matches(&self, route: &Route) -> Option<Params> {
        let mut params = Params::new();
        let mut segments = route.segments();
        for pattern in self.pattern.split('/').filter(|s| !s.is_empty()) {
            let segment = segments.next()?;
            if let Some(name) = pattern.strip_prefix(':') {
                params.insert(name.to_owned(), segment.to_owned());
            } else if pattern != segment {
                return None;
            }
        }
        match segments.next() {
            Some(_) => None,
            None => Some(params),
        }
    }
}

/// The outcome of matching a [`Route`] against a [`Router`].
#[derive(Clone, Debug, PartialEq)]
pub struct RouteMatch {
    /// The name of the view that renders the route.
    pub view: &'static str,

    pub params: Params,
}

/// The routing table. Rules are tried in order and the first match wins.
#[derive(Clone, Debug)]
pub struct Router {
    rules: Vec<Rule>,
}

impl Router {
    pub fn new(rules: Vec<Rule>) -> Router {
        Router { rules }
    }

    /// Matches `route` against the table, returning `None` for routes no rule
    /// understands.
    pub fn matches(&self, route: &Route) -> Option<RouteMatch> {
        self.rules.iter().find_map(|rule| {
            rule.matches(route).map(|params| RouteMatch {
                view: rule.view,
                params,
            })
        })
    }

    /// The names of all views the table can route to.
    pub fn views(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.view)
    }
}

impl Default for Router {
    /// The routing table for the routes produced by [`enumerate`].
    fn default() -> Router {
        Router::new(vec![
            Rule {
                pattern: "/",
                view: "home",
            },
            Rule {
                pattern: "/posts/tagged/:tag",
                view: "tagged",
            },
            Rule {
                pattern: "/posts/:slug",
                view: "post",
            },
        ])
    }
}
