//! The library code for the `ogham` static site generator. A build turns a
//! site directory (a `_config.yml`, a `_posts/` directory of markdown files,
//! and optionally `components/` and `assets/`) into a directory of
//! pre-rendered HTML pages. The architecture can be broken down into these
//! steps:
//!
//! 1. Loading the config ([`crate::config`]) and parsing the posts
//!    ([`crate::post`]), from which the tag index is derived
//!    ([`crate::tag`])
//! 2. Enumerating the routes of the site ([`crate::route`]): the home page,
//!    one page per post and one page per tag
//! 3. Resolving the views that render those routes ([`crate::component`]),
//!    looking in the site's `components/` directory before the built-in views
//! 4. Clearing the output directory and rendering every route into it
//!    ([`crate::render`], [`crate::output`]) while the theme, client bundles
//!    and assets are copied alongside
//!
//! Routes are independent of each other, so step 4 runs on a pool of worker
//! threads. [`crate::build`] ties the steps together.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod component;
pub mod config;
pub mod data;
pub mod markdown;
pub mod output;
pub mod post;
pub mod render;
pub mod route;
pub mod tag;
