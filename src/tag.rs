//! Defines the [`TagIndex`] type, which maps each tag to the posts carrying
//! it.

use crate::post::PostRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Maps tag names to the slugs of the posts bearing that tag. Tags iterate in
/// lexicographical order and each tag's slugs keep the order of the post
/// list they were built from, so the index is deterministic for a given
/// input. Every tag in the index has at least one post.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TagIndex(BTreeMap<String, Vec<String>>);

impl TagIndex {
    /// Builds the index from a list of posts. Total over any input, including
    /// an empty list.
    pub fn build(posts: &[PostRecord]) -> TagIndex {
        let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for post in posts {
            for tag in &post.metadata.tags {
                tags.entry(tag.clone())
                    .or_default()
                    .push(post.metadata.slug.clone());
            }
        }
        TagIndex(tags)
    }

    /// The slugs of the posts carrying `tag`, if any post does.
    pub fn get(&self, tag: &str) -> Option<&[String]> {
        self.0.get(tag).map(Vec::as_slice)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
