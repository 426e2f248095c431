//! Tag Index Module
//!
//! Secondary index from tag to the set of keys carrying it.

use std::collections::{HashMap, HashSet};

// == Tag Index ==
/// Maps each tag to the keys currently stored under it.
///
/// Owned by [`CacheStore`](super::CacheStore) and only mutated together with
/// the entry map. Empty tag sets are dropped so the index never holds
/// tags without keys.
#[derive(Debug, Default)]
pub struct TagIndex {
    tags: HashMap<String, HashSet<String>>,
}

impl TagIndex {
    // == Constructor ==
    /// Creates an empty tag index.
    pub fn new() -> Self {
        Self::default()
    }

    // == Index ==
    /// Adds `key` to the set of every tag in `tags`.
    pub fn index<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    // == Unindex ==
    /// Removes `key` from the set of every tag in `tags`.
    pub fn unindex<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }

    // == Take ==
    /// Detaches and returns every key indexed under `tag`.
    pub fn take(&mut self, tag: &str) -> HashSet<String> {
        self.tags.remove(tag).unwrap_or_default()
    }

    /// Returns true if `key` is indexed under `tag`.
    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.tags.get(tag).is_some_and(|keys| keys.contains(key))
    }

    /// Number of keys indexed under `tag`.
    pub fn key_count(&self, tag: &str) -> usize {
        self.tags.get(tag).map_or(0, HashSet::len)
    }

    /// Number of distinct tags with at least one key.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true when no tag has any key.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Iterates over `(tag, keys)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HashSet<String>)> {
        self.tags.iter()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.tags.clear();
    }
}
