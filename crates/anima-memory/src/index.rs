//! Secondary indices shared by both stores.
//!
//! An [`AssociationIndex`] maps a normalised string key (emotion tag, concept
//! label, calendar-day bucket, source name) to the set of primary ids filed
//! under it, so that keyed lookups cost O(matches) instead of a full scan.
//!
//! Indices are always derived from the primary store: they are rebuilt on
//! import and never serialised.
//!
//! ```rust
//! use anima_memory::index::AssociationIndex;
//!
//! let mut by_tag: AssociationIndex<u32> = AssociationIndex::new();
//! by_tag.insert(" Joy ", 1);
//! by_tag.insert("joy", 2);
//! assert_eq!(by_tag.count("JOY"), 2);
//!
//! by_tag.remove("joy", &1);
//! by_tag.remove("joy", &2);
//! assert!(by_tag.is_empty());
//! ```

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Canonical form of every index key: trimmed and lower-cased.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// Split free text into distinct lower-cased tokens, in first-seen order.
///
/// Splits on whitespace and punctuation only, so unsegmented scripts (e.g.
/// Japanese) yield whole runs that are then matched by substring.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for raw in text.split(|c: char| c.is_whitespace() || (c.is_ascii_punctuation() && c != '_')) {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
        if !token.is_empty() && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

/// Many-to-many index from a normalised string key to primary ids.
#[derive(Debug, Clone)]
pub struct AssociationIndex<K> {
    entries: HashMap<String, HashSet<K>>,
}

impl<K: Eq + Hash + Copy> AssociationIndex<K> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// File `id` under `key`.  Blank keys are ignored.
    pub fn insert(&mut self, key: &str, id: K) {
        let key = normalize_key(key);
        if key.is_empty() {
            return;
        }
        self.entries.entry(key).or_default().insert(id);
    }

    /// Remove `id` from `key`, dropping the key once it has no ids left.
    pub fn remove(&mut self, key: &str, id: &K) {
        let key = normalize_key(key);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Ids filed under `key`, in unspecified order.
    pub fn get(&self, key: &str) -> Vec<K> {
        self.entries
            .get(&normalize_key(key))
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// `true` when `id` is filed under `key`.
    pub fn contains(&self, key: &str, id: &K) -> bool {
        self.entries
            .get(&normalize_key(key))
            .is_some_and(|ids| ids.contains(id))
    }

    /// Number of ids filed under `key`.
    pub fn count(&self, key: &str) -> usize {
        self.entries.get(&normalize_key(key)).map_or(0, HashSet::len)
    }

    /// All keys currently holding at least one id.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Eq + Hash + Copy> Default for AssociationIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}
