// SPDX-FileCopyrightText: 2026 Archy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded, insertion-ordered set of content hashes.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

/// FIFO set of SHA-256 hex digests with oldest-first eviction.
///
/// Serialized as a plain JSON array, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SeenSet {
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl SeenSet {
    pub fn contains(&self, hash: &str) -> bool {
        self.index.contains(hash)
    }

    /// Insert `hash` unless present, then evict down to `capacity`.
    ///
    /// Returns `true` if the hash was newly inserted.
    pub fn insert(&mut self, hash: String, capacity: usize) -> bool {
        if self.index.contains(&hash) {
            return false;
        }
        self.index.insert(hash.clone());
        self.order.push_back(hash);
        self.bound(capacity);
        true
    }

    /// Evict oldest entries until at most `capacity` remain.
    pub fn bound(&mut self, capacity: usize) {
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Hashes from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for SeenSet {
    fn from(hashes: Vec<String>) -> Self {
        let mut set = SeenSet::default();
        for hash in hashes {
            set.insert(hash, usize::MAX);
        }
        set
    }
}

impl From<SeenSet> for Vec<String> {
    fn from(set: SeenSet) -> Self {
        set.order.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_first() {
        let mut set = SeenSet::default();
        for h in ["a", "b", "c"] {
            set.insert(h.to_string(), 2);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(!set.contains("a"));
    }

    #[test]
    fn duplicate_insert_is_noop() {
        let mut set = SeenSet::default();
        assert!(set.insert("a".into(), 10));
        assert!(!set.insert("a".into(), 10));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn deserializes_from_list_dropping_duplicates() {
        let set: SeenSet = serde_json::from_str(r#"["x","y","x"]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["x","y"]"#);
    }

    #[test]
    fn bound_shrinks_to_capacity() {
        let mut set: SeenSet = vec!["1".to_string(), "2".into(), "3".into()].into();
        set.bound(1);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["3"]);
        set.bound(0);
        assert!(set.is_empty());
    }
}
