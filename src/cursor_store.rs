use std::collections::HashSet;

use rand::seq::IteratorRandom;

/// Bounded set of continuation tokens seen during collection.
///
/// INVARIANTS:
/// - Never holds more than `capacity` tokens
/// - Saturates instead of evicting: once full, new tokens are ignored
/// - Append-only for the lifetime of the process
///
/// Owned by the single collection task, so no locking is needed.
#[derive(Debug, Clone)]
pub struct CursorStore {
    tokens: HashSet<String>,
    capacity: usize,
}

pub const DEFAULT_CAPACITY: usize = 5000;

impl Default for CursorStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl CursorStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tokens: HashSet::new(),
            capacity,
        }
    }

    /// Inserts `token` if capacity remains. Returns true if it was new.
    pub fn record(&mut self, token: &str) -> bool {
        if token.is_empty() || self.tokens.len() >= self.capacity {
            return false;
        }
        self.tokens.insert(token.to_string())
    }

    /// Up to `n` distinct tokens chosen uniformly at random.
    pub fn sample(&self, n: usize) -> Vec<String> {
        self.tokens
            .iter()
            .choose_multiple(&mut rand::rng(), n)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn size(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturates_at_capacity() {
        let mut store = CursorStore::with_capacity(3);
        for i in 0..10 {
            store.record(&format!("c{}", i));
        }
        assert_eq!(store.size(), 3);
        assert!(!store.record("late"));
        assert_eq!(store.size(), 3);
    }

    #[test]
    fn test_duplicates_deduplicated() {
        let mut store = CursorStore::with_capacity(10);
        assert!(store.record("a"));
        assert!(!store.record("a"));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn test_empty_token_ignored() {
        let mut store = CursorStore::default();
        assert!(!store.record(""));
        assert!(store.is_empty());
        assert_eq!(store.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_sample_empty_store() {
        let store = CursorStore::default();
        assert!(store.sample(5).is_empty());
    }

    #[test]
    fn test_sample_bounded_and_distinct() {
        let mut store = CursorStore::with_capacity(100);
        for i in 0..20 {
            store.record(&format!("c{}", i));
        }

        let picked = store.sample(7);
        assert_eq!(picked.len(), 7);
        let distinct: HashSet<&String> = picked.iter().collect();
        assert_eq!(distinct.len(), 7);

        assert_eq!(store.sample(50).len(), 20);
        assert!(store.sample(0).is_empty());
    }
}
