use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Natural key → warehouse surrogate key for one dimension, valid for a
/// single run.
///
/// Inserting an existing key overwrites it, so when two dimension rows share
/// a natural key the one read last wins.
#[derive(Debug, Clone)]
pub struct KeyMap<K> {
    entries: HashMap<K, i64>,
}

impl<K> Default for KeyMap<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> KeyMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the surrogate key that was replaced, if any.
    pub fn insert(&mut self, key: K, surrogate: i64) -> Option<i64> {
        self.entries.insert(key, surrogate)
    }

    pub fn get<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash> FromIterator<(K, i64)> for KeyMap<K> {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, surrogate) in iter {
            map.insert(key, surrogate);
        }
        map
    }
}
