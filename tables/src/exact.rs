// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Exact-match unit: key bytes to handle via a hash index.

use crate::handle::{Arena, Handle};
use crate::unit::EntryMeta;
use crate::TableError;
use ahash::RandomState;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug)]
struct ExactEntry<T> {
    key: Vec<u8>,
    value: T,
    meta: EntryMeta,
}

/// Exact byte-string match with O(1) expected lookup.
#[derive(Debug)]
pub struct ExactUnit<T> {
    nbytes: usize,
    index: HashMap<Vec<u8>, Handle, RandomState>,
    entries: Arena<ExactEntry<T>>,
}

impl<T> ExactUnit<T> {
    #[must_use]
    pub fn new(nbytes: usize, size: usize) -> Self {
        Self {
            nbytes,
            index: HashMap::with_hasher(RandomState::with_seed(0)),
            entries: Arena::new(size),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn add_entry(&mut self, key: Vec<u8>, value: T, now_ms: u64) -> Result<Handle, TableError> {
        if key.len() != self.nbytes {
            return Err(TableError::BadKeyWidth {
                expected: self.nbytes,
                got: key.len(),
            });
        }
        if self.index.contains_key(&key) {
            return Err(TableError::DuplicateKey);
        }
        let handle = self.entries.insert(ExactEntry {
            key: key.clone(),
            value,
            meta: EntryMeta::new(now_ms),
        })?;
        self.index.insert(key, handle);
        debug!(handle = handle.index(), "exact entry added");
        Ok(handle)
    }

    pub fn delete_entry(&mut self, h: Handle) -> Result<T, TableError> {
        let entry = self.entries.remove(h)?;
        self.index.remove(&entry.key);
        Ok(entry.value)
    }

    pub fn modify_entry(&mut self, h: Handle, value: T) -> Result<(), TableError> {
        self.entries.get_mut(h)?.value = value;
        Ok(())
    }

    pub fn value(&self, h: Handle) -> Result<&T, TableError> {
        self.entries.get(h).map(|e| &e.value)
    }

    pub fn meta(&self, h: Handle) -> Result<&EntryMeta, TableError> {
        self.entries.get(h).map(|e| &e.meta)
    }

    #[must_use]
    pub fn lookup(&self, key: &[u8], now_ms: u64) -> Option<(Handle, &T)> {
        let handle = *self.index.get(key)?;
        let entry = self.entries.get(handle).ok()?;
        entry.meta.hit(now_ms);
        Some((handle, &entry.value))
    }

    #[must_use]
    pub fn sweep_expired(&self, now_ms: u64) -> Vec<Handle> {
        self.entries
            .iter()
            .filter(|(_, e)| e.meta.is_expired(now_ms))
            .map(|(h, _)| h)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut unit = ExactUnit::new(2, 8);
        unit.add_entry(vec![1, 2], "a", 0).unwrap();
        assert_eq!(
            unit.add_entry(vec![1, 2], "b", 0),
            Err(TableError::DuplicateKey)
        );
        assert_eq!(unit.len(), 1);
    }

    #[test]
    fn lookup_hits_and_misses() {
        let mut unit = ExactUnit::new(2, 8);
        let h = unit.add_entry(vec![1, 2], "a", 0).unwrap();
        assert_eq!(unit.lookup(&[1, 2], 5), Some((h, &"a")));
        assert_eq!(unit.meta(h).unwrap().hits(), 1);
        assert_eq!(unit.meta(h).unwrap().last_hit_ms(), 5);
        assert!(unit.lookup(&[1, 3], 5).is_none());
    }

    #[test]
    fn stale_handle_after_slot_reuse() {
        let mut unit = ExactUnit::new(1, 4);
        let old = unit.add_entry(vec![1], "old", 0).unwrap();
        unit.delete_entry(old).unwrap();
        let new = unit.add_entry(vec![2], "new", 0).unwrap();
        assert_eq!(old.index(), new.index());
        assert_eq!(unit.modify_entry(old, "evil"), Err(TableError::InvalidHandle));
        assert_eq!(unit.value(old), Err(TableError::InvalidHandle));
        assert_eq!(unit.value(new), Ok(&"new"));
    }

    #[test]
    fn deleted_key_no_longer_matches() {
        let mut unit = ExactUnit::new(1, 4);
        let h = unit.add_entry(vec![9], "x", 0).unwrap();
        unit.delete_entry(h).unwrap();
        assert!(unit.lookup(&[9], 0).is_none());
    }

    #[test]
    fn failed_add_leaves_unit_untouched() {
        let mut unit = ExactUnit::new(2, 1);
        unit.add_entry(vec![1, 2], "a", 0).unwrap();
        assert_eq!(
            unit.add_entry(vec![3, 4], "b", 0),
            Err(TableError::TableFull)
        );
        assert_eq!(
            unit.add_entry(vec![5], "c", 0),
            Err(TableError::BadKeyWidth {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(unit.len(), 1);
        assert!(unit.lookup(&[1, 2], 0).is_some());
    }

    #[test]
    fn sweep_returns_only_idle_entries() {
        let mut unit = ExactUnit::new(1, 4);
        let a = unit.add_entry(vec![1], "a", 0).unwrap();
        let b = unit.add_entry(vec![2], "b", 0).unwrap();
        unit.meta(a).unwrap().set_ttl_ms(50);
        unit.meta(b).unwrap().set_ttl_ms(50);
        let _ = unit.lookup(&[2], 100); // refresh b
        assert_eq!(unit.sweep_expired(120), vec![a]);
    }
}
