// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ternary match unit.
//!
//! Entries carry an arbitrary bit mask and a priority; lookup scans live
//! entries and the numerically smallest priority wins among the matches.
//! Priority ties between two entries that can match the same key are a
//! configuration error; the runtime does not order them.

use crate::handle::{Arena, Handle};
use crate::unit::EntryMeta;
use crate::TableError;
use tracing::debug;

#[derive(Debug)]
struct TernaryEntry<T> {
    key: Vec<u8>,
    mask: Vec<u8>,
    priority: u32,
    value: T,
    meta: EntryMeta,
}

impl<T> TernaryEntry<T> {
    fn matches(&self, input: &[u8]) -> bool {
        self.key
            .iter()
            .zip(&self.mask)
            .zip(input)
            .all(|((k, m), i)| i & m == *k)
    }
}

/// Masked match with smallest-priority-wins resolution.
#[derive(Debug)]
pub struct TernaryUnit<T> {
    nbytes: usize,
    entries: Arena<TernaryEntry<T>>,
}

impl<T> TernaryUnit<T> {
    #[must_use]
    pub fn new(nbytes: usize, size: usize) -> Self {
        Self {
            nbytes,
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

    pub fn add_entry(
        &mut self,
        mut key: Vec<u8>,
        mask: Vec<u8>,
        priority: u32,
        value: T,
        now_ms: u64,
    ) -> Result<Handle, TableError> {
        if key.len() != self.nbytes {
            return Err(TableError::BadKeyWidth {
                expected: self.nbytes,
                got: key.len(),
            });
        }
        if mask.len() != self.nbytes {
            return Err(TableError::BadKeyWidth {
                expected: self.nbytes,
                got: mask.len(),
            });
        }
        for (k, m) in key.iter_mut().zip(&mask) {
            *k &= m;
        }
        let duplicate = self.entries.iter().any(|(_, e)| {
            e.priority == priority && e.key == key && e.mask == mask
        });
        if duplicate {
            return Err(TableError::DuplicateKey);
        }
        let handle = self.entries.insert(TernaryEntry {
            key,
            mask,
            priority,
            value,
            meta: EntryMeta::new(now_ms),
        })?;
        debug!(handle = handle.index(), priority, "ternary entry added");
        Ok(handle)
    }

    pub fn delete_entry(&mut self, h: Handle) -> Result<T, TableError> {
        self.entries.remove(h).map(|e| e.value)
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

    /// Returns the matching entry with the smallest priority value.
    #[must_use]
    pub fn lookup(&self, key: &[u8], now_ms: u64) -> Option<(Handle, &T)> {
        if key.len() != self.nbytes {
            return None;
        }
        let mut best: Option<(Handle, &TernaryEntry<T>)> = None;
        for (h, e) in self.entries.iter() {
            if e.matches(key) && best.as_ref().is_none_or(|(_, b)| e.priority < b.priority) {
                best = Some((h, e));
            }
        }
        let (handle, entry) = best?;
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
    fn smallest_priority_wins() {
        let mut unit = TernaryUnit::new(2, 8);
        let _wide = unit
            .add_entry(vec![0x0a, 0x00], vec![0xff, 0x00], 10, "wide", 0)
            .unwrap();
        let narrow = unit
            .add_entry(vec![0x0a, 0x01], vec![0xff, 0xff], 1, "narrow", 0)
            .unwrap();
        assert_eq!(unit.lookup(&[0x0a, 0x01], 0), Some((narrow, &"narrow")));
    }

    #[test]
    fn falls_back_to_remaining_match() {
        let mut unit = TernaryUnit::new(2, 8);
        let wide = unit
            .add_entry(vec![0x0a, 0x00], vec![0xff, 0x00], 10, "wide", 0)
            .unwrap();
        unit.add_entry(vec![0x0a, 0x01], vec![0xff, 0xff], 1, "narrow", 0)
            .unwrap();
        assert_eq!(unit.lookup(&[0x0a, 0x02], 0), Some((wide, &"wide")));
        assert!(unit.lookup(&[0x0b, 0x01], 0).is_none());
    }

    #[test]
    fn keys_are_premasked() {
        let mut unit = TernaryUnit::new(2, 8);
        unit.add_entry(vec![0x0a, 0x77], vec![0xff, 0x00], 1, "a", 0)
            .unwrap();
        // masked to the same (key, mask, priority)
        assert_eq!(
            unit.add_entry(vec![0x0a, 0x99], vec![0xff, 0x00], 1, "b", 0),
            Err(TableError::DuplicateKey)
        );
        // same masked key at a different priority is allowed
        unit.add_entry(vec![0x0a, 0x99], vec![0xff, 0x00], 2, "c", 0)
            .unwrap();
    }

    #[test]
    fn stale_handle_is_rejected() {
        let mut unit = TernaryUnit::new(1, 4);
        let h = unit.add_entry(vec![1], vec![0xff], 1, "a", 0).unwrap();
        unit.delete_entry(h).unwrap();
        let _new = unit.add_entry(vec![2], vec![0xff], 1, "b", 0).unwrap();
        assert_eq!(unit.value(h), Err(TableError::InvalidHandle));
    }
}
