// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The shared match-unit contract.

use crate::exact::ExactUnit;
use crate::lpm::LpmUnit;
use crate::ternary::TernaryUnit;
use crate::{Handle, TableError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Which lookup algorithm a table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    Exact,
    Lpm,
    Ternary,
}

/// Control-plane form of an entry's key, one variant per match kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKey {
    Exact {
        key: Vec<u8>,
    },
    Lpm {
        key: Vec<u8>,
        prefix_len: u32,
    },
    Ternary {
        key: Vec<u8>,
        mask: Vec<u8>,
        priority: u32,
    },
}

/// Per-entry bookkeeping: hit counter, last-hit timestamp and optional TTL.
///
/// Timestamps are milliseconds on the caller's clock (the packet arrival
/// clock on the data plane). Hit updates happen under the table's shared
/// lock, hence the atomics.
#[derive(Debug, Default)]
pub struct EntryMeta {
    hits: AtomicU64,
    last_hit_ms: AtomicU64,
    ttl_ms: AtomicU64,
}

impl EntryMeta {
    #[must_use]
    pub fn new(now_ms: u64) -> Self {
        Self {
            hits: AtomicU64::new(0),
            last_hit_ms: AtomicU64::new(now_ms),
            ttl_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn hit(&self, now_ms: u64) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.last_hit_ms.store(now_ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_hit_ms(&self) -> u64 {
        self.last_hit_ms.load(Ordering::Relaxed)
    }

    /// Sets the idle timeout; zero disables expiry.
    pub fn set_ttl_ms(&self, ttl_ms: u64) {
        self.ttl_ms.store(ttl_ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        let ttl = self.ttl_ms();
        ttl != 0 && now_ms.saturating_sub(self.last_hit_ms()) > ttl
    }
}

/// A match unit of any kind, presenting the shared contract.
#[derive(Debug)]
pub enum AnyMatchUnit<T> {
    Exact(ExactUnit<T>),
    Lpm(LpmUnit<T>),
    Ternary(TernaryUnit<T>),
}

impl<T> AnyMatchUnit<T> {
    /// A unit of `kind` for `nbytes`-wide keys holding at most `size` entries.
    #[must_use]
    pub fn new(kind: MatchKind, nbytes: usize, size: usize) -> Self {
        match kind {
            MatchKind::Exact => Self::Exact(ExactUnit::new(nbytes, size)),
            MatchKind::Lpm => Self::Lpm(LpmUnit::new(nbytes, size)),
            MatchKind::Ternary => Self::Ternary(TernaryUnit::new(nbytes, size)),
        }
    }

    #[must_use]
    pub fn match_kind(&self) -> MatchKind {
        match self {
            Self::Exact(_) => MatchKind::Exact,
            Self::Lpm(_) => MatchKind::Lpm,
            Self::Ternary(_) => MatchKind::Ternary,
        }
    }

    /// Installs an entry; the key variant must match the unit's kind.
    pub fn add(&mut self, key: EntryKey, value: T, now_ms: u64) -> Result<Handle, TableError> {
        match (self, key) {
            (Self::Exact(u), EntryKey::Exact { key }) => u.add_entry(key, value, now_ms),
            (Self::Lpm(u), EntryKey::Lpm { key, prefix_len }) => {
                u.add_entry(key, prefix_len, value, now_ms)
            }
            (
                Self::Ternary(u),
                EntryKey::Ternary {
                    key,
                    mask,
                    priority,
                },
            ) => u.add_entry(key, mask, priority, value, now_ms),
            _ => Err(TableError::KeyKindMismatch),
        }
    }

    /// Looks the key up, stamping the matched entry's hit state.
    #[must_use]
    pub fn lookup(&self, key: &[u8], now_ms: u64) -> Option<(Handle, &T)> {
        match self {
            Self::Exact(u) => u.lookup(key, now_ms),
            Self::Lpm(u) => u.lookup(key, now_ms),
            Self::Ternary(u) => u.lookup(key, now_ms),
        }
    }

    pub fn delete(&mut self, h: Handle) -> Result<T, TableError> {
        match self {
            Self::Exact(u) => u.delete_entry(h),
            Self::Lpm(u) => u.delete_entry(h),
            Self::Ternary(u) => u.delete_entry(h),
        }
    }

    pub fn modify(&mut self, h: Handle, value: T) -> Result<(), TableError> {
        match self {
            Self::Exact(u) => u.modify_entry(h, value),
            Self::Lpm(u) => u.modify_entry(h, value),
            Self::Ternary(u) => u.modify_entry(h, value),
        }
    }

    pub fn get(&self, h: Handle) -> Result<&T, TableError> {
        match self {
            Self::Exact(u) => u.value(h),
            Self::Lpm(u) => u.value(h),
            Self::Ternary(u) => u.value(h),
        }
    }

    pub fn meta(&self, h: Handle) -> Result<&EntryMeta, TableError> {
        match self {
            Self::Exact(u) => u.meta(h),
            Self::Lpm(u) => u.meta(h),
            Self::Ternary(u) => u.meta(h),
        }
    }

    /// Handles of entries idle past their TTL.
    #[must_use]
    pub fn sweep_expired(&self, now_ms: u64) -> Vec<Handle> {
        match self {
            Self::Exact(u) => u.sweep_expired(now_ms),
            Self::Lpm(u) => u.sweep_expired(now_ms),
            Self::Ternary(u) => u.sweep_expired(now_ms),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Exact(u) => u.len(),
            Self::Lpm(u) => u.len(),
            Self::Ternary(u) => u.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
