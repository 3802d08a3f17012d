// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Match-action table nodes.
//!
//! A table node builds its key from the PHV, looks it up in the configured
//! match unit under the table's shared lock, executes the resolved action and
//! returns the next node configured for that action. Control-plane mutation
//! takes the exclusive lock of this table only; lookups from concurrent
//! packets share it.

use crate::action::{ActionFn, ActionId};
use crate::graph::NodeId;
use crate::packet::Packet;
use crate::runtime::RuntimeEnv;
use ahash::RandomState;
use num_bigint::BigUint;
use parking_lot::RwLock;
use phv::{KeySpec, Phv};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use tables::{AnyMatchUnit, EntryKey, Handle, IndirectIndex, IndirectSpace, MatchKind, TableError};
use tracing::{debug, trace};

/// An action reference plus its install-time data; what a lookup resolves to.
#[derive(Debug, Clone)]
pub struct ActionEntry {
    pub action: Arc<ActionFn>,
    pub data: Arc<Vec<BigUint>>,
}

impl ActionEntry {
    /// Rejects action data whose length does not match the action's declared
    /// slot count.
    pub fn new(action: Arc<ActionFn>, data: Vec<BigUint>) -> Result<Self, TableError> {
        if data.len() != action.num_action_data() {
            return Err(TableError::BadActionData);
        }
        Ok(Self {
            action,
            data: Arc::new(data),
        })
    }
}

enum TableState {
    Direct {
        unit: AnyMatchUnit<ActionEntry>,
        default: Option<ActionEntry>,
    },
    Indirect {
        unit: AnyMatchUnit<IndirectIndex>,
        space: IndirectSpace<ActionEntry>,
        default: Option<IndirectIndex>,
        selector: Option<KeySpec>,
    },
}

/// Lookup/hit statistics, updated lock-free on the data path.
#[derive(Debug, Default)]
pub struct TableCounters {
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl TableCounters {
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits.load(std::sync::atomic::Ordering::Relaxed)
    }

    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses.load(std::sync::atomic::Ordering::Relaxed)
    }
}

const SELECTOR_SEED: usize = 0x00c0_ffee;

/// A match-action table and its control-plane surface.
pub struct MatchTable {
    name: String,
    key: KeySpec,
    state: RwLock<TableState>,
    counters: TableCounters,
    next_by_action: HashMap<u32, Option<NodeId>, RandomState>,
    default_next: Option<NodeId>,
    selector_hasher: RandomState,
}

impl MatchTable {
    /// A table whose entries bind actions directly.
    #[must_use]
    pub fn new_direct(
        name: impl Into<String>,
        key: KeySpec,
        kind: MatchKind,
        key_nbytes: usize,
        size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            state: RwLock::new(TableState::Direct {
                unit: AnyMatchUnit::new(kind, key_nbytes, size),
                default: None,
            }),
            counters: TableCounters::default(),
            next_by_action: HashMap::default(),
            default_next: None,
            selector_hasher: RandomState::with_seed(SELECTOR_SEED),
        }
    }

    /// A table whose entries reference shared members or selector groups.
    #[must_use]
    pub fn new_indirect(
        name: impl Into<String>,
        key: KeySpec,
        kind: MatchKind,
        key_nbytes: usize,
        size: usize,
        max_members: usize,
        max_groups: usize,
        selector: Option<KeySpec>,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            state: RwLock::new(TableState::Indirect {
                unit: AnyMatchUnit::new(kind, key_nbytes, size),
                space: IndirectSpace::new(max_members, max_groups),
                default: None,
                selector,
            }),
            counters: TableCounters::default(),
            next_by_action: HashMap::default(),
            default_next: None,
            selector_hasher: RandomState::with_seed(SELECTOR_SEED),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn counters(&self) -> &TableCounters {
        &self.counters
    }

    /// Routes packets whose resolved action is `action` to `next`.
    pub fn set_next_for_action(&mut self, action: ActionId, next: Option<NodeId>) {
        self.next_by_action.insert(action.0, next);
    }

    /// Fallback next node for actions without an explicit route (and the only
    /// route out of a default entry not otherwise mapped).
    pub fn set_default_next(&mut self, next: Option<NodeId>) {
        self.default_next = next;
    }

    fn next_for(&self, action: ActionId) -> Option<NodeId> {
        self.next_by_action
            .get(&action.0)
            .copied()
            .unwrap_or(self.default_next)
    }

    /// Looks the packet up and executes the resolved action.
    ///
    /// Returns the next node, or `None` when the pipeline ends here — either
    /// by configuration or because the packet missed with no default entry
    /// (a normal drop, not an error).
    pub fn apply(&self, pkt: &mut Packet, env: &RuntimeEnv) -> Option<NodeId> {
        let mut key = Vec::new();
        self.key.build(pkt.phv(), &mut key);
        let now_ms = pkt.ingress().arrival_us / 1000;

        let resolved: Option<ActionEntry> = {
            let state = self.state.read();
            match &*state {
                TableState::Direct { unit, default } => unit
                    .lookup(&key, now_ms)
                    .map(|(_, entry)| entry.clone())
                    .or_else(|| default.clone()),
                TableState::Indirect {
                    unit,
                    space,
                    default,
                    selector,
                } => {
                    let index = unit
                        .lookup(&key, now_ms)
                        .map(|(_, index)| *index)
                        .or(*default);
                    index.and_then(|index| {
                        let hash = self.selector_hash(selector.as_ref(), pkt.phv());
                        match space.resolve(index, hash) {
                            Ok(member) => space.member_value(member).ok().cloned(),
                            Err(e) => {
                                debug!(table = %self.name, error = %e, "indirect resolution failed");
                                None
                            }
                        }
                    })
                }
            }
        };

        match resolved {
            Some(entry) => {
                self.counters
                    .hits
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                trace!(table = %self.name, action = %entry.action.name(), "table hit");
                entry.action.execute(pkt, &entry.data, env);
                if pkt.exit_requested() {
                    return None;
                }
                self.next_for(entry.action.id())
            }
            None => {
                self.counters
                    .misses
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                trace!(table = %self.name, "miss with no default entry");
                None
            }
        }
    }

    fn selector_hash(&self, selector: Option<&KeySpec>, phv: &Phv) -> u64 {
        selector.map_or(0, |spec| {
            let bytes = spec.key_bytes(phv);
            self.selector_hasher.hash_one(&bytes)
        })
    }

    // --- control plane: direct tables ---

    pub fn add_entry(
        &self,
        key: EntryKey,
        action: Arc<ActionFn>,
        data: Vec<BigUint>,
        now_ms: u64,
    ) -> Result<Handle, TableError> {
        let entry = ActionEntry::new(action, data)?;
        let mut state = self.state.write();
        match &mut *state {
            TableState::Direct { unit, .. } => {
                let handle = unit.add(key, entry, now_ms)?;
                debug!(table = %self.name, handle = handle.index(), "entry added");
                Ok(handle)
            }
            TableState::Indirect { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn modify_entry(
        &self,
        handle: Handle,
        action: Arc<ActionFn>,
        data: Vec<BigUint>,
    ) -> Result<(), TableError> {
        let entry = ActionEntry::new(action, data)?;
        let mut state = self.state.write();
        match &mut *state {
            TableState::Direct { unit, .. } => unit.modify(handle, entry),
            TableState::Indirect { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn delete_entry(&self, handle: Handle) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Direct { unit, .. } => {
                unit.delete(handle)?;
                debug!(table = %self.name, handle = handle.index(), "entry deleted");
                Ok(())
            }
            TableState::Indirect { unit, space, .. } => {
                let index = unit.delete(handle)?;
                let _ = space.detach(index);
                Ok(())
            }
        }
    }

    pub fn set_default_action(
        &self,
        action: Arc<ActionFn>,
        data: Vec<BigUint>,
    ) -> Result<(), TableError> {
        let entry = ActionEntry::new(action, data)?;
        let mut state = self.state.write();
        match &mut *state {
            TableState::Direct { default, .. } => {
                *default = Some(entry);
                Ok(())
            }
            TableState::Indirect { .. } => Err(TableError::WrongTableKind),
        }
    }

    // --- control plane: indirect tables ---

    pub fn add_member(
        &self,
        action: Arc<ActionFn>,
        data: Vec<BigUint>,
    ) -> Result<Handle, TableError> {
        let entry = ActionEntry::new(action, data)?;
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.add_member(entry),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn modify_member(
        &self,
        member: Handle,
        action: Arc<ActionFn>,
        data: Vec<BigUint>,
    ) -> Result<(), TableError> {
        let entry = ActionEntry::new(action, data)?;
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.modify_member(member, entry),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn delete_member(&self, member: Handle) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.delete_member(member).map(|_| ()),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn create_group(&self) -> Result<Handle, TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.create_group(),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn delete_group(&self, group: Handle) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.delete_group(group),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn add_member_to_group(&self, member: Handle, group: Handle) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.add_member_to_group(member, group),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    pub fn remove_member_from_group(
        &self,
        member: Handle,
        group: Handle,
    ) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, .. } => space.remove_member_from_group(member, group),
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    /// Installs an entry resolving to a member or group.
    pub fn add_indirect_entry(
        &self,
        key: EntryKey,
        index: IndirectIndex,
        now_ms: u64,
    ) -> Result<Handle, TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { unit, space, .. } => {
                space.attach(index)?;
                match unit.add(key, index, now_ms) {
                    Ok(handle) => Ok(handle),
                    Err(e) => {
                        // keep the add atomic: release the pin we just took
                        let _ = space.detach(index);
                        Err(e)
                    }
                }
            }
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    /// Default member or group applied on a miss.
    pub fn set_default_index(&self, index: IndirectIndex) -> Result<(), TableError> {
        let mut state = self.state.write();
        match &mut *state {
            TableState::Indirect { space, default, .. } => {
                space.attach(index)?;
                if let Some(previous) = default.take() {
                    let _ = space.detach(previous);
                }
                *default = Some(index);
                Ok(())
            }
            TableState::Direct { .. } => Err(TableError::WrongTableKind),
        }
    }

    // --- control plane: shared ---

    /// Sets the idle timeout of one entry; zero disables expiry.
    pub fn set_entry_ttl(&self, handle: Handle, ttl_ms: u64) -> Result<(), TableError> {
        let state = self.state.read();
        match &*state {
            TableState::Direct { unit, .. } => unit.meta(handle)?.set_ttl_ms(ttl_ms),
            TableState::Indirect { unit, .. } => unit.meta(handle)?.set_ttl_ms(ttl_ms),
        }
        Ok(())
    }

    /// Handles of entries idle past their TTL, for control-plane expiry.
    #[must_use]
    pub fn sweep_expired(&self, now_ms: u64) -> Vec<Handle> {
        let state = self.state.read();
        match &*state {
            TableState::Direct { unit, .. } => unit.sweep_expired(now_ms),
            TableState::Indirect { unit, .. } => unit.sweep_expired(now_ms),
        }
    }

    pub fn entry_hits(&self, handle: Handle) -> Result<u64, TableError> {
        let state = self.state.read();
        match &*state {
            TableState::Direct { unit, .. } => Ok(unit.meta(handle)?.hits()),
            TableState::Indirect { unit, .. } => Ok(unit.meta(handle)?.hits()),
        }
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        let state = self.state.read();
        match &*state {
            TableState::Direct { unit, .. } => unit.len(),
            TableState::Indirect { unit, .. } => unit.len(),
        }
    }
}

impl std::fmt::Debug for MatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchTable")
            .field("name", &self.name)
            .field("entries", &self.entry_count())
            .finish_non_exhaustive()
    }
}
