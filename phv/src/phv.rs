// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The per-packet header workspace and its configuration-scoped pool.

use crate::field::Field;
use crate::header::{Header, HeaderType};
use crate::stack::HeaderStack;
use crate::{FieldRef, HeaderId, StackId};
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::trace;

/// Declaration of one header instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSpec {
    pub name: String,
    pub ty: HeaderType,
    pub metadata: bool,
}

/// Declaration of one header stack; `size` slot headers are materialized as
/// `name[0]` .. `name[size-1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSpec {
    pub name: String,
    pub ty: HeaderType,
    pub size: usize,
}

/// The loader-facing description of a PHV layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhvSpec {
    pub headers: Vec<HeaderSpec>,
    pub stacks: Vec<StackSpec>,
}

impl PhvSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a header and returns its id.
    pub fn add_header(&mut self, name: impl Into<String>, ty: HeaderType, metadata: bool) -> HeaderId {
        let id = HeaderId(u32::try_from(self.headers.len()).unwrap_or(u32::MAX));
        self.headers.push(HeaderSpec {
            name: name.into(),
            ty,
            metadata,
        });
        id
    }

    /// Declares a stack of `size` slots and returns its id.
    ///
    /// Slot headers are appended after all plain headers, so plain header ids
    /// must be allocated before the first stack.
    pub fn add_stack(&mut self, name: impl Into<String>, ty: HeaderType, size: usize) -> StackId {
        let id = StackId(u32::try_from(self.stacks.len()).unwrap_or(u32::MAX));
        self.stacks.push(StackSpec {
            name: name.into(),
            ty,
            size,
        });
        id
    }
}

/// What the pool does to a PHV when the packet returns it.
///
/// `Invalidate` is the default and deliberately preserves field bytes: the
/// semantics of reading an uninitialized header depend on the stale values
/// staying in place. `ZeroMetadata` additionally zeroes metadata fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetPolicy {
    #[default]
    Invalidate,
    ZeroMetadata,
}

/// Owns every header and stack for one packet.
#[derive(Debug)]
pub struct Phv {
    headers: Vec<Header>,
    stacks: Vec<HeaderStack>,
    by_name: HashMap<String, HeaderId, RandomState>,
}

impl Phv {
    fn build(spec: &PhvSpec) -> Self {
        let mut headers = Vec::new();
        let mut by_name: HashMap<String, HeaderId, RandomState> = HashMap::default();
        for h in &spec.headers {
            let id = HeaderId(u32::try_from(headers.len()).unwrap_or(u32::MAX));
            by_name.insert(h.name.clone(), id);
            headers.push(Header::new(&h.name, id, Arc::new(h.ty.clone()), h.metadata));
        }
        let mut stacks = Vec::new();
        for s in &spec.stacks {
            let ty = Arc::new(s.ty.clone());
            let mut members = Vec::with_capacity(s.size);
            for i in 0..s.size {
                let id = HeaderId(u32::try_from(headers.len()).unwrap_or(u32::MAX));
                let name = format!("{}[{i}]", s.name);
                by_name.insert(name.clone(), id);
                headers.push(Header::new(name, id, ty.clone(), false));
                members.push(id);
            }
            let sid = StackId(u32::try_from(stacks.len()).unwrap_or(u32::MAX));
            stacks.push(HeaderStack::new(&s.name, sid, members));
        }
        Self {
            headers,
            stacks,
            by_name,
        }
    }

    #[must_use]
    pub fn num_headers(&self) -> usize {
        self.headers.len()
    }

    #[must_use]
    pub fn num_stacks(&self) -> usize {
        self.stacks.len()
    }

    /// # Panics
    ///
    /// Panics on an unknown id; header ids come from the compiled program.
    #[must_use]
    pub fn header(&self, id: HeaderId) -> &Header {
        &self.headers[id.index()]
    }

    /// # Panics
    ///
    /// Panics on an unknown id.
    #[must_use]
    pub fn header_mut(&mut self, id: HeaderId) -> &mut Header {
        &mut self.headers[id.index()]
    }

    #[must_use]
    pub fn header_by_name(&self, name: &str) -> Option<&Header> {
        self.by_name.get(name).map(|id| self.header(*id))
    }

    #[must_use]
    pub fn header_id(&self, name: &str) -> Option<HeaderId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn is_valid(&self, id: HeaderId) -> bool {
        self.header(id).is_valid()
    }

    /// # Panics
    ///
    /// Panics on an unknown reference.
    #[must_use]
    pub fn field(&self, r: FieldRef) -> &Field {
        self.header(r.header).field(r.field)
    }

    /// # Panics
    ///
    /// Panics on an unknown reference.
    #[must_use]
    pub fn field_mut(&mut self, r: FieldRef) -> &mut Field {
        self.header_mut(r.header).field_mut(r.field)
    }

    /// # Panics
    ///
    /// Panics on an unknown id.
    #[must_use]
    pub fn stack(&self, id: StackId) -> &HeaderStack {
        &self.stacks[id.index()]
    }

    /// Swaps the field values of two headers of the same type in O(1).
    /// Validity flags are not exchanged.
    fn swap_header_values(&mut self, a: HeaderId, b: HeaderId) {
        let (i, j) = (a.index(), b.index());
        if i == j {
            return;
        }
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        let (first, second) = self.headers.split_at_mut(hi);
        std::mem::swap(&mut first[lo].fields, &mut second[0].fields);
    }

    /// Pushes one slot at the front of the stack.
    ///
    /// Existing slot values shift toward higher indices (the last is dropped
    /// when the stack is full), slot 0 becomes valid with undefined field
    /// values, and `next` grows up to the capacity.
    pub fn stack_push_front(&mut self, id: StackId) {
        let (members, next, cap) = {
            let s = self.stack(id);
            (s.members().to_vec(), s.next(), s.capacity())
        };
        if cap == 0 {
            return;
        }
        let top = next.min(cap - 1);
        for i in (1..=top).rev() {
            self.swap_header_values(members[i - 1], members[i]);
        }
        let new_next = (next + 1).min(cap);
        for (i, h) in members.iter().enumerate() {
            let hdr = self.header_mut(*h);
            if i < new_next {
                hdr.mark_valid();
            } else {
                hdr.mark_invalid();
            }
        }
        self.stacks[id.index()].set_next(new_next);
    }

    /// Pops one slot from the front of the stack.
    ///
    /// Slot values shift toward lower indices, the last previously-valid slot
    /// becomes invalid, and `next` shrinks. Popping an empty stack is a no-op.
    pub fn stack_pop_front(&mut self, id: StackId) {
        let (members, next, cap) = {
            let s = self.stack(id);
            (s.members().to_vec(), s.next(), s.capacity())
        };
        if next == 0 {
            return;
        }
        for i in 0..cap - 1 {
            self.swap_header_values(members[i], members[i + 1]);
        }
        let new_next = next - 1;
        for (i, h) in members.iter().enumerate() {
            let hdr = self.header_mut(*h);
            if i < new_next {
                hdr.mark_valid();
            } else {
                hdr.mark_invalid();
            }
        }
        self.stacks[id.index()].set_next(new_next);
    }

    /// Applies the reset policy: headers invalid, stacks empty and, for
    /// [`ResetPolicy::ZeroMetadata`], metadata fields zeroed. Regular field
    /// bytes are never touched.
    pub fn reset(&mut self, policy: ResetPolicy) {
        for h in &mut self.headers {
            h.reset();
            if policy == ResetPolicy::ZeroMetadata && h.is_metadata() {
                h.zero_fields();
            }
        }
        for s in &mut self.stacks {
            s.set_next(0);
        }
    }
}

#[derive(Debug)]
struct FactoryInner {
    spec: PhvSpec,
    policy: ResetPolicy,
    pool: Mutex<Vec<Box<Phv>>>,
}

impl FactoryInner {
    fn put(&self, mut phv: Box<Phv>) {
        phv.reset(self.policy);
        self.pool.lock().push(phv);
    }
}

/// Configuration-scoped PHV pool.
///
/// PHVs are expensive to build (one allocation per field), so one factory per
/// loaded program hands leases out to packets and takes them back on drop.
/// Cloning the factory shares the pool.
#[derive(Debug, Clone)]
pub struct PhvFactory {
    inner: Arc<FactoryInner>,
}

impl PhvFactory {
    #[must_use]
    pub fn new(spec: PhvSpec, policy: ResetPolicy) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                spec,
                policy,
                pool: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn policy(&self) -> ResetPolicy {
        self.inner.policy
    }

    /// Number of PHVs currently parked in the pool.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.inner.pool.lock().len()
    }

    /// Leases a PHV, building a fresh one only when the pool is dry.
    #[must_use]
    pub fn get(&self) -> PhvLease {
        let phv = self.inner.pool.lock().pop().unwrap_or_else(|| {
            trace!("phv pool dry, building a new instance");
            Box::new(Phv::build(&self.inner.spec))
        });
        PhvLease {
            phv: Some(phv),
            factory: self.inner.clone(),
        }
    }
}

/// An exclusive lease of one [`Phv`]; returns it to the pool on drop.
#[derive(Debug)]
pub struct PhvLease {
    phv: Option<Box<Phv>>,
    factory: Arc<FactoryInner>,
}

impl Deref for PhvLease {
    type Target = Phv;

    fn deref(&self) -> &Phv {
        self.phv.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PhvLease {
    fn deref_mut(&mut self) -> &mut Phv {
        self.phv.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PhvLease {
    fn drop(&mut self) {
        if let Some(phv) = self.phv.take() {
            self.factory.put(phv);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::FieldSpec;

    fn spec() -> PhvSpec {
        let meta_t = HeaderType::new(
            "meta_t",
            vec![FieldSpec::new("port", 9), FieldSpec::new("drop", 1)],
        );
        let mpls_t = HeaderType::new(
            "mpls_t",
            vec![FieldSpec::new("label", 20), FieldSpec::new("ttl", 8)],
        );
        let mut spec = PhvSpec::new();
        spec.add_header("meta", meta_t, true);
        spec.add_stack("mpls", mpls_t, 3);
        spec
    }

    #[test]
    fn pool_reuses_instances() {
        let factory = PhvFactory::new(spec(), ResetPolicy::Invalidate);
        let lease = factory.get();
        assert_eq!(factory.pooled(), 0);
        drop(lease);
        assert_eq!(factory.pooled(), 1);
        let _lease = factory.get();
        assert_eq!(factory.pooled(), 0);
    }

    #[test]
    fn invalidate_policy_preserves_bytes() {
        let factory = PhvFactory::new(spec(), ResetPolicy::Invalidate);
        let slot0 = {
            let mut phv = factory.get();
            let id = phv.header_id("mpls[0]").unwrap();
            phv.header_mut(id).mark_valid();
            phv.header_mut(id).field_mut(0).set_from_uint(0xbeef);
            id
        };
        let phv = factory.get();
        assert!(!phv.header(slot0).is_valid());
        assert_eq!(phv.header(slot0).field(0).to_u64(), 0xbeef);
    }

    #[test]
    fn zero_metadata_policy_zeroes_metadata_only() {
        let factory = PhvFactory::new(spec(), ResetPolicy::ZeroMetadata);
        let (meta, slot0) = {
            let mut phv = factory.get();
            let meta = phv.header_id("meta").unwrap();
            let slot0 = phv.header_id("mpls[0]").unwrap();
            phv.header_mut(meta).field_mut(0).set_from_uint(7);
            phv.header_mut(slot0).field_mut(1).set_from_uint(64);
            (meta, slot0)
        };
        let phv = factory.get();
        assert_eq!(phv.header(meta).field(0).to_u64(), 0);
        assert_eq!(phv.header(slot0).field(1).to_u64(), 64);
    }

    #[test]
    fn stack_push_shifts_and_tracks_validity() {
        let factory = PhvFactory::new(spec(), ResetPolicy::Invalidate);
        let mut phv = factory.get();
        let sid = StackId(0);
        let ids: Vec<HeaderId> = phv.stack(sid).members().to_vec();

        phv.stack_push_front(sid);
        phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(100);
        phv.stack_push_front(sid);
        phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(200);

        assert_eq!(phv.stack(sid).next(), 2);
        assert!(phv.is_valid(ids[0]));
        assert!(phv.is_valid(ids[1]));
        assert!(!phv.is_valid(ids[2]));
        assert_eq!(phv.field(FieldRef::new(ids[0], 0)).to_u64(), 200);
        assert_eq!(phv.field(FieldRef::new(ids[1], 0)).to_u64(), 100);
    }

    #[test]
    fn stack_pop_shifts_back() {
        let factory = PhvFactory::new(spec(), ResetPolicy::Invalidate);
        let mut phv = factory.get();
        let sid = StackId(0);
        let ids: Vec<HeaderId> = phv.stack(sid).members().to_vec();

        phv.stack_push_front(sid);
        phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(1);
        phv.stack_push_front(sid);
        phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(2);
        phv.stack_pop_front(sid);

        assert_eq!(phv.stack(sid).next(), 1);
        assert!(phv.is_valid(ids[0]));
        assert!(!phv.is_valid(ids[1]));
        assert_eq!(phv.field(FieldRef::new(ids[0], 0)).to_u64(), 1);
    }

    #[test]
    fn push_on_full_stack_drops_the_tail() {
        let factory = PhvFactory::new(spec(), ResetPolicy::Invalidate);
        let mut phv = factory.get();
        let sid = StackId(0);
        let ids: Vec<HeaderId> = phv.stack(sid).members().to_vec();
        for v in 1..=3u64 {
            phv.stack_push_front(sid);
            phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(v);
        }
        phv.stack_push_front(sid);
        phv.field_mut(FieldRef::new(ids[0], 0)).set_from_uint(4);

        assert_eq!(phv.stack(sid).next(), 3);
        assert_eq!(phv.field(FieldRef::new(ids[0], 0)).to_u64(), 4);
        assert_eq!(phv.field(FieldRef::new(ids[1], 0)).to_u64(), 3);
        assert_eq!(phv.field(FieldRef::new(ids[2], 0)).to_u64(), 2);
    }
}
