// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Shared action members and selector groups.
//!
//! Indirect tables resolve a match to an [`IndirectIndex`] instead of an
//! action: either a single member or a group of members. Members and groups
//! are reference counted; a match entry or a group membership pins the
//! referenced object against deletion. Group selection reduces a caller
//! supplied hash modulo the group's member count and picks by rank, so it is
//! deterministic for fixed input and membership.

use crate::handle::{Arena, Handle};
use crate::TableError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What a match entry of an indirect table resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndirectIndex {
    Member(Handle),
    Group(Handle),
}

#[derive(Debug)]
struct Member<T> {
    value: T,
    refcount: u32,
}

#[derive(Debug, Default)]
struct Group {
    members: Vec<Handle>,
    refcount: u32,
}

/// Member and group storage for one indirect table.
#[derive(Debug)]
pub struct IndirectSpace<T> {
    members: Arena<Member<T>>,
    groups: Arena<Group>,
}

impl<T> IndirectSpace<T> {
    /// Storage for at most `max_members` members and `max_groups` groups.
    #[must_use]
    pub fn new(max_members: usize, max_groups: usize) -> Self {
        Self {
            members: Arena::new(max_members),
            groups: Arena::new(max_groups),
        }
    }

    pub fn add_member(&mut self, value: T) -> Result<Handle, TableError> {
        let h = self.members.insert(Member { value, refcount: 0 })?;
        debug!(member = h.index(), "member added");
        Ok(h)
    }

    pub fn modify_member(&mut self, h: Handle, value: T) -> Result<(), TableError> {
        self.members.get_mut(h)?.value = value;
        Ok(())
    }

    /// Refuses while any entry or group still references the member.
    pub fn delete_member(&mut self, h: Handle) -> Result<T, TableError> {
        if self.members.get(h)?.refcount > 0 {
            return Err(TableError::MemberInUse);
        }
        self.members.remove(h).map(|m| m.value)
    }

    pub fn member_value(&self, h: Handle) -> Result<&T, TableError> {
        self.members.get(h).map(|m| &m.value)
    }

    #[must_use]
    pub fn num_members(&self) -> usize {
        self.members.len()
    }

    pub fn create_group(&mut self) -> Result<Handle, TableError> {
        let h = self.groups.insert(Group::default())?;
        debug!(group = h.index(), "group created");
        Ok(h)
    }

    /// Refuses while any entry still references the group; releases its
    /// memberships.
    pub fn delete_group(&mut self, h: Handle) -> Result<(), TableError> {
        if self.groups.get(h)?.refcount > 0 {
            return Err(TableError::GroupInUse);
        }
        let group = self.groups.remove(h)?;
        for m in group.members {
            if let Ok(member) = self.members.get_mut(m) {
                member.refcount = member.refcount.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Appends the member at the group's highest rank.
    pub fn add_member_to_group(&mut self, member: Handle, group: Handle) -> Result<(), TableError> {
        self.members.get(member)?;
        self.groups.get(group)?;
        self.members.get_mut(member)?.refcount += 1;
        self.groups.get_mut(group)?.members.push(member);
        Ok(())
    }

    /// Removes the member's first occurrence, compacting the rank order of
    /// the remaining members without reordering them.
    pub fn remove_member_from_group(
        &mut self,
        member: Handle,
        group: Handle,
    ) -> Result<(), TableError> {
        let g = self.groups.get_mut(group)?;
        let pos = g
            .members
            .iter()
            .position(|m| *m == member)
            .ok_or(TableError::MemberNotInGroup)?;
        g.members.remove(pos);
        self.members.get_mut(member)?.refcount -= 1;
        Ok(())
    }

    pub fn group_members(&self, group: Handle) -> Result<&[Handle], TableError> {
        self.groups.get(group).map(|g| g.members.as_slice())
    }

    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Pins the referenced member or group (a match entry now points at it).
    pub fn attach(&mut self, idx: IndirectIndex) -> Result<(), TableError> {
        match idx {
            IndirectIndex::Member(h) => self.members.get_mut(h)?.refcount += 1,
            IndirectIndex::Group(h) => self.groups.get_mut(h)?.refcount += 1,
        }
        Ok(())
    }

    /// Releases a pin taken by [`IndirectSpace::attach`].
    pub fn detach(&mut self, idx: IndirectIndex) -> Result<(), TableError> {
        match idx {
            IndirectIndex::Member(h) => {
                let m = self.members.get_mut(h)?;
                m.refcount = m.refcount.saturating_sub(1);
            }
            IndirectIndex::Group(h) => {
                let g = self.groups.get_mut(h)?;
                g.refcount = g.refcount.saturating_sub(1);
            }
        }
        Ok(())
    }

    /// Rank-based selection: `hash mod group size`.
    pub fn select(&self, group: Handle, hash: u64) -> Result<Handle, TableError> {
        let g = self.groups.get(group)?;
        if g.members.is_empty() {
            return Err(TableError::EmptyGroup);
        }
        let rank = usize::try_from(hash % g.members.len() as u64).unwrap_or(0);
        Ok(g.members[rank])
    }

    /// Resolves an indirect index to a concrete member, selecting by `hash`
    /// for groups.
    pub fn resolve(&self, idx: IndirectIndex, hash: u64) -> Result<Handle, TableError> {
        match idx {
            IndirectIndex::Member(h) => {
                self.members.get(h)?;
                Ok(h)
            }
            IndirectIndex::Group(h) => self.select(h, hash),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refcounts_block_member_deletion() {
        let mut space = IndirectSpace::new(8, 4);
        let m = space.add_member("nhop1").unwrap();
        let g = space.create_group().unwrap();
        space.add_member_to_group(m, g).unwrap();
        assert_eq!(space.delete_member(m), Err(TableError::MemberInUse));
        space.remove_member_from_group(m, g).unwrap();
        space.delete_member(m).unwrap();
    }

    #[test]
    fn refcounts_block_group_deletion() {
        let mut space: IndirectSpace<&str> = IndirectSpace::new(8, 4);
        let g = space.create_group().unwrap();
        space.attach(IndirectIndex::Group(g)).unwrap();
        assert_eq!(space.delete_group(g), Err(TableError::GroupInUse));
        space.detach(IndirectIndex::Group(g)).unwrap();
        space.delete_group(g).unwrap();
    }

    #[test]
    fn selection_is_rank_stable_on_removal() {
        let mut space = IndirectSpace::new(8, 4);
        let a = space.add_member("a").unwrap();
        let b = space.add_member("b").unwrap();
        let c = space.add_member("c").unwrap();
        let g = space.create_group().unwrap();
        space.add_member_to_group(a, g).unwrap();
        space.add_member_to_group(b, g).unwrap();
        space.add_member_to_group(c, g).unwrap();

        assert_eq!(space.select(g, 7).unwrap(), b); // 7 % 3 == 1
        space.remove_member_from_group(a, g).unwrap();
        // ranks compact: [b, c]; the hash re-reduces over the new size
        assert_eq!(space.group_members(g).unwrap(), &[b, c]);
        assert_eq!(space.select(g, 7).unwrap(), c); // 7 % 2 == 1
        assert_eq!(space.select(g, 6).unwrap(), b);
    }

    #[test]
    fn empty_group_selection_fails() {
        let mut space: IndirectSpace<&str> = IndirectSpace::new(8, 4);
        let g = space.create_group().unwrap();
        assert_eq!(space.select(g, 1), Err(TableError::EmptyGroup));
    }

    #[test]
    fn duplicate_membership_weights_selection() {
        let mut space = IndirectSpace::new(8, 4);
        let a = space.add_member("a").unwrap();
        let b = space.add_member("b").unwrap();
        let g = space.create_group().unwrap();
        space.add_member_to_group(a, g).unwrap();
        space.add_member_to_group(a, g).unwrap();
        space.add_member_to_group(b, g).unwrap();
        let picks: Vec<Handle> = (0..3).map(|h| space.select(g, h).unwrap()).collect();
        assert_eq!(picks, vec![a, a, b]);
    }

    #[test]
    fn stale_member_handles_are_rejected() {
        let mut space = IndirectSpace::new(8, 4);
        let m = space.add_member("old").unwrap();
        space.delete_member(m).unwrap();
        let _new = space.add_member("new").unwrap();
        assert_eq!(space.member_value(m), Err(TableError::InvalidHandle));
        assert_eq!(
            space.resolve(IndirectIndex::Member(m), 0),
            Err(TableError::InvalidHandle)
        );
    }
}
