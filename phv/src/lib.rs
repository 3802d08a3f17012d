// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet header vector (PHV) model.
//!
//! This crate owns the per-packet workspace of decoded header state: bit-exact
//! [`Field`]s, [`Header`]s with validity, fixed-capacity [`HeaderStack`]s, the
//! [`Phv`] that aggregates them, a configuration-scoped [`PhvFactory`] pool,
//! and [`KeySpec`] match-key extraction.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

use serde::{Deserialize, Serialize};

pub mod field;
pub mod header;
pub mod key;
pub mod phv;
pub mod stack;

pub use field::Field;
pub use header::{FieldSpec, Header, HeaderType};
pub use key::{FieldRef, KeyElement, KeySpec};
pub use phv::{HeaderSpec, Phv, PhvFactory, PhvLease, PhvSpec, ResetPolicy, StackSpec};
pub use stack::HeaderStack;

/// Dense index of a header inside a [`Phv`].
///
/// Ids are assigned by [`PhvSpec`] declaration order and are stable across all
/// PHV instances built from the same configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeaderId(pub u32);

/// Dense index of a header stack inside a [`Phv`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackId(pub u32);

impl HeaderId {
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl StackId {
    #[must_use]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}
