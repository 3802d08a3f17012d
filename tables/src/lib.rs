// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Rule storage and lookup.
//!
//! Three interchangeable match units (exact, longest-prefix, ternary) share
//! one contract: add/delete/modify keyed by a versioned [`Handle`], lookup by
//! canonical key bytes. Handles come from a slot arena with per-slot
//! generation counters, so a handle held across a delete is rejected instead
//! of silently touching an unrelated entry. The indirect layer adds shared
//! action members and selector groups on top.

#![deny(unsafe_code, clippy::all)]
#![allow(clippy::missing_errors_doc)]

mod errors;
pub mod exact;
pub mod handle;
pub mod indirect;
pub mod lpm;
pub mod ternary;
pub mod unit;

pub use errors::TableError;
pub use exact::ExactUnit;
pub use handle::{Arena, Handle};
pub use indirect::{IndirectIndex, IndirectSpace};
pub use lpm::LpmUnit;
pub use ternary::TernaryUnit;
pub use unit::{AnyMatchUnit, EntryKey, EntryMeta, MatchKind};
