// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

/// Error type for every table-layer control-plane operation.
///
/// Mutations are atomic: an operation returning an error leaves the unit
/// exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("invalid or stale handle")]
    InvalidHandle,
    #[error("duplicate key")]
    DuplicateKey,
    #[error("table is full")]
    TableFull,
    #[error("bad key width: expected {expected} bytes, got {got}")]
    BadKeyWidth { expected: usize, got: usize },
    #[error("prefix length {prefix_len} exceeds key width of {nbits} bits")]
    BadPrefixLength { prefix_len: u32, nbits: usize },
    #[error("entry key kind does not match the unit's match kind")]
    KeyKindMismatch,
    #[error("operation does not apply to this table kind")]
    WrongTableKind,
    #[error("action data does not match the action's parameter count")]
    BadActionData,
    #[error("member is still referenced")]
    MemberInUse,
    #[error("group is still referenced")]
    GroupInUse,
    #[error("group has no members")]
    EmptyGroup,
    #[error("member not present in group")]
    MemberNotInGroup,
}
