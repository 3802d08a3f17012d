// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Register-based expression evaluator.
//!
//! One evaluator serves every arithmetic/boolean computation in the runtime:
//! conditional-node predicates, computed action parameters and
//! variable-length-header lengths. An [`Expression`] is a linear op list;
//! [`Expression::build`] assigns destination registers in a single pass and
//! evaluation replays the ops against an [`EvalContext`].

#![deny(unsafe_code, clippy::all)]

mod context;
mod expression;
mod op;

pub use context::{EvalContext, WithLocals};
pub use expression::{ExprKind, Expression};
pub use op::Op;
