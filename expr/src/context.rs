// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Field-providing contexts an expression evaluates against.

use num_bigint::BigInt;
use phv::{FieldRef, HeaderId, Phv};

/// Source of field, validity and local values during evaluation.
pub trait EvalContext {
    fn field_value(&self, r: FieldRef) -> BigInt;
    fn field_value_signed(&self, r: FieldRef) -> BigInt;
    fn header_valid(&self, h: HeaderId) -> bool;
    /// Caller-supplied scratch values (e.g. a variable-length-header cursor).
    ///
    /// # Panics
    ///
    /// The base PHV context has no locals; an expression referencing one
    /// against it is a corrupted compiled program.
    fn local(&self, idx: usize) -> BigInt;
}

impl EvalContext for Phv {
    fn field_value(&self, r: FieldRef) -> BigInt {
        BigInt::from(self.field(r).uint().clone())
    }

    fn field_value_signed(&self, r: FieldRef) -> BigInt {
        self.field(r).int()
    }

    fn header_valid(&self, h: HeaderId) -> bool {
        self.is_valid(h)
    }

    fn local(&self, idx: usize) -> BigInt {
        unreachable!("expression references local {idx} but the context provides none")
    }
}

/// Wraps a context with a local-value array.
pub struct WithLocals<'a, C> {
    inner: &'a C,
    locals: &'a [BigInt],
}

impl<'a, C: EvalContext> WithLocals<'a, C> {
    #[must_use]
    pub fn new(inner: &'a C, locals: &'a [BigInt]) -> Self {
        Self { inner, locals }
    }
}

impl<C: EvalContext> EvalContext for WithLocals<'_, C> {
    fn field_value(&self, r: FieldRef) -> BigInt {
        self.inner.field_value(r)
    }

    fn field_value_signed(&self, r: FieldRef) -> BigInt {
        self.inner.field_value_signed(r)
    }

    fn header_valid(&self, h: HeaderId) -> bool {
        self.inner.header_valid(h)
    }

    fn local(&self, idx: usize) -> BigInt {
        self.locals[idx].clone()
    }
}
