// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Action dispatch.
//!
//! An action is a flat, branch-free list of primitive invocations; each
//! primitive consumes a fixed slice of the action's parameter array.
//! Parameters are a sum type resolved at execution time; resolving one as the
//! wrong kind means the compiled program is corrupted and aborts.

use crate::packet::Packet;
use crate::runtime::{CounterId, MeterId, RegisterId, RuntimeEnv};
use expr::Expression;
use num_bigint::{BigInt, BigUint};
use phv::{FieldRef, HeaderId, StackId};
use std::sync::Arc;
use tracing::trace;

/// Identifies an [`ActionFn`] across the pipeline; next-node routing is keyed
/// by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActionId(pub u32);

/// One parameter of an action primitive.
#[derive(Debug, Clone)]
pub enum ActionParam {
    Const(BigUint),
    Field(FieldRef),
    Header(HeaderId),
    Stack(StackId),
    /// Slot of the matched entry's control-plane-supplied action data.
    ActionData(usize),
    /// A computed value; the expression must be built.
    Expr(Expression),
    Counter(CounterId),
    Meter(MeterId),
    Register(RegisterId),
}

/// Everything a primitive may touch while executing.
pub struct ActionContext<'a> {
    pub packet: &'a mut Packet,
    pub action_data: &'a [BigUint],
    pub env: &'a RuntimeEnv,
}

impl ActionParam {
    /// Resolves to an arithmetic value.
    ///
    /// # Panics
    ///
    /// Panics when the parameter is a reference kind that carries no value.
    #[must_use]
    pub fn data(&self, ctx: &ActionContext<'_>) -> BigInt {
        match self {
            Self::Const(v) => BigInt::from(v.clone()),
            Self::Field(r) => BigInt::from(ctx.packet.phv().field(*r).uint().clone()),
            Self::ActionData(slot) => BigInt::from(ctx.action_data[*slot].clone()),
            Self::Expr(e) => e.eval_arith(ctx.packet.phv()),
            _ => panic!("action parameter does not resolve to a value"),
        }
    }

    /// Resolves to a field reference.
    ///
    /// # Panics
    ///
    /// Panics unless the parameter is a field.
    #[must_use]
    pub fn field_ref(&self) -> FieldRef {
        match self {
            Self::Field(r) => *r,
            _ => panic!("action parameter is not a field"),
        }
    }

    /// # Panics
    ///
    /// Panics unless the parameter is a header.
    #[must_use]
    pub fn header(&self) -> HeaderId {
        match self {
            Self::Header(h) => *h,
            _ => panic!("action parameter is not a header"),
        }
    }

    /// # Panics
    ///
    /// Panics unless the parameter is a header stack.
    #[must_use]
    pub fn stack(&self) -> StackId {
        match self {
            Self::Stack(s) => *s,
            _ => panic!("action parameter is not a header stack"),
        }
    }

    /// # Panics
    ///
    /// Panics unless the parameter is a counter array.
    #[must_use]
    pub fn counter(&self) -> CounterId {
        match self {
            Self::Counter(c) => *c,
            _ => panic!("action parameter is not a counter array"),
        }
    }

    /// # Panics
    ///
    /// Panics unless the parameter is a meter array.
    #[must_use]
    pub fn meter(&self) -> MeterId {
        match self {
            Self::Meter(m) => *m,
            _ => panic!("action parameter is not a meter array"),
        }
    }

    /// # Panics
    ///
    /// Panics unless the parameter is a register array.
    #[must_use]
    pub fn register(&self) -> RegisterId {
        match self {
            Self::Register(r) => *r,
            _ => panic!("action parameter is not a register array"),
        }
    }
}

/// One primitive operation, the unit the action engine dispatches.
pub trait ActionPrimitive: Send + Sync {
    fn name(&self) -> &'static str;
    /// How many parameters the primitive consumes; fixed per primitive.
    fn num_params(&self) -> usize;
    fn execute(&self, ctx: &mut ActionContext<'_>, args: &[ActionParam]);
}

struct PrimitiveCall {
    primitive: Arc<dyn ActionPrimitive>,
    first_param: usize,
}

/// Compiled action code: an ordered primitive list over a shared parameter
/// array, plus the number of per-entry action-data slots it expects.
pub struct ActionFn {
    name: String,
    id: ActionId,
    num_action_data: usize,
    params: Vec<ActionParam>,
    calls: Vec<PrimitiveCall>,
}

impl ActionFn {
    #[must_use]
    pub fn new(name: impl Into<String>, id: ActionId, num_action_data: usize) -> Self {
        Self {
            name: name.into(),
            id,
            num_action_data,
            params: Vec::new(),
            calls: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn id(&self) -> ActionId {
        self.id
    }

    #[must_use]
    pub fn num_action_data(&self) -> usize {
        self.num_action_data
    }

    /// Appends a primitive call consuming `params`.
    ///
    /// # Panics
    ///
    /// Panics when the parameter count does not match the primitive's arity.
    pub fn push_call(&mut self, primitive: Arc<dyn ActionPrimitive>, params: Vec<ActionParam>) {
        assert!(
            params.len() == primitive.num_params(),
            "primitive {} takes {} parameters, got {}",
            primitive.name(),
            primitive.num_params(),
            params.len()
        );
        let first_param = self.params.len();
        self.params.extend(params);
        self.calls.push(PrimitiveCall {
            primitive,
            first_param,
        });
    }

    /// Runs the primitive list against the packet.
    ///
    /// # Panics
    ///
    /// Panics when the entry's action data does not match the declared slot
    /// count: the control plane validated it at install time, so a mismatch
    /// here is a corrupted entry.
    pub fn execute(&self, packet: &mut Packet, action_data: &[BigUint], env: &RuntimeEnv) {
        assert!(
            action_data.len() == self.num_action_data,
            "action {} expects {} action-data values, entry carries {}",
            self.name,
            self.num_action_data,
            action_data.len()
        );
        trace!(action = %self.name, "executing action");
        let mut ctx = ActionContext {
            packet,
            action_data,
            env,
        };
        for call in &self.calls {
            let args =
                &self.params[call.first_param..call.first_param + call.primitive.num_params()];
            call.primitive.execute(&mut ctx, args);
        }
    }
}

impl std::fmt::Debug for ActionFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionFn")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("calls", &self.calls.len())
            .finish_non_exhaustive()
    }
}
