// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Conditional nodes.

use crate::graph::NodeId;
use crate::packet::Packet;
use expr::Expression;
use tracing::trace;

/// A branch in the control-flow graph: evaluates a boolean expression against
/// the PHV and picks one of two successors. Either successor may be absent,
/// ending the pipeline on that branch.
#[derive(Debug)]
pub struct Conditional {
    name: String,
    expression: Expression,
    on_true: Option<NodeId>,
    on_false: Option<NodeId>,
}

impl Conditional {
    /// # Panics
    ///
    /// Panics unless `expression` is built and boolean-valued; an unbuilt
    /// predicate is a corrupted compiled program.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        expression: Expression,
        on_true: Option<NodeId>,
        on_false: Option<NodeId>,
    ) -> Self {
        assert!(
            expression.is_built() && expression.kind() == expr::ExprKind::Bool,
            "conditional predicate must be a built boolean expression"
        );
        Self {
            name: name.into(),
            expression,
            on_true,
            on_false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn apply(&self, pkt: &Packet) -> Option<NodeId> {
        let outcome = self.expression.eval_bool(pkt.phv());
        trace!(conditional = %self.name, outcome, "conditional evaluated");
        if outcome {
            self.on_true
        } else {
            self.on_false
        }
    }
}
