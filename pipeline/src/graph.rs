// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The control-flow graph and its traversal.

use crate::conditional::Conditional;
use crate::packet::Packet;
use crate::runtime::RuntimeEnv;
use crate::table::MatchTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Index of a node inside one [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// A pipeline node: a match-action table or a conditional.
#[derive(Debug)]
pub enum Node {
    Table(MatchTable),
    Conditional(Conditional),
}

/// A directed, acyclic graph of tables and conditionals.
///
/// `apply` walks from the entry node, replacing the current node with
/// whatever the node returns, until none is returned. The walk is bounded by
/// the node count; exceeding it means the compiled program contains a cycle
/// and aborts.
#[derive(Debug, Default)]
pub struct Pipeline {
    name: String,
    nodes: Vec<Node>,
    entry: Option<NodeId>,
}

impl Pipeline {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            entry: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_table(&mut self, table: MatchTable) -> NodeId {
        self.push(Node::Table(table))
    }

    pub fn add_conditional(&mut self, conditional: Conditional) -> NodeId {
        self.push(Node::Conditional(conditional))
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(node);
        id
    }

    pub fn set_entry(&mut self, entry: NodeId) {
        self.entry = Some(entry);
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The table at `id`, for control-plane operations.
    ///
    /// # Panics
    ///
    /// Panics when `id` is not a table node; node ids come from pipeline
    /// construction.
    #[must_use]
    pub fn table(&self, id: NodeId) -> &MatchTable {
        match &self.nodes[id.0 as usize] {
            Node::Table(t) => t,
            Node::Conditional(_) => panic!("node {} is not a table", id.0),
        }
    }

    /// The table named `name`, for control-plane operations addressed by
    /// name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&MatchTable> {
        self.nodes.iter().find_map(|n| match n {
            Node::Table(t) if t.name() == name => Some(t),
            _ => None,
        })
    }

    /// Runs the packet through the graph, start to finish, on the calling
    /// thread.
    ///
    /// # Panics
    ///
    /// Panics when traversal exceeds the node count (a cycle in the compiled
    /// program).
    pub fn apply(&self, pkt: &mut Packet, env: &RuntimeEnv) {
        trace!(pipeline = %self.name, packet = pkt.ingress().packet_id, "pipeline start");
        let mut current = self.entry;
        let mut steps = 0usize;
        while let Some(id) = current {
            assert!(
                steps < self.nodes.len(),
                "pipeline {} exceeded its longest path: cycle in the control-flow graph",
                self.name
            );
            steps += 1;
            current = match &self.nodes[id.0 as usize] {
                Node::Table(t) => t.apply(pkt, env),
                Node::Conditional(c) => c.apply(pkt),
            };
            if pkt.exit_requested() {
                break;
            }
        }
        debug!(
            pipeline = %self.name,
            packet = pkt.ingress().packet_id,
            steps,
            dropped = pkt.is_dropped(),
            "pipeline complete"
        );
    }
}
