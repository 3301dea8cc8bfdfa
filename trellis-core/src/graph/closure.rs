//! Graph Closure
//!
//! Closing turns a wired graph into an evaluable one.
//!
//! # Algorithm
//!
//! 1. Collect the nodes to close together with their unclosed ancestors,
//!    failing on the first unbound input or invalid node.
//! 2. Order them with Kahn's algorithm. Nodes left over are on a cycle.
//! 3. Type pass: in order, run each node's type policy over its parents'
//!    descriptors. Derived descriptors are staged, never written to the graph
//!    until every node has passed.
//! 4. Allocation pass: commit descriptors, give every owned output a
//!    zero-filled buffer and point every view at its parent's buffer.
//! 5. Mark the nodes closed and tainted.
//!
//! Steps 1 to 3 only read the graph, so a failed close leaves it unchanged.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use super::node::{NodeId, TaintState};
use super::port::OutputId;
use super::subgraph::SubgraphId;
use super::{Graph, GraphState};
use crate::data::{Buffer, BufferId, DataDescriptor, StorageKind, TypeContext};
use crate::error::{ClosureError, GraphError};

impl Graph {
    /// Closes the whole graph.
    ///
    /// On success the graph is CLOSED and every node is tainted. On failure
    /// nothing has changed and the graph stays OPEN.
    pub fn close(&mut self) -> Result<(), GraphError> {
        if self.is_closed() {
            return Err(GraphError::GraphClosed {
                node: self.config.name.clone(),
                action: "close the graph again".to_string(),
            });
        }

        let all: Vec<NodeId> = self.nodes.iter().map(|n| n.id).collect();
        self.close_nodes(&all)?;

        let mut closed_subgraphs = 0;
        for root in 0..self.subgraphs.len() {
            for id in self.subgraph_post_order(SubgraphId(root as u32)) {
                let sg = &mut self.subgraphs[id.index()];
                if !sg.closed {
                    sg.closed = true;
                    closed_subgraphs += 1;
                }
            }
        }

        self.state = GraphState::Closed;
        debug!(
            graph = %self.config.name,
            nodes = self.nodes.len(),
            buffers = self.buffers.len(),
            subgraphs = closed_subgraphs,
            "graph closed"
        );
        Ok(())
    }

    /// Closes one sub-graph: nested sub-graphs first, then its own nodes
    /// along with any unclosed ancestors they depend on.
    ///
    /// Closing an already closed sub-graph is a no-op. If a nested sub-graph
    /// fails, the ones closed before it stay closed.
    pub fn close_subgraph(&mut self, id: SubgraphId) -> Result<(), GraphError> {
        let sg = self.subgraph(id)?;
        if sg.closed || self.is_closed() {
            return Ok(());
        }

        for sub in self.subgraph_post_order(id) {
            if self.subgraphs[sub.index()].closed {
                continue;
            }
            let members = self.subgraphs[sub.index()].nodes.clone();
            self.close_nodes(&members)?;
            self.subgraphs[sub.index()].closed = true;
            debug!(subgraph = %self.subgraphs[sub.index()].name, "sub-graph closed");
        }
        Ok(())
    }

    fn close_nodes(&mut self, roots: &[NodeId]) -> Result<(), GraphError> {
        let members = self.unclosed_ancestry(roots)?;
        if members.is_empty() {
            return Ok(());
        }
        let order = self.topological_order(&members)?;
        let staged = self.type_pass(&order)?;
        let allocated = self.allocate(&order, staged);

        for &id in &order {
            let node = &mut self.nodes[id.index()];
            node.closed = true;
            node.state = TaintState::Tainted;
            node.frozen_tainted = false;
        }
        debug!(nodes = order.len(), buffers = allocated, "closed nodes");
        Ok(())
    }

    /// Unclosed nodes reachable upstream from `roots`, sorted by handle.
    fn unclosed_ancestry(&self, roots: &[NodeId]) -> Result<Vec<NodeId>, GraphError> {
        let mut seen = HashSet::new();
        let mut stack: Vec<NodeId> = roots.to_vec();
        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            if node.closed || !seen.insert(id) {
                continue;
            }
            if node.invalid {
                return Err(ClosureError::InvalidNode {
                    node: node.name.clone(),
                }
                .into());
            }
            for (key, input) in &node.inputs {
                match self.inputs[input.index()].parent {
                    Some(parent) => stack.push(self.outputs[parent.index()].node),
                    None => {
                        return Err(ClosureError::UnboundInput {
                            node: node.name.clone(),
                            input: key.clone(),
                        }
                        .into())
                    }
                }
            }
        }
        let mut members: Vec<NodeId> = seen.into_iter().collect();
        members.sort_unstable();
        Ok(members)
    }

    /// Kahn's algorithm over `members`. Edges from nodes outside the set are
    /// already satisfied.
    fn topological_order(&self, members: &[NodeId]) -> Result<Vec<NodeId>, GraphError> {
        let member_set: HashSet<NodeId> = members.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = members.iter().map(|&id| (id, 0)).collect();

        for &id in members {
            for input in self.nodes[id.index()].inputs.values() {
                if let Some(parent) = self.inputs[input.index()].parent {
                    if member_set.contains(&self.outputs[parent.index()].node) {
                        *in_degree.entry(id).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<NodeId> = members
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(members.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for output in self.nodes[id.index()].outputs.values() {
                for consumer in &self.outputs[output.index()].consumers {
                    let child = self.inputs[consumer.index()].node;
                    if let Some(degree) = in_degree.get_mut(&child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child);
                        }
                    }
                }
            }
        }

        if order.len() < members.len() {
            let ordered: HashSet<NodeId> = order.iter().copied().collect();
            let nodes = members
                .iter()
                .filter(|id| !ordered.contains(id))
                .map(|id| self.nodes[id.index()].name.clone())
                .collect();
            return Err(ClosureError::Cycle { nodes }.into());
        }
        Ok(order)
    }

    /// Derives output descriptors in topological order without touching the
    /// graph.
    fn type_pass(&self, order: &[NodeId]) -> Result<HashMap<OutputId, DataDescriptor>, GraphError> {
        let mut staged: HashMap<OutputId, DataDescriptor> = HashMap::new();

        for &id in order {
            let node = &self.nodes[id.index()];
            let derived = {
                let mut inputs = Vec::with_capacity(node.inputs.len());
                for (key, input) in &node.inputs {
                    let parent = self.inputs[input.index()].parent.ok_or_else(|| {
                        ClosureError::UnboundInput {
                            node: node.name.clone(),
                            input: key.clone(),
                        }
                    })?;
                    let dd = staged
                        .get(&parent)
                        .or(self.outputs[parent.index()].descriptor.as_ref())
                        .ok_or_else(|| GraphError::InvalidState {
                            node: node.name.clone(),
                            reason: format!("input '{key}' has no descriptor"),
                        })?;
                    inputs.push((key.as_str(), dd));
                }
                let ctx = TypeContext {
                    node: &node.name,
                    inputs,
                    outputs: node.outputs.keys().map(String::as_str).collect(),
                };

                let derived = node.type_policy.derive(&ctx)?;
                if derived.len() != node.outputs.len() {
                    return Err(ctx.mismatch(
                        "<outputs>",
                        format!("{} descriptors", node.outputs.len()),
                        format!("{} descriptors", derived.len()),
                    ));
                }

                for ((key, output), dd) in node.outputs.iter().zip(&derived) {
                    let StorageKind::View { input } = self.outputs[output.index()].storage else {
                        continue;
                    };
                    let invalid = |reason: String| ClosureError::InvalidView {
                        node: node.name.clone(),
                        output: key.clone(),
                        input,
                        reason,
                    };
                    let Some((_, parent_dd)) = ctx.inputs.get(input) else {
                        return Err(invalid(format!("node has {} inputs", ctx.inputs.len())).into());
                    };
                    let parent = node.inputs[input];
                    let parent_output = self.inputs[parent.index()]
                        .parent
                        .ok_or(GraphError::UnknownHandle("output"))?;
                    let aliased = self.aliased_len(parent_output, parent_dd);
                    if dd.size() != aliased {
                        return Err(invalid(format!(
                            "{dd} holds {} elements, aliased buffer holds {aliased}",
                            dd.size()
                        ))
                        .into());
                    }
                }
                derived
            };

            for (output, dd) in node.outputs.values().zip(derived) {
                staged.insert(*output, dd);
            }
        }
        Ok(staged)
    }

    /// Length of the buffer behind `output` once allocated.
    fn aliased_len(&self, output: OutputId, dd: &DataDescriptor) -> usize {
        let port = &self.outputs[output.index()];
        match port.storage {
            StorageKind::View { .. } => dd.size(),
            StorageKind::Allocatable => self.nodes[port.node.index()].storage_len(dd),
        }
    }

    /// Commits staged descriptors and sets up buffers. Returns the number of
    /// buffers allocated.
    fn allocate(&mut self, order: &[NodeId], mut staged: HashMap<OutputId, DataDescriptor>) -> usize {
        let mut allocated = 0;
        for &id in order {
            let outputs: Vec<OutputId> = self.nodes[id.index()].outputs.values().copied().collect();
            for output in outputs {
                let Some(dd) = staged.remove(&output) else {
                    continue;
                };
                let buffer = match self.outputs[output.index()].storage {
                    StorageKind::Allocatable => {
                        let len = self.nodes[id.index()].storage_len(&dd);
                        let buffer = BufferId(self.buffers.len() as u32);
                        self.buffers.push(Buffer {
                            owner: output,
                            data: vec![0.0; len],
                        });
                        allocated += 1;
                        Some(buffer)
                    }
                    // Parents precede children in `order`, so the aliased
                    // buffer already exists.
                    StorageKind::View { input } => self.nodes[id.index()]
                        .inputs
                        .get_index(input)
                        .and_then(|(_, input)| self.inputs[input.index()].parent)
                        .and_then(|parent| self.outputs[parent.index()].buffer),
                };
                let port = &mut self.outputs[output.index()];
                port.descriptor = Some(dd);
                port.buffer = buffer;
            }
        }
        allocated
    }
}
