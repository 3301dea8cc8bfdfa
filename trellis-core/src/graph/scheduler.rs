//! Taint Propagation & Lazy Evaluation
//!
//! Every closed node is either clean or tainted. Invalidation is pushed
//! eagerly, recomputation is pulled lazily:
//!
//! 1. `push`, `taint` and `unfreeze` mark a node tainted and walk its
//!    descendants breadth-first, stopping at nodes that are already tainted
//!    (their descendants are tainted too) and at frozen nodes (which only
//!    remember the request).
//! 2. A read of a tainted node collects its tainted ancestors depth-first in
//!    post-order, visiting each node once, and evaluates them in that order.
//!    Shared ancestors of a diamond therefore run once per pass.
//! 3. A clean read returns the cached buffer without evaluating anything.
//!
//! `invalidate` flags a node and its descendants as unusable: they stay
//! tainted and refuse to evaluate until the flag is cleared.
//!
//! Evaluation writes in place into the buffers allocated at closure.

use std::collections::{HashSet, VecDeque};

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::node::{NodeId, TaintState, Transform};
use super::port::OutputId;
use super::Graph;
use crate::data::{Args, BufferId, Results};
use crate::error::GraphError;
use crate::hooks::{EvalEvent, HookStage};

impl Graph {
    /// Current values of `output`, evaluating whatever is tainted upstream.
    pub fn read(&mut self, output: OutputId) -> Result<&[f64], GraphError> {
        let node = self.output_port(output)?.node;
        self.touch(node)?;
        let port = &self.outputs[output.index()];
        let buffer = port.buffer.ok_or_else(|| GraphError::InvalidState {
            node: self.nodes[node.index()].name.clone(),
            reason: format!("output '{}' has no buffer", port.key),
        })?;
        Ok(self.buffers[buffer.index()].data.as_slice())
    }

    /// Reads the first output of `node`.
    pub fn read_node(&mut self, node: NodeId) -> Result<&[f64], GraphError> {
        let output = self.output_at(node, 0)?;
        self.read(output)
    }

    /// Brings `node` up to date without returning its data.
    pub fn touch(&mut self, node: NodeId) -> Result<(), GraphError> {
        let n = self.node(node)?;
        if !n.closed {
            return Err(GraphError::NotClosed {
                node: n.name.clone(),
            });
        }
        if n.state == TaintState::Clean {
            return Ok(());
        }

        let order = self.evaluation_order(node);
        trace!(node = %self.nodes[node.index()].name, pending = order.len(), "evaluation pass");
        for id in order {
            self.evaluate(id)?;
        }
        Ok(())
    }

    /// Marks `node` tainted and propagates downstream.
    pub fn taint(&mut self, node: NodeId) -> Result<(), GraphError> {
        self.node(node)?;
        let tainted = self.propagate_taint(node);
        self.run_immediate(&tainted)
    }

    /// Replaces the data held by a source node and taints it.
    ///
    /// Returns `false` if the node is frozen and the push was ignored.
    pub fn push(&mut self, node: NodeId, data: &[f64]) -> Result<bool, GraphError> {
        self.push_data(node, data, false)
    }

    /// Like [`Graph::push`], but only taints when `data` differs from the
    /// held values.
    pub fn push_if_changed(&mut self, node: NodeId, data: &[f64]) -> Result<bool, GraphError> {
        self.push_data(node, data, true)
    }

    fn push_data(
        &mut self,
        id: NodeId,
        data: &[f64],
        only_if_changed: bool,
    ) -> Result<bool, GraphError> {
        let node = self.node_mut(id)?;
        if node.frozen {
            return Ok(false);
        }
        let name = &node.name;
        let Some(held) = node.held.as_mut() else {
            return Err(GraphError::InvalidState {
                node: name.clone(),
                reason: "only source nodes accept pushed data".to_string(),
            });
        };
        if held.len() != data.len() {
            return Err(GraphError::InvalidState {
                node: name.clone(),
                reason: format!("expected {} values, got {}", held.len(), data.len()),
            });
        }
        if only_if_changed && held.as_slice() == data {
            return Ok(false);
        }
        held.copy_from_slice(data);
        self.taint(id)?;
        Ok(true)
    }

    /// Stops taint at `node`: later taints are recorded but not propagated
    /// until [`Graph::unfreeze`]. Only a clean node can be frozen.
    pub fn freeze(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if node.frozen {
            return Ok(());
        }
        if node.state == TaintState::Tainted {
            return Err(GraphError::InvalidState {
                node: node.name.clone(),
                reason: "cannot freeze a tainted node".to_string(),
            });
        }
        node.frozen = true;
        debug!(node = %node.name, "frozen");
        Ok(())
    }

    /// Releases a frozen node and replays any taint it received meanwhile.
    pub fn unfreeze(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if !node.frozen {
            return Ok(());
        }
        node.frozen = false;
        let replay = std::mem::take(&mut node.frozen_tainted);
        debug!(node = %node.name, replay, "unfrozen");
        if replay {
            self.taint(id)?;
        }
        Ok(())
    }

    /// Marks `node` invalid, or valid again, and carries the flag to its
    /// descendants.
    ///
    /// Every node the flag reaches is unfrozen and tainted. Clearing stops at
    /// nodes that still have an invalid parent. Invalid nodes can be neither
    /// closed nor evaluated.
    pub fn invalidate(&mut self, node: NodeId, invalid: bool) -> Result<(), GraphError> {
        self.node(node)?;
        let mut reached = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([node]);

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if !invalid && self.parents(id).any(|p| self.nodes[p.index()].invalid) {
                continue;
            }
            self.set_invalid(id, invalid);
            reached.push(id);
            queue.extend(self.children(id));
        }

        debug!(
            node = %self.nodes[node.index()].name,
            invalid,
            count = reached.len(),
            "validity changed"
        );
        let tainted = self.retaint(&reached);
        if invalid {
            Ok(())
        } else {
            self.run_immediate(&tainted)
        }
    }

    /// Sets or clears the invalid flag on every ancestor of `node`, without
    /// carrying it to their other descendants.
    pub fn invalidate_parents(&mut self, node: NodeId, invalid: bool) -> Result<(), GraphError> {
        self.node(node)?;
        let mut visited = HashSet::from([node]);
        let mut stack: Vec<NodeId> = self.parents(node).collect();
        let mut reached = Vec::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            self.set_invalid(id, invalid);
            reached.push(id);
            stack.extend(self.parents(id));
        }

        debug!(
            node = %self.nodes[node.index()].name,
            invalid,
            count = reached.len(),
            "parent validity changed"
        );
        let tainted = self.retaint(&reached);
        if invalid {
            Ok(())
        } else {
            self.run_immediate(&tainted)
        }
    }

    fn set_invalid(&mut self, id: NodeId, invalid: bool) {
        let node = &mut self.nodes[id.index()];
        node.invalid = invalid;
        node.frozen = false;
        node.frozen_tainted = false;
    }

    /// Taints `ids` and pushes the taint on to their descendants, even past
    /// nodes that were already tainted.
    fn retaint(&mut self, ids: &[NodeId]) -> Vec<NodeId> {
        let mut tainted = Vec::new();
        for &id in ids {
            let node = &mut self.nodes[id.index()];
            if node.state == TaintState::Clean {
                node.state = TaintState::Tainted;
                tainted.push(id);
            }
            let children: Vec<NodeId> = self.children(id).collect();
            for child in children {
                tainted.extend(self.propagate_taint(child));
            }
        }
        tainted
    }

    /// Nodes feeding `id`, one entry per bound input.
    fn parents(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.index()]
            .inputs
            .values()
            .filter_map(|input| self.inputs[input.index()].parent)
            .map(|output| self.outputs[output.index()].node)
    }

    /// Nodes consuming any output of `id`, one entry per bound input.
    fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.index()]
            .outputs
            .values()
            .flat_map(|output| self.outputs[output.index()].consumers.iter())
            .map(|input| self.inputs[input.index()].node)
    }

    /// Breadth-first taint from `start`. Returns the nodes that changed state.
    fn propagate_taint(&mut self, start: NodeId) -> Vec<NodeId> {
        let mut tainted = Vec::new();
        let mut queue = VecDeque::from([start]);

        while let Some(id) = queue.pop_front() {
            let node = &mut self.nodes[id.index()];
            if node.frozen {
                node.frozen_tainted = true;
                continue;
            }
            if node.state == TaintState::Tainted {
                continue;
            }
            node.state = TaintState::Tainted;
            tainted.push(id);

            for output in node.outputs.values() {
                for consumer in &self.outputs[output.index()].consumers {
                    queue.push_back(self.inputs[consumer.index()].node);
                }
            }
        }

        if !tainted.is_empty() {
            debug!(from = %self.nodes[start.index()].name, count = tainted.len(), "taint propagated");
        }
        tainted
    }

    fn run_immediate(&mut self, tainted: &[NodeId]) -> Result<(), GraphError> {
        for &id in tainted {
            let node = &self.nodes[id.index()];
            if node.immediate && node.closed {
                self.touch(id)?;
            }
        }
        Ok(())
    }

    /// Tainted ancestors of `target` (and `target` itself) in post-order.
    ///
    /// Iterative, so arbitrarily deep chains read without exhausting the
    /// call stack. Each stack entry carries whether its parents were already
    /// pushed; the second pop emits the node.
    fn evaluation_order(&self, target: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(target, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            if !visited.insert(id) {
                continue;
            }
            let node = &self.nodes[id.index()];
            if node.state == TaintState::Clean {
                continue;
            }
            stack.push((id, true));
            // Reversed so the first input's ancestry is emitted first.
            for input in node.inputs.values().rev() {
                if let Some(parent) = self.inputs[input.index()].parent {
                    let parent = self.outputs[parent.index()].node;
                    if !visited.contains(&parent) {
                        stack.push((parent, false));
                    }
                }
            }
        }
        order
    }

    /// Runs one node: pre-eval hooks, transform, post-eval hooks.
    ///
    /// Inputs are trimmed to their descriptor's size, so padding from a
    /// parent's size override never reaches the transform. Owned output
    /// buffers are moved out for the duration of the call and always put
    /// back, whether or not the evaluation succeeds.
    fn evaluate(&mut self, id: NodeId) -> Result<(), GraphError> {
        let idx = id.index();
        if self.nodes[idx].invalid {
            return Err(GraphError::InvalidState {
                node: self.nodes[idx].name.clone(),
                reason: "node is marked invalid".to_string(),
            });
        }

        let mut sources: SmallVec<[(BufferId, OutputId); 4]> = SmallVec::new();
        for (key, input) in &self.nodes[idx].inputs {
            let parent = self.inputs[input.index()]
                .parent
                .and_then(|parent| {
                    let port = &self.outputs[parent.index()];
                    port.descriptor.as_ref()?;
                    Some((port.buffer?, parent))
                })
                .ok_or_else(|| GraphError::InvalidState {
                    node: self.nodes[idx].name.clone(),
                    reason: format!("input '{key}' has no materialized parent"),
                })?;
            sources.push(parent);
        }

        let mut owned: SmallVec<[Option<BufferId>; 2]> = SmallVec::new();
        let mut slots: SmallVec<[Option<Vec<f64>>; 2]> = SmallVec::new();
        for output in self.nodes[idx].outputs.values() {
            match self.outputs[output.index()].buffer {
                Some(buffer) if self.buffers[buffer.index()].owner == *output => {
                    owned.push(Some(buffer));
                    slots.push(Some(std::mem::take(&mut self.buffers[buffer.index()].data)));
                }
                _ => {
                    owned.push(None);
                    slots.push(None);
                }
            }
        }

        let node = &self.nodes[idx];
        let transform = node.transform.clone();
        let mut invoked = false;
        let outcome = {
            let args = Args {
                node: &node.name,
                inputs: sources
                    .iter()
                    .map(|(buffer, output)| {
                        let data = self.buffers[buffer.index()].data.as_slice();
                        self.outputs[output.index()]
                            .descriptor
                            .as_ref()
                            .map_or(data, |dd| &data[..dd.size().min(data.len())])
                    })
                    .collect(),
                descriptors: sources
                    .iter()
                    .filter_map(|(_, output)| self.outputs[output.index()].descriptor.as_ref())
                    .collect(),
                held: node.held.as_deref(),
            };
            let mut results = Results { slots: &mut slots };
            self.run_stages(id, &args, &mut results, &transform, &mut invoked)
        };

        for (buffer, slot) in owned.into_iter().zip(slots) {
            if let (Some(buffer), Some(data)) = (buffer, slot) {
                self.buffers[buffer.index()].data = data;
            }
        }

        let debug_eval = self.config.debug;
        let node = &mut self.nodes[idx];
        if invoked {
            node.calls += 1;
        }
        match outcome {
            Ok(()) => {
                node.state = TaintState::Clean;
                if debug_eval {
                    debug!(node = %node.name, calls = node.calls, "evaluated");
                } else {
                    trace!(node = %node.name, calls = node.calls, "evaluated");
                }
                Ok(())
            }
            Err(err) => {
                warn!(node = %node.name, error = %err, "evaluation failed");
                Err(err)
            }
        }
    }

    fn run_stages<'a>(
        &self,
        id: NodeId,
        args: &Args<'a>,
        results: &mut Results<'a>,
        transform: &Transform,
        invoked: &mut bool,
    ) -> Result<(), GraphError> {
        let name = || self.nodes[id.index()].name.clone();

        let mut event = EvalEvent {
            node: id,
            stage: HookStage::PreEval,
            inputs: args,
            outputs: results,
        };
        self.hooks
            .fire_eval(&mut event)
            .map_err(|source| GraphError::Hook {
                node: name(),
                stage: HookStage::PreEval,
                source,
            })?;

        *invoked = true;
        transform(event.inputs, &mut *event.outputs).map_err(|source| GraphError::Evaluation {
            node: name(),
            source,
        })?;

        event.stage = HookStage::PostEval;
        self.hooks
            .fire_eval(&mut event)
            .map_err(|source| GraphError::Hook {
                node: name(),
                stage: HookStage::PostEval,
                source,
            })
    }
}
