//! Port Binding
//!
//! `connect(producer, consumer)` links an output to an input. The producer
//! side resolves to one output; the consumer side resolves to one input,
//! possibly creating it according to the node's [`MissingInputPolicy`].
//!
//! Once linked, `OnConnect` hooks run for the producer node and then for the
//! consumer node. A rejection undoes the link along with any port the
//! connection created.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::node::NodeId;
use super::port::{InputId, OutputId};
use super::Graph;
use crate::data::StorageKind;
use crate::error::GraphError;
use crate::hooks::{ConnectEvent, ConnectRole, HookStage};

/// What a node does with a connection once its declared inputs are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingInputPolicy {
    /// Fixed arity: refuse the connection.
    #[default]
    Reject,
    /// Append one input per extra connection.
    AddOne,
    /// Append inputs while the node has fewer than this many.
    AddOneUpTo(usize),
    /// Append one input together with a paired output.
    AddPair,
}

impl MissingInputPolicy {
    fn admits(self, current_inputs: usize) -> bool {
        match self {
            MissingInputPolicy::Reject => false,
            MissingInputPolicy::AddOne | MissingInputPolicy::AddPair => true,
            MissingInputPolicy::AddOneUpTo(max) => current_inputs < max,
        }
    }
}

/// Left-hand side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Producer {
    /// The node's only output, or its first output with no consumers.
    Node(NodeId),
    Output(OutputId),
}

impl From<NodeId> for Producer {
    fn from(node: NodeId) -> Self {
        Producer::Node(node)
    }
}

impl From<OutputId> for Producer {
    fn from(output: OutputId) -> Self {
        Producer::Output(output)
    }
}

/// Right-hand side of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumer {
    /// The first unbound input, or one created by the missing-input policy.
    Node(NodeId),
    Input(InputId),
    /// A named input, created if the node permits it.
    Keyed(NodeId, String),
}

impl From<NodeId> for Consumer {
    fn from(node: NodeId) -> Self {
        Consumer::Node(node)
    }
}

impl From<InputId> for Consumer {
    fn from(input: InputId) -> Self {
        Consumer::Input(input)
    }
}

impl From<(NodeId, &str)> for Consumer {
    fn from((node, key): (NodeId, &str)) -> Self {
        Consumer::Keyed(node, key.to_string())
    }
}

impl From<(NodeId, String)> for Consumer {
    fn from((node, key): (NodeId, String)) -> Self {
        Consumer::Keyed(node, key)
    }
}

/// Arena lengths before a connection, so a vetoed connection can drop the
/// ports it created.
#[derive(Clone, Copy)]
struct Mark {
    inputs: usize,
    outputs: usize,
}

impl Graph {
    /// Binds `to` to `from` and returns the bound input.
    pub fn connect(
        &mut self,
        from: impl Into<Producer>,
        to: impl Into<Consumer>,
    ) -> Result<InputId, GraphError> {
        let output = self.resolve_producer(from.into())?;
        let consumer = to.into();
        let consumer_node = match &consumer {
            Consumer::Node(node) | Consumer::Keyed(node, _) => *node,
            Consumer::Input(input) => self.input_port(*input)?.node,
        };
        self.ensure_open(consumer_node, "bind an input")?;

        let mark = Mark {
            inputs: self.inputs.len(),
            outputs: self.outputs.len(),
        };
        let input = match consumer {
            Consumer::Node(node) => self.next_free_input(node)?,
            Consumer::Input(input) => input,
            Consumer::Keyed(node, key) => self.keyed_input(node, &key)?,
        };
        self.bind(output, input, mark)
    }

    /// Connects each producer to `to` in order, stopping at the first error.
    ///
    /// Connections made before the error stay in place.
    pub fn connect_many<I, P>(&mut self, from: I, to: NodeId) -> Result<Vec<InputId>, GraphError>
    where
        I: IntoIterator<Item = P>,
        P: Into<Producer>,
    {
        from.into_iter()
            .map(|producer| self.connect(producer, to))
            .collect()
    }

    /// Input `key` of `node`, created if it does not exist yet.
    ///
    /// Unlike a keyed connection, access by key ignores the missing-input
    /// policy and `allowed_keys`: only a closed node refuses a new key.
    pub fn input(&mut self, node: NodeId, key: &str) -> Result<InputId, GraphError> {
        if let Some(id) = self.node(node)?.inputs.get(key) {
            return Ok(*id);
        }
        self.ensure_open(node, "create an input")?;
        Ok(self.new_input(node, key.to_string()))
    }

    fn resolve_producer(&self, producer: Producer) -> Result<OutputId, GraphError> {
        match producer {
            Producer::Output(output) => {
                self.output_port(output)?;
                Ok(output)
            }
            Producer::Node(node) => {
                let n = self.node(node)?;
                let mut outputs = n.outputs.values().copied();
                match n.outputs.len() {
                    0 => Err(GraphError::Connection {
                        node: n.name.clone(),
                        port: "<outputs>".to_string(),
                        reason: "node has no outputs".to_string(),
                    }),
                    1 => outputs.next().ok_or(GraphError::UnknownHandle("output")),
                    _ => outputs
                        .find(|id| self.outputs[id.index()].consumers.is_empty())
                        .ok_or_else(|| GraphError::Connection {
                            node: n.name.clone(),
                            port: "<outputs>".to_string(),
                            reason: "every output is already connected; name one explicitly"
                                .to_string(),
                        }),
                }
            }
        }
    }

    fn next_free_input(&mut self, node: NodeId) -> Result<InputId, GraphError> {
        let n = self.node(node)?;
        let free = n
            .inputs
            .values()
            .copied()
            .find(|id| self.inputs[id.index()].parent.is_none());
        if let Some(id) = free {
            return Ok(id);
        }

        let policy = n.input_policy;
        if !policy.admits(n.inputs.len()) {
            return Err(GraphError::Connection {
                node: n.name.clone(),
                port: "<next>".to_string(),
                reason: match policy {
                    MissingInputPolicy::AddOneUpTo(max) => {
                        format!("node accepts at most {max} inputs")
                    }
                    _ => format!(
                        "all {} inputs are bound and the node takes no more",
                        n.inputs.len()
                    ),
                },
            });
        }

        let key = self.fresh_key(node, &self.config.input_prefix);
        let input = self.new_input(node, key);
        if policy == MissingInputPolicy::AddPair {
            let key = self.fresh_output_key(node, &self.config.output_name);
            self.new_output(node, key, StorageKind::Allocatable);
        }
        Ok(input)
    }

    fn keyed_input(&mut self, node: NodeId, key: &str) -> Result<InputId, GraphError> {
        match self.node(node)?.inputs.get(key) {
            Some(id) => Ok(*id),
            None => self.create_keyed(node, key),
        }
    }

    fn create_keyed(&mut self, node: NodeId, key: &str) -> Result<InputId, GraphError> {
        let n = self.node(node)?;
        let permitted = match &n.allowed_keys {
            Some(allowed) => allowed.iter().any(|k| k == key),
            None => n.input_policy.admits(n.inputs.len()),
        };
        if !permitted {
            return Err(GraphError::Connection {
                node: n.name.clone(),
                port: key.to_string(),
                reason: match n.allowed_keys {
                    Some(_) => "key is not among the node's allowed inputs".to_string(),
                    None => format!("{:?} does not allow creating inputs", n.input_policy),
                },
            });
        }

        let pair = n.allowed_keys.is_none() && n.input_policy == MissingInputPolicy::AddPair;
        let input = self.new_input(node, key.to_string());
        if pair {
            let key = self.fresh_output_key(node, &format!("{}_{}", self.config.output_name, key));
            self.new_output(node, key, StorageKind::Allocatable);
        }
        Ok(input)
    }

    fn bind(&mut self, output: OutputId, input: InputId, mark: Mark) -> Result<InputId, GraphError> {
        let port = &self.inputs[input.index()];
        if let Some(parent) = port.parent {
            let consumer = &self.nodes[port.node.index()];
            let producer = &self.outputs[parent.index()];
            return Err(GraphError::Connection {
                node: consumer.name.clone(),
                port: port.key.clone(),
                reason: format!(
                    "already bound to {}.{}",
                    self.nodes[producer.node.index()].name,
                    producer.key
                ),
            });
        }

        self.inputs[input.index()].parent = Some(output);
        self.outputs[output.index()].consumers.push(input);

        let producer_node = self.outputs[output.index()].node;
        let consumer_node = self.inputs[input.index()].node;
        for (node, role) in [
            (producer_node, ConnectRole::Producer),
            (consumer_node, ConnectRole::Consumer),
        ] {
            let rejection = {
                let event = ConnectEvent {
                    node,
                    node_name: &self.nodes[node.index()].name,
                    role,
                    output,
                    input,
                };
                self.hooks.fire_connect(&event).err()
            };
            if let Some(source) = rejection {
                let name = self.nodes[node.index()].name.clone();
                self.unlink(output, input);
                self.rollback(mark);
                debug!(node = %name, ?role, "connection vetoed by hook");
                return Err(GraphError::Hook {
                    node: name,
                    stage: HookStage::OnConnect,
                    source,
                });
            }
        }

        debug!(
            producer = %self.nodes[producer_node.index()].name,
            output = %self.outputs[output.index()].key,
            consumer = %self.nodes[consumer_node.index()].name,
            input = %self.inputs[input.index()].key,
            "bound input"
        );
        Ok(input)
    }

    fn unlink(&mut self, output: OutputId, input: InputId) {
        self.inputs[input.index()].parent = None;
        self.outputs[output.index()].consumers.retain(|id| *id != input);
    }

    /// Drops ports created after `mark`. They are the most recent entries of
    /// both the arenas and their node's port maps.
    fn rollback(&mut self, mark: Mark) {
        while self.inputs.len() > mark.inputs {
            if let Some(port) = self.inputs.pop() {
                self.nodes[port.node.index()].inputs.pop();
            }
        }
        while self.outputs.len() > mark.outputs {
            if let Some(port) = self.outputs.pop() {
                self.nodes[port.node.index()].outputs.pop();
            }
        }
    }

    fn fresh_key(&self, node: NodeId, prefix: &str) -> String {
        let inputs = &self.nodes[node.index()].inputs;
        (inputs.len()..)
            .map(|i| format!("{prefix}_{i}"))
            .find(|key| !inputs.contains_key(key))
            .unwrap_or_else(|| prefix.to_string())
    }

    fn fresh_output_key(&self, node: NodeId, base: &str) -> String {
        let outputs = &self.nodes[node.index()].outputs;
        if !outputs.contains_key(base) {
            return base.to_string();
        }
        (outputs.len()..)
            .map(|i| format!("{base}_{i}"))
            .find(|key| !outputs.contains_key(key))
            .unwrap_or_else(|| base.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::data::TypePolicy;
    use crate::error::GraphError;
    use crate::graph::{Graph, MissingInputPolicy, NodeSpec};

    fn graph_with_source() -> (Graph, crate::graph::NodeId) {
        let mut graph = Graph::new();
        let a = graph.add_array("a", &[1.0, 2.0]).unwrap();
        (graph, a)
    }

    #[test]
    fn binds_declared_inputs_in_order() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(NodeSpec::new().inputs(["x", "y"]).output("result"))
            .unwrap();

        let first = graph.connect(a, node).unwrap();
        let second = graph.connect(a, node).unwrap();
        assert_eq!(graph.input_port(first).unwrap().key(), "x");
        assert_eq!(graph.input_port(second).unwrap().key(), "y");

        let out = graph.output(a, "result").unwrap();
        assert_eq!(graph.output_port(out).unwrap().consumers().len(), 2);
    }

    #[test]
    fn fixed_arity_rejects_extra_connection() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(NodeSpec::new().input("x").output("result"))
            .unwrap();
        graph.connect(a, node).unwrap();

        let err = graph.connect(a, node).unwrap_err();
        assert!(matches!(err, GraphError::Connection { .. }));
        assert!(err.is_recoverable());
        assert_eq!(graph.node(node).unwrap().input_count(), 1);
    }

    #[test]
    fn add_one_grows_inputs() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(
                NodeSpec::new()
                    .output("result")
                    .input_policy(MissingInputPolicy::AddOne),
            )
            .unwrap();
        for _ in 0..3 {
            graph.connect(a, node).unwrap();
        }
        let keys: Vec<_> = graph.node(node).unwrap().inputs().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["input_0", "input_1", "input_2"]);
    }

    #[test]
    fn add_one_up_to_stops_at_limit() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(
                NodeSpec::new()
                    .output("result")
                    .input_policy(MissingInputPolicy::AddOneUpTo(2)),
            )
            .unwrap();
        graph.connect(a, node).unwrap();
        graph.connect(a, node).unwrap();
        assert!(graph.connect(a, node).is_err());
        assert_eq!(graph.node(node).unwrap().input_count(), 2);
    }

    #[test]
    fn add_pair_creates_matching_output() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(
                NodeSpec::new()
                    .type_policy(TypePolicy::Pairwise)
                    .input_policy(MissingInputPolicy::AddPair),
            )
            .unwrap();
        graph.connect(a, node).unwrap();
        graph.connect(a, node).unwrap();
        let n = graph.node(node).unwrap();
        assert_eq!(n.input_count(), 2);
        assert_eq!(n.output_count(), 2);
    }

    #[test]
    fn rebinding_a_bound_input_fails() {
        let (mut graph, a) = graph_with_source();
        let b = graph.add_array("b", &[3.0, 4.0]).unwrap();
        let node = graph
            .add_node(NodeSpec::new().input("x").output("result"))
            .unwrap();
        let x = graph.connect(a, (node, "x")).unwrap();

        let err = graph.connect(b, x).unwrap_err();
        match err {
            GraphError::Connection { port, reason, .. } => {
                assert_eq!(port, "x");
                assert!(reason.contains("a.result"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn keyed_access_is_get_or_create() {
        let (mut graph, _) = graph_with_source();
        let node = graph
            .add_node(
                NodeSpec::new()
                    .output("result")
                    .input_policy(MissingInputPolicy::AddOne),
            )
            .unwrap();
        let created = graph.input(node, "weights").unwrap();
        let again = graph.input(node, "weights").unwrap();
        assert_eq!(created, again);
        assert_eq!(graph.node(node).unwrap().input_count(), 1);
    }

    #[test]
    fn keyed_access_ignores_fixed_arity() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(NodeSpec::new().input("x").output("result"))
            .unwrap();

        let weights = graph.input(node, "weights").unwrap();
        assert_eq!(graph.input_port(weights).unwrap().key(), "weights");
        assert_eq!(graph.node(node).unwrap().input_count(), 2);

        // The created input binds like a declared one.
        graph.connect(a, weights).unwrap();
        assert!(graph.connect(a, (node, "bias")).is_err());
    }

    #[test]
    fn keyed_access_refused_once_closed() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(NodeSpec::new().input("x").output("result"))
            .unwrap();
        graph.connect(a, node).unwrap();
        graph.close().unwrap();

        assert!(graph.input(node, "x").is_ok());
        assert!(matches!(
            graph.input(node, "late"),
            Err(GraphError::GraphClosed { .. })
        ));
    }

    #[test]
    fn allowed_keys_limit_keyed_creation() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(NodeSpec::new().output("result").allowed_keys(["lhs", "rhs"]))
            .unwrap();

        graph.connect(a, (node, "lhs")).unwrap();
        let err = graph.connect(a, (node, "other")).unwrap_err();
        assert!(matches!(err, GraphError::Connection { port, .. } if port == "other"));
        assert_eq!(graph.node(node).unwrap().input_count(), 1);
    }

    #[test]
    fn multi_output_producer_uses_first_unconnected_output() {
        let (mut graph, a) = graph_with_source();
        let split = graph
            .add_node(NodeSpec::new().input("x").output("left").output("right"))
            .unwrap();
        graph.connect(a, split).unwrap();
        let sink = graph
            .add_node(
                NodeSpec::new()
                    .output("result")
                    .input_policy(MissingInputPolicy::AddOne),
            )
            .unwrap();

        let first = graph.connect(split, sink).unwrap();
        let second = graph.connect(split, sink).unwrap();
        let left = graph.output(split, "left").unwrap();
        let right = graph.output(split, "right").unwrap();
        assert_eq!(graph.input_port(first).unwrap().parent(), Some(left));
        assert_eq!(graph.input_port(second).unwrap().parent(), Some(right));
        assert!(graph.connect(split, sink).is_err());
    }

    #[test]
    fn hook_veto_rolls_back_created_ports() {
        let (mut graph, a) = graph_with_source();
        let node = graph
            .add_node(
                NodeSpec::new()
                    .output("result")
                    .input_policy(MissingInputPolicy::AddPair),
            )
            .unwrap();
        graph
            .hooks_mut()
            .on_connect(node, |_| Err("closed for business".into()));

        let err = graph.connect(a, node).unwrap_err();
        assert!(matches!(err, GraphError::Hook { .. }));
        let n = graph.node(node).unwrap();
        assert_eq!(n.input_count(), 0);
        assert_eq!(n.output_count(), 1);
        let out = graph.output(a, "result").unwrap();
        assert!(graph.output_port(out).unwrap().consumers().is_empty());
    }
}
