//! Dataflow Graph
//!
//! The graph owns every node, port and buffer in flat arenas and hands out
//! copyable handles. Back references (an input's parent, an output's
//! consumers) are handles too, so ownership stays acyclic.
//!
//! # Lifecycle
//!
//! 1. Nodes are added and wired while the graph is OPEN (see `connect`).
//! 2. `close()` checks that every input is bound and the graph is acyclic,
//!    derives a descriptor for every output and allocates buffers.
//! 3. Reads evaluate tainted nodes lazily; pushes and explicit taints
//!    invalidate downstream nodes (see `scheduler`).
//!
//! A graph is single-writer: reads need `&mut self` because evaluation updates
//! buffers and taint state in place.

mod closure;
mod connect;
mod node;
mod port;
mod scheduler;
mod subgraph;

pub use connect::{Consumer, MissingInputPolicy, Producer};
pub use node::{Node, NodeId, NodeSpec, TaintState, Transform};
pub use port::{Input, InputId, Output, OutputId};
pub use subgraph::{Subgraph, SubgraphId};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::GraphConfig;
use crate::data::{Buffer, DataDescriptor, StorageKind, TypePolicy};
use crate::error::GraphError;
use crate::hooks::HookRegistry;
use crate::kinds::{self, KindRegistry};

/// Graph-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphState {
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Graph {
    pub(crate) config: GraphConfig,
    pub(crate) state: GraphState,
    pub(crate) nodes: Vec<Node>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) buffers: Vec<Buffer>,
    pub(crate) subgraphs: Vec<Subgraph>,
    pub(crate) hooks: HookRegistry,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            config,
            state: GraphState::Open,
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            buffers: Vec::new(),
            subgraphs: Vec::new(),
            hooks: HookRegistry::new(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == GraphState::Closed
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes.get(id.index()).ok_or(GraphError::UnknownHandle("node"))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(GraphError::UnknownHandle("node"))
    }

    /// First node with the given name.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    pub fn input_port(&self, id: InputId) -> Result<&Input, GraphError> {
        self.inputs.get(id.index()).ok_or(GraphError::UnknownHandle("input"))
    }

    pub fn output_port(&self, id: OutputId) -> Result<&Output, GraphError> {
        self.outputs
            .get(id.index())
            .ok_or(GraphError::UnknownHandle("output"))
    }

    /// Output of `node` named `key`.
    ///
    /// Unlike inputs, outputs are never created on access.
    pub fn output(&self, node: NodeId, key: &str) -> Result<OutputId, GraphError> {
        let n = self.node(node)?;
        n.outputs
            .get(key)
            .copied()
            .ok_or_else(|| GraphError::Connection {
                node: n.name.clone(),
                port: key.to_string(),
                reason: "no output with this key".to_string(),
            })
    }

    /// Output of `node` at declaration position `index`.
    pub fn output_at(&self, node: NodeId, index: usize) -> Result<OutputId, GraphError> {
        let n = self.node(node)?;
        n.outputs
            .get_index(index)
            .map(|(_, id)| *id)
            .ok_or_else(|| GraphError::Connection {
                node: n.name.clone(),
                port: format!("#{index}"),
                reason: format!("node has {} outputs", n.outputs.len()),
            })
    }

    /// Descriptor of an output. `None` until the owning node is closed.
    pub fn descriptor(&self, output: OutputId) -> Result<Option<&DataDescriptor>, GraphError> {
        Ok(self.output_port(output)?.descriptor.as_ref())
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Adds a node to the arena and creates its declared ports.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<NodeId, GraphError> {
        let index = self.nodes.len();
        let name = spec.name.clone().unwrap_or_else(|| {
            format!("{}{}", spec.kind.as_deref().unwrap_or("node"), index)
        });
        if self.is_closed() {
            return Err(GraphError::GraphClosed {
                node: name,
                action: "add a node".to_string(),
            });
        }

        let duplicate = first_duplicate(spec.inputs.iter().map(String::as_str))
            .map(|key| ("input", key))
            .or_else(|| {
                first_duplicate(spec.outputs.iter().map(|(key, _)| key.as_str()))
                    .map(|key| ("output", key))
            });
        if let Some((side, key)) = duplicate {
            return Err(GraphError::InvalidState {
                node: name,
                reason: format!("{side} '{key}' is declared twice"),
            });
        }

        let id = NodeId(index as u32);
        let input_policy = spec
            .input_policy
            .unwrap_or(self.config.default_input_policy);
        let transform: Transform = match spec.transform {
            Some(f) => f,
            None => Arc::new(kinds::noop),
        };

        self.nodes.push(Node {
            id,
            name,
            label: spec.label,
            kind: spec.kind,
            inputs: Default::default(),
            outputs: Default::default(),
            type_policy: spec.type_policy,
            size_fn: spec.size_fn,
            transform,
            input_policy,
            allowed_keys: spec.allowed_keys,
            held: spec.held,
            state: TaintState::Tainted,
            frozen: false,
            frozen_tainted: false,
            invalid: false,
            immediate: spec.immediate,
            closed: false,
            calls: 0,
        });

        for key in spec.inputs {
            self.new_input(id, key);
        }
        for (key, storage) in spec.outputs {
            self.new_output(id, key, storage);
        }

        debug!(node = %self.nodes[index].name, id = index, "added node");
        Ok(id)
    }

    /// Adds a source node holding `data`, described by `descriptor`.
    ///
    /// The node has no inputs and one output; its transform copies the held
    /// data into the output buffer. Replace the data with [`Graph::push`].
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        descriptor: DataDescriptor,
        data: Vec<f64>,
    ) -> Result<NodeId, GraphError> {
        let name = name.into();
        if data.len() != descriptor.size() {
            return Err(GraphError::InvalidState {
                node: name,
                reason: format!(
                    "source holds {} values but {} describes {}",
                    data.len(),
                    descriptor,
                    descriptor.size()
                ),
            });
        }
        let spec = NodeSpec::new()
            .name(name)
            .kind("source")
            .output(self.config.output_name.clone())
            .type_policy(TypePolicy::Fixed(descriptor))
            .input_policy(MissingInputPolicy::Reject)
            .transform(kinds::emit_held)
            .held(data);
        self.add_node(spec)
    }

    /// Adds a one-dimensional `Float64` source.
    pub fn add_array(
        &mut self,
        name: impl Into<String>,
        data: &[f64],
    ) -> Result<NodeId, GraphError> {
        self.add_source(name, DataDescriptor::vector(data.len()), data.to_vec())
    }

    /// Adds a node of a kind registered in the process-wide registry.
    pub fn add_kind(&mut self, tag: &str, name: Option<&str>) -> Result<NodeId, GraphError> {
        let spec = {
            let registry = kinds::global().read();
            registry.spec(tag)?
        };
        self.add_node(match name {
            Some(name) => spec.name(name),
            None => spec,
        })
    }

    /// Adds a node of a kind from a caller-owned registry.
    pub fn add_kind_from(
        &mut self,
        registry: &KindRegistry,
        tag: &str,
        name: Option<&str>,
    ) -> Result<NodeId, GraphError> {
        let spec = registry.spec(tag)?;
        self.add_node(match name {
            Some(name) => spec.name(name),
            None => spec,
        })
    }

    pub(crate) fn new_input(&mut self, node: NodeId, key: String) -> InputId {
        let id = InputId(self.inputs.len() as u32);
        self.inputs.push(Input {
            id,
            node,
            key: key.clone(),
            parent: None,
        });
        self.nodes[node.index()].inputs.insert(key, id);
        id
    }

    pub(crate) fn new_output(
        &mut self,
        node: NodeId,
        key: String,
        storage: StorageKind,
    ) -> OutputId {
        let id = OutputId(self.outputs.len() as u32);
        self.outputs.push(Output {
            id,
            node,
            key: key.clone(),
            storage,
            descriptor: None,
            buffer: None,
            consumers: Default::default(),
        });
        self.nodes[node.index()].outputs.insert(key, id);
        id
    }

    /// Fails with `GraphClosed` if the graph or `node` no longer accepts
    /// structural changes.
    pub(crate) fn ensure_open(&self, node: NodeId, action: &str) -> Result<(), GraphError> {
        let n = self.node(node)?;
        if self.is_closed() || n.closed {
            return Err(GraphError::GraphClosed {
                node: n.name.clone(),
                action: action.to_string(),
            });
        }
        Ok(())
    }
}

fn first_duplicate<'a>(keys: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen = HashSet::new();
    keys.into_iter()
        .find(|key| !seen.insert(*key))
        .map(str::to_string)
}
