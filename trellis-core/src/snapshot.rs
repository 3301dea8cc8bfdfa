//! Graph Snapshots
//!
//! A read-only, serializable picture of a graph for visualization tools:
//! topology, descriptors, buffer aliasing, taint state and call counts.
//! Taking a snapshot never evaluates anything.

use serde::Serialize;

use crate::data::{DataDescriptor, StorageKind};
use crate::graph::{Graph, GraphState, TaintState};

#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub name: String,
    pub state: GraphState,
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub subgraphs: Vec<SubgraphSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: u32,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub state: TaintState,
    pub closed: bool,
    pub frozen: bool,
    pub invalid: bool,
    pub immediate: bool,
    pub calls: u64,
    pub inputs: Vec<InputSnapshot>,
    pub outputs: Vec<OutputSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputSnapshot {
    pub key: String,
    pub bound: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSnapshot {
    pub key: String,
    pub storage: StorageKind,
    pub descriptor: Option<DataDescriptor>,
    /// Index of the buffer in the graph's arena, shared by views.
    pub buffer: Option<u32>,
}

/// One bound input: `from.output -> to.input`.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeSnapshot {
    pub from: u32,
    pub output: String,
    pub to: u32,
    pub input: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphSnapshot {
    pub name: String,
    pub nodes: Vec<u32>,
    pub children: Vec<u32>,
    pub closed: bool,
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Graph {
    pub fn snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|node| NodeSnapshot {
                id: node.id.raw(),
                name: node.name.clone(),
                label: node.label.clone(),
                kind: node.kind.clone(),
                state: node.state,
                closed: node.closed,
                frozen: node.frozen,
                invalid: node.invalid,
                immediate: node.immediate,
                calls: node.calls,
                inputs: node
                    .inputs
                    .iter()
                    .map(|(key, id)| InputSnapshot {
                        key: key.clone(),
                        bound: self.inputs[id.index()].parent.is_some(),
                    })
                    .collect(),
                outputs: node
                    .outputs
                    .iter()
                    .map(|(key, id)| {
                        let port = &self.outputs[id.index()];
                        OutputSnapshot {
                            key: key.clone(),
                            storage: port.storage,
                            descriptor: port.descriptor.clone(),
                            buffer: port.buffer.map(|b| b.0),
                        }
                    })
                    .collect(),
            })
            .collect();

        let edges = self
            .inputs
            .iter()
            .filter_map(|input| {
                let parent = &self.outputs[input.parent?.index()];
                Some(EdgeSnapshot {
                    from: parent.node.raw(),
                    output: parent.key.clone(),
                    to: input.node.raw(),
                    input: input.key.clone(),
                })
            })
            .collect();

        let subgraphs = self
            .subgraphs
            .iter()
            .map(|sg| SubgraphSnapshot {
                name: sg.name.clone(),
                nodes: sg.nodes.iter().map(|n| n.raw()).collect(),
                children: sg.children.iter().map(|c| c.0).collect(),
                closed: sg.closed,
            })
            .collect();

        GraphSnapshot {
            name: self.config.name.clone(),
            state: self.state,
            nodes,
            edges,
            subgraphs,
        }
    }
}
