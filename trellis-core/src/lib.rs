//! Trellis Core
//!
//! A lazy dataflow-graph evaluation engine. Nodes are wired into a directed
//! acyclic graph, the graph is closed to validate it and allocate storage,
//! and results are read on demand. Reads only recompute what upstream changes
//! have tainted.
//!
//! # Architecture
//!
//! - `graph`: the node/port arenas, binding, closure and the taint scheduler
//! - `data`: data descriptors, type policies and buffers
//! - `hooks`: callbacks on connection and around evaluation
//! - `kinds`: named node kinds and the process-wide registry
//! - `snapshot`: serializable views of a graph for visualization
//! - `config`: graph settings
//! - `error`: the error type and its severities
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::Graph;
//!
//! let mut graph = Graph::new();
//! let a = graph.add_array("a", &[0.0, 1.0, 2.0])?;
//! let b = graph.add_array("b", &[1.0, 2.0, 3.0])?;
//!
//! let sum = graph.add_kind("sum", None)?;
//! graph.connect(a, sum)?;
//! graph.connect(b, sum)?;
//!
//! let product = graph.add_kind("product", None)?;
//! graph.connect(sum, product)?;
//! graph.connect(a, product)?;
//!
//! graph.close()?;
//! assert_eq!(graph.read_node(product)?, &[0.0, 3.0, 10.0]);
//!
//! graph.push(a, &[1.0, 1.0, 1.0])?;
//! assert_eq!(graph.read_node(product)?, &[2.0, 3.0, 4.0]);
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod kinds;
pub mod snapshot;

pub use config::GraphConfig;
pub use data::{Args, DType, DataDescriptor, Results, StorageKind, TypePolicy};
pub use error::{ClosureError, EvalFailure, GraphError, HookRejection, Severity};
pub use graph::{
    Consumer, Graph, GraphState, InputId, MissingInputPolicy, Node, NodeId, NodeSpec, OutputId,
    Producer, SubgraphId, TaintState,
};
pub use hooks::{ConnectEvent, ConnectRole, EvalEvent, HookStage};
pub use kinds::{KindRegistry, NodeKind};
pub use snapshot::GraphSnapshot;
