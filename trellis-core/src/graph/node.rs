//! Graph Nodes
//!
//! A node is a pure transform with ordered input and output ports. Nodes are
//! described by a [`NodeSpec`] and materialized into the graph's node arena by
//! [`Graph::add_node`](super::Graph::add_node).

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;

use super::connect::MissingInputPolicy;
use super::port::{InputId, OutputId};
use crate::data::{Args, DataDescriptor, Results, SizeFn, StorageKind, TypePolicy};
use crate::error::EvalFailure;

/// Handle to a node in the graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// Transform invoked when a tainted node is read.
///
/// Reads its parents' buffers through [`Args`] and writes its own owned
/// buffers through [`Results`], in place.
pub type Transform =
    Arc<dyn Fn(&Args<'_>, &mut Results<'_>) -> Result<(), EvalFailure> + Send + Sync>;

/// Taint state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaintState {
    /// The node's buffers reflect its current inputs.
    Clean,

    /// The node must re-run its transform before its outputs can be read.
    Tainted,
}

/// A node in the dataflow graph.
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) label: Option<String>,
    pub(crate) kind: Option<String>,

    /// Inputs in declaration order, keyed by port name.
    pub(crate) inputs: IndexMap<String, InputId>,

    /// Outputs in declaration order, keyed by port name.
    pub(crate) outputs: IndexMap<String, OutputId>,

    pub(crate) type_policy: TypePolicy,
    pub(crate) size_fn: Option<SizeFn>,
    pub(crate) transform: Transform,
    pub(crate) input_policy: MissingInputPolicy,

    /// Keys that may be created by keyed access regardless of the policy.
    pub(crate) allowed_keys: Option<Vec<String>>,

    /// Values emitted by a source node.
    pub(crate) held: Option<Vec<f64>>,

    pub(crate) state: TaintState,
    pub(crate) frozen: bool,
    pub(crate) frozen_tainted: bool,

    /// Set by [`Graph::invalidate`](super::Graph::invalidate). An invalid
    /// node can be neither closed nor evaluated.
    pub(crate) invalid: bool,
    pub(crate) immediate: bool,
    pub(crate) closed: bool,
    pub(crate) calls: u64,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Registry tag this node was built from, if any.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    pub fn inputs(&self) -> impl Iterator<Item = (&str, InputId)> + '_ {
        self.inputs.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, OutputId)> + '_ {
        self.outputs.iter().map(|(key, id)| (key.as_str(), *id))
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn state(&self) -> TaintState {
        self.state
    }

    pub fn is_tainted(&self) -> bool {
        self.state == TaintState::Tainted
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// True if a taint arrived while the node was frozen.
    pub fn is_frozen_tainted(&self) -> bool {
        self.frozen_tainted
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_source(&self) -> bool {
        self.held.is_some()
    }

    /// Number of times the transform has been invoked.
    pub fn call_count(&self) -> u64 {
        self.calls
    }

    pub fn input_policy(&self) -> MissingInputPolicy {
        self.input_policy
    }

    pub fn type_policy(&self) -> &TypePolicy {
        &self.type_policy
    }

    /// Values currently held by a source node.
    pub fn held(&self) -> Option<&[f64]> {
        self.held.as_deref()
    }

    /// Elements to allocate for an owned output carrying `dd`.
    pub(crate) fn storage_len(&self, dd: &DataDescriptor) -> usize {
        match &self.size_fn {
            Some(f) => f(dd),
            None => self.type_policy.element_count(dd),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("type_policy", &self.type_policy)
            .field("input_policy", &self.input_policy)
            .field("state", &self.state)
            .field("frozen", &self.frozen)
            .field("invalid", &self.invalid)
            .field("closed", &self.closed)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Builder describing a node before it is added to a graph.
///
/// ```rust,ignore
/// let spec = NodeSpec::new()
///     .name("scale")
///     .input("x")
///     .output("result")
///     .type_policy(TypePolicy::PassThrough)
///     .transform(|args, out| {
///         for (o, v) in out.output(0)?.iter_mut().zip(args.input(0)) {
///             *o = v * 2.0;
///         }
///         Ok(())
///     });
/// let node = graph.add_node(spec)?;
/// ```
#[derive(Clone)]
pub struct NodeSpec {
    pub(crate) name: Option<String>,
    pub(crate) label: Option<String>,
    pub(crate) kind: Option<String>,
    pub(crate) inputs: Vec<String>,
    pub(crate) outputs: Vec<(String, StorageKind)>,
    pub(crate) type_policy: TypePolicy,
    pub(crate) size_fn: Option<SizeFn>,
    pub(crate) transform: Option<Transform>,
    pub(crate) input_policy: Option<MissingInputPolicy>,
    pub(crate) allowed_keys: Option<Vec<String>>,
    pub(crate) held: Option<Vec<f64>>,
    pub(crate) immediate: bool,
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self {
            name: None,
            label: None,
            kind: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            type_policy: TypePolicy::PassThrough,
            size_fn: None,
            transform: None,
            input_policy: None,
            allowed_keys: None,
            held: None,
            immediate: false,
        }
    }
}

impl NodeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node name. Defaults to the kind tag (or `node`) followed by the
    /// node's insertion index.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(mut self, tag: impl Into<String>) -> Self {
        self.kind = Some(tag.into());
        self
    }

    pub fn input(mut self, key: impl Into<String>) -> Self {
        self.inputs.push(key.into());
        self
    }

    pub fn inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Declares an owned output.
    pub fn output(mut self, key: impl Into<String>) -> Self {
        self.outputs.push((key.into(), StorageKind::Allocatable));
        self
    }

    /// Declares an output aliasing the buffer that feeds input `input`.
    pub fn view_output(mut self, key: impl Into<String>, input: usize) -> Self {
        self.outputs.push((key.into(), StorageKind::View { input }));
        self
    }

    pub fn type_policy(mut self, policy: TypePolicy) -> Self {
        self.type_policy = policy;
        self
    }

    pub fn size_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&DataDescriptor) -> usize + Send + Sync + 'static,
    {
        self.size_fn = Some(Arc::new(f));
        self
    }

    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&Args<'_>, &mut Results<'_>) -> Result<(), EvalFailure> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(f));
        self
    }

    pub(crate) fn shared_transform(mut self, f: Transform) -> Self {
        self.transform = Some(f);
        self
    }

    pub(crate) fn shared_size_fn(mut self, f: Option<SizeFn>) -> Self {
        self.size_fn = f;
        self
    }

    /// Policy for connections beyond the declared inputs. Defaults to the
    /// graph's configured policy.
    pub fn input_policy(mut self, policy: MissingInputPolicy) -> Self {
        self.input_policy = Some(policy);
        self
    }

    pub fn allowed_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Immediate nodes re-evaluate as soon as they are tainted.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub(crate) fn held(mut self, data: Vec<f64>) -> Self {
        self.held = Some(data);
        self
    }
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("type_policy", &self.type_policy)
            .field("input_policy", &self.input_policy)
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}
