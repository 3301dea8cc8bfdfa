//! Node Kinds
//!
//! A [`NodeKind`] bundles what every node of one kind shares: declared ports,
//! a type policy, a missing-input policy and a transform. A [`KindRegistry`]
//! maps string tags to kinds so graphs can be assembled by name.
//!
//! # Global registry
//!
//! The process-wide registry returned by [`global`] is created on first use
//! and pre-loaded with the built-in kinds:
//!
//! | tag       | inputs      | outputs        | type policy      |
//! |-----------|-------------|----------------|------------------|
//! | `sum`     | grow by one | `result`       | `IdenticalShape` |
//! | `product` | grow by one | `result`       | `IdenticalShape` |
//! | `total`   | grow by one | `result`       | `ReduceToScalar` |
//! | `view`    | `input`     | view of input  | `PassThrough`    |
//! | `copy`    | grow paired | one per input  | `Pairwise`       |
//!
//! Sources are not registry kinds; they are created with
//! [`Graph::add_source`](crate::Graph::add_source) and tagged `source`.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::data::{Args, Results, SizeFn, StorageKind, TypePolicy};
use crate::error::{EvalFailure, GraphError};
use crate::graph::{MissingInputPolicy, NodeSpec, Transform};

#[derive(Clone)]
pub struct NodeKind {
    pub inputs: Vec<String>,
    pub outputs: Vec<(String, StorageKind)>,
    pub type_policy: TypePolicy,
    pub input_policy: MissingInputPolicy,
    pub transform: Transform,
    pub size_fn: Option<SizeFn>,
}

impl NodeKind {
    /// A kind with one owned output named `result` and no declared inputs.
    pub fn new<F>(type_policy: TypePolicy, input_policy: MissingInputPolicy, transform: F) -> Self
    where
        F: Fn(&Args<'_>, &mut Results<'_>) -> Result<(), EvalFailure> + Send + Sync + 'static,
    {
        Self {
            inputs: Vec::new(),
            outputs: vec![("result".to_string(), StorageKind::Allocatable)],
            type_policy,
            input_policy,
            transform: Arc::new(transform),
            size_fn: None,
        }
    }

    pub fn with_inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = (S, StorageKind)>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(|(k, s)| (k.into(), s)).collect();
        self
    }

    pub fn with_size_fn(mut self, f: SizeFn) -> Self {
        self.size_fn = Some(f);
        self
    }

    /// Node description for one instance of this kind.
    pub fn spec(&self, tag: &str) -> NodeSpec {
        let mut spec = NodeSpec::new()
            .kind(tag)
            .inputs(self.inputs.iter().cloned())
            .type_policy(self.type_policy.clone())
            .input_policy(self.input_policy)
            .shared_transform(self.transform.clone())
            .shared_size_fn(self.size_fn.clone());
        for (key, storage) in &self.outputs {
            spec = match storage {
                StorageKind::Allocatable => spec.output(key.clone()),
                StorageKind::View { input } => spec.view_output(key.clone(), *input),
            };
        }
        spec
    }
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeKind")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("type_policy", &self.type_policy)
            .field("input_policy", &self.input_policy)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct KindRegistry {
    kinds: IndexMap<String, NodeKind>,
}

impl KindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in kinds.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("sum", sum_kind());
        registry.register("product", product_kind());
        registry.register("total", total_kind());
        registry.register("view", view_kind());
        registry.register("copy", copy_kind());
        registry
    }

    /// Registers `kind` under `tag`, returning the kind it replaced.
    pub fn register(&mut self, tag: impl Into<String>, kind: NodeKind) -> Option<NodeKind> {
        let tag = tag.into();
        debug!(tag = %tag, "registered node kind");
        self.kinds.insert(tag, kind)
    }

    pub fn get(&self, tag: &str) -> Option<&NodeKind> {
        self.kinds.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.kinds.contains_key(tag)
    }

    /// Tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = &str> + '_ {
        self.kinds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub(crate) fn spec(&self, tag: &str) -> Result<NodeSpec, GraphError> {
        self.get(tag)
            .map(|kind| kind.spec(tag))
            .ok_or_else(|| GraphError::UnknownKind(tag.to_string()))
    }
}

static GLOBAL: OnceLock<RwLock<KindRegistry>> = OnceLock::new();

/// The process-wide registry used by [`Graph::add_kind`](crate::Graph::add_kind).
pub fn global() -> &'static RwLock<KindRegistry> {
    GLOBAL.get_or_init(|| RwLock::new(KindRegistry::with_builtins()))
}

/// Registers a kind in the process-wide registry.
pub fn register(tag: impl Into<String>, kind: NodeKind) -> Option<NodeKind> {
    global().write().register(tag, kind)
}

pub(crate) fn noop(_: &Args<'_>, _: &mut Results<'_>) -> Result<(), EvalFailure> {
    Ok(())
}

/// Transform of source nodes: copy the held values out.
pub(crate) fn emit_held(args: &Args<'_>, out: &mut Results<'_>) -> Result<(), EvalFailure> {
    let held = args
        .held()
        .ok_or_else(|| format!("node '{}' holds no data", args.node()))?;
    copy_prefix(out.output(0)?, held);
    Ok(())
}

/// Copies the common prefix of `src` into `dst`. Any tail of `dst` beyond
/// `src` is left as allocated.
fn copy_prefix(dst: &mut [f64], src: &[f64]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
}

fn fold_inputs(
    args: &Args<'_>,
    out: &mut Results<'_>,
    op: impl Fn(f64, f64) -> f64,
) -> Result<(), EvalFailure> {
    let buffer = out.output(0)?;
    let mut inputs = args.iter();
    let first = inputs
        .next()
        .ok_or_else(|| format!("node '{}' has no inputs", args.node()))?;
    copy_prefix(buffer, first);
    for input in inputs {
        for (acc, value) in buffer.iter_mut().zip(input) {
            *acc = op(*acc, *value);
        }
    }
    Ok(())
}

fn sum_kind() -> NodeKind {
    NodeKind::new(TypePolicy::IdenticalShape, MissingInputPolicy::AddOne, |args, out| {
        fold_inputs(args, out, |a, b| a + b)
    })
}

fn product_kind() -> NodeKind {
    NodeKind::new(TypePolicy::IdenticalShape, MissingInputPolicy::AddOne, |args, out| {
        fold_inputs(args, out, |a, b| a * b)
    })
}

fn total_kind() -> NodeKind {
    NodeKind::new(TypePolicy::ReduceToScalar, MissingInputPolicy::AddOne, |args, out| {
        let total: f64 = args.iter().flat_map(|input| input.iter()).sum();
        if let Some(slot) = out.output(0)?.first_mut() {
            *slot = total;
        }
        Ok(())
    })
}

/// Re-exposes its input without copying.
fn view_kind() -> NodeKind {
    NodeKind::new(TypePolicy::PassThrough, MissingInputPolicy::Reject, noop)
        .with_inputs(["input"])
        .with_outputs([("result", StorageKind::View { input: 0 })])
}

/// Outputs are created one per connected input.
fn copy_kind() -> NodeKind {
    let mut kind = NodeKind::new(TypePolicy::Pairwise, MissingInputPolicy::AddPair, |args, out| {
        for (i, input) in args.iter().enumerate() {
            copy_prefix(out.output(i)?, input);
        }
        Ok(())
    });
    kind.outputs.clear();
    kind
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_registered_in_order() {
        let registry = KindRegistry::with_builtins();
        let tags: Vec<_> = registry.tags().collect();
        assert_eq!(tags, vec!["sum", "product", "total", "view", "copy"]);
        assert!(!registry.contains("source"));
    }

    #[test]
    fn registering_twice_replaces() {
        let mut registry = KindRegistry::new();
        assert!(registry.register("sum", sum_kind()).is_none());
        assert!(registry.register("sum", product_kind()).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn spec_carries_kind_ports() {
        let registry = KindRegistry::with_builtins();
        let spec = registry.spec("view").unwrap();
        assert_eq!(spec.kind.as_deref(), Some("view"));
        assert_eq!(spec.inputs, vec!["input".to_string()]);
        assert_eq!(
            spec.outputs,
            vec![("result".to_string(), StorageKind::View { input: 0 })]
        );
        assert!(spec.transform.is_some());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let registry = KindRegistry::new();
        assert!(matches!(
            registry.spec("nope"),
            Err(GraphError::UnknownKind(tag)) if tag == "nope"
        ));
    }

    #[test]
    fn global_registry_accepts_host_kinds() {
        let kind = NodeKind::new(TypePolicy::PassThrough, MissingInputPolicy::Reject, noop)
            .with_inputs(["x"]);
        register("kinds-test-identity", kind);
        assert!(global().read().contains("kinds-test-identity"));
        assert!(global().read().contains("sum"));
    }
}
