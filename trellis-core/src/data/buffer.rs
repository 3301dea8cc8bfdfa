//! Buffers
//!
//! Storage for output values. A buffer is created once at closure, owned by
//! exactly one output, and reused in place on every evaluation. Outputs
//! declared as views alias the buffer of an upstream output instead of
//! owning one.
//!
//! All buffers live in the graph's buffer arena, so an alias can never outlive
//! the storage it points at.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::descriptor::DataDescriptor;
use crate::error::EvalFailure;
use crate::graph::OutputId;

/// Handle to a buffer in the graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u32);

impl BufferId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// How an output gets its storage at closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Owned storage sized from the output's descriptor.
    Allocatable,
    /// Alias of the buffer feeding the node's input at this position.
    View { input: usize },
}

#[derive(Debug)]
pub(crate) struct Buffer {
    pub(crate) owner: OutputId,
    pub(crate) data: Vec<f64>,
}

/// Read-only view of a node's inputs during evaluation.
pub struct Args<'a> {
    pub(crate) node: &'a str,
    pub(crate) inputs: SmallVec<[&'a [f64]; 4]>,
    pub(crate) descriptors: SmallVec<[&'a DataDescriptor; 4]>,
    pub(crate) held: Option<&'a [f64]>,
}

impl<'a> Args<'a> {
    pub fn node(&self) -> &'a str {
        self.node
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Values of input `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range; closure guarantees every declared
    /// input is bound, so a transform can rely on its own arity.
    pub fn input(&self, index: usize) -> &'a [f64] {
        self.inputs[index]
    }

    pub fn descriptor(&self, index: usize) -> &'a DataDescriptor {
        self.descriptors[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a [f64]> + '_ {
        self.inputs.iter().copied()
    }

    /// Data held by a source node.
    pub fn held(&self) -> Option<&'a [f64]> {
        self.held
    }
}

/// Write access to the buffers a node owns.
///
/// View outputs appear as empty slots: a node never writes through an alias.
pub struct Results<'a> {
    pub(crate) slots: &'a mut [Option<Vec<f64>>],
}

impl<'a> Results<'a> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Mutable buffer of output `index`.
    pub fn output(&mut self, index: usize) -> Result<&mut [f64], EvalFailure> {
        match self.slots.get_mut(index) {
            Some(Some(buffer)) => Ok(buffer.as_mut_slice()),
            Some(None) => Err(format!("output #{index} is a view and cannot be written").into()),
            None => Err(format!("output #{index} does not exist").into()),
        }
    }

    /// Read-only access, used by post-evaluation hooks.
    pub fn get(&self, index: usize) -> Option<&[f64]> {
        self.slots.get(index)?.as_deref()
    }
}
