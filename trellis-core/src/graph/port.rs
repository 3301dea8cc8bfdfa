//! Ports
//!
//! An [`Output`] fans out to any number of [`Input`]s; an input binds to at
//! most one output, its parent. Both sides refer to each other by handle only.

use smallvec::SmallVec;

use super::node::NodeId;
use crate::data::{BufferId, DataDescriptor, StorageKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub(crate) u32);

impl InputId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl OutputId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Input {
    pub(crate) id: InputId,
    pub(crate) node: NodeId,
    pub(crate) key: String,
    pub(crate) parent: Option<OutputId>,
}

impl Input {
    pub fn id(&self) -> InputId {
        self.id
    }

    /// Owning node.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent(&self) -> Option<OutputId> {
        self.parent
    }

    pub fn is_bound(&self) -> bool {
        self.parent.is_some()
    }
}

#[derive(Debug)]
pub struct Output {
    pub(crate) id: OutputId,
    pub(crate) node: NodeId,
    pub(crate) key: String,
    pub(crate) storage: StorageKind,

    /// Set by the type pass of closure.
    pub(crate) descriptor: Option<DataDescriptor>,

    /// Owned or aliased buffer, set by the allocation pass.
    pub(crate) buffer: Option<BufferId>,

    pub(crate) consumers: SmallVec<[InputId; 4]>,
}

impl Output {
    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> StorageKind {
        self.storage
    }

    pub fn descriptor(&self) -> Option<&DataDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn buffer(&self) -> Option<BufferId> {
        self.buffer
    }

    pub fn consumers(&self) -> &[InputId] {
        &self.consumers
    }

    pub fn is_view(&self) -> bool {
        matches!(self.storage, StorageKind::View { .. })
    }
}
