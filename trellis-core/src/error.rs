//! Error Taxonomy
//!
//! Every fallible operation in the crate returns [`GraphError`]. Errors carry a
//! [`Severity`]: recoverable errors are raised while building or closing a
//! graph and leave it in a usable state; fatal errors come out of a node's
//! transform during a read and are handed back with the original failure as
//! their source.

use thiserror::Error;

use crate::hooks::HookStage;

/// Error type produced by node transforms.
pub type EvalFailure = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a caller is expected to treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Raised during construction or closure. The graph is still valid and the
    /// caller may fix the topology and retry.
    Recoverable,

    /// Raised inside a node's transform. Terminates the read; nodes that were
    /// already clean keep their results.
    Fatal,
}

/// A hook refused a connection or aborted an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookRejection(pub String);

impl From<&str> for HookRejection {
    fn from(message: &str) -> Self {
        Self(message.to_string())
    }
}

impl From<String> for HookRejection {
    fn from(message: String) -> Self {
        Self(message)
    }
}

/// Structural problems found by `close()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClosureError {
    #[error("input '{input}' of node '{node}' is not bound")]
    UnboundInput { node: String, input: String },

    #[error("cycle detected through nodes [{}]", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("node '{node}' is marked invalid")]
    InvalidNode { node: String },

    #[error("output '{output}' of node '{node}' cannot alias input #{input}: {reason}")]
    InvalidView {
        node: String,
        output: String,
        input: usize,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("connection rejected at node '{node}' (port '{port}'): {reason}")]
    Connection {
        node: String,
        port: String,
        reason: String,
    },

    #[error("type check failed at node '{node}', port '{port}': expected {expected}, got {actual}")]
    TypeCheck {
        node: String,
        port: String,
        expected: String,
        actual: String,
    },

    #[error("graph is closed: cannot {action} (node '{node}')")]
    GraphClosed { node: String, action: String },

    #[error("closure failed: {0}")]
    Closure(#[from] ClosureError),

    #[error("node '{node}' is not closed")]
    NotClosed { node: String },

    #[error("{stage:?} hook rejected at node '{node}': {source}")]
    Hook {
        node: String,
        stage: HookStage,
        #[source]
        source: HookRejection,
    },

    #[error("invalid state at node '{node}': {reason}")]
    InvalidState { node: String, reason: String },

    #[error("unknown node kind '{0}'")]
    UnknownKind(String),

    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),

    #[error("evaluation failed at node '{node}': {source}")]
    Evaluation {
        node: String,
        #[source]
        source: EvalFailure,
    },
}

impl GraphError {
    pub fn severity(&self) -> Severity {
        match self {
            GraphError::Evaluation { .. } => Severity::Fatal,
            _ => Severity::Recoverable,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }

    /// Name of the node the error was raised at, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            GraphError::Connection { node, .. }
            | GraphError::TypeCheck { node, .. }
            | GraphError::GraphClosed { node, .. }
            | GraphError::NotClosed { node }
            | GraphError::Hook { node, .. }
            | GraphError::InvalidState { node, .. }
            | GraphError::Evaluation { node, .. } => Some(node.as_str()),
            GraphError::Closure(ClosureError::UnboundInput { node, .. })
            | GraphError::Closure(ClosureError::InvalidNode { node })
            | GraphError::Closure(ClosureError::InvalidView { node, .. }) => Some(node.as_str()),
            GraphError::Closure(ClosureError::Cycle { .. })
            | GraphError::UnknownKind(_)
            | GraphError::UnknownHandle(_) => None,
        }
    }

    /// Unwraps a fatal error into the transform's original failure.
    ///
    /// Returns `Err(self)` for every other variant.
    pub fn into_source(self) -> Result<EvalFailure, GraphError> {
        match self {
            GraphError::Evaluation { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}
