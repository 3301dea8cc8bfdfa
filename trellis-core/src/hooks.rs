//! Hook Registry
//!
//! Hooks are callbacks attached to a node for one of three stages:
//!
//! - `OnConnect` fires after a link is established, producer side first. A
//!   rejection rolls the link back.
//! - `PreEval` fires before the node's transform. A rejection aborts the
//!   evaluation and the node stays tainted.
//! - `PostEval` fires after the transform with the freshly written outputs.
//!
//! Hooks on one (node, stage) run in registration order. Evaluation hooks see
//! the node's own owned buffers and nothing else.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::data::{Args, Results};
use crate::error::HookRejection;
use crate::graph::{InputId, NodeId, OutputId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HookStage {
    OnConnect,
    PreEval,
    PostEval,
}

/// Which end of a connection a hook's node is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectRole {
    Producer,
    Consumer,
}

pub struct ConnectEvent<'a> {
    pub node: NodeId,
    pub node_name: &'a str,
    pub role: ConnectRole,
    pub output: OutputId,
    pub input: InputId,
}

pub struct EvalEvent<'a, 'b> {
    pub node: NodeId,
    pub stage: HookStage,
    pub inputs: &'b Args<'a>,
    pub outputs: &'b mut Results<'a>,
}

pub type ConnectHook = Arc<dyn Fn(&ConnectEvent<'_>) -> Result<(), HookRejection> + Send + Sync>;
pub type EvalHook =
    Arc<dyn Fn(&mut EvalEvent<'_, '_>) -> Result<(), HookRejection> + Send + Sync>;

#[derive(Clone)]
pub enum Hook {
    Connect(ConnectHook),
    Eval(EvalHook),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Connect(_) => write!(f, "Hook::Connect(..)"),
            Hook::Eval(_) => write!(f, "Hook::Eval(..)"),
        }
    }
}

#[derive(Debug, Default)]
pub struct HookRegistry {
    hooks: HashMap<(NodeId, HookStage), Vec<Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect<F>(&mut self, node: NodeId, hook: F)
    where
        F: Fn(&ConnectEvent<'_>) -> Result<(), HookRejection> + Send + Sync + 'static,
    {
        self.hooks
            .entry((node, HookStage::OnConnect))
            .or_default()
            .push(Hook::Connect(Arc::new(hook)));
    }

    pub fn pre_eval<F>(&mut self, node: NodeId, hook: F)
    where
        F: Fn(&mut EvalEvent<'_, '_>) -> Result<(), HookRejection> + Send + Sync + 'static,
    {
        self.push_eval(node, HookStage::PreEval, Arc::new(hook));
    }

    pub fn post_eval<F>(&mut self, node: NodeId, hook: F)
    where
        F: Fn(&mut EvalEvent<'_, '_>) -> Result<(), HookRejection> + Send + Sync + 'static,
    {
        self.push_eval(node, HookStage::PostEval, Arc::new(hook));
    }

    fn push_eval(&mut self, node: NodeId, stage: HookStage, hook: EvalHook) {
        self.hooks
            .entry((node, stage))
            .or_default()
            .push(Hook::Eval(hook));
    }

    pub fn count(&self, node: NodeId, stage: HookStage) -> usize {
        self.hooks.get(&(node, stage)).map_or(0, Vec::len)
    }

    /// Runs the connect hooks of `event.node` in order, stopping at the first
    /// rejection.
    pub(crate) fn fire_connect(&self, event: &ConnectEvent<'_>) -> Result<(), HookRejection> {
        let Some(hooks) = self.hooks.get(&(event.node, HookStage::OnConnect)) else {
            return Ok(());
        };
        for hook in hooks {
            if let Hook::Connect(f) = hook {
                f(event)?;
            }
        }
        Ok(())
    }

    pub(crate) fn fire_eval(&self, event: &mut EvalEvent<'_, '_>) -> Result<(), HookRejection> {
        let Some(hooks) = self.hooks.get(&(event.node, event.stage)) else {
            return Ok(());
        };
        for hook in hooks {
            if let Hook::Eval(f) = hook {
                f(event)?;
            }
        }
        Ok(())
    }
}
