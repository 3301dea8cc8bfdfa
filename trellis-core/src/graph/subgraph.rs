//! Sub-graphs
//!
//! A sub-graph is a named group of nodes and nested sub-graphs that can be
//! closed on its own. Groups may share members; closing is idempotent, so a
//! shared node or sub-graph is closed by whichever close reaches it first.

use super::node::NodeId;
use super::Graph;
use crate::error::GraphError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubgraphId(pub(crate) u32);

impl SubgraphId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
pub struct Subgraph {
    pub(crate) id: SubgraphId,
    pub(crate) name: String,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) children: Vec<SubgraphId>,
    pub(crate) closed: bool,
}

impl Subgraph {
    pub fn id(&self) -> SubgraphId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn children(&self) -> &[SubgraphId] {
        &self.children
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Graph {
    pub fn add_subgraph(&mut self, name: impl Into<String>) -> SubgraphId {
        let id = SubgraphId(self.subgraphs.len() as u32);
        self.subgraphs.push(Subgraph {
            id,
            name: name.into(),
            nodes: Vec::new(),
            children: Vec::new(),
            closed: false,
        });
        id
    }

    pub fn subgraph(&self, id: SubgraphId) -> Result<&Subgraph, GraphError> {
        self.subgraphs
            .get(id.index())
            .ok_or(GraphError::UnknownHandle("subgraph"))
    }

    pub fn subgraphs(&self) -> impl Iterator<Item = &Subgraph> + '_ {
        self.subgraphs.iter()
    }

    /// Adds `node` to `subgraph`. Adding a node twice is a no-op.
    pub fn add_to_subgraph(&mut self, subgraph: SubgraphId, node: NodeId) -> Result<(), GraphError> {
        self.node(node)?;
        let sg = self
            .subgraphs
            .get_mut(subgraph.index())
            .ok_or(GraphError::UnknownHandle("subgraph"))?;
        if !sg.nodes.contains(&node) {
            sg.nodes.push(node);
        }
        Ok(())
    }

    /// Nests `child` inside `parent`.
    ///
    /// Fails if `child` already contains `parent`, directly or transitively.
    pub fn nest_subgraph(&mut self, parent: SubgraphId, child: SubgraphId) -> Result<(), GraphError> {
        self.subgraph(parent)?;
        self.subgraph(child)?;
        if self.subgraph_post_order(child).contains(&parent) {
            return Err(GraphError::InvalidState {
                node: self.subgraphs[child.index()].name.clone(),
                reason: format!(
                    "sub-graph already contains '{}'",
                    self.subgraphs[parent.index()].name
                ),
            });
        }
        let sg = &mut self.subgraphs[parent.index()];
        if !sg.children.contains(&child) {
            sg.children.push(child);
        }
        Ok(())
    }

    /// `root` and everything nested in it, children before parents, each once.
    pub(crate) fn subgraph_post_order(&self, root: SubgraphId) -> Vec<SubgraphId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.subgraphs.len()];
        self.visit_subgraph(root, &mut visited, &mut order);
        order
    }

    fn visit_subgraph(&self, id: SubgraphId, visited: &mut [bool], order: &mut Vec<SubgraphId>) {
        if std::mem::replace(&mut visited[id.index()], true) {
            return;
        }
        for &child in &self.subgraphs[id.index()].children {
            self.visit_subgraph(child, visited, order);
        }
        order.push(id);
    }
}
