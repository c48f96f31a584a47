//! Filtered sub-views of a graph

use std::collections::BTreeSet;

use crate::graph::model::{EdgeId, NodeId};
use crate::graph::Graph;

/// A subset of the node and edge ids of one graph.
///
/// Views never copy node or edge records. Unknown node ids are dropped on
/// insertion; edge ids are taken as given and can be inspected with
/// [`GraphView::dangling_edge_ids`].
#[derive(Debug, Clone)]
pub struct GraphView<'g> {
    graph: &'g Graph,
    node_ids: BTreeSet<NodeId>,
    edge_ids: BTreeSet<EdgeId>,
}

impl<'g> GraphView<'g> {
    /// An empty view of `graph`
    pub fn new(graph: &'g Graph) -> Self {
        Self::with_ids(graph, BTreeSet::new(), BTreeSet::new())
    }

    pub(crate) fn with_ids(
        graph: &'g Graph,
        node_ids: BTreeSet<NodeId>,
        edge_ids: BTreeSet<EdgeId>,
    ) -> Self {
        Self {
            graph,
            node_ids,
            edge_ids,
        }
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    /// Add a node id; ids unknown to the graph are ignored
    pub fn add_node_id(&mut self, id: NodeId) -> bool {
        if !self.graph.contains_node(id) {
            return false;
        }
        self.node_ids.insert(id)
    }

    pub fn add_node_ids(&mut self, ids: impl IntoIterator<Item = NodeId>) {
        for id in ids {
            self.add_node_id(id);
        }
    }

    /// Add an edge id without validating it against the graph
    pub fn add_edge_id(&mut self, id: EdgeId) -> bool {
        self.edge_ids.insert(id)
    }

    pub fn add_edge_ids(&mut self, ids: impl IntoIterator<Item = EdgeId>) {
        self.edge_ids.extend(ids);
    }

    pub fn node_ids(&self) -> &BTreeSet<NodeId> {
        &self.node_ids
    }

    pub fn edge_ids(&self) -> &BTreeSet<EdgeId> {
        &self.edge_ids
    }

    pub fn node_count(&self) -> usize {
        self.node_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_ids.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_ids.contains(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edge_ids.contains(&id)
    }

    /// Edge ids that the graph does not know or whose endpoints are outside the view
    pub fn dangling_edge_ids(&self) -> Vec<EdgeId> {
        self.edge_ids
            .iter()
            .copied()
            .filter(|&id| match self.graph.edge(id) {
                Some(edge) => !self.contains_node(edge.source) || !self.contains_node(edge.target),
                None => true,
            })
            .collect()
    }

    /// Neighbors of `id` reachable through edges of this view, ascending
    pub fn neighbor_ids(&self, id: NodeId) -> Option<Vec<NodeId>> {
        if !self.contains_node(id) {
            return None;
        }
        let node = self.graph.node(id)?;
        Some(
            node.neighbors
                .iter()
                .filter(|(neighbor, edge)| {
                    self.contains_node(**neighbor) && self.contains_edge(**edge)
                })
                .map(|(neighbor, _)| *neighbor)
                .collect(),
        )
    }
}
