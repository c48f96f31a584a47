//! Undirected attributed graph backed by keyed stores

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::graph::model::{ClusterId, Edge, EdgeId, Node, NodeId};
use crate::graph::GraphView;
use crate::storage::{MemoryStore, SharedStore};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Ascending id indices kept next to the stores
#[derive(Debug, Default)]
struct GraphIndex {
    node_ids: BTreeSet<NodeId>,
    edge_ids: BTreeSet<EdgeId>,
    next_edge_id: EdgeId,
}

/// Undirected graph over report ids.
///
/// Node and edge records live in keyed stores; the graph keeps the sorted id
/// sets used for membership tests and deterministic iteration. All structural
/// mutations go through a single lock.
pub struct Graph {
    nodes: SharedStore<Node>,
    edges: SharedStore<Edge>,
    index: Mutex<GraphIndex>,
    instance: u64,
    revision: AtomicU64,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index();
        f.debug_struct("Graph")
            .field("nodes", &index.node_ids.len())
            .field("edges", &index.edge_ids.len())
            .field("instance", &self.instance)
            .field("revision", &self.revision())
            .finish()
    }
}

impl Graph {
    /// An empty graph over the given stores; any existing content is discarded
    pub fn new(nodes: SharedStore<Node>, edges: SharedStore<Edge>) -> Self {
        nodes.remove_all();
        edges.remove_all();
        Self::with_index(nodes, edges, GraphIndex::default())
    }

    /// An empty graph backed by fresh in-memory stores
    pub fn in_memory() -> Self {
        Self::new(
            MemoryStore::<Node>::shared("nodes"),
            MemoryStore::<Edge>::shared("edges"),
        )
    }

    /// Adopt nodes and edges already present in the stores.
    ///
    /// Adjacency is rebuilt from the edge records. Fails if an edge references
    /// a missing node, is a self-loop or duplicates another edge's node pair.
    pub fn from_stores(nodes: SharedStore<Node>, edges: SharedStore<Edge>) -> Result<Self> {
        let node_ids = nodes.keys();
        let edge_ids = edges.keys();
        log::info!(
            "Loading graph from stores '{}' ({} nodes) and '{}' ({} edges)",
            nodes.name(),
            node_ids.len(),
            edges.name(),
            edge_ids.len()
        );

        for &id in &node_ids {
            let mut node = nodes.get(id).ok_or(Error::MissingNode(id))?;
            node.neighbors.clear();
            node.edges.clear();
            nodes.put(id, node);
        }

        for &edge_id in &edge_ids {
            let mut edge = edges.get(edge_id).ok_or(Error::MissingEdge(edge_id))?;
            if edge.source == edge.target {
                return Err(Error::Inconsistency(format!(
                    "edge {} is a self-loop on node {}",
                    edge_id, edge.source
                )));
            }
            let mut source = nodes.get(edge.source).ok_or(Error::MissingNode(edge.source))?;
            let mut target = nodes.get(edge.target).ok_or(Error::MissingNode(edge.target))?;
            if let Some(other) = source.edge_to(edge.target) {
                return Err(Error::Inconsistency(format!(
                    "edges {} and {} both connect nodes {} and {}",
                    other, edge_id, edge.source, edge.target
                )));
            }
            source.link(edge.target, edge_id);
            target.link(edge.source, edge_id);
            nodes.put(source.id, source);
            nodes.put(target.id, target);

            if edge.id != Some(edge_id) {
                edge.id = Some(edge_id);
                edges.put(edge_id, edge);
            }
        }

        let next_edge_id = edge_ids.iter().next_back().map_or(0, |max| max + 1);
        let index = GraphIndex {
            node_ids,
            edge_ids,
            next_edge_id,
        };
        Ok(Self::with_index(nodes, edges, index))
    }

    fn with_index(nodes: SharedStore<Node>, edges: SharedStore<Edge>, index: GraphIndex) -> Self {
        Self {
            nodes,
            edges,
            index: Mutex::new(index),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            revision: AtomicU64::new(0),
        }
    }

    fn index(&self) -> MutexGuard<'_, GraphIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self) {
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// Process-unique identity of this graph
    pub fn instance_id(&self) -> u64 {
        self.instance
    }

    /// Incremented by every structural change (nodes or edges added or removed)
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Insert a node; returns false if a node with the same id exists
    pub fn add_node(&self, node: Node) -> bool {
        let mut index = self.index();
        if !index.node_ids.insert(node.id) {
            return false;
        }
        self.nodes.put(node.id, node);
        self.bump_revision();
        true
    }

    /// Connect two existing nodes.
    ///
    /// Returns the new edge id, or `None` if the nodes were already neighbors.
    pub fn add_edge(&self, mut edge: Edge) -> Result<Option<EdgeId>> {
        let mut index = self.index();

        if !index.node_ids.contains(&edge.source) {
            return Err(Error::MissingNode(edge.source));
        }
        if !index.node_ids.contains(&edge.target) {
            return Err(Error::MissingNode(edge.target));
        }
        if edge.source == edge.target {
            return Err(Error::Inconsistency(format!(
                "self-loop on node {}",
                edge.source
            )));
        }

        let mut source = self
            .nodes
            .get(edge.source)
            .ok_or(Error::MissingNode(edge.source))?;
        let mut target = self
            .nodes
            .get(edge.target)
            .ok_or(Error::MissingNode(edge.target))?;

        match (source.is_neighbor(target.id), target.is_neighbor(source.id)) {
            (true, true) => return Ok(None),
            (false, false) => {}
            _ => {
                return Err(Error::Inconsistency(format!(
                    "neighborhood of nodes {} and {} is not symmetric",
                    source.id, target.id
                )))
            }
        }

        let id = index.next_edge_id;
        index.next_edge_id += 1;
        index.edge_ids.insert(id);
        edge.id = Some(id);

        source.link(target.id, id);
        target.link(source.id, id);
        self.nodes.put(source.id, source);
        self.nodes.put(target.id, target);
        self.edges.put(id, edge);

        self.bump_revision();
        Ok(Some(id))
    }

    pub fn node(&self, id: NodeId) -> Option<Node> {
        if !self.contains_node(id) {
            return None;
        }
        self.nodes.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<Edge> {
        if !self.contains_edge(id) {
            return None;
        }
        self.edges.get(id)
    }

    /// Neighbor nodes in ascending id order; `None` if the node is unknown
    pub fn neighbors(&self, id: NodeId) -> Option<Vec<Node>> {
        let node = self.node(id)?;
        let ids: Vec<NodeId> = node.neighbors.keys().copied().collect();
        let mut found = self.nodes.get_all(&ids);
        Some(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    pub fn neighbor_ids(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.node(id)
            .map(|node| node.neighbors.keys().copied().collect())
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.contains_node(b) && self.node(a).is_some_and(|node| node.is_neighbor(b))
    }

    /// Remove a node and every incident edge
    pub fn remove_node(&self, id: NodeId) -> Result<bool> {
        let mut index = self.index();
        if !index.node_ids.contains(&id) {
            return Ok(false);
        }
        let node = self.nodes.get(id).ok_or(Error::MissingNode(id))?;

        for (&neighbor_id, &edge_id) in &node.neighbors {
            let mut neighbor = self
                .nodes
                .get(neighbor_id)
                .ok_or(Error::MissingNode(neighbor_id))?;
            neighbor.unlink(id);
            self.nodes.put(neighbor_id, neighbor);
            self.edges.remove(edge_id);
            index.edge_ids.remove(&edge_id);
        }

        index.node_ids.remove(&id);
        self.nodes.remove(id);
        self.bump_revision();
        Ok(true)
    }

    pub fn remove_edge(&self, id: EdgeId) -> Result<bool> {
        let mut index = self.index();
        if !index.edge_ids.contains(&id) {
            return Ok(false);
        }
        let edge = self.edges.get(id).ok_or(Error::MissingEdge(id))?;

        for (end, other) in [(edge.source, edge.target), (edge.target, edge.source)] {
            let mut node = self.nodes.get(end).ok_or(Error::MissingNode(end))?;
            node.unlink(other);
            self.nodes.put(end, node);
        }

        index.edge_ids.remove(&id);
        self.edges.remove(id);
        self.bump_revision();
        Ok(true)
    }

    /// Drop every node and edge. Edge ids keep counting up.
    pub fn clear(&self) {
        let mut index = self.index();
        index.node_ids.clear();
        index.edge_ids.clear();
        self.nodes.remove_all();
        self.edges.remove_all();
        self.bump_revision();
    }

    /// Node ids in ascending order
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.index().node_ids.iter().copied().collect()
    }

    /// Edge ids in ascending order
    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.index().edge_ids.iter().copied().collect()
    }

    pub fn node_count(&self) -> usize {
        self.index().node_ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.index().edge_ids.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.index().node_ids.contains(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.index().edge_ids.contains(&id)
    }

    /// Overwrite the cluster label of a node
    pub fn set_cluster_id(&self, id: NodeId, cluster_id: ClusterId) -> Result<()> {
        let _index = self.index();
        let mut node = self.nodes.get(id).ok_or(Error::MissingNode(id))?;
        node.cluster_id = cluster_id;
        self.nodes.put(id, node);
        Ok(())
    }

    /// Set one string attribute of a node
    pub fn set_attribute(&self, id: NodeId, key: &str, value: &str) -> Result<()> {
        let _index = self.index();
        let mut node = self.nodes.get(id).ok_or(Error::MissingNode(id))?;
        node.set_attribute(key, value);
        self.nodes.put(id, node);
        Ok(())
    }

    /// A view holding every current node and edge id
    pub fn view(&self) -> GraphView<'_> {
        let index = self.index();
        GraphView::with_ids(self, index.node_ids.clone(), index.edge_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyedStore;

    fn line_graph(n: u64) -> Graph {
        let graph = Graph::in_memory();
        for id in 0..n {
            assert!(graph.add_node(Node::new(id)));
        }
        for id in 1..n {
            graph.add_edge(Edge::new(id - 1, id, 1.0)).unwrap();
        }
        graph
    }

    #[test]
    fn add_node_rejects_duplicates() {
        let graph = Graph::in_memory();
        assert!(graph.add_node(Node::new(7)));
        assert!(!graph.add_node(Node::new(7)));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn add_edge_is_symmetric_and_idempotent() {
        let graph = line_graph(2);
        assert_eq!(graph.edge_count(), 1);

        assert_eq!(graph.add_edge(Edge::new(1, 0, 0.3)).unwrap(), None);
        assert_eq!(graph.edge_count(), 1);

        let a = graph.node(0).unwrap();
        let b = graph.node(1).unwrap();
        assert_eq!(a.edge_to(1), b.edge_to(0));
        assert!(graph.are_neighbors(0, 1));
        assert!(graph.are_neighbors(1, 0));

        let edge = graph.edge(a.edge_to(1).unwrap()).unwrap();
        assert_eq!(edge.id, a.edge_to(1));
    }

    #[test]
    fn add_edge_requires_both_endpoints() {
        let graph = line_graph(1);
        assert!(matches!(
            graph.add_edge(Edge::new(0, 5, 1.0)),
            Err(Error::MissingNode(5))
        ));
        assert!(matches!(
            graph.add_edge(Edge::new(5, 0, 1.0)),
            Err(Error::MissingNode(5))
        ));
        assert!(graph.add_edge(Edge::new(0, 0, 1.0)).is_err());
    }

    #[test]
    fn asymmetric_adjacency_is_reported() {
        let nodes = MemoryStore::<Node>::shared("nodes");
        let edges = MemoryStore::<Edge>::shared("edges");
        let graph = Graph::new(nodes.clone(), edges);
        graph.add_node(Node::new(1));
        graph.add_node(Node::new(2));

        // corrupt the store behind the graph's back
        let mut broken = nodes.get(1).unwrap();
        broken.link(2, 99);
        nodes.put(1, broken);

        assert!(matches!(
            graph.add_edge(Edge::new(1, 2, 1.0)),
            Err(Error::Inconsistency(_))
        ));
    }

    #[test]
    fn neighbors_of_unknown_node_is_none() {
        let graph = line_graph(3);
        assert!(graph.neighbors(42).is_none());
        let ids: Vec<NodeId> = graph.neighbors(1).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn remove_node_cascades() {
        let graph = line_graph(3);
        assert!(graph.remove_node(1).unwrap());
        assert!(!graph.remove_node(1).unwrap());
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(0).unwrap().neighbors.is_empty());
        assert!(graph.node(2).unwrap().edges.is_empty());
    }

    #[test]
    fn remove_edge_unlinks_both_ends() {
        let graph = line_graph(2);
        let id = graph.edge_ids()[0];
        assert!(graph.remove_edge(id).unwrap());
        assert!(!graph.are_neighbors(0, 1));
        assert!(graph.edge(id).is_none());

        // ids are not reused
        let again = graph.add_edge(Edge::new(0, 1, 1.0)).unwrap().unwrap();
        assert_ne!(again, id);
    }

    #[test]
    fn revision_tracks_structure_only() {
        let graph = line_graph(2);
        let before = graph.revision();
        graph.set_cluster_id(0, 3).unwrap();
        assert_eq!(graph.revision(), before);
        graph.add_node(Node::new(9));
        assert!(graph.revision() > before);
        assert_ne!(graph.instance_id(), Graph::in_memory().instance_id());
    }

    #[test]
    fn from_stores_rebuilds_adjacency() {
        let nodes = MemoryStore::<Node>::shared("nodes");
        let edges = MemoryStore::<Edge>::shared("edges");
        for id in 1..=3 {
            nodes.put(id, Node::new(id));
        }
        edges.put(10, Edge::new(1, 2, 0.5));
        edges.put(11, Edge::new(3, 2, 0.5));

        let graph = Graph::from_stores(nodes, edges).unwrap();
        assert_eq!(graph.node_ids(), vec![1, 2, 3]);
        assert_eq!(graph.neighbor_ids(2).unwrap(), vec![1, 3]);
        assert_eq!(graph.edge(11).unwrap().id, Some(11));

        let fresh = graph.add_edge(Edge::new(1, 3, 1.0)).unwrap().unwrap();
        assert_eq!(fresh, 12);
    }

    #[test]
    fn from_stores_rejects_dangling_edges() {
        let nodes = MemoryStore::<Node>::shared("nodes");
        let edges = MemoryStore::<Edge>::shared("edges");
        nodes.put(1, Node::new(1));
        edges.put(0, Edge::new(1, 2, 0.5));
        assert!(matches!(
            Graph::from_stores(nodes, edges),
            Err(Error::MissingNode(2))
        ));
    }

    #[test]
    fn clear_empties_everything() {
        let graph = line_graph(4);
        graph.clear();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(0).is_none());
    }
}
