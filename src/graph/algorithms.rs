//! Graph algorithms shared by the clustering engines

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::graph::model::{ClusterId, NodeId, NOISE};
use crate::graph::{Graph, GraphView};

/// Union-Find over dense indices, union by size with path compression
pub struct DisjointSets {
    /// Parent pointers (parent[i] = parent of element i)
    parent: Vec<usize>,

    /// Size of the set rooted at each element
    size: Vec<usize>,
}

impl DisjointSets {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            size: vec![1; size],
        }
    }

    /// Find the root of the set containing x
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut current = x;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Union the sets containing x and y
    pub fn union(&mut self, x: usize, y: usize) {
        let root_x = self.find(x);
        let root_y = self.find(y);
        if root_x == root_y {
            return;
        }

        // Attach smaller tree under root of larger tree
        if self.size[root_x] > self.size[root_y] {
            self.parent[root_y] = root_x;
            self.size[root_x] += self.size[root_y];
        } else {
            self.parent[root_x] = root_y;
            self.size[root_y] += self.size[root_x];
        }
    }

    /// Size of the set containing x
    pub fn set_size(&mut self, x: usize) -> usize {
        let root = self.find(x);
        self.size[root]
    }
}

/// Snapshot of the adjacency of a graph or view: ascending node ids with
/// ascending neighbor lists
pub(crate) fn adjacency(
    graph: &Graph,
    view: Option<&GraphView<'_>>,
) -> Result<BTreeMap<NodeId, Vec<NodeId>>> {
    let mut adjacency = BTreeMap::new();
    for id in member_ids(graph, view) {
        let node = graph.node(id).ok_or(Error::MissingNode(id))?;
        let neighbors = node
            .neighbors
            .iter()
            .filter(|(neighbor, edge)| match view {
                Some(view) => view.contains_node(**neighbor) && view.contains_edge(**edge),
                None => true,
            })
            .map(|(neighbor, _)| *neighbor)
            .collect();
        adjacency.insert(id, neighbors);
    }
    Ok(adjacency)
}

/// Like [`adjacency`], with the weight of every connecting edge
pub(crate) fn weighted_adjacency(
    graph: &Graph,
    view: Option<&GraphView<'_>>,
) -> Result<BTreeMap<NodeId, Vec<(NodeId, f64)>>> {
    let mut adjacency = BTreeMap::new();
    for id in member_ids(graph, view) {
        let node = graph.node(id).ok_or(Error::MissingNode(id))?;
        let mut neighbors = Vec::with_capacity(node.degree());
        for (&neighbor, &edge_id) in &node.neighbors {
            if let Some(view) = view {
                if !view.contains_node(neighbor) || !view.contains_edge(edge_id) {
                    continue;
                }
            }
            let edge = graph.edge(edge_id).ok_or(Error::MissingEdge(edge_id))?;
            neighbors.push((neighbor, edge.weight));
        }
        adjacency.insert(id, neighbors);
    }
    Ok(adjacency)
}

/// Node ids of the view, or of the whole graph, ascending
pub(crate) fn member_ids(graph: &Graph, view: Option<&GraphView<'_>>) -> Vec<NodeId> {
    match view {
        Some(view) => view.node_ids().iter().copied().collect(),
        None => graph.node_ids(),
    }
}

/// Result of connected-component labeling
#[derive(Debug, Clone, Default)]
pub struct Components {
    /// Number of components with at least two nodes
    pub count: usize,

    /// Label -> member ids; isolated nodes are listed under -1
    pub members: BTreeMap<ClusterId, Vec<NodeId>>,
}

/// Label the connected components of a graph or view.
///
/// Components of two or more nodes get labels 1, 2, ... in ascending order
/// of their smallest node id; isolated nodes are labeled -1. Labels are
/// written onto the graph nodes.
pub fn label_connected_components(
    graph: &Graph,
    view: Option<&GraphView<'_>>,
) -> Result<Components> {
    let start = Instant::now();
    let adjacency = adjacency(graph, view)?;
    let ids: Vec<NodeId> = adjacency.keys().copied().collect();
    let position: HashMap<NodeId, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    log::info!("Labeling connected components of {} nodes", ids.len());

    let mut sets = DisjointSets::new(ids.len());
    for (i, neighbors) in adjacency.values().enumerate() {
        for neighbor in neighbors {
            if let Some(&j) = position.get(neighbor) {
                sets.union(i, j);
            }
        }
    }

    let mut labels: HashMap<usize, ClusterId> = HashMap::new();
    let mut components = Components::default();
    let mut labeled = 0;
    for (i, &id) in ids.iter().enumerate() {
        let root = sets.find(i);
        let label = if sets.set_size(i) < 2 {
            NOISE
        } else {
            *labels.entry(root).or_insert_with(|| {
                components.count += 1;
                components.count as ClusterId
            })
        };
        graph.set_cluster_id(id, label)?;
        components.members.entry(label).or_default().push(id);
        labeled += 1;
    }

    if labeled != ids.len() {
        return Err(Error::Inconsistency(format!(
            "labeled {} of {} nodes",
            labeled,
            ids.len()
        )));
    }

    log::info!(
        "Found {} components in {} ms",
        components.count,
        start.elapsed().as_millis()
    );
    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn graph_with_edges(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Graph {
        let graph = Graph::in_memory();
        for &id in nodes {
            graph.add_node(Node::new(id));
        }
        for &(a, b) in edges {
            graph.add_edge(Edge::new(a, b, 0.5)).unwrap();
        }
        graph
    }

    #[test]
    fn disjoint_sets_union_and_find() {
        let mut sets = DisjointSets::new(5);
        sets.union(0, 1);
        sets.union(3, 4);
        sets.union(1, 4);
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(0), sets.find(2));
        assert_eq!(sets.set_size(4), 4);
        assert_eq!(sets.set_size(2), 1);
    }

    #[test]
    fn components_are_numbered_by_smallest_member() {
        let graph = graph_with_edges(&[1, 2, 3, 5, 8, 9], &[(8, 9), (2, 5), (5, 1)]);
        let components = label_connected_components(&graph, None).unwrap();

        assert_eq!(components.count, 2);
        assert_eq!(components.members[&1], vec![1, 2, 5]);
        assert_eq!(components.members[&2], vec![8, 9]);
        assert_eq!(components.members[&NOISE], vec![3]);
        assert_eq!(graph.node(3).unwrap().cluster_id, NOISE);
        assert_eq!(graph.node(9).unwrap().cluster_id, 2);
    }

    #[test]
    fn components_of_a_view_ignore_hidden_edges() {
        let graph = graph_with_edges(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let mut view = GraphView::new(&graph);
        view.add_node_ids([1, 2, 3]);
        view.add_edge_id(graph.node(1).unwrap().edge_to(2).unwrap());

        let components = label_connected_components(&graph, Some(&view)).unwrap();
        assert_eq!(components.count, 1);
        assert_eq!(components.members[&1], vec![1, 2]);
        assert_eq!(components.members[&NOISE], vec![3]);
    }

    #[test]
    fn weighted_adjacency_reads_edge_weights() {
        let graph = graph_with_edges(&[1, 2], &[(1, 2)]);
        let adjacency = weighted_adjacency(&graph, None).unwrap();
        assert_eq!(adjacency[&1], vec![(2, 0.5)]);
        assert_eq!(adjacency[&2], vec![(1, 0.5)]);
    }
}
