//! Compact CSR network derived from a graph or view

use std::collections::HashMap;
use std::mem;

use serde::{Deserialize, Serialize};

use crate::cluster::modularity::NetworkSizing;
use crate::error::Result;
use crate::graph::algorithms::weighted_adjacency;
use crate::graph::model::NodeId;
use crate::graph::{Graph, GraphView};

/// Zero-based, weighted, undirected network in compressed sparse row form.
///
/// Every undirected edge is stored twice, once per endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactNetwork {
    /// Number of indexed nodes
    pub node_count: usize,

    /// offsets[i] to offsets[i+1] defines the neighbor range for node i
    pub offsets: Vec<usize>,

    /// Concatenated neighbor lists
    pub neighbors: Vec<usize>,

    /// Weight of each entry of `neighbors`
    pub edge_weights: Vec<f64>,

    /// Sum of incident edge weights per node
    pub node_weights: Vec<f64>,

    /// Graph id of every candidate node, ascending; index i maps to node_ids[i]
    node_ids: Vec<NodeId>,
}

impl CompactNetwork {
    /// Build the network of a whole graph
    pub fn from_graph(graph: &Graph, sizing: NetworkSizing) -> Result<Self> {
        Self::build(graph, None, sizing)
    }

    /// Build the network of the nodes and edges of a view
    pub fn from_view(view: &GraphView<'_>, sizing: NetworkSizing) -> Result<Self> {
        Self::build(view.graph(), Some(view), sizing)
    }

    fn build(graph: &Graph, view: Option<&GraphView<'_>>, sizing: NetworkSizing) -> Result<Self> {
        let adjacency = weighted_adjacency(graph, view)?;
        let node_ids: Vec<NodeId> = adjacency.keys().copied().collect();
        let index_of: HashMap<NodeId, usize> =
            node_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();

        // One line per undirected edge, seen from its lower endpoint
        let mut lines: Vec<(usize, usize, f64)> = Vec::new();
        let mut highest: Option<usize> = None;
        for (&id, neighbors) in &adjacency {
            for &(neighbor, weight) in neighbors {
                if neighbor <= id {
                    continue;
                }
                let (Some(&a), Some(&b)) = (index_of.get(&id), index_of.get(&neighbor)) else {
                    continue;
                };
                highest = highest.max(Some(b));
                lines.push((a, b, weight));
            }
        }

        let node_count = match sizing {
            NetworkSizing::HighestParticipating => highest.map_or(0, |h| h + 1),
            NetworkSizing::AllNodes => node_ids.len(),
        };

        let mut degrees = vec![0usize; node_count];
        for &(a, b, _) in &lines {
            degrees[a] += 1;
            degrees[b] += 1;
        }

        let mut offsets = Vec::with_capacity(node_count + 1);
        offsets.push(0);
        let mut offset = 0;
        for &degree in &degrees {
            offset += degree;
            offsets.push(offset);
        }

        let mut neighbors = vec![0usize; offset];
        let mut edge_weights = vec![0.0; offset];
        let mut filled = vec![0usize; node_count];
        for &(a, b, weight) in &lines {
            let pos = offsets[a] + filled[a];
            neighbors[pos] = b;
            edge_weights[pos] = weight;
            filled[a] += 1;

            let pos = offsets[b] + filled[b];
            neighbors[pos] = a;
            edge_weights[pos] = weight;
            filled[b] += 1;
        }

        let mut node_weights = vec![0.0; node_count];
        for (&neighbor, &weight) in neighbors.iter().zip(&edge_weights) {
            node_weights[neighbor] += weight;
        }

        let network = Self {
            node_count,
            offsets,
            neighbors,
            edge_weights,
            node_weights,
            node_ids,
        };
        log::info!(
            "Compact network has {} nodes and {} edges ({} bytes)",
            network.node_count,
            network.edge_count(),
            network.memory_usage()
        );
        if network.node_count < network.node_ids.len() {
            log::warn!(
                "{} nodes are outside the compact network and will not be labeled",
                network.node_ids.len() - network.node_count
            );
        }
        Ok(network)
    }

    /// Neighbor indices of a node, ascending
    pub fn neighbors_of(&self, node: usize) -> &[usize] {
        &self.neighbors[self.offsets[node]..self.offsets[node + 1]]
    }

    pub fn weights_of(&self, node: usize) -> &[f64] {
        &self.edge_weights[self.offsets[node]..self.offsets[node + 1]]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.offsets[node + 1] - self.offsets[node]
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.neighbors_of(a).binary_search(&b).is_ok()
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.neighbors.len() / 2
    }

    /// Sum of the weights of all undirected edges
    pub fn total_edge_weight(&self) -> f64 {
        self.edge_weights.iter().sum::<f64>() / 2.0
    }

    /// Graph id of the node at `index`
    pub fn node_id(&self, index: usize) -> Option<NodeId> {
        if index < self.node_count {
            self.node_ids.get(index).copied()
        } else {
            None
        }
    }

    /// Indexed graph ids, in index order
    pub fn indexed_ids(&self) -> &[NodeId] {
        &self.node_ids[..self.node_count]
    }

    /// Graph ids that have no index and will not receive a label
    pub fn excluded_nodes(&self) -> &[NodeId] {
        &self.node_ids[self.node_count..]
    }

    /// Estimate memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>()
            + self.offsets.capacity() * mem::size_of::<usize>()
            + self.neighbors.capacity() * mem::size_of::<usize>()
            + self.edge_weights.capacity() * mem::size_of::<f64>()
            + self.node_weights.capacity() * mem::size_of::<f64>()
            + self.node_ids.capacity() * mem::size_of::<NodeId>()
    }
}
