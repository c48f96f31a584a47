//! Node and edge records of the attributed report graph

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type NodeId = u64;
pub type EdgeId = u64;
pub type ClusterId = i64;

/// Label of a node that no clustering pass has touched yet
pub const UNASSIGNED: ClusterId = i64::MIN;

/// Label of noise, outliers, hubs and demoted singletons
pub const NOISE: ClusterId = -1;

/// A graph node; its id is the id of the report it stands for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    /// Free-form string attributes (hub/outlier flags and similar)
    pub attributes: HashMap<String, String>,

    /// Neighbor id -> id of the connecting edge
    pub neighbors: BTreeMap<NodeId, EdgeId>,

    /// Ids of all incident edges
    pub edges: BTreeSet<EdgeId>,

    pub cluster_id: ClusterId,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            attributes: HashMap::new(),
            neighbors: BTreeMap::new(),
            edges: BTreeSet::new(),
            cluster_id: UNASSIGNED,
        }
    }

    pub fn degree(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_neighbor(&self, other: NodeId) -> bool {
        self.neighbors.contains_key(&other)
    }

    pub fn edge_to(&self, other: NodeId) -> Option<EdgeId> {
        self.neighbors.get(&other).copied()
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub(crate) fn link(&mut self, neighbor: NodeId, edge: EdgeId) {
        self.neighbors.insert(neighbor, edge);
        self.edges.insert(edge);
    }

    pub(crate) fn unlink(&mut self, neighbor: NodeId) -> Option<EdgeId> {
        let edge = self.neighbors.remove(&neighbor)?;
        self.edges.remove(&edge);
        Some(edge)
    }
}

/// An undirected, annotated proximity edge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Assigned by the graph on insertion
    pub id: Option<EdgeId>,

    pub source: NodeId,
    pub target: NodeId,

    /// Category similarity in [0, 1]
    pub weight: f64,

    /// Spatial distance in whole meters
    pub space_dist: u32,

    /// Temporal distance in whole days
    pub time_dist: u32,

    pub same_category: bool,
}

impl Edge {
    pub fn new(source: NodeId, target: NodeId, weight: f64) -> Self {
        Self {
            id: None,
            source,
            target,
            weight,
            space_dist: 0,
            time_dist: 0,
            same_category: false,
        }
    }

    /// Edge carrying the proximity annotations produced by the builder
    pub fn annotated(
        source: NodeId,
        target: NodeId,
        weight: f64,
        space_dist: u32,
        time_dist: u32,
        same_category: bool,
    ) -> Self {
        Self {
            id: None,
            source,
            target,
            weight,
            space_dist,
            time_dist,
            same_category,
        }
    }

    pub fn lowest(&self) -> NodeId {
        self.source.min(self.target)
    }

    pub fn highest(&self) -> NodeId {
        self.source.max(self.target)
    }

    pub fn connects(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }

    /// The endpoint opposite to `node`
    pub fn other_end(&self, node: NodeId) -> Result<NodeId> {
        if node == self.source {
            Ok(self.target)
        } else if node == self.target {
            Ok(self.source)
        } else {
            Err(Error::Inconsistency(format!(
                "node {} is not an endpoint of edge {}-{}",
                node, self.source, self.target
            )))
        }
    }
}

/// Undirected equality: {a, b} == {b, a}
impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.lowest() == other.lowest() && self.highest() == other.highest()
    }
}

impl Eq for Edge {}
