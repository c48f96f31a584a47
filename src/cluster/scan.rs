//! SCAN: structural clustering of the proximity graph
//!
//! Nodes whose structure (closed neighborhood) is similar to the structures
//! of at least `mu` members of it are cores. Clusters grow breadth-first from
//! cores; nodes reached by no core become hubs or outliers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::error::{Error, Result};
use crate::graph::algorithms::adjacency;
use crate::graph::{ClusterId, Graph, GraphView, NodeId, NOISE, UNASSIGNED};

/// Node attribute flagging hubs
pub const HUB_ATTRIBUTE: &str = "hub";

/// Node attribute flagging outliers
pub const OUTLIER_ATTRIBUTE: &str = "outlier";

/// How non-members reached by no core are told apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HubRule {
    /// Walk the structure in order, starting with the node's own
    /// unassigned label; the first label that differs from it makes a hub.
    /// A non-member next to any labeled node is therefore a hub.
    #[default]
    FirstDifference,

    /// Like `FirstDifference`, but unassigned nodes are skipped so the
    /// comparison starts at the first labeled node of the structure
    FirstAssignedDifference,

    /// Hub iff the structure touches two or more distinct real clusters
    DistinctClusters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unclassified,
    NonMember,
    Member,
}

/// Outcome of a SCAN run
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Highest cluster id handed out (start id - 1 if no cluster was found)
    pub last_cluster_id: ClusterId,

    /// Cluster id -> member ids; hubs and outliers are listed under -1
    pub clusters: BTreeMap<ClusterId, Vec<NodeId>>,

    pub hubs: Vec<NodeId>,
    pub outliers: Vec<NodeId>,

    /// Ids of every core node, ascending
    pub cores: Vec<NodeId>,
}

impl ScanResult {
    /// Number of real clusters found
    pub fn cluster_count(&self) -> usize {
        self.clusters.keys().filter(|&&id| id != NOISE).count()
    }
}

/// SCAN over a graph or a view of it
pub struct Scan<'a> {
    graph: &'a Graph,
    view: Option<&'a GraphView<'a>>,
    config: ScanConfig,
}

impl<'a> Scan<'a> {
    pub fn new(graph: &'a Graph, config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph,
            view: None,
            config,
        })
    }

    /// Restrict the run to the nodes and edges of a view
    pub fn on_view(view: &'a GraphView<'a>, config: ScanConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            graph: view.graph(),
            view: Some(view),
            config,
        })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run SCAN and write cluster ids and hub/outlier flags onto the nodes
    pub fn run(&self) -> Result<ScanResult> {
        let start = Instant::now();
        log::info!(
            "Starting SCAN with epsilon {} and mu {}",
            self.config.epsilon,
            self.config.mu
        );

        let adjacency = adjacency(self.graph, self.view)?;
        let mut state = ScanState::new(&adjacency, self.config.epsilon);
        let mut result = ScanResult::default();

        let mut status: HashMap<NodeId, Status> =
            adjacency.keys().map(|&id| (id, Status::Unclassified)).collect();
        let mut labels: HashMap<NodeId, ClusterId> =
            adjacency.keys().map(|&id| (id, UNASSIGNED)).collect();
        let mut deferred: Vec<NodeId> = Vec::new();
        let mut current = self.config.start_cluster_id;

        log::debug!("Growing clusters over {} nodes", adjacency.len());
        for &v in adjacency.keys() {
            if status[&v] != Status::Unclassified {
                continue;
            }
            if !state.is_core(v, self.config.mu)? {
                status.insert(v, Status::NonMember);
                deferred.push(v);
                continue;
            }

            let mut queue: VecDeque<NodeId> =
                state.epsilon_neighborhood(v)?.iter().copied().collect();
            let mut queued: HashSet<NodeId> = queue.iter().copied().collect();

            while let Some(&y) = queue.front() {
                if state.is_core(y, self.config.mu)? {
                    let neighborhood = state.epsilon_neighborhood(y)?.clone();
                    for x in neighborhood {
                        match status[&x] {
                            Status::NonMember => {
                                status.insert(x, Status::Member);
                                labels.insert(x, current);
                                result.clusters.entry(current).or_default().push(x);
                            }
                            Status::Unclassified => {
                                status.insert(x, Status::Member);
                                labels.insert(x, current);
                                result.clusters.entry(current).or_default().push(x);
                                if queued.insert(x) {
                                    queue.push_back(x);
                                }
                            }
                            Status::Member => {}
                        }
                    }
                }
                queue.pop_front();
                queued.remove(&y);
            }
            current += 1;
        }

        let mut hubs = HashSet::new();
        for &v in &deferred {
            if status[&v] != Status::NonMember {
                continue;
            }
            let structure = std::iter::once(v).chain(adjacency[&v].iter().copied());
            let is_hub = match self.config.hub_rule {
                HubRule::FirstDifference => first_label_differs(structure.map(|x| labels[&x])),
                HubRule::FirstAssignedDifference => first_label_differs(
                    structure
                        .map(|x| labels[&x])
                        .filter(|&label| label != UNASSIGNED),
                ),
                HubRule::DistinctClusters => {
                    let distinct: HashSet<ClusterId> = structure
                        .map(|x| labels[&x])
                        .filter(|&label| label >= 0)
                        .collect();
                    distinct.len() >= 2
                }
            };

            labels.insert(v, NOISE);
            result.clusters.entry(NOISE).or_default().push(v);
            if is_hub {
                hubs.insert(v);
                result.hubs.push(v);
            } else {
                result.outliers.push(v);
            }
        }

        for &id in adjacency.keys() {
            if state.is_core(id, self.config.mu)? {
                result.cores.push(id);
            }
        }

        for (&id, &label) in &labels {
            if label == UNASSIGNED {
                return Err(Error::Inconsistency(format!("SCAN left node {} unassigned", id)));
            }
            let hub = hubs.contains(&id);
            let outlier = label == NOISE && !hub;
            self.graph.set_cluster_id(id, label)?;
            self.graph.set_attribute(id, HUB_ATTRIBUTE, flag(hub))?;
            self.graph.set_attribute(id, OUTLIER_ATTRIBUTE, flag(outlier))?;
        }

        result.last_cluster_id = current - 1;
        log::info!(
            "SCAN finished in {} ms: {} clusters, {} hubs, {} outliers, {} cores",
            start.elapsed().as_millis(),
            result.cluster_count(),
            result.hubs.len(),
            result.outliers.len(),
            result.cores.len()
        );
        Ok(result)
    }
}

/// True if some label differs from the first one
fn first_label_differs(mut labels: impl Iterator<Item = ClusterId>) -> bool {
    match labels.next() {
        Some(first) => labels.any(|label| label != first),
        None => false,
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Structures and memoized epsilon-neighborhoods of one run
struct ScanState<'s> {
    adjacency: &'s BTreeMap<NodeId, Vec<NodeId>>,
    epsilon: f64,
    neighborhoods: HashMap<NodeId, Vec<NodeId>>,
}

impl<'s> ScanState<'s> {
    fn new(adjacency: &'s BTreeMap<NodeId, Vec<NodeId>>, epsilon: f64) -> Self {
        Self {
            adjacency,
            epsilon,
            neighborhoods: HashMap::new(),
        }
    }

    fn neighbors(&self, v: NodeId) -> Result<&'s [NodeId]> {
        self.adjacency
            .get(&v)
            .map(Vec::as_slice)
            .ok_or(Error::MissingNode(v))
    }

    /// |S(v) ∩ S(w)| / sqrt(|S(v)| * |S(w)|) with S(x) = {x} ∪ N(x)
    fn similarity(&self, v: NodeId, w: NodeId) -> Result<f64> {
        let sv = sorted_structure(v, self.neighbors(v)?);
        let sw = sorted_structure(w, self.neighbors(w)?);
        let shared = intersection_size(&sv, &sw);
        Ok(shared as f64 / ((sv.len() * sw.len()) as f64).sqrt())
    }

    /// Members of the structure of v (v first) that are epsilon-similar to v
    fn epsilon_neighborhood(&mut self, v: NodeId) -> Result<&Vec<NodeId>> {
        if !self.neighborhoods.contains_key(&v) {
            let mut neighborhood = Vec::new();
            for w in std::iter::once(v).chain(self.neighbors(v)?.iter().copied()) {
                if self.similarity(v, w)? >= self.epsilon {
                    neighborhood.push(w);
                }
            }
            self.neighborhoods.insert(v, neighborhood);
        }
        self.neighborhoods.get(&v).ok_or(Error::MissingNode(v))
    }

    fn is_core(&mut self, v: NodeId, mu: usize) -> Result<bool> {
        Ok(self.epsilon_neighborhood(v)?.len() >= mu)
    }
}

fn sorted_structure(v: NodeId, neighbors: &[NodeId]) -> Vec<NodeId> {
    let mut structure = Vec::with_capacity(neighbors.len() + 1);
    structure.extend_from_slice(neighbors);
    if let Err(pos) = structure.binary_search(&v) {
        structure.insert(pos, v);
    }
    structure
}

fn intersection_size(a: &[NodeId], b: &[NodeId]) -> usize {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    shared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Node};

    fn graph(nodes: &[NodeId], edges: &[(NodeId, NodeId)]) -> Graph {
        let graph = Graph::in_memory();
        for &id in nodes {
            graph.add_node(Node::new(id));
        }
        for &(a, b) in edges {
            graph.add_edge(Edge::new(a, b, 1.0)).unwrap();
        }
        graph
    }

    /// Two triangles joined through node 7, plus an isolated node 9
    fn bridged_triangles() -> Graph {
        graph(
            &[1, 2, 3, 4, 5, 6, 7, 9],
            &[(1, 2), (2, 3), (1, 3), (4, 5), (5, 6), (4, 6), (3, 7), (7, 4)],
        )
    }

    #[test]
    fn rejects_invalid_parameters() {
        let g = graph(&[1], &[]);
        assert!(Scan::new(&g, ScanConfig::new(1.2, 2)).is_err());
        assert!(Scan::new(&g, ScanConfig::new(0.5, 1)).is_err());
    }

    #[test]
    fn intersection_of_sorted_lists() {
        assert_eq!(intersection_size(&[1, 2, 5, 9], &[2, 3, 5, 10]), 2);
        assert_eq!(sorted_structure(4, &[1, 7]), vec![1, 4, 7]);
    }

    #[test]
    fn epsilon_zero_finds_connected_components() {
        let g = graph(&[1, 2, 3, 4, 5], &[(1, 2), (2, 3), (4, 5)]);
        let result = Scan::new(&g, ScanConfig::new(0.0, 2)).unwrap().run().unwrap();

        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.last_cluster_id, 2);
        assert_eq!(result.clusters[&1], vec![1, 2, 3]);
        assert_eq!(result.clusters[&2], vec![4, 5]);
        assert!(result.hubs.is_empty() && result.outliers.is_empty());
        assert_eq!(g.node(5).unwrap().cluster_id, 2);
    }

    #[test]
    fn triangles_and_bridge() {
        let g = bridged_triangles();
        let result = Scan::new(&g, ScanConfig::new(0.7, 2)).unwrap().run().unwrap();

        assert_eq!(result.cluster_count(), 2);
        assert_eq!(result.clusters[&1], vec![1, 2, 3]);
        assert_eq!(result.clusters[&2], vec![4, 5, 6]);
        assert_eq!(result.hubs, vec![7]);
        assert_eq!(result.outliers, vec![9]);
        assert_eq!(result.clusters[&NOISE], vec![7, 9]);

        let bridge = g.node(7).unwrap();
        assert_eq!(bridge.cluster_id, NOISE);
        assert_eq!(bridge.attribute(HUB_ATTRIBUTE), Some("TRUE"));
        assert_eq!(bridge.attribute(OUTLIER_ATTRIBUTE), Some("FALSE"));
        assert_eq!(g.node(9).unwrap().attribute(OUTLIER_ATTRIBUTE), Some("TRUE"));
        assert_eq!(g.node(1).unwrap().attribute(HUB_ATTRIBUTE), Some("FALSE"));
    }

    #[test]
    fn pendant_node_next_to_one_cluster_is_a_hub() {
        // node 4 hangs off the triangle and is reached by no core
        let g = graph(&[1, 2, 3, 4], &[(1, 2), (2, 3), (1, 3), (3, 4)]);
        let result = Scan::new(&g, ScanConfig::new(0.8, 3)).unwrap().run().unwrap();

        assert_eq!(result.clusters[&1], vec![1, 2, 3]);
        assert_eq!(result.clusters[&NOISE], vec![4]);
        assert_eq!(result.hubs, vec![4]);
        assert!(result.outliers.is_empty());
        assert_eq!(g.node(4).unwrap().attribute(HUB_ATTRIBUTE), Some("TRUE"));
        assert_eq!(g.node(4).unwrap().attribute(OUTLIER_ATTRIBUTE), Some("FALSE"));
    }

    #[test]
    fn first_assigned_rule_ignores_the_node_itself() {
        let g = graph(&[1, 2, 3, 4], &[(1, 2), (2, 3), (1, 3), (3, 4)]);
        let mut config = ScanConfig::new(0.8, 3);
        config.hub_rule = HubRule::FirstAssignedDifference;
        let result = Scan::new(&g, config).unwrap().run().unwrap();
        assert!(result.hubs.is_empty());
        assert_eq!(result.outliers, vec![4]);

        let g = bridged_triangles();
        let mut config = ScanConfig::new(0.7, 2);
        config.hub_rule = HubRule::FirstAssignedDifference;
        let result = Scan::new(&g, config).unwrap().run().unwrap();
        assert_eq!(result.hubs, vec![7]);
        assert_eq!(result.outliers, vec![9]);
    }

    #[test]
    fn first_label_differs_compares_against_the_first() {
        assert!(!first_label_differs(std::iter::empty()));
        assert!(!first_label_differs([3, 3, 3].into_iter()));
        assert!(first_label_differs([UNASSIGNED, 1].into_iter()));
        assert!(first_label_differs([1, 1, 2].into_iter()));
    }

    #[test]
    fn distinct_cluster_rule_needs_two_real_clusters() {
        // node 4 hangs off the triangle: its structure touches cluster 1 only
        let g = graph(&[1, 2, 3, 4], &[(1, 2), (2, 3), (1, 3), (3, 4)]);
        let mut config = ScanConfig::new(0.8, 3);
        config.hub_rule = HubRule::DistinctClusters;
        let result = Scan::new(&g, config).unwrap().run().unwrap();
        assert!(result.hubs.is_empty());
        assert!(result.outliers.contains(&4));

        let g = bridged_triangles();
        let mut config = ScanConfig::new(0.7, 2);
        config.hub_rule = HubRule::DistinctClusters;
        let result = Scan::new(&g, config).unwrap().run().unwrap();
        assert_eq!(result.hubs, vec![7]);
    }

    #[test]
    fn start_cluster_id_is_respected() {
        let g = graph(&[1, 2], &[(1, 2)]);
        let mut config = ScanConfig::new(0.5, 2);
        config.start_cluster_id = 10;
        let result = Scan::new(&g, config).unwrap().run().unwrap();
        assert_eq!(result.clusters[&10], vec![1, 2]);
        assert_eq!(result.last_cluster_id, 10);

        config.start_cluster_id = -1;
        assert!(Scan::new(&g, config).is_err());
    }

    #[test]
    fn no_cores_means_no_clusters() {
        let g = graph(&[1, 2, 3], &[]);
        let result = Scan::new(&g, ScanConfig::default()).unwrap().run().unwrap();
        assert_eq!(result.cluster_count(), 0);
        assert_eq!(result.last_cluster_id, 0);
        assert_eq!(result.outliers, vec![1, 2, 3]);
    }

    #[test]
    fn view_hides_edges() {
        let g = graph(&[1, 2, 3], &[(1, 2), (2, 3)]);
        let mut view = GraphView::new(&g);
        view.add_node_ids([1, 2, 3]);
        view.add_edge_id(g.node(1).unwrap().edge_to(2).unwrap());
        let result = Scan::on_view(&view, ScanConfig::new(0.0, 2)).unwrap().run().unwrap();
        assert_eq!(result.clusters[&1], vec![1, 2]);
        assert_eq!(result.outliers, vec![3]);
    }
}
