//! Modularity-based community detection
//!
//! The graph is converted once into a [`CompactNetwork`]; every run copies it
//! into a [`Network`], optimizes the clustering from several random starts and
//! writes the best partition back onto the graph nodes.

pub mod network;

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::ModularityConfig;
use crate::error::{Error, Result};
use crate::graph::{ClusterId, CompactNetwork, Graph, GraphView, NodeId, NOISE};

pub use network::Network;

/// Node weighting of the quality function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModularityFunction {
    /// Node weight = sum of incident edge weights
    #[default]
    Standard,
    /// Unit node weights
    Alternative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    Louvain,
    LouvainMultilevel,
    Slm,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Algorithm::Louvain => "Louvain algorithm",
            Algorithm::LouvainMultilevel => "Louvain algorithm with multilevel refinement",
            Algorithm::Slm => "smart local moving algorithm",
        };
        f.write_str(name)
    }
}

/// Which nodes receive an index in the compact network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkSizing {
    /// Indices up to the highest one that takes part in an edge; trailing
    /// nodes without edges are left out and keep their previous label.
    ///
    /// On a graph without edges no node is indexed, so a freshly built graph
    /// keeps `UNASSIGNED` everywhere and materializing it fails. Use
    /// `AllNodes` to label such graphs as noise.
    #[default]
    HighestParticipating,
    /// Every node gets an index
    AllNodes,
}

/// Result of one optimizer run
#[derive(Debug, Clone)]
pub struct ModularityOutcome {
    /// Quality of the retained partition
    pub modularity: f64,

    /// Quality of the all-singletons partition
    pub singleton_modularity: f64,

    /// Number of communities with more than one member
    pub communities: usize,

    /// Seed the generator was created from
    pub seed: u64,

    /// Label written onto each indexed node
    pub labels: Vec<(NodeId, ClusterId)>,

    /// Nodes left out of the network and therefore not relabeled
    pub unlabeled: Vec<NodeId>,
}

/// Cached compact network of one graph plus the optimization driver
#[derive(Debug, Clone)]
pub struct ModularityOptimizer {
    network: CompactNetwork,
    graph_instance: u64,
    graph_revision: u64,
    whole_graph: bool,
    sizing: NetworkSizing,
}

impl ModularityOptimizer {
    /// Derive the compact network of a whole graph
    pub fn new(graph: &Graph, sizing: NetworkSizing) -> Result<Self> {
        let revision = graph.revision();
        Self::check_not_empty(graph.node_count())?;
        log::info!("Initializing modularity optimizer");
        let network = CompactNetwork::from_graph(graph, sizing)?;
        Ok(Self {
            network,
            graph_instance: graph.instance_id(),
            graph_revision: revision,
            whole_graph: true,
            sizing,
        })
    }

    /// Derive the compact network of a view
    pub fn from_view(view: &GraphView<'_>, sizing: NetworkSizing) -> Result<Self> {
        let graph = view.graph();
        Self::check_not_empty(view.node_count())?;
        log::info!("Initializing modularity optimizer on a view");
        let network = CompactNetwork::from_view(view, sizing)?;
        Ok(Self {
            network,
            graph_instance: graph.instance_id(),
            graph_revision: graph.revision(),
            whole_graph: false,
            sizing,
        })
    }

    fn check_not_empty(node_count: usize) -> Result<()> {
        if node_count == 0 {
            return Err(Error::invalid("graph", "contains no nodes"));
        }
        Ok(())
    }

    pub fn network(&self) -> &CompactNetwork {
        &self.network
    }

    pub fn sizing(&self) -> NetworkSizing {
        self.sizing
    }

    /// True if the cached network still describes the whole of `graph`
    pub fn is_current(&self, graph: &Graph, sizing: NetworkSizing) -> bool {
        self.whole_graph
            && self.sizing == sizing
            && self.graph_instance == graph.instance_id()
            && self.graph_revision == graph.revision()
    }

    /// Optimize and write the best partition onto the nodes of `graph`.
    ///
    /// Communities of two or more nodes are labeled 1, 2, ... by descending
    /// size; nodes left alone are labeled -1.
    pub fn run(&self, graph: &Graph, config: &ModularityConfig) -> Result<ModularityOutcome> {
        config.validate()?;
        if graph.instance_id() != self.graph_instance {
            return Err(Error::Inconsistency(
                "modularity network was derived from a different graph".to_string(),
            ));
        }

        let seed = config.seed_or_random();
        let mut network = Network::from_compact(&self.network, config.function);
        log::info!(
            "Running {} on {} nodes and {} edges ({} random starts, {} iterations, seed {})",
            config.algorithm,
            network.node_count(),
            network.edge_count(),
            config.random_starts,
            config.iterations,
            seed
        );

        let total = network.total_edge_weight();
        let resolution = match config.function {
            ModularityFunction::Standard if total > 0.0 => config.resolution / total,
            _ => config.resolution,
        };
        let singleton_modularity = network.quality(resolution);

        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut best: Option<(f64, Vec<usize>)> = None;
        for random_start in 0..config.random_starts {
            network.init_singleton_clusters();

            let mut iteration = 0;
            let quality = loop {
                let update = match config.algorithm {
                    Algorithm::Louvain => network.run_louvain(resolution, &mut rng),
                    Algorithm::LouvainMultilevel => {
                        network.run_louvain_multilevel(resolution, &mut rng)
                    }
                    Algorithm::Slm => network.run_slm(resolution, &mut rng),
                };
                iteration += 1;
                let quality = network.quality(resolution);
                if iteration >= config.iterations || !update {
                    break quality;
                }
            };

            log::debug!(
                "Random start {}: quality {:.4} after {} iterations, {} clusters",
                random_start + 1,
                quality,
                iteration,
                network.cluster_count()
            );

            if best.as_ref().map_or(true, |(max, _)| quality > *max) {
                network.order_clusters_by_size();
                best = Some((quality, network.clusters().to_vec()));
            }
        }

        let (modularity, clusters) =
            best.ok_or_else(|| Error::Inconsistency("no random start was completed".to_string()))?;
        let (labels, communities) = adapt_cluster_ids(&clusters);

        let mut written = Vec::with_capacity(labels.len());
        for (index, &label) in labels.iter().enumerate() {
            let id = self
                .network
                .node_id(index)
                .ok_or_else(|| {
                    Error::Inconsistency(format!("no node for network index {}", index))
                })?;
            graph.set_cluster_id(id, label)?;
            written.push((id, label));
        }

        log::info!(
            "Maximum modularity in {} random starts: {:.4}, {} communities, {} ms",
            config.random_starts,
            modularity,
            communities,
            start.elapsed().as_millis()
        );

        Ok(ModularityOutcome {
            modularity,
            singleton_modularity,
            communities,
            seed,
            labels: written,
            unlabeled: self.network.excluded_nodes().to_vec(),
        })
    }
}

/// Singleton clusters become -1, the others are shifted to start at 1.
/// Returns the labels and the number of multi-member communities.
fn adapt_cluster_ids(clusters: &[usize]) -> (Vec<ClusterId>, usize) {
    let mut sizes: HashMap<usize, usize> = HashMap::new();
    for &c in clusters {
        *sizes.entry(c).or_insert(0) += 1;
    }
    let labels = clusters
        .iter()
        .map(|c| if sizes[c] == 1 { NOISE } else { *c as ClusterId + 1 })
        .collect();
    let communities = sizes.values().filter(|&&size| size > 1).count();
    (labels, communities)
}
