//! Entry point tying the clustering engines to one graph and its stores

use crate::cluster::materialize::{ClusterMaterializer, MaterializeSummary};
use crate::cluster::modularity::{ModularityOptimizer, ModularityOutcome};
use crate::cluster::scan::{Scan, ScanResult};
use crate::cluster::Cluster;
use crate::config::{ModularityConfig, ScanConfig};
use crate::data::Report;
use crate::error::Result;
use crate::graph::algorithms::{label_connected_components, Components};
use crate::graph::{Graph, GraphView};
use crate::storage::{SharedStore, Stores};

/// Runs SCAN, modularity optimization or component labeling on a graph and
/// materializes the resulting labels.
///
/// The compact network used by the modularity engine is kept between runs
/// and rebuilt only when the graph structure or the sizing rule changed.
pub struct GraphClustering<'a> {
    graph: &'a Graph,
    materializer: ClusterMaterializer,
    optimizer: Option<ModularityOptimizer>,
}

impl<'a> GraphClustering<'a> {
    pub fn new(
        graph: &'a Graph,
        reports: SharedStore<Report>,
        clusters: SharedStore<Cluster>,
    ) -> Self {
        Self {
            graph,
            materializer: ClusterMaterializer::new(reports, clusters),
            optimizer: None,
        }
    }

    /// Use the report and cluster namespaces of `stores`
    pub fn with_stores(graph: &'a Graph, stores: &Stores) -> Self {
        Self::new(graph, stores.reports.clone(), stores.clusters.clone())
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    pub fn run_scan(&self, config: ScanConfig) -> Result<ScanResult> {
        Scan::new(self.graph, config)?.run()
    }

    pub fn run_scan_on(&self, view: &GraphView<'_>, config: ScanConfig) -> Result<ScanResult> {
        Scan::on_view(view, config)?.run()
    }

    /// Optimize modularity on the whole graph
    pub fn run_modularity(&mut self, config: &ModularityConfig) -> Result<ModularityOutcome> {
        config.validate()?;
        let optimizer = match self.optimizer.take() {
            Some(optimizer) if optimizer.is_current(self.graph, config.sizing) => optimizer,
            _ => ModularityOptimizer::new(self.graph, config.sizing)?,
        };
        let outcome = optimizer.run(self.graph, config);
        self.optimizer = Some(optimizer);
        outcome
    }

    /// Optimize modularity on a view; the network is derived fresh every time
    pub fn run_modularity_on(
        &self,
        view: &GraphView<'_>,
        config: &ModularityConfig,
    ) -> Result<ModularityOutcome> {
        config.validate()?;
        ModularityOptimizer::from_view(view, config.sizing)?.run(self.graph, config)
    }

    /// True if a cached network is ready for the next whole-graph run
    pub fn has_cached_network(&self) -> bool {
        self.optimizer.is_some()
    }

    pub fn label_components(&self, view: Option<&GraphView<'_>>) -> Result<Components> {
        label_connected_components(self.graph, view)
    }

    pub fn materialize(&self, view: Option<&GraphView<'_>>) -> Result<MaterializeSummary> {
        self.materializer.materialize(self.graph, view)
    }
}
