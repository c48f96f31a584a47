//! Turns node labels into persisted cluster aggregates

use std::collections::BTreeMap;
use std::time::Instant;

use crate::cluster::Cluster;
use crate::data::Report;
use crate::error::{Error, Result};
use crate::graph::algorithms::member_ids;
use crate::graph::{ClusterId, Graph, GraphView, NodeId, NOISE, UNASSIGNED};
use crate::storage::SharedStore;

/// What a materialization pass produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    /// Number of persisted clusters
    pub clusters: usize,

    /// Label and size of the largest cluster
    pub largest: Option<(ClusterId, usize)>,

    /// Label and size of the smallest cluster
    pub smallest: Option<(ClusterId, usize)>,

    /// Single-member labels turned into noise
    pub demoted: usize,
}

/// Copies node labels onto reports and rebuilds the cluster namespace
pub struct ClusterMaterializer {
    reports: SharedStore<Report>,
    clusters: SharedStore<Cluster>,
}

impl ClusterMaterializer {
    pub fn new(reports: SharedStore<Report>, clusters: SharedStore<Cluster>) -> Self {
        Self { reports, clusters }
    }

    /// Materialize the clusters of `graph`, or of `view` when given.
    ///
    /// Every node must carry a label that is either noise or not negative.
    /// Previously stored clusters are removed before the new ones are written.
    pub fn materialize(
        &self,
        graph: &Graph,
        view: Option<&GraphView<'_>>,
    ) -> Result<MaterializeSummary> {
        let start = Instant::now();
        log::info!("Transferring cluster ids to reports");

        // Nothing is written until every node has a label and a report
        let mut stamped = Vec::new();
        for id in member_ids(graph, view) {
            let node = graph.node(id).ok_or(Error::MissingNode(id))?;
            match node.cluster_id {
                UNASSIGNED => {
                    return Err(Error::Inconsistency(format!("node {} has no cluster id", id)));
                }
                label if label < NOISE => {
                    return Err(Error::Inconsistency(format!(
                        "node {} has negative cluster id {}",
                        id, label
                    )));
                }
                _ => {}
            }
            let mut report = self.reports.get(id).ok_or(Error::MissingReport(id))?;
            report.cluster_id = node.cluster_id;
            stamped.push(report);
        }

        let mut by_label: BTreeMap<ClusterId, Vec<Report>> = BTreeMap::new();
        for report in stamped {
            self.reports.put(report.id, report.clone());
            by_label.entry(report.cluster_id).or_default().push(report);
        }

        self.clusters.remove_all();

        let mut summary = MaterializeSummary::default();
        for (label, members) in by_label {
            if label == NOISE {
                continue;
            }
            if members.len() == 1 {
                self.demote(graph, members[0].id)?;
                summary.demoted += 1;
                continue;
            }

            let size = members.len();
            let cluster = Cluster::new(label, members)?;
            self.clusters.put(label as u64, cluster);
            summary.clusters += 1;

            if summary.largest.map_or(true, |(_, largest)| size > largest) {
                summary.largest = Some((label, size));
            }
            if summary.smallest.map_or(true, |(_, smallest)| size < smallest) {
                summary.smallest = Some((label, size));
            }
        }

        if let Some((label, size)) = summary.largest {
            log::info!("Biggest cluster: {} with {} reports", label, size);
        }
        if let Some((label, size)) = summary.smallest {
            log::info!("Smallest cluster: {} with {} reports", label, size);
        }
        log::info!(
            "Materialized {} clusters ({} singletons demoted) in {} ms",
            summary.clusters,
            summary.demoted,
            start.elapsed().as_millis()
        );
        Ok(summary)
    }

    fn demote(&self, graph: &Graph, id: NodeId) -> Result<()> {
        let mut report = self.reports.get(id).ok_or(Error::MissingReport(id))?;
        report.cluster_id = NOISE;
        self.reports.put(id, report);
        graph.set_cluster_id(id, NOISE)
    }
}
