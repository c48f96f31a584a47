//! Cluster analysis module

pub mod clustering;
pub mod materialize;
pub mod modularity;
pub mod scan;

use chrono::{DateTime, Duration, Utc};
use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

use crate::data::distance::haversine_meters;
use crate::data::Report;
use crate::error::{Error, Result};
use crate::graph::{ClusterId, NodeId};

pub use clustering::GraphClustering;
pub use materialize::{ClusterMaterializer, MaterializeSummary};
pub use modularity::{
    Algorithm, ModularityFunction, ModularityOptimizer, ModularityOutcome, NetworkSizing,
};
pub use scan::{HubRule, Scan, ScanResult};

/// Aggregate record of one cluster of reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub label: ClusterId,

    /// Member reports, carrying the cluster label
    pub reports: Vec<Report>,

    /// Earliest creation time of a member
    pub min_time: DateTime<Utc>,

    /// Latest creation time of a member
    pub max_time: DateTime<Utc>,

    /// Arithmetic mean of member latitudes
    #[serde(rename = "lat")]
    pub lat_center: f64,

    /// Arithmetic mean of member longitudes
    #[serde(rename = "lng")]
    pub lon_center: f64,
}

/// Longest time between two members
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalDiameter {
    pub span: Duration,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Cluster {
    pub fn new(label: ClusterId, reports: Vec<Report>) -> Result<Self> {
        let (min_time, max_time) = match reports.iter().map(|r| r.created_at).minmax() {
            MinMaxResult::NoElements => {
                return Err(Error::Inconsistency(format!("cluster {} has no members", label)));
            }
            MinMaxResult::OneElement(time) => (time, time),
            MinMaxResult::MinMax(min, max) => (min, max),
        };

        let size = reports.len() as f64;
        let lat_center = reports.iter().map(|r| r.lat).sum::<f64>() / size;
        let lon_center = reports.iter().map(|r| r.lon).sum::<f64>() / size;

        Ok(Self {
            label,
            reports,
            min_time,
            max_time,
            lat_center,
            lon_center,
        })
    }

    pub fn size(&self) -> usize {
        self.reports.len()
    }

    pub fn member_ids(&self) -> Vec<NodeId> {
        self.reports.iter().map(|r| r.id).collect()
    }

    /// Largest pairwise great-circle distance between members, in meters
    pub fn spatial_diameter(&self) -> f64 {
        self.reports
            .iter()
            .tuple_combinations()
            .map(|(a, b)| haversine_meters(a.lat, a.lon, b.lat, b.lon))
            .fold(0.0, f64::max)
    }

    pub fn temporal_diameter(&self) -> TemporalDiameter {
        TemporalDiameter {
            span: self.max_time - self.min_time,
            start: self.min_time,
            end: self.max_time,
        }
    }

    /// Free text of the first member
    pub fn category(&self) -> &str {
        self.reports.first().map_or("", |r| r.text.as_str())
    }

    /// Member urls joined with "; "
    pub fn description(&self) -> String {
        self.reports.iter().map(|r| r.url.as_str()).join("; ")
    }
}
