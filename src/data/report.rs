//! Geotagged, time-stamped input records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::distance;
use crate::graph::{ClusterId, NodeId, NOISE};

/// A single citizen report to be clustered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Unique id, reused as the graph node id
    pub id: NodeId,

    pub lat: f64,
    pub lon: f64,

    pub category: String,
    pub text: String,
    pub url: String,

    pub created_at: DateTime<Utc>,

    /// Cluster label stamped by the materializer (-1 = noise)
    #[serde(default = "noise_label")]
    pub cluster_id: ClusterId,
}

fn noise_label() -> ClusterId {
    NOISE
}

impl Report {
    pub fn new(
        id: NodeId,
        lat: f64,
        lon: f64,
        category: impl Into<String>,
        text: impl Into<String>,
        url: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lat,
            lon,
            category: category.into(),
            text: text.into(),
            url: url.into(),
            created_at,
            cluster_id: NOISE,
        }
    }

    /// Creation time as milliseconds since the epoch
    pub fn created_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// Spatial distance to another report in whole meters
    pub fn spatial_distance(&self, other: &Report) -> u32 {
        distance::haversine_whole_meters(self.lat, self.lon, other.lat, other.lon)
    }

    /// Absolute creation-time difference in milliseconds
    pub fn temporal_distance_ms(&self, other: &Report) -> i64 {
        (self.created_millis() - other.created_millis()).abs()
    }

    /// Absolute creation-time difference in whole days
    pub fn temporal_distance_days(&self, other: &Report) -> u32 {
        distance::whole_days_between(self.created_millis(), other.created_millis())
    }

    pub fn category_similarity(&self, other: &Report) -> f64 {
        distance::category_similarity(&self.category, &other.category)
    }

    pub fn shares_category(&self, other: &Report) -> bool {
        distance::same_category(&self.category, &other.category)
    }
}
