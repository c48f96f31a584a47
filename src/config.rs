//! Configuration management for the report clustering pipeline

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cluster::modularity::{Algorithm, ModularityFunction, NetworkSizing};
use crate::cluster::scan::HubRule;
use crate::error::{Error, Result};

/// Thresholds that decide whether two reports are spatio-temporally connected
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Maximal spatial distance in meters (exclusive)
    pub max_space_dist: u32,

    /// Maximal temporal distance in days (exclusive)
    pub max_day_dist: u32,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            max_space_dist: 100,
            max_day_dist: 30,
        }
    }
}

impl ProximityConfig {
    pub fn new(max_space_dist: u32, max_day_dist: u32) -> Self {
        Self {
            max_space_dist,
            max_day_dist,
        }
    }

    /// Width of one temporal bucket in milliseconds
    pub fn bucket_width_ms(&self) -> i64 {
        i64::from(self.max_day_dist) * crate::data::MILLIS_PER_DAY
    }
}

/// Parameters of the structural clustering algorithm
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimal structural similarity in [0, 1]
    pub epsilon: f64,

    /// Minimal epsilon-neighborhood size for a core, at least 2
    pub mu: usize,

    /// First cluster id handed out; must not be negative, since -1 is noise
    pub start_cluster_id: i64,

    /// How deferred non-members are split into hubs and outliers
    pub hub_rule: HubRule,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            epsilon: 0.5,
            mu: 2,
            start_cluster_id: 1,
            hub_rule: HubRule::FirstDifference,
        }
    }
}

impl ScanConfig {
    pub fn new(epsilon: f64, mu: usize) -> Self {
        Self {
            epsilon,
            mu,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(Error::invalid(
                "epsilon",
                format!("{} is outside the range [0,1]", self.epsilon),
            ));
        }
        if self.mu < 2 {
            return Err(Error::invalid(
                "mu",
                format!("{} is too small, must be at least 2", self.mu),
            ));
        }
        if self.start_cluster_id < 0 {
            return Err(Error::invalid(
                "start_cluster_id",
                format!("{} is negative and could collide with noise", self.start_cluster_id),
            ));
        }
        Ok(())
    }
}

/// Parameters of a modularity optimization run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModularityConfig {
    pub function: ModularityFunction,

    /// Values above 1.0 yield more, smaller communities
    pub resolution: f64,

    pub algorithm: Algorithm,

    /// Number of random starts, at least 1
    pub random_starts: usize,

    /// Iteration cap per random start, at least 1
    pub iterations: usize,

    /// Seed for the shared generator; a fresh one is drawn when absent
    pub seed: Option<u64>,

    /// Which nodes take part in the compact network
    pub sizing: NetworkSizing,
}

impl Default for ModularityConfig {
    fn default() -> Self {
        Self {
            function: ModularityFunction::Standard,
            resolution: 1.0,
            algorithm: Algorithm::Louvain,
            random_starts: 10,
            iterations: 10,
            seed: None,
            sizing: NetworkSizing::HighestParticipating,
        }
    }
}

impl ModularityConfig {
    pub fn new(
        function: ModularityFunction,
        resolution: f64,
        algorithm: Algorithm,
        random_starts: usize,
        iterations: usize,
        seed: Option<u64>,
    ) -> Self {
        Self {
            function,
            resolution,
            algorithm,
            random_starts,
            iterations,
            seed,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.resolution.is_finite() {
            return Err(Error::invalid(
                "resolution",
                format!("{} is not a finite number", self.resolution),
            ));
        }
        if self.random_starts < 1 {
            return Err(Error::invalid("random_starts", "must be at least 1"));
        }
        if self.iterations < 1 {
            return Err(Error::invalid("iterations", "must be at least 1"));
        }
        Ok(())
    }

    /// The configured seed, or a freshly generated one
    pub fn seed_or_random(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random::<u64>)
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub proximity: ProximityConfig,
    pub scan: ScanConfig,
    pub modularity: ModularityConfig,

    /// Number of builder worker threads (0 = use all available cores)
    pub threads: usize,
}

impl Config {
    /// Create a new configuration with custom values
    pub fn new(
        proximity: ProximityConfig,
        scan: ScanConfig,
        modularity: ModularityConfig,
        threads: usize,
    ) -> Self {
        Self {
            proximity,
            scan,
            modularity,
            threads,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.scan.validate()?;
        self.modularity.validate()
    }

    /// Worker count for the builder, resolving 0 to the number of cores
    pub fn worker_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            num_cpus::get()
        }
    }
}
