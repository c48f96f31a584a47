//! Spatio-temporal clustering of geo-located citizen reports
//!
//! Reports are linked into a proximity graph when they are close in space
//! and time, then grouped by SCAN, modularity optimization or connected
//! components, and finally materialized as cluster records.

pub mod cluster;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod storage;

pub use cluster::{Cluster, ClusterMaterializer, GraphClustering};
pub use config::{Config, ModularityConfig, ProximityConfig, ScanConfig};
pub use data::Report;
pub use error::{Error, Result};
pub use graph::{Graph, GraphView, ProximityGraph, ProximityGraphBuilder};
pub use storage::{KeyedStore, MemoryStore, SharedStore, Stores};
