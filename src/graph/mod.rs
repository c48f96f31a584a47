//! Graph representation, construction and algorithms module

pub mod algorithms;
pub mod builder;
pub mod compressed;
pub mod model;
pub mod store;
pub mod view;

pub use builder::{ProximityGraph, ProximityGraphBuilder, TimeRange};
pub use compressed::CompactNetwork;
pub use model::{ClusterId, Edge, EdgeId, Node, NodeId, NOISE, UNASSIGNED};
pub use store::Graph;
pub use view::GraphView;
