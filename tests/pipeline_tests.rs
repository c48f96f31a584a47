use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{Duration, TimeZone, Utc};
use itertools::Itertools;

use report_cluster_miner::cluster::modularity::{Algorithm, ModularityFunction, NetworkSizing};
use report_cluster_miner::data::distance::haversine_whole_meters;
use report_cluster_miner::graph::{NodeId, NOISE};
use report_cluster_miner::storage::{load_snapshot, save_snapshot};
use report_cluster_miner::{
    Graph, GraphClustering, ModularityConfig, ProximityConfig, ProximityGraphBuilder, Report,
    ScanConfig, Stores,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Report `north_m` meters north of a fixed point, `day` days after a fixed date
fn report(id: NodeId, north_m: f64, day: i64, category: &str) -> Report {
    let base = Utc.with_ymd_and_hms(2013, 5, 1, 12, 0, 0).unwrap();
    Report::new(
        id,
        50.0 + north_m / 111_195.0,
        8.0,
        category,
        format!("report {}", id),
        format!("https://reports.example/{}", id),
        base + Duration::days(day),
    )
}

fn builder(space: u32, days: u32) -> ProximityGraphBuilder {
    ProximityGraphBuilder::new(ProximityConfig::new(space, days)).with_threads(4)
}

#[test]
fn five_close_reports_form_one_cluster() -> Result<()> {
    init_logging();
    let stores = Stores::in_memory("five");
    stores.insert_reports((1..=5).map(|id| report(id, id as f64 * 3.0, id as i64, "pothole")));

    let graph = Graph::new(stores.nodes.clone(), stores.edges.clone());
    let proximity = builder(100, 30).build(stores.reports.clone(), graph, None)?;
    assert_eq!(proximity.graph().edge_count(), 10);

    let clustering = GraphClustering::with_stores(proximity.graph(), &stores);
    let scan = clustering.run_scan(ScanConfig::new(0.5, 2))?;
    assert_eq!(scan.cluster_count(), 1);

    let summary = clustering.materialize(None)?;
    assert_eq!(summary.clusters, 1);

    let keys: Vec<u64> = stores.clusters.keys().into_iter().collect();
    assert_eq!(keys.len(), 1);
    let cluster = stores.clusters.get(keys[0]).unwrap();
    assert_eq!(cluster.size(), 5);
    assert_eq!(cluster.member_ids(), vec![1, 2, 3, 4, 5]);
    assert_eq!(cluster.temporal_diameter().span, Duration::days(4));
    Ok(())
}

#[test]
fn exact_space_threshold_gives_no_edge() -> Result<()> {
    init_logging();
    let a = report(1, 0.0, 0, "graffiti");
    let b = report(2, 250.0, 0, "graffiti");
    let distance = haversine_whole_meters(a.lat, a.lon, b.lat, b.lon);

    let stores = Stores::in_memory("threshold");
    stores.insert_reports([a, b]);

    let at = builder(distance, 30).build_in_memory(stores.reports.clone())?;
    assert_eq!(at.graph().edge_count(), 0);

    let above = builder(distance + 1, 30).build_in_memory(stores.reports.clone())?;
    assert_eq!(above.graph().edge_count(), 1);
    assert_eq!(above.graph().edge(above.graph().edge_ids()[0]).unwrap().space_dist, distance);
    Ok(())
}

#[test]
fn scan_without_isolated_nodes_follows_components() -> Result<()> {
    init_logging();
    let stores = Stores::in_memory("components");
    // two chains far apart in space, plus a pair far apart in time
    stores.insert_reports([
        report(1, 0.0, 0, "a"),
        report(2, 40.0, 0, "a"),
        report(3, 80.0, 0, "a"),
        report(4, 5_000.0, 0, "b"),
        report(5, 5_050.0, 0, "b"),
        report(6, 0.0, 200, "c"),
        report(7, 10.0, 201, "c"),
    ]);
    let proximity = builder(60, 10).build_in_memory(stores.reports.clone())?;
    let graph = proximity.graph();

    let clustering = GraphClustering::with_stores(graph, &stores);
    let components = clustering.label_components(None)?;
    assert_eq!(components.count, 3);

    let scan = clustering.run_scan(ScanConfig::new(0.0, 2))?;
    assert_eq!(scan.cluster_count(), 3);
    assert!(scan.hubs.is_empty());
    assert!(scan.outliers.is_empty());

    let scan_sets: BTreeSet<Vec<NodeId>> = scan
        .clusters
        .iter()
        .filter(|(&label, _)| label != NOISE)
        .map(|(_, members)| members.iter().copied().sorted().collect())
        .collect();
    let component_sets: BTreeSet<Vec<NodeId>> = components
        .members
        .iter()
        .filter(|(&label, _)| label != NOISE)
        .map(|(_, members)| members.clone())
        .collect();
    assert_eq!(scan_sets, component_sets);
    Ok(())
}

#[test]
fn edgeless_modularity_leaves_only_noise() -> Result<()> {
    init_logging();
    let stores = Stores::in_memory("edgeless");
    stores.insert_reports((1..=4).map(|id| report(id, id as f64 * 10_000.0, 0, "a")));

    let proximity = builder(100, 30).build_in_memory(stores.reports.clone())?;
    assert_eq!(proximity.graph().edge_count(), 0);

    let mut config =
        ModularityConfig::new(ModularityFunction::Standard, 1.0, Algorithm::Louvain, 1, 1, Some(7));
    config.sizing = NetworkSizing::AllNodes;

    let mut clustering = GraphClustering::with_stores(proximity.graph(), &stores);
    let outcome = clustering.run_modularity(&config)?;
    assert_eq!(outcome.communities, 0);
    assert!(outcome.labels.iter().all(|&(_, label)| label == NOISE));

    let summary = clustering.materialize(None)?;
    assert_eq!(summary.clusters, 0);
    assert!(stores.clusters.is_empty());
    for id in 1..=4 {
        assert_eq!(stores.reports.get(id).unwrap().cluster_id, NOISE);
    }
    Ok(())
}

#[test]
fn materialized_clusters_match_modularity_labels() -> Result<()> {
    init_logging();
    let stores = Stores::in_memory("roundtrip");
    let mut reports = Vec::new();
    for id in 1..=4 {
        reports.push(report(id, id as f64 * 5.0, 0, "streetlight"));
    }
    for id in 5..=8 {
        reports.push(report(id, 3_000.0 + id as f64 * 5.0, 2, "waste"));
    }
    stores.insert_reports(reports);

    let proximity = builder(50, 5).build_in_memory(stores.reports.clone())?;
    let graph = proximity.graph();

    let mut config =
        ModularityConfig::new(ModularityFunction::Standard, 1.0, Algorithm::Slm, 3, 5, Some(21));
    config.sizing = NetworkSizing::AllNodes;
    let mut clustering = GraphClustering::with_stores(graph, &stores);
    let outcome = clustering.run_modularity(&config)?;
    assert_eq!(outcome.communities, 2);

    clustering.materialize(None)?;
    for label in [1, 2] {
        let expected: Vec<NodeId> = outcome
            .labels
            .iter()
            .filter(|&&(_, l)| l == label)
            .map(|&(id, _)| id)
            .collect();
        let cluster = stores.clusters.get(label as u64).unwrap();
        assert_eq!(cluster.member_ids(), expected);
        assert!(cluster.reports.iter().all(|r| r.cluster_id == label));
    }
    Ok(())
}

#[test]
fn filtered_view_clusters_tighter() -> Result<()> {
    init_logging();
    let stores = Stores::in_memory("filter");
    stores.insert_reports([
        report(1, 0.0, 0, "a"),
        report(2, 20.0, 0, "a"),
        report(3, 90.0, 0, "a"),
    ]);
    let proximity = builder(100, 30).build_in_memory(stores.reports.clone())?;
    assert_eq!(proximity.graph().edge_count(), 3);

    let view = proximity.filter(50, 30, false)?;
    assert_eq!(view.node_count(), 3);
    assert_eq!(view.edge_count(), 1);

    let clustering = GraphClustering::with_stores(proximity.graph(), &stores);
    let components = clustering.label_components(Some(&view))?;
    assert_eq!(components.count, 1);
    assert_eq!(components.members.get(&1), Some(&vec![1, 2]));
    assert_eq!(components.members.get(&NOISE), Some(&vec![3]));
    Ok(())
}

#[test]
fn snapshots_restore_graph_and_clusters() -> Result<()> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let stores = Stores::in_memory("snapshot");
    stores.insert_reports((1..=6).map(|id| report(id, id as f64 * 10.0, 0, "a")));

    let graph = Graph::new(stores.nodes.clone(), stores.edges.clone());
    let proximity = builder(25, 30).build(stores.reports.clone(), graph, None)?;
    let clustering = GraphClustering::with_stores(proximity.graph(), &stores);
    clustering.label_components(None)?;
    clustering.materialize(None)?;

    save_snapshot(stores.reports.as_ref(), dir.path().join("reports.json"))?;
    save_snapshot(stores.nodes.as_ref(), dir.path().join("nodes.json"))?;
    let edge_count = save_snapshot(stores.edges.as_ref(), dir.path().join("edges.json"))?;
    save_snapshot(stores.clusters.as_ref(), dir.path().join("clusters.json"))?;

    let restored = Stores::in_memory("snapshot");
    load_snapshot(restored.reports.as_ref(), dir.path().join("reports.json"))?;
    load_snapshot(restored.nodes.as_ref(), dir.path().join("nodes.json"))?;
    load_snapshot(restored.edges.as_ref(), dir.path().join("edges.json"))?;
    load_snapshot(restored.clusters.as_ref(), dir.path().join("clusters.json"))?;

    let graph = Graph::from_stores(restored.nodes.clone(), restored.edges.clone())?;
    assert_eq!(graph.node_count(), 6);
    assert_eq!(graph.edge_count(), edge_count);
    for id in 1..=6 {
        assert_eq!(graph.neighbor_ids(id), proximity.graph().neighbor_ids(id));
    }
    assert_eq!(restored.clusters.keys(), stores.clusters.keys());
    assert_eq!(restored.clusters.get(1), stores.clusters.get(1));
    Ok(())
}

#[test]
fn config_from_json_drives_the_pipeline() -> Result<()> {
    init_logging();
    let config = report_cluster_miner::Config::from_json_str(
        r#"{
            "proximity": { "max_space_dist": 100, "max_day_dist": 30 },
            "scan": { "epsilon": 0.3, "mu": 2 },
            "threads": 2
        }"#,
    )?;
    let stores = Stores::in_memory("config");
    stores.insert_reports((1..=3).map(|id| report(id, id as f64, 0, "a")));

    let proximity =
        ProximityGraphBuilder::from_config(&config).build_in_memory(stores.reports.clone())?;
    let clustering = GraphClustering::with_stores(proximity.graph(), &stores);
    let scan = clustering.run_scan(config.scan)?;
    assert_eq!(scan.cluster_count(), 1);
    Ok(())
}
