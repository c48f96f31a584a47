//! Parallel construction of the spatio-temporal proximity graph

use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::config::{Config, ProximityConfig};
use crate::data::Report;
use crate::error::{Error, Result};
use crate::graph::model::{Edge, Node, NodeId};
use crate::graph::{Graph, GraphView};
use crate::storage::SharedStore;

/// Earliest and latest creation time seen while loading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    fn empty() -> Self {
        Self {
            start: i64::MAX,
            end: i64::MIN,
        }
    }

    fn include(&mut self, millis: i64) {
        self.start = self.start.min(millis);
        self.end = self.end.max(millis);
    }

    fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Span in milliseconds
    pub fn span(&self) -> i64 {
        self.end - self.start
    }
}

/// One unit of join work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinTask {
    /// All pairs within one bucket
    Within(usize),
    /// All pairs across two adjacent buckets
    Across(usize, usize),
}

/// Builds a [`ProximityGraph`] from the reports of a keyed store.
///
/// Two reports are connected iff their spatial distance is below
/// `max_space_dist` meters and their creation times are less than
/// `max_day_dist` days apart.
#[derive(Debug, Clone)]
pub struct ProximityGraphBuilder {
    config: ProximityConfig,
    threads: usize,
}

impl ProximityGraphBuilder {
    pub fn new(config: ProximityConfig) -> Self {
        Self {
            config,
            threads: num_cpus::get(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            config: config.proximity,
            threads: config.worker_threads(),
        }
    }

    /// Number of worker threads (0 = all available cores)
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = if threads == 0 { num_cpus::get() } else { threads };
        self
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Build over every report of the store into a fresh in-memory graph
    pub fn build_in_memory(&self, reports: SharedStore<Report>) -> Result<ProximityGraph> {
        self.build(reports, Graph::in_memory(), None)
    }

    /// Build into `graph`, which is cleared first.
    ///
    /// With `ids` set, only those reports become nodes.
    pub fn build(
        &self,
        reports: SharedStore<Report>,
        graph: Graph,
        ids: Option<&[NodeId]>,
    ) -> Result<ProximityGraph> {
        let start = Instant::now();
        log::info!(
            "Building proximity graph (max {} m, max {} days) with {} threads",
            self.config.max_space_dist,
            self.config.max_day_dist,
            self.threads
        );

        let pool = ThreadPoolBuilder::new().num_threads(self.threads).build()?;

        let time_range = self.load_nodes(&pool, &reports, &graph, ids)?;

        if time_range.is_empty() {
            log::info!("No reports to connect");
        } else if self.config.max_day_dist == 0 {
            log::info!("Temporal threshold is 0 days, no pair can be connected");
        } else {
            let buckets = self.fill_buckets(&pool, &reports, &graph, time_range)?;
            self.join_buckets(&pool, &graph, &buckets)?;
        }

        log::info!(
            "Finished proximity graph with {} nodes and {} edges in {} ms",
            graph.node_count(),
            graph.edge_count(),
            start.elapsed().as_millis()
        );

        Ok(ProximityGraph {
            graph,
            reports,
            max_space_dist: self.config.max_space_dist,
            max_day_dist: self.config.max_day_dist,
            time_range: (!time_range.is_empty()).then_some(time_range),
        })
    }

    /// Create one node per report, tracking the global time range
    fn load_nodes(
        &self,
        pool: &ThreadPool,
        reports: &SharedStore<Report>,
        graph: &Graph,
        ids: Option<&[NodeId]>,
    ) -> Result<TimeRange> {
        let start = Instant::now();
        log::info!("Loading graph nodes");
        graph.clear();

        let keys: Vec<NodeId> = match ids {
            Some(ids) => ids.to_vec(),
            None => reports.keys().into_iter().collect(),
        };
        let range = Mutex::new(TimeRange::empty());

        let counts = pool.install(|| {
            shard_bounds(keys.len(), self.threads)
                .into_par_iter()
                .map(|shard| -> Result<usize> {
                    let mut count = 0;
                    for &key in &keys[shard] {
                        let report = reports.get(key).ok_or(Error::MissingReport(key))?;
                        if report.id != key {
                            return Err(Error::Inconsistency(format!(
                                "report stored under key {} has id {}",
                                key, report.id
                            )));
                        }
                        if !graph.add_node(Node::new(report.id)) {
                            return Err(Error::Inconsistency(format!(
                                "failed to insert node {}: id already in use",
                                report.id
                            )));
                        }
                        range
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .include(report.created_millis());
                        count += 1;
                    }
                    Ok(count)
                })
                .collect::<Result<Vec<usize>>>()
        })?;

        let total: usize = counts.iter().sum();
        let node_count = graph.node_count();
        let source_count = if ids.is_some() { keys.len() } else { reports.len() };
        if total != keys.len() || total != node_count || total != source_count {
            return Err(Error::Inconsistency(format!(
                "loaded {} nodes from {} keys, graph has {} nodes, source has {} reports",
                total,
                keys.len(),
                node_count,
                source_count
            )));
        }

        log::info!(
            "Loaded {} nodes in {} ms",
            total,
            start.elapsed().as_millis()
        );
        Ok(range.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Distribute the loaded reports over fixed-width temporal buckets
    fn fill_buckets(
        &self,
        pool: &ThreadPool,
        reports: &SharedStore<Report>,
        graph: &Graph,
        range: TimeRange,
    ) -> Result<Vec<Vec<Report>>> {
        let width = self.config.bucket_width_ms();
        let bucket_count = usize::try_from(range.span() / width)
            .map_err(|_| Error::Inconsistency(format!("invalid time span {}", range.span())))?
            + 1;
        log::info!("Transferring nodes to {} buckets", bucket_count);

        let buckets: Vec<Mutex<Vec<Report>>> =
            (0..bucket_count).map(|_| Mutex::new(Vec::new())).collect();
        let node_ids = graph.node_ids();

        let counts = pool.install(|| {
            shard_bounds(node_ids.len(), self.threads)
                .into_par_iter()
                .map(|shard| -> Result<usize> {
                    let mut count = 0;
                    for &id in &node_ids[shard] {
                        let report = reports.get(id).ok_or(Error::MissingReport(id))?;
                        let index = bucket_index(report.created_millis(), range.start, width);
                        let bucket = buckets.get(index).ok_or_else(|| {
                            Error::Inconsistency(format!(
                                "report {} falls into bucket {} of {}",
                                id, index, bucket_count
                            ))
                        })?;
                        bucket
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(report);
                        count += 1;
                    }
                    Ok(count)
                })
                .collect::<Result<Vec<usize>>>()
        })?;

        let buckets: Vec<Vec<Report>> = buckets
            .into_iter()
            .map(|bucket| bucket.into_inner().unwrap_or_else(PoisonError::into_inner))
            .collect();

        let total: usize = counts.iter().sum();
        let in_buckets: usize = buckets.iter().map(Vec::len).sum();
        if total != node_ids.len() || in_buckets != node_ids.len() {
            return Err(Error::Inconsistency(format!(
                "bucketed {} of {} nodes, buckets hold {}",
                total,
                node_ids.len(),
                in_buckets
            )));
        }
        Ok(buckets)
    }

    /// Join every bucket with itself and with its successor
    fn join_buckets(
        &self,
        pool: &ThreadPool,
        graph: &Graph,
        buckets: &[Vec<Report>],
    ) -> Result<()> {
        let start = Instant::now();
        let tasks = join_tasks(buckets);
        log::info!("Running {} join tasks", tasks.len());

        let edges = pool.install(|| {
            tasks
                .into_par_iter()
                .map(|task| -> Result<usize> {
                    let task_start = Instant::now();
                    let edges = match task {
                        JoinTask::Within(i) => self.join(&buckets[i], &buckets[i], true),
                        JoinTask::Across(i, j) => self.join(&buckets[i], &buckets[j], false),
                    };
                    let mut inserted = 0;
                    for edge in edges {
                        if graph.add_edge(edge)?.is_some() {
                            inserted += 1;
                        }
                    }
                    log::debug!(
                        "Join task {:?} produced {} edges in {} ms",
                        task,
                        inserted,
                        task_start.elapsed().as_millis()
                    );
                    Ok(inserted)
                })
                .collect::<Result<Vec<usize>>>()
        })?;

        log::info!(
            "Inserted {} edges in {} ms",
            edges.iter().sum::<usize>(),
            start.elapsed().as_millis()
        );
        Ok(())
    }

    /// All qualifying pairs between two report lists
    fn join(&self, first: &[Report], second: &[Report], same_list: bool) -> Vec<Edge> {
        let max_time = self.config.bucket_width_ms();
        let mut edges = Vec::new();
        for (i, a) in first.iter().enumerate() {
            let others = if same_list { &second[i + 1..] } else { second };
            for b in others {
                let space_dist = a.spatial_distance(b);
                if space_dist >= self.config.max_space_dist {
                    continue;
                }
                if a.temporal_distance_ms(b) >= max_time {
                    continue;
                }
                edges.push(Edge::annotated(
                    a.id,
                    b.id,
                    a.category_similarity(b),
                    space_dist,
                    a.temporal_distance_days(b),
                    a.shares_category(b),
                ));
            }
        }
        edges
    }
}

/// `count` contiguous ranges covering `0..len`; the last one takes the remainder
fn shard_bounds(len: usize, count: usize) -> Vec<Range<usize>> {
    let count = count.max(1);
    let step = len / count;
    let mut bounds = Vec::with_capacity(count);
    let mut upper = 0;
    for i in 0..count {
        let lower = upper;
        upper = if i == count - 1 { len } else { upper + step };
        bounds.push(lower..upper);
    }
    bounds
}

fn bucket_index(millis: i64, start: i64, width: i64) -> usize {
    ((millis - start).unsigned_abs() / width.unsigned_abs()) as usize
}

/// Within-tasks for every non-empty bucket, then adjacent pairs (i, i+1) for
/// even i, then for odd i
fn join_tasks(buckets: &[Vec<Report>]) -> Vec<JoinTask> {
    let occupied = |i: usize| buckets.get(i).is_some_and(|b| !b.is_empty());
    let mut tasks: Vec<JoinTask> = (0..buckets.len())
        .filter(|&i| occupied(i))
        .map(JoinTask::Within)
        .collect();
    for parity in [0, 1] {
        tasks.extend(
            (parity..buckets.len().saturating_sub(1))
                .step_by(2)
                .filter(|&i| occupied(i) && occupied(i + 1))
                .map(|i| JoinTask::Across(i, i + 1)),
        );
    }
    tasks
}

/// A built proximity graph together with its construction thresholds
pub struct ProximityGraph {
    graph: Graph,
    reports: SharedStore<Report>,
    max_space_dist: u32,
    max_day_dist: u32,
    time_range: Option<TimeRange>,
}

impl ProximityGraph {
    /// Adopt a previously built graph; fails unless every report has a node
    pub fn reload(
        reports: SharedStore<Report>,
        graph: Graph,
        config: ProximityConfig,
    ) -> Result<Self> {
        let proximity = Self {
            graph,
            reports,
            max_space_dist: config.max_space_dist,
            max_day_dist: config.max_day_dist,
            time_range: None,
        };
        proximity.check_consistency()?;
        Ok(proximity)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn reports(&self) -> &SharedStore<Report> {
        &self.reports
    }

    pub fn max_space_dist(&self) -> u32 {
        self.max_space_dist
    }

    pub fn max_day_dist(&self) -> u32 {
        self.max_day_dist
    }

    /// Creation time range of the loaded reports; `None` for a reloaded or empty graph
    pub fn time_range(&self) -> Option<TimeRange> {
        self.time_range
    }

    /// Every report of the store must have a node in the graph
    pub fn check_consistency(&self) -> Result<()> {
        let missing = self
            .reports
            .keys()
            .into_iter()
            .filter(|&id| !self.graph.contains_node(id))
            .count();
        if missing > 0 {
            return Err(Error::Inconsistency(format!(
                "{} reports of store '{}' have no node in the graph",
                missing,
                self.reports.name()
            )));
        }
        Ok(())
    }

    /// A view with every node and only the edges within tightened thresholds.
    ///
    /// Both thresholds are inclusive and must not exceed the construction thresholds.
    pub fn filter(
        &self,
        max_space_dist: u32,
        max_day_dist: u32,
        must_share_category: bool,
    ) -> Result<GraphView<'_>> {
        if max_space_dist > self.max_space_dist {
            return Err(Error::invalid(
                "max_space_dist",
                format!("must be between 0 and {}", self.max_space_dist),
            ));
        }
        if max_day_dist > self.max_day_dist {
            return Err(Error::invalid(
                "max_day_dist",
                format!("must be between 0 and {}", self.max_day_dist),
            ));
        }

        let start = Instant::now();
        let mut view = GraphView::new(&self.graph);
        view.add_node_ids(self.graph.node_ids());
        for id in self.graph.edge_ids() {
            let edge = self.graph.edge(id).ok_or(Error::MissingEdge(id))?;
            if must_share_category && !edge.same_category {
                continue;
            }
            if edge.space_dist <= max_space_dist && edge.time_dist <= max_day_dist {
                view.add_edge_id(id);
            }
        }

        log::info!(
            "Filtered to {} m, {} days, same category {}: {} of {} edges kept in {} ms",
            max_space_dist,
            max_day_dist,
            must_share_category,
            view.edge_count(),
            self.graph.edge_count(),
            start.elapsed().as_millis()
        );
        Ok(view)
    }
}
