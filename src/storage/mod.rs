//! Keyed storage for reports, graph elements and cluster aggregates
//!
//! Every collaborator of the clustering core talks to storage through
//! [`KeyedStore`]: a map from integer ids to values. The in-memory
//! implementation is backed by a `DashMap` so builder workers can read and
//! write concurrently. Stores can be dumped to and restored from JSON files.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::to_string_pretty;

use crate::cluster::Cluster;
use crate::data::Report;
use crate::error::Result;
use crate::graph::{Edge, Node};

/// Integer key shared by every namespace
pub type Key = u64;

/// A key/value store keyed by integer id.
///
/// Writes are durable until explicitly removed; nothing else is assumed
/// about eviction or persistence.
pub trait KeyedStore<V>: Send + Sync {
    /// Namespace of this store
    fn name(&self) -> &str;

    fn get(&self, id: Key) -> Option<V>;

    /// Fetch several values at once; absent ids are skipped
    fn get_all(&self, ids: &[Key]) -> HashMap<Key, V> {
        ids.iter()
            .filter_map(|&id| self.get(id).map(|value| (id, value)))
            .collect()
    }

    fn put(&self, id: Key, value: V);

    /// Returns true if a value was removed
    fn remove(&self, id: Key) -> bool;

    fn remove_all(&self);

    /// All keys in ascending order
    fn keys(&self) -> BTreeSet<Key>;

    fn len(&self) -> usize {
        self.keys().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared handle to a store of any backend
pub type SharedStore<V> = Arc<dyn KeyedStore<V>>;

/// Concurrent in-memory store
#[derive(Debug)]
pub struct MemoryStore<V> {
    name: String,
    entries: DashMap<Key, V>,
}

impl<V> MemoryStore<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    /// Create a store wrapped in a shared handle
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }
}

impl<V: Clone + Send + Sync> KeyedStore<V> for MemoryStore<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, id: Key) -> Option<V> {
        self.entries.get(&id).map(|entry| entry.value().clone())
    }

    fn put(&self, id: Key, value: V) {
        self.entries.insert(id, value);
    }

    fn remove(&self, id: Key) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn remove_all(&self) {
        self.entries.clear();
    }

    fn keys(&self) -> BTreeSet<Key> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The four namespaces used by one clustering workspace
#[derive(Clone)]
pub struct Stores {
    pub reports: SharedStore<Report>,
    pub nodes: SharedStore<Node>,
    pub edges: SharedStore<Edge>,
    pub clusters: SharedStore<Cluster>,
}

impl Stores {
    /// In-memory stores named after the report namespace
    pub fn in_memory(name: &str) -> Self {
        Self {
            reports: MemoryStore::<Report>::shared(name),
            nodes: MemoryStore::<Node>::shared(format!("{}_nodes", name)),
            edges: MemoryStore::<Edge>::shared(format!("{}_edges", name)),
            clusters: MemoryStore::<Cluster>::shared(format!("{}_clusters", name)),
        }
    }

    /// Put every report into the report namespace, keyed by its id
    pub fn insert_reports(&self, reports: impl IntoIterator<Item = Report>) -> usize {
        let mut count = 0;
        for report in reports {
            self.reports.put(report.id, report);
            count += 1;
        }
        count
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot<V> {
    name: String,
    entries: Vec<(Key, V)>,
}

/// Write the full contents of a store to a JSON file, ordered by key
pub fn save_snapshot<V: Serialize>(
    store: &dyn KeyedStore<V>,
    path: impl AsRef<Path>,
) -> Result<usize> {
    let path = path.as_ref();
    log::info!("Saving store '{}' to {}", store.name(), path.display());

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let keys: Vec<Key> = store.keys().into_iter().collect();
    let mut values = store.get_all(&keys);
    let entries: Vec<(Key, V)> = keys
        .iter()
        .filter_map(|id| values.remove(id).map(|value| (*id, value)))
        .collect();
    let count = entries.len();

    let snapshot = Snapshot {
        name: store.name().to_string(),
        entries,
    };
    let mut file = File::create(path)?;
    file.write_all(to_string_pretty(&snapshot)?.as_bytes())?;

    log::info!("Saved {} entries", count);
    Ok(count)
}

/// Load a JSON snapshot into a store, replacing entries with equal keys
pub fn load_snapshot<V: DeserializeOwned>(
    store: &dyn KeyedStore<V>,
    path: impl AsRef<Path>,
) -> Result<usize> {
    let path = path.as_ref();
    log::info!("Loading store '{}' from {}", store.name(), path.display());

    let json = fs::read_to_string(path)?;
    let snapshot: Snapshot<V> = serde_json::from_str(&json)?;
    if snapshot.name != store.name() {
        log::warn!(
            "Snapshot was taken from store '{}', loading into '{}'",
            snapshot.name,
            store.name()
        );
    }

    let count = snapshot.entries.len();
    for (id, value) in snapshot.entries {
        store.put(id, value);
    }
    Ok(count)
}
