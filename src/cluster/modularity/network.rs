//! Weighted network with a mutable clustering and the local moving heuristics
//! built on it (Louvain, Louvain with multilevel refinement, smart local moving)

use rand::Rng;

use crate::cluster::modularity::ModularityFunction;
use crate::graph::CompactNetwork;

/// CSR network plus one cluster index per node.
///
/// Cluster indices are dense: `0..cluster_count`.
#[derive(Debug, Clone)]
pub struct Network {
    node_count: usize,
    offsets: Vec<usize>,
    neighbors: Vec<usize>,
    edge_weights: Vec<f64>,
    node_weights: Vec<f64>,

    /// Weight of edges folded into single nodes by aggregation
    self_link_weight: f64,

    clusters: Vec<usize>,
    cluster_count: usize,
}

impl Network {
    pub fn new(
        offsets: Vec<usize>,
        neighbors: Vec<usize>,
        edge_weights: Vec<f64>,
        node_weights: Vec<f64>,
    ) -> Self {
        let node_count = node_weights.len();
        Self {
            node_count,
            offsets,
            neighbors,
            edge_weights,
            node_weights,
            self_link_weight: 0.0,
            clusters: (0..node_count).collect(),
            cluster_count: node_count,
        }
    }

    /// Copy a compact network; node weights depend on the modularity function
    pub fn from_compact(network: &CompactNetwork, function: ModularityFunction) -> Self {
        let node_weights = match function {
            ModularityFunction::Standard => network.node_weights.clone(),
            ModularityFunction::Alternative => vec![1.0; network.node_count],
        };
        Self::new(
            network.offsets.clone(),
            network.neighbors.clone(),
            network.edge_weights.clone(),
            node_weights,
        )
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Number of undirected edges
    pub fn edge_count(&self) -> usize {
        self.neighbors.len() / 2
    }

    pub fn total_edge_weight(&self) -> f64 {
        self.edge_weights.iter().sum::<f64>() / 2.0
    }

    pub fn clusters(&self) -> &[usize] {
        &self.clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    pub fn init_singleton_clusters(&mut self) {
        self.clusters = (0..self.node_count).collect();
        self.cluster_count = self.node_count;
    }

    pub fn set_clusters(&mut self, clusters: Vec<usize>) {
        self.cluster_count = clusters.iter().max().map_or(0, |max| max + 1);
        self.clusters = clusters;
    }

    /// Modularity-style quality of the current clustering
    pub fn quality(&self, resolution: f64) -> f64 {
        let mut quality = 0.0;
        for i in 0..self.node_count {
            let cluster = self.clusters[i];
            for k in self.offsets[i]..self.offsets[i + 1] {
                if self.clusters[self.neighbors[k]] == cluster {
                    quality += self.edge_weights[k];
                }
            }
        }
        quality += self.self_link_weight;

        let mut cluster_weights = vec![0.0; self.cluster_count];
        for i in 0..self.node_count {
            cluster_weights[self.clusters[i]] += self.node_weights[i];
        }
        for weight in cluster_weights {
            quality -= weight * weight * resolution;
        }

        let total = 2.0 * self.total_edge_weight() + self.self_link_weight;
        if total == 0.0 {
            0.0
        } else {
            quality / total
        }
    }

    /// Move single nodes between clusters until no move improves quality.
    /// Returns true if any node changed cluster.
    pub fn run_local_moving<R: Rng + ?Sized>(&mut self, resolution: f64, rng: &mut R) -> bool {
        let n = self.node_count;
        if n <= 1 {
            return false;
        }

        let mut cluster_weight = vec![0.0; n];
        let mut cluster_size = vec![0usize; n];
        for i in 0..n {
            cluster_weight[self.clusters[i]] += self.node_weights[i];
            cluster_size[self.clusters[i]] += 1;
        }
        let mut unused: Vec<usize> = (0..n).filter(|&c| cluster_size[c] == 0).collect();

        let order = random_permutation(n, rng);
        let mut weight_to = vec![0.0; n];
        let mut seen = vec![false; n];
        let mut candidates: Vec<usize> = Vec::new();

        let mut update = false;
        let mut stable = 0;
        let mut i = 0;
        while stable < n {
            let j = order[i];

            candidates.clear();
            for k in self.offsets[j]..self.offsets[j + 1] {
                let l = self.clusters[self.neighbors[k]];
                if !seen[l] {
                    seen[l] = true;
                    candidates.push(l);
                }
                weight_to[l] += self.edge_weights[k];
            }

            let current = self.clusters[j];
            cluster_weight[current] -= self.node_weights[j];
            cluster_size[current] -= 1;
            if cluster_size[current] == 0 {
                unused.push(current);
            }

            let mut best: Option<usize> = None;
            let mut best_gain = 0.0;
            for &l in &candidates {
                let gain = weight_to[l] - self.node_weights[j] * cluster_weight[l] * resolution;
                if gain > best_gain || (gain == best_gain && best.is_some_and(|b| l < b)) {
                    best = Some(l);
                    best_gain = gain;
                }
                weight_to[l] = 0.0;
                seen[l] = false;
            }
            let target = match best {
                Some(l) if best_gain > 0.0 => l,
                _ => unused.pop().unwrap_or(current),
            };

            cluster_weight[target] += self.node_weights[j];
            cluster_size[target] += 1;
            if target == current {
                stable += 1;
            } else {
                self.clusters[j] = target;
                stable = 1;
                update = true;
            }

            i = if i < n - 1 { i + 1 } else { 0 };
        }

        let mut renumbered = vec![0; n];
        let mut count = 0;
        for (c, &size) in cluster_size.iter().enumerate() {
            if size > 0 {
                renumbered[c] = count;
                count += 1;
            }
        }
        for cluster in &mut self.clusters {
            *cluster = renumbered[*cluster];
        }
        self.cluster_count = count;

        update
    }

    /// Local moving followed by recursive aggregation
    pub fn run_louvain<R: Rng + ?Sized>(&mut self, resolution: f64, rng: &mut R) -> bool {
        if self.node_count <= 1 {
            return false;
        }
        let mut update = self.run_local_moving(resolution, rng);
        if self.cluster_count < self.node_count {
            let mut reduced = self.reduced_network();
            reduced.init_singleton_clusters();
            if reduced.run_louvain(resolution, rng) {
                update = true;
                self.merge_clusters(&reduced.clusters);
            }
        }
        update
    }

    /// Louvain that re-runs local moving on each level after merging
    pub fn run_louvain_multilevel<R: Rng + ?Sized>(
        &mut self,
        resolution: f64,
        rng: &mut R,
    ) -> bool {
        if self.node_count <= 1 {
            return false;
        }
        let mut update = self.run_local_moving(resolution, rng);
        if self.cluster_count < self.node_count {
            let mut reduced = self.reduced_network();
            reduced.init_singleton_clusters();
            if reduced.run_louvain_multilevel(resolution, rng) {
                update = true;
                self.merge_clusters(&reduced.clusters);
                self.run_local_moving(resolution, rng);
            }
        }
        update
    }

    /// Smart local moving: local moving, refinement of every cluster in its
    /// own subnetwork, then recursion on the network of refined clusters
    /// starting from the unrefined clustering
    pub fn run_slm<R: Rng + ?Sized>(&mut self, resolution: f64, rng: &mut R) -> bool {
        if self.node_count <= 1 {
            return false;
        }
        let mut update = self.run_local_moving(resolution, rng);
        if self.cluster_count < self.node_count {
            let members = self.nodes_per_cluster();
            let mut parents: Vec<usize> = Vec::with_capacity(self.node_count);
            let mut refined = 0;
            for (parent, nodes) in members.iter().enumerate() {
                let mut subnetwork = self.subnetwork(parent, nodes);
                subnetwork.init_singleton_clusters();
                subnetwork.run_local_moving(resolution, rng);
                for (position, &node) in nodes.iter().enumerate() {
                    self.clusters[node] = refined + subnetwork.clusters[position];
                }
                parents.extend(std::iter::repeat(parent).take(subnetwork.cluster_count));
                refined += subnetwork.cluster_count;
            }
            self.cluster_count = refined;

            let mut reduced = self.reduced_network();
            reduced.set_clusters(parents);
            if reduced.node_count < self.node_count {
                update |= reduced.run_slm(resolution, rng);
            }
            self.merge_clusters(&reduced.clusters);
        }
        update
    }

    /// Relabel clusters 0, 1, ... by descending size; ties keep their order
    pub fn order_clusters_by_size(&mut self) {
        let mut sizes = vec![0usize; self.cluster_count];
        for &c in &self.clusters {
            sizes[c] += 1;
        }
        let mut order: Vec<usize> = (0..self.cluster_count).collect();
        order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]));

        let mut renumbered = vec![0; self.cluster_count];
        let mut count = 0;
        for &c in &order {
            if sizes[c] == 0 {
                break;
            }
            renumbered[c] = count;
            count += 1;
        }
        for cluster in &mut self.clusters {
            *cluster = renumbered[*cluster];
        }
        self.cluster_count = count;
    }

    /// Node indices of every cluster, ascending
    fn nodes_per_cluster(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.cluster_count];
        for (node, &c) in self.clusters.iter().enumerate() {
            members[c].push(node);
        }
        members
    }

    /// Network with one node per cluster; intra-cluster weight becomes self-link weight
    fn reduced_network(&self) -> Network {
        let c = self.cluster_count;
        let members = self.nodes_per_cluster();

        let mut offsets = Vec::with_capacity(c + 1);
        offsets.push(0);
        let mut neighbors = Vec::new();
        let mut edge_weights = Vec::new();
        let mut node_weights = vec![0.0; c];
        let mut self_link_weight = self.self_link_weight;

        let mut weight_to = vec![0.0; c];
        let mut seen = vec![false; c];
        let mut touched: Vec<usize> = Vec::new();
        for (i, nodes) in members.iter().enumerate() {
            for &k in nodes {
                for e in self.offsets[k]..self.offsets[k + 1] {
                    let m = self.clusters[self.neighbors[e]];
                    if m == i {
                        self_link_weight += self.edge_weights[e];
                        continue;
                    }
                    if !seen[m] {
                        seen[m] = true;
                        touched.push(m);
                    }
                    weight_to[m] += self.edge_weights[e];
                }
                node_weights[i] += self.node_weights[k];
            }
            for &m in &touched {
                neighbors.push(m);
                edge_weights.push(weight_to[m]);
                weight_to[m] = 0.0;
                seen[m] = false;
            }
            touched.clear();
            offsets.push(neighbors.len());
        }

        Network {
            node_count: c,
            offsets,
            neighbors,
            edge_weights,
            node_weights,
            self_link_weight,
            clusters: (0..c).collect(),
            cluster_count: c,
        }
    }

    /// Induced network of the nodes of one cluster
    fn subnetwork(&self, cluster: usize, nodes: &[usize]) -> Network {
        let mut position = vec![usize::MAX; self.node_count];
        for (p, &node) in nodes.iter().enumerate() {
            position[node] = p;
        }

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        offsets.push(0);
        let mut neighbors = Vec::new();
        let mut edge_weights = Vec::new();
        for &node in nodes {
            for e in self.offsets[node]..self.offsets[node + 1] {
                let neighbor = self.neighbors[e];
                if self.clusters[neighbor] == cluster {
                    neighbors.push(position[neighbor]);
                    edge_weights.push(self.edge_weights[e]);
                }
            }
            offsets.push(neighbors.len());
        }
        let node_weights = nodes.iter().map(|&node| self.node_weights[node]).collect();

        Network::new(offsets, neighbors, edge_weights, node_weights)
    }

    fn merge_clusters(&mut self, merged: &[usize]) {
        for cluster in &mut self.clusters {
            *cluster = merged[*cluster];
        }
        self.cluster_count = self.clusters.iter().max().map_or(0, |max| max + 1);
    }
}

/// Random order of `0..n`: every position is swapped with a uniformly drawn one
fn random_permutation<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<usize> {
    let mut permutation: Vec<usize> = (0..n).collect();
    for i in 0..n {
        let j = rng.random_range(0..n);
        permutation.swap(i, j);
    }
    permutation
}
