//! Label-propagation clustering: the coarsening engine's first half.

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::defs::*;
use crate::graph::Graph;
use crate::options::{IsolatedNodesClusteringStrategy, LabelPropagationCtx, TwoHopStrategy};
use crate::ratingmap::RatingMap;

/// Computes a clustering of `graph` under the cluster-weight cap
/// `max_cluster_weight`. Every node is covered; cluster ids are node ids
/// (the id of some member), not yet densely remapped.
///
/// Iterations are semi-synchronous: the visit order is shuffled and split
/// into disjoint chunks, chunks run one after another with the nodes of a
/// chunk processed in parallel, so reads across chunks see the labels of
/// the previous chunk's completed pass.
pub fn compute_clustering(
    graph: &Graph,
    max_cluster_weight: NodeWeight,
    ctx: &LabelPropagationCtx,
    seed: u64,
) -> Vec<NodeId> {
    let n = graph.n();
    if n == 0 {
        return Vec::new();
    }

    let state = LpState {
        graph,
        max_cluster_weight,
        ctx,
        labels: (0..n as NodeId).map(AtomicU32::new).collect(),
        cluster_weights: (0..n as NodeId)
            .map(|u| AtomicI64::new(graph.node_weight(u)))
            .collect(),
        favored: (0..n).map(|_| AtomicU32::new(INVALID_NODE)).collect(),
        rng_counter: AtomicUsize::new(seed as usize),
    };

    let mut order: Vec<NodeId> = (0..n as NodeId).collect();
    let mut rng = fastrand::Rng::with_seed(seed);

    for iteration in 0..ctx.num_iterations {
        rng.shuffle(&mut order);
        let moved = state.perform_iteration(&order);
        log::debug!("lp iteration {iteration}: {moved} nodes moved");
        if moved == 0 {
            break;
        }
    }

    match ctx.isolated_nodes_strategy {
        IsolatedNodesClusteringStrategy::Match => state.handle_isolated_nodes(true),
        IsolatedNodesClusteringStrategy::Cluster => state.handle_isolated_nodes(false),
        _ => {}
    }

    if ctx.two_hop_strategy != TwoHopStrategy::Disable {
        let num_clusters = state.count_clusters();
        if num_clusters as f64 > ctx.two_hop_threshold * n as f64 {
            match ctx.isolated_nodes_strategy {
                IsolatedNodesClusteringStrategy::MatchDuringTwoHop => {
                    state.handle_isolated_nodes(true)
                }
                IsolatedNodesClusteringStrategy::ClusterDuringTwoHop => {
                    state.handle_isolated_nodes(false)
                }
                _ => {}
            }
            let pairs_only = matches!(
                ctx.two_hop_strategy,
                TwoHopStrategy::Match | TwoHopStrategy::MatchDuringTwoHop
            );
            state.perform_two_hop_clustering(pairs_only);
        }
    }

    state.labels.into_iter().map(AtomicU32::into_inner).collect()
}

struct LpState<'g> {
    graph: &'g Graph,
    max_cluster_weight: NodeWeight,
    ctx: &'g LabelPropagationCtx,
    labels: Vec<AtomicU32>,
    cluster_weights: Vec<AtomicI64>,
    /// Highest-rated cluster seen per node, capacity ignored; feeds the
    /// two-hop augmentation.
    favored: Vec<AtomicU32>,
    rng_counter: AtomicUsize,
}

impl LpState<'_> {
    fn thread_rng(&self) -> fastrand::Rng {
        let salt = self.rng_counter.fetch_add(1, Ordering::Relaxed);
        fastrand::Rng::with_seed(0x9e37_79b9_7f4a_7c15_u64.wrapping_mul(salt as u64 + 1))
    }

    fn perform_iteration(&self, order: &[NodeId]) -> usize {
        let n = self.graph.n();
        let moved = AtomicUsize::new(0);
        let chunk_size = n.div_ceil(self.ctx.num_chunks.max(1)).max(1);

        for chunk in order.chunks(chunk_size) {
            chunk
                .par_iter()
                .for_each_init(
                    || (RatingMap::new(n), self.thread_rng()),
                    |(map, rng), &u| {
                        if self.process_node(u, map, rng) {
                            moved.fetch_add(1, Ordering::Relaxed);
                        }
                        map.clear();
                    },
                );
        }
        moved.into_inner()
    }

    /// Visits `u`: rates neighboring clusters and moves `u` to the best
    /// one whose weight cap admits it. Returns true if the label changed.
    fn process_node(&self, u: NodeId, map: &mut RatingMap, rng: &mut fastrand::Rng) -> bool {
        let degree = self.graph.degree(u);
        if degree == 0 {
            return false;
        }

        let current = self.labels[u as usize].load(Ordering::Relaxed);
        let u_weight = self.graph.node_weight(u);

        if degree > self.ctx.large_degree_threshold {
            // fast path: rate a sample of the adjacency
            let edges = self.graph.edges_of(u);
            for _ in 0..self.ctx.max_num_neighbors {
                let e = rng.usize(edges.clone());
                let v = self.graph.edge_target(e);
                if v != u {
                    map.add(self.labels[v as usize].load(Ordering::Relaxed), self.graph.edge_weight(e));
                }
            }
        } else {
            for (v, w) in self.graph.neighbors_weighted(u) {
                if v != u {
                    map.add(self.labels[v as usize].load(Ordering::Relaxed), w);
                }
            }
        }

        // favored cluster: unconstrained argmax with random tie-breaking
        let mut favored = current;
        let mut favored_rating = 0;
        for (cluster, rating) in map.entries() {
            if rating > favored_rating || (rating == favored_rating && rng.bool()) {
                favored = cluster;
                favored_rating = rating;
            }
        }
        self.favored[u as usize].store(favored, Ordering::Relaxed);

        // running-best scan with a coin flip on every tie, like the
        // favored scan; a cluster is admissible if the cap admits u or it
        // is the current cluster. A lost commit race excludes the cluster
        // and rescans for the next-best
        let current_rating = map.get(current);
        let mut excluded = [INVALID_NODE; 4];
        for attempt in 0..excluded.len() {
            let mut best = current;
            let mut best_rating = current_rating;
            for (cluster, rating) in map.entries() {
                if cluster == current || excluded[..attempt].contains(&cluster) {
                    continue;
                }
                if rating < best_rating || (rating == best_rating && !rng.bool()) {
                    continue;
                }
                let weight = self.cluster_weights[cluster as usize].load(Ordering::Relaxed);
                if weight + u_weight > self.max_cluster_weight {
                    continue;
                }
                best = cluster;
                best_rating = rating;
            }
            if best == current {
                break;
            }
            if self.try_commit(u, u_weight, current, best) {
                return true;
            }
            excluded[attempt] = best;
        }
        false
    }

    /// Atomically reserves `u_weight` in `to`; the move commits only if it
    /// keeps the target at or below the cap.
    fn try_commit(&self, u: NodeId, u_weight: NodeWeight, from: NodeId, to: NodeId) -> bool {
        let target = &self.cluster_weights[to as usize];
        let mut current = target.load(Ordering::Relaxed);
        loop {
            if current + u_weight > self.max_cluster_weight {
                return false;
            }
            match target.compare_exchange_weak(
                current,
                current + u_weight,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.cluster_weights[from as usize].fetch_sub(u_weight, Ordering::Relaxed);
        self.labels[u as usize].store(to, Ordering::Relaxed);
        debug_assert!(
            target.load(Ordering::Relaxed) <= self.max_cluster_weight,
            "cluster {to} exceeds the weight cap"
        );
        true
    }

    fn count_clusters(&self) -> usize {
        let mut present = vec![false; self.graph.n()];
        for label in &self.labels {
            present[label.load(Ordering::Relaxed) as usize] = true;
        }
        present.iter().filter(|&&p| p).count()
    }

    /// Groups degree-0 nodes: pairwise by a sorted scan (`pairs_only`) or
    /// into catch-all clusters, both subject to the weight cap.
    fn handle_isolated_nodes(&self, pairs_only: bool) {
        let mut isolated: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|&u| self.graph.degree(u) == 0)
            .collect();
        isolated.sort_unstable_by_key(|&u| (self.graph.node_weight(u), u));

        let mut leader: Option<NodeId> = None;
        let mut leader_weight = 0;
        for &u in &isolated {
            let w = self.graph.node_weight(u);
            match leader {
                Some(l) if leader_weight + w <= self.max_cluster_weight => {
                    self.labels[u as usize].store(l, Ordering::Relaxed);
                    self.cluster_weights[l as usize].fetch_add(w, Ordering::Relaxed);
                    self.cluster_weights[u as usize].fetch_sub(w, Ordering::Relaxed);
                    leader_weight += w;
                    if pairs_only {
                        leader = None;
                    }
                }
                _ => {
                    leader = Some(u);
                    leader_weight = w;
                }
            }
        }
    }

    /// Merges leftover singletons that share their favored neighbor:
    /// the first singleton to arrive parks in a slot keyed by the favored
    /// cluster, later arrivals join it.
    fn perform_two_hop_clustering(&self, pairs_only: bool) {
        let n = self.graph.n();
        let slots: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(INVALID_NODE)).collect();

        self.graph.nodes().into_par_iter().for_each(|u| {
            if !self.is_singleton(u) {
                return;
            }
            let favored = self.favored[u as usize].load(Ordering::Relaxed);
            if favored == INVALID_NODE || favored == u {
                return;
            }
            let slot = &slots[favored as usize];
            let mut parked = slot.load(Ordering::Relaxed);
            loop {
                if parked == INVALID_NODE {
                    match slot.compare_exchange_weak(
                        INVALID_NODE,
                        u,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => return, // parked; a later arrival joins us
                        Err(actual) => parked = actual,
                    }
                    continue;
                }
                if parked == u {
                    return;
                }
                if pairs_only {
                    // claim the partner so each slot forms one pair
                    match slot.compare_exchange_weak(
                        parked,
                        INVALID_NODE,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => {}
                        Err(actual) => {
                            parked = actual;
                            continue;
                        }
                    }
                }
                let target = self.labels[parked as usize].load(Ordering::Relaxed);
                if !self.try_commit(u, self.graph.node_weight(u), u, target) && !pairs_only {
                    // full cluster: become the new leader for this slot
                    slot.store(u, Ordering::Relaxed);
                }
                return;
            }
        });
    }

    fn is_singleton(&self, u: NodeId) -> bool {
        self.labels[u as usize].load(Ordering::Relaxed) == u
            && self.cluster_weights[u as usize].load(Ordering::Relaxed) == self.graph.node_weight(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::LabelPropagationCtx;

    fn ctx() -> LabelPropagationCtx {
        LabelPropagationCtx::default()
    }

    fn weights_of(graph: &Graph, clustering: &[NodeId]) -> Vec<NodeWeight> {
        let mut w = vec![0; graph.n()];
        for u in graph.nodes() {
            w[clustering[u as usize] as usize] += graph.node_weight(u);
        }
        w
    }

    #[test]
    fn covers_every_node() {
        let g = Graph::from_edges(6, &[(0, 1, 1), (1, 2, 1), (3, 4, 1), (4, 5, 1)], vec![]).unwrap();
        let clustering = compute_clustering(&g, 3, &ctx(), 1);
        assert_eq!(clustering.len(), 6);
        assert!(clustering.iter().all(|&c| (c as usize) < 6));
    }

    #[test]
    fn respects_weight_cap() {
        // a clique wants to collapse into one cluster; the cap forbids it
        let edges: Vec<_> = (0..6u32)
            .flat_map(|u| ((u + 1)..6).map(move |v| (u, v, 1)))
            .collect();
        let g = Graph::from_edges(6, &edges, vec![]).unwrap();
        for cap in [1, 2, 3] {
            let clustering = compute_clustering(&g, cap, &ctx(), 7);
            let weights = weights_of(&g, &clustering);
            assert!(
                weights.iter().all(|&w| w <= cap),
                "cap {cap} violated: {weights:?}"
            );
        }
    }

    #[test]
    fn merges_a_tight_community() {
        // two triangles joined by one edge collapse to few clusters
        let g = Graph::from_edges(
            6,
            &[(0, 1, 9), (1, 2, 9), (0, 2, 9), (3, 4, 9), (4, 5, 9), (3, 5, 9), (2, 3, 1)],
            vec![],
        )
        .unwrap();
        let clustering = compute_clustering(&g, 3, &ctx(), 3);
        assert_eq!(clustering[0], clustering[1]);
        assert_eq!(clustering[1], clustering[2]);
        assert_eq!(clustering[3], clustering[4]);
        assert_eq!(clustering[4], clustering[5]);
        assert_ne!(clustering[0], clustering[3]);
    }

    #[test]
    fn ties_between_clusters_are_randomized() {
        // node 2 sees clusters 0 and 1 with equal ratings; across seeds
        // both targets must occur
        let g = Graph::from_edges(3, &[(0, 2, 1), (1, 2, 1)], vec![]).unwrap();
        let lp = ctx();
        let mut seen = [false, false];
        for seed in 0..32u64 {
            let state = LpState {
                graph: &g,
                max_cluster_weight: 2,
                ctx: &lp,
                labels: (0..3u32).map(AtomicU32::new).collect(),
                cluster_weights: (0..3).map(|_| AtomicI64::new(1)).collect(),
                favored: (0..3).map(|_| AtomicU32::new(INVALID_NODE)).collect(),
                rng_counter: AtomicUsize::new(0),
            };
            let mut map = RatingMap::new(3);
            let mut rng = fastrand::Rng::with_seed(seed);
            assert!(state.process_node(2, &mut map, &mut rng));
            seen[state.labels[2].load(Ordering::Relaxed) as usize] = true;
        }
        assert!(
            seen[0] && seen[1],
            "tied clusters must not resolve to one target deterministically"
        );
    }

    #[test]
    fn isolated_nodes_are_matched_pairwise() {
        let g = Graph::from_edges(5, &[(0, 1, 1)], vec![]).unwrap();
        let mut lp = ctx();
        lp.isolated_nodes_strategy = IsolatedNodesClusteringStrategy::Match;
        let clustering = compute_clustering(&g, 10, &lp, 5);
        // nodes 2, 3, 4 are isolated; the sorted scan pairs two of them
        let pairs = (2..5)
            .flat_map(|a| (a + 1..5).map(move |b| (a, b)))
            .filter(|&(a, b)| clustering[a] == clustering[b])
            .count();
        assert_eq!(pairs, 1);
    }

    #[test]
    fn isolated_nodes_cluster_together_under_cap() {
        let g = Graph::from_edges(4, &[], vec![]).unwrap();
        let mut lp = ctx();
        lp.isolated_nodes_strategy = IsolatedNodesClusteringStrategy::Cluster;
        let clustering = compute_clustering(&g, 10, &lp, 5);
        assert!(clustering.iter().all(|&c| c == clustering[0]));

        let clustering = compute_clustering(&g, 2, &lp, 5);
        let weights = weights_of(&g, &clustering);
        assert!(weights.iter().all(|&w| w <= 2));
    }

    #[test]
    fn two_hop_matches_star_leaves() {
        // leaves of a star all favor the hub; with a cap of 2 the hub can
        // absorb at most one, two-hop matching pairs up the rest
        let edges: Vec<_> = (1..9u32).map(|v| (0, v, 1)).collect();
        let g = Graph::from_edges(9, &edges, vec![]).unwrap();
        let mut lp = ctx();
        lp.two_hop_strategy = TwoHopStrategy::Match;
        lp.num_iterations = 1;
        let clustering = compute_clustering(&g, 2, &lp, 11);
        let weights = weights_of(&g, &clustering);
        assert!(weights.iter().all(|&w| w <= 2));
        let singletons = (0..9).filter(|&u| weights_of(&g, &clustering)[u] == 1 && clustering[u] == u as u32).count();
        // at most one leaf can stay unmatched (odd counts), plus possibly the hub's cluster
        assert!(singletons <= 2, "two-hop left {singletons} singletons: {clustering:?}");
    }
}
