//! Initial bipartitioning: a portfolio of cheap seed bipartitioners run
//! many times with adaptive selection, each candidate polished by the
//! sequential 2-way FM refiner.

use std::collections::VecDeque;

use crate::defs::*;
use crate::fm::refine_2way;
use crate::graph::Graph;
use crate::options::{InitialPartitioningCtx, PartitionContext};
use crate::pqueue::IndexedPriorityQueue;

/// Welford's online mean/variance.
#[derive(Debug, Default, Clone)]
pub struct RunningVariance {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningVariance {
    pub fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// `(mean, variance)`; with no samples the mean is infinite so an
    /// untried algorithm is never pruned.
    pub fn get(&self) -> (f64, f64) {
        match self.count {
            0 => (f64::MAX, 0.0),
            1 => (self.mean, 0.0),
            _ => (self.mean, self.m2 / self.count as f64),
        }
    }
}

/// An algorithm keeps running while its feasible-cut distribution leaves a
/// realistic chance of beating the incumbent: `variance > ((mean - best)/2)^2`.
/// A mean below the best keeps it running as well.
pub fn likely_to_improve(stats: &RunningVariance, best_cut: EdgeWeight) -> bool {
    let (mean, variance) = stats.get();
    let rhs = (mean - best_cut as f64) / 2.0;
    variance > rhs * rhs
}

/// The portfolio, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BipartitionerAlgorithm {
    GreedyGraphGrowing,
    BfsAlternating,
    BfsLighterBlock,
    BfsLongerQueue,
    BfsShorterQueue,
    BfsSequential,
    Random,
}

impl BipartitionerAlgorithm {
    pub const ALL: [Self; 7] = [
        Self::GreedyGraphGrowing,
        Self::BfsAlternating,
        Self::BfsLighterBlock,
        Self::BfsLongerQueue,
        Self::BfsShorterQueue,
        Self::BfsSequential,
        Self::Random,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::GreedyGraphGrowing => "greedy_graph_growing",
            Self::BfsAlternating => "bfs_alternating",
            Self::BfsLighterBlock => "bfs_lighter_block",
            Self::BfsLongerQueue => "bfs_longer_queue",
            Self::BfsShorterQueue => "bfs_shorter_queue",
            Self::BfsSequential => "bfs_sequential",
            Self::Random => "random",
        }
    }
}

/// Per-algorithm outcome counters reported by the pool.
#[derive(Debug, Default, Clone)]
pub struct BipartitionerStatistics {
    pub cuts: Vec<EdgeWeight>,
    pub cut_mean: f64,
    pub cut_variance: f64,
    pub num_feasible_partitions: usize,
    pub num_infeasible_partitions: usize,
}

#[derive(Debug, Default, Clone)]
pub struct PoolStatistics {
    pub per_bipartitioner: Vec<BipartitionerStatistics>,
    pub best_cut: EdgeWeight,
    pub best_bipartitioner: usize,
    pub best_feasible: bool,
    pub best_imbalance: f64,
}

/// Runs the portfolio on `graph` and keeps the best candidate under the
/// acceptance order: feasibility first, then cut, then imbalance.
pub struct PoolBipartitioner<'a> {
    graph: &'a Graph,
    p_ctx: &'a PartitionContext,
    ctx: &'a InitialPartitioningCtx,
    rng: fastrand::Rng,
    current: Vec<BlockId>,
    best: Vec<BlockId>,
    best_cut: EdgeWeight,
    best_feasible: bool,
    best_imbalance: f64,
    best_bipartitioner: usize,
    running: Vec<RunningVariance>,
    statistics: PoolStatistics,
}

impl<'a> PoolBipartitioner<'a> {
    pub fn new(
        graph: &'a Graph,
        p_ctx: &'a PartitionContext,
        ctx: &'a InitialPartitioningCtx,
        seed: u64,
    ) -> Self {
        debug_assert_eq!(p_ctx.k, 2);
        let n = graph.n();
        Self {
            graph,
            p_ctx,
            ctx,
            rng: fastrand::Rng::with_seed(seed),
            current: vec![0; n],
            best: vec![0; n],
            best_cut: EdgeWeight::MAX,
            best_feasible: false,
            best_imbalance: 0.0,
            best_bipartitioner: 0,
            running: vec![RunningVariance::default(); BipartitionerAlgorithm::ALL.len()],
            statistics: PoolStatistics {
                per_bipartitioner: vec![
                    BipartitionerStatistics::default();
                    BipartitionerAlgorithm::ALL.len()
                ],
                ..PoolStatistics::default()
            },
        }
    }

    /// The best partition over the adaptive schedule, plus statistics.
    /// Always returns something: infeasible candidates are only recorded,
    /// never propagated as errors.
    pub fn bipartition(mut self) -> (Vec<BlockId>, PoolStatistics) {
        let repetitions = self
            .ctx
            .num_repetitions
            .clamp(self.ctx.min_num_repetitions, self.ctx.max_num_repetitions);
        for rep in 0..repetitions {
            for i in 0..BipartitionerAlgorithm::ALL.len() {
                if rep < self.ctx.min_num_non_adaptive_repetitions
                    || !self.ctx.use_adaptive_bipartitioner_selection
                    || likely_to_improve(&self.running[i], self.best_cut)
                {
                    self.run_bipartitioner(i);
                }
            }
        }

        for (i, running) in self.running.iter().enumerate() {
            let (mean, variance) = running.get();
            self.statistics.per_bipartitioner[i].cut_mean = mean;
            self.statistics.per_bipartitioner[i].cut_variance = variance;
        }
        self.statistics.best_cut = self.best_cut;
        self.statistics.best_feasible = self.best_feasible;
        self.statistics.best_imbalance = self.best_imbalance;
        self.statistics.best_bipartitioner = self.best_bipartitioner;

        log::debug!(
            "initial pool: winner {} cut {} feasible {}",
            BipartitionerAlgorithm::ALL[self.best_bipartitioner].name(),
            self.best_cut,
            self.best_feasible,
        );
        (self.best, self.statistics)
    }

    fn run_bipartitioner(&mut self, i: usize) {
        let algorithm = BipartitionerAlgorithm::ALL[i];
        bipartition_once(self.graph, self.p_ctx, algorithm, &mut self.rng, &mut self.current);
        let cut = refine_2way(
            self.graph,
            self.p_ctx,
            &mut self.current,
            self.ctx.refinement_iterations,
            &mut self.rng,
        );

        let mut block_weights = [0 as NodeWeight; 2];
        for u in self.graph.nodes() {
            block_weights[self.current[u as usize] as usize] += self.graph.node_weight(u);
        }
        let imbalance = self.p_ctx.imbalance(&block_weights);
        let feasible = self.p_ctx.is_feasible(&block_weights);

        if feasible {
            self.statistics.per_bipartitioner[i].cuts.push(cut);
            self.statistics.per_bipartitioner[i].num_feasible_partitions += 1;
            self.running[i].update(cut as f64);
        } else {
            self.statistics.per_bipartitioner[i].num_infeasible_partitions += 1;
        }

        if accepts(
            (self.best_cut, self.best_imbalance, self.best_feasible),
            (cut, imbalance, feasible),
        ) {
            self.best_cut = cut;
            self.best_imbalance = imbalance;
            self.best_feasible = feasible;
            self.best_bipartitioner = i;
            std::mem::swap(&mut self.current, &mut self.best);
        }
    }
}

/// The acceptance rule: a feasible candidate always beats an infeasible
/// incumbent; otherwise cut decides, with imbalance as the tiebreak. The
/// rule is a total order, so the winner does not depend on the order in
/// which candidates are scored.
pub fn accepts(
    best: (EdgeWeight, f64, bool),
    candidate: (EdgeWeight, f64, bool),
) -> bool {
    let (best_cut, best_imbalance, best_feasible) = best;
    let (cut, imbalance, feasible) = candidate;
    best_feasible <= feasible
        && (best_feasible < feasible
            || cut < best_cut
            || (cut == best_cut && imbalance < best_imbalance))
}

/// Runs a single seeded bipartitioner, filling `partition`.
pub fn bipartition_once(
    graph: &Graph,
    p_ctx: &PartitionContext,
    algorithm: BipartitionerAlgorithm,
    rng: &mut fastrand::Rng,
    partition: &mut [BlockId],
) {
    use BipartitionerAlgorithm::*;
    match algorithm {
        GreedyGraphGrowing => greedy_graph_growing(graph, p_ctx, rng, partition),
        BfsAlternating | BfsLighterBlock | BfsLongerQueue | BfsShorterQueue | BfsSequential => {
            bfs_bipartition(graph, p_ctx, algorithm, rng, partition)
        }
        Random => random_bipartition(graph, p_ctx, rng, partition),
    }
}

/// Assigns everything to block 1, then pulls random nodes into block 0
/// until it reaches its target weight.
fn random_bipartition(
    graph: &Graph,
    p_ctx: &PartitionContext,
    rng: &mut fastrand::Rng,
    partition: &mut [BlockId],
) {
    partition.fill(1);
    let target = p_ctx.perfect_block_weight(0);
    let mut order: Vec<NodeId> = graph.nodes().collect();
    rng.shuffle(&mut order);
    let mut weight = 0;
    for u in order {
        let w = graph.node_weight(u);
        if weight + w <= target {
            partition[u as usize] = 0;
            weight += w;
            if weight >= target {
                break;
            }
        }
    }
}

/// Region growing: block 0 grows around a random seed, always taking the
/// frontier node with the highest gain, until it reaches its target.
fn greedy_graph_growing(
    graph: &Graph,
    p_ctx: &PartitionContext,
    rng: &mut fastrand::Rng,
    partition: &mut [BlockId],
) {
    partition.fill(1);
    let n = graph.n();
    if n == 0 {
        return;
    }
    let target = p_ctx.perfect_block_weight(0);

    let mut queue = IndexedPriorityQueue::new(n);
    let mut touched = vec![false; n];
    let mut weight = 0;

    let seed = rng.u32(0..n as u32);
    queue.insert(seed, 0);
    touched[seed as usize] = true;

    while weight < target {
        let node = match queue.pop() {
            Some(node) => node,
            None => {
                // ran dry (disconnected); restart from an untouched node
                match graph.nodes().find(|&u| !touched[u as usize]) {
                    Some(u) => {
                        touched[u as usize] = true;
                        queue.insert(u, 0);
                        continue;
                    }
                    None => break,
                }
            }
        };
        partition[node as usize] = 0;
        weight += graph.node_weight(node);

        for (v, w) in graph.neighbors_weighted(node) {
            if partition[v as usize] == 1 {
                if touched[v as usize] {
                    // the edge to v flipped from external to internal
                    if queue.contains(v) {
                        queue.update(v, queue.key_of(v) + 2 * w);
                    }
                } else {
                    touched[v as usize] = true;
                    // gain of pulling v over: external minus internal degree
                    let gain: EdgeWeight = graph
                        .neighbors_weighted(v)
                        .map(|(x, wx)| if partition[x as usize] == 0 { wx } else { -wx })
                        .sum();
                    queue.insert(v, gain);
                }
            }
        }
    }
}

/// The BFS family: two frontiers grow from random seeds; the variant
/// decides which frontier advances next.
fn bfs_bipartition(
    graph: &Graph,
    p_ctx: &PartitionContext,
    algorithm: BipartitionerAlgorithm,
    rng: &mut fastrand::Rng,
    partition: &mut [BlockId],
) {
    use BipartitionerAlgorithm::*;
    let n = graph.n();
    partition.fill(1);
    if n == 0 {
        return;
    }

    let mut queues = [VecDeque::new(), VecDeque::new()];
    let mut assigned = vec![false; n];
    let mut weights = [0 as NodeWeight; 2];
    let mut closed = [false, false];

    let seed0 = rng.u32(0..n as u32);
    queues[0].push_back(seed0);
    if matches!(algorithm, BfsSequential) {
        closed[1] = true;
    } else {
        let seed1 = loop {
            let s = rng.u32(0..n as u32);
            if s != seed0 || n == 1 {
                break s;
            }
        };
        queues[1].push_back(seed1);
    }

    let mut side = 0;
    let mut remaining = n;
    while remaining > 0 && !(closed[0] && closed[1]) {
        side = match algorithm {
            BfsAlternating => 1 - side,
            BfsLighterBlock => usize::from(weights[1] < weights[0]),
            BfsLongerQueue => usize::from(queues[1].len() > queues[0].len()),
            BfsShorterQueue => usize::from(queues[1].len() < queues[0].len()),
            BfsSequential => 0,
            _ => unreachable!("not a bfs variant"),
        };
        if closed[side] || (queues[side].is_empty() && !queues[1 - side].is_empty()) {
            side = 1 - side;
        }
        if closed[side] {
            break;
        }

        let node = match queues[side].pop_front() {
            Some(node) => node,
            None => {
                // seed the frontier from an unassigned node
                match graph.nodes().find(|&u| !assigned[u as usize]) {
                    Some(u) => {
                        queues[side].push_back(u);
                        continue;
                    }
                    None => break,
                }
            }
        };
        if assigned[node as usize] {
            continue;
        }

        let w = graph.node_weight(node);
        if weights[side] + w > p_ctx.perfect_block_weight(side as BlockId) && !closed[1 - side] {
            // this frontier is full; everything else belongs to the other side
            closed[side] = true;
            queues[side].push_front(node);
            continue;
        }

        assigned[node as usize] = true;
        remaining -= 1;
        partition[node as usize] = side as BlockId;
        weights[side] += w;
        for v in graph.neighbors(node) {
            if !assigned[v as usize] {
                queues[side].push_back(v);
            }
        }
    }

    // leftovers (disconnected or fenced off) go to the lighter block
    for u in graph.nodes() {
        if !assigned[u as usize] {
            let side = usize::from(weights[1] <= weights[0]);
            partition[u as usize] = side as BlockId;
            weights[side] += graph.node_weight(u);
        }
    }
}
