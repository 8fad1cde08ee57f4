//! Parallel k-way FM refinement: localized searches rooted at border
//! seeds, speculative moves on thread-local delta views, best-prefix
//! commits against the shared partition.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rayon::prelude::*;

use crate::balance;
use crate::defs::*;
use crate::gaincache::{DeltaGainCache, GainCache};
use crate::initpart::RunningVariance;
use crate::options::{FmStoppingRule, KwayFmCtx, PartitionContext};
use crate::partition::{DeltaPartition, PartitionedGraph};
use crate::pqueue::IndexedPriorityQueue;

struct Move {
    node: NodeId,
    from: BlockId,
    to: BlockId,
}

/// Runs up to `ctx.num_iterations` rounds of localized FM on the live
/// partition, keeping the gain cache consistent move by move. A snapshot
/// of the best cut seen is kept across rounds; if the final cut regresses,
/// the snapshot replaces the live partition at shutdown.
pub fn refine(
    p_graph: &mut PartitionedGraph,
    gain_cache: &mut GainCache,
    p_ctx: &PartitionContext,
    ctx: &KwayFmCtx,
    seed: u64,
) {
    let n = p_graph.n();
    if n == 0 {
        return;
    }

    let claimed: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
    let mut best_cut = EdgeWeight::MAX;
    let mut best_partition: Option<Vec<BlockId>> = None;
    if p_ctx.is_feasible(&p_graph.block_weights()) {
        best_cut = p_graph.cut();
        best_partition = Some(p_graph.copy_partition());
    }
    let mut rng = fastrand::Rng::with_seed(seed);

    for round in 0..ctx.num_iterations {
        let mut border: Vec<NodeId> = {
            let shared: &PartitionedGraph = p_graph;
            let cache: &GainCache = gain_cache;
            shared
                .graph()
                .nodes()
                .into_par_iter()
                .filter(|&u| cache.is_border(shared, u, shared.block(u)))
                .collect()
        };
        if border.is_empty() {
            break;
        }
        rng.shuffle(&mut border);

        let committed_gain = AtomicI64::new(0);
        {
            let shared: &PartitionedGraph = p_graph;
            let gain_cache: &GainCache = gain_cache;
            border
                .par_chunks(ctx.num_seed_nodes.max(1))
                .for_each_init(
                    || SearchWorkspace {
                        d_graph: DeltaPartition::new(shared),
                        d_cache: DeltaGainCache::new(gain_cache, shared.k()),
                        queue: IndexedPriorityQueue::new(n),
                        moves: Vec::new(),
                        claims: Vec::new(),
                    },
                    |workspace, seeds| {
                        let gain = localized_search(
                            shared, gain_cache, p_ctx, ctx, &claimed, workspace, seeds,
                        );
                        committed_gain.fetch_add(gain, Ordering::Relaxed);
                    },
                );
        }

        // weights may overshoot when commits race; repair before the next
        // round so gains stay truthful
        if !p_ctx.is_feasible(&p_graph.block_weights()) {
            if let Err(e) = balance::balance(p_graph, gain_cache, p_ctx) {
                log::debug!("kway-fm round {round}: balancer failed: {e}");
            }
        }

        let round_gain = committed_gain.into_inner();
        let cut = p_graph.cut();
        log::debug!("kway-fm round {round}: committed gain {round_gain}, cut {cut}");
        if cut < best_cut && p_ctx.is_feasible(&p_graph.block_weights()) {
            best_cut = cut;
            best_partition = Some(p_graph.copy_partition());
        }
        if round_gain == 0 {
            break;
        }
    }

    // restore the snapshot if the last round regressed
    if let Some(best) = best_partition {
        if p_graph.cut() > best_cut {
            p_graph.set_partition(&best);
            gain_cache.init(p_graph);
        }
    }
}

struct SearchWorkspace<'p, 'g, 'c> {
    d_graph: DeltaPartition<'p, 'g>,
    d_cache: DeltaGainCache<'c>,
    queue: IndexedPriorityQueue,
    moves: Vec<Move>,
    claims: Vec<NodeId>,
}

/// One localized search: expands from the claimed seeds by highest gain,
/// applies moves to the delta view, and commits the best positive-gain
/// prefix to the shared partition. Returns the committed gain.
fn localized_search(
    p_graph: &PartitionedGraph,
    gain_cache: &GainCache,
    p_ctx: &PartitionContext,
    ctx: &KwayFmCtx,
    claimed: &[AtomicBool],
    ws: &mut SearchWorkspace,
    seeds: &[NodeId],
) -> EdgeWeight {
    ws.moves.clear();
    ws.claims.clear();
    ws.d_graph.clear();
    ws.d_cache.clear();
    ws.queue.reset();

    for &seed in seeds {
        if try_claim(claimed, seed) {
            ws.claims.push(seed);
            if let Some((_, gain)) = best_move(p_graph, p_ctx, &ws.d_graph, &ws.d_cache, seed) {
                ws.queue.insert(seed, gain);
            }
        }
    }

    let mut stopper = Stopper::new(ctx);
    let mut cumulative_gain = 0;
    let mut best_gain = 0;
    let mut best_prefix = 0;

    while let Some(node) = ws.queue.pop() {
        let Some((to, gain)) = best_move(p_graph, p_ctx, &ws.d_graph, &ws.d_cache, node) else {
            continue; // no cap-respecting target remains
        };
        // lazy reinsertion: the popped key may be stale
        if ws.queue.peek_key().is_some_and(|top| top > gain) {
            ws.queue.insert(node, gain);
            continue;
        }

        let from = ws.d_graph.block(node);
        ws.d_cache.move_node(&ws.d_graph, node, from, to);
        ws.d_graph.set_block(node, to);
        ws.moves.push(Move { node, from, to });
        cumulative_gain += gain;
        log::trace!("kway-fm: tentative move of {node} from {from} to {to}, gain {gain}");

        if cumulative_gain > best_gain {
            best_gain = cumulative_gain;
            best_prefix = ws.moves.len();
            stopper.improved();
        } else if stopper.should_stop(gain) {
            break;
        }

        for v in p_graph.graph().neighbors(node) {
            if !ws.queue.contains(v) && try_claim(claimed, v) {
                ws.claims.push(v);
                if let Some((_, v_gain)) =
                    best_move(p_graph, p_ctx, &ws.d_graph, &ws.d_cache, v)
                {
                    ws.queue.insert(v, v_gain);
                }
            }
        }
    }

    let committed = if best_gain > 0 {
        for m in &ws.moves[..best_prefix] {
            p_graph.move_node(m.node, m.from, m.to);
            gain_cache.move_node(p_graph, m.node, m.from, m.to);
        }
        best_gain
    } else {
        0
    };

    for &node in &ws.claims {
        claimed[node as usize].store(false, Ordering::Relaxed);
    }
    committed
}

#[inline]
fn try_claim(claimed: &[AtomicBool], node: NodeId) -> bool {
    claimed[node as usize]
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
}

/// Highest-gain move of `node` on the delta view whose target respects the
/// block-weight cap. Ties prefer the lighter target block.
fn best_move(
    p_graph: &PartitionedGraph,
    p_ctx: &PartitionContext,
    d_graph: &DeltaPartition,
    d_cache: &DeltaGainCache,
    node: NodeId,
) -> Option<(BlockId, EdgeWeight)> {
    let from = d_graph.block(node);
    let weight = p_graph.graph().node_weight(node);
    let conn_from = d_cache.conn(d_graph, node, from);

    let mut best: Option<(BlockId, EdgeWeight, NodeWeight)> = None;
    for to in 0..p_graph.k() {
        if to == from {
            continue;
        }
        let to_weight = d_graph.block_weight(to);
        if to_weight + weight > p_ctx.max_block_weight(to) {
            continue;
        }
        let gain = d_cache.conn(d_graph, node, to) - conn_from;
        let better = match best {
            None => true,
            Some((_, best_gain, best_weight)) => {
                gain > best_gain || (gain == best_gain && to_weight < best_weight)
            }
        };
        if better {
            best = Some((to, gain, to_weight));
        }
    }
    best.map(|(to, gain, _)| (to, gain))
}

/// Sequence stopping rule. `simple` aborts after a fixed number of moves
/// without improvement; `adaptive` models the gains since the last
/// improvement as a random walk and aborts once the expected drift can no
/// longer recover the loss.
enum Stopper {
    Simple {
        limit: usize,
        since_best: usize,
    },
    Adaptive {
        alpha: f64,
        since_best: usize,
        gains: RunningVariance,
    },
}

impl Stopper {
    fn new(ctx: &KwayFmCtx) -> Self {
        match ctx.stopping_rule {
            FmStoppingRule::Simple => Stopper::Simple {
                limit: ctx.num_fruitless_moves,
                since_best: 0,
            },
            FmStoppingRule::Adaptive => Stopper::Adaptive {
                alpha: ctx.alpha,
                since_best: 0,
                gains: RunningVariance::default(),
            },
        }
    }

    fn improved(&mut self) {
        match self {
            Stopper::Simple { since_best, .. } => *since_best = 0,
            Stopper::Adaptive { since_best, gains, .. } => {
                *since_best = 0;
                *gains = RunningVariance::default();
            }
        }
    }

    fn should_stop(&mut self, gain: EdgeWeight) -> bool {
        match self {
            Stopper::Simple { limit, since_best } => {
                *since_best += 1;
                *since_best >= *limit
            }
            Stopper::Adaptive { alpha, since_best, gains } => {
                *since_best += 1;
                gains.update(gain as f64);
                let (mean, variance) = gains.get();
                *since_best > 1 && (*since_best as f64) * mean * mean > *alpha * variance + 1.0
            }
        }
    }
}
