//! Sequential 2-way FM refinement, used to polish every candidate the
//! initial bipartitioner pool produces.

use crate::defs::*;
use crate::graph::Graph;
use crate::options::PartitionContext;
use crate::pqueue::IndexedPriorityQueue;

/// Boundary-driven 2-way FM. Runs up to `num_iterations` passes; each pass
/// performs a sequence of highest-gain moves and rolls back to the prefix
/// with the best cut that does not drift too far off the target weights.
/// Returns the final cut.
pub fn refine_2way(
    graph: &Graph,
    p_ctx: &PartitionContext,
    partition: &mut [BlockId],
    num_iterations: usize,
    rng: &mut fastrand::Rng,
) -> EdgeWeight {
    debug_assert_eq!(p_ctx.k, 2);
    debug_assert_eq!(partition.len(), graph.n());
    let n = graph.n();
    if n < 2 {
        return 0;
    }

    let targets = [p_ctx.perfect_block_weight(0), p_ctx.perfect_block_weight(1)];
    let mut pwgts = [0 as NodeWeight; 2];
    for u in graph.nodes() {
        pwgts[partition[u as usize] as usize] += graph.node_weight(u);
    }

    // internal/external degrees and the boundary
    let mut internal = vec![0 as EdgeWeight; n];
    let mut external = vec![0 as EdgeWeight; n];
    let mut cut = 0;
    for u in graph.nodes() {
        for (v, w) in graph.neighbors_weighted(u) {
            if partition[u as usize] == partition[v as usize] {
                internal[u as usize] += w;
            } else {
                external[u as usize] += w;
            }
        }
        cut += external[u as usize];
    }
    let mut cut = cut / 2;

    let limit = ((0.01 * n as f64) as usize).clamp(15, 100);
    let total = pwgts[0] + pwgts[1];
    let slack = (total / 20).min(2 * total / n as NodeWeight);
    let orig_diff = (targets[0] - pwgts[0]).abs();

    let mut queues = [
        IndexedPriorityQueue::new(n),
        IndexedPriorityQueue::new(n),
    ];
    let mut moved: Vec<isize> = vec![-1; n];
    let mut swaps: Vec<NodeId> = Vec::with_capacity(n);
    let mut boundary: Vec<NodeId> = Vec::new();

    for _pass in 0..num_iterations {
        queues[0].reset();
        queues[1].reset();
        swaps.clear();

        boundary.clear();
        boundary.extend(
            graph
                .nodes()
                .filter(|&u| external[u as usize] > 0 || graph.degree(u) == 0),
        );
        rng.shuffle(&mut boundary);
        for &u in &boundary {
            queues[partition[u as usize] as usize]
                .insert(u, external[u as usize] - internal[u as usize]);
        }

        let init_cut = cut;
        let mut newcut = cut;
        let mut mincut = cut;
        let mut mincut_order: isize = -1;
        let mut mindiff = (targets[0] - pwgts[0]).abs();

        loop {
            // move from the side carrying more weight relative to target
            let from = usize::from(targets[0] - pwgts[0] >= targets[1] - pwgts[1]);
            let to = 1 - from;
            let Some(node) = queues[from].pop() else {
                break;
            };

            newcut -= external[node as usize] - internal[node as usize];
            let w = graph.node_weight(node);
            pwgts[from] -= w;
            pwgts[to] += w;

            if (newcut < mincut && (targets[0] - pwgts[0]).abs() <= orig_diff + slack)
                || (newcut == mincut && (targets[0] - pwgts[0]).abs() < mindiff)
            {
                mincut = newcut;
                mindiff = (targets[0] - pwgts[0]).abs();
                mincut_order = swaps.len() as isize;
            } else if swaps.len() as isize - mincut_order > limit as isize {
                // hit the non-improving limit; undo this move and stop
                pwgts[from] += w;
                pwgts[to] -= w;
                break;
            }

            partition[node as usize] = to as BlockId;
            moved[node as usize] = swaps.len() as isize;
            swaps.push(node);
            log::trace!("2-way fm: moved {node} to {to}, cut {newcut}");

            std::mem::swap(&mut internal[node as usize], &mut external[node as usize]);
            for (v, w) in graph.neighbors_weighted(node) {
                let delta = if partition[v as usize] as usize == to { w } else { -w };
                internal[v as usize] += delta;
                external[v as usize] -= delta;
                if moved[v as usize] == -1 {
                    let side = partition[v as usize] as usize;
                    let gain = external[v as usize] - internal[v as usize];
                    if queues[side].contains(v) {
                        if external[v as usize] == 0 {
                            queues[side].delete(v);
                        } else {
                            queues[side].update(v, gain);
                        }
                    } else if external[v as usize] > 0 {
                        queues[side].insert(v, gain);
                    }
                }
            }
        }

        for &u in &swaps {
            moved[u as usize] = -1;
        }

        // roll back to the best prefix
        for i in ((mincut_order + 1) as usize..swaps.len()).rev() {
            let node = swaps[i];
            let from = partition[node as usize] as usize;
            let to = 1 - from;
            partition[node as usize] = to as BlockId;
            std::mem::swap(&mut internal[node as usize], &mut external[node as usize]);
            let w = graph.node_weight(node);
            pwgts[from] -= w;
            pwgts[to] += w;
            for (v, wv) in graph.neighbors_weighted(node) {
                let delta = if partition[v as usize] as usize == to { wv } else { -wv };
                internal[v as usize] += delta;
                external[v as usize] -= delta;
            }
        }

        cut = mincut;
        debug_assert_eq!(cut, graph.cut(partition), "2-way fm cut accounting drifted");
        if mincut == init_cut {
            break;
        }
    }

    cut
}
