//! Uncoarsening support: partition projection, the label-propagation
//! refiner, and the per-level refinement sequence.

use rayon::prelude::*;

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::balance;
use crate::defs::*;
use crate::gaincache::GainCache;
use crate::kwayfm;
use crate::options::{Context, PartitionContext, RefinementAlgorithm};
use crate::partition::PartitionedGraph;
use crate::{Error, Result};

/// Projects a coarse partition one level finer: each fine node inherits
/// its coarse node's block.
pub fn project_partition(coarse_partition: &[BlockId], mapping: &[NodeId]) -> Vec<BlockId> {
    mapping
        .par_iter()
        .map(|&c| coarse_partition[c as usize])
        .collect()
}

/// Runs the configured refinement sequence on one level. The greedy
/// balancer's `Infeasible` outcome is a soft failure: the driver keeps the
/// best state reached and continues with the next level.
pub fn refine_level(
    p_graph: &mut PartitionedGraph,
    gain_cache: &mut GainCache,
    p_ctx: &PartitionContext,
    ctx: &Context,
    seed: u64,
) -> Result<()> {
    for (i, &algorithm) in ctx.refinement.algorithms.iter().enumerate() {
        match algorithm {
            RefinementAlgorithm::Noop => {}
            RefinementAlgorithm::LabelPropagation => {
                lp_refine(p_graph, gain_cache, p_ctx, ctx.refinement.lp_num_iterations);
            }
            RefinementAlgorithm::KwayFm => {
                kwayfm::refine(
                    p_graph,
                    gain_cache,
                    p_ctx,
                    &ctx.refinement.kway_fm,
                    seed.wrapping_add(i as u64),
                );
            }
            RefinementAlgorithm::GreedyBalancer => {
                if !p_ctx.is_feasible(&p_graph.block_weights()) {
                    if let Err(e) = balance::balance(p_graph, gain_cache, p_ctx) {
                        log::debug!("balancer left the level infeasible: {e}");
                    }
                }
            }
            RefinementAlgorithm::Jet | RefinementAlgorithm::MtKaHyPar => {
                return Err(Error::InvalidInput(format!(
                    "refinement algorithm '{algorithm}' is not available"
                )));
            }
        }
    }
    Ok(())
}

/// Label-propagation refinement: every border node greedily moves to its
/// best block under the weight caps. Rounds run until no node moves or the
/// iteration limit is hit.
pub fn lp_refine(
    p_graph: &PartitionedGraph,
    gain_cache: &GainCache,
    p_ctx: &PartitionContext,
    num_iterations: usize,
) {
    for iteration in 0..num_iterations {
        let moved = AtomicUsize::new(0);
        p_graph.graph().nodes().into_par_iter().for_each(|u| {
            let from = p_graph.block(u);
            if !gain_cache.is_border(p_graph, u, from) {
                return;
            }

            let conn_from = gain_cache.conn(p_graph, u, from);
            let weight = p_graph.graph().node_weight(u);
            let mut best: Option<(BlockId, EdgeWeight, NodeWeight)> = None;
            gain_cache.gains(p_graph, u, from, |to, conn| {
                let to_weight = p_graph.block_weight(to);
                if to_weight + weight > p_ctx.max_block_weight(to) {
                    return;
                }
                let gain = conn - conn_from;
                let better = match best {
                    None => gain > 0,
                    Some((_, best_gain, best_weight)) => {
                        gain > best_gain || (gain == best_gain && to_weight < best_weight)
                    }
                };
                if better {
                    best = Some((to, gain, to_weight));
                }
            });

            if let Some((to, gain, _)) = best {
                if gain > 0 && p_graph.try_move_node(u, from, to, p_ctx.max_block_weight(to)) {
                    gain_cache.move_node(p_graph, u, from, to);
                    moved.fetch_add(1, Ordering::Relaxed);
                }
            }
        });

        let moved = moved.into_inner();
        log::debug!("lp refiner iteration {iteration}: {moved} nodes moved");
        if moved == 0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gaincache::GainCache;
    use crate::graph::Graph;
    use crate::options::GainCacheStrategy;

    #[test]
    fn projection_inherits_coarse_blocks() {
        let coarse = vec![1, 0, 1];
        let mapping = vec![0, 0, 1, 2, 2, 1];
        assert_eq!(project_partition(&coarse, &mapping), vec![1, 1, 0, 1, 1, 0]);
    }

    #[test]
    fn projection_of_empty_graph() {
        assert_eq!(project_partition(&[], &[]), Vec::<BlockId>::new());
    }

    #[test]
    fn lp_refiner_improves_a_perturbed_split() {
        // two cliques, one node parked on the wrong side
        let mut edges = Vec::new();
        for base in [0u32, 4] {
            for i in 0..4 {
                for j in i + 1..4 {
                    edges.push((base + i, base + j, 1));
                }
            }
        }
        edges.push((0, 4, 1));
        let g = Graph::from_edges(8, &edges, vec![]).unwrap();
        let p_ctx = PartitionContext::new_uniform(2, 0.3, 8);

        let p_graph = PartitionedGraph::new(&g, 2, vec![0, 0, 0, 1, 1, 1, 1, 1]);
        let mut cache = GainCache::new(GainCacheStrategy::Dense, 8, 2).unwrap();
        cache.init(&p_graph);

        lp_refine(&p_graph, &cache, &p_ctx, 5);
        assert_eq!(p_graph.block(3), 0);
        assert_eq!(p_graph.cut(), 1);
        assert!(cache.validate(&p_graph));
    }

    #[test]
    fn unavailable_refiners_are_rejected() {
        let g = Graph::from_edges(2, &[(0, 1, 1)], vec![]).unwrap();
        let p_ctx = PartitionContext::new_uniform(2, 0.1, 2);
        let mut p_graph = PartitionedGraph::new(&g, 2, vec![0, 1]);
        let mut cache = GainCache::new(GainCacheStrategy::Dense, 2, 2).unwrap();
        cache.init(&p_graph);

        let mut ctx = Context::default();
        ctx.refinement.algorithms = vec![RefinementAlgorithm::Jet];
        assert!(refine_level(&mut p_graph, &mut cache, &p_ctx, &ctx, 0).is_err());
    }
}
