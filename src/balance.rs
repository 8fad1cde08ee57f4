//! Greedy rebalancer: restores the block-weight caps after a refinement
//! step leaves blocks overweight.

use crate::defs::*;
use crate::gaincache::GainCache;
use crate::options::PartitionContext;
use crate::partition::PartitionedGraph;
use crate::pqueue::IndexedPriorityQueue;
use crate::{Error, Result};

/// Processes overweight blocks one by one in ascending id order (the
/// outcome under several simultaneously overweight blocks therefore
/// depends on block ids). For each one, repeatedly moves the node with
/// the highest relative gain to its best cap-respecting target block,
/// smaller node ids winning ties, until the block fits or no feasible
/// move remains. The gain cache is updated in lock-step.
pub fn balance(
    p_graph: &PartitionedGraph,
    gain_cache: &GainCache,
    p_ctx: &PartitionContext,
) -> Result<()> {
    let mut queue = IndexedPriorityQueue::new(p_graph.n());

    for block in 0..p_graph.k() {
        if p_graph.block_weight(block) <= p_ctx.max_block_weight(block) {
            continue;
        }
        log::debug!(
            "balancer: block {block} at {} over cap {}",
            p_graph.block_weight(block),
            p_ctx.max_block_weight(block)
        );

        // every node of the block is a candidate; border nodes rank first
        // since internal nodes pay their whole weighted degree
        queue.reset();
        for u in p_graph.graph().nodes() {
            if p_graph.block(u) == block {
                if let Some((_, gain)) = best_target(p_graph, gain_cache, p_ctx, u, block) {
                    queue.insert(u, gain);
                }
            }
        }

        while p_graph.block_weight(block) > p_ctx.max_block_weight(block) {
            let Some(mut node) = queue.pop() else {
                return Err(Error::Infeasible);
            };
            let key = match best_target(p_graph, gain_cache, p_ctx, node, block) {
                Some((_, gain)) => gain,
                None => continue, // every target is at its cap now
            };

            // smaller id wins among equal-gain candidates
            while let (Some(top), Some(top_key)) = (queue.peek(), queue.peek_key()) {
                if top_key == key && top < node {
                    queue.pop();
                    queue.insert(node, key);
                    node = top;
                } else {
                    break;
                }
            }

            let Some((target, gain)) = best_target(p_graph, gain_cache, p_ctx, node, block) else {
                continue;
            };
            if !p_graph.try_move_node(node, block, target, p_ctx.max_block_weight(target)) {
                continue;
            }
            gain_cache.move_node(p_graph, node, block, target);
            log::trace!("balancer: moved {node} from {block} to {target}, gain {gain}");

            // neighbors staying in the block may have changed gains
            for v in p_graph.graph().neighbors(node) {
                if queue.contains(v) {
                    match best_target(p_graph, gain_cache, p_ctx, v, block) {
                        Some((_, new_gain)) => queue.update(v, new_gain),
                        None => queue.delete(v),
                    }
                }
            }
        }
    }
    Ok(())
}

/// Best cap-respecting target for moving `node` out of `block`: highest
/// gain, ties to the lighter block, then to the smaller block id.
fn best_target(
    p_graph: &PartitionedGraph,
    gain_cache: &GainCache,
    p_ctx: &PartitionContext,
    node: NodeId,
    block: BlockId,
) -> Option<(BlockId, EdgeWeight)> {
    let weight = p_graph.graph().node_weight(node);
    let conn_from = gain_cache.conn(p_graph, node, block);

    let mut best: Option<(BlockId, EdgeWeight, NodeWeight)> = None;
    for to in 0..p_graph.k() {
        if to == block {
            continue;
        }
        let to_weight = p_graph.block_weight(to);
        if to_weight + weight > p_ctx.max_block_weight(to) {
            continue;
        }
        let gain = gain_cache.conn(p_graph, node, to) - conn_from;
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
