//! The multilevel driver: coarsen, partition the coarsest graph, then
//! project and refine level by level back to the input graph.

use crate::cluster;
use crate::contract;
use crate::defs::*;
use crate::gaincache::GainCache;
use crate::graph::Graph;
use crate::initpart::PoolBipartitioner;
use crate::options::{
    ClusteringAlgorithm, Context, InitialPartitioningMode, PartitionContext, PartitioningMode,
};
use crate::partition::PartitionedGraph;
use crate::refine;
use crate::Result;

/// The outcome of [`partition`]: the block of every node plus the metrics
/// the caller usually wants. `feasible` is false when the balancer could
/// not hold the block-weight caps; the partition is still the best one
/// found.
#[derive(Debug, Clone)]
pub struct Partitioning {
    pub partition: Vec<BlockId>,
    pub cut: EdgeWeight,
    pub imbalance: f64,
    pub feasible: bool,
}

/// Partitions `graph` into `ctx.partition.k` blocks under the imbalance
/// bound `ctx.partition.epsilon`.
pub fn partition(graph: &Graph, ctx: &Context) -> Result<Partitioning> {
    let p_ctx = ctx.partition_context(graph)?;

    if graph.n() == 0 {
        return Ok(Partitioning {
            partition: Vec::new(),
            cut: 0,
            imbalance: 0.0,
            feasible: true,
        });
    }

    let partition = match ctx.mode {
        PartitioningMode::Rb => partition_rb(graph, ctx.partition.k, ctx, ctx.seed)?,
        // deep partitioning is a scheduler on top of the same engine;
        // it resolves to the direct k-way path here
        PartitioningMode::Kway | PartitioningMode::Deep => {
            multilevel_engine(graph, &p_ctx, ctx, ctx.seed)?
        }
    };

    let mut block_weights = vec![0 as NodeWeight; p_ctx.k as usize];
    for (u, &b) in partition.iter().enumerate() {
        block_weights[b as usize] += graph.node_weight(u as NodeId);
    }
    let cut = graph.cut(&partition);
    let imbalance = p_ctx.imbalance(&block_weights);
    let feasible = p_ctx.is_feasible(&block_weights);
    log::debug!("final: cut {cut}, imbalance {imbalance:.4}, feasible {feasible}");

    Ok(Partitioning { partition, cut, imbalance, feasible })
}

/// One level of the hierarchy: the coarse graph and the fine-to-coarse
/// node mapping that produced it.
struct Level {
    graph: Graph,
    mapping: Vec<NodeId>,
}

/// Runs the full multilevel cycle for the block targets in `p_ctx` (used
/// with uniform k-way targets, and with proportional 2-way targets by the
/// recursive-bisection mode).
fn multilevel_engine(
    graph: &Graph,
    p_ctx: &PartitionContext,
    ctx: &Context,
    seed: u64,
) -> Result<Vec<BlockId>> {
    let levels = coarsen(graph, p_ctx, ctx, seed);
    let coarsest = levels.last().map_or(graph, |level| &level.graph);
    log::debug!(
        "coarsened {} nodes to {} over {} levels",
        graph.n(),
        coarsest.n(),
        levels.len()
    );

    let mut partition = initial_partition(coarsest, p_ctx, ctx, seed)?;

    let mut idx = levels.len();
    loop {
        let current = if idx > 0 { &levels[idx - 1].graph } else { graph };
        let mut p_graph = PartitionedGraph::new(current, p_ctx.k, partition);
        let mut gain_cache = GainCache::new(
            ctx.refinement.gain_cache_strategy,
            current.n(),
            p_ctx.k,
        )?;
        gain_cache.init(&p_graph);
        refine::refine_level(&mut p_graph, &mut gain_cache, p_ctx, ctx, seed ^ idx as u64)?;
        log::debug!("level {idx}: cut {} after refinement", p_graph.cut());
        partition = p_graph.take_partition();

        if idx == 0 {
            break;
        }
        partition = refine::project_partition(&partition, &levels[idx - 1].mapping);
        idx -= 1;
    }
    Ok(partition)
}

/// Clusters and contracts until the graph is small enough
/// (`n <= k * contraction_limit`) or contraction stops shrinking it.
fn coarsen(graph: &Graph, p_ctx: &PartitionContext, ctx: &Context, seed: u64) -> Vec<Level> {
    let mut levels: Vec<Level> = Vec::new();
    if ctx.coarsening.algorithm == ClusteringAlgorithm::Noop {
        return levels;
    }
    let stop_at = ctx.coarsening.contraction_limit * p_ctx.k as usize;

    loop {
        let current = levels.last().map_or(graph, |level| &level.graph);
        let n = current.n();
        if n <= stop_at {
            break;
        }

        let max_cluster_weight = ctx.coarsening.max_cluster_weight(
            n,
            current.total_node_weight(),
            p_ctx.k,
            p_ctx.epsilon,
        );
        let clustering = cluster::compute_clustering(
            current,
            max_cluster_weight,
            &ctx.coarsening.lp,
            seed.wrapping_add(levels.len() as u64),
        );
        let contracted = match contract::contract_clustering(current, &clustering) {
            Ok(contracted) => contracted,
            Err(e) => {
                log::debug!("contraction failed, stopping coarsening: {e}");
                break;
            }
        };
        if contracted.graph.n() == n {
            break;
        }
        log::debug!(
            "level {}: contracted {} nodes to {}",
            levels.len(),
            n,
            contracted.graph.n()
        );
        levels.push(Level { graph: contracted.graph, mapping: contracted.mapping });
    }
    levels
}

/// Initial partition of the coarsest graph: the bipartitioner pool for
/// k = 2, otherwise flat recursive bisection that invokes the pool on
/// extracted block-induced subgraphs.
fn initial_partition(
    graph: &Graph,
    p_ctx: &PartitionContext,
    ctx: &Context,
    seed: u64,
) -> Result<Vec<BlockId>> {
    if p_ctx.k == 2 {
        let (partition, _) = PoolBipartitioner::new(
            graph,
            p_ctx,
            &ctx.initial_partitioning,
            seed,
        )
        .bipartition();
        return Ok(partition);
    }
    let parallel = ctx.initial_partitioning.mode != InitialPartitioningMode::Sequential;
    bisect_recursively(graph, p_ctx.k, p_ctx.epsilon, seed, parallel, |graph, p2, seed| {
        let (partition, _) = PoolBipartitioner::new(
            graph,
            p2,
            &ctx.initial_partitioning,
            seed,
        )
        .bipartition();
        Ok(partition)
    })
}

/// Top-level recursive bisection: every split runs the full multilevel
/// engine with 2-way proportional targets.
fn partition_rb(graph: &Graph, k: BlockId, ctx: &Context, seed: u64) -> Result<Vec<BlockId>> {
    let parallel = ctx.initial_partitioning.mode != InitialPartitioningMode::Sequential;
    bisect_recursively(graph, k, ctx.partition.epsilon, seed, parallel, |graph, p2, seed| {
        multilevel_engine(graph, p2, ctx, seed)
    })
}

/// Splits `graph` into `k` blocks by repeated bisection. `bisect` produces
/// a 2-way partition for the proportional targets it is handed; the halves
/// are extracted as induced subgraphs and partitioned recursively into
/// `ceil(k/2)` and `floor(k/2)` blocks, in parallel when the initial
/// partitioning mode asks for it (the halves are disjoint).
fn bisect_recursively<F>(
    graph: &Graph,
    k: BlockId,
    epsilon: f64,
    seed: u64,
    parallel: bool,
    bisect: F,
) -> Result<Vec<BlockId>>
where
    F: Fn(&Graph, &PartitionContext, u64) -> Result<Vec<BlockId>> + Copy + Send + Sync,
{
    if k <= 1 || graph.n() == 0 {
        return Ok(vec![0; graph.n()]);
    }

    let k0 = k.div_ceil(2);
    let k1 = k - k0;
    let p2 = PartitionContext::new_bisection(k0, k1, epsilon, graph.total_node_weight());
    let bisection = bisect(graph, &p2, seed)?;

    if k == 2 {
        return Ok(bisection);
    }

    let [(sub0, orig0), (sub1, orig1)] = extract_bisection_subgraphs(graph, &bisection)?;
    let (part0, part1) = if parallel {
        rayon::join(
            || bisect_recursively(&sub0, k0, epsilon, seed.wrapping_add(1), parallel, bisect),
            || bisect_recursively(&sub1, k1, epsilon, seed.wrapping_add(2), parallel, bisect),
        )
    } else {
        (
            bisect_recursively(&sub0, k0, epsilon, seed.wrapping_add(1), parallel, bisect),
            bisect_recursively(&sub1, k1, epsilon, seed.wrapping_add(2), parallel, bisect),
        )
    };
    let (part0, part1) = (part0?, part1?);

    let mut merged = vec![0 as BlockId; graph.n()];
    for (local, &orig) in orig0.iter().enumerate() {
        merged[orig as usize] = part0[local];
    }
    for (local, &orig) in orig1.iter().enumerate() {
        merged[orig as usize] = k0 + part1[local];
    }
    Ok(merged)
}

/// Extracts the two block-induced subgraphs of a bisection, dropping cut
/// edges. Returns each subgraph with its local-to-original node mapping.
fn extract_bisection_subgraphs(
    graph: &Graph,
    bisection: &[BlockId],
) -> Result<[(Graph, Vec<NodeId>); 2]> {
    let mut local = vec![0 as NodeId; graph.n()];
    let mut orig: [Vec<NodeId>; 2] = [Vec::new(), Vec::new()];
    for u in graph.nodes() {
        let side = bisection[u as usize] as usize;
        local[u as usize] = orig[side].len() as NodeId;
        orig[side].push(u);
    }

    let build = |side: usize, nodes: &[NodeId]| -> Result<Graph> {
        let mut xadj = Vec::with_capacity(nodes.len() + 1);
        xadj.push(0 as EdgeId);
        let mut adj = Vec::new();
        let mut edge_weights = Vec::new();
        let mut node_weights = Vec::with_capacity(nodes.len());

        for &u in nodes {
            node_weights.push(graph.node_weight(u));
            for (v, w) in graph.neighbors_weighted(u) {
                if bisection[v as usize] as usize == side {
                    adj.push(local[v as usize]);
                    edge_weights.push(w);
                }
            }
            xadj.push(adj.len() as EdgeId);
        }
        Graph::new(xadj, adj, node_weights, edge_weights)
    };

    let sub0 = build(0, &orig[0])?;
    let sub1 = build(1, &orig[1])?;
    let [orig0, orig1] = orig;
    Ok([(sub0, orig0), (sub1, orig1)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_keeps_weights_and_drops_cut_edges() {
        let g = Graph::from_edges(
            5,
            &[(0, 1, 2), (1, 2, 3), (2, 3, 4), (3, 4, 5)],
            vec![1, 2, 3, 4, 5],
        )
        .unwrap();
        let bisection = vec![0, 0, 1, 1, 1];
        let [(sub0, orig0), (sub1, orig1)] = extract_bisection_subgraphs(&g, &bisection).unwrap();

        assert_eq!(sub0.n(), 2);
        assert_eq!(orig0, vec![0, 1]);
        assert_eq!(sub0.total_node_weight(), 3);
        assert_eq!(sub0.m(), 2); // only edge 0-1 survives

        assert_eq!(sub1.n(), 3);
        assert_eq!(orig1, vec![2, 3, 4]);
        assert_eq!(sub1.total_node_weight(), 12);
        sub1.validate_undirected().unwrap();
    }

    #[test]
    fn coarsening_conserves_weight_across_levels() {
        let mut rng = fastrand::Rng::with_seed(21);
        let mut edges = Vec::new();
        for v in 1..200u32 {
            edges.push((rng.u32(0..v), v, 1));
            if v > 2 {
                let u = rng.u32(0..v - 1);
                edges.push((u, v, 1));
            }
        }
        edges.sort();
        edges.dedup_by_key(|e| (e.0, e.1));
        let g = Graph::from_edges(200, &edges, vec![]).unwrap();

        let mut ctx = Context::default();
        ctx.coarsening.contraction_limit = 10;
        let p_ctx = PartitionContext::new_uniform(2, 0.03, g.total_node_weight());
        let levels = coarsen(&g, &p_ctx, &ctx, 1);

        let mut previous = g.total_node_weight();
        for level in &levels {
            assert_eq!(level.graph.total_node_weight(), previous);
            previous = level.graph.total_node_weight();
        }
    }
}
