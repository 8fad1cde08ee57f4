//! End-to-end scenarios against the library entry point.

mod common;

use parcut::options::{GainCacheStrategy, PartitioningMode};
use parcut::{partition, BlockId, Context, NodeWeight, Partitioning};

fn run(graph: &parcut::Graph, k: u32, epsilon: f64) -> Partitioning {
    let mut ctx = Context::default();
    ctx.partition.k = k;
    ctx.partition.epsilon = epsilon;
    ctx.seed = 42;
    partition(graph, &ctx).unwrap()
}

fn block_weights(graph: &parcut::Graph, partition: &[BlockId], k: u32) -> Vec<NodeWeight> {
    let mut weights = vec![0; k as usize];
    for u in graph.nodes() {
        weights[partition[u as usize] as usize] += graph.node_weight(u);
    }
    weights
}

#[test]
fn path_p4() {
    let g = common::path(4);
    let result = run(&g, 2, 0.03);
    assert_eq!(result.cut, 1);
    assert!(result.feasible);
    assert_eq!(g.cut(&result.partition), 1);
}

#[test]
fn cycle_c6() {
    let g = common::cycle(6);
    let result = run(&g, 2, 0.0);
    assert_eq!(result.cut, 2);
    assert!(result.feasible);
    assert_eq!(block_weights(&g, &result.partition, 2), vec![3, 3]);
}

#[test]
fn complete_bipartite_k33() {
    // with the balance caps this tight, local search cannot repair a mixed
    // split, so quality rests on the initial portfolio; take the best over
    // a few seeds with a generous repetition budget
    let g = common::complete_bipartite(3, 3);
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.1;
    ctx.initial_partitioning.num_repetitions = 50;

    let mut best: Option<Partitioning> = None;
    for seed in [1, 7, 13, 42] {
        ctx.seed = seed;
        let result = partition(&g, &ctx).unwrap();
        if best.as_ref().map_or(true, |b| result.cut < b.cut) {
            best = Some(result);
        }
    }
    let best = best.unwrap();

    assert_eq!(best.cut, 0);
    assert!(best.feasible);
    // the blocks must be exactly the two sides
    assert_eq!(best.partition[0], best.partition[1]);
    assert_eq!(best.partition[1], best.partition[2]);
    assert_eq!(best.partition[3], best.partition[4]);
    assert_eq!(best.partition[4], best.partition[5]);
    assert_ne!(best.partition[0], best.partition[3]);
}

#[test]
fn two_triangles_with_a_bridge() {
    let g = common::two_triangles_with_bridge();
    let result = run(&g, 2, 0.01);
    assert_eq!(result.cut, 1);
    assert!(result.feasible);
    assert_eq!(block_weights(&g, &result.partition, 2), vec![3, 3]);
    // the unique minimum cut separates the triangles
    assert_ne!(result.partition[2], result.partition[3]);
}

#[test]
fn grid_4x4_into_4_blocks() {
    let g = common::grid(4, 4);
    let mut ctx = Context::default();
    ctx.partition.k = 4;
    ctx.partition.epsilon = 0.03;
    ctx.initial_partitioning.num_repetitions = 50;

    let mut best: Option<Partitioning> = None;
    for seed in [1, 7, 42] {
        ctx.seed = seed;
        let result = partition(&g, &ctx).unwrap();
        if best.as_ref().map_or(true, |b| (!result.feasible, result.cut) < (!b.feasible, b.cut)) {
            best = Some(result);
        }
    }
    let best = best.unwrap();

    assert!(best.feasible, "imbalance {}", best.imbalance);
    // quadrants achieve 8; the heuristic must stay within the asserted bound
    assert!(best.cut <= 10, "cut {}", best.cut);
    assert_eq!(block_weights(&g, &best.partition, 4), vec![4, 4, 4, 4]);
}

#[test]
fn star_k1_10() {
    let g = common::star(10);
    let result = run(&g, 2, 0.2);
    assert!(result.feasible);
    // hub plus five leaves on one side cuts 5; a fuller hub block cuts less
    assert!(result.cut <= 5, "cut {}", result.cut);
    assert!(result.cut >= 4);
}

#[test]
fn path_p6_into_3_blocks() {
    let g = common::path(6);
    let result = run(&g, 3, 0.1);
    assert!(result.feasible);
    // three blocks of two consecutive nodes each
    assert_eq!(result.cut, 2);
}

#[test]
fn empty_graph_yields_empty_partition() {
    let g = parcut::Graph::new(vec![0], vec![], vec![], vec![]).unwrap();
    let result = run(&g, 2, 0.03);
    assert!(result.partition.is_empty());
    assert_eq!(result.cut, 0);
    assert!(result.feasible);
}

#[test]
fn single_node_graph() {
    let g = common::from_edges(1, &[]);
    let result = run(&g, 2, 0.03);
    assert_eq!(result.partition, vec![0]);
    assert_eq!(result.cut, 0);
}

#[test]
fn disconnected_graph_is_partitioned() {
    // three disjoint paths
    let g = common::from_edges(9, &[(0, 1), (1, 2), (3, 4), (4, 5), (6, 7), (7, 8)]);
    let result = run(&g, 3, 0.1);
    assert_eq!(result.partition.len(), 9);
    assert!(result.partition.iter().all(|&b| b < 3));
    assert!(result.feasible);
    assert_eq!(result.cut, 0, "disjoint components need no cut edges");
}

#[test]
fn identical_node_weights_behave_like_unweighted() {
    let edges = [(0, 1), (1, 2), (2, 3)];
    let unweighted = common::from_edges(4, &edges);
    let weighted = common::with_node_weights(4, &edges, vec![2, 2, 2, 2]);
    let a = run(&unweighted, 2, 0.03);
    let b = run(&weighted, 2, 0.03);
    assert_eq!(a.cut, b.cut);
    assert!(b.feasible);
}

#[test]
fn every_block_id_is_in_range() {
    let g = common::grid(5, 5);
    for k in [2, 3, 4, 5] {
        let result = run(&g, k, 0.1);
        assert!(result.partition.iter().all(|&b| b < k));
        assert_eq!(result.partition.len(), 25);
    }
}

#[test]
fn recursive_bisection_mode() {
    let g = common::two_triangles_with_bridge();
    let mut ctx = Context::default();
    ctx.mode = PartitioningMode::Rb;
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.01;
    ctx.seed = 7;
    let result = partition(&g, &ctx).unwrap();
    assert_eq!(result.cut, 1);
    assert!(result.feasible);
}

#[test]
fn on_the_fly_gain_cache_mode() {
    let g = common::two_triangles_with_bridge();
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = 0.01;
    ctx.refinement.gain_cache_strategy = GainCacheStrategy::OnTheFly;
    ctx.seed = 3;
    let result = partition(&g, &ctx).unwrap();
    assert_eq!(result.cut, 1);
    assert!(result.feasible);
}

#[test]
fn rejects_too_few_blocks() {
    let g = common::path(4);
    let mut ctx = Context::default();
    ctx.partition.k = 1;
    assert!(partition(&g, &ctx).is_err());
}

#[test]
fn rejects_non_positive_epsilon() {
    let g = common::path(4);
    let mut ctx = Context::default();
    ctx.partition.k = 2;
    ctx.partition.epsilon = -0.5;
    assert!(partition(&g, &ctx).is_err());
}

#[test]
fn coarsening_path_is_exercised_on_larger_input() {
    // big enough to force actual coarsening levels
    let g = common::grid(20, 20);
    let mut ctx = Context::default();
    ctx.partition.k = 4;
    ctx.partition.epsilon = 0.05;
    ctx.coarsening.contraction_limit = 20;
    ctx.seed = 9;
    let result = partition(&g, &ctx).unwrap();
    assert!(result.feasible, "imbalance {}", result.imbalance);
    // the 4-way cut of a 20x20 grid should be far below the trivial bound
    assert!(result.cut <= 80, "cut {}", result.cut);
    assert_eq!(g.cut(&result.partition), result.cut);
}

#[test]
fn metis_format_end_to_end() {
    let text = "% two triangles with a bridge\n6 7\n2 3\n1 3\n1 2 4\n3 5 6\n4 6\n4 5\n";
    let g = parcut::graphio::read_graph_from(std::io::Cursor::new(text)).unwrap();
    let result = run(&g, 2, 0.01);
    assert_eq!(result.cut, 1);
}
