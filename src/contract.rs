//! Contraction: turns a clustering into the next coarser graph.

use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;

use crate::defs::*;
use crate::graph::Graph;
use crate::ratingmap::RatingMap;
use crate::Result;

/// A contracted graph plus the fine-to-coarse node mapping.
pub struct ContractionResult {
    pub graph: Graph,
    /// `mapping[v]` is the coarse node of fine node `v`.
    pub mapping: Vec<NodeId>,
}

/// Contracts `graph` according to `clustering`. Cluster ids are remapped
/// to the contiguous range `[0, n')`; parallel edges between clusters are
/// aggregated by weight and self-loops dropped.
pub fn contract_clustering(graph: &Graph, clustering: &[NodeId]) -> Result<ContractionResult> {
    debug_assert_eq!(clustering.len(), graph.n());
    let n = graph.n();
    if n == 0 {
        return Ok(ContractionResult {
            graph: Graph::new(vec![0], vec![], vec![], vec![])?,
            mapping: Vec::new(),
        });
    }

    // stable dense relabeling: mark used cluster ids, prefix-sum the marks
    let used: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
    clustering.par_iter().for_each(|&c| {
        used[c as usize].store(1, Ordering::Relaxed);
    });
    let mut remap = Vec::new();
    remap.try_reserve_exact(n)?;
    let mut next = 0 as NodeId;
    for flag in &used {
        remap.push(next);
        next += flag.load(Ordering::Relaxed);
    }
    let n_coarse = next as usize;

    let mut mapping = Vec::new();
    mapping.try_reserve_exact(n)?;
    mapping.resize(n, 0 as NodeId);
    mapping
        .par_iter_mut()
        .zip(clustering.par_iter())
        .for_each(|(m, &c)| *m = remap[c as usize]);

    // bucket fine nodes by coarse id: count, prefix-sum, scatter
    let counts: Vec<AtomicU32> = (0..n_coarse).map(|_| AtomicU32::new(0)).collect();
    mapping.par_iter().for_each(|&c| {
        counts[c as usize].fetch_add(1, Ordering::Relaxed);
    });
    let mut bucket_start = Vec::with_capacity(n_coarse + 1);
    let mut sum = 0u32;
    for count in &counts {
        bucket_start.push(sum);
        sum += count.load(Ordering::Relaxed);
    }
    bucket_start.push(sum);

    let positions: Vec<AtomicU32> = bucket_start[..n_coarse]
        .iter()
        .map(|&s| AtomicU32::new(s))
        .collect();
    let buckets: Vec<AtomicU32> = (0..n).map(|_| AtomicU32::new(0)).collect();
    (0..n as NodeId).into_par_iter().for_each(|v| {
        let slot = positions[mapping[v as usize] as usize].fetch_add(1, Ordering::Relaxed);
        buckets[slot as usize].store(v, Ordering::Relaxed);
    });
    let buckets: Vec<NodeId> = buckets.into_iter().map(AtomicU32::into_inner).collect();

    // per coarse node: aggregate incident fine edges into a rating map,
    // the sorted entries become its adjacency row
    let mut node_weights = Vec::new();
    node_weights.try_reserve_exact(n_coarse)?;
    node_weights.resize(n_coarse, 0 as NodeWeight);

    let mut rows: Vec<Vec<(NodeId, EdgeWeight)>> = Vec::new();
    rows.try_reserve_exact(n_coarse)?;
    rows.resize_with(n_coarse, Vec::new);

    rows.par_iter_mut()
        .zip(node_weights.par_iter_mut())
        .enumerate()
        .for_each_init(
            || RatingMap::new(n_coarse),
            |map, (c, (row, weight))| {
                let members =
                    &buckets[bucket_start[c] as usize..bucket_start[c + 1] as usize];
                for &v in members {
                    *weight += graph.node_weight(v);
                    for (u, w) in graph.neighbors_weighted(v) {
                        let cu = mapping[u as usize];
                        if cu as usize != c {
                            map.add(cu, w);
                        }
                    }
                }
                let mut entries: Vec<(NodeId, EdgeWeight)> = map.entries().collect();
                entries.sort_unstable_by_key(|&(target, _)| target);
                *row = entries;
                map.clear();
            },
        );

    let mut xadj = Vec::new();
    xadj.try_reserve_exact(n_coarse + 1)?;
    xadj.push(0 as EdgeId);
    let mut offset = 0 as EdgeId;
    for row in &rows {
        offset += row.len() as EdgeId;
        xadj.push(offset);
    }
    let m_coarse = offset as usize;

    let mut adj = Vec::new();
    adj.try_reserve_exact(m_coarse)?;
    let mut edge_weights = Vec::new();
    edge_weights.try_reserve_exact(m_coarse)?;
    for row in rows {
        for (target, weight) in row {
            adj.push(target);
            edge_weights.push(weight);
        }
    }

    let coarse = Graph::new(xadj, adj, node_weights, edge_weights)?;
    debug_assert_eq!(coarse.total_node_weight(), graph.total_node_weight());
    Ok(ContractionResult { graph: coarse, mapping })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_clustering_is_a_fixed_point() {
        let g = Graph::from_edges(
            5,
            &[(0, 1, 2), (1, 2, 3), (2, 3, 1), (3, 4, 5), (0, 4, 4)],
            vec![2, 1, 3, 1, 1],
        )
        .unwrap();
        let clustering: Vec<NodeId> = (0..5).collect();
        let result = contract_clustering(&g, &clustering).unwrap();

        assert_eq!(result.graph.n(), 5);
        assert_eq!(result.graph.m(), g.m());
        assert_eq!(result.mapping, clustering);
        for u in g.nodes() {
            assert_eq!(result.graph.node_weight(u), g.node_weight(u));
            let mut a: Vec<_> = g.neighbors_weighted(u).collect();
            let mut b: Vec<_> = result.graph.neighbors_weighted(u).collect();
            a.sort();
            b.sort();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn aggregates_parallel_edges_and_drops_self_loops() {
        // contract a 4-cycle into two opposite pairs: the two cross edges
        // become one coarse edge of weight 2, intra-pair edges vanish
        let g = Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1), (2, 3, 1), (3, 0, 1)], vec![]).unwrap();
        let clustering = vec![0, 0, 2, 2];
        let result = contract_clustering(&g, &clustering).unwrap();

        assert_eq!(result.graph.n(), 2);
        assert_eq!(result.mapping, vec![0, 0, 1, 1]);
        assert_eq!(result.graph.node_weight(0), 2);
        assert_eq!(result.graph.node_weight(1), 2);
        let row: Vec<_> = result.graph.neighbors_weighted(0).collect();
        assert_eq!(row, vec![(1, 2)]);
    }

    #[test]
    fn weight_conservation() {
        let mut rng = fastrand::Rng::with_seed(13);
        let n = 30;
        let mut edges = Vec::new();
        for v in 1..n as NodeId {
            edges.push((rng.u32(0..v), v, rng.i64(1..5)));
        }
        let node_weights: Vec<NodeWeight> = (0..n).map(|_| rng.i64(1..4)).collect();
        let g = Graph::from_edges(n, &edges, node_weights).unwrap();

        let clustering: Vec<NodeId> = (0..n as NodeId).map(|v| v / 3 * 3).collect();
        let result = contract_clustering(&g, &clustering).unwrap();

        assert_eq!(result.graph.total_node_weight(), g.total_node_weight());

        // every cut fine edge contributes its weight to exactly one coarse edge
        let mut expected_cut_weight = 0;
        for u in g.nodes() {
            for (v, w) in g.neighbors_weighted(u) {
                if v > u && clustering[u as usize] != clustering[v as usize] {
                    expected_cut_weight += w;
                }
            }
        }
        assert_eq!(result.graph.total_edge_weight(), 2 * expected_cut_weight);
    }

    #[test]
    fn coarse_graph_is_symmetric() {
        let g = Graph::from_edges(
            6,
            &[(0, 1, 1), (1, 2, 2), (2, 3, 3), (3, 4, 4), (4, 5, 5), (5, 0, 6)],
            vec![],
        )
        .unwrap();
        let clustering = vec![0, 0, 2, 2, 4, 4];
        let result = contract_clustering(&g, &clustering).unwrap();
        assert_eq!(result.graph.n(), 3);
        result.graph.validate_undirected().unwrap();
    }

    #[test]
    fn cluster_ids_are_densely_remapped() {
        let g = Graph::from_edges(4, &[(0, 1, 1), (2, 3, 1)], vec![]).unwrap();
        // cluster ids 1 and 3: sparse, must remap to 0 and 1
        let clustering = vec![1, 1, 3, 3];
        let result = contract_clustering(&g, &clustering).unwrap();
        assert_eq!(result.graph.n(), 2);
        assert_eq!(result.mapping, vec![0, 0, 1, 1]);
    }

    #[test]
    fn empty_graph() {
        let g = Graph::new(vec![0], vec![], vec![], vec![]).unwrap();
        let result = contract_clustering(&g, &[]).unwrap();
        assert_eq!(result.graph.n(), 0);
        assert!(result.mapping.is_empty());
    }
}
