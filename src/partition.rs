//! Mutable partition state: the shared block assignment with cached block
//! weights, and the thread-local delta overlay used for speculative moves.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::defs::*;
use crate::graph::Graph;

/// A graph together with a mutable assignment of nodes to `k` blocks and
/// the cached weight of every block.
///
/// The assignment and the block weights are atomics so concurrent
/// refinement threads can commit moves without locks; all accesses are
/// relaxed since no cross-variable ordering is required within a phase.
pub struct PartitionedGraph<'g> {
    graph: &'g Graph,
    k: BlockId,
    partition: Vec<AtomicU32>,
    block_weights: Vec<AtomicI64>,
}

impl<'g> PartitionedGraph<'g> {
    /// Wraps `partition` around `graph`, computing block weights.
    pub fn new(graph: &'g Graph, k: BlockId, partition: Vec<BlockId>) -> Self {
        debug_assert_eq!(partition.len(), graph.n());
        debug_assert!(partition.iter().all(|&b| b < k));

        let block_weights = partition
            .par_iter()
            .enumerate()
            .fold(
                || vec![0 as NodeWeight; k as usize],
                |mut acc, (u, &b)| {
                    acc[b as usize] += graph.node_weight(u as NodeId);
                    acc
                },
            )
            .reduce(
                || vec![0 as NodeWeight; k as usize],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            );

        Self {
            graph,
            k,
            partition: partition.into_iter().map(AtomicU32::new).collect(),
            block_weights: block_weights.into_iter().map(AtomicI64::new).collect(),
        }
    }

    #[inline]
    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    #[inline]
    pub fn k(&self) -> BlockId {
        self.k
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.partition.len()
    }

    #[inline]
    pub fn block(&self, v: NodeId) -> BlockId {
        self.partition[v as usize].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn block_weight(&self, b: BlockId) -> NodeWeight {
        self.block_weights[b as usize].load(Ordering::Relaxed)
    }

    pub fn block_weights(&self) -> Vec<NodeWeight> {
        self.block_weights
            .iter()
            .map(|w| w.load(Ordering::Relaxed))
            .collect()
    }

    /// Moves `v` from `from` to `to`, updating both block weights.
    pub fn move_node(&self, v: NodeId, from: BlockId, to: BlockId) {
        debug_assert_eq!(self.block(v), from);
        debug_assert_ne!(from, to);
        let w = self.graph.node_weight(v);
        self.partition[v as usize].store(to, Ordering::Relaxed);
        self.block_weights[from as usize].fetch_sub(w, Ordering::Relaxed);
        self.block_weights[to as usize].fetch_add(w, Ordering::Relaxed);
    }

    /// Moves `v` to `to` only if the resulting weight of `to` stays within
    /// `max_weight`. Returns false and leaves everything untouched on
    /// failure. The weight reservation is a compare-exchange loop so two
    /// racing movers cannot overshoot the cap together.
    pub fn try_move_node(&self, v: NodeId, from: BlockId, to: BlockId, max_weight: NodeWeight) -> bool {
        let w = self.graph.node_weight(v);
        let target = &self.block_weights[to as usize];
        let mut current = target.load(Ordering::Relaxed);
        loop {
            if current + w > max_weight {
                return false;
            }
            match target.compare_exchange_weak(
                current,
                current + w,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        self.partition[v as usize].store(to, Ordering::Relaxed);
        self.block_weights[from as usize].fetch_sub(w, Ordering::Relaxed);
        true
    }

    /// Edge cut of the current assignment, counting each undirected edge
    /// once.
    pub fn cut(&self) -> EdgeWeight {
        self.graph
            .nodes()
            .into_par_iter()
            .map(|u| {
                let bu = self.block(u);
                self.graph
                    .neighbors_weighted(u)
                    .filter(|&(v, _)| v > u && self.block(v) != bu)
                    .map(|(_, w)| w)
                    .sum::<EdgeWeight>()
            })
            .sum()
    }

    pub fn copy_partition(&self) -> Vec<BlockId> {
        self.partition
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }

    /// Overwrites the assignment wholesale and recomputes block weights.
    pub fn set_partition(&mut self, partition: &[BlockId]) {
        debug_assert_eq!(partition.len(), self.n());
        for (slot, &b) in self.partition.iter_mut().zip(partition) {
            *slot.get_mut() = b;
        }
        let mut weights = vec![0 as NodeWeight; self.k as usize];
        for (u, &b) in partition.iter().enumerate() {
            weights[b as usize] += self.graph.node_weight(u as NodeId);
        }
        for (slot, w) in self.block_weights.iter_mut().zip(weights) {
            *slot.get_mut() = w;
        }
    }

    pub fn take_partition(self) -> Vec<BlockId> {
        self.partition
            .into_iter()
            .map(AtomicU32::into_inner)
            .collect()
    }
}

/// Read-through overlay on a [`PartitionedGraph`] that records tentative
/// moves in sparse maps without touching the shared state. Refiners score
/// hypothetical move sequences on the overlay and discard it with
/// [`DeltaPartition::clear`].
pub struct DeltaPartition<'p, 'g> {
    base: &'p PartitionedGraph<'g>,
    partition_delta: FxHashMap<NodeId, BlockId>,
    weight_delta: FxHashMap<BlockId, NodeWeight>,
}

impl<'p, 'g> DeltaPartition<'p, 'g> {
    pub fn new(base: &'p PartitionedGraph<'g>) -> Self {
        Self {
            base,
            partition_delta: FxHashMap::default(),
            weight_delta: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn base(&self) -> &'p PartitionedGraph<'g> {
        self.base
    }

    #[inline]
    pub fn block(&self, v: NodeId) -> BlockId {
        self.partition_delta
            .get(&v)
            .copied()
            .unwrap_or_else(|| self.base.block(v))
    }

    #[inline]
    pub fn block_weight(&self, b: BlockId) -> NodeWeight {
        self.base.block_weight(b) + self.weight_delta.get(&b).copied().unwrap_or(0)
    }

    /// Records a tentative move of `v` to `to`.
    pub fn set_block(&mut self, v: NodeId, to: BlockId) {
        let from = self.block(v);
        if from == to {
            return;
        }
        let w = self.base.graph().node_weight(v);
        *self.weight_delta.entry(from).or_insert(0) -= w;
        *self.weight_delta.entry(to).or_insert(0) += w;
        self.partition_delta.insert(v, to);
    }

    pub fn clear(&mut self) {
        self.partition_delta.clear();
        self.weight_delta.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path4() -> Graph {
        Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1), (2, 3, 1)], vec![2, 1, 1, 2]).unwrap()
    }

    #[test]
    fn block_weights_match_assignment() {
        let g = path4();
        let pg = PartitionedGraph::new(&g, 2, vec![0, 0, 1, 1]);
        assert_eq!(pg.block_weight(0), 3);
        assert_eq!(pg.block_weight(1), 3);
        assert_eq!(pg.cut(), 1);
    }

    #[test]
    fn move_updates_weights_and_cut() {
        let g = path4();
        let pg = PartitionedGraph::new(&g, 2, vec![0, 0, 1, 1]);
        pg.move_node(2, 1, 0);
        assert_eq!(pg.block(2), 0);
        assert_eq!(pg.block_weight(0), 4);
        assert_eq!(pg.block_weight(1), 2);
        assert_eq!(pg.cut(), 1);
    }

    #[test]
    fn try_move_respects_cap() {
        let g = path4();
        let pg = PartitionedGraph::new(&g, 2, vec![0, 0, 1, 1]);
        assert!(!pg.try_move_node(2, 1, 0, 3));
        assert_eq!(pg.block(2), 1);
        assert_eq!(pg.block_weight(0), 3);
        assert!(pg.try_move_node(2, 1, 0, 4));
        assert_eq!(pg.block_weight(0), 4);
    }

    #[test]
    fn delta_reads_through_and_discards() {
        let g = path4();
        let pg = PartitionedGraph::new(&g, 2, vec![0, 0, 1, 1]);
        let mut delta = DeltaPartition::new(&pg);

        assert_eq!(delta.block(2), 1);
        delta.set_block(2, 0);
        assert_eq!(delta.block(2), 0);
        assert_eq!(delta.block_weight(0), 4);
        assert_eq!(delta.block_weight(1), 2);

        // base untouched
        assert_eq!(pg.block(2), 1);
        assert_eq!(pg.block_weight(0), 3);

        delta.clear();
        assert_eq!(delta.block(2), 1);
        assert_eq!(delta.block_weight(0), 3);
    }

    #[test]
    fn projected_weights_equal_direct_weights() {
        // property: computing weights of a projected partition equals
        // wrapping the projected assignment directly
        let g = path4();
        let coarse_partition = [0 as BlockId, 1];
        let mapping = [0 as NodeId, 0, 1, 1];
        let projected: Vec<BlockId> = mapping.iter().map(|&c| coarse_partition[c as usize]).collect();
        let pg = PartitionedGraph::new(&g, 2, projected.clone());
        let direct = PartitionedGraph::new(&g, 2, projected);
        assert_eq!(pg.block_weights(), direct.block_weights());
    }
}
