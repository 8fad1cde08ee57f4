//! Immutable compressed-sparse-row graph.

use rayon::prelude::*;

use crate::defs::*;
use crate::{Error, Result};

/// An undirected graph in CSR form. Each undirected edge appears once in
/// each endpoint's adjacency range. Empty weight arrays stand for unit
/// weights, so unweighted graphs carry no per-node or per-edge storage.
///
/// Immutable after construction.
#[derive(Debug)]
pub struct Graph {
    xadj: Box<[EdgeId]>,
    adj: Box<[NodeId]>,
    node_weights: Box<[NodeWeight]>,
    edge_weights: Box<[EdgeWeight]>,
    total_node_weight: NodeWeight,
}

impl Graph {
    /// Builds a graph from raw CSR arrays, checking the CSR invariants:
    /// `xadj[0] = 0`, monotone offsets, `xadj[n] = adj.len()`, neighbor ids
    /// in range, and weight arrays either empty or of matching length.
    pub fn new(
        xadj: Vec<EdgeId>,
        adj: Vec<NodeId>,
        node_weights: Vec<NodeWeight>,
        edge_weights: Vec<EdgeWeight>,
    ) -> Result<Self> {
        if xadj.is_empty() {
            return Err(Error::InvalidInput("offset array must have n+1 entries".into()));
        }
        if xadj[0] != 0 {
            return Err(Error::InvalidInput("offset array must start at 0".into()));
        }
        if xadj.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidInput("offset array must be non-decreasing".into()));
        }
        let n = xadj.len() - 1;
        let m = adj.len();
        if xadj[n] as usize != m {
            return Err(Error::InvalidInput(format!(
                "offset array ends at {} but there are {m} edge slots",
                xadj[n]
            )));
        }
        if adj.iter().any(|&v| v as usize >= n) {
            return Err(Error::InvalidInput("neighbor id out of range".into()));
        }
        if !node_weights.is_empty() && node_weights.len() != n {
            return Err(Error::InvalidInput("node weight array length mismatch".into()));
        }
        if !edge_weights.is_empty() && edge_weights.len() != m {
            return Err(Error::InvalidInput("edge weight array length mismatch".into()));
        }
        if node_weights.iter().any(|&w| w < 0) || edge_weights.iter().any(|&w| w < 0) {
            return Err(Error::InvalidInput("weights must be non-negative".into()));
        }

        let total_node_weight = if node_weights.is_empty() {
            n as NodeWeight
        } else {
            node_weights.iter().sum()
        };

        Ok(Self {
            xadj: xadj.into_boxed_slice(),
            adj: adj.into_boxed_slice(),
            node_weights: node_weights.into_boxed_slice(),
            edge_weights: edge_weights.into_boxed_slice(),
            total_node_weight,
        })
    }

    /// Builds a graph from an undirected edge list. Each `(u, v, w)` entry
    /// is inserted into both endpoints' adjacency. Intended for tests and
    /// small inputs; `read_graph` is the production path.
    pub fn from_edges(
        n: usize,
        edges: &[(NodeId, NodeId, EdgeWeight)],
        node_weights: Vec<NodeWeight>,
    ) -> Result<Self> {
        let mut degree = vec![0 as EdgeId; n + 1];
        for &(u, v, _) in edges {
            if u as usize >= n || v as usize >= n || u == v {
                return Err(Error::InvalidInput(format!("bad edge ({u}, {v})")));
            }
            degree[u as usize + 1] += 1;
            degree[v as usize + 1] += 1;
        }
        for i in 1..=n {
            degree[i] += degree[i - 1];
        }
        let xadj = degree.clone();
        let m = xadj[n] as usize;
        let mut adj = vec![0 as NodeId; m];
        let mut ew = vec![0 as EdgeWeight; m];
        let mut pos = xadj.clone();
        for &(u, v, w) in edges {
            adj[pos[u as usize] as usize] = v;
            ew[pos[u as usize] as usize] = w;
            pos[u as usize] += 1;
            adj[pos[v as usize] as usize] = u;
            ew[pos[v as usize] as usize] = w;
            pos[v as usize] += 1;
        }
        let unit = ew.iter().all(|&w| w == 1);
        Self::new(xadj, adj, node_weights, if unit { Vec::new() } else { ew })
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.xadj.len() - 1
    }

    #[inline]
    pub fn m(&self) -> usize {
        self.adj.len()
    }

    #[inline]
    pub fn nodes(&self) -> std::ops::Range<NodeId> {
        0..self.n() as NodeId
    }

    #[inline]
    pub fn degree(&self, u: NodeId) -> usize {
        (self.xadj[u as usize + 1] - self.xadj[u as usize]) as usize
    }

    /// Edge-id range of `u`'s adjacency.
    #[inline]
    pub fn edges_of(&self, u: NodeId) -> std::ops::Range<usize> {
        self.xadj[u as usize] as usize..self.xadj[u as usize + 1] as usize
    }

    #[inline]
    pub fn edge_target(&self, e: usize) -> NodeId {
        self.adj[e]
    }

    #[inline]
    pub fn node_weight(&self, u: NodeId) -> NodeWeight {
        if self.node_weights.is_empty() {
            1
        } else {
            self.node_weights[u as usize]
        }
    }

    #[inline]
    pub fn edge_weight(&self, e: usize) -> EdgeWeight {
        if self.edge_weights.is_empty() {
            1
        } else {
            self.edge_weights[e]
        }
    }

    #[inline]
    pub fn total_node_weight(&self) -> NodeWeight {
        self.total_node_weight
    }

    pub fn total_edge_weight(&self) -> EdgeWeight {
        if self.edge_weights.is_empty() {
            self.m() as EdgeWeight
        } else {
            self.edge_weights.iter().sum()
        }
    }

    #[inline]
    pub fn neighbors(&self, u: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adj[self.edges_of(u)].iter().copied()
    }

    /// Iterates `(neighbor, edge weight)` pairs of `u`.
    #[inline]
    pub fn neighbors_weighted(&self, u: NodeId) -> impl Iterator<Item = (NodeId, EdgeWeight)> + '_ {
        self.edges_of(u).map(move |e| (self.adj[e], self.edge_weight(e)))
    }

    /// True if the weight arrays report unit weights only.
    pub fn is_unit_weighted(&self) -> bool {
        self.node_weights.is_empty() && self.edge_weights.is_empty()
    }

    /// Verifies that every undirected edge appears in both endpoints'
    /// adjacency with the same weight. O(m log m); used by I/O and tests.
    pub fn validate_undirected(&self) -> Result<()> {
        let mut forward: Vec<(NodeId, NodeId, EdgeWeight)> = Vec::new();
        forward.try_reserve_exact(self.m())?;
        let mut backward: Vec<(NodeId, NodeId, EdgeWeight)> = Vec::new();
        backward.try_reserve_exact(self.m())?;
        for u in self.nodes() {
            for e in self.edges_of(u) {
                let v = self.adj[e];
                if v == u {
                    return Err(Error::InvalidInput(format!("self loop at node {u}")));
                }
                forward.push((u, v, self.edge_weight(e)));
                backward.push((v, u, self.edge_weight(e)));
            }
        }
        forward.par_sort_unstable();
        backward.par_sort_unstable();
        if forward != backward {
            return Err(Error::InvalidInput("adjacency is not symmetric".into()));
        }
        Ok(())
    }

    /// Edge cut of `partition`: the total weight of edges whose endpoints
    /// lie in different blocks. Each undirected edge is counted once.
    pub fn cut(&self, partition: &[BlockId]) -> EdgeWeight {
        debug_assert_eq!(partition.len(), self.n());
        self.nodes()
            .into_par_iter()
            .map(|u| {
                self.neighbors_weighted(u)
                    .filter(|&(v, _)| v > u && partition[u as usize] != partition[v as usize])
                    .map(|(_, w)| w)
                    .sum::<EdgeWeight>()
            })
            .sum()
    }
}
