//! Graph builders shared by the integration tests.

use parcut::{EdgeWeight, Graph, NodeId, NodeWeight};

pub fn from_edges(n: usize, edges: &[(NodeId, NodeId)]) -> Graph {
    let weighted: Vec<(NodeId, NodeId, EdgeWeight)> =
        edges.iter().map(|&(u, v)| (u, v, 1)).collect();
    Graph::from_edges(n, &weighted, vec![]).unwrap()
}

pub fn with_node_weights(n: usize, edges: &[(NodeId, NodeId)], weights: Vec<NodeWeight>) -> Graph {
    let weighted: Vec<(NodeId, NodeId, EdgeWeight)> =
        edges.iter().map(|&(u, v)| (u, v, 1)).collect();
    Graph::from_edges(n, &weighted, weights).unwrap()
}

/// Path graph 0-1-...-(n-1).
pub fn path(n: usize) -> Graph {
    let edges: Vec<(NodeId, NodeId)> = (1..n as NodeId).map(|v| (v - 1, v)).collect();
    from_edges(n, &edges)
}

/// Cycle graph on n nodes.
pub fn cycle(n: usize) -> Graph {
    let mut edges: Vec<(NodeId, NodeId)> = (1..n as NodeId).map(|v| (v - 1, v)).collect();
    edges.push((n as NodeId - 1, 0));
    from_edges(n, &edges)
}

/// Complete bipartite graph with sides `0..a` and `a..a+b`.
pub fn complete_bipartite(a: usize, b: usize) -> Graph {
    let mut edges = Vec::new();
    for u in 0..a as NodeId {
        for v in 0..b as NodeId {
            edges.push((u, a as NodeId + v));
        }
    }
    from_edges(a + b, &edges)
}

/// Two triangles 0-1-2 and 3-4-5 joined by the bridge edge 2-3.
pub fn two_triangles_with_bridge() -> Graph {
    from_edges(6, &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)])
}

/// rows x cols grid with Manhattan neighbors.
pub fn grid(rows: usize, cols: usize) -> Graph {
    let at = |r: usize, c: usize| (r * cols + c) as NodeId;
    let mut edges = Vec::new();
    for r in 0..rows {
        for c in 0..cols {
            if c + 1 < cols {
                edges.push((at(r, c), at(r, c + 1)));
            }
            if r + 1 < rows {
                edges.push((at(r, c), at(r + 1, c)));
            }
        }
    }
    from_edges(rows * cols, &edges)
}

/// Star: node 0 connected to 1..=leaves.
pub fn star(leaves: usize) -> Graph {
    let edges: Vec<(NodeId, NodeId)> = (1..=leaves as NodeId).map(|v| (0, v)).collect();
    from_edges(leaves + 1, &edges)
}
