//! `parcut` is a shared-memory multilevel graph partitioner.
//!
//! Given an undirected graph with non-negative node and edge weights, a
//! block count `k >= 2` and a maximum imbalance `epsilon`, it computes a
//! partition of the nodes into `k` blocks that minimizes the weight of cut
//! edges while keeping every block below `(1 + epsilon)` times the average
//! block weight.
//!
//! The engine is the classic multilevel scheme: label-propagation
//! clustering coarsens the graph level by level, a portfolio of seed
//! bipartitioners computes an initial partition on the coarsest level, and
//! FM-style local search plus a greedy rebalancer refine the partition
//! while it is projected back up the hierarchy.
//!
//! ```no_run
//! use parcut::{graphio, options::Context, partition};
//!
//! # fn main() -> Result<(), parcut::Error> {
//! let graph = graphio::read_graph("input.graph")?;
//! let mut ctx = Context::default();
//! ctx.partition.k = 4;
//! ctx.partition.epsilon = 0.03;
//! let result = partition(&graph, &ctx)?;
//! println!("cut = {}", result.cut);
//! # Ok(())
//! # }
//! ```

use std::fmt;

pub mod defs;
pub mod graph;
pub mod graphio;
pub mod options;
pub mod pqueue;
pub mod ratingmap;
pub mod partition;
pub mod cluster;
pub mod contract;
pub mod gaincache;
pub mod fm;
pub mod initpart;
pub mod kwayfm;
pub mod balance;
pub mod refine;
pub mod multilevel;

pub use defs::{BlockId, EdgeId, EdgeWeight, NodeId, NodeWeight};
pub use graph::Graph;
pub use multilevel::{partition, Partitioning};
pub use options::Context;

/// Errors surfaced by the partitioner.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// The input graph violates a CSR invariant, or a parameter is out of
    /// range (e.g. `k < 2` where a k-way partition is required).
    InvalidInput(String),

    /// An allocation failed while building a coarse graph or a gain cache.
    OutOfMemory,

    /// The balancer could not restore the block-weight caps under the
    /// supplied epsilon.
    Infeasible,

    /// An I/O error while reading a graph or writing a partition.
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(what) => write!(f, "invalid input: {what}"),
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::Infeasible => write!(f, "could not restore the balance constraint"),
            Error::Io(e) => write!(f, "i/o error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

pub type Result<T> = std::result::Result<T, Error>;
