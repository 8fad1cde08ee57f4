//! Basic scalar types shared by every module.

/// Identifies a node of a graph. Nodes of an n-node graph are `0..n`.
pub type NodeId = u32;

/// Indexes the CSR edge array. Each undirected edge occupies two slots,
/// one per endpoint.
pub type EdgeId = u32;

/// Identifies a block of a partition. Blocks of a k-way partition are `0..k`.
pub type BlockId = u32;

/// Node weight. Signed and wide enough for the sum of all node weights.
pub type NodeWeight = i64;

/// Edge weight. Signed and wide enough for the sum of all edge weights.
pub type EdgeWeight = i64;

pub const INVALID_NODE: NodeId = NodeId::MAX;
pub const INVALID_BLOCK: BlockId = BlockId::MAX;
