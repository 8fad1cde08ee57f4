//! Configuration context read by every component.
//!
//! The context is a tree of plain option records, filled once by the
//! caller (or the CLI) and treated as immutable afterwards. The string
//! forms of the enumerations below are the exact spellings accepted by the
//! option parser.

use std::fmt;
use std::str::FromStr;

use crate::defs::*;
use crate::graph::Graph;
use crate::{Error, Result};

macro_rules! string_enum {
    ($(#[$doc:meta])* $name:ident { $($variant:ident = $string:literal),+ $(,)? }) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($string => Ok(Self::$variant),)+
                    _ => Err(Error::InvalidInput(format!(
                        concat!("unknown ", stringify!($name), " '{}' (expected one of: {})"),
                        s,
                        [$($string),+].join(", "),
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s = match self {
                    $(Self::$variant => $string),+
                };
                f.write_str(s)
            }
        }
    };
}

string_enum! {
    /// Top-level partitioning scheme. `deep` is accepted for compatibility
    /// and resolves to `kway`.
    PartitioningMode {
        Deep = "deep",
        Rb = "rb",
        Kway = "kway",
    }
}

string_enum! {
    ClusteringAlgorithm {
        Noop = "noop",
        LabelPropagation = "label-propagation",
    }
}

string_enum! {
    /// Formula for the maximum cluster weight during coarsening.
    ClusterWeightLimit {
        EpsilonBlockWeight = "epsilon-block-weight",
        BlockWeight = "block-weight",
        One = "one",
        Zero = "zero",
    }
}

string_enum! {
    RefinementAlgorithm {
        Noop = "noop",
        LabelPropagation = "label-propagation",
        GreedyBalancer = "greedy-balancer",
        KwayFm = "kway-fm",
        Jet = "jet",
        MtKaHyPar = "mtkahypar",
    }
}

string_enum! {
    /// `hybrid` is accepted for compatibility and resolves to `dense`.
    GainCacheStrategy {
        Dense = "dense",
        OnTheFly = "on-the-fly",
        Hybrid = "hybrid",
    }
}

string_enum! {
    TwoHopStrategy {
        Disable = "disable",
        Match = "match",
        Cluster = "cluster",
        MatchDuringTwoHop = "match-during-two-hop",
        ClusterDuringTwoHop = "cluster-during-two-hop",
    }
}

string_enum! {
    IsolatedNodesClusteringStrategy {
        Keep = "keep",
        Match = "match",
        Cluster = "cluster",
        MatchDuringTwoHop = "match-during-two-hop",
        ClusterDuringTwoHop = "cluster-during-two-hop",
    }
}

string_enum! {
    FmStoppingRule {
        Simple = "simple",
        Adaptive = "adaptive",
    }
}

string_enum! {
    InitialPartitioningMode {
        Sequential = "sequential",
        AsyncParallel = "async-parallel",
        SyncParallel = "sync-parallel",
    }
}

string_enum! {
    /// `unbuffered` is accepted for compatibility and resolves to the
    /// buffered contraction path.
    ContractionMode {
        Buffered = "buffered",
        Unbuffered = "unbuffered",
    }
}

string_enum! {
    NodeOrdering {
        Natural = "natural",
        DegBuckets = "deg-buckets",
        Coloring = "coloring",
    }
}

string_enum! {
    EdgeOrdering {
        Natural = "natural",
        Compression = "compression",
    }
}

/// Label-propagation clustering options.
#[derive(Debug, Clone)]
pub struct LabelPropagationCtx {
    /// Maximum number of full passes per level.
    pub num_iterations: usize,
    /// Number of disjoint chunks a pass is split into; chunks are visited
    /// one after another, nodes inside a chunk in parallel.
    pub num_chunks: usize,
    /// Nodes with higher degree take the sampling fast path.
    pub large_degree_threshold: usize,
    /// Number of neighbors the fast path samples.
    pub max_num_neighbors: usize,
    pub two_hop_strategy: TwoHopStrategy,
    /// Two-hop augmentation runs only if label propagation left more than
    /// `two_hop_threshold * n` clusters.
    pub two_hop_threshold: f64,
    pub isolated_nodes_strategy: IsolatedNodesClusteringStrategy,
}

impl Default for LabelPropagationCtx {
    fn default() -> Self {
        Self {
            num_iterations: 5,
            num_chunks: 8,
            large_degree_threshold: 1_000_000,
            max_num_neighbors: 200_000,
            two_hop_strategy: TwoHopStrategy::MatchDuringTwoHop,
            two_hop_threshold: 0.5,
            isolated_nodes_strategy: IsolatedNodesClusteringStrategy::ClusterDuringTwoHop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoarseningCtx {
    pub algorithm: ClusteringAlgorithm,
    /// Coarsening stops once `n <= k * contraction_limit`.
    pub contraction_limit: usize,
    pub cluster_weight_limit: ClusterWeightLimit,
    pub cluster_weight_multiplier: f64,
    pub contraction_mode: ContractionMode,
    pub lp: LabelPropagationCtx,
}

impl Default for CoarseningCtx {
    fn default() -> Self {
        Self {
            algorithm: ClusteringAlgorithm::LabelPropagation,
            contraction_limit: 2000,
            cluster_weight_limit: ClusterWeightLimit::EpsilonBlockWeight,
            cluster_weight_multiplier: 1.0,
            contraction_mode: ContractionMode::Buffered,
            lp: LabelPropagationCtx::default(),
        }
    }
}

impl CoarseningCtx {
    /// Maximum cluster weight for a level with `n` nodes and total node
    /// weight `total`, partitioning into `k` blocks under `epsilon`.
    pub fn max_cluster_weight(
        &self,
        n: usize,
        total: NodeWeight,
        k: BlockId,
        epsilon: f64,
    ) -> NodeWeight {
        let base = match self.cluster_weight_limit {
            ClusterWeightLimit::EpsilonBlockWeight => {
                let divisor = (n / self.contraction_limit.max(1)).clamp(2, k.max(2) as usize);
                epsilon * total as f64 / divisor as f64
            }
            ClusterWeightLimit::BlockWeight => {
                (1.0 + epsilon) * total as f64 / k.max(1) as f64
            }
            ClusterWeightLimit::One => 1.0,
            ClusterWeightLimit::Zero => 0.0,
        };
        (self.cluster_weight_multiplier * base) as NodeWeight
    }
}

#[derive(Debug, Clone)]
pub struct InitialPartitioningCtx {
    pub mode: InitialPartitioningMode,
    /// Requested repetitions of the whole portfolio, clamped into
    /// `[min_num_repetitions, max_num_repetitions]`.
    pub num_repetitions: usize,
    pub min_num_repetitions: usize,
    /// Every algorithm runs at least this many repetitions before the
    /// adaptive gate may prune it.
    pub min_num_non_adaptive_repetitions: usize,
    pub max_num_repetitions: usize,
    pub use_adaptive_bipartitioner_selection: bool,
    /// Passes of the sequential 2-way FM polisher per candidate.
    pub refinement_iterations: usize,
}

impl Default for InitialPartitioningCtx {
    fn default() -> Self {
        Self {
            mode: InitialPartitioningMode::Sequential,
            num_repetitions: 20,
            min_num_repetitions: 10,
            min_num_non_adaptive_repetitions: 5,
            max_num_repetitions: 50,
            use_adaptive_bipartitioner_selection: true,
            refinement_iterations: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KwayFmCtx {
    /// Border seeds handed to one localized search.
    pub num_seed_nodes: usize,
    pub stopping_rule: FmStoppingRule,
    /// Simple rule: abort a sequence after this many fruitless moves.
    pub num_fruitless_moves: usize,
    /// Adaptive rule: larger alpha searches longer.
    pub alpha: f64,
    /// Refinement rounds per level.
    pub num_iterations: usize,
}

impl Default for KwayFmCtx {
    fn default() -> Self {
        Self {
            num_seed_nodes: 10,
            stopping_rule: FmStoppingRule::Simple,
            num_fruitless_moves: 100,
            alpha: 1.0,
            num_iterations: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefinementCtx {
    /// Executed in order on every level.
    pub algorithms: Vec<RefinementAlgorithm>,
    pub gain_cache_strategy: GainCacheStrategy,
    pub lp_num_iterations: usize,
    pub kway_fm: KwayFmCtx,
}

impl Default for RefinementCtx {
    fn default() -> Self {
        Self {
            algorithms: vec![
                RefinementAlgorithm::LabelPropagation,
                RefinementAlgorithm::KwayFm,
                RefinementAlgorithm::GreedyBalancer,
            ],
            gain_cache_strategy: GainCacheStrategy::Dense,
            lp_num_iterations: 5,
            kway_fm: KwayFmCtx::default(),
        }
    }
}

/// Derived per-graph partition parameters: block count, imbalance factor
/// and the block-weight caps every component checks against.
#[derive(Debug, Clone)]
pub struct PartitionContext {
    pub k: BlockId,
    pub epsilon: f64,
    pub total_node_weight: NodeWeight,
    /// `ceil(total / k)` per block, or proportional targets for unequal
    /// bisections during recursive splitting.
    pub perfectly_balanced_block_weights: Vec<NodeWeight>,
    pub max_block_weights: Vec<NodeWeight>,
}

impl PartitionContext {
    /// Uniform targets: every block aims at `ceil(total / k)`.
    pub fn new_uniform(k: BlockId, epsilon: f64, total_node_weight: NodeWeight) -> Self {
        let perfect = if k == 0 {
            0
        } else {
            (total_node_weight + k as NodeWeight - 1) / k as NodeWeight
        };
        let max = ((1.0 + epsilon) * perfect as f64).floor() as NodeWeight;
        Self {
            k,
            epsilon,
            total_node_weight,
            perfectly_balanced_block_weights: vec![perfect; k as usize],
            max_block_weights: vec![max.max(perfect); k as usize],
        }
    }

    /// 2-way context with proportional targets, used when a bisection
    /// stands in for `k0 + k1` final blocks.
    pub fn new_bisection(
        k0: BlockId,
        k1: BlockId,
        epsilon: f64,
        total_node_weight: NodeWeight,
    ) -> Self {
        let k = k0 + k1;
        let share = |ki: BlockId| -> NodeWeight {
            (total_node_weight as f64 * ki as f64 / k as f64).ceil() as NodeWeight
        };
        let perfect = vec![share(k0), share(k1)];
        let max: Vec<NodeWeight> = perfect
            .iter()
            .map(|&p| (((1.0 + epsilon) * p as f64).floor() as NodeWeight).max(p))
            .collect();
        Self {
            k: 2,
            epsilon,
            total_node_weight,
            perfectly_balanced_block_weights: perfect,
            max_block_weights: max,
        }
    }

    #[inline]
    pub fn perfect_block_weight(&self, b: BlockId) -> NodeWeight {
        self.perfectly_balanced_block_weights[b as usize]
    }

    #[inline]
    pub fn max_block_weight(&self, b: BlockId) -> NodeWeight {
        self.max_block_weights[b as usize]
    }

    /// `max_b W(b) / ceil(W / k) - 1` over the supplied block weights.
    pub fn imbalance(&self, block_weights: &[NodeWeight]) -> f64 {
        debug_assert_eq!(block_weights.len(), self.k as usize);
        block_weights
            .iter()
            .zip(&self.perfectly_balanced_block_weights)
            .map(|(&w, &p)| if p > 0 { w as f64 / p as f64 - 1.0 } else { 0.0 })
            .fold(0.0, f64::max)
    }

    pub fn is_feasible(&self, block_weights: &[NodeWeight]) -> bool {
        block_weights
            .iter()
            .zip(&self.max_block_weights)
            .all(|(&w, &max)| w <= max)
    }
}

/// Root of the option tree.
#[derive(Debug, Clone)]
pub struct Context {
    pub mode: PartitioningMode,
    pub partition: PartitionOptions,
    pub coarsening: CoarseningCtx,
    pub initial_partitioning: InitialPartitioningCtx,
    pub refinement: RefinementCtx,
    pub node_ordering: NodeOrdering,
    pub edge_ordering: EdgeOrdering,
    pub seed: u64,
}

/// User-facing partition parameters; per-graph derived values live in
/// [`PartitionContext`].
#[derive(Debug, Clone)]
pub struct PartitionOptions {
    pub k: BlockId,
    pub epsilon: f64,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            mode: PartitioningMode::Kway,
            partition: PartitionOptions { k: 2, epsilon: 0.03 },
            coarsening: CoarseningCtx::default(),
            initial_partitioning: InitialPartitioningCtx::default(),
            refinement: RefinementCtx::default(),
            node_ordering: NodeOrdering::Natural,
            edge_ordering: EdgeOrdering::Natural,
            seed: 0,
        }
    }
}

impl Context {
    /// Checks scalar option ranges and derives the [`PartitionContext`]
    /// for `graph`.
    pub fn partition_context(&self, graph: &Graph) -> Result<PartitionContext> {
        if self.partition.k < 2 {
            return Err(Error::InvalidInput(format!(
                "k must be at least 2, got {}",
                self.partition.k
            )));
        }
        if !(self.partition.epsilon > 0.0) {
            return Err(Error::InvalidInput(format!(
                "epsilon must be positive, got {}",
                self.partition.epsilon
            )));
        }
        Ok(PartitionContext::new_uniform(
            self.partition.k,
            self.partition.epsilon,
            graph.total_node_weight(),
        ))
    }
}
