//! Command-line driver for the partitioner.

use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;

use parcut::graphio;
use parcut::options::{
    ClusterWeightLimit, ClusteringAlgorithm, Context, ContractionMode, EdgeOrdering,
    FmStoppingRule, GainCacheStrategy, InitialPartitioningMode, IsolatedNodesClusteringStrategy,
    NodeOrdering, PartitioningMode, RefinementAlgorithm, TwoHopStrategy,
};

#[derive(Parser)]
#[command(name = "parcut", version, about = "Shared-memory multilevel graph partitioner")]
struct Args {
    /// Graph file in METIS format.
    #[arg(short = 'G', long = "graph")]
    graph: PathBuf,

    /// Number of blocks.
    #[arg(short)]
    k: u32,

    /// Maximum imbalance, e.g. 0.03 allows 3% overweight blocks.
    #[arg(short, long)]
    epsilon: f64,

    /// Seed for all randomized components.
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Worker threads; defaults to all cores.
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Write the partition here, one block id per line.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = PartitioningMode::Kway, value_parser = PartitioningMode::from_str)]
    mode: PartitioningMode,

    #[arg(long, default_value_t = ClusteringAlgorithm::LabelPropagation, value_parser = ClusteringAlgorithm::from_str)]
    clustering: ClusteringAlgorithm,

    #[arg(long, default_value_t = ClusterWeightLimit::EpsilonBlockWeight, value_parser = ClusterWeightLimit::from_str)]
    cluster_weight_limit: ClusterWeightLimit,

    #[arg(long, default_value_t = 2000)]
    contraction_limit: usize,

    #[arg(long, default_value_t = ContractionMode::Buffered, value_parser = ContractionMode::from_str)]
    contraction_mode: ContractionMode,

    #[arg(long, default_value_t = TwoHopStrategy::MatchDuringTwoHop, value_parser = TwoHopStrategy::from_str)]
    two_hop_strategy: TwoHopStrategy,

    #[arg(long, default_value_t = IsolatedNodesClusteringStrategy::ClusterDuringTwoHop, value_parser = IsolatedNodesClusteringStrategy::from_str)]
    isolated_nodes_strategy: IsolatedNodesClusteringStrategy,

    #[arg(long, default_value_t = 5)]
    lp_iterations: usize,

    #[arg(
        long,
        value_delimiter = ',',
        value_parser = RefinementAlgorithm::from_str,
        default_values_t = [
            RefinementAlgorithm::LabelPropagation,
            RefinementAlgorithm::KwayFm,
            RefinementAlgorithm::GreedyBalancer,
        ],
    )]
    refinement: Vec<RefinementAlgorithm>,

    #[arg(long, default_value_t = GainCacheStrategy::Dense, value_parser = GainCacheStrategy::from_str)]
    gain_cache: GainCacheStrategy,

    #[arg(long, default_value_t = FmStoppingRule::Simple, value_parser = FmStoppingRule::from_str)]
    fm_stopping_rule: FmStoppingRule,

    #[arg(long, default_value_t = 5)]
    fm_iterations: usize,

    #[arg(long, default_value_t = InitialPartitioningMode::Sequential, value_parser = InitialPartitioningMode::from_str)]
    initial_partitioning_mode: InitialPartitioningMode,

    #[arg(long, default_value_t = 20)]
    initial_repetitions: usize,

    #[arg(long, default_value_t = NodeOrdering::Natural, value_parser = NodeOrdering::from_str)]
    node_ordering: NodeOrdering,

    #[arg(long, default_value_t = EdgeOrdering::Natural, value_parser = EdgeOrdering::from_str)]
    edge_ordering: EdgeOrdering,
}

impl Args {
    fn context(&self) -> Context {
        let mut ctx = Context::default();
        ctx.mode = self.mode;
        ctx.partition.k = self.k;
        ctx.partition.epsilon = self.epsilon;
        ctx.seed = self.seed;
        ctx.coarsening.algorithm = self.clustering;
        ctx.coarsening.cluster_weight_limit = self.cluster_weight_limit;
        ctx.coarsening.contraction_limit = self.contraction_limit;
        ctx.coarsening.contraction_mode = self.contraction_mode;
        ctx.coarsening.lp.num_iterations = self.lp_iterations;
        ctx.coarsening.lp.two_hop_strategy = self.two_hop_strategy;
        ctx.coarsening.lp.isolated_nodes_strategy = self.isolated_nodes_strategy;
        ctx.initial_partitioning.mode = self.initial_partitioning_mode;
        ctx.initial_partitioning.num_repetitions = self.initial_repetitions;
        ctx.refinement.algorithms = self.refinement.clone();
        ctx.refinement.gain_cache_strategy = self.gain_cache;
        ctx.refinement.kway_fm.stopping_rule = self.fm_stopping_rule;
        ctx.refinement.kway_fm.num_iterations = self.fm_iterations;
        ctx.node_ordering = self.node_ordering;
        ctx.edge_ordering = self.edge_ordering;
        ctx
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
        {
            eprintln!("parcut: could not configure {threads} threads: {e}");
            return ExitCode::FAILURE;
        }
    }

    let start = Instant::now();
    let graph = match graphio::read_graph(&args.graph) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("parcut: {}: {e}", args.graph.display());
            return ExitCode::FAILURE;
        }
    };
    let read_time = start.elapsed();

    let ctx = args.context();
    let start = Instant::now();
    let result = match parcut::partition(&graph, &ctx) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("parcut: {e}");
            return ExitCode::FAILURE;
        }
    };
    let partition_time = start.elapsed();

    println!(
        "graph: {} nodes, {} edges ({:.3}s to read)",
        graph.n(),
        graph.m() / 2,
        read_time.as_secs_f64()
    );
    println!(
        "partition: k={} cut={} imbalance={:.4} feasible={} ({:.3}s)",
        args.k,
        result.cut,
        result.imbalance,
        result.feasible,
        partition_time.as_secs_f64()
    );

    if let Some(path) = &args.output {
        if let Err(e) = graphio::write_partition(path, &result.partition) {
            eprintln!("parcut: {}: {e}", path.display());
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
