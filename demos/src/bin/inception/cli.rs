use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inception", version, about = "Inception-v3 topology builder")]
pub struct Cli {
    /// JSON session config; flags below override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter (RUST_LOG syntax)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    /// Random seed for initializers
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// Number of output classes
    #[arg(long, global = true)]
    pub num_classes: Option<usize>,

    /// Batch-normalize every convolution
    #[arg(long, global = true)]
    pub batch_norm: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print per-stage shapes and parameter counts without computing anything
    Summary {
        #[arg(long, default_value_t = 1)]
        batch: usize,

        #[arg(long, default_value_t = 299)]
        height: usize,

        #[arg(long, default_value_t = 299)]
        width: usize,

        /// Treat the input as [N, H, W, C]
        #[arg(long)]
        channel_last: bool,

        /// List every parameter
        #[arg(long)]
        params: bool,
    },

    /// Initialize the network on the CPU and save a checkpoint
    Init {
        /// Output directory
        #[arg(long)]
        out: PathBuf,
    },

    /// Restore a checkpoint and classify a synthetic batch
    Predict {
        /// Checkpoint directory
        #[arg(long)]
        checkpoint: PathBuf,

        #[arg(long, default_value_t = 1)]
        batch: usize,

        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },
}
