//! Command-line interface definitions and argument parsing

use crate::config::{EmptySegmentPolicy, SegmentationConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Customer segmentation CLI using K-Means clustering on RFM features
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Fit a new model on a customer feature CSV and save it
    Fit {
        /// Path to the customer feature CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Directory to write the model bundle to
        #[arg(short, long)]
        model_dir: PathBuf,

        /// Name of the customer id column
        #[arg(long, default_value = "customer_id")]
        id_column: String,

        /// Number of segments
        #[arg(short = 'k', long, default_value = "5")]
        segments: usize,

        /// Comma-separated feature columns (default: the seven RFM features)
        /// Example: --features "recency,transaction_count,total_spend"
        #[arg(short, long, value_delimiter = ',')]
        features: Option<Vec<String>>,

        /// Random seed for centroid initialization
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of K-Means restarts
        #[arg(long, default_value = "10")]
        runs: usize,

        /// Maximum iterations for K-Means algorithm
        #[arg(long, default_value = "300")]
        max_iters: u64,

        /// Tolerance for K-Means convergence
        #[arg(long, default_value = "1e-4")]
        tolerance: f64,

        /// Leave segments without customers out of the profile table
        #[arg(long)]
        drop_empty: bool,
    },

    /// Score customers against a saved model
    Predict {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        model_dir: PathBuf,

        #[arg(long, default_value = "customer_id")]
        id_column: String,

        /// Write assignments to this CSV instead of printing them
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the segment profile table of a saved model
    Profiles {
        #[arg(short, long)]
        model_dir: PathBuf,
    },

    /// Print marketing recommendations per segment
    Recommend {
        #[arg(short, long)]
        model_dir: PathBuf,
    },

    /// Project customers onto the two principal axes of a saved model
    Project {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        model_dir: PathBuf,

        #[arg(long, default_value = "customer_id")]
        id_column: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Command {
    /// Build the segmentation config for a `fit` invocation
    pub fn segmentation_config(&self) -> Option<SegmentationConfig> {
        match self {
            Command::Fit {
                segments,
                seed,
                runs,
                max_iters,
                tolerance,
                drop_empty,
                ..
            } => Some(SegmentationConfig {
                n_segments: *segments,
                random_state: *seed,
                n_runs: *runs,
                max_iterations: *max_iters,
                tolerance: *tolerance,
                empty_segments: if *drop_empty {
                    EmptySegmentPolicy::Drop
                } else {
                    EmptySegmentPolicy::Keep
                },
            }),
            _ => None,
        }
    }
}
