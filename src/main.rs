//! SegmentForge: customer segmentation CLI
//!
//! Fits a segmentation model from a customer feature CSV, saves it as a
//! bundle, and scores, profiles or projects customers against a saved bundle.

use anyhow::{Context, Result};
use clap::Parser;
use ndarray::Array1;
use segmentforge::data::{write_projection_csv, write_segments_csv};
use segmentforge::{load_customer_table, Args, Command, SegmentProfile, SegmentationPipeline};
use std::path::Path;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        println!("SegmentForge - Customer Segmentation using K-Means");
        println!("==================================================\n");
    }

    match &args.command {
        Command::Fit {
            input,
            model_dir,
            id_column,
            features,
            ..
        } => {
            let config = args
                .command
                .segmentation_config()
                .context("fit command without a segmentation config")?;
            run_fit(&args, input, model_dir, id_column, features.as_deref(), config)
        }
        Command::Predict {
            input,
            model_dir,
            id_column,
            output,
        } => run_predict(input, model_dir, id_column, output.as_deref()),
        Command::Profiles { model_dir } => run_profiles(model_dir),
        Command::Recommend { model_dir } => run_recommend(model_dir),
        Command::Project {
            input,
            model_dir,
            id_column,
            output,
        } => run_project(input, model_dir, id_column, output.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_pipeline(model_dir: &Path) -> Result<SegmentationPipeline> {
    SegmentationPipeline::load_model(model_dir)
        .with_context(|| format!("Failed to load model from {}", model_dir.display()))
}

/// Fit a new model and save it
fn run_fit(
    args: &Args,
    input: &Path,
    model_dir: &Path,
    id_column: &str,
    features: Option<&[String]>,
    config: segmentforge::SegmentationConfig,
) -> Result<()> {
    println!("=== Segmentation Fit ===\n");
    let start_time = Instant::now();

    if args.verbose {
        println!("Step 1: Loading customer data");
        println!("  Input file: {}", input.display());
    }
    let table = load_customer_table(input, id_column)
        .with_context(|| format!("Failed to load customers from {}", input.display()))?;
    println!("✓ Data loaded: {} customers", table.len());

    if args.verbose {
        println!("\nStep 2: Fitting segmentation model");
        println!("  Number of segments: {}", config.n_segments);
        println!("  Restarts: {}", config.n_runs);
        println!("  Max iterations: {}", config.max_iterations);
        println!("  Tolerance: {}", config.tolerance);
    }

    let fit_start = Instant::now();
    let mut pipeline = SegmentationPipeline::new(config)?;
    let labels = pipeline.fit_predict(&table, features)?;
    let fit_time = fit_start.elapsed();

    println!("✓ Model fitted successfully");
    let state = pipeline.state()?;
    if args.verbose {
        println!("  Fitting time: {:.2}s", fit_time.as_secs_f64());
        println!("  Features: {}", state.feature_columns().join(", "));
        println!("  Inertia: {:.2}", state.clusters().inertia);
    }

    let sizes = state.clusters().cluster_sizes(&Array1::from(labels));
    println!("\n=== Segment Sizes ===");
    for (segment, size) in sizes.iter().enumerate() {
        let percentage = (*size as f64 / table.len() as f64) * 100.0;
        println!("Segment {}: {} customers ({:.1}%)", segment, size, percentage);
    }

    print_profiles(pipeline.get_segment_profiles()?);

    pipeline
        .save_model(model_dir)
        .with_context(|| format!("Failed to save model to {}", model_dir.display()))?;

    println!("\n=== Fit Complete ===");
    println!("Total processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    println!("Model saved to: {}", model_dir.display());
    Ok(())
}

fn run_predict(input: &Path, model_dir: &Path, id_column: &str, output: Option<&Path>) -> Result<()> {
    let start_time = Instant::now();
    let pipeline = load_pipeline(model_dir)?;
    let table = load_customer_table(input, id_column)
        .with_context(|| format!("Failed to load customers from {}", input.display()))?;

    let segments = pipeline.get_customer_segments(&table)?;
    match output {
        Some(path) => {
            write_segments_csv(&segments, path)?;
            println!("✓ {} customers scored", segments.len());
            println!("  Assignments saved to: {}", path.display());
        }
        None => {
            println!("{:<16} {:>8}  {}", "customer_id", "segment", "segment_name");
            for segment in &segments {
                println!(
                    "{:<16} {:>8}  {}",
                    segment.customer_id, segment.segment, segment.segment_name
                );
            }
        }
    }
    println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn run_profiles(model_dir: &Path) -> Result<()> {
    let pipeline = load_pipeline(model_dir)?;
    print_profiles(pipeline.get_segment_profiles()?);
    Ok(())
}

fn run_recommend(model_dir: &Path) -> Result<()> {
    let pipeline = load_pipeline(model_dir)?;
    println!("=== Segment Recommendations ===");
    for (name, recommendation) in pipeline.get_segment_recommendations()? {
        println!("\n{}", name);
        println!("  Email frequency: {}", recommendation.email_frequency);
        println!("  Offer type:      {}", recommendation.offer_type);
        println!("  Message tone:    {}", recommendation.message_tone);
        println!("  Strategy:        {}", recommendation.strategy);
    }
    Ok(())
}

fn run_project(input: &Path, model_dir: &Path, id_column: &str, output: Option<&Path>) -> Result<()> {
    let pipeline = load_pipeline(model_dir)?;
    let table = load_customer_table(input, id_column)
        .with_context(|| format!("Failed to load customers from {}", input.display()))?;

    let points = pipeline.get_pca_components(&table)?;
    let variance = pipeline.state()?.projector().explained_variance();
    match output {
        Some(path) => {
            write_projection_csv(&points, path)?;
            println!("✓ {} customers projected", points.len());
            println!("  Projection saved to: {}", path.display());
        }
        None => {
            println!("{:<16} {:>10} {:>10}  {}", "customer_id", "pc1", "pc2", "segment_name");
            for point in &points {
                println!(
                    "{:<16} {:>10.4} {:>10.4}  {}",
                    point.customer_id, point.pc1, point.pc2, point.segment_name
                );
            }
        }
    }
    println!("  Explained variance: PC1={:.4}, PC2={:.4}", variance[0], variance[1]);
    Ok(())
}

fn print_profiles(profiles: &[SegmentProfile]) {
    println!("\n=== Segment Profiles ===");
    println!(
        "{:>7}  {:<20} {:>9} {:>7} {:>10} {:>8} {:>12} {:>10}",
        "segment", "name", "customers", "share", "recency", "orders", "spend", "lifetime"
    );
    for profile in profiles {
        println!(
            "{:>7}  {:<20} {:>9} {:>6.1}% {:>10.1} {:>8.1} {:>12.2} {:>10.1}",
            profile.segment,
            profile.segment_name,
            profile.customer_count,
            profile.customer_percentage,
            profile.recency(),
            profile.transaction_count(),
            profile.total_spend(),
            profile.customer_lifetime(),
        );
    }
}
