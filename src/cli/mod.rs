//! Command-line interface for the wildfire clustering pipeline.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::core::loaders;
use crate::core::records::FireRecord;
use crate::core::writers;
use crate::processors::{ClusterParams, DbscanEngine, HierarchyEngine};
use crate::visualization;

#[derive(Parser)]
#[command(name = "wildfire-pipeline")]
#[command(about = "Density-based clustering of wildfire damage records", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run DBSCAN clustering on a damage inspection CSV
    Cluster {
        /// Input CSV file
        input: PathBuf,
        /// Output directory for result CSVs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Neighborhood radius in kilometers
        #[arg(long)]
        epsilon_km: Option<f64>,
        /// Minimum neighbors for a core point
        #[arg(long)]
        min_points: Option<usize>,
        /// Minimum members for a cluster to survive
        #[arg(long)]
        min_cluster_size: Option<usize>,
        /// Use the naive linear scan instead of the KD-tree index
        #[arg(long)]
        linear: bool,
    },

    /// Run hierarchical density clustering on a damage inspection CSV
    Hierarchy {
        /// Input CSV file
        input: PathBuf,
        /// Output directory for result CSVs
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Minimum neighbors used for core distances
        #[arg(long)]
        min_points: Option<usize>,
        /// Minimum members for a cluster to survive
        #[arg(long)]
        min_cluster_size: Option<usize>,
    },

    /// Print dataset statistics without clustering
    Summary {
        /// Input CSV file
        input: PathBuf,
    },

    /// Cluster and render a scatter plot (PNG) colored by cluster
    Plot {
        /// Input CSV file
        input: PathBuf,
        /// Output PNG file path (defaults to input name with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Neighborhood radius in kilometers
        #[arg(long)]
        epsilon_km: Option<f64>,
        /// Minimum neighbors for a core point
        #[arg(long)]
        min_points: Option<usize>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        // Truncate on character boundaries; multi-byte paths are legal.
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let outcome = match cli.command {
        Commands::Cluster {
            input,
            output_dir,
            epsilon_km,
            min_points,
            min_cluster_size,
            linear,
        } => cmd_cluster(
            &input,
            output_dir,
            epsilon_km,
            min_points,
            min_cluster_size,
            linear,
            &config,
        ),
        Commands::Hierarchy {
            input,
            output_dir,
            min_points,
            min_cluster_size,
        } => cmd_hierarchy(&input, output_dir, min_points, min_cluster_size, &config),
        Commands::Summary { input } => cmd_summary(&input),
        Commands::Plot {
            input,
            output,
            epsilon_km,
            min_points,
        } => cmd_plot(&input, output, epsilon_km, min_points, &config),
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn load_valid_records(input: &Path) -> anyhow::Result<Vec<FireRecord>> {
    let records = loaders::load_records(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    Ok(loaders::valid_records(records))
}

fn effective_params(
    epsilon_km: Option<f64>,
    min_points: Option<usize>,
    min_cluster_size: Option<usize>,
    config: &PipelineConfig,
) -> ClusterParams {
    ClusterParams {
        epsilon_km: epsilon_km.unwrap_or(config.clustering.epsilon_km),
        min_points: min_points.unwrap_or(config.clustering.min_points),
        min_cluster_size: min_cluster_size.or(config.clustering.min_cluster_size),
    }
}

fn write_results(
    output_dir: &Path,
    records: &[FireRecord],
    result: &crate::processors::ClusteringResult<FireRecord>,
    config: &PipelineConfig,
) -> anyhow::Result<(PathBuf, PathBuf)> {
    let labels_path = output_dir.join(&config.output.labels_file);
    let summary_path = output_dir.join(&config.output.summary_file);
    writers::write_labels_csv(&labels_path, records, &result.labels)
        .context("failed to write labels CSV")?;
    writers::write_cluster_summary_csv(&summary_path, result)
        .context("failed to write cluster summary CSV")?;
    Ok((labels_path, summary_path))
}

fn cmd_cluster(
    input: &Path,
    output_dir: Option<PathBuf>,
    epsilon_km: Option<f64>,
    min_points: Option<usize>,
    min_cluster_size: Option<usize>,
    linear: bool,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let params = effective_params(epsilon_km, min_points, min_cluster_size, config);
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output.directory));

    let spinner = create_spinner("Loading records...");
    let records = load_valid_records(input)?;
    spinner.set_message(format!("Clustering {} records...", records.len()));

    let mut engine = DbscanEngine::new(&records, params)?;
    if linear || !config.clustering.use_spatial_index {
        engine = engine.with_linear_search();
    }
    let result = engine.run_with_sink(&mut |id: u32, members: &[FireRecord]| {
        info!("cluster {} found with {} records", id, members.len());
    })?;

    spinner.set_message("Writing results...");
    let (labels_path, summary_path) = write_results(&output_dir, &records, &result, config)?;
    spinner.finish_and_clear();

    print_summary(
        "Clustering Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Labels CSV", labels_path.display().to_string()),
            ("Summary CSV", summary_path.display().to_string()),
            ("Records processed", records.len().to_string()),
            ("Clusters found", result.cluster_count().to_string()),
            ("Noise points", result.noise_count().to_string()),
            ("epsilon_km", params.epsilon_km.to_string()),
            ("min_points", params.min_points.to_string()),
            ("min_cluster_size", params.effective_min_cluster_size().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_hierarchy(
    input: &Path,
    output_dir: Option<PathBuf>,
    min_points: Option<usize>,
    min_cluster_size: Option<usize>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let params = effective_params(None, min_points, min_cluster_size, config);
    let output_dir = output_dir.unwrap_or_else(|| PathBuf::from(&config.output.directory));

    let spinner = create_spinner("Loading records...");
    let records = load_valid_records(input)?;
    spinner.set_message(format!(
        "Building cluster hierarchy over {} records...",
        records.len()
    ));

    let result = HierarchyEngine::new(&records, params)?.run_with_sink(
        &mut |id: u32, members: &[FireRecord]| {
            info!("cluster {} found with {} records", id, members.len());
        },
    )?;

    spinner.set_message("Writing results...");
    let (labels_path, summary_path) = write_results(&output_dir, &records, &result, config)?;
    spinner.finish_and_clear();

    print_summary(
        "Hierarchy Clustering Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Labels CSV", labels_path.display().to_string()),
            ("Summary CSV", summary_path.display().to_string()),
            ("Records processed", records.len().to_string()),
            ("Clusters found", result.cluster_count().to_string()),
            ("Noise points", result.noise_count().to_string()),
            ("min_points", params.min_points.to_string()),
            ("min_cluster_size", params.effective_min_cluster_size().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_summary(input: &Path) -> anyhow::Result<()> {
    let start = Instant::now();

    let spinner = create_spinner("Loading records...");
    let records = loaders::load_records(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    spinner.finish_and_clear();

    let total = records.len();
    let valid = records
        .iter()
        .filter(|r| r.has_valid_coordinates())
        .count();
    let incidents: BTreeSet<&str> = records
        .iter()
        .map(|r| r.incident_name.as_str())
        .filter(|s| !s.is_empty())
        .collect();
    let counties: BTreeSet<&str> = records
        .iter()
        .map(|r| r.county.as_str())
        .filter(|s| !s.is_empty())
        .collect();

    print_summary(
        "Dataset Summary",
        &[
            ("Input file", input.display().to_string()),
            ("Total records", total.to_string()),
            ("Valid coordinates", valid.to_string()),
            ("Invalid coordinates", (total - valid).to_string()),
            ("Incidents", incidents.len().to_string()),
            ("Counties", counties.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_plot(
    input: &Path,
    output: Option<PathBuf>,
    epsilon_km: Option<f64>,
    min_points: Option<usize>,
    config: &PipelineConfig,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let params = effective_params(epsilon_km, min_points, None, config);

    // Default output path: same name as input with .png extension
    let output_path = output.unwrap_or_else(|| {
        let mut path = input.to_path_buf();
        path.set_extension("png");
        path
    });

    let spinner = create_spinner("Loading records...");
    let records = load_valid_records(input)?;
    spinner.set_message(format!("Clustering {} records...", records.len()));

    let result = DbscanEngine::new(&records, params)?.run()?;

    spinner.set_message("Rendering plot...");
    visualization::plot_labeled_records(
        &output_path,
        &records,
        &result.labels,
        config.plot.width,
        config.plot.height,
        config.plot.marker_size,
    )
    .context("failed to render plot")?;
    spinner.finish_and_clear();

    print_summary(
        "Plot Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Output PNG", output_path.display().to_string()),
            ("Records plotted", records.len().to_string()),
            ("Clusters found", result.cluster_count().to_string()),
            ("Noise points", result.noise_count().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_cluster_command() {
        let cli = Cli::try_parse_from([
            "wildfire-pipeline",
            "cluster",
            "records.csv",
            "--epsilon-km",
            "0.5",
            "--min-points",
            "6",
        ])
        .unwrap();
        match cli.command {
            Commands::Cluster {
                epsilon_km,
                min_points,
                linear,
                ..
            } => {
                assert_eq!(epsilon_km, Some(0.5));
                assert_eq!(min_points, Some(6));
                assert!(!linear);
            }
            _ => panic!("expected cluster command"),
        }
    }

    #[test]
    fn test_summary_box_truncates_multibyte_values() {
        // A long non-ASCII path must truncate without slicing through a
        // character boundary.
        // The leading ASCII byte puts every accent on an odd byte offset,
        // so a byte-indexed cut at 36 would land inside a character.
        let long_accented = format!("a{}", "é".repeat(50));
        print_summary(
            "Test",
            &[
                ("Input file", long_accented),
                ("Short", "ok".to_string()),
            ],
        );
    }

    #[test]
    fn test_cli_overrides_fall_back_to_config() {
        let config = PipelineConfig::default();
        let params = effective_params(None, Some(9), None, &config);
        assert_eq!(params.epsilon_km, config.clustering.epsilon_km);
        assert_eq!(params.min_points, 9);
        assert_eq!(params.min_cluster_size, None);
    }
}
