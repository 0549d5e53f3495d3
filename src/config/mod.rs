//! Configuration types for the wildfire clustering pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::processors::ClusterParams;

/// Configuration for the clustering engines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius in kilometers
    #[serde(default = "default_epsilon_km")]
    pub epsilon_km: f64,

    /// Minimum neighbors (excluding the point itself) for a core point
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Minimum members for a cluster to survive; defaults to min_points
    #[serde(default)]
    pub min_cluster_size: Option<usize>,

    /// Use the KD-tree index instead of the linear scan
    #[serde(default = "default_use_spatial_index")]
    pub use_spatial_index: bool,
}

fn default_epsilon_km() -> f64 {
    1.0
}

fn default_min_points() -> usize {
    4
}

fn default_use_spatial_index() -> bool {
    true
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            epsilon_km: default_epsilon_km(),
            min_points: default_min_points(),
            min_cluster_size: None,
            use_spatial_index: default_use_spatial_index(),
        }
    }
}

impl ClusteringConfig {
    /// Converts the config section into engine parameters.
    pub fn params(&self) -> ClusterParams {
        ClusterParams {
            epsilon_km: self.epsilon_km,
            min_points: self.min_points,
            min_cluster_size: self.min_cluster_size,
        }
    }
}

/// Configuration for file output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory result files are written into
    #[serde(default = "default_output_dir")]
    pub directory: String,

    /// File name for the per-point labels CSV
    #[serde(default = "default_labels_file")]
    pub labels_file: String,

    /// File name for the cluster summary CSV
    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_labels_file() -> String {
    "labels.csv".to_string()
}

fn default_summary_file() -> String {
    "clusters.csv".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            labels_file: default_labels_file(),
            summary_file: default_summary_file(),
        }
    }
}

/// Configuration for plot rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    /// Plot width in pixels
    #[serde(default = "default_plot_width")]
    pub width: u32,

    /// Plot height in pixels
    #[serde(default = "default_plot_height")]
    pub height: u32,

    /// Marker radius in pixels
    #[serde(default = "default_marker_size")]
    pub marker_size: u32,
}

fn default_plot_width() -> u32 {
    1600
}

fn default_plot_height() -> u32 {
    1200
}

fn default_marker_size() -> u32 {
    2
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
            marker_size: default_marker_size(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_clustering_config() {
        let config = ClusteringConfig::default();
        assert_eq!(config.epsilon_km, 1.0);
        assert_eq!(config.min_points, 4);
        assert_eq!(config.min_cluster_size, None);
        assert!(config.use_spatial_index);
    }

    #[test]
    fn test_params_conversion() {
        let config = ClusteringConfig {
            epsilon_km: 0.5,
            min_points: 6,
            min_cluster_size: Some(10),
            use_spatial_index: false,
        };
        let params = config.params();
        assert_eq!(params.epsilon_km, 0.5);
        assert_eq!(params.min_points, 6);
        assert_eq!(params.effective_min_cluster_size(), 10);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("clustering:\n  epsilon_km: 2.5\n").unwrap();
        assert_eq!(config.clustering.epsilon_km, 2.5);
        assert_eq!(config.clustering.min_points, 4);
        assert_eq!(config.output.directory, "output");
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");

        let config = PipelineConfig::default();
        config.to_yaml(&path).unwrap();
        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.clustering.min_points, config.clustering.min_points);
        assert_eq!(loaded.plot.width, config.plot.width);
    }
}
