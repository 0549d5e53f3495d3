//! Density-based clustering pipeline for geolocated wildfire records.
//!
//! This crate provides tools for:
//! - Loading damage inspection CSVs with coordinate validation
//! - DBSCAN clustering over haversine distance (KD-indexed or naive)
//! - Hierarchical density clustering (mutual-reachability MST + stability)
//! - Exporting labeled records and cluster summaries as CSV
//! - Rendering labeled scatter plots as PNG
//!
//! # Example
//!
//! ```no_run
//! use wildfire_pipeline::core::records::GeoPoint;
//! use wildfire_pipeline::processors::{ClusterParams, DbscanEngine};
//!
//! let points = vec![
//!     GeoPoint::new(39.7596, -121.6219),
//!     GeoPoint::new(39.7601, -121.6225),
//!     GeoPoint::new(39.7598, -121.6221),
//! ];
//! let params = ClusterParams::new(0.5, 2);
//! let result = DbscanEngine::new(&points, params).unwrap().run().unwrap();
//! println!("{} clusters, {} noise", result.cluster_count(), result.noise_count());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{ClusteringConfig, OutputConfig, PipelineConfig, PlotConfig};
pub use core::records::{FireRecord, GeoPoint, Label, SpatialRecord};
pub use processors::{ClusterParams, ClusterSink, ClusteringError, ClusteringResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
