//! Core data types and file I/O.

pub mod loaders;
pub mod records;
pub mod writers;

// Re-export key types for convenience
pub use loaders::{load_records, valid_records, LoaderError};
pub use records::{FireRecord, GeoPoint, Label, SpatialRecord};
pub use writers::{write_cluster_summary_csv, write_labels_csv, WriteError};
