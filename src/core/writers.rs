//! CSV output for clustering results.

use std::fs;
use std::path::Path;

use csv::Writer;
use log::info;
use thiserror::Error;

use crate::core::records::{Label, SpatialRecord};
use crate::processors::ClusteringResult;

/// Errors that can occur while writing result files.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record count {records} does not match label count {labels}")]
    LengthMismatch { records: usize, labels: usize },
}

/// Result type for writer operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Label encoding used in output files: noise is `-1`, clusters keep
/// their positive id, unvisited points never reach a writer.
fn label_code(label: Label) -> i64 {
    match label {
        Label::Cluster(id) => i64::from(id),
        Label::Noise => -1,
        Label::Unvisited => -1,
    }
}

/// Writes one row per input record with its coordinates and final label.
///
/// # Errors
///
/// Fails if the record and label slices differ in length or the file
/// cannot be written.
pub fn write_labels_csv<R: SpatialRecord>(
    path: &Path,
    records: &[R],
    labels: &[Label],
) -> Result<()> {
    if records.len() != labels.len() {
        return Err(WriteError::LengthMismatch {
            records: records.len(),
            labels: labels.len(),
        });
    }
    ensure_parent_dir(path)?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["latitude", "longitude", "cluster"])?;
    for (record, label) in records.iter().zip(labels) {
        let point = record.point();
        writer.write_record([
            point.lat.to_string(),
            point.lon.to_string(),
            label_code(*label).to_string(),
        ])?;
    }
    writer.flush()?;

    info!("wrote {} labeled rows to {}", records.len(), path.display());
    Ok(())
}

/// Writes one row per cluster with its size and centroid.
///
/// Centroids are plain arithmetic means of the member coordinates, which
/// is adequate at the spatial extents fire clusters cover.
pub fn write_cluster_summary_csv<R: SpatialRecord>(
    path: &Path,
    result: &ClusteringResult<R>,
) -> Result<()> {
    ensure_parent_dir(path)?;

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["cluster", "size", "centroid_lat", "centroid_lon"])?;
    for (id, members) in &result.clusters {
        let n = members.len() as f64;
        let (lat_sum, lon_sum) = members.iter().fold((0.0, 0.0), |(la, lo), m| {
            let p = m.point();
            (la + p.lat, lo + p.lon)
        });
        writer.write_record([
            id.to_string(),
            members.len().to_string(),
            (lat_sum / n).to_string(),
            (lon_sum / n).to_string(),
        ])?;
    }
    writer.flush()?;

    info!(
        "wrote summary of {} clusters to {}",
        result.clusters.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::GeoPoint;
    use crate::processors::group_records;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_write_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");

        let points = vec![GeoPoint::new(39.75, -121.62), GeoPoint::new(40.0, -122.0)];
        let labels = vec![Label::Cluster(1), Label::Noise];
        write_labels_csv(&path, &points, &labels).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("latitude,longitude,cluster"));
        assert_eq!(lines.next(), Some("39.75,-121.62,1"));
        assert_eq!(lines.next(), Some("40,-122,-1"));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.csv");

        let points = vec![GeoPoint::new(0.0, 0.0)];
        let labels: Vec<Label> = vec![];
        let result = write_labels_csv(&path, &points, &labels);
        assert!(matches!(result, Err(WriteError::LengthMismatch { .. })));
    }

    #[test]
    fn test_write_summary_with_centroids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("summary.csv");

        let points = vec![
            GeoPoint::new(10.0, 20.0),
            GeoPoint::new(12.0, 22.0),
            GeoPoint::new(50.0, 60.0),
        ];
        let labels = vec![Label::Cluster(1), Label::Cluster(1), Label::Noise];
        let result = group_records(&points, labels);
        write_cluster_summary_csv(&path, &result).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next(),
            Some("cluster,size,centroid_lat,centroid_lon")
        );
        assert_eq!(lines.next(), Some("1,2,11,21"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("labels.csv");

        let points = vec![GeoPoint::new(1.0, 2.0)];
        let labels = vec![Label::Cluster(1)];
        write_labels_csv(&path, &points, &labels).unwrap();
        assert!(path.exists());
    }
}
