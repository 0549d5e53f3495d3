//! Scatter plot rendering of labeled points.
//!
//! This module renders a clustering result as a 2D scatter plot
//! (longitude vs latitude) colored by cluster, using the plotters
//! library with a bitmap backend.

use std::path::Path;

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::core::records::{Label, SpatialRecord};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No points to plot")]
    NoPoints,

    #[error("Record count {records} does not match label count {labels}")]
    LengthMismatch { records: usize, labels: usize },
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Color palette for cluster visualization.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (228, 26, 28),   // Red
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (255, 255, 51),  // Yellow
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
    (50, 205, 50),   // Lime Green
    (255, 20, 147),  // Deep Pink
    (0, 191, 255),   // Deep Sky Blue
    (255, 215, 0),   // Gold
];

/// Noise color (gray) for unclustered points.
const NOISE_COLOR: (u8, u8, u8) = (128, 128, 128);

fn color_for(label: Label) -> RGBColor {
    match label.cluster_id() {
        Some(id) => {
            let c = CLUSTER_COLORS[(id as usize - 1) % CLUSTER_COLORS.len()];
            RGBColor(c.0, c.1, c.2)
        }
        None => RGBColor(NOISE_COLOR.0, NOISE_COLOR.1, NOISE_COLOR.2),
    }
}

/// Plot labeled records as a lon/lat scatter and save as PNG.
///
/// Noise points are drawn first in gray so cluster colors sit on top.
///
/// # Arguments
///
/// * `output_path` - Path to save the PNG image
/// * `records` - The records to plot
/// * `labels` - Final label per record, parallel to `records`
/// * `width`, `height` - Image dimensions in pixels
/// * `marker_size` - Marker radius in pixels
pub fn plot_labeled_records<R: SpatialRecord>(
    output_path: &Path,
    records: &[R],
    labels: &[Label],
    width: u32,
    height: u32,
    marker_size: u32,
) -> Result<()> {
    if records.is_empty() {
        return Err(VisualizationError::NoPoints);
    }
    if records.len() != labels.len() {
        return Err(VisualizationError::LengthMismatch {
            records: records.len(),
            labels: labels.len(),
        });
    }

    let mut points: Vec<(f64, f64, RGBColor)> = Vec::with_capacity(records.len());
    for (record, label) in records.iter().zip(labels) {
        let p = record.point();
        if !p.is_finite() {
            continue;
        }
        points.push((p.lon, p.lat, color_for(*label)));
    }
    if points.is_empty() {
        return Err(VisualizationError::NoPoints);
    }
    // Gray noise underneath, clusters on top.
    points.sort_by_key(|(_, _, c)| *c != RGBColor(NOISE_COLOR.0, NOISE_COLOR.1, NOISE_COLOR.2));

    let (x_min, x_max, y_min, y_max) = compute_bounds(&points);
    let x_padding = (x_max - x_min) * 0.05;
    let y_padding = (y_max - y_min) * 0.05;

    let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();

    root.fill(&WHITE)
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .build_cartesian_2d(
            (x_min - x_padding)..(x_max + x_padding),
            (y_min - y_padding)..(y_max + y_padding),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .draw()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    chart
        .draw_series(
            points
                .iter()
                .map(|(x, y, color)| Circle::new((*x, *y), marker_size as i32, color.filled())),
        )
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    root.present()
        .map_err(|e| VisualizationError::PlottingError(e.to_string()))?;

    Ok(())
}

/// Compute the bounds (min/max) for x and y coordinates.
fn compute_bounds(points: &[(f64, f64, RGBColor)]) -> (f64, f64, f64, f64) {
    let mut x_min = f64::MAX;
    let mut x_max = f64::MIN;
    let mut y_min = f64::MAX;
    let mut y_max = f64::MIN;

    for (x, y, _) in points {
        if *x < x_min { x_min = *x; }
        if *x > x_max { x_max = *x; }
        if *y < y_min { y_min = *y; }
        if *y > y_max { y_max = *y; }
    }

    if (x_max - x_min).abs() < f64::EPSILON {
        x_min -= 0.01;
        x_max += 0.01;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_min -= 0.01;
        y_max += 0.01;
    }

    (x_min, x_max, y_min, y_max)
}
