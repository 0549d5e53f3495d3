//! CSV loader for wildfire damage inspection records.
//!
//! The source files are CAL FIRE damage inspection exports: wide CSVs
//! whose column set drifts between vintages. Columns are therefore looked
//! up by name (case-insensitive, tolerating the `* ` prefix some exports
//! put on required fields) instead of by position. Rows with unparsable
//! coordinates are kept but flagged, so the caller decides whether to
//! drop them before clustering.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::{debug, warn};
use thiserror::Error;

use crate::core::records::{FireRecord, GeoPoint};

/// Errors that can occur while loading record files.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Finds a header column matching any of the candidate names.
///
/// Headers are compared lowercased and trimmed, with a leading `* `
/// (the export's required-field marker) stripped first.
fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let name = h.trim().trim_start_matches("* ").to_lowercase();
        candidates.iter().any(|c| name == *c)
    })
}

fn field(row: &csv::StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| row.get(i))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Loads all records from a damage inspection CSV.
///
/// The `latitude` and `longitude` columns are required; every metadata
/// column is optional and defaults to empty. Coordinate parse failures
/// set the record's validity flags rather than dropping the row.
///
/// # Errors
///
/// Returns an error if the file cannot be read, has no header row, or
/// lacks the coordinate columns.
pub fn load_records(path: &Path) -> Result<Vec<FireRecord>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let lat_col = find_column(&headers, &["latitude", "lat"]);
    let lon_col = find_column(&headers, &["longitude", "lon", "lng"]);
    match (lat_col, lon_col) {
        (Some(_), Some(_)) => {}
        _ => {
            return Err(LoaderError::MissingColumns(
                "latitude and longitude".to_string(),
            ))
        }
    }

    let id_col = find_column(&headers, &["objectid", "id"]);
    let damage_col = find_column(&headers, &["damage"]);
    let street_number_col = find_column(&headers, &["street number"]);
    let street_name_col = find_column(&headers, &["street name"]);
    let city_col = find_column(&headers, &["city"]);
    let county_col = find_column(&headers, &["county"]);
    let incident_name_col = find_column(&headers, &["incident name"]);
    let incident_number_col = find_column(&headers, &["incident number"]);
    let structure_type_col = find_column(&headers, &["structure type"]);
    let structure_category_col = find_column(&headers, &["structure category"]);
    let year_built_col = find_column(&headers, &["year built (parcel)", "year built"]);

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("{}: skipping malformed row {}: {}", path.display(), line + 2, e);
                continue;
            }
        };

        let mut record = FireRecord {
            id: field(&row, id_col),
            damage: field(&row, damage_col),
            street_number: field(&row, street_number_col),
            street_name: field(&row, street_name_col),
            city: field(&row, city_col),
            county: field(&row, county_col),
            incident_name: field(&row, incident_name_col),
            incident_number: field(&row, incident_number_col),
            structure_type: field(&row, structure_type_col),
            structure_category: field(&row, structure_category_col),
            year_built: field(&row, year_built_col),
            point: GeoPoint::new(0.0, 0.0),
            lat_missing: false,
            lon_missing: false,
        };

        match field(&row, lat_col).parse::<f64>() {
            Ok(lat) => record.point.lat = lat,
            Err(_) => record.lat_missing = true,
        }
        match field(&row, lon_col).parse::<f64>() {
            Ok(lon) => record.point.lon = lon,
            Err(_) => record.lon_missing = true,
        }

        if record.lat_missing || record.lon_missing {
            debug!(
                "{}: row {} has missing coordinates",
                path.display(),
                line + 2
            );
        }

        records.push(record);
    }

    if records.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(records)
}

/// Keeps only records with present, parseable, finite coordinates.
///
/// This is the pre-filter the clustering engines expect their input to
/// have gone through.
pub fn valid_records(records: Vec<FireRecord>) -> Vec<FireRecord> {
    let total = records.len();
    let valid: Vec<FireRecord> = records
        .into_iter()
        .filter(FireRecord::has_valid_coordinates)
        .collect();
    if valid.len() < total {
        warn!(
            "dropped {} of {} records with missing or invalid coordinates",
            total - valid.len(),
            total
        );
    }
    valid
}
