//! Experiment metadata files written next to the images.
//!
//! - `acquisition_parameters.json` at the experiment root
//! - `coordinates.csv` at the experiment root (planned FOVs)
//! - `coordinates.csv` in each timepoint directory (positions actually visited)
//! - an empty `.done` in each timepoint directory whose scan completed

use crate::error::StorageResult;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "acquisition_parameters.json";
/// Coordinates file name.
pub const COORDINATES_FILE: &str = "coordinates.csv";
/// Marker left in a timepoint directory once its scan completed.
pub const DONE_MARKER: &str = ".done";

/// One planned FOV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedCoordinate {
    /// Region name
    pub region: String,
    /// X in mm
    #[serde(rename = "x (mm)")]
    pub x_mm: f64,
    /// Y in mm
    #[serde(rename = "y (mm)")]
    pub y_mm: f64,
    /// Planned Z in mm, if any
    #[serde(rename = "z (mm)")]
    pub z_mm: Option<f64>,
}

/// One visited (FOV, z-level) position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcquiredCoordinate {
    /// Region name
    pub region: String,
    /// FOV index in region
    pub fov: usize,
    /// Z-level index
    pub z_level: usize,
    /// Stage X in mm
    #[serde(rename = "x (mm)")]
    pub x_mm: f64,
    /// Stage Y in mm
    #[serde(rename = "y (mm)")]
    pub y_mm: f64,
    /// Stage Z in µm
    #[serde(rename = "z (um)")]
    pub z_um: f64,
    /// Local capture time
    pub time: String,
    /// Piezo position in µm, when a piezo is used
    #[serde(rename = "z_piezo (um)")]
    pub z_piezo_um: Option<f64>,
}

/// Serialize `value` as pretty JSON to `{dir}/acquisition_parameters.json`.
pub fn write_manifest<T: Serialize>(dir: &Path, value: &T) -> StorageResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(MANIFEST_FILE);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, value)?;
    tracing::debug!(path = ?path, "Wrote acquisition manifest");
    Ok(path)
}

/// Write `rows` as `{dir}/coordinates.csv` with a header.
pub fn write_coordinates<R: Serialize>(dir: &Path, rows: &[R]) -> StorageResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(COORDINATES_FILE);
    let mut writer = csv::Writer::from_path(&path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    tracing::debug!(path = ?path, rows = rows.len(), "Wrote coordinates");
    Ok(path)
}

/// Create the empty `{dir}/.done` marker.
pub fn write_done_marker(dir: &Path) -> StorageResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(DONE_MARKER);
    File::create(&path)?;
    tracing::debug!(path = ?path, "Timepoint marked done");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_coordinates_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            AcquiredCoordinate {
                region: "A1".into(),
                fov: 0,
                z_level: 0,
                x_mm: 1.5,
                y_mm: 2.5,
                z_um: 1000.0,
                time: "2026-01-01_00-00-00.000000".into(),
                z_piezo_um: None,
            },
            AcquiredCoordinate {
                region: "A1".into(),
                fov: 1,
                z_level: 0,
                x_mm: 3.5,
                y_mm: 2.5,
                z_um: 1000.0,
                time: "2026-01-01_00-00-01.000000".into(),
                z_piezo_um: Some(150.0),
            },
        ];
        let path = write_coordinates(dir.path(), &rows).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("region,fov,z_level,x (mm),y (mm),z (um),time,z_piezo (um)")
        );
        assert_eq!(
            lines.next(),
            Some("A1,0,0,1.5,2.5,1000.0,2026-01-01_00-00-00.000000,")
        );
        assert_eq!(lines.count(), 1);
    }

    #[test]
    fn test_manifest_is_json() {
        let dir = TempDir::new().unwrap();
        let path = write_manifest(dir.path(), &serde_json::json!({"Nz": 3})).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["Nz"], 3);
    }

    #[test]
    fn test_done_marker_is_empty_file() {
        let dir = TempDir::new().unwrap();
        let timepoint = dir.path().join("002");
        let path = write_done_marker(&timepoint).unwrap();
        assert_eq!(path, timepoint.join(DONE_MARKER));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }
}
