#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! H3 hexagonal grid construction and grid table export.
//!
//! [`builder::GridBuilder`] tessellates a boundary (or a buffered point)
//! with H3 cells. H3 only understands WGS84, so regions in a projected CRS
//! are buffered in metres first, reprojected for tiling, and the resulting
//! cell polygons are reprojected back. [`export`] writes grid tables as CSV.

pub mod builder;
pub mod export;

use spatial_helper_grid_models::DuplicateCellError;
use spatial_helper_layer::LayerError;
use spatial_helper_layer_models::InvalidCoordinateSystemError;
use thiserror::Error;

/// Errors that can occur while building, loading or exporting grids.
#[derive(Debug, Error)]
pub enum GridError {
    /// A configuration value was not recognised or out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the rejected value.
        message: String,
    },

    /// The region could not be tiled by H3.
    #[error("Invalid region geometry: {0}")]
    InvalidGeometry(#[from] h3o::error::InvalidGeometry),

    /// A coordinate was outside the valid latitude/longitude range.
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] h3o::error::InvalidLatLng),

    /// A grid file contained an unusable row.
    #[error("Invalid grid row {row}: {message}")]
    InvalidRow {
        /// Zero-based feature index.
        row: usize,
        /// What was wrong with it.
        message: String,
    },

    /// Two cells shared an identifier.
    #[error("Duplicate cell: {0}")]
    DuplicateCell(#[from] DuplicateCellError),

    /// Layer loading or normalization failed.
    #[error(transparent)]
    Layer(#[from] LayerError),

    /// CSV writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File write failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<InvalidCoordinateSystemError> for GridError {
    fn from(value: InvalidCoordinateSystemError) -> Self {
        Self::InvalidParameter {
            message: value.to_string(),
        }
    }
}
