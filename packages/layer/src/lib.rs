#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate transforms, CRS normalization and `GeoJSON` layer I/O.
//!
//! Every geometric comparison in the toolchain requires both operands to be
//! in one reference system. [`normalize`] makes that explicit: a layer with
//! a *different* declared CRS is reprojected, a layer with *no* declared CRS
//! is merely labelled. Mixing those two up silently shifts data by hundreds
//! of kilometres, so the distinction is kept in separate functions.

pub mod io;
pub mod normalize;
pub mod reproject;

use spatial_helper_layer_models::{InvalidCoordinateSystemError, UnsupportedCrsError};
use thiserror::Error;

/// Errors that can occur while loading, writing or normalizing layers.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A configuration value was not recognised.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the rejected value.
        message: String,
    },

    /// An operation needed a declared CRS and the layer had none.
    #[error("Layer has no declared CRS: {context}")]
    UndeclaredCrs {
        /// What was being attempted.
        context: String,
    },

    /// A coordinate or reference system definition could not be
    /// transformed.
    #[error("Projection error: {message}")]
    Projection {
        /// What failed.
        message: String,
    },

    /// File read or write failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing or conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<geojson::Error> for LayerError {
    fn from(value: geojson::Error) -> Self {
        Self::GeoJson(Box::new(value))
    }
}

impl From<UnsupportedCrsError> for LayerError {
    fn from(value: UnsupportedCrsError) -> Self {
        Self::InvalidParameter {
            message: value.to_string(),
        }
    }
}

impl From<InvalidCoordinateSystemError> for LayerError {
    fn from(value: InvalidCoordinateSystemError) -> Self {
        Self::InvalidParameter {
            message: value.to_string(),
        }
    }
}
