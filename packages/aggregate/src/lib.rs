#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-cell statistics over records joined onto a grid.
//!
//! Every function returns a new grid carrying every cell of the input
//! grid; cells no record fell into get zero in each new column. Records
//! are joined with the `within` predicate and fairly assigned, so a record
//! on a shared cell edge counts exactly once.

pub mod harm;
pub mod hours;
pub mod stats;

use std::path::Path;

use spatial_helper_aggregate_models::{AggregationConfig, ExclusionRule};
use spatial_helper_layer_models::Layer;
use spatial_helper_spatial::JoinError;
use thiserror::Error;

pub use harm::{harm_score, read_harm_lookup};
pub use stats::{
    HourAggregation, aggregate_categories, aggregate_hours, aggregate_joined, count_points,
};

/// Errors that can occur while aggregating.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// An expected record property is absent.
    #[error("Records have no {column:?} column")]
    SchemaMismatch {
        /// The missing column.
        column: String,
    },

    /// An hour could not be read from a timestamp.
    #[error("Record {row}: cannot read an hour from {value:?}")]
    InvalidHour {
        /// Zero-based record index.
        row: usize,
        /// The offending text.
        value: String,
    },

    /// A caller-supplied value was not usable.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the rejected value.
        message: String,
    },

    /// The spatial join failed.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// The configuration file was malformed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The harm lookup CSV was malformed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File read failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loads an aggregation configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<AggregationConfig, AggregateError> {
    let text = std::fs::read_to_string(path)?;
    let config = AggregationConfig::from_toml(&text)?;
    log::info!(
        "Loaded config from {}: {} categories, {} exclusion rules, {} harm weights",
        path.display(),
        config.categories.entries.len(),
        config.exclusions.len(),
        config.harm.len()
    );
    Ok(config)
}

/// Returns `records` without the features any rule matches.
#[must_use]
pub fn apply_exclusions(records: &Layer, rules: &[ExclusionRule]) -> Layer {
    let kept = records.filtered(|feature| !rules.iter().any(|rule| rule.matches(feature)));
    let dropped = records.len() - kept.len();
    if dropped > 0 {
        log::info!("Excluded {dropped} of {} records", records.len());
    }
    kept
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo::{Point, Polygon, polygon};
    use spatial_helper_grid_models::{Cell, Grid};
    use spatial_helper_layer_models::{Crs, Feature, Layer};

    fn hex(cx: f64, cy: f64) -> Polygon<f64> {
        polygon![
            (x: cx, y: cy + 2.0),
            (x: cx + 1.0, y: cy + 1.0),
            (x: cx + 1.0, y: cy - 1.0),
            (x: cx, y: cy - 2.0),
            (x: cx - 1.0, y: cy - 1.0),
            (x: cx - 1.0, y: cy + 1.0),
            (x: cx, y: cy + 2.0),
        ]
    }

    /// A center hexagon `c0` and its six neighbours `c1`..`c6`.
    pub fn seven_cells() -> Grid {
        let centers = [
            (0.0, 0.0),
            (2.0, 0.0),
            (-2.0, 0.0),
            (1.0, 3.0),
            (-1.0, 3.0),
            (1.0, -3.0),
            (-1.0, -3.0),
        ];
        let cells = centers
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Cell::new(format!("c{i}"), hex(x, y)))
            .collect();
        Grid::new(Crs::BritishNationalGrid, cells).unwrap()
    }

    /// A CAD incident at `(x, y)` logged at `time`.
    pub fn incident(n: usize, x: f64, y: f64, time: &str) -> Feature {
        Feature::new(Point::new(x, y))
            .with_property("IncidentNumber", format!("CAD-{n}"))
            .with_property("IncidentTime", time)
    }

    pub fn layer(features: Vec<Feature>) -> Layer {
        Layer::new(Some(Crs::BritishNationalGrid), features)
    }
}
