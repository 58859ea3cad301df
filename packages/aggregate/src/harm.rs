//! Crime harm weighting of per-cell counts.

use std::collections::BTreeMap;
use std::io::Read;

use serde::Deserialize;
use spatial_helper_aggregate_models::{CCHI_SCORE, HarmLookup};
use spatial_helper_grid_models::Grid;
use spatial_helper_layer_models::Layer;

use crate::AggregateError;
use crate::hours::as_f64;
use crate::stats::cell_counts;

#[derive(Debug, Deserialize)]
struct HarmRow {
    cris_minor: String,
    #[serde(rename = "CrimeHarm")]
    crime_harm: f64,
}

/// Reads a harm lookup from CSV with `cris_minor` and `CrimeHarm` columns.
///
/// Other columns are ignored. A repeated classification keeps its last
/// weight.
///
/// # Errors
///
/// Returns an error if the CSV lacks either column or a weight is not a
/// number.
pub fn read_harm_lookup<R: Read>(reader: R) -> Result<HarmLookup, AggregateError> {
    let mut csv = csv::Reader::from_reader(reader);
    let mut lookup = HarmLookup::new();
    for row in csv.deserialize() {
        let row: HarmRow = row?;
        lookup.insert(row.cris_minor, row.crime_harm);
    }
    log::debug!("Loaded {} harm weights", lookup.len());
    Ok(lookup)
}

/// Scores each cell as its record count times the harm weight of
/// `minor_class`, in a `CCHI_score` column.
///
/// # Errors
///
/// * [`AggregateError::InvalidParameter`] if `minor_class` is not in the
///   lookup.
/// * [`AggregateError::Join`] if `records` is not in the grid's CRS.
pub fn harm_score(
    grid: &Grid,
    records: &Layer,
    lookup: &HarmLookup,
    minor_class: &str,
    seed: u64,
) -> Result<Grid, AggregateError> {
    let weight = lookup
        .weight(minor_class)
        .ok_or_else(|| AggregateError::InvalidParameter {
            message: format!("no harm weight for classification {minor_class:?}"),
        })?;

    let values: BTreeMap<String, Vec<f64>> = cell_counts(grid, records, seed)?
        .into_iter()
        .map(|(cell, n)| (cell, vec![as_f64(n) * weight]))
        .collect();

    let total: f64 = values.values().flatten().sum();
    log::info!("Total harm score for {minor_class}: {total}");

    Ok(grid.merge_stats(&[CCHI_SCORE.to_string()], &values))
}
