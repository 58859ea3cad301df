//! Left spatial join of a record layer onto indexed targets.

use std::collections::{BTreeMap, BTreeSet};

use geo::{Geometry, Intersects, Relate};
use serde_json::Value;
use spatial_helper_grid_models::Grid;
use spatial_helper_layer_models::{Feature, Layer};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::{JoinError, TargetIndex};

/// Spatial relationship a record must have with a target to match it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum JoinPredicate {
    /// The record is covered by the target. A point on the target's boundary
    /// is covered, so a point on an edge shared by two cells matches both.
    #[default]
    Within,
    /// The record and target share at least one point.
    Intersects,
}

impl JoinPredicate {
    /// Evaluates the predicate for one record/target pair.
    #[must_use]
    pub fn matches(self, record: &Geometry<f64>, target: &Geometry<f64>) -> bool {
        match self {
            Self::Within => match record {
                Geometry::Point(p) => target.intersects(p),
                Geometry::MultiPoint(mp) => mp.iter().all(|p| target.intersects(p)),
                _ => record.relate(target).is_coveredby(),
            },
            Self::Intersects => record.intersects(target),
        }
    }
}

/// One row of a join: a source record and the target it matched, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRow {
    /// Index of the record in the source layer.
    pub source: usize,
    /// Identifier of the matched target; `None` when nothing matched.
    pub target: Option<String>,
}

/// Rows of a left spatial join, ordered by source index.
///
/// Before [`JoinResult::fair_assign`] a source may appear on several rows,
/// one per matched target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    pub(crate) rows: Vec<JoinRow>,
    pub(crate) sources: usize,
}

impl JoinResult {
    /// Join rows in source order.
    #[must_use]
    pub fn rows(&self) -> &[JoinRow] {
        &self.rows
    }

    /// Number of records in the source layer.
    #[must_use]
    pub const fn source_count(&self) -> usize {
        self.sources
    }

    /// Rows that matched a target, as `(source, target)` pairs.
    pub fn matched(&self) -> impl Iterator<Item = (usize, &str)> {
        self.rows
            .iter()
            .filter_map(|row| row.target.as_deref().map(|t| (row.source, t)))
    }

    /// Number of matched rows per target identifier.
    #[must_use]
    pub fn counts_by_target(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for (_, target) in self.matched() {
            *counts.entry(target).or_insert(0) += 1;
        }
        counts
    }

    /// Matched targets per source record.
    #[must_use]
    pub fn targets_by_source(&self) -> BTreeMap<usize, Vec<&str>> {
        let mut targets: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (source, target) in self.matched() {
            targets.entry(source).or_default().push(target);
        }
        targets
    }
}

/// Left-joins `records` onto `targets`.
///
/// Every record yields one row per matched target, or a single row with
/// no target. Rows that repeat an earlier row exactly (same geometry,
/// same attributes, same target) are dropped.
///
/// # Errors
///
/// Returns [`JoinError::CrsMismatch`] unless both sides declare the same
/// reference system.
pub fn sjoin(
    records: &Layer,
    targets: &TargetIndex,
    predicate: JoinPredicate,
) -> Result<JoinResult, JoinError> {
    if records.crs.is_none() || records.crs != targets.crs() {
        return Err(JoinError::CrsMismatch {
            records: records.crs,
            targets: targets.crs(),
        });
    }

    let mut seen: BTreeSet<(String, Option<String>)> = BTreeSet::new();
    let mut rows = Vec::with_capacity(records.len());
    let mut unmatched = 0_usize;
    let mut duplicates = 0_usize;

    for (source, feature) in records.features.iter().enumerate() {
        let fingerprint = fingerprint(feature);
        let hits = targets.candidates(&feature.geometry, predicate);

        let matched: Vec<Option<String>> = if hits.is_empty() {
            unmatched += 1;
            vec![None]
        } else {
            hits.into_iter().map(|t| Some(t.to_string())).collect()
        };

        for target in matched {
            if seen.insert((fingerprint.clone(), target.clone())) {
                rows.push(JoinRow { source, target });
            } else {
                duplicates += 1;
            }
        }
    }

    log::info!(
        "Joined {} records onto {} targets ({predicate}): {} rows, {unmatched} unmatched, {duplicates} duplicate rows dropped",
        records.len(),
        targets.len(),
        rows.len()
    );

    Ok(JoinResult {
        rows,
        sources: records.len(),
    })
}

/// Joins `records` onto the cells of `grid`.
///
/// # Errors
///
/// See [`sjoin`].
pub fn join_to_grid(
    records: &Layer,
    grid: &Grid,
    predicate: JoinPredicate,
) -> Result<JoinResult, JoinError> {
    sjoin(records, &TargetIndex::from_grid(grid), predicate)
}

/// Content key of a record: geometry plus every attribute.
fn fingerprint(feature: &Feature) -> String {
    format!(
        "{:?}|{}",
        feature.geometry,
        Value::Object(feature.properties.clone())
    )
}
