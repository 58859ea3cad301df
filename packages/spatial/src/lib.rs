#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial join of records onto grid cells or boundary polygons.
//!
//! Targets are bulk-loaded into an R-tree of bounding boxes; each record
//! queries the tree with its own envelope and candidates are refined with
//! an exact predicate. A record lying on a shared edge matches every cell
//! it touches, so [`JoinResult::fair_assign`] resolves such records to one
//! target with a seeded shuffle before anything is counted.

pub mod assign;
pub mod join;

pub use assign::{DEFAULT_SEED, overlap_to_grid};
pub use join::{JoinPredicate, JoinResult, JoinRow, join_to_grid, sjoin};

use geo::{BoundingRect, Geometry};
use rstar::{AABB, RTree, RTreeObject};
use spatial_helper_grid_models::Grid;
use spatial_helper_layer_models::{Crs, Layer};
use thiserror::Error;

/// Errors that can occur while joining.
#[derive(Debug, Error)]
pub enum JoinError {
    /// Records and targets are not in the same declared reference system.
    #[error(
        "CRS mismatch: records are {}, targets are {}; normalize the layers first",
        describe(.records),
        describe(.targets)
    )]
    CrsMismatch {
        /// Reference system of the records.
        records: Option<Crs>,
        /// Reference system of the targets.
        targets: Option<Crs>,
    },

    /// A target feature lacks the identifier column.
    #[error("Target feature {row} has no identifier column {column:?}")]
    SchemaMismatch {
        /// The expected column.
        column: String,
        /// Zero-based feature index.
        row: usize,
    },
}

#[allow(clippy::ref_option)]
fn describe(crs: &Option<Crs>) -> String {
    crs.map_or_else(|| "undeclared".to_string(), |c| c.to_string())
}

/// A join target stored in the R-tree with its identifier.
struct TargetEntry {
    id: String,
    order: usize,
    envelope: AABB<[f64; 2]>,
    geometry: Geometry<f64>,
}

impl RTreeObject for TargetEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree index over join targets (grid cells or boundary polygons).
pub struct TargetIndex {
    crs: Option<Crs>,
    tree: RTree<TargetEntry>,
}

impl TargetIndex {
    /// Indexes every cell of a grid under its identifier.
    #[must_use]
    pub fn from_grid(grid: &Grid) -> Self {
        let entries = grid
            .cells()
            .iter()
            .enumerate()
            .map(|(order, cell)| {
                let geometry = Geometry::Polygon(cell.geometry.clone());
                TargetEntry {
                    id: cell.h3_ref.clone(),
                    order,
                    envelope: compute_envelope(&geometry).unwrap_or_else(empty_envelope),
                    geometry,
                }
            })
            .collect();

        Self::bulk_load(Some(grid.crs()), entries)
    }

    /// Indexes every feature of a boundary layer under `id_column`.
    ///
    /// Features with empty geometries are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::SchemaMismatch`] if a feature lacks `id_column`.
    pub fn from_layer(layer: &Layer, id_column: &str) -> Result<Self, JoinError> {
        let mut entries = Vec::with_capacity(layer.len());

        for (order, feature) in layer.features.iter().enumerate() {
            let id = feature
                .property_text(id_column)
                .ok_or_else(|| JoinError::SchemaMismatch {
                    column: id_column.to_string(),
                    row: order,
                })?;

            let Some(envelope) = compute_envelope(&feature.geometry) else {
                log::warn!("Skipping boundary {id} with empty geometry");
                continue;
            };

            entries.push(TargetEntry {
                id,
                order,
                envelope,
                geometry: feature.geometry.clone(),
            });
        }

        Ok(Self::bulk_load(layer.crs, entries))
    }

    fn bulk_load(crs: Option<Crs>, entries: Vec<TargetEntry>) -> Self {
        let tree = RTree::bulk_load(entries);
        log::debug!("Indexed {} join targets", tree.size());
        Self { crs, tree }
    }

    /// Declared reference system of the targets.
    #[must_use]
    pub const fn crs(&self) -> Option<Crs> {
        self.crs
    }

    /// Number of indexed targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether no targets are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Identifiers of every target `record` matches, in target order.
    #[must_use]
    pub fn candidates(&self, record: &Geometry<f64>, predicate: JoinPredicate) -> Vec<&str> {
        let Some(query_env) = compute_envelope(record) else {
            return vec![];
        };

        let mut hits: Vec<&TargetEntry> = self
            .tree
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| predicate.matches(record, &entry.geometry))
            .collect();
        hits.sort_by_key(|entry| entry.order);

        hits.into_iter().map(|entry| entry.id.as_str()).collect()
    }
}

/// Compute the bounding box envelope of a geometry, `None` when empty.
fn compute_envelope(geometry: &Geometry<f64>) -> Option<AABB<[f64; 2]>> {
    geometry
        .bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

fn empty_envelope() -> AABB<[f64; 2]> {
    AABB::from_point([0.0, 0.0])
}


#[cfg(test)]
mod tests {
    use geo::Point;
    use spatial_helper_layer_models::Feature;

    use super::fixtures::{hex, seven_cells};
    use super::*;

    #[test]
    fn edge_point_hits_both_neighbours() {
        let index = TargetIndex::from_grid(&seven_cells());
        assert_eq!(index.len(), 7);
        let hits = index.candidates(&Point::new(1.0, 0.0).into(), JoinPredicate::Within);
        assert_eq!(hits, vec!["c0", "c1"]);
    }

    #[test]
    fn interior_point_hits_one_cell() {
        let index = TargetIndex::from_grid(&seven_cells());
        let hits = index.candidates(&Point::new(-0.5, 0.3).into(), JoinPredicate::Within);
        assert_eq!(hits, vec!["c0"]);
    }

    #[test]
    fn distant_point_hits_nothing() {
        let index = TargetIndex::from_grid(&seven_cells());
        let hits = index.candidates(&Point::new(50.0, 50.0).into(), JoinPredicate::Within);
        assert!(hits.is_empty());
    }

    #[test]
    fn from_layer_requires_identifier() {
        let layer = Layer::new(
            Some(Crs::BritishNationalGrid),
            vec![
                Feature::new(hex(0.0, 0.0)).with_property("ward", "A"),
                Feature::new(hex(2.0, 0.0)),
            ],
        );
        let err = TargetIndex::from_layer(&layer, "ward").err().unwrap();
        assert!(matches!(err, JoinError::SchemaMismatch { row: 1, .. }));
    }

    #[test]
    fn mismatch_message_names_both_systems() {
        let err = JoinError::CrsMismatch {
            records: None,
            targets: Some(Crs::BritishNationalGrid),
        };
        assert_eq!(
            err.to_string(),
            "CRS mismatch: records are undeclared, targets are EPSG:27700; normalize the layers first"
        );
    }
}
