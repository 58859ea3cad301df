//! Seeded resolution of records that matched several targets.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use spatial_helper_grid_models::{Grid, H3_REF};
use spatial_helper_layer_models::Layer;

use crate::{JoinError, JoinPredicate, JoinResult, JoinRow, TargetIndex, sjoin};

/// Shuffle seed used unless the caller configures another.
pub const DEFAULT_SEED: u64 = 42;

impl JoinResult {
    /// Reduces the join to at most one row per source record.
    ///
    /// Records with a single row keep it. Rows of records that matched
    /// several targets are shuffled with `seed` and the first row of each
    /// record is kept. The result is in source order, so the same seed
    /// always picks the same targets.
    #[must_use]
    pub fn fair_assign(&self, seed: u64) -> Self {
        let mut per_source: BTreeMap<usize, usize> = BTreeMap::new();
        for row in &self.rows {
            *per_source.entry(row.source).or_insert(0) += 1;
        }

        let (mut rows, mut ambiguous): (Vec<JoinRow>, Vec<JoinRow>) = self
            .rows
            .iter()
            .cloned()
            .partition(|row| per_source.get(&row.source) == Some(&1));

        let ambiguous_sources = per_source.values().filter(|&&n| n > 1).count();

        let mut rng = StdRng::seed_from_u64(seed);
        ambiguous.shuffle(&mut rng);

        let mut seen = BTreeSet::new();
        rows.extend(ambiguous.into_iter().filter(|row| seen.insert(row.source)));
        rows.sort_by_key(|row| row.source);

        log::debug!(
            "Fair assignment (seed {seed}): {} records, {ambiguous_sources} resolved from several targets",
            rows.len()
        );

        Self {
            rows,
            sources: self.sources,
        }
    }
}

/// Assigns each grid cell to one boundary polygon.
///
/// Cells are joined to `boundaries` with [`JoinPredicate::Intersects`];
/// a cell straddling several boundaries is fairly assigned to one of them.
/// The result maps cell identifier to the boundary's `id_column` value;
/// cells outside every boundary are absent.
///
/// # Errors
///
/// * [`JoinError::SchemaMismatch`] if a boundary lacks `id_column`.
/// * [`JoinError::CrsMismatch`] if `boundaries` is not in the grid's CRS.
pub fn overlap_to_grid(
    boundaries: &Layer,
    id_column: &str,
    grid: &Grid,
    seed: u64,
) -> Result<BTreeMap<String, String>, JoinError> {
    let targets = TargetIndex::from_layer(boundaries, id_column)?;
    let cells = grid.to_layer(H3_REF);
    let joined = sjoin(&cells, &targets, JoinPredicate::Intersects)?.fair_assign(seed);

    let assigned: BTreeMap<String, String> = joined
        .matched()
        .filter_map(|(source, target)| {
            grid.cells()
                .get(source)
                .map(|cell| (cell.h3_ref.clone(), target.to_string()))
        })
        .collect();

    log::info!(
        "Assigned {} of {} cells to a {id_column} boundary",
        assigned.len(),
        grid.len()
    );

    Ok(assigned)
}
