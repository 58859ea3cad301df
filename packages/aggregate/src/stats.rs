//! Count, mean hour and median hour per cell.

use std::collections::BTreeMap;

use spatial_helper_aggregate_models::{
    COUNT, CategoryFilter, CategoryTable, ColumnNaming, HourField, MEAN_HR, MEDIAN_HR, TimeWindow,
};
use spatial_helper_grid_models::Grid;
use spatial_helper_layer_models::Layer;
use spatial_helper_spatial::{DEFAULT_SEED, JoinPredicate, JoinResult, join_to_grid};

use crate::AggregateError;
use crate::hours::{as_f64, mean, median, record_hours};

/// What to aggregate and how to name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourAggregation {
    /// Where each record's hour comes from.
    pub hour: HourField,
    /// Time-of-day window records must fall in.
    pub window: TimeWindow,
    /// Optional category restriction.
    pub filter: Option<CategoryFilter>,
    /// Output column labels.
    pub naming: ColumnNaming,
    /// Fair-assignment seed.
    pub seed: u64,
}

impl HourAggregation {
    /// All records, plain column names, default seed.
    #[must_use]
    pub const fn new(hour: HourField) -> Self {
        Self {
            hour,
            window: TimeWindow::All,
            filter: None,
            naming: ColumnNaming::Plain,
            seed: DEFAULT_SEED,
        }
    }

    /// Restricts to a time-of-day window.
    #[must_use]
    pub const fn window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    /// Restricts to one category.
    #[must_use]
    pub fn filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the column labels.
    #[must_use]
    pub fn naming(mut self, naming: ColumnNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Sets the fair-assignment seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Joins `records` onto `grid` and adds count, mean hour and median hour
/// columns.
///
/// The category filter is applied first, then hours are parsed and the
/// window applied. Input layers and grid are left untouched.
///
/// # Errors
///
/// * [`AggregateError::SchemaMismatch`] if no record has the hour column
///   (checked before filtering), a selected record lacks it, or no record
///   has the filter column.
/// * [`AggregateError::InvalidHour`] for unreadable hours.
/// * [`AggregateError::Join`] if `records` is not in the grid's CRS.
pub fn aggregate_hours(
    grid: &Grid,
    records: &Layer,
    options: &HourAggregation,
) -> Result<Grid, AggregateError> {
    require_any(records, &options.hour.column)?;
    let selected = match &options.filter {
        Some(filter) => {
            require_any(records, &filter.column)?;
            records.filtered(|feature| filter.matches(feature))
        }
        None => records.clone(),
    };

    let hours = record_hours(&selected, &options.hour)?;

    let mut in_window = Vec::with_capacity(selected.len());
    let mut window_hours = Vec::with_capacity(selected.len());
    for (feature, hour) in selected.features.iter().zip(hours) {
        if options.window.contains(hour) {
            in_window.push(feature.clone());
            window_hours.push(hour);
        }
    }
    let windowed = Layer::new(selected.crs, in_window);

    log::debug!(
        "Aggregating {} of {} records ({} window)",
        windowed.len(),
        records.len(),
        options.window
    );

    let joined =
        join_to_grid(&windowed, grid, JoinPredicate::Within)?.fair_assign(options.seed);
    Ok(aggregate_joined(grid, &joined, &window_hours, &options.naming))
}

/// Reduces an already joined, fairly assigned table to per-cell count,
/// mean hour and median hour, left-joined onto `grid`.
///
/// `hours` is indexed by the join's source record index. Cells without a
/// matched record get zero in all three columns.
#[must_use]
pub fn aggregate_joined(
    grid: &Grid,
    joined: &JoinResult,
    hours: &[u8],
    naming: &ColumnNaming,
) -> Grid {
    let mut per_cell: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for (source, target) in joined.matched() {
        if let Some(&hour) = hours.get(source) {
            per_cell.entry(target).or_default().push(f64::from(hour));
        }
    }

    let values: BTreeMap<String, Vec<f64>> = per_cell
        .into_iter()
        .map(|(cell, hours)| {
            let row = vec![as_f64(hours.len()), mean(&hours), median(&hours)];
            (cell.to_string(), row)
        })
        .collect();

    let columns: Vec<String> = [COUNT, MEAN_HR, MEDIAN_HR]
        .iter()
        .map(|stat| naming.apply(stat))
        .collect();

    log::info!(
        "{} of {} cells have records for {}",
        values.len(),
        grid.len(),
        columns.join("/")
    );

    grid.merge_stats(&columns, &values)
}

/// Aggregates every category of `table` side by side, each with its own
/// suffixed columns. Each category filters the full record set.
///
/// # Errors
///
/// See [`aggregate_hours`].
pub fn aggregate_categories(
    grid: &Grid,
    records: &Layer,
    hour: &HourField,
    table: &CategoryTable,
    seed: u64,
) -> Result<Grid, AggregateError> {
    require_any(records, &table.column)?;

    let mut out = grid.clone();
    for category in &table.entries {
        let options = HourAggregation::new(hour.clone())
            .filter(table.filter(category))
            .naming(ColumnNaming::Suffix(category.suffix.clone()))
            .seed(seed);
        out = aggregate_hours(&out, records, &options)?;
    }
    Ok(out)
}

/// Counts records per cell into `column`, optionally restricted to one
/// category. Used for point-of-interest and OSM feature layers.
///
/// # Errors
///
/// * [`AggregateError::SchemaMismatch`] if no record has the filter column.
/// * [`AggregateError::Join`] if `records` is not in the grid's CRS.
pub fn count_points(
    grid: &Grid,
    records: &Layer,
    filter: Option<&CategoryFilter>,
    column: &str,
    seed: u64,
) -> Result<Grid, AggregateError> {
    let selected = match filter {
        Some(filter) => {
            require_any(records, &filter.column)?;
            records.filtered(|feature| filter.matches(feature))
        }
        None => records.clone(),
    };

    let counts = cell_counts(grid, &selected, seed)?;
    let values = counts
        .into_iter()
        .map(|(cell, n)| (cell, vec![as_f64(n)]))
        .collect();

    Ok(grid.merge_stats(&[column.to_string()], &values))
}

/// Number of fairly assigned records per cell identifier.
pub(crate) fn cell_counts(
    grid: &Grid,
    records: &Layer,
    seed: u64,
) -> Result<BTreeMap<String, usize>, AggregateError> {
    let joined = join_to_grid(records, grid, JoinPredicate::Within)?.fair_assign(seed);
    Ok(joined
        .counts_by_target()
        .into_iter()
        .map(|(cell, n)| (cell.to_string(), n))
        .collect())
}

fn require_any(records: &Layer, column: &str) -> Result<(), AggregateError> {
    if records.is_empty() || records.features.iter().any(|f| f.properties.contains_key(column)) {
        Ok(())
    } else {
        Err(AggregateError::SchemaMismatch {
            column: column.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;
    use spatial_helper_aggregate_models::{AggregationConfig, Category};
    use spatial_helper_layer_models::{Crs, Feature};

    use super::*;
    use crate::fixtures::{incident, layer, seven_cells};

    fn stat(grid: &Grid, cell: &str, column: &str) -> f64 {
        grid.get(cell).and_then(|c| c.stat(column)).unwrap()
    }

    /// Three incidents at cell centres and one on the `c0`/`c1` edge.
    fn scenario() -> Layer {
        layer(vec![
            incident(0, -2.0, 0.0, "08:15"),
            incident(1, 1.0, 3.0, "14:00"),
            incident(2, -1.0, -3.0, "22:30"),
            incident(3, 1.0, 0.0, "03:05"),
        ])
    }

    #[test]
    fn every_cell_gets_a_row() {
        let grid = seven_cells();
        let out = aggregate_hours(
            &grid,
            &scenario(),
            &HourAggregation::new(HourField::incident_time()),
        )
        .unwrap();

        assert_eq!(out.len(), 7);
        assert_eq!(out.columns(), ["count", "mean_hr", "median_hr"]);
        assert!((stat(&out, "c2", COUNT) - 1.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c2", MEAN_HR) - 8.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c6", MEDIAN_HR) - 22.0).abs() < f64::EPSILON);

        let total: f64 = out.cells().iter().filter_map(|c| c.stat(COUNT)).sum();
        assert!((total - 4.0).abs() < f64::EPSILON);

        // The edge incident lands in exactly one of its two cells.
        let (c0, c1) = (stat(&out, "c0", COUNT), stat(&out, "c1", COUNT));
        assert!((c0 + c1 - 1.0).abs() < f64::EPSILON, "{c0} + {c1}");
        assert!((c0 * c1).abs() < f64::EPSILON, "{c0} * {c1}");

        let empty: Vec<&str> = out
            .cells()
            .iter()
            .filter(|c| c.stat(COUNT) == Some(0.0))
            .map(|c| c.h3_ref.as_str())
            .collect();
        assert_eq!(empty.len(), 3);
        for cell in empty {
            assert!(stat(&out, cell, MEAN_HR).abs() < f64::EPSILON);
            assert!(stat(&out, cell, MEDIAN_HR).abs() < f64::EPSILON);
        }

        assert!(grid.columns().is_empty());
    }

    #[test]
    fn day_and_night_windows() {
        let records = layer(
            ["05:00", "06:00", "12:00", "19:00", "20:00"]
                .iter()
                .enumerate()
                .map(|(i, t)| incident(i, 0.0, 0.5, t))
                .collect(),
        );
        let base = HourAggregation::new(HourField::incident_time());

        let day = aggregate_hours(
            &seven_cells(),
            &records,
            &base.clone().window(TimeWindow::Day).naming(ColumnNaming::Prefix("day".into())),
        )
        .unwrap();
        assert!((stat(&day, "c0", "day_count") - 3.0).abs() < f64::EPSILON);
        assert!((stat(&day, "c0", "day_median_hr") - 12.0).abs() < f64::EPSILON);
        assert!((stat(&day, "c0", "day_mean_hr") - 37.0 / 3.0).abs() < 1e-12);

        let night = aggregate_hours(
            &day,
            &records,
            &base.window(TimeWindow::Night).naming(ColumnNaming::Prefix("night".into())),
        )
        .unwrap();
        assert!((stat(&night, "c0", "night_count") - 2.0).abs() < f64::EPSILON);
        assert!((stat(&night, "c0", "night_median_hr") - 12.5).abs() < f64::EPSILON);
        // Day columns survive the second aggregation.
        assert!((stat(&night, "c0", "day_count") - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn joined_table_reduces_directly() {
        let grid = seven_cells();
        let records = scenario();
        let joined = join_to_grid(&records, &grid, JoinPredicate::Within)
            .unwrap()
            .fair_assign(DEFAULT_SEED);
        let out = aggregate_joined(&grid, &joined, &[8, 14, 22, 3], &ColumnNaming::Plain);
        assert!((stat(&out, "c3", MEAN_HR) - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_time_column_is_schema_mismatch() {
        let records = layer(vec![incident(0, 0.0, 0.0, "10:00")]);
        let options = HourAggregation::new(HourField::recorded_date());
        assert!(matches!(
            aggregate_hours(&seven_cells(), &records, &options),
            Err(AggregateError::SchemaMismatch { column }) if column == "SUPV_CR_Recorded_Date"
        ));
    }

    #[test]
    fn missing_time_column_is_reported_even_when_filter_selects_nothing() {
        let records = layer(vec![
            Feature::new(Point::new(0.0, 0.0)).with_property("kind", "pub"),
        ]);
        let options = HourAggregation::new(HourField::incident_time())
            .filter(CategoryFilter::new("kind", "cafe"));
        assert!(matches!(
            aggregate_hours(&seven_cells(), &records, &options),
            Err(AggregateError::SchemaMismatch { column }) if column == "IncidentTime"
        ));
    }

    #[test]
    fn unnormalized_records_are_rejected() {
        let mut records = scenario();
        records.crs = Some(Crs::Wgs84);
        let options = HourAggregation::new(HourField::incident_time());
        assert!(matches!(
            aggregate_hours(&seven_cells(), &records, &options),
            Err(AggregateError::Join(_))
        ));
    }

    #[test]
    fn all_categories_are_aggregated() {
        let config = AggregationConfig::embedded();
        let label = |f: Feature, v: &str| {
            f.with_property("OpeningCode_Description", v)
        };
        let records = layer(vec![
            label(incident(0, 0.0, 0.0, "01:00"), "Police Generated Res"),
            label(incident(1, 0.0, 0.0, "03:00"), "Police Generated Res"),
            label(incident(2, -2.0, 0.0, "10:00"), "ASB Nuisance"),
            label(incident(3, 1.0, 3.0, "21:00"), "Violence Against The"),
            label(incident(4, 1.0, 3.0, "21:00"), "Concern For Safety"),
        ]);

        let out = aggregate_categories(
            &seven_cells(),
            &records,
            &config.incidents,
            &config.categories,
            DEFAULT_SEED,
        )
        .unwrap();

        assert_eq!(out.columns().len(), 9);
        assert!((stat(&out, "c0", "count_violence") - 2.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c0", "mean_hr_violence") - 2.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c2", "count_asb_nuisance") - 1.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c3", "count_VAP") - 1.0).abs() < f64::EPSILON);
        assert!(stat(&out, "c3", "count_violence").abs() < f64::EPSILON);
    }

    #[test]
    fn categories_need_the_label_column() {
        let table = CategoryTable {
            column: "Major".to_string(),
            entries: vec![Category {
                value: "Burglary".to_string(),
                suffix: "burglary".to_string(),
            }],
        };
        assert!(matches!(
            aggregate_categories(
                &seven_cells(),
                &scenario(),
                &HourField::incident_time(),
                &table,
                DEFAULT_SEED
            ),
            Err(AggregateError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn counts_filtered_points() {
        let poi = |n: usize, x: f64, y: f64, kind: &str| {
            incident(n, x, y, "00:00").with_property("type", kind)
        };
        let records = layer(vec![
            poi(0, 0.0, 0.0, "pub"),
            poi(1, 0.2, 0.0, "pub"),
            poi(2, 0.0, 0.2, "cafe"),
            poi(3, -2.0, 0.0, "pub"),
        ]);

        let pubs = CategoryFilter::new("type", "pub");
        let out = count_points(&seven_cells(), &records, Some(&pubs), "pubs", DEFAULT_SEED).unwrap();
        assert!((stat(&out, "c0", "pubs") - 2.0).abs() < f64::EPSILON);
        assert!((stat(&out, "c2", "pubs") - 1.0).abs() < f64::EPSILON);
        assert!(stat(&out, "c5", "pubs").abs() < f64::EPSILON);

        let all = count_points(&seven_cells(), &records, None, "poi", DEFAULT_SEED).unwrap();
        assert!((stat(&all, "c0", "poi") - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_records_zero_fill() {
        let out = count_points(&seven_cells(), &layer(vec![]), None, "poi", DEFAULT_SEED).unwrap();
        assert_eq!(out.len(), 7);
        assert!(out.cells().iter().all(|c| c.stat("poi") == Some(0.0)));
    }
}
