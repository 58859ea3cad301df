//! Subcommand implementations: load inputs, make one library call, write
//! the result.

use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};

use serde_json::Value;
use spatial_helper_aggregate::{
    AggregateError, HourAggregation, aggregate_categories, aggregate_hours, apply_exclusions,
    count_points, harm_score, load_config, read_harm_lookup,
};
use spatial_helper_aggregate_models::{
    AggregationConfig, CategoryFilter, ColumnNaming, HourField, HourFormat, TimeWindow,
};
use spatial_helper_grid::builder::{Containment, GridBuilder, Region, grid_from_layer};
use spatial_helper_grid::export::{AssignedColumn, write_csv_file};
use spatial_helper_grid_models::Grid;
use spatial_helper_layer::io::{read_layer, write_layer};
use spatial_helper_layer::normalize::align_to;
use spatial_helper_layer_models::Layer;
use spatial_helper_spatial::{DEFAULT_SEED, overlap_to_grid};

use crate::GridInput;

type CommandResult = Result<(), Box<dyn Error>>;

/// Configuration and seed resolved from the global flags.
pub struct Settings {
    config: AggregationConfig,
    seed: u64,
}

impl Settings {
    /// Loads `path` (or the built-in config) and resolves the seed:
    /// flag, then config, then the join default.
    pub fn load(path: Option<&Path>, seed: Option<u64>) -> Result<Self, AggregateError> {
        let config = match path {
            Some(path) => load_config(path)?,
            None => AggregationConfig::embedded(),
        };
        let seed = seed.or(config.seed).unwrap_or(DEFAULT_SEED);
        log::debug!("Using fair-assignment seed {seed}");
        Ok(Self { config, seed })
    }
}

/// Region selected on the command line.
pub enum RegionArg {
    Boundary(PathBuf),
    Center {
        x: f64,
        y: f64,
        radius: f64,
        system: String,
    },
}

/// Options of the `aggregate` subcommand.
pub struct AggregateArgs {
    pub hour_column: Option<String>,
    pub crimes: bool,
    pub hour_format: Option<HourFormat>,
    pub window: TimeWindow,
    pub filter: Option<(String, String)>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub keep_excluded: bool,
}

pub fn grid(
    region: &RegionArg,
    resolution: u8,
    buffer: f64,
    containment: Containment,
    geographic: bool,
    output: &Path,
) -> CommandResult {
    let region = match region {
        RegionArg::Boundary(path) => Region::Boundary(read_layer(path)?),
        RegionArg::Center {
            x,
            y,
            radius,
            system,
        } => Region::center(*x, *y, *radius, system)?,
    };

    let grid = GridBuilder::new(resolution)?
        .buffer(buffer)
        .containment(containment)
        .geographic_output(geographic)
        .build(&region)?;
    log::info!("Built {} cells at resolution {resolution}", grid.len());

    write_grid(&grid, output, spatial_helper_grid_models::H3_REF, None)
}

pub fn aggregate(
    settings: &Settings,
    input: &GridInput,
    records: &Path,
    args: AggregateArgs,
) -> CommandResult {
    let grid = load_grid(input)?;
    let mut records = load_records(records, &grid)?;
    if !args.keep_excluded {
        records = apply_exclusions(&records, &settings.config.exclusions);
    }

    let hour = match args.hour_column {
        Some(column) => HourField::new(column, args.hour_format.unwrap_or(HourFormat::Time)),
        None if args.crimes => settings.config.crimes.clone(),
        None => settings.config.incidents.clone(),
    };

    let naming = column_naming(args.prefix, args.suffix, args.window);
    let mut options = HourAggregation::new(hour)
        .window(args.window)
        .naming(naming)
        .seed(settings.seed);
    if let Some((column, value)) = args.filter {
        options = options.filter(CategoryFilter::new(column, value));
    }

    let out = aggregate_hours(&grid, &records, &options)?;
    write_grid(&out, &input.output, &input.grid_id, None)
}

/// Explicit prefix, then suffix; a day/night window without either names
/// its columns after the window.
fn column_naming(
    prefix: Option<String>,
    suffix: Option<String>,
    window: TimeWindow,
) -> ColumnNaming {
    match (prefix, suffix) {
        (Some(prefix), _) => ColumnNaming::Prefix(prefix),
        (None, Some(suffix)) => ColumnNaming::Suffix(suffix),
        (None, None) if window != TimeWindow::All => ColumnNaming::Prefix(window.to_string()),
        (None, None) => ColumnNaming::Plain,
    }
}

pub fn categories(
    settings: &Settings,
    input: &GridInput,
    records: &Path,
    keep_excluded: bool,
) -> CommandResult {
    let grid = load_grid(input)?;
    let mut records = load_records(records, &grid)?;
    if !keep_excluded {
        records = apply_exclusions(&records, &settings.config.exclusions);
    }

    let out = aggregate_categories(
        &grid,
        &records,
        &settings.config.incidents,
        &settings.config.categories,
        settings.seed,
    )?;
    write_grid(&out, &input.output, &input.grid_id, None)
}

pub fn harm(
    settings: &Settings,
    input: &GridInput,
    records: &Path,
    class: &str,
    lookup: Option<&Path>,
) -> CommandResult {
    let lookup = match lookup {
        Some(path) => read_harm_lookup(std::fs::File::open(path)?)?,
        None => settings.config.harm.clone(),
    };

    let grid = load_grid(input)?;
    let records = load_records(records, &grid)?;
    let out = harm_score(&grid, &records, &lookup, class, settings.seed)?;
    write_grid(&out, &input.output, &input.grid_id, None)
}

pub fn count(
    settings: &Settings,
    input: &GridInput,
    records: &Path,
    column: &str,
    filter: Option<(String, String)>,
) -> CommandResult {
    let grid = load_grid(input)?;
    let records = load_records(records, &grid)?;
    let filter = filter.map(|(column, value)| CategoryFilter::new(column, value));

    let out = count_points(&grid, &records, filter.as_ref(), column, settings.seed)?;
    write_grid(&out, &input.output, &input.grid_id, None)
}

pub fn assign(
    settings: &Settings,
    input: &GridInput,
    boundaries: &Path,
    id_column: &str,
) -> CommandResult {
    let grid = load_grid(input)?;
    let boundaries = load_records(boundaries, &grid)?;
    let assigned = overlap_to_grid(&boundaries, id_column, &grid, settings.seed)?;

    let column = AssignedColumn {
        name: id_column,
        values: &assigned,
    };
    write_grid(&grid, &input.output, &input.grid_id, Some(column))
}

fn load_grid(input: &GridInput) -> Result<Grid, Box<dyn Error>> {
    let layer = read_layer(&input.grid)?;
    Ok(grid_from_layer(&layer, &input.grid_id)?)
}

/// Reads a layer and brings it into the grid's CRS: reprojected when it
/// declares another system, assigned when it declares none.
fn load_records(path: &Path, grid: &Grid) -> Result<Layer, Box<dyn Error>> {
    let layer = read_layer(path)?;
    if layer.crs.is_none() {
        log::warn!(
            "{} declares no CRS; assuming the grid's {}",
            path.display(),
            grid.crs()
        );
    }
    Ok(align_to(grid.crs(), &layer)?)
}

fn write_grid(
    grid: &Grid,
    path: &Path,
    id_column: &str,
    assigned: Option<AssignedColumn<'_>>,
) -> CommandResult {
    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        write_csv_file(grid, path, id_column, assigned)?;
        return Ok(());
    }

    let mut layer = grid.to_layer(id_column);
    if let Some(column) = assigned {
        attach(&mut layer, id_column, column.name, column.values);
    }
    write_layer(&layer, path)?;
    Ok(())
}

/// Adds the assigned value of each cell as a property; unassigned cells
/// get `null`.
fn attach(layer: &mut Layer, id_column: &str, name: &str, values: &BTreeMap<String, String>) {
    for feature in &mut layer.features {
        let value = feature
            .property_text(id_column)
            .and_then(|id| values.get(&id).cloned())
            .map_or(Value::Null, Value::from);
        feature.properties.insert(name.to_string(), value);
    }
}
