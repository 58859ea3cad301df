#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the spatial helper.
//!
//! Builds H3 grids over a boundary or around a point, aggregates incident,
//! crime and point-of-interest layers onto them, and assigns grid cells to
//! administrative boundaries. Inputs and outputs are `GeoJSON` files; an
//! output path ending in `.csv` writes the grid table without geometry.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use spatial_helper_aggregate_models::{HourFormat, TimeWindow};
use spatial_helper_grid::builder::Containment;
use spatial_helper_grid_models::H3_REF;

mod commands;

/// Build H3 grids and aggregate police records onto them.
#[derive(Parser)]
#[command(name = "spatial_helper")]
#[command(about = "Build H3 grids and aggregate police records onto them")]
struct Cli {
    /// Aggregation config TOML (defaults to the built-in config).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fair-assignment shuffle seed (overrides the config).
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Grid input shared by every aggregation subcommand.
#[derive(clap::Args)]
struct GridInput {
    /// Grid `GeoJSON` produced by `grid`.
    #[arg(long)]
    grid: PathBuf,

    /// Grid cell identifier property.
    #[arg(long, default_value = H3_REF)]
    grid_id: String,

    /// Output path (`.geojson` or `.csv`).
    #[arg(long, short)]
    output: PathBuf,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build an H3 grid over a boundary layer or around a point.
    Grid {
        /// Boundary `GeoJSON`; must declare its CRS.
        #[arg(long, conflicts_with_all = ["center_x", "center_y"])]
        boundary: Option<PathBuf>,

        /// Center easting or longitude.
        #[arg(long, requires = "center_y", allow_negative_numbers = true)]
        center_x: Option<f64>,

        /// Center northing or latitude.
        #[arg(long, requires = "center_x", allow_negative_numbers = true)]
        center_y: Option<f64>,

        /// Radius around the center, in the units of `--system`.
        #[arg(long, default_value = "0")]
        radius: f64,

        /// Coordinate system of the center: `osgb` or `lat_lon`.
        #[arg(long, default_value = "osgb")]
        system: String,

        /// H3 resolution (0-15).
        #[arg(long, short, default_value = "9")]
        resolution: u8,

        /// Buffer around the region, in its native units.
        #[arg(long, default_value = "0")]
        buffer: f64,

        /// Cell containment rule.
        #[arg(long, default_value = "centroid")]
        containment: Containment,

        /// Keep the grid in WGS84 even for a projected region.
        #[arg(long)]
        geographic: bool,

        /// Output path (`.geojson` or `.csv`).
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Count records per cell with mean and median hour.
    Aggregate {
        #[command(flatten)]
        grid: GridInput,

        /// Record `GeoJSON`.
        #[arg(long)]
        records: PathBuf,

        /// Property holding the timestamp (defaults to the config's
        /// incident field).
        #[arg(long)]
        hour_column: Option<String>,

        /// Use the config's crime hour field instead of the incident one.
        #[arg(long, conflicts_with = "hour_column")]
        crimes: bool,

        /// Timestamp layout: `time` or `date_time`.
        #[arg(long, requires = "hour_column")]
        hour_format: Option<HourFormat>,

        /// Time-of-day window: `all`, `day` or `night`.
        #[arg(long, default_value = "all")]
        window: TimeWindow,

        /// Only records whose `--filter-column` equals this value.
        #[arg(long, requires = "filter_column")]
        filter_value: Option<String>,

        /// Property tested by `--filter-value`.
        #[arg(long, requires = "filter_value")]
        filter_column: Option<String>,

        /// Prefix for the statistic columns (`{prefix}_count`).
        #[arg(long, conflicts_with = "suffix")]
        prefix: Option<String>,

        /// Suffix for the statistic columns (`count_{suffix}`).
        #[arg(long)]
        suffix: Option<String>,

        /// Keep records the config's exclusion rules would drop.
        #[arg(long)]
        keep_excluded: bool,
    },

    /// Aggregate every configured category side by side.
    Categories {
        #[command(flatten)]
        grid: GridInput,

        /// Incident `GeoJSON`.
        #[arg(long)]
        records: PathBuf,

        /// Keep records the config's exclusion rules would drop.
        #[arg(long)]
        keep_excluded: bool,
    },

    /// Score cells by record count times a classification's harm weight.
    Harm {
        #[command(flatten)]
        grid: GridInput,

        /// Crime `GeoJSON` for one minor classification.
        #[arg(long)]
        records: PathBuf,

        /// Minor classification to weight by.
        #[arg(long)]
        class: String,

        /// Harm lookup CSV (`cris_minor`, `CrimeHarm`); defaults to the
        /// config's `[harm]` table.
        #[arg(long)]
        lookup: Option<PathBuf>,
    },

    /// Count points of interest per cell.
    Count {
        #[command(flatten)]
        grid: GridInput,

        /// Point `GeoJSON`.
        #[arg(long)]
        records: PathBuf,

        /// Output column name.
        #[arg(long, default_value = "count")]
        column: String,

        /// Only records whose `--filter-column` equals this value.
        #[arg(long, requires = "filter_column")]
        filter_value: Option<String>,

        /// Property tested by `--filter-value`.
        #[arg(long, requires = "filter_value")]
        filter_column: Option<String>,
    },

    /// Assign each cell to one boundary polygon.
    Assign {
        #[command(flatten)]
        grid: GridInput,

        /// Boundary `GeoJSON`.
        #[arg(long)]
        boundaries: PathBuf,

        /// Boundary identifier property (e.g. `BCU_Code`, `LSOA11CD`).
        #[arg(long)]
        id_column: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let settings = commands::Settings::load(cli.config.as_deref(), cli.seed)?;

    match cli.command {
        Commands::Grid {
            boundary,
            center_x,
            center_y,
            radius,
            system,
            resolution,
            buffer,
            containment,
            geographic,
            output,
        } => {
            let region = match (boundary, center_x, center_y) {
                (Some(path), _, _) => commands::RegionArg::Boundary(path),
                (None, Some(x), Some(y)) => commands::RegionArg::Center {
                    x,
                    y,
                    radius,
                    system,
                },
                _ => return Err("either --boundary or --center-x/--center-y is required".into()),
            };
            commands::grid(&region, resolution, buffer, containment, geographic, &output)?;
        }
        Commands::Aggregate {
            grid,
            records,
            hour_column,
            crimes,
            hour_format,
            window,
            filter_value,
            filter_column,
            prefix,
            suffix,
            keep_excluded,
        } => {
            let options = commands::AggregateArgs {
                hour_column,
                crimes,
                hour_format,
                window,
                filter: filter_column.zip(filter_value),
                prefix,
                suffix,
                keep_excluded,
            };
            commands::aggregate(&settings, &grid, &records, options)?;
        }
        Commands::Categories {
            grid,
            records,
            keep_excluded,
        } => commands::categories(&settings, &grid, &records, keep_excluded)?,
        Commands::Harm {
            grid,
            records,
            class,
            lookup,
        } => commands::harm(&settings, &grid, &records, &class, lookup.as_deref())?,
        Commands::Count {
            grid,
            records,
            column,
            filter_value,
            filter_column,
        } => commands::count(
            &settings,
            &grid,
            &records,
            &column,
            filter_column.zip(filter_value),
        )?,
        Commands::Assign {
            grid,
            boundaries,
            id_column,
        } => commands::assign(&settings, &grid, &boundaries, &id_column)?,
    }

    Ok(())
}
