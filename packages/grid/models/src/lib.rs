#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hexagonal grid cell and grid table types.
//!
//! A [`Grid`] is a table keyed by cell identifier: one row per cell, a
//! polygon per row, and any number of named numeric statistic columns.
//! Cell identifiers are unique; constructors enforce it.

use std::collections::{BTreeMap, BTreeSet};

use geo::Polygon;
use serde_json::{Map, Value};
use spatial_helper_layer_models::{Crs, Feature, Layer};

/// Default name of the cell identifier column.
pub const H3_REF: &str = "h3_ref";

/// One grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// Cell identifier (an H3 index string for built grids).
    pub h3_ref: String,
    /// Cell boundary in the grid's CRS.
    pub geometry: Polygon<f64>,
    /// Statistic columns attached by aggregation.
    pub stats: BTreeMap<String, f64>,
}

impl Cell {
    /// Creates a cell with no statistics.
    #[must_use]
    pub fn new(h3_ref: impl Into<String>, geometry: Polygon<f64>) -> Self {
        Self {
            h3_ref: h3_ref.into(),
            geometry,
            stats: BTreeMap::new(),
        }
    }

    /// Returns a statistic value, if the column exists.
    #[must_use]
    pub fn stat(&self, column: &str) -> Option<f64> {
        self.stats.get(column).copied()
    }
}

/// Error returned when two cells share an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCellError {
    /// The repeated identifier.
    pub h3_ref: String,
}

impl std::fmt::Display for DuplicateCellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "duplicate cell identifier {:?}", self.h3_ref)
    }
}

impl std::error::Error for DuplicateCellError {}

/// A grid table: unique cells in one CRS with ordered statistic columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    crs: Crs,
    cells: Vec<Cell>,
    index: BTreeMap<String, usize>,
    columns: Vec<String>,
}

impl Grid {
    /// Creates a grid from cells.
    ///
    /// Statistic columns are collected from the cells in first-seen order;
    /// a cell missing a column is treated as zero for that column.
    ///
    /// # Errors
    ///
    /// Returns an error if two cells share an identifier.
    pub fn new(crs: Crs, cells: Vec<Cell>) -> Result<Self, DuplicateCellError> {
        let mut index = BTreeMap::new();
        let mut columns = Vec::new();
        let mut seen_columns = BTreeSet::new();

        for (i, cell) in cells.iter().enumerate() {
            if index.insert(cell.h3_ref.clone(), i).is_some() {
                return Err(DuplicateCellError {
                    h3_ref: cell.h3_ref.clone(),
                });
            }
            for column in cell.stats.keys() {
                if seen_columns.insert(column.clone()) {
                    columns.push(column.clone());
                }
            }
        }

        let mut grid = Self {
            crs,
            cells,
            index,
            columns,
        };
        grid.fill_missing();
        Ok(grid)
    }

    fn fill_missing(&mut self) {
        for cell in &mut self.cells {
            for column in &self.columns {
                cell.stats.entry(column.clone()).or_insert(0.0);
            }
        }
    }

    /// The reference system cell geometries are expressed in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Cells in grid order.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Statistic column names in insertion order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Looks up a cell by identifier.
    #[must_use]
    pub fn get(&self, h3_ref: &str) -> Option<&Cell> {
        self.index.get(h3_ref).map(|&i| &self.cells[i])
    }

    /// Cell identifiers in grid order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|c| c.h3_ref.as_str())
    }

    /// Left-joins per-cell statistics onto a copy of this grid.
    ///
    /// `values` maps a cell identifier to one value per entry in
    /// `columns`. Cells absent from `values` receive `0.0` in every new
    /// column; identifiers in `values` that are not grid cells are ignored.
    /// Existing columns with the same name are overwritten.
    #[must_use]
    pub fn merge_stats(&self, columns: &[String], values: &BTreeMap<String, Vec<f64>>) -> Self {
        let mut out = self.clone();

        for column in columns {
            if !out.columns.contains(column) {
                out.columns.push(column.clone());
            }
        }

        for cell in &mut out.cells {
            let row = values.get(&cell.h3_ref);
            for (i, column) in columns.iter().enumerate() {
                let value = row.and_then(|r| r.get(i)).copied().unwrap_or(0.0);
                cell.stats.insert(column.clone(), value);
            }
        }

        out
    }

    /// Returns a copy with each cell geometry replaced by `f(geometry)` and
    /// the CRS set to `crs`. Identifiers and statistics are preserved.
    ///
    /// # Errors
    ///
    /// Returns the first error `f` produces.
    pub fn try_map_geometry<E>(
        &self,
        crs: Crs,
        mut f: impl FnMut(&Polygon<f64>) -> Result<Polygon<f64>, E>,
    ) -> Result<Self, E> {
        let mut out = self.clone();
        out.crs = crs;
        for cell in &mut out.cells {
            cell.geometry = f(&cell.geometry)?;
        }
        Ok(out)
    }

    /// Converts the grid into a layer: one polygon feature per cell with the
    /// identifier under `id_column` followed by every statistic column.
    #[must_use]
    pub fn to_layer(&self, id_column: &str) -> Layer {
        let features = self
            .cells
            .iter()
            .map(|cell| {
                let mut properties = Map::new();
                properties.insert(id_column.to_string(), Value::from(cell.h3_ref.clone()));
                for column in &self.columns {
                    let value = cell.stat(column).unwrap_or(0.0);
                    properties.insert(column.clone(), Value::from(value));
                }
                Feature {
                    geometry: cell.geometry.clone().into(),
                    properties,
                }
            })
            .collect();

        Layer::new(Some(self.crs), features)
    }
}
