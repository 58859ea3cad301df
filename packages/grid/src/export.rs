//! CSV export of grid tables.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use spatial_helper_grid_models::Grid;

use crate::GridError;

/// An extra text column keyed by cell identifier, written after the
/// identifier column.
///
/// Used for the boundary each cell was assigned to; cells without an
/// entry get an empty field.
#[derive(Debug, Clone, Copy)]
pub struct AssignedColumn<'a> {
    /// Column header.
    pub name: &'a str,
    /// Value per cell identifier.
    pub values: &'a BTreeMap<String, String>,
}

/// Writes `grid` as CSV: the identifier under `id_column`, the optional
/// assigned column, then every statistic column in grid order. Geometry is
/// not written.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_csv<W: Write>(
    grid: &Grid,
    writer: W,
    id_column: &str,
    assigned: Option<AssignedColumn<'_>>,
) -> Result<(), GridError> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec![id_column];
    if let Some(column) = assigned {
        header.push(column.name);
    }
    header.extend(grid.columns().iter().map(String::as_str));
    csv.write_record(&header)?;

    for cell in grid.cells() {
        let mut record = Vec::with_capacity(header.len());
        record.push(cell.h3_ref.clone());
        if let Some(column) = assigned {
            record.push(column.values.get(&cell.h3_ref).cloned().unwrap_or_default());
        }
        for name in grid.columns() {
            record.push(cell.stat(name).unwrap_or(0.0).to_string());
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Writes `grid` as CSV to `path`. See [`write_csv`].
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_csv_file(
    grid: &Grid,
    path: &Path,
    id_column: &str,
    assigned: Option<AssignedColumn<'_>>,
) -> Result<(), GridError> {
    let file = std::fs::File::create(path)?;
    write_csv(grid, file, id_column, assigned)?;
    log::info!("Wrote {} grid rows to {}", grid.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use spatial_helper_grid_models::{Cell, H3_REF};
    use spatial_helper_layer_models::Crs;

    use super::*;

    fn grid() -> Grid {
        let square = polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0),
        ];
        let grid = Grid::new(
            Crs::Wgs84,
            vec![Cell::new("a", square.clone()), Cell::new("b", square)],
        )
        .unwrap();
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), vec![2.0, 13.5]);
        grid.merge_stats(&["count".to_string(), "mean_hr".to_string()], &values)
    }

    fn to_string(grid: &Grid, assigned: Option<AssignedColumn<'_>>) -> String {
        let mut buf = Vec::new();
        write_csv(grid, &mut buf, H3_REF, assigned).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn writes_identifier_then_stats() {
        assert_eq!(
            to_string(&grid(), None),
            "h3_ref,count,mean_hr\na,2,13.5\nb,0,0\n"
        );
    }

    #[test]
    fn writes_assigned_column_after_identifier() {
        let mut wards = BTreeMap::new();
        wards.insert("b".to_string(), "E05000129".to_string());
        let assigned = AssignedColumn {
            name: "ward",
            values: &wards,
        };
        assert_eq!(
            to_string(&grid(), Some(assigned)),
            "h3_ref,ward,count,mean_hr\na,,2,13.5\nb,E05000129,0,0\n"
        );
    }
}
