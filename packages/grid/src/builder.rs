//! H3 tessellation of a region of interest.

use std::collections::BTreeSet;

use geo::{BooleanOps, Buffer, Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use h3o::geom::{ContainmentMode, TilerBuilder};
use h3o::{CellIndex, LatLng, Resolution};
use serde_json::Value;
use spatial_helper_grid_models::{Cell, Grid};
use spatial_helper_layer::LayerError;
use spatial_helper_layer::reproject::{Transformer, reproject_geometry};
use spatial_helper_layer_models::{CoordinateSystem, Crs, Layer};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::GridError;

/// Which cells count as covering a region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Containment {
    /// Cell center inside the region (classic polyfill).
    #[default]
    Centroid,
    /// Cell entirely inside the region.
    Boundary,
    /// Cell boundary touching the region.
    Intersects,
    /// Every cell needed to cover the region completely.
    Covers,
}

impl From<Containment> for ContainmentMode {
    fn from(value: Containment) -> Self {
        match value {
            Containment::Centroid => Self::ContainsCentroid,
            Containment::Boundary => Self::ContainsBoundary,
            Containment::Intersects => Self::IntersectsBoundary,
            Containment::Covers => Self::Covers,
        }
    }
}

/// The area a grid should cover.
#[derive(Debug, Clone)]
pub enum Region {
    /// Every geometry of a boundary layer, dissolved into one region.
    Boundary(Layer),
    /// A disc of `radius` around a single coordinate.
    Center {
        /// Easting or longitude.
        x: f64,
        /// Northing or latitude.
        y: f64,
        /// Radius in the units of `system` (metres for `osgb`, degrees for
        /// `lat_lon`).
        radius: f64,
        /// Reference system of `x`, `y` and `radius`.
        system: CoordinateSystem,
    },
}

impl Region {
    /// Builds a center region from a coordinate-system tag.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidParameter`] if `tag` is not `"osgb"` or
    /// `"lat_lon"`.
    pub fn center(x: f64, y: f64, radius: f64, tag: &str) -> Result<Self, GridError> {
        let system = CoordinateSystem::from_tag(tag)?;
        Ok(Self::Center {
            x,
            y,
            radius,
            system,
        })
    }

    fn native_crs(&self) -> Result<Crs, GridError> {
        match self {
            Self::Boundary(layer) => layer.crs.ok_or_else(|| GridError::InvalidParameter {
                message: "boundary layer declares no CRS; buffer units would be ambiguous"
                    .to_string(),
            }),
            Self::Center { system, .. } => Ok(system.crs()),
        }
    }

    fn geometries(&self) -> Vec<Geometry<f64>> {
        match self {
            Self::Boundary(layer) => layer.features.iter().map(|f| f.geometry.clone()).collect(),
            Self::Center { x, y, .. } => vec![Geometry::Point(Point::new(*x, *y))],
        }
    }

    const fn radius(&self) -> f64 {
        match self {
            Self::Boundary(_) => 0.0,
            Self::Center { radius, .. } => *radius,
        }
    }
}

/// Builds H3 grids at a fixed resolution.
#[derive(Debug, Clone, Copy)]
pub struct GridBuilder {
    resolution: Resolution,
    buffer: f64,
    containment: Containment,
    geographic_output: bool,
}

impl GridBuilder {
    /// Creates a builder for H3 `resolution` (0–15) with no buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::InvalidParameter`] for resolutions above 15.
    pub fn new(resolution: u8) -> Result<Self, GridError> {
        let resolution =
            Resolution::try_from(resolution).map_err(|e| GridError::InvalidParameter {
                message: e.to_string(),
            })?;
        Ok(Self {
            resolution,
            buffer: 0.0,
            containment: Containment::default(),
            geographic_output: false,
        })
    }

    /// Sets the buffer distance, in the region's native units.
    #[must_use]
    pub const fn buffer(mut self, buffer: f64) -> Self {
        self.buffer = buffer;
        self
    }

    /// Sets the containment rule.
    #[must_use]
    pub const fn containment(mut self, containment: Containment) -> Self {
        self.containment = containment;
        self
    }

    /// Keep the grid in WGS84 even when the region is projected.
    #[must_use]
    pub const fn geographic_output(mut self, geographic: bool) -> Self {
        self.geographic_output = geographic;
        self
    }

    /// Tessellates `region`.
    ///
    /// The grid is returned in the region's native CRS unless
    /// [`Self::geographic_output`] was requested.
    ///
    /// # Errors
    ///
    /// * [`GridError::InvalidParameter`] for a negative or non-finite
    ///   buffer/radius or a boundary layer without a declared CRS.
    /// * [`GridError::InvalidGeometry`] / [`GridError::InvalidCoordinate`]
    ///   if the region cannot be tiled.
    /// * [`GridError::Layer`] if the region or cells cannot be reprojected.
    pub fn build(&self, region: &Region) -> Result<Grid, GridError> {
        let native = region.native_crs()?;
        let distance = self.buffer + region.radius();
        if !distance.is_finite() || distance < 0.0 {
            return Err(GridError::InvalidParameter {
                message: format!("buffer must be a non-negative number, got {distance}"),
            });
        }

        let geometries = region.geometries();

        // Buffer in native units: metres when projected, degrees otherwise.
        let dissolved = dissolve(&geometries, distance);
        let area = reproject_geometry(&dissolved, native, Crs::Wgs84)?;

        let cells = if area.0.is_empty() {
            log::debug!("Region has no area; using the cells under its points");
            self.point_cells(&geometries, native)?
        } else {
            self.tile(area)?
        };

        log::info!(
            "Built H3 grid of {} cells at resolution {} (buffer {distance} in {native})",
            cells.len(),
            self.resolution
        );

        let grid = grid_from_cells(cells)?;
        if self.geographic_output || native == Crs::Wgs84 {
            Ok(grid)
        } else {
            to_crs(&grid, native)
        }
    }

    fn tile(&self, area: MultiPolygon<f64>) -> Result<BTreeSet<CellIndex>, GridError> {
        let mut tiler = TilerBuilder::new(self.resolution)
            .containment_mode(self.containment.into())
            .build();
        for polygon in area {
            tiler.add(polygon)?;
        }
        Ok(tiler.into_coverage().collect())
    }

    fn point_cells(
        &self,
        geometries: &[Geometry<f64>],
        native: Crs,
    ) -> Result<BTreeSet<CellIndex>, GridError> {
        let transformer = Transformer::new(native, Crs::Wgs84)?;
        let mut cells = BTreeSet::new();
        for point in geometries.iter().flat_map(points_of) {
            let c = transformer.transform(point.0)?;
            cells.insert(LatLng::new(c.y, c.x)?.to_cell(self.resolution));
        }
        Ok(cells)
    }
}

/// Builds a grid of `resolution` over a boundary layer with an optional
/// buffer in the boundary's native units.
///
/// # Errors
///
/// See [`GridBuilder::build`].
pub fn make_h3_grid(boundary: &Layer, resolution: u8, buffer: f64) -> Result<Grid, GridError> {
    GridBuilder::new(resolution)?
        .buffer(buffer)
        .build(&Region::Boundary(boundary.clone()))
}

/// Builds a WGS84 grid from an explicit set of H3 cells.
///
/// # Errors
///
/// Infallible for deduplicated input; the error path exists for the
/// identifier uniqueness check.
pub fn grid_from_cells(cells: impl IntoIterator<Item = CellIndex>) -> Result<Grid, GridError> {
    let unique: BTreeSet<CellIndex> = cells.into_iter().collect();
    let cells = unique
        .into_iter()
        .map(|cell| Cell::new(cell.to_string(), cell_polygon(cell)))
        .collect();
    Ok(Grid::new(Crs::Wgs84, cells)?)
}

/// The boundary of an H3 cell as a closed WGS84 polygon.
#[must_use]
pub fn cell_polygon(cell: CellIndex) -> Polygon<f64> {
    let ring: Vec<Coord<f64>> = cell
        .boundary()
        .iter()
        .map(|ll| Coord {
            x: ll.lng(),
            y: ll.lat(),
        })
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Reprojects a grid's cell geometries, preserving identifiers and stats.
///
/// # Errors
///
/// Returns [`GridError::Layer`] if a cell cannot be reprojected.
pub fn to_crs(grid: &Grid, crs: Crs) -> Result<Grid, GridError> {
    let transformer = Transformer::new(grid.crs(), crs)?;
    Ok(grid.try_map_geometry(crs, |polygon| transformer.geometry(polygon))?)
}

/// Reads a grid back from a polygon layer.
///
/// `id_column` holds the cell identifier; every other numeric property
/// becomes a statistic column.
///
/// # Errors
///
/// Returns an error if the layer declares no CRS, a feature is not a
/// single polygon, lacks an identifier, or identifiers repeat.
pub fn grid_from_layer(layer: &Layer, id_column: &str) -> Result<Grid, GridError> {
    let crs = layer.crs.ok_or_else(|| LayerError::UndeclaredCrs {
        context: "loading a grid".to_string(),
    })?;

    let mut cells = Vec::with_capacity(layer.len());
    for (row, feature) in layer.features.iter().enumerate() {
        let geometry = match &feature.geometry {
            Geometry::Polygon(p) => p.clone(),
            Geometry::MultiPolygon(mp) if mp.0.len() == 1 => mp.0[0].clone(),
            _ => {
                return Err(GridError::InvalidRow {
                    row,
                    message: "cell geometry must be a single polygon".to_string(),
                });
            }
        };
        let h3_ref = feature
            .property_text(id_column)
            .ok_or_else(|| GridError::InvalidRow {
                row,
                message: format!("missing identifier column {id_column:?}"),
            })?;

        let mut cell = Cell::new(h3_ref, geometry);
        for (key, value) in &feature.properties {
            if key == id_column {
                continue;
            }
            if let Some(v) = value.as_f64() {
                cell.stats.insert(key.clone(), v);
            } else if !matches!(value, Value::Null) {
                log::debug!("Ignoring non-numeric grid column {key:?}");
            }
        }
        cells.push(cell);
    }

    Ok(Grid::new(crs, cells)?)
}

/// Buffers every geometry by `distance` and unions the result.
fn dissolve(geometries: &[Geometry<f64>], distance: f64) -> MultiPolygon<f64> {
    let parts: Vec<MultiPolygon<f64>> = geometries
        .iter()
        .map(|geometry| {
            if distance > 0.0 {
                geometry.buffer(distance)
            } else {
                MultiPolygon::new(polygons_of(geometry))
            }
        })
        .filter(|mp| !mp.0.is_empty())
        .collect();

    let mut parts = parts.into_iter();
    let Some(first) = parts.next() else {
        return MultiPolygon::new(vec![]);
    };
    parts.fold(first, |acc, part| acc.union(&part))
}

fn polygons_of(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(polygons_of).collect(),
        Geometry::Point(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiPoint(_)
        | Geometry::MultiLineString(_) => vec![],
    }
}

fn points_of(geometry: &Geometry<f64>) -> Vec<Point<f64>> {
    match geometry {
        Geometry::Point(p) => vec![*p],
        Geometry::MultiPoint(mp) => mp.0.clone(),
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(points_of).collect(),
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use geo::{Contains, polygon};
    use spatial_helper_layer_models::Feature;

    use super::*;

    const LONDON_LON: f64 = -0.1276;
    const LONDON_LAT: f64 = 51.5072;

    fn ids(grid: &Grid) -> BTreeSet<String> {
        grid.ids().map(str::to_string).collect()
    }

    fn london_disc(radius: f64) -> Region {
        Region::center(LONDON_LON, LONDON_LAT, radius, "lat_lon").unwrap()
    }

    #[test]
    fn cell_centers_fall_inside_the_disc() {
        let grid = GridBuilder::new(8).unwrap().build(&london_disc(0.02)).unwrap();
        assert!(!grid.is_empty());
        assert_eq!(grid.crs(), Crs::Wgs84);

        for id in grid.ids() {
            let cell: CellIndex = id.parse().unwrap();
            let center = LatLng::from(cell);
            let d = (center.lng() - LONDON_LON).hypot(center.lat() - LONDON_LAT);
            assert!(d <= 0.02 + 1e-9, "{id} center is {d} degrees away");
        }
    }

    #[test]
    fn building_twice_yields_identical_cells() {
        let builder = GridBuilder::new(8).unwrap();
        let a = builder.build(&london_disc(0.02)).unwrap();
        let b = builder.build(&london_disc(0.02)).unwrap();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn finer_resolution_has_more_cells() {
        let coarse = GridBuilder::new(7).unwrap().build(&london_disc(0.05)).unwrap();
        let fine = GridBuilder::new(8).unwrap().build(&london_disc(0.05)).unwrap();
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn covers_is_a_superset_of_centroid() {
        let centroid = GridBuilder::new(8).unwrap().build(&london_disc(0.02)).unwrap();
        let covers = GridBuilder::new(8)
            .unwrap()
            .containment(Containment::Covers)
            .build(&london_disc(0.02))
            .unwrap();
        assert!(ids(&covers).is_superset(&ids(&centroid)));
        assert!(covers.len() > centroid.len());
    }

    #[test]
    fn osgb_region_is_returned_in_metres() {
        let region = Region::center(523_769.0, 180_824.0, 1_000.0, "osgb").unwrap();
        let grid = GridBuilder::new(8).unwrap().build(&region).unwrap();
        assert_eq!(grid.crs(), Crs::BritishNationalGrid);
        assert!(!grid.is_empty() && grid.len() < 20, "{} cells", grid.len());
        for cell in grid.cells() {
            for c in cell.geometry.exterior().coords() {
                assert!(c.x > 515_000.0 && c.x < 532_000.0, "easting {}", c.x);
                assert!(c.y > 172_000.0 && c.y < 189_000.0, "northing {}", c.y);
            }
        }
    }

    #[test]
    fn geographic_output_keeps_wgs84() {
        let region = Region::center(523_769.0, 180_824.0, 1_000.0, "osgb").unwrap();
        let builder = GridBuilder::new(8).unwrap();
        let projected = builder.build(&region).unwrap();
        let geographic = builder.geographic_output(true).build(&region).unwrap();
        assert_eq!(geographic.crs(), Crs::Wgs84);
        assert_eq!(ids(&projected), ids(&geographic));
    }

    #[test]
    fn reprojection_roundtrip_preserves_cells() {
        let grid = GridBuilder::new(9).unwrap().build(&london_disc(0.01)).unwrap();
        let projected = to_crs(&grid, Crs::BritishNationalGrid).unwrap();
        let back = to_crs(&projected, Crs::Wgs84).unwrap();

        assert_eq!(ids(&grid), ids(&back));
        for (a, b) in grid.cells().iter().zip(back.cells()) {
            assert_eq!(a.h3_ref, b.h3_ref);
            for (ca, cb) in a.geometry.exterior().coords().zip(b.geometry.exterior().coords()) {
                assert!((ca.x - cb.x).abs() < 1e-6 && (ca.y - cb.y).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn buffer_grows_a_boundary() {
        let square = polygon![
            (x: 530_000.0, y: 180_000.0),
            (x: 532_000.0, y: 180_000.0),
            (x: 532_000.0, y: 182_000.0),
            (x: 530_000.0, y: 182_000.0),
            (x: 530_000.0, y: 180_000.0),
        ];
        let boundary = Layer::new(Some(Crs::BritishNationalGrid), vec![Feature::new(square)]);

        let plain = make_h3_grid(&boundary, 9, 0.0).unwrap();
        let buffered = make_h3_grid(&boundary, 9, 500.0).unwrap();
        assert!(!plain.is_empty());
        assert!(ids(&buffered).is_superset(&ids(&plain)));
        assert!(buffered.len() > plain.len());
    }

    #[test]
    fn multi_part_boundary_is_dissolved() {
        let left = polygon![
            (x: -0.20, y: 51.50), (x: -0.15, y: 51.50), (x: -0.15, y: 51.53), (x: -0.20, y: 51.53), (x: -0.20, y: 51.50),
        ];
        let right = polygon![
            (x: -0.15, y: 51.50), (x: -0.10, y: 51.50), (x: -0.10, y: 51.53), (x: -0.15, y: 51.53), (x: -0.15, y: 51.50),
        ];
        let whole = polygon![
            (x: -0.20, y: 51.50), (x: -0.10, y: 51.50), (x: -0.10, y: 51.53), (x: -0.20, y: 51.53), (x: -0.20, y: 51.50),
        ];
        let split = Layer::new(
            Some(Crs::Wgs84),
            vec![Feature::new(left), Feature::new(right)],
        );
        let single = Layer::new(Some(Crs::Wgs84), vec![Feature::new(whole)]);

        let a = make_h3_grid(&split, 8, 0.0).unwrap();
        let b = make_h3_grid(&single, 8, 0.0).unwrap();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn zero_radius_yields_the_containing_cell() {
        let grid = GridBuilder::new(7).unwrap().build(&london_disc(0.0)).unwrap();
        let expected = LatLng::new(LONDON_LAT, LONDON_LON)
            .unwrap()
            .to_cell(Resolution::Seven);
        assert_eq!(grid.len(), 1);
        assert_eq!(grid.cells()[0].h3_ref, expected.to_string());
    }

    #[test]
    fn rejects_unknown_coordinate_system() {
        assert!(matches!(
            Region::center(0.0, 0.0, 1.0, "utm"),
            Err(GridError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn rejects_bad_resolution_and_buffer() {
        assert!(matches!(
            GridBuilder::new(16),
            Err(GridError::InvalidParameter { .. })
        ));
        let err = GridBuilder::new(8)
            .unwrap()
            .buffer(-1.0)
            .build(&london_disc(0.01))
            .unwrap_err();
        assert!(matches!(err, GridError::InvalidParameter { .. }));
    }

    #[test]
    fn rejects_undeclared_boundary() {
        let boundary = Layer::new(None, vec![Feature::new(Point::new(0.0, 0.0))]);
        assert!(matches!(
            make_h3_grid(&boundary, 8, 10.0),
            Err(GridError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn cells_tile_the_region_without_gaps() {
        let region = Region::center(523_769.0, 180_824.0, 1_500.0, "osgb").unwrap();
        let grid = GridBuilder::new(9).unwrap().build(&region).unwrap();
        // Stay clear of the edge, where planar and spherical tests can differ.
        let area = reproject_geometry(
            &dissolve(&region.geometries(), region.radius() - 25.0),
            Crs::BritishNationalGrid,
            Crs::Wgs84,
        )
        .unwrap();
        let cells = ids(&grid);

        let mut inside = 0;
        for id in &cells {
            let cell: CellIndex = id.parse().unwrap();
            let disk: Vec<CellIndex> = cell.grid_disk(1);
            for neighbour in disk {
                let center = LatLng::from(neighbour);
                if area.contains(&Point::new(center.lng(), center.lat())) {
                    inside += 1;
                    assert!(
                        cells.contains(&neighbour.to_string()),
                        "{neighbour} has its center in the region but is missing"
                    );
                }
            }
        }
        assert!(inside > grid.len(), "{inside} neighbours checked");
    }

    #[test]
    fn grid_from_disk_has_seven_unique_cells() {
        let origin = LatLng::new(LONDON_LAT, LONDON_LON)
            .unwrap()
            .to_cell(Resolution::Nine);
        let disk: Vec<CellIndex> = origin.grid_disk(1);
        let grid = grid_from_cells(disk).unwrap();
        assert_eq!(grid.len(), 7);
        assert!(grid.get(&origin.to_string()).is_some());
    }

    #[test]
    fn grid_layer_roundtrip() {
        let grid = GridBuilder::new(8).unwrap().build(&london_disc(0.01)).unwrap();
        let mut values = std::collections::BTreeMap::new();
        let first = grid.cells()[0].h3_ref.clone();
        values.insert(first.clone(), vec![7.0]);
        let grid = grid.merge_stats(&["count".to_string()], &values);

        let back = grid_from_layer(&grid.to_layer("h3_ref"), "h3_ref").unwrap();
        assert_eq!(ids(&back), ids(&grid));
        assert_eq!(back.get(&first).unwrap().stat("count"), Some(7.0));
    }
}
