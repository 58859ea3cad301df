//! Coordinate reprojection between the supported reference systems.
//!
//! Transforms go through `proj4rs`. British National Grid is the OSGB36
//! transverse Mercator on the Airy 1830 ellipsoid with the standard
//! 7-parameter Helmert shift to WGS84, accurate to a few metres, which is
//! well below the size of any H3 cell used for aggregation.

use geo::{Coord, Geometry, MapCoords};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use spatial_helper_layer_models::{Crs, Layer};

use crate::LayerError;

const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";
const BNG_PROJ: &str = "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 \
                        +x_0=400000 +y_0=-100000 +ellps=airy \
                        +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 \
                        +units=m +no_defs";

/// The proj string describing `crs`.
#[must_use]
pub const fn proj_string(crs: Crs) -> &'static str {
    match crs {
        Crs::Wgs84 => WGS84_PROJ,
        Crs::BritishNationalGrid => BNG_PROJ,
    }
}

/// A prepared transform from one reference system to another.
///
/// Geographic coordinates are `x = longitude`, `y = latitude` in degrees.
pub struct Transformer {
    from: Crs,
    to: Crs,
    source: Proj,
    target: Proj,
}

impl Transformer {
    /// Prepares a transform from `from` into `to`.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Projection`] if either definition is rejected.
    pub fn new(from: Crs, to: Crs) -> Result<Self, LayerError> {
        Ok(Self {
            from,
            to,
            source: parse_proj(from)?,
            target: parse_proj(to)?,
        })
    }

    /// Transforms a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Projection`] if the coordinate cannot be
    /// transformed.
    pub fn transform(&self, coord: Coord<f64>) -> Result<Coord<f64>, LayerError> {
        if self.from == self.to {
            return Ok(coord);
        }

        let mut point = if self.from.is_geographic() {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        transform(&self.source, &self.target, &mut point).map_err(|e| {
            LayerError::Projection {
                message: format!(
                    "cannot transform ({}, {}) from {} to {}: {e:?}",
                    coord.x, coord.y, self.from, self.to
                ),
            }
        })?;

        Ok(if self.to.is_geographic() {
            Coord {
                x: point.0.to_degrees(),
                y: point.1.to_degrees(),
            }
        } else {
            Coord {
                x: point.0,
                y: point.1,
            }
        })
    }

    /// Transforms every vertex of a geometry.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::Projection`] if any vertex fails.
    pub fn geometry<G>(&self, geometry: &G) -> Result<G, LayerError>
    where
        G: MapCoords<f64, f64, Output = G> + Clone,
    {
        if self.from == self.to {
            return Ok(geometry.clone());
        }
        geometry.try_map_coords(|c| self.transform(c))
    }
}

fn parse_proj(crs: Crs) -> Result<Proj, LayerError> {
    Proj::from_proj_string(proj_string(crs)).map_err(|e| LayerError::Projection {
        message: format!("invalid definition for {crs}: {e:?}"),
    })
}

/// Transforms a single coordinate from one reference system to another.
///
/// Prepares a fresh [`Transformer`]; use one directly for many coordinates.
///
/// # Errors
///
/// See [`Transformer::transform`].
pub fn transform_coord(coord: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>, LayerError> {
    Transformer::new(from, to)?.transform(coord)
}

/// Transforms every vertex of a geometry.
///
/// # Errors
///
/// See [`Transformer::geometry`].
pub fn reproject_geometry<G>(geometry: &G, from: Crs, to: Crs) -> Result<G, LayerError>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    Transformer::new(from, to)?.geometry(geometry)
}

/// Returns a copy of `layer` with every geometry transformed into `to`.
///
/// # Errors
///
/// Returns [`LayerError::UndeclaredCrs`] if the layer declares no CRS,
/// since there is nothing to transform *from*, or
/// [`LayerError::Projection`] if a geometry cannot be transformed.
pub fn reproject(layer: &Layer, to: Crs) -> Result<Layer, LayerError> {
    let from = layer.crs.ok_or_else(|| LayerError::UndeclaredCrs {
        context: format!("reprojecting to {to}"),
    })?;

    reproject_from(layer, from, to)
}

/// Transforms `layer` from `from` into `to`, ignoring its declaration.
pub(crate) fn reproject_from(layer: &Layer, from: Crs, to: Crs) -> Result<Layer, LayerError> {
    if from == to {
        return Ok(Layer::new(Some(to), layer.features.clone()));
    }

    log::debug!(
        "Reprojecting {} features from {from} to {to}",
        layer.len()
    );

    let transformer = Transformer::new(from, to)?;
    let features = layer
        .features
        .iter()
        .map(|feature| {
            let mut out = feature.clone();
            out.geometry = transformer.geometry::<Geometry<f64>>(&feature.geometry)?;
            Ok(out)
        })
        .collect::<Result<Vec<_>, LayerError>>()?;

    Ok(Layer::new(Some(to), features))
}
