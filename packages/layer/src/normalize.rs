//! CRS alignment between two layers prior to any spatial join.

use spatial_helper_layer_models::{Crs, Layer};

use crate::LayerError;
use crate::reproject::reproject_from;

/// Returns `layer` expressed in `target`.
///
/// * Declared and different: coordinates are reprojected.
/// * Undeclared: `target` is *assigned*; coordinates are untouched.
/// * Already `target`: returned as is.
///
/// # Errors
///
/// Returns [`LayerError::Projection`] if a geometry cannot be reprojected.
pub fn align_to(target: Crs, layer: &Layer) -> Result<Layer, LayerError> {
    match layer.crs {
        Some(crs) if crs == target => Ok(layer.clone()),
        Some(from) => reproject_from(layer, from, target),
        None => {
            log::debug!(
                "Layer has no declared CRS; assigning {target} to {} features",
                layer.len()
            );
            Ok(assign_crs(layer, target))
        }
    }
}

/// Aligns `other` to the reference system of `reference`.
///
/// # Errors
///
/// Returns [`LayerError::UndeclaredCrs`] if `reference` itself declares no
/// CRS; there is then no system to align to.
pub fn align_layers(reference: &Layer, other: &Layer) -> Result<Layer, LayerError> {
    let target = reference.crs.ok_or_else(|| LayerError::UndeclaredCrs {
        context: "aligning layers against a reference".to_string(),
    })?;
    align_to(target, other)
}

/// Labels `layer` with `crs` without transforming any coordinate.
///
/// Overrides an existing declaration. Only correct when the coordinates are
/// known to already be in `crs`.
#[must_use]
pub fn assign_crs(layer: &Layer, crs: Crs) -> Layer {
    if let Some(previous) = layer.crs.filter(|&c| c != crs) {
        log::warn!("Overriding declared {previous} with {crs} without reprojecting");
    }
    Layer::new(Some(crs), layer.features.clone())
}
