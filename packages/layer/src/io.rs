//! `GeoJSON` reading and writing for [`Layer`]s.
//!
//! RFC 7946 dropped the `crs` member, but files exported from desktop GIS
//! tools still carry the legacy form:
//!
//! ```json
//! "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::27700" } }
//! ```
//!
//! When present it becomes the layer's declared CRS. When absent the layer
//! is left *undeclared* rather than assumed to be WGS84, so that the caller
//! decides between assigning and reprojecting.

use std::path::Path;

use geojson::{FeatureCollection, GeoJson, JsonObject};
use serde_json::{Value, json};
use spatial_helper_layer_models::{Crs, Feature, Layer};

use crate::LayerError;

/// Reads a `GeoJSON` file into a layer.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid `GeoJSON`,
/// or if it declares an unsupported CRS.
pub fn read_layer(path: &Path) -> Result<Layer, LayerError> {
    let text = std::fs::read_to_string(path)?;
    let layer = parse_layer(&text)?;
    log::info!(
        "Loaded {} features from {} ({})",
        layer.len(),
        path.display(),
        layer
            .crs
            .map_or_else(|| "no declared CRS".to_string(), |c| c.to_string())
    );
    Ok(layer)
}

/// Parses `GeoJSON` text into a layer.
///
/// Accepts a `FeatureCollection`, a single `Feature`, or a bare geometry.
/// Features without a geometry are skipped.
///
/// # Errors
///
/// Returns an error if the text is not valid `GeoJSON` or declares an
/// unsupported CRS.
pub fn parse_layer(text: &str) -> Result<Layer, LayerError> {
    let geojson: GeoJson = text.parse()?;

    match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = legacy_crs(collection.foreign_members.as_ref())?;
            let mut features = Vec::with_capacity(collection.features.len());
            for (idx, feature) in collection.features.into_iter().enumerate() {
                match convert_feature(feature)? {
                    Some(f) => features.push(f),
                    None => log::warn!("Skipping feature {idx} with no geometry"),
                }
            }
            Ok(Layer::new(crs, features))
        }
        GeoJson::Feature(feature) => {
            let crs = legacy_crs(feature.foreign_members.as_ref())?;
            let features = convert_feature(feature)?.into_iter().collect();
            Ok(Layer::new(crs, features))
        }
        GeoJson::Geometry(geometry) => {
            let crs = legacy_crs(geometry.foreign_members.as_ref())?;
            let geometry: geo::Geometry<f64> = geometry.try_into()?;
            Ok(Layer::new(crs, vec![Feature::new(geometry)]))
        }
    }
}

fn convert_feature(feature: geojson::Feature) -> Result<Option<Feature>, LayerError> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };
    let geometry: geo::Geometry<f64> = geometry.try_into()?;
    Ok(Some(Feature {
        geometry,
        properties: feature.properties.unwrap_or_default(),
    }))
}

/// Extracts `crs.properties.name` from a legacy `GeoJSON` object.
fn legacy_crs(foreign: Option<&JsonObject>) -> Result<Option<Crs>, LayerError> {
    let Some(name) = foreign
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    Ok(Some(name.parse()?))
}

/// Converts a layer into a `GeoJSON` `FeatureCollection`.
///
/// A declared CRS is written using the legacy `crs` member so that the
/// file round-trips through [`parse_layer`].
#[must_use]
pub fn to_geojson(layer: &Layer) -> GeoJson {
    let features = layer
        .features
        .iter()
        .map(|feature| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(
                &feature.geometry,
            ))),
            id: None,
            properties: Some(feature.properties.clone()),
            foreign_members: None,
        })
        .collect();

    let foreign_members = layer.crs.map(|crs| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) },
            }),
        );
        members
    });

    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    })
}

/// Writes a layer to a `GeoJSON` file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_layer(layer: &Layer, path: &Path) -> Result<(), LayerError> {
    std::fs::write(path, to_geojson(layer).to_string())?;
    log::info!("Wrote {} features to {}", layer.len(), path.display());
    Ok(())
}
