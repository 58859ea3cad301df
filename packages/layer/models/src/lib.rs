#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature, layer and coordinate reference system types.
//!
//! A [`Layer`] is the in-memory equivalent of a spatial table: a list of
//! [`Feature`]s (geometry plus a property map) and an optional declared
//! [`Crs`]. Every other crate in the workspace consumes or produces layers.

use std::str::FromStr;

use geo::Geometry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// A coordinate reference system the toolchain knows how to handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// WGS84 longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// OSGB36 British National Grid eastings/northings in metres (EPSG:27700).
    BritishNationalGrid,
}

impl Crs {
    /// Returns the EPSG code of this reference system.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::BritishNationalGrid => 27700,
        }
    }

    /// Looks up a reference system by EPSG code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is not one of the supported systems.
    pub fn from_epsg(code: u32) -> Result<Self, UnsupportedCrsError> {
        match code {
            4326 => Ok(Self::Wgs84),
            27700 => Ok(Self::BritishNationalGrid),
            _ => Err(UnsupportedCrsError {
                name: format!("EPSG:{code}"),
            }),
        }
    }

    /// Whether coordinates are angular degrees rather than linear units.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Wgs84)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = UnsupportedCrsError;

    /// Accepts `EPSG:4326`, `epsg:27700`, OGC URNs such as
    /// `urn:ogc:def:crs:EPSG::27700`, and `urn:ogc:def:crs:OGC:1.3:CRS84`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unsupported = || UnsupportedCrsError {
            name: trimmed.to_string(),
        };

        if trimmed.eq_ignore_ascii_case("urn:ogc:def:crs:OGC:1.3:CRS84")
            || trimmed.eq_ignore_ascii_case("CRS84")
        {
            return Ok(Self::Wgs84);
        }

        let code = trimmed
            .rsplit(':')
            .next()
            .filter(|_| trimmed.to_ascii_uppercase().contains("EPSG"))
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(unsupported)?;

        Self::from_epsg(code).map_err(|_| unsupported())
    }
}

impl TryFrom<String> for Crs {
    type Error = UnsupportedCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.to_string()
    }
}

/// Error returned when a CRS name or EPSG code is not supported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedCrsError {
    /// The reference system name that could not be resolved.
    pub name: String,
}

impl std::fmt::Display for UnsupportedCrsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported coordinate reference system {:?}: expected EPSG:4326 or EPSG:27700",
            self.name
        )
    }
}

impl std::error::Error for UnsupportedCrsError {}

/// Coordinate-system tag used when a region is given as a bare coordinate.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CoordinateSystem {
    /// British National Grid eastings/northings (EPSG:27700).
    Osgb,
    /// Longitude/latitude in degrees (EPSG:4326).
    LatLon,
}

impl CoordinateSystem {
    /// Parses a coordinate-system tag (`"osgb"` or `"lat_lon"`).
    ///
    /// # Errors
    ///
    /// Returns an error for any other tag.
    pub fn from_tag(tag: &str) -> Result<Self, InvalidCoordinateSystemError> {
        tag.parse().map_err(|_| InvalidCoordinateSystemError {
            tag: tag.to_string(),
        })
    }

    /// The reference system coordinates tagged with this value are in.
    #[must_use]
    pub const fn crs(self) -> Crs {
        match self {
            Self::Osgb => Crs::BritishNationalGrid,
            Self::LatLon => Crs::Wgs84,
        }
    }
}

/// Error returned for an unrecognised coordinate-system tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidCoordinateSystemError {
    /// The tag that was provided.
    pub tag: String,
}

impl std::fmt::Display for InvalidCoordinateSystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate system {:?}: expected \"osgb\" or \"lat_lon\"",
            self.tag
        )
    }
}

impl std::error::Error for InvalidCoordinateSystemError {}

/// A single spatial record: a geometry plus its attribute columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Point, line or polygon geometry in the owning layer's CRS.
    pub geometry: Geometry<f64>,
    /// Attribute columns keyed by column name.
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Creates a feature with no attributes.
    #[must_use]
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: Map::new(),
        }
    }

    /// Builder-style helper that sets one attribute.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns an attribute value, if present.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Returns an attribute as a string slice when it is a JSON string.
    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Returns an attribute as text, stringifying numbers.
    ///
    /// Identifier columns arrive as either strings or numbers depending
    /// on the source file, so join keys go through this.
    #[must_use]
    pub fn property_text(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// An ordered collection of features sharing one reference system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    /// Declared reference system. `None` means the coordinates carry no
    /// declaration and are interpreted by whoever consumes them.
    pub crs: Option<Crs>,
    /// Features in source order.
    pub features: Vec<Feature>,
}

impl Layer {
    /// Creates a layer.
    #[must_use]
    pub const fn new(crs: Option<Crs>, features: Vec<Feature>) -> Self {
        Self { crs, features }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Whether every feature carries the given attribute.
    ///
    /// An empty layer trivially has every column.
    #[must_use]
    pub fn has_column(&self, key: &str) -> bool {
        self.features.iter().all(|f| f.properties.contains_key(key))
    }

    /// Returns a new layer holding only the features that satisfy
    /// `predicate`, keeping the declared CRS.
    #[must_use]
    pub fn filtered(&self, mut predicate: impl FnMut(&Feature) -> bool) -> Self {
        Self {
            crs: self.crs,
            features: self
                .features
                .iter()
                .filter(|f| predicate(f))
                .cloned()
                .collect(),
        }
    }

    /// Appends every feature of `other`, which must be in the same CRS.
    ///
    /// Returns `false` (and leaves `self` untouched) when the declared
    /// reference systems differ.
    pub fn extend_from(&mut self, other: &Self) -> bool {
        if self.crs != other.crs {
            return false;
        }
        self.features.extend(other.features.iter().cloned());
        true
    }
}
