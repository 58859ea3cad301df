#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Aggregation options and configuration.
//!
//! [`AggregationConfig`] is deserialized from TOML. A default covering the
//! MPS CAD and CRIS extract schemas is embedded at compile time and
//! returned by [`AggregationConfig::embedded`].

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spatial_helper_layer_models::Feature;
use strum_macros::{AsRefStr, Display, EnumString};

/// Record count column.
pub const COUNT: &str = "count";
/// Mean hour column.
pub const MEAN_HR: &str = "mean_hr";
/// Median hour column.
pub const MEDIAN_HR: &str = "median_hr";
/// Harm-weighted count column.
pub const CCHI_SCORE: &str = "CCHI_score";

/// First hour of the day window.
pub const DAY_START_HOUR: u8 = 6;
/// Last hour of the day window, inclusive.
pub const DAY_END_HOUR: u8 = 19;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Layout of the text an hour is read from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HourFormat {
    /// Compact `YYYYMMDDHH...` timestamp; the hour is characters 9–10.
    DateTime,
    /// `HH:MM`-style time; the hour is the leading two characters.
    Time,
}

impl HourFormat {
    /// Byte range of the hour digits.
    #[must_use]
    pub const fn span(self) -> Range<usize> {
        match self {
            Self::DateTime => 8..10,
            Self::Time => 0..2,
        }
    }
}

/// Where a record's hour comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourField {
    /// Property holding the timestamp text.
    pub column: String,
    /// How to read the hour out of it.
    pub format: HourFormat,
}

impl HourField {
    /// Creates an hour field.
    #[must_use]
    pub fn new(column: impl Into<String>, format: HourFormat) -> Self {
        Self {
            column: column.into(),
            format,
        }
    }

    /// CAD incidents: `IncidentTime`, leading `HH`.
    #[must_use]
    pub fn incident_time() -> Self {
        Self::new("IncidentTime", HourFormat::Time)
    }

    /// CRIS crime reports: `SUPV_CR_Recorded_Date`, characters 9–10.
    #[must_use]
    pub fn recorded_date() -> Self {
        Self::new("SUPV_CR_Recorded_Date", HourFormat::DateTime)
    }
}

/// Time-of-day window applied before aggregation.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TimeWindow {
    /// Every hour.
    #[default]
    All,
    /// 06:00 through 19:59.
    Day,
    /// 20:00 through 05:59.
    Night,
}

impl TimeWindow {
    /// Whether `hour` falls inside this window.
    #[must_use]
    pub const fn contains(self, hour: u8) -> bool {
        match self {
            Self::All => true,
            Self::Day => matches!(hour, DAY_START_HOUR..=DAY_END_HOUR),
            Self::Night => !matches!(hour, DAY_START_HOUR..=DAY_END_HOUR),
        }
    }
}

/// How statistic columns are labelled so several aggregations can share
/// one grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ColumnNaming {
    /// `count`, `mean_hr`, `median_hr`.
    #[default]
    Plain,
    /// `{label}_count`.
    Prefix(String),
    /// `count_{label}`.
    Suffix(String),
}

impl ColumnNaming {
    /// Returns the column name for statistic `stat`.
    #[must_use]
    pub fn apply(&self, stat: &str) -> String {
        match self {
            Self::Plain => stat.to_string(),
            Self::Prefix(label) => format!("{label}_{stat}"),
            Self::Suffix(label) => format!("{stat}_{label}"),
        }
    }
}

/// Keeps only records whose `column` equals `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryFilter {
    /// Property to test.
    pub column: String,
    /// Required value.
    pub value: String,
}

impl CategoryFilter {
    /// Creates a filter.
    #[must_use]
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether `feature` passes the filter. Numbers compare by their text.
    #[must_use]
    pub fn matches(&self, feature: &Feature) -> bool {
        feature.property_text(&self.column).as_deref() == Some(self.value.as_str())
    }
}

/// One category of a [`CategoryTable`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Classification label records must carry.
    pub value: String,
    /// Suffix of this category's statistic columns.
    pub suffix: String,
}

/// Classification labels aggregated side by side on one grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTable {
    /// Property holding the classification label.
    pub column: String,
    /// Categories in output column order.
    #[serde(default)]
    pub entries: Vec<Category>,
}

impl CategoryTable {
    /// Filter selecting the records of `category`.
    #[must_use]
    pub fn filter(&self, category: &Category) -> CategoryFilter {
        CategoryFilter::new(self.column.clone(), category.value.clone())
    }
}

/// Drops records logged against a fixed location with a given label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRule {
    /// Required easting/longitude property value.
    pub x: f64,
    /// Required northing/latitude property value.
    pub y: f64,
    /// Property holding the label.
    pub column: String,
    /// Label to exclude.
    pub value: String,
    /// Property holding the x coordinate.
    #[serde(default = "default_x_column")]
    pub x_column: String,
    /// Property holding the y coordinate.
    #[serde(default = "default_y_column")]
    pub y_column: String,
}

fn default_x_column() -> String {
    "X".to_string()
}

fn default_y_column() -> String {
    "Y".to_string()
}

impl ExclusionRule {
    /// Whether `feature` should be dropped.
    ///
    /// Coordinates are compared exactly against the attribute columns, not
    /// the geometry.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn matches(&self, feature: &Feature) -> bool {
        let number = |key: &str| match feature.property(key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        number(&self.x_column) == Some(self.x)
            && number(&self.y_column) == Some(self.y)
            && feature.property_str(&self.column) == Some(self.value.as_str())
    }
}

/// Harm weight per minor crime classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HarmLookup(BTreeMap<String, f64>);

impl HarmLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Sets the weight of a classification.
    pub fn insert(&mut self, minor_class: impl Into<String>, weight: f64) {
        self.0.insert(minor_class.into(), weight);
    }

    /// Weight of a classification, if known.
    #[must_use]
    pub fn weight(&self, minor_class: &str) -> Option<f64> {
        self.0.get(minor_class).copied()
    }

    /// Number of classifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no classifications are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for HarmLookup {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Complete aggregation configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregationConfig {
    /// Fair-assignment shuffle seed; the join default when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Hour field of CAD incident records.
    #[serde(default = "HourField::incident_time")]
    pub incidents: HourField,
    /// Hour field of CRIS crime records.
    #[serde(default = "HourField::recorded_date")]
    pub crimes: HourField,
    /// Categories aggregated side by side.
    pub categories: CategoryTable,
    /// Records dropped before aggregation.
    #[serde(default)]
    pub exclusions: Vec<ExclusionRule>,
    /// Harm weights per minor classification.
    #[serde(default)]
    pub harm: HarmLookup,
}

impl AggregationConfig {
    /// Parses a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or misses a required
    /// table.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::de::from_str(text)
    }

    /// The configuration compiled into the binary.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time guarantee
    /// covered by tests).
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml(DEFAULT_CONFIG)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default.toml: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use geo::Point;

    use super::*;

    #[test]
    fn embedded_config_parses() {
        let config = AggregationConfig::embedded();
        assert_eq!(config.incidents, HourField::incident_time());
        assert_eq!(config.crimes, HourField::recorded_date());
        assert_eq!(config.categories.column, "OpeningCode_Description");
        let suffixes: Vec<&str> = config
            .categories
            .entries
            .iter()
            .map(|c| c.suffix.as_str())
            .collect();
        assert_eq!(suffixes, vec!["violence", "asb_nuisance", "VAP"]);
        assert_eq!(config.exclusions.len(), 1);
        assert!(config.harm.is_empty());
        assert_eq!(config.seed, None);
    }

    #[test]
    fn harm_table_and_seed_from_toml() {
        let config = AggregationConfig::from_toml(
            r#"
            seed = 7

            [categories]
            column = "Major"

            [harm]
            "Common Assault" = 1.5
            "Burglary In A Dwelling" = 120.0
            "#,
        )
        .unwrap();
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.harm.weight("Common Assault"), Some(1.5));
        assert_eq!(config.harm.weight("Robbery"), None);
        assert!(config.categories.entries.is_empty());
        assert_eq!(config.incidents, HourField::incident_time());
    }

    #[test]
    fn rejects_config_without_categories() {
        assert!(AggregationConfig::from_toml("seed = 1").is_err());
    }

    #[test]
    fn hour_spans() {
        let stamp = "20210314051200";
        let time = "23:59";
        assert_eq!(&stamp[HourFormat::DateTime.span()], "05");
        assert_eq!(&time[HourFormat::Time.span()], "23");
    }

    #[test]
    fn unknown_flag_values_are_std_errors() {
        let err: Box<dyn std::error::Error> = "dusk".parse::<TimeWindow>().unwrap_err().into();
        assert!(!err.to_string().is_empty());
        let err: Box<dyn std::error::Error> = "epoch".parse::<HourFormat>().unwrap_err().into();
        assert!(!err.to_string().is_empty());
        assert_eq!("night".parse::<TimeWindow>().unwrap(), TimeWindow::Night);
    }

    #[test]
    fn windows_split_the_day() {
        let day: Vec<u8> = [5, 6, 12, 19, 20]
            .into_iter()
            .filter(|&h| TimeWindow::Day.contains(h))
            .collect();
        let night: Vec<u8> = [5, 6, 12, 19, 20]
            .into_iter()
            .filter(|&h| TimeWindow::Night.contains(h))
            .collect();
        assert_eq!(day, vec![6, 12, 19]);
        assert_eq!(night, vec![5, 20]);
        assert!((0..24).all(|h| TimeWindow::Day.contains(h) != TimeWindow::Night.contains(h)));
    }

    #[test]
    fn column_naming() {
        assert_eq!(ColumnNaming::Plain.apply(COUNT), "count");
        assert_eq!(ColumnNaming::Prefix("day".into()).apply(COUNT), "day_count");
        assert_eq!(
            ColumnNaming::Suffix("VAP".into()).apply(MEDIAN_HR),
            "median_hr_VAP"
        );
    }

    #[test]
    fn exclusion_matches_attributes_not_geometry() {
        let rule = AggregationConfig::embedded().exclusions.remove(0);
        let shout = Feature::new(Point::new(0.0, 0.0))
            .with_property("X", 523_769)
            .with_property("Y", "180824")
            .with_property("OpeningCode_Description", "Concern For Safety");
        let other = shout
            .clone()
            .with_property("OpeningCode_Description", "ASB Nuisance");
        assert!(rule.matches(&shout));
        assert!(!rule.matches(&other));
    }

    #[test]
    fn category_filter_compares_text() {
        let filter = CategoryFilter::new("type", "pub");
        let a = Feature::new(Point::new(0.0, 0.0)).with_property("type", "pub");
        let b = Feature::new(Point::new(0.0, 0.0)).with_property("type", "cafe");
        assert!(filter.matches(&a));
        assert!(!filter.matches(&b));
    }
}
