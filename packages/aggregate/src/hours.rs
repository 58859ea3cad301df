//! Hour extraction and the hour statistics.

use spatial_helper_aggregate_models::{HourField, HourFormat};
use spatial_helper_layer_models::Layer;

use crate::AggregateError;

/// Reads the hour digits out of `value` at the fixed position `format`
/// dictates. Nothing else about the text is interpreted.
#[must_use]
pub fn parse_hour(value: &str, format: HourFormat) -> Option<u8> {
    value.get(format.span())?.parse().ok()
}

/// Parses the hour of every record.
///
/// # Errors
///
/// * [`AggregateError::SchemaMismatch`] if any record lacks the column.
/// * [`AggregateError::InvalidHour`] if a value is not text or its hour
///   digits are not a number.
pub fn record_hours(records: &Layer, field: &HourField) -> Result<Vec<u8>, AggregateError> {
    if !records.has_column(&field.column) {
        return Err(AggregateError::SchemaMismatch {
            column: field.column.clone(),
        });
    }

    records
        .features
        .iter()
        .enumerate()
        .map(|(row, feature)| {
            let text = feature.property_str(&field.column);
            text.and_then(|t| parse_hour(t, field.format))
                .ok_or_else(|| AggregateError::InvalidHour {
                    row,
                    value: feature
                        .property(&field.column)
                        .map_or_else(String::new, ToString::to_string),
                })
        })
        .collect()
}

/// Arithmetic mean; zero for an empty slice.
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / as_f64(values.len())
}

/// Median; the mean of the two middle values for an even count, zero for
/// an empty slice.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0,
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) const fn as_f64(n: usize) -> f64 {
    n as f64
}
