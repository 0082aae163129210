//! Numeric conversions shared by the models and the HTTP clients.
//!
//! Coordinates are stored as NUMERIC so a resolved position round-trips
//! exactly; the HTTP clients work in f64. Non-finite inputs become
//! `Decimal::ZERO`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

/// Longest response body kept in a `Response` error.
const ERROR_BODY_PREVIEW_LEN: usize = 300;

/// Convert an f64 to Decimal preserving full precision.
pub(crate) fn f64_to_decimal_full(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_full received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_f64(v).unwrap_or_else(|| Decimal::new(v as i64, 0))
}

/// Convert an optional f64 to Decimal, returning None if input is None.
pub(crate) fn opt_f64_to_decimal_full(v: Option<f64>) -> Option<Decimal> {
    v.map(f64_to_decimal_full)
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Convert an Option<Decimal> to Option<f64>.
pub(crate) fn opt_dec_to_f64(d: Option<Decimal>) -> Option<f64> {
    d.map(dec_to_f64)
}

/// Deserialize any JSON number into an `i32`, truncating a fractional part.
pub(crate) fn whole_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    number_to_i32(f64::deserialize(deserializer)?)
}

/// Like [`whole_number`], with `null` as `None`.
pub(crate) fn opt_whole_number<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(number_to_i32)
        .transpose()
}

fn number_to_i32<E: serde::de::Error>(v: f64) -> Result<i32, E> {
    let truncated = v.trunc();
    if !truncated.is_finite() || truncated < i32::MIN as f64 || truncated > i32::MAX as f64 {
        return Err(E::custom(format!("{} does not fit a 32-bit integer", v)));
    }
    Ok(truncated as i32)
}

/// Cap an HTTP error body at a fixed length, on a char boundary.
pub(crate) fn error_body_preview(body: &str) -> String {
    if body.len() <= ERROR_BODY_PREVIEW_LEN {
        return body.to_string();
    }
    let mut end = ERROR_BODY_PREVIEW_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
