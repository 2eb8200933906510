use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value (lots) - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Symbol identifier for a tradeable instrument (e.g. `EURUSD`)
pub type Symbol = String;

/// Convert a timestamp to fractional seconds since the Unix epoch (wire format)
pub fn to_epoch_seconds(ts: Timestamp) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

/// Convert fractional seconds since the Unix epoch to a timestamp
///
/// Returns `None` for values that are not finite or out of chrono's range.
pub fn from_epoch_seconds(secs: f64) -> Option<Timestamp> {
    if !secs.is_finite() {
        return None;
    }
    let micros = (secs * 1_000_000.0).round() as i64;
    Utc.timestamp_micros(micros).single()
}
