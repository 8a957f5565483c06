//! Common types used across IWK

use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IwkError, Result};

/// Delivery timestamp layout used by order files and the orders API.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Number of decimal places monetary amounts are rounded to.
pub const MONEY_SCALE: i64 = 2;

/// Names of the taxing authorities a delivery point falls under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    pub state: String,
    pub county: String,
    pub city: String,
    pub special: String,
}

impl Jurisdiction {
    pub fn new(
        state: impl Into<String>,
        county: impl Into<String>,
        city: impl Into<String>,
        special: impl Into<String>,
    ) -> Self {
        Self {
            state: state.into(),
            county: county.into(),
            city: city.into(),
            special: special.into(),
        }
    }
}

/// Per-authority components of a composite tax rate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub state_rate: BigDecimal,
    pub county_rate: BigDecimal,
    pub city_rate: BigDecimal,
    pub special_rate: BigDecimal,
}

/// A composite rate together with its breakdown, as stored per jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRate {
    pub composite: BigDecimal,
    pub breakdown: TaxBreakdown,
}

/// A delivery order enriched with its jurisdiction and computed taxes.
///
/// Built once through [`Order::new`], which derives the tax and total from
/// the subtotal and rate, so the monetary fields are always consistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub subtotal: BigDecimal,
    pub composite_tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub total_amount: BigDecimal,
    pub breakdown: TaxBreakdown,
    pub jurisdiction: Jurisdiction,
    pub timestamp: DateTime<Utc>,
}

impl Order {
    pub fn new(
        latitude: f64,
        longitude: f64,
        subtotal: BigDecimal,
        rate: TaxRate,
        jurisdiction: Jurisdiction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (tax_amount, total_amount) = compute_tax(&subtotal, &rate.composite);

        Self {
            id: Uuid::new_v4(),
            latitude,
            longitude,
            subtotal,
            composite_tax_rate: rate.composite,
            tax_amount,
            total_amount,
            breakdown: rate.breakdown,
            jurisdiction,
            timestamp,
        }
    }

    /// Breakdown as a JSON document, the shape stored in `orders.breakdown`
    pub fn breakdown_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.breakdown)?)
    }

    /// Jurisdiction as a JSON document, the shape stored in `orders.jurisdictions`
    pub fn jurisdiction_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(&self.jurisdiction)?)
    }
}

/// Compute `(tax, total)` for a subtotal at the given composite rate.
///
/// Tax is rounded half away from zero to [`MONEY_SCALE`] places; the total is
/// the exact sum of subtotal and rounded tax.
pub fn compute_tax(subtotal: &BigDecimal, rate: &BigDecimal) -> (BigDecimal, BigDecimal) {
    let tax = (subtotal * rate).with_scale_round(MONEY_SCALE, RoundingMode::HalfUp);
    let total = subtotal + &tax;
    (tax, total)
}

/// Parse a decimal amount such as `"49.99"` without going through floats.
pub fn parse_amount(value: &str) -> Result<BigDecimal> {
    BigDecimal::from_str(value.trim()).map_err(|e| IwkError::InvalidAmount {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a `YYYY-MM-DD HH:MM:SS` delivery timestamp, interpreted as UTC.
pub fn parse_delivery_timestamp(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| IwkError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Parse a latitude (`axis = "latitude"`) or longitude in decimal degrees.
pub fn parse_coordinate(axis: &'static str, value: &str) -> Result<f64> {
    let limit = if axis == "latitude" { 90.0 } else { 180.0 };
    let invalid = || IwkError::InvalidCoordinate {
        axis,
        value: value.to_string(),
    };

    let parsed: f64 = value.trim().parse().map_err(|_| invalid())?;
    if !parsed.is_finite() || parsed.abs() > limit {
        return Err(invalid());
    }
    Ok(parsed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn nyc_rate() -> TaxRate {
        TaxRate {
            composite: dec("0.08875"),
            breakdown: TaxBreakdown {
                state_rate: dec("0.04"),
                county_rate: dec("0.045"),
                city_rate: dec("0"),
                special_rate: dec("0.00375"),
            },
        }
    }

    #[test]
    fn test_compute_tax_exact() {
        let (tax, total) = compute_tax(&dec("120.00"), &dec("0.08875"));
        assert_eq!(tax, dec("10.65"));
        assert_eq!(total, dec("130.65"));
    }

    #[test]
    fn test_compute_tax_rounds_half_up() {
        // 10.00 * 0.0625 = 0.625, banker's rounding would give 0.62
        let (tax, total) = compute_tax(&dec("10.00"), &dec("0.0625"));
        assert_eq!(tax.to_string(), "0.63");
        assert_eq!(total.to_string(), "10.63");

        let (tax, _) = compute_tax(&dec("50.10"), &dec("0.0875"));
        assert_eq!(tax, dec("4.38"));
    }

    #[test]
    fn test_compute_tax_no_float_artifacts() {
        // 0.1 + 0.2 style inputs that drift in binary floating point
        let (tax, total) = compute_tax(&dec("0.30"), &dec("0.1"));
        assert_eq!(tax.to_string(), "0.03");
        assert_eq!(total.to_string(), "0.33");
    }

    #[test]
    fn test_order_new_derives_amounts() {
        let timestamp = parse_delivery_timestamp("2025-11-04 14:30:00").unwrap();
        let order = Order::new(
            40.7128,
            -74.0060,
            dec("120.00"),
            nyc_rate(),
            Jurisdiction::new("New York", "New York", "New York", ""),
            timestamp,
        );

        assert_eq!(order.tax_amount, dec("10.65"));
        assert_eq!(order.total_amount, dec("130.65"));
        assert_eq!(order.composite_tax_rate, dec("0.08875"));
        assert_eq!(order.breakdown.special_rate, dec("0.00375"));
    }

    #[test]
    fn test_order_json_shapes() {
        let order = Order::new(
            40.7,
            -74.0,
            dec("10"),
            nyc_rate(),
            Jurisdiction::new("New York", "Kings", "Brooklyn", ""),
            Utc::now(),
        );

        let breakdown = order.breakdown_json().unwrap();
        assert!(breakdown.get("stateRate").is_some());
        assert!(breakdown.get("specialRate").is_some());

        let jurisdiction = order.jurisdiction_json().unwrap();
        assert_eq!(jurisdiction["county"], "Kings");
        assert_eq!(jurisdiction["city"], "Brooklyn");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 49.99 ").unwrap(), dec("49.99"));
        assert!(matches!(
            parse_amount("12,50"),
            Err(IwkError::InvalidAmount { .. })
        ));
        assert!(parse_amount("").is_err());
    }

    #[test]
    fn test_parse_delivery_timestamp() {
        let ts = parse_delivery_timestamp("2025-11-04 14:30:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-11-04T14:30:00+00:00");

        assert!(parse_delivery_timestamp("2025-11-04T14:30:00").is_err());
        assert!(parse_delivery_timestamp("04/11/2025 14:30").is_err());
    }

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("latitude", "40.7128").unwrap(), 40.7128);
        assert_eq!(parse_coordinate("longitude", "-74.006").unwrap(), -74.006);
        assert!(parse_coordinate("latitude", "91").is_err());
        assert!(parse_coordinate("longitude", "NaN").is_err());
        assert!(parse_coordinate("longitude", "abc").is_err());
    }

    proptest! {
        #[test]
        fn prop_total_is_subtotal_plus_rounded_tax(cents in 0u64..10_000_000, rate_units in 0u64..200_000) {
            let subtotal = BigDecimal::new(cents.into(), 2);
            let rate = BigDecimal::new(rate_units.into(), 5);

            let (tax, total) = compute_tax(&subtotal, &rate);

            prop_assert_eq!(&total, &(&subtotal + &tax));
            prop_assert_eq!(tax.as_bigint_and_exponent().1, MONEY_SCALE);

            let exact = &subtotal * &rate;
            let diff = (&exact - &tax).abs();
            prop_assert!(diff <= BigDecimal::new(5.into(), 3));
        }
    }
}
