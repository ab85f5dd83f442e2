//! # Money Module
//!
//! Spend amounts handed to the accrual path.
//!
//! ## Why Integer Minor Units?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  12.49 as f64 = 12.4900000000000002131628...                           │
//! │  12.49 * 100  = 1248.9999999999998  → truncates to 1248  ❌ WRONG!     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    1249 cents × 10000 bps / (10000 × 100) = 12 points  ✓               │
//! │    Truncation is exact and always rounds DOWN                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::points::AccrualRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents for USD).
///
/// ## Design Decisions
/// - **i64 (signed)**: a refund-shaped negative value is representable so it
///   can be rejected explicitly rather than wrapping
/// - **No currency field**: the currency travels next to the amount in
///   [`Spend`], since the exponent comes from program configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::Money;
    ///
    /// let spend = Money::from_minor(1249); // 12.49
    /// assert_eq!(spend.minor(), 1249);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Converts the amount to points, always rounding DOWN.
    ///
    /// ## Formula
    /// ```text
    /// points = floor( minor × rate_bps / (10_000 × 10^exponent) )
    /// ```
    /// `rate_bps` is points per major unit in basis points, so 10 000 means
    /// one point per dollar. The product is computed in `i128`; a result that
    /// does not fit in `i64` saturates to `i64::MAX` and is rejected by the
    /// caller's overflow check.
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::Money;
    /// use loyalty_core::points::AccrualRate;
    ///
    /// let one_per_dollar = AccrualRate::from_bps(10_000);
    /// assert_eq!(Money::from_minor(1249).to_points(one_per_dollar, 2), 12);
    /// assert_eq!(Money::from_minor(99).to_points(one_per_dollar, 2), 0);
    ///
    /// // 1.5 points per unit of a zero-decimal currency (JPY)
    /// let one_and_half = AccrualRate::from_bps(15_000);
    /// assert_eq!(Money::from_minor(3).to_points(one_and_half, 0), 4);
    /// ```
    ///
    /// Negative amounts yield zero; callers validate the sign first. An
    /// exponent too large for the divisor also yields zero.
    pub fn to_points(&self, rate: AccrualRate, exponent: u32) -> i64 {
        if self.0 <= 0 {
            return 0;
        }

        // The numerator stays below 10^29, so a divisor past i128 floors to 0.
        let divisor = match 10i128
            .checked_pow(exponent)
            .and_then(|scale| scale.checked_mul(10_000))
        {
            Some(divisor) => divisor,
            None => return 0,
        };
        let points = (self.0 as i128 * rate.bps() as i128) / divisor;

        i64::try_from(points).unwrap_or(i64::MAX)
    }
}

/// Display for logs; the exponent is not known here so minor units are shown.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} minor units", self.0)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Spend
// =============================================================================

/// A purchase amount presented at accrual time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Spend {
    /// Amount in minor units.
    pub amount: Money,
    /// ISO 4217 currency code, e.g. "USD".
    pub currency: String,
}

impl Spend {
    pub fn new(amount: Money, currency: impl Into<String>) -> Self {
        Spend {
            amount,
            currency: currency.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1249);
        assert_eq!(money.minor(), 1249);
        assert!(!money.is_negative());
        assert!(Money::from_minor(-1).is_negative());
    }

    #[test]
    fn test_to_points_rounds_down() {
        let rate = AccrualRate::from_bps(10_000);
        // 12.49 at 1.0 point/unit = 12, never 13
        assert_eq!(Money::from_minor(1249).to_points(rate, 2), 12);
        assert_eq!(Money::from_minor(1299).to_points(rate, 2), 12);
        assert_eq!(Money::from_minor(1300).to_points(rate, 2), 13);
    }

    #[test]
    fn test_to_points_fractional_rate() {
        // 0.5 points per unit: 25.00 → 12.5 → 12
        let rate = AccrualRate::from_bps(5_000);
        assert_eq!(Money::from_minor(2500).to_points(rate, 2), 12);
    }

    #[test]
    fn test_to_points_non_positive_amount() {
        let rate = AccrualRate::from_bps(10_000);
        assert_eq!(Money::zero().to_points(rate, 2), 0);
        assert_eq!(Money::from_minor(-500).to_points(rate, 2), 0);
    }

    #[test]
    fn test_to_points_large_values_saturate() {
        let rate = AccrualRate::from_bps(u32::MAX);
        let points = Money::from_minor(i64::MAX).to_points(rate, 0);
        assert_eq!(points, i64::MAX);
    }

    #[test]
    fn test_to_points_huge_exponent_floors_to_zero() {
        let rate = AccrualRate::from_bps(u32::MAX);
        assert_eq!(Money::from_minor(i64::MAX).to_points(rate, 40), 0);
        assert_eq!(Money::from_minor(1249).to_points(rate, u32::MAX), 0);
    }

    #[test]
    fn test_spend_serialization() {
        let spend = Spend::new(Money::from_minor(1249), "USD");
        let json = serde_json::to_string(&spend).unwrap();
        assert_eq!(json, r#"{"amount":1249,"currency":"USD"}"#);
    }
}
