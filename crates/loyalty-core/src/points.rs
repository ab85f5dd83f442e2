//! # Accrual Configuration
//!
//! How a business turns a spend into points.
//!
//! ## Accrual Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Accrual Modes                                    │
//! │                                                                         │
//! │  PER CURRENCY UNIT                                                     │
//! │  ─────────────────                                                     │
//! │  One rate for every currency.                                          │
//! │  { "mode": "per_currency_unit", "rate_bps": 10000 }                    │
//! │                                                                         │
//! │  RATE TABLE                                                            │
//! │  ──────────                                                            │
//! │  A rate (and exponent) per currency; unknown currency is rejected.     │
//! │  { "mode": "rate_table", "rates": [                                    │
//! │      { "currency": "USD", "rate_bps": 10000 },                         │
//! │      { "currency": "JPY", "rate_bps": 100, "exponent": 0 } ] }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stored as JSON on the program row.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Spend;
use crate::validation::validate_currency;
use crate::{DEFAULT_CURRENCY_EXPONENT, MAX_CURRENCY_EXPONENT};

// =============================================================================
// Accrual Rate
// =============================================================================

/// Points per major currency unit, in basis points.
///
/// ## Why Basis Points?
/// 10 000 bps = 1.0 point per unit, 2 500 bps = 0.25 points per unit.
/// Integer rates keep the whole conversion in integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccrualRate(u32);

impl AccrualRate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        AccrualRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// One point per major unit.
    #[inline]
    pub const fn one_per_unit() -> Self {
        AccrualRate(10_000)
    }
}

// =============================================================================
// Accrual Config
// =============================================================================

/// A currency-specific rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CurrencyRate {
    pub currency: String,
    pub rate_bps: u32,
    /// Digits after the decimal point; defaults to 2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exponent: Option<u32>,
}

/// Program accrual configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AccrualConfig {
    /// One rate for every currency, two-decimal minor units.
    PerCurrencyUnit { rate_bps: u32 },
    /// A rate per currency.
    RateTable { rates: Vec<CurrencyRate> },
}

impl Default for AccrualConfig {
    fn default() -> Self {
        AccrualConfig::PerCurrencyUnit {
            rate_bps: AccrualRate::one_per_unit().bps(),
        }
    }
}

impl AccrualConfig {
    /// Parses the JSON stored on a program row.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            CoreError::Validation(ValidationError::InvalidFormat {
                field: "accrual_config".to_string(),
                reason: e.to_string(),
            })
        })
    }

    /// Serializes for storage.
    pub fn to_json(&self) -> String {
        // Serializing a plain enum of strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Converts a spend into points, rounding down.
    ///
    /// ## Rules
    /// - Negative amounts are rejected
    /// - Currency code must be three ASCII letters
    /// - `RateTable` rejects currencies it does not list
    /// - Exponents above [`MAX_CURRENCY_EXPONENT`] are rejected
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::money::{Money, Spend};
    /// use loyalty_core::points::AccrualConfig;
    ///
    /// let config = AccrualConfig::PerCurrencyUnit { rate_bps: 10_000 };
    /// let spend = Spend::new(Money::from_minor(1249), "USD");
    /// assert_eq!(config.points_for(&spend).unwrap(), 12);
    /// ```
    pub fn points_for(&self, spend: &Spend) -> CoreResult<i64> {
        if spend.amount.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "spend amount".to_string(),
            }
            .into());
        }
        validate_currency(&spend.currency)?;

        let (rate, exponent) = match self {
            AccrualConfig::PerCurrencyUnit { rate_bps } => {
                (AccrualRate::from_bps(*rate_bps), DEFAULT_CURRENCY_EXPONENT)
            }
            AccrualConfig::RateTable { rates } => {
                let entry = rates
                    .iter()
                    .find(|r| r.currency.eq_ignore_ascii_case(&spend.currency))
                    .ok_or_else(|| CoreError::UnknownCurrency(spend.currency.clone()))?;
                (
                    AccrualRate::from_bps(entry.rate_bps),
                    entry.exponent.unwrap_or(DEFAULT_CURRENCY_EXPONENT),
                )
            }
        };

        if exponent > MAX_CURRENCY_EXPONENT {
            return Err(ValidationError::OutOfRange {
                field: format!("{} exponent", spend.currency),
                min: 0,
                max: MAX_CURRENCY_EXPONENT as i64,
            }
            .into());
        }

        let points = spend.amount.to_points(rate, exponent);
        if points == i64::MAX {
            return Err(CoreError::PointsOverflow);
        }

        Ok(points)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
