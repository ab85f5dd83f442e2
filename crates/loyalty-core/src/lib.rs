//! # loyalty-core: Pure Domain Logic for Loyalty Scan
//!
//! This crate is the **heart** of the scan-session protocol. It contains the
//! data model and every rule that does not need I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Scan Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 loyalty-scan (protocol layer)                   │   │
//! │  │   issue_token ──► resolve_for_business ──► present ──► finalize │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ loyalty-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  points   │  │  ledger   │  │ validation│  │   │
//! │  │   │  Token    │  │  Money    │  │  plans    │  │   rules   │  │   │
//! │  │   │  Session  │  │  Accrual  │  │  rewards  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 loyalty-db (Ledger Store)                       │   │
//! │  │          SQLite queries, migrations, conditional writes         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Persistent entities (tokens, sessions, accounts, ledger rows)
//! - [`money`] - Spend amounts in integer minor units
//! - [`points`] - Accrual configuration and spend-to-points conversion
//! - [`ledger`] - Finalize decisions and the ledger plans they produce
//! - [`rewards`] - Best-effort selected-rewards payload handling
//! - [`view`] - What the business device sees
//! - [`clock`] - The `now` abstraction
//! - [`error`] - Domain error types and outcome codes
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: planning a finalize never touches storage
//! 2. **Integer Points**: balances and deltas are `i64`, spends are minor units
//! 3. **Round Down**: accrual truncates, a customer is never over-credited
//! 4. **Explicit Errors**: every failure maps to one [`OutcomeCode`]
//!
//! ## Example Usage
//!
//! ```rust
//! use loyalty_core::money::Money;
//! use loyalty_core::points::AccrualRate;
//!
//! // $12.49 at 1.0 point per dollar
//! let spend = Money::from_minor(1249);
//! let rate = AccrualRate::from_bps(10_000);
//!
//! assert_eq!(spend.to_points(rate, 2), 12);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod ledger;
pub mod money;
pub mod points;
pub mod rewards;
pub mod types;
pub mod validation;
pub mod view;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, OutcomeCode, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of minor units digits assumed when a currency has no explicit
/// exponent (USD, EUR, ...).
pub const DEFAULT_CURRENCY_EXPONENT: u32 = 2;

/// Largest minor-unit exponent a rate table may configure.
pub const MAX_CURRENCY_EXPONENT: u32 = 18;

/// Maximum reward tiers that can be redeemed in a single session.
///
/// ## Business Reason
/// A batch is one atomic unit against the account; keeping it small keeps
/// the write transaction short.
pub const MAX_TIERS_PER_REDEMPTION: usize = 10;

/// Smallest accepted token entropy, in bytes.
pub const MIN_TOKEN_BYTES: usize = 16;
