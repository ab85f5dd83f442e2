//! # loyalty-db: Ledger Store for Scan Sessions
//!
//! SQLite storage for tokens, scan sessions, loyalty accounts and the
//! append-only point ledger, built on sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Scan Protocol Data Flow                             │
//! │                                                                         │
//! │  loyalty-scan (resolve / finalize)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   loyalty-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ TokenRepo     │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SessionRepo   │    │ 001_initial  │  │   │
//! │  │   │               │    │ AccountRepo   │    │   _schema    │  │   │
//! │  │   │               │    │ LedgerRepo    │    │              │  │   │
//! │  │   │               │    │ ProgramRepo   │    │              │  │   │
//! │  │   │               │    │ ScanRepo (CAS)│    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database (WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conditional Writes
//! Every write that can race is a compare-and-set:
//! - token claim: `WHERE id = ? AND consumed_at IS NULL`
//! - account update: `WHERE id = ? AND concurrency_stamp = ?`
//! - session transition: `WHERE id = ? AND status = 'pending'`
//!
//! Zero rows affected is reported to the caller as a typed outcome, never
//! silently ignored.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./loyalty.db")).await?;
//! let account = db.accounts().get_by_id("acct-1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::ledger::{CommitOutcome, LedgerRepository};
pub use repository::program::ProgramRepository;
pub use repository::scan::{ClaimOutcome, ScanRepository};
pub use repository::session::SessionRepository;
pub use repository::token::TokenRepository;
