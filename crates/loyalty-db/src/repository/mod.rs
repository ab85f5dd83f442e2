//! # Repository Module
//!
//! Database repository implementations for the ledger store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and What They Own                       │
//! │                                                                         │
//! │  TokenRepository     qr_code_tokens         insert, lookup, burn       │
//! │  SessionRepository   scan_sessions          lookup, Pending → terminal │
//! │  AccountRepository   loyalty_accounts       lookup, get-or-create      │
//! │  LedgerRepository    transactions,          atomic plan commit,        │
//! │                      redemptions            history, reconciliation    │
//! │  ProgramRepository   programs, tiers        active program + tiers     │
//! │  ScanRepository      tokens + sessions      claim token, open session  │
//! │                                                                         │
//! │  Each holds a clone of the SqlitePool; writes that span tables run     │
//! │  inside one sqlx transaction.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod account;
pub mod ledger;
pub mod program;
pub mod scan;
pub mod session;
pub mod token;
