//! # Bullion Database Crate
//!
//! The engine's persistent record store: strategies, positions, the order
//! log, daily risk aggregates and persisted risk blocks, kept in SQLite.
//!
//! ## Public API
//!
//! - `connect`: opens the connection pool described by `[database]`.
//! - `run_migrations`: applies the embedded schema migrations.
//! - `Store`: the storage capability the engine is written against.
//! - `DbRepository`: the SQL implementation of `Store`, plus the
//!   `in_transaction` helper used for multi-row writes.
//! - `DbError`: the specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use repository::DbRepository;
pub use store::{Loaded, RejectedRow, RiskDecisionRecord, Store};
