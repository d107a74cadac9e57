//! # Database Crate
//!
//! High-level, application-specific interface to PostgreSQL. This crate is
//! the system's permanent archive: orders, fills, funding-rate samples,
//! P&L records, symbols and structured log lines all land here.
//!
//! ## Architectural Principles
//!
//! - **Adapter layer:** encapsulates all SQL and schema details behind the
//!   [`ArbStore`] trait, so core components depend on the capability and not
//!   on PostgreSQL.
//! - **Runtime queries:** queries use the runtime `sqlx` API so the
//!   workspace builds without a live database.
//! - **Asynchronous & Pooled:** all operations go through a shared `PgPool`.
//!
//! ## Public API
//!
//! - `connect` / `run_migrations`: establish the pool and apply migrations.
//! - `ArbStore`: the persistence capability consumed by the core crates.
//! - `PgRepository`: the PostgreSQL implementation.
//! - `MemoryRepository`: an in-process implementation for tests and dry runs.
//! - `DbError`: the error type returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod memory;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use connection::{connect, run_migrations};
pub use error::DbError;
pub use memory::MemoryRepository;
pub use repository::{ArbStore, PgRepository};
