//! # turf-sqlite
//!
//! A minimal typed wrapper around SQLite for the Turf engine.
//!
//! ## Core Types
//!
//! - **[`SqlSession`]**: One SQLite connection with cached prepared statements
//!   and explicit transaction control
//! - **[`Scalar`]** / **[`ScalarKind`]**: The typed scalar set flowing between
//!   the engine and the database
//! - **[`SessionConfig`]**: Connection-level settings
//! - **[`StorageError`]**: Error type for storage operations
//!
//! ## Architecture
//!
//! - **One session per connection**: Every Turf connection owns exactly one
//!   `SqlSession`; concurrency comes from opening several sessions against the
//!   same file
//! - **WAL mode**: Enabled at open so concurrent readers run against their own
//!   snapshot while a single writer commits
//! - **Explicit transactions**: `BEGIN DEFERRED` / `BEGIN IMMEDIATE` /
//!   `COMMIT` / `ROLLBACK` are driven by the caller, never implicitly

mod config;
mod error;
mod scalar;
mod session;

pub use config::SessionConfig;
pub use error::{Result, StorageError};
pub use scalar::{Scalar, ScalarKind};
pub use session::SqlSession;
