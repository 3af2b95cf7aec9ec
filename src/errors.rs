//! Unified error types for the budget planner.
//!
//! Domain failures carry the identifiers needed to log them; infrastructure
//! failures (database, serialization, I/O) convert with `?`.

use crate::core::dss::DssStep;
use thiserror::Error;

/// Every failure the ledger, staging cache, and workflow can report.
#[derive(Debug, Error)]
pub enum Error {
    /// A staging record was read before `initialize`, or it expired.
    #[error("DSS session for month {month_id} and user {user_id} is not initialized")]
    NotInitialized {
        /// Month the session belongs to
        month_id: i64,
        /// Owner of the session
        user_id: String,
    },

    /// The month exists but belongs to someone else.
    #[error("User {user_id} is not allowed to access month {month_id}")]
    Unauthorized {
        /// Month that was requested
        month_id: i64,
        /// Caller that was rejected
        user_id: String,
    },

    /// The month is closed or archived.
    #[error("Month {month_id} cannot be modified while {status}")]
    NotModifiable {
        /// Month that was targeted
        month_id: i64,
        /// Status that blocked the change
        status: String,
    },

    /// A step was applied before its prerequisite was accepted.
    #[error("Step {step} cannot be applied before step {requires} is accepted")]
    StepOutOfOrder {
        /// Step that was attempted
        step: DssStep,
        /// Step that still needs an accepted value
        requires: DssStep,
    },

    /// An allocation set was empty, all zero, or contained a bad amount.
    #[error("Invalid allocation: {message}")]
    InvalidAllocation {
        /// What was wrong with the allocation
        message: String,
    },

    /// The month was written by someone else since it was read.
    #[error("Month {month_id} was modified concurrently (expected version {expected})")]
    OptimisticLockConflict {
        /// Month whose save was rejected
        month_id: i64,
        /// Version the caller read
        expected: i32,
    },

    /// `close` was called on a month that is already closed.
    #[error("Month {month_id} is already closed")]
    AlreadyClosed {
        /// Month that was already closed
        month_id: i64,
    },

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A solver rejected its input or could not produce a result.
    #[error("Solver error: {message}")]
    Solver {
        /// Solver diagnostic
        message: String,
    },

    /// The staging cache backend failed.
    #[error("Staging cache error: {message}")]
    Cache {
        /// Backend diagnostic
        message: String,
    },

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// Database error from `SeaORM`.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON (de)serialization of stored snapshots or staging records failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
