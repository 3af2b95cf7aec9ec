/// Shared budget vocabulary and planning inputs
pub mod types;

/// Month snapshots and category lines
pub mod state;

/// Step payloads and durable planning results
pub mod dss;

/// Close snapshot aggregation
pub mod snapshot;

/// Month aggregate and its repository
pub mod ledger;

/// TTL-bound staging cache for planning sessions
pub mod staging;

/// Solver and directory traits with reference implementations
pub mod solvers;

/// Debt partitioning, budget floor and payoff simulation
pub mod payoff;

/// The step-gated planning dialogue
pub mod workflow;

/// Committing a planning session to the ledger
pub mod finalize;

/// End-of-period sweep and rollover into the next month
pub mod monthly;
