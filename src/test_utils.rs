//! Shared test utilities for the budget planner.
//!
//! This module provides common helper functions for setting up test databases
//! and creating months, planning inputs and workflows with sensible defaults.

use crate::{
    config::settings::{DssConfig, StagingConfig},
    core::{
        ledger::{self, Month},
        solvers::{Solvers, StaticDirectory},
        staging::{MemoryStagingStore, StagingCache},
        types::{ConstraintInput, DebtInput, DebtKind, GoalInput, InputSnapshot},
        workflow::DssWorkflow,
    },
    entities::month,
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Owner of the months the helpers create.
pub const TEST_USER: &str = "user-1";

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Creates an open January 2024 month with an empty history.
pub async fn create_test_month(db: &DatabaseConnection, user_id: &str) -> Result<Month> {
    ledger::create_month(db, user_id, "2024-01", date(2024, 1, 1), date(2024, 1, 31)).await
}

/// An open month that was never stored, for pure aggregate tests.
///
/// # Defaults
/// * `id`: 1
/// * `user_id`: [`TEST_USER`]
/// * `version`: 1
/// * empty history
#[allow(clippy::unwrap_used)]
pub fn in_memory_month() -> Month {
    let now = Utc::now();
    Month::from_model(month::Model {
        id: 1,
        user_id: TEST_USER.to_string(),
        period_label: "2024-01".to_string(),
        start_date: date(2024, 1, 1),
        end_date: date(2024, 1, 31),
        status: "OPEN".to_string(),
        states: "[]".to_string(),
        closed_snapshot: None,
        closed_at: None,
        closed_by: None,
        version: 1,
        created_at: now,
        updated_at: now,
    })
    .unwrap()
}

/// Planning inputs for a household with 5,000,000 monthly income.
///
/// * goals: `g1` emergency fund (no deadline), `g2` vacation (due end of 2024)
/// * debts: `card` revolving (min 400,000), `car` installment (min 600,000)
/// * constraints: `rent` fixed 1,500,000, `groceries` flexible 800,000-1,200,000
pub fn sample_inputs() -> InputSnapshot {
    InputSnapshot {
        monthly_income: 5_000_000.0,
        goals: vec![
            GoalInput {
                id: "g1".to_string(),
                name: "Emergency fund".to_string(),
                target_amount: 10_000_000.0,
                current_amount: 2_000_000.0,
                deadline: None,
                importance: 8,
            },
            GoalInput {
                id: "g2".to_string(),
                name: "Vacation".to_string(),
                target_amount: 3_000_000.0,
                current_amount: 0.0,
                deadline: Some(date(2024, 12, 31)),
                importance: 4,
            },
        ],
        debts: vec![
            DebtInput {
                id: "card".to_string(),
                name: "Credit card".to_string(),
                balance: 8_000_000.0,
                interest_rate: 24.0,
                minimum_payment: 400_000.0,
                kind: DebtKind::Revolving,
            },
            DebtInput {
                id: "car".to_string(),
                name: "Car loan".to_string(),
                balance: 20_000_000.0,
                interest_rate: 6.0,
                minimum_payment: 600_000.0,
                kind: DebtKind::Installment,
            },
        ],
        constraints: vec![
            ConstraintInput {
                category_id: "rent".to_string(),
                name: "Rent".to_string(),
                min_amount: 1_500_000.0,
                max_amount: 1_500_000.0,
                is_flexible: false,
            },
            ConstraintInput {
                category_id: "groceries".to_string(),
                name: "Groceries".to_string(),
                min_amount: 800_000.0,
                max_amount: 1_200_000.0,
                is_flexible: true,
            },
        ],
        as_of: Some(date(2024, 1, 15)),
    }
}

/// A workflow over `db` with an in-memory staging store, the reference
/// solvers and an empty category directory.
pub fn test_workflow(db: &DatabaseConnection) -> DssWorkflow {
    let config = DssConfig::default();
    DssWorkflow::new(
        db.clone(),
        StagingCache::new(Arc::new(MemoryStagingStore::new()), StagingConfig::default()),
        Solvers::reference(config.max_payoff_months),
        Arc::new(StaticDirectory::default()),
        config,
    )
}
