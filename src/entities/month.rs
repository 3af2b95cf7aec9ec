//! Month entity - One budgeting period of one user.
//!
//! The full snapshot history lives inside the row as a JSON array; there is no
//! separate history table. `version` is the optimistic lock every save checks.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Month database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "months")]
pub struct Model {
    /// Unique identifier for the month
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the month
    pub user_id: String,
    /// Human-readable period (e.g. "2024-03")
    pub period_label: String,
    /// First day of the period
    pub start_date: Date,
    /// Last day of the period
    pub end_date: Date,
    /// `OPEN`, `CLOSED` or `ARCHIVED`
    pub status: String,
    /// JSON array of month states, oldest first
    #[sea_orm(column_type = "Text")]
    pub states: String,
    /// JSON close snapshot, set once when the month is closed
    #[sea_orm(column_type = "Text", nullable)]
    pub closed_snapshot: Option<String>,
    /// When the month was closed
    pub closed_at: Option<DateTimeUtc>,
    /// Who closed the month
    pub closed_by: Option<String>,
    /// Optimistic-lock version, incremented on every versioned save
    pub version: i32,
    /// When the month was created
    pub created_at: DateTimeUtc,
    /// When the month was last written
    pub updated_at: DateTimeUtc,
}

/// `Month` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
