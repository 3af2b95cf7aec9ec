//! Month snapshots and per-item budget lines.
//!
//! A `MonthState` is one entry of a month's append-only history. Its
//! `CategoryState` lines keep the budget equation
//! `available = rollover + assigned + activity` after every mutation.

use crate::core::{
    dss::DssWorkflowResults,
    types::{InputSnapshot, ItemKey, ItemType},
};
use crate::errors::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonthStatus {
    /// Accepts planning and ledger commands
    Open,
    /// Closed with a snapshot; read-only
    Closed,
    /// Archived; read-only
    Archived,
}

impl MonthStatus {
    /// Database representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for MonthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonthStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(Error::Config {
                message: format!("Unknown month status '{other}'"),
            }),
        }
    }
}

/// Budget line for one category, goal or debt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryState {
    /// Item identifier
    pub item_id: String,
    /// Item kind
    pub item_type: ItemType,
    /// Display name
    pub name: String,
    /// Carried over from the previous month
    pub rollover: f64,
    /// Assigned this month
    pub assigned: f64,
    /// Spending (negative) and refunds (positive) this month
    pub activity: f64,
    /// `rollover + assigned + activity`
    pub available: f64,
}

impl CategoryState {
    /// Creates an empty line for `key`.
    pub fn new(key: &ItemKey, name: impl Into<String>) -> Self {
        Self {
            item_id: key.item_id.clone(),
            item_type: key.item_type,
            name: name.into(),
            rollover: 0.0,
            assigned: 0.0,
            activity: 0.0,
            available: 0.0,
        }
    }

    /// A line freshly funded with `amount` and nothing else.
    pub fn funded(key: &ItemKey, name: impl Into<String>, amount: f64) -> Self {
        let mut line = Self::new(key, name);
        line.set_assigned(amount);
        line
    }

    /// Identity of the line.
    #[must_use]
    pub fn key(&self) -> ItemKey {
        ItemKey {
            item_type: self.item_type,
            item_id: self.item_id.clone(),
        }
    }

    /// Whether this line matches `key`.
    #[must_use]
    pub fn matches(&self, key: &ItemKey) -> bool {
        self.item_type == key.item_type && self.item_id == key.item_id
    }

    /// Re-derives `available` from its components.
    pub fn recompute(&mut self) {
        self.available = self.rollover + self.assigned + self.activity;
    }

    /// Replaces the assigned amount.
    pub fn set_assigned(&mut self, amount: f64) {
        self.assigned = amount;
        self.recompute();
    }

    /// Adds to the assigned amount (negative to take money out).
    pub fn add_assigned(&mut self, delta: f64) {
        self.assigned += delta;
        self.recompute();
    }

    /// Adds spending (negative) or refunds (positive).
    pub fn add_activity(&mut self, delta: f64) {
        self.activity += delta;
        self.recompute();
    }

    /// Whether more was spent than available.
    #[must_use]
    pub fn is_overspent(&self) -> bool {
        self.available < 0.0
    }
}

/// One snapshot in a month's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthState {
    /// 1-based position in the history
    pub version: u32,
    /// When the snapshot was appended
    pub created_at: DateTime<Utc>,
    /// Whether this snapshot is the plan the user committed to
    pub is_applied: bool,
    /// Income not yet assigned
    pub to_be_budgeted: f64,
    /// Income actually received
    pub actual_income: f64,
    /// Budget lines, unique per item key
    pub category_states: Vec<CategoryState>,
    /// Inputs the snapshot was produced from
    pub input_snapshot: InputSnapshot,
    /// Planning dialogue results recorded on this snapshot
    pub dss_workflow_results: Option<DssWorkflowResults>,
}

impl MonthState {
    /// An empty snapshot; `version` and `created_at` are stamped on append.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 0,
            created_at: Utc::now(),
            is_applied: false,
            to_be_budgeted: 0.0,
            actual_income: 0.0,
            category_states: Vec::new(),
            input_snapshot: InputSnapshot::default(),
            dss_workflow_results: None,
        }
    }

    /// Finds the line for `key`.
    #[must_use]
    pub fn category(&self, key: &ItemKey) -> Option<&CategoryState> {
        self.category_states.iter().find(|c| c.matches(key))
    }

    /// Finds the line for `key`, inserting an empty one named `name` when absent.
    pub fn category_entry(&mut self, key: &ItemKey, name: &str) -> &mut CategoryState {
        let position = match self.category_states.iter().position(|c| c.matches(key)) {
            Some(position) => position,
            None => {
                self.category_states.push(CategoryState::new(key, name));
                self.category_states.len() - 1
            }
        };
        &mut self.category_states[position]
    }

    /// Sum of assigned amounts.
    #[must_use]
    pub fn total_assigned(&self) -> f64 {
        self.category_states.iter().map(|c| c.assigned).sum()
    }

    /// Re-derives `to_be_budgeted` from income and assignments.
    pub fn recompute_to_be_budgeted(&mut self) {
        self.to_be_budgeted = (self.actual_income - self.total_assigned()).max(0.0);
    }

    /// Re-derives every line's `available` and the month's `to_be_budgeted`.
    pub fn recompute(&mut self) {
        for line in &mut self.category_states {
            line.recompute();
        }
        self.recompute_to_be_budgeted();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;

    #[test]
    fn test_available_follows_every_mutation() {
        let key = ItemKey::constraint("food");
        let mut line = CategoryState::new(&key, "Food");
        line.rollover = 1_000.0;
        line.set_assigned(5_000.0);
        assert_eq!(line.available, 6_000.0);

        line.add_activity(-7_000.0);
        assert_eq!(line.available, -1_000.0);
        assert!(line.is_overspent());

        line.add_assigned(2_000.0);
        assert_eq!(line.available, line.rollover + line.assigned + line.activity);
        assert!(!line.is_overspent());
    }

    #[test]
    fn test_category_entry_inserts_once() {
        let mut state = MonthState::empty();
        let key = ItemKey::goal("car");
        state.category_entry(&key, "Car").set_assigned(10.0);
        state.category_entry(&key, "ignored").add_assigned(5.0);

        assert_eq!(state.category_states.len(), 1);
        assert_eq!(state.category_states[0].name, "Car");
        assert_eq!(state.category_states[0].available, 15.0);
    }

    #[test]
    fn test_same_id_different_kind_are_separate_lines() {
        let mut state = MonthState::empty();
        state.category_entry(&ItemKey::goal("x"), "Goal X");
        state.category_entry(&ItemKey::debt("x"), "Debt X");
        assert_eq!(state.category_states.len(), 2);
    }

    #[test]
    fn test_to_be_budgeted_never_negative() {
        let mut state = MonthState::empty();
        state.actual_income = 100.0;
        state
            .category_entry(&ItemKey::constraint("rent"), "Rent")
            .set_assigned(150.0);
        state.recompute();
        assert_eq!(state.to_be_budgeted, 0.0);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [MonthStatus::Open, MonthStatus::Closed, MonthStatus::Archived] {
            assert_eq!(status.as_str().parse::<MonthStatus>().ok(), Some(status));
        }
        assert!("PENDING".parse::<MonthStatus>().is_err());
    }
}
