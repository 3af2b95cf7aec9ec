//! Month-close aggregation.
//!
//! [`calculate_closed_snapshot`] is pure: it reads the month's history and
//! returns the figures frozen at close. Nothing here touches the database.

use crate::core::{
    state::MonthState,
    types::ItemType,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Progress of one goal at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    /// Goal identifier
    pub goal_id: String,
    /// Display name
    pub name: String,
    /// Assigned to the goal this month
    pub contributed: f64,
    /// Saved amount including this month's contribution
    pub saved: f64,
    /// Goal target, when the goal was part of the inputs
    pub target: Option<f64>,
    /// `saved / target * 100`, capped at 100
    pub progress_pct: Option<f64>,
}

/// Progress of one debt at close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtProgress {
    /// Debt identifier
    pub debt_id: String,
    /// Display name
    pub name: String,
    /// Assigned to the debt this month
    pub paid: f64,
    /// Balance at the start of the month, when known
    pub starting_balance: Option<f64>,
    /// Balance after this month's payment, when known
    pub remaining_balance: Option<f64>,
}

/// Figures frozen when a month is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedSnapshot {
    /// When the month was closed
    pub closed_at: DateTime<Utc>,
    /// Who closed the month
    pub closed_by: String,
    /// Whether the close was triggered by the end-of-period sweep
    pub is_auto_closed: bool,
    /// Income the plan was built on
    pub projected_income: f64,
    /// Income actually received
    pub actual_income: f64,
    /// `actual_income - projected_income`
    pub income_variance: f64,
    /// Sum of assigned amounts
    pub total_assigned: f64,
    /// Sum of activity
    pub total_activity: f64,
    /// `max(0, -total_activity)`
    pub total_spent: f64,
    /// `total_assigned - total_spent`
    pub spending_variance: f64,
    /// Share of income not spent, in percent
    pub savings_rate: f64,
    /// Amount each line carries into the next month, keyed by `TYPE:id`
    pub category_rollovers: BTreeMap<String, f64>,
    /// `TYPE:id` keys of lines whose available balance is negative
    pub overspent_categories: Vec<String>,
    /// Goal lines
    pub goal_progress: Vec<GoalProgress>,
    /// Debt lines
    pub debt_progress: Vec<DebtProgress>,
    /// Number of snapshots in the month's history
    pub total_iterations: u32,
    /// Number of snapshots that carry planning results
    pub dss_sessions: u32,
    /// 1-based position of the most recent applied snapshot
    pub applied_iteration: Option<u32>,
}

/// Computes the close snapshot for a month history.
///
/// Line figures come from the last state. An empty history yields zeros.
#[must_use]
pub fn calculate_closed_snapshot(
    states: &[MonthState],
    closed_by: &str,
    is_auto: bool,
    closed_at: DateTime<Utc>,
) -> ClosedSnapshot {
    let current = states.last();
    let lines = current.map_or(&[][..], |s| s.category_states.as_slice());
    let actual_income = current.map_or(0.0, |s| s.actual_income);
    let projected_income = current.map_or(0.0, |s| s.input_snapshot.monthly_income);

    let total_assigned: f64 = lines.iter().map(|c| c.assigned).sum();
    let total_activity: f64 = lines.iter().map(|c| c.activity).sum();
    let total_spent = (-total_activity).max(0.0);
    let savings_rate = if actual_income > 0.0 {
        (actual_income - total_spent) / actual_income * 100.0
    } else {
        0.0
    };

    let category_rollovers = lines
        .iter()
        .map(|c| (c.key().to_string(), c.rollover + c.assigned + c.activity))
        .collect();
    let overspent_categories = lines
        .iter()
        .filter(|c| c.is_overspent())
        .map(|c| c.key().to_string())
        .collect();

    let goal_progress = lines
        .iter()
        .filter(|c| c.item_type == ItemType::Goal)
        .map(|c| {
            let goal = current.and_then(|s| s.input_snapshot.goal(&c.item_id));
            let saved = goal.map_or(0.0, |g| g.current_amount) + c.assigned;
            let target = goal.map(|g| g.target_amount);
            GoalProgress {
                goal_id: c.item_id.clone(),
                name: c.name.clone(),
                contributed: c.assigned,
                saved,
                target,
                progress_pct: target
                    .filter(|t| *t > 0.0)
                    .map(|t| (saved / t * 100.0).min(100.0)),
            }
        })
        .collect();

    let debt_progress = lines
        .iter()
        .filter(|c| c.item_type == ItemType::Debt)
        .map(|c| {
            let starting_balance = current
                .and_then(|s| s.input_snapshot.debt(&c.item_id))
                .map(|d| d.balance);
            DebtProgress {
                debt_id: c.item_id.clone(),
                name: c.name.clone(),
                paid: c.assigned,
                starting_balance,
                remaining_balance: starting_balance.map(|b| (b - c.assigned).max(0.0)),
            }
        })
        .collect();

    let applied_iteration = states
        .iter()
        .rposition(|s| s.is_applied)
        .and_then(|i| u32::try_from(i + 1).ok());

    ClosedSnapshot {
        closed_at,
        closed_by: closed_by.to_string(),
        is_auto_closed: is_auto,
        projected_income,
        actual_income,
        income_variance: actual_income - projected_income,
        total_assigned,
        total_activity,
        total_spent,
        spending_variance: total_assigned - total_spent,
        savings_rate,
        category_rollovers,
        overspent_categories,
        goal_progress,
        debt_progress,
        total_iterations: u32::try_from(states.len()).unwrap_or(u32::MAX),
        dss_sessions: u32::try_from(
            states
                .iter()
                .filter(|s| s.dss_workflow_results.as_ref().is_some_and(|r| !r.is_empty()))
                .count(),
        )
        .unwrap_or(u32::MAX),
        applied_iteration,
    }
}
