//! Month rollover business logic
//!
//! Handles the end-of-period sweep and the opening of the following period.
//! The sweep closes every open month whose period has ended, marking the close
//! as automatic. Opening the next period carries each line's remaining
//! balance forward as its rollover.

use crate::{
    core::{
        ledger::{self, Month, close_loaded_month, create_month_with_states},
        state::{CategoryState, MonthState, MonthStatus},
    },
    entities::{self, month},
    errors::{Error, Result},
};
use chrono::{Datelike, Duration, NaiveDate};
use sea_orm::prelude::*;
use tracing::{info, warn};

/// Actor recorded on months closed by the sweep.
pub const SYSTEM_ACTOR: &str = "system";

/// A month the sweep closed.
#[derive(Debug, Clone)]
pub struct ClosedMonth {
    /// Month identifier
    pub month_id: i64,
    /// Owner
    pub user_id: String,
    /// Human-readable period
    pub period_label: String,
    /// Savings rate frozen at close
    pub savings_rate: f64,
}

/// Outcome of one sweep.
#[derive(Debug, Clone)]
pub struct CloseSweepResult {
    /// Months closed by this sweep
    pub closed: Vec<ClosedMonth>,
    /// Months left open because another writer got there first
    pub skipped: Vec<i64>,
    /// Date the sweep compared end dates against
    pub sweep_date: NaiveDate,
}

/// Closes every open month whose end date is before `today`.
///
/// Run at start-up so periods that ended while the service was down are
/// frozen. A month that was written concurrently is skipped and logged; the
/// next sweep picks it up again if it is still open.
///
/// # Arguments
/// * `db` - Database connection
/// * `today` - Sweep date; a month ending on this day stays open
///
/// # Returns
/// * `Ok(result)` - Months closed and months skipped
pub async fn close_expired_months(
    db: &DatabaseConnection,
    today: NaiveDate,
) -> Result<CloseSweepResult> {
    let expired = ledger::get_months_by_status(db, MonthStatus::Open)
        .await?
        .into_iter()
        .filter(|m| m.end_date < today);

    let mut closed = Vec::new();
    let mut skipped = Vec::new();
    for mut month in expired {
        match close_loaded_month(db, &mut month, SYSTEM_ACTOR, true).await {
            Ok(()) => closed.push(ClosedMonth {
                month_id: month.id,
                user_id: month.user_id.clone(),
                period_label: month.period_label.clone(),
                savings_rate: month
                    .closed_snapshot
                    .as_ref()
                    .map_or(0.0, |s| s.savings_rate),
            }),
            Err(e @ (Error::OptimisticLockConflict { .. } | Error::AlreadyClosed { .. })) => {
                warn!("Skipping auto-close of month {}: {}", month.id, e);
                skipped.push(month.id);
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Auto-close sweep for {}: {} closed, {} skipped",
        today,
        closed.len(),
        skipped.len()
    );
    Ok(CloseSweepResult {
        closed,
        skipped,
        sweep_date: today,
    })
}

/// First and last day of the calendar month after `end_date`.
fn following_period(end_date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = end_date.checked_add_signed(Duration::days(1))?;
    let (year, month) = if start.month() == 12 {
        (start.year() + 1, 1)
    } else {
        (start.year(), start.month() + 1)
    };
    let end = NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()?;
    Some((start, end))
}

/// Opens the period after a closed month, seeded with each line's rollover.
///
/// Called after the sweep for each month it closed, so every user keeps an
/// open period. Calling it again returns the month that was already opened.
///
/// # Arguments
/// * `db` - Database connection
/// * `closed_month_id` - The month that was just closed
/// * `user_id` - Owner of that month
pub async fn open_following_month(
    db: &DatabaseConnection,
    closed_month_id: i64,
    user_id: &str,
) -> Result<Month> {
    let previous = ledger::get_month(db, closed_month_id).await?;
    previous.authorize(user_id)?;
    if previous.status != MonthStatus::Closed {
        return Err(Error::NotModifiable {
            month_id: previous.id,
            status: previous.status.to_string(),
        });
    }

    let (start, end) = following_period(previous.end_date).ok_or_else(|| Error::Config {
        message: format!("no period follows {}", previous.end_date),
    })?;

    if let Some(existing) = entities::Month::find()
        .filter(month::Column::UserId.eq(user_id))
        .filter(month::Column::StartDate.eq(start))
        .one(db)
        .await?
    {
        info!("Month starting {} already exists for user {}", start, user_id);
        return Month::from_model(existing);
    }

    let mut seed = MonthState::empty();
    seed.version = 1;
    seed.category_states = previous
        .current_state()
        .map(|state| {
            state
                .category_states
                .iter()
                .map(|line| {
                    let mut next = CategoryState::new(&line.key(), line.name.clone());
                    next.rollover = line.rollover + line.assigned + line.activity;
                    next.recompute();
                    next
                })
                .collect()
        })
        .unwrap_or_default();
    seed.recompute();

    let label = start.format("%Y-%m").to_string();
    let opened = create_month_with_states(db, user_id, &label, start, end, vec![seed]).await?;
    info!(
        "Opened month {} ({}) after month {}",
        opened.id, label, previous.id
    );
    Ok(opened)
}

/// Formats a sweep result into a human-readable summary string.
#[must_use]
pub fn format_close_summary(result: &CloseSweepResult) -> String {
    use std::fmt::Write;

    let mut summary = format!(
        "Auto-close - {} - Closed {} months, skipped {}\n",
        result.sweep_date.format("%Y-%m-%d"),
        result.closed.len(),
        result.skipped.len()
    );
    for closed in &result.closed {
        // Writing to a String cannot fail
        let _ = writeln!(
            summary,
            "  {} ({}) for {} | savings rate {:.1}%",
            closed.period_label, closed.month_id, closed.user_id, closed.savings_rate
        );
    }
    summary
}
