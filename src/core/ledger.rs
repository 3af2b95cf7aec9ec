//! Month ledger - the durable, append-only planning history of a month.
//!
//! [`Month`] is the aggregate: its snapshot list only ever grows, every
//! mutating command checks that the month is open, and close happens once.
//! The repository functions load and save it with an optimistic lock on the
//! row's `version` column.

use crate::{
    core::{
        dss::{DssWorkflowResults, StepChoice},
        snapshot::{ClosedSnapshot, calculate_closed_snapshot},
        state::{CategoryState, MonthState, MonthStatus},
        types::ItemKey,
    },
    entities::{self, month},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{Set, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument};

/// Whether a save moves the optimistic-lock version forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBump {
    /// Normal writes: `version + 1`
    Increment,
    /// Writes that must leave the version as the caller read it
    Preserve,
}

/// A month with its decoded snapshot history.
#[derive(Debug, Clone, PartialEq)]
pub struct Month {
    /// Unique identifier
    pub id: i64,
    /// Owner
    pub user_id: String,
    /// Human-readable period
    pub period_label: String,
    /// First day of the period
    pub start_date: NaiveDate,
    /// Last day of the period
    pub end_date: NaiveDate,
    /// Lifecycle status
    pub status: MonthStatus,
    /// Optimistic-lock version as last read or written
    pub version: i32,
    /// Close snapshot, set once
    pub closed_snapshot: Option<ClosedSnapshot>,
    /// When the month was closed
    pub closed_at: Option<DateTime<Utc>>,
    /// Who closed the month
    pub closed_by: Option<String>,
    /// When the month was created
    pub created_at: DateTime<Utc>,
    /// When the month was last written
    pub updated_at: DateTime<Utc>,
    states: Vec<MonthState>,
}

impl Month {
    /// Decodes a database row.
    pub fn from_model(model: month::Model) -> Result<Self> {
        let states: Vec<MonthState> = serde_json::from_str(&model.states)?;
        let closed_snapshot = model
            .closed_snapshot
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Self {
            id: model.id,
            user_id: model.user_id,
            period_label: model.period_label,
            start_date: model.start_date,
            end_date: model.end_date,
            status: model.status.parse()?,
            version: model.version,
            closed_snapshot,
            closed_at: model.closed_at,
            closed_by: model.closed_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
            states,
        })
    }

    /// The snapshot history, oldest first.
    #[must_use]
    pub fn states(&self) -> &[MonthState] {
        &self.states
    }

    /// The last snapshot.
    #[must_use]
    pub fn current_state(&self) -> Option<&MonthState> {
        self.states.last()
    }

    /// Whether the month accepts changes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == MonthStatus::Open
    }

    /// Fails with `NotModifiable` unless the month is open.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::NotModifiable {
                month_id: self.id,
                status: self.status.to_string(),
            })
        }
    }

    /// Fails with `Unauthorized` unless `user_id` owns the month.
    pub fn authorize(&self, user_id: &str) -> Result<()> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(Error::Unauthorized {
                month_id: self.id,
                user_id: user_id.to_string(),
            })
        }
    }

    /// Materializes an initial empty snapshot when the history is empty.
    ///
    /// Returns `true` when a snapshot was created.
    pub fn ensure_state(&mut self) -> bool {
        if self.states.is_empty() {
            self.push_state(MonthState::empty());
            true
        } else {
            false
        }
    }

    /// Appends `state` as the new current snapshot and returns it.
    pub fn append_state(&mut self, state: MonthState) -> Result<&MonthState> {
        self.ensure_open()?;
        self.push_state(state);
        Ok(&self.states[self.states.len() - 1])
    }

    fn push_state(&mut self, mut state: MonthState) {
        state.version = u32::try_from(self.states.len() + 1).unwrap_or(u32::MAX);
        state.created_at = Utc::now();
        state.recompute();
        self.states.push(state);
    }

    fn current_mut(&mut self) -> &mut MonthState {
        self.ensure_state();
        let last = self.states.len() - 1;
        &mut self.states[last]
    }

    /// Replaces or inserts the line for (`item_id`, `item_type`) in the current snapshot.
    pub fn upsert_category_state(&mut self, line: CategoryState) -> Result<()> {
        self.ensure_open()?;
        let key = line.key();
        let state = self.current_mut();
        let entry = state.category_entry(&key, &line.name);
        *entry = line;
        entry.recompute();
        state.recompute_to_be_budgeted();
        Ok(())
    }

    /// Sets the amount assigned to `key`.
    pub fn assign(&mut self, key: &ItemKey, name: &str, amount: f64) -> Result<()> {
        self.ensure_open()?;
        validate_amount(amount)?;
        let state = self.current_mut();
        state.category_entry(key, name).set_assigned(amount);
        state.recompute_to_be_budgeted();
        Ok(())
    }

    /// Moves `amount` of assigned money from one line to another.
    pub fn move_funds(
        &mut self,
        from: &ItemKey,
        to: &ItemKey,
        to_name: &str,
        amount: f64,
    ) -> Result<()> {
        self.ensure_open()?;
        validate_amount(amount)?;
        let state = self.current_mut();
        let source = state
            .category_states
            .iter_mut()
            .find(|c| c.matches(from))
            .ok_or_else(|| Error::NotFound {
                entity: "Category state",
                id: from.to_string(),
            })?;
        if source.available < amount {
            return Err(Error::InvalidAllocation {
                message: format!(
                    "cannot move {amount:.2} from {from}: only {:.2} available",
                    source.available
                ),
            });
        }
        source.add_assigned(-amount);
        state.category_entry(to, to_name).add_assigned(amount);
        state.recompute_to_be_budgeted();
        Ok(())
    }

    /// Adds received income to the current snapshot.
    pub fn record_income(&mut self, amount: f64) -> Result<()> {
        self.ensure_open()?;
        validate_amount(amount)?;
        let state = self.current_mut();
        state.actual_income += amount;
        state.recompute_to_be_budgeted();
        Ok(())
    }

    /// Adds spending (negative) or refunds (positive) to a line.
    pub fn record_activity(&mut self, key: &ItemKey, name: &str, amount: f64) -> Result<()> {
        self.ensure_open()?;
        if !amount.is_finite() {
            return Err(Error::InvalidAllocation {
                message: format!("activity amount {amount} is not finite"),
            });
        }
        self.current_mut().category_entry(key, name).add_activity(amount);
        Ok(())
    }

    /// Starts a new planning iteration: a copy of the current snapshot that is
    /// not applied and carries no planning results.
    pub fn begin_iteration(&mut self) -> Result<&MonthState> {
        self.ensure_open()?;
        let mut next = self.current_mut().clone();
        next.is_applied = false;
        next.dss_workflow_results = None;
        self.append_state(next)
    }

    /// Flags the current snapshot as the plan the user committed to.
    pub fn mark_applied(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.current_mut().is_applied = true;
        Ok(())
    }

    /// Records an applied planning step on the current snapshot.
    pub fn record_step(&mut self, choice: StepChoice, applied_at: DateTime<Utc>) -> Result<()> {
        self.ensure_open()?;
        self.current_mut()
            .dss_workflow_results
            .get_or_insert_with(DssWorkflowResults::default)
            .record(choice, applied_at);
        Ok(())
    }

    /// Zeroes the planning results of the current snapshot.
    ///
    /// Returns `true` when there was a snapshot to reset.
    pub fn reset_workflow(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.states.last_mut().is_some_and(|state| {
            state
                .dss_workflow_results
                .get_or_insert_with(DssWorkflowResults::default)
                .reset();
            true
        }))
    }

    /// Computes the close snapshot and flips the month to `CLOSED`.
    pub fn close_with_snapshot(
        &mut self,
        closed_by: &str,
        is_auto: bool,
    ) -> Result<&ClosedSnapshot> {
        match self.status {
            MonthStatus::Open => {}
            MonthStatus::Closed => return Err(Error::AlreadyClosed { month_id: self.id }),
            MonthStatus::Archived => self.ensure_open()?,
        }
        if self.closed_snapshot.is_some() {
            return Err(Error::AlreadyClosed { month_id: self.id });
        }

        self.ensure_state();
        let now = Utc::now();
        let snapshot = calculate_closed_snapshot(&self.states, closed_by, is_auto, now);
        self.status = MonthStatus::Closed;
        self.closed_at = Some(now);
        self.closed_by = Some(closed_by.to_string());
        Ok(&*self.closed_snapshot.insert(snapshot))
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidAllocation {
            message: format!("amount {amount} must be a non-negative number"),
        })
    }
}

/// Creates a new, empty, open month.
#[instrument(skip(db))]
pub async fn create_month(
    db: &DatabaseConnection,
    user_id: &str,
    period_label: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<Month> {
    create_month_with_states(db, user_id, period_label, start_date, end_date, Vec::new()).await
}

pub(crate) async fn create_month_with_states(
    db: &DatabaseConnection,
    user_id: &str,
    period_label: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    states: Vec<MonthState>,
) -> Result<Month> {
    if end_date < start_date {
        return Err(Error::Config {
            message: format!("period {period_label} ends before it starts"),
        });
    }

    let now = Utc::now();
    let model = month::ActiveModel {
        user_id: Set(user_id.to_string()),
        period_label: Set(period_label.to_string()),
        start_date: Set(start_date),
        end_date: Set(end_date),
        status: Set(MonthStatus::Open.as_str().to_string()),
        states: Set(serde_json::to_string(&states)?),
        closed_snapshot: Set(None),
        closed_at: Set(None),
        closed_by: Set(None),
        version: Set(1),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!("Created month {} ({}) for user {}", model.id, period_label, user_id);
    Month::from_model(model)
}

/// Loads a month by id without checking who owns it.
///
/// Used by maintenance paths such as the close sweep and by finalize, which
/// authorizes separately and must not materialize a placeholder snapshot.
///
/// # Arguments
/// * `db` - Database connection
/// * `month_id` - Month to load
///
/// # Returns
/// * `Ok(month)` - The stored month with its history decoded
/// * `Err(Error::NotFound)` - No month has that id
pub async fn get_month(db: &DatabaseConnection, month_id: i64) -> Result<Month> {
    let model = entities::Month::find_by_id(month_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "Month",
            id: month_id.to_string(),
        })?;
    Month::from_model(model)
}

/// Loads a month owned by `user_id`, materializing its first snapshot in
/// memory when the history is still empty.
pub async fn get_month_for_user(
    db: &DatabaseConnection,
    month_id: i64,
    user_id: &str,
) -> Result<Month> {
    let mut month = get_month(db, month_id).await?;
    month.authorize(user_id)?;
    if month.is_open() && month.ensure_state() {
        debug!("Materialized initial state for month {}", month_id);
    }
    Ok(month)
}

/// Loads every month whose status is `status`.
pub async fn get_months_by_status(
    db: &DatabaseConnection,
    status: MonthStatus,
) -> Result<Vec<Month>> {
    entities::Month::find()
        .filter(month::Column::Status.eq(status.as_str()))
        .all(db)
        .await?
        .into_iter()
        .map(Month::from_model)
        .collect()
}

/// Writes `month` if the stored version still equals `expected_version`.
///
/// Every durable change to a month goes through here. On success
/// `month.version` holds the new stored version. Zero affected rows means the
/// month is gone (`NotFound`) or was written by someone else
/// (`OptimisticLockConflict`).
///
/// # Arguments
/// * `db` - Database connection
/// * `month` - Aggregate to persist; its version is updated in place
/// * `expected_version` - Version the caller loaded
/// * `bump` - Whether the stored version advances
#[instrument(skip(db, month), fields(month_id = month.id))]
pub async fn save_month(
    db: &DatabaseConnection,
    month: &mut Month,
    expected_version: i32,
    bump: VersionBump,
) -> Result<()> {
    let next_version = match bump {
        VersionBump::Increment => expected_version + 1,
        VersionBump::Preserve => expected_version,
    };
    let states = serde_json::to_string(&month.states)?;
    let closed_snapshot = month
        .closed_snapshot
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let now = Utc::now();

    let result = entities::Month::update_many()
        .col_expr(month::Column::Status, Expr::value(month.status.as_str()))
        .col_expr(month::Column::States, Expr::value(states))
        .col_expr(month::Column::ClosedSnapshot, Expr::value(closed_snapshot))
        .col_expr(month::Column::ClosedAt, Expr::value(month.closed_at))
        .col_expr(month::Column::ClosedBy, Expr::value(month.closed_by.clone()))
        .col_expr(month::Column::Version, Expr::value(next_version))
        .col_expr(month::Column::UpdatedAt, Expr::value(now))
        .filter(month::Column::Id.eq(month.id))
        .filter(month::Column::Version.eq(expected_version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let exists = entities::Month::find_by_id(month.id).one(db).await?.is_some();
        return Err(if exists {
            Error::OptimisticLockConflict {
                month_id: month.id,
                expected: expected_version,
            }
        } else {
            Error::NotFound {
                entity: "Month",
                id: month.id.to_string(),
            }
        });
    }

    debug!(
        "Saved month {} at version {} ({} states)",
        month.id,
        next_version,
        month.states.len()
    );
    month.version = next_version;
    month.updated_at = now;
    Ok(())
}

/// Loads a month, applies `command`, and saves it with a version bump.
///
/// This is the path for the ledger commands (assign, move, income, activity).
pub async fn update_month<T, F>(
    db: &DatabaseConnection,
    month_id: i64,
    user_id: &str,
    command: F,
) -> Result<(Month, T)>
where
    F: FnOnce(&mut Month) -> Result<T>,
{
    let mut month = get_month_for_user(db, month_id, user_id).await?;
    month.ensure_open()?;
    let expected = month.version;
    let output = command(&mut month)?;
    save_month(db, &mut month, expected, VersionBump::Increment).await?;
    Ok((month, output))
}

/// Closes a month on behalf of its owner.
#[instrument(skip(db))]
pub async fn close_month(
    db: &DatabaseConnection,
    month_id: i64,
    user_id: &str,
    closed_by: &str,
) -> Result<Month> {
    let mut month = get_month(db, month_id).await?;
    month.authorize(user_id)?;
    close_loaded_month(db, &mut month, closed_by, false).await?;
    Ok(month)
}

pub(crate) async fn close_loaded_month(
    db: &DatabaseConnection,
    month: &mut Month,
    closed_by: &str,
    is_auto: bool,
) -> Result<()> {
    let expected = month.version;
    month.close_with_snapshot(closed_by, is_auto)?;
    save_month(db, month, expected, VersionBump::Increment).await?;
    info!(
        "Closed month {} ({}) by {}{}",
        month.id,
        month.period_label,
        closed_by,
        if is_auto { " (auto)" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_and_load_month() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_month(&db, TEST_USER).await?;

        let loaded = get_month(&db, created.id).await?;
        assert_eq!(loaded.user_id, TEST_USER);
        assert_eq!(loaded.status, MonthStatus::Open);
        assert_eq!(loaded.version, 1);
        assert!(loaded.states().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_missing_month_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let result = get_month(&db, 999).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_user_is_unauthorized() -> Result<()> {
        let db = setup_test_db().await?;
        let month = create_test_month(&db, TEST_USER).await?;
        let result = get_month_for_user(&db, month.id, "intruder").await;
        assert!(matches!(result, Err(Error::Unauthorized { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_first_access_materializes_state() -> Result<()> {
        let db = setup_test_db().await?;
        let month = create_test_month(&db, TEST_USER).await?;

        let loaded = get_month_for_user(&db, month.id, TEST_USER).await?;
        assert_eq!(loaded.states().len(), 1);
        assert_eq!(loaded.current_state().unwrap().version, 1);
        // Not persisted until the next write
        assert_eq!(loaded.version, 1);
        Ok(())
    }

    #[test]
    fn test_append_state_numbers_versions() {
        let mut month = in_memory_month();
        for _ in 0..3 {
            month.append_state(MonthState::empty()).unwrap();
        }
        for (i, state) in month.states().iter().enumerate() {
            assert_eq!(state.version as usize, i + 1);
        }
    }

    #[test]
    fn test_append_never_mutates_prior_states() {
        let mut month = in_memory_month();
        month.record_income(1_000.0).unwrap();
        let first = month.states()[0].clone();

        month.begin_iteration().unwrap();
        month.assign(&ItemKey::constraint("rent"), "Rent", 400.0).unwrap();

        assert_eq!(month.states()[0], first);
        assert_eq!(month.states().len(), 2);
        assert_eq!(month.current_state().unwrap().to_be_budgeted, 600.0);
    }

    #[test]
    fn test_upsert_only_touches_current_state() {
        let mut month = in_memory_month();
        month.ensure_state();
        month.begin_iteration().unwrap();

        let mut line = CategoryState::new(&ItemKey::constraint("food"), "Food");
        line.rollover = 50.0;
        line.assigned = 100.0;
        month.upsert_category_state(line).unwrap();

        assert!(month.states()[0].category_states.is_empty());
        let current = month.current_state().unwrap();
        assert_eq!(current.category_states.len(), 1);
        assert_eq!(current.category_states[0].available, 150.0);
    }

    #[test]
    fn test_move_funds_keeps_equation() {
        let mut month = in_memory_month();
        let food = ItemKey::constraint("food");
        let fun = ItemKey::constraint("fun");
        month.record_income(500.0).unwrap();
        month.assign(&food, "Food", 300.0).unwrap();
        month.move_funds(&food, &fun, "Fun", 120.0).unwrap();

        let state = month.current_state().unwrap();
        for line in &state.category_states {
            assert_eq!(line.available, line.rollover + line.assigned + line.activity);
        }
        assert_eq!(state.category(&food).unwrap().available, 180.0);
        assert_eq!(state.category(&fun).unwrap().available, 120.0);
        assert_eq!(state.to_be_budgeted, 200.0);
    }

    #[test]
    fn test_move_more_than_available_fails() {
        let mut month = in_memory_month();
        let food = ItemKey::constraint("food");
        month.assign(&food, "Food", 50.0).unwrap();
        let result = month.move_funds(&food, &ItemKey::constraint("fun"), "Fun", 60.0);
        assert!(matches!(result, Err(Error::InvalidAllocation { .. })));
    }

    #[test]
    fn test_negative_assignment_rejected() {
        let mut month = in_memory_month();
        let result = month.assign(&ItemKey::constraint("food"), "Food", -1.0);
        assert!(matches!(result, Err(Error::InvalidAllocation { .. })));
    }

    #[test]
    fn test_applied_iteration_follows_mark_applied() {
        let mut month = in_memory_month();
        month.record_income(1_000.0).unwrap();
        month.mark_applied().unwrap();
        let second = month.begin_iteration().unwrap();
        assert!(!second.is_applied);
        month.assign(&ItemKey::constraint("rent"), "Rent", 400.0).unwrap();

        let mut draft = month.clone();
        let snapshot = draft.close_with_snapshot("user-1", false).unwrap();
        assert_eq!(snapshot.total_iterations, 2);
        assert_eq!(snapshot.applied_iteration, Some(1));

        month.mark_applied().unwrap();
        month.begin_iteration().unwrap();
        let snapshot = month.close_with_snapshot("user-1", false).unwrap();
        assert_eq!(snapshot.total_iterations, 3);
        assert_eq!(snapshot.applied_iteration, Some(2));
        assert!(matches!(month.mark_applied(), Err(Error::NotModifiable { .. })));
    }

    #[test]
    fn test_close_twice_fails() {
        let mut month = in_memory_month();
        let mut line = CategoryState::new(&ItemKey::constraint("cat"), "Cat");
        line.rollover = 1_000.0;
        line.assigned = 5_000.0;
        line.activity = -4_000.0;
        month.upsert_category_state(line).unwrap();

        let snapshot = month.close_with_snapshot("user-1", false).unwrap();
        assert_eq!(snapshot.total_spent, 4_000.0);
        assert_eq!(snapshot.spending_variance, 1_000.0);
        assert_eq!(snapshot.category_rollovers["CONSTRAINT:cat"], 2_000.0);
        assert_eq!(month.status, MonthStatus::Closed);

        let again = month.close_with_snapshot("user-1", false);
        assert!(matches!(again, Err(Error::AlreadyClosed { .. })));
    }

    #[test]
    fn test_closed_month_rejects_commands() {
        let mut month = in_memory_month();
        month.close_with_snapshot("user-1", false).unwrap();

        assert!(matches!(
            month.record_income(1.0),
            Err(Error::NotModifiable { .. })
        ));
        assert!(matches!(
            month.append_state(MonthState::empty()),
            Err(Error::NotModifiable { .. })
        ));
        assert!(matches!(
            month.reset_workflow(),
            Err(Error::NotModifiable { .. })
        ));
    }

    #[test]
    fn test_archived_month_cannot_close() {
        let mut month = in_memory_month();
        month.status = MonthStatus::Archived;
        let result = month.close_with_snapshot("user-1", false);
        assert!(matches!(result, Err(Error::NotModifiable { .. })));
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() -> Result<()> {
        let db = setup_test_db().await?;
        let month = create_test_month(&db, TEST_USER).await?;

        let mut first = get_month_for_user(&db, month.id, TEST_USER).await?;
        let mut second = get_month_for_user(&db, month.id, TEST_USER).await?;

        first.record_income(100.0)?;
        save_month(&db, &mut first, 1, VersionBump::Increment).await?;
        assert_eq!(first.version, 2);

        second.record_income(200.0)?;
        let result = save_month(&db, &mut second, 1, VersionBump::Increment).await;
        assert!(matches!(
            result,
            Err(Error::OptimisticLockConflict { expected: 1, .. })
        ));

        let stored = get_month(&db, month.id).await?;
        assert_eq!(stored.current_state().unwrap().actual_income, 100.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_month_persists_command() -> Result<()> {
        let db = setup_test_db().await?;
        let month = create_test_month(&db, TEST_USER).await?;
        let rent = ItemKey::constraint("rent");

        update_month(&db, month.id, TEST_USER, |m| m.record_income(2_000.0)).await?;
        let (updated, ()) =
            update_month(&db, month.id, TEST_USER, |m| m.assign(&rent, "Rent", 800.0)).await?;
        assert_eq!(updated.version, 3);

        let stored = get_month(&db, month.id).await?;
        let state = stored.current_state().unwrap();
        assert_eq!(state.to_be_budgeted, 1_200.0);
        assert_eq!(state.category(&rent).unwrap().available, 800.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_close_month_persists_snapshot() -> Result<()> {
        let db = setup_test_db().await?;
        let month = create_test_month(&db, TEST_USER).await?;

        let closed = close_month(&db, month.id, TEST_USER, TEST_USER).await?;
        assert_eq!(closed.status, MonthStatus::Closed);

        let stored = get_month(&db, month.id).await?;
        assert_eq!(stored.status, MonthStatus::Closed);
        assert!(stored.closed_snapshot.is_some());
        assert_eq!(stored.closed_by.as_deref(), Some(TEST_USER));

        let again = close_month(&db, month.id, TEST_USER, TEST_USER).await;
        assert!(matches!(again, Err(Error::AlreadyClosed { .. })));
        Ok(())
    }
}
