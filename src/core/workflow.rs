//! The guided planning dialogue (step gate).
//!
//! A session moves through the steps in [`DssStep`] order. Previews are
//! recomputed on demand and only ever live in the staging cache; applying a
//! step writes the choice to staging and records it on the month's current
//! snapshot in the same call. Finalization lives in `finalize.rs`.

use crate::{
    config::settings::{AppConfig, DssConfig},
    core::{
        dss::{
            AllocationScenario, BudgetPreview, BudgetPreviewParams, DebtPayment, DebtPreview,
            DebtPreviewParams, DssStep, DssWorkflowResults, GoalPreview, GoalPreviewParams,
            OverviewPreview, PayoffStrategy, PreviewRequest, StepChoice, StepPreview,
        },
        ledger::{self, Month, VersionBump},
        payoff,
        solvers::{
            AllocationRequest, CategoryDirectory, Solvers, StaticDirectory, WeightedGoal,
            default_scenarios,
        },
        staging::{StagingCache, StagingRecord},
        state::MonthStatus,
        types::InputSnapshot,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, info, instrument, warn};

/// Debt minimums above this share of income trigger an overview warning.
const HIGH_DEBT_TO_INCOME_PCT: f64 = 36.0;

/// Preview and acceptance flags of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepStatus {
    /// The step
    pub step: DssStep,
    /// Whether a preview is cached
    pub has_preview: bool,
    /// Whether the user accepted a value
    pub is_accepted: bool,
}

/// Where a planning session stands.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowStatus {
    /// Month being planned
    pub month_id: i64,
    /// Month lifecycle status
    pub month_status: MonthStatus,
    /// Stored optimistic-lock version
    pub month_version: i32,
    /// Whether a staging record exists
    pub initialized: bool,
    /// Per-step flags, empty when not initialized
    pub steps: Vec<StepStatus>,
    /// Next decision step that can be applied
    pub next_step: Option<DssStep>,
    /// Whether steps 1-3 are all accepted
    pub is_complete: bool,
    /// Durable results of the current snapshot
    pub results: Option<DssWorkflowResults>,
    /// When the staging record expires unless saved again
    pub expires_at: Option<DateTime<Utc>>,
}

/// Planning dialogue service for all months and users.
#[derive(Clone)]
pub struct DssWorkflow {
    pub(crate) db: DatabaseConnection,
    pub(crate) staging: StagingCache,
    pub(crate) solvers: Solvers,
    pub(crate) directory: Arc<dyn CategoryDirectory>,
    pub(crate) config: DssConfig,
}

impl DssWorkflow {
    /// Wires the workflow with explicit collaborators.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        staging: StagingCache,
        solvers: Solvers,
        directory: Arc<dyn CategoryDirectory>,
        config: DssConfig,
    ) -> Self {
        Self {
            db,
            staging,
            solvers,
            directory,
            config,
        }
    }

    /// Workflow with the configured cache and the reference solvers.
    #[must_use]
    pub fn from_config(db: DatabaseConnection, config: &AppConfig) -> Self {
        Self::new(
            db,
            StagingCache::from_config(config.staging.clone()),
            Solvers::reference(config.dss.max_payoff_months),
            Arc::new(StaticDirectory::default()),
            config.dss.clone(),
        )
    }

    /// Database handle the workflow writes to.
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn open_month(&self, month_id: i64, user_id: &str) -> Result<Month> {
        let month = ledger::get_month_for_user(&self.db, month_id, user_id).await?;
        month.ensure_open()?;
        Ok(month)
    }

    /// Starts a planning session with frozen `inputs`, replacing any previous
    /// session for the same month and user.
    ///
    /// Active recurring budgets missing from `inputs` are added as fixed
    /// constraints, and unnamed constraints are named from the directory.
    #[instrument(skip(self, inputs))]
    pub async fn initialize(
        &self,
        month_id: i64,
        user_id: &str,
        mut inputs: InputSnapshot,
    ) -> Result<StagingRecord> {
        self.open_month(month_id, user_id).await?;

        let known: HashSet<String> = inputs
            .constraints
            .iter()
            .map(|c| c.category_id.clone())
            .collect();
        for recurring in self.directory.active_recurring_budgets(user_id).await? {
            if !known.contains(&recurring.category_id) {
                debug!("Adding recurring budget {} to inputs", recurring.category_id);
                inputs.constraints.push(recurring);
            }
        }
        for constraint in &mut inputs.constraints {
            if constraint.name.is_empty() {
                constraint.name = self
                    .directory
                    .category_name(user_id, &constraint.category_id)
                    .await?
                    .unwrap_or_else(|| constraint.category_id.clone());
            }
        }
        inputs.as_of.get_or_insert_with(|| Utc::now().date_naive());

        self.staging.initialize(month_id, user_id, inputs).await
    }

    /// Computes, caches and returns the preview for one step.
    ///
    /// Called each time the user asks to see a step's options. Cached
    /// previews from the requested step onward are discarded first, as are
    /// acceptances of later steps. The durable ledger is never written.
    ///
    /// # Arguments
    /// * `month_id` - Month being planned
    /// * `user_id` - Owner of the month
    /// * `request` - Step and its parameters
    #[instrument(skip(self, request), fields(step = %request.step()))]
    pub async fn preview(
        &self,
        month_id: i64,
        user_id: &str,
        request: PreviewRequest,
    ) -> Result<StepPreview> {
        self.open_month(month_id, user_id).await?;
        let mut record = self.staging.get_or_fail(month_id, user_id).await?;
        let step = request.step();
        record.invalidate_for_preview(step);

        let preview = match request {
            PreviewRequest::Overview => StepPreview::Overview(overview(&record.inputs)),
            PreviewRequest::GoalPrioritization(params) => {
                StepPreview::GoalPrioritization(self.preview_goals(&record, &params)?)
            }
            PreviewRequest::DebtStrategy(params) => {
                StepPreview::DebtStrategy(self.preview_debts(&record, &params)?)
            }
            PreviewRequest::BudgetAllocation(params) => {
                StepPreview::BudgetAllocation(self.preview_budget(&record, &params)?)
            }
        };

        record.store_preview(preview.clone());
        self.staging.save(&mut record).await?;
        debug!("Stored step {} preview for month {}", step, month_id);
        Ok(preview)
    }

    fn preview_goals(
        &self,
        record: &StagingRecord,
        params: &GoalPreviewParams,
    ) -> Result<GoalPreview> {
        let ranking = self
            .solvers
            .goal_ranker
            .rank(&record.inputs.goals, &params.criteria, as_of(&record.inputs))?;
        Ok(GoalPreview {
            criteria: params.criteria,
            ranking,
        })
    }

    fn preview_debts(
        &self,
        record: &StagingRecord,
        params: &DebtPreviewParams,
    ) -> Result<DebtPreview> {
        let pct = params
            .debt_allocation_pct
            .unwrap_or(self.config.default_debt_allocation_pct);
        if !(0.0..=1.0).contains(&pct) {
            return Err(Error::InvalidAllocation {
                message: format!("debt allocation share {pct} must be between 0 and 1"),
            });
        }

        let (revolving, fixed) = payoff::partition_debts(&record.inputs.debts);
        let budget = payoff::debt_budget(
            record.inputs.monthly_income,
            pct,
            payoff::minimum_sum(&revolving),
            payoff::minimum_sum(&fixed),
        );
        if budget.floor_applied {
            warn!(
                "Debt minimums exceed {:.0}% of income; debt budget raised to {:.2}",
                pct * 100.0,
                budget.total_debt_budget
            );
        }

        let simulations = self
            .solvers
            .debt_simulator
            .compare(&revolving, budget.revolving_budget)?;
        let recommended = payoff::pick_strategy(&simulations).unwrap_or(PayoffStrategy::Avalanche);

        Ok(DebtPreview {
            budget,
            simulations,
            recommended,
            fixed_payments: payoff::fixed_payments(&fixed),
        })
    }

    fn preview_budget(
        &self,
        record: &StagingRecord,
        params: &BudgetPreviewParams,
    ) -> Result<BudgetPreview> {
        let inputs = &record.inputs;
        let today = as_of(inputs);

        #[allow(clippy::cast_precision_loss)]
        let even = 1.0 / inputs.goals.len().max(1) as f64;
        let goals = inputs
            .goals
            .iter()
            .map(|goal| WeightedGoal {
                goal: goal.clone(),
                weight: record
                    .goals
                    .accepted
                    .as_ref()
                    .map_or(even, |ranking| ranking.weight_of(&goal.id).unwrap_or(0.0)),
                monthly_need: goal.monthly_need(today),
            })
            .collect();

        let request = AllocationRequest {
            monthly_income: inputs.monthly_income,
            constraints: inputs.constraints.clone(),
            goals,
            debt_payments: debt_payments_for_budget(record, params.debt_total_override),
            scenarios: if params.scenarios.is_empty() {
                default_scenarios()
            } else {
                params.scenarios.clone()
            },
        };

        let scenarios = self.solvers.allocator.allocate(&request)?;
        let recommended = scenarios
            .iter()
            .fold(None, |best: Option<&AllocationScenario>, s| match best {
                Some(b) if b.feasibility_score >= s.feasibility_score => Some(b),
                _ => Some(s),
            })
            .map(|s| s.name.clone())
            .unwrap_or_default();

        Ok(BudgetPreview {
            scenarios,
            recommended,
        })
    }

    /// Accepts a step choice and records it durably.
    ///
    /// Step N can only be applied once step N-1 is accepted (step 1 is always
    /// allowed). The result is written to the month before the session is
    /// updated; acceptances and previews of later steps are discarded.
    ///
    /// # Arguments
    /// * `month_id` - Month being planned
    /// * `user_id` - Owner of the month
    /// * `choice` - The user's decision for one step
    ///
    /// # Returns
    /// * `Ok(results)` - Durable results of the current snapshot after the write
    #[instrument(skip(self, choice), fields(step = %choice.step()))]
    pub async fn apply(
        &self,
        month_id: i64,
        user_id: &str,
        choice: StepChoice,
    ) -> Result<DssWorkflowResults> {
        let mut month = self.open_month(month_id, user_id).await?;
        let mut record = self.staging.get_or_fail(month_id, user_id).await?;

        let step = choice.step();
        if let Some(requires) = step.prerequisite()
            && !record.is_accepted(requires)
        {
            return Err(Error::StepOutOfOrder { step, requires });
        }
        validate_choice(&choice)?;

        let expected = month.version;
        month.record_step(choice.clone(), Utc::now())?;
        ledger::save_month(&self.db, &mut month, expected, VersionBump::Increment).await?;

        record.accept(choice);
        record.invalidate_after(step);
        if let Err(e) = self.staging.save(&mut record).await {
            warn!("Step {} applied to month {} but staging save failed: {}", step, month_id, e);
        }

        info!("Applied step {} for month {} (user {})", step, month_id, user_id);
        Ok(month
            .current_state()
            .and_then(|s| s.dss_workflow_results.clone())
            .unwrap_or_default())
    }

    /// Reports where the session stands. A missing or expired staging record
    /// reads as not initialized rather than an error.
    pub async fn workflow_status(&self, month_id: i64, user_id: &str) -> Result<WorkflowStatus> {
        let month = ledger::get_month_for_user(&self.db, month_id, user_id).await?;
        let record = match self.staging.get_or_fail(month_id, user_id).await {
            Ok(record) => Some(record),
            Err(Error::NotInitialized { .. }) => None,
            Err(e) => return Err(e),
        };

        let steps = record.as_ref().map_or_else(Vec::new, |r| {
            DssStep::ALL
                .into_iter()
                .map(|step| StepStatus {
                    step,
                    has_preview: r.has_preview(step),
                    is_accepted: r.is_accepted(step),
                })
                .collect()
        });
        let next_step = record.as_ref().and_then(|r| {
            DssStep::ALL.into_iter().find(|s| {
                s.is_decision()
                    && !r.is_accepted(*s)
                    && s.prerequisite().is_none_or(|p| r.is_accepted(p))
            })
        });

        Ok(WorkflowStatus {
            month_id,
            month_status: month.status,
            month_version: month.version,
            initialized: record.is_some(),
            steps,
            next_step,
            is_complete: record.as_ref().is_some_and(StagingRecord::is_complete),
            results: month
                .current_state()
                .and_then(|s| s.dss_workflow_results.clone()),
            expires_at: record
                .as_ref()
                .and_then(|r| self.staging.expires_at(r.updated_at)),
        })
    }

    /// Discards the session and zeroes the durable results of the current
    /// snapshot. The month version is left as it was.
    #[instrument(skip(self))]
    pub async fn reset(&self, month_id: i64, user_id: &str) -> Result<()> {
        let mut month = self.open_month(month_id, user_id).await?;
        let expected = month.version;
        month.reset_workflow()?;
        ledger::save_month(&self.db, &mut month, expected, VersionBump::Preserve).await?;

        if let Err(e) = self.staging.clear(month_id, user_id).await {
            warn!("Reset month {} but staging clear failed: {}", month_id, e);
        }
        info!("Reset planning session for month {} (user {})", month_id, user_id);
        Ok(())
    }
}

pub(crate) fn as_of(inputs: &InputSnapshot) -> NaiveDate {
    inputs.as_of.unwrap_or_else(|| Utc::now().date_naive())
}

/// Debt payments step 3 plans around: the accepted strategy's payments, or
/// every debt at its minimum when no strategy is accepted yet.
///
/// With `total_override`, the revolving share of the override is spread with
/// the accepted strategy's extra-payment weights; fixed debts keep their minimum.
fn debt_payments_for_budget(
    record: &StagingRecord,
    total_override: Option<f64>,
) -> Vec<DebtPayment> {
    let (revolving, fixed) = payoff::partition_debts(&record.inputs.debts);
    match (record.debts.accepted.as_ref(), total_override) {
        (Some(strategy), None) => strategy.payments.clone(),
        (accepted, Some(total)) => {
            let revolving_total = total - payoff::minimum_sum(&fixed);
            let weights = accepted.map(|s| s.extra_weights.clone()).unwrap_or_default();
            let mut payments = payoff::fixed_payments(&fixed);
            payments.extend(payoff::redistribute(&revolving, &weights, revolving_total));
            payments
        }
        (None, None) => {
            let mut payments = payoff::fixed_payments(&fixed);
            payments.extend(payoff::fixed_payments(&revolving));
            payments
        }
    }
}

/// Rejects negative or non-finite amounts in a step payload.
pub(crate) fn validate_choice(choice: &StepChoice) -> Result<()> {
    let bad = |what: &str, amount: f64| Error::InvalidAllocation {
        message: format!("{what} amount {amount} must be a non-negative number"),
    };
    match choice {
        StepChoice::GoalPrioritization(ranking) => {
            if let Some(goal) = ranking
                .ranked
                .iter()
                .find(|g| !g.weight.is_finite() || g.weight < 0.0)
            {
                return Err(bad("goal weight", goal.weight));
            }
        }
        StepChoice::DebtStrategy(strategy) => {
            if let Some(payment) = strategy
                .payments
                .iter()
                .find(|p| !p.amount.is_finite() || p.amount < 0.0)
            {
                return Err(bad("debt payment", payment.amount));
            }
            for payment in strategy.payments.iter().filter(|p| p.is_below_minimum()) {
                warn!(
                    "Debt {} planned at {:.2}, below its minimum {:.2}",
                    payment.debt_id, payment.amount, payment.minimum
                );
            }
        }
        StepChoice::BudgetAllocation(allocation) => {
            if let Some(line) = allocation
                .allocations
                .iter()
                .find(|l| !l.amount.is_finite() || l.amount < 0.0)
            {
                return Err(bad("allocation", line.amount));
            }
        }
    }
    Ok(())
}

/// Step 0: summary of the frozen inputs.
#[must_use]
pub fn overview(inputs: &InputSnapshot) -> OverviewPreview {
    let income = inputs.monthly_income;
    let constraint_minimum: f64 = inputs.constraints.iter().map(|c| c.min_amount).sum();
    let debt_minimum = payoff::minimum_sum(&inputs.debts);
    let today = as_of(inputs);
    let goal_monthly_need: f64 = inputs.goals.iter().map(|g| g.monthly_need(today)).sum();
    let disposable_income = income - constraint_minimum - debt_minimum;
    let debt_to_income_pct = if income > 0.0 {
        debt_minimum / income * 100.0
    } else {
        0.0
    };

    let mut warnings = Vec::new();
    if income <= 0.0 {
        warnings.push("No monthly income is expected".to_string());
    }
    if disposable_income < 0.0 {
        warnings.push(format!(
            "Minimum obligations exceed income by {:.2}",
            -disposable_income
        ));
    } else if goal_monthly_need > disposable_income {
        warnings.push(format!(
            "Goals need {goal_monthly_need:.2} per month but only {disposable_income:.2} is left after obligations"
        ));
    }
    if debt_to_income_pct > HIGH_DEBT_TO_INCOME_PCT {
        warnings.push(format!("Debt minimums take {debt_to_income_pct:.1}% of income"));
    }

    OverviewPreview {
        monthly_income: income,
        constraint_minimum,
        debt_minimum,
        goal_monthly_need,
        disposable_income,
        debt_to_income_pct,
        goal_count: inputs.goals.len(),
        debt_count: inputs.debts.len(),
        warnings,
    }
}
