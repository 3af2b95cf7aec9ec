//! Finalization - commits a planning session to the month ledger.
//!
//! The allocations are folded into one [`AllocationLedger`] keyed by item
//! kind and id, turned into a fresh applied `MonthState`, and appended with a
//! single optimistic-lock write. Staging is cleared only after that write.

use crate::{
    core::{
        dss::{
            AllocationLine, BudgetAllocation, DebtStrategy, DssWorkflowResults, GoalPrioritization,
            StepChoice,
        },
        ledger::{self, Month, VersionBump},
        staging::StagingRecord,
        state::{CategoryState, MonthState},
        types::{ItemKey, ItemType},
        workflow::{DssWorkflow, validate_choice},
    },
    errors::{Error, Result},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

const EPSILON: f64 = 1e-9;

/// What the user commits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    /// Final allocation lines
    pub allocations: Vec<AllocationLine>,
    /// Step 1 result; the staged acceptance when absent
    #[serde(default)]
    pub goal_prioritization: Option<GoalPrioritization>,
    /// Step 2 result; the staged acceptance when absent
    #[serde(default)]
    pub debt_strategy: Option<DebtStrategy>,
    /// Step 3 result; the staged acceptance when absent
    #[serde(default)]
    pub budget_allocation: Option<BudgetAllocation>,
    /// Month version the caller planned against
    #[serde(default)]
    pub expected_version: Option<i32>,
}

/// Something worth telling the user that does not block the commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FinalizeWarning {
    /// Allocations exceed the staged income
    OverAllocated {
        /// Staged monthly income
        income: f64,
        /// Sum of allocations
        allocated: f64,
    },
    /// A debt is planned below its scheduled minimum
    DebtBelowMinimum {
        /// Debt identifier
        debt_id: String,
        /// Planned payment
        amount: f64,
        /// Scheduled minimum
        minimum: f64,
    },
}

/// Result of a successful finalize.
#[derive(Debug, Clone)]
pub struct FinalizeOutcome {
    /// The month as written
    pub month: Month,
    /// Non-blocking findings
    pub warnings: Vec<FinalizeWarning>,
}

impl FinalizeOutcome {
    /// The snapshot finalize appended.
    #[must_use]
    pub fn state(&self) -> Option<&MonthState> {
        self.month.current_state()
    }
}

/// Allocations normalized to one entry per item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationLedger {
    entries: BTreeMap<ItemKey, (String, f64)>,
}

impl AllocationLedger {
    /// Folds `lines` into the ledger, summing duplicate items.
    ///
    /// Fails with `InvalidAllocation` on a negative or non-finite amount, or
    /// when no line carries a non-zero amount.
    pub fn from_lines(lines: &[AllocationLine]) -> Result<Self> {
        let mut entries: BTreeMap<ItemKey, (String, f64)> = BTreeMap::new();
        for line in lines {
            if !line.amount.is_finite() || line.amount < 0.0 {
                return Err(Error::InvalidAllocation {
                    message: format!("{} has amount {}", line.key, line.amount),
                });
            }
            let entry = entries
                .entry(line.key.clone())
                .or_insert_with(|| (String::new(), 0.0));
            if entry.0.is_empty() {
                entry.0.clone_from(&line.name);
            }
            entry.1 += line.amount;
        }

        if !entries.values().any(|(_, amount)| *amount > 0.0) {
            return Err(Error::InvalidAllocation {
                message: "at least one non-zero allocation is required".to_string(),
            });
        }
        Ok(Self { entries })
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.entries.values().map(|(_, amount)| amount).sum()
    }

    /// Amount allocated to `key`.
    #[must_use]
    pub fn amount(&self, key: &ItemKey) -> Option<f64> {
        self.entries.get(key).map(|(_, amount)| *amount)
    }

    /// Number of distinct items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries as (key, name, amount), ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&ItemKey, &str, f64)> {
        self.entries
            .iter()
            .map(|(key, (name, amount))| (key, name.as_str(), *amount))
    }
}

fn warnings_for(ledger: &AllocationLedger, record: &StagingRecord) -> Vec<FinalizeWarning> {
    let mut warnings = Vec::new();
    let income = record.inputs.monthly_income;
    let allocated = ledger.total();
    if allocated > income + EPSILON {
        warn!(
            "Month {} allocates {:.2} against income {:.2}",
            record.month_id, allocated, income
        );
        warnings.push(FinalizeWarning::OverAllocated { income, allocated });
    }

    for (key, _, amount) in ledger.iter().filter(|(k, _, _)| k.item_type == ItemType::Debt) {
        if let Some(debt) = record.inputs.debt(&key.item_id)
            && amount + EPSILON < debt.minimum_payment
        {
            warn!(
                "Debt {} planned at {:.2}, below its minimum {:.2}",
                debt.id, amount, debt.minimum_payment
            );
            warnings.push(FinalizeWarning::DebtBelowMinimum {
                debt_id: debt.id.clone(),
                amount,
                minimum: debt.minimum_payment,
            });
        }
    }
    warnings
}

impl DssWorkflow {
    async fn resolve_name(
        &self,
        user_id: &str,
        record: &StagingRecord,
        key: &ItemKey,
        name: &str,
    ) -> Result<String> {
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        if let Some(known) = record.inputs.item_name(key) {
            return Ok(known.to_string());
        }
        if key.item_type == ItemType::Constraint
            && let Some(found) = self.directory.category_name(user_id, &key.item_id).await?
        {
            return Ok(found);
        }
        Ok(key.item_id.clone())
    }

    /// Commits the session as a new applied snapshot of the month.
    ///
    /// This ends a planning session. Step payloads not supplied in `request`
    /// are taken from the staged acceptances, and every amount must be
    /// non-negative. Staging is cleared after the write; a failure to clear is
    /// logged and ignored.
    ///
    /// # Arguments
    /// * `month_id` - Month being planned
    /// * `user_id` - Owner of the month
    /// * `request` - Final allocations and optional step payloads
    #[instrument(skip(self, request), fields(lines = request.allocations.len()))]
    pub async fn finalize(
        &self,
        month_id: i64,
        user_id: &str,
        request: FinalizeRequest,
    ) -> Result<FinalizeOutcome> {
        // No lazy placeholder: the committed state is the first one when the
        // history is empty.
        let mut month = ledger::get_month(&self.db, month_id).await?;
        month.authorize(user_id)?;
        month.ensure_open()?;
        if let Some(expected) = request.expected_version
            && expected != month.version
        {
            return Err(Error::OptimisticLockConflict { month_id, expected });
        }
        let record = self.staging.get_or_fail(month_id, user_id).await?;
        let allocations = AllocationLedger::from_lines(&request.allocations)?;
        let warnings = warnings_for(&allocations, &record);

        let mut category_states = Vec::with_capacity(allocations.len());
        for (key, name, amount) in allocations.iter() {
            let name = self.resolve_name(user_id, &record, key, name).await?;
            category_states.push(CategoryState::funded(key, name, amount));
        }

        let now = Utc::now();
        let mut results = DssWorkflowResults::default();
        let choices = [
            request
                .goal_prioritization
                .or_else(|| record.goals.accepted.clone())
                .map(StepChoice::GoalPrioritization),
            request
                .debt_strategy
                .or_else(|| record.debts.accepted.clone())
                .map(StepChoice::DebtStrategy),
            request
                .budget_allocation
                .or_else(|| record.budget.accepted.clone())
                .map(StepChoice::BudgetAllocation),
        ];
        for choice in choices.into_iter().flatten() {
            validate_choice(&choice)?;
            results.record(choice, now);
        }

        let mut state = MonthState::empty();
        state.is_applied = true;
        state.actual_income = record.inputs.monthly_income;
        state.input_snapshot = record.inputs.clone();
        state.category_states = category_states;
        state.dss_workflow_results = Some(results);

        let expected = month.version;
        month.append_state(state)?;
        ledger::save_month(&self.db, &mut month, expected, VersionBump::Increment).await?;

        if let Err(e) = self.staging.clear(month_id, user_id).await {
            warn!("Finalized month {} but staging clear failed: {}", month_id, e);
        }
        info!(
            "Finalized month {} (user {}): {} lines, {:.2} allocated, {} warnings",
            month_id,
            user_id,
            allocations.len(),
            allocations.total(),
            warnings.len()
        );
        Ok(FinalizeOutcome { month, warnings })
    }
}
