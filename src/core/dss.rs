//! Decision-support step payloads.
//!
//! Each step of the planning dialogue has one concrete preview type and, for
//! steps 1-3, one concrete accepted type. [`StepPreview`] and [`StepChoice`]
//! are the tagged unions the staging cache stores, and [`DssWorkflowResults`]
//! is the durable record kept on a `MonthState`.

use crate::core::types::ItemKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The ordered steps of the planning dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DssStep {
    /// Step 0 - read-only summary of the inputs, never accepted
    Overview,
    /// Step 1 - rank savings goals
    GoalPrioritization,
    /// Step 2 - choose a debt payoff strategy
    DebtStrategy,
    /// Step 3 - split income across categories, goals and debts
    BudgetAllocation,
}

impl DssStep {
    /// All steps in order.
    pub const ALL: [Self; 4] = [
        Self::Overview,
        Self::GoalPrioritization,
        Self::DebtStrategy,
        Self::BudgetAllocation,
    ];

    /// Numeric position of the step (0-3).
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::Overview => 0,
            Self::GoalPrioritization => 1,
            Self::DebtStrategy => 2,
            Self::BudgetAllocation => 3,
        }
    }

    /// Step whose acceptance gates applying this one.
    ///
    /// Step 1 has no prerequisite: the overview is never accepted.
    #[must_use]
    pub const fn prerequisite(self) -> Option<Self> {
        match self {
            Self::Overview | Self::GoalPrioritization => None,
            Self::DebtStrategy => Some(Self::GoalPrioritization),
            Self::BudgetAllocation => Some(Self::DebtStrategy),
        }
    }

    /// Whether the step produces an accepted, persisted result.
    #[must_use]
    pub const fn is_decision(self) -> bool {
        !matches!(self, Self::Overview)
    }
}

impl fmt::Display for DssStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

// Step 0

/// Summary of the frozen inputs shown before the first decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewPreview {
    /// Expected monthly income
    pub monthly_income: f64,
    /// Sum of constraint minimums
    pub constraint_minimum: f64,
    /// Sum of debt minimum payments
    pub debt_minimum: f64,
    /// Sum of monthly contributions needed to keep goals on schedule
    pub goal_monthly_need: f64,
    /// Income left after constraint minimums and debt minimums
    pub disposable_income: f64,
    /// Debt minimums as a percentage of income
    pub debt_to_income_pct: f64,
    /// Number of goals
    pub goal_count: usize,
    /// Number of debts
    pub debt_count: usize,
    /// Human-readable warnings about the inputs
    pub warnings: Vec<String>,
}

// Step 1

/// Relative weight of each goal ranking criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriteriaWeights {
    /// How close the deadline is
    pub urgency: f64,
    /// User-declared importance
    pub importance: f64,
    /// Share of the target already saved
    pub progress: f64,
}

impl Default for CriteriaWeights {
    fn default() -> Self {
        Self {
            urgency: 0.4,
            importance: 0.4,
            progress: 0.2,
        }
    }
}

/// Parameters for previewing the goal ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalPreviewParams {
    /// Criteria weights handed to the ranker
    #[serde(default)]
    pub criteria: CriteriaWeights,
}

/// One goal in a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGoal {
    /// Goal identifier
    pub goal_id: String,
    /// Display name
    pub name: String,
    /// 1-based rank, 1 is the highest priority
    pub rank: u32,
    /// Priority weight; weights of a ranking sum to 1
    pub weight: f64,
}

/// Ranked goal priorities, as proposed by the ranker or confirmed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPrioritization {
    /// Goals ordered by rank
    pub ranked: Vec<RankedGoal>,
    /// Consistency ratio of the criteria comparison
    pub consistency_ratio: f64,
    /// Whether the ratio is inside the acceptable bound
    pub is_consistent: bool,
}

impl GoalPrioritization {
    /// Priority weight of a goal, if it was ranked.
    #[must_use]
    pub fn weight_of(&self, goal_id: &str) -> Option<f64> {
        self.ranked
            .iter()
            .find(|g| g.goal_id == goal_id)
            .map(|g| g.weight)
    }
}

/// Step 1 preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalPreview {
    /// Criteria the ranking was computed with
    pub criteria: CriteriaWeights,
    /// Proposed ranking
    pub ranking: GoalPrioritization,
}

// Step 2

/// Order in which extra payments are directed at debts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoffStrategy {
    /// Highest interest rate first
    Avalanche,
    /// Smallest balance first
    Snowball,
    /// Blend of rate and balance
    Hybrid,
}

impl PayoffStrategy {
    /// All strategies, in tie-break preference order.
    pub const ALL: [Self; 3] = [Self::Avalanche, Self::Snowball, Self::Hybrid];
}

/// Parameters for previewing the debt strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebtPreviewParams {
    /// Share of monthly income devoted to debt (0-1); configuration default when absent
    pub debt_allocation_pct: Option<f64>,
}

/// How the month's debt budget splits between fixed and optimized debts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtBudget {
    /// Total monthly debt budget after the minimum floor is applied
    pub total_debt_budget: f64,
    /// Budget handed to the optimizer for revolving debts, minimums included
    pub revolving_budget: f64,
    /// Sum of revolving minimums
    pub revolving_minimum: f64,
    /// Sum of installment and interest-only minimums
    pub fixed_minimum: f64,
    /// Whether minimums forced the budget above `income * pct`
    pub floor_applied: bool,
}

/// Outcome of simulating one payoff strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySimulation {
    /// Strategy simulated
    pub strategy: PayoffStrategy,
    /// Interest paid until every debt is cleared
    pub total_interest: f64,
    /// Months until every debt is cleared
    pub months_to_payoff: u32,
    /// First-month payment per debt id
    pub first_month_payments: BTreeMap<String, f64>,
    /// Share of the extra (above-minimum) budget each debt received in the first month
    pub extra_weights: BTreeMap<String, f64>,
}

/// One debt payment line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtPayment {
    /// Debt identifier
    pub debt_id: String,
    /// Display name
    pub name: String,
    /// Planned payment this month
    pub amount: f64,
    /// Scheduled minimum payment
    pub minimum: f64,
}

impl DebtPayment {
    /// Whether the payment is below the scheduled minimum.
    #[must_use]
    pub fn is_below_minimum(&self) -> bool {
        self.amount < self.minimum
    }
}

/// Step 2 preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtPreview {
    /// Budget split
    pub budget: DebtBudget,
    /// One simulation per strategy
    pub simulations: Vec<StrategySimulation>,
    /// Strategy with the lowest total interest
    pub recommended: PayoffStrategy,
    /// Installment and interest-only debts at their minimum
    pub fixed_payments: Vec<DebtPayment>,
}

/// Debt strategy confirmed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtStrategy {
    /// Chosen strategy
    pub strategy: PayoffStrategy,
    /// Total monthly debt budget
    pub total_debt_budget: f64,
    /// Planned payment per debt, fixed debts included
    pub payments: Vec<DebtPayment>,
    /// Extra-payment weights of the chosen strategy, per revolving debt
    pub extra_weights: BTreeMap<String, f64>,
}

// Step 3

/// One budget scenario the allocator should produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Scenario label
    pub name: String,
    /// Share of the surplus (after minimums) that goes to goals, 0-1
    pub goal_share: f64,
}

/// Parameters for previewing the budget allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetPreviewParams {
    /// Scenarios to compute; the standard three when empty
    #[serde(default)]
    pub scenarios: Vec<ScenarioParams>,
    /// Debt total to spread with the accepted strategy's weights instead of its payments
    pub debt_total_override: Option<f64>,
}

/// One allocation line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    /// Item receiving the money
    pub key: ItemKey,
    /// Display name; resolved from inputs when empty
    #[serde(default)]
    pub name: String,
    /// Amount allocated
    pub amount: f64,
}

/// One allocation scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationScenario {
    /// Scenario label
    pub name: String,
    /// Allocations per item
    pub allocations: Vec<AllocationLine>,
    /// 0-100; how well income covers the scenario's requirements
    pub feasibility_score: f64,
    /// Income left unallocated
    pub unallocated: f64,
}

/// Step 3 preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetPreview {
    /// Computed scenarios
    pub scenarios: Vec<AllocationScenario>,
    /// Name of the most feasible scenario
    pub recommended: String,
}

/// Budget allocation confirmed by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAllocation {
    /// Scenario the allocation started from
    pub scenario: String,
    /// Allocations per item
    pub allocations: Vec<AllocationLine>,
    /// Feasibility score of the scenario
    pub feasibility_score: f64,
}

// Tagged unions

/// A preview request, one variant per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "params", rename_all = "snake_case")]
pub enum PreviewRequest {
    /// Step 0
    Overview,
    /// Step 1
    GoalPrioritization(GoalPreviewParams),
    /// Step 2
    DebtStrategy(DebtPreviewParams),
    /// Step 3
    BudgetAllocation(BudgetPreviewParams),
}

impl PreviewRequest {
    /// Step the request targets.
    #[must_use]
    pub const fn step(&self) -> DssStep {
        match self {
            Self::Overview => DssStep::Overview,
            Self::GoalPrioritization(_) => DssStep::GoalPrioritization,
            Self::DebtStrategy(_) => DssStep::DebtStrategy,
            Self::BudgetAllocation(_) => DssStep::BudgetAllocation,
        }
    }
}

/// A computed preview, one variant per step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "payload", rename_all = "snake_case")]
pub enum StepPreview {
    /// Step 0
    Overview(OverviewPreview),
    /// Step 1
    GoalPrioritization(GoalPreview),
    /// Step 2
    DebtStrategy(DebtPreview),
    /// Step 3
    BudgetAllocation(BudgetPreview),
}

impl StepPreview {
    /// Step the preview belongs to.
    #[must_use]
    pub const fn step(&self) -> DssStep {
        match self {
            Self::Overview(_) => DssStep::Overview,
            Self::GoalPrioritization(_) => DssStep::GoalPrioritization,
            Self::DebtStrategy(_) => DssStep::DebtStrategy,
            Self::BudgetAllocation(_) => DssStep::BudgetAllocation,
        }
    }
}

/// A user decision, one variant per decision step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "choice", rename_all = "snake_case")]
pub enum StepChoice {
    /// Step 1
    GoalPrioritization(GoalPrioritization),
    /// Step 2
    DebtStrategy(DebtStrategy),
    /// Step 3
    BudgetAllocation(BudgetAllocation),
}

impl StepChoice {
    /// Step the choice belongs to.
    #[must_use]
    pub const fn step(&self) -> DssStep {
        match self {
            Self::GoalPrioritization(_) => DssStep::GoalPrioritization,
            Self::DebtStrategy(_) => DssStep::DebtStrategy,
            Self::BudgetAllocation(_) => DssStep::BudgetAllocation,
        }
    }
}

// Durable results

/// A persisted step result with the time it was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedStep<T> {
    /// When the step was applied
    pub applied_at: DateTime<Utc>,
    /// The accepted payload
    pub result: T,
}

/// Durable record of the planning dialogue on a `MonthState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DssWorkflowResults {
    /// Last applied step (0 when nothing is applied)
    pub current_step: u8,
    /// Steps with a recorded result
    pub completed_steps: BTreeSet<DssStep>,
    /// Step 1 result
    pub goal_prioritization: Option<AppliedStep<GoalPrioritization>>,
    /// Step 2 result
    pub debt_strategy: Option<AppliedStep<DebtStrategy>>,
    /// Step 3 result
    pub budget_allocation: Option<AppliedStep<BudgetAllocation>>,
}

impl DssWorkflowResults {
    /// Records an applied step and drops every result after it.
    pub fn record(&mut self, choice: StepChoice, applied_at: DateTime<Utc>) {
        let step = choice.step();
        match choice {
            StepChoice::GoalPrioritization(result) => {
                self.goal_prioritization = Some(AppliedStep { applied_at, result });
            }
            StepChoice::DebtStrategy(result) => {
                self.debt_strategy = Some(AppliedStep { applied_at, result });
            }
            StepChoice::BudgetAllocation(result) => {
                self.budget_allocation = Some(AppliedStep { applied_at, result });
            }
        }
        self.clear_after(step);
        self.completed_steps.insert(step);
        self.current_step = step.index();
    }

    /// Drops results of every step after `step`.
    pub fn clear_after(&mut self, step: DssStep) {
        for later in DssStep::ALL.into_iter().filter(|s| *s > step) {
            match later {
                DssStep::Overview => {}
                DssStep::GoalPrioritization => self.goal_prioritization = None,
                DssStep::DebtStrategy => self.debt_strategy = None,
                DssStep::BudgetAllocation => self.budget_allocation = None,
            }
            self.completed_steps.remove(&later);
        }
    }

    /// Zeroes the record.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether no step has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed_steps.is_empty()
    }
}
