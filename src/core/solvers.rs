//! External collaborators of the planning dialogue.
//!
//! The workflow only depends on the traits here. The reference implementations
//! are deliberately simple and deterministic; production deployments inject
//! their own ranker, simulator and allocator through [`Solvers`].

use crate::{
    core::{
        dss::{
            AllocationLine, AllocationScenario, CriteriaWeights, DebtPayment, GoalPrioritization,
            RankedGoal, ScenarioParams, StrategySimulation,
        },
        payoff::AmortizationSimulator,
        types::{ConstraintInput, DebtInput, GoalInput, ItemKey},
    },
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::{collections::HashMap, sync::Arc};

/// Ranks goals against weighted criteria.
pub trait GoalRanker: Send + Sync {
    /// Returns the goals ranked by priority.
    fn rank(
        &self,
        goals: &[GoalInput],
        criteria: &CriteriaWeights,
        as_of: NaiveDate,
    ) -> Result<GoalPrioritization>;
}

/// Simulates debt payoff strategies.
pub trait DebtSimulator: Send + Sync {
    /// Simulates every strategy for `debts` under a fixed monthly budget.
    fn compare(&self, debts: &[DebtInput], monthly_budget: f64) -> Result<Vec<StrategySimulation>>;
}

/// A goal with the priority weight and monthly need the allocator should honor.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedGoal {
    /// The goal
    pub goal: GoalInput,
    /// Priority weight; weights of a request sum to 1
    pub weight: f64,
    /// Contribution needed this month to stay on schedule
    pub monthly_need: f64,
}

/// Everything the allocator needs for one month.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    /// Income to allocate
    pub monthly_income: f64,
    /// Spending categories with their ranges
    pub constraints: Vec<ConstraintInput>,
    /// Goals with priority weights
    pub goals: Vec<WeightedGoal>,
    /// Debt payments fixed by the debt strategy
    pub debt_payments: Vec<DebtPayment>,
    /// Scenarios to produce
    pub scenarios: Vec<ScenarioParams>,
}

/// Splits a month's income into allocation scenarios.
pub trait BudgetAllocator: Send + Sync {
    /// Returns one scenario per requested scenario, in request order.
    fn allocate(&self, request: &AllocationRequest) -> Result<Vec<AllocationScenario>>;
}

/// Category metadata owned by another service.
#[async_trait]
pub trait CategoryDirectory: Send + Sync {
    /// Display name of a category.
    async fn category_name(&self, user_id: &str, category_id: &str) -> Result<Option<String>>;
    /// Active recurring budgets of a user, as spending constraints.
    async fn active_recurring_budgets(&self, user_id: &str) -> Result<Vec<ConstraintInput>>;
}

/// Directory backed by fixed data; the default knows nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
    recurring: Vec<ConstraintInput>,
}

impl StaticDirectory {
    /// Directory with the given category names and recurring budgets.
    #[must_use]
    pub fn new(names: HashMap<String, String>, recurring: Vec<ConstraintInput>) -> Self {
        Self { names, recurring }
    }
}

#[async_trait]
impl CategoryDirectory for StaticDirectory {
    async fn category_name(&self, _user_id: &str, category_id: &str) -> Result<Option<String>> {
        Ok(self.names.get(category_id).cloned())
    }

    async fn active_recurring_budgets(&self, _user_id: &str) -> Result<Vec<ConstraintInput>> {
        Ok(self.recurring.clone())
    }
}

/// The solver set a workflow runs with.
#[derive(Clone)]
pub struct Solvers {
    /// Step 1
    pub goal_ranker: Arc<dyn GoalRanker>,
    /// Step 2
    pub debt_simulator: Arc<dyn DebtSimulator>,
    /// Step 3
    pub allocator: Arc<dyn BudgetAllocator>,
}

impl Solvers {
    /// Reference solvers with the given payoff horizon.
    #[must_use]
    pub fn reference(max_payoff_months: u32) -> Self {
        Self {
            goal_ranker: Arc::new(WeightedGoalRanker),
            debt_simulator: Arc::new(AmortizationSimulator::new(max_payoff_months)),
            allocator: Arc::new(GoalProgrammingAllocator),
        }
    }
}

/// Scores each goal as a weighted sum of urgency, importance and progress.
///
/// Weights are taken as given, so the implied pairwise comparison is always
/// consistent and the reported ratio is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedGoalRanker;

impl GoalRanker for WeightedGoalRanker {
    fn rank(
        &self,
        goals: &[GoalInput],
        criteria: &CriteriaWeights,
        as_of: NaiveDate,
    ) -> Result<GoalPrioritization> {
        let weights = [criteria.urgency, criteria.importance, criteria.progress];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Solver {
                message: "criteria weights must be non-negative".to_string(),
            });
        }
        let weight_sum: f64 = weights.iter().sum();
        if weight_sum <= 0.0 {
            return Err(Error::Solver {
                message: "at least one criteria weight must be positive".to_string(),
            });
        }

        let mut scored: Vec<(&GoalInput, f64)> = goals
            .iter()
            .map(|goal| {
                let urgency = goal.deadline.map_or(0.0, |deadline| {
                    #[allow(clippy::cast_precision_loss)]
                    let months =
                        (deadline.signed_duration_since(as_of).num_days() as f64 / 30.0).max(0.0);
                    1.0 / (1.0 + months)
                });
                let importance = f64::from(goal.importance.min(10)) / 10.0;
                let progress = if goal.target_amount > 0.0 {
                    (goal.current_amount / goal.target_amount).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let score = (criteria.urgency * urgency
                    + criteria.importance * importance
                    + criteria.progress * progress)
                    / weight_sum;
                (goal, score)
            })
            .collect();

        scored.sort_by(|(a, sa), (b, sb)| {
            sb.partial_cmp(sa)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total: f64 = scored.iter().map(|(_, s)| s).sum();
        #[allow(clippy::cast_precision_loss)]
        let even = 1.0 / scored.len().max(1) as f64;
        let ranked = scored
            .iter()
            .zip(1..)
            .map(|((goal, score), rank)| RankedGoal {
                goal_id: goal.id.clone(),
                name: goal.name.clone(),
                rank,
                weight: if total > 0.0 { score / total } else { even },
            })
            .collect();

        Ok(GoalPrioritization {
            ranked,
            consistency_ratio: 0.0,
            is_consistent: true,
        })
    }
}

/// Standard scenarios, from cautious to goal-heavy.
#[must_use]
pub fn default_scenarios() -> Vec<ScenarioParams> {
    [("conservative", 0.3), ("balanced", 0.5), ("aggressive", 0.8)]
        .into_iter()
        .map(|(name, goal_share)| ScenarioParams {
            name: name.to_string(),
            goal_share,
        })
        .collect()
}

/// Lexicographic goal-programming allocation.
///
/// Priority 1 covers constraint minimums and debt payments. Priority 2 gives
/// goals their share of the surplus by weight, capped at what each goal still
/// needs. Priority 3 fills flexible categories up to their maximum in
/// proportion to their headroom. Whatever is left stays unallocated.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalProgrammingAllocator;

impl GoalProgrammingAllocator {
    fn scenario(request: &AllocationRequest, params: &ScenarioParams) -> AllocationScenario {
        let mut lines: Vec<AllocationLine> = Vec::new();

        let constraint_min: f64 = request.constraints.iter().map(|c| c.min_amount).sum();
        let debt_total: f64 = request.debt_payments.iter().map(|p| p.amount).sum();
        let required = constraint_min + debt_total;
        let surplus = (request.monthly_income - required).max(0.0);

        // Priority 2: goals
        let goal_pool = surplus * params.goal_share.clamp(0.0, 1.0);
        let mut goal_total = 0.0;
        for weighted in &request.goals {
            let amount = (goal_pool * weighted.weight).min(weighted.goal.remaining()).max(0.0);
            goal_total += amount;
            lines.push(AllocationLine {
                key: ItemKey::goal(&weighted.goal.id),
                name: weighted.goal.name.clone(),
                amount,
            });
        }

        // Priority 3: flexible headroom
        let flex_pool = (surplus - goal_total).max(0.0);
        let headroom: f64 = request
            .constraints
            .iter()
            .filter(|c| c.is_flexible)
            .map(|c| (c.max_amount - c.min_amount).max(0.0))
            .sum();
        let flex_ratio = if headroom > 0.0 { (flex_pool / headroom).min(1.0) } else { 0.0 };
        for constraint in &request.constraints {
            let extra = if constraint.is_flexible {
                (constraint.max_amount - constraint.min_amount).max(0.0) * flex_ratio
            } else {
                0.0
            };
            lines.push(AllocationLine {
                key: ItemKey::constraint(&constraint.category_id),
                name: constraint.name.clone(),
                amount: constraint.min_amount + extra,
            });
        }

        for payment in &request.debt_payments {
            lines.push(AllocationLine {
                key: ItemKey::debt(&payment.debt_id),
                name: payment.name.clone(),
                amount: payment.amount,
            });
        }

        let allocated: f64 = lines.iter().map(|l| l.amount).sum();
        let coverage = if required > 0.0 {
            (request.monthly_income / required).min(1.0)
        } else {
            1.0
        };
        let goal_need: f64 = request.goals.iter().map(|g| g.monthly_need).sum();
        let goal_coverage = if goal_need > 0.0 { (goal_total / goal_need).min(1.0) } else { 1.0 };

        AllocationScenario {
            name: params.name.clone(),
            allocations: lines,
            feasibility_score: (coverage * 0.7 + goal_coverage * 0.3) * 100.0,
            unallocated: (request.monthly_income - allocated).max(0.0),
        }
    }
}

impl BudgetAllocator for GoalProgrammingAllocator {
    fn allocate(&self, request: &AllocationRequest) -> Result<Vec<AllocationScenario>> {
        if !request.monthly_income.is_finite() || request.monthly_income < 0.0 {
            return Err(Error::Solver {
                message: format!("monthly income {} must be non-negative", request.monthly_income),
            });
        }
        Ok(request
            .scenarios
            .iter()
            .map(|params| Self::scenario(request, params))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn goal(id: &str, importance: u8, deadline: Option<NaiveDate>) -> GoalInput {
        GoalInput {
            id: id.to_string(),
            name: id.to_string(),
            target_amount: 1_000.0,
            current_amount: 0.0,
            deadline,
            importance,
        }
    }

    #[test]
    fn test_ranker_orders_by_importance() {
        let goals = vec![goal("low", 2, None), goal("high", 9, None)];
        let ranking = WeightedGoalRanker
            .rank(&goals, &CriteriaWeights::default(), as_of())
            .unwrap();
        assert_eq!(ranking.ranked[0].goal_id, "high");
        assert_eq!(ranking.ranked[0].rank, 1);
        assert_eq!(ranking.ranked[1].rank, 2);
        let total: f64 = ranking.ranked.iter().map(|g| g.weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_urgency_weight_prefers_near_deadline() {
        let soon = NaiveDate::from_ymd_opt(2024, 2, 1);
        let later = NaiveDate::from_ymd_opt(2026, 1, 1);
        let goals = vec![goal("later", 5, later), goal("soon", 5, soon)];
        let criteria = CriteriaWeights {
            urgency: 1.0,
            importance: 0.0,
            progress: 0.0,
        };
        let ranking = WeightedGoalRanker.rank(&goals, &criteria, as_of()).unwrap();
        assert_eq!(ranking.ranked[0].goal_id, "soon");
    }

    #[test]
    fn test_zero_weights_rejected() {
        let criteria = CriteriaWeights {
            urgency: 0.0,
            importance: 0.0,
            progress: 0.0,
        };
        let result = WeightedGoalRanker.rank(&[], &criteria, as_of());
        assert!(matches!(result, Err(Error::Solver { .. })));
    }

    #[test]
    fn test_allocator_covers_minimums_then_goals() {
        let request = AllocationRequest {
            monthly_income: 3_000.0,
            constraints: vec![ConstraintInput {
                category_id: "rent".to_string(),
                name: "Rent".to_string(),
                min_amount: 1_000.0,
                max_amount: 1_000.0,
                is_flexible: false,
            }],
            goals: vec![WeightedGoal {
                goal: goal("trip", 5, None),
                weight: 1.0,
                monthly_need: 100.0,
            }],
            debt_payments: vec![DebtPayment {
                debt_id: "card".to_string(),
                name: "Card".to_string(),
                amount: 500.0,
                minimum: 100.0,
            }],
            scenarios: default_scenarios(),
        };

        let scenarios = GoalProgrammingAllocator.allocate(&request).unwrap();
        assert_eq!(scenarios.len(), 3);
        let balanced = &scenarios[1];
        let amount = |key: ItemKey| {
            balanced
                .allocations
                .iter()
                .find(|l| l.key == key)
                .map(|l| l.amount)
                .unwrap()
        };
        assert_eq!(amount(ItemKey::constraint("rent")), 1_000.0);
        assert_eq!(amount(ItemKey::debt("card")), 500.0);
        // Surplus 1500, half to goals, capped at the 1000 still missing
        assert_eq!(amount(ItemKey::goal("trip")), 750.0);
        assert_eq!(balanced.unallocated, 750.0);
        assert!((balanced.feasibility_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_allocator_scores_shortfall() {
        let request = AllocationRequest {
            monthly_income: 500.0,
            constraints: vec![ConstraintInput {
                category_id: "rent".to_string(),
                name: "Rent".to_string(),
                min_amount: 1_000.0,
                max_amount: 1_000.0,
                is_flexible: false,
            }],
            goals: Vec::new(),
            debt_payments: Vec::new(),
            scenarios: default_scenarios(),
        };
        let scenarios = GoalProgrammingAllocator.allocate(&request).unwrap();
        assert!((scenarios[0].feasibility_score - 65.0).abs() < 1e-9);
        assert_eq!(scenarios[0].unallocated, 0.0);
    }

    #[tokio::test]
    async fn test_static_directory_lookups() -> Result<()> {
        let directory = StaticDirectory::new(
            HashMap::from([("c1".to_string(), "Groceries".to_string())]),
            Vec::new(),
        );
        assert_eq!(
            directory.category_name("u", "c1").await?.as_deref(),
            Some("Groceries")
        );
        assert!(directory.category_name("u", "c2").await?.is_none());
        assert!(directory.active_recurring_budgets("u").await?.is_empty());
        Ok(())
    }
}
