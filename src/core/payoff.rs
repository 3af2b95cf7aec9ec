//! Debt payoff planning for step 2.
//!
//! Revolving debts compete for the month's extra payment budget and are
//! compared across payoff strategies. Installment and interest-only debts are
//! never optimized: they always carry their scheduled minimum.

use crate::{
    core::{
        dss::{DebtBudget, DebtPayment, PayoffStrategy, StrategySimulation},
        solvers::DebtSimulator,
        types::DebtInput,
    },
    errors::{Error, Result},
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

const PAID_OFF: f64 = 0.005;
const INTEREST_TIE: f64 = 1e-6;

/// Splits debts into (revolving, fixed-minimum) groups.
#[must_use]
pub fn partition_debts(debts: &[DebtInput]) -> (Vec<DebtInput>, Vec<DebtInput>) {
    debts.iter().cloned().partition(|d| d.kind.is_revolving())
}

/// Sum of minimum payments.
#[must_use]
pub fn minimum_sum(debts: &[DebtInput]) -> f64 {
    debts.iter().map(|d| d.minimum_payment).sum()
}

/// Computes the month's debt budget.
///
/// The revolving budget is `max(revolving_minimum, income * pct - fixed_minimum)`.
/// When the minimum floor binds, the total is raised so no minimum is underfunded.
#[must_use]
pub fn debt_budget(
    monthly_income: f64,
    debt_allocation_pct: f64,
    revolving_minimum: f64,
    fixed_minimum: f64,
) -> DebtBudget {
    let target = monthly_income * debt_allocation_pct;
    let revolving_budget = revolving_minimum.max(target - fixed_minimum);
    let required = revolving_budget + fixed_minimum;
    DebtBudget {
        total_debt_budget: target.max(required),
        revolving_budget,
        revolving_minimum,
        fixed_minimum,
        floor_applied: required > target,
    }
}

/// Picks the strategy with the lowest total interest; ties go to the earlier
/// strategy in [`PayoffStrategy::ALL`], so avalanche wins a tie.
#[must_use]
pub fn pick_strategy(simulations: &[StrategySimulation]) -> Option<PayoffStrategy> {
    PayoffStrategy::ALL
        .into_iter()
        .filter_map(|strategy| simulations.iter().find(|s| s.strategy == strategy))
        .fold(None::<&StrategySimulation>, |best, candidate| match best {
            Some(current) if candidate.total_interest < current.total_interest - INTEREST_TIE => {
                Some(candidate)
            }
            Some(current) => Some(current),
            None => Some(candidate),
        })
        .map(|s| s.strategy)
}

/// Fixed-minimum debts at their scheduled payment.
#[must_use]
pub fn fixed_payments(fixed: &[DebtInput]) -> Vec<DebtPayment> {
    fixed
        .iter()
        .map(|d| DebtPayment {
            debt_id: d.id.clone(),
            name: d.name.clone(),
            amount: d.minimum_payment,
            minimum: d.minimum_payment,
        })
        .collect()
}

/// Spreads `revolving_total` over revolving debts: each gets its minimum, and
/// whatever is left above the minimums is split by `weights`.
///
/// Debts without a weight get no extra. When no weight is positive the extra
/// is split evenly.
#[must_use]
pub fn redistribute(
    revolving: &[DebtInput],
    weights: &BTreeMap<String, f64>,
    revolving_total: f64,
) -> Vec<DebtPayment> {
    let extra = (revolving_total - minimum_sum(revolving)).max(0.0);
    let weight_sum: f64 = revolving
        .iter()
        .filter_map(|d| weights.get(&d.id))
        .filter(|w| **w > 0.0)
        .sum();

    revolving
        .iter()
        .map(|d| {
            let share = if weight_sum > 0.0 {
                weights.get(&d.id).copied().unwrap_or(0.0).max(0.0) / weight_sum
            } else {
                #[allow(clippy::cast_precision_loss)]
                let even = 1.0 / revolving.len() as f64;
                even
            };
            DebtPayment {
                debt_id: d.id.clone(),
                name: d.name.clone(),
                amount: d.minimum_payment + extra * share,
                minimum: d.minimum_payment,
            }
        })
        .collect()
}

/// Month-by-month amortization of revolving debts under each payoff strategy.
///
/// Every month interest accrues, every open debt receives its minimum, and the
/// rest of the budget goes to debts in strategy order. Minimums of paid-off
/// debts roll into the extra budget.
#[derive(Debug, Clone, Copy)]
pub struct AmortizationSimulator {
    max_months: u32,
}

impl AmortizationSimulator {
    /// Simulator that gives up after `max_months`.
    #[must_use]
    pub const fn new(max_months: u32) -> Self {
        Self { max_months }
    }

    fn order(debts: &[DebtInput], strategy: PayoffStrategy) -> Vec<usize> {
        let mut order: Vec<usize> = (0..debts.len()).collect();
        let by_rate = |a: &DebtInput, b: &DebtInput| {
            b.interest_rate
                .partial_cmp(&a.interest_rate)
                .unwrap_or(Ordering::Equal)
        };
        let by_balance = |a: &DebtInput, b: &DebtInput| {
            a.balance.partial_cmp(&b.balance).unwrap_or(Ordering::Equal)
        };
        match strategy {
            PayoffStrategy::Avalanche => order.sort_by(|&a, &b| {
                by_rate(&debts[a], &debts[b]).then_with(|| by_balance(&debts[a], &debts[b]))
            }),
            PayoffStrategy::Snowball => order.sort_by(|&a, &b| {
                by_balance(&debts[a], &debts[b]).then_with(|| by_rate(&debts[a], &debts[b]))
            }),
            PayoffStrategy::Hybrid => {
                let max_rate = debts.iter().map(|d| d.interest_rate).fold(0.0, f64::max);
                let max_balance = debts.iter().map(|d| d.balance).fold(0.0, f64::max);
                let score = |d: &DebtInput| {
                    let rate = if max_rate > 0.0 { d.interest_rate / max_rate } else { 0.0 };
                    let small = if max_balance > 0.0 { 1.0 - d.balance / max_balance } else { 0.0 };
                    0.5 * rate + 0.5 * small
                };
                order.sort_by(|&a, &b| {
                    score(&debts[b])
                        .partial_cmp(&score(&debts[a]))
                        .unwrap_or(Ordering::Equal)
                });
            }
        }
        order
    }

    fn run(
        &self,
        debts: &[DebtInput],
        monthly_budget: f64,
        strategy: PayoffStrategy,
    ) -> StrategySimulation {
        let order = Self::order(debts, strategy);
        let mut balances: Vec<f64> = debts.iter().map(|d| d.balance.max(0.0)).collect();
        let mut total_interest = 0.0;
        let mut months = 0;
        let mut first_month_payments = BTreeMap::new();
        let mut first_month_extra = BTreeMap::new();

        while balances.iter().any(|b| *b > PAID_OFF) && months < self.max_months {
            months += 1;
            let mut paid = vec![0.0; debts.len()];
            let mut extra_paid = vec![0.0; debts.len()];

            for (balance, debt) in balances.iter_mut().zip(debts) {
                if *balance > PAID_OFF {
                    let interest = *balance * debt.interest_rate / 100.0 / 12.0;
                    *balance += interest;
                    total_interest += interest;
                }
            }

            let mut remaining = monthly_budget;
            for (i, debt) in debts.iter().enumerate() {
                let payment = debt.minimum_payment.min(balances[i]).max(0.0);
                balances[i] -= payment;
                paid[i] += payment;
                remaining -= payment;
            }

            for &i in &order {
                if remaining <= PAID_OFF {
                    break;
                }
                let payment = remaining.min(balances[i]).max(0.0);
                balances[i] -= payment;
                paid[i] += payment;
                extra_paid[i] += payment;
                remaining -= payment;
            }

            if months == 1 {
                for (i, debt) in debts.iter().enumerate() {
                    first_month_payments.insert(debt.id.clone(), paid[i]);
                    first_month_extra.insert(debt.id.clone(), extra_paid[i]);
                }
            }
        }

        StrategySimulation {
            strategy,
            total_interest,
            months_to_payoff: months,
            first_month_payments,
            extra_weights: extra_weights(debts, &order, &first_month_extra),
        }
    }
}

fn extra_weights(
    debts: &[DebtInput],
    order: &[usize],
    first_month_extra: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let total: f64 = first_month_extra.values().sum();
    if total > 0.0 {
        return first_month_extra
            .iter()
            .map(|(id, amount)| (id.clone(), amount / total))
            .collect();
    }
    // No extra in the first month: the strategy's first debt takes all future extra.
    debts
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let weight = if order.first() == Some(&i) { 1.0 } else { 0.0 };
            (d.id.clone(), weight)
        })
        .collect()
}

impl DebtSimulator for AmortizationSimulator {
    fn compare(&self, debts: &[DebtInput], monthly_budget: f64) -> Result<Vec<StrategySimulation>> {
        if !monthly_budget.is_finite() || monthly_budget < 0.0 {
            return Err(Error::Solver {
                message: format!("debt budget {monthly_budget} must be a non-negative number"),
            });
        }
        Ok(PayoffStrategy::ALL
            .into_iter()
            .map(|strategy| self.run(debts, monthly_budget, strategy))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::types::DebtKind;

    fn debt(id: &str, balance: f64, rate: f64, minimum: f64, kind: DebtKind) -> DebtInput {
        DebtInput {
            id: id.to_string(),
            name: id.to_uppercase(),
            balance,
            interest_rate: rate,
            minimum_payment: minimum,
            kind,
        }
    }

    fn simulation(strategy: PayoffStrategy, total_interest: f64) -> StrategySimulation {
        StrategySimulation {
            strategy,
            total_interest,
            months_to_payoff: 1,
            first_month_payments: BTreeMap::new(),
            extra_weights: BTreeMap::new(),
        }
    }

    #[test]
    fn test_revolving_floor_takes_larger_value_not_the_share_1_5m() {
        // 20% of 12.5M is 2.5M; revolving minimums alone need 2M and the
        // installment needs 1M, so the floor binds.
        let budget = debt_budget(12_500_000.0, 0.2, 2_000_000.0, 1_000_000.0);
        assert_eq!(
            budget.revolving_budget, 2_000_000.0,
            "max(2,000,000, 1,500,000) is 2,000,000; a 1,500,000 revolving budget \
             would underfund the revolving minimums"
        );
        assert_eq!(
            budget.total_debt_budget, 3_000_000.0,
            "the binding floor lifts the total above the 2,500,000 share"
        );
        assert!(budget.floor_applied);
    }

    #[test]
    fn test_revolving_budget_when_floor_does_not_bind() {
        let budget = debt_budget(12_500_000.0, 0.2, 500_000.0, 1_000_000.0);
        assert_eq!(budget.revolving_budget, 1_500_000.0);
        assert_eq!(budget.total_debt_budget, 2_500_000.0);
        assert!(!budget.floor_applied);
    }

    #[test]
    fn test_fixed_minimums_above_target() {
        let budget = debt_budget(1_000.0, 0.1, 50.0, 300.0);
        assert_eq!(budget.revolving_budget, 50.0);
        assert_eq!(budget.total_debt_budget, 350.0);
    }

    #[test]
    fn test_partition_excludes_installment_and_interest_only() {
        let debts = vec![
            debt("card", 1_000.0, 20.0, 50.0, DebtKind::Revolving),
            debt("car", 5_000.0, 5.0, 200.0, DebtKind::Installment),
            debt("heloc", 9_000.0, 7.0, 60.0, DebtKind::InterestOnly),
        ];
        let (revolving, fixed) = partition_debts(&debts);
        assert_eq!(revolving.len(), 1);
        assert_eq!(revolving[0].id, "card");
        assert_eq!(fixed.len(), 2);
        assert_eq!(minimum_sum(&fixed), 260.0);
    }

    #[test]
    fn test_pick_lowest_interest() {
        let sims = vec![
            simulation(PayoffStrategy::Avalanche, 120.0),
            simulation(PayoffStrategy::Snowball, 100.0),
            simulation(PayoffStrategy::Hybrid, 110.0),
        ];
        assert_eq!(pick_strategy(&sims), Some(PayoffStrategy::Snowball));
    }

    #[test]
    fn test_tie_favors_avalanche() {
        let sims = vec![
            simulation(PayoffStrategy::Hybrid, 100.0),
            simulation(PayoffStrategy::Snowball, 100.0),
            simulation(PayoffStrategy::Avalanche, 100.0),
        ];
        assert_eq!(pick_strategy(&sims), Some(PayoffStrategy::Avalanche));
        assert_eq!(pick_strategy(&[]), None);
    }

    #[test]
    fn test_avalanche_targets_highest_rate() {
        let debts = vec![
            debt("low", 500.0, 5.0, 25.0, DebtKind::Revolving),
            debt("high", 2_000.0, 25.0, 40.0, DebtKind::Revolving),
        ];
        let sims = AmortizationSimulator::new(600).compare(&debts, 365.0).unwrap_or_default();
        let avalanche = &sims[0];
        assert_eq!(avalanche.strategy, PayoffStrategy::Avalanche);
        assert_eq!(avalanche.extra_weights["high"], 1.0);
        assert_eq!(avalanche.extra_weights["low"], 0.0);

        let snowball = &sims[1];
        assert_eq!(snowball.extra_weights["low"], 1.0);
        assert!(avalanche.total_interest <= snowball.total_interest);
        assert!(avalanche.months_to_payoff > 0);
    }

    #[test]
    fn test_single_debt_strategies_tie_to_avalanche() {
        let debts = vec![debt("card", 1_000.0, 18.0, 50.0, DebtKind::Revolving)];
        let sims = AmortizationSimulator::new(600).compare(&debts, 200.0).unwrap_or_default();
        assert_eq!(sims.len(), 3);
        assert_eq!(pick_strategy(&sims), Some(PayoffStrategy::Avalanche));
    }

    #[test]
    fn test_negative_budget_rejected() {
        let result = AmortizationSimulator::new(600).compare(&[], -1.0);
        assert!(matches!(result, Err(Error::Solver { .. })));
    }

    #[test]
    fn test_redistribute_uses_weights_above_minimums() {
        let debts = vec![
            debt("a", 1_000.0, 20.0, 100.0, DebtKind::Revolving),
            debt("b", 1_000.0, 10.0, 50.0, DebtKind::Revolving),
        ];
        let weights = BTreeMap::from([("a".to_string(), 0.75), ("b".to_string(), 0.25)]);
        let payments = redistribute(&debts, &weights, 550.0);
        assert_eq!(payments[0].amount, 100.0 + 300.0);
        assert_eq!(payments[1].amount, 50.0 + 100.0);
        let total: f64 = payments.iter().map(|p| p.amount).sum();
        assert_eq!(total, 550.0);
    }

    #[test]
    fn test_redistribute_below_minimums_keeps_minimums() {
        let debts = vec![debt("a", 1_000.0, 20.0, 100.0, DebtKind::Revolving)];
        let payments = redistribute(&debts, &BTreeMap::new(), 40.0);
        assert_eq!(payments[0].amount, 100.0);
        assert!(!payments[0].is_below_minimum());
    }
}
