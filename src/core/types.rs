//! Shared budget vocabulary - line item identity and the planning inputs
//! (income, goals, debts, spending constraints) a month is planned against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of budget line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    /// A spending category constraint (rent, groceries, ...)
    Constraint,
    /// A savings goal
    Goal,
    /// A debt repayment
    Debt,
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Constraint => "CONSTRAINT",
            Self::Goal => "GOAL",
            Self::Debt => "DEBT",
        };
        f.write_str(label)
    }
}

/// Identity of a line item: its kind plus the identifier within that kind.
///
/// Category, goal and debt identifiers live in separate namespaces, so the
/// same string may name a category and a goal at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Kind of line item
    pub item_type: ItemType,
    /// Identifier within the kind
    pub item_id: String,
}

impl ItemKey {
    /// Key for a spending category.
    pub fn constraint(id: impl Into<String>) -> Self {
        Self {
            item_type: ItemType::Constraint,
            item_id: id.into(),
        }
    }

    /// Key for a savings goal.
    pub fn goal(id: impl Into<String>) -> Self {
        Self {
            item_type: ItemType::Goal,
            item_id: id.into(),
        }
    }

    /// Key for a debt.
    pub fn debt(id: impl Into<String>) -> Self {
        Self {
            item_type: ItemType::Debt,
            item_id: id.into(),
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.item_type, self.item_id)
    }
}

/// How a debt is repaid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebtKind {
    /// Credit cards and lines of credit; extra payments shorten payoff
    #[default]
    Revolving,
    /// Fixed-schedule loans; always paid at the scheduled minimum
    Installment,
    /// Interest-only loans; always paid at the scheduled minimum
    InterestOnly,
}

impl DebtKind {
    /// Whether extra payments on this debt are worth optimizing.
    #[must_use]
    pub const fn is_revolving(self) -> bool {
        matches!(self, Self::Revolving)
    }
}

/// A savings goal as it stood when the session was initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalInput {
    /// Goal identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Amount the goal should reach
    pub target_amount: f64,
    /// Amount saved so far
    pub current_amount: f64,
    /// Optional deadline
    pub deadline: Option<NaiveDate>,
    /// User-declared importance on a 1-10 scale
    pub importance: u8,
}

impl GoalInput {
    /// Amount still missing to reach the target.
    #[must_use]
    pub fn remaining(&self) -> f64 {
        (self.target_amount - self.current_amount).max(0.0)
    }

    /// Contribution per month needed to hit the deadline from `today`.
    ///
    /// Goals without a deadline spread the remainder over twelve months.
    #[must_use]
    pub fn monthly_need(&self, today: NaiveDate) -> f64 {
        let months = self.deadline.map_or(12, |deadline| {
            let days = deadline.signed_duration_since(today).num_days();
            (days / 30).max(1)
        });
        #[allow(clippy::cast_precision_loss)]
        let months = months as f64;
        self.remaining() / months
    }
}

/// A debt as it stood when the session was initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtInput {
    /// Debt identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Outstanding balance
    pub balance: f64,
    /// Annual interest rate in percent (e.g. `24.0`)
    pub interest_rate: f64,
    /// Minimum monthly payment
    pub minimum_payment: f64,
    /// Repayment behaviour
    #[serde(default)]
    pub kind: DebtKind,
}

/// A spending category with the range the user is willing to spend in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInput {
    /// Category identifier
    pub category_id: String,
    /// Display name
    pub name: String,
    /// Amount that must be covered every month
    pub min_amount: f64,
    /// Upper bound for flexible spending
    pub max_amount: f64,
    /// Whether the amount can move between `min_amount` and `max_amount`
    pub is_flexible: bool,
}

/// Frozen copy of everything a plan was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputSnapshot {
    /// Expected income for the month
    pub monthly_income: f64,
    /// Savings goals
    pub goals: Vec<GoalInput>,
    /// Debts
    pub debts: Vec<DebtInput>,
    /// Spending constraints
    pub constraints: Vec<ConstraintInput>,
    /// Date the snapshot was taken
    pub as_of: Option<NaiveDate>,
}

impl InputSnapshot {
    /// Looks up the display name of a line item.
    #[must_use]
    pub fn item_name(&self, key: &ItemKey) -> Option<&str> {
        match key.item_type {
            ItemType::Constraint => self
                .constraints
                .iter()
                .find(|c| c.category_id == key.item_id)
                .map(|c| c.name.as_str()),
            ItemType::Goal => self
                .goals
                .iter()
                .find(|g| g.id == key.item_id)
                .map(|g| g.name.as_str()),
            ItemType::Debt => self
                .debts
                .iter()
                .find(|d| d.id == key.item_id)
                .map(|d| d.name.as_str()),
        }
    }

    /// Finds a debt by identifier.
    #[must_use]
    pub fn debt(&self, id: &str) -> Option<&DebtInput> {
        self.debts.iter().find(|d| d.id == id)
    }

    /// Finds a goal by identifier.
    #[must_use]
    pub fn goal(&self, id: &str) -> Option<&GoalInput> {
        self.goals.iter().find(|g| g.id == id)
    }
}
