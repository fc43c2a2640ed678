use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type ExpenseId = Uuid;
pub type SplitId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMethod {
    /// Everyone listed takes the same share
    Equal,
    /// Caller states each share in money
    Exact,
    /// Caller states each share as a percentage of the total
    Percentage,
}

impl SplitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMethod::Equal => "equal",
            SplitMethod::Exact => "exact",
            SplitMethod::Percentage => "percentage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "equal" => Some(SplitMethod::Equal),
            "exact" => Some(SplitMethod::Exact),
            "percentage" | "percent" => Some(SplitMethod::Percentage),
            _ => None,
        }
    }
}

impl std::fmt::Display for SplitMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A shared expense. Expenses are immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub creator_id: UserId,
    pub payer_id: UserId,
    /// Distinct participants, in the order they were given
    pub participants: Vec<UserId>,
    /// Total in cents (always positive)
    pub total_cents: Cents,
    pub description: String,
    pub split_method: SplitMethod,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    pub fn new(
        creator_id: UserId,
        payer_id: UserId,
        participants: &[UserId],
        total_cents: Cents,
        description: impl Into<String>,
        split_method: SplitMethod,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            payer_id,
            participants: dedup_participants(participants),
            total_cents,
            description: description.into(),
            split_method,
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// What one non-payer participant owes on one expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseSplit {
    pub id: SplitId,
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub amount_cents: Cents,
}

impl ExpenseSplit {
    pub fn new(expense_id: ExpenseId, user_id: UserId, amount_cents: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            expense_id,
            user_id,
            amount_cents,
        }
    }
}

/// A split as seen from the ower's side, with the expense it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSplit {
    pub expense_id: ExpenseId,
    pub amount_cents: Cents,
    pub created_at: DateTime<Utc>,
    pub description: String,
}

/// Drop repeated participants, keeping first occurrences in order.
pub fn dedup_participants(participants: &[UserId]) -> Vec<UserId> {
    let mut seen = Vec::with_capacity(participants.len());
    for id in participants {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_method_roundtrip() {
        for method in [SplitMethod::Equal, SplitMethod::Exact, SplitMethod::Percentage] {
            assert_eq!(SplitMethod::from_str(method.as_str()), Some(method));
        }
        assert_eq!(SplitMethod::from_str("Percent"), Some(SplitMethod::Percentage));
        assert_eq!(SplitMethod::from_str("shares"), None);
    }

    #[test]
    fn test_expense_dedups_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let expense = Expense::new(a, a, &[a, b, a, b], 1000, "Dinner", SplitMethod::Equal);

        assert_eq!(expense.participants, vec![a, b]);
    }
}
