use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::{Cents, ExpenseId, ExpenseSplit, UserId};

/// Recompute every user's balance from the split rows alone.
/// Each split debits its user and credits the payer of its expense.
pub fn compute_balances(
    splits: &[ExpenseSplit],
    payers: &HashMap<ExpenseId, UserId>,
) -> Result<HashMap<UserId, Cents>, OrphanSplit> {
    let mut balances: HashMap<UserId, Cents> = HashMap::new();

    for split in splits {
        let payer = payers.get(&split.expense_id).ok_or(OrphanSplit {
            split_id: split.id,
            expense_id: split.expense_id,
        })?;
        *balances.entry(split.user_id).or_insert(0) -= split.amount_cents;
        *balances.entry(*payer).or_insert(0) += split.amount_cents;
    }

    Ok(balances)
}

/// A stored balance that disagrees with the one recomputed from splits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub user_id: UserId,
    pub stored: Cents,
    pub expected: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub user_count: i64,
    pub expense_count: i64,
    pub split_count: i64,
    /// Sum of all stored balances; zero on a healthy ledger.
    pub total_balance: Cents,
    pub is_balanced: bool,
    pub mismatches: Vec<BalanceMismatch>,
    pub issues: Vec<String>,
}

impl LedgerReport {
    pub fn is_healthy(&self) -> bool {
        self.is_balanced && self.mismatches.is_empty() && self.issues.is_empty()
    }
}

/// Compare stored balances with the recomputed ones. A user missing from
/// either side counts as zero there.
pub fn build_ledger_report(
    stored: &HashMap<UserId, Cents>,
    expected: &HashMap<UserId, Cents>,
    user_count: i64,
    expense_count: i64,
    split_count: i64,
) -> LedgerReport {
    let total_balance: Cents = stored.values().sum();
    let is_balanced = total_balance == 0;

    let users: BTreeSet<UserId> = stored.keys().chain(expected.keys()).copied().collect();
    let mismatches: Vec<BalanceMismatch> = users
        .into_iter()
        .filter_map(|user_id| {
            let stored = stored.get(&user_id).copied().unwrap_or(0);
            let expected = expected.get(&user_id).copied().unwrap_or(0);
            (stored != expected).then_some(BalanceMismatch {
                user_id,
                stored,
                expected,
            })
        })
        .collect();

    let mut issues = Vec::new();
    if !is_balanced {
        issues.push(format!(
            "Balances sum to {} cents instead of zero",
            total_balance
        ));
    }
    for mismatch in &mismatches {
        issues.push(format!(
            "User {} has balance {} cents, splits imply {} cents",
            mismatch.user_id, mismatch.stored, mismatch.expected
        ));
    }

    LedgerReport {
        user_count,
        expense_count,
        split_count,
        total_balance,
        is_balanced,
        mismatches,
        issues,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanSplit {
    pub split_id: uuid::Uuid,
    pub expense_id: ExpenseId,
}

impl std::fmt::Display for OrphanSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Split {} references unknown expense {}",
            self.split_id, self.expense_id
        )
    }
}

impl std::error::Error for OrphanSplit {}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_compute_balances_empty() {
        let balances = compute_balances(&[], &HashMap::new()).unwrap();
        assert!(balances.is_empty());
    }

    #[test]
    fn test_compute_balances_credits_payer() {
        let payer = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let expense = Uuid::new_v4();
        let payers = HashMap::from([(expense, payer)]);

        let splits = vec![
            ExpenseSplit::new(expense, b, 3000),
            ExpenseSplit::new(expense, c, 7000),
        ];
        let balances = compute_balances(&splits, &payers).unwrap();

        assert_eq!(balances.get(&payer), Some(&10000));
        assert_eq!(balances.get(&b), Some(&-3000));
        assert_eq!(balances.get(&c), Some(&-7000));
        assert_eq!(balances.values().sum::<Cents>(), 0);
    }

    #[test]
    fn test_compute_balances_orphan_split() {
        let split = ExpenseSplit::new(Uuid::new_v4(), Uuid::new_v4(), 100);
        let err = compute_balances(std::slice::from_ref(&split), &HashMap::new()).unwrap_err();
        assert_eq!(err.split_id, split.id);
    }

    #[test]
    fn test_report_flags_mismatch_and_imbalance() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let stored = HashMap::from([(a, 5000), (b, -4000)]);
        let expected = HashMap::from([(a, 5000), (b, -5000)]);

        let report = build_ledger_report(&stored, &expected, 2, 1, 1);

        assert!(!report.is_balanced);
        assert_eq!(report.total_balance, 1000);
        assert_eq!(
            report.mismatches,
            vec![BalanceMismatch {
                user_id: b,
                stored: -4000,
                expected: -5000,
            }]
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_report_healthy_ledger() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let balances = HashMap::from([(a, 2500), (b, -2500)]);

        let report = build_ledger_report(&balances, &balances, 2, 1, 1);

        assert!(report.is_healthy());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_report_treats_missing_rows_as_zero() {
        let a = Uuid::new_v4();
        let stored = HashMap::from([(a, 0)]);
        let report = build_ledger_report(&stored, &HashMap::new(), 1, 0, 0);
        assert!(report.is_healthy());
    }
}
