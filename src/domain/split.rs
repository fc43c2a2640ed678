//! Split calculation: turns an expense total and a split policy into the
//! amount each participant is responsible for.
//!
//! Everything here is pure. Shares are computed in integer cents and always
//! add up to the expense total, so the payer's credit mirrors the debits
//! exactly.

use std::cmp::Reverse;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{
    dedup_participants, parse_cents, parse_percent, BasisPoints, Cents, ParseAmountError,
    SplitMethod, UserId, FULL_PERCENT,
};

/// Method-specific split input, validated into one of three shapes at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "entries", rename_all = "lowercase")]
pub enum SplitInput {
    Equal,
    Exact(Vec<(UserId, Cents)>),
    Percentage(Vec<(UserId, BasisPoints)>),
}

impl SplitInput {
    /// Build split input from a method name and raw `(user, value)` pairs.
    /// Values are money for `exact` and percentages for `percentage`; `equal`
    /// takes none.
    pub fn parse(method: &str, entries: &[(UserId, String)]) -> Result<Self, SplitError> {
        let method = SplitMethod::from_str(method)
            .ok_or_else(|| SplitError::InvalidMethod(method.to_string()))?;

        let input = match method {
            SplitMethod::Equal if !entries.is_empty() => {
                return Err(SplitError::UnexpectedEntries(method));
            }
            SplitMethod::Equal => SplitInput::Equal,
            SplitMethod::Exact => SplitInput::Exact(parse_entries(entries, parse_cents)?),
            SplitMethod::Percentage => {
                SplitInput::Percentage(parse_entries(entries, parse_percent)?)
            }
        };
        Ok(input)
    }

    pub fn method(&self) -> SplitMethod {
        match self {
            SplitInput::Equal => SplitMethod::Equal,
            SplitInput::Exact(_) => SplitMethod::Exact,
            SplitInput::Percentage(_) => SplitMethod::Percentage,
        }
    }
}

fn parse_entries(
    entries: &[(UserId, String)],
    parse: fn(&str) -> Result<i64, ParseAmountError>,
) -> Result<Vec<(UserId, i64)>, SplitError> {
    entries
        .iter()
        .map(|(user_id, raw)| {
            parse(raw)
                .map(|value| (*user_id, value))
                .map_err(|reason| SplitError::InvalidValue {
                    user_id: *user_id,
                    reason,
                })
        })
        .collect()
}

/// One participant's part of an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub user_id: UserId,
    pub amount_cents: Cents,
}

/// The computed division of an expense. Includes the payer's own share when
/// the policy assigns one; only the other shares turn into debts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub payer_id: UserId,
    pub shares: Vec<Share>,
}

impl Allocation {
    /// Shares owed to the payer (everything except the payer's own).
    pub fn owed(&self) -> impl Iterator<Item = &Share> {
        self.shares.iter().filter(move |s| s.user_id != self.payer_id)
    }

    /// Sum of what non-payers owe; the payer is credited exactly this.
    pub fn total_owed(&self) -> Cents {
        self.owed().map(|s| s.amount_cents).sum()
    }

    /// The part of the total the payer covers for themselves.
    pub fn payer_share(&self) -> Cents {
        self.shares
            .iter()
            .filter(|s| s.user_id == self.payer_id)
            .map(|s| s.amount_cents)
            .sum()
    }

    /// Sum of all shares, payer included.
    pub fn allocated(&self) -> Cents {
        self.shares.iter().map(|s| s.amount_cents).sum()
    }
}

/// Compute each participant's share of `total_cents`.
///
/// For `Equal` the denominator is the number of distinct participants; the
/// payer counts only when listed. `Exact` and `Percentage` entries must name
/// participants, appear once, be non-negative, and sum to the total (or to
/// 100%) exactly.
pub fn compute_allocation(
    total_cents: Cents,
    payer_id: UserId,
    participants: &[UserId],
    input: &SplitInput,
) -> Result<Allocation, SplitError> {
    if total_cents <= 0 {
        return Err(SplitError::NonPositiveTotal(total_cents));
    }
    let participants = dedup_participants(participants);
    if participants.is_empty() {
        return Err(SplitError::NoParticipants);
    }

    let shares = match input {
        SplitInput::Equal => {
            let weights: Vec<(UserId, i64)> = participants.iter().map(|id| (*id, 1)).collect();
            let count = weights.len() as i64;
            distribute(total_cents, &weights, count, payer_id)
        }
        SplitInput::Exact(entries) => {
            validate_entries(entries, &participants)?;
            let sum: i128 = entries.iter().map(|(_, v)| *v as i128).sum();
            if sum != total_cents as i128 {
                return Err(SplitError::SplitMismatch {
                    method: SplitMethod::Exact,
                    expected: total_cents,
                    actual: clamp_i64(sum),
                });
            }
            entries
                .iter()
                .map(|(user_id, amount)| Share {
                    user_id: *user_id,
                    amount_cents: *amount,
                })
                .collect()
        }
        SplitInput::Percentage(entries) => {
            validate_entries(entries, &participants)?;
            let sum: i128 = entries.iter().map(|(_, v)| *v as i128).sum();
            if sum != FULL_PERCENT as i128 {
                return Err(SplitError::SplitMismatch {
                    method: SplitMethod::Percentage,
                    expected: FULL_PERCENT,
                    actual: clamp_i64(sum),
                });
            }
            distribute(total_cents, entries, FULL_PERCENT, payer_id)
        }
    };

    Ok(Allocation { payer_id, shares })
}

fn validate_entries(entries: &[(UserId, i64)], participants: &[UserId]) -> Result<(), SplitError> {
    let mut seen: Vec<UserId> = Vec::with_capacity(entries.len());
    for (user_id, value) in entries {
        if !participants.contains(user_id) {
            return Err(SplitError::NotParticipant(*user_id));
        }
        if seen.contains(user_id) {
            return Err(SplitError::DuplicateEntry(*user_id));
        }
        if *value < 0 {
            return Err(SplitError::NegativeShare(*user_id));
        }
        seen.push(*user_id);
    }
    Ok(())
}

/// Divide `total` in proportion to `weights` (which sum to `weight_sum`) using
/// the largest-remainder rule: floor every share, then hand the leftover cents
/// to the largest fractional remainders. Ties favour the payer, then input order.
fn distribute(
    total: Cents,
    weights: &[(UserId, i64)],
    weight_sum: i64,
    payer_id: UserId,
) -> Vec<Share> {
    let mut floors = Vec::with_capacity(weights.len());
    let mut remainders = Vec::with_capacity(weights.len());
    for (_, weight) in weights {
        let scaled = total as i128 * *weight as i128;
        floors.push((scaled / weight_sum as i128) as i64);
        remainders.push(scaled % weight_sum as i128);
    }

    let leftover = total - floors.iter().sum::<i64>();

    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by_key(|&i| (Reverse(remainders[i]), weights[i].0 != payer_id, i));
    for &i in order.iter().take(leftover as usize) {
        floors[i] += 1;
    }

    weights
        .iter()
        .zip(floors)
        .map(|((user_id, _), amount_cents)| Share {
            user_id: *user_id,
            amount_cents,
        })
        .collect()
}

fn clamp_i64(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    InvalidMethod(String),
    /// Per-user values were given for a method that takes none
    UnexpectedEntries(SplitMethod),
    NoParticipants,
    NonPositiveTotal(Cents),
    NotParticipant(UserId),
    DuplicateEntry(UserId),
    NegativeShare(UserId),
    InvalidValue {
        user_id: UserId,
        reason: ParseAmountError,
    },
    SplitMismatch {
        method: SplitMethod,
        expected: i64,
        actual: i64,
    },
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use super::{format_cents, format_percent};

        match self {
            SplitError::InvalidMethod(method) => write!(f, "Invalid split method: {}", method),
            SplitError::UnexpectedEntries(method) => {
                write!(f, "The {} split does not take per-user values", method)
            }
            SplitError::NoParticipants => write!(f, "An expense needs at least one participant"),
            SplitError::NonPositiveTotal(total) => {
                write!(f, "Total amount must be positive, got {}", format_cents(*total))
            }
            SplitError::NotParticipant(user_id) => {
                write!(f, "User {} is not a participant of this expense", user_id)
            }
            SplitError::DuplicateEntry(user_id) => {
                write!(f, "User {} appears more than once in the split", user_id)
            }
            SplitError::NegativeShare(user_id) => {
                write!(f, "Share for user {} must not be negative", user_id)
            }
            SplitError::InvalidValue { user_id, reason } => {
                write!(f, "Invalid split value for user {}: {}", user_id, reason)
            }
            SplitError::SplitMismatch {
                method: SplitMethod::Percentage,
                actual,
                ..
            } => write!(
                f,
                "The percentages must add up to 100%, got {}%",
                format_percent(*actual)
            ),
            SplitError::SplitMismatch {
                expected, actual, ..
            } => write!(
                f,
                "The exact amounts add up to {} but the total is {}",
                format_cents(*actual),
                format_cents(*expected)
            ),
        }
    }
}

impl std::error::Error for SplitError {}
