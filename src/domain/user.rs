use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// A person who can pay for, or take part in, shared expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Unique across the ledger; used to look users up from the CLI.
    pub email: String,
    pub mobile_number: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        mobile_number: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(&email.into()),
            mobile_number: mobile_number.into(),
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}

/// Emails compare case-insensitively.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_normalizes_email() {
        let user = User::new("Alice", "  Alice@Example.COM ", "5550100");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.name, "Alice");
    }

    #[test]
    fn test_new_users_get_distinct_ids() {
        let a = User::new("A", "a@example.com", "1");
        let b = User::new("B", "b@example.com", "2");
        assert_ne!(a.id, b.id);
    }
}
