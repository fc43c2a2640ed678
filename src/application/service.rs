use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::domain::{
    build_ledger_report, compute_allocation, compute_balances, dedup_participants, format_cents,
    normalize_email, Cents, Expense, ExpenseId, ExpenseSplit, LedgerReport, SplitInput, User,
    UserId, UserSplit, MAX_TOTAL_CENTS,
};
use crate::storage::Repository;

use super::AppError;

const MAX_DESCRIPTION_LEN: usize = 255;

/// Application service for recording shared expenses and reading balances.
/// This is the primary interface for any client (CLI, API, etc.).
pub struct ExpenseService {
    repo: Repository,
}

/// Everything needed to record an expense.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub creator_id: UserId,
    pub payer_id: UserId,
    pub participants: Vec<UserId>,
    pub total_cents: Cents,
    pub description: String,
    pub split: SplitInput,
}

/// A persisted expense together with its split rows
#[derive(Debug, Clone, Serialize)]
pub struct ExpenseDetails {
    pub expense: Expense,
    pub splits: Vec<ExpenseSplit>,
}

/// Balance entry for a user
#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub user: User,
    pub balance: Cents,
}

impl ExpenseService {
    /// Create a new expense service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create (if needed) and migrate the database described by `config`.
    pub async fn init(config: &StoreConfig) -> Result<Self, AppError> {
        let repo = Repository::init(&config.clone().creating()).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &StoreConfig) -> Result<Self, AppError> {
        let repo = Repository::connect(config).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // User operations
    // ========================

    /// Register a user. Emails are unique, compared case-insensitively.
    pub async fn create_user(
        &self,
        name: String,
        email: String,
        mobile_number: String,
    ) -> Result<User, AppError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::InvalidInput("Name must not be empty".to_string()));
        }
        let email = normalize_email(&email);
        if !is_plausible_email(&email) {
            return Err(AppError::InvalidInput(format!("Invalid email: {}", email)));
        }

        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::UserAlreadyExists(email));
        }

        let user = User::new(name, email, mobile_number.trim());
        self.repo.save_user(&user).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        let email = normalize_email(email);
        self.repo
            .get_user_by_email(&email)
            .await?
            .ok_or(AppError::UserNotFound(email))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    // ========================
    // Expense operations
    // ========================

    /// Record a shared expense.
    ///
    /// Users are resolved and the split is computed before anything is
    /// written, so rejected input leaves the ledger untouched. The expense,
    /// its splits and every balance change then land in one transaction.
    pub async fn create_expense(&self, new_expense: NewExpense) -> Result<ExpenseDetails, AppError> {
        let result = self.try_create_expense(new_expense).await;
        if let Err(err) = &result {
            if err.is_validation() || err.is_not_found() {
                warn!(error = %err, "expense rejected");
            } else {
                error!(error = %err, "expense not recorded");
            }
        }
        result
    }

    async fn try_create_expense(
        &self,
        new_expense: NewExpense,
    ) -> Result<ExpenseDetails, AppError> {
        if new_expense.total_cents <= 0 {
            return Err(AppError::InvalidAmount(
                "Total amount must be positive".to_string(),
            ));
        }
        if new_expense.total_cents > MAX_TOTAL_CENTS {
            return Err(AppError::InvalidAmount(format!(
                "Total amount must not exceed {}",
                format_cents(MAX_TOTAL_CENTS)
            )));
        }
        let description = new_expense.description.trim().to_string();
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AppError::InvalidInput(format!(
                "Description is longer than {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }

        let participants = dedup_participants(&new_expense.participants);
        self.get_user(new_expense.creator_id).await?;
        self.get_user(new_expense.payer_id).await?;
        for participant in &participants {
            self.get_user(*participant).await?;
        }

        let allocation = compute_allocation(
            new_expense.total_cents,
            new_expense.payer_id,
            &participants,
            &new_expense.split,
        )?;
        debug!(?allocation, "split computed");

        let expense = Expense::new(
            new_expense.creator_id,
            new_expense.payer_id,
            &participants,
            new_expense.total_cents,
            description,
            new_expense.split.method(),
        );

        let splits = self.repo.apply_expense(&expense, &allocation).await?;

        info!(
            expense_id = %expense.id,
            method = %expense.split_method,
            total_cents = expense.total_cents,
            splits = splits.len(),
            "expense recorded"
        );

        Ok(ExpenseDetails { expense, splits })
    }

    pub async fn get_expense(&self, id: ExpenseId) -> Result<ExpenseDetails, AppError> {
        let expense = self
            .repo
            .get_expense(id)
            .await?
            .ok_or_else(|| AppError::ExpenseNotFound(id.to_string()))?;
        let splits = self.repo.list_splits_for_expense(id).await?;
        Ok(ExpenseDetails { expense, splits })
    }

    /// List all expenses, oldest first.
    pub async fn list_expenses(&self) -> Result<Vec<Expense>, AppError> {
        Ok(self.repo.list_expenses().await?)
    }

    // ========================
    // Read operations
    // ========================

    /// Every split the user owes, oldest expense first.
    pub async fn get_splits_for_user(&self, user_id: UserId) -> Result<Vec<UserSplit>, AppError> {
        self.get_user(user_id).await?;
        Ok(self.repo.list_splits_for_user(user_id).await?)
    }

    /// Total the user owes across all splits (ignores what others owe them).
    pub async fn get_total_owed(&self, user_id: UserId) -> Result<Cents, AppError> {
        self.get_user(user_id).await?;
        Ok(self.repo.total_owed(user_id).await?)
    }

    /// The user's running balance; zero until an expense involves them.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Cents, AppError> {
        self.get_user(user_id).await?;
        Ok(self.repo.get_balance(user_id).await?.unwrap_or(0))
    }

    /// Balances of every user an expense has touched.
    pub async fn get_all_balances(&self) -> Result<Vec<BalanceEntry>, AppError> {
        let balances = self.repo.list_balances().await?;
        Ok(balances
            .into_iter()
            .map(|(user, balance)| BalanceEntry { user, balance })
            .collect())
    }

    // ========================
    // Integrity operations
    // ========================

    /// Check that balances sum to zero and agree with the split rows.
    pub async fn check_ledger(&self) -> Result<LedgerReport, AppError> {
        let stats = self.repo.get_ledger_stats().await?;
        let stored = self.repo.balance_map().await?;
        let splits = self.repo.list_all_splits().await?;
        let payers = self.repo.expense_payers().await?;

        let expected = compute_balances(&splits, &payers).map_err(anyhow::Error::from)?;
        let report = build_ledger_report(
            &stored,
            &expected,
            stats.user_count,
            stats.expense_count,
            stats.split_count,
        );

        if report.is_healthy() {
            debug!(expenses = report.expense_count, "ledger check passed");
        } else {
            warn!(issues = report.issues.len(), "ledger check found issues");
        }
        Ok(report)
    }
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}
