use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{
    Allocation, Cents, Expense, ExpenseId, ExpenseSplit, SplitMethod, User, UserId, UserSplit,
};

use super::MIGRATION_001_INITIAL;

/// Row counts for ledger verification.
#[derive(Debug, Clone)]
pub struct LedgerStats {
    pub user_count: i64,
    pub expense_count: i64,
    pub split_count: i64,
}

/// Repository for persisting and querying users, expenses, splits and balances.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database described by `config`.
    /// WAL mode keeps readers on committed snapshots while a writer is active.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(config.create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", config.database_path))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(config: &StoreConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, mobile_number, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.mobile_number)
        .bind(encode_time(user.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save user")?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, name, email, mobile_number, created_at FROM users WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Look a user up by email; callers pass an already-normalized address.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, name, email, mobile_number, created_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, name, email, mobile_number, created_at FROM users ORDER BY name, email",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            email: row.get("email"),
            mobile_number: row.get("mobile_number"),
            created_at: decode_time(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Expense operations
    // ========================

    /// Persist an expense with its participants and splits, and move the
    /// balances of everyone involved, as one transaction.
    ///
    /// Every non-payer share becomes a split row and a debit; the payer is
    /// credited the sum of those debits. Nothing is written if any statement
    /// fails: the transaction rolls back when dropped uncommitted.
    pub async fn apply_expense(
        &self,
        expense: &Expense,
        allocation: &Allocation,
    ) -> Result<Vec<ExpenseSplit>> {
        anyhow::ensure!(
            allocation.payer_id == expense.payer_id,
            "Allocation payer {} does not match expense payer {}",
            allocation.payer_id,
            expense.payer_id
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO expenses (id, creator_id, payer_id, total_cents, description, split_method, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(expense.creator_id.to_string())
        .bind(expense.payer_id.to_string())
        .bind(expense.total_cents)
        .bind(&expense.description)
        .bind(expense.split_method.as_str())
        .bind(encode_time(expense.created_at))
        .execute(&mut *tx)
        .await
        .context("Failed to save expense")?;

        for (position, user_id) in expense.participants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO expense_participants (expense_id, user_id, position) VALUES (?, ?, ?)",
            )
            .bind(expense.id.to_string())
            .bind(user_id.to_string())
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to save expense participant")?;
        }

        let mut splits = Vec::new();
        for share in allocation.owed() {
            let split = ExpenseSplit::new(expense.id, share.user_id, share.amount_cents);

            sqlx::query(
                "INSERT INTO expense_splits (id, expense_id, user_id, amount_cents) VALUES (?, ?, ?, ?)",
            )
            .bind(split.id.to_string())
            .bind(split.expense_id.to_string())
            .bind(split.user_id.to_string())
            .bind(split.amount_cents)
            .execute(&mut *tx)
            .await
            .context("Failed to save expense split")?;

            Self::adjust_balance(&mut *tx, split.user_id, -split.amount_cents).await?;
            splits.push(split);
        }

        Self::adjust_balance(&mut *tx, allocation.payer_id, allocation.total_owed()).await?;

        tx.commit().await.context("Failed to commit expense")?;
        Ok(splits)
    }

    /// Add `delta` to a user's balance, creating the row at zero first if needed.
    /// The increment happens inside the UPDATE so concurrent writers never
    /// overwrite each other's deltas.
    async fn adjust_balance(conn: &mut SqliteConnection, user_id: UserId, delta: Cents) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO balances (user_id, balance_cents)
            VALUES (?, ?)
            ON CONFLICT(user_id) DO UPDATE SET balance_cents = balance_cents + excluded.balance_cents
            "#,
        )
        .bind(user_id.to_string())
        .bind(delta)
        .execute(&mut *conn)
        .await
        .context("Failed to update balance")?;
        Ok(())
    }

    pub async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let row = sqlx::query(
            r#"
            SELECT id, creator_id, payer_id, total_cents, description, split_method, created_at
            FROM expenses
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch expense")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let participant_rows = sqlx::query(
            "SELECT user_id FROM expense_participants WHERE expense_id = ? ORDER BY position",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch expense participants")?;

        let participants = participant_rows
            .iter()
            .map(|r| parse_id(r.get("user_id"), "participant"))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Self::row_to_expense(&row, participants)?))
    }

    /// List all expenses, oldest first.
    pub async fn list_expenses(&self) -> Result<Vec<Expense>> {
        let rows = sqlx::query(
            r#"
            SELECT id, creator_id, payer_id, total_cents, description, split_method, created_at
            FROM expenses
            ORDER BY created_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expenses")?;

        let participant_rows = sqlx::query(
            "SELECT expense_id, user_id FROM expense_participants ORDER BY expense_id, position",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list expense participants")?;

        let mut participants: HashMap<ExpenseId, Vec<UserId>> = HashMap::new();
        for row in &participant_rows {
            let expense_id = parse_id(row.get("expense_id"), "expense")?;
            let user_id = parse_id(row.get("user_id"), "participant")?;
            participants.entry(expense_id).or_default().push(user_id);
        }

        rows.iter()
            .map(|row| {
                let id = parse_id(row.get("id"), "expense")?;
                Self::row_to_expense(row, participants.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    fn row_to_expense(row: &SqliteRow, participants: Vec<UserId>) -> Result<Expense> {
        let method_str: String = row.get("split_method");
        let created_at_str: String = row.get("created_at");

        Ok(Expense {
            id: parse_id(row.get("id"), "expense")?,
            creator_id: parse_id(row.get("creator_id"), "creator")?,
            payer_id: parse_id(row.get("payer_id"), "payer")?,
            participants,
            total_cents: row.get("total_cents"),
            description: row.get("description"),
            split_method: SplitMethod::from_str(&method_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid split method: {}", method_str))?,
            created_at: decode_time(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Split operations
    // ========================

    pub async fn list_splits_for_expense(&self, expense_id: ExpenseId) -> Result<Vec<ExpenseSplit>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.expense_id, s.user_id, s.amount_cents
            FROM expense_splits s
            JOIN expense_participants p ON p.expense_id = s.expense_id AND p.user_id = s.user_id
            WHERE s.expense_id = ?
            ORDER BY p.position
            "#,
        )
        .bind(expense_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list splits for expense")?;

        rows.iter().map(Self::row_to_split).collect()
    }

    /// Every split the user owes, with the date and description of its expense.
    pub async fn list_splits_for_user(&self, user_id: UserId) -> Result<Vec<UserSplit>> {
        let rows = sqlx::query(
            r#"
            SELECT s.expense_id, s.amount_cents, e.created_at, e.description
            FROM expense_splits s
            JOIN expenses e ON e.id = s.expense_id
            WHERE s.user_id = ?
            ORDER BY e.created_at, e.id
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list splits for user")?;

        rows.iter()
            .map(|row| {
                let created_at_str: String = row.get("created_at");
                Ok(UserSplit {
                    expense_id: parse_id(row.get("expense_id"), "expense")?,
                    amount_cents: row.get("amount_cents"),
                    created_at: decode_time(&created_at_str)
                        .context("Invalid created_at timestamp")?,
                    description: row.get("description"),
                })
            })
            .collect()
    }

    /// Sum of everything the user owes across all splits.
    pub async fn total_owed(&self, user_id: UserId) -> Result<Cents> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount_cents), 0) as total FROM expense_splits WHERE user_id = ?",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum splits for user")?;

        row.try_get("total").context("Invalid owed total")
    }

    pub async fn list_all_splits(&self) -> Result<Vec<ExpenseSplit>> {
        let rows = sqlx::query("SELECT id, expense_id, user_id, amount_cents FROM expense_splits")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list splits")?;

        rows.iter().map(Self::row_to_split).collect()
    }

    /// Map of expense ID to the user who paid it.
    pub async fn expense_payers(&self) -> Result<HashMap<ExpenseId, UserId>> {
        let rows = sqlx::query("SELECT id, payer_id FROM expenses")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list expense payers")?;

        rows.iter()
            .map(|row| {
                Ok((
                    parse_id(row.get("id"), "expense")?,
                    parse_id(row.get("payer_id"), "payer")?,
                ))
            })
            .collect()
    }

    fn row_to_split(row: &SqliteRow) -> Result<ExpenseSplit> {
        Ok(ExpenseSplit {
            id: parse_id(row.get("id"), "split")?,
            expense_id: parse_id(row.get("expense_id"), "expense")?,
            user_id: parse_id(row.get("user_id"), "user")?,
            amount_cents: row.get("amount_cents"),
        })
    }

    // ========================
    // Balance operations
    // ========================

    /// The stored balance for a user, or `None` if no expense has touched them.
    pub async fn get_balance(&self, user_id: UserId) -> Result<Option<Cents>> {
        let row = sqlx::query("SELECT balance_cents FROM balances WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch balance")?;

        row.map(|r| r.try_get("balance_cents").context("Invalid stored balance"))
            .transpose()
    }

    /// All balance rows joined with their users, ordered by name.
    pub async fn list_balances(&self) -> Result<Vec<(User, Cents)>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.mobile_number, u.created_at, b.balance_cents
            FROM balances b
            JOIN users u ON u.id = b.user_id
            ORDER BY u.name, u.email
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list balances")?;

        rows.iter()
            .map(|row| {
                let balance: Cents = row
                    .try_get("balance_cents")
                    .context("Invalid stored balance")?;
                Ok((Self::row_to_user(row)?, balance))
            })
            .collect()
    }

    pub async fn balance_map(&self) -> Result<HashMap<UserId, Cents>> {
        let rows = sqlx::query("SELECT user_id, balance_cents FROM balances")
            .fetch_all(&self.pool)
            .await
            .context("Failed to read balances")?;

        rows.iter()
            .map(|row| {
                let balance: Cents = row
                    .try_get("balance_cents")
                    .context("Invalid stored balance")?;
                Ok((parse_id(row.get("user_id"), "user")?, balance))
            })
            .collect()
    }

    pub async fn get_ledger_stats(&self) -> Result<LedgerStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) as user_count,
                (SELECT COUNT(*) FROM expenses) as expense_count,
                (SELECT COUNT(*) FROM expense_splits) as split_count
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count ledger rows")?;

        Ok(LedgerStats {
            user_count: row.get("user_count"),
            expense_count: row.get("expense_count"),
            split_count: row.get("split_count"),
        })
    }
}

fn parse_id(raw: String, what: &str) -> Result<Uuid> {
    Uuid::parse_str(&raw).with_context(|| format!("Invalid {} ID: {}", what, raw))
}

/// Fixed-width RFC 3339 so timestamps sort correctly as text.
fn encode_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
