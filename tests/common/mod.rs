// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use divvy::application::{ExpenseDetails, ExpenseService, NewExpense};
use divvy::config::StoreConfig;
use divvy::domain::{Cents, SplitInput, User, UserId};
use tempfile::TempDir;

/// Store config pointing at a fresh database inside `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> StoreConfig {
    let db_path = temp_dir.path().join("test.db");
    StoreConfig::new(db_path.to_str().unwrap()).creating()
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(ExpenseService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = ExpenseService::init(&test_config(&temp_dir)).await?;
    Ok((service, temp_dir))
}

/// Test fixture: three users who share expenses
pub struct Friends {
    pub alice: User,
    pub bob: User,
    pub carol: User,
}

impl Friends {
    pub async fn create(service: &ExpenseService) -> Result<Self> {
        let alice = service
            .create_user("Alice".into(), "alice@example.com".into(), "5550001".into())
            .await?;
        let bob = service
            .create_user("Bob".into(), "bob@example.com".into(), "5550002".into())
            .await?;
        let carol = service
            .create_user("Carol".into(), "carol@example.com".into(), "5550003".into())
            .await?;
        Ok(Self { alice, bob, carol })
    }

    pub fn ids(&self) -> Vec<UserId> {
        vec![self.alice.id, self.bob.id, self.carol.id]
    }
}

/// Record an expense created and paid by `payer`
pub async fn record(
    service: &ExpenseService,
    payer: UserId,
    participants: Vec<UserId>,
    total_cents: Cents,
    split: SplitInput,
) -> Result<ExpenseDetails, divvy::application::AppError> {
    service
        .create_expense(NewExpense {
            creator_id: payer,
            payer_id: payer,
            participants,
            total_cents,
            description: "Shared expense".into(),
            split,
        })
        .await
}

/// Sum of every stored balance
pub async fn balance_sum(service: &ExpenseService) -> Result<Cents> {
    let entries = service.get_all_balances().await?;
    Ok(entries.iter().map(|e| e.balance).sum())
}
