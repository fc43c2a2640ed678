mod common;

use std::sync::Arc;

use anyhow::Result;
use common::{balance_sum, record, test_config, test_service, Friends};
use divvy::domain::{Allocation, Expense, Share, SplitInput, SplitMethod, User};
use divvy::Repository;
use tempfile::TempDir;
use uuid::Uuid;

async fn repo_with_users() -> Result<(Repository, User, User, TempDir)> {
    let temp_dir = TempDir::new()?;
    let repo = Repository::init(&test_config(&temp_dir)).await?;

    let alice = User::new("Alice", "alice@example.com", "5550001");
    let bob = User::new("Bob", "bob@example.com", "5550002");
    repo.save_user(&alice).await?;
    repo.save_user(&bob).await?;

    Ok((repo, alice, bob, temp_dir))
}

#[tokio::test]
async fn test_failed_split_insert_rolls_back_everything() -> Result<()> {
    let (repo, alice, bob, _temp) = repo_with_users().await?;

    let expense = Expense::new(
        alice.id,
        alice.id,
        &[alice.id, bob.id],
        10000,
        "Dinner",
        SplitMethod::Exact,
    );
    // The second share points at a user that does not exist, so its split
    // row violates the foreign key after Bob's debit has been written.
    let allocation = Allocation {
        payer_id: alice.id,
        shares: vec![
            Share {
                user_id: bob.id,
                amount_cents: 5000,
            },
            Share {
                user_id: Uuid::new_v4(),
                amount_cents: 5000,
            },
        ],
    };

    let result = repo.apply_expense(&expense, &allocation).await;
    assert!(result.is_err());

    assert!(repo.get_expense(expense.id).await?.is_none());
    assert!(repo.list_expenses().await?.is_empty());
    assert!(repo.list_all_splits().await?.is_empty());
    assert!(repo.balance_map().await?.is_empty());
    assert_eq!(repo.get_balance(bob.id).await?, None);

    Ok(())
}

#[tokio::test]
async fn test_mismatched_payer_is_refused_before_writing() -> Result<()> {
    let (repo, alice, bob, _temp) = repo_with_users().await?;

    let expense = Expense::new(
        alice.id,
        alice.id,
        &[alice.id, bob.id],
        1000,
        "Taxi",
        SplitMethod::Equal,
    );
    let allocation = Allocation {
        payer_id: bob.id,
        shares: vec![Share {
            user_id: alice.id,
            amount_cents: 1000,
        }],
    };

    let err = repo.apply_expense(&expense, &allocation).await.unwrap_err();
    assert!(err.to_string().contains("does not match"));
    assert!(repo.list_expenses().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_successful_apply_writes_all_rows() -> Result<()> {
    let (repo, alice, bob, _temp) = repo_with_users().await?;

    let expense = Expense::new(
        bob.id,
        alice.id,
        &[alice.id, bob.id],
        2500,
        "Lunch",
        SplitMethod::Exact,
    );
    let allocation = Allocation {
        payer_id: alice.id,
        shares: vec![
            Share {
                user_id: alice.id,
                amount_cents: 1000,
            },
            Share {
                user_id: bob.id,
                amount_cents: 1500,
            },
        ],
    };

    let splits = repo.apply_expense(&expense, &allocation).await?;
    assert_eq!(splits.len(), 1);
    assert_eq!(repo.list_splits_for_expense(expense.id).await?, splits);
    assert_eq!(repo.get_balance(alice.id).await?, Some(1500));
    assert_eq!(repo.get_balance(bob.id).await?, Some(-1500));

    let stats = repo.get_ledger_stats().await?;
    assert_eq!(stats.expense_count, 1);
    assert_eq!(stats.split_count, 1);
    assert_eq!(repo.balance_map().await?.values().sum::<i64>(), 0);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_expenses_keep_ledger_balanced() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let f = Friends::create(&service).await?;
    let service = Arc::new(service);
    let ids = f.ids();

    let mut handles = Vec::new();
    for i in 0..12 {
        let service = Arc::clone(&service);
        let ids = ids.clone();
        handles.push(tokio::spawn(async move {
            let payer = ids[i % ids.len()];
            let total = 1000 + i as i64 * 37;
            record(&service, payer, ids, total, SplitInput::Equal).await
        }));
    }

    for handle in handles {
        handle.await??;
    }

    assert_eq!(service.list_expenses().await?.len(), 12);
    assert_eq!(balance_sum(&service).await?, 0);

    let report = service.check_ledger().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);

    Ok(())
}
