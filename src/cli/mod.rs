use std::collections::HashMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use uuid::Uuid;

use crate::application::{ExpenseService, NewExpense};
use crate::config::{StoreConfig, DEFAULT_BUSY_TIMEOUT_MS};
use crate::domain::{format_cents, parse_cents, SplitInput, User, UserId};

/// Divvy - shared expense ledger
#[derive(Parser)]
#[command(name = "divvy")]
#[command(about = "Split shared expenses and keep running balances between people")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "DIVVY_DATABASE", default_value = "divvy.db")]
    pub database: String,

    /// Milliseconds to wait for a concurrent writer before failing
    #[arg(long, env = "DIVVY_BUSY_TIMEOUT_MS", default_value_t = DEFAULT_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: u64,

    /// Enable verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// User management commands
    #[command(subcommand)]
    User(UserCommands),

    /// Expense commands
    #[command(subcommand)]
    Expense(ExpenseCommands),

    /// List what a user owes, expense by expense
    Splits {
        /// User email
        email: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show the total a user owes across all expenses
    Owed {
        /// User email
        email: String,
    },

    /// Show balance for a user or all users
    Balance {
        /// User email (omit for all users)
        email: Option<String>,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Verify that balances sum to zero and match the recorded splits
    Check,
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a new user
    Add {
        /// Display name
        name: String,

        /// Email address (must be unique)
        #[arg(short, long)]
        email: String,

        /// Mobile number
        #[arg(short, long, default_value = "")]
        mobile: String,
    },

    /// List all users
    List {
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show a user with their balance
    Show {
        /// User email
        email: String,
    },
}

#[derive(Subcommand)]
pub enum ExpenseCommands {
    /// Record a shared expense
    Add {
        /// Total amount (e.g., "50.00" or "50")
        amount: String,

        /// Description of the expense
        #[arg(short, long, default_value = "")]
        description: String,

        /// Email of the user who paid
        #[arg(long)]
        payer: String,

        /// Email of the user recording the expense (defaults to the payer)
        #[arg(long)]
        creator: Option<String>,

        /// Comma-separated participant emails
        #[arg(long, value_delimiter = ',', required = true)]
        participants: Vec<String>,

        /// Split method: equal, exact, percentage
        #[arg(short, long, default_value = "equal")]
        method: String,

        /// Per-user share as EMAIL=VALUE (amount for exact, percent for percentage)
        #[arg(short, long = "split")]
        splits: Vec<String>,
    },

    /// List all expenses
    List {
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show an expense with its splits
    Show {
        /// Expense ID
        id: String,

        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.database).with_busy_timeout_ms(self.busy_timeout_ms)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.store_config();

        match self.command {
            Commands::Init => {
                ExpenseService::init(&config).await?;
                println!("Database initialized: {}", self.database);
            }
            command => {
                let service = ExpenseService::connect(&config).await?;
                run_command(&service, command).await?;
            }
        }

        Ok(())
    }
}

async fn run_command(service: &ExpenseService, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {}

        Commands::User(user_cmd) => run_user_command(service, user_cmd).await?,

        Commands::Expense(expense_cmd) => run_expense_command(service, expense_cmd).await?,

        Commands::Splits { email, format } => run_splits_command(service, &email, format).await?,

        Commands::Owed { email } => {
            let user = service.get_user_by_email(&email).await?;
            let owed = service.get_total_owed(user.id).await?;
            println!("{} owes {} in total", user.name, format_cents(owed));
        }

        Commands::Balance { email, format } => run_balance_command(service, email, format).await?,

        Commands::Check => run_check_command(service).await?,
    }
    Ok(())
}

async fn run_user_command(service: &ExpenseService, cmd: UserCommands) -> Result<()> {
    match cmd {
        UserCommands::Add {
            name,
            email,
            mobile,
        } => {
            let user = service.create_user(name, email, mobile).await?;
            println!("Created user: {} <{}> ({})", user.name, user.email, user.id);
        }

        UserCommands::List { format } => {
            let users = service.list_users().await?;
            if format == OutputFormat::Json {
                return print_json(&users);
            }
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<20} {:<30} {:<15}", "NAME", "EMAIL", "MOBILE");
                println!("{}", "-".repeat(67));
                for user in users {
                    println!(
                        "{:<20} {:<30} {:<15}",
                        truncate(&user.name, 20),
                        truncate(&user.email, 30),
                        user.mobile_number
                    );
                }
            }
        }

        UserCommands::Show { email } => {
            let user = service.get_user_by_email(&email).await?;
            let balance = service.get_balance(user.id).await?;
            let owed = service.get_total_owed(user.id).await?;

            println!("User: {}", user.name);
            println!("  ID:       {}", user.id);
            println!("  Email:    {}", user.email);
            println!("  Mobile:   {}", user.mobile_number);
            println!("  Joined:   {}", user.created_at.format("%Y-%m-%d"));
            println!("  Balance:  {}", format_cents(balance));
            println!("  Owes:     {}", format_cents(owed));
        }
    }
    Ok(())
}

async fn run_expense_command(service: &ExpenseService, cmd: ExpenseCommands) -> Result<()> {
    match cmd {
        ExpenseCommands::Add {
            amount,
            description,
            payer,
            creator,
            participants,
            method,
            splits,
        } => {
            let total_cents =
                parse_cents(&amount).context("Invalid amount format. Use '50.00' or '50'")?;

            let payer = service.get_user_by_email(&payer).await?;
            let creator = match creator {
                Some(email) => service.get_user_by_email(&email).await?,
                None => payer.clone(),
            };

            let mut participant_ids = Vec::with_capacity(participants.len());
            for email in &participants {
                participant_ids.push(service.get_user_by_email(email).await?.id);
            }

            let mut entries = Vec::with_capacity(splits.len());
            for raw in &splits {
                let (email, value) = parse_split_arg(raw)?;
                let user = service.get_user_by_email(email).await?;
                entries.push((user.id, value.to_string()));
            }

            let split = SplitInput::parse(&method, &entries)?;
            let details = service
                .create_expense(NewExpense {
                    creator_id: creator.id,
                    payer_id: payer.id,
                    participants: participant_ids,
                    total_cents,
                    description,
                    split,
                })
                .await?;

            println!(
                "Recorded expense: {} paid by {} ({}, {} split(s)) {}",
                format_cents(details.expense.total_cents),
                payer.name,
                details.expense.split_method,
                details.splits.len(),
                details.expense.id
            );
        }

        ExpenseCommands::List { format } => {
            let expenses = service.list_expenses().await?;
            if format == OutputFormat::Json {
                return print_json(&expenses);
            }
            if expenses.is_empty() {
                println!("No expenses found.");
                return Ok(());
            }

            let names = user_names(service).await?;
            println!(
                "{:<12} {:>10} {:<15} {:<11} DESCRIPTION",
                "DATE", "AMOUNT", "PAID BY", "METHOD"
            );
            println!("{}", "-".repeat(70));
            for expense in &expenses {
                println!(
                    "{:<12} {:>10} {:<15} {:<11} {}",
                    expense.created_at.format("%Y-%m-%d"),
                    format_cents(expense.total_cents),
                    truncate(name_of(&names, expense.payer_id), 15),
                    expense.split_method,
                    truncate(&expense.description, 30)
                );
            }
        }

        ExpenseCommands::Show { id, format } => {
            let id = Uuid::parse_str(&id).context("Invalid expense ID")?;
            let details = service.get_expense(id).await?;
            if format == OutputFormat::Json {
                return print_json(&details);
            }

            let names = user_names(service).await?;
            let expense = &details.expense;
            println!("Expense: {}", expense.id);
            println!("  Date:         {}", expense.created_at.format("%Y-%m-%d %H:%M:%S"));
            println!("  Amount:       {}", format_cents(expense.total_cents));
            println!("  Description:  {}", expense.description);
            println!("  Method:       {}", expense.split_method);
            println!("  Paid by:      {}", name_of(&names, expense.payer_id));
            println!("  Recorded by:  {}", name_of(&names, expense.creator_id));
            let participants: Vec<&str> = expense
                .participants
                .iter()
                .map(|id| name_of(&names, *id))
                .collect();
            println!("  Participants: {}", participants.join(", "));

            if details.splits.is_empty() {
                println!("\nNobody owes anything on this expense.");
            } else {
                println!("\nOwed to {}:", name_of(&names, expense.payer_id));
                for split in &details.splits {
                    println!(
                        "  {:<20} {:>10}",
                        truncate(name_of(&names, split.user_id), 20),
                        format_cents(split.amount_cents)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_splits_command(
    service: &ExpenseService,
    email: &str,
    format: OutputFormat,
) -> Result<()> {
    let user = service.get_user_by_email(email).await?;
    let splits = service.get_splits_for_user(user.id).await?;
    if format == OutputFormat::Json {
        return print_json(&splits);
    }

    if splits.is_empty() {
        println!("{} owes nothing.", user.name);
        return Ok(());
    }

    println!("{:<12} {:>10} {:<36} DESCRIPTION", "DATE", "OWED", "EXPENSE");
    println!("{}", "-".repeat(80));
    for split in &splits {
        println!(
            "{:<12} {:>10} {:<36} {}",
            split.created_at.format("%Y-%m-%d"),
            format_cents(split.amount_cents),
            split.expense_id,
            truncate(&split.description, 30)
        );
    }
    Ok(())
}

async fn run_balance_command(
    service: &ExpenseService,
    email: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    match email {
        Some(email) => {
            let user = service.get_user_by_email(&email).await?;
            let balance = service.get_balance(user.id).await?;
            if format == OutputFormat::Json {
                #[derive(Serialize)]
                struct Entry<'a> {
                    user: &'a User,
                    balance: i64,
                }
                return print_json(&Entry {
                    user: &user,
                    balance,
                });
            }
            println!("{}: {}", user.name, format_cents(balance));
        }
        None => {
            let entries = service.get_all_balances().await?;
            if format == OutputFormat::Json {
                return print_json(&entries);
            }
            if entries.is_empty() {
                println!("No balances yet.");
            } else {
                println!("{:<20} {:<30} {:>12}", "USER", "EMAIL", "BALANCE");
                println!("{}", "-".repeat(64));
                for entry in entries {
                    println!(
                        "{:<20} {:<30} {:>12}",
                        truncate(&entry.user.name, 20),
                        truncate(&entry.user.email, 30),
                        format_cents(entry.balance)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(service: &ExpenseService) -> Result<()> {
    println!("Checking ledger...\n");

    let report = service.check_ledger().await?;

    println!("Users:    {}", report.user_count);
    println!("Expenses: {}", report.expense_count);
    println!("Splits:   {}", report.split_count);
    println!(
        "Total:    {}  {}",
        format_cents(report.total_balance),
        if report.is_balanced {
            "OK"
        } else {
            "UNBALANCED!"
        }
    );
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger check failed");
    }

    Ok(())
}

/// Split an `EMAIL=VALUE` argument.
fn parse_split_arg(raw: &str) -> Result<(&str, &str)> {
    let (email, value) = raw
        .split_once('=')
        .with_context(|| format!("Invalid split '{}'. Use EMAIL=VALUE", raw))?;
    let (email, value) = (email.trim(), value.trim());
    if email.is_empty() || value.is_empty() {
        anyhow::bail!("Invalid split '{}'. Use EMAIL=VALUE", raw);
    }
    Ok((email, value))
}

async fn user_names(service: &ExpenseService) -> Result<HashMap<UserId, String>> {
    let users = service.list_users().await?;
    Ok(users.into_iter().map(|u| (u.id, u.name)).collect())
}

fn name_of(names: &HashMap<UserId, String>, id: UserId) -> &str {
    names.get(&id).map(|s| s.as_str()).unwrap_or("?")
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_split_arg() {
        assert_eq!(
            parse_split_arg("bob@example.com=30.00").unwrap(),
            ("bob@example.com", "30.00")
        );
        assert_eq!(parse_split_arg(" a@b.c = 50 ").unwrap(), ("a@b.c", "50"));
        assert!(parse_split_arg("bob@example.com").is_err());
        assert!(parse_split_arg("=30").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a long description", 10), "a long ...");
    }

    #[test]
    fn test_cli_parses_expense_add() {
        let cli = Cli::try_parse_from([
            "divvy",
            "expense",
            "add",
            "100.00",
            "--payer",
            "a@example.com",
            "--participants",
            "a@example.com,b@example.com",
            "--method",
            "exact",
            "--split",
            "b@example.com=100",
        ])
        .unwrap();

        match cli.command {
            Commands::Expense(ExpenseCommands::Add {
                participants,
                splits,
                method,
                ..
            }) => {
                assert_eq!(participants, vec!["a@example.com", "b@example.com"]);
                assert_eq!(splits, vec!["b@example.com=100"]);
                assert_eq!(method, "exact");
            }
            _ => panic!("expected expense add"),
        }
    }
}
