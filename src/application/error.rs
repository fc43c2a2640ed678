use thiserror::Error;

use crate::domain::SplitError;

#[derive(Error, Debug)]
pub enum AppError {
    /// The split input was rejected; nothing was written.
    #[error(transparent)]
    Split(#[from] SplitError),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Expense not found: {0}")]
    ExpenseNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors caused by caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::Split(_)
                | AppError::InvalidAmount(_)
                | AppError::InvalidInput(_)
                | AppError::UserAlreadyExists(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::UserNotFound(_) | AppError::ExpenseNotFound(_))
    }
}
