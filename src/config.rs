//! Store configuration shared by the CLI and the service layer.

use std::time::Duration;

/// How long a connection waits for another writer before giving up.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database_path: String,
    pub busy_timeout: Duration,
    pub max_connections: u32,
    /// Create the database file when it does not exist yet
    pub create_if_missing: bool,
}

impl StoreConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            create_if_missing: false,
        }
    }

    pub fn with_busy_timeout_ms(mut self, millis: u64) -> Self {
        self.busy_timeout = Duration::from_millis(millis);
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn creating(mut self) -> Self {
        self.create_if_missing = true;
        self
    }
}
