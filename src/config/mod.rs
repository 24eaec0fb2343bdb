// src/config/mod.rs
// Runtime configuration, loaded from the environment with defaults.

use std::time::Duration;

use crate::poller::tables::{clinic_tables, WatchedTable};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_ROW_CAP: usize = 200;

pub struct SyncConfig {
    pub database_url: String,
    pub bind_address: String,
    pub poll_interval: Duration,
    /// Upper bound on rows carried in one event, so a burst of writes
    /// between cycles cannot produce an unbounded payload.
    pub row_cap: usize,
    pub tables: Vec<WatchedTable>,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("CLINIC_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://clinic.db".to_string()),

            bind_address: std::env::var("CLINIC_SYNC_BIND")
                .unwrap_or_else(|_| "127.0.0.1:7171".to_string()),

            // Poll every 5 seconds; zero is invalid (the interval timer
            // requires a non-zero period) and falls back like any other
            // unparsable value.
            poll_interval: Duration::from_secs(
                std::env::var("CLINIC_SYNC_INTERVAL")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse::<u64>()
                    .ok()
                    .filter(|&secs| secs > 0)
                    .unwrap_or(DEFAULT_POLL_INTERVAL.as_secs()),
            ),

            // A zero cap would turn every diff query into LIMIT 0 and
            // silently suppress all events.
            row_cap: std::env::var("CLINIC_SYNC_ROW_CAP")
                .unwrap_or_else(|_| "200".to_string())
                .parse::<usize>()
                .ok()
                .filter(|&cap| cap > 0)
                .unwrap_or(DEFAULT_ROW_CAP),

            tables: watched_tables_from_env(),
        }
    }

    /// Get a human-readable summary of the configuration
    pub fn summary(&self) -> String {
        let tables = self
            .tables
            .iter()
            .map(|t| format!("{}:{}", t.name, t.change_column))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Sync Config:\n\
            - Database: {}\n\
            - Bind: {}\n\
            - Poll interval: {} secs\n\
            - Row cap per cycle: {}\n\
            - Watched tables: {}",
            self.database_url,
            self.bind_address,
            self.poll_interval.as_secs(),
            self.row_cap,
            tables,
        )
    }
}

/// `CLINIC_SYNC_TABLES` overrides the default watched set with a
/// comma-separated list of `table:column` pairs. Malformed entries are
/// skipped; an empty result falls back to the clinic defaults.
fn watched_tables_from_env() -> Vec<WatchedTable> {
    let Ok(raw) = std::env::var("CLINIC_SYNC_TABLES") else {
        return clinic_tables();
    };

    let mut tables = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        match WatchedTable::parse(entry) {
            Some(table) => tables.push(table),
            None => tracing::warn!("Ignoring malformed watched-table entry: {}", entry),
        }
    }

    if tables.is_empty() {
        clinic_tables()
    } else {
        tables
    }
}
