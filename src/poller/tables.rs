// src/poller/tables.rs
// Static descriptors for the tables the poller watches.

use serde::Serialize;

/// A table monitored for new rows, identified by its name and the
/// timestamp column that marks row creation or modification.
/// Immutable for the process lifetime.
#[derive(Debug, Clone, Serialize)]
pub struct WatchedTable {
    pub name: String,
    pub change_column: String,
}

impl WatchedTable {
    pub fn new(name: impl Into<String>, change_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            change_column: change_column.into(),
        }
    }

    /// Parse a `table:column` pair from configuration.
    pub fn parse(entry: &str) -> Option<Self> {
        let (name, column) = entry.split_once(':')?;
        let (name, column) = (name.trim(), column.trim());
        if name.is_empty() || column.is_empty() {
            return None;
        }
        Some(Self::new(name, column))
    }
}

/// The clinic schema's watched tables. Medicines track modification time;
/// everything else is insert-only from the app's point of view.
pub fn clinic_tables() -> Vec<WatchedTable> {
    vec![
        WatchedTable::new("users", "created_at"),
        WatchedTable::new("patients", "created_at"),
        WatchedTable::new("medicines", "updated_at"),
        WatchedTable::new("lab_test_records", "created_at"),
        WatchedTable::new("transactions", "created_at"),
    ]
}
