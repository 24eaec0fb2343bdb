// src/poller/event.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A batch of rows newer than a table's watermark, broadcast once to every
/// connected window. `data` carries the rows exactly as the store returned
/// them; the poller interprets nothing beyond the change column.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub table: String,
    pub data: Vec<Value>,
    /// When the poll cycle observed these rows (ISO-8601 on the wire).
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(table: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}
