// src/poller/mod.rs

//! Watermark-based change detection over the clinic database.
//!
//! Each watched table keeps a watermark: the newest change-column value seen
//! so far. A poll cycle queries every table for rows strictly above its
//! watermark, advances the watermark, and broadcasts one event per table
//! that had new rows. The first cycle only establishes baselines so
//! pre-existing rows are never reported as new.

pub mod event;
pub mod rows;
pub mod tables;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_POLL_INTERVAL;

pub use event::ChangeEvent;
pub use tables::WatchedTable;

/// Observer channel capacity. A lagging window loses old events rather
/// than stalling the poller; there is no replay.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What one poll cycle did, reported back to the sync-now caller.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CycleSummary {
    pub tables_checked: usize,
    pub events_emitted: usize,
    pub rows_emitted: usize,
    pub tables_failed: usize,
}

struct Schedule {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum TableCheck {
    /// First sight of the table: watermark recorded, nothing reported.
    Baseline(NaiveDateTime),
    Unchanged,
    Changed {
        mark: NaiveDateTime,
        event: ChangeEvent,
    },
}

/// Detects newly inserted or updated rows in the watched tables and
/// broadcasts them to subscribed observers. One instance per process;
/// watermarks live in memory and reset on restart.
pub struct ChangePoller {
    pool: SqlitePool,
    tables: Vec<WatchedTable>,
    row_cap: i64,
    /// Locked for the full duration of a cycle, so a scheduled tick and an
    /// out-of-band sync can never race on watermark advancement.
    watermarks: Mutex<HashMap<String, NaiveDateTime>>,
    events: broadcast::Sender<ChangeEvent>,
    schedule: Mutex<Option<Schedule>>,
}

impl ChangePoller {
    pub fn new(pool: SqlitePool, tables: Vec<WatchedTable>, row_cap: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            pool,
            tables,
            // A zero cap would make every diff query LIMIT 0; deliver at
            // least one row per cycle.
            row_cap: row_cap.max(1) as i64,
            watermarks: Mutex::new(HashMap::new()),
            events,
            schedule: Mutex::new(None),
        }
    }

    pub fn tables(&self) -> &[WatchedTable] {
        &self.tables
    }

    /// Attach an observer. The receiver sees only events emitted after
    /// this call; sending to zero observers is a no-op.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the current watermarks, for the status endpoint.
    pub async fn watermarks(&self) -> HashMap<String, NaiveDateTime> {
        self.watermarks.lock().await.clone()
    }

    /// Begin the recurring poll. Calling `start` while a schedule is
    /// already running replaces it; watermarks carry over. Returns
    /// immediately, the first cycle runs right away in the background.
    pub async fn start(self: &Arc<Self>, every: Duration) {
        // The interval timer panics on a zero period, which would kill the
        // schedule task while the rest of the process keeps answering.
        let every = if every.is_zero() {
            warn!(
                "Ignoring zero poll interval, polling every {:?}",
                DEFAULT_POLL_INTERVAL
            );
            DEFAULT_POLL_INTERVAL
        } else {
            every
        };

        let mut slot = self.schedule.lock().await;
        if let Some(prior) = slot.take() {
            prior.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!("Change poller started (interval: {:?})", every);
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                // Cancellation is only honored between cycles; an in-flight
                // cycle always runs to completion.
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                poller.poll_once().await;
            }
            info!("Change poller stopped");
        });
        *slot = Some(Schedule { cancel, handle });
    }

    /// Cancel the recurring schedule. Safe to call when not started.
    /// Watermarks are preserved for a later `start`.
    pub async fn stop(&self) {
        let mut slot = self.schedule.lock().await;
        if let Some(prior) = slot.take() {
            prior.cancel.cancel();
            let _ = prior.handle.await;
        }
    }

    /// Run one poll cycle over every watched table. Cycles are mutually
    /// exclusive: a concurrent caller waits for the running cycle and then
    /// polls against its advanced watermarks. A failure on one table never
    /// prevents the others from being checked.
    pub async fn poll_once(&self) -> CycleSummary {
        let mut watermarks = self.watermarks.lock().await;
        let mut summary = CycleSummary::default();
        let mut pending = Vec::new();

        for table in &self.tables {
            summary.tables_checked += 1;
            let mark = watermarks.get(table.name.as_str()).copied();
            match self.check_table(table, mark).await {
                Ok(TableCheck::Baseline(mark)) => {
                    debug!("Baseline for {} set to {}", table.name, mark);
                    watermarks.insert(table.name.clone(), mark);
                }
                Ok(TableCheck::Unchanged) => {}
                Ok(TableCheck::Changed { mark, event }) => {
                    watermarks.insert(table.name.clone(), mark);
                    pending.push(event);
                }
                Err(e) => {
                    summary.tables_failed += 1;
                    error!("Check failed for table {}: {:#}", table.name, e);
                }
            }
        }

        // All tables checked; now broadcast, one event per table.
        for event in pending {
            summary.events_emitted += 1;
            summary.rows_emitted += event.data.len();
            debug!(
                "Broadcasting {} new row(s) for {}",
                event.data.len(),
                event.table
            );
            let _ = self.events.send(event);
        }

        summary
    }

    async fn check_table(
        &self,
        table: &WatchedTable,
        mark: Option<NaiveDateTime>,
    ) -> Result<TableCheck> {
        let Some(mark) = mark else {
            // First poll of this table: remember the newest existing value
            // (or the current time if the table is empty) without reporting
            // rows that predate the service.
            let newest = self.newest_change_value(table).await?;
            return Ok(TableCheck::Baseline(
                newest.unwrap_or_else(|| Utc::now().naive_utc()),
            ));
        };

        let query = format!(
            "SELECT * FROM {} WHERE {} > ? ORDER BY {} DESC LIMIT ?",
            table.name, table.change_column, table.change_column
        );
        let fetched = sqlx::query(&query)
            .bind(mark)
            .bind(self.row_cap)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("querying new rows in {}", table.name))?;

        if fetched.is_empty() {
            return Ok(TableCheck::Unchanged);
        }

        // Descending order: the head row carries the new watermark.
        let new_mark: NaiveDateTime = fetched[0]
            .try_get(table.change_column.as_str())
            .with_context(|| format!("reading {}.{}", table.name, table.change_column))?;
        let data = fetched.iter().map(rows::row_to_json).collect();

        Ok(TableCheck::Changed {
            mark: new_mark,
            event: ChangeEvent::new(&table.name, data),
        })
    }

    async fn newest_change_value(&self, table: &WatchedTable) -> Result<Option<NaiveDateTime>> {
        let query = format!("SELECT MAX({}) FROM {}", table.change_column, table.name);
        let newest: Option<NaiveDateTime> = sqlx::query_scalar(&query)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("reading newest {} in {}", table.change_column, table.name))?;
        Ok(newest)
    }
}
