//! SQL-backed storage on SQLite.
//!
//! Gauge upserts overwrite, counter upserts add, batches run inside one
//! transaction. Every call goes through a connection-exception retry policy:
//! busy/locked errors are retried after 1 s, 3 s, and 5 s waits; anything
//! else propagates immediately. The waits are plain tokio sleeps, so a
//! caller dropping the future aborts the retry.

use crate::{MetricStorage, Result, StorageError};
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vitals_common::metric::{Metric, MetricValue};

const RETRY_WAITS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS gauges (
        name  TEXT PRIMARY KEY,
        value REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS counters (
        name  TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    );
";

pub struct SqlStorage {
    conn: Mutex<Connection>,
}

impl SqlStorage {
    /// Opens (and if needed creates) the database addressed by `dsn`.
    ///
    /// The DSN is a filesystem path, optionally prefixed with `sqlite://`.
    pub fn new(dsn: &str) -> Result<Self> {
        let path = dsn.strip_prefix("sqlite://").unwrap_or(dsn);
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(200))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    async fn with_retry<T>(&self, mut op: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let mut waits = RETRY_WAITS.iter();
        loop {
            let result = {
                let conn = self.conn.lock().unwrap();
                op(&conn)
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match waits.next() {
                    Some(wait) => {
                        tracing::warn!(error = %e, wait_secs = wait.as_secs(), "Transient storage error, retrying");
                        tokio::time::sleep(*wait).await;
                    }
                    None => return Err(e),
                },
                Err(e) => return Err(e),
            }
        }
    }
}

fn upsert_gauge(conn: &Connection, name: &str, value: f64) -> Result<()> {
    conn.execute(
        "INSERT INTO gauges (name, value) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET value = excluded.value",
        rusqlite::params![name, value],
    )?;
    Ok(())
}

fn upsert_counter(conn: &Connection, name: &str, delta: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO counters (name, value) VALUES (?1, ?2)
         ON CONFLICT (name) DO UPDATE SET value = counters.value + excluded.value",
        rusqlite::params![name, delta],
    )?;
    Ok(())
}

#[async_trait]
impl MetricStorage for SqlStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.with_retry(|conn| upsert_gauge(conn, name, value)).await
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.with_retry(|conn| upsert_counter(conn, name, delta))
            .await
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut values = Vec::with_capacity(metrics.len());
        for metric in metrics {
            values.push((metric.id.clone(), metric.payload()?));
        }
        self.with_retry(move |conn| {
            let tx = conn.unchecked_transaction()?;
            for (name, value) in &values {
                match value {
                    MetricValue::Gauge(v) => upsert_gauge(&tx, name, *v)?,
                    MetricValue::Counter(d) => upsert_counter(&tx, name, *d)?,
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn gauges(&self) -> Result<Arc<HashMap<String, f64>>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare_cached("SELECT name, value FROM gauges")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?;
            let mut result = HashMap::new();
            for row in rows {
                let (name, value) = row?;
                result.insert(name, value);
            }
            Ok(Arc::new(result))
        })
        .await
    }

    async fn counters(&self) -> Result<Arc<HashMap<String, i64>>> {
        self.with_retry(|conn| {
            let mut stmt = conn.prepare_cached("SELECT name, value FROM counters")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut result = HashMap::new();
            for row in rows {
                let (name, value) = row?;
                result.insert(name, value);
            }
            Ok(Arc::new(result))
        })
        .await
    }

    // Writes commit as they happen; nothing buffered to flush.

    async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

impl std::fmt::Debug for SqlStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlStorage").finish_non_exhaustive()
    }
}
