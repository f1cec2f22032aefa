//! Kind-aware metric storage behind one contract.
//!
//! Three backends implement [`MetricStorage`]: [`memory::MemStorage`] (maps
//! under a reader-writer lock with published snapshots),
//! [`file::FileStorage`] (memory plus an atomically-rewritten JSON snapshot
//! on disk), and [`sql::SqlStorage`] (SQLite with upsert semantics and a
//! transient-error retry policy). The server holds the chosen backend as
//! `Arc<dyn MetricStorage>` and never branches on the variant.

pub mod error;
pub mod file;
pub mod memory;
pub mod sql;


use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use vitals_common::metric::Metric;

pub use error::{Result, StorageError};

/// Persistence contract for gauge and counter metrics.
///
/// Implementations must be safe to share across tasks (`Send + Sync`):
/// the HTTP handlers, the gRPC service, and background flush tasks all
/// hold the same instance.
#[async_trait]
pub trait MetricStorage: Send + Sync {
    /// Overwrites the gauge `name` with `value`.
    async fn update_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Adds `delta` to the counter `name`, creating it at zero first.
    async fn update_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Applies a batch of records. Backends with transactions apply
    /// all-or-nothing; the others validate every record before writing any.
    async fn update_batch(&self, metrics: &[Metric]) -> Result<()>;

    /// Returns a consistent snapshot of all gauges. The snapshot is safe to
    /// hold after return and never observes later writes.
    async fn gauges(&self) -> Result<Arc<HashMap<String, f64>>>;

    /// Returns a consistent snapshot of all counters.
    async fn counters(&self) -> Result<Arc<HashMap<String, i64>>>;

    /// Makes in-memory state durable. A benign no-op for backends that are
    /// already durable (or not durable at all).
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Verifies the backend is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
