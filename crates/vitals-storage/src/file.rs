//! File-backed storage: memory storage plus a JSON snapshot on disk.
//!
//! The snapshot is always rewritten through a sibling temp file and an
//! atomic rename, so readers never observe a partially-written file. With
//! `store_interval == 0` every update writes through synchronously;
//! otherwise a background ticker flushes periodically.

use crate::memory::MemStorage;
use crate::{MetricStorage, Result, StorageError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use vitals_common::metric::Metric;

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

pub struct FileStorage {
    mem: MemStorage,
    path: PathBuf,
    sync_save: bool,
    // Serializes snapshot writers so an older state never lands after a
    // newer one.
    save_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens file-backed storage at `path`.
    ///
    /// With `restore`, the existing snapshot is loaded into a fresh store
    /// first; a missing or unparseable file degrades to an empty store with
    /// a warning.
    pub fn new(path: impl Into<PathBuf>, sync_save: bool, restore: bool) -> Self {
        let path = path.into();
        let mem = if restore {
            match Self::read_snapshot(&path) {
                Ok(snapshot) => {
                    tracing::info!(
                        path = %path.display(),
                        gauges = snapshot.gauges.len(),
                        counters = snapshot.counters.len(),
                        "Restored metrics from snapshot"
                    );
                    MemStorage::with_data(snapshot.gauges, snapshot.counters)
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Could not restore metrics, starting empty"
                    );
                    MemStorage::new()
                }
            }
        } else {
            MemStorage::new()
        };

        Self {
            mem,
            path,
            sync_save,
            save_lock: Mutex::new(()),
        }
    }

    fn read_snapshot(path: &Path) -> Result<SnapshotFile> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Writes the current `{gauges, counters}` state to disk atomically.
    fn save(&self) -> Result<()> {
        let _guard = self.save_lock.lock().unwrap();

        let (gauges, counters) = self.mem.snapshot();
        let snapshot = SnapshotFile {
            gauges: gauges.as_ref().clone(),
            counters: counters.as_ref().clone(),
        };
        let data = serde_json::to_vec(&snapshot)?;

        // A bare filename yields an empty parent; rename() needs the temp
        // file on the same filesystem, so stay in the target directory.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::Io(e.error))?;
        Ok(())
    }

    /// Write-through after a mutation. Failures are logged and do not abort
    /// the writing caller; the next save re-attempts.
    fn save_after_update(&self) {
        if !self.sync_save {
            return;
        }
        if let Err(e) = self.save() {
            tracing::warn!(path = %self.path.display(), error = %e, "Error saving metrics");
        }
    }

    /// Spawns the periodic flush task. Tick-driven save failures are logged
    /// and retried on the next tick.
    pub fn spawn_autosave(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let storage = self;
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.tick().await; // the first tick fires immediately
            loop {
                tick.tick().await;
                if let Err(e) = storage.save() {
                    tracing::warn!(
                        path = %storage.path.display(),
                        error = %e,
                        "Error saving metrics"
                    );
                }
            }
        })
    }
}

#[async_trait]
impl MetricStorage for FileStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.mem.set_gauge(name, value);
        self.save_after_update();
        Ok(())
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.mem.add_counter(name, delta);
        self.save_after_update();
        Ok(())
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.mem.apply_batch(metrics)?;
        self.save_after_update();
        Ok(())
    }

    async fn gauges(&self) -> Result<Arc<HashMap<String, f64>>> {
        Ok(self.mem.snapshot().0)
    }

    async fn counters(&self) -> Result<Arc<HashMap<String, i64>>> {
        Ok(self.mem.snapshot().1)
    }

    async fn flush(&self) -> Result<()> {
        self.save()
    }
}
