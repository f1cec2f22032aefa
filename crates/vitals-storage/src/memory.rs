//! In-memory storage: two maps under one reader-writer lock, with
//! copy-on-read snapshots published through a versioned cache.

use crate::{MetricStorage, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use vitals_common::metric::{Metric, MetricValue};

#[derive(Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
    // Bumped on every committed write; snapshots carry the version they
    // were built at.
    version: u64,
}

struct SnapshotCache {
    version: u64,
    gauges: Arc<HashMap<String, f64>>,
    counters: Arc<HashMap<String, i64>>,
}

pub struct MemStorage {
    inner: RwLock<Maps>,
    cache: Mutex<SnapshotCache>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Maps::default()),
            cache: Mutex::new(SnapshotCache {
                version: 0,
                gauges: Arc::new(HashMap::new()),
                counters: Arc::new(HashMap::new()),
            }),
        }
    }

    /// Builds a storage pre-seeded with restored state.
    pub fn with_data(gauges: HashMap<String, f64>, counters: HashMap<String, i64>) -> Self {
        let storage = Self::new();
        {
            let mut inner = storage.inner.write().unwrap();
            inner.gauges = gauges;
            inner.counters = counters;
            inner.version = 1;
        }
        storage
    }

    /// Returns the published `{gauges, counters}` pair, rebuilding the
    /// cached snapshot only when a write happened since it was taken. Both
    /// maps are rebuilt under the same read guard, so the pair is never torn.
    pub(crate) fn snapshot(&self) -> (Arc<HashMap<String, f64>>, Arc<HashMap<String, i64>>) {
        let inner = self.inner.read().unwrap();
        let mut cache = self.cache.lock().unwrap();
        if cache.version != inner.version {
            cache.gauges = Arc::new(inner.gauges.clone());
            cache.counters = Arc::new(inner.counters.clone());
            cache.version = inner.version;
        }
        (cache.gauges.clone(), cache.counters.clone())
    }

    pub(crate) fn set_gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().unwrap();
        inner.gauges.insert(name.to_string(), value);
        inner.version += 1;
    }

    pub(crate) fn add_counter(&self, name: &str, delta: i64) {
        let mut inner = self.inner.write().unwrap();
        *inner.counters.entry(name.to_string()).or_insert(0) += delta;
        inner.version += 1;
    }

    /// Validates every record, then applies them all under one write guard.
    pub(crate) fn apply_batch(&self, metrics: &[Metric]) -> Result<()> {
        let mut values = Vec::with_capacity(metrics.len());
        for metric in metrics {
            values.push((metric.id.as_str(), metric.payload()?));
        }
        let mut inner = self.inner.write().unwrap();
        for (name, value) in values {
            match value {
                MetricValue::Gauge(v) => {
                    inner.gauges.insert(name.to_string(), v);
                }
                MetricValue::Counter(d) => {
                    *inner.counters.entry(name.to_string()).or_insert(0) += d;
                }
            }
        }
        inner.version += 1;
        Ok(())
    }
}

#[async_trait]
impl MetricStorage for MemStorage {
    async fn update_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.set_gauge(name, value);
        Ok(())
    }

    async fn update_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.add_counter(name, delta);
        Ok(())
    }

    async fn update_batch(&self, metrics: &[Metric]) -> Result<()> {
        self.apply_batch(metrics)
    }

    async fn gauges(&self) -> Result<Arc<HashMap<String, f64>>> {
        Ok(self.snapshot().0)
    }

    async fn counters(&self) -> Result<Arc<HashMap<String, i64>>> {
        Ok(self.snapshot().1)
    }
}
