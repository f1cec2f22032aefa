//! The agent's metric maps, fed by the two pollers.
//!
//! Both pollers serialize their writes through one mutex, which also owns
//! the probes. Snapshots hand out copies, so callers never observe a sample
//! mid-merge.

use std::collections::HashMap;
use std::sync::Mutex;
use vitals_collector::runtime::RuntimeProbe;
use vitals_collector::system::SystemProbe;
use vitals_collector::Probe;
use vitals_common::metric::Metric;

pub struct Collector {
    inner: Mutex<Inner>,
}

struct Inner {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
    poll_count: i64,
    runtime: RuntimeProbe,
    system: SystemProbe,
}

impl Collector {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            inner: Mutex::new(Inner {
                gauges: HashMap::new(),
                counters: HashMap::new(),
                poll_count: 0,
                runtime: RuntimeProbe::new()?,
                system: SystemProbe::new(),
            }),
        })
    }

    /// Runtime poll: merges the allocator gauge schema and bumps `PollCount`.
    pub fn collect_runtime(&self) {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        match inner.runtime.sample() {
            Ok(samples) => {
                for sample in samples {
                    inner.gauges.insert(sample.name, sample.value);
                }
                inner.poll_count += 1;
                inner.counters.insert("PollCount".to_string(), inner.poll_count);
            }
            Err(e) => tracing::warn!(probe = inner.runtime.name(), error = %e, "Collection failed"),
        }
    }

    /// System poll: merges host memory and per-core CPU gauges.
    pub fn collect_system(&self) {
        let mut inner = self.inner.lock().unwrap();
        let inner = &mut *inner;
        match inner.system.sample() {
            Ok(samples) => {
                for sample in samples {
                    inner.gauges.insert(sample.name, sample.value);
                }
            }
            Err(e) => tracing::warn!(probe = inner.system.name(), error = %e, "Collection failed"),
        }
    }

    /// Copies of both maps, consistent with each other.
    pub fn snapshot(&self) -> (HashMap<String, f64>, HashMap<String, i64>) {
        let inner = self.inner.lock().unwrap();
        (inner.gauges.clone(), inner.counters.clone())
    }

    /// The current state as wire records, counters first.
    pub fn to_metrics(&self) -> Vec<Metric> {
        let (gauges, counters) = self.snapshot();
        let mut metrics = Vec::with_capacity(gauges.len() + counters.len());
        for (name, value) in counters {
            metrics.push(Metric::counter(name, value));
        }
        for (name, value) in gauges {
            metrics.push(Metric::gauge(name, value));
        }
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitals_common::metric::MetricKind;

    #[test]
    fn poll_count_increments_per_runtime_poll() {
        let collector = Collector::new().unwrap();
        collector.collect_runtime();
        collector.collect_runtime();

        let (_, counters) = collector.snapshot();
        assert_eq!(counters.get("PollCount"), Some(&2));
    }

    #[test]
    fn runtime_poll_fills_the_gauge_schema() {
        let collector = Collector::new().unwrap();
        collector.collect_runtime();

        let (gauges, _) = collector.snapshot();
        for name in ["Alloc", "HeapAlloc", "Sys", "TotalAlloc", "RandomValue", "NumGC"] {
            assert!(gauges.contains_key(name), "missing gauge {name}");
        }
    }

    #[test]
    fn system_poll_fills_host_gauges() {
        let collector = Collector::new().unwrap();
        collector.collect_system();

        let (gauges, _) = collector.snapshot();
        assert!(gauges.contains_key("TotalMemory"));
        assert!(gauges.contains_key("FreeMemory"));
        assert!(gauges.contains_key("CPUutilization1"));
    }

    #[test]
    fn snapshots_are_copies() {
        let collector = Collector::new().unwrap();
        collector.collect_runtime();

        let (mut gauges, _) = collector.snapshot();
        gauges.insert("Injected".to_string(), 1.0);

        let (fresh, _) = collector.snapshot();
        assert!(!fresh.contains_key("Injected"));
    }

    #[test]
    fn to_metrics_lists_counters_then_gauges() {
        let collector = Collector::new().unwrap();
        collector.collect_runtime();

        let metrics = collector.to_metrics();
        assert!(!metrics.is_empty());
        assert_eq!(metrics[0].kind, MetricKind::Counter);
        assert_eq!(metrics[0].id, "PollCount");
        assert!(metrics[1..].iter().all(|m| m.kind == MetricKind::Gauge));
        for metric in &metrics {
            assert!(metric.payload().is_ok());
        }
    }
}
