//! Process memory gauges.
//!
//! The pipeline ships a fixed allocator-statistics schema; downstream
//! collectors query these gauges by name, so every name is emitted on every
//! poll. Readings the host process cannot observe (collector internals of a
//! garbage-collected runtime) report zero. `RandomValue` is drawn fresh on
//! every sample.

use crate::{Probe, Sample};
use anyhow::{anyhow, Result};
use rand::Rng;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Gauge names that only a managed-runtime allocator can fill in.
const UNOBSERVED_GAUGES: &[&str] = &[
    "BuckHashSys",
    "Frees",
    "GCCPUFraction",
    "GCSys",
    "HeapObjects",
    "HeapReleased",
    "LastGC",
    "Lookups",
    "MCacheInuse",
    "MCacheSys",
    "MSpanInuse",
    "MSpanSys",
    "Mallocs",
    "NextGC",
    "NumForcedGC",
    "NumGC",
    "OtherSys",
    "PauseTotalNs",
    "StackInuse",
    "StackSys",
];

pub struct RuntimeProbe {
    system: System,
    pid: Pid,
    // High-water mark of resident memory, reported as TotalAlloc.
    peak_resident: u64,
}

impl RuntimeProbe {
    pub fn new() -> Result<Self> {
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("cannot resolve own pid: {e}"))?;
        Ok(Self {
            system: System::new(),
            pid,
            peak_resident: 0,
        })
    }
}

impl Probe for RuntimeProbe {
    fn name(&self) -> &str {
        "runtime"
    }

    fn sample(&mut self) -> Result<Vec<Sample>> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let process = self
            .system
            .process(self.pid)
            .ok_or_else(|| anyhow!("own process {} not found", self.pid))?;

        let resident = process.memory();
        let virt = process.virtual_memory();
        self.peak_resident = self.peak_resident.max(resident);

        let mut samples = vec![
            Sample::new("Alloc", resident as f64),
            Sample::new("HeapAlloc", resident as f64),
            Sample::new("HeapInuse", resident as f64),
            Sample::new("HeapIdle", virt.saturating_sub(resident) as f64),
            Sample::new("HeapSys", virt as f64),
            Sample::new("Sys", virt as f64),
            Sample::new("TotalAlloc", self.peak_resident as f64),
        ];
        for name in UNOBSERVED_GAUGES {
            samples.push(Sample::new(*name, 0.0));
        }
        samples.push(Sample::new(
            "RandomValue",
            rand::thread_rng().gen_range(0.0..1.0),
        ));
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED_GAUGES: &[&str] = &[
        "Alloc",
        "BuckHashSys",
        "Frees",
        "GCCPUFraction",
        "GCSys",
        "HeapAlloc",
        "HeapIdle",
        "HeapInuse",
        "HeapObjects",
        "HeapReleased",
        "HeapSys",
        "LastGC",
        "Lookups",
        "MCacheInuse",
        "MCacheSys",
        "MSpanInuse",
        "MSpanSys",
        "Mallocs",
        "NextGC",
        "NumForcedGC",
        "NumGC",
        "OtherSys",
        "PauseTotalNs",
        "StackInuse",
        "StackSys",
        "Sys",
        "TotalAlloc",
        "RandomValue",
    ];

    #[test]
    fn emits_the_full_gauge_schema() {
        let mut probe = RuntimeProbe::new().unwrap();
        let samples = probe.sample().unwrap();
        for required in REQUIRED_GAUGES {
            assert!(
                samples.iter().any(|s| s.name == *required),
                "missing gauge {required}"
            );
        }
        assert_eq!(samples.len(), REQUIRED_GAUGES.len());
    }

    #[test]
    fn random_value_is_uniform_unit_range() {
        let mut probe = RuntimeProbe::new().unwrap();
        for _ in 0..5 {
            let samples = probe.sample().unwrap();
            let random = samples.iter().find(|s| s.name == "RandomValue").unwrap();
            assert!((0.0..1.0).contains(&random.value));
        }
    }

    #[test]
    fn own_process_memory_is_nonzero() {
        let mut probe = RuntimeProbe::new().unwrap();
        let samples = probe.sample().unwrap();
        let alloc = samples.iter().find(|s| s.name == "Alloc").unwrap();
        assert!(alloc.value > 0.0);
    }
}
