//! Host-level gauges: physical memory and per-core CPU utilization.

use crate::{Probe, Sample};
use anyhow::Result;
use sysinfo::System;

pub struct SystemProbe {
    system: System,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // Prime the CPU counters so the first sample has a usage window.
        system.refresh_cpu_usage();
        Self { system }
    }
}

impl Probe for SystemProbe {
    fn name(&self) -> &str {
        "system"
    }

    fn sample(&mut self) -> Result<Vec<Sample>> {
        self.system.refresh_memory();
        self.system.refresh_cpu_usage();

        let mut samples = vec![
            Sample::new("TotalMemory", self.system.total_memory() as f64),
            Sample::new("FreeMemory", self.system.free_memory() as f64),
        ];
        // Cores are 1-indexed on the wire.
        for (i, cpu) in self.system.cpus().iter().enumerate() {
            samples.push(Sample::new(
                format!("CPUutilization{}", i + 1),
                f64::from(cpu.cpu_usage()),
            ));
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_memory_and_per_core_utilization() {
        let mut probe = SystemProbe::new();
        let samples = probe.sample().unwrap();

        let total = samples.iter().find(|s| s.name == "TotalMemory").unwrap();
        assert!(total.value > 0.0);
        assert!(samples.iter().any(|s| s.name == "FreeMemory"));
        assert!(samples.iter().any(|s| s.name == "CPUutilization1"));
        assert!(!samples.iter().any(|s| s.name == "CPUutilization0"));
    }

    #[test]
    fn core_gauges_are_contiguous_from_one() {
        let mut probe = SystemProbe::new();
        let samples = probe.sample().unwrap();
        let cores = samples
            .iter()
            .filter(|s| s.name.starts_with("CPUutilization"))
            .count();
        assert!(cores >= 1);
        for i in 1..=cores {
            assert!(samples.iter().any(|s| s.name == format!("CPUutilization{i}")));
        }
    }
}
