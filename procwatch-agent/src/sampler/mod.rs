//! Process table sampling for procwatch agents
//!
//! CPU usage is a delta, so a sample is taken in two passes:
//! - first pass primes the per-process CPU counters (values discarded)
//! - settling wait lets CPU time accumulate
//! - second pass reads CPU since the first pass, memory and parent pid
//!
//! Processes that exit or become unreadable between passes are dropped
//! from the output without failing the sample.

use std::time::Duration;

use sysinfo::System;
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::snapshot::ProcessSample;

/// Default pause between the two passes
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Raw per-process values as exposed by the OS accessor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessReading {
    pub pid: u32,
    pub name: Option<String>,
    /// Percent of one core since the previous refresh
    pub cpu_percent: Option<f32>,
    /// Percent of total host memory, resident
    pub memory_percent: Option<f32>,
    pub parent_pid: Option<u32>,
}

/// Access to the host process table
///
/// `refresh` must tolerate processes exiting between calls: they simply
/// stop appearing in `readings`.
pub trait ProcessTable {
    /// Re-reads the process list and advances per-process CPU counters.
    fn refresh(&mut self);

    /// Processes seen by the last refresh.
    fn readings(&self) -> Vec<ProcessReading>;
}

/// sysinfo-backed process table
pub struct SysinfoTable {
    sys: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        Self { sys }
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoTable {
    fn refresh(&mut self) {
        self.sys.refresh_memory();
        self.sys.refresh_processes();
    }

    fn readings(&self) -> Vec<ProcessReading> {
        let total_memory = self.sys.total_memory();

        self.sys
            .processes()
            .values()
            .map(|p| {
                let memory_percent = if total_memory > 0 {
                    Some((p.memory() as f64 / total_memory as f64 * 100.0) as f32)
                } else {
                    None
                };

                ProcessReading {
                    pid: p.pid().as_u32(),
                    name: Some(p.name().to_string()),
                    cpu_percent: Some(p.cpu_usage()),
                    memory_percent,
                    parent_pid: p.parent().map(|pid| pid.as_u32()),
                }
            })
            .collect()
    }
}

/// Two-pass sampler
pub struct Sampler<T, C> {
    table: T,
    clock: C,
    settle: Duration,
}

impl<T: ProcessTable, C: Clock> Sampler<T, C> {
    pub fn new(table: T, clock: C, settle: Duration) -> Self {
        Self { table, clock, settle }
    }

    /// Samples every visible process, ordered by pid.
    pub async fn sample(&mut self) -> Vec<ProcessSample> {
        // First pass: baseline only
        self.table.refresh();
        let primed = self.table.readings().len();
        trace!(primed, "primed cpu counters");

        self.clock.sleep(self.settle).await;

        self.table.refresh();
        let mut samples: Vec<ProcessSample> = self
            .table
            .readings()
            .into_iter()
            .map(to_sample)
            .collect();
        samples.sort_by_key(|s| s.pid);

        debug!(primed, sampled = samples.len(), "process table sampled");
        samples
    }

    #[cfg(test)]
    pub(crate) fn table(&self) -> &T {
        &self.table
    }
}

fn to_sample(reading: ProcessReading) -> ProcessSample {
    let name = reading
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| reading.pid.to_string());

    ProcessSample {
        pid: reading.pid,
        name,
        cpu_usage: usage(reading.cpu_percent),
        memory_usage: usage(reading.memory_percent),
        parent_pid: reading.parent_pid,
    }
}

/// Missing, negative or non-finite metrics become 0.0
fn usage(value: Option<f32>) -> f64 {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => v as f64,
        _ => 0.0,
    }
}
