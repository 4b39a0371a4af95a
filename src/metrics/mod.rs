// drbackup/src/metrics/mod.rs
//
// Process-wide counters and last-run health, kept in one lock-guarded record.
// The sink is an explicitly constructed instance handed to callers rather
// than a hidden global, so the pipeline stays testable.
pub mod server;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::RwLock;
use std::time::Duration;

/// A backup counts as stale once its last success is older than this.
pub const STALE_BACKUP_THRESHOLD: Duration = Duration::from_secs(25 * 60 * 60);

const METRIC_PREFIX: &str = "drbackup";

const BACKUP_DURATION_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0];
const TRANSFER_DURATION_BUCKETS: &[f64] =
    &[0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];
const RESTORE_DURATION_BUCKETS: &[f64] =
    &[1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Backup,
    Upload,
    Download,
    Restore,
}

impl Operation {
    const ALL: [Operation; 4] = [
        Operation::Backup,
        Operation::Upload,
        Operation::Download,
        Operation::Restore,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Operation::Backup => "backup",
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Restore => "restore",
        }
    }

    fn index(self) -> usize {
        match self {
            Operation::Backup => 0,
            Operation::Upload => 1,
            Operation::Download => 2,
            Operation::Restore => 3,
        }
    }

    fn duration_buckets(self) -> &'static [f64] {
        match self {
            Operation::Backup => BACKUP_DURATION_BUCKETS,
            Operation::Upload | Operation::Download => TRANSFER_DURATION_BUCKETS,
            Operation::Restore => RESTORE_DURATION_BUCKETS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Snapshot of the last-run health record.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub last_backup_error: String,
    pub backup_count: u64,
}

#[derive(Debug, Clone)]
struct Histogram {
    boundaries: &'static [f64],
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Histogram {
    fn new(boundaries: &'static [f64]) -> Self {
        Histogram {
            boundaries,
            buckets: vec![0; boundaries.len() + 1],
            sum: 0.0,
            count: 0,
        }
    }

    fn observe(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        let index = self
            .boundaries
            .iter()
            .position(|boundary| value <= *boundary)
            .unwrap_or(self.boundaries.len());
        self.buckets[index] += 1;
    }
}

#[derive(Debug)]
struct OperationMetrics {
    success_total: u64,
    failure_total: BTreeMap<String, u64>,
    duration: Histogram,
}

impl OperationMetrics {
    fn new(op: Operation) -> Self {
        OperationMetrics {
            success_total: 0,
            failure_total: BTreeMap::new(),
            duration: Histogram::new(op.duration_buckets()),
        }
    }
}

#[derive(Debug)]
struct MetricsState {
    operations: [OperationMetrics; 4],
    backup_size: Histogram,
    last_backup_time: Option<DateTime<Utc>>,
    last_backup_error: String,
    backup_count: u64,
    is_healthy: bool,
}

/// Mutex-guarded counters, histograms and the last-run health record.
pub struct MetricsSink {
    state: RwLock<MetricsState>,
}

impl MetricsSink {
    pub fn new() -> Self {
        // Exponential buckets, 1 KiB up to ~1 GiB, like the original exporter.
        static SIZE_BUCKETS: std::sync::OnceLock<Vec<f64>> = std::sync::OnceLock::new();
        let size_boundaries: &'static [f64] = SIZE_BUCKETS
            .get_or_init(|| (0..20).map(|i| 1024.0 * 2f64.powi(i)).collect())
            .as_slice();

        MetricsSink {
            state: RwLock::new(MetricsState {
                operations: [
                    OperationMetrics::new(Operation::Backup),
                    OperationMetrics::new(Operation::Upload),
                    OperationMetrics::new(Operation::Download),
                    OperationMetrics::new(Operation::Restore),
                ],
                backup_size: Histogram::new(size_boundaries),
                last_backup_time: None,
                last_backup_error: String::new(),
                backup_count: 0,
                is_healthy: true,
            }),
        }
    }

    pub fn record_success(&self, op: Operation, duration: Duration) {
        let mut state = self.state.write().unwrap();
        let metrics = &mut state.operations[op.index()];
        metrics.success_total += 1;
        metrics.duration.observe(duration.as_secs_f64());
    }

    pub fn record_failure(&self, op: Operation, reason: &str) {
        let mut state = self.state.write().unwrap();
        let metrics = &mut state.operations[op.index()];
        *metrics.failure_total.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn observe_backup_size(&self, bytes: u64) {
        let mut state = self.state.write().unwrap();
        state.backup_size.observe(bytes as f64);
    }

    /// Updates the health record after a successful backup.
    pub fn record_backup_success(&self) {
        let mut state = self.state.write().unwrap();
        state.last_backup_time = Some(Utc::now());
        state.last_backup_error.clear();
        state.backup_count += 1;
        state.is_healthy = true;
    }

    /// Updates the health record after a backup failure.
    pub fn record_backup_error(&self, error: &str) {
        let mut state = self.state.write().unwrap();
        state.last_backup_time = Some(Utc::now());
        state.last_backup_error = error.to_string();
        state.is_healthy = false;
    }

    pub fn success_total(&self, op: Operation) -> u64 {
        self.state.read().unwrap().operations[op.index()].success_total
    }

    pub fn failure_total(&self, op: Operation, reason: &str) -> u64 {
        self.state.read().unwrap().operations[op.index()]
            .failure_total
            .get(reason)
            .copied()
            .unwrap_or(0)
    }

    /// Health as of `now`: `unhealthy` right after a recorded failure,
    /// `healthy` again after the next success, `degraded` when healthy but
    /// the last success is more than 25 hours old.
    pub fn health(&self, now: DateTime<Utc>) -> HealthReport {
        let state = self.state.read().unwrap();

        let status = if !state.is_healthy {
            HealthState::Unhealthy
        } else {
            match state.last_backup_time {
                Some(last) if now.signed_duration_since(last).num_seconds()
                    > STALE_BACKUP_THRESHOLD.as_secs() as i64 =>
                {
                    HealthState::Degraded
                }
                _ => HealthState::Healthy,
            }
        };

        HealthReport {
            status,
            last_backup_time: state.last_backup_time,
            last_backup_error: state.last_backup_error.clone(),
            backup_count: state.backup_count,
        }
    }

    /// Renders every counter and histogram in the Prometheus text exposition
    /// format.
    pub fn render_prometheus(&self) -> String {
        let state = self.state.read().unwrap();
        let mut out = String::new();

        for op in Operation::ALL {
            let metrics = &state.operations[op.index()];
            let name = op.as_str();

            let _ = writeln!(
                out,
                "# HELP {prefix}_{name}_success_total Total number of successful {name} operations",
                prefix = METRIC_PREFIX
            );
            let _ = writeln!(out, "# TYPE {}_{}_success_total counter", METRIC_PREFIX, name);
            let _ = writeln!(
                out,
                "{}_{}_success_total {}",
                METRIC_PREFIX, name, metrics.success_total
            );

            let _ = writeln!(
                out,
                "# HELP {prefix}_{name}_failure_total Total number of failed {name} operations",
                prefix = METRIC_PREFIX
            );
            let _ = writeln!(out, "# TYPE {}_{}_failure_total counter", METRIC_PREFIX, name);
            for (reason, count) in &metrics.failure_total {
                let _ = writeln!(
                    out,
                    "{}_{}_failure_total{{reason=\"{}\"}} {}",
                    METRIC_PREFIX, name, reason, count
                );
            }

            render_histogram(
                &mut out,
                &format!("{}_{}_duration_seconds", METRIC_PREFIX, name),
                &format!("Duration of {} operations in seconds", name),
                &metrics.duration,
            );
        }

        render_histogram(
            &mut out,
            &format!("{}_backup_size_bytes", METRIC_PREFIX),
            "Size of backup files in bytes",
            &state.backup_size,
        );

        let _ = writeln!(
            out,
            "# HELP {prefix}_backup_count Total number of successful backups since start",
            prefix = METRIC_PREFIX
        );
        let _ = writeln!(out, "# TYPE {}_backup_count counter", METRIC_PREFIX);
        let _ = writeln!(out, "{}_backup_count {}", METRIC_PREFIX, state.backup_count);

        out
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn render_histogram(out: &mut String, name: &str, help: &str, histogram: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let mut cumulative = 0u64;
    for (boundary, count) in histogram.boundaries.iter().zip(&histogram.buckets) {
        cumulative += count;
        let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", name, boundary, cumulative);
    }
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, histogram.count);
    let _ = writeln!(out, "{}_sum {}", name, histogram.sum);
    let _ = writeln!(out, "{}_count {}", name, histogram.count);
}
