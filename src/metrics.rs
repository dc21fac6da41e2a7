//! Resolution run metrics
//!
//! Thread-safe counters for resolution runs and for rows dropped during
//! normalization, plus a short history of recent runs.

use crate::resolve::NormalizationReport;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Which selection a run resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Object,
    Field,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Published,
    Discarded,
    Failed,
}

/// Record of a recent run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub kind: RunKind,
    pub generation: u64,
    /// `Object` or `Object.Field`
    pub target: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub dropped_rows: usize,
}

/// Dropped-row totals across runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DroppedRows {
    pub unknown_fields: u64,
    pub unknown_principals: u64,
    pub malformed_assignments: u64,
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub runs_started: u64,
    pub runs_published: u64,
    pub runs_discarded: u64,
    pub runs_failed: u64,
    pub dropped: DroppedRows,
    /// Published runs per object
    pub objects: BTreeMap<String, u64>,
    pub recent_runs: Vec<RunRecord>,
}

#[derive(Default)]
struct MetricsData {
    dropped: DroppedRows,
    objects: BTreeMap<String, u64>,
    recent_runs: VecDeque<RunRecord>,
}

/// Pipeline metrics collector
pub struct PipelineMetrics {
    start_time: Instant,
    runs_started: AtomicU64,
    runs_published: AtomicU64,
    runs_discarded: AtomicU64,
    runs_failed: AtomicU64,
    data: RwLock<MetricsData>,
    max_recent_runs: usize,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::with_capacity(50)
    }

    /// Create a collector keeping at most `max_recent_runs` run records
    pub fn with_capacity(max_recent_runs: usize) -> Self {
        Self {
            start_time: Instant::now(),
            runs_started: AtomicU64::new(0),
            runs_published: AtomicU64::new(0),
            runs_discarded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            data: RwLock::new(MetricsData {
                recent_runs: VecDeque::with_capacity(max_recent_runs),
                ..Default::default()
            }),
            max_recent_runs,
        }
    }

    // Poisoned locks are recovered; counters stay usable after a panic elsewhere

    fn write_data(&self) -> RwLockWriteGuard<'_, MetricsData> {
        self.data.write().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_data(&self) -> RwLockReadGuard<'_, MetricsData> {
        self.data.read().unwrap_or_else(|poisoned| {
            tracing::warn!("metrics data lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn record_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Add one run's normalization drops to the totals
    pub fn record_dropped(&self, report: &NormalizationReport) {
        if report.is_clean() {
            return;
        }
        let mut data = self.write_data();
        data.dropped.unknown_fields += report.unknown_fields as u64;
        data.dropped.unknown_principals += report.unknown_principal_rows() as u64;
        data.dropped.malformed_assignments += report.malformed_assignments as u64;
    }

    /// Record how a run ended
    pub fn record_finished(
        &self,
        kind: RunKind,
        generation: u64,
        target: &str,
        status: RunStatus,
        duration: Duration,
        dropped_rows: usize,
    ) {
        let counter = match status {
            RunStatus::Published => &self.runs_published,
            RunStatus::Discarded => &self.runs_discarded,
            RunStatus::Failed => &self.runs_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let mut data = self.write_data();
        if status == RunStatus::Published {
            let object = target.split('.').next().unwrap_or(target);
            *data.objects.entry(object.to_string()).or_default() += 1;
        }

        if data.recent_runs.len() >= self.max_recent_runs {
            data.recent_runs.pop_front();
        }
        data.recent_runs.push_back(RunRecord {
            kind,
            generation,
            target: target.to_string(),
            status,
            duration_ms: duration.as_millis() as u64,
            dropped_rows,
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.read_data();
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            runs_started: self.runs_started(),
            runs_published: self.runs_published.load(Ordering::Relaxed),
            runs_discarded: self.runs_discarded(),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            dropped: data.dropped.clone(),
            objects: data.objects.clone(),
            recent_runs: data.recent_runs.iter().cloned().collect(),
        }
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_discarded(&self) -> u64 {
        self.runs_discarded.load(Ordering::Relaxed)
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
