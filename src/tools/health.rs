//! Tool health tracking.
//!
//! In-memory sliding-window metrics per tool, fed by the dispatcher after
//! every call. Failures are bucketed by [`ErrorKind`] so a flapping
//! microscope driver (`INSTRUMENT_UNAVAILABLE`) is told apart from clients
//! sending bad arguments (`VALIDATION`).

use crate::envelope::enums::HealthStatus;
use crate::types::{DispatchConfig, ErrorKind};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

// =============================================================================
// Configuration
// =============================================================================

/// Health assessment thresholds.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Minimum success rate for HEALTHY status (default: 0.95).
    pub success_rate_healthy: f64,
    /// Minimum success rate for DEGRADED status (default: 0.80).
    pub success_rate_degraded: f64,
    /// Maximum avg latency for HEALTHY status (default: 5s).
    pub latency_healthy: Duration,
    /// Maximum avg latency for DEGRADED status (default: 30s).
    pub latency_degraded: Duration,
    /// Minimum calls before health assessment (default: 5).
    pub min_calls_for_assessment: usize,
    /// Failures within `error_window` that flag a tool as failing hard.
    pub error_burst_threshold: usize,
    /// Window for `error_burst_threshold` (default: 5 minutes).
    pub error_window: Duration,
    /// Sliding window size (default: 100).
    pub window_size: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            success_rate_healthy: 0.95,
            success_rate_degraded: 0.80,
            latency_healthy: Duration::from_secs(5),
            latency_degraded: Duration::from_secs(30),
            min_calls_for_assessment: 5,
            error_burst_threshold: 5,
            error_window: Duration::from_secs(300),
            window_size: 100,
        }
    }
}

impl From<&DispatchConfig> for HealthConfig {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            window_size: config.health_window.max(1),
            ..Default::default()
        }
    }
}

// =============================================================================
// Per-tool metrics
// =============================================================================

#[derive(Debug, Clone)]
struct CallRecord {
    latency: Duration,
    at: Instant,
    failure: Option<ErrorKind>,
}

#[derive(Debug)]
struct ToolMetrics {
    records: VecDeque<CallRecord>,
    window_size: usize,
}

impl ToolMetrics {
    fn new(window_size: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(window_size),
            window_size,
        }
    }

    fn record(&mut self, latency: Duration, failure: Option<ErrorKind>) {
        if self.records.len() >= self.window_size {
            self.records.pop_front();
        }
        self.records.push_back(CallRecord {
            latency,
            at: Instant::now(),
            failure,
        });
    }

    fn total_calls(&self) -> usize {
        self.records.len()
    }

    fn failures(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter().filter(|r| r.failure.is_some())
    }

    fn success_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            return 0.0;
        }
        (total - self.failures().count()) as f64 / total as f64
    }

    fn avg_latency(&self) -> Duration {
        let total = self.total_calls();
        if total == 0 {
            return Duration::ZERO;
        }
        let sum: Duration = self.records.iter().map(|r| r.latency).sum();
        sum / total as u32
    }

    fn recent_failures(&self, window: Duration) -> usize {
        let now = Instant::now();
        self.failures()
            .filter(|r| now.saturating_duration_since(r.at) <= window)
            .count()
    }

    fn failures_by_kind(&self) -> BTreeMap<ErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for kind in self.failures().filter_map(|r| r.failure) {
            *counts.entry(kind).or_default() += 1;
        }
        counts
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Health report for a single tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolHealthReport {
    pub tool_name: String,
    pub status: HealthStatus,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub total_calls: usize,
    pub recent_failures: usize,
    pub failures_by_kind: BTreeMap<ErrorKind, usize>,
    pub issues: Vec<String>,
}

/// Health across every registered tool.
#[derive(Debug, Clone, Serialize)]
pub struct SystemHealthReport {
    pub status: HealthStatus,
    pub tool_reports: Vec<ToolHealthReport>,
    pub summary: HealthSummary,
}

/// Counts by health status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub unknown: usize,
}

// =============================================================================
// Tracker
// =============================================================================

/// Sliding-window health tracker for dispatched tools.
#[derive(Debug)]
pub struct ToolHealthTracker {
    config: HealthConfig,
    metrics: HashMap<String, ToolMetrics>,
    registered_tools: Vec<String>,
}

impl ToolHealthTracker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            metrics: HashMap::new(),
            registered_tools: Vec::new(),
        }
    }

    /// Tools that appear in system reports even before their first call.
    pub fn set_registered_tools(&mut self, tool_names: Vec<String>) {
        self.registered_tools = tool_names;
    }

    /// Record one dispatched call. `failure` is `None` on success.
    pub fn record(&mut self, tool_name: &str, latency: Duration, failure: Option<ErrorKind>) {
        let window_size = self.config.window_size;
        self.metrics
            .entry(tool_name.to_string())
            .or_insert_with(|| ToolMetrics::new(window_size))
            .record(latency, failure);
    }

    pub fn check_tool_health(&self, tool_name: &str) -> ToolHealthReport {
        let Some(m) = self.metrics.get(tool_name) else {
            return ToolHealthReport {
                tool_name: tool_name.to_string(),
                status: HealthStatus::Unknown,
                success_rate: 0.0,
                avg_latency_ms: 0.0,
                total_calls: 0,
                recent_failures: 0,
                failures_by_kind: BTreeMap::new(),
                issues: vec!["No execution history".to_string()],
            };
        };

        let total = m.total_calls();
        let success_rate = m.success_rate();
        let avg_latency = m.avg_latency();
        let recent_failures = m.recent_failures(self.config.error_window);
        let mut report = ToolHealthReport {
            tool_name: tool_name.to_string(),
            status: HealthStatus::Unknown,
            success_rate,
            avg_latency_ms: avg_latency.as_secs_f64() * 1000.0,
            total_calls: total,
            recent_failures,
            failures_by_kind: m.failures_by_kind(),
            issues: Vec::new(),
        };

        if total < self.config.min_calls_for_assessment {
            report.issues.push(format!(
                "Insufficient data ({}/{})",
                total, self.config.min_calls_for_assessment
            ));
            return report;
        }

        let rate_status = if success_rate >= self.config.success_rate_healthy {
            HealthStatus::Healthy
        } else if success_rate >= self.config.success_rate_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        let latency_status = if avg_latency <= self.config.latency_healthy {
            HealthStatus::Healthy
        } else if avg_latency <= self.config.latency_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        let mut status = worse_status(rate_status, latency_status);

        if success_rate < self.config.success_rate_healthy {
            report.issues.push(format!(
                "Success rate {:.1}% below {:.0}% threshold",
                success_rate * 100.0,
                self.config.success_rate_healthy * 100.0,
            ));
        }
        if avg_latency > self.config.latency_healthy {
            report.issues.push(format!(
                "Avg latency {:.0}ms exceeds {}ms threshold",
                report.avg_latency_ms,
                self.config.latency_healthy.as_millis(),
            ));
        }
        if recent_failures >= self.config.error_burst_threshold {
            status = HealthStatus::Unhealthy;
            report.issues.push(format!(
                "{} failures in last {}s",
                recent_failures,
                self.config.error_window.as_secs(),
            ));
        }

        report.status = status;
        report
    }

    /// Health of all tools (registered and executed), sorted by name.
    pub fn check_system_health(&self) -> SystemHealthReport {
        let mut all_tools: Vec<&str> = self.registered_tools.iter().map(String::as_str).collect();
        for name in self.metrics.keys() {
            if !all_tools.contains(&name.as_str()) {
                all_tools.push(name);
            }
        }
        all_tools.sort_unstable();

        let tool_reports: Vec<ToolHealthReport> = all_tools
            .into_iter()
            .map(|name| self.check_tool_health(name))
            .collect();

        let mut summary = HealthSummary::default();
        for report in &tool_reports {
            match report.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
                HealthStatus::Unknown => summary.unknown += 1,
            }
        }

        let status = if summary.unhealthy > 0 {
            HealthStatus::Unhealthy
        } else if summary.degraded > 0 {
            HealthStatus::Degraded
        } else if summary.healthy > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        };

        SystemHealthReport {
            status,
            tool_reports,
            summary,
        }
    }

    /// Number of tools with at least one recorded call.
    pub fn tool_count(&self) -> usize {
        self.metrics.len()
    }
}

impl Default for ToolHealthTracker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}

fn worse_status(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    let rank = |s: HealthStatus| -> u8 {
        match s {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Unknown => 3,
        }
    };
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(20);

    fn tracker() -> ToolHealthTracker {
        ToolHealthTracker::new(HealthConfig {
            min_calls_for_assessment: 3,
            error_burst_threshold: 3,
            ..Default::default()
        })
    }

    #[test]
    fn test_no_data_unknown() {
        let report = tracker().check_tool_health("acquire_image");
        assert_eq!(report.status, HealthStatus::Unknown);
        assert_eq!(report.total_calls, 0);
    }

    #[test]
    fn test_insufficient_data_unknown() {
        let mut tracker = tracker();
        tracker.record("acquire_image", FAST, None);
        tracker.record("acquire_image", FAST, None);
        let report = tracker.check_tool_health("acquire_image");
        assert_eq!(report.status, HealthStatus::Unknown);
        assert_eq!(report.total_calls, 2);
    }

    #[test]
    fn test_healthy_tool() {
        let mut tracker = tracker();
        for _ in 0..10 {
            tracker.record("acquire_image", FAST, None);
        }
        let report = tracker.check_tool_health("acquire_image");
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_validation_failures_degrade() {
        let mut tracker = ToolHealthTracker::new(HealthConfig {
            min_calls_for_assessment: 3,
            ..Default::default()
        });
        for _ in 0..8 {
            tracker.record("start_live_stream", FAST, None);
        }
        for _ in 0..2 {
            tracker.record("start_live_stream", FAST, Some(ErrorKind::Validation));
        }
        let report = tracker.check_tool_health("start_live_stream");
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.failures_by_kind[&ErrorKind::Validation], 2);
    }

    #[test]
    fn test_failure_burst_is_unhealthy() {
        let mut tracker = tracker();
        for _ in 0..20 {
            tracker.record("acquire_image", FAST, None);
        }
        for _ in 0..3 {
            tracker.record("acquire_image", FAST, Some(ErrorKind::InstrumentUnavailable));
        }
        let report = tracker.check_tool_health("acquire_image");
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.recent_failures, 3);
    }

    #[test]
    fn test_slow_tool_degraded() {
        let mut tracker = tracker();
        for _ in 0..5 {
            tracker.record("run_experiment_workflow", Duration::from_secs(10), None);
        }
        let report = tracker.check_tool_health("run_experiment_workflow");
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_sliding_window_eviction() {
        let mut tracker = ToolHealthTracker::new(HealthConfig {
            window_size: 5,
            min_calls_for_assessment: 3,
            ..Default::default()
        });
        for _ in 0..5 {
            tracker.record("stop_stream", FAST, Some(ErrorKind::SessionNotFound));
        }
        for _ in 0..5 {
            tracker.record("stop_stream", FAST, None);
        }
        let report = tracker.check_tool_health("stop_stream");
        assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(report.failures_by_kind.is_empty());
    }

    #[test]
    fn test_system_health_includes_idle_tools() {
        let mut tracker = tracker();
        tracker.set_registered_tools(vec!["acquire_image".into(), "stop_stream".into()]);
        for _ in 0..5 {
            tracker.record("acquire_image", FAST, None);
        }
        let report = tracker.check_system_health();
        assert_eq!(report.tool_reports.len(), 2);
        assert_eq!(report.summary.healthy, 1);
        assert_eq!(report.summary.unknown, 1);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_window_from_dispatch_config() {
        let config = HealthConfig::from(&DispatchConfig {
            health_window: 0,
            ..Default::default()
        });
        assert_eq!(config.window_size, 1);
    }
}
