//! Health monitor
//!
//! Request counters, a rolling response-time window, per-tool counters, and a
//! bounded ring of recent errors. The error ring doubles as the diagnostic sink
//! for failures that never reach a caller, such as list-changed delivery.

use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::debug;

/// Response-time samples kept for the rolling average
pub const RESPONSE_TIME_WINDOW: usize = 100;
/// Error records kept for diagnostics
pub const RECENT_ERROR_LIMIT: usize = 20;

/// One recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub time: DateTime<Utc>,
    /// Where the failure happened: a tool name, `notification`, `transport`, ...
    pub scope: String,
    pub code: ErrorCode,
    pub message: String,
    pub retriable: bool,
}

/// Per-tool counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCounters {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
}

/// Point-in-time copy of the monitor state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time_ms: f64,
    pub last_success_at: Option<DateTime<Utc>>,
    /// Last time the engine was confirmed reachable
    pub last_connected_at: Option<DateTime<Utc>>,
    pub recent_errors: Vec<ErrorRecord>,
    pub tools: HashMap<String, ToolCounters>,
}

#[derive(Default)]
struct HealthState {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    response_times: VecDeque<u64>,
    last_success_at: Option<DateTime<Utc>>,
    last_connected_at: Option<DateTime<Utc>>,
    recent_errors: VecDeque<ErrorRecord>,
    tools: HashMap<String, ToolCounters>,
}

/// Overall status derived from bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Bridge enabled but not connected
    Degraded,
    /// Bridge disabled
    Unhealthy,
}

impl HealthStatus {
    pub fn from_bridge(connected: bool, enabled: bool) -> Self {
        if !enabled {
            HealthStatus::Unhealthy
        } else if !connected {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeHealth {
    pub connected: bool,
    pub enabled: bool,
}

/// Client-facing health document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub bridge: BridgeHealth,
    pub metrics: HealthSnapshot,
}

/// Health metrics shared by the router, the selector, and the notifier
pub struct HealthMonitor {
    started_at: DateTime<Utc>,
    state: RwLock<HealthState>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self {
            started_at: Utc::now(),
            state: RwLock::new(HealthState::default()),
        }
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HealthState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HealthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the outcome of one terminal invocation path
    pub fn track_performance(&self, tool_name: &str, start: Instant, success: bool) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let mut state = self.write();

        state.total_requests += 1;
        if success {
            state.successful_requests += 1;
            state.last_success_at = Some(Utc::now());
        } else {
            state.failed_requests += 1;
        }

        state.response_times.push_back(elapsed_ms);
        while state.response_times.len() > RESPONSE_TIME_WINDOW {
            state.response_times.pop_front();
        }

        let counters = state.tools.entry(tool_name.to_string()).or_default();
        counters.calls += 1;
        counters.total_duration_ms += elapsed_ms;
        if success {
            counters.successes += 1;
        } else {
            counters.failures += 1;
        }

        debug!("{} finished in {}ms (success: {})", tool_name, elapsed_ms, success);
    }

    /// Append to the bounded error ring
    pub fn record_error<S: Into<String>, M: Into<String>>(
        &self,
        scope: S,
        code: ErrorCode,
        message: M,
        retriable: bool,
    ) {
        let record = ErrorRecord {
            time: Utc::now(),
            scope: scope.into(),
            code,
            message: message.into(),
            retriable,
        };
        let mut state = self.write();
        state.recent_errors.push_back(record);
        while state.recent_errors.len() > RECENT_ERROR_LIMIT {
            state.recent_errors.pop_front();
        }
    }

    /// Note a successful connectivity check
    pub fn record_connection(&self) {
        self.write().last_connected_at = Some(Utc::now());
    }

    pub fn average_response_time_ms(&self) -> f64 {
        let state = self.read();
        if state.response_times.is_empty() {
            return 0.0;
        }
        let total: u64 = state.response_times.iter().sum();
        total as f64 / state.response_times.len() as f64
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.read().recent_errors.iter().cloned().collect()
    }

    /// Errors recorded under one scope
    pub fn errors_for(&self, scope: &str) -> Vec<ErrorRecord> {
        self.read()
            .recent_errors
            .iter()
            .filter(|e| e.scope == scope)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let average_response_time_ms = self.average_response_time_ms();
        let state = self.read();
        HealthSnapshot {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            total_requests: state.total_requests,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            average_response_time_ms,
            last_success_at: state.last_success_at,
            last_connected_at: state.last_connected_at,
            recent_errors: state.recent_errors.iter().cloned().collect(),
            tools: state.tools.clone(),
        }
    }

    pub fn report(&self, bridge_connected: bool, bridge_enabled: bool) -> HealthReport {
        HealthReport {
            status: HealthStatus::from_bridge(bridge_connected, bridge_enabled),
            timestamp: Utc::now(),
            bridge: BridgeHealth {
                connected: bridge_connected,
                enabled: bridge_enabled,
            },
            metrics: self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let monitor = HealthMonitor::new();
        monitor.track_performance("inspect", Instant::now(), true);
        monitor.track_performance("inspect", Instant::now(), false);
        monitor.track_performance("control_actor", Instant::now(), true);

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.tools["inspect"].calls, 2);
        assert_eq!(snapshot.tools["inspect"].failures, 1);
        assert!(snapshot.last_success_at.is_some());
        assert!(snapshot.last_connected_at.is_none());

        monitor.record_connection();
        assert!(monitor.snapshot().last_connected_at.is_some());
    }

    #[test]
    fn error_ring_is_bounded() {
        let monitor = HealthMonitor::new();
        for i in 0..(RECENT_ERROR_LIMIT + 5) {
            monitor.record_error("transport", ErrorCode::TransportFailure, format!("failure {}", i), true);
        }
        let errors = monitor.recent_errors();
        assert_eq!(errors.len(), RECENT_ERROR_LIMIT);
        assert_eq!(errors[0].message, "failure 5");
    }

    #[test]
    fn response_window_is_bounded() {
        let monitor = HealthMonitor::new();
        for _ in 0..(RESPONSE_TIME_WINDOW + 10) {
            monitor.track_performance("inspect", Instant::now(), true);
        }
        assert_eq!(monitor.read().response_times.len(), RESPONSE_TIME_WINDOW);
        assert!(monitor.average_response_time_ms() >= 0.0);
    }

    #[test]
    fn report_status_follows_bridge() {
        let monitor = HealthMonitor::new();
        assert_eq!(monitor.report(true, true).status, HealthStatus::Healthy);
        assert_eq!(monitor.report(false, true).status, HealthStatus::Degraded);
        assert_eq!(monitor.report(false, false).status, HealthStatus::Unhealthy);

        monitor.record_error("notification", ErrorCode::Protocol, "closed", false);
        let wire = serde_json::to_value(monitor.report(false, true)).unwrap();
        assert_eq!(wire["status"], "degraded");
        assert_eq!(wire["metrics"]["recentErrors"][0]["scope"], "notification");
        assert!(wire["metrics"]["uptimeSecs"].as_i64().unwrap() >= 0);
    }
}
