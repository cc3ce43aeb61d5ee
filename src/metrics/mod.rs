//! Metrics collection
//!
//! Health metrics recorded on every terminal invocation path.

pub mod health;

pub use health::{BridgeHealth, ErrorRecord, HealthMonitor, HealthReport, HealthSnapshot, HealthStatus, ToolCounters};
