//! Centralized timeout configuration for transport round trips

use crate::routing::types::TransportKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Timeouts per transport, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportTimeouts {
    /// Default timeout for every transport
    pub default_timeout_ms: u64,
    /// Per-transport overrides keyed by transport name
    pub timeouts: HashMap<String, u64>,
    /// Global maximum (safety limit)
    pub max_timeout_ms: u64,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        let mut timeouts = HashMap::new();
        timeouts.insert(TransportKind::Bridge.to_string(), 60_000);
        timeouts.insert(TransportKind::Python.to_string(), 30_000);
        timeouts.insert(TransportKind::Console.to_string(), 10_000);

        Self {
            default_timeout_ms: 30_000,
            timeouts,
            max_timeout_ms: 600_000,
        }
    }
}

impl TransportTimeouts {
    /// Set the timeout for one transport, capped at the maximum
    pub fn set_timeout(&mut self, kind: TransportKind, timeout_ms: u64) {
        self.timeouts
            .insert(kind.to_string(), timeout_ms.min(self.max_timeout_ms));
    }

    /// Priority: per-call override > per-transport config > default. Always capped.
    pub fn get_timeout(&self, kind: TransportKind, call_override: Option<u64>) -> Duration {
        let timeout_ms = call_override
            .filter(|ms| *ms > 0)
            .or_else(|| self.timeouts.get(kind.as_str()).copied())
            .unwrap_or(self.default_timeout_ms);

        Duration::from_millis(timeout_ms.min(self.max_timeout_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_timeout_ms == 0 {
            return Err("Default transport timeout cannot be zero".to_string());
        }
        if self.max_timeout_ms == 0 {
            return Err("Maximum transport timeout cannot be zero".to_string());
        }
        if self.default_timeout_ms > self.max_timeout_ms {
            return Err("Default transport timeout cannot exceed maximum timeout".to_string());
        }
        for (name, &timeout) in &self.timeouts {
            if name.parse::<TransportKind>().is_err() {
                return Err(format!("Unknown transport in timeouts: '{}'", name));
            }
            if timeout == 0 {
                return Err(format!("Timeout for transport '{}' cannot be zero", name));
            }
            if timeout > self.max_timeout_ms {
                return Err(format!(
                    "Timeout for transport '{}' ({}) exceeds maximum timeout ({})",
                    name, timeout, self.max_timeout_ms
                ));
            }
        }
        Ok(())
    }
}
