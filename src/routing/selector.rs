//! Transport selection with single-step fallback
//!
//! An explicit transport is a hard constraint. Implicit selection prefers the
//! bridge and, on a retryable failure, tries exactly one secondary channel
//! chosen by the tool's action class.

use crate::error::{RelayError, Result};
use crate::metrics::HealthMonitor;
use crate::registry::ActionClass;
use crate::routing::timeout::TransportTimeouts;
use crate::routing::transport::AutomationTransport;
use crate::routing::types::{TransportDecision, TransportEnvelope, TransportKind, TransportRequest, TransportResponse};
use crate::security::CommandFilter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Scope under which transport failures are recorded
pub const TRANSPORT_SCOPE: &str = "transport";

pub struct TransportSelector {
    bridge: Arc<dyn AutomationTransport>,
    python: Option<Arc<dyn AutomationTransport>>,
    console: Option<Arc<dyn AutomationTransport>>,
    timeouts: TransportTimeouts,
    health: Arc<HealthMonitor>,
}

impl TransportSelector {
    pub fn new(bridge: Arc<dyn AutomationTransport>, timeouts: TransportTimeouts, health: Arc<HealthMonitor>) -> Self {
        Self {
            bridge,
            python: None,
            console: None,
            timeouts,
            health,
        }
    }

    pub fn with_python(mut self, transport: Arc<dyn AutomationTransport>) -> Self {
        self.python = Some(transport);
        self
    }

    pub fn with_console(mut self, transport: Arc<dyn AutomationTransport>) -> Self {
        self.console = Some(transport);
        self
    }

    pub fn timeouts(&self) -> &TransportTimeouts {
        &self.timeouts
    }

    fn transport(&self, kind: TransportKind) -> Option<&Arc<dyn AutomationTransport>> {
        match kind {
            TransportKind::Bridge => Some(&self.bridge),
            TransportKind::Python => self.python.as_ref(),
            TransportKind::Console => self.console.as_ref(),
        }
    }

    fn secondary_for(class: ActionClass) -> Option<TransportKind> {
        match class {
            ActionClass::Script => Some(TransportKind::Python),
            ActionClass::Administrative => Some(TransportKind::Console),
            ActionClass::PrimaryOnly => None,
        }
    }

    pub async fn bridge_connected(&self) -> bool {
        self.bridge.is_connected().await
    }

    /// Whether any channel can reach the engine. Attempts a lazy bridge
    /// connection first, then pings the secondary channels.
    pub async fn ensure_connected(&self) -> bool {
        let mut connected = self.bridge.ensure_connected().await;
        if !connected {
            for secondary in [self.python.as_ref(), self.console.as_ref()].into_iter().flatten() {
                if secondary.is_connected().await {
                    debug!("Engine reachable through {} channel", secondary.kind());
                    connected = true;
                    break;
                }
            }
        }
        if connected {
            self.health.record_connection();
        }
        connected
    }

    /// Choose the transport for one call
    pub fn decide(&self, requested: Option<&str>, bridge_connected: bool) -> Result<TransportDecision> {
        match TransportKind::parse_requested(requested)? {
            Some(TransportKind::Bridge) if !bridge_connected => Err(RelayError::not_connected(
                "Automation bridge is not connected; omit 'transport' to allow fallback",
            )),
            Some(kind) => {
                if self.transport(kind).is_none() {
                    return Err(RelayError::not_connected(format!("The {} channel is not configured", kind)));
                }
                Ok(TransportDecision::explicit(kind))
            }
            None if bridge_connected => Ok(TransportDecision::implicit(None)),
            None => Ok(TransportDecision::implicit(Some(
                "automation bridge is not connected".to_string(),
            ))),
        }
    }

    /// Decide and execute. Every outcome, including a rejected transport name,
    /// comes back as an envelope.
    pub async fn run(&self, requested: Option<&str>, class: ActionClass, request: &TransportRequest) -> TransportEnvelope {
        let bridge_connected = self.bridge_connected().await;
        match self.decide(requested, bridge_connected) {
            Ok(decision) => self.execute(&decision, class, request).await,
            Err(e) => {
                warn!("Transport selection failed for {}: {}", request.action, e);
                self.record_failure(&e);
                TransportEnvelope::failure(&e, None, Vec::new())
            }
        }
    }

    /// Execute a decision, falling back at most once
    pub async fn execute(&self, decision: &TransportDecision, class: ActionClass, request: &TransportRequest) -> TransportEnvelope {
        if decision.allow_fallback {
            if let Some(reason) = &decision.fallback_reason {
                return self.fall_back(decision.primary, class, request, reason).await;
            }
        }

        match self.attempt(decision.primary, request).await {
            Ok(response) => TransportEnvelope::from_response(response, decision.primary, Vec::new()),
            Err(e) if decision.allow_fallback && e.is_retryable() => {
                warn!("{} failed for {}: {}", decision.primary, request.action, e);
                self.record_failure(&e);
                self.fall_back(decision.primary, class, request, &e.to_string()).await
            }
            Err(e) => {
                self.record_failure(&e);
                TransportEnvelope::failure(&e, Some(decision.primary), Vec::new())
            }
        }
    }

    async fn fall_back(
        &self,
        primary: TransportKind,
        class: ActionClass,
        request: &TransportRequest,
        reason: &str,
    ) -> TransportEnvelope {
        let secondary = match Self::secondary_for(class).filter(|kind| self.transport(*kind).is_some()) {
            Some(kind) => kind,
            None => {
                let err = RelayError::not_connected(format!(
                    "Action '{}' requires the {} and no fallback channel is available ({})",
                    request.action, primary, reason
                ));
                self.record_failure(&err);
                return TransportEnvelope::failure(&err, None, Vec::new());
            }
        };

        let warning = format!("{} unavailable ({}); fell back to the {} channel", primary, reason, secondary);
        info!("{}", warning);
        let warnings = vec![warning];

        match self.attempt(secondary, request).await {
            Ok(response) => TransportEnvelope::from_response(response, secondary, warnings),
            Err(e) => {
                warn!("Fallback {} failed for {}: {}", secondary, request.action, e);
                self.record_failure(&e);
                TransportEnvelope::failure(&e, Some(secondary), warnings)
            }
        }
    }

    async fn attempt(&self, kind: TransportKind, request: &TransportRequest) -> Result<TransportResponse> {
        let transport = self
            .transport(kind)
            .ok_or_else(|| RelayError::not_connected(format!("The {} channel is not configured", kind)))?;

        if kind == TransportKind::Console {
            let command = request.console_command().ok_or_else(|| {
                RelayError::validation(format!(
                    "Action '{}' has no console equivalent; provide a 'command' argument",
                    request.action
                ))
            })?;
            CommandFilter::validate(&command)?;
        }

        let timeout = self.timeouts.get_timeout(kind, request.timeout_ms);
        debug!("Sending {} via {} (timeout {:?})", request.action, kind, timeout);
        transport.send(request, timeout).await
    }

    fn record_failure(&self, error: &RelayError) {
        self.health
            .record_error(TRANSPORT_SCOPE, error.code(), error.to_string(), error.is_retryable());
    }
}
