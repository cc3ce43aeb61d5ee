//! Transport abstraction

use crate::error::Result;
use crate::routing::types::{TransportKind, TransportRequest, TransportResponse};
use async_trait::async_trait;
use std::time::Duration;

/// A channel that can execute an action against the automation runtime
#[async_trait]
pub trait AutomationTransport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether a request sent now could reach the runtime without reconnecting
    async fn is_connected(&self) -> bool;

    /// Try to (re)establish the channel. Returns whether it is usable afterwards.
    async fn ensure_connected(&self) -> bool {
        self.is_connected().await
    }

    /// One round trip bounded by `timeout`. Transport failures and timeouts come
    /// back as retryable errors; a runtime-reported failure is an `Ok` response
    /// with `success == false`.
    async fn send(&self, request: &TransportRequest, timeout: Duration) -> Result<TransportResponse>;
}
