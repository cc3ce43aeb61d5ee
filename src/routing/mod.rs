//! Routing of tool calls to the engine
//!
//! Argument validation, handler dispatch, transport selection, and the
//! concrete transports behind it.

pub mod arguments;
pub mod bridge;
pub mod handler;
pub mod remote_control;
pub mod router;
pub mod selector;
pub mod timeout;
pub mod transport;
pub mod types;

pub use arguments::{ArgumentValidator, ToolArguments, ValidatedCall};
pub use bridge::{AutomationBridge, BridgeConfig, ConnectionState};
pub use handler::{AutomationForwarder, HandlerRegistry, ToolHandler};
pub use remote_control::{RemoteControlClient, RemoteControlConfig, RemoteControlTransport};
pub use router::InvocationRouter;
pub use selector::TransportSelector;
pub use timeout::TransportTimeouts;
pub use transport::AutomationTransport;
pub use types::*;
