//! MCP (Model Context Protocol) implementation
//!
//! Wire types, the stdio session server, client profiles, elicitation,
//! list-changed notifications, and the health resource.

pub mod elicitation;
pub mod notifications;
pub mod resources;
pub mod server;
pub mod session;
pub mod types;

pub use elicitation::{ElicitationCoordinator, Elicitor};
pub use notifications::{ListChangedNotifier, NotificationSink};
pub use resources::{HealthResource, ResourceManager, ResourceProvider, HEALTH_URI};
pub use server::{McpServer, Outbound, ServerSettings, StdioElicitor};
pub use session::ClientProfile;
pub use types::*;
