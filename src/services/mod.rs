//! Services backing built-in tools

pub mod pipeline;
pub mod project;
pub mod system_control;
pub mod tool_management;

pub use pipeline::PipelineHandler;
pub use project::ProjectConfig;
pub use system_control::SystemControlHandler;
pub use tool_management::{ManagementAction, ToolManagementService, MANAGEMENT_ACTIONS};
