//! Capability registry for tool descriptors and their runtime state

pub mod catalogue;
pub mod service;
pub mod types;

pub use catalogue::{default_catalogue, MANAGE_TOOLS};
pub use service::CapabilityRegistry;
pub use types::*;
