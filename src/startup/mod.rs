//! Startup helpers

pub mod logger;

pub use logger::{StartupAdditionalInfo, StartupLogger};
