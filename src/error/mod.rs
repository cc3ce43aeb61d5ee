//! Error handling module for the tool relay
//!
//! One error enum for the whole crate plus the programmatic codes surfaced to callers.

mod error;

pub use error::{ErrorCode, RelayError, Result};
