//! Tool discovery
//!
//! Per-client visibility of registry entries.

pub mod visibility;

pub use visibility::{filter_tools, CategorySelection, VisibilityFilter, ALL_CATEGORIES};
