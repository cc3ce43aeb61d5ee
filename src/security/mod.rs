//! Security checks applied before anything reaches the engine

pub mod command_filter;

pub use command_filter::CommandFilter;
