//! Storage module for TaskRunner
//!
//! - `json`: JSON documents on disk (task state, configuration files)

mod json;

pub use json::JsonStore;
