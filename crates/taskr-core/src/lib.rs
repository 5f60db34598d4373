//! taskr-core: per-user task management with a conversational assistant
//!
//! This crate provides the task and conversation stores, the five-tool
//! resolver (add/list/complete/delete/update), the dispatcher that maps
//! model tool calls onto the resolver, and the chat orchestrator that
//! drives the two-call model loop.

pub mod chat;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod model;
pub mod models;
pub mod schema;
pub mod tools;

pub use config::Config;
pub use db::Database;
pub use error::Error;
pub use error::Result;

/// Application name used for config directories and paths.
pub const APP_NAME: &str = "taskr";

/// Returns the environment variable prefix for this application.
pub fn env_prefix() -> String {
    "TASKR".to_string()
}
