//! core
//!
//! Domain types, run context, and configuration.
//!
//! This layer has no knowledge of git, fixtures, or the workflow runner;
//! everything above depends on it and it depends on nothing above.

pub mod config;
pub mod context;
pub mod types;

pub use config::HarnessConfig;
pub use context::RunContext;
pub use types::{BranchName, Sha, TagName};
