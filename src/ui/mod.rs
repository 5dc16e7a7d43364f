//! ui
//!
//! Console output utilities.

pub mod output;

pub use output::Verbosity;
