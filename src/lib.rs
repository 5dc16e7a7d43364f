//! gitrig - an integration-test harness for git-state-dependent automation
//!
//! gitrig exercises a release-automation workflow (version bumping, tagging,
//! branch creation) against synthetic repository histories, without risking
//! the real repository and without network access to a VCS host.
//!
//! # Architecture
//!
//! The codebase follows a strict layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates down)
//! - [`orchestrator`] - Sequences backup, scenario, steps, cleanup, restore
//! - [`fixture`] - JSON test documents with tagged-union steps
//! - [`scenario`] - Declarative synthetic ref-states and their application
//! - [`snapshot`] - Lossless backup/restore of tag and branch state
//! - [`validate`] - Closed set of declarative checks over ref-state
//! - [`runner`] - Adapter for the containerized workflow runner
//! - [`git`] - Single interface for all Git operations
//! - [`proc`] - Single seam for all subprocess execution
//! - [`core`] - Domain types, run context, configuration
//! - [`ui`] - Console output utilities
//!
//! # Correctness Invariants
//!
//! 1. Every SHA a snapshot records is resolvable before any ref that uses
//!    it is recreated (bundle unpack precedes ref restoration)
//! 2. Restore always runs, even when a test aborts; the repository is
//!    never stranded in scenario state
//! 3. Unknown scenario names, check types, and step actions fail at parse
//!    or lookup time, before any side effect
//! 4. Scenario tags always point at commits the scenario itself created

pub mod cli;
pub mod core;
pub mod fixture;
pub mod git;
pub mod orchestrator;
pub mod proc;
pub mod runner;
pub mod scenario;
pub mod snapshot;
pub mod ui;
pub mod validate;
