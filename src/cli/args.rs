//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! Available on all commands:
//! - `--cwd <path>`: Run as if started in that directory
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// gitrig - exercise release automation against synthetic git histories
#[derive(Parser, Debug)]
#[command(name = "gitrig")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if gitrig was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test fixtures against the repository
    #[command(
        name = "run",
        long_about = "Run test fixtures against the repository.\n\n\
            Each fixture is backed up, applied, executed, and restored in turn; \
            the repository's ref-state after a run is identical to its state \
            before, even when a test fails. Exactly one of --fixture, --name, \
            or --all selects what runs.",
        after_help = "\
EXAMPLES:
    # Run every fixture in the configured fixtures directory
    gitrig run --all

    # Run one fixture by file path
    gitrig run --fixture tests/fixtures/major-bump.json

    # Run one fixture by (fuzzy) name
    gitrig run --name major

    # Stop at the first failure, keep scenario state for inspection
    gitrig run --all --stop-on-failure --skip-cleanup"
    )]
    Run {
        /// Run a single fixture file
        #[arg(long, value_name = "PATH", conflicts_with_all = ["name", "all"])]
        fixture: Option<PathBuf>,

        /// Run the fixture whose name matches (exact, then substring)
        #[arg(long, value_name = "PATTERN", conflicts_with = "all")]
        name: Option<String>,

        /// Run every discovered fixture
        #[arg(long)]
        all: bool,

        /// Skip the ref-state backup (and therefore the restore)
        #[arg(long)]
        skip_backup: bool,

        /// Skip fixture cleanup actions
        #[arg(long)]
        skip_cleanup: bool,

        /// Halt the suite after the first failing test
        #[arg(long)]
        stop_on_failure: bool,
    },

    /// List discovered fixtures
    #[command(name = "fixtures")]
    Fixtures,

    /// Inspect and drive scenarios directly
    #[command(subcommand)]
    Scenario(ScenarioCommand),

    /// Inspect and drive ref-state snapshots directly
    #[command(subcommand)]
    Snapshot(SnapshotCommand),
}

/// Scenario subcommands, for manual debugging outside a fixture run.
#[derive(Subcommand, Debug)]
pub enum ScenarioCommand {
    /// List scenarios in the built-in catalog
    List,

    /// Apply a scenario to the repository
    Apply {
        /// Scenario name
        name: String,

        /// Delete all pre-existing tags first
        #[arg(long)]
        clean_state: bool,

        /// Re-point existing tags and recreate existing branches
        #[arg(long)]
        force: bool,
    },

    /// Validate current ref-state against a scenario
    Validate {
        /// Scenario name
        name: String,

        /// Also flag undeclared tags and branches
        #[arg(long)]
        strict: bool,
    },
}

/// Snapshot subcommands, primarily for manual recovery.
#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Capture the repository's ref-state under a name
    Backup {
        /// Snapshot name
        name: String,
    },

    /// Restore a named snapshot into the repository
    Restore {
        /// Snapshot name
        name: String,

        /// Overwrite refs that already exist
        #[arg(long)]
        force: bool,

        /// Delete all current tags before recreating
        #[arg(long)]
        delete_existing_tags: bool,
    },

    /// List snapshots on disk
    List,
}
