//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to the orchestrator / catalog / snapshot store
//! - Map the suite verdict to the process exit code
//!
//! The CLI layer is thin: it wires up the [`crate::proc::SystemRunner`],
//! the run context, and configuration, then dispatches. All repository
//! mutations happen behind the components it calls.

pub mod args;

pub use args::{Cli, Command, ScenarioCommand, SnapshotCommand};

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};

use crate::core::config::HarnessConfig;
use crate::core::context::RunContext;
use crate::fixture::{self, TestFixture};
use crate::git::GitCli;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::proc::SystemRunner;
use crate::scenario::ScenarioCatalog;
use crate::snapshot::{RestoreOptions, SnapshotStore};
use crate::ui::output::{self, Verbosity};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse_args();
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    let repo_dir = match &cli.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("cannot determine working directory")?,
    };
    let config = HarnessConfig::load(&repo_dir)?;
    let runner = SystemRunner;

    match cli.command {
        Command::Run {
            fixture,
            name,
            all,
            skip_backup,
            skip_cleanup,
            stop_on_failure,
        } => {
            let fixtures = select_fixtures(&repo_dir, &config, fixture, name, all)?;
            let ctx = RunContext::create().context("cannot create state directory")?;
            output::debug(
                format!("run {} state dir {}", ctx.run_id, ctx.state_dir().display()),
                verbosity,
            );
            let opts = OrchestratorOptions {
                skip_backup,
                skip_cleanup,
                stop_on_failure,
            };
            let orchestrator =
                Orchestrator::new(&runner, repo_dir, config, ctx, opts, verbosity)?;
            let report = orchestrator.run_all(&fixtures);
            output::print(
                format!("{} passed, {} failed", report.passed, report.failed),
                verbosity,
            );
            Ok(if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }

        Command::Fixtures => {
            let dir = repo_dir.join(&config.paths.fixtures_dir);
            let fixtures = fixture::discover(&dir)?;
            for fixture in &fixtures {
                output::print(
                    format!("{} - {}", fixture.name, fixture.description),
                    verbosity,
                );
            }
            if fixtures.is_empty() {
                output::print(format!("no fixtures under {}", dir.display()), verbosity);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Scenario(cmd) => scenario_command(cmd, &runner, &repo_dir, verbosity),

        Command::Snapshot(cmd) => {
            snapshot_command(cmd, &runner, &repo_dir, &config, verbosity)
        }
    }
}

fn select_fixtures(
    repo_dir: &std::path::Path,
    config: &HarnessConfig,
    fixture: Option<PathBuf>,
    name: Option<String>,
    all: bool,
) -> Result<Vec<TestFixture>> {
    if let Some(path) = fixture {
        return Ok(vec![TestFixture::load(&path)?]);
    }
    let dir = repo_dir.join(&config.paths.fixtures_dir);
    if let Some(pattern) = name {
        let fixtures = fixture::discover(&dir)?;
        return Ok(vec![fixture::select_by_name(fixtures, &pattern)?]);
    }
    if all {
        let fixtures = fixture::discover(&dir)?;
        if fixtures.is_empty() {
            bail!("no fixtures found under {}", dir.display());
        }
        return Ok(fixtures);
    }
    bail!("select fixtures with --fixture, --name, or --all");
}

fn scenario_command(
    cmd: ScenarioCommand,
    runner: &SystemRunner,
    repo_dir: &std::path::Path,
    verbosity: Verbosity,
) -> Result<ExitCode> {
    let catalog = ScenarioCatalog::builtin()?;
    let git = GitCli::new(runner, repo_dir);
    match cmd {
        ScenarioCommand::List => {
            for name in catalog.names() {
                let scenario = catalog.get(&name)?;
                output::print(format!("{name} - {}", scenario.description), verbosity);
            }
            Ok(ExitCode::SUCCESS)
        }
        ScenarioCommand::Apply {
            name,
            clean_state,
            force,
        } => {
            let ctx = RunContext::create().context("cannot create state directory")?;
            let result =
                catalog.apply(&git, &ctx.exports_dir(), &name, clean_state, force)?;
            output::print(
                format!(
                    "applied '{name}': {} tags created, {} branches created, exports in {}",
                    result.tags_created.len(),
                    result.branches_created.len(),
                    result.export_dir.display()
                ),
                verbosity,
            );
            if let Some(warning) = result.checkout_error {
                output::warn(warning, verbosity);
            }
            Ok(ExitCode::SUCCESS)
        }
        ScenarioCommand::Validate { name, strict } => {
            let report = catalog.validate(&git, &name, strict)?;
            for failure in &report.failures {
                output::error(failure);
            }
            for finding in &report.contamination {
                output::warn(finding, verbosity);
            }
            if report.passed() {
                output::print(format!("scenario '{name}' state is valid"), verbosity);
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn snapshot_command(
    cmd: SnapshotCommand,
    runner: &SystemRunner,
    repo_dir: &std::path::Path,
    config: &HarnessConfig,
    verbosity: Verbosity,
) -> Result<ExitCode> {
    let git = GitCli::new(runner, repo_dir);
    let ctx = RunContext::create().context("cannot create state directory")?;
    let store = SnapshotStore::new(&git, ctx.backups_dir());
    match cmd {
        SnapshotCommand::Backup { name } => {
            let snapshot = store.backup(&name, config.snapshot.include_remote_branches)?;
            output::print(
                format!(
                    "snapshot '{name}': {} tags, {} branches, artifacts in {}",
                    snapshot.tags.len(),
                    snapshot.branches.branches.len(),
                    store.snapshot_dir(&name).display()
                ),
                verbosity,
            );
            Ok(ExitCode::SUCCESS)
        }
        SnapshotCommand::Restore {
            name,
            force,
            delete_existing_tags,
        } => {
            let snapshot = store.load(&name)?;
            let stats = store.restore(
                &snapshot,
                RestoreOptions {
                    force,
                    delete_existing_tags,
                },
            )?;
            for warning in &stats.warnings {
                output::warn(warning, verbosity);
            }
            output::print(
                format!(
                    "restored {} tags, {} branches ({} tags / {} branches skipped)",
                    stats.tags_restored,
                    stats.branches_restored,
                    stats.tags_skipped,
                    stats.branches_skipped
                ),
                verbosity,
            );
            Ok(ExitCode::SUCCESS)
        }
        SnapshotCommand::List => {
            for name in store.list()? {
                output::print(name, verbosity);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
