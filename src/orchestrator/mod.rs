//! orchestrator
//!
//! Sequences one test: backup, scenario, steps, cleanup, restore, report.
//!
//! # Lifecycle
//!
//! ```text
//! Idle -> BackedUp -> RunningSteps(i) -> CleanedUp -> Restored -> Reported
//! ```
//!
//! Restore occupies a guaranteed-execution position: it runs whether the
//! step loop finished, failed an assertion, or aborted on a setup error.
//! A restore failure is logged with manual-recovery guidance instead of
//! being thrown - by that point the test verdict is already determined,
//! and propagating would both skip result reporting and strand the
//! repository in test state for every subsequent test.
//!
//! # Error taxonomy
//!
//! - Setup failures (backup or scenario construction) fail the current
//!   test and transition straight to restore.
//! - Failed validation checks and workflow mismatches are recorded step
//!   failures; later steps still run unless `stop_on_failure`.
//! - Configuration errors (unknown scenario, unknown check, unknown step
//!   action) surface immediately as step errors with the full diagnostic;
//!   check and action errors are actually caught earlier, at fixture parse.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config::HarnessConfig;
use crate::core::context::RunContext;
use crate::fixture::{CleanupSpec, Step, TestFixture};
use crate::git::GitCli;
use crate::proc::{ProcessRequest, ProcessRunner};
use crate::runner::WorkflowRunner;
use crate::scenario::ScenarioCatalog;
use crate::snapshot::{RefSnapshot, RestoreOptions, SnapshotStore};
use crate::ui::output::{self, format_duration, format_status, Verbosity};
use crate::validate::{CheckOutcome, ValidationEngine};

/// Orchestrator policy flags, straight from the CLI surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorOptions {
    pub skip_backup: bool,
    pub skip_cleanup: bool,
    pub stop_on_failure: bool,
}

/// Result of one executed step. Immutable once produced.
#[derive(Debug, Serialize)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
    /// Outcomes of nested validation checks, when the step ran any.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckOutcome>,
}

/// Result of one test. Immutable once produced.
#[derive(Debug, Serialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
}

/// The whole run, serialized to `logs/report.json`.
#[derive(Debug, Serialize)]
pub struct SuiteReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl SuiteReport {
    /// Whether every executed test passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Drives fixtures against one repository, strictly sequentially.
pub struct Orchestrator<'r> {
    runner: &'r dyn ProcessRunner,
    git: GitCli<'r>,
    workflow: WorkflowRunner<'r>,
    catalog: ScenarioCatalog,
    ctx: RunContext,
    config: HarnessConfig,
    opts: OrchestratorOptions,
    verbosity: Verbosity,
    repo_dir: PathBuf,
}

impl<'r> Orchestrator<'r> {
    /// Wire up an orchestrator for one repository.
    ///
    /// # Errors
    ///
    /// Fails only if the built-in scenario catalog is inconsistent.
    pub fn new(
        runner: &'r dyn ProcessRunner,
        repo_dir: PathBuf,
        config: HarnessConfig,
        ctx: RunContext,
        opts: OrchestratorOptions,
        verbosity: Verbosity,
    ) -> Result<Self, crate::scenario::ScenarioError> {
        let git = GitCli::new(runner, repo_dir.clone());
        let workflow = WorkflowRunner::new(runner, config.runner.clone(), repo_dir.clone());
        let catalog = ScenarioCatalog::builtin()?;
        Ok(Self {
            runner,
            git,
            workflow,
            catalog,
            ctx,
            config,
            opts,
            verbosity,
            repo_dir,
        })
    }

    /// Run a list of fixtures sequentially and write the JSON report.
    ///
    /// Exit polarity: the caller maps [`SuiteReport::all_passed`] to the
    /// process exit code.
    pub fn run_all(&self, fixtures: &[TestFixture]) -> SuiteReport {
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let result = self.run_fixture(fixture);
            output::print(
                format!(
                    "[{}] {} ({} ms)",
                    format_status(result.success),
                    result.name,
                    result.duration_ms
                ),
                self.verbosity,
            );
            let failed = !result.success;
            results.push(result);
            if failed && self.opts.stop_on_failure {
                break;
            }
        }
        let passed = results.iter().filter(|r| r.success).count();
        let failed = results.len() - passed;
        let report = SuiteReport {
            run_id: self.ctx.run_id.to_string(),
            started_at,
            finished_at: Utc::now(),
            passed,
            failed,
            results,
        };
        self.write_report(&report);
        report
    }

    /// Run one fixture through the full lifecycle.
    pub fn run_fixture(&self, fixture: &TestFixture) -> TestResult {
        let started = Instant::now();
        output::print(
            format!("=== {} - {}", fixture.name, fixture.description),
            self.verbosity,
        );

        let store = SnapshotStore::new(&self.git, self.ctx.backups_dir());
        let mut snapshot: Option<RefSnapshot> = None;
        if !self.opts.skip_backup {
            match store.backup(
                &fixture.name,
                self.config.snapshot.include_remote_branches,
            ) {
                Ok(snap) => {
                    output::debug(
                        format!(
                            "backed up {} tags, {} branches",
                            snap.tags.len(),
                            snap.branches.branches.len()
                        ),
                        self.verbosity,
                    );
                    snapshot = Some(snap);
                }
                Err(e) => {
                    // Setup failure: nothing was mutated, so there is
                    // nothing to restore.
                    return TestResult {
                        name: fixture.name.clone(),
                        success: false,
                        message: format!("backup failed: {e}"),
                        duration_ms: ms(started),
                        steps: Vec::new(),
                    };
                }
            }
        }

        let (steps, aborted) = self.run_steps(fixture);

        if !self.opts.skip_cleanup {
            if let Some(cleanup) = &fixture.cleanup {
                self.run_cleanup(cleanup);
            }
        }

        // Guaranteed-execution position: restore runs regardless of what
        // the step loop did.
        if let Some(snap) = &snapshot {
            self.restore_or_guide(&store, snap);
        }

        let success = !aborted && steps.iter().all(|s| s.success);
        let message = if success {
            "all steps passed".to_string()
        } else if aborted {
            "aborted on setup error".to_string()
        } else {
            let failed = steps.iter().filter(|s| !s.success).count();
            format!("{failed} step(s) failed")
        };
        TestResult {
            name: fixture.name.clone(),
            success,
            message,
            duration_ms: ms(started),
            steps,
        }
    }

    /// Execute the step list. Returns the results plus whether the loop
    /// aborted early on a setup error.
    fn run_steps(&self, fixture: &TestFixture) -> (Vec<StepResult>, bool) {
        let mut results = Vec::with_capacity(fixture.steps.len());
        for (index, step) in fixture.steps.iter().enumerate() {
            let result = self.run_step(index, step);
            output::debug(
                format!(
                    "step {} [{}]: {}",
                    index + 1,
                    format_status(result.success),
                    result.message
                ),
                self.verbosity,
            );
            let failed = !result.success;
            let setup_error = failed && matches!(step, Step::SetupGitState { .. });
            results.push(result);
            if setup_error {
                // A broken scenario leaves nothing meaningful for later
                // steps to assert against; go straight to restore.
                return (results, true);
            }
            if failed && self.opts.stop_on_failure {
                break;
            }
        }
        (results, false)
    }

    fn run_step(&self, index: usize, step: &Step) -> StepResult {
        let started = Instant::now();
        match step {
            Step::SetupGitState {
                scenario,
                clean_state,
                force,
            } => {
                let export_dir = self.ctx.exports_dir();
                match self
                    .catalog
                    .apply(&self.git, &export_dir, scenario, *clean_state, *force)
                {
                    Ok(apply) => {
                        let mut message = format!(
                            "applied '{scenario}': {} tags, {} branches",
                            apply.tags_created.len(),
                            apply.branches_created.len()
                        );
                        if !apply.production_tags_deleted.is_empty() {
                            message.push_str(&format!(
                                "; swept {} production tags",
                                apply.production_tags_deleted.len()
                            ));
                        }
                        if let Some(checkout) = &apply.checkout_error {
                            message.push_str(&format!("; checkout warning: {checkout}"));
                            output::warn(checkout, self.verbosity);
                        }
                        step_result(index, "setup-git-state", true, message, started)
                    }
                    Err(e) => step_result(
                        index,
                        "setup-git-state",
                        false,
                        format!("scenario apply failed: {e}"),
                        started,
                    ),
                }
            }

            Step::RunWorkflow {
                workflow,
                event,
                job,
                expect_failure,
                expected_outputs,
                expect_output_contains,
            } => {
                let workflow_path = self.config.paths.workflows_dir.join(workflow);
                let event_path = self.config.paths.events_dir.join(event);
                let invocation = self.workflow.invoke(
                    &workflow_path,
                    &event_path,
                    job.as_deref(),
                    &self.ctx.exports_dir(),
                );
                let (run, mount_warning) = match invocation {
                    Ok(pair) => pair,
                    Err(e) => {
                        return step_result(
                            index,
                            "run-workflow",
                            false,
                            format!("workflow runner failed to start: {e}"),
                            started,
                        )
                    }
                };
                if let Some(warning) = mount_warning {
                    output::warn(&warning, self.verbosity);
                }

                let mut failures = Vec::new();
                if run.success == *expect_failure {
                    failures.push(if *expect_failure {
                        format!("expected workflow failure but it exited {}", run.exit_code)
                    } else {
                        format!("workflow exited {}", run.exit_code)
                    });
                }
                for (key, expected) in expected_outputs {
                    match run.outputs.get(key) {
                        Some(actual) if actual == expected => {}
                        Some(actual) => failures.push(format!(
                            "output {key}={actual}, expected {expected}"
                        )),
                        None => failures.push(format!("output {key} missing")),
                    }
                }
                for needle in expect_output_contains {
                    if !run.raw_output.contains(needle) {
                        failures.push(format!("output does not contain '{needle}'"));
                    }
                }

                let success = failures.is_empty();
                let message = if success {
                    format!(
                        "workflow '{workflow}' behaved as expected ({} outputs, {})",
                        run.outputs.len(),
                        format_duration(run.duration)
                    )
                } else {
                    failures.join("; ")
                };
                step_result(index, "run-workflow", success, message, started)
            }

            Step::ValidateState { checks } => {
                let engine = ValidationEngine::new(&self.git);
                let outcomes: Vec<CheckOutcome> =
                    checks.iter().map(|check| engine.run(check)).collect();
                let success = outcomes.iter().all(|o| o.success);
                let message = if success {
                    format!("{} checks passed", outcomes.len())
                } else {
                    outcomes
                        .iter()
                        .filter(|o| !o.success)
                        .map(|o| o.message.clone())
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                StepResult {
                    name: format!("{}:validate-state", index + 1),
                    success,
                    message,
                    duration_ms: ms(started),
                    checks: outcomes,
                }
            }

            Step::ExecuteCommand { command } => {
                let req = self.shell_request(command);
                match self.runner.run(&req) {
                    Ok(out) if out.success() => step_result(
                        index,
                        "execute-command",
                        true,
                        format!("'{command}' succeeded"),
                        started,
                    ),
                    Ok(out) => step_result(
                        index,
                        "execute-command",
                        false,
                        format!(
                            "'{command}' exited {}: {}",
                            out.exit_code,
                            out.trimmed()
                        ),
                        started,
                    ),
                    Err(e) => step_result(
                        index,
                        "execute-command",
                        false,
                        format!("'{command}' failed to start: {e}"),
                        started,
                    ),
                }
            }

            Step::Comment { text } => {
                output::print(format!("# {text}"), self.verbosity);
                step_result(index, "comment", true, text.clone(), started)
            }
        }
    }

    /// Shell request for fixture commands. The state-dir variable is
    /// exported so a cooperating sub-script (including a nested `gitrig`
    /// invocation) finds this run's directory instead of generating its
    /// own.
    fn shell_request(&self, command: &str) -> ProcessRequest {
        ProcessRequest::new("sh", &["-c", command])
            .in_dir(&self.repo_dir)
            .with_env(
                crate::core::context::STATE_DIR_ENV,
                self.ctx.state_dir().to_string_lossy(),
            )
    }

    fn run_cleanup(&self, cleanup: &CleanupSpec) {
        for tag in &cleanup.delete_tags {
            if let Ok(name) = crate::core::types::TagName::new(tag.as_str()) {
                if matches!(self.git.tag_exists(&name), Ok(true)) {
                    if let Err(e) = self.git.delete_tag(&name) {
                        output::warn(format!("cleanup: {e}"), self.verbosity);
                    }
                }
            }
        }
        for branch in &cleanup.delete_branches {
            if let Ok(name) = crate::core::types::BranchName::new(branch.as_str()) {
                if matches!(self.git.branch_exists(&name), Ok(true)) {
                    if let Err(e) = self.git.delete_branch(&name) {
                        output::warn(format!("cleanup: {e}"), self.verbosity);
                    }
                }
            }
        }
        for command in &cleanup.commands {
            let req = self.shell_request(command);
            match self.runner.run(&req) {
                Ok(out) if !out.success() => output::warn(
                    format!("cleanup command '{command}' exited {}", out.exit_code),
                    self.verbosity,
                ),
                Err(e) => output::warn(
                    format!("cleanup command '{command}' failed to start: {e}"),
                    self.verbosity,
                ),
                Ok(_) => {}
            }
        }
    }

    /// Restore, logging guidance instead of propagating on failure.
    fn restore_or_guide(&self, store: &SnapshotStore<'_, '_>, snapshot: &RefSnapshot) {
        let opts = RestoreOptions {
            force: true,
            delete_existing_tags: true,
        };
        match store.restore(snapshot, opts) {
            Ok(stats) => {
                for warning in &stats.warnings {
                    output::warn(warning, self.verbosity);
                }
                output::debug(
                    format!(
                        "restored {} tags, {} branches ({} skipped)",
                        stats.tags_restored, stats.branches_restored, stats.branches_skipped
                    ),
                    self.verbosity,
                );
                // The snapshot has served its purpose; a failed restore
                // keeps it around for manual recovery instead.
                if let Err(e) = store.discard(&snapshot.name) {
                    output::warn(format!("could not discard snapshot: {e}"), self.verbosity);
                }
            }
            Err(e) => {
                output::error(format!(
                    "restore of snapshot '{}' failed: {e}",
                    snapshot.name
                ));
                let available = store.list().unwrap_or_default();
                output::error(format!(
                    "manual recovery: snapshots available under {}: [{}]; \
                     retry with `gitrig snapshot restore {}`",
                    self.ctx.backups_dir().display(),
                    available.join(", "),
                    snapshot.name
                ));
            }
        }
    }

    fn write_report(&self, report: &SuiteReport) {
        let path = self.ctx.logs_dir().join("report.json");
        match serde_json::to_string_pretty(report) {
            Ok(json) => {
                if let Err(e) = fs::write(&path, json) {
                    output::error(format!("failed to write report {}: {e}", path.display()));
                } else {
                    output::print(format!("report: {}", path.display()), self.verbosity);
                }
            }
            Err(e) => output::error(format!("failed to serialize report: {e}")),
        }
    }
}

fn ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn step_result(
    index: usize,
    action: &str,
    success: bool,
    message: String,
    started: Instant,
) -> StepResult {
    StepResult {
        name: format!("{}:{action}", index + 1),
        success,
        message,
        duration_ms: ms(started),
        checks: Vec::new(),
    }
}
