//! End-to-end orchestrator tests.
//!
//! Git commands hit a real repository; the workflow runner is faked at the
//! subprocess seam so no container runtime is needed.

mod common;

use std::cell::RefCell;
use std::io;
use std::path::Path;

use common::TestRepo;

use gitrig::core::config::HarnessConfig;
use gitrig::core::context::RunContext;
use gitrig::fixture::TestFixture;
use gitrig::orchestrator::{Orchestrator, OrchestratorOptions};
use gitrig::proc::{ProcessOutput, ProcessRequest, ProcessRunner, SystemRunner};
use gitrig::ui::output::Verbosity;
use tempfile::TempDir;

/// Routes `act` invocations to a canned response and everything else
/// (git, sh) to the real system.
struct FakeActRunner {
    system: SystemRunner,
    act_exit: i32,
    act_output: String,
    act_calls: RefCell<Vec<ProcessRequest>>,
}

impl FakeActRunner {
    fn new(act_exit: i32, act_output: &str) -> Self {
        Self {
            system: SystemRunner,
            act_exit,
            act_output: act_output.to_string(),
            act_calls: RefCell::new(Vec::new()),
        }
    }
}

impl ProcessRunner for FakeActRunner {
    fn run(&self, req: &ProcessRequest) -> io::Result<ProcessOutput> {
        if req.program == "act" {
            self.act_calls.borrow_mut().push(req.clone());
            return Ok(ProcessOutput {
                exit_code: self.act_exit,
                output: self.act_output.clone(),
            });
        }
        self.system.run(req)
    }
}

fn load_fixture(dir: &Path, body: &str) -> TestFixture {
    let path = dir.join("fixture.json");
    std::fs::write(&path, body).unwrap();
    TestFixture::load(&path).unwrap()
}

fn orchestrator<'r>(
    runner: &'r dyn ProcessRunner,
    repo: &TestRepo,
    ctx: RunContext,
) -> Orchestrator<'r> {
    Orchestrator::new(
        runner,
        repo.path().to_path_buf(),
        HarnessConfig::default(),
        ctx,
        OrchestratorOptions::default(),
        Verbosity::Quiet,
    )
    .unwrap()
}

const MAJOR_BUMP_FIXTURE: &str = r#"{
    "name": "major-bump",
    "description": "v0.2.1 history bumps to 1.0.0",
    "steps": [
        { "action": "setup-git-state", "scenario": "MajorBumpV0ToV1" },
        { "action": "run-workflow", "workflow": "release.yml",
          "event": "push-main.json",
          "expected_outputs": { "VERSION": "1.0.0" } },
        { "action": "validate-state", "checks": [
            { "type": "tag-exists", "tag": "v0.2.1" },
            { "type": "version-progression",
              "from": "0.2.1", "to": "1.0.0", "bump_type": "major" }
        ] },
        { "action": "comment", "text": "done" }
    ]
}"#;

#[test]
fn passing_fixture_runs_all_steps_and_restores() {
    let repo = TestRepo::new();
    let original_head = repo.head();
    repo.git(&["tag", "production-tag"]);

    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(fixtures_dir.path(), MAJOR_BUMP_FIXTURE);

    let runner = FakeActRunner::new(0, "setup...\nOUTPUT: VERSION=1.0.0\ndone\n");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);

    let report = orch.run_all(std::slice::from_ref(&fixture));
    assert_eq!(report.passed, 1, "results: {:?}", report.results);
    assert_eq!(report.failed, 0);
    let result = &report.results[0];
    assert!(result.success, "{}", result.message);
    assert_eq!(result.steps.len(), 4);
    assert!(result.steps.iter().all(|s| s.success));

    // The workflow runner was actually invoked, in the repository.
    let calls = runner.act_calls.borrow();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].cwd.as_deref(), Some(repo.path()));

    // Scenario state is gone, production state is back, and the consumed
    // snapshot was discarded.
    assert_eq!(repo.tag_names(), vec!["production-tag"]);
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.head(), original_head);
    assert!(!state.path().join("state/backups/major-bump").exists());
}

#[test]
fn report_json_is_written_with_step_detail() {
    let repo = TestRepo::new();
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(fixtures_dir.path(), MAJOR_BUMP_FIXTURE);

    let runner = FakeActRunner::new(0, "OUTPUT: VERSION=1.0.0\n");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let logs_dir = ctx.logs_dir();
    let run_id = ctx.run_id.to_string();
    let orch = orchestrator(&runner, &repo, ctx);
    orch.run_all(std::slice::from_ref(&fixture));

    let report_path = logs_dir.join("report.json");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(json["run_id"], run_id.as_str());
    assert_eq!(json["passed"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["results"][0]["name"], "major-bump");
    assert_eq!(json["results"][0]["steps"][0]["name"], "1:setup-git-state");
    // The validate step carries its per-check outcomes.
    let checks = &json["results"][0]["steps"][2]["checks"];
    assert_eq!(checks.as_array().unwrap().len(), 2);
}

#[test]
fn expect_failure_inverts_workflow_polarity() {
    let repo = TestRepo::new();
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(
        fixtures_dir.path(),
        r#"{
            "name": "bad-input-rejected",
            "steps": [
                { "action": "run-workflow", "workflow": "release.yml",
                  "event": "push-bad.json", "expect_failure": true,
                  "expect_output_contains": ["invalid tag"] }
            ]
        }"#,
    );

    let runner = FakeActRunner::new(1, "error: invalid tag format\n");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);
    assert!(result.success, "{}", result.message);

    // Same fixture against a runner that unexpectedly succeeds.
    let runner = FakeActRunner::new(0, "error: invalid tag format\n");
    let ctx = RunContext::at(state.path().join("state2")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);
    assert!(!result.success);
    assert!(result.steps[0].message.contains("expected workflow failure"));
}

#[test]
fn mismatched_output_fails_the_step_but_still_restores() {
    let repo = TestRepo::new();
    repo.git(&["tag", "keep-me"]);
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(fixtures_dir.path(), MAJOR_BUMP_FIXTURE);

    let runner = FakeActRunner::new(0, "OUTPUT: VERSION=2.0.0\n");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);

    assert!(!result.success);
    let workflow_step = &result.steps[1];
    assert!(!workflow_step.success);
    assert!(workflow_step.message.contains("VERSION=2.0.0"));
    // Later steps still ran (no stop_on_failure).
    assert_eq!(result.steps.len(), 4);
    // Restore still put the repository back.
    assert_eq!(repo.tag_names(), vec!["keep-me"]);
}

#[test]
fn setup_failure_aborts_straight_to_restore() {
    let repo = TestRepo::new();
    repo.git(&["tag", "keep-me"]);
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(
        fixtures_dir.path(),
        r#"{
            "name": "broken-setup",
            "steps": [
                { "action": "setup-git-state", "scenario": "NoSuchScenario" },
                { "action": "comment", "text": "never reached" }
            ]
        }"#,
    );

    let runner = FakeActRunner::new(0, "");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);

    assert!(!result.success);
    assert_eq!(result.message, "aborted on setup error");
    assert_eq!(result.steps.len(), 1, "the comment step must not run");
    assert!(result.steps[0].message.contains("NoSuchScenario"));
    assert_eq!(repo.tag_names(), vec!["keep-me"]);
}

#[test]
fn execute_command_and_cleanup_round_out_the_lifecycle() {
    let repo = TestRepo::new();
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let fixture = load_fixture(
        fixtures_dir.path(),
        r#"{
            "name": "command-and-cleanup",
            "steps": [
                { "action": "execute-command", "command": "git tag v1.0.0" },
                { "action": "validate-state", "checks": [
                    { "type": "tag-exists", "tag": "v1.0.0" } ] }
            ],
            "cleanup": { "delete_tags": ["v1.0.0"] }
        }"#,
    );

    let runner = FakeActRunner::new(0, "");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);

    assert!(result.success, "{}", result.message);
    // Cleanup (and the restore sweep) removed the tag the command created.
    assert!(repo.tag_names().is_empty());
}

#[test]
fn state_dir_is_exported_to_fixture_commands() {
    let repo = TestRepo::new();
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    // A cooperating sub-script must find this run's state directory in the
    // environment instead of generating its own.
    let fixture = load_fixture(
        fixtures_dir.path(),
        r#"{
            "name": "cooperating-subcommand",
            "steps": [
                { "action": "execute-command",
                  "command": "test -n \"$GITRIG_STATE_DIR\" && printf '%s' \"$GITRIG_STATE_DIR\" > step-env.txt" }
            ],
            "cleanup": {
                "commands": ["printf '%s' \"$GITRIG_STATE_DIR\" > cleanup-env.txt"]
            }
        }"#,
    );

    let runner = FakeActRunner::new(0, "");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let expected = ctx.state_dir().to_path_buf();
    let orch = orchestrator(&runner, &repo, ctx);
    let result = orch.run_fixture(&fixture);

    assert!(result.success, "{}", result.message);
    let step_env = std::fs::read_to_string(repo.path().join("step-env.txt")).unwrap();
    assert_eq!(std::path::PathBuf::from(step_env), expected);
    let cleanup_env = std::fs::read_to_string(repo.path().join("cleanup-env.txt")).unwrap();
    assert_eq!(std::path::PathBuf::from(cleanup_env), expected);
}

#[test]
fn stop_on_failure_halts_the_suite() {
    let repo = TestRepo::new();
    let state = TempDir::new().unwrap();
    let fixtures_dir = TempDir::new().unwrap();
    let failing = load_fixture(
        fixtures_dir.path(),
        r#"{
            "name": "fails-first",
            "steps": [
                { "action": "execute-command", "command": "false" }
            ]
        }"#,
    );
    let never_run = load_fixture(
        fixtures_dir.path(),
        r#"{ "name": "never-run", "steps": [
            { "action": "comment", "text": "unreached" } ] }"#,
    );

    let runner = FakeActRunner::new(0, "");
    let ctx = RunContext::at(state.path().join("state")).unwrap();
    let orch = Orchestrator::new(
        &runner,
        repo.path().to_path_buf(),
        HarnessConfig::default(),
        ctx,
        OrchestratorOptions {
            stop_on_failure: true,
            ..Default::default()
        },
        Verbosity::Quiet,
    )
    .unwrap();

    let report = orch.run_all(&[failing, never_run]);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.failed, 1);
    assert!(!report.all_passed());
}
