//! fixture
//!
//! JSON test fixture documents.
//!
//! # Shape
//!
//! A fixture describes one end-to-end test as an ordered list of steps:
//!
//! ```json
//! {
//!   "name": "major-bump",
//!   "description": "v0.2.1 history bumps to 1.0.0",
//!   "tags": ["release"],
//!   "steps": [
//!     { "action": "setup-git-state", "scenario": "MajorBumpV0ToV1" },
//!     { "action": "run-workflow", "workflow": "release.yml",
//!       "event": "push-main.json",
//!       "expected_outputs": { "VERSION": "1.0.0" } },
//!     { "action": "validate-state", "checks": [
//!       { "type": "tag-exists", "tag": "v1.0.0" } ] }
//!   ],
//!   "cleanup": { "delete_tags": ["v1.0.0"] }
//! }
//! ```
//!
//! # Fail-fast parsing
//!
//! Step actions and validation-check types are closed sets resolved at
//! parse time. An unknown `action` or check `type` is a configuration
//! error raised before any step runs; it is never downgraded to a failed
//! assertion.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::validate::{Check, CheckError};

/// Errors from fixture loading and selection.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse fixture '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    /// A validation check inside the fixture is malformed.
    #[error("in fixture '{path}': {source}")]
    Check {
        path: PathBuf,
        source: CheckError,
    },

    #[error("no fixture matches '{pattern}'; available: {}", available.join(", "))]
    NoMatch {
        pattern: String,
        available: Vec<String>,
    },

    #[error("pattern '{pattern}' is ambiguous; matches: {}", matches.join(", "))]
    Ambiguous {
        pattern: String,
        matches: Vec<String>,
    },

    #[error("fixture directory '{path}' cannot be read: {source}")]
    Discover {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Cleanup actions run after the step loop, before restore.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CleanupSpec {
    /// Tags the workflow-under-test may have created.
    pub delete_tags: Vec<String>,
    /// Branches the workflow-under-test may have created.
    pub delete_branches: Vec<String>,
    /// Arbitrary shell commands (run via `sh -c`).
    pub commands: Vec<String>,
}

/// One step of a fixture, fully typed.
#[derive(Debug, Clone)]
pub enum Step {
    /// Materialize a named scenario.
    SetupGitState {
        scenario: String,
        clean_state: bool,
        force: bool,
    },
    /// Invoke the workflow runner and assert on its result.
    RunWorkflow {
        workflow: String,
        event: String,
        job: Option<String>,
        /// Polarity: the step passes when the runner fails.
        expect_failure: bool,
        /// Output-marker keys that must be present with these values.
        expected_outputs: BTreeMap<String, String>,
        /// Substrings that must appear somewhere in the raw output.
        expect_output_contains: Vec<String>,
    },
    /// Run declarative checks against current ref-state.
    ValidateState { checks: Vec<Check> },
    /// Run an arbitrary shell command; nonzero exit fails the step.
    ExecuteCommand { command: String },
    /// Free text, recorded in the report, always succeeds.
    Comment { text: String },
}

/// Wire form of a step. Checks stay raw JSON here so check-type errors can
/// be reported through [`CheckError`] instead of a generic serde message.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
enum RawStep {
    SetupGitState {
        scenario: String,
        #[serde(default = "default_true")]
        clean_state: bool,
        #[serde(default = "default_true")]
        force: bool,
    },
    RunWorkflow {
        workflow: String,
        event: String,
        #[serde(default)]
        job: Option<String>,
        #[serde(default)]
        expect_failure: bool,
        #[serde(default)]
        expected_outputs: BTreeMap<String, String>,
        #[serde(default)]
        expect_output_contains: Vec<String>,
    },
    ValidateState {
        checks: Vec<serde_json::Value>,
    },
    ExecuteCommand {
        command: String,
    },
    Comment {
        text: String,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFixture {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
    steps: Vec<RawStep>,
    #[serde(default)]
    cleanup: Option<CleanupSpec>,
}

/// One end-to-end test document.
#[derive(Debug, Clone)]
pub struct TestFixture {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub steps: Vec<Step>,
    pub cleanup: Option<CleanupSpec>,
    /// Where the fixture was loaded from, for report detail.
    pub path: PathBuf,
}

impl TestFixture {
    /// Load and fully validate one fixture file.
    ///
    /// # Errors
    ///
    /// Read, parse, and check-type errors; all are configuration errors
    /// surfaced before any step executes.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawFixture =
            serde_json::from_str(&text).map_err(|e| FixtureError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut steps = Vec::with_capacity(raw.steps.len());
        for step in raw.steps {
            steps.push(match step {
                RawStep::SetupGitState {
                    scenario,
                    clean_state,
                    force,
                } => Step::SetupGitState {
                    scenario,
                    clean_state,
                    force,
                },
                RawStep::RunWorkflow {
                    workflow,
                    event,
                    job,
                    expect_failure,
                    expected_outputs,
                    expect_output_contains,
                } => Step::RunWorkflow {
                    workflow,
                    event,
                    job,
                    expect_failure,
                    expected_outputs,
                    expect_output_contains,
                },
                RawStep::ValidateState { checks } => {
                    let mut parsed = Vec::with_capacity(checks.len());
                    for value in &checks {
                        parsed.push(Check::from_value(value).map_err(|source| {
                            FixtureError::Check {
                                path: path.to_path_buf(),
                                source,
                            }
                        })?);
                    }
                    Step::ValidateState { checks: parsed }
                }
                RawStep::ExecuteCommand { command } => Step::ExecuteCommand { command },
                RawStep::Comment { text } => Step::Comment { text },
            });
        }

        Ok(Self {
            name: raw.name,
            description: raw.description,
            tags: raw.tags,
            steps,
            cleanup: raw.cleanup,
            path: path.to_path_buf(),
        })
    }
}

/// Load every `*.json` fixture under a directory, sorted by file name.
///
/// # Errors
///
/// Directory read failures and any individual fixture error.
pub fn discover(dir: &Path) -> Result<Vec<TestFixture>, FixtureError> {
    let entries = fs::read_dir(dir).map_err(|source| FixtureError::Discover {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| FixtureError::Discover {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    paths.iter().map(|path| TestFixture::load(path)).collect()
}

/// Select one fixture by fuzzy name: exact match first, then unique
/// case-insensitive substring.
///
/// # Errors
///
/// `FixtureError::NoMatch` listing every fixture, or
/// `FixtureError::Ambiguous` listing the candidates.
pub fn select_by_name(
    fixtures: Vec<TestFixture>,
    pattern: &str,
) -> Result<TestFixture, FixtureError> {
    if let Some(exact) = fixtures.iter().position(|f| f.name == pattern) {
        let mut fixtures = fixtures;
        return Ok(fixtures.swap_remove(exact));
    }
    let needle = pattern.to_lowercase();
    let matches: Vec<usize> = fixtures
        .iter()
        .enumerate()
        .filter(|(_, f)| f.name.to_lowercase().contains(&needle))
        .map(|(i, _)| i)
        .collect();
    match matches.as_slice() {
        [] => Err(FixtureError::NoMatch {
            pattern: pattern.to_string(),
            available: fixtures.iter().map(|f| f.name.clone()).collect(),
        }),
        [index] => {
            let mut fixtures = fixtures;
            Ok(fixtures.swap_remove(*index))
        }
        many => Err(FixtureError::Ambiguous {
            pattern: pattern.to_string(),
            matches: many
                .iter()
                .map(|&i| fixtures[i].name.clone())
                .collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(dir: &Path, file: &str, body: &str) -> PathBuf {
        let path = dir.join(file);
        fs::write(&path, body).unwrap();
        path
    }

    const VALID: &str = r#"{
        "name": "major-bump",
        "description": "v0.2.1 bumps to 1.0.0",
        "steps": [
            { "action": "setup-git-state", "scenario": "MajorBumpV0ToV1" },
            { "action": "run-workflow", "workflow": "release.yml",
              "event": "push-main.json",
              "expected_outputs": { "VERSION": "1.0.0" } },
            { "action": "validate-state", "checks": [
                { "type": "tag-exists", "tag": "v1.0.0" },
                { "type": "version-progression",
                  "from": "0.2.1", "to": "1.0.0", "bump_type": "major" }
            ] },
            { "action": "comment", "text": "done" }
        ],
        "cleanup": { "delete_tags": ["v1.0.0"] }
    }"#;

    #[test]
    fn loads_a_complete_fixture() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_fixture(tmp.path(), "major.json", VALID);
        let fixture = TestFixture::load(&path).unwrap();
        assert_eq!(fixture.name, "major-bump");
        assert_eq!(fixture.steps.len(), 4);
        match &fixture.steps[0] {
            Step::SetupGitState {
                scenario,
                clean_state,
                force,
            } => {
                assert_eq!(scenario, "MajorBumpV0ToV1");
                assert!(clean_state);
                assert!(force);
            }
            other => panic!("unexpected step: {other:?}"),
        }
        assert_eq!(fixture.cleanup.unwrap().delete_tags, vec!["v1.0.0"]);
    }

    #[test]
    fn unknown_action_fails_at_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_fixture(
            tmp.path(),
            "bad.json",
            r#"{ "name": "bad", "steps": [ { "action": "frobnicate" } ] }"#,
        );
        let err = TestFixture::load(&path).unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn unknown_check_type_fails_at_parse() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_fixture(
            tmp.path(),
            "bad-check.json",
            r#"{ "name": "bad", "steps": [
                { "action": "validate-state",
                  "checks": [ { "type": "not-a-real-check" } ] } ] }"#,
        );
        let err = TestFixture::load(&path).unwrap_err();
        assert!(err.to_string().contains("not-a-real-check"));
        assert!(err.to_string().contains("tag-exists"));
    }

    #[test]
    fn discover_sorts_and_select_is_fuzzy() {
        let tmp = tempfile::tempdir().unwrap();
        write_fixture(
            tmp.path(),
            "b.json",
            r#"{ "name": "minor-bump", "steps": [] }"#,
        );
        write_fixture(
            tmp.path(),
            "a.json",
            r#"{ "name": "major-bump", "steps": [] }"#,
        );
        write_fixture(tmp.path(), "ignored.txt", "not json");

        let fixtures = discover(tmp.path()).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[0].name, "major-bump");

        let picked = select_by_name(fixtures.clone(), "minor").unwrap();
        assert_eq!(picked.name, "minor-bump");

        let err = select_by_name(fixtures.clone(), "bump").unwrap_err();
        assert!(matches!(err, FixtureError::Ambiguous { .. }));

        let err = select_by_name(fixtures, "nothing").unwrap_err();
        assert!(matches!(err, FixtureError::NoMatch { .. }));
    }
}
