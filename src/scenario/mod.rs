//! scenario
//!
//! Declarative synthetic ref-states and the logic to materialize them.
//!
//! # Design
//!
//! Scenarios are defined once in [`ScenarioCatalog::builtin`], validated at
//! construction, and never mutated. Applying a scenario always creates a
//! *fresh* empty commit for every tag it declares, so scenario tags can
//! never accidentally alias a pre-existing commit - a property the
//! validation layer depends on when it compares tag targets.
//!
//! # Export
//!
//! The workflow-under-test runs inside a container and cannot see host VCS
//! state, so every apply exports `test-tags.txt`, `test-branches.txt`, and
//! `test-commits.bundle` (same schema as the backup artifact set) for the
//! container to rehydrate from.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::core::types::{BranchName, Sha, TagName};
use crate::git::{GitCli, GitError};
use crate::snapshot::artifacts::{self, BranchState};
use crate::snapshot::SnapshotError;

/// Export artifact file names.
pub const EXPORT_TAGS_FILE: &str = "test-tags.txt";
pub const EXPORT_BRANCHES_FILE: &str = "test-branches.txt";
pub const EXPORT_BUNDLE_FILE: &str = "test-commits.bundle";

/// Errors from scenario operations.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Fixture named a scenario the catalog does not define. This is a
    /// fixture-authoring bug, reported with the full catalog.
    #[error("unknown scenario '{name}'; available: {}", available.join(", "))]
    UnknownScenario {
        name: String,
        available: Vec<String>,
    },

    /// A scenario definition is internally inconsistent.
    #[error("invalid scenario '{scenario}': {message}")]
    InvalidDefinition { scenario: String, message: String },

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Artifact(#[from] SnapshotError),
}

/// One tag a scenario declares, with the commit that will carry it.
#[derive(Debug, Clone)]
pub struct TagSpec {
    pub name: TagName,
    /// Message for the fresh empty commit the tag is placed on.
    pub commit_message: String,
    /// Branch that should point at this tag's commit, if any. Must be a
    /// member of the scenario's `branch_names`.
    pub owner_branch: Option<BranchName>,
}

/// Informational expectation attached to a scenario. Not enforced by the
/// catalog; fixtures assert against it via validation checks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpectedOutcome {
    /// Version the workflow-under-test should produce next.
    pub next_version: Option<String>,
    /// Branch the workflow-under-test is expected to create.
    pub creates_branch: Option<String>,
}

/// A named, immutable ref-state template.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub description: String,
    pub tag_specs: Vec<TagSpec>,
    pub branch_names: Vec<BranchName>,
    pub current_branch: BranchName,
    pub expected: ExpectedOutcome,
}

/// Result of one apply, for the orchestrator's report.
#[derive(Debug)]
pub struct ApplyResult {
    pub scenario: String,
    /// Tags created, with the fresh commits they point at.
    pub tags_created: Vec<(TagName, Sha)>,
    pub tags_skipped: Vec<TagName>,
    pub branches_created: Vec<BranchName>,
    pub branches_skipped: Vec<BranchName>,
    /// Names of pre-existing tags deleted by the clean-state sweep.
    pub production_tags_deleted: Vec<TagName>,
    /// Failure message from the final checkout, if it failed. Reported but
    /// not fatal: an uncommitted working tree should not sink the apply.
    pub checkout_error: Option<String>,
    /// Directory holding the container export artifacts.
    pub export_dir: PathBuf,
}

/// Result of validating live state against a scenario.
#[derive(Debug)]
pub struct ScenarioReport {
    /// Declared refs that are missing or wrong.
    pub failures: Vec<String>,
    /// Undeclared refs found in strict mode (contamination from an
    /// incompletely cleaned earlier test).
    pub contamination: Vec<String>,
}

impl ScenarioReport {
    /// Whether validation passed.
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.contamination.is_empty()
    }
}

/// Registry of named scenarios.
#[derive(Debug)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioCatalog {
    /// The built-in catalog.
    ///
    /// # Errors
    ///
    /// Returns `ScenarioError::InvalidDefinition` if any definition is
    /// inconsistent (owner branch not in the branch list). This is checked
    /// here, at process start, so a bad definition can never half-apply.
    pub fn builtin() -> Result<Self, ScenarioError> {
        let mut scenarios = BTreeMap::new();

        scenarios.insert(
            "FirstRelease".to_string(),
            Scenario {
                description: "Empty history: no tags, a bare main branch".to_string(),
                tag_specs: vec![],
                branch_names: vec![branch("main")],
                current_branch: branch("main"),
                expected: ExpectedOutcome {
                    next_version: Some("1.0.0".to_string()),
                    creates_branch: None,
                },
            },
        );

        scenarios.insert(
            "MajorBumpV0ToV1".to_string(),
            Scenario {
                description: "Pre-1.0 history ending at v0.2.1, ready for the 1.0.0 major bump"
                    .to_string(),
                tag_specs: vec![
                    tag_spec("v0.1.0", "Release v0.1.0"),
                    tag_spec("v0.2.0", "Release v0.2.0"),
                    tag_spec("v0.2.1", "Release v0.2.1"),
                ],
                branch_names: vec![branch("main")],
                current_branch: branch("main"),
                expected: ExpectedOutcome {
                    next_version: Some("1.0.0".to_string()),
                    creates_branch: None,
                },
            },
        );

        scenarios.insert(
            "MinorBump".to_string(),
            Scenario {
                description: "Stable 1.x history ready for a minor bump".to_string(),
                tag_specs: vec![
                    tag_spec("v1.1.0", "Release v1.1.0"),
                    tag_spec("v1.2.0", "Release v1.2.0"),
                ],
                branch_names: vec![branch("main")],
                current_branch: branch("main"),
                expected: ExpectedOutcome {
                    next_version: Some("1.3.0".to_string()),
                    creates_branch: None,
                },
            },
        );

        scenarios.insert(
            "PatchBump".to_string(),
            Scenario {
                description: "Stable 1.x history ready for a patch bump".to_string(),
                tag_specs: vec![tag_spec("v1.2.0", "Release v1.2.0")],
                branch_names: vec![branch("main")],
                current_branch: branch("main"),
                expected: ExpectedOutcome {
                    next_version: Some("1.2.1".to_string()),
                    creates_branch: None,
                },
            },
        );

        scenarios.insert(
            "ReleaseBranchExists".to_string(),
            Scenario {
                description: "A release branch already parked on the last release tag"
                    .to_string(),
                tag_specs: vec![TagSpec {
                    name: TagName::new("v1.0.0").expect("static tag name"),
                    commit_message: "Release v1.0.0".to_string(),
                    owner_branch: Some(branch("release/v1")),
                }],
                branch_names: vec![branch("main"), branch("release/v1")],
                current_branch: branch("main"),
                expected: ExpectedOutcome {
                    next_version: Some("1.0.1".to_string()),
                    creates_branch: None,
                },
            },
        );

        let catalog = Self { scenarios };
        catalog.validate_definitions()?;
        Ok(catalog)
    }

    fn validate_definitions(&self) -> Result<(), ScenarioError> {
        for (name, scenario) in &self.scenarios {
            for spec in &scenario.tag_specs {
                if let Some(owner) = &spec.owner_branch {
                    if !scenario.branch_names.contains(owner) {
                        return Err(ScenarioError::InvalidDefinition {
                            scenario: name.clone(),
                            message: format!(
                                "tag '{}' owner branch '{owner}' is not in the branch list",
                                spec.name
                            ),
                        });
                    }
                }
            }
            if !scenario.branch_names.contains(&scenario.current_branch) {
                return Err(ScenarioError::InvalidDefinition {
                    scenario: name.clone(),
                    message: format!(
                        "current branch '{}' is not in the branch list",
                        scenario.current_branch
                    ),
                });
            }
        }
        Ok(())
    }

    /// Scenario names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.scenarios.keys().cloned().collect()
    }

    /// Look up a scenario.
    ///
    /// # Errors
    ///
    /// `ScenarioError::UnknownScenario` naming every available scenario -
    /// an unknown name is a fixture-authoring bug and must fail loudly.
    pub fn get(&self, name: &str) -> Result<&Scenario, ScenarioError> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownScenario {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Materialize a scenario in the live repository and export the
    /// container artifact set.
    ///
    /// - `clean_state` deletes all pre-existing tags first, capturing their
    ///   names for auditability.
    /// - `force` re-points existing tags and recreates existing branches,
    ///   except the currently checked-out branch, which is always skipped
    ///   rather than deleted out from under HEAD.
    ///
    /// # Errors
    ///
    /// Unknown scenario names and git read failures are errors; a failed
    /// final checkout is reported in the result instead.
    pub fn apply(
        &self,
        git: &GitCli<'_>,
        export_dir: &Path,
        name: &str,
        clean_state: bool,
        force: bool,
    ) -> Result<ApplyResult, ScenarioError> {
        let scenario = self.get(name)?;
        fs::create_dir_all(export_dir).map_err(|e| SnapshotError::Io {
            path: export_dir.to_path_buf(),
            source: e,
        })?;

        let mut result = ApplyResult {
            scenario: name.to_string(),
            tags_created: Vec::new(),
            tags_skipped: Vec::new(),
            branches_created: Vec::new(),
            branches_skipped: Vec::new(),
            production_tags_deleted: Vec::new(),
            checkout_error: None,
            export_dir: export_dir.to_path_buf(),
        };

        if clean_state {
            for (existing, _) in git.list_tags()? {
                git.delete_tag(&existing)?;
                result.production_tags_deleted.push(existing);
            }
        }

        // One fresh commit per tag, so a scenario tag never aliases a
        // pre-existing commit.
        let mut tag_targets: BTreeMap<TagName, Sha> = BTreeMap::new();
        for spec in &scenario.tag_specs {
            if git.tag_exists(&spec.name)? && !force {
                tag_targets.insert(spec.name.clone(), git.resolve(spec.name.as_str())?);
                result.tags_skipped.push(spec.name.clone());
                continue;
            }
            let sha = git.commit_empty(&spec.commit_message)?;
            git.create_tag(&spec.name, sha.as_str(), force)?;
            tag_targets.insert(spec.name.clone(), sha.clone());
            result.tags_created.push((spec.name.clone(), sha));
        }

        let current = git.current_branch()?;
        for branch_name in &scenario.branch_names {
            let owner_tag = scenario
                .tag_specs
                .iter()
                .find(|spec| spec.owner_branch.as_ref() == Some(branch_name));
            let target = match owner_tag {
                Some(spec) => tag_targets
                    .get(&spec.name)
                    .cloned()
                    .ok_or_else(|| ScenarioError::InvalidDefinition {
                        scenario: name.to_string(),
                        message: format!("no target recorded for tag '{}'", spec.name),
                    })?,
                None => match git.head_sha()? {
                    Some(sha) => sha,
                    // Empty repository: give the scenario something to
                    // branch from.
                    None => git.commit_empty("Initial commit")?,
                },
            };

            if git.branch_exists(branch_name)? {
                if !force || current.as_ref() == Some(branch_name) {
                    // The active branch is never deleted out from under
                    // HEAD, force or not.
                    result.branches_skipped.push(branch_name.clone());
                    continue;
                }
                git.delete_branch(branch_name)?;
            }
            git.create_branch(branch_name, target.as_str())?;
            result.branches_created.push(branch_name.clone());
        }

        if let Err(e) = git.checkout(&scenario.current_branch) {
            // Typically uncommitted changes; the apply stands, the caller
            // decides what the failed checkout means for the test.
            result.checkout_error = Some(e.to_string());
        }

        self.export(git, export_dir, scenario, &tag_targets)?;
        Ok(result)
    }

    /// Write the container export artifact set for an applied scenario.
    fn export(
        &self,
        git: &GitCli<'_>,
        export_dir: &Path,
        scenario: &Scenario,
        tag_targets: &BTreeMap<TagName, Sha>,
    ) -> Result<(), ScenarioError> {
        let mut tag_lines = String::new();
        if tag_targets.is_empty() {
            tag_lines.push_str(artifacts::NO_TAGS_MARKER);
            tag_lines.push('\n');
        } else {
            for spec in &scenario.tag_specs {
                if let Some(sha) = tag_targets.get(&spec.name) {
                    tag_lines.push_str(&format!("{} {sha}\n", spec.name));
                }
            }
        }
        let tags_path = export_dir.join(EXPORT_TAGS_FILE);
        fs::write(&tags_path, tag_lines).map_err(|e| SnapshotError::Io {
            path: tags_path,
            source: e,
        })?;

        let mut entries = Vec::new();
        for branch_name in &scenario.branch_names {
            if let Ok(sha) = git.resolve(branch_name.as_str()) {
                entries.push(crate::git::BranchEntry {
                    name: branch_name.as_str().to_string(),
                    sha,
                    is_remote: false,
                });
            }
        }
        let state = BranchState {
            current_branch: scenario.current_branch.as_str().to_string(),
            branches: entries,
        };
        let branches_path = export_dir.join(EXPORT_BRANCHES_FILE);
        let json = serde_json::to_string_pretty(&state).map_err(|e| SnapshotError::Corrupt {
            path: branches_path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&branches_path, json).map_err(|e| SnapshotError::Io {
            path: branches_path,
            source: e,
        })?;

        let bundle_path = export_dir.join(EXPORT_BUNDLE_FILE);
        let mut refs: Vec<String> = tag_targets
            .keys()
            .map(|tag| format!("refs/tags/{tag}"))
            .collect();
        for branch_name in &scenario.branch_names {
            if git.branch_exists(branch_name)? {
                refs.push(format!("refs/heads/{branch_name}"));
            }
        }
        if refs.is_empty() {
            fs::write(&bundle_path, []).map_err(|e| SnapshotError::Io {
                path: bundle_path,
                source: e,
            })?;
        } else {
            git.bundle_create(&bundle_path, &refs)?;
        }
        Ok(())
    }

    /// Check live ref-state against a scenario's declaration.
    ///
    /// In `strict` mode, any live tag or local branch the scenario does not
    /// declare is flagged as contamination.
    ///
    /// # Errors
    ///
    /// Unknown scenario names and git read failures.
    pub fn validate(
        &self,
        git: &GitCli<'_>,
        name: &str,
        strict: bool,
    ) -> Result<ScenarioReport, ScenarioError> {
        let scenario = self.get(name)?;
        let mut report = ScenarioReport {
            failures: Vec::new(),
            contamination: Vec::new(),
        };

        for spec in &scenario.tag_specs {
            if !git.tag_exists(&spec.name)? {
                report
                    .failures
                    .push(format!("declared tag '{}' does not exist", spec.name));
            }
        }
        for branch_name in &scenario.branch_names {
            if !git.branch_exists(branch_name)? {
                report
                    .failures
                    .push(format!("declared branch '{branch_name}' does not exist"));
            }
        }
        match git.current_branch()? {
            Some(current) if current == scenario.current_branch => {}
            Some(current) => report.failures.push(format!(
                "current branch is '{current}', expected '{}'",
                scenario.current_branch
            )),
            None => report.failures.push(format!(
                "HEAD is detached, expected branch '{}'",
                scenario.current_branch
            )),
        }

        if strict {
            let declared_tags: Vec<&TagName> =
                scenario.tag_specs.iter().map(|s| &s.name).collect();
            for (tag, _) in git.list_tags()? {
                if !declared_tags.contains(&&tag) {
                    report
                        .contamination
                        .push(format!("undeclared tag '{tag}' present"));
                }
            }
            for entry in git.list_branches(false)? {
                let declared = scenario
                    .branch_names
                    .iter()
                    .any(|b| b.as_str() == entry.name);
                if !declared {
                    report
                        .contamination
                        .push(format!("undeclared branch '{}' present", entry.name));
                }
            }
        }

        Ok(report)
    }
}

fn branch(name: &str) -> BranchName {
    BranchName::new(name).expect("static branch name")
}

fn tag_spec(name: &str, message: &str) -> TagSpec {
    TagSpec {
        name: TagName::new(name).expect("static tag name"),
        commit_message: message.to_string(),
        owner_branch: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        let catalog = ScenarioCatalog::builtin().unwrap();
        assert!(catalog.names().contains(&"FirstRelease".to_string()));
        assert!(catalog.names().contains(&"MajorBumpV0ToV1".to_string()));
    }

    #[test]
    fn unknown_scenario_lists_available() {
        let catalog = ScenarioCatalog::builtin().unwrap();
        let err = catalog.get("NotAScenario").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NotAScenario"));
        assert!(message.contains("MajorBumpV0ToV1"));
    }

    #[test]
    fn major_bump_scenario_ends_at_v021() {
        let catalog = ScenarioCatalog::builtin().unwrap();
        let scenario = catalog.get("MajorBumpV0ToV1").unwrap();
        let last = scenario.tag_specs.last().unwrap();
        assert_eq!(last.name.as_str(), "v0.2.1");
        assert_eq!(scenario.current_branch.as_str(), "main");
    }
}
