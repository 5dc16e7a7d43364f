//! validate
//!
//! Declarative predicate checks over current ref-state.
//!
//! # Dispatch
//!
//! [`Check`] is a closed, serde-tagged enum. Fixtures carry checks as JSON
//! objects with a `type` field; [`Check::from_value`] converts one at fixture
//! parse time and turns an unknown `type` into
//! [`CheckError::UnsupportedType`] naming the offender and every supported
//! type. A typo'd check never reaches execution as a silent no-op.
//!
//! # Purity
//!
//! Every predicate reads VCS state and returns a [`CheckOutcome`]; none
//! mutates the repository. A failed resolution is a failed outcome carrying
//! the underlying git error in its message, never a swallowed error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::GitCli;

/// Every check type the engine understands, in fixture spelling.
pub const SUPPORTED_TYPES: &[&str] = &[
    "tag-exists",
    "tag-absent",
    "branch-exists",
    "current-branch",
    "tag-points-to",
    "version-progression",
    "version-greater",
    "no-new-tags",
    "idempotency-verified",
];

/// Errors from check parsing. These are configuration errors: they indicate
/// a fixture-authoring bug and are never downgraded to a failed assertion.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(
        "unsupported validation check type '{type_name}'; supported types: {}",
        SUPPORTED_TYPES.join(", ")
    )]
    UnsupportedType { type_name: String },

    #[error("invalid parameters for check '{type_name}': {message}")]
    InvalidParams { type_name: String, message: String },

    #[error("validation check is not an object with a 'type' field")]
    NotAnObject,
}

/// Semantic bump categories. Closed set: any other spelling fails at parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpType {
    Major,
    Minor,
    Patch,
}

/// A declarative predicate over ref-state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Check {
    /// The tag exists.
    TagExists { tag: String },
    /// The tag does not exist.
    TagAbsent { tag: String },
    /// The local branch exists.
    BranchExists { branch: String },
    /// HEAD is on the given branch.
    CurrentBranch { branch: String },
    /// The tag and the target refspec resolve to the same commit.
    TagPointsTo { tag: String, target: String },
    /// `to` is a valid `bump_type` increment of `from`.
    VersionProgression {
        from: String,
        to: String,
        bump_type: BumpType,
    },
    /// `new` compares strictly greater than `current`.
    VersionGreater { current: String, new: String },
    /// Placeholder inherited from the original harness; semantics were
    /// never specified, so it reports an explicit unsupported failure
    /// instead of a silent pass.
    NoNewTags,
    /// Placeholder, same policy as `NoNewTags`.
    IdempotencyVerified,
}

/// Result of one executed check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub success: bool,
    pub message: String,
}

impl CheckOutcome {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl Check {
    /// Parse one check from its fixture JSON representation.
    ///
    /// # Errors
    ///
    /// `CheckError::UnsupportedType` for an unknown `type` tag (naming it
    /// and listing every supported type), `CheckError::InvalidParams` when
    /// the tag is known but its parameters are malformed.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CheckError> {
        let type_name = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(CheckError::NotAnObject)?
            .to_string();
        if !SUPPORTED_TYPES.contains(&type_name.as_str()) {
            return Err(CheckError::UnsupportedType { type_name });
        }
        serde_json::from_value(value.clone()).map_err(|e| CheckError::InvalidParams {
            type_name,
            message: e.to_string(),
        })
    }

    /// The fixture spelling of this check's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Check::TagExists { .. } => "tag-exists",
            Check::TagAbsent { .. } => "tag-absent",
            Check::BranchExists { .. } => "branch-exists",
            Check::CurrentBranch { .. } => "current-branch",
            Check::TagPointsTo { .. } => "tag-points-to",
            Check::VersionProgression { .. } => "version-progression",
            Check::VersionGreater { .. } => "version-greater",
            Check::NoNewTags => "no-new-tags",
            Check::IdempotencyVerified => "idempotency-verified",
        }
    }
}

/// Executes checks against one repository.
pub struct ValidationEngine<'g, 'r> {
    git: &'g GitCli<'r>,
}

impl<'g, 'r> ValidationEngine<'g, 'r> {
    pub fn new(git: &'g GitCli<'r>) -> Self {
        Self { git }
    }

    /// Run one check. Never mutates the repository.
    pub fn run(&self, check: &Check) -> CheckOutcome {
        match check {
            Check::TagExists { tag } => match self.resolve(tag) {
                Ok(sha) => CheckOutcome::pass(format!("tag '{tag}' exists at {}", sha_short(&sha))),
                Err(e) => CheckOutcome::fail(format!("tag '{tag}' does not exist: {e}")),
            },
            Check::TagAbsent { tag } => match self.resolve(tag) {
                Ok(sha) => CheckOutcome::fail(format!(
                    "tag '{tag}' unexpectedly exists at {}",
                    sha_short(&sha)
                )),
                Err(_) => CheckOutcome::pass(format!("tag '{tag}' is absent")),
            },
            Check::BranchExists { branch } => {
                match crate::core::types::BranchName::new(branch.as_str())
                    .map_err(|e| e.to_string())
                    .and_then(|name| {
                        self.git.branch_exists(&name).map_err(|e| e.to_string())
                    }) {
                    Ok(true) => CheckOutcome::pass(format!("branch '{branch}' exists")),
                    Ok(false) => CheckOutcome::fail(format!("branch '{branch}' does not exist")),
                    Err(e) => CheckOutcome::fail(format!("branch '{branch}' check failed: {e}")),
                }
            }
            Check::CurrentBranch { branch } => match self.git.current_branch() {
                Ok(Some(current)) if current.as_str() == branch => {
                    CheckOutcome::pass(format!("current branch is '{branch}'"))
                }
                Ok(Some(current)) => CheckOutcome::fail(format!(
                    "current branch is '{current}', expected '{branch}'"
                )),
                Ok(None) => {
                    CheckOutcome::fail(format!("HEAD is detached, expected branch '{branch}'"))
                }
                Err(e) => CheckOutcome::fail(format!("current-branch check failed: {e}")),
            },
            Check::TagPointsTo { tag, target } => {
                let tag_sha = match self.resolve(tag) {
                    Ok(sha) => sha,
                    Err(e) => {
                        return CheckOutcome::fail(format!("cannot resolve tag '{tag}': {e}"))
                    }
                };
                let target_sha = match self.resolve(target) {
                    Ok(sha) => sha,
                    Err(e) => {
                        return CheckOutcome::fail(format!("cannot resolve target '{target}': {e}"))
                    }
                };
                if tag_sha == target_sha {
                    CheckOutcome::pass(format!("tag '{tag}' points to '{target}'"))
                } else {
                    CheckOutcome::fail(format!(
                        "tag '{tag}' is at {}, but '{target}' is at {}",
                        sha_short(&tag_sha),
                        sha_short(&target_sha)
                    ))
                }
            }
            Check::VersionProgression {
                from,
                to,
                bump_type,
            } => check_progression(from, to, *bump_type),
            Check::VersionGreater { current, new } => check_greater(current, new),
            Check::NoNewTags | Check::IdempotencyVerified => CheckOutcome::fail(format!(
                "check '{}' is not yet supported",
                check.type_name()
            )),
        }
    }

    fn resolve(&self, refspec: &str) -> Result<String, crate::git::GitError> {
        self.git.resolve(refspec).map(|sha| sha.as_str().to_string())
    }
}

fn sha_short(sha: &str) -> &str {
    &sha[..sha.len().min(10)]
}

/// Parse `major.minor.patch`, tolerating a leading `v`/`V` prefix.
fn parse_triple(version: &str) -> Result<(u64, u64, u64), String> {
    let stripped = version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version);
    let parts: Vec<&str> = stripped.split('.').collect();
    if parts.len() != 3 {
        return Err(format!(
            "'{version}' is not a major.minor.patch triple"
        ));
    }
    let mut nums = [0u64; 3];
    for (i, part) in parts.iter().enumerate() {
        nums[i] = part
            .parse()
            .map_err(|_| format!("'{version}' has non-numeric component '{part}'"))?;
    }
    Ok((nums[0], nums[1], nums[2]))
}

fn check_progression(from: &str, to: &str, bump_type: BumpType) -> CheckOutcome {
    let from_triple = match parse_triple(from) {
        Ok(t) => t,
        Err(e) => return CheckOutcome::fail(format!("bad 'from' version: {e}")),
    };
    let to_triple = match parse_triple(to) {
        Ok(t) => t,
        Err(e) => return CheckOutcome::fail(format!("bad 'to' version: {e}")),
    };
    let (from_major, from_minor, from_patch) = from_triple;
    let (to_major, to_minor, to_patch) = to_triple;
    // checked_add: a component at the integer ceiling has no valid bump.
    let valid = match bump_type {
        BumpType::Major => {
            Some(to_major) == from_major.checked_add(1) && to_minor == 0 && to_patch == 0
        }
        BumpType::Minor => {
            to_major == from_major
                && Some(to_minor) == from_minor.checked_add(1)
                && to_patch == 0
        }
        BumpType::Patch => {
            to_major == from_major
                && to_minor == from_minor
                && Some(to_patch) == from_patch.checked_add(1)
        }
    };
    if valid {
        CheckOutcome::pass(format!("{from} -> {to} is a valid {bump_type:?} bump"))
    } else {
        CheckOutcome::fail(format!("{from} -> {to} is not a valid {bump_type:?} bump"))
    }
}

fn check_greater(current: &str, new: &str) -> CheckOutcome {
    let current_triple = match parse_triple(current) {
        Ok(t) => t,
        Err(e) => return CheckOutcome::fail(format!("bad 'current' version: {e}")),
    };
    let new_triple = match parse_triple(new) {
        Ok(t) => t,
        Err(e) => return CheckOutcome::fail(format!("bad 'new' version: {e}")),
    };
    if new_triple > current_triple {
        CheckOutcome::pass(format!("{new} > {current}"))
    } else {
        CheckOutcome::fail(format!("{new} is not greater than {current}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unknown_type_names_itself_and_lists_supported() {
        let value = serde_json::json!({"type": "not-a-real-check"});
        let err = Check::from_value(&value).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not-a-real-check"));
        for supported in SUPPORTED_TYPES {
            assert!(message.contains(supported), "missing {supported}");
        }
    }

    #[test]
    fn known_type_with_bad_params_is_invalid_params() {
        let value = serde_json::json!({"type": "tag-exists"});
        let err = Check::from_value(&value).unwrap_err();
        assert!(matches!(err, CheckError::InvalidParams { .. }));
    }

    #[test]
    fn unknown_bump_type_fails_parse() {
        let value = serde_json::json!({
            "type": "version-progression",
            "from": "1.0.0",
            "to": "2.0.0",
            "bump_type": "mega"
        });
        assert!(Check::from_value(&value).is_err());
    }

    #[test]
    fn progression_concrete_cases() {
        // From the release-automation contract.
        assert!(check_progression("0.2.1", "1.0.0", BumpType::Major).success);
        assert!(!check_progression("1.2.0", "1.2.1", BumpType::Minor).success);
        assert!(check_progression("1.2.0", "1.3.0", BumpType::Minor).success);
        assert!(check_progression("1.2.0", "1.2.1", BumpType::Patch).success);
        assert!(!check_progression("1.2.0", "2.1.0", BumpType::Major).success);
    }

    #[test]
    fn progression_accepts_v_prefix() {
        assert!(check_progression("v0.2.1", "v1.0.0", BumpType::Major).success);
    }

    #[test]
    fn progression_at_integer_ceiling_is_invalid_not_a_panic() {
        let max = u64::MAX.to_string();
        assert!(!check_progression(&format!("{max}.0.0"), "1.0.0", BumpType::Major).success);
        assert!(!check_progression(&format!("1.{max}.0"), "1.0.0", BumpType::Minor).success);
        assert!(!check_progression(&format!("1.0.{max}"), "1.0.0", BumpType::Patch).success);
    }

    #[test]
    fn greater_is_lexicographic_by_significance() {
        assert!(check_greater("1.2.3", "1.2.4").success);
        assert!(check_greater("1.2.9", "1.3.0").success);
        assert!(check_greater("1.9.9", "2.0.0").success);
        assert!(!check_greater("1.2.3", "1.2.3").success);
        assert!(!check_greater("2.0.0", "1.9.9").success);
    }

    #[test]
    fn malformed_versions_fail_with_detail() {
        let outcome = check_greater("1.2", "1.3.0");
        assert!(!outcome.success);
        assert!(outcome.message.contains("1.2"));
    }

    #[test]
    fn placeholders_report_unsupported() {
        let value = serde_json::json!({"type": "no-new-tags"});
        let check = Check::from_value(&value).unwrap();
        assert_eq!(check, Check::NoNewTags);
    }

    proptest! {
        #[test]
        fn major_bump_valid_iff_resets_minor_patch(major in 0u64..100, minor in 0u64..100, patch in 0u64..100) {
            let from = format!("{major}.{minor}.{patch}");
            let to = format!("{}.0.0", major + 1);
            prop_assert!(check_progression(&from, &to, BumpType::Major).success);
        }

        #[test]
        fn greater_matches_tuple_order(a in 0u64..50, b in 0u64..50, c in 0u64..50, d in 0u64..50, e in 0u64..50, f in 0u64..50) {
            let current = format!("{a}.{b}.{c}");
            let new = format!("{d}.{e}.{f}");
            let expected = (d, e, f) > (a, b, c);
            prop_assert_eq!(check_greater(&current, &new).success, expected);
        }
    }
}
