//! Integration tests for scenario application against a real repository.

mod common;

use common::TestRepo;

use gitrig::git::GitCli;
use gitrig::proc::SystemRunner;
use gitrig::scenario::{ScenarioCatalog, EXPORT_BRANCHES_FILE, EXPORT_BUNDLE_FILE, EXPORT_TAGS_FILE};
use tempfile::TempDir;

#[test]
fn major_bump_scenario_creates_fresh_tagged_commits() {
    let repo = TestRepo::new();
    let pre_existing = repo.head();
    repo.git(&["tag", "v9.0.0"]);

    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    let result = catalog
        .apply(&git, exports.path(), "MajorBumpV0ToV1", true, true)
        .unwrap();

    assert_eq!(
        result.production_tags_deleted.len(),
        1,
        "clean_state sweeps the pre-existing tag"
    );
    assert_eq!(result.tags_created.len(), 3);
    assert_eq!(repo.tag_names(), vec!["v0.1.0", "v0.2.0", "v0.2.1"]);
    assert_eq!(repo.current_branch(), "main");

    // Every scenario tag sits on a commit minted for it, never on the
    // history that was already there.
    for (tag, sha) in &result.tags_created {
        assert_ne!(
            sha.as_str(),
            pre_existing,
            "tag '{tag}' aliases a pre-existing commit"
        );
        assert_eq!(repo.resolve(tag.as_str()), sha.as_str());
    }
}

#[test]
fn reapplying_with_force_yields_one_export_line_per_tag() {
    let repo = TestRepo::new();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    catalog
        .apply(&git, exports.path(), "MajorBumpV0ToV1", true, true)
        .unwrap();
    let first_v021 = repo.resolve("v0.2.1");
    catalog
        .apply(&git, exports.path(), "MajorBumpV0ToV1", true, true)
        .unwrap();

    // Force re-points the tag at a new fresh commit.
    assert_ne!(repo.resolve("v0.2.1"), first_v021);
    assert_eq!(repo.tag_names(), vec!["v0.1.0", "v0.2.0", "v0.2.1"]);

    let tags_file =
        std::fs::read_to_string(exports.path().join(EXPORT_TAGS_FILE)).unwrap();
    let v021_lines = tags_file
        .lines()
        .filter(|line| line.starts_with("v0.2.1 "))
        .count();
    assert_eq!(v021_lines, 1, "export must not accumulate duplicate entries");
    assert_eq!(tags_file.lines().count(), 3);
}

#[test]
fn first_release_on_empty_repository() {
    let repo = TestRepo::empty();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    let result = catalog
        .apply(&git, exports.path(), "FirstRelease", true, true)
        .unwrap();

    assert!(result.tags_created.is_empty());
    assert!(repo.tag_names().is_empty());
    assert_eq!(repo.current_branch(), "main");
    // Exactly one commit: the initial commit minted so main could exist.
    let count = repo.git(&["rev-list", "--count", "HEAD"]);
    assert_eq!(count.trim(), "1");

    let tags_file =
        std::fs::read_to_string(exports.path().join(EXPORT_TAGS_FILE)).unwrap();
    assert!(tags_file.starts_with("# No tags found"));
    // Branches export still lists main.
    let branches = std::fs::read_to_string(exports.path().join(EXPORT_BRANCHES_FILE)).unwrap();
    assert!(branches.contains("\"main\""));
}

#[test]
fn checked_out_branch_is_skipped_not_deleted() {
    let repo = TestRepo::new();
    let before = repo.head();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    // HEAD is on main; FirstRelease declares main too. Even with force the
    // active branch must survive as a skip, not a delete-and-recreate.
    let result = catalog
        .apply(&git, exports.path(), "FirstRelease", false, true)
        .unwrap();

    assert_eq!(result.branches_created.len(), 0);
    assert_eq!(result.branches_skipped.len(), 1);
    assert_eq!(repo.current_branch(), "main");
    assert_eq!(repo.head(), before);
}

#[test]
fn release_branch_scenario_parks_branch_on_tag_commit() {
    let repo = TestRepo::new();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    catalog
        .apply(&git, exports.path(), "ReleaseBranchExists", true, true)
        .unwrap();

    assert_eq!(repo.resolve("release/v1"), repo.resolve("v1.0.0"));
    assert_eq!(repo.current_branch(), "main");
    assert!(exports.path().join(EXPORT_BUNDLE_FILE).exists());
}

#[test]
fn strict_validation_flags_contamination() {
    let repo = TestRepo::new();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    catalog
        .apply(&git, exports.path(), "PatchBump", true, true)
        .unwrap();

    let clean = catalog.validate(&git, "PatchBump", true).unwrap();
    assert!(clean.passed(), "failures: {:?}", clean.failures);

    // Leftovers from a hypothetical earlier test.
    repo.git(&["tag", "v7.7.7"]);
    repo.git(&["branch", "leftover"]);

    let dirty = catalog.validate(&git, "PatchBump", true).unwrap();
    assert!(!dirty.passed());
    assert!(dirty.failures.is_empty(), "declared refs are all present");
    assert!(dirty
        .contamination
        .iter()
        .any(|c| c.contains("v7.7.7")));
    assert!(dirty
        .contamination
        .iter()
        .any(|c| c.contains("leftover")));

    // Non-strict ignores the extras.
    let lax = catalog.validate(&git, "PatchBump", false).unwrap();
    assert!(lax.passed());
}

#[test]
fn validation_reports_missing_declared_refs() {
    let repo = TestRepo::new();
    let runner = SystemRunner;
    let git = GitCli::new(&runner, repo.path());
    let catalog = ScenarioCatalog::builtin().unwrap();
    let exports = TempDir::new().unwrap();

    catalog
        .apply(&git, exports.path(), "MinorBump", true, true)
        .unwrap();
    repo.git(&["tag", "-d", "v1.2.0"]);

    let report = catalog.validate(&git, "MinorBump", false).unwrap();
    assert!(!report.passed());
    assert!(report
        .failures
        .iter()
        .any(|f| f.contains("v1.2.0")));
}
