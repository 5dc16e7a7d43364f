//! snapshot
//!
//! Backup and restore of repository ref-state.
//!
//! # Contract
//!
//! [`SnapshotStore::backup`] is a pure read of the repository: tags with
//! their peeled commits, branches with the current branch, and a commit
//! bundle covering everything those refs reach. Restoring the resulting
//! snapshot with `force` and `delete_existing_tags` yields a ref-state
//! equal to the one captured.
//!
//! # Restore ordering
//!
//! Ordering is a correctness invariant, not a style choice:
//!
//! 1. Unbundle commits. Tags and branches reference SHAs that may no longer
//!    exist in the live history; the object database must contain them
//!    before any ref is recreated. Failure here is fatal to the restore.
//! 2. Apply the tag-deletion policy once, up front. The per-tag loop must
//!    not delete a second time.
//! 3. Recreate tags, best effort. One bad tag produces a warning, not an
//!    aborted restore.
//! 4. Recreate branches, best effort. Remote entries are skipped by policy
//!    (they are assumed fetchable). Recreating the checked-out branch goes
//!    through a temporary branch because git refuses to delete HEAD's
//!    branch.
//!
//! # Lifecycle
//!
//! One snapshot per test: created before the scenario is applied, read
//! exactly once during restore, then eligible for deletion by the caller.

pub mod artifacts;

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::core::types::{BranchName, Sha, TagName, DETACHED_HEAD};
use crate::git::{GitCli, GitError};

use artifacts::{BranchState, BundleState, Manifest};

/// Errors from snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error("snapshot io error at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt snapshot artifact '{path}': {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("no snapshot named '{name}'")]
    UnknownSnapshot { name: String },

    /// Step 1 of restore failed; tags and branches were not touched.
    #[error("failed to unpack commit bundle: {0}")]
    UnbundleFailed(#[source] GitError),
}

/// One backup unit: the full ref-state of a repository at a point in time.
#[derive(Debug, Clone)]
pub struct RefSnapshot {
    /// Unique name within the backup root.
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// Tags with the commits they (after peeling) point at.
    pub tags: Vec<(TagName, Sha)>,
    pub branches: BranchState,
    /// Bundle covering every ref above; `Empty` means no refs existed.
    pub bundle: BundleState,
    /// Tag names present at backup time, independent of `tags`.
    pub production_tag_names: BTreeSet<TagName>,
}

/// Restore policy knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    /// Overwrite refs that already exist.
    pub force: bool,
    /// Delete every currently-present tag before recreating.
    pub delete_existing_tags: bool,
}

/// Counts and warnings from one restore, for observability.
#[derive(Debug, Default)]
pub struct RestoreStats {
    /// Whether a bundle was actually unpacked.
    pub commits_unbundled: bool,
    pub tags_restored: usize,
    pub tags_skipped: usize,
    pub branches_restored: usize,
    pub branches_skipped: usize,
    /// Per-item failures that did not abort the restore.
    pub warnings: Vec<String>,
}

impl RestoreStats {
    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Name of the parking branch used while force-recreating the branch that
/// is currently checked out.
const RESTORE_PARKING_BRANCH: &str = "gitrig-restore-parking";

/// Snapshot persistence and application against one repository.
pub struct SnapshotStore<'g, 'r> {
    git: &'g GitCli<'r>,
    root: PathBuf,
}

impl<'g, 'r> SnapshotStore<'g, 'r> {
    /// Create a store rooted at `root` (the run context's `backups/`).
    pub fn new(git: &'g GitCli<'r>, root: impl Into<PathBuf>) -> Self {
        Self {
            git,
            root: root.into(),
        }
    }

    /// Directory owned by one snapshot name.
    pub fn snapshot_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Names of all snapshots currently on disk, sorted.
    pub fn list(&self) -> Result<Vec<String>, SnapshotError> {
        let mut names = Vec::new();
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => {
                return Err(SnapshotError::Io {
                    path: self.root.clone(),
                    source: e,
                })
            }
        };
        for entry in entries {
            let entry = entry.map_err(|e| SnapshotError::Io {
                path: self.root.clone(),
                source: e,
            })?;
            if entry.path().join(artifacts::MANIFEST_FILE).exists() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Capture the repository's ref-state under `name`.
    ///
    /// This is a pure read: the live repository is not modified. An empty
    /// repository yields a snapshot with zero tags and zero branches, and
    /// an empty ref union yields the explicit empty-bundle marker rather
    /// than a `git bundle` invocation (which errors on an empty ref list).
    ///
    /// # Errors
    ///
    /// Fails if git state cannot be read or artifacts cannot be written.
    pub fn backup(
        &self,
        name: &str,
        include_remote_branches: bool,
    ) -> Result<RefSnapshot, SnapshotError> {
        let dir = self.snapshot_dir(name);
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let tags = self.git.list_tags()?;
        let production_tag_names: BTreeSet<TagName> =
            tags.iter().map(|(name, _)| name.clone()).collect();

        let branch_entries = self.git.list_branches(include_remote_branches)?;
        let current_branch = match self.git.current_branch()? {
            Some(branch) => branch.as_str().to_string(),
            None => DETACHED_HEAD.to_string(),
        };
        let branches = BranchState {
            current_branch,
            branches: branch_entries,
        };

        // Union of every tag and branch ref, in full refname form.
        let mut refs: Vec<String> = tags
            .iter()
            .map(|(tag, _)| format!("refs/tags/{tag}"))
            .collect();
        for entry in &branches.branches {
            if entry.is_remote {
                refs.push(format!("refs/remotes/{}", entry.name));
            } else {
                refs.push(format!("refs/heads/{}", entry.name));
            }
        }

        let bundle = if refs.is_empty() {
            artifacts::write_empty_bundle(&dir)?;
            BundleState::Empty
        } else {
            let path = dir.join(artifacts::BUNDLE_FILE);
            self.git.bundle_create(&path, &refs)?;
            BundleState::File(path)
        };

        artifacts::write_tags(&dir, &tags)?;
        artifacts::write_branches(&dir, &branches)?;

        let bundle_sha256 = match &bundle {
            BundleState::File(path) => Some(artifacts::bundle_checksum(path)?),
            _ => None,
        };
        let created_at = Utc::now();
        artifacts::write_manifest(
            &dir,
            &Manifest {
                tags_file: artifacts::TAGS_FILE.to_string(),
                branches_file: artifacts::BRANCHES_FILE.to_string(),
                bundle_file: artifacts::BUNDLE_FILE.to_string(),
                production_tags: production_tag_names.iter().cloned().collect(),
                created_at,
                bundle_sha256,
            },
        )?;

        Ok(RefSnapshot {
            name: name.to_string(),
            created_at,
            tags,
            branches,
            bundle,
            production_tag_names,
        })
    }

    /// Load a snapshot's artifact set from disk.
    ///
    /// # Errors
    ///
    /// `SnapshotError::UnknownSnapshot` when no manifest exists under the
    /// name; `SnapshotError::Corrupt` for unreadable artifacts.
    pub fn load(&self, name: &str) -> Result<RefSnapshot, SnapshotError> {
        let dir = self.snapshot_dir(name);
        if !dir.join(artifacts::MANIFEST_FILE).exists() {
            return Err(SnapshotError::UnknownSnapshot {
                name: name.to_string(),
            });
        }
        let manifest = artifacts::read_manifest(&dir)?;
        Ok(RefSnapshot {
            name: name.to_string(),
            created_at: manifest.created_at,
            tags: artifacts::read_tags(&dir)?,
            branches: artifacts::read_branches(&dir)?,
            bundle: artifacts::bundle_state(&dir)?,
            production_tag_names: manifest.production_tags.into_iter().collect(),
        })
    }

    /// Restore a snapshot into the live repository.
    ///
    /// See the module documentation for the ordering contract. Failures in
    /// steps 3-4 (individual tags and branches) become entries in
    /// [`RestoreStats::warnings`]; only an unbundle failure aborts.
    ///
    /// # Errors
    ///
    /// `SnapshotError::UnbundleFailed` when the bundle exists but cannot be
    /// unpacked; reads of live state propagate as `SnapshotError::Git`.
    pub fn restore(
        &self,
        snapshot: &RefSnapshot,
        opts: RestoreOptions,
    ) -> Result<RestoreStats, SnapshotError> {
        let mut stats = RestoreStats::default();

        // Step 1: commits. Tags and branches cannot be recreated until the
        // objects they point at exist locally.
        match &snapshot.bundle {
            BundleState::File(path) => {
                if let Err(detail) = self.git.bundle_verify(path)? {
                    stats.warn(format!("bundle verification: {detail}"));
                }
                self.git
                    .bundle_unpack(path)
                    .map_err(SnapshotError::UnbundleFailed)?;
                stats.commits_unbundled = true;
            }
            BundleState::Empty => {
                // No refs existed at backup time; nothing to unpack.
            }
            BundleState::Missing => {
                // Snapshot predates bundling. Proceed; per-tag restore will
                // warn about any SHA that is no longer present.
                stats.warn(format!(
                    "snapshot '{}' has no commit bundle; relying on live object database",
                    snapshot.name
                ));
            }
        }

        // Step 2: tag deletion policy, resolved exactly once.
        let mut tags_already_swept = false;
        if opts.delete_existing_tags {
            for (existing, _) in self.git.list_tags()? {
                if let Err(e) = self.git.delete_tag(&existing) {
                    stats.warn(format!("failed to delete tag '{existing}': {e}"));
                }
            }
            tags_already_swept = true;
        }

        // Step 3: tags, best effort.
        for (tag, sha) in &snapshot.tags {
            let exists = self.git.tag_exists(tag)?;
            if exists && !opts.force {
                stats.tags_skipped += 1;
                continue;
            }
            if exists && !tags_already_swept {
                if let Err(e) = self.git.delete_tag(tag) {
                    stats.warn(format!("failed to delete tag '{tag}' before recreate: {e}"));
                }
            }
            match self.git.create_tag(tag, sha.as_str(), opts.force) {
                Ok(()) => stats.tags_restored += 1,
                Err(e) => stats.warn(format!("failed to restore tag '{tag}' -> {sha}: {e}")),
            }
        }

        // Step 4: branches, best effort.
        let live_current = self.git.current_branch()?;
        let mut parked = false;
        for entry in &snapshot.branches.branches {
            if entry.is_remote {
                // Policy: remote-tracking branches are never recreated
                // locally; they are assumed fetchable.
                stats.branches_skipped += 1;
                continue;
            }
            let name = match BranchName::new(&entry.name) {
                Ok(name) => name,
                Err(e) => {
                    stats.warn(format!("invalid branch name in snapshot: {e}"));
                    continue;
                }
            };
            let exists = self.git.branch_exists(&name)?;
            if exists && !opts.force {
                stats.branches_skipped += 1;
                continue;
            }
            if exists {
                // git refuses to delete the branch HEAD is on; park on a
                // temporary branch at the current commit first.
                if live_current.as_ref() == Some(&name) && !parked {
                    let parking = BranchName::new(RESTORE_PARKING_BRANCH)
                        .map_err(|e| GitError::Type(e))?;
                    if let Err(e) = self.git.checkout_new(&parking) {
                        stats.warn(format!(
                            "could not create parking branch, leaving '{name}' as-is: {e}"
                        ));
                        stats.branches_skipped += 1;
                        continue;
                    }
                    parked = true;
                }
                if let Err(e) = self.git.delete_branch(&name) {
                    stats.warn(format!("failed to delete branch '{name}': {e}"));
                    stats.branches_skipped += 1;
                    continue;
                }
            }
            match self.git.create_branch(&name, entry.sha.as_str()) {
                Ok(()) => stats.branches_restored += 1,
                Err(e) => stats.warn(format!(
                    "failed to restore branch '{name}' -> {}: {e}",
                    entry.sha
                )),
            }
        }

        // Re-point HEAD at the recorded current branch.
        if snapshot.branches.current_branch != DETACHED_HEAD {
            match BranchName::new(&snapshot.branches.current_branch) {
                Ok(target) => {
                    if self.git.branch_exists(&target)? {
                        if let Err(e) = self.git.checkout(&target) {
                            stats.warn(format!("failed to check out '{target}': {e}"));
                        }
                    } else {
                        stats.warn(format!(
                            "recorded current branch '{target}' does not exist after restore"
                        ));
                    }
                }
                Err(e) => stats.warn(format!("invalid recorded current branch: {e}")),
            }
        } else {
            stats.warn("snapshot recorded a detached HEAD; leaving HEAD where it is".to_string());
        }

        if parked {
            let parking =
                BranchName::new(RESTORE_PARKING_BRANCH).map_err(GitError::Type)?;
            if let Err(e) = self.git.delete_branch(&parking) {
                stats.warn(format!("failed to delete parking branch: {e}"));
            }
        }

        Ok(stats)
    }

    /// Delete a snapshot's artifacts.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors; deleting a nonexistent snapshot is an
    /// `UnknownSnapshot` error.
    pub fn discard(&self, name: &str) -> Result<(), SnapshotError> {
        let dir = self.snapshot_dir(name);
        if !dir.exists() {
            return Err(SnapshotError::UnknownSnapshot {
                name: name.to_string(),
            });
        }
        fs::remove_dir_all(&dir).map_err(|e| SnapshotError::Io {
            path: dir,
            source: e,
        })
    }
}
