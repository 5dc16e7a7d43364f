//! git
//!
//! Git interface implementation over the subprocess seam.
//!
//! This module is the **single doorway** to all Git operations in the
//! harness. Every VCS interaction flows through [`GitCli`], which shells out
//! to `git` via [`ProcessRunner`] and normalizes failures into typed error
//! categories. No other module builds a git invocation.
//!
//! # Why subprocess, not libgit2
//!
//! The workflow-under-test manipulates the repository with the git CLI; the
//! harness must observe and restore exactly what that CLI produces (bundles
//! included), so it drives the same binary rather than linking a second
//! implementation.
//!
//! # Error Handling
//!
//! - [`GitError::RefNotFound`]: a ref failed to resolve
//! - [`GitError::CommandFailed`]: git exited nonzero for any other reason
//! - [`GitError::Spawn`]: the binary could not be started at all
//!
//! "Repository has no commits yet" is deliberately **not** an error:
//! [`GitCli::head_sha`] and [`GitCli::current_branch`] return `Ok(None)` /
//! the unborn branch name, so an empty repository is an ordinary branch of
//! control flow.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{BranchName, Sha, TagName, TypeError};
use crate::proc::{ProcessRequest, ProcessRunner};

/// Errors from Git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// git exited nonzero.
    #[error("git {args} failed (exit {exit_code}): {output}")]
    CommandFailed {
        /// The argument list that failed.
        args: String,
        /// Exit code reported by git.
        exit_code: i32,
        /// Combined output, trimmed.
        output: String,
    },

    /// Requested ref does not exist or does not point at a commit.
    #[error("ref not found: {refname}")]
    RefNotFound {
        /// The ref that failed to resolve.
        refname: String,
    },

    /// The git binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    /// git produced output the harness could not parse.
    #[error("unexpected git output in {context}: {line}")]
    UnexpectedOutput {
        /// What was being parsed.
        context: String,
        /// The offending line.
        line: String,
    },

    /// A ref or sha from git violated the domain types.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// One branch as recorded in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BranchEntry {
    /// Branch name; for remote entries this includes the remote prefix
    /// (e.g. `origin/main`).
    pub name: String,
    /// Commit the branch points at.
    pub sha: Sha,
    /// Whether this is a remote-tracking branch.
    pub is_remote: bool,
}

/// Identity used for commits the harness itself creates.
const HARNESS_NAME: &str = "gitrig";
const HARNESS_EMAIL: &str = "gitrig@localhost";

/// The git doorway: one repository, one runner.
pub struct GitCli<'r> {
    runner: &'r dyn ProcessRunner,
    repo_dir: PathBuf,
}

impl<'r> GitCli<'r> {
    /// Create an interface for the repository at `repo_dir`.
    pub fn new(runner: &'r dyn ProcessRunner, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo_dir: repo_dir.into(),
        }
    }

    /// Run git in the repository directory.
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let out = self
            .runner
            .run(&ProcessRequest::new("git", args).in_dir(&self.repo_dir))?;
        if !out.success() {
            return Err(GitError::CommandFailed {
                args: args.join(" "),
                exit_code: out.exit_code,
                output: out.trimmed().to_string(),
            });
        }
        Ok(out.output)
    }

    /// Run git where a nonzero exit is an expected outcome, not an error.
    fn run_check(&self, args: &[&str]) -> Result<Option<String>, GitError> {
        let out = self
            .runner
            .run(&ProcessRequest::new("git", args).in_dir(&self.repo_dir))?;
        if out.success() {
            Ok(Some(out.output))
        } else {
            Ok(None)
        }
    }

    // ---- reads -----------------------------------------------------------

    /// List every tag with the commit it (after peeling) points at.
    ///
    /// An empty repository or a repository with no tags yields an empty
    /// list.
    pub fn list_tags(&self) -> Result<Vec<(TagName, Sha)>, GitError> {
        let output = self.run(&[
            "for-each-ref",
            "refs/tags",
            "--format=%(refname:short) %(objectname) %(*objectname)",
        ])?;
        let mut tags = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(object)) = (parts.next(), parts.next()) else {
                return Err(GitError::UnexpectedOutput {
                    context: "for-each-ref refs/tags".into(),
                    line: line.to_string(),
                });
            };
            // Annotated tags carry the peeled commit in the third field;
            // lightweight tags leave it empty.
            let commit = parts.next().unwrap_or(object);
            tags.push((TagName::new(name)?, Sha::new(commit)?));
        }
        Ok(tags)
    }

    /// List local branches and, optionally, remote-tracking branches.
    ///
    /// Symbolic remote HEAD entries (`origin/HEAD`) are excluded.
    pub fn list_branches(&self, include_remote: bool) -> Result<Vec<BranchEntry>, GitError> {
        let mut entries = self.branch_refs("refs/heads", false)?;
        if include_remote {
            entries.extend(self.branch_refs("refs/remotes", true)?);
        }
        Ok(entries)
    }

    fn branch_refs(&self, prefix: &str, is_remote: bool) -> Result<Vec<BranchEntry>, GitError> {
        let output = self.run(&[
            "for-each-ref",
            prefix,
            "--format=%(refname:short) %(objectname)",
        ])?;
        let mut entries = Vec::new();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(name), Some(sha)) = (parts.next(), parts.next()) else {
                return Err(GitError::UnexpectedOutput {
                    context: format!("for-each-ref {prefix}"),
                    line: line.to_string(),
                });
            };
            if is_remote && name.ends_with("/HEAD") {
                continue;
            }
            entries.push(BranchEntry {
                name: name.to_string(),
                sha: Sha::new(sha)?,
                is_remote,
            });
        }
        Ok(entries)
    }

    /// Name of the branch HEAD points at.
    ///
    /// Returns the unborn branch name in an empty repository and `None`
    /// when HEAD is detached.
    pub fn current_branch(&self) -> Result<Option<BranchName>, GitError> {
        match self.run_check(&["symbolic-ref", "--quiet", "--short", "HEAD"])? {
            Some(output) => Ok(Some(BranchName::new(output.trim())?)),
            None => Ok(None),
        }
    }

    /// Commit HEAD points at, or `None` in a repository with no commits.
    pub fn head_sha(&self) -> Result<Option<Sha>, GitError> {
        match self.run_check(&["rev-parse", "--verify", "--quiet", "HEAD^{commit}"])? {
            Some(output) => Ok(Some(Sha::new(output.trim())?)),
            None => Ok(None),
        }
    }

    /// Resolve any refspec to the commit it points at.
    ///
    /// # Errors
    ///
    /// `GitError::RefNotFound` when the ref does not exist or does not
    /// reach a commit.
    pub fn resolve(&self, refspec: &str) -> Result<Sha, GitError> {
        let target = format!("{refspec}^{{commit}}");
        match self.run_check(&["rev-parse", "--verify", "--quiet", &target])? {
            Some(output) => Ok(Sha::new(output.trim())?),
            None => Err(GitError::RefNotFound {
                refname: refspec.to_string(),
            }),
        }
    }

    /// Whether a local branch exists.
    pub fn branch_exists(&self, name: &BranchName) -> Result<bool, GitError> {
        let refname = format!("refs/heads/{name}");
        Ok(self
            .run_check(&["show-ref", "--verify", "--quiet", &refname])?
            .is_some())
    }

    /// Whether a tag exists.
    pub fn tag_exists(&self, name: &TagName) -> Result<bool, GitError> {
        let refname = format!("refs/tags/{name}");
        Ok(self
            .run_check(&["show-ref", "--verify", "--quiet", &refname])?
            .is_some())
    }

    // ---- writes ----------------------------------------------------------

    /// Create a lightweight tag at `target`.
    pub fn create_tag(&self, name: &TagName, target: &str, force: bool) -> Result<(), GitError> {
        if force {
            self.run(&["tag", "-f", name.as_str(), target])?;
        } else {
            self.run(&["tag", name.as_str(), target])?;
        }
        Ok(())
    }

    /// Delete a tag.
    pub fn delete_tag(&self, name: &TagName) -> Result<(), GitError> {
        self.run(&["tag", "-d", name.as_str()])?;
        Ok(())
    }

    /// Create a local branch at `target` without checking it out.
    pub fn create_branch(&self, name: &BranchName, target: &str) -> Result<(), GitError> {
        self.run(&["branch", name.as_str(), target])?;
        Ok(())
    }

    /// Delete a local branch, discarding unmerged commits.
    pub fn delete_branch(&self, name: &BranchName) -> Result<(), GitError> {
        self.run(&["branch", "-D", name.as_str()])?;
        Ok(())
    }

    /// Check out an existing branch.
    pub fn checkout(&self, name: &BranchName) -> Result<(), GitError> {
        self.run(&["checkout", name.as_str()])?;
        Ok(())
    }

    /// Create and check out a new branch at the current commit.
    pub fn checkout_new(&self, name: &BranchName) -> Result<(), GitError> {
        self.run(&["checkout", "-b", name.as_str()])?;
        Ok(())
    }

    /// Create an empty commit with the harness identity.
    ///
    /// Works in a repository with no commits (creates the root commit) and
    /// does not require `user.name`/`user.email` to be configured.
    pub fn commit_empty(&self, message: &str) -> Result<Sha, GitError> {
        let name_cfg = format!("user.name={HARNESS_NAME}");
        let email_cfg = format!("user.email={HARNESS_EMAIL}");
        self.run(&[
            "-c",
            &name_cfg,
            "-c",
            &email_cfg,
            "commit",
            "--allow-empty",
            "-m",
            message,
        ])?;
        self.resolve("HEAD")
    }

    // ---- bundles ---------------------------------------------------------

    /// Pack the given refs and every object reachable from them into a
    /// bundle file.
    ///
    /// The caller must pass a non-empty ref list; `git bundle create`
    /// errors on an empty one, which is why the snapshot layer writes an
    /// explicit empty marker instead of calling this.
    pub fn bundle_create(&self, path: &Path, refs: &[String]) -> Result<(), GitError> {
        let path_str = path.to_string_lossy().into_owned();
        let mut args = vec!["bundle", "create", path_str.as_str()];
        args.extend(refs.iter().map(String::as_str));
        self.run(&args)?;
        Ok(())
    }

    /// Verify a bundle against the current repository.
    ///
    /// Returns the verification output on failure so the caller can log it
    /// as a warning without aborting.
    pub fn bundle_verify(&self, path: &Path) -> Result<Result<(), String>, GitError> {
        let path_str = path.to_string_lossy().into_owned();
        match self.run_check(&["bundle", "verify", &path_str])? {
            Some(_) => Ok(Ok(())),
            None => Ok(Err(format!("bundle verification failed for {path_str}"))),
        }
    }

    /// Unpack a bundle's objects into the repository's object database.
    ///
    /// Refs recorded in the bundle are *not* recreated here; the snapshot
    /// layer recreates them explicitly after unbundling.
    pub fn bundle_unpack(&self, path: &Path) -> Result<(), GitError> {
        let path_str = path.to_string_lossy().into_owned();
        self.run(&["bundle", "unbundle", &path_str])?;
        Ok(())
    }
}
