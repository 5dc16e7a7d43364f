//! Shared fixture for integration tests: a real git repository in a temp
//! directory, driven by the git CLI directly so the harness's own GitCli is
//! never both the actor and the oracle.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// A real git repository with `main` as the initial branch.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a repository with one initial commit on `main`.
    pub fn new() -> Self {
        let repo = Self::empty();
        std::fs::write(repo.path().join("README.md"), "# Test Repo\n").unwrap();
        repo.git(&["add", "README.md"]);
        repo.git(&["commit", "-m", "Initial commit"]);
        repo
    }

    /// Create a repository with no commits at all.
    pub fn empty() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-b", "main"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run a git command, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        run_git(self.path(), args)
    }

    /// Create a file and commit it, returning the new HEAD sha.
    pub fn commit_file(&self, name: &str, content: &str, message: &str) -> String {
        std::fs::write(self.path().join(name), content).unwrap();
        self.git(&["add", name]);
        self.git(&["commit", "-m", message]);
        self.head()
    }

    /// Current HEAD sha.
    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"]).trim().to_string()
    }

    /// All tag names, sorted.
    pub fn tag_names(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .git(&["tag", "--list"])
            .lines()
            .map(str::to_string)
            .collect();
        tags.sort();
        tags
    }

    /// All local branch names, sorted.
    pub fn branch_names(&self) -> Vec<String> {
        let mut branches: Vec<String> = self
            .git(&["for-each-ref", "refs/heads", "--format=%(refname:short)"])
            .lines()
            .map(str::to_string)
            .collect();
        branches.sort();
        branches
    }

    /// Branch HEAD is currently on.
    pub fn current_branch(&self) -> String {
        self.git(&["symbolic-ref", "--short", "HEAD"]).trim().to_string()
    }

    /// Resolve any refspec to a sha.
    pub fn resolve(&self, refspec: &str) -> String {
        self.git(&["rev-parse", refspec]).trim().to_string()
    }
}

/// Run a git command in the given directory, panicking on failure.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed to start");
    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8(output.stdout).unwrap()
}
