//! core::context
//!
//! Per-invocation run context.
//!
//! # Design
//!
//! The harness used to rely on a script-global GUID and ad hoc temp paths;
//! that state is now an explicit [`RunContext`] value threaded through
//! constructors. One context is created per orchestrator invocation and
//! owns a globally unique state directory, so two harness processes on the
//! same host can never collide on exported artifacts or logs.
//!
//! # Cooperation
//!
//! Sub-scripts spawned within one invocation find the same directory via the
//! `GITRIG_STATE_DIR` environment variable instead of regenerating it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Environment variable naming the shared state directory for one run.
pub const STATE_DIR_ENV: &str = "GITRIG_STATE_DIR";

/// Per-invocation identity and isolated scratch space.
///
/// Layout under `state_dir`:
/// - `backups/` - one subdirectory per snapshot name
/// - `exports/` - scenario artifacts mounted into the runner container
/// - `logs/` - the JSON report and per-test logs
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Unique identifier for this invocation.
    pub run_id: Uuid,
    /// Root of the isolated scratch space.
    pub state_dir: PathBuf,
}

impl RunContext {
    /// Create a context with a fresh state directory.
    ///
    /// Honors `GITRIG_STATE_DIR` if set (a cooperating parent already
    /// created the directory); otherwise creates
    /// `<tmpdir>/gitrig-<run_id>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be created.
    pub fn create() -> io::Result<Self> {
        let run_id = Uuid::new_v4();
        let state_dir = match std::env::var_os(STATE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir().join(format!("gitrig-{run_id}")),
        };
        let ctx = Self { run_id, state_dir };
        ctx.ensure_layout()?;
        Ok(ctx)
    }

    /// Create a context rooted at an explicit directory (used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be created.
    pub fn at(state_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let ctx = Self {
            run_id: Uuid::new_v4(),
            state_dir: state_dir.into(),
        };
        ctx.ensure_layout()?;
        Ok(ctx)
    }

    fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.backups_dir())?;
        fs::create_dir_all(self.exports_dir())?;
        fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }

    /// Directory holding snapshot artifact sets.
    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }

    /// Directory holding scenario export artifacts.
    pub fn exports_dir(&self) -> PathBuf {
        self.state_dir.join("exports")
    }

    /// Directory holding the report and logs.
    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }

    /// The state directory as a path.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = RunContext::at(tmp.path().join("state")).unwrap();
        assert!(ctx.backups_dir().is_dir());
        assert!(ctx.exports_dir().is_dir());
        assert!(ctx.logs_dir().is_dir());
    }

    #[test]
    fn distinct_run_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let a = RunContext::at(tmp.path().join("a")).unwrap();
        let b = RunContext::at(tmp.path().join("b")).unwrap();
        assert_ne!(a.run_id, b.run_id);
    }
}
