//! runner
//!
//! Adapter for the containerized workflow runner.
//!
//! # Responsibilities
//!
//! - Build the runner argument list for one test step (workflow file,
//!   event payload, optional job filter)
//! - Signal the workflow-under-test that it is running under the local
//!   harness, and tell it where the exported test state is mounted
//! - Translate the host state directory into the container runtime's
//!   mount-path syntax before constructing the bind-mount argument
//! - Execute synchronously and parse the output-marker protocol
//!
//! # Output-marker protocol
//!
//! The workflow-under-test reports structured results by printing lines of
//! the form `OUTPUT: KEY=VALUE`. The key is everything up to the first `=`,
//! trimmed; the value is everything after it, verbatim; the last occurrence
//! of a duplicate key wins. Everything else in the combined output is free
//! text and is preserved verbatim in [`RunResult::raw_output`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::config::RunnerConfig;
use crate::core::context::STATE_DIR_ENV;
use crate::proc::{ProcessRequest, ProcessRunner};

/// Prefix of one structured output line.
pub const OUTPUT_MARKER: &str = "OUTPUT:";

/// Environment variable telling the workflow it runs under the harness.
pub const LOCAL_TEST_ENV: &str = "GITRIG_LOCAL_TEST";

/// Environment variable carrying the in-container test-state path.
pub const TEST_STATE_ENV: &str = "TEST_STATE_DIR";

/// Errors from runner invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The runner binary could not be spawned at all.
    #[error("failed to spawn workflow runner '{binary}': {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },
}

/// Result of one workflow invocation.
#[derive(Debug)]
pub struct RunResult {
    /// `exit_code == 0`.
    pub success: bool,
    pub exit_code: i32,
    /// Combined stdout and stderr, unmodified.
    pub raw_output: String,
    /// Entries parsed from the output-marker protocol.
    pub outputs: HashMap<String, String>,
    pub duration: Duration,
}

/// Invokes the external workflow runner for one test step.
pub struct WorkflowRunner<'r> {
    runner: &'r dyn ProcessRunner,
    config: RunnerConfig,
    /// Repository the runner executes in; workflow and event paths are
    /// resolved relative to it.
    repo_dir: PathBuf,
}

impl<'r> WorkflowRunner<'r> {
    pub fn new(
        runner: &'r dyn ProcessRunner,
        config: RunnerConfig,
        repo_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            config,
            repo_dir: repo_dir.into(),
        }
    }

    /// Run one workflow against an event payload.
    ///
    /// `state_dir` is the host directory holding exported scenario
    /// artifacts; it is bind-mounted read-write at the configured container
    /// path. If the host path cannot be translated to the container
    /// runtime's syntax the run proceeds *without* the mount - the
    /// workflow-under-test may not need test-state access for every
    /// fixture - and the degradation is reported in `mount_warning`.
    ///
    /// # Errors
    ///
    /// Only a spawn failure is an error; a nonzero workflow exit is an
    /// ordinary `RunResult` with `success == false`.
    pub fn invoke(
        &self,
        workflow_file: &Path,
        event_path: &Path,
        job: Option<&str>,
        state_dir: &Path,
    ) -> Result<(RunResult, Option<String>), RunnerError> {
        let mut args: Vec<String> = vec![
            "-W".to_string(),
            workflow_file.to_string_lossy().into_owned(),
            "-e".to_string(),
            event_path.to_string_lossy().into_owned(),
        ];
        let job = job.or(self.config.job.as_deref());
        if let Some(job) = job {
            args.push("-j".to_string());
            args.push(job.to_string());
        }
        args.push("--env".to_string());
        args.push(format!("{LOCAL_TEST_ENV}=true"));
        args.push("--env".to_string());
        args.push(format!("{TEST_STATE_ENV}={}", self.config.container_state_dir));

        let mut mount_warning = None;
        match translate_mount_path(&state_dir.to_string_lossy()) {
            Ok(host_path) => {
                args.push("--container-options".to_string());
                args.push(format!(
                    "-v {host_path}:{}",
                    self.config.container_state_dir
                ));
            }
            Err(reason) => {
                mount_warning = Some(format!(
                    "state directory not mounted ({reason}); running without test-state access"
                ));
            }
        }

        let req = ProcessRequest {
            program: self.config.binary.clone(),
            args,
            env: vec![
                (LOCAL_TEST_ENV.to_string(), "true".to_string()),
                // Host-side state dir, so helper scripts spawned by the
                // runner itself cooperate with this run.
                (
                    STATE_DIR_ENV.to_string(),
                    state_dir.to_string_lossy().into_owned(),
                ),
            ],
            cwd: Some(self.repo_dir.clone()),
        };

        let started = Instant::now();
        let out = self.runner.run(&req).map_err(|source| RunnerError::Spawn {
            binary: self.config.binary.clone(),
            source,
        })?;
        let duration = started.elapsed();

        let outputs = parse_output_markers(&out.output);
        Ok((
            RunResult {
                success: out.exit_code == 0,
                exit_code: out.exit_code,
                raw_output: out.output,
                outputs,
                duration,
            },
            mount_warning,
        ))
    }
}

/// Scan combined output for `OUTPUT: KEY=VALUE` lines.
///
/// Only the key is trimmed; the value is everything after the first `=`,
/// kept verbatim. Last occurrence of a duplicate key wins.
pub fn parse_output_markers(output: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in output.lines() {
        let Some(rest) = line.trim_start().strip_prefix(OUTPUT_MARKER) else {
            continue;
        };
        let Some((key, value)) = rest.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), value.to_string());
    }
    map
}

/// Translate a host path into the container runtime's bind-mount syntax.
///
/// - Unix paths pass through unchanged.
/// - Windows drive-letter paths (`C:\x\y`) become `/c/x/y`.
/// - UNC paths (`\\server\share`) have no stable container mapping and are
///   rejected; the caller degrades to running without the mount.
pub fn translate_mount_path(path: &str) -> Result<String, String> {
    if path.starts_with("\\\\") {
        return Err(format!("UNC path '{path}' cannot be mounted"));
    }
    let bytes = path.as_bytes();
    let has_drive = bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'\\' || bytes[2] == b'/');
    if has_drive {
        let drive = bytes[0].to_ascii_lowercase() as char;
        let rest: String = path[2..].replace('\\', "/");
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return Ok(format!("/{drive}"));
        }
        return Ok(format!("/{drive}/{rest}"));
    }
    if path.is_empty() {
        return Err("empty path".to_string());
    }
    Ok(path.to_string())
}
