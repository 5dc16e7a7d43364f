//! proc
//!
//! The single subprocess seam.
//!
//! # Design
//!
//! Every external command the harness runs - git and the workflow runner
//! alike - flows through [`ProcessRunner`]. Nothing else in the crate
//! constructs a `std::process::Command`. This gives the rest of the code a
//! deterministic seam: tests swap in [`ScriptedRunner`] and assert on exact
//! invocations without touching a real process.
//!
//! Execution is synchronous and captures stdout and stderr interleaved into
//! one combined string, because downstream consumers (the output-marker
//! protocol, git porcelain parsing) work line-by-line over the combined
//! stream.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Command;

/// One subprocess invocation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequest {
    /// Program to execute.
    pub program: String,
    /// Arguments, not including the program name.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Working directory, if different from the parent's.
    pub cwd: Option<PathBuf>,
}

impl ProcessRequest {
    /// Build a request with just a program and arguments.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Set the working directory.
    #[must_use]
    pub fn in_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Render the invocation for log messages.
    pub fn display(&self) -> String {
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Captured result of a subprocess.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
    /// Combined stdout and stderr.
    pub output: String,
}

impl ProcessOutput {
    /// Whether the process exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output with surrounding whitespace trimmed.
    pub fn trimmed(&self) -> &str {
        self.output.trim()
    }
}

/// Executes external commands synchronously.
pub trait ProcessRunner {
    /// Run the command to completion, capturing exit code and combined
    /// output.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process could not be spawned (missing
    /// binary, bad working directory). A nonzero exit is an `Ok` result.
    fn run(&self, req: &ProcessRequest) -> io::Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, req: &ProcessRequest) -> io::Result<ProcessOutput> {
        let mut cmd = Command::new(&req.program);
        cmd.args(&req.args);
        for (key, value) in &req.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &req.cwd {
            cmd.current_dir(cwd);
        }
        let out = cmd.output()?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&stderr);
        }

        Ok(ProcessOutput {
            exit_code: out.status.code().unwrap_or(-1),
            output,
        })
    }
}

/// Scripted fake for tests.
///
/// Responses are keyed on `"<program> <args joined by space>"`. Unmatched
/// invocations succeed with empty output unless [`ScriptedRunner::strict`]
/// was set, in which case they fail the test via a recorded miss.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, ProcessOutput>,
    calls: std::cell::RefCell<Vec<ProcessRequest>>,
    strict: bool,
}

impl ScriptedRunner {
    /// Create an empty scripted runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner that reports exit code 127 for unscripted calls.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Script a response for an exact invocation.
    pub fn respond(&mut self, invocation: &str, exit_code: i32, output: &str) {
        self.responses.insert(
            invocation.to_string(),
            ProcessOutput {
                exit_code,
                output: output.to_string(),
            },
        );
    }

    /// All invocations seen so far, in order.
    pub fn calls(&self) -> Vec<ProcessRequest> {
        self.calls.borrow().clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, req: &ProcessRequest) -> io::Result<ProcessOutput> {
        self.calls.borrow_mut().push(req.clone());
        if let Some(out) = self.responses.get(&req.display()) {
            return Ok(out.clone());
        }
        if self.strict {
            return Ok(ProcessOutput {
                exit_code: 127,
                output: format!("unscripted invocation: {}", req.display()),
            });
        }
        Ok(ProcessOutput {
            exit_code: 0,
            output: String::new(),
        })
    }
}
