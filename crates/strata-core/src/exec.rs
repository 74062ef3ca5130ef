//! Command execution boundary to the external engine
//!
//! Everything the engine needs (work dir, env, home) travels in
//! [`CommandOptions`] on each request. Nothing is read from the ambient
//! process environment here.

use crate::error::{Result, StrataError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;

/// Env var telling the engine where its home directory is
pub const HOME_ENV: &str = "STRATA_HOME";

/// Per-invocation options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOptions {
    pub work_dir: PathBuf,
    pub env: BTreeMap<String, String>,
    pub home: Option<PathBuf>,
}

/// One engine invocation: `<engine> <verb...> <args...> [--stack <stack>]`
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub stack: Option<String>,
    pub verb: Vec<String>,
    pub args: Vec<String>,
    pub options: CommandOptions,
}

impl CommandRequest {
    pub fn new(verb: &[&str], options: &CommandOptions) -> Self {
        Self {
            stack: None,
            verb: verb.iter().map(|s| s.to_string()).collect(),
            args: Vec::new(),
            options: options.clone(),
        }
    }

    pub fn stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument vector passed to the engine binary
    pub fn argv(&self) -> Vec<String> {
        let mut argv = self.verb.clone();
        argv.extend(self.args.iter().cloned());
        if let Some(stack) = &self.stack {
            argv.push("--stack".to_string());
            argv.push(stack.clone());
        }
        argv
    }
}

/// Captured result of an invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Turn a non-zero exit into a `Command` error
    pub fn into_result(self) -> Result<CommandOutput> {
        if self.exit_code != 0 {
            return Err(StrataError::Command {
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            });
        }
        Ok(self)
    }
}

/// Runs engine commands
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion. Only spawn failures are errors here;
    /// a non-zero exit is reported in the output.
    fn invoke(&self, request: &CommandRequest) -> Result<CommandOutput>;

    /// Run a command and fail on non-zero exit
    fn run(&self, request: &CommandRequest) -> Result<CommandOutput> {
        self.invoke(request)?.into_result()
    }
}

/// Thread-safe shared executor
pub type SharedExecutor = Arc<dyn CommandExecutor>;

/// Executor that spawns the engine binary as a child process
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    binary: PathBuf,
}

impl ProcessExecutor {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl CommandExecutor for ProcessExecutor {
    fn invoke(&self, request: &CommandRequest) -> Result<CommandOutput> {
        let argv = request.argv();
        tracing::debug!(binary = %self.binary.display(), args = ?argv, "invoking engine");

        let mut command = Command::new(&self.binary);
        command
            .args(&argv)
            .current_dir(&request.options.work_dir)
            .envs(&request.options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(home) = &request.options.home {
            command.env(HOME_ENV, home);
        }

        let output = command.output().map_err(|e| {
            StrataError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to run {}: {}", self.binary.display(), e),
            ))
        })?;

        // Killed by a signal: no exit code
        let exit_code = output.status.code().unwrap_or(-1);
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}
