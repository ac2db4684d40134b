use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::{
    defaults::{DEFAULT_TIMEOUT, PATH_LOOKUP_COMMAND, VERSION_FLAG},
    process::{self, CommandOutput},
    version::parse_version_output,
    IntegrationError,
};

/// Per-invocation knobs for [`CommandExecutor::execute_command`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionOptions {
    /// Upper bound on the run; `Duration::ZERO` disables the limit.
    pub timeout: Duration,
    pub capture_output: bool,
    pub capture_error: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            capture_output: true,
            capture_error: true,
        }
    }
}

impl ExecutionOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// Raw result of a single external command.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was killed, timed out, or never started.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub execution_time: Duration,
    /// Failure text for runs that could not start or did not finish.
    pub error: Option<String>,
}

impl ExecutionResult {
    pub(crate) fn failed(error: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            success: false,
            execution_time,
            error: Some(error.into()),
        }
    }

    fn from_output(output: CommandOutput, execution_time: Duration) -> Self {
        Self {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            execution_time,
            error: None,
        }
    }

    /// Error text to inspect when classifying a failed run: `error`, then stderr, then stdout.
    pub fn failure_text(&self) -> String {
        let mut parts = Vec::new();
        if let Some(error) = self.error.as_deref() {
            parts.push(error.trim());
        }
        parts.push(self.stderr.trim());
        if parts.iter().all(|part| part.is_empty()) {
            parts.push(self.stdout.trim());
        }
        parts
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs external commands on behalf of the probe.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Runs `command` with `args`.
    ///
    /// Runs that fail to start or exceed their timeout come back as an unsuccessful
    /// [`ExecutionResult`]; `Err` is reserved for internal capture failures.
    async fn execute_command(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, IntegrationError>;

    async fn is_command_available(&self, command: &Path) -> Result<bool, IntegrationError>;

    async fn command_version(&self, command: &Path) -> Result<Option<String>, IntegrationError>;
}

/// [`CommandExecutor`] that spawns real processes via `tokio::process`.
#[derive(Clone, Debug)]
pub struct SystemExecutor {
    lookup_command: PathBuf,
    probe_timeout: Duration,
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self {
            lookup_command: PathBuf::from(PATH_LOOKUP_COMMAND),
            probe_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the `which`/`where` command used for availability lookups.
    pub fn lookup_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.lookup_command = command.into();
        self
    }

    /// Timeout applied to lookups and version queries.
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    async fn run<S: AsRef<OsStr>>(
        &self,
        command: &Path,
        args: &[S],
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, IntegrationError> {
        let mut cmd = Command::new(command);
        cmd.args(args);

        let started = Instant::now();
        let timeout = Some(options.timeout);
        match process::run_command(
            cmd,
            command,
            timeout,
            options.capture_output,
            options.capture_error,
        )
        .await
        {
            Ok(output) => Ok(ExecutionResult::from_output(output, started.elapsed())),
            Err(error @ (IntegrationError::Spawn { .. } | IntegrationError::Timeout { .. })) => {
                debug!(?error, binary = ?command, "command did not complete");
                Ok(ExecutionResult::failed(error.to_string(), started.elapsed()))
            }
            Err(error) => Err(error),
        }
    }
}

fn is_explicit_path(command: &Path) -> bool {
    command.components().count() > 1 || command.is_absolute()
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute_command(
        &self,
        command: &Path,
        args: &[String],
        options: &ExecutionOptions,
    ) -> Result<ExecutionResult, IntegrationError> {
        self.run(command, args, options).await
    }

    async fn is_command_available(&self, command: &Path) -> Result<bool, IntegrationError> {
        if is_explicit_path(command) {
            return Ok(tokio::fs::metadata(command)
                .await
                .map(|metadata| metadata.is_file())
                .unwrap_or(false));
        }

        let options = ExecutionOptions::with_timeout(self.probe_timeout);
        let result = self
            .run(&self.lookup_command, &[command.as_os_str()], &options)
            .await?;
        Ok(result.success && !result.stdout.trim().is_empty())
    }

    async fn command_version(&self, command: &Path) -> Result<Option<String>, IntegrationError> {
        let options = ExecutionOptions::with_timeout(self.probe_timeout);
        let result = self.run(command, &[VERSION_FLAG], &options).await?;
        if !result.success {
            return Ok(None);
        }
        Ok(parse_version_output(&result.stdout).version)
    }
}
