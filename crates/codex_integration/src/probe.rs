use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    defaults::{default_binary_path, DEFAULT_TIMEOUT, PATH_LOOKUP_COMMAND, VERSION_FLAG},
    executor::{CommandExecutor, ExecutionOptions, ExecutionResult, SystemExecutor},
    version::parse_version_output,
    Configuration, IntegrationError,
};

const NOT_FOUND_SUGGESTIONS: [&str; 3] = [
    "Install Codex CLI",
    "Add Codex CLI to your PATH",
    "Verify Codex CLI installation",
];
const PERMISSION_SUGGESTIONS: [&str; 3] = [
    "Check file permissions",
    "Run with appropriate privileges",
    "Verify user permissions",
];
const INVALID_SUGGESTIONS: [&str; 3] = [
    "Check Codex CLI installation",
    "Verify Codex CLI configuration",
    "Try reinstalling Codex CLI",
];
const UNKNOWN_SUGGESTIONS: [&str; 3] = [
    "Check system configuration",
    "Verify Codex CLI installation",
    "Try running the command manually",
];

/// Classification of a probe run.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationResult {
    Success,
    CliNotFound,
    CliInvalid,
    PermissionDenied,
    UnknownError,
}

impl ValidationResult {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationResult::Success => "SUCCESS",
            ValidationResult::CliNotFound => "CLI_NOT_FOUND",
            ValidationResult::CliInvalid => "CLI_INVALID",
            ValidationResult::PermissionDenied => "PERMISSION_DENIED",
            ValidationResult::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`CodexProbe::validate`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub result: ValidationResult,
    pub cli_path: Option<String>,
    pub version: Option<String>,
    pub error_message: Option<String>,
    pub suggestions: Vec<String>,
    pub timestamp: SystemTime,
}

impl ValidationOutcome {
    fn new(result: ValidationResult) -> Self {
        Self {
            result,
            cli_path: None,
            version: None,
            error_message: None,
            suggestions: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    fn failure(result: ValidationResult, message: String, suggestions: &[&str]) -> Self {
        Self {
            error_message: Some(message),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            ..Self::new(result)
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == ValidationResult::Success
    }
}

/// Availability and health checks consumed by the orchestrator.
#[async_trait]
pub trait CliProbe: Send + Sync {
    async fn is_available(&self) -> Result<bool, IntegrationError>;

    async fn validate(&self) -> Result<ValidationOutcome, IntegrationError>;
}

/// Probes a Codex binary through a [`CommandExecutor`].
#[derive(Clone)]
pub struct CodexProbe {
    binary: PathBuf,
    timeout: Duration,
    executor: Arc<dyn CommandExecutor>,
}

impl fmt::Debug for CodexProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodexProbe")
            .field("binary", &self.binary)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for CodexProbe {
    fn default() -> Self {
        Self::new(Arc::new(SystemExecutor::default()))
    }
}

impl CodexProbe {
    /// Probe for `CODEX_BINARY` (or `codex` on `PATH`) with the default 10s timeout.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            binary: default_binary_path(),
            timeout: DEFAULT_TIMEOUT,
            executor,
        }
    }

    /// Uses `cliPath` and `timeout` from `config` when set.
    pub fn from_config(config: &Configuration, executor: Arc<dyn CommandExecutor>) -> Self {
        let mut probe = Self::new(executor).timeout(config.timeout_duration());
        if let Some(path) = config.cli_path.as_deref() {
            probe = probe.binary(path);
        }
        probe
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    /// True when the binary can be located; lookup failures count as unavailable.
    pub async fn is_available(&self) -> bool {
        match self.executor.is_command_available(&self.binary).await {
            Ok(available) => available,
            Err(error) => {
                debug!(?error, binary = ?self.binary, "codex availability check failed");
                false
            }
        }
    }

    /// Checks presence, then runs `codex --version` and classifies the result.
    pub async fn validate(&self) -> ValidationOutcome {
        if !self.is_available().await {
            debug!(binary = ?self.binary, "codex binary not found");
            return ValidationOutcome::failure(
                ValidationResult::CliNotFound,
                format!("Codex CLI `{}` was not found", self.binary.display()),
                &NOT_FOUND_SUGGESTIONS,
            );
        }

        let options = ExecutionOptions::with_timeout(self.timeout);
        let args = [VERSION_FLAG.to_string()];
        let result = match self
            .executor
            .execute_command(&self.binary, &args, &options)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                warn!(?error, binary = ?self.binary, "codex --version probe failed");
                return ValidationOutcome::failure(
                    ValidationResult::UnknownError,
                    error.to_string(),
                    &UNKNOWN_SUGGESTIONS,
                );
            }
        };

        if result.success {
            let version = parse_version_output(&result.stdout)
                .version
                .or_else(|| non_blank(&result.stdout));
            return ValidationOutcome {
                cli_path: self.path().await,
                version,
                ..ValidationOutcome::new(ValidationResult::Success)
            };
        }

        classify_failure(&self.binary, &result)
    }

    /// Resolves the binary location via `which`/`where`.
    pub async fn path(&self) -> Option<String> {
        let options = ExecutionOptions::with_timeout(self.timeout);
        let args = [self.binary.to_string_lossy().into_owned()];
        match self
            .executor
            .execute_command(Path::new(PATH_LOOKUP_COMMAND), &args, &options)
            .await
        {
            Ok(result) if result.success => first_non_blank_line(&result.stdout),
            Ok(_) => None,
            Err(error) => {
                debug!(?error, binary = ?self.binary, "codex path lookup failed");
                None
            }
        }
    }

    pub async fn version(&self) -> Option<String> {
        match self.executor.command_version(&self.binary).await {
            Ok(version) => version,
            Err(error) => {
                debug!(?error, binary = ?self.binary, "codex version query failed");
                None
            }
        }
    }

    /// Runs `codex <command> <args...>` with the probe timeout and returns the raw result.
    pub async fn execute_command(
        &self,
        command: &str,
        args: &[String],
    ) -> Result<ExecutionResult, IntegrationError> {
        if !self.is_available().await {
            return Err(IntegrationError::CliUnavailable {
                binary: self.binary.clone(),
            });
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(command.to_string());
        argv.extend(args.iter().cloned());
        let options = ExecutionOptions::with_timeout(self.timeout);
        self.executor
            .execute_command(&self.binary, &argv, &options)
            .await
    }
}

#[async_trait]
impl CliProbe for CodexProbe {
    async fn is_available(&self) -> Result<bool, IntegrationError> {
        Ok(CodexProbe::is_available(self).await)
    }

    async fn validate(&self) -> Result<ValidationOutcome, IntegrationError> {
        Ok(CodexProbe::validate(self).await)
    }
}

fn classify_failure(binary: &Path, result: &ExecutionResult) -> ValidationOutcome {
    let text = result.failure_text();
    let message = if text.is_empty() {
        format!(
            "`{} {VERSION_FLAG}` exited with {:?}",
            binary.display(),
            result.exit_code
        )
    } else {
        text
    };

    if is_permission_denied(&message) {
        warn!(binary = ?binary, "codex probe denied by permissions");
        ValidationOutcome::failure(
            ValidationResult::PermissionDenied,
            message,
            &PERMISSION_SUGGESTIONS,
        )
    } else {
        warn!(binary = ?binary, exit_code = ?result.exit_code, "codex probe failed");
        ValidationOutcome::failure(ValidationResult::CliInvalid, message, &INVALID_SUGGESTIONS)
    }
}

fn is_permission_denied(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("permission denied") || lower.contains("eacces")
}

fn first_non_blank_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn non_blank(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
