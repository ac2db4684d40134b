//! Routes heterogeneous failures into a uniform [`ClassifiedError`].
//!
//! File-system, CLI-execution, validation, and configuration failures are delegated to
//! an [`ErrorHandler`]. Codex API failures are matched locally against a small table of
//! message signals (see [`classify_api_message`]). [`ErrorClassifier::handle`] never
//! fails: if the handler itself errors, a generic recoverable result is returned that
//! records both messages.

use std::{
    collections::BTreeMap,
    error::Error as StdError,
    fmt, io,
    str::FromStr,
    sync::Arc,
    time::SystemTime,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::IntegrationError;

const GENERIC_SUGGESTIONS: [&str; 4] = [
    "Check the error details for more information",
    "Verify your configuration and try again",
    "Check system logs for related errors",
    "Contact support if the issue persists",
];

/// Source of a failure, as named by the caller.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    FileSystem,
    CliExecution,
    Validation,
    Configuration,
    CodexApi,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::FileSystem => "file-system",
            ErrorCategory::CliExecution => "cli-execution",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::CodexApi => "codex-api",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to [`ErrorCategory::Unknown`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "file-system" => ErrorCategory::FileSystem,
            "cli-execution" => ErrorCategory::CliExecution,
            "validation" => ErrorCategory::Validation,
            "configuration" => ErrorCategory::Configuration,
            "codex-api" => ErrorCategory::CodexApi,
            _ => ErrorCategory::Unknown,
        })
    }
}

/// Where a failure happened.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = Some(component.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// User-facing description of a failure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    pub recoverable: bool,
    pub timestamp: SystemTime,
}

impl ClassifiedError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, recoverable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            suggestions: None,
            recoverable,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = Some(suggestions.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.as_ref().and_then(|details| details.get(key))
    }

    pub fn suggestions(&self) -> &[String] {
        self.suggestions.as_deref().unwrap_or(&[])
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Failure raised by an [`ErrorHandler`] while classifying.
#[derive(Debug)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for HandlerError {}

pub type HandlerResult = Result<ClassifiedError, HandlerError>;

/// Per-category classification used by [`ErrorClassifier`].
pub trait ErrorHandler: Send + Sync {
    fn handle_file_system_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult;

    fn handle_cli_execution_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult;

    fn handle_validation_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult;

    fn handle_configuration_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult;

    fn create_user_friendly_error(&self, error: &ClassifiedError) -> String {
        let mut out = error.message.clone();
        let suggestions = error.suggestions();
        if !suggestions.is_empty() {
            out.push_str("\n\nSuggestions:");
            for (index, suggestion) in suggestions.iter().enumerate() {
                out.push_str(&format!("\n  {}. {suggestion}", index + 1));
            }
        }
        out
    }
}

fn find_in_chain<'a, T: StdError + 'static>(error: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(found) = err.downcast_ref::<T>() {
            return Some(found);
        }
        current = err.source();
    }
    None
}

fn with_context(error: ClassifiedError, context: &ErrorContext) -> ClassifiedError {
    let mut error = error.with_detail("operation", context.operation.clone());
    if let Some(component) = &context.component {
        error = error.with_detail("component", component.clone());
    }
    for (key, value) in &context.metadata {
        error = error.with_detail(key.clone(), value.clone());
    }
    error
}

/// Built-in [`ErrorHandler`] keyed on `io::ErrorKind` and [`IntegrationError`] variants.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle_file_system_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult {
        let kind = find_in_chain::<io::Error>(error).map(io::Error::kind);
        let classified = match kind {
            Some(io::ErrorKind::NotFound) => {
                ClassifiedError::new("FILE_NOT_FOUND", format!("File not found: {error}"), true)
                    .with_suggestions([
                        "Check that the path exists",
                        "Verify the path is spelled correctly",
                        "Create the missing file or directory",
                    ])
            }
            Some(io::ErrorKind::PermissionDenied) => ClassifiedError::new(
                "PERMISSION_DENIED",
                format!("Permission denied: {error}"),
                true,
            )
            .with_suggestions([
                "Check file permissions",
                "Run with appropriate privileges",
                "Verify the file is not locked by another process",
            ]),
            Some(io::ErrorKind::AlreadyExists) => ClassifiedError::new(
                "FILE_EXISTS",
                format!("File already exists: {error}"),
                true,
            )
            .with_suggestions([
                "Remove or rename the existing file",
                "Choose a different destination path",
            ]),
            _ => ClassifiedError::new(
                "FILE_SYSTEM_ERROR",
                format!("File system error: {error}"),
                true,
            )
            .with_suggestions([
                "Check available disk space",
                "Verify the path is accessible",
                "Try the operation again",
            ]),
        };
        Ok(with_context(classified, context))
    }

    fn handle_cli_execution_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult {
        let classified = match find_in_chain::<IntegrationError>(error) {
            Some(IntegrationError::CliUnavailable { .. }) => ClassifiedError::new(
                "CLI_NOT_FOUND",
                format!("Codex CLI is not available: {error}"),
                true,
            )
            .with_suggestions([
                "Install Codex CLI",
                "Add Codex CLI to your PATH",
                "Set `cliPath` in the integration configuration",
            ]),
            Some(IntegrationError::Spawn { source, .. })
                if source.kind() == io::ErrorKind::NotFound =>
            {
                ClassifiedError::new(
                    "CLI_NOT_FOUND",
                    format!("Codex CLI could not be started: {error}"),
                    true,
                )
                .with_suggestions([
                    "Install Codex CLI",
                    "Add Codex CLI to your PATH",
                    "Set `cliPath` in the integration configuration",
                ])
            }
            Some(IntegrationError::Timeout { timeout, .. }) => ClassifiedError::new(
                "CLI_TIMEOUT",
                format!("Codex CLI timed out: {error}"),
                true,
            )
            .with_detail("timeoutMs", timeout.as_millis() as u64)
            .with_suggestions([
                "Increase the configured timeout",
                "Check whether Codex CLI is waiting for input",
                "Try running the command manually",
            ]),
            _ => ClassifiedError::new(
                "CLI_EXECUTION_ERROR",
                format!("Codex CLI execution failed: {error}"),
                true,
            )
            .with_suggestions([
                "Check Codex CLI installation",
                "Review the command arguments",
                "Try running the command manually",
            ]),
        };
        Ok(with_context(classified, context))
    }

    fn handle_validation_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult {
        let classified = ClassifiedError::new(
            "VALIDATION_ERROR",
            format!("Validation failed: {error}"),
            true,
        )
        .with_suggestions([
            "Check the supplied values",
            "Provide every required parameter",
            "Review the expected format",
        ]);
        Ok(with_context(classified, context))
    }

    fn handle_configuration_error(
        &self,
        error: &(dyn StdError + 'static),
        context: &ErrorContext,
    ) -> HandlerResult {
        let classified = match find_in_chain::<IntegrationError>(error) {
            Some(IntegrationError::ConfigNotFound { path }) => ClassifiedError::new(
                "CONFIG_NOT_FOUND",
                format!("Configuration file not found: {}", path.display()),
                true,
            )
            .with_detail("path", path.display().to_string())
            .with_suggestions([
                "Create a configuration file",
                "Use the default configuration",
                "Check the configuration path",
            ]),
            Some(IntegrationError::InvalidFormat { path, reason }) => ClassifiedError::new(
                "CONFIG_INVALID_FORMAT",
                format!("Configuration file could not be parsed: {reason}"),
                true,
            )
            .with_detail("path", path.display().to_string())
            .with_suggestions([
                "Fix the syntax error in the configuration file",
                "Validate the file with a JSON or TOML linter",
                "Regenerate the configuration from defaults",
            ]),
            Some(IntegrationError::InvalidConfiguration { reason }) => ClassifiedError::new(
                "CONFIG_INVALID",
                format!("Configuration is invalid: {reason}"),
                true,
            )
            .with_suggestions([
                "Ensure `timeout` is greater than zero",
                "Ensure `templatePath` is not empty",
                "Compare against the default configuration",
            ]),
            _ => ClassifiedError::new(
                "CONFIGURATION_ERROR",
                format!("Configuration error: {error}"),
                true,
            )
            .with_suggestions([
                "Check the configuration file",
                "Reset to the default configuration",
            ]),
        };
        Ok(with_context(classified, context))
    }
}

/// Codex API error kinds recognized from message text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ApiErrorKind {
    RateLimitExceeded,
    AuthenticationError,
    ConnectionError,
    ResourceNotFound,
    PermissionDenied,
    InvalidRequest,
    UnknownApiError,
}

impl ApiErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ApiErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ApiErrorKind::ConnectionError => "CONNECTION_ERROR",
            ApiErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ApiErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ApiErrorKind::InvalidRequest => "INVALID_REQUEST",
            ApiErrorKind::UnknownApiError => "UNKNOWN_API_ERROR",
        }
    }

    pub fn suggestions(self) -> &'static [&'static str] {
        match self {
            ApiErrorKind::RateLimitExceeded => &[
                "Wait before retrying the request",
                "Check API rate limits",
                "Implement exponential backoff",
                "Contact Codex support if issue persists",
            ],
            ApiErrorKind::AuthenticationError => &[
                "Check your API credentials",
                "Verify your authentication token",
                "Re-authenticate with Codex",
            ],
            ApiErrorKind::ConnectionError => &[
                "Check your internet connection",
                "Verify Codex service status",
                "Try again in a few moments",
                "Check firewall settings",
            ],
            ApiErrorKind::ResourceNotFound => &[
                "Verify the resource exists",
                "Check the request parameters",
                "Ensure you have access to the resource",
            ],
            ApiErrorKind::PermissionDenied => &[
                "Check your account permissions",
                "Verify access rights for this operation",
                "Contact your administrator",
            ],
            ApiErrorKind::InvalidRequest => &[
                "Check the request format",
                "Verify all required parameters",
                "Review the API documentation",
            ],
            ApiErrorKind::UnknownApiError => &[
                "Check Codex service status",
                "Review the error details",
                "Try the request again",
                "Contact Codex support if issue persists",
            ],
        }
    }

    fn message(self) -> &'static str {
        match self {
            ApiErrorKind::RateLimitExceeded => "Codex API rate limit exceeded",
            ApiErrorKind::AuthenticationError => "Codex API authentication failed",
            ApiErrorKind::ConnectionError => "Could not connect to the Codex API",
            ApiErrorKind::ResourceNotFound => "Codex API resource not found",
            ApiErrorKind::PermissionDenied => "Codex API permission denied",
            ApiErrorKind::InvalidRequest => "Codex API rejected the request",
            ApiErrorKind::UnknownApiError => "Codex API request failed",
        }
    }

    fn recoverable(self) -> bool {
        !matches!(
            self,
            ApiErrorKind::AuthenticationError | ApiErrorKind::PermissionDenied
        )
    }
}

/// Best-effort mapping from an API error message to an [`ApiErrorKind`].
///
/// Signals are checked in table order against the lower-cased message.
pub fn classify_api_message(message: &str) -> ApiErrorKind {
    const SIGNALS: &[(&[&str], ApiErrorKind)] = &[
        (&["rate limit"], ApiErrorKind::RateLimitExceeded),
        (
            &["authentication", "unauthorized"],
            ApiErrorKind::AuthenticationError,
        ),
        (&["timeout", "connection"], ApiErrorKind::ConnectionError),
        (&["not found", "404"], ApiErrorKind::ResourceNotFound),
        (&["permission", "forbidden"], ApiErrorKind::PermissionDenied),
        (&["invalid", "bad request"], ApiErrorKind::InvalidRequest),
    ];

    let lower = message.to_lowercase();
    SIGNALS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ApiErrorKind::UnknownApiError)
}

/// Front door for turning failures into [`ClassifiedError`]s.
#[derive(Clone)]
pub struct ErrorClassifier {
    handler: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for ErrorClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorClassifier").finish_non_exhaustive()
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Arc::new(DefaultErrorHandler))
    }
}

impl ErrorClassifier {
    pub fn new(handler: Arc<dyn ErrorHandler>) -> Self {
        Self { handler }
    }

    pub fn handle(
        &self,
        error: &(dyn StdError + 'static),
        category: ErrorCategory,
        context: &ErrorContext,
    ) -> ClassifiedError {
        let delegated = match category {
            ErrorCategory::FileSystem => self.handler.handle_file_system_error(error, context),
            ErrorCategory::CliExecution => self.handler.handle_cli_execution_error(error, context),
            ErrorCategory::Validation => self.handler.handle_validation_error(error, context),
            ErrorCategory::Configuration => {
                self.handler.handle_configuration_error(error, context)
            }
            ErrorCategory::CodexApi => return codex_api_error(error, context),
            ErrorCategory::Unknown => return unknown_error(error, context),
        };

        match delegated {
            Ok(classified) => ensure_suggestions(classified),
            Err(handling) => {
                warn!(
                    category = %category,
                    operation = %context.operation,
                    error = %handling,
                    "error handler failed; using fallback classification"
                );
                ClassifiedError::new(
                    "ERROR_HANDLING_FAILED",
                    format!("An error occurred while handling another error: {error}"),
                    true,
                )
                .with_detail("originalError", error.to_string())
                .with_detail("handlingError", handling.to_string())
                .with_detail("category", category.as_str())
                .with_suggestions(GENERIC_SUGGESTIONS)
            }
        }
    }

    /// Like [`ErrorClassifier::handle`] with the category given by name.
    pub fn handle_named(
        &self,
        error: &(dyn StdError + 'static),
        category: &str,
        context: &ErrorContext,
    ) -> ClassifiedError {
        let category = category.parse().unwrap_or(ErrorCategory::Unknown);
        self.handle(error, category, context)
    }

    pub fn user_message(&self, error: &ClassifiedError) -> String {
        self.handler.create_user_friendly_error(error)
    }
}

fn ensure_suggestions(mut error: ClassifiedError) -> ClassifiedError {
    if error.suggestions().is_empty() {
        error.suggestions = Some(GENERIC_SUGGESTIONS.iter().map(|s| s.to_string()).collect());
    }
    error
}

fn codex_api_error(error: &(dyn StdError + 'static), context: &ErrorContext) -> ClassifiedError {
    let original = error.to_string();
    let kind = classify_api_message(&original);
    ClassifiedError::new(
        "CODEX_API_ERROR",
        format!("{}: {original}", kind.message()),
        kind.recoverable(),
    )
    .with_detail("errorType", kind.as_str())
    .with_detail("originalMessage", original)
    .with_detail("operation", context.operation.clone())
    .with_suggestions(kind.suggestions().iter().copied())
}

fn unknown_error(error: &(dyn StdError + 'static), context: &ErrorContext) -> ClassifiedError {
    ClassifiedError::new("UNKNOWN_ERROR", format!("Unexpected error: {error}"), true)
        .with_detail("originalError", error.to_string())
        .with_detail("operation", context.operation.clone())
        .with_suggestions(GENERIC_SUGGESTIONS)
}
