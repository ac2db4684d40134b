use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Errors surfaced by the Codex integration layer.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("configuration file `{path}` does not exist")]
    ConfigNotFound { path: PathBuf },
    #[error("configuration file `{path}` is not valid structured data: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },
    #[error("configuration is invalid: {reason}")]
    InvalidConfiguration { reason: String },
    #[error("failed to read `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write `{path}`: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create directory `{path}`: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {context}: {reason}")]
    Encode {
        context: &'static str,
        reason: String,
    },
    #[error("codex binary `{binary}` is not available")]
    CliUnavailable { binary: PathBuf },
    #[error("Integration not initialized")]
    NotInitialized,
    #[error("No configuration available")]
    NoConfiguration,
    #[error("template generation failed: {reason}")]
    TemplateGeneration { reason: String },
    #[error("template `{template}` has unresolved placeholders: {}", placeholders.join(", "))]
    UnresolvedPlaceholders {
        template: String,
        placeholders: Vec<String>,
    },
    #[error("binary `{binary}` could not be spawned: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{binary}` exceeded timeout of {timeout:?}")]
    Timeout { binary: PathBuf, timeout: Duration },
    #[error("failed to wait for child process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to capture child output: {0}")]
    Capture(#[source] std::io::Error),
    #[error("child stdout unavailable")]
    StdoutUnavailable,
    #[error("child stderr unavailable")]
    StderrUnavailable,
    #[error("failed to join output task: {0}")]
    Join(#[from] tokio::task::JoinError),
}
