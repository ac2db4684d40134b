#![forbid(unsafe_code)]
//! Orchestration for an optional, externally installed Codex CLI.
//!
//! The crate tracks whether `codex` is installed and healthy, renders parameterized
//! command templates for it, persists the integration configuration, and turns every
//! failure into a uniform [`ClassifiedError`] with actionable suggestions.
//!
//! ## Pieces
//! - [`ConfigurationStore`] loads, saves, validates, and merges [`Configuration`] files
//!   (JSON by default, TOML for `.toml` paths). [`ConfigPatch`] expresses overrides;
//!   `"cliPath": null` clears the pinned binary.
//! - [`CodexProbe`] checks availability (`which`/`where`), runs `codex --version` under a
//!   timeout (10s by default), and classifies the outcome as a [`ValidationOutcome`].
//!   Binary resolution honors `cliPath`, then `CODEX_BINARY`, then `codex` on `PATH`.
//! - [`CommandTemplate`] / [`BoundCommand`] validate and render `{name}` placeholders.
//!   Rendering leaves unresolved placeholders in place; use
//!   [`BoundCommand::render_strict`] to reject partial commands.
//! - [`IntegrationOrchestrator`] sequences probing and template generation and exposes
//!   an [`IntegrationStatus`] snapshot.
//! - [`ErrorClassifier`] maps failures by [`ErrorCategory`] into [`ClassifiedError`]s.
//!
//! Nothing here retries: failed or timed-out invocations are classified and returned.
//!
//! ```rust,no_run
//! use codex_integration::{
//!     CodexProbe, ConfigurationStore, FileTemplateGenerator, IntegrationOrchestrator,
//! };
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ConfigurationStore::default();
//! let config = store.load_or_default(".codex/config.json").await?;
//! let probe = CodexProbe::from_config(&config, Arc::new(codex_integration::SystemExecutor::new()));
//! let mut integration = IntegrationOrchestrator::new(probe, FileTemplateGenerator::default());
//! integration.initialize(config).await;
//! let outcome = integration.validate().await?;
//! println!("{} {:?}", outcome.result, integration.status());
//! # Ok(()) }
//! ```

mod classifier;
mod config;
mod defaults;
mod error;
mod executor;
mod fs;
mod orchestrator;
mod probe;
mod process;
mod template;
mod version;

pub use classifier::{
    classify_api_message, ApiErrorKind, ClassifiedError, DefaultErrorHandler, ErrorCategory,
    ErrorClassifier, ErrorContext, ErrorHandler, HandlerError, HandlerResult,
};
pub use config::{
    default_config_path, validate_configuration_value, ConfigFormat, ConfigPatch, Configuration,
    ConfigurationStore,
};
pub use error::IntegrationError;
pub use executor::{CommandExecutor, ExecutionOptions, ExecutionResult, SystemExecutor};
pub use fs::{FileSystem, LocalFileSystem};
pub use orchestrator::{IntegrationOrchestrator, IntegrationState, IntegrationStatus};
pub use probe::{CliProbe, CodexProbe, ValidationOutcome, ValidationResult};
pub use template::{
    builtin_templates, BoundCommand, CommandParameter, CommandTemplate, FileTemplateGenerator,
    ParameterType, ParameterValidator, TemplateGenerator,
};
pub use version::{parse_version_output, CliVersionInfo};
