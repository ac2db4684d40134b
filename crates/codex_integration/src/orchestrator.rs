use std::{fmt, time::SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    classifier::{ClassifiedError, ErrorCategory, ErrorClassifier, ErrorContext},
    probe::{CliProbe, ValidationOutcome},
    template::TemplateGenerator,
    Configuration, IntegrationError,
};

/// Lifecycle state of an [`IntegrationOrchestrator`].
///
/// `Initializing` and `Validating` are only held while the corresponding call is in
/// flight.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationState {
    #[default]
    NotInitialized,
    Initializing,
    Initialized,
    Validating,
    Validated,
    Error,
}

impl fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntegrationState::NotInitialized => "NOT_INITIALIZED",
            IntegrationState::Initializing => "INITIALIZING",
            IntegrationState::Initialized => "INITIALIZED",
            IntegrationState::Validating => "VALIDATING",
            IntegrationState::Validated => "VALIDATED",
            IntegrationState::Error => "ERROR",
        };
        f.write_str(label)
    }
}

/// Snapshot of the integration lifecycle.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    pub is_initialized: bool,
    pub is_configured: bool,
    pub cli_available: bool,
    pub templates_generated: bool,
    pub last_validation: Option<SystemTime>,
    pub error_count: u32,
    pub status: IntegrationState,
}

/// Sequences probing and template generation for one integration session.
///
/// Mutating calls take `&mut self`, so one instance has exactly one writer at a time.
/// Share an instance across tasks by wrapping it in a `tokio::sync::Mutex`.
///
/// Error policy:
/// - [`initialize`](Self::initialize) never fails; failed steps are recorded in the
///   status (`ERROR`, `errorCount`) and in [`last_error`](Self::last_error).
/// - [`validate`](Self::validate) returns negative probe outcomes as values and fails
///   only when called before `initialize` or when the probe itself errors.
/// - [`generate_command_templates`](Self::generate_command_templates) propagates
///   generator failures.
pub struct IntegrationOrchestrator<P, G> {
    probe: P,
    generator: G,
    classifier: ErrorClassifier,
    config: Option<Configuration>,
    status: IntegrationStatus,
    last_error: Option<ClassifiedError>,
}

impl<P, G> fmt::Debug for IntegrationOrchestrator<P, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationOrchestrator")
            .field("config", &self.config)
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<P, G> IntegrationOrchestrator<P, G>
where
    P: CliProbe,
    G: TemplateGenerator,
{
    pub fn new(probe: P, generator: G) -> Self {
        Self {
            probe,
            generator,
            classifier: ErrorClassifier::default(),
            config: None,
            status: IntegrationStatus::default(),
            last_error: None,
        }
    }

    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Stores `config`, checks CLI availability, and generates templates when the CLI
    /// is present. Always completes with `is_initialized` set.
    pub async fn initialize(&mut self, config: Configuration) {
        self.set_state(IntegrationState::Initializing);
        self.status.is_configured = true;
        self.status.templates_generated = false;
        self.config = Some(config);

        let mut failed = false;
        match self.probe.is_available().await {
            Ok(true) => {
                self.status.cli_available = true;
                if let Err(error) = self.run_generator().await {
                    self.record_failure(&error, ErrorCategory::FileSystem, "generate_templates");
                    failed = true;
                }
            }
            Ok(false) => {
                self.status.cli_available = false;
                debug!("codex cli unavailable; skipping template generation");
            }
            Err(error) => {
                self.status.cli_available = false;
                self.record_failure(&error, ErrorCategory::CliExecution, "check_availability");
                failed = true;
            }
        }

        self.status.is_initialized = true;
        self.set_state(if failed {
            IntegrationState::Error
        } else {
            IntegrationState::Initialized
        });
    }

    /// Runs the probe and records the validation time.
    pub async fn validate(&mut self) -> Result<ValidationOutcome, IntegrationError> {
        if !self.status.is_initialized {
            return Err(IntegrationError::NotInitialized);
        }

        let previous = self.status.status;
        self.set_state(IntegrationState::Validating);
        match self.probe.validate().await {
            Ok(outcome) => {
                self.status.last_validation = Some(SystemTime::now());
                if outcome.is_success() {
                    self.set_state(IntegrationState::Validated);
                } else {
                    debug!(result = %outcome.result, "codex validation reported a problem");
                    self.set_state(previous);
                }
                Ok(outcome)
            }
            Err(error) => {
                self.record_failure(&error, ErrorCategory::CliExecution, "validate");
                self.set_state(IntegrationState::Error);
                Err(error)
            }
        }
    }

    /// Generates templates for the stored configuration.
    pub async fn generate_command_templates(&mut self) -> Result<(), IntegrationError> {
        if !self.status.is_initialized {
            return Err(IntegrationError::NotInitialized);
        }
        if self.config.is_none() {
            return Err(IntegrationError::NoConfiguration);
        }
        self.run_generator().await
    }

    pub fn status(&self) -> &IntegrationStatus {
        &self.status
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.config.as_ref()
    }

    /// Most recent soft-failed or propagated step, classified.
    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.last_error.as_ref()
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Returns to the freshly constructed state, dropping the stored configuration.
    pub fn reset(&mut self) {
        self.status = IntegrationStatus::default();
        self.config = None;
        self.last_error = None;
        debug!("codex integration reset");
    }

    async fn run_generator(&mut self) -> Result<(), IntegrationError> {
        let config = self.config.as_ref().ok_or(IntegrationError::NoConfiguration)?;
        self.generator.generate_templates(config).await?;
        self.status.templates_generated = true;
        debug!(path = %config.template_path, "codex templates generated");
        Ok(())
    }

    fn record_failure(
        &mut self,
        error: &IntegrationError,
        category: ErrorCategory,
        operation: &str,
    ) {
        self.status.error_count += 1;
        let context = ErrorContext::new(operation).component("codex-integration");
        let classified = self.classifier.handle(error, category, &context);
        warn!(
            ?error,
            code = %classified.code,
            error_count = self.status.error_count,
            "codex integration step failed"
        );
        self.last_error = Some(classified);
    }

    fn set_state(&mut self, state: IntegrationState) {
        if self.status.status != state {
            debug!(from = %self.status.status, to = %state, "codex integration state change");
        }
        self.status.status = state;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::probe::ValidationResult;

    #[derive(Clone, Copy)]
    enum Availability {
        Present,
        Missing,
        Broken,
    }

    struct FakeProbe {
        availability: Availability,
        outcome: Mutex<Option<Result<ValidationOutcome, IntegrationError>>>,
    }

    impl FakeProbe {
        fn new(availability: Availability) -> Self {
            Self {
                availability,
                outcome: Mutex::new(None),
            }
        }

        fn with_outcome(self, outcome: Result<ValidationOutcome, IntegrationError>) -> Self {
            *self.outcome.lock().unwrap() = Some(outcome);
            self
        }
    }

    fn outcome(result: ValidationResult) -> ValidationOutcome {
        ValidationOutcome {
            result,
            cli_path: None,
            version: None,
            error_message: None,
            suggestions: Vec::new(),
            timestamp: SystemTime::now(),
        }
    }

    #[async_trait]
    impl CliProbe for FakeProbe {
        async fn is_available(&self) -> Result<bool, IntegrationError> {
            match self.availability {
                Availability::Present => Ok(true),
                Availability::Missing => Ok(false),
                Availability::Broken => Err(IntegrationError::Wait {
                    source: std::io::Error::other("which crashed"),
                }),
            }
        }

        async fn validate(&self) -> Result<ValidationOutcome, IntegrationError> {
            self.outcome
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok(outcome(ValidationResult::Success)))
        }
    }

    #[derive(Clone, Default)]
    struct FakeGenerator {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TemplateGenerator for FakeGenerator {
        async fn generate_templates(&self, _config: &Configuration) -> Result<(), IntegrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IntegrationError::WriteFile {
                    path: "templates/codex-exec.json".into(),
                    source: std::io::ErrorKind::PermissionDenied.into(),
                });
            }
            Ok(())
        }
    }

    fn orchestrator(
        probe: FakeProbe,
        generator: FakeGenerator,
    ) -> IntegrationOrchestrator<FakeProbe, FakeGenerator> {
        IntegrationOrchestrator::new(probe, generator)
    }

    #[tokio::test]
    async fn initialize_with_cli_generates_templates() {
        let generator = FakeGenerator::default();
        let mut orch = orchestrator(FakeProbe::new(Availability::Present), generator.clone());
        orch.initialize(Configuration::default()).await;

        let status = orch.status();
        assert!(status.is_initialized);
        assert!(status.is_configured);
        assert!(status.cli_available);
        assert!(status.templates_generated);
        assert_eq!(status.status, IntegrationState::Initialized);
        assert_eq!(status.error_count, 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(orch.last_error().is_none());
    }

    #[tokio::test]
    async fn availability_error_is_soft_failed() {
        let generator = FakeGenerator::default();
        let mut orch = orchestrator(FakeProbe::new(Availability::Broken), generator.clone());
        orch.initialize(Configuration::default()).await;

        let status = orch.status();
        assert!(status.is_initialized);
        assert!(!status.cli_available);
        assert_eq!(status.status, IntegrationState::Error);
        assert_eq!(status.error_count, 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        let last = orch.last_error().expect("classified failure");
        assert_eq!(last.detail("operation").and_then(|v| v.as_str()), Some("check_availability"));
    }

    #[tokio::test]
    async fn missing_cli_skips_generation_without_error() {
        let generator = FakeGenerator::default();
        let mut orch = orchestrator(FakeProbe::new(Availability::Missing), generator.clone());
        orch.initialize(Configuration::default()).await;

        let status = orch.status();
        assert!(status.is_initialized);
        assert!(!status.cli_available);
        assert!(!status.templates_generated);
        assert_eq!(status.status, IntegrationState::Initialized);
        assert_eq!(status.error_count, 0);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generator_failure_during_initialize_is_recorded() {
        let generator = FakeGenerator {
            fail: true,
            ..Default::default()
        };
        let mut orch = orchestrator(FakeProbe::new(Availability::Present), generator);
        orch.initialize(Configuration::default()).await;

        let status = orch.status();
        assert!(status.is_initialized);
        assert!(status.cli_available);
        assert!(!status.templates_generated);
        assert_eq!(status.status, IntegrationState::Error);
        assert_eq!(status.error_count, 1);

        let last = orch.last_error().expect("classified failure");
        assert_eq!(last.code, "PERMISSION_DENIED");
        assert_eq!(
            last.detail("operation").and_then(|v| v.as_str()),
            Some("generate_templates")
        );
    }

    #[tokio::test]
    async fn reinitialize_without_cli_clears_generated_flag() {
        let generator = FakeGenerator::default();
        let mut orch = orchestrator(FakeProbe::new(Availability::Present), generator.clone());
        orch.initialize(Configuration::default()).await;
        assert!(orch.status().templates_generated);

        orch.probe.availability = Availability::Missing;
        orch.initialize(Configuration::default()).await;

        let status = orch.status();
        assert!(!status.cli_available);
        assert!(!status.templates_generated);
        assert_eq!(status.status, IntegrationState::Initialized);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validate_before_initialize_fails() {
        let mut orch = orchestrator(
            FakeProbe::new(Availability::Present),
            FakeGenerator::default(),
        );
        let err = orch.validate().await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotInitialized));
        assert!(err.to_string().contains("not initialized"));
        assert!(orch.status().last_validation.is_none());
    }

    #[tokio::test]
    async fn successful_validation_marks_validated() {
        let mut orch = orchestrator(
            FakeProbe::new(Availability::Present),
            FakeGenerator::default(),
        );
        orch.initialize(Configuration::default()).await;
        let outcome = orch.validate().await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(orch.status().status, IntegrationState::Validated);
        assert!(orch.status().last_validation.is_some());
    }

    #[tokio::test]
    async fn negative_validation_is_returned_not_raised() {
        let probe = FakeProbe::new(Availability::Missing)
            .with_outcome(Ok(outcome(ValidationResult::CliNotFound)));
        let mut orch = orchestrator(probe, FakeGenerator::default());
        orch.initialize(Configuration::default()).await;

        let result = orch.validate().await.unwrap();
        assert_eq!(result.result, ValidationResult::CliNotFound);
        assert_eq!(orch.status().status, IntegrationState::Initialized);
        assert!(orch.status().last_validation.is_some());
        assert_eq!(orch.status().error_count, 0);
    }

    #[tokio::test]
    async fn probe_errors_propagate_from_validate() {
        let probe = FakeProbe::new(Availability::Present)
            .with_outcome(Err(IntegrationError::StdoutUnavailable));
        let mut orch = orchestrator(probe, FakeGenerator::default());
        orch.initialize(Configuration::default()).await;

        let err = orch.validate().await.unwrap_err();
        assert!(matches!(err, IntegrationError::StdoutUnavailable));
        assert_eq!(orch.status().status, IntegrationState::Error);
        assert_eq!(orch.status().error_count, 1);
        assert!(orch.status().last_validation.is_none());
    }

    #[tokio::test]
    async fn generate_requires_initialization() {
        let generator = FakeGenerator::default();
        let mut orch = orchestrator(FakeProbe::new(Availability::Missing), generator.clone());
        let err = orch.generate_command_templates().await.unwrap_err();
        assert!(matches!(err, IntegrationError::NotInitialized));

        orch.initialize(Configuration::default()).await;
        orch.generate_command_templates().await.unwrap();
        assert!(orch.status().templates_generated);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn generate_propagates_generator_failure() {
        let generator = FakeGenerator {
            fail: true,
            ..Default::default()
        };
        let mut orch = orchestrator(FakeProbe::new(Availability::Missing), generator);
        orch.initialize(Configuration::default()).await;

        let err = orch.generate_command_templates().await.unwrap_err();
        assert!(matches!(err, IntegrationError::WriteFile { .. }));
        assert!(!orch.status().templates_generated);
    }

    #[tokio::test]
    async fn reset_restores_zero_state() {
        let mut orch = orchestrator(
            FakeProbe::new(Availability::Broken),
            FakeGenerator::default(),
        );
        orch.initialize(Configuration::default()).await;
        orch.validate().await.unwrap();
        assert_ne!(orch.status(), &IntegrationStatus::default());

        orch.reset();
        let status = orch.status();
        assert!(!status.is_initialized);
        assert!(!status.is_configured);
        assert!(!status.cli_available);
        assert!(!status.templates_generated);
        assert_eq!(status.error_count, 0);
        assert!(status.last_validation.is_none());
        assert_eq!(status.status, IntegrationState::NotInitialized);
        assert!(orch.configuration().is_none());
        assert!(orch.last_error().is_none());
    }

    #[test]
    fn status_serializes_camel_case() {
        let value = serde_json::to_value(IntegrationStatus::default()).unwrap();
        assert_eq!(value["status"], "NOT_INITIALIZED");
        assert_eq!(value["errorCount"], 0);
        assert!(value["lastValidation"].is_null());
    }
}
