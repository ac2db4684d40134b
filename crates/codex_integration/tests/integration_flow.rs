#[cfg(unix)]
mod support;

#[cfg(unix)]
mod unix {
    use std::{fs, sync::Arc, time::Duration};

    use codex_integration::{
        CodexProbe, Configuration, ErrorCategory, ErrorClassifier, ErrorContext,
        FileTemplateGenerator, IntegrationError, IntegrationOrchestrator, IntegrationState,
        SystemExecutor, ValidationResult,
    };
    use serde_json::Value;
    use tempfile::TempDir;

    use super::support::{write_fake_codex, VERSION_OK};

    fn config_for(dir: &TempDir, cli_path: &std::path::Path) -> Configuration {
        Configuration {
            cli_path: Some(cli_path.display().to_string()),
            template_path: dir.path().join("templates").display().to_string(),
            timeout: 5_000,
            ..Configuration::default()
        }
    }

    fn orchestrator(
        config: &Configuration,
    ) -> IntegrationOrchestrator<CodexProbe, FileTemplateGenerator> {
        let probe = CodexProbe::from_config(config, Arc::new(SystemExecutor::new()));
        IntegrationOrchestrator::new(probe, FileTemplateGenerator::default())
    }

    #[tokio::test]
    async fn available_cli_initializes_and_validates() {
        let dir = TempDir::new().expect("temp dir");
        let codex = write_fake_codex(dir.path(), VERSION_OK);
        let config = config_for(&dir, &codex);
        let mut integration = orchestrator(&config);

        integration.initialize(config.clone()).await;
        let status = integration.status().clone();
        assert!(status.is_initialized);
        assert!(status.cli_available);
        assert!(status.templates_generated);
        assert_eq!(status.status, IntegrationState::Initialized);
        assert_eq!(status.error_count, 0);

        let exec = dir.path().join("templates").join("codex-exec.json");
        let template: Value =
            serde_json::from_str(&fs::read_to_string(exec).expect("template file")).unwrap();
        assert_eq!(template["command"], "codex exec {flags} {prompt}");
        assert_eq!(template["parameters"][0]["name"], "prompt");

        let outcome = integration.validate().await.expect("validate");
        assert_eq!(outcome.result, ValidationResult::Success);
        assert_eq!(outcome.version.as_deref(), Some("0.46.0"));
        assert_eq!(integration.status().status, IntegrationState::Validated);
        assert!(integration.status().last_validation.is_some());
    }

    #[tokio::test]
    async fn unavailable_cli_end_to_end() {
        let dir = TempDir::new().expect("temp dir");
        let config = config_for(&dir, &dir.path().join("no-codex-here"));
        let mut integration = orchestrator(&config);

        let err = integration.validate().await.expect_err("not initialized");
        assert!(matches!(err, IntegrationError::NotInitialized));

        integration.initialize(config).await;
        let status = integration.status();
        assert!(status.is_initialized);
        assert!(!status.cli_available);
        assert!(!status.templates_generated);
        assert_eq!(status.error_count, 0);
        assert!(!dir.path().join("templates").exists());

        let outcome = integration.validate().await.expect("outcome");
        assert_eq!(outcome.result, ValidationResult::CliNotFound);
        assert_eq!(
            outcome.suggestions,
            vec![
                "Install Codex CLI",
                "Add Codex CLI to your PATH",
                "Verify Codex CLI installation"
            ]
        );

        integration.reset();
        assert_eq!(integration.status().status, IntegrationState::NotInitialized);
        assert_eq!(integration.status().error_count, 0);
        assert!(integration.status().last_validation.is_none());
    }

    #[tokio::test]
    async fn timeout_failures_classify_as_cli_timeout() {
        let dir = TempDir::new().expect("temp dir");
        let codex = write_fake_codex(dir.path(), "#!/bin/sh\nsleep 5\n");
        let probe = CodexProbe::new(Arc::new(SystemExecutor::new()))
            .binary(&codex)
            .timeout(Duration::from_millis(100));

        let outcome = probe.validate().await;
        assert_eq!(outcome.result, ValidationResult::CliInvalid);

        let classifier = ErrorClassifier::default();
        let timeout = IntegrationError::Timeout {
            binary: codex.clone(),
            timeout: Duration::from_millis(100),
        };
        let classified = classifier.handle(
            &timeout,
            ErrorCategory::CliExecution,
            &ErrorContext::new("validate"),
        );
        assert_eq!(classified.code, "CLI_TIMEOUT");
        assert!(classifier
            .user_message(&classified)
            .contains("1. Increase the configured timeout"));
    }
}
