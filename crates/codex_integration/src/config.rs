use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    defaults::{DEFAULT_TEMPLATE_PATH, DEFAULT_TIMEOUT},
    fs::{FileSystem, LocalFileSystem},
    IntegrationError,
};

/// Persisted settings for the Codex integration.
///
/// Serialized with camelCase keys (`cliPath`, `validationEnabled`, `fallbackToCustom`,
/// `templatePath`, `timeout`). `timeout` is in milliseconds.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    pub validation_enabled: bool,
    pub fallback_to_custom: bool,
    pub template_path: String,
    pub timeout: u64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            enabled: true,
            cli_path: None,
            validation_enabled: true,
            fallback_to_custom: false,
            template_path: DEFAULT_TEMPLATE_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Configuration {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout)
    }

    /// Checks the numeric and non-empty invariants.
    pub fn is_valid(&self) -> bool {
        self.invalid_reason().is_none()
    }

    fn invalid_reason(&self) -> Option<String> {
        if self.timeout == 0 {
            return Some("`timeout` must be greater than zero".to_string());
        }
        if self.template_path.trim().is_empty() {
            return Some("`templatePath` must not be empty".to_string());
        }
        if self
            .cli_path
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            return Some("`cliPath` must not be empty when present".to_string());
        }
        None
    }

    /// Applies `patch` on top of `self`; see [`ConfigPatch`] for field semantics.
    pub fn merged_with(&self, patch: &ConfigPatch) -> Configuration {
        Configuration {
            enabled: patch.enabled.unwrap_or(self.enabled),
            cli_path: match &patch.cli_path {
                Some(value) => value.clone(),
                None => self.cli_path.clone(),
            },
            validation_enabled: patch.validation_enabled.unwrap_or(self.validation_enabled),
            fallback_to_custom: patch.fallback_to_custom.unwrap_or(self.fallback_to_custom),
            template_path: patch
                .template_path
                .clone()
                .unwrap_or_else(|| self.template_path.clone()),
            timeout: patch.timeout.unwrap_or(self.timeout),
        }
    }
}

/// Partial configuration used as a merge override.
///
/// Every field left as `None` keeps the base value. `cli_path` is the only optional
/// setting, so it alone distinguishes "absent" (`None`) from "explicitly cleared"
/// (`Some(None)`, written as `"cliPath": null` in JSON). A `null` on any required
/// field is treated as absent.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub cli_path: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_to_custom: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// Keeps an explicit `null` distinct from a missing key.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ConfigPatch {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn cli_path(mut self, path: impl Into<String>) -> Self {
        self.cli_path = Some(Some(path.into()));
        self
    }

    pub fn clear_cli_path(mut self) -> Self {
        self.cli_path = Some(None);
        self
    }

    pub fn validation_enabled(mut self, enabled: bool) -> Self {
        self.validation_enabled = Some(enabled);
        self
    }

    pub fn fallback_to_custom(mut self, enabled: bool) -> Self {
        self.fallback_to_custom = Some(enabled);
        self
    }

    pub fn template_path(mut self, path: impl Into<String>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}

impl From<Configuration> for ConfigPatch {
    fn from(config: Configuration) -> Self {
        Self {
            enabled: Some(config.enabled),
            cli_path: Some(config.cli_path),
            validation_enabled: Some(config.validation_enabled),
            fallback_to_custom: Some(config.fallback_to_custom),
            template_path: Some(config.template_path),
            timeout: Some(config.timeout),
        }
    }
}

/// On-disk encoding of a configuration file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.toml` files are TOML; everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Json,
        }
    }
}

impl fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFormat::Json => f.write_str("json"),
            ConfigFormat::Toml => f.write_str("toml"),
        }
    }
}

fn is_bool(map: &serde_json::Map<String, Value>, key: &str) -> bool {
    matches!(map.get(key), Some(Value::Bool(_)))
}

/// True when `value` is an object carrying every required field with the right type.
///
/// Never fails; `null`, non-objects, missing keys, wrong types, a zero timeout, or
/// empty paths all yield `false`. Unknown keys are ignored.
pub fn validate_configuration_value(value: &Value) -> bool {
    let Value::Object(map) = value else {
        return false;
    };

    let timeout_ok = map
        .get("timeout")
        .and_then(Value::as_u64)
        .is_some_and(|timeout| timeout > 0);
    let template_ok = map
        .get("templatePath")
        .and_then(Value::as_str)
        .is_some_and(|path| !path.trim().is_empty());
    let cli_path_ok = match map.get("cliPath") {
        None | Some(Value::Null) => true,
        Some(Value::String(path)) => !path.trim().is_empty(),
        Some(_) => false,
    };

    is_bool(map, "enabled")
        && is_bool(map, "validationEnabled")
        && is_bool(map, "fallbackToCustom")
        && timeout_ok
        && template_ok
        && cli_path_ok
}

/// Loads, saves, validates, and merges integration configuration files.
#[derive(Clone)]
pub struct ConfigurationStore {
    fs: Arc<dyn FileSystem>,
}

impl fmt::Debug for ConfigurationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationStore").finish_non_exhaustive()
    }
}

impl Default for ConfigurationStore {
    fn default() -> Self {
        Self::new(Arc::new(LocalFileSystem))
    }
}

impl ConfigurationStore {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Reads and re-parses `path` on every call.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Configuration, IntegrationError> {
        let path = path.as_ref();
        if !self.fs.file_exists(path).await {
            return Err(IntegrationError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let contents = self.fs.read_file(path).await?;
        let value = decode(&contents, ConfigFormat::from_path(path)).map_err(|reason| {
            IntegrationError::InvalidFormat {
                path: path.to_path_buf(),
                reason,
            }
        })?;

        if !validate_configuration_value(&value) {
            return Err(IntegrationError::InvalidConfiguration {
                reason: format!(
                    "`{}` is missing required fields or has out-of-range values",
                    path.display()
                ),
            });
        }

        let config: Configuration = serde_json::from_value(value).map_err(|source| {
            IntegrationError::InvalidConfiguration {
                reason: source.to_string(),
            }
        })?;
        debug!(path = ?path, "loaded codex integration configuration");
        Ok(config)
    }

    /// Validates, creates the parent directory when needed, then writes `config`.
    ///
    /// Nothing is written when `config` is invalid.
    pub async fn save(
        &self,
        config: &Configuration,
        path: impl AsRef<Path>,
    ) -> Result<(), IntegrationError> {
        let path = path.as_ref();
        if let Some(reason) = config.invalid_reason() {
            return Err(IntegrationError::InvalidConfiguration { reason });
        }

        let contents = encode(config, ConfigFormat::from_path(path))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !self.fs.directory_exists(parent).await {
                self.fs.create_directory(parent).await?;
            }
        }

        self.fs.write_file(path, &contents).await?;
        debug!(path = ?path, "saved codex integration configuration");
        Ok(())
    }

    pub fn validate(&self, config: &Configuration) -> bool {
        config.is_valid()
    }

    pub fn validate_value(&self, value: &Value) -> bool {
        validate_configuration_value(value)
    }

    pub fn default_configuration(&self) -> Configuration {
        Configuration::default()
    }

    pub fn merge_configurations(&self, base: &Configuration, patch: &ConfigPatch) -> Configuration {
        base.merged_with(patch)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    pub async fn load_or_default(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<Configuration, IntegrationError> {
        match self.load(path).await {
            Err(IntegrationError::ConfigNotFound { path }) => {
                debug!(path = ?path, "no configuration file, using defaults");
                Ok(Configuration::default())
            }
            other => other,
        }
    }
}

fn decode(contents: &str, format: ConfigFormat) -> Result<Value, String> {
    match format {
        ConfigFormat::Json => serde_json::from_str(contents).map_err(|err| err.to_string()),
        ConfigFormat::Toml => toml::from_str(contents).map_err(|err| err.to_string()),
    }
}

fn encode(config: &Configuration, format: ConfigFormat) -> Result<String, IntegrationError> {
    let mut contents = match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config).map_err(|err| {
            IntegrationError::Encode {
                context: "configuration",
                reason: err.to_string(),
            }
        })?,
        ConfigFormat::Toml => toml::to_string_pretty(config).map_err(|err| {
            IntegrationError::Encode {
                context: "configuration",
                reason: err.to_string(),
            }
        })?,
    };
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    Ok(contents)
}

/// Default location of the configuration file relative to a project root.
pub fn default_config_path(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(".codex").join("config.json")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn base() -> Configuration {
        Configuration {
            enabled: true,
            cli_path: Some("/usr/local/bin/codex".to_string()),
            validation_enabled: false,
            fallback_to_custom: true,
            template_path: "templates".to_string(),
            timeout: 5_000,
        }
    }

    #[test]
    fn defaults_are_stable() {
        let first = Configuration::default();
        let second = ConfigurationStore::default().default_configuration();
        assert_eq!(first, second);
        assert!(first.enabled);
        assert!(first.validation_enabled);
        assert!(!first.fallback_to_custom);
        assert_eq!(first.template_path, ".codex/templates");
        assert_eq!(first.timeout, 10_000);
        assert!(first.cli_path.is_none());
        assert!(first.is_valid());
    }

    #[test]
    fn empty_patch_is_identity() {
        assert_eq!(base().merged_with(&ConfigPatch::default()), base());
    }

    #[test]
    fn patch_overrides_single_field() {
        let merged = base().merged_with(&ConfigPatch::default().timeout(99));
        assert_eq!(merged.timeout, 99);
        assert_eq!(
            Configuration {
                timeout: 5_000,
                ..merged
            },
            base()
        );
    }

    #[test]
    fn null_cli_path_clears_but_missing_keeps() {
        let cleared: ConfigPatch = serde_json::from_value(json!({ "cliPath": null })).unwrap();
        assert_eq!(cleared.cli_path, Some(None));
        assert_eq!(base().merged_with(&cleared).cli_path, None);

        let absent: ConfigPatch = serde_json::from_value(json!({ "enabled": false })).unwrap();
        assert_eq!(absent.cli_path, None);
        let merged = base().merged_with(&absent);
        assert_eq!(merged.cli_path, base().cli_path);
        assert!(!merged.enabled);
    }

    #[test]
    fn null_required_field_keeps_base() {
        let patch: ConfigPatch = serde_json::from_value(json!({ "timeout": null })).unwrap();
        assert_eq!(base().merged_with(&patch).timeout, 5_000);
    }

    #[test]
    fn full_patch_replaces_everything() {
        let merged = base().merged_with(&ConfigPatch::from(Configuration::default()));
        assert_eq!(merged, Configuration::default());
    }

    #[test]
    fn value_validation_rejects_bad_shapes() {
        let good = serde_json::to_value(Configuration::default()).unwrap();
        assert!(validate_configuration_value(&good));

        assert!(!validate_configuration_value(&Value::Null));
        assert!(!validate_configuration_value(&json!("config")));
        assert!(!validate_configuration_value(&json!([1, 2])));

        let mut zero_timeout = good.clone();
        zero_timeout["timeout"] = json!(0);
        assert!(!validate_configuration_value(&zero_timeout));

        let mut negative_timeout = good.clone();
        negative_timeout["timeout"] = json!(-5);
        assert!(!validate_configuration_value(&negative_timeout));

        let mut string_flag = good.clone();
        string_flag["enabled"] = json!("yes");
        assert!(!validate_configuration_value(&string_flag));

        let mut empty_template = good.clone();
        empty_template["templatePath"] = json!("");
        assert!(!validate_configuration_value(&empty_template));

        let mut empty_cli = good.clone();
        empty_cli["cliPath"] = json!("");
        assert!(!validate_configuration_value(&empty_cli));

        let mut missing = good;
        missing.as_object_mut().unwrap().remove("fallbackToCustom");
        assert!(!validate_configuration_value(&missing));
    }

    #[test]
    fn typed_validation_checks_invariants() {
        let store = ConfigurationStore::default();
        assert!(store.validate(&base()));
        assert!(!store.validate(&Configuration {
            timeout: 0,
            ..base()
        }));
        assert!(!store.validate(&Configuration {
            cli_path: Some(" ".to_string()),
            ..base()
        }));
    }

    #[test]
    fn serializes_camel_case_without_absent_cli_path() {
        let value = serde_json::to_value(Configuration::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "enabled": true,
                "validationEnabled": true,
                "fallbackToCustom": false,
                "templatePath": ".codex/templates",
                "timeout": 10000
            })
        );
    }

    #[test]
    fn format_is_inferred_from_extension() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/config.TOML")),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/config.json")),
            ConfigFormat::Json
        );
        assert_eq!(ConfigFormat::from_path(Path::new("a/config")), ConfigFormat::Json);
    }
}
