//! Parameterized command templates and their rendering.
//!
//! A [`CommandTemplate`] holds a command string with `{name}` placeholders plus the
//! ordered [`CommandParameter`]s that fill them. Binding values produces a
//! [`BoundCommand`], whose [`BoundCommand::validate`] and `Display` output depend only
//! on the template and the bound values.
//!
//! Rendering is lenient: a placeholder with neither a bound value nor a default is left
//! in the output verbatim. Use [`BoundCommand::is_fully_resolved`] or
//! [`BoundCommand::render_strict`] when a partially rendered command is not acceptable.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
    fs::{FileSystem, LocalFileSystem},
    Configuration, IntegrationError,
};

/// Predicate applied to a supplied parameter value.
pub type ParameterValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParameterType {
    /// True when `value` has the JSON shape this type describes.
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ParameterType::String => value.is_string(),
            ParameterType::Number => value.is_number(),
            ParameterType::Boolean => value.is_boolean(),
            ParameterType::Array => value.is_array(),
            ParameterType::Object => value.is_object(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParameterType,
    pub required: bool,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip)]
    pub validation: Option<ParameterValidator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl fmt::Debug for CommandParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandParameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("required", &self.required)
            .field("description", &self.description)
            .field("default_value", &self.default_value)
            .field("validation", &self.validation.as_ref().map(|_| "<fn>"))
            .field("options", &self.options)
            .finish()
    }
}

impl CommandParameter {
    pub fn new(name: impl Into<String>, kind: ParameterType) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: String::new(),
            default_value: None,
            validation: None,
            options: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn validation<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.validation = Some(Arc::new(predicate));
        self
    }

    /// Restricts supplied values to `options`, replacing any existing predicate.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        let allowed = options.clone();
        self.options = Some(options);
        self.validation = Some(Arc::new(move |value: &Value| {
            value
                .as_str()
                .is_some_and(|candidate| allowed.iter().any(|option| option == candidate))
        }));
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandTemplate {
    pub name: String,
    pub description: String,
    pub command: String,
    pub parameters: Vec<CommandParameter>,
    #[serde(default)]
    pub examples: Vec<String>,
    pub category: String,
    pub version: String,
}

impl CommandTemplate {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            command: command.into(),
            parameters: Vec::new(),
            examples: Vec::new(),
            category: "custom".to_string(),
            version: "1.0.0".to_string(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn parameter(mut self, parameter: CommandParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn find_parameter(&self, name: &str) -> Option<&CommandParameter> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Placeholder names in `command`, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        scan(&self.command)
            .into_iter()
            .filter_map(|segment| match segment {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn bind<I, K, V>(&self, values: I) -> BoundCommand
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        BoundCommand {
            template: self.clone(),
            values: values
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A template paired with caller-supplied parameter values.
#[derive(Clone, Debug)]
pub struct BoundCommand {
    template: CommandTemplate,
    values: BTreeMap<String, Value>,
}

impl BoundCommand {
    pub fn new(template: CommandTemplate, values: BTreeMap<String, Value>) -> Self {
        Self { template, values }
    }

    pub fn template(&self) -> &CommandTemplate {
        &self.template
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Every required parameter has a value or default, and every predicate accepts
    /// its supplied value. Predicates never see defaults.
    pub fn validate(&self) -> bool {
        self.template.parameters.iter().all(|param| {
            let supplied = self.values.get(&param.name);
            if param.required && supplied.is_none() && param.default_value.is_none() {
                return false;
            }
            match (supplied, param.validation.as_ref()) {
                (Some(value), Some(predicate)) => predicate(value),
                _ => true,
            }
        })
    }

    fn resolve(&self, name: &str) -> Option<&Value> {
        self.values.get(name).or_else(|| {
            self.template
                .find_parameter(name)
                .and_then(|param| param.default_value.as_ref())
        })
    }

    /// Placeholders with neither a bound value nor a default, deduplicated.
    pub fn unresolved_placeholders(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.template
            .placeholders()
            .into_iter()
            .filter(|name| self.resolve(name).is_none())
            .filter(|name| seen.insert(*name))
            .map(str::to_string)
            .collect()
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved_placeholders().is_empty()
    }

    /// Renders the command, leaving unresolved placeholders as written.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.command.len());
        for segment in scan(&self.template.command) {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match self.resolve(name) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }

    /// Renders the command, failing when any placeholder stays unresolved.
    pub fn render_strict(&self) -> Result<String, IntegrationError> {
        let unresolved = self.unresolved_placeholders();
        if !unresolved.is_empty() {
            return Err(IntegrationError::UnresolvedPlaceholders {
                template: self.template.name.clone(),
                placeholders: unresolved,
            });
        }
        Ok(self.render())
    }
}

impl fmt::Display for BoundCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null | Value::Object(_) => value.to_string(),
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// `{name}` with a word-like name is a placeholder; any other brace text is literal.
fn scan(command: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = command;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = &after[..close];
        if is_placeholder_name(name) {
            if open > 0 {
                segments.push(Segment::Literal(&rest[..open]));
            }
            segments.push(Segment::Placeholder(name));
            rest = &after[close + 1..];
        } else {
            segments.push(Segment::Literal(&rest[..=open]));
            rest = after;
        }
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest));
    }
    segments
}

/// Stock templates for common Codex invocations.
pub fn builtin_templates() -> Vec<CommandTemplate> {
    vec![
        CommandTemplate::new("codex-exec", "codex exec {flags} {prompt}")
            .description("Run a single non-interactive Codex prompt")
            .category("codex")
            .parameter(
                CommandParameter::new("prompt", ParameterType::String)
                    .required(true)
                    .description("Prompt passed to `codex exec`")
                    .validation(|value| value.as_str().is_some_and(|s| !s.trim().is_empty())),
            )
            .parameter(
                CommandParameter::new("flags", ParameterType::Array)
                    .description("Extra flags such as `--json` or `--skip-git-repo-check`")
                    .default_value(Value::Array(Vec::new())),
            )
            .example("codex exec --json \"summarize the diff\""),
        CommandTemplate::new("codex-review", "codex review --{target} {prompt}")
            .description("Ask Codex to review pending changes")
            .category("codex")
            .parameter(
                CommandParameter::new("target", ParameterType::String)
                    .required(true)
                    .description("What to review")
                    .default_value("uncommitted")
                    .with_options(["uncommitted", "base", "commit"]),
            )
            .parameter(
                CommandParameter::new("prompt", ParameterType::String)
                    .description("Optional review instructions")
                    .default_value(""),
            )
            .example("codex review --uncommitted"),
        CommandTemplate::new("codex-resume", "codex exec resume {session} {prompt}")
            .description("Continue a previous Codex session")
            .category("codex")
            .parameter(
                CommandParameter::new("session", ParameterType::String)
                    .description("Session id, or `--last` for the most recent session")
                    .default_value("--last"),
            )
            .parameter(
                CommandParameter::new("prompt", ParameterType::String)
                    .required(true)
                    .description("Follow-up prompt"),
            )
            .example("codex exec resume --last \"now add tests\""),
        CommandTemplate::new("codex-apply", "codex apply {task}")
            .description("Apply the diff produced by a Codex cloud task")
            .category("codex")
            .parameter(
                CommandParameter::new("task", ParameterType::String)
                    .required(true)
                    .description("Task id to apply"),
            )
            .example("codex apply task_123"),
    ]
}

/// Produces template files for a configuration.
#[async_trait]
pub trait TemplateGenerator: Send + Sync {
    async fn generate_templates(&self, config: &Configuration) -> Result<(), IntegrationError>;
}

/// Writes each template as `<name>.json` under `config.template_path`.
#[derive(Clone)]
pub struct FileTemplateGenerator {
    fs: Arc<dyn FileSystem>,
    templates: Vec<CommandTemplate>,
}

impl fmt::Debug for FileTemplateGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTemplateGenerator")
            .field("templates", &self.templates.len())
            .finish_non_exhaustive()
    }
}

impl Default for FileTemplateGenerator {
    fn default() -> Self {
        Self::new(Arc::new(LocalFileSystem))
    }
}

impl FileTemplateGenerator {
    /// Generator for [`builtin_templates`].
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            templates: builtin_templates(),
        }
    }

    pub fn with_templates(mut self, templates: Vec<CommandTemplate>) -> Self {
        self.templates = templates;
        self
    }

    pub fn templates(&self) -> &[CommandTemplate] {
        &self.templates
    }

    pub fn template_file(dir: &Path, template: &CommandTemplate) -> PathBuf {
        dir.join(format!("{}.json", template.name))
    }
}

#[async_trait]
impl TemplateGenerator for FileTemplateGenerator {
    async fn generate_templates(&self, config: &Configuration) -> Result<(), IntegrationError> {
        if config.template_path.trim().is_empty() {
            return Err(IntegrationError::TemplateGeneration {
                reason: "template path is empty".to_string(),
            });
        }

        let dir = Path::new(&config.template_path);
        if !self.fs.directory_exists(dir).await {
            self.fs.create_directory(dir).await?;
        }

        for template in &self.templates {
            let mut contents = serde_json::to_string_pretty(template).map_err(|err| {
                IntegrationError::Encode {
                    context: "command template",
                    reason: err.to_string(),
                }
            })?;
            contents.push('\n');
            self.fs
                .write_file(&Self::template_file(dir, template), &contents)
                .await?;
        }

        debug!(
            path = %config.template_path,
            count = self.templates.len(),
            "generated codex command templates"
        );
        Ok(())
    }
}
