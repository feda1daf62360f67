//! `STATIC_TEMPLATES` configuration.
//!
//! Configuration can be assembled in code through the builder methods on
//! [`StaticTemplatesConfig`] or parsed from a raw document. Raw parsing only
//! checks shape; semantic checks (backend identifiers, duplicate aliases,
//! absolute destinations, context resolution) happen when the engine
//! materializes its engines, templates and context.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::context::ContextSpec;
use crate::error::{RenderStaticError, RenderStaticResult};

/// The only legal top-level configuration keys.
pub const RECOGNIZED_KEYS: [&str; 3] = ["ENGINES", "templates", "context"];

/// Read a YAML, JSON or TOML document, picking the format by extension.
pub(crate) fn read_document(path: &Path) -> RenderStaticResult<Value> {
    let content = fs::read_to_string(path)?;
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let value = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        "toml" => toml::from_str(&content)?,
        _ => serde_json::from_str(&content)?,
    };
    Ok(value)
}

/// One entry of the `ENGINES` list.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineDefinition {
    #[serde(rename = "BACKEND", default)]
    pub backend: Option<String>,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "DIRS", default)]
    pub dirs: Option<Vec<PathBuf>>,
    #[serde(rename = "APP_DIRS", default)]
    pub app_dirs: Option<bool>,
    #[serde(rename = "OPTIONS", default)]
    pub options: Option<Map<String, Value>>,
}

impl EngineDefinition {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: Some(backend.into()),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dirs.get_or_insert_with(Vec::new).push(dir.into());
        self
    }

    pub fn app_dirs(mut self, app_dirs: bool) -> Self {
        self.app_dirs = Some(app_dirs);
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }
}

/// Per-template settings as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TemplateSpec {
    #[serde(default)]
    pub dest: Option<PathBuf>,
    #[serde(default)]
    pub context: Option<ContextSpec>,
}

impl TemplateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn context(mut self, context: impl Into<ContextSpec>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// The global `STATIC_TEMPLATES` configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTemplatesConfig {
    /// `None` selects the built-in default engine.
    pub engines: Option<Vec<EngineDefinition>>,
    /// Template selectors in document order.
    pub templates: Vec<(String, TemplateSpec)>,
    pub context: Option<ContextSpec>,
}

impl StaticTemplatesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine(mut self, engine: EngineDefinition) -> Self {
        self.engines.get_or_insert_with(Vec::new).push(engine);
        self
    }

    pub fn template(mut self, name: impl Into<String>, spec: TemplateSpec) -> Self {
        self.templates.push((name.into(), spec));
        self
    }

    pub fn context(mut self, context: impl Into<ContextSpec>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Parse a raw configuration document. `null` is an empty configuration.
    pub fn from_value(value: Value) -> RenderStaticResult<Self> {
        let mut directives = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map,
            other => {
                return Err(RenderStaticError::improperly_configured(format!(
                    "STATIC_TEMPLATES must be a mapping of configuration directives, not {}",
                    other
                )))
            }
        };

        let unrecognized: Vec<&String> = directives
            .keys()
            .filter(|key| !RECOGNIZED_KEYS.contains(&key.as_str()))
            .collect();
        if !unrecognized.is_empty() {
            return Err(RenderStaticError::improperly_configured(format!(
                "Unrecognized STATIC_TEMPLATES configuration directives: {:?}",
                unrecognized
            )));
        }

        let engines = match directives.remove("ENGINES") {
            None | Some(Value::Null) => None,
            Some(Value::Array(defs)) => Some(
                defs.into_iter()
                    .map(parse_engine_definition)
                    .collect::<RenderStaticResult<Vec<_>>>()?,
            ),
            Some(other) => {
                return Err(RenderStaticError::improperly_configured(format!(
                    "ENGINES in STATIC_TEMPLATES setting must be a list containing engine \
                     configurations! Encountered: {}",
                    other
                )))
            }
        };

        let templates = match directives.remove("templates") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Object(entries)) => entries
                .into_iter()
                .map(|(name, spec)| {
                    let spec = parse_template_spec(&name, spec)?;
                    Ok((name, spec))
                })
                .collect::<RenderStaticResult<Vec<_>>>()?,
            Some(other) => {
                return Err(RenderStaticError::improperly_configured(format!(
                    "Invalid 'templates' in STATIC_TEMPLATES: expected a mapping, got {}",
                    other
                )))
            }
        };

        let context = directives
            .remove("context")
            .and_then(ContextSpec::from_value);

        Ok(Self {
            engines,
            templates,
            context,
        })
    }

    pub fn from_yaml_str(content: &str) -> RenderStaticResult<Self> {
        Self::from_value(serde_yaml::from_str(content)?)
    }

    /// Load configuration from a YAML, JSON or TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> RenderStaticResult<Self> {
        let path = path.as_ref();
        debug!("Reading STATIC_TEMPLATES from {:?}", path);
        Self::from_value(read_document(path)?)
    }
}

fn parse_engine_definition(value: Value) -> RenderStaticResult<EngineDefinition> {
    let backend = value
        .get("BACKEND")
        .map(|b| b.to_string())
        .unwrap_or_else(|| "<not defined>".to_string());

    serde_json::from_value(value).map_err(|e| {
        RenderStaticError::improperly_configured_by(
            format!(
                "Invalid BACKEND for a static template engine: {}. Check your STATIC_TEMPLATES \
                 setting.",
                backend
            ),
            e,
        )
    })
}

fn parse_template_spec(name: &str, value: Value) -> RenderStaticResult<TemplateSpec> {
    if value.is_null() {
        return Ok(TemplateSpec::default());
    }
    serde_json::from_value(value).map_err(|e| {
        RenderStaticError::improperly_configured_by(
            format!("Invalid 'templates' in STATIC_TEMPLATES for {}: {}!", name, e),
            e,
        )
    })
}

/// Where an engine obtains its configuration.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Raw(Value),
    Typed(StaticTemplatesConfig),
}

impl ConfigSource {
    pub(crate) fn load(self) -> RenderStaticResult<StaticTemplatesConfig> {
        match self {
            Self::Raw(value) => StaticTemplatesConfig::from_value(value),
            Self::Typed(config) => Ok(config),
        }
    }
}

impl From<Value> for ConfigSource {
    fn from(value: Value) -> Self {
        Self::Raw(value)
    }
}

impl From<StaticTemplatesConfig> for ConfigSource {
    fn from(config: StaticTemplatesConfig) -> Self {
        Self::Typed(config)
    }
}
