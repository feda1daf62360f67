//! Process-wide settings consumed by the static template engine.
//!
//! Settings carry the static root, the installed applications whose
//! template directories may be searched, the raw `STATIC_TEMPLATES`
//! configuration and any additional project settings. The whole record is
//! injected into every global template context under the `settings` key.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::read_document;
use crate::error::{RenderStaticError, RenderStaticResult};

/// An installed application that may own templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Short application label.
    pub label: String,
    /// Base filesystem path of the application.
    pub path: PathBuf,
}

impl AppConfig {
    pub fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }

    /// Directory static assets rendered for this application are written to.
    pub fn static_dir(&self) -> PathBuf {
        self.path.join("static")
    }

    /// Directory holding this application's templates for a given backend.
    pub fn template_dir(&self, app_dir: &str) -> PathBuf {
        self.path.join(app_dir)
    }
}

/// Project settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "STATIC_ROOT", default, skip_serializing_if = "Option::is_none")]
    pub static_root: Option<PathBuf>,

    #[serde(rename = "INSTALLED_APPS", default)]
    pub installed_apps: Vec<AppConfig>,

    /// Raw `STATIC_TEMPLATES` directive. `None` when the key is absent,
    /// `Some(Value::Null)` when it is present but null.
    #[serde(
        rename = "STATIC_TEMPLATES",
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub static_templates: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.static_root = Some(root.into());
        self
    }

    pub fn with_app(mut self, app: AppConfig) -> Self {
        self.installed_apps.push(app);
        self
    }

    pub fn with_static_templates(mut self, config: Value) -> Self {
        self.static_templates = Some(config);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Load settings from a YAML, JSON or TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> RenderStaticResult<Self> {
        let path = path.as_ref();
        debug!("Reading settings from {:?}", path);
        let document = read_document(path)?;
        Ok(serde_json::from_value(document)?)
    }

    pub fn from_yaml_str(content: &str) -> RenderStaticResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Look up an installed application by label.
    pub fn app(&self, label: &str) -> Option<&AppConfig> {
        self.installed_apps.iter().find(|app| app.label == label)
    }

    /// The settings record as a template context value.
    pub fn to_context_value(&self) -> RenderStaticResult<Value> {
        serde_json::to_value(self).map_err(|e| {
            RenderStaticError::improperly_configured_by(
                "Settings could not be converted into a template context",
                e,
            )
        })
    }
}
