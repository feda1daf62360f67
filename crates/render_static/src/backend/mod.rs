//! Template backends.
//!
//! A backend wraps one concrete template engine. The orchestrator only
//! needs three operations from it: resolve a selector to template names,
//! load a template by exact name, and render a loaded template with a
//! context. Backends are constructed from an [`EngineParams`] record by a
//! factory looked up in the [`BackendRegistry`].

use std::path::PathBuf;

use serde_json::{Map, Value};

use crate::context::Context;
use crate::error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
use crate::loader::Origin;
use crate::settings::AppConfig;

pub mod django;
pub mod jinja2;
pub mod registry;

pub use django::StaticDjangoTemplates;
pub use jinja2::StaticJinja2Templates;
pub use registry::{BackendFactory, BackendRegistry, DJANGO_BACKEND, JINJA2_BACKEND};

/// A template resolved by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    origin: Origin,
}

impl Template {
    pub fn new(origin: Origin) -> Self {
        Self { origin }
    }

    /// Engine-relative template name.
    pub fn name(&self) -> &str {
        &self.origin.template_name
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// The application owning the template, if any.
    pub fn app(&self) -> Option<&AppConfig> {
        self.origin.app.as_ref()
    }
}

/// A template engine that can participate in static rendering.
#[cfg_attr(test, mockall::automock)]
pub trait StaticBackend {
    /// The engine alias.
    fn name(&self) -> &str;

    /// Resolve a selector into the names of matching templates.
    fn select_templates(
        &self,
        selector: &str,
        first_loader: bool,
        first_preference: bool,
    ) -> Result<Vec<String>, TemplateDoesNotExist>;

    /// Load a template by exact name.
    fn get_template(&self, name: &str) -> Result<Template, TemplateDoesNotExist>;

    /// Render a template previously returned by [`get_template`](Self::get_template).
    fn render(&self, template: &Template, context: &Context) -> RenderStaticResult<String>;
}

/// Parameters handed to a backend factory: one engine definition with
/// defaults applied and `BACKEND` removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineParams {
    pub name: String,
    pub dirs: Vec<PathBuf>,
    pub app_dirs: bool,
    pub options: Map<String, Value>,
}

impl EngineParams {
    pub fn take_option(&mut self, key: &str) -> Option<Value> {
        self.options.remove(key)
    }

    pub fn take_bool(&mut self, key: &str, default: bool) -> RenderStaticResult<bool> {
        match self.options.remove(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(value)) => Ok(value),
            Some(other) => Err(RenderStaticError::improperly_configured(format!(
                "Engine {} option '{}' must be a boolean, not {}",
                self.name, key, other
            ))),
        }
    }

    pub fn take_string(&mut self, key: &str) -> RenderStaticResult<Option<String>> {
        match self.options.remove(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value)),
            Some(other) => Err(RenderStaticError::improperly_configured(format!(
                "Engine {} option '{}' must be a string, not {}",
                self.name, key, other
            ))),
        }
    }

    /// Fail if any option was left unconsumed by the backend.
    pub fn reject_unknown_options(&self, backend: &str) -> RenderStaticResult<()> {
        if self.options.is_empty() {
            return Ok(());
        }
        let unknown: Vec<&String> = self.options.keys().collect();
        Err(RenderStaticError::improperly_configured(format!(
            "Unknown OPTIONS for {} engine {}: {:?}",
            backend, self.name, unknown
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_take_options() {
        let mut params = EngineParams {
            name: "engine".to_string(),
            options: match json!({"autoescape": false, "app_dir": "custom", "extra": 1}) {
                Value::Object(map) => map,
                _ => unreachable!(),
            },
            ..EngineParams::default()
        };

        assert!(!params.take_bool("autoescape", true).unwrap());
        assert!(params.take_bool("trim_blocks", true).unwrap());
        assert_eq!(params.take_string("app_dir").unwrap().as_deref(), Some("custom"));
        let err = params.reject_unknown_options(DJANGO_BACKEND).unwrap_err();
        assert!(err.to_string().contains("extra"));
    }
}
