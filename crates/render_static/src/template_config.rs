//! Per-template configuration.

use std::path::{Path, PathBuf};

use crate::config::TemplateSpec;
use crate::context::{resolve_context, Context, ContextRegistry};
use crate::error::{RenderStaticError, RenderStaticResult};

/// Settings for one template selector: where it is written and the
/// context specific to it. The context is resolved when the configuration
/// is built and does not include global context.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateConfig {
    name: String,
    dest: Option<PathBuf>,
    context: Context,
}

impl TemplateConfig {
    /// Build from a configured entry.
    ///
    /// Fails if `dest` is not absolute or the context does not resolve to a
    /// mapping.
    pub fn new(
        name: impl Into<String>,
        spec: &TemplateSpec,
        registry: &ContextRegistry,
    ) -> RenderStaticResult<Self> {
        let name = name.into();

        if let Some(dest) = &spec.dest {
            if !dest.is_absolute() {
                return Err(RenderStaticError::improperly_configured(format!(
                    "In STATIC_TEMPLATES, template {} dest must be absolute!",
                    name
                )));
            }
        }

        let context = resolve_context(spec.context.as_ref(), registry)
            .map_err(|e| e.into_config_error(Some(&name)))?;

        Ok(Self {
            dest: spec.dest.clone(),
            name,
            context,
        })
    }

    /// Configuration for a selector with no entry in `templates`.
    pub fn unconfigured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dest: None,
            context: Context::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dest(&self) -> Option<&Path> {
        self.dest.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}
