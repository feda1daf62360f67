//! Render descriptors.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::backend::Template;
use crate::template_config::TemplateConfig;

/// One file produced by a render call.
#[derive(Debug, Clone, PartialEq)]
pub struct Render {
    selector: String,
    config: TemplateConfig,
    template: Template,
    destination: PathBuf,
    engine: String,
}

impl Render {
    pub fn new(
        selector: impl Into<String>,
        config: TemplateConfig,
        template: Template,
        destination: PathBuf,
        engine: impl Into<String>,
    ) -> Self {
        Self {
            selector: selector.into(),
            config,
            template,
            destination,
            engine: engine.into(),
        }
    }

    /// The selector that matched this template.
    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Alias of the engine that loaded and rendered the template.
    pub fn engine(&self) -> &str {
        &self.engine
    }
}

impl fmt::Display for Render {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(app) = self.template.app() {
            write!(f, "[{}] ", app.label)?;
        }
        write!(
            f,
            "{} -> {}",
            self.template.name(),
            self.destination.display()
        )
    }
}
