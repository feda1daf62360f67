//! Error types for static rendering.

use std::fmt;

use thiserror::Error;

/// Boxed error used to carry backend and user callable failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for static rendering operations.
pub type RenderStaticResult<T> = Result<T, RenderStaticError>;

/// Errors that can occur while configuring engines or rendering templates.
#[derive(Error, Debug)]
pub enum RenderStaticError {
    #[error("Improperly configured: {message}")]
    ImproperlyConfigured {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error(transparent)]
    TemplateDoesNotExist(#[from] TemplateDoesNotExist),

    #[error("Could not find config for '{0}' in STATIC_TEMPLATES")]
    InvalidTemplateEngine(String),

    /// A loader reported a name it could not subsequently load.
    #[error("Selector resolved to template {template} which is not loadable: {source}")]
    UnloadableTemplate {
        template: String,
        #[source]
        source: TemplateDoesNotExist,
    },

    #[error("Template rendering failed for {template}: {source}")]
    Render {
        template: String,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl RenderStaticError {
    /// Build a configuration error with no underlying cause.
    pub fn improperly_configured(message: impl Into<String>) -> Self {
        Self::ImproperlyConfigured {
            message: message.into(),
            source: None,
        }
    }

    /// Build a configuration error chaining the cause that triggered it.
    pub fn improperly_configured_by(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ImproperlyConfigured {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn render(template: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Render {
            template: template.into(),
            source: source.into(),
        }
    }

    pub fn is_improperly_configured(&self) -> bool {
        matches!(self, Self::ImproperlyConfigured { .. })
    }

    pub fn is_template_does_not_exist(&self) -> bool {
        matches!(self, Self::TemplateDoesNotExist(_))
    }
}

/// A template name or selector could not be resolved.
///
/// Carries the locations that were tried and, when raised by the engine
/// orchestrator, the per-engine failures that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDoesNotExist {
    name: String,
    backend: Option<String>,
    tried: Vec<String>,
    chain: Vec<TemplateDoesNotExist>,
}

impl TemplateDoesNotExist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: None,
            tried: Vec::new(),
            chain: Vec::new(),
        }
    }

    /// Record the engine alias that reported the miss.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn with_tried(mut self, tried: Vec<String>) -> Self {
        self.tried = tried;
        self
    }

    pub fn with_chain(mut self, chain: Vec<TemplateDoesNotExist>) -> Self {
        self.chain = chain;
        self
    }

    /// The selector or template name that was not found.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn tried(&self) -> &[String] {
        &self.tried
    }

    pub fn chain(&self) -> &[TemplateDoesNotExist] {
        &self.chain
    }
}

impl fmt::Display for TemplateDoesNotExist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Template does not exist: {}", self.name)?;
        if let Some(backend) = &self.backend {
            write!(f, " (engine {})", backend)?;
        }
        if !self.tried.is_empty() {
            write!(f, ", tried: {}", self.tried.join(", "))?;
        }
        if !self.chain.is_empty() {
            let causes: Vec<String> = self.chain.iter().map(|c| c.to_string()).collect();
            write!(f, " [{}]", causes.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for TemplateDoesNotExist {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.chain
            .first()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
