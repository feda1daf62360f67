//! Backend registry mapping `BACKEND` identifiers to backend factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{EngineParams, StaticBackend, StaticDjangoTemplates, StaticJinja2Templates};
use crate::error::RenderStaticResult;
use crate::settings::Settings;

pub const DJANGO_BACKEND: &str = "render_static.backends.StaticDjangoTemplates";
pub const JINJA2_BACKEND: &str = "render_static.backends.StaticJinja2Templates";

/// Constructs a backend from its engine parameters.
pub type BackendFactory = Arc<
    dyn Fn(EngineParams, &Settings) -> RenderStaticResult<Box<dyn StaticBackend>> + Send + Sync,
>;

/// A registry of backend factories keyed by dotted identifier.
///
/// The built-in Django-style and Jinja2-style backends are always
/// registered; projects may add their own.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// Create a registry holding the built-in backends.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(DJANGO_BACKEND, |params, settings| {
            Ok(Box::new(StaticDjangoTemplates::new(params, settings)?) as Box<dyn StaticBackend>)
        });
        registry.register(JINJA2_BACKEND, |params, settings| {
            Ok(Box::new(StaticJinja2Templates::new(params, settings)?) as Box<dyn StaticBackend>)
        });
        registry
    }

    /// Create a registry with no backends.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory, replacing any previous one under the same identifier.
    pub fn register<F>(&mut self, identifier: impl Into<String>, factory: F)
    where
        F: Fn(EngineParams, &Settings) -> RenderStaticResult<Box<dyn StaticBackend>>
            + Send
            + Sync
            + 'static,
    {
        let identifier = identifier.into();
        debug!("Registering backend: {}", identifier);
        self.factories.insert(identifier, Arc::new(factory));
    }

    pub fn with<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: Fn(EngineParams, &Settings) -> RenderStaticResult<Box<dyn StaticBackend>>
            + Send
            + Sync
            + 'static,
    {
        self.register(identifier, factory);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<BackendFactory> {
        self.factories.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories.contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
