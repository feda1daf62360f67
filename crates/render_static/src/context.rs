//! Context resolution.
//!
//! A context specification is a concrete mapping, a callable producing a
//! mapping, or a string reference. References are looked up in a
//! [`ContextRegistry`] first and otherwise treated as a path to a JSON,
//! YAML or TOML document holding a mapping.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::read_document;
use crate::error::{BoxError, RenderStaticError};

/// A concrete template context.
pub type Context = Map<String, Value>;

/// A deferred context source.
pub type ContextFn = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// Failure to produce a mapping from a context specification.
#[derive(Error, Debug)]
pub enum InvalidContext {
    #[error("Unable to resolve context '{0}' to a mapping")]
    Unresolvable(String),

    #[error("Context must resolve to a mapping, not {0}")]
    NotAMapping(&'static str),

    #[error("Context callable '{name}' failed: {source}")]
    CallableFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("Unable to load context from {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl InvalidContext {
    /// Report as a configuration error, naming the template when known.
    pub(crate) fn into_config_error(self, template: Option<&str>) -> RenderStaticError {
        let target = template.map(|t| format!(" for {}", t)).unwrap_or_default();
        RenderStaticError::improperly_configured_by(
            format!(
                "STATIC_TEMPLATES 'context' configuration directive{} must be a mapping or a \
                 callable that returns a mapping!",
                target
            ),
            self,
        )
    }
}

/// A context specification as found in configuration or passed by callers.
#[derive(Clone)]
pub enum ContextSpec {
    Map(Context),
    Reference(String),
    Callable(ContextFn),
    /// A configured literal that is neither a mapping nor a reference.
    Literal(Value),
}

impl ContextSpec {
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Callable(Arc::new(f))
    }

    pub fn reference(reference: impl Into<String>) -> Self {
        Self::Reference(reference.into())
    }

    /// Interpret a raw configuration value. `null` means no context.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Object(map) => Some(Self::Map(map)),
            Value::String(reference) => Some(Self::Reference(reference)),
            other => Some(Self::Literal(other)),
        }
    }
}

impl From<Context> for ContextSpec {
    fn from(map: Context) -> Self {
        Self::Map(map)
    }
}

impl fmt::Debug for ContextSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Self::Reference(reference) => f.debug_tuple("Reference").field(reference).finish(),
            Self::Callable(_) => f.write_str("Callable(..)"),
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
        }
    }
}

impl<'de> Deserialize<'de> for ContextSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(value).unwrap_or_else(|| Self::Map(Map::new())))
    }
}

/// Named context callables that string references resolve against.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    sources: HashMap<String, ContextFn>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callable under a dotted identifier, replacing any previous one.
    pub fn register<F>(&mut self, identifier: impl Into<String>, f: F)
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        debug!("Registering context source: {}", identifier);
        self.sources.insert(identifier, Arc::new(f));
    }

    pub fn with<F>(mut self, identifier: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(identifier, f);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<ContextFn> {
        self.sources.get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.sources.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolve a context specification into a concrete mapping.
pub fn resolve_context(
    spec: Option<&ContextSpec>,
    registry: &ContextRegistry,
) -> Result<Context, InvalidContext> {
    match spec {
        None => Ok(Context::new()),
        Some(ContextSpec::Map(map)) => Ok(map.clone()),
        Some(ContextSpec::Callable(f)) => call(f, "<callable>"),
        Some(ContextSpec::Reference(reference)) => {
            if let Some(f) = registry.get(reference) {
                return call(&f, reference);
            }
            let path = Path::new(reference);
            if path.is_file() {
                return from_file(path);
            }
            Err(InvalidContext::Unresolvable(reference.clone()))
        }
        Some(ContextSpec::Literal(value)) => Err(InvalidContext::NotAMapping(kind(value))),
    }
}

/// Merge context layers; keys of later layers win.
pub fn merge_contexts<'a>(layers: impl IntoIterator<Item = &'a Context>) -> Context {
    let mut merged = Context::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn call(f: &ContextFn, name: &str) -> Result<Context, InvalidContext> {
    let value = f().map_err(|e| InvalidContext::CallableFailed {
        name: name.to_string(),
        source: e.into(),
    })?;
    into_mapping(value)
}

fn from_file(path: &Path) -> Result<Context, InvalidContext> {
    debug!("Loading context from {:?}", path);
    let document = read_document(path).map_err(|e| InvalidContext::File {
        path: path.to_path_buf(),
        source: Box::new(e),
    })?;
    into_mapping(document)
}

fn into_mapping(value: Value) -> Result<Context, InvalidContext> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(InvalidContext::NotAMapping(kind(&other))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    fn map(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("not a mapping"),
        }
    }

    #[test]
    fn test_absent_and_mapping() {
        let registry = ContextRegistry::new();
        assert!(resolve_context(None, &registry).unwrap().is_empty());

        let ctx = map(json!({"a": 1, "b": [1, 2]}));
        let spec = ContextSpec::Map(ctx.clone());
        assert_eq!(resolve_context(Some(&spec), &registry).unwrap(), ctx);
    }

    #[test]
    fn test_callable_and_reference() {
        let registry = ContextRegistry::new().with("app.context.defines", || Ok(json!({"x": 1})));

        let spec = ContextSpec::callable(|| Ok(json!({"y": 2})));
        assert_eq!(resolve_context(Some(&spec), &registry).unwrap(), map(json!({"y": 2})));

        let spec = ContextSpec::reference("app.context.defines");
        assert_eq!(resolve_context(Some(&spec), &registry).unwrap(), map(json!({"x": 1})));
    }

    #[test]
    fn test_callable_returning_non_mapping_fails() {
        let registry = ContextRegistry::new().with("app.context.list", || Ok(json!([1, 2])));

        let spec = ContextSpec::callable(|| Ok(json!("nope")));
        assert!(matches!(
            resolve_context(Some(&spec), &registry),
            Err(InvalidContext::NotAMapping("a string"))
        ));

        let spec = ContextSpec::reference("app.context.list");
        assert!(matches!(
            resolve_context(Some(&spec), &registry),
            Err(InvalidContext::NotAMapping("a list"))
        ));

        let spec = ContextSpec::callable(|| Err(anyhow::anyhow!("boom")));
        assert!(matches!(
            resolve_context(Some(&spec), &registry),
            Err(InvalidContext::CallableFailed { .. })
        ));
    }

    #[test]
    fn test_reference_to_context_files() {
        let temp = tempdir().unwrap();
        let json_path = temp.path().join("ctx.json");
        fs::write(&json_path, r#"{"to": "world"}"#).unwrap();
        let yaml_path = temp.path().join("ctx.yaml");
        fs::write(&yaml_path, "to: yaml\n").unwrap();
        let bad_path = temp.path().join("bad.json");
        fs::write(&bad_path, "[1, 2, 3]").unwrap();

        let registry = ContextRegistry::new();
        let spec = ContextSpec::reference(json_path.to_string_lossy());
        assert_eq!(resolve_context(Some(&spec), &registry).unwrap(), map(json!({"to": "world"})));

        let spec = ContextSpec::reference(yaml_path.to_string_lossy());
        assert_eq!(resolve_context(Some(&spec), &registry).unwrap(), map(json!({"to": "yaml"})));

        let spec = ContextSpec::reference(bad_path.to_string_lossy());
        assert!(resolve_context(Some(&spec), &registry).is_err());

        let spec = ContextSpec::reference("does.not.exist");
        assert!(matches!(
            resolve_context(Some(&spec), &registry),
            Err(InvalidContext::Unresolvable(_))
        ));
    }

    #[test]
    fn test_literal_is_rejected() {
        let spec = ContextSpec::from_value(json!([])).unwrap();
        assert!(resolve_context(Some(&spec), &ContextRegistry::new()).is_err());
        assert!(ContextSpec::from_value(Value::Null).is_none());
    }

    #[test]
    fn test_merge_precedence() {
        let global = map(json!({"a": 1, "b": 2}));
        let template = map(json!({"b": 3, "c": 4}));
        let call = map(json!({"c": 5}));

        let merged = merge_contexts([&global, &template, &call]);
        assert_eq!(merged, map(json!({"a": 1, "b": 3, "c": 5})));
    }
}
