//! # render_static
//!
//! Render templates to static files at build time.
//!
//! A [`StaticTemplateEngine`] reads the `STATIC_TEMPLATES` configuration,
//! builds one backend per configured engine and renders templates matched
//! by name or glob selector to files on disk:
//!
//! - Django-style templates (rendered with Tera) and Jinja2-style templates
//!   (rendered with MiniJinja)
//! - Filesystem, application-directory and in-memory template loaders
//! - Layered contexts: global, per-template and per-call
//! - Destinations derived from configuration, the owning application or
//!   `STATIC_ROOT`
//!
//! ## Example
//!
//! ```rust,no_run
//! use render_static::{RenderOptions, Settings, StaticTemplateEngine};
//!
//! let settings = Settings::from_path("settings.yaml").unwrap();
//! let engine = StaticTemplateEngine::new(settings);
//!
//! for render in engine.render_each(["js/defines.js", "css/*.css"], RenderOptions::new()) {
//!     println!("{}", render.unwrap());
//! }
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod destination;
pub mod engine;
pub mod error;
pub mod loader;
pub mod render;
pub mod settings;
pub mod template_config;

pub use backend::{
    BackendFactory, BackendRegistry, EngineParams, StaticBackend, StaticDjangoTemplates,
    StaticJinja2Templates, Template, DJANGO_BACKEND, JINJA2_BACKEND,
};
pub use config::{ConfigSource, EngineDefinition, StaticTemplatesConfig, TemplateSpec};
pub use context::{
    merge_contexts, resolve_context, Context, ContextFn, ContextRegistry, ContextSpec,
    InvalidContext,
};
pub use destination::resolve_destination;
pub use engine::{default_engine, RenderEach, RenderOptions, StaticTemplateEngine};
pub use error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
pub use loader::{Loader, LoaderSet, Origin, Selector};
pub use render::Render;
pub use settings::{AppConfig, Settings};
pub use template_config::TemplateConfig;
