//! Jinja2-style backend rendered with MiniJinja.

use minijinja::{AutoEscape, Environment};
use tracing::info;

use super::{EngineParams, StaticBackend, Template, JINJA2_BACKEND};
use crate::context::Context;
use crate::error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
use crate::loader::LoaderSet;
use crate::settings::Settings;

/// Application subdirectory searched by the app-directories loader.
pub const DEFAULT_APP_DIR: &str = "static_jinja2";

/// Jinja2-style template backend.
///
/// Options: `app_dir`, `loaders`, `autoescape`, `trim_blocks`,
/// `lstrip_blocks` and `keep_trailing_newline`.
///
/// `autoescape` does not force escaping everywhere. When true (the default)
/// MiniJinja picks escaping by file extension, so `.html`, `.htm` and `.xml`
/// templates are HTML escaped and other static assets are written as is.
/// When false nothing is escaped.
#[derive(Debug)]
pub struct StaticJinja2Templates {
    name: String,
    app_dir: String,
    loaders: LoaderSet,
    env: Environment<'static>,
}

impl StaticJinja2Templates {
    pub fn new(mut params: EngineParams, settings: &Settings) -> RenderStaticResult<Self> {
        let app_dir = params
            .take_string("app_dir")?
            .unwrap_or_else(|| DEFAULT_APP_DIR.to_string());
        let autoescape = params.take_bool("autoescape", true)?;
        let trim_blocks = params.take_bool("trim_blocks", false)?;
        let lstrip_blocks = params.take_bool("lstrip_blocks", false)?;
        let keep_trailing_newline = params.take_bool("keep_trailing_newline", false)?;
        let loaders = params.take_option("loaders");
        params.reject_unknown_options(JINJA2_BACKEND)?;

        let loaders =
            LoaderSet::from_options(loaders, &params.dirs, params.app_dirs, &app_dir, settings)?;

        let mut env = Environment::new();
        if !autoescape {
            env.set_auto_escape_callback(|_| AutoEscape::None);
        }
        env.set_trim_blocks(trim_blocks);
        env.set_lstrip_blocks(lstrip_blocks);
        env.set_keep_trailing_newline(keep_trailing_newline);

        let source_loaders = loaders.clone();
        env.set_loader(move |name| Ok(source_loaders.load(name).ok().map(|t| t.source)));

        info!(
            "Configured Jinja2-style engine {} with loaders {:?}",
            params.name,
            loaders.identifiers()
        );

        Ok(Self {
            name: params.name,
            app_dir,
            loaders,
            env,
        })
    }

    pub fn app_dir(&self) -> &str {
        &self.app_dir
    }

    pub fn loaders(&self) -> &LoaderSet {
        &self.loaders
    }

    /// The underlying environment, for registering filters and globals.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        &mut self.env
    }
}

impl StaticBackend for StaticJinja2Templates {
    fn name(&self) -> &str {
        &self.name
    }

    fn select_templates(
        &self,
        selector: &str,
        first_loader: bool,
        first_preference: bool,
    ) -> Result<Vec<String>, TemplateDoesNotExist> {
        self.loaders
            .select(selector, first_loader, first_preference)
            .map_err(|e| e.with_backend(&self.name))
    }

    fn get_template(&self, name: &str) -> Result<Template, TemplateDoesNotExist> {
        self.loaders
            .load(name)
            .map(|source| Template::new(source.origin))
            .map_err(|e| e.with_backend(&self.name))
    }

    fn render(&self, template: &Template, context: &Context) -> RenderStaticResult<String> {
        let compiled = self
            .env
            .get_template(template.name())
            .map_err(|e| RenderStaticError::render(template.name(), e))?;
        compiled
            .render(context)
            .map_err(|e| RenderStaticError::render(template.name(), e))
    }
}
