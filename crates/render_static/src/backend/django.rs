//! Django-style backend rendered with Tera.

use std::cell::RefCell;
use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tera::Tera;
use tracing::{debug, info};

use super::{EngineParams, StaticBackend, Template, DJANGO_BACKEND};
use crate::context::Context;
use crate::error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
use crate::loader::LoaderSet;
use crate::settings::Settings;

/// Application subdirectory searched by the app-directories loader.
pub const DEFAULT_APP_DIR: &str = "static_templates";

static TAG: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\{%-?\s*(?:extends|include|import)\s+([^%]*)%\}").ok());
static QUOTED: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"["']([^"']+)["']"#).ok());

/// Names referenced by `extends`, `include` and `import` tags.
fn referenced_templates(source: &str) -> Vec<String> {
    let (Some(tag), Some(quoted)) = (TAG.as_ref(), QUOTED.as_ref()) else {
        return Vec::new();
    };
    tag.captures_iter(source)
        .filter_map(|caps| caps.get(1))
        .flat_map(|args| quoted.captures_iter(args.as_str()))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Django-style template backend.
///
/// Options: `app_dir`, `loaders`, `autoescape`. A template is compiled when
/// it is first rendered, together with the templates it extends, includes
/// or imports. Other files the loaders can see are never parsed.
#[derive(Debug)]
pub struct StaticDjangoTemplates {
    name: String,
    app_dir: String,
    loaders: LoaderSet,
    tera: RefCell<Tera>,
}

impl StaticDjangoTemplates {
    pub fn new(mut params: EngineParams, settings: &Settings) -> RenderStaticResult<Self> {
        let app_dir = params
            .take_string("app_dir")?
            .unwrap_or_else(|| DEFAULT_APP_DIR.to_string());
        let autoescape = params.take_bool("autoescape", true)?;
        let loaders = params.take_option("loaders");
        params.reject_unknown_options(DJANGO_BACKEND)?;

        let loaders =
            LoaderSet::from_options(loaders, &params.dirs, params.app_dirs, &app_dir, settings)?;
        info!(
            "Configured Django-style engine {} with loaders {:?}",
            params.name,
            loaders.identifiers()
        );

        let mut tera = Tera::default();
        if !autoescape {
            tera.autoescape_on(vec![]);
        }

        Ok(Self {
            name: params.name,
            app_dir,
            loaders,
            tera: RefCell::new(tera),
        })
    }

    pub fn app_dir(&self) -> &str {
        &self.app_dir
    }

    pub fn loaders(&self) -> &LoaderSet {
        &self.loaders
    }

    /// Add `name` and everything it references to the Tera instance.
    fn compile(&self, name: &str) -> RenderStaticResult<()> {
        let mut sources = Vec::new();
        {
            let tera = self.tera.borrow();
            let mut seen = HashSet::new();
            let mut pending = vec![name.to_string()];
            while let Some(next) = pending.pop() {
                if !seen.insert(next.clone()) || tera.get_template_names().any(|n| n == next) {
                    continue;
                }
                match self.loaders.load(&next) {
                    Ok(template) => {
                        pending.extend(referenced_templates(&template.source));
                        sources.push((next, template.source));
                    }
                    Err(_) => debug!("{} references unknown template {}", name, next),
                }
            }
        }
        if sources.is_empty() {
            return Ok(());
        }

        debug!("Compiling {} templates for {} in engine {}", sources.len(), name, self.name);
        // Compile into a copy so a failed template does not poison later renders.
        let mut tera = self.tera.borrow().clone();
        tera.add_raw_templates(sources)
            .map_err(|e| RenderStaticError::render(name, e))?;
        *self.tera.borrow_mut() = tera;
        Ok(())
    }
}

impl StaticBackend for StaticDjangoTemplates {
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
        self.compile(template.name())?;
        let context = tera::Context::from_value(Value::Object(context.clone()))
            .map_err(|e| RenderStaticError::render(template.name(), e))?;
        self.tera
            .borrow()
            .render(template.name(), &context)
            .map_err(|e| RenderStaticError::render(template.name(), e))
    }
}
