//! The static template engine.
//!
//! [`StaticTemplateEngine`] ties configuration, backends and contexts
//! together. It resolves selectors against its engines in precedence
//! order, works out where each template goes and writes the rendered
//! output to disk.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use once_cell::unsync::OnceCell;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::backend::{BackendRegistry, EngineParams, StaticBackend, Template, DJANGO_BACKEND};
use crate::config::{ConfigSource, EngineDefinition, StaticTemplatesConfig};
use crate::context::{merge_contexts, resolve_context, Context, ContextRegistry, ContextSpec};
use crate::destination::resolve_destination;
use crate::error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
use crate::loader::APP_DIRECTORIES_BATCH_LOADER;
use crate::render::Render;
use crate::settings::Settings;
use crate::template_config::TemplateConfig;

static BACKEND_IDENTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)+$").ok());

fn is_dotted_identifier(identifier: &str) -> bool {
    BACKEND_IDENTIFIER
        .as_ref()
        .map_or(false, |re| re.is_match(identifier))
}

/// The engine used when `ENGINES` is not configured.
pub fn default_engine() -> EngineDefinition {
    EngineDefinition::new(DJANGO_BACKEND).option("loaders", json!([APP_DIRECTORIES_BATCH_LOADER]))
}

/// Options for a render call.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Context merged over the configured contexts.
    pub context: Option<ContextSpec>,
    /// Destination overriding any configured `dest`.
    pub dest: Option<PathBuf>,
    /// Stop at the first engine that matches a selector.
    pub first_engine: bool,
    /// Within an engine, stop at the first loader that matches.
    pub first_loader: bool,
    /// Within a loader, keep only the first matching preference.
    pub first_preference: bool,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: impl Into<ContextSpec>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_dest(mut self, dest: impl Into<PathBuf>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn first_engine(mut self, first_engine: bool) -> Self {
        self.first_engine = first_engine;
        self
    }

    pub fn first_loader(mut self, first_loader: bool) -> Self {
        self.first_loader = first_loader;
        self
    }

    pub fn first_preference(mut self, first_preference: bool) -> Self {
        self.first_preference = first_preference;
        self
    }
}

/// Renders templates to static files.
///
/// Configuration, global context, template configurations and backends are
/// built on first use and cached for the lifetime of the engine. The caches
/// are not synchronized; share an engine across threads only behind a lock.
pub struct StaticTemplateEngine {
    settings: Settings,
    config_source: Option<ConfigSource>,
    backends: BackendRegistry,
    contexts: ContextRegistry,
    config: OnceCell<StaticTemplatesConfig>,
    context: OnceCell<Context>,
    templates: OnceCell<Vec<TemplateConfig>>,
    engines: OnceCell<Vec<(String, Box<dyn StaticBackend>)>>,
}

impl StaticTemplateEngine {
    /// Create an engine reading its configuration from
    /// `settings.static_templates`.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            config_source: None,
            backends: BackendRegistry::new(),
            contexts: ContextRegistry::new(),
            config: OnceCell::new(),
            context: OnceCell::new(),
            templates: OnceCell::new(),
            engines: OnceCell::new(),
        }
    }

    /// Use an explicit configuration instead of the one in settings.
    pub fn with_config(mut self, config: impl Into<ConfigSource>) -> Self {
        self.config_source = Some(config.into());
        self.reset();
        self
    }

    pub fn with_backends(mut self, backends: BackendRegistry) -> Self {
        self.backends = backends;
        self.reset();
        self
    }

    pub fn with_context_registry(mut self, contexts: ContextRegistry) -> Self {
        self.contexts = contexts;
        self.reset();
        self
    }

    fn reset(&mut self) {
        self.config = OnceCell::new();
        self.context = OnceCell::new();
        self.templates = OnceCell::new();
        self.engines = OnceCell::new();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The global configuration.
    pub fn config(&self) -> RenderStaticResult<&StaticTemplatesConfig> {
        self.config.get_or_try_init(|| {
            let source = match (&self.config_source, &self.settings.static_templates) {
                (Some(source), _) => source.clone(),
                (None, Some(raw)) => ConfigSource::Raw(raw.clone()),
                (None, None) => {
                    return Err(RenderStaticError::improperly_configured(
                        "No STATIC_TEMPLATES configuration directive in settings!",
                    ))
                }
            };
            source.load()
        })
    }

    /// The global context: the settings under `settings`, overlaid with the
    /// configured global context.
    pub fn context(&self) -> RenderStaticResult<&Context> {
        self.context.get_or_try_init(|| {
            let config = self.config()?;
            let mut context = Context::new();
            context.insert("settings".to_string(), self.settings.to_context_value()?);
            let global = resolve_context(config.context.as_ref(), &self.contexts)
                .map_err(|e| e.into_config_error(None))?;
            context.extend(global);
            Ok(context)
        })
    }

    /// Configurations for every entry of `templates`, in document order.
    pub fn templates(&self) -> RenderStaticResult<&[TemplateConfig]> {
        self.templates
            .get_or_try_init(|| {
                self.config()?
                    .templates
                    .iter()
                    .map(|(name, spec)| {
                        TemplateConfig::new(name.as_str(), spec, &self.contexts).map_err(|e| {
                            if e.is_improperly_configured() {
                                e
                            } else {
                                RenderStaticError::improperly_configured_by(
                                    format!("Invalid template configuration for {}", name),
                                    e,
                                )
                            }
                        })
                    })
                    .collect()
            })
            .map(Vec::as_slice)
    }

    /// Engines in precedence order, with their aliases.
    pub fn engines(
        &self,
    ) -> RenderStaticResult<impl Iterator<Item = (&str, &dyn StaticBackend)> + '_> {
        Ok(self
            .load_engines()?
            .iter()
            .map(|(alias, backend)| (alias.as_str(), backend.as_ref())))
    }

    /// Look up an engine by alias.
    pub fn engine(&self, alias: &str) -> RenderStaticResult<&dyn StaticBackend> {
        self.load_engines()?
            .iter()
            .find(|(name, _)| name == alias)
            .map(|(_, backend)| backend.as_ref())
            .ok_or_else(|| RenderStaticError::InvalidTemplateEngine(alias.to_string()))
    }

    fn load_engines(&self) -> RenderStaticResult<&[(String, Box<dyn StaticBackend>)]> {
        self.engines
            .get_or_try_init(|| self.build_engines())
            .map(Vec::as_slice)
    }

    fn build_engines(&self) -> RenderStaticResult<Vec<(String, Box<dyn StaticBackend>)>> {
        let definitions = match &self.config()?.engines {
            Some(definitions) => definitions.clone(),
            None => vec![default_engine()],
        };

        let mut assembled = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let backend = match definition.backend {
                Some(backend) if is_dotted_identifier(&backend) => backend,
                other => {
                    return Err(RenderStaticError::improperly_configured(format!(
                        "Invalid BACKEND for a static template engine: {}. Check your \
                         STATIC_TEMPLATES setting.",
                        other.as_deref().unwrap_or("<not defined>")
                    )))
                }
            };
            let name = definition
                .name
                .unwrap_or_else(|| backend.rsplit('.').next().unwrap_or(&backend).to_string());
            let params = EngineParams {
                name,
                dirs: definition.dirs.unwrap_or_default(),
                app_dirs: definition.app_dirs.unwrap_or(false),
                options: definition.options.unwrap_or_default(),
            };
            assembled.push((backend, params));
        }

        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = Vec::new();
        for (_, params) in &assembled {
            if !seen.insert(params.name.as_str()) && !duplicates.contains(&params.name.as_str()) {
                duplicates.push(params.name.as_str());
            }
        }
        if !duplicates.is_empty() {
            return Err(RenderStaticError::improperly_configured(format!(
                "Template engine aliases are not unique, duplicates: {}. Set a unique NAME for \
                 each engine in settings.STATIC_TEMPLATES.",
                duplicates.join(", ")
            )));
        }

        let mut engines = Vec::with_capacity(assembled.len());
        for (backend, params) in assembled {
            let factory = self.backends.get(&backend).ok_or_else(|| {
                RenderStaticError::improperly_configured(format!(
                    "Invalid BACKEND for a static template engine: {}. Check your \
                     STATIC_TEMPLATES setting.",
                    backend
                ))
            })?;
            let alias = params.name.clone();
            info!("Loading static template engine {} ({})", alias, backend);
            engines.push((alias, factory(params, &self.settings)?));
        }
        Ok(engines)
    }

    /// Render the templates matching each selector, yielding one
    /// [`Render`] per file as soon as it has been written.
    ///
    /// The iterator is single pass. Selectors are resolved one at a time, so
    /// files for earlier selectors are already on disk when a later selector
    /// fails. Nothing is yielded after an error.
    pub fn render_each<I, S>(&self, selectors: I, options: RenderOptions) -> RenderEach<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selectors: Vec<String> = selectors.into_iter().map(Into::into).collect();
        let batch = selectors.len() > 1 && options.dest.is_some();
        RenderEach {
            engine: self,
            selectors: selectors.into_iter(),
            options,
            batch,
            overrides: None,
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Render the templates matching each selector and collect the results.
    pub fn render_to_disk<I, S>(
        &self,
        selectors: I,
        options: RenderOptions,
    ) -> RenderStaticResult<Vec<Render>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.render_each(selectors, options).collect()
    }

    /// Render every configured template.
    pub fn render_configured(&self, options: RenderOptions) -> RenderStaticResult<Vec<Render>> {
        let selectors: Vec<String> = self
            .templates()?
            .iter()
            .map(|config| config.name().to_string())
            .collect();
        self.render_to_disk(selectors, options)
    }

    fn template_config(&self, selector: &str) -> RenderStaticResult<TemplateConfig> {
        Ok(self
            .templates()?
            .iter()
            .find(|config| config.name() == selector)
            .cloned()
            .unwrap_or_else(|| TemplateConfig::unconfigured(selector)))
    }

    /// Resolve one selector into renders with their destinations prepared.
    fn resolve_selector(
        &self,
        selector: &str,
        options: &RenderOptions,
        batch: bool,
    ) -> RenderStaticResult<Vec<Render>> {
        let config = self.template_config(selector)?;

        let mut loaded: Vec<(Template, &str)> = Vec::new();
        let mut names: HashSet<String> = HashSet::new();
        let mut missing: Vec<TemplateDoesNotExist> = Vec::new();

        for (alias, backend) in self.load_engines()? {
            match backend.select_templates(selector, options.first_loader, options.first_preference)
            {
                Ok(selected) => {
                    for name in selected {
                        if names.contains(&name) {
                            debug!("{} already loaded, ignoring the copy in {}", name, alias);
                            continue;
                        }
                        match backend.get_template(&name) {
                            Ok(template) => {
                                names.insert(name);
                                loaded.push((template, alias.as_str()));
                            }
                            Err(err) if loaded.is_empty() => {
                                warn!("Skipping unloadable template {} in {}", name, alias);
                                missing.push(err);
                            }
                            Err(err) => {
                                return Err(RenderStaticError::UnloadableTemplate {
                                    template: name,
                                    source: err,
                                })
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!("Engine {} has no match for {}", alias, selector);
                    missing.push(err);
                }
            }
            if options.first_engine && !loaded.is_empty() {
                break;
            }
        }

        if loaded.is_empty() {
            return Err(TemplateDoesNotExist::new(selector).with_chain(missing).into());
        }

        let batch = batch || loaded.len() > 1;
        loaded
            .into_iter()
            .map(|(template, alias)| {
                let destination = resolve_destination(
                    &config,
                    &template,
                    batch,
                    options.dest.as_deref(),
                    self.settings.static_root.as_deref(),
                )?;
                Ok(Render::new(selector, config.clone(), template, destination, alias))
            })
            .collect()
    }

    fn write(&self, render: &Render, overrides: Option<&Context>) -> RenderStaticResult<()> {
        let backend = self.engine(render.engine())?;
        let context = merge_contexts(
            [self.context()?, render.config().context()]
                .into_iter()
                .chain(overrides),
        );
        let content = backend.render(render.template(), &context)?;
        fs::write(render.destination(), content)?;
        info!("Rendered {}", render);
        Ok(())
    }
}

impl fmt::Debug for StaticTemplateEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let engines: Option<Vec<&str>> = self
            .engines
            .get()
            .map(|engines| engines.iter().map(|(alias, _)| alias.as_str()).collect());
        f.debug_struct("StaticTemplateEngine")
            .field("settings", &self.settings)
            .field("backends", &self.backends)
            .field("contexts", &self.contexts)
            .field("engines", &engines)
            .finish()
    }
}

/// Iterator returned by [`StaticTemplateEngine::render_each`].
pub struct RenderEach<'a> {
    engine: &'a StaticTemplateEngine,
    selectors: std::vec::IntoIter<String>,
    options: RenderOptions,
    batch: bool,
    overrides: Option<Context>,
    pending: VecDeque<Render>,
    finished: bool,
}

impl RenderEach<'_> {
    fn advance(&mut self) -> RenderStaticResult<Option<Render>> {
        if self.overrides.is_none() {
            let overrides = resolve_context(self.options.context.as_ref(), &self.engine.contexts)
                .map_err(|e| e.into_config_error(None))?;
            self.overrides = Some(overrides);
        }

        loop {
            if let Some(render) = self.pending.pop_front() {
                self.engine.write(&render, self.overrides.as_ref())?;
                return Ok(Some(render));
            }
            match self.selectors.next() {
                Some(selector) => {
                    let renders = self
                        .engine
                        .resolve_selector(&selector, &self.options, self.batch)?;
                    self.pending.extend(renders);
                }
                None => return Ok(None),
            }
        }
    }
}

impl Iterator for RenderEach<'_> {
    type Item = RenderStaticResult<Render>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(render)) => Some(Ok(render)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

impl fmt::Debug for RenderEach<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderEach")
            .field("remaining", &self.selectors.as_slice())
            .field("pending", &self.pending.len())
            .field("finished", &self.finished)
            .finish()
    }
}
