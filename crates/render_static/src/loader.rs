//! Template loaders shared by all backends.
//!
//! Loaders find template sources by name and resolve batch selectors (glob
//! patterns) to the template names they match. Matches are grouped by
//! *preference*: each search directory of the filesystem loader, or each
//! installed application of the app-directories loader, is one preference.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{RenderStaticError, RenderStaticResult, TemplateDoesNotExist};
use crate::settings::{AppConfig, Settings};

pub const FILESYSTEM_LOADER: &str = "render_static.loaders.StaticFilesystemLoader";
pub const APP_DIRECTORIES_LOADER: &str = "render_static.loaders.StaticAppDirectoriesLoader";
pub const APP_DIRECTORIES_BATCH_LOADER: &str =
    "render_static.loaders.StaticAppDirectoriesBatchLoader";
pub const LOCMEM_LOADER: &str = "render_static.loaders.StaticLocMemLoader";

const FILESYSTEM_IDENTIFIERS: [&str; 4] = [
    FILESYSTEM_LOADER,
    "render_static.loaders.StaticFilesystemBatchLoader",
    "render_static.loaders.jinja2.StaticFileSystemLoader",
    "render_static.loaders.jinja2.StaticFileSystemBatchLoader",
];
const APP_DIRECTORIES_IDENTIFIERS: [&str; 2] = [APP_DIRECTORIES_LOADER, APP_DIRECTORIES_BATCH_LOADER];
const LOCMEM_IDENTIFIERS: [&str; 2] = [LOCMEM_LOADER, "render_static.loaders.jinja2.StaticDictLoader"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Where a template was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Source file, for loaders backed by the filesystem.
    pub path: Option<PathBuf>,
    /// Engine-relative template name.
    pub template_name: String,
    /// Identifier of the loader that produced the template.
    pub loader: String,
    /// Application owning the template, if loaded from an app directory.
    pub app: Option<AppConfig>,
}

/// A template's origin together with its source text.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub origin: Origin,
    pub source: String,
}

/// A parsed template selector: an exact name or a glob pattern.
#[derive(Debug, Clone)]
pub enum Selector {
    Exact(String),
    Pattern(Pattern),
}

/// Whether a template name stays inside the directory it is joined to.
pub fn is_safe_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty()
        && !path.is_absolute()
        && !path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

impl Selector {
    /// Parse a selector. Returns `None` for selectors that could escape a
    /// search directory (absolute paths or `..` components).
    pub fn parse(selector: &str) -> Option<Self> {
        if !is_safe_name(selector) {
            return None;
        }

        if selector.contains(['*', '?', '[']) {
            if let Ok(pattern) = Pattern::new(selector) {
                return Some(Self::Pattern(pattern));
            }
        }
        Some(Self::Exact(selector.to_string()))
    }

    /// A pattern also matches a template literally named like the pattern.
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == name,
            Self::Pattern(pattern) => {
                pattern.as_str() == name || pattern.matches_with(name, MATCH_OPTIONS)
            }
        }
    }
}

/// A source of templates.
pub trait Loader: Send + Sync + fmt::Debug {
    fn identifier(&self) -> &str;

    /// Names matching the selector, grouped by preference in precedence order.
    fn select(&self, selector: &Selector) -> Vec<Vec<String>>;

    /// Load a template by exact name.
    fn load(&self, name: &str) -> Option<TemplateSource>;

    /// Human readable search locations, reported when nothing matches.
    fn locations(&self) -> Vec<String>;
}

/// Loads templates from a list of directories.
#[derive(Debug, Clone)]
pub struct FilesystemLoader {
    dirs: Vec<PathBuf>,
}

impl FilesystemLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }
}

impl Loader for FilesystemLoader {
    fn identifier(&self) -> &str {
        FILESYSTEM_LOADER
    }

    fn select(&self, selector: &Selector) -> Vec<Vec<String>> {
        self.dirs.iter().map(|dir| select_in_dir(dir, selector)).collect()
    }

    fn load(&self, name: &str) -> Option<TemplateSource> {
        self.dirs
            .iter()
            .find_map(|dir| load_from_dir(dir, name, self.identifier(), None))
    }

    fn locations(&self) -> Vec<String> {
        self.dirs.iter().map(|d| d.display().to_string()).collect()
    }
}

/// Loads templates from a named subdirectory of every installed application.
#[derive(Debug, Clone)]
pub struct AppDirectoriesLoader {
    roots: Vec<(AppConfig, PathBuf)>,
}

impl AppDirectoriesLoader {
    /// Search `<app.path>/<app_dir>` for each installed application that has one.
    pub fn new(settings: &Settings, app_dir: &str) -> Self {
        let roots = settings
            .installed_apps
            .iter()
            .map(|app| (app.clone(), app.template_dir(app_dir)))
            .filter(|(_, dir)| dir.is_dir())
            .collect();
        Self { roots }
    }
}

impl Loader for AppDirectoriesLoader {
    fn identifier(&self) -> &str {
        APP_DIRECTORIES_LOADER
    }

    fn select(&self, selector: &Selector) -> Vec<Vec<String>> {
        self.roots
            .iter()
            .map(|(_, dir)| select_in_dir(dir, selector))
            .collect()
    }

    fn load(&self, name: &str) -> Option<TemplateSource> {
        self.roots
            .iter()
            .find_map(|(app, dir)| load_from_dir(dir, name, self.identifier(), Some(app)))
    }

    fn locations(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|(app, dir)| format!("[{}] {}", app.label, dir.display()))
            .collect()
    }
}

/// Loads templates from an in-memory mapping of names to sources.
#[derive(Debug, Clone, Default)]
pub struct LocMemLoader {
    templates: BTreeMap<String, String>,
}

impl LocMemLoader {
    pub fn new(templates: BTreeMap<String, String>) -> Self {
        Self { templates }
    }
}

impl Loader for LocMemLoader {
    fn identifier(&self) -> &str {
        LOCMEM_LOADER
    }

    fn select(&self, selector: &Selector) -> Vec<Vec<String>> {
        vec![self
            .templates
            .keys()
            .filter(|name| selector.matches(name))
            .cloned()
            .collect()]
    }

    fn load(&self, name: &str) -> Option<TemplateSource> {
        self.templates.get(name).map(|source| TemplateSource {
            origin: Origin {
                path: None,
                template_name: name.to_string(),
                loader: self.identifier().to_string(),
                app: None,
            },
            source: source.clone(),
        })
    }

    fn locations(&self) -> Vec<String> {
        vec!["<in-memory>".to_string()]
    }
}

/// The ordered loaders of one backend.
#[derive(Clone, Default)]
pub struct LoaderSet {
    loaders: Vec<Arc<dyn Loader>>,
}

impl LoaderSet {
    pub fn new(loaders: Vec<Arc<dyn Loader>>) -> Self {
        Self { loaders }
    }

    /// Build loaders from a backend's `loaders` option.
    ///
    /// Without explicit loaders the filesystem loader searches `dirs`, and
    /// the app-directories loader is appended when `app_dirs` is set.
    pub fn from_options(
        loaders: Option<Value>,
        dirs: &[PathBuf],
        app_dirs: bool,
        app_dir: &str,
        settings: &Settings,
    ) -> RenderStaticResult<Self> {
        let specs = match loaders {
            None | Some(Value::Null) => {
                let mut set: Vec<Arc<dyn Loader>> =
                    vec![Arc::new(FilesystemLoader::new(dirs.to_vec()))];
                if app_dirs {
                    set.push(Arc::new(AppDirectoriesLoader::new(settings, app_dir)));
                }
                return Ok(Self::new(set));
            }
            Some(_) if app_dirs => {
                return Err(RenderStaticError::improperly_configured(
                    "APP_DIRS must not be set when loaders is defined.",
                ))
            }
            Some(Value::Array(specs)) => specs,
            Some(other) => {
                return Err(RenderStaticError::improperly_configured(format!(
                    "OPTIONS 'loaders' must be a list of loader identifiers, not {}",
                    other
                )))
            }
        };

        let loaders = specs
            .into_iter()
            .map(|spec| build_loader(spec, dirs, app_dir, settings))
            .collect::<RenderStaticResult<Vec<_>>>()?;
        Ok(Self::new(loaders))
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.loaders.iter().map(|l| l.identifier()).collect()
    }

    /// Resolve a selector to template names.
    ///
    /// `first_loader` keeps only the names of the first loader with any
    /// match; `first_preference` keeps only each loader's first matching
    /// preference.
    pub fn select(
        &self,
        selector: &str,
        first_loader: bool,
        first_preference: bool,
    ) -> Result<Vec<String>, TemplateDoesNotExist> {
        let mut names: Vec<String> = Vec::new();

        if let Some(parsed) = Selector::parse(selector) {
            for loader in &self.loaders {
                let mut matched = false;
                for group in loader.select(&parsed) {
                    if group.is_empty() {
                        continue;
                    }
                    matched = true;
                    for name in group {
                        if !names.contains(&name) {
                            names.push(name);
                        }
                    }
                    if first_preference {
                        break;
                    }
                }
                if first_loader && matched {
                    break;
                }
            }
        } else {
            warn!("Ignoring unsafe template selector: {}", selector);
        }

        if names.is_empty() {
            return Err(TemplateDoesNotExist::new(selector).with_tried(self.locations()));
        }
        Ok(names)
    }

    /// Load a template by exact name from the first loader that has it.
    pub fn load(&self, name: &str) -> Result<TemplateSource, TemplateDoesNotExist> {
        if !is_safe_name(name) {
            warn!("Refusing to load unsafe template name: {}", name);
            return Err(TemplateDoesNotExist::new(name));
        }
        self.loaders
            .iter()
            .find_map(|loader| loader.load(name))
            .ok_or_else(|| TemplateDoesNotExist::new(name).with_tried(self.locations()))
    }

    fn locations(&self) -> Vec<String> {
        self.loaders.iter().flat_map(|l| l.locations()).collect()
    }
}

impl fmt::Debug for LoaderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderSet")
            .field("loaders", &self.identifiers())
            .finish()
    }
}

fn build_loader(
    spec: Value,
    dirs: &[PathBuf],
    app_dir: &str,
    settings: &Settings,
) -> RenderStaticResult<Arc<dyn Loader>> {
    let (identifier, argument) = match spec {
        Value::String(identifier) => (identifier, None),
        Value::Array(pair) if pair.len() == 2 => {
            let mut pair = pair.into_iter();
            match (pair.next(), pair.next()) {
                (Some(Value::String(identifier)), argument) => (identifier, argument),
                (first, _) => return Err(invalid_loader(&first.unwrap_or(Value::Null))),
            }
        }
        other => return Err(invalid_loader(&other)),
    };
    debug!("Building loader {}", identifier);

    if FILESYSTEM_IDENTIFIERS.contains(&identifier.as_str()) {
        let dirs = match argument {
            None => dirs.to_vec(),
            Some(argument) => serde_json::from_value(argument).map_err(|e| {
                RenderStaticError::improperly_configured_by(
                    format!("{} expects a list of directories", identifier),
                    e,
                )
            })?,
        };
        return Ok(Arc::new(FilesystemLoader::new(dirs)));
    }

    if APP_DIRECTORIES_IDENTIFIERS.contains(&identifier.as_str()) {
        if argument.is_some() {
            return Err(RenderStaticError::improperly_configured(format!(
                "{} does not accept arguments",
                identifier
            )));
        }
        return Ok(Arc::new(AppDirectoriesLoader::new(settings, app_dir)));
    }

    if LOCMEM_IDENTIFIERS.contains(&identifier.as_str()) {
        let templates = match argument {
            None => BTreeMap::new(),
            Some(argument) => serde_json::from_value(argument).map_err(|e| {
                RenderStaticError::improperly_configured_by(
                    format!("{} expects a mapping of template names to sources", identifier),
                    e,
                )
            })?,
        };
        return Ok(Arc::new(LocMemLoader::new(templates)));
    }

    Err(RenderStaticError::improperly_configured(format!(
        "Unknown template loader: {}",
        identifier
    )))
}

fn invalid_loader(spec: &Value) -> RenderStaticError {
    RenderStaticError::improperly_configured(format!(
        "Invalid loader specification {}: expected an identifier or an [identifier, argument] pair",
        spec
    ))
}

fn select_in_dir(dir: &Path, selector: &Selector) -> Vec<String> {
    match selector {
        Selector::Exact(name) => {
            if dir.join(name).is_file() {
                vec![name.clone()]
            } else {
                Vec::new()
            }
        }
        Selector::Pattern(_) => list_dir(dir)
            .into_iter()
            .filter(|name| selector.matches(name))
            .collect(),
    }
}

fn load_from_dir(
    dir: &Path,
    name: &str,
    loader: &str,
    app: Option<&AppConfig>,
) -> Option<TemplateSource> {
    let path = dir.join(name);
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(&path) {
        Ok(source) => Some(TemplateSource {
            origin: Origin {
                path: Some(path),
                template_name: name.to_string(),
                loader: loader.to_string(),
                app: app.cloned(),
            },
            source,
        }),
        Err(e) => {
            warn!("Failed to read template {:?}: {}", path, e);
            None
        }
    }
}

/// Template names under a directory, `/`-separated and sorted.
fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e.path().strip_prefix(dir).ok()?;
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(parts.join("/"))
        })
        .collect();
    names.sort();
    names
}
