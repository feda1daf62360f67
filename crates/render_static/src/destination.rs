//! Output path resolution.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::Template;
use crate::error::{RenderStaticError, RenderStaticResult};
use crate::template_config::TemplateConfig;

/// Resolve where a template is written and make sure its parent directory
/// exists.
///
/// A caller override wins over the configured `dest`. Without either, the
/// template goes under its owning application's static directory, or under
/// `static_root` when it has no owning application. An explicit destination
/// is treated as a directory when rendering a batch or when it already
/// names a directory; otherwise it is the output file itself.
pub fn resolve_destination(
    config: &TemplateConfig,
    template: &Template,
    batch: bool,
    dest: Option<&Path>,
    static_root: Option<&Path>,
) -> RenderStaticResult<PathBuf> {
    let destination = match dest.or(config.dest()) {
        Some(dest) if batch || dest.is_dir() => dest.join(template.name()),
        Some(dest) => dest.to_path_buf(),
        None => {
            let base = match (template.app(), static_root) {
                (Some(app), _) => app.static_dir(),
                (None, Some(root)) => root.to_path_buf(),
                (None, None) => {
                    return Err(RenderStaticError::improperly_configured(format!(
                        "Template {} must either be configured with a 'dest' or STATIC_ROOT \
                         must be defined in settings, because it was not loaded from an app!",
                        template.name()
                    )))
                }
            };
            base.join(template.name())
        }
    };

    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating destination directory {:?}", parent);
            fs::create_dir_all(parent)?;
        }
    }

    Ok(destination)
}
