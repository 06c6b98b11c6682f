//! templates extension - Tera-backed renderer
//!
//! Loads every `*.html` file below the extension's `templates/` directory
//! into a [`Tera`] instance at startup. Templates are named by their path
//! relative to that directory without the extension (`hello`,
//! `partials/nav`).
//!
//! The directory is looked up, in order:
//! 1. `directory` in the extension's configuration table
//! 2. `templates/` in the extension's directory of the application tree
//!    (where provisioning copies the shipped defaults)
//! 3. `templates/` in the declared data directory

use anyhow::Context as _;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::Tera;
use tracing::debug;
use trellis_core::{make_extension, ExtensionDescriptor, InitContext, RenderError, Renderer};
use walkdir::WalkDir;

pub const TEMPLATE_DIR: &str = "templates";
pub const TEMPLATE_EXTENSION: &str = "html";

// ============================================================================
// State Types
// ============================================================================

/// The loaded template set; cheap to clone into request snapshots
#[derive(Debug, Clone)]
pub struct Templates {
    tera: Arc<Tera>,
    source: Option<PathBuf>,
}

impl Templates {
    /// Load every template below `dir`
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        anyhow::ensure!(dir.is_dir(), "Template directory {} does not exist", dir.display());

        let mut tera = escaping();
        let mut loaded = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Failed to walk template directory {}", dir.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().map_or(true, |ext| ext != TEMPLATE_EXTENSION)
            {
                continue;
            }
            let name = template_name(dir, path)?;
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read template {}", path.display()))?;
            loaded.push((name, content));
        }

        tera.add_raw_templates(loaded)
            .with_context(|| format!("Failed to compile templates in {}", dir.display()))?;

        Ok(Self {
            tera: Arc::new(tera),
            source: Some(dir.to_path_buf()),
        })
    }

    /// Build from in-memory `(name, source)` pairs
    pub fn from_raw<I, N, S>(templates: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let mut tera = escaping();
        tera.add_raw_templates(templates)
            .context("Failed to compile templates")?;
        Ok(Self {
            tera: Arc::new(tera),
            source: None,
        })
    }

    /// Template names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tera.get_template_names().collect();
        names.sort_unstable();
        names
    }

    /// Directory the templates were loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }
}

impl Renderer for Templates {
    fn render(&self, template: &str, vars: &serde_json::Value) -> Result<String, RenderError> {
        if !self.has_template(template) {
            return Err(RenderError::NotFound(template.to_string()));
        }

        let context = if vars.is_null() {
            tera::Context::new()
        } else {
            tera::Context::from_serialize(vars).map_err(|e| failed(template, &e))?
        };

        self.tera
            .render(template, &context)
            .map_err(|e| failed(template, &e))
    }

    fn has_template(&self, template: &str) -> bool {
        self.tera.get_template_names().any(|name| name == template)
    }
}

/// Template names carry no suffix, so escape everything
fn escaping() -> Tera {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![""]);
    tera
}

/// Tera hides the useful part of an error in its source chain
fn failed(template: &str, error: &tera::Error) -> RenderError {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }
    RenderError::Failed {
        template: template.to_string(),
        message,
    }
}

fn template_name(root: &Path, path: &Path) -> anyhow::Result<String> {
    let relative = path
        .strip_prefix(root)
        .with_context(|| format!("{} is outside {}", path.display(), root.display()))?
        .with_extension("");
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(segments.join("/"))
}

#[derive(Debug, Default, Deserialize)]
struct TemplateSettings {
    #[serde(default)]
    directory: Option<PathBuf>,
}

// ============================================================================
// Extension Registration
// ============================================================================

/// Directory of default assets shipped with this crate
pub fn resources_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/resources"))
}

pub fn templates_extension<B: 'static>() -> ExtensionDescriptor<B, Templates> {
    make_extension(
        "templates",
        "Renders HTML templates with Tera",
        Some(resources_dir()),
        |ctx: &mut InitContext<B, Templates>| {
            let dir = template_dir(ctx)?;
            let templates = Templates::load(&dir)?;
            debug!(
                extension = %ctx.extension_path(),
                dir = %dir.display(),
                count = templates.names().len(),
                "templates.init"
            );
            Ok(templates)
        },
    )
}

fn template_dir<B: 'static>(ctx: &InitContext<B, Templates>) -> anyhow::Result<PathBuf> {
    let settings: TemplateSettings = ctx.config_as()?.unwrap_or_default();
    if let Some(dir) = settings.directory {
        return Ok(dir);
    }

    let installed = ctx.file_path().join(TEMPLATE_DIR);
    if installed.is_dir() {
        return Ok(installed);
    }
    match ctx.data_dir().map(|dir| dir.join(TEMPLATE_DIR)) {
        Some(shipped) if shipped.is_dir() => Ok(shipped),
        _ => anyhow::bail!(
            "No template directory for {}: {} does not exist",
            ctx.extension_path(),
            installed.display()
        ),
    }
}
