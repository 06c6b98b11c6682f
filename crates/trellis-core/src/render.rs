//! Renderer capability
//!
//! One extension in the tree may be the designated renderer. The root state
//! type names it through [`HasRenderer`], fixed when the application is
//! assembled, so any handler can render without knowing which extension
//! does the work.

use crate::handle::Handle;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    NotFound(String),

    #[error("rendering '{template}' failed: {message}")]
    Failed { template: String, message: String },
}

/// A rendering collaborator
pub trait Renderer {
    fn render(&self, template: &str, vars: &serde_json::Value) -> Result<String, RenderError>;

    fn has_template(&self, template: &str) -> bool;
}

/// Implemented by application state types that carry a renderer extension
pub trait HasRenderer: Sized + 'static {
    type Renderer: Renderer + 'static;

    fn renderer() -> Handle<Self, Self::Renderer>;
}
