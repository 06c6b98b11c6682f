//! Extension descriptors - metadata plus initializer for one extension
//!
//! A descriptor is built once at startup and consumed by exactly one
//! `mount`. The type parameters are the application root state `B` and the
//! state `E` the initializer produces.

use crate::context::InitContext;
use crate::error::CompositionError;
use std::fmt;
use std::path::{Path, PathBuf};

pub type Initializer<B, E> = Box<dyn FnOnce(&mut InitContext<B, E>) -> anyhow::Result<E>>;

pub struct ExtensionDescriptor<B, E> {
    name: String,
    description: String,
    data_dir: Option<PathBuf>,
    initializer: Initializer<B, E>,
}

impl<B, E> fmt::Debug for ExtensionDescriptor<B, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

impl<B, E> ExtensionDescriptor<B, E> {
    /// Create a descriptor with no data directory
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, initializer: F) -> Self
    where
        F: FnOnce(&mut InitContext<B, E>) -> anyhow::Result<E> + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            data_dir: None,
            initializer: Box::new(initializer),
        }
    }

    /// Declare the directory holding this extension's default assets
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Override the effective name, e.g. to mount a second instance
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Check the effective name can be used as a path segment
    pub fn validate(&self) -> Result<(), CompositionError> {
        if matches!(self.name.as_str(), "" | "." | "..") || self.name.contains(['/', '\\']) {
            return Err(CompositionError::invalid_name(&self.name));
        }
        Ok(())
    }

    pub(crate) fn into_initializer(self) -> Initializer<B, E> {
        self.initializer
    }
}

/// Create a descriptor from its default name, description, optional data
/// directory and initializer
pub fn make_extension<B, E, F>(
    default_name: impl Into<String>,
    description: impl Into<String>,
    data_dir: Option<PathBuf>,
    initializer: F,
) -> ExtensionDescriptor<B, E>
where
    F: FnOnce(&mut InitContext<B, E>) -> anyhow::Result<E> + 'static,
{
    let descriptor = ExtensionDescriptor::new(default_name, description, initializer);
    match data_dir {
        Some(dir) => descriptor.with_data_dir(dir),
        None => descriptor,
    }
}

/// Return `descriptor` with its effective name overridden
pub fn name_extension<B, E>(
    descriptor: ExtensionDescriptor<B, E>,
    name: impl Into<String>,
) -> ExtensionDescriptor<B, E> {
    descriptor.named(name)
}
