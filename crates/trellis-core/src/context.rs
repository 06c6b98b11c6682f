//! Initializer context - the builder extensions see while the tree is assembled
//!
//! This module provides:
//! - `InitContext`: per-mount builder collecting routes, wrappers, hooks
//! - `InitContext::mount`: the recursive composition step
//! - `ExtensionInfo`: summary of every mounted extension
//!
//! One context exists per mount, including the root. A child context starts
//! from its parent's prefix stack and root handle; everything it collects is
//! merged back into the parent when its initializer returns.

use crate::app::CompositionOptions;
use crate::descriptor::ExtensionDescriptor;
use crate::error::CompositionError;
use crate::handle::Handle;
use crate::provision::DataDirEntry;
use crate::request::RequestContext;
use crate::route::{
    join_path, normalize_segment, Handler, HandlerResult, Request, Route, RouteEntry, Wrapper,
};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Collected Items
// ============================================================================

/// Summary of one mounted extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionInfo {
    /// Slash-joined extension path (e.g. `app/foo`)
    pub path: String,
    pub description: String,
    /// Route prefix every route of this extension starts with
    pub route_prefix: String,
}

pub(crate) struct PostInitHook<B> {
    pub(crate) extension: String,
    pub(crate) run: Box<dyn FnOnce(&mut B) -> anyhow::Result<()>>,
}

pub(crate) struct UnloadAction {
    pub(crate) extension: String,
    pub(crate) run: Box<dyn FnOnce() -> anyhow::Result<()> + Send>,
}

/// Everything a finished context hands back to its parent
pub(crate) struct Collected<B> {
    pub(crate) routes: Vec<Route<B>>,
    pub(crate) wrappers: Vec<Wrapper<B>>,
    pub(crate) hooks: Vec<PostInitHook<B>>,
    pub(crate) unload: Vec<UnloadAction>,
    pub(crate) data_dirs: Vec<DataDirEntry>,
    pub(crate) extensions: Vec<ExtensionInfo>,
}

impl<B> Collected<B> {
    /// Apply this level's wrappers to every route of the subtree.
    ///
    /// Wrappers registered later wrap the ones registered earlier.
    fn wrap_subtree(&mut self) {
        let wrappers = std::mem::take(&mut self.wrappers);
        self.routes = std::mem::take(&mut self.routes)
            .into_iter()
            .map(|route| wrappers.iter().fold(route, |route, w| route.wrap(w)))
            .collect();
    }
}

// ============================================================================
// InitContext
// ============================================================================

/// Builder for one extension during application assembly.
///
/// `B` is the application root state, `V` the state of the extension being
/// initialized.
pub struct InitContext<B, V> {
    name: String,
    description: String,
    path: Vec<String>,
    prefix: Vec<String>,
    data_dir: Option<PathBuf>,
    file_path: PathBuf,
    handle: Handle<B, V>,
    options: Arc<CompositionOptions>,
    collected: Collected<B>,
    child_names: HashSet<String>,
    child_prefixes: HashSet<String>,
}

impl<B: 'static> InitContext<B, B> {
    pub(crate) fn root(
        name: &str,
        description: &str,
        data_dir: Option<&Path>,
        options: Arc<CompositionOptions>,
    ) -> Self {
        let mut ctx = Self {
            name: name.to_string(),
            description: description.to_string(),
            path: vec![name.to_string()],
            prefix: Vec::new(),
            data_dir: data_dir.map(Path::to_path_buf),
            file_path: options.root_dir.clone(),
            handle: Handle::identity(),
            options,
            collected: Collected {
                routes: Vec::new(),
                wrappers: Vec::new(),
                hooks: Vec::new(),
                unload: Vec::new(),
                data_dirs: Vec::new(),
                extensions: Vec::new(),
            },
            child_names: HashSet::new(),
            child_prefixes: HashSet::new(),
        };
        ctx.record_info();
        ctx
    }
}

impl<B: 'static, V: 'static> InitContext<B, V> {
    // ------------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------------

    /// Effective name of the extension being initialized
    pub fn extension_name(&self) -> &str {
        &self.name
    }

    /// Slash-joined names from the root down to this extension
    pub fn extension_path(&self) -> String {
        self.path.join("/")
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Path every route registered here is prefixed with (`/` at the top level)
    pub fn route_prefix(&self) -> String {
        join_path(&self.prefix, "")
    }

    /// Directory of default assets the descriptor declared, if any
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// This extension's directory inside the application tree
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Handle from the application root down to this extension
    pub fn handle(&self) -> &Handle<B, V> {
        &self.handle
    }

    /// This extension's table from the host configuration
    pub fn config(&self) -> Option<&toml::Table> {
        self.options.config.get(&self.extension_path())
    }

    /// Deserialize this extension's configuration table
    pub fn config_as<T: DeserializeOwned>(&self) -> Result<Option<T>, CompositionError> {
        let Some(table) = self.config() else {
            return Ok(None);
        };
        toml::Value::Table(table.clone())
            .try_into()
            .map(Some)
            .map_err(|e: toml::de::Error| {
                CompositionError::config(self.extension_path(), e.to_string())
            })
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register routes; order among them is preserved
    pub fn add_routes<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = RouteEntry<B, V>>,
    {
        for entry in entries {
            self.register(entry);
        }
    }

    pub fn add_route<F>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&mut RequestContext<'_, B, V>) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(RouteEntry::new(pattern, handler));
    }

    /// Wrap every handler registered at or below this level.
    ///
    /// At the root the transform wraps the whole dispatch instead, so it
    /// also sees requests that match no route.
    pub fn wrap_handlers<F>(&mut self, transform: F)
    where
        F: Fn(Handler<B>) -> Handler<B> + Send + Sync + 'static,
    {
        self.collected.wrappers.push(Arc::new(transform));
    }

    /// Run a one-shot side effect during initialization and hand back its result
    pub fn lift_external<T>(
        &mut self,
        action: impl FnOnce() -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        tracing::debug!(extension = %self.extension_path(), "running external action");
        action()
    }

    /// Run `hook` against this extension's final state once the whole tree is built
    pub fn add_post_init_hook<F>(&mut self, hook: F)
    where
        F: FnOnce(&mut V) -> anyhow::Result<()> + 'static,
    {
        let handle = self.handle.clone();
        self.collected.hooks.push(PostInitHook {
            extension: self.extension_path(),
            run: Box::new(move |root: &mut B| {
                let view = handle.project_mut(root)?;
                hook(view)
            }),
        });
    }

    /// Register a cleanup action for application shutdown
    pub fn on_unload<F>(&mut self, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.collected.unload.push(UnloadAction {
            extension: self.extension_path(),
            run: Box::new(action),
        });
    }

    // ------------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------------

    /// Mount a nested extension under `prefix`.
    ///
    /// Runs the descriptor's initializer in a child context, merges the
    /// child's routes (prefixed and wrapped) into this context, and returns
    /// the produced state for the caller to store where `handle` points.
    pub fn mount<E: 'static>(
        &mut self,
        prefix: &str,
        handle: Handle<V, E>,
        descriptor: ExtensionDescriptor<B, E>,
    ) -> Result<E, CompositionError> {
        descriptor.validate()?;

        let name = descriptor.name().to_string();
        let segment = normalize_segment(prefix);
        if self.child_names.contains(&name) {
            return Err(CompositionError::name_collision(self.extension_path(), name));
        }
        if !segment.is_empty() && self.child_prefixes.contains(&segment) {
            return Err(CompositionError::prefix_collision(
                self.extension_path(),
                segment,
            ));
        }
        self.child_names.insert(name.clone());
        if !segment.is_empty() {
            self.child_prefixes.insert(segment.clone());
        }

        let mut child = self.child(&descriptor, &segment, &handle);
        let span = tracing::debug_span!(
            "mount",
            extension = %child.extension_path(),
            prefix = %child.route_prefix()
        );
        let _entered = span.enter();

        child.provision()?;
        let initializer = descriptor.into_initializer();
        let state = match initializer(&mut child) {
            Ok(state) => state,
            Err(e) => {
                // Cleanup registered below a failed mount still runs on abort
                self.collected.unload.append(&mut child.collected.unload);
                return Err(CompositionError::initializer_failure(
                    child.extension_path(),
                    e,
                ));
            }
        };

        let mut collected = child.collected;
        collected.wrap_subtree();
        tracing::debug!(routes = collected.routes.len(), "extension mounted");
        self.absorb(collected);

        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn child<E: 'static>(
        &self,
        descriptor: &ExtensionDescriptor<B, E>,
        segment: &str,
        handle: &Handle<V, E>,
    ) -> InitContext<B, E> {
        let name = descriptor.name().to_string();

        let mut path = self.path.clone();
        path.push(name.clone());
        let mut prefix = self.prefix.clone();
        if !segment.is_empty() {
            prefix.push(segment.to_string());
        }

        let mut ctx = InitContext {
            file_path: self.file_path.join("extensions").join(&name),
            name,
            description: descriptor.description().to_string(),
            path,
            prefix,
            data_dir: descriptor.data_dir().map(Path::to_path_buf),
            handle: self.handle.then(handle),
            options: self.options.clone(),
            collected: Collected {
                routes: Vec::new(),
                wrappers: Vec::new(),
                hooks: Vec::new(),
                unload: Vec::new(),
                data_dirs: Vec::new(),
                extensions: Vec::new(),
            },
            child_names: HashSet::new(),
            child_prefixes: HashSet::new(),
        };
        ctx.record_info();
        ctx
    }

    fn record_info(&mut self) {
        let info = ExtensionInfo {
            path: self.extension_path(),
            description: self.description.clone(),
            route_prefix: self.route_prefix(),
        };
        self.collected.extensions.push(info);
    }

    /// Hand the declared data directory to the provisioner, if one is configured
    pub(crate) fn provision(&mut self) -> Result<(), CompositionError> {
        let Some(declared) = self.data_dir.clone() else {
            return Ok(());
        };
        let entry = DataDirEntry {
            extension: self.extension_path(),
            declared,
            target: self.file_path.clone(),
        };

        if let Some(provisioner) = &self.options.provisioner {
            let written = provisioner
                .provision(&entry)
                .map_err(|e| CompositionError::provisioning(&entry.extension, e))?;
            if written {
                tracing::info!(
                    "Provisioned data for {} at {}",
                    entry.extension,
                    entry.target.display()
                );
            }
        }

        self.collected.data_dirs.push(entry);
        Ok(())
    }

    fn register(&mut self, entry: RouteEntry<B, V>) {
        let (pattern, typed) = entry.into_parts();
        let path = join_path(&self.prefix, &pattern);
        let owner = self.extension_path();

        let handle = self.handle.clone();
        let extension = owner.clone();
        let handler = Handler::new(move |state: &mut B, request: &Request| {
            let mut ctx = RequestContext::new(state, &handle, request, &extension);
            typed(&mut ctx)
        });

        tracing::debug!(path = %path, owner = %owner, "route registered");
        self.collected.routes.push(Route::new(path, owner, handler));
    }

    fn absorb(&mut self, child: Collected<B>) {
        self.collected.routes.extend(child.routes);
        self.collected.hooks.extend(child.hooks);
        self.collected.unload.extend(child.unload);
        self.collected.data_dirs.extend(child.data_dirs);
        self.collected.extensions.extend(child.extensions);
    }

    pub(crate) fn into_collected(self) -> Collected<B> {
        self.collected
    }
}
