//! Application assembly entry point
//!
//! [`build_application`] runs the root initializer (and, through `mount`,
//! every nested initializer) once, then runs post-init hooks and returns the
//! assembled state with its flattened route table. Any failure aborts the
//! whole composition; no partial application is ever returned, and the
//! unload actions of every extension initialized so far are run.

use crate::context::{ExtensionInfo, InitContext, UnloadAction};
use crate::descriptor::ExtensionDescriptor;
use crate::dispatch::Dispatcher;
use crate::error::CompositionError;
use crate::provision::{DataDirEntry, Provisioner};
use crate::route::{Handler, RouteTable, Wrapper};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Options
// ============================================================================

/// Inputs the host supplies to composition
#[derive(Clone, Default)]
pub struct CompositionOptions {
    /// Root of the application's directory tree
    pub root_dir: PathBuf,
    /// Per-extension configuration tables, keyed by extension path
    pub config: HashMap<String, toml::Table>,
    /// Collaborator that materialises declared data directories
    pub provisioner: Option<Arc<dyn Provisioner>>,
}

impl std::fmt::Debug for CompositionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionOptions")
            .field("root_dir", &self.root_dir)
            .field("config", &self.config.keys().collect::<Vec<_>>())
            .field("provisioner", &self.provisioner.is_some())
            .finish()
    }
}

impl CompositionOptions {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, extension: impl Into<String>, table: toml::Table) -> Self {
        self.config.insert(extension.into(), table);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }
}

// ============================================================================
// Application
// ============================================================================

/// Cleanup actions registered with `on_unload`, run in reverse order
pub struct Unloader {
    actions: Vec<UnloadAction>,
}

impl Unloader {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Run every action, newest first; returns how many failed
    pub fn run(self) -> usize {
        let mut failed = 0;
        for action in self.actions.into_iter().rev() {
            tracing::debug!("Unloading {}", action.extension);
            if let Err(e) = (action.run)() {
                tracing::warn!("Unload action for {} failed: {:#}", action.extension, e);
                failed += 1;
            }
        }
        failed
    }
}

/// A fully assembled application
pub struct Application<B> {
    name: String,
    state: B,
    routes: RouteTable<B>,
    data_dirs: Vec<DataDirEntry>,
    extensions: Vec<ExtensionInfo>,
    unloader: Unloader,
}

impl<B> Application<B> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The state template every request snapshot is cloned from
    pub fn state(&self) -> &B {
        &self.state
    }

    pub fn routes(&self) -> &RouteTable<B> {
        &self.routes
    }

    /// Declared data directories, in mount order
    pub fn data_dirs(&self) -> &[DataDirEntry] {
        &self.data_dirs
    }

    /// Every mounted extension, root first, depth-first
    pub fn extensions(&self) -> &[ExtensionInfo] {
        &self.extensions
    }

    pub fn into_parts(self) -> (B, RouteTable<B>, Unloader) {
        (self.state, self.routes, self.unloader)
    }

    /// Run unload actions and drop the application
    pub fn shutdown(self) -> usize {
        self.unloader.run()
    }
}

impl<B: Clone + 'static> Application<B> {
    /// Register the route table with the in-memory dispatcher
    pub fn into_dispatcher(self) -> Result<(Dispatcher<B>, Unloader), CompositionError> {
        let (state, routes, unloader) = self.into_parts();
        Ok((Dispatcher::new(state, routes)?, unloader))
    }
}

/// Run the cleanup of everything initialized before composition failed
fn abort(actions: Vec<UnloadAction>) {
    if actions.is_empty() {
        return;
    }
    tracing::debug!("Composition failed, running {} unload actions", actions.len());
    let failed = Unloader { actions }.run();
    if failed > 0 {
        tracing::warn!("{} unload actions failed during abort", failed);
    }
}

/// Assemble the application tree rooted at `descriptor`
pub fn build_application<B: 'static>(
    options: CompositionOptions,
    descriptor: ExtensionDescriptor<B, B>,
) -> Result<Application<B>, CompositionError> {
    descriptor.validate()?;

    let name = descriptor.name().to_string();
    let span = tracing::info_span!("compose", app = %name);
    let _entered = span.enter();

    let mut root = InitContext::root(
        descriptor.name(),
        descriptor.description(),
        descriptor.data_dir(),
        Arc::new(options),
    );
    root.provision()?;

    let initializer = descriptor.into_initializer();
    let result = initializer(&mut root);
    let path = root.extension_path();
    let mut collected = root.into_collected();
    let mut state = match result {
        Ok(state) => state,
        Err(e) => {
            abort(collected.unload);
            return Err(CompositionError::initializer_failure(path, e));
        }
    };

    for hook in std::mem::take(&mut collected.hooks) {
        tracing::debug!("Running post-init hook for {}", hook.extension);
        if let Err(e) = (hook.run)(&mut state) {
            abort(collected.unload);
            return Err(CompositionError::initializer_failure(&hook.extension, e));
        }
    }

    let site_wrapper: Option<Wrapper<B>> = if collected.wrappers.is_empty() {
        None
    } else {
        let wrappers = collected.wrappers;
        Some(Arc::new(move |handler: Handler<B>| -> Handler<B> {
            wrappers.iter().fold(handler, |handler, w| w(handler))
        }))
    };

    tracing::info!(
        "Application '{}' assembled: {} extensions, {} routes",
        name,
        collected.extensions.len(),
        collected.routes.len()
    );

    Ok(Application {
        name,
        state,
        routes: RouteTable::new(collected.routes, site_wrapper),
        data_dirs: collected.data_dirs,
        extensions: collected.extensions,
        unloader: Unloader {
            actions: collected.unload,
        },
    })
}
