//! Trellis: composition of named, hierarchical, stateful extensions
//!
//! An application is a tree of extensions. Each extension bundles its own
//! state, routes, handler wrappers, post-init hooks and unload actions, and
//! may mount further extensions beneath itself. [`build_application`] runs
//! the tree's initializers once at startup and produces the root state plus
//! a flat route table; a [`Dispatcher`] then serves every request against a
//! fresh snapshot of that state.
//!
//! # Architecture
//!
//! - `handle`: accessor pairs locating one extension's state inside its parent
//! - `descriptor`: name, description, data directory and initializer
//! - `context`: the init-time builder and the recursive `mount`
//! - `app`: `build_application`, options and the unloader
//! - `request`: the request-scoped state accessor handlers see
//! - `dispatch`: the in-memory reference dispatcher
//! - `render`, `shared`, `provision`: renderer capability, cross-request
//!   cells, data directory seam
//!
//! # Usage
//!
//! ```rust,ignore
//! use trellis_core::{build_application, handle, CompositionOptions, ExtensionDescriptor};
//!
//! let app = build_application(
//!     CompositionOptions::new("./app"),
//!     ExtensionDescriptor::new("app", "Demo", |ctx| {
//!         let foo = ctx.mount("foo", handle!(App, foo), greeting_extension(None))?;
//!         Ok(App { foo })
//!     }),
//! )?;
//! let (dispatcher, unloader) = app.into_dispatcher()?;
//! ```

pub mod app;
pub mod context;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod provision;
pub mod render;
pub mod request;
pub mod route;
pub mod shared;


// Re-export commonly used types
pub use app::{build_application, Application, CompositionOptions, Unloader};
pub use context::{ExtensionInfo, InitContext};
pub use descriptor::{make_extension, name_extension, ExtensionDescriptor, Initializer};
pub use dispatch::Dispatcher;
pub use error::{CompositionError, CompositionErrorCode, HandlerError};
pub use handle::Handle;
pub use provision::{DataDirEntry, Provisioner};
pub use render::{HasRenderer, RenderError, Renderer};
pub use request::RequestContext;
pub use route::{route, Handler, HandlerResult, Request, Response, Route, RouteEntry, RouteTable, Wrapper};
pub use shared::SharedCell;
