//! In-memory reference dispatcher
//!
//! Stands in for the external HTTP dispatcher: registers a flattened route
//! table (rejecting duplicate paths), and serves each request against a
//! fresh clone of the application state.
//!
//! Dispatch order:
//! 1. exact match in the route table
//! 2. if nothing matched, or the matched handler passed, the fallback
//!    (`NotFound`)
//!
//! The site wrapper (root-level `wrap_handlers` chain) wraps both steps, so
//! a site wrapper can act as a lower-priority catch-all by intercepting the
//! fallback's `NotFound`.

use crate::error::{CompositionError, HandlerError};
use crate::route::{Handler, Request, Response, Route, RouteTable};
use std::collections::HashMap;
use std::sync::Arc;

pub struct Dispatcher<B> {
    template: B,
    paths: Vec<String>,
    entry: Handler<B>,
}

impl<B: Clone + 'static> Dispatcher<B> {
    /// Register `table`; fails with `RouteCollision` on duplicate paths
    pub fn new(state: B, table: RouteTable<B>) -> Result<Self, CompositionError> {
        let (routes, site_wrapper) = table.into_parts();

        let mut by_path: HashMap<String, Route<B>> = HashMap::with_capacity(routes.len());
        let mut paths = Vec::with_capacity(routes.len());
        for route in routes {
            if by_path.contains_key(route.path()) {
                return Err(CompositionError::route_collision(route.path()));
            }
            paths.push(route.path().to_string());
            by_path.insert(route.path().to_string(), route);
        }

        let by_path = Arc::new(by_path);
        let base = Handler::new(move |state: &mut B, request: &Request| {
            if let Some(route) = by_path.get(request.path()) {
                match route.handler().call(state, request) {
                    Err(HandlerError::Pass) => {
                        tracing::debug!("{} passed on {}", route.owner(), request.path());
                    }
                    other => return other,
                }
            }
            Err(HandlerError::NotFound {
                path: request.path().to_string(),
            })
        });

        let entry = match site_wrapper {
            Some(wrapper) => wrapper(base),
            None => base,
        };

        tracing::debug!("Dispatcher registered {} routes", paths.len());
        Ok(Self {
            template: state,
            paths,
            entry,
        })
    }

    /// Serve one request against a fresh snapshot of the application state
    pub fn dispatch(&self, request: &Request) -> Response {
        let mut snapshot = self.template.clone();
        let response = match self.entry.call(&mut snapshot, request) {
            Ok(response) => response,
            Err(e) => {
                if e.status() >= 500 {
                    tracing::warn!("Request {} failed: {}", request.path(), e);
                }
                e.into_response()
            }
        };
        tracing::debug!(path = %request.path(), status = response.status(), "dispatched");
        response
    }

    /// The state template snapshots are cloned from
    pub fn state(&self) -> &B {
        &self.template
    }

    /// Registered paths in registration order
    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}
