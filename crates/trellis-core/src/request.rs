//! Request-scoped state access
//!
//! A [`RequestContext`] is what a route handler sees: the request, and a
//! read/modify/write view of the per-request snapshot restricted to the
//! extension the route was registered under. The restriction is the handle
//! recorded with the route at composition time; reaching any other
//! extension requires a handle passed in explicitly (see
//! [`RequestContext::with_top`]).

use crate::error::HandlerError;
use crate::handle::Handle;
use crate::render::{HasRenderer, Renderer};
use crate::route::{HandlerResult, Request, Response};

/// Per-request view of one extension's slice of the application state
pub struct RequestContext<'r, B, V> {
    state: &'r mut B,
    handle: &'r Handle<B, V>,
    request: &'r Request,
    extension: &'r str,
}

impl<'r, B: 'static, V: 'static> RequestContext<'r, B, V> {
    pub(crate) fn new(
        state: &'r mut B,
        handle: &'r Handle<B, V>,
        request: &'r Request,
        extension: &'r str,
    ) -> Self {
        Self {
            state,
            handle,
            request,
            extension,
        }
    }

    pub fn request(&self) -> &Request {
        self.request
    }

    /// Slash-joined path of the extension this handler runs as
    pub fn extension(&self) -> &str {
        self.extension
    }

    /// Effective name of the extension this handler runs as
    pub fn extension_name(&self) -> &str {
        self.extension
            .rsplit('/')
            .next()
            .unwrap_or(self.extension)
    }

    pub fn get(&self) -> Result<&V, HandlerError> {
        Ok(self.handle.project(self.state)?)
    }

    pub fn get_mut(&mut self) -> Result<&mut V, HandlerError> {
        Ok(self.handle.project_mut(self.state)?)
    }

    pub fn put(&mut self, value: V) -> Result<(), HandlerError> {
        Ok(self.handle.set(self.state, value)?)
    }

    pub fn modify<R>(&mut self, f: impl FnOnce(&mut V) -> R) -> Result<R, HandlerError> {
        let view = self.get_mut()?;
        Ok(f(view))
    }

    /// Run `f` against the slice of state `handle` points at, within this
    /// request.
    ///
    /// `handle` is relative to the application root, as handed to the
    /// current extension's initializer at mount time. The scoped context
    /// still reports the calling extension from [`Self::extension`].
    pub fn with_top<E: 'static, R>(
        &mut self,
        handle: &Handle<B, E>,
        f: impl FnOnce(&mut RequestContext<'_, B, E>) -> R,
    ) -> R {
        let mut scoped = RequestContext {
            state: &mut *self.state,
            handle,
            request: self.request,
            extension: self.extension,
        };
        f(&mut scoped)
    }

    /// Decline the request so dispatch falls through to the fallback
    pub fn pass(&self) -> HandlerResult {
        Err(HandlerError::Pass)
    }
}

impl<'r, B: HasRenderer, V: 'static> RequestContext<'r, B, V> {
    /// Render `template` through the application's designated renderer
    pub fn render(&self, template: &str, vars: &serde_json::Value) -> HandlerResult {
        let handle = B::renderer();
        let renderer = handle.project(self.state)?;
        let body = renderer
            .render(template, vars)
            .map_err(|e| HandlerError::Render(e.to_string()))?;
        Ok(Response::html(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle;

    #[derive(Debug, Clone, Default)]
    struct Site {
        foo: Vec<String>,
        bar: u32,
    }

    #[test]
    fn test_view_is_restricted_to_extension() {
        let mut state = Site::default();
        let foo: Handle<Site, Vec<String>> = handle!(Site, foo);
        let request = Request::new("/foo/add");
        let mut ctx = RequestContext::new(&mut state, &foo, &request, "app/foo");

        ctx.modify(|items| items.push("one".to_string())).unwrap();
        assert_eq!(ctx.get().unwrap().len(), 1);
        assert_eq!(ctx.extension_name(), "foo");
        assert_eq!(ctx.request().path(), "/foo/add");

        ctx.put(vec![]).unwrap();
        assert!(state.foo.is_empty());
    }

    #[test]
    fn test_with_top_reaches_sibling() {
        let mut state = Site::default();
        let foo: Handle<Site, Vec<String>> = handle!(Site, foo);
        let bar: Handle<Site, u32> = handle!(Site, bar);
        let request = Request::new("/");
        let mut ctx = RequestContext::new(&mut state, &foo, &request, "app/foo");

        let seen = ctx.with_top(&bar, |sibling| {
            *sibling.get_mut().unwrap() += 5;
            assert_eq!(sibling.extension(), "app/foo");
            assert_eq!(sibling.extension_name(), "foo");
            *sibling.get().unwrap()
        });
        assert_eq!(seen, 5);
        assert_eq!(state.bar, 5);
    }

    #[test]
    fn test_pass() {
        let mut state = Site::default();
        let foo: Handle<Site, Vec<String>> = handle!(Site, foo);
        let request = Request::new("/");
        let ctx = RequestContext::new(&mut state, &foo, &request, "app/foo");
        assert!(matches!(ctx.pass(), Err(HandlerError::Pass)));
    }
}
