//! Route entries, handlers and the flattened route table
//!
//! Extensions register typed [`RouteEntry`] values against their own state.
//! On registration each entry is erased to a [`Route`] over the application
//! root state, tagged with its fully prefixed path and owning extension.

use crate::error::HandlerError;
use crate::request::RequestContext;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Request / Response
// ============================================================================

/// The parts of an incoming request the composition core cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    path: String,
    params: BTreeMap<String, String>,
    body: String,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: normalize_path(&path.into()),
            ..Default::default()
        }
    }

    /// Parse a request target such as `/greet?who=ada%20l&lang=en`.
    ///
    /// Query keys and values are percent-decoded, with `+` read as a space.
    pub fn parse(target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let params = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key), decode_component(value))
            })
            .collect();

        Self {
            path: normalize_path(path),
            params,
            body: String::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Response produced by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    content_type: String,
    body: String,
}

impl Response {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            content_type: "text/html; charset=utf-8".to_string(),
            ..Self::ok(body)
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: body.into(),
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

pub type HandlerResult = Result<Response, HandlerError>;

// ============================================================================
// Handlers
// ============================================================================

type ErasedFn<B> = dyn Fn(&mut B, &Request) -> HandlerResult + Send + Sync;

/// A handler over the whole application state `B`
pub struct Handler<B>(Arc<ErasedFn<B>>);

impl<B> Clone for Handler<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B> fmt::Debug for Handler<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

impl<B> Handler<B> {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut B, &Request) -> HandlerResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, state: &mut B, request: &Request) -> HandlerResult {
        (self.0)(state, request)
    }
}

/// Handler transformation registered with `wrap_handlers`
pub type Wrapper<B> = Arc<dyn Fn(Handler<B>) -> Handler<B> + Send + Sync>;

type TypedFn<B, V> = dyn Fn(&mut RequestContext<'_, B, V>) -> HandlerResult + Send + Sync;

/// A route as registered by an extension, typed against its own state `V`
pub struct RouteEntry<B, V> {
    pattern: String,
    handler: Arc<TypedFn<B, V>>,
}

impl<B, V> RouteEntry<B, V> {
    pub fn new<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut RequestContext<'_, B, V>) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            handler: Arc::new(handler),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub(crate) fn into_parts(self) -> (String, Arc<TypedFn<B, V>>) {
        (self.pattern, self.handler)
    }
}

/// Shorthand for [`RouteEntry::new`]
pub fn route<B, V, F>(pattern: impl Into<String>, handler: F) -> RouteEntry<B, V>
where
    F: Fn(&mut RequestContext<'_, B, V>) -> HandlerResult + Send + Sync + 'static,
{
    RouteEntry::new(pattern, handler)
}

// ============================================================================
// Flattened Routes
// ============================================================================

/// A flattened route: fully prefixed path, erased handler and owner
pub struct Route<B> {
    path: String,
    owner: String,
    handler: Handler<B>,
}

impl<B> Clone for Route<B> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            owner: self.owner.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<B> fmt::Debug for Route<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("owner", &self.owner)
            .finish()
    }
}

impl<B> Route<B> {
    pub(crate) fn new(path: String, owner: String, handler: Handler<B>) -> Self {
        Self {
            path,
            owner,
            handler,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Slash-joined path of the extension that registered this route
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn handler(&self) -> &Handler<B> {
        &self.handler
    }

    pub(crate) fn wrap(self, wrapper: &Wrapper<B>) -> Self {
        Self {
            handler: wrapper(self.handler),
            ..self
        }
    }
}

/// The flattened, immutable route table handed to a dispatcher
pub struct RouteTable<B> {
    routes: Vec<Route<B>>,
    site_wrapper: Option<Wrapper<B>>,
}

impl<B> fmt::Debug for RouteTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("site_wrapper", &self.site_wrapper.is_some())
            .finish()
    }
}

impl<B> RouteTable<B> {
    pub(crate) fn new(routes: Vec<Route<B>>, site_wrapper: Option<Wrapper<B>>) -> Self {
        Self {
            routes,
            site_wrapper,
        }
    }

    /// Routes in registration (depth-first) order
    pub fn routes(&self) -> &[Route<B>] {
        &self.routes
    }

    pub fn paths(&self) -> Vec<&str> {
        self.routes.iter().map(Route::path).collect()
    }

    pub fn get(&self, path: &str) -> Option<&Route<B>> {
        self.routes.iter().find(|r| r.path == path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// The composed root-level `wrap_handlers` chain, if any
    pub fn site_wrapper(&self) -> Option<&Wrapper<B>> {
        self.site_wrapper.as_ref()
    }

    pub fn into_parts(self) -> (Vec<Route<B>>, Option<Wrapper<B>>) {
        (self.routes, self.site_wrapper)
    }
}

// ============================================================================
// Path Helpers
// ============================================================================

/// Trim separators and drop empty segments: `"/api//v1/"` -> `"api/v1"`
pub(crate) fn normalize_segment(prefix: &str) -> String {
    prefix
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decode one query component; malformed UTF-8 is kept as written
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn normalize_path(path: &str) -> String {
    format!("/{}", normalize_segment(path))
}

/// Join mount prefixes (root first) and a route pattern into a full path
pub(crate) fn join_path(prefixes: &[String], pattern: &str) -> String {
    let mut segments: Vec<&str> = prefixes
        .iter()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .collect();
    segments.extend(pattern.split('/').filter(|s| !s.is_empty()));
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_join_path() {
        let prefixes = vec!["foo".to_string(), "api/v1".to_string()];
        assert_eq!(join_path(&prefixes, "/name"), "/foo/api/v1/name");
        assert_eq!(join_path(&prefixes, "name/"), "/foo/api/v1/name");
        assert_eq!(join_path(&prefixes, ""), "/foo/api/v1");
        assert_eq!(join_path(&[], "/hello"), "/hello");
        assert_eq!(join_path(&[], ""), "/");
    }

    fn segments() -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec("[a-z/]{0,6}", 0..5)
    }

    proptest! {
        #[test]
        fn prop_join_path_drops_empty_segments(prefixes in segments(), pattern in "[a-z/]{0,8}") {
            let joined = join_path(&prefixes, &pattern);
            prop_assert!(joined.starts_with('/'));
            prop_assert!(!joined.contains("//"));
            prop_assert!(joined == "/" || !joined.ends_with('/'));

            let expected: Vec<&str> = prefixes
                .iter()
                .flat_map(|p| p.split('/'))
                .chain(pattern.split('/'))
                .filter(|s| !s.is_empty())
                .collect();
            prop_assert_eq!(joined, format!("/{}", expected.join("/")));
        }

        /// Mounting under `a` then `b` routes the same as mounting under `a/b`
        #[test]
        fn prop_nested_prefixes_flatten(a in "[a-z/]{0,6}", b in "[a-z/]{0,6}", pattern in "[a-z/]{0,8}") {
            let nested = join_path(&[normalize_segment(&a), normalize_segment(&b)], &pattern);
            let flat = join_path(&[normalize_segment(&format!("{a}/{b}"))], &pattern);
            prop_assert_eq!(nested, flat);
        }
    }

    #[test]
    fn test_normalize_segment() {
        assert_eq!(normalize_segment("/api//v1/"), "api/v1");
        assert_eq!(normalize_segment(""), "");
        assert_eq!(normalize_segment("/"), "");
    }

    #[test]
    fn test_request_parse() {
        let request = Request::parse("greet/?who=ada&flag");
        assert_eq!(request.path(), "/greet");
        assert_eq!(request.param("who"), Some("ada"));
        assert_eq!(request.param("flag"), Some(""));
        assert_eq!(request.param("missing"), None);
    }

    #[test]
    fn test_request_parse_decodes_query() {
        let request = Request::parse("/greet?who=ada%20l&msg=a+b%2Bc&k%3D=v&bad=%ff");
        assert_eq!(request.param("who"), Some("ada l"));
        assert_eq!(request.param("msg"), Some("a b+c"));
        assert_eq!(request.param("k="), Some("v"));
        assert_eq!(request.param("bad"), Some("%ff"));
    }

    #[test]
    fn test_handler_call() {
        let handler: Handler<u32> = Handler::new(|state: &mut u32, request: &Request| {
            *state += 1;
            Ok(Response::ok(format!("{} {}", request.path(), state)))
        });
        let mut state = 1;
        let response = handler.call(&mut state, &Request::new("/count")).unwrap();
        assert_eq!(response.body(), "/count 2");
        assert_eq!(state, 2);
    }
}
