//! Error types for extension composition and request handling

use crate::route::Response;

// ============================================================================
// Composition Errors with Structured Codes
// ============================================================================

/// Error codes for composition failures (9000-9007)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompositionErrorCode {
    /// Two sibling extensions resolve to the same effective name
    NameCollision = 9000,
    /// Two sibling mounts request the same non-empty prefix
    PrefixCollision = 9001,
    /// Two flattened routes share an identical path
    RouteCollision = 9002,
    /// An initializer or post-init hook failed
    InitializerFailure = 9003,
    /// A handle was projected against an unpopulated slot
    MissingHandleTarget = 9004,
    /// Extension name is empty or contains a path separator
    InvalidName = 9005,
    /// Materialising an extension's data directory failed
    Provisioning = 9006,
    /// An extension's configuration table could not be deserialized
    Config = 9007,
}

/// Fatal errors raised while assembling the application tree
#[derive(Debug, thiserror::Error)]
pub enum CompositionError {
    #[error("[{code}] Extension '{name}' is already mounted under '{parent}'")]
    NameCollision {
        code: u32,
        parent: String,
        name: String,
    },

    #[error("[{code}] Prefix '{prefix}' is already mounted under '{parent}'")]
    PrefixCollision {
        code: u32,
        parent: String,
        prefix: String,
    },

    #[error("[{code}] Route '{path}' is registered more than once")]
    RouteCollision { code: u32, path: String },

    #[error("[{code}] Initialization failed for extension '{extension}': {source}")]
    InitializerFailure {
        code: u32,
        extension: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("[{code}] Handle '{handle}' does not point at a populated state slot")]
    MissingHandleTarget { code: u32, handle: String },

    #[error("[{code}] Invalid extension name '{name}'")]
    InvalidName { code: u32, name: String },

    #[error("[{code}] Provisioning data directory for '{extension}' failed: {source}")]
    Provisioning {
        code: u32,
        extension: String,
        #[source]
        source: std::io::Error,
    },

    #[error("[{code}] Invalid configuration for extension '{extension}': {message}")]
    Config {
        code: u32,
        extension: String,
        message: String,
    },
}

impl CompositionError {
    pub fn name_collision(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NameCollision {
            code: CompositionErrorCode::NameCollision as u32,
            parent: parent.into(),
            name: name.into(),
        }
    }

    pub fn prefix_collision(parent: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::PrefixCollision {
            code: CompositionErrorCode::PrefixCollision as u32,
            parent: parent.into(),
            prefix: prefix.into(),
        }
    }

    pub fn route_collision(path: impl Into<String>) -> Self {
        Self::RouteCollision {
            code: CompositionErrorCode::RouteCollision as u32,
            path: path.into(),
        }
    }

    pub fn missing_handle_target(handle: impl Into<String>) -> Self {
        Self::MissingHandleTarget {
            code: CompositionErrorCode::MissingHandleTarget as u32,
            handle: handle.into(),
        }
    }

    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName {
            code: CompositionErrorCode::InvalidName as u32,
            name: name.into(),
        }
    }

    pub fn provisioning(extension: impl Into<String>, source: std::io::Error) -> Self {
        Self::Provisioning {
            code: CompositionErrorCode::Provisioning as u32,
            extension: extension.into(),
            source,
        }
    }

    pub fn config(extension: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            code: CompositionErrorCode::Config as u32,
            extension: extension.into(),
            message: message.into(),
        }
    }

    /// Wrap an error raised by an extension's initializer.
    ///
    /// Composition errors coming out of nested mounts keep their identity so
    /// the innermost failure reaches the entry point unchanged.
    pub fn initializer_failure(extension: impl Into<String>, error: anyhow::Error) -> Self {
        match error.downcast::<CompositionError>() {
            Ok(nested) => nested,
            Err(error) => Self::InitializerFailure {
                code: CompositionErrorCode::InitializerFailure as u32,
                extension: extension.into(),
                source: error.into(),
            },
        }
    }

    /// Structured error code for this failure
    pub fn code(&self) -> u32 {
        match self {
            Self::NameCollision { code, .. }
            | Self::PrefixCollision { code, .. }
            | Self::RouteCollision { code, .. }
            | Self::InitializerFailure { code, .. }
            | Self::MissingHandleTarget { code, .. }
            | Self::InvalidName { code, .. }
            | Self::Provisioning { code, .. }
            | Self::Config { code, .. } => *code,
        }
    }
}

// ============================================================================
// Request-Time Errors
// ============================================================================

/// Errors a handler can return while serving one request
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler declined the request; dispatch falls through
    #[error("request passed")]
    Pass,

    #[error("no route for '{path}'")]
    NotFound { path: String },

    #[error(transparent)]
    State(#[from] CompositionError),

    #[error("render failed: {0}")]
    Render(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// HTTP-style status code a dispatcher should answer with
    pub fn status(&self) -> u16 {
        match self {
            Self::Pass | Self::NotFound { .. } => 404,
            Self::State(_) | Self::Render(_) | Self::Failed(_) => 500,
        }
    }

    pub fn into_response(self) -> Response {
        Response::with_status(self.status(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CompositionError::name_collision("app", "foo");
        assert_eq!(err.code(), CompositionErrorCode::NameCollision as u32);
        assert!(err.to_string().contains("9000"));
        assert!(err.to_string().contains("foo"));

        let err = CompositionError::route_collision("/name");
        assert_eq!(err.code(), 9002);
        assert!(err.to_string().contains("/name"));
    }

    #[test]
    fn test_nested_composition_error_is_preserved() {
        let nested = CompositionError::prefix_collision("app/foo", "api");
        let err = CompositionError::initializer_failure("app", anyhow::Error::new(nested));
        match err {
            CompositionError::PrefixCollision { parent, prefix, .. } => {
                assert_eq!(parent, "app/foo");
                assert_eq!(prefix, "api");
            }
            other => panic!("Wrong error type: {other}"),
        }
    }

    #[test]
    fn test_foreign_error_becomes_initializer_failure() {
        let err = CompositionError::initializer_failure("app/db", anyhow::anyhow!("no socket"));
        match &err {
            CompositionError::InitializerFailure { extension, source, .. } => {
                assert_eq!(extension, "app/db");
                assert_eq!(source.to_string(), "no socket");
            }
            other => panic!("Wrong error type: {other}"),
        }
        assert_eq!(err.code(), CompositionErrorCode::InitializerFailure as u32);
    }

    #[test]
    fn test_handler_error_status() {
        assert_eq!(HandlerError::Pass.status(), 404);
        assert_eq!(HandlerError::failed("boom").status(), 500);
        let response = HandlerError::NotFound {
            path: "/x".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), 404);
        assert!(response.body().contains("/x"));
    }
}
