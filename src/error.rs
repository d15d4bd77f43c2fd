use crate::http::Method;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Route {path} does not exist")]
    RouteNotFound { path: String },

    #[error("Allowed request methods: {}", join_methods(.allowed))]
    MethodNotAllowed { path: String, allowed: Vec<Method> },

    #[error("Invalid route pattern `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("Route file {}: {message}", .path.display())]
    RouteFile { path: PathBuf, message: String },

    #[error("No handler registered under `{0}`")]
    UnknownHandler(String),

    #[error("No filter callback registered under `{0}`")]
    UnknownFilter(String),

    #[error("No before-all hook registered under `{0}`")]
    UnknownHook(String),

    #[error("Controller `{0}` is not registered")]
    UnknownController(String),

    #[error("Controller `{controller}` has no action `{action}`")]
    UnknownAction { controller: String, action: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Route cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServerError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::BadRequest(_) => 400,
            ServerError::Unauthorized(_) => 401,
            ServerError::Forbidden(_) => 403,
            ServerError::RouteNotFound { .. } => 404,
            ServerError::MethodNotAllowed { .. } => 405,
            ServerError::IoError(_)
            | ServerError::InvalidRoute { .. }
            | ServerError::RouteFile { .. }
            | ServerError::UnknownHandler(_)
            | ServerError::UnknownFilter(_)
            | ServerError::UnknownHook(_)
            | ServerError::UnknownController(_)
            | ServerError::UnknownAction { .. }
            | ServerError::Config(_)
            | ServerError::Cache(_)
            | ServerError::InternalError(_) => 500,
        }
    }

    /// Methods registered for the path when this is a 405, for the `Allow` header.
    pub fn allowed_methods(&self) -> Option<&[Method]> {
        match self {
            ServerError::MethodNotAllowed { allowed, .. } => Some(allowed),
            _ => None,
        }
    }

    /// For a controller's `call` fallback arm.
    pub fn unknown_action(controller: impl Into<String>, action: impl Into<String>) -> Self {
        ServerError::UnknownAction {
            controller: controller.into(),
            action: action.into(),
        }
    }

    pub(crate) fn invalid_route(pattern: &str, reason: impl Into<String>) -> Self {
        ServerError::InvalidRoute {
            pattern: pattern.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Failures reading or writing the serialized route table.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file unreadable: {0}")]
    Io(#[from] io::Error),

    #[error("cache blob is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("cache blob is malformed: {0}")]
    Format(#[from] serde_json::Error),

    #[error("cache format version {found} does not match expected {expected}")]
    Version { found: u32, expected: u32 },
}

fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ServerResult<T> = Result<T, ServerError>;
