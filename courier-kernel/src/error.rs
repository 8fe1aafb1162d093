//! Kernel error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStage {
    /// Client construction or configuration.
    Config,
    /// Request building, before anything is dispatched.
    Build,
    /// A middleware aborted the request.
    Middleware,
    /// The network call failed.
    Transport,
    /// The response body could not be decoded.
    Decode,
}

/// Errors produced by the request pipeline.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Invalid client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Malformed input to the request builder.
    #[error("Failed to build request: {0}")]
    Build(String),

    /// Invalid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// A middleware failed; the request was never dispatched.
    #[error("Middleware '{name}' failed: {source}")]
    Middleware {
        /// Registration name of the failing middleware.
        name: String,
        /// Underlying failure.
        #[source]
        source: Box<KernelError>,
    },

    /// Access token could not be obtained or attached.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Request timed out.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Underlying HTTP transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded into the requested shape.
    #[error("Failed to decode response as {target}: {message}")]
    Decode {
        /// Name of the requested shape.
        target: String,
        /// Decoder message.
        message: String,
    },

    /// I/O error (reading multipart files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelError {
    /// Wrap an error raised by the middleware registered under `name`.
    pub fn middleware(name: impl Into<String>, source: KernelError) -> Self {
        Self::Middleware {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// Stage of the pipeline this error belongs to.
    pub fn stage(&self) -> ErrorStage {
        match self {
            Self::Config(_) => ErrorStage::Config,
            Self::Build(_) | Self::InvalidUrl(_) => ErrorStage::Build,
            Self::Middleware { .. } | Self::Credential(_) => ErrorStage::Middleware,
            Self::Timeout(_) | Self::Transport(_) | Self::Io(_) => ErrorStage::Transport,
            Self::Decode { .. } => ErrorStage::Decode,
        }
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_)) || matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Check if this is a connection error.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connect())
    }

    /// Check if this is a decode error.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }

    /// Name of the failing middleware, if any.
    pub fn middleware_name(&self) -> Option<&str> {
        match self {
            Self::Middleware { name, .. } => Some(name),
            _ => None,
        }
    }
}
