//! Ordered chain of request-mutating middleware.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{KernelError, OutgoingRequest, Result};

/// Middleware trait for mutating requests before dispatch.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Modify the outgoing request. An error aborts the request.
    async fn modify_request(&self, request: &mut OutgoingRequest) -> Result<()>;
}

/// Middleware built from a synchronous closure.
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut OutgoingRequest) -> Result<()> + Send + Sync,
{
    /// Wrap a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut OutgoingRequest) -> Result<()> + Send + Sync,
{
    async fn modify_request(&self, request: &mut OutgoingRequest) -> Result<()> {
        (self.f)(request)
    }
}

/// Chain of named middleware, applied in registration order.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    entries: Vec<(String, Arc<dyn Middleware>)>,
}

impl MiddlewareChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a middleware under `name`.
    ///
    /// Registering an existing name replaces that middleware in its
    /// original position.
    pub fn register<M: Middleware + 'static>(&mut self, name: impl Into<String>, middleware: M) {
        self.register_shared(name, Arc::new(middleware));
    }

    /// Register an already shared middleware under `name`.
    pub fn register_shared(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                debug!(middleware = %name, "Replacing registered middleware");
                entry.1 = middleware;
            }
            None => self.entries.push((name, middleware)),
        }
    }

    /// Registration names, in order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Check whether a middleware is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == name)
    }

    /// Number of registered middleware.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every middleware in order. The first failure stops the chain.
    pub async fn apply(&self, request: &mut OutgoingRequest) -> Result<()> {
        for (name, middleware) in &self.entries {
            trace!(middleware = %name, "Applying middleware");
            middleware
                .modify_request(request)
                .await
                .map_err(|e| KernelError::middleware(name.as_str(), e))?;
        }
        Ok(())
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("middlewares", &self.names())
            .finish()
    }
}

/// Named placeholder for retry handling. Retries are not performed; the
/// hook only marks the position in the chain.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryHook;

#[async_trait]
impl Middleware for RetryHook {
    async fn modify_request(&self, request: &mut OutgoingRequest) -> Result<()> {
        trace!(url = %request.url(), "Retry hook passed");
        Ok(())
    }
}

/// Logs every outgoing request at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHook;

#[async_trait]
impl Middleware for LogHook {
    async fn modify_request(&self, request: &mut OutgoingRequest) -> Result<()> {
        debug!(
            method = %request.method(),
            url = %request.url().path(),
            "Sending request"
        );
        Ok(())
    }
}
