//! Base client: the verb-level entry points of the pipeline.

use http::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::{
    AccessToken, AccessTokenMiddleware, CastResult, ClientConfig, LogHook, Middleware,
    MiddlewareChain, OutgoingRequest, PartContents, RawResponse, ReqwestTransport,
    RequestOptions, ResponseCaster, Result, RetryHook, Transport,
};

/// Registration name of the credential injector.
pub const ACCESS_TOKEN_MIDDLEWARE: &str = "access_token";
/// Registration name of the retry hook.
pub const RETRY_MIDDLEWARE: &str = "retry";
/// Registration name of the log hook.
pub const LOG_MIDDLEWARE: &str = "log";

/// Client for one platform service, bound to one configuration and at most
/// one access token.
///
/// The middleware chain is built on first use and reused for the client's
/// lifetime. Share the client across tasks with `Arc`.
pub struct BaseClient {
    transport: Arc<dyn Transport>,
    config: Arc<ClientConfig>,
    token: Option<Arc<dyn AccessToken>>,
    custom: Vec<(String, Arc<dyn Middleware>)>,
    chain: OnceLock<MiddlewareChain>,
    caster: ResponseCaster,
}

impl BaseClient {
    /// Create a client with the reqwest transport.
    pub fn new(config: ClientConfig, token: Option<Arc<dyn AccessToken>>) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::build(config, token, Arc::new(transport)))
    }

    /// Create a client with a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        token: Option<Arc<dyn AccessToken>>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, token, transport))
    }

    fn build(
        config: ClientConfig,
        token: Option<Arc<dyn AccessToken>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            transport,
            config: Arc::new(config),
            token,
            custom: Vec::new(),
            chain: OnceLock::new(),
            caster: ResponseCaster,
        }
    }

    /// Register an extra middleware, run after the default set.
    ///
    /// The chain is rebuilt lazily on the next request.
    pub fn with_middleware<M: Middleware + 'static>(
        mut self,
        name: impl Into<String>,
        middleware: M,
    ) -> Self {
        self.custom.push((name.into(), Arc::new(middleware)));
        self.chain.take();
        self
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the access token, if any.
    pub fn access_token(&self) -> Option<&Arc<dyn AccessToken>> {
        self.token.as_ref()
    }

    /// The middleware chain, built on first call.
    pub fn middleware(&self) -> &MiddlewareChain {
        self.chain.get_or_init(|| {
            let mut chain = MiddlewareChain::new();
            if self.config.hooks.retry {
                chain.register(RETRY_MIDDLEWARE, RetryHook);
            }
            chain.register(
                ACCESS_TOKEN_MIDDLEWARE,
                AccessTokenMiddleware::new(self.token.clone(), Arc::clone(&self.config)),
            );
            if self.config.hooks.log {
                chain.register(LOG_MIDDLEWARE, LogHook);
            }
            for (name, middleware) in &self.custom {
                chain.register_shared(name.clone(), Arc::clone(middleware));
            }
            debug!(middlewares = ?chain.names(), "Initialized middleware chain");
            chain
        })
    }

    /// Send a GET with query parameters.
    pub async fn get<T, I, K, V>(&self, url: &str, query: I) -> Result<CastResult<T>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request(url, Method::GET, RequestOptions::get(query), false)
            .await
    }

    /// Send a form-encoded POST.
    pub async fn post<T, D>(&self, url: &str, data: &D) -> Result<CastResult<T>>
    where
        T: DeserializeOwned,
        D: Serialize + ?Sized,
    {
        self.request(url, Method::POST, RequestOptions::post(data)?, false)
            .await
    }

    /// Send a JSON POST with query parameters.
    pub async fn post_json<T, D, I, K, V>(
        &self,
        url: &str,
        data: &D,
        query: I,
    ) -> Result<CastResult<T>>
    where
        T: DeserializeOwned,
        D: Serialize + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request(
            url,
            Method::POST,
            RequestOptions::post_json(data, query)?,
            false,
        )
        .await
    }

    /// Upload files as multipart form data. Always returns the raw response.
    ///
    /// See [`RequestOptions::upload`] for how parts and timeouts are built.
    pub async fn upload<F, N, C, G, K, V, Q, QK, QV>(
        &self,
        url: &str,
        files: F,
        form: G,
        query: Q,
    ) -> Result<RawResponse>
    where
        F: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<PartContents>,
        G: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        Q: IntoIterator<Item = (QK, QV)>,
        QK: Into<String>,
        QV: Into<String>,
    {
        let options = RequestOptions::upload(files, form, query)?;
        self.request_raw(url, Method::POST, options).await
    }

    /// Run the full pipeline. With `return_raw` the response is returned
    /// untouched; otherwise it is cast per the configured response type.
    pub async fn request<T: DeserializeOwned>(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
        return_raw: bool,
    ) -> Result<CastResult<T>> {
        let response = self.perform(url, method, options).await?;
        if return_raw {
            return Ok(CastResult::Raw(response));
        }
        self.caster.cast(response, self.config.response_type)
    }

    /// Run the full pipeline and return the raw response.
    pub async fn request_raw(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<RawResponse> {
        self.perform(url, method, options).await
    }

    async fn perform(
        &self,
        url: &str,
        method: Method,
        options: RequestOptions,
    ) -> Result<RawResponse> {
        let mut request = OutgoingRequest::build(method, url, options, &self.config)?;
        self.middleware().apply(&mut request).await?;
        let response = self.transport.send(request).await?;
        debug!(
            status = %response.status(),
            bytes = response.bytes().len(),
            "Received response"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for BaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseClient")
            .field("config", &self.config)
            .field("has_token", &self.token.is_some())
            .field("chain", &self.chain.get())
            .finish()
    }
}
