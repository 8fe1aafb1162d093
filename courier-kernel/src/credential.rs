//! Access tokens and the middleware that injects them.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{
    ClientConfig, KernelError, Middleware, OutgoingRequest, ReqwestTransport, Result, TokenPlacement,
};

/// Default margin before expiry at which a cached token is refetched.
pub const DEFAULT_SAFETY_WINDOW: Duration = Duration::from_secs(500);

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME: u64 = 7200;

/// Deadline for a token endpoint call when none is configured.
const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(30);

/// A credential able to produce, refresh and attach an access token.
///
/// Implementations synchronize their own state; the client only reads
/// through this trait.
#[async_trait]
pub trait AccessToken: Send + Sync {
    /// Current token, fetching it if none is cached.
    async fn token(&self) -> Result<String>;

    /// Force a new token.
    async fn refresh(&self) -> Result<String>;

    /// Attach the current token to `request` per the configured placement.
    async fn apply(&self, request: &mut OutgoingRequest, config: &ClientConfig) -> Result<()> {
        let token = self.token().await?;
        attach_token(request, &config.token_placement, &token)
    }
}

/// Attach `token` to `request` according to `placement`.
pub fn attach_token(
    request: &mut OutgoingRequest,
    placement: &TokenPlacement,
    token: &str,
) -> Result<()> {
    match placement {
        TokenPlacement::Query { key } => {
            request.set_query(key, token);
            Ok(())
        }
        TokenPlacement::Header { name, prefix } => {
            request.set_header(name, &format!("{prefix}{token}"))
        }
    }
}

/// A fixed token.
#[derive(Debug, Clone)]
pub struct StaticAccessToken {
    token: String,
}

impl StaticAccessToken {
    /// Create a static token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessToken for StaticAccessToken {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }

    async fn refresh(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Token issued by a [`TokenFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Token value.
    pub access_token: String,
    /// Lifetime reported by the issuer.
    pub expires_in: Duration,
}

/// Source of fresh access tokens.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Fetch a new token from the issuer.
    async fn fetch(&self) -> Result<IssuedToken>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Lazily fetched token, cached until shortly before it expires.
///
/// Concurrent callers on a cold or stale cache share a single fetch.
pub struct CachedAccessToken<F> {
    fetcher: F,
    cache: RwLock<Option<CachedToken>>,
    refresh_gate: Mutex<()>,
    safety_window: Duration,
}

impl<F: TokenFetcher> CachedAccessToken<F> {
    /// Create a cache around `fetcher`.
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            cache: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            safety_window: DEFAULT_SAFETY_WINDOW,
        }
    }

    /// Set the margin before expiry at which the token is refetched.
    pub fn with_safety_window(mut self, window: Duration) -> Self {
        self.safety_window = window;
        self
    }

    /// Drop the cached token.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    fn cached(&self) -> Option<String> {
        self.cache
            .read()
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.value.clone())
    }

    async fn fetch_and_store(&self) -> Result<String> {
        let issued = self.fetcher.fetch().await.inspect_err(|e| {
            warn!(error = %e, "Failed to fetch access token");
        })?;
        let lifetime = issued.expires_in.saturating_sub(self.safety_window);
        debug!(
            expires_in = issued.expires_in.as_secs(),
            cached_for = lifetime.as_secs(),
            "Fetched access token"
        );

        *self.cache.write() = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(issued.access_token)
    }
}

#[async_trait]
impl<F: TokenFetcher> AccessToken for CachedAccessToken<F> {
    async fn token(&self) -> Result<String> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.fetch_and_store().await
    }

    async fn refresh(&self) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;
        self.fetch_and_store().await
    }
}

/// Fetches tokens from a platform token endpoint.
///
/// Issues `GET <url>?<query>` and expects
/// `{"access_token": "...", "expires_in": 7200}`. A body with a non-zero
/// `errcode` is reported as a credential error. Every call is bounded by a
/// deadline (30 seconds unless configured).
#[derive(Debug, Clone)]
pub struct EndpointTokenFetcher {
    http: reqwest::Client,
    url: String,
    query: Vec<(String, String)>,
    timeout: Duration,
}

impl EndpointTokenFetcher {
    /// Create a fetcher for `url` with the credential query pairs.
    pub fn new<I, K, V>(url: impl Into<String>, query: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            query: query.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            timeout: DEFAULT_TOKEN_TIMEOUT,
        }
    }

    /// Create a fetcher that shares the client configuration: user agent,
    /// connect and read timeouts, redirects, and `timeout` as the deadline.
    pub fn from_config<I, K, V>(
        url: impl Into<String>,
        query: I,
        config: &ClientConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(url, query)
            .with_client(transport.inner().clone())
            .with_timeout(config.timeout))
    }

    /// Use a specific reqwest client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Set the deadline for each token request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenFetcher for EndpointTokenFetcher {
    async fn fetch(&self) -> Result<IssuedToken> {
        let response = self
            .http
            .get(&self.url)
            .query(&self.query)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KernelError::Credential(format!(
                        "token request timed out after {:?}",
                        self.timeout
                    ))
                } else {
                    KernelError::Credential(format!("token request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| KernelError::Credential(format!("token response ({status}): {e}")))?;

        if let Some(code) = body.get("errcode").and_then(Value::as_i64)
            && code != 0
        {
            let message = body.get("errmsg").and_then(Value::as_str).unwrap_or("unknown error");
            return Err(KernelError::Credential(format!(
                "token endpoint returned errcode {code}: {message}"
            )));
        }

        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                KernelError::Credential(format!("token response ({status}) has no access_token"))
            })?;
        let expires_in = body
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME);

        Ok(IssuedToken {
            access_token: access_token.to_string(),
            expires_in: Duration::from_secs(expires_in),
        })
    }
}

/// Middleware that injects the client's access token into every request.
///
/// Without a token it does nothing, for endpoints that need no credential.
pub struct AccessTokenMiddleware {
    token: Option<Arc<dyn AccessToken>>,
    config: Arc<ClientConfig>,
}

impl AccessTokenMiddleware {
    /// Create the injector.
    pub fn new(token: Option<Arc<dyn AccessToken>>, config: Arc<ClientConfig>) -> Self {
        Self { token, config }
    }
}

#[async_trait]
impl Middleware for AccessTokenMiddleware {
    async fn modify_request(&self, request: &mut OutgoingRequest) -> Result<()> {
        match &self.token {
            Some(token) => token.apply(request, &self.config).await,
            None => Ok(()),
        }
    }
}
