//! Client configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::{KernelError, Result};

/// How decoded responses are returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// Return the transport response untouched.
    Raw,
    /// Parse the body as a loosely-typed JSON object.
    #[default]
    Map,
    /// Deserialize the body into a caller-specified type.
    Object,
}

impl ResponseType {
    /// Canonical name of the response type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Map => "array",
            Self::Object => "object",
        }
    }
}

impl FromStr for ResponseType {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(Self::Raw),
            "array" | "map" | "collection" => Ok(Self::Map),
            "object" => Ok(Self::Object),
            other => Err(KernelError::Config(format!(
                "unknown response_type '{other}'"
            ))),
        }
    }
}

/// Where the access token is attached on outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPlacement {
    /// Append `key=<token>` to the query string.
    Query {
        /// Query parameter name.
        key: String,
    },
    /// Set a header to `prefix + token`.
    Header {
        /// Header name.
        name: String,
        /// Value prefix, e.g. `"Bearer "`.
        prefix: String,
    },
}

impl TokenPlacement {
    /// Query parameter placement.
    pub fn query(key: impl Into<String>) -> Self {
        Self::Query { key: key.into() }
    }

    /// `Authorization: Bearer <token>` placement.
    pub fn bearer() -> Self {
        Self::Header {
            name: "Authorization".to_string(),
            prefix: "Bearer ".to_string(),
        }
    }

    /// Header placement with a custom name and no prefix.
    pub fn header(name: impl Into<String>) -> Self {
        Self::Header {
            name: name.into(),
            prefix: String::new(),
        }
    }
}

impl Default for TokenPlacement {
    fn default() -> Self {
        Self::query("access_token")
    }
}

/// Optional middleware hooks. Both are off unless enabled explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MiddlewareHooks {
    /// Register the `retry` hook.
    pub retry: bool,
    /// Register the `log` hook.
    pub log: bool,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL relative request paths are resolved against.
    pub base_url: Option<String>,
    /// Response decoding mode.
    pub response_type: ResponseType,
    /// Default total request timeout.
    pub timeout: Duration,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Read timeout, used when no total timeout is set on a request.
    pub read_timeout: Option<Duration>,
    /// Access token attachment convention.
    pub token_placement: TokenPlacement,
    /// Optional middleware hooks.
    pub hooks: MiddlewareHooks,
    /// Default headers for all requests.
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Enable gzip decompression.
    pub gzip: bool,
    /// Follow redirects.
    pub follow_redirects: bool,
    /// Maximum redirects to follow.
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            response_type: ResponseType::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            token_placement: TokenPlacement::default(),
            hooks: MiddlewareHooks::default(),
            default_headers: Vec::new(),
            user_agent: format!("courier-kernel/{}", env!("CARGO_PKG_VERSION")),
            gzip: true,
            follow_redirects: true,
            max_redirects: 10,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Build a configuration from a loosely-typed JSON map.
    ///
    /// Timeouts are given in (possibly fractional) seconds. Unknown keys are
    /// ignored; missing keys keep their defaults.
    ///
    /// ```
    /// use courier_kernel::{ClientConfig, ResponseType};
    ///
    /// let config = ClientConfig::from_value(serde_json::json!({
    ///     "base_url": "https://api.example.com/",
    ///     "response_type": "object",
    ///     "timeout": 5.0,
    /// }))
    /// .unwrap();
    /// assert_eq!(config.response_type, ResponseType::Object);
    /// ```
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawClientConfig = serde_json::from_value(value)
            .map_err(|e| KernelError::Config(e.to_string()))?;
        let mut config = Self::default();

        config.base_url = raw.base_url;
        if let Some(response_type) = raw.response_type {
            config.response_type = response_type.parse()?;
        }
        if let Some(secs) = raw.timeout {
            config.timeout = seconds(secs, "timeout")?;
        }
        if let Some(secs) = raw.connect_timeout {
            config.connect_timeout = seconds(secs, "connect_timeout")?;
        }
        if let Some(secs) = raw.read_timeout {
            config.read_timeout = Some(seconds(secs, "read_timeout")?);
        }
        config.token_placement = match (raw.token_header, raw.token_query_key) {
            (Some(name), _) => TokenPlacement::Header {
                name,
                prefix: raw.token_header_prefix.unwrap_or_default(),
            },
            (None, Some(key)) => TokenPlacement::Query { key },
            (None, None) => TokenPlacement::default(),
        };
        config.hooks = MiddlewareHooks {
            retry: raw.retry,
            log: raw.log,
        };
        config.default_headers = raw.headers.into_iter().collect();
        if let Some(user_agent) = raw.user_agent {
            config.user_agent = user_agent;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if let Some(base) = &self.base_url {
            url::Url::parse(base)
                .map_err(|e| KernelError::Config(format!("base_url '{base}': {e}")))?;
        }
        if self.timeout.is_zero() {
            return Err(KernelError::Config("timeout must be non-zero".to_string()));
        }
        match &self.token_placement {
            TokenPlacement::Query { key } if key.is_empty() => {
                return Err(KernelError::Config(
                    "token query key must not be empty".to_string(),
                ));
            }
            TokenPlacement::Header { name, .. } => {
                http::HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| KernelError::Config(format!("token header '{name}': {e}")))?;
            }
            _ => {}
        }
        for (name, _) in &self.default_headers {
            http::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| KernelError::Config(format!("default header '{name}': {e}")))?;
        }
        Ok(())
    }
}

fn seconds(secs: f64, key: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| KernelError::Config(format!("{key}: {e}")))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClientConfig {
    base_url: Option<String>,
    response_type: Option<String>,
    timeout: Option<f64>,
    connect_timeout: Option<f64>,
    read_timeout: Option<f64>,
    token_query_key: Option<String>,
    token_header: Option<String>,
    token_header_prefix: Option<String>,
    headers: BTreeMap<String, String>,
    user_agent: Option<String>,
    retry: bool,
    log: bool,
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the response decoding mode.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.config.response_type = response_type;
        self
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// Set where the access token is attached.
    pub fn token_placement(mut self, placement: TokenPlacement) -> Self {
        self.config.token_placement = placement;
        self
    }

    /// Enable or disable the `retry` hook.
    pub fn retry_hook(mut self, enable: bool) -> Self {
        self.config.hooks.retry = enable;
        self
    }

    /// Enable or disable the `log` hook.
    pub fn log_hook(mut self, enable: bool) -> Self {
        self.config.hooks.log = enable;
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Enable or disable gzip decompression.
    pub fn gzip(mut self, enable: bool) -> Self {
        self.config.gzip = enable;
        self
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(mut self, enable: bool) -> Self {
        self.config.follow_redirects = enable;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
