//! Transport-agnostic outgoing request.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::time::Duration;
use url::Url;

use crate::{ClientConfig, KernelError, RequestBody, RequestOptions, Result};

/// A fully resolved request, mutated by middleware before dispatch.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<RequestBody>,
    connect_timeout: Option<Duration>,
    timeout: Option<Duration>,
    read_timeout: Option<Duration>,
}

impl OutgoingRequest {
    /// Create a bare request.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            connect_timeout: None,
            timeout: None,
            read_timeout: None,
        }
    }

    /// Resolve `url` and `options` against the client configuration.
    ///
    /// Headers are applied in order: configured defaults, per-call headers,
    /// then the body's content type unless a header already set one.
    /// Per-call timeouts override configured ones.
    pub fn build(
        method: Method,
        url: &str,
        options: RequestOptions,
        config: &ClientConfig,
    ) -> Result<Self> {
        options.validate()?;

        let mut url = resolve_url(config.base_url.as_deref(), url)?;
        if !options.query.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &options.query {
                query_pairs.append_pair(key, value);
            }
        }

        let mut request = Self::new(method, url);

        for (name, value) in &config.default_headers {
            request.set_header(name, value)?;
        }
        for (name, value) in &options.headers {
            request.set_header(name, value)?;
        }
        if let Some(content_type) = options.body.as_ref().and_then(RequestBody::content_type)
            && !request.headers.contains_key(http::header::CONTENT_TYPE)
        {
            request
                .headers
                .insert(http::header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        request.body = options.body;
        request.connect_timeout = options.connect_timeout.or(Some(config.connect_timeout));
        request.timeout = options.timeout.or(Some(config.timeout));
        request.read_timeout = options.read_timeout.or(config.read_timeout);

        Ok(request)
    }

    /// Get the method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Append a query parameter to the URL.
    pub fn append_query(&mut self, key: &str, value: &str) {
        self.url.query_pairs_mut().append_pair(key, value);
    }

    /// Set a query parameter, dropping any earlier values for `key`.
    pub fn set_query(&mut self, key: &str, value: &str) {
        let kept: Vec<(String, String)> = self
            .query_pairs()
            .into_iter()
            .filter(|(k, _)| k != key)
            .collect();
        self.url
            .query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(key, value);
    }

    /// Decoded query pairs, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// First value of a query parameter.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the headers mutably.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a header, replacing existing values.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| KernelError::Build(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| KernelError::Build(format!("header '{name}': {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Get the body.
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Take the body out of the request.
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }

    /// Connection timeout.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    /// Total timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

fn resolve_url(base: Option<&str>, url: &str) -> Result<Url> {
    match base {
        Some(base) => {
            let base = Url::parse(base).map_err(|e| KernelError::InvalidUrl(e.to_string()))?;
            base.join(url)
                .map_err(|e| KernelError::InvalidUrl(e.to_string()))
        }
        None => Url::parse(url).map_err(|e| KernelError::InvalidUrl(e.to_string())),
    }
}
