//! Transport executor: performs the network call.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::{
    ClientConfig, KernelError, MultipartPart, OutgoingRequest, PartContents, RawResponse,
    RequestBody, Result,
};

/// Dispatches a prepared request and returns the buffered response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request.
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse>;
}

/// Transport backed by a `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport from the client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(config.gzip);

        if let Some(read_timeout) = config.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        let inner = builder
            .build()
            .map_err(|e| KernelError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, mut request: OutgoingRequest) -> Result<RawResponse> {
        let timeout = request.timeout();
        let body = request.take_body();

        let mut builder = self
            .inner
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        builder = match body {
            Some(RequestBody::Form(encoded)) => builder.body(encoded),
            Some(RequestBody::Json(bytes)) => builder.body(bytes),
            Some(RequestBody::Multipart(parts)) => builder.multipart(multipart_form(parts).await?),
            None => builder,
        };
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        debug!(
            method = %request.method(),
            path = %request.url().path(),
            "Dispatching request"
        );

        let response = builder.send().await.map_err(|e| match timeout {
            Some(timeout) if e.is_timeout() => KernelError::Timeout(timeout),
            _ => KernelError::Transport(e),
        })?;
        RawResponse::from_reqwest(response).await
    }
}

async fn multipart_form(parts: Vec<MultipartPart>) -> Result<Form> {
    let mut form = Form::new();
    for part in parts {
        let (name, part) = to_reqwest_part(part).await?;
        form = form.part(name, part);
    }
    Ok(form)
}

/// Convert a part, returning the field name it goes out under.
///
/// reqwest writes the `Content-Disposition` line itself from the field and
/// file names, so an explicit disposition header is folded into those two
/// instead of being sent as a second line.
async fn to_reqwest_part(part: MultipartPart) -> Result<(String, Part)> {
    let MultipartPart {
        mut name,
        contents,
        filename,
        headers,
    } = part;
    let mut file_name = filename.or_else(|| contents.file_name());

    let mut extra = http::HeaderMap::new();
    for (header, value) in &headers {
        if header.eq_ignore_ascii_case("content-disposition") {
            let (field, file) = disposition_params(value);
            if let Some(field) = field {
                name = field;
            }
            if file.is_some() {
                file_name = file;
            }
            continue;
        }
        let header = http::HeaderName::from_bytes(header.as_bytes())
            .map_err(|e| KernelError::Build(format!("part header name '{header}': {e}")))?;
        let value = http::HeaderValue::from_str(value)
            .map_err(|e| KernelError::Build(format!("part header '{header}': {e}")))?;
        extra.insert(header, value);
    }

    let mut reqwest_part = match contents {
        PartContents::Text(text) => Part::text(text),
        PartContents::Bytes(bytes) => Part::bytes(bytes.to_vec()),
        PartContents::Path(path) => Part::bytes(tokio::fs::read(&path).await?),
    };
    if let Some(file_name) = file_name {
        reqwest_part = reqwest_part.file_name(file_name);
    }
    if !extra.is_empty() {
        reqwest_part = reqwest_part.headers(extra);
    }

    Ok((name, reqwest_part))
}

/// `name` and `filename` parameters of a `Content-Disposition` value.
fn disposition_params(value: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut filename = None;
    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        let raw = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(raw);
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(raw.to_string()),
            "filename" => filename = Some(raw.to_string()),
            _ => {}
        }
    }
    (name, filename)
}
