//! Per-call request options produced by the verb entry points.

use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{KernelError, Result};

/// Timeout forced onto every upload, overriding client configuration.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload of a multipart part.
#[derive(Debug, Clone, PartialEq)]
pub enum PartContents {
    /// In-memory bytes.
    Bytes(Bytes),
    /// Plain text field value.
    Text(String),
    /// File on disk, read when the request is dispatched.
    Path(PathBuf),
}

impl PartContents {
    /// Reference a file on disk.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// File name implied by the contents, if any.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            _ => None,
        }
    }
}

impl From<&str> for PartContents {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PartContents {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for PartContents {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for PartContents {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<PathBuf> for PartContents {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for PartContents {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    /// Field name.
    pub name: String,
    /// Part payload.
    pub contents: PartContents,
    /// Explicit file name.
    pub filename: Option<String>,
    /// Extra part headers, e.g. `Content-Disposition`.
    pub headers: Vec<(String, String)>,
}

impl MultipartPart {
    /// Create a part without headers.
    pub fn new(name: impl Into<String>, contents: impl Into<PartContents>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
            filename: None,
            headers: Vec::new(),
        }
    }

    /// Set the file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Add a part header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a part header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Encoded request body. A request carries at most one.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded` body.
    Form(String),
    /// `application/json` body.
    Json(Vec<u8>),
    /// `multipart/form-data` parts, encoded by the transport.
    Multipart(Vec<MultipartPart>),
}

impl RequestBody {
    /// Content type implied by the body. Multipart boundaries are chosen by
    /// the transport, so it reports none.
    pub fn content_type(&self) -> Option<&'static str> {
        match self {
            Self::Form(_) => Some("application/x-www-form-urlencoded"),
            Self::Json(_) => Some("application/json"),
            Self::Multipart(_) => None,
        }
    }

    /// Multipart parts, if this is a multipart body.
    pub fn parts(&self) -> Option<&[MultipartPart]> {
        match self {
            Self::Multipart(parts) => Some(parts),
            _ => None,
        }
    }
}

/// Options for a single call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Query pairs appended to the URL, in order.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub body: Option<RequestBody>,
    /// Per-call headers.
    pub headers: Vec<(String, String)>,
    /// Connection timeout override.
    pub connect_timeout: Option<Duration>,
    /// Total timeout override.
    pub timeout: Option<Duration>,
    /// Read timeout override.
    pub read_timeout: Option<Duration>,
}

impl RequestOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a GET: query only, no body.
    pub fn get<I, K, V>(query: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new().queries(query)
    }

    /// Options for a form POST.
    pub fn post<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        let encoded = serde_urlencoded::to_string(data)
            .map_err(|e| KernelError::Build(format!("form encoding: {e}")))?;
        Ok(Self::new().body(RequestBody::Form(encoded)))
    }

    /// Options for a JSON POST with an optional query.
    pub fn post_json<T, I, K, V>(data: &T, query: I) -> Result<Self>
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let bytes = serde_json::to_vec(data)
            .map_err(|e| KernelError::Build(format!("JSON encoding: {e}")))?;
        Ok(Self::new().queries(query).body(RequestBody::Json(bytes)))
    }

    /// Options for a multipart upload.
    ///
    /// File parts come first, in the order given, followed by one plain part
    /// per form field. When the form carries a `filename` field, every file
    /// part gets `Content-Disposition: form-data; name="media"; filename="…"`
    /// built from that single value. Timeouts are forced to
    /// [`UPLOAD_TIMEOUT`].
    pub fn upload<F, N, C, G, K, V, Q, QK, QV>(files: F, form: G, query: Q) -> Result<Self>
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
        let form: Vec<(String, String)> = form
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let disposition = form
            .iter()
            .find(|(name, _)| name == "filename")
            .map(|(_, filename)| format!("form-data; name=\"media\"; filename=\"{filename}\""));

        let mut parts = Vec::new();
        for (name, contents) in files {
            let mut part = MultipartPart::new(name, contents);
            if let Some(disposition) = &disposition {
                part = part.with_header("Content-Disposition", disposition.clone());
            }
            parts.push(part);
        }
        for (name, value) in form {
            parts.push(MultipartPart::new(name, value));
        }

        let options = Self::new()
            .queries(query)
            .body(RequestBody::Multipart(parts))
            .connect_timeout(UPLOAD_TIMEOUT)
            .timeout(UPLOAD_TIMEOUT)
            .read_timeout(UPLOAD_TIMEOUT);
        options.validate()?;
        Ok(options)
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add multiple query parameters.
    pub fn queries<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in params {
            self.query.push((k.into(), v.into()));
        }
        self
    }

    /// Set the body, replacing any previous one.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the total timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Reject options the transport cannot encode.
    pub fn validate(&self) -> Result<()> {
        if let Some(RequestBody::Multipart(parts)) = &self.body
            && let Some(index) = parts.iter().position(|p| p.name.is_empty())
        {
            return Err(KernelError::Build(format!(
                "multipart part #{index} has an empty name"
            )));
        }
        Ok(())
    }
}
