//! # Courier Kernel
//!
//! The outbound request pipeline shared by every Courier service client.
//! A call goes through four stages:
//!
//! 1. **Build**: the verb entry point turns its arguments into
//!    [`RequestOptions`], resolved into an [`OutgoingRequest`].
//! 2. **Middleware**: the client's [`MiddlewareChain`] runs in registration
//!    order. The default chain injects the access token.
//! 3. **Transport**: a [`Transport`] dispatches the request and buffers the
//!    response into a [`RawResponse`].
//! 4. **Cast**: the [`ResponseCaster`] returns the raw response or decodes
//!    it per the configured [`ResponseType`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_kernel::{BaseClient, CastResult, ClientConfig, StaticAccessToken};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("https://api.weixin.qq.com/cgi-bin/")
//!         .build();
//!     let token = Arc::new(StaticAccessToken::new("ACCESS_TOKEN"));
//!     let client = BaseClient::new(config, Some(token))?;
//!
//!     let result: CastResult = client.get("menu/get", [("lang", "zh_CN")]).await?;
//!     println!("{:?}", result.as_map());
//!     Ok(())
//! }
//! ```
//!
//! ## Cached Tokens
//!
//! ```rust,no_run
//! use courier_kernel::{BaseClient, CachedAccessToken, ClientConfig, EndpointTokenFetcher};
//! use std::sync::Arc;
//!
//! # fn main() -> courier_kernel::Result<()> {
//! let config = ClientConfig::default();
//! let fetcher = EndpointTokenFetcher::from_config(
//!     "https://api.weixin.qq.com/cgi-bin/token",
//!     [("grant_type", "client_credential"), ("appid", "APPID"), ("secret", "SECRET")],
//!     &config,
//! )?;
//! let token = Arc::new(CachedAccessToken::new(fetcher));
//! let _client = BaseClient::new(config, Some(token))?;
//! # Ok(())
//! # }
//! ```

mod cast;
mod client;
mod config;
mod credential;
mod error;
mod middleware;
mod options;
mod request;
mod response;
mod transport;

pub use cast::{CastResult, ResponseCaster};
pub use client::{ACCESS_TOKEN_MIDDLEWARE, BaseClient, LOG_MIDDLEWARE, RETRY_MIDDLEWARE};
pub use config::{ClientConfig, ClientConfigBuilder, MiddlewareHooks, ResponseType, TokenPlacement};
pub use credential::{
    AccessToken, AccessTokenMiddleware, CachedAccessToken, DEFAULT_SAFETY_WINDOW,
    EndpointTokenFetcher, IssuedToken, StaticAccessToken, TokenFetcher, attach_token,
};
pub use error::{ErrorStage, KernelError, Result};
pub use middleware::{FnMiddleware, LogHook, Middleware, MiddlewareChain, RetryHook};
pub use options::{MultipartPart, PartContents, RequestBody, RequestOptions, UPLOAD_TIMEOUT};
pub use request::OutgoingRequest;
pub use response::RawResponse;
pub use transport::{ReqwestTransport, Transport};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use courier_kernel::prelude::*;
/// ```
pub mod prelude {
    pub use crate::cast::{CastResult, ResponseCaster};
    pub use crate::client::BaseClient;
    pub use crate::config::{ClientConfig, ResponseType, TokenPlacement};
    pub use crate::credential::{AccessToken, CachedAccessToken, StaticAccessToken, TokenFetcher};
    pub use crate::error::{KernelError, Result};
    pub use crate::middleware::{Middleware, MiddlewareChain};
    pub use crate::options::{PartContents, RequestOptions};
    pub use crate::response::RawResponse;
    pub use http::Method;
}
