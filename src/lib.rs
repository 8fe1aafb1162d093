// Courier - typed clients for third-party platform APIs
//
// Every service client is a thin caller of the kernel pipeline: requests are
// built, passed through the middleware chain (access-token injection by
// default), dispatched and cast into the configured response shape.

// Re-export the request pipeline
pub use courier_kernel::*;

// Re-export the kernel crate itself for fully qualified paths
pub use courier_kernel as kernel;

// Needed to implement `AccessToken`, `TokenFetcher`, `Middleware` and `Transport`
pub use async_trait::async_trait;

/// Prelude for common imports.
pub mod prelude {
    pub use async_trait::async_trait;
    pub use courier_kernel::prelude::*;
}
