//! The HTTP function the client wraps.
//!
//! [`L402Client`](super::L402Client) never opens sockets itself; every
//! outbound request goes through an [`HttpTransport`]. Errors returned by the
//! transport reach the caller unchanged as
//! [`L402Error::Transport`](crate::types::L402Error::Transport).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, Response};

use crate::types::BoxError;

/// Sends one HTTP request and returns the fully buffered response.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError>;
}

#[async_trait]
impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        (**self).send(request).await
    }
}

/// Adapts an async closure into an [`HttpTransport`].
///
/// ```ignore
/// let transport = FnTransport(|request: http::Request<bytes::Bytes>| async move {
///     my_http_stack.call(request).await
/// });
/// ```
#[derive(Debug, Clone)]
pub struct FnTransport<F>(pub F);

#[async_trait]
impl<F, Fut> HttpTransport for FnTransport<F>
where
    F: Fn(Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response<Bytes>, BoxError>> + Send,
{
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        (self.0)(request).await
    }
}

// ============================================================================
// ReqwestTransport
// ============================================================================

/// [`HttpTransport`] backed by a `reqwest::Client`.
#[cfg(feature = "reqwest")]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a preconfigured `reqwest` client (timeouts, proxies, TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "reqwest")]
#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
        let request = reqwest::Request::try_from(request)?;
        let response = self.client.execute(request).await?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());
        if let Some(headers) = builder.headers_mut() {
            *headers = response.headers().clone();
        }
        let body = response.bytes().await?;
        Ok(builder.body(body)?)
    }
}
