//! Price resolution for the paywall.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, Request, Uri};

/// What a dynamic price function gets to look at.
#[derive(Debug, Clone)]
pub struct PriceContext {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl PriceContext {
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
        }
    }
}

type PriceFn = dyn Fn(&PriceContext) -> BoxFuture<'static, u64> + Send + Sync;

/// Price of a protected resource, in satoshis.
///
/// ```ignore
/// let flat = Pricing::Fixed(10);
/// let by_path = Pricing::from_fn(|ctx| if ctx.uri.path() == "/bulk" { 100 } else { 10 });
/// let quoted = Pricing::from_async_fn(|ctx| async move { oracle.quote(ctx.uri.path()).await });
/// ```
#[derive(Clone)]
pub enum Pricing {
    Fixed(u64),
    Dynamic(Arc<PriceFn>),
}

impl Pricing {
    /// Prices each request with a synchronous function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&PriceContext) -> u64 + Send + Sync + 'static,
    {
        Pricing::Dynamic(Arc::new(move |ctx: &PriceContext| {
            futures::future::ready(f(ctx)).boxed()
        }))
    }

    /// Prices each request with an asynchronous function.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(PriceContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = u64> + Send + 'static,
    {
        Pricing::Dynamic(Arc::new(move |ctx: &PriceContext| f(ctx.clone()).boxed()))
    }

    pub async fn resolve(&self, ctx: &PriceContext) -> u64 {
        match self {
            Pricing::Fixed(price) => *price,
            Pricing::Dynamic(f) => f(ctx).await,
        }
    }
}

impl From<u64> for Pricing {
    fn from(price: u64) -> Self {
        Pricing::Fixed(price)
    }
}

impl std::fmt::Debug for Pricing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pricing::Fixed(price) => f.debug_tuple("Fixed").field(price).finish(),
            Pricing::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}
