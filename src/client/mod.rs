//! The paying side of L402.
//!
//! [`L402Client`] wraps an [`HttpTransport`] and turns `402 Payment Required`
//! responses into paid, cached credentials transparently.
//!
//! # Request Flow
//!
//! 1. Look up the normalized URL in the [`TokenStore`]. A cached, unexpired
//!    credential is attached and the request sent; anything but a 402 is
//!    returned as-is. A 402 means the server revoked the credential, so it is
//!    evicted. So is a credential that is no longer a valid header value.
//! 2. Send the request with no credential. Anything but a 402 is returned.
//! 3. Parse the `WWW-Authenticate` challenge and the price from the 402 body.
//! 4. Enforce the per-request ceiling, then the cumulative budget.
//! 5. Have the [`L402Payer`] pay the raw challenge.
//! 6. Record the spend, store the new credential, and retry once.
//!
//! The budget check and steps 5 and 6 run under a per-URL payment gate.
//! Concurrent requests for the same URL are serialized, and a request that
//! waited re-reads the store so it can reuse a credential paid for while it
//! was waiting. Payments for different URLs proceed in parallel; each holds
//! its price against the budget with a
//! [`BudgetReservation`](crate::budget::BudgetReservation) until it settles,
//! so together they cannot overrun the limit.
//!
//! # Example
//!
//! ```ignore
//! use l402_kit::client::{L402Client, ReqwestTransport};
//! use l402_kit::budget::BudgetConfig;
//!
//! let client = L402Client::new(ReqwestTransport::new(), wallet)
//!     .with_max_per_request(100)
//!     .with_budget(BudgetConfig::total(5_000));
//!
//! let quote: Quote = client.get_json("https://api.example.com/quote").await?;
//! ```

pub mod config;
pub use config::*;

mod gate;

pub mod request;
pub use request::*;

pub mod transport;
pub use transport::*;

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::budget::{BudgetConfig, BudgetTracker, Clock, SystemClock};
use crate::header::{self, WWW_AUTHENTICATE};
use crate::provider::{L402Payer, PaymentResult, PaymentStatus};
use crate::store::{MemoryTokenStore, NoopTokenStore, TokenStore, normalize_url};
use crate::types::{BudgetError, Challenge, Credential, L402Error, PriceHint};

use gate::PaymentGates;

/// HTTP client that pays L402 challenges on demand.
///
/// # Type Parameters
///
/// - `T`: the underlying HTTP function, see [`HttpTransport`]
/// - `P`: the wallet that settles invoices, see [`L402Payer`]
pub struct L402Client<T, P> {
    transport: T,
    payer: P,
    store: Arc<dyn TokenStore>,
    budget: BudgetTracker,
    max_per_request: Option<u64>,
    clock: Arc<dyn Clock>,
    gates: PaymentGates,
}

impl<T, P> std::fmt::Debug for L402Client<T, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L402Client")
            .field("budget", &self.budget)
            .field("max_per_request", &self.max_per_request)
            .finish_non_exhaustive()
    }
}

impl<T, P> L402Client<T, P>
where
    T: HttpTransport,
    P: L402Payer,
{
    /// Creates a client with an in-memory credential cache and no limits.
    pub fn new(transport: T, payer: P) -> Self {
        Self {
            transport,
            payer,
            store: Arc::new(MemoryTokenStore::new()),
            budget: BudgetTracker::new(BudgetConfig::unlimited()),
            max_per_request: None,
            clock: Arc::new(SystemClock),
            gates: PaymentGates::default(),
        }
    }

    /// Creates a client from configuration.
    pub fn from_config(transport: T, payer: P, config: &ClientConfig) -> Self {
        let client = Self::new(transport, payer).with_budget(config.budget);
        let client = match config.cache {
            CacheMode::Memory => client,
            CacheMode::Disabled => client.with_store(NoopTokenStore),
        };
        match config.max_per_request {
            Some(max) => client.with_max_per_request(max),
            None => client,
        }
    }

    /// Replaces the credential store.
    pub fn with_store(mut self, store: impl TokenStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Refuses any single payment above `max` satoshis.
    pub fn with_max_per_request(mut self, max: u64) -> Self {
        self.max_per_request = Some(max);
        self
    }

    /// Replaces the budget. Spend recorded so far is discarded.
    pub fn with_budget(mut self, config: BudgetConfig) -> Self {
        self.budget = BudgetTracker::with_clock(config, self.clock.clone());
        self
    }

    /// Replaces the clock used for credential expiry and budget periods.
    ///
    /// Rebuilds the budget tracker, so spend recorded so far is discarded.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.budget = BudgetTracker::with_clock(*self.budget.config(), clock.clone());
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn max_per_request(&self) -> Option<u64> {
        self.max_per_request
    }

    /// Sends `request`, paying for access if the server demands it.
    ///
    /// Transport failures are returned unchanged as [`L402Error::Transport`].
    pub async fn request(&self, request: L402Request) -> Result<Response<Bytes>, L402Error> {
        let key = normalize_url(&request.url);

        if let Some(credential) = self.load(&key).await? {
            if !credential.is_expired_at(self.clock.now()) {
                match request.to_http(Some(&credential.authorization)) {
                    Ok(attempt) => {
                        let response = self.dispatch(attempt).await?;
                        if response.status() != StatusCode::PAYMENT_REQUIRED {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(key = %key, "L402 credential cache hit");
                            return Ok(response);
                        }
                        #[cfg(feature = "tracing")]
                        tracing::warn!(key = %key, "Cached L402 credential rejected, evicting");
                    }
                    Err(L402Error::MalformedAuthorization(_)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(key = %key, "Cached L402 credential is unsendable, evicting");
                    }
                    Err(e) => return Err(e),
                }
            }
            self.store.delete(&key).await.map_err(L402Error::Store)?;
        }

        let response = self.send(&request, None).await?;
        if response.status() != StatusCode::PAYMENT_REQUIRED {
            return Ok(response);
        }

        let credential = self.pay(&key, &response).await?;
        let response = self.send(&request, Some(&credential.authorization)).await?;
        if response.status() == StatusCode::PAYMENT_REQUIRED {
            return Err(L402Error::PaymentFailed(
                "server still requires payment after a settled payment".to_string(),
            ));
        }
        Ok(response)
    }

    pub async fn get(&self, url: impl Into<String>) -> Result<Response<Bytes>, L402Error> {
        self.request(L402Request::get(url)).await
    }

    /// `GET`s `url` and deserializes the response body.
    pub async fn get_json<R: DeserializeOwned>(
        &self,
        url: impl Into<String>,
    ) -> Result<R, L402Error> {
        self.request_json(L402Request::get(url)).await
    }

    /// `POST`s `body` as JSON to `url` and deserializes the response body.
    pub async fn post_json<B, R>(&self, url: impl Into<String>, body: &B) -> Result<R, L402Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request_json(L402Request::post(url).json(body)?).await
    }

    pub async fn put_json<B, R>(&self, url: impl Into<String>, body: &B) -> Result<R, L402Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request_json(L402Request::put(url).json(body)?).await
    }

    pub async fn patch_json<B, R>(&self, url: impl Into<String>, body: &B) -> Result<R, L402Error>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.request_json(L402Request::patch(url).json(body)?).await
    }

    pub async fn delete_json<R: DeserializeOwned>(
        &self,
        url: impl Into<String>,
    ) -> Result<R, L402Error> {
        self.request_json(L402Request::delete(url)).await
    }

    async fn request_json<R: DeserializeOwned>(
        &self,
        request: L402Request,
    ) -> Result<R, L402Error> {
        let response = self.request(request).await?;
        Ok(serde_json::from_slice(response.body())?)
    }

    async fn send(
        &self,
        request: &L402Request,
        authorization: Option<&str>,
    ) -> Result<Response<Bytes>, L402Error> {
        self.dispatch(request.to_http(authorization)?).await
    }

    async fn dispatch(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<Response<Bytes>, L402Error> {
        self.transport
            .send(request)
            .await
            .map_err(L402Error::Transport)
    }

    async fn load(&self, key: &str) -> Result<Option<Credential>, L402Error> {
        self.store.get(key).await.map_err(L402Error::Store)
    }

    /// Pays the challenge carried by a 402 response and caches the result.
    async fn pay(&self, key: &str, response: &Response<Bytes>) -> Result<Credential, L402Error> {
        let raw_challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .ok_or(L402Error::MissingChallenge)?
            .to_str()
            .map_err(|e| L402Error::MalformedChallenge(e.to_string()))?;
        let challenge = header::parse_challenge(raw_challenge)
            .ok_or_else(|| L402Error::MalformedChallenge(raw_challenge.to_string()))?;

        let hint = PriceHint::from_body(response.body());
        if let Some(max) = self.max_per_request {
            if hint.price > max {
                return Err(BudgetError::PerRequestLimit {
                    price: hint.price,
                    max,
                }
                .into());
            }
        }

        let gate = self.gates.acquire(key).await;
        if gate.waited() {
            if let Some(credential) = self.load(key).await? {
                if !credential.is_expired_at(self.clock.now()) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key = %key, "Reusing L402 credential paid concurrently");
                    return Ok(credential);
                }
            }
        }

        let reservation = self.budget.reserve(hint.price)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, price = hint.price, "Paying L402 challenge");

        let result = self
            .payer
            .pay(raw_challenge)
            .await
            .map_err(|e| L402Error::PaymentFailed(e.to_string()))?;
        let amount = result.amount.unwrap_or(hint.price);
        // Settled money counts even if the result turns out unusable.
        if result.status == PaymentStatus::Settled {
            reservation.commit(amount);
        }
        #[cfg(feature = "tracing")]
        let payment_hash = result.payment_hash.clone();
        let credential = settle(result, &challenge)?
            .with_paid_at(self.clock.now())
            .with_expires_at(hint.expires_at);

        self.store
            .set(key, credential.clone())
            .await
            .map_err(L402Error::Store)?;

        #[cfg(feature = "tracing")]
        tracing::info!(key = %key, amount, payment_hash = ?payment_hash, "L402 payment settled");

        Ok(credential)
    }
}

/// Turns a payer's result into a credential.
///
/// Only a settled result that carries an `L402` authorization value, which is
/// also a valid header value, is usable.
fn settle(result: PaymentResult, challenge: &Challenge) -> Result<Credential, L402Error> {
    if result.status != PaymentStatus::Settled {
        let reason = result
            .error
            .unwrap_or_else(|| format!("payer reported status {}", result.status));
        return Err(L402Error::PaymentFailed(reason));
    }

    let authorization = result
        .authorization
        .filter(|authorization| !authorization.is_empty())
        .ok_or_else(|| {
            L402Error::PaymentFailed("payment settled without an authorization value".to_string())
        })?;
    if !header::has_l402_scheme(&authorization) || HeaderValue::from_str(&authorization).is_err()
    {
        return Err(L402Error::MalformedAuthorization(authorization));
    }

    let decoded = header::parse_authorization(&authorization);
    let macaroon = result
        .macaroon
        .or_else(|| decoded.as_ref().map(|parts| parts.macaroon.clone()))
        .unwrap_or_else(|| challenge.macaroon.clone());
    let preimage = result
        .preimage
        .or_else(|| decoded.map(|parts| parts.preimage))
        .unwrap_or_default();

    Ok(Credential::new(macaroon, preimage).with_authorization(authorization))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ManualClock;
    use crate::provider::ProviderError;
    use crate::types::{BoxError, ErrorKind};
    use async_trait::async_trait;
    use http::Request;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CHALLENGE: &str = r#"L402 macaroon="mac", invoice="lnbc100n1""#;
    const URL: &str = "https://api.example.com/paid";

    /// Serves 200 to accepted credentials and a 402 challenge to everything else.
    struct MockServer {
        price: serde_json::Value,
        challenge: Option<&'static str>,
        expires_at: Option<serde_json::Value>,
        accepted: parking_lot::Mutex<HashSet<String>>,
        requests: AtomicUsize,
    }

    impl MockServer {
        fn new(price: u64) -> Self {
            Self {
                price: price.into(),
                challenge: Some(CHALLENGE),
                expires_at: None,
                accepted: parking_lot::Mutex::new(HashSet::from(["L402 mac:pre".to_string()])),
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for MockServer {
        async fn send(&self, request: Request<Bytes>) -> Result<Response<Bytes>, BoxError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let authorized = request
                .headers()
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| self.accepted.lock().contains(v));
            if authorized {
                return Ok(Response::builder()
                    .status(200)
                    .body(Bytes::from_static(br#"{"secret": 42}"#))?);
            }

            let mut builder = Response::builder().status(402);
            if let Some(challenge) = self.challenge {
                builder = builder.header(WWW_AUTHENTICATE, challenge);
            }
            let mut body = serde_json::json!({"price": self.price, "unit": "sats"});
            if let Some(expires_at) = &self.expires_at {
                body["expiresAt"] = expires_at.clone();
            }
            Ok(builder.body(Bytes::from(body.to_string()))?)
        }
    }

    struct MockPayer {
        result: Result<PaymentResult, String>,
        calls: AtomicUsize,
        /// When set, the first call blocks until notified.
        hold_first: Option<tokio::sync::Notify>,
    }

    impl MockPayer {
        fn settled() -> Self {
            Self::returning(PaymentResult::settled("L402 mac:pre").with_amount(10))
        }

        fn returning(result: PaymentResult) -> Self {
            Self {
                result: Ok(result),
                calls: AtomicUsize::new(0),
                hold_first: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl L402Payer for MockPayer {
        async fn pay(&self, challenge: &str) -> Result<PaymentResult, ProviderError> {
            assert_eq!(challenge, CHALLENGE);
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let (0, Some(hold)) = (call, &self.hold_first) {
                hold.notified().await;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.result.clone().map_err(ProviderError::Connection)
        }
    }

    fn client(
        server: MockServer,
        payer: MockPayer,
    ) -> (L402Client<Arc<MockServer>, Arc<MockPayer>>, Arc<MockServer>, Arc<MockPayer>) {
        let server = Arc::new(server);
        let payer = Arc::new(payer);
        (L402Client::new(server.clone(), payer.clone()), server, payer)
    }

    #[tokio::test]
    async fn test_pays_and_retries() {
        let (client, server, payer) = client(MockServer::new(10), MockPayer::settled());
        let response = client.get(URL).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(payer.calls(), 1);
        assert_eq!(server.requests.load(Ordering::SeqCst), 2);
        assert_eq!(client.budget().spent(), 10);

        let stored = client.store().get(URL).await.unwrap().unwrap();
        assert_eq!(stored.macaroon, "mac");
        assert_eq!(stored.preimage, "pre");
        assert_eq!(stored.authorization, "L402 mac:pre");
    }

    #[tokio::test]
    async fn test_cache_hit_skips_payment() {
        let (client, server, payer) = client(MockServer::new(10), MockPayer::settled());
        client.get(URL).await.unwrap();
        let response = client.get(format!("{URL}/?page=2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(payer.calls(), 1);
        assert_eq!(server.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_402_passes_through_without_payment() {
        let payer = Arc::new(MockPayer::settled());
        let transport = FnTransport(|_request: Request<Bytes>| async move {
            Ok::<_, BoxError>(Response::builder().status(404).body(Bytes::new())?)
        });
        let client = L402Client::new(transport, payer.clone());
        let response = client.get(URL).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(payer.calls(), 0);
    }

    #[tokio::test]
    async fn test_stale_credential_is_replaced() {
        let (client, _, payer) = client(MockServer::new(10), MockPayer::settled());
        client
            .store()
            .set(URL, Credential::new("old", "revoked"))
            .await
            .unwrap();

        let response = client.get(URL).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(payer.calls(), 1);
        let stored = client.store().get(URL).await.unwrap().unwrap();
        assert_eq!(stored.authorization, "L402 mac:pre");
    }

    #[tokio::test]
    async fn test_expired_credential_is_not_sent() {
        let clock = ManualClock::default();
        let (client, server, payer) = client(MockServer::new(10), MockPayer::settled());
        let client = client.with_clock(Arc::new(clock.clone()));
        let expired = Credential::new("mac", "pre").with_expires_at(Some(clock.now()));
        client.store().set(URL, expired).await.unwrap();

        client.get(URL).await.unwrap();
        // Bare request, then paid retry; the expired credential never went out
        assert_eq!(server.requests.load(Ordering::SeqCst), 2);
        assert_eq!(payer.calls(), 1);
    }

    #[tokio::test]
    async fn test_per_request_ceiling() {
        let (client, _, payer) = client(MockServer::new(101), MockPayer::settled());
        let client = client.with_max_per_request(100).with_budget(BudgetConfig::total(1_000));
        let err = client.get(URL).await.unwrap_err();
        assert!(matches!(
            err,
            L402Error::Budget(BudgetError::PerRequestLimit { price: 101, max: 100 })
        ));
        assert_eq!(payer.calls(), 0);
        assert_eq!(client.budget().spent(), 0);
    }

    #[tokio::test]
    async fn test_budget_checked_before_payer() {
        let (client, _, payer) = client(MockServer::new(60), MockPayer::settled());
        let client = client
            .with_budget(BudgetConfig::total(100))
            .with_store(NoopTokenStore);
        client.budget().record(60);
        let err = client.get(URL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Budget);
        assert_eq!(payer.calls(), 0);
    }

    #[tokio::test]
    async fn test_amount_falls_back_to_price_hint() {
        let payer = MockPayer::returning(PaymentResult::settled("L402 mac:pre"));
        let (client, _, _) = client(MockServer::new(25), payer);
        client.get(URL).await.unwrap();
        assert_eq!(client.budget().spent(), 25);
    }

    #[tokio::test]
    async fn test_string_price_and_reported_amount() {
        let mut server = MockServer::new(0);
        server.price = "7".into();
        let payer = MockPayer::returning(PaymentResult::settled("L402 mac:pre").with_amount(9));
        let (client, _, _) = client(server, payer);
        let client = client.with_max_per_request(7);
        client.get(URL).await.unwrap();
        assert_eq!(client.budget().spent(), 9);
    }

    #[tokio::test]
    async fn test_missing_challenge_is_protocol_error() {
        let mut server = MockServer::new(10);
        server.challenge = None;
        let (client, _, payer) = client(server, MockPayer::settled());
        let err = client.get(URL).await.unwrap_err();
        assert!(matches!(err, L402Error::MissingChallenge));
        assert_eq!(payer.calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_challenge_is_protocol_error() {
        let mut server = MockServer::new(10);
        server.challenge = Some(r#"L402 macaroon="mac""#);
        let (client, _, payer) = client(server, MockPayer::settled());
        let err = client.get(URL).await.unwrap_err();
        assert!(matches!(err, L402Error::MalformedChallenge(_)));
        assert_eq!(payer.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_status_is_payment_error() {
        let payer = MockPayer::returning(PaymentResult::failed("no route"));
        let (client, _, _) = client(MockServer::new(10), payer);
        let err = client.get(URL).await.unwrap_err();
        assert!(err.is_payment());
        assert!(err.to_string().contains("no route"));
        assert_eq!(client.budget().spent(), 0);
    }

    #[tokio::test]
    async fn test_settled_without_authorization_is_payment_error() {
        let mut result = PaymentResult::settled("");
        result.authorization = None;
        let (client, _, _) = client(MockServer::new(10), MockPayer::returning(result));
        let err = client.get(URL).await.unwrap_err();
        assert!(err.is_payment());
        assert!(client.store().get(URL).await.unwrap().is_none());
        assert_eq!(client.budget().spent(), 10);
    }

    #[tokio::test]
    async fn test_unusable_settlements_still_exhaust_budget() {
        let mut result = PaymentResult::settled("").with_amount(10);
        result.authorization = None;
        let (client, _, payer) = client(MockServer::new(10), MockPayer::returning(result));
        let client = client.with_budget(BudgetConfig::total(25));

        assert!(client.get(URL).await.unwrap_err().is_payment());
        assert!(client.get(URL).await.unwrap_err().is_payment());
        let err = client.get(URL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Budget);
        assert_eq!(payer.calls(), 2);
        assert_eq!(client.budget().spent(), 20);
    }

    #[tokio::test]
    async fn test_unsendable_authorization_is_not_cached() {
        let payer = MockPayer::returning(PaymentResult::settled("L402 mac:pre\n").with_amount(10));
        let (client, server, payer) = client(MockServer::new(10), payer);
        let err = client.get(URL).await.unwrap_err();
        assert!(matches!(err, L402Error::MalformedAuthorization(_)));
        assert!(client.store().get(URL).await.unwrap().is_none());
        assert_eq!(client.budget().spent(), 10);
        assert_eq!(payer.calls(), 1);
        assert_eq!(server.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsendable_cached_credential_is_evicted() {
        let (client, server, payer) = client(MockServer::new(10), MockPayer::settled());
        let broken = Credential::new("mac", "pre").with_authorization("L402 mac:pre\n");
        client.store().set(URL, broken).await.unwrap();

        let response = client.get(URL).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(payer.calls(), 1);
        // The broken credential never reached the server
        assert_eq!(server.requests.load(Ordering::SeqCst), 2);
        let stored = client.store().get(URL).await.unwrap().unwrap();
        assert_eq!(stored.authorization, "L402 mac:pre");
    }

    #[tokio::test]
    async fn test_expiry_from_402_body_is_stored() {
        let mut server = MockServer::new(10);
        server.expires_at = Some("2030-01-01T00:00:00Z".into());
        let (client, _, _) = client(server, MockPayer::settled());
        client.get(URL).await.unwrap();

        let stored = client.store().get(URL).await.unwrap().unwrap();
        assert_eq!(
            stored.expires_at.unwrap().to_rfc3339(),
            "2030-01-01T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_payer_error_is_payment_error() {
        let payer = MockPayer {
            result: Err("wallet offline".to_string()),
            calls: AtomicUsize::new(0),
            hold_first: None,
        };
        let (client, _, _) = client(MockServer::new(10), payer);
        let err = client.get(URL).await.unwrap_err();
        assert!(err.is_payment());
    }

    #[tokio::test]
    async fn test_retry_still_402_fails_without_looping() {
        let payer = MockPayer::returning(PaymentResult::settled("L402 other:pre"));
        let (client, server, payer) = client(MockServer::new(10), payer);
        let err = client.get(URL).await.unwrap_err();
        assert!(err.is_payment());
        assert_eq!(payer.calls(), 1);
        assert_eq!(server.requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_transport_error_passes_through() {
        let transport = FnTransport(|_request: Request<Bytes>| async move {
            Err::<Response<Bytes>, BoxError>("connection refused".into())
        });
        let client = L402Client::new(transport, MockPayer::settled());
        let err = client.get(URL).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn test_concurrent_requests_pay_once() {
        let (client, _, payer) = client(MockServer::new(10), MockPayer::settled());
        let (a, b) = tokio::join!(client.get(URL), client.get(URL));
        assert_eq!(a.unwrap().status(), StatusCode::OK);
        assert_eq!(b.unwrap().status(), StatusCode::OK);
        assert_eq!(payer.calls(), 1);
        assert_eq!(client.budget().spent(), 10);
        assert_eq!(client.gates.len(), 0);
    }

    #[tokio::test]
    async fn test_slow_payment_does_not_block_other_urls() {
        let mut payer = MockPayer::settled();
        payer.hold_first = Some(tokio::sync::Notify::new());
        let (client, _, payer) = client(MockServer::new(10), payer);

        let slow = client.get(URL);
        let fast = async {
            let response = client.get(format!("{URL}/other")).await;
            if let Some(hold) = &payer.hold_first {
                hold.notify_one();
            }
            response
        };
        let (slow, fast) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            async { tokio::join!(slow, fast) },
        )
        .await
        .expect("a held payment blocked another URL");
        assert_eq!(slow.unwrap().status(), StatusCode::OK);
        assert_eq!(fast.unwrap().status(), StatusCode::OK);
        assert_eq!(payer.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_payments_share_budget() {
        let (client, _, payer) = client(MockServer::new(10), MockPayer::settled());
        let client = client.with_budget(BudgetConfig::total(15));
        let other = format!("{URL}/other");
        let (a, b) = tokio::join!(client.get(URL), client.get(other.as_str()));
        let failures = [a, b]
            .into_iter()
            .filter_map(Result::err)
            .map(|e| e.kind())
            .collect::<Vec<_>>();
        assert_eq!(failures, vec![ErrorKind::Budget]);
        assert_eq!(payer.calls(), 1);
        assert_eq!(client.budget().spent(), 10);
    }

    #[tokio::test]
    async fn test_get_json() {
        let (client, _, _) = client(MockServer::new(10), MockPayer::settled());
        let value: serde_json::Value = client.get_json(URL).await.unwrap();
        assert_eq!(value["secret"], 42);
    }

    #[tokio::test]
    async fn test_from_config_disabled_cache_pays_every_time() {
        let server = Arc::new(MockServer::new(10));
        let payer = Arc::new(MockPayer::settled());
        let config = ClientConfig {
            max_per_request: Some(50),
            budget: BudgetConfig::total(100),
            cache: CacheMode::Disabled,
        };
        let client = L402Client::from_config(server, payer.clone(), &config);
        assert_eq!(client.max_per_request(), Some(50));
        client.get(URL).await.unwrap();
        client.get(URL).await.unwrap();
        assert_eq!(payer.calls(), 2);
        assert_eq!(client.budget().remaining(), Some(80));
    }

    #[test]
    fn test_settle_prefers_explicit_parts() {
        let challenge = Challenge {
            macaroon: "from-challenge".to_string(),
            invoice: "lnbc1".to_string(),
        };
        let result = PaymentResult::settled("L402 a:b:c").with_parts("m", "p");
        let credential = settle(result, &challenge).unwrap();
        assert_eq!(credential.macaroon, "m");
        assert_eq!(credential.preimage, "p");
        assert_eq!(credential.authorization, "L402 a:b:c");

        let credential = settle(PaymentResult::settled("L402 a:b:c"), &challenge).unwrap();
        assert_eq!(credential.macaroon, "a:b");
        assert_eq!(credential.preimage, "c");
    }

    #[test]
    fn test_settle_falls_back_to_challenge_macaroon() {
        let challenge = Challenge {
            macaroon: "from-challenge".to_string(),
            invoice: "lnbc1".to_string(),
        };
        let credential = settle(PaymentResult::settled("L402 opaque"), &challenge).unwrap();
        assert_eq!(credential.macaroon, "from-challenge");
        assert_eq!(credential.preimage, "");
        assert_eq!(credential.authorization, "L402 opaque");

        let err = settle(PaymentResult::settled("Bearer x"), &challenge).unwrap_err();
        assert!(matches!(err, L402Error::MalformedAuthorization(_)));

        let mut pending = PaymentResult::settled("L402 m:p");
        pending.status = PaymentStatus::Pending;
        assert!(settle(pending, &challenge).unwrap_err().is_payment());
    }
}
