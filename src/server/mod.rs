//! The charging side of L402.
//!
//! [`Paywall`] sits in front of a protected handler. It is framework
//! agnostic: it works on `http::Request` / `http::Response` and can be wired
//! into any server that speaks those types.
//!
//! # Gate Flow
//!
//! 1. If the request carries `Authorization: L402 ...`, ask the
//!    [`L402Issuer`] to verify it.
//! 2. A valid credential attaches an [`L402Payment`] extension to the request
//!    and lets it through.
//! 3. Otherwise (no credential, an invalid one, or a verifier error) resolve
//!    the [`Pricing`], mint a challenge, and answer `402 Payment Required`.
//!
//! Verification failures are never reported to the caller as such; they look
//! exactly like a request that presented no credential.
//!
//! # Example
//!
//! ```ignore
//! use l402_kit::server::{Paywall, PaywallConfig, Pricing};
//!
//! let paywall = Paywall::new(issuer, Pricing::Fixed(10))
//!     .with_config(PaywallConfig::new("Premium market data"));
//!
//! let response = paywall
//!     .handle(request, |request| async move {
//!         let payment = request.extensions().get::<L402Payment>().cloned();
//!         Response::new(Bytes::from_static(b"paid content"))
//!     })
//!     .await?;
//! ```

pub mod pricing;
pub use pricing::*;

use std::future::Future;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::header::{self, AUTHORIZATION, WWW_AUTHENTICATE};
use crate::provider::{ChallengeRequest, L402Issuer, MintedChallenge, ProviderError};
use crate::types::{DEFAULT_UNIT, PaymentRequiredBody, WireTimestamp};

/// Default lifetime of a minted challenge, in seconds.
pub const DEFAULT_EXPIRY_SECS: u64 = 3600;

fn default_expiry_secs() -> u64 {
    DEFAULT_EXPIRY_SECS
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

/// What the paywall puts into each challenge it mints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallConfig {
    /// Human-readable description of the resource, shown on the invoice.
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_expiry_secs")]
    pub expiry_secs: u64,
    /// First-party caveats baked into every macaroon.
    #[serde(default)]
    pub caveats: Vec<String>,
    /// Unit label emitted in the 402 body.
    #[serde(default = "default_unit")]
    pub unit: String,
}

impl PaywallConfig {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_expiry_secs(mut self, expiry_secs: u64) -> Self {
        self.expiry_secs = expiry_secs;
        self
    }

    pub fn with_caveat(mut self, caveat: impl Into<String>) -> Self {
        self.caveats.push(caveat.into());
        self
    }
}

impl Default for PaywallConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            expiry_secs: DEFAULT_EXPIRY_SECS,
            caveats: Vec::new(),
            unit: default_unit(),
        }
    }
}

/// Request extension attached to requests that presented a valid credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L402Payment {
    pub payment_hash: Option<String>,
    pub caveats: Vec<String>,
}

/// A `402 Payment Required` answer ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequiredResponse {
    /// `WWW-Authenticate` header value.
    pub www_authenticate: String,
    pub body: PaymentRequiredBody,
}

impl PaymentRequiredResponse {
    pub fn status(&self) -> StatusCode {
        StatusCode::PAYMENT_REQUIRED
    }

    /// Renders the status, challenge header, and JSON body.
    pub fn into_response(self) -> Result<Response<Bytes>, PaywallError> {
        let body =
            serde_json::to_vec(&self.body).map_err(|e| PaywallError::Encode(e.to_string()))?;
        let challenge = HeaderValue::from_str(&self.www_authenticate)
            .map_err(|e| PaywallError::Encode(format!("Invalid challenge header: {e}")))?;

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = self.status();
        response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(response)
    }
}

/// Outcome of running a request through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The credential checked out; call the protected handler.
    Proceed,
    PaymentRequired(PaymentRequiredResponse),
}

/// Failures that belong on the host framework's error path.
#[derive(Debug, thiserror::Error)]
pub enum PaywallError {
    #[error("Failed to mint L402 challenge: {0}")]
    Mint(#[source] ProviderError),

    #[error("Failed to encode payment-required response: {0}")]
    Encode(String),
}

/// Gate that admits paid requests and challenges everything else.
#[derive(Debug, Clone)]
pub struct Paywall<I> {
    issuer: I,
    pricing: Pricing,
    config: PaywallConfig,
}

impl<I: L402Issuer> Paywall<I> {
    pub fn new(issuer: I, pricing: Pricing) -> Self {
        Self {
            issuer,
            pricing,
            config: PaywallConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PaywallConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PaywallConfig {
        &self.config
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    /// Runs the gate and, if it passes, the handler.
    ///
    /// The handler receives the request with the [`L402Payment`] extension
    /// attached.
    pub async fn handle<B, Res, F, Fut>(
        &self,
        mut request: Request<B>,
        handler: F,
    ) -> Result<Response<Res>, PaywallError>
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Response<Res>>,
        Res: From<Bytes>,
    {
        match self.process(&mut request).await? {
            GateDecision::Proceed => Ok(handler(request).await),
            GateDecision::PaymentRequired(required) => {
                Ok(required.into_response()?.map(Res::from))
            }
        }
    }

    /// Runs the gate without calling a handler.
    ///
    /// On [`GateDecision::Proceed`] the [`L402Payment`] extension has already
    /// been inserted into `request`.
    pub async fn process<B>(&self, request: &mut Request<B>) -> Result<GateDecision, PaywallError> {
        if let Some(payment) = self.verify(request.headers()).await {
            request.extensions_mut().insert(payment);
            return Ok(GateDecision::Proceed);
        }

        let price = self
            .pricing
            .resolve(&PriceContext::from_request(request))
            .await;
        let minted = self
            .issuer
            .create_challenge(ChallengeRequest {
                amount: price,
                description: self.config.description.clone(),
                expiry_secs: self.config.expiry_secs,
                caveats: self.config.caveats.clone(),
            })
            .await
            .map_err(PaywallError::Mint)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            price,
            payment_hash = %minted.payment_hash,
            "Issued L402 challenge"
        );

        Ok(GateDecision::PaymentRequired(self.payment_required(minted, price)))
    }

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    async fn verify(&self, headers: &HeaderMap) -> Option<L402Payment> {
        let authorization = headers.get(AUTHORIZATION)?.to_str().ok()?;
        if !header::has_l402_scheme(authorization) {
            return None;
        }

        match self.issuer.verify(authorization).await {
            Ok(verified) if verified.valid => Some(L402Payment {
                payment_hash: verified.payment_hash,
                caveats: verified.caveats,
            }),
            Ok(verified) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = ?verified.error, "L402 credential rejected");
                None
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "L402 verification failed");
                None
            }
        }
    }

    fn payment_required(&self, minted: MintedChallenge, price: u64) -> PaymentRequiredResponse {
        let www_authenticate = if minted.www_authenticate.is_empty() {
            header::format_challenge(&minted.macaroon, &minted.invoice)
        } else {
            minted.www_authenticate
        };
        PaymentRequiredResponse {
            www_authenticate,
            body: PaymentRequiredBody {
                invoice: minted.invoice,
                macaroon: minted.macaroon,
                price,
                unit: self.config.unit.clone(),
                description: self.config.description.clone(),
                expires_at: minted.expires_at.map(WireTimestamp::from),
            },
        }
    }
}
