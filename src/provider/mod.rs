//! External payment provider interface.
//!
//! Macaroon minting, invoice creation, Lightning payment, and preimage
//! verification all live behind these traits:
//!
//! - [`L402Payer`] - used by the client to pay a challenge
//! - [`L402Issuer`] - used by the paywall to mint challenges and verify credentials
//!
//! With the `reqwest` feature, [`RemoteProvider`] implements both over a JSON
//! HTTP API.

pub mod types;
pub use types::*;

pub mod config;
pub use config::*;

#[cfg(feature = "reqwest")]
pub mod remote;
#[cfg(feature = "reqwest")]
pub use remote::*;

use std::sync::Arc;

use async_trait::async_trait;

/// Pays L402 challenges on behalf of the client.
#[async_trait]
pub trait L402Payer: Send + Sync {
    /// Pays the challenge carried by a raw `WWW-Authenticate` header value.
    async fn pay(&self, challenge: &str) -> Result<PaymentResult, ProviderError>;
}

/// Mints challenges and verifies credentials on behalf of the paywall.
#[async_trait]
pub trait L402Issuer: Send + Sync {
    async fn create_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<MintedChallenge, ProviderError>;

    /// Verifies a raw `Authorization` header value.
    async fn verify(&self, authorization: &str) -> Result<VerifyResult, ProviderError>;
}

#[async_trait]
impl<T: L402Payer + ?Sized> L402Payer for Arc<T> {
    async fn pay(&self, challenge: &str) -> Result<PaymentResult, ProviderError> {
        (**self).pay(challenge).await
    }
}

#[async_trait]
impl<T: L402Issuer + ?Sized> L402Issuer for Arc<T> {
    async fn create_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<MintedChallenge, ProviderError> {
        (**self).create_challenge(request).await
    }

    async fn verify(&self, authorization: &str) -> Result<VerifyResult, ProviderError> {
        (**self).verify(authorization).await
    }
}

/// Errors that can occur while talking to a payment provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Failed to reach the provider.
    #[error("Provider connection error: {0}")]
    Connection(String),

    /// The provider answered with an error status.
    #[error("Provider rejected request: {0}")]
    Rejected(String),

    /// The provider's response could not be decoded.
    #[error("Provider response decode error: {0}")]
    Decode(String),

    /// Any other provider-specific failure.
    #[error("Provider error: {0}")]
    Other(String),
}
