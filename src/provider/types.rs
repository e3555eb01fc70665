//! Request and response types exchanged with an external payment provider.
//!
//! Field names follow the provider's JSON contract (camelCase).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parameters for minting a new challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    /// Price in satoshis.
    pub amount: u64,
    pub description: String,
    /// Seconds until the invoice and macaroon expire.
    pub expiry_secs: u64,
    /// First-party caveats to bake into the macaroon.
    #[serde(default)]
    pub caveats: Vec<String>,
}

/// A freshly minted challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintedChallenge {
    pub macaroon: String,
    /// BOLT11 invoice the client must pay.
    pub invoice: String,
    pub payment_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Ready-to-send `WWW-Authenticate` value.
    pub www_authenticate: String,
}

/// Outcome of verifying a presented credential.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    #[serde(default)]
    pub caveats: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    pub fn valid(payment_hash: impl Into<String>, caveats: Vec<String>) -> Self {
        Self {
            valid: true,
            payment_hash: Some(payment_hash.into()),
            caveats,
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            payment_hash: None,
            caveats: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Settlement status reported by a payer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Settled,
    Pending,
    Failed,
    /// Any status this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Settled => write!(f, "settled"),
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Failed => write!(f, "failed"),
            PaymentStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Outcome of paying a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub status: PaymentStatus,
    /// Ready-to-send `Authorization` value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macaroon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_hash: Option<String>,
    /// Amount actually charged, in satoshis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// Routing fee, in satoshis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PaymentResult {
    /// A settled payment carrying the given authorization value.
    pub fn settled(authorization: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Settled,
            authorization: Some(authorization.into()),
            macaroon: None,
            preimage: None,
            payment_hash: None,
            amount: None,
            fee: None,
            error: None,
        }
    }

    /// A failed payment.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Failed,
            authorization: None,
            macaroon: None,
            preimage: None,
            payment_hash: None,
            amount: None,
            fee: None,
            error: Some(error.into()),
        }
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_payment_hash(mut self, payment_hash: impl Into<String>) -> Self {
        self.payment_hash = Some(payment_hash.into());
        self
    }

    pub fn with_parts(mut self, macaroon: impl Into<String>, preimage: impl Into<String>) -> Self {
        self.macaroon = Some(macaroon.into());
        self.preimage = Some(preimage.into());
        self
    }
}
