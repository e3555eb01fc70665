//! Shared L402 data types and the crate error taxonomy.
//!
//! - [`Credential`] - a paid, cached L402 token
//! - [`Challenge`] - the parsed `WWW-Authenticate` challenge
//! - [`PaymentRequiredBody`] - the JSON body of a 402 response
//! - [`L402Error`] / [`BudgetError`] - errors surfaced to callers

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::header;

/// Boxed error used for collaborator failures that pass through untouched.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Unit label emitted in payment-required bodies.
pub const DEFAULT_UNIT: &str = "sats";

// ============================================================================
// Credential
// ============================================================================

/// A paid L402 credential.
///
/// Credentials are immutable; a re-payment replaces the stored value rather
/// than mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// The macaroon issued with the challenge.
    pub macaroon: String,
    /// The Lightning payment preimage (proof of payment).
    pub preimage: String,
    /// Ready-to-send `Authorization` header value.
    pub authorization: String,
    /// When the credential was paid for.
    pub paid_at: DateTime<Utc>,
    /// When the credential stops being usable, if the server said so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// Creates a credential whose authorization value is derived from the
    /// macaroon and preimage.
    pub fn new(macaroon: impl Into<String>, preimage: impl Into<String>) -> Self {
        let macaroon = macaroon.into();
        let preimage = preimage.into();
        let authorization = header::format_authorization(&macaroon, &preimage);
        Self {
            macaroon,
            preimage,
            authorization,
            paid_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Replaces the derived authorization value with one supplied verbatim.
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = authorization.into();
        self
    }

    pub fn with_paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
        self.paid_at = paid_at;
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Returns `true` if the credential is past its expiry at `now`.
    ///
    /// A credential without an expiry never expires client-side.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Returns `true` if the credential is past its expiry now.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

// ============================================================================
// Header payloads
// ============================================================================

/// The two halves of an `Authorization: L402 <macaroon>:<preimage>` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationParts {
    pub macaroon: String,
    pub preimage: String,
}

/// A parsed `WWW-Authenticate: L402 ...` challenge.
///
/// Challenges are never persisted; they are consumed to drive one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub macaroon: String,
    pub invoice: String,
}

// ============================================================================
// Payment-required body
// ============================================================================

/// Expiry as it appears on the wire: RFC 3339 text or unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Text(String),
}

impl WireTimestamp {
    /// Converts to a UTC timestamp, or `None` if the value is not a valid time.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

impl From<DateTime<Utc>> for WireTimestamp {
    fn from(value: DateTime<Utc>) -> Self {
        WireTimestamp::Text(value.to_rfc3339())
    }
}

/// JSON body the paywall emits alongside a 402 status.
///
/// Only `price` (and optionally `expiresAt`) is read back by the client; the
/// other fields are descriptive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub invoice: String,
    pub macaroon: String,
    /// Price in satoshis.
    pub price: u64,
    pub unit: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<WireTimestamp>,
}

/// Payment hints a client extracts from a 402 body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceHint {
    /// Advertised price in satoshis, `0` if absent or unparsable.
    pub price: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

impl PriceHint {
    /// Leniently reads `price` and `expiresAt` out of a 402 body.
    ///
    /// Never fails: a body that is not JSON, or a price that is not a
    /// non-negative integer (or a string holding one), yields a zero price.
    pub fn from_body(body: &[u8]) -> Self {
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return Self::default();
        };
        let price = match value.get("price") {
            Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        };
        let expires_at = value
            .get("expiresAt")
            .cloned()
            .and_then(|v| serde_json::from_value::<WireTimestamp>(v).ok())
            .and_then(|ts| ts.to_datetime());
        Self { price, expires_at }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Spending limit violations. Both are raised before the payer is contacted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    /// A single request's price is above the per-request ceiling.
    #[error("Price {price} sats exceeds the per-request maximum of {max} sats")]
    PerRequestLimit { price: u64, max: u64 },

    /// Paying would push cumulative spend past the total limit.
    #[error("Budget exceeded: spent {spent} of {total} sats, attempted {price} sats")]
    TotalLimit { price: u64, spent: u64, total: u64 },
}

/// Coarse classification of [`L402Error`] for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed L402 headers.
    Protocol,
    /// A spending limit would be exceeded.
    Budget,
    /// The payer failed or the paid retry still required payment.
    Payment,
    /// The underlying HTTP call failed.
    Transport,
    /// Store, serialization, or request-construction failures.
    Other,
}

/// Errors returned by the L402 client.
#[derive(Debug, thiserror::Error)]
pub enum L402Error {
    /// A 402 response arrived without a `WWW-Authenticate` header.
    #[error("402 response is missing the WWW-Authenticate header")]
    MissingChallenge,

    /// The `WWW-Authenticate` header could not be parsed.
    #[error("Malformed L402 challenge: {0}")]
    MalformedChallenge(String),

    /// An authorization value returned by the payer could not be decoded.
    #[error("Malformed L402 authorization: {0}")]
    MalformedAuthorization(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),

    /// The payment did not yield a usable credential.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Failure from the HTTP transport, passed through as-is.
    #[error(transparent)]
    Transport(BoxError),

    /// Failure from the token store backend.
    #[error("Token store error: {0}")]
    Store(#[source] BoxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The outgoing request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl L402Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            L402Error::MissingChallenge
            | L402Error::MalformedChallenge(_)
            | L402Error::MalformedAuthorization(_) => ErrorKind::Protocol,
            L402Error::Budget(_) => ErrorKind::Budget,
            L402Error::PaymentFailed(_) => ErrorKind::Payment,
            L402Error::Transport(_) => ErrorKind::Transport,
            L402Error::Store(_) | L402Error::Json(_) | L402Error::InvalidRequest(_) => {
                ErrorKind::Other
            }
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    pub fn is_budget(&self) -> bool {
        self.kind() == ErrorKind::Budget
    }

    pub fn is_payment(&self) -> bool {
        self.kind() == ErrorKind::Payment
    }
}
