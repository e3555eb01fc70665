//! Configuration types for connecting to a remote payment provider.

use serde::{Deserialize, Serialize};

/// Configuration for a JSON-over-HTTP payment provider.
///
/// Used to initialize a [`RemoteProvider`](super::RemoteProvider) with the
/// `reqwest` feature enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProviderConfig {
    /// Base URL of the provider API, e.g. `https://pay.example.com/v1/`.
    pub base_url: String,
    /// Bearer token sent with every request, if the provider requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}
