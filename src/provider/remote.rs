//! Payment provider reached over a JSON HTTP API.
//!
//! | Method | Path         | Request              | Response            |
//! |--------|--------------|----------------------|---------------------|
//! | POST   | `challenge`  | [`ChallengeRequest`] | [`MintedChallenge`] |
//! | POST   | `verify`     | `{ authorization }`  | [`VerifyResult`]    |
//! | POST   | `pay`        | `{ challenge }`      | [`PaymentResult`]   |
//!
//! Paths are resolved relative to the configured base URL.

use async_trait::async_trait;
use http::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::{
    ChallengeRequest, L402Issuer, L402Payer, MintedChallenge, PaymentResult, ProviderError,
    RemoteProviderConfig, VerifyResult,
};

/// A payment provider client that communicates over HTTP.
///
/// # Example
///
/// ```ignore
/// use l402_kit::provider::{RemoteProvider, RemoteProviderConfig};
///
/// let provider = RemoteProvider::from_config(&RemoteProviderConfig {
///     base_url: "https://pay.example.com/v1/".to_string(),
///     api_key: Some("secret".to_string()),
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct RemoteProvider {
    base_url: Url,
    client: reqwest::Client,
    headers: HeaderMap,
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    authorization: &'a str,
}

#[derive(Serialize)]
struct PayBody<'a> {
    challenge: &'a str,
}

impl RemoteProvider {
    /// Creates a provider rooted at `base_url`.
    ///
    /// A trailing slash is added to the path if missing so that endpoint
    /// paths resolve beneath it.
    pub fn new(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Creates a provider from configuration.
    pub fn from_config(config: &RemoteProviderConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ProviderError::Other(format!("Invalid base URL: {e}")))?;
        let mut provider = Self::new(base_url);
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ProviderError::Other(format!("Invalid API key: {e}")))?;
            provider.headers.insert(http::header::AUTHORIZATION, value);
        }
        Ok(provider)
    }

    /// Uses a preconfigured `reqwest` client (timeouts, proxies, TLS).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Adds a header sent with every provider request.
    pub fn with_header(mut self, name: http::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post_json<Req, Res>(&self, path: &str, body: &Req) -> Result<Res, ProviderError>
    where
        Req: Serialize + ?Sized,
        Res: DeserializeOwned,
    {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ProviderError::Other(format!("Invalid endpoint {path}: {e}")))?;

        let response = self
            .client
            .post(url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected(format!("{status}: {text}")));
        }

        response
            .json::<Res>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

#[async_trait]
impl L402Payer for RemoteProvider {
    async fn pay(&self, challenge: &str) -> Result<PaymentResult, ProviderError> {
        self.post_json("pay", &PayBody { challenge }).await
    }
}

#[async_trait]
impl L402Issuer for RemoteProvider {
    async fn create_challenge(
        &self,
        request: ChallengeRequest,
    ) -> Result<MintedChallenge, ProviderError> {
        self.post_json("challenge", &request).await
    }

    async fn verify(&self, authorization: &str) -> Result<VerifyResult, ProviderError> {
        self.post_json("verify", &VerifyBody { authorization }).await
    }
}
