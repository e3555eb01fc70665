//! Credential caching for the paying client.
//!
//! The client only talks to storage through [`TokenStore`], so any backend
//! (a file, a database, a keychain) can be dropped in. Two stores ship with
//! the crate:
//!
//! - [`MemoryTokenStore`] - process-lifetime map, no eviction
//! - [`NoopTokenStore`] - never remembers anything, forcing a payment per call
//!
//! Keys are produced by [`normalize_url`], which drops the query string,
//! fragment, and trailing slashes so that `https://api.example.com/data/?page=2`
//! and `https://api.example.com/data` share one credential.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use crate::types::{BoxError, Credential};

/// Storage backend for paid credentials, keyed by normalized URL.
///
/// Writes are last-write-wins.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Credential>, BoxError>;

    async fn set(&self, key: &str, credential: Credential) -> Result<(), BoxError>;

    async fn delete(&self, key: &str) -> Result<(), BoxError>;
}

#[async_trait]
impl<T: TokenStore + ?Sized> TokenStore for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<Credential>, BoxError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, credential: Credential) -> Result<(), BoxError> {
        (**self).set(key, credential).await
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        (**self).delete(key).await
    }
}

/// Derives the store key for a request URL.
///
/// Strips the query string, the fragment, and any trailing slashes. Inputs
/// that are not absolute URLs are trimmed textually the same way.
pub fn normalize_url(input: &str) -> String {
    match Url::parse(input) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => {
            let end = input.find(['?', '#']).unwrap_or(input.len());
            input[..end].trim_end_matches('/').to_string()
        }
    }
}

// ============================================================================
// MemoryTokenStore
// ============================================================================

/// Unbounded in-memory store that lives as long as the process.
///
/// The key space is the set of distinct paid resources, which stays small in
/// practice; total spend is bounded by the budget, not by this cache.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: RwLock<HashMap<String, Credential>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<Credential>, BoxError> {
        Ok(self.inner.read().get(key).cloned())
    }

    async fn set(&self, key: &str, credential: Credential) -> Result<(), BoxError> {
        self.inner.write().insert(key.to_string(), credential);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BoxError> {
        self.inner.write().remove(key);
        Ok(())
    }
}

// ============================================================================
// NoopTokenStore
// ============================================================================

/// Store that caches nothing. Every request that hits a paywall pays.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenStore;

#[async_trait]
impl TokenStore for NoopTokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Credential>, BoxError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _credential: Credential) -> Result<(), BoxError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), BoxError> {
        Ok(())
    }
}
