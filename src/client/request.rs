//! Replayable outbound request.
//!
//! `http::Request` is consumed by sending it, but the client may have to send
//! the same request up to three times (cached credential, bare, paid retry),
//! so it keeps the parts and rebuilds a request for each attempt.

use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request};
use serde::Serialize;

use crate::types::L402Error;

/// Method, URL, headers, and body of a request made through the client.
#[derive(Debug, Clone)]
pub struct L402Request {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl L402Request {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes `value` as the body and sets `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, L402Error> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Builds one attempt, optionally carrying an L402 `Authorization` value.
    ///
    /// A caller-supplied `Authorization` header is replaced when a credential
    /// is attached.
    pub fn to_http(&self, authorization: Option<&str>) -> Result<Request<Bytes>, L402Error> {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.url.as_str())
            .body(self.body.clone())
            .map_err(|e| L402Error::InvalidRequest(e.to_string()))?;
        *request.headers_mut() = self.headers.clone();

        if let Some(authorization) = authorization {
            let value = HeaderValue::from_str(authorization)
                .map_err(|e| L402Error::MalformedAuthorization(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}
