//! The outbound request pipeline.
//!
//! An [`Executor`] turns an [`ApiRequest`] into an [`ApiResponse`]. Decorators
//! wrap an executor and are stacked at construction time:
//!
//! ```text
//! RequireStatus( Retry( BearerAuth( HttpTransport ) ) )
//! ```
//!
//! Authentication sits closest to the transport so every retried attempt
//! asks the [`TokenManager`](crate::TokenManager) for a current token.

mod auth;
mod retry;
mod transport;
mod validate;

pub use auth::BearerAuth;
pub use retry::{Backoff, JitterBackoff, Retry, RetryContext, RetryPolicy, StoreRetryPolicy};
pub use transport::{HttpTransport, TransportError};
pub use validate::RequireStatus;

pub(crate) use retry::sleep_or_cancel;

use crate::config::Environment;
use crate::error::Error;
use crate::token::TokenManager;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A request to the App Store Server API.
///
/// Requests are plain data and cheap to clone, so a retried attempt is sent
/// with an identical copy of the original.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers. `Authorization` is added by [`BearerAuth`].
    pub headers: HeaderMap,
    /// Request body, already serialized.
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    /// Creates a request without headers or body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request for `path` under the environment's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `path` does not form a valid URL.
    pub fn get(environment: Environment, path: &str) -> Result<Self, Error> {
        Self::for_path(Method::GET, environment, path)
    }

    /// Creates a `POST` request for `path` under the environment's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `path` does not form a valid URL.
    pub fn post(environment: Environment, path: &str) -> Result<Self, Error> {
        Self::for_path(Method::POST, environment, path)
    }

    /// Creates a `PUT` request for `path` under the environment's base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `path` does not form a valid URL.
    pub fn put(environment: Environment, path: &str) -> Result<Self, Error> {
        Self::for_path(Method::PUT, environment, path)
    }

    fn for_path(method: Method, environment: Environment, path: &str) -> Result<Self, Error> {
        let url = environment.base_url()?.join(path)?;
        Ok(Self::new(method, url))
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Sets a header, replacing any previous value.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serializes `body` as the JSON request body and sets `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RequestEncode`] if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(body).map_err(Error::RequestEncode)?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(bytes);
        Ok(self)
    }

    /// Returns the value of query parameter `key`, if present.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// A response received from the App Store Server API, with its body fully read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Creates a response with no headers.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResponseDecode`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Error::ResponseDecode)
    }
}

/// Sends one request and returns the response.
///
/// Implementations must return [`Error::Cancelled`] promptly once `cancel`
/// fires, abandoning any in-flight work.
pub trait Executor: Send + Sync {
    /// Executes `request`.
    fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ApiResponse, Error>> + Send;
}

impl<E: Executor> Executor for &E {
    fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ApiResponse, Error>> + Send {
        (**self).execute(request, cancel)
    }
}

impl<E: Executor> Executor for Arc<E> {
    fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<ApiResponse, Error>> + Send {
        (**self).execute(request, cancel)
    }
}

/// Combinators available on every [`Executor`].
pub trait ExecutorExt: Executor + Sized {
    /// Executes `request` and decodes the response body as JSON.
    fn execute_json<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<T, Error>> + Send {
        async move { self.execute(request, cancel).await?.json() }
    }

    /// Rejects responses whose status is not in `accepted`.
    fn require_status<I>(self, accepted: I) -> RequireStatus<Self>
    where
        I: IntoIterator<Item = StatusCode>,
    {
        RequireStatus::new(self, accepted)
    }

    /// Retries outcomes selected by `policy`, waiting `backoff` between
    /// attempts, for at most `max_attempts` attempts in total.
    fn with_retry<P, B>(self, policy: P, backoff: B, max_attempts: u32) -> Retry<Self, P, B>
    where
        P: RetryPolicy,
        B: Backoff,
    {
        Retry::new(self, policy, backoff, max_attempts)
    }

    /// Adds `Authorization: Bearer <token>` from `tokens` to every request.
    fn with_bearer_auth(self, tokens: Arc<TokenManager>) -> BearerAuth<Self> {
        BearerAuth::new(self, tokens)
    }
}

impl<E: Executor> ExecutorExt for E {}
