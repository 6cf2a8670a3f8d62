//! The App Store Server API client.
//!
//! [`StoreClient`] is the single entry point for outbound calls: every request
//! gets a bearer token, is retried per [`StoreRetryPolicy`], has its status
//! checked, and optionally has its body decoded. It also decodes signed
//! payloads with the deployment's trust anchor.

mod builder;
mod pagination;

pub use builder::StoreClientBuilder;
pub use pagination::{collect_all_pages, collect_pages, Page};

use crate::cert::{EcPublicKey, TrustAnchor};
use crate::config::{Environment, StoreConfig};
use crate::error::Error;
use crate::http::{
    ApiRequest, ApiResponse, BearerAuth, Executor, HttpTransport, JitterBackoff, RequireStatus,
    Retry, StoreRetryPolicy,
};
use crate::jws::{
    NotificationClaims, PayloadDecoder, PayloadError, RenewalInfoClaims, SignedPayload,
    TransactionClaims,
};
use crate::token::TokenManager;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type Pipeline<T> = Retry<BearerAuth<T>, StoreRetryPolicy, JitterBackoff>;

/// Client for the App Store Server API.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
#[derive(Debug)]
pub struct StoreClient<T = HttpTransport> {
    environment: Environment,
    tokens: Arc<TokenManager>,
    pipeline: Pipeline<T>,
    decoder: PayloadDecoder,
}

impl StoreClient<HttpTransport> {
    /// Returns a builder for a client using `config` and verifying signed
    /// payloads against `trust_anchor`.
    pub fn builder(config: StoreConfig, trust_anchor: TrustAnchor) -> StoreClientBuilder {
        StoreClientBuilder::new(config, trust_anchor)
    }
}

impl<T: Executor> StoreClient<T> {
    /// Returns the environment requests are sent to.
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Returns the bearer token manager.
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Returns the signed payload decoder.
    pub fn decoder(&self) -> &PayloadDecoder {
        &self.decoder
    }

    /// Creates a request for `path` under this client's environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `path` does not form a valid URL.
    pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, Error> {
        let url = self.environment.base_url()?.join(path)?;
        Ok(ApiRequest::new(method, url))
    }

    /// Sends `request`, accepting only `200 OK`.
    ///
    /// # Errors
    ///
    /// - [`Error::Api`] or [`Error::UnexpectedStatus`] for any other status,
    /// - [`Error::Token`] if no bearer token could be signed,
    /// - [`Error::Transport`] if the request failed and was not retried successfully,
    /// - [`Error::Cancelled`] if `cancel` fired.
    pub async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        self.execute_with_status(request, [StatusCode::OK], cancel)
            .await
    }

    /// Sends `request`, accepting any status in `accepted`.
    ///
    /// # Errors
    ///
    /// See [`StoreClient::execute`].
    pub async fn execute_with_status<I>(
        &self,
        request: ApiRequest,
        accepted: I,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error>
    where
        I: IntoIterator<Item = StatusCode>,
    {
        RequireStatus::new(&self.pipeline, accepted)
            .execute(request, cancel)
            .await
    }

    /// Sends `request`, accepting only `200 OK`, and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// See [`StoreClient::execute`]; additionally [`Error::ResponseDecode`] if
    /// the body does not decode into `R`.
    pub async fn execute_json<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<R, Error> {
        self.execute(request, cancel).await?.json()
    }

    /// Verifies and decodes a signed payload into `R`.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode<R: DeserializeOwned>(&self, signed_payload: &str) -> Result<R, PayloadError> {
        self.decoder.decode(signed_payload)
    }

    /// Verifies and decodes a signed transaction.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_transaction(&self, signed: &str) -> Result<TransactionClaims, PayloadError> {
        self.decoder.decode_transaction(signed)
    }

    /// Verifies and decodes signed renewal information.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_renewal_info(&self, signed: &str) -> Result<RenewalInfoClaims, PayloadError> {
        self.decoder.decode_renewal_info(signed)
    }

    /// Verifies and decodes a version 2 server notification.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode`].
    pub fn decode_notification(&self, signed: &str) -> Result<NotificationClaims, PayloadError> {
        self.decoder.decode_notification(signed)
    }

    /// Verifies and decodes a payload of unknown shape.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::decode_auto`].
    pub fn decode_auto(&self, signed: &str) -> Result<Option<SignedPayload>, PayloadError> {
        self.decoder.decode_auto(signed)
    }

    /// Verifies and decodes signed transactions, dropping the ones that fail.
    pub fn decode_transactions<S: AsRef<str>>(&self, signed: &[S]) -> Vec<TransactionClaims> {
        self.decoder.decode_transactions(signed)
    }

    /// Verifies the certificate chain of a signed payload and returns the leaf key.
    ///
    /// # Errors
    ///
    /// See [`PayloadDecoder::extract_leaf_public_key`].
    pub fn extract_leaf_public_key(&self, signed: &str) -> Result<EcPublicKey, PayloadError> {
        self.decoder.extract_leaf_public_key(signed)
    }
}
