#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

//! Client library for the [App Store Server API](https://developer.apple.com/documentation/appstoreserverapi).
//!
//! It covers the parts of the API that need care rather than glue:
//!
//! - signing and caching the short-lived `ES256` bearer token every request carries,
//! - verifying signed transactions, renewal information and server notifications
//!   by checking their embedded certificate chain against a pinned root CA,
//! - sending requests through one pipeline that authenticates, retries, checks
//!   the response status and decodes the body.
//!
//! Endpoint paths and response types stay with the caller.
//!
//! # Example
//!
//! ```no_run
//! use appstore_server::{
//!     collect_all_pages, Environment, Page, StoreClient, StoreConfig, TrustAnchor,
//! };
//! use serde::Deserialize;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct HistoryResponse {
//!     revision: String,
//!     has_more: bool,
//!     signed_transactions: Vec<String>,
//! }
//!
//! impl Page for HistoryResponse {
//!     fn has_more(&self) -> bool {
//!         self.has_more
//!     }
//!
//!     fn continuation(&self) -> Option<&str> {
//!         Some(&self.revision)
//!     }
//! }
//!
//! # async fn example(config: StoreConfig, root_ca_der: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let client = StoreClient::builder(config, TrustAnchor::from_der(root_ca_der)?).build()?;
//! let cancel = CancellationToken::new();
//!
//! let pages: Vec<HistoryResponse> = collect_all_pages(
//!     |revision| {
//!         let client = &client;
//!         let cancel = &cancel;
//!         async move {
//!             let mut request = client.request(reqwest::Method::GET, "/inApps/v1/history/1000000123456789")?;
//!             if let Some(revision) = revision {
//!                 request = request.query("revision", &revision);
//!             }
//!             client.execute_json(request, cancel).await
//!         }
//!     },
//!     &cancel,
//! )
//! .await?;
//!
//! for page in &pages {
//!     for transaction in client.decode_transactions(&page.signed_transactions) {
//!         println!("{}", transaction.transaction_id);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **`logging`** (default): emit diagnostics through the `log` crate.
//! - **`tracing`**: emit diagnostics as `tracing` events instead.

pub mod cert;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod http;
pub mod jws;
pub mod token;

mod observability;
mod prelude;

// -----------------------
// Re-exports
// -----------------------

pub use crate::{
    cert::{
        Certificate, CertificateChain, CertificateError, ChainError, ChainVerifier, EcPublicKey,
        PrivateKey, PrivateKeyError, TrustAnchor,
    },
    client::{collect_all_pages, collect_pages, Page, StoreClient, StoreClientBuilder},
    config::{Environment, RetryConfig, StoreConfig},
    error::{ApiError, Error},
    http::{
        ApiRequest, ApiResponse, Executor, ExecutorExt, HttpTransport, RetryContext, RetryPolicy,
        StoreRetryPolicy,
    },
    jws::{PayloadDecoder, PayloadError, SignedPayload, TransactionClaims},
    token::{AccountCredentials, TokenError, TokenManager},
};
