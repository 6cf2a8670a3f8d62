use crate::cert::{ChainVerifier, TrustAnchor};
use crate::client::StoreClient;
use crate::config::{RetryConfig, StoreConfig};
use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::error::Error;
use crate::http::{Executor, ExecutorExt as _, HttpTransport, JitterBackoff, StoreRetryPolicy};
use crate::jws::PayloadDecoder;
use crate::prelude::info;
use crate::token::{AccountCredentials, TokenManager};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Builder for [`StoreClient`].
///
/// # Example
///
/// ```no_run
/// use appstore_server::{Environment, RetryConfig, StoreClient, StoreConfig, TrustAnchor};
/// use std::time::Duration;
///
/// # fn example(key_pem: Vec<u8>, apple_root_ca_g3_der: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
/// let config = StoreConfig {
///     key_content: key_pem,
///     key_id: "2X9R4HXF34".to_owned(),
///     issuer: "57246542-96fe-1a63-e053-0824d011072a".to_owned(),
///     bundle_id: "com.example.app".to_owned(),
///     environment: Environment::Sandbox,
/// };
///
/// let client = StoreClient::builder(config, TrustAnchor::from_der(apple_root_ca_g3_der)?)
///     .retry(RetryConfig {
///         max_attempts: 5,
///         ..RetryConfig::default()
///     })
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StoreClientBuilder {
    config: StoreConfig,
    trust_anchor: TrustAnchor,
    retry: RetryConfig,
    timeout: Duration,
    verify_at: Option<OffsetDateTime>,
}

impl StoreClientBuilder {
    pub(super) fn new(config: StoreConfig, trust_anchor: TrustAnchor) -> Self {
        Self {
            config,
            trust_anchor,
            retry: RetryConfig::default(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            verify_at: None,
        }
    }

    /// Sets the retry and backoff configuration.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the timeout of a single HTTP attempt. Only used by [`StoreClientBuilder::build`].
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks certificate validity periods at `time` instead of the current time.
    #[must_use]
    pub fn verify_certificates_at(mut self, time: OffsetDateTime) -> Self {
        self.verify_at = Some(time);
        self
    }

    /// Builds a client sending requests with `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if the account key cannot be decoded, or
    /// [`Error::Transport`] if the HTTP client cannot be initialized.
    pub fn build(self) -> Result<StoreClient<HttpTransport>, Error> {
        let transport = HttpTransport::with_timeout(self.timeout)?;
        self.build_with_transport(transport)
    }

    /// Builds a client sending requests through `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Token`] if the account key cannot be decoded.
    pub fn build_with_transport<T: Executor>(self, transport: T) -> Result<StoreClient<T>, Error> {
        let credentials = AccountCredentials::from_config(&self.config)?;
        let tokens = Arc::new(TokenManager::new(credentials));
        let retry = self.retry.normalize();

        let mut verifier = ChainVerifier::new(self.trust_anchor);
        if let Some(time) = self.verify_at {
            verifier = verifier.at(time);
        }

        let pipeline = transport
            .with_bearer_auth(Arc::clone(&tokens))
            .with_retry(
                StoreRetryPolicy,
                JitterBackoff::from(retry),
                retry.max_attempts,
            );

        info!(
            "Created App Store Server API client: environment={}, bundle_id={}",
            self.config.environment, self.config.bundle_id
        );

        Ok(StoreClient {
            environment: self.config.environment,
            tokens,
            pipeline,
            decoder: PayloadDecoder::new(verifier),
        })
    }
}
