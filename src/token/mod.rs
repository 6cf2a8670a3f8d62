//! Bearer tokens for the App Store Server API.
//!
//! [`TokenManager`] signs an `ES256` token from the account credentials and
//! reuses it until it is about to expire. Signing is local; no lock is held
//! across I/O because there is none.

use crate::cert::error::PrivateKeyError;
use crate::cert::PrivateKey;
use crate::config::{Environment, StoreConfig};
use crate::constants::{TOKEN_AUDIENCE, TOKEN_LIFETIME, TOKEN_REFRESH_SKEW};
use crate::prelude::debug;
use arc_swap::ArcSwapOption;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;

/// An error that may arise generating a bearer token.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The account private key could not be decoded.
    #[error("invalid account private key")]
    InvalidPrivateKey(#[source] PrivateKeyError),

    /// The account private key is not an EC P-256 key.
    #[error("account private key must be an EC P-256 key")]
    UnsupportedKeyAlgorithm,

    /// Signing the token failed.
    #[error("failed to sign bearer token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl From<PrivateKeyError> for TokenError {
    fn from(err: PrivateKeyError) -> Self {
        match err {
            PrivateKeyError::UnsupportedAlgorithm => Self::UnsupportedKeyAlgorithm,
            other => Self::InvalidPrivateKey(other),
        }
    }
}

/// Immutable account credentials used to sign bearer tokens.
#[derive(Debug, Clone)]
pub struct AccountCredentials {
    private_key: PrivateKey,
    key_id: String,
    issuer: String,
    bundle_id: String,
    environment: Environment,
}

impl AccountCredentials {
    /// Creates credentials from an already decoded key.
    pub fn new(
        private_key: PrivateKey,
        key_id: impl Into<String>,
        issuer: impl Into<String>,
        bundle_id: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            private_key,
            key_id: key_id.into(),
            issuer: issuer.into(),
            bundle_id: bundle_id.into(),
            environment,
        }
    }

    /// Decodes the PEM key in `config` and copies its identifiers.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::InvalidPrivateKey`] or [`TokenError::UnsupportedKeyAlgorithm`]
    /// if the key content is not a PEM EC P-256 PKCS#8 key.
    pub fn from_config(config: &StoreConfig) -> Result<Self, TokenError> {
        let private_key = PrivateKey::from_pem(&config.key_content)?;
        Ok(Self::new(
            private_key,
            config.key_id.as_str(),
            config.issuer.as_str(),
            config.bundle_id.as_str(),
            config.environment,
        ))
    }

    /// Returns the private key ID (`kid`).
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns the issuer ID (`iss`).
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Returns the bundle ID (`bid`).
    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Returns the environment tokens are issued for.
    pub const fn environment(&self) -> Environment {
        self.environment
    }
}

#[derive(Serialize)]
struct BearerClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'static str,
    bid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<&'static str>,
}

struct CachedToken {
    token: String,
    expiry: OffsetDateTime,
}

/// Issues and caches the bearer token used by every outbound request.
///
/// Reads take a lock-free snapshot of the cached token and expiry pair.
/// Regeneration is serialized by a mutex and replaces the pair in one store,
/// so readers never see a token with another token's expiry.
pub struct TokenManager {
    credentials: AccountCredentials,
    encoding_key: EncodingKey,
    cached: ArcSwapOption<CachedToken>,
    regenerate: Mutex<()>,
}

impl TokenManager {
    /// Creates a manager for `credentials`. No token is signed until first use.
    pub fn new(credentials: AccountCredentials) -> Self {
        let encoding_key = EncodingKey::from_ec_der(credentials.private_key.as_bytes());
        Self {
            credentials,
            encoding_key,
            cached: ArcSwapOption::empty(),
            regenerate: Mutex::new(()),
        }
    }

    /// Returns the credentials tokens are signed with.
    pub fn credentials(&self) -> &AccountCredentials {
        &self.credentials
    }

    /// Returns the cached token, signing a new one if there is none or it is
    /// within [`TOKEN_REFRESH_SKEW`] of its expiry.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Signing`] if signing fails; the cache is left as it was.
    pub fn generate_if_expired(&self) -> Result<String, TokenError> {
        self.generate_if_expired_at(OffsetDateTime::now_utc())
    }

    /// Returns the expiry of the cached token, if any.
    pub fn expiry(&self) -> Option<OffsetDateTime> {
        self.cached.load().as_ref().map(|cached| cached.expiry)
    }

    pub(crate) fn generate_if_expired_at(&self, now: OffsetDateTime) -> Result<String, TokenError> {
        if let Some(token) = self.fresh_token(now) {
            return Ok(token);
        }

        let _guard = self
            .regenerate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have refreshed the token while we waited.
        if let Some(token) = self.fresh_token(now) {
            return Ok(token);
        }

        let cached = self.sign(now)?;
        let token = cached.token.clone();
        debug!(
            "Signed new App Store Server API bearer token (kid={}, expires={})",
            self.credentials.key_id, cached.expiry
        );
        self.cached.store(Some(Arc::new(cached)));
        Ok(token)
    }

    fn fresh_token(&self, now: OffsetDateTime) -> Option<String> {
        self.cached
            .load()
            .as_ref()
            .filter(|cached| now < cached.expiry - TOKEN_REFRESH_SKEW)
            .map(|cached| cached.token.clone())
    }

    fn sign(&self, now: OffsetDateTime) -> Result<CachedToken, TokenError> {
        let expiry = now + TOKEN_LIFETIME;
        let claims = BearerClaims {
            iss: &self.credentials.issuer,
            iat: now.unix_timestamp(),
            exp: expiry.unix_timestamp(),
            aud: TOKEN_AUDIENCE,
            bid: &self.credentials.bundle_id,
            environment: self.credentials.environment.is_sandbox().then_some("Sandbox"),
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.credentials.key_id.clone());
        header.typ = Some("JWT".to_owned());

        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;
        Ok(CachedToken { token, expiry })
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("credentials", &self.credentials)
            .field("expiry", &self.expiry())
            .finish_non_exhaustive()
    }
}
