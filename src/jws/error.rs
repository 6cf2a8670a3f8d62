//! Errors returned while decoding signed payloads.

use crate::cert::error::ChainError;

/// An error that may arise decoding a signed payload.
///
/// Any variant means the payload was rejected: no claims are returned.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PayloadError {
    /// The embedded certificate chain could not be extracted or did not verify.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The payload is not a well-formed compact serialization.
    #[error("malformed signed payload: {0}")]
    Malformed(&'static str),

    /// The header declares an algorithm other than `ES256`.
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not verify under the leaf certificate's key.
    #[error("signed payload signature is invalid")]
    InvalidSignature(#[source] jsonwebtoken::errors::Error),

    /// The signature verified but the claims do not match the requested shape.
    #[error("cannot decode signed payload claims")]
    InvalidClaims(#[source] jsonwebtoken::errors::Error),
}

impl PayloadError {
    pub(crate) fn from_jwt(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::Json(_) | ErrorKind::Utf8(_) => Self::InvalidClaims(err),
            _ => Self::InvalidSignature(err),
        }
    }
}
