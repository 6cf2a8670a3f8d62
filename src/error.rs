//! Error types for requests sent through the App Store Server API pipeline.

use crate::http::TransportError;
use crate::token::TokenError;
use reqwest::StatusCode;
use std::fmt;
use thiserror::Error;
use time::OffsetDateTime;

/// Errors produced by the request pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bearer token could not be generated.
    #[error("cannot generate bearer token")]
    Token(#[from] TokenError),

    /// The request could not be sent or its response could not be read.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status outside the accepted set and no
    /// structured error body.
    #[error("unexpected response status {status}")]
    UnexpectedStatus {
        /// Response status.
        status: StatusCode,
        /// Raw response body.
        body: Vec<u8>,
    },

    /// The server reported an error using its structured error envelope.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The response body could not be decoded into the requested type.
    #[error("cannot decode response body")]
    ResponseDecode(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("cannot encode request body")]
    RequestEncode(#[source] serde_json::Error),

    /// The bearer token cannot be sent as an `Authorization` header value.
    #[error("bearer token is not a valid header value")]
    InvalidAuthorizationHeader(#[source] reqwest::header::InvalidHeaderValue),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// The request URL could not be built.
    #[error("invalid request url")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Returns the HTTP status of the response that caused this error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Api(api) => Some(api.status),
            _ => None,
        }
    }
}

/// A business error reported by the App Store Server API.
///
/// Built from the `{"errorCode": ..., "errorMessage": ...}` body that
/// accompanies most non-success responses.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Numeric error code, e.g. `4040010` (transaction not found).
    pub code: i64,
    /// Server-supplied description.
    pub message: String,
    /// Earliest time to send the next request, from the `Retry-After`
    /// header (UNIX time in milliseconds) sent with `429` responses.
    pub retry_after: Option<OffsetDateTime>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "App Store Server API error {} ({}): {}",
            self.code, self.status, self.message
        )
    }
}

impl std::error::Error for ApiError {}
