//! Helpers for the compact serialization (`header.payload.signature`).

use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Maximum size for a JWS segment (header or claims) after base64url decoding.
///
/// Notification payloads embed signed transactions and renewal info, so the
/// bound is larger than for a bare token, but still caps allocations for
/// hostile input.
const MAX_SEGMENT_SIZE: usize = 256 * 1024;

/// Why a compact serialization could not be split or decoded.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum CompactError {
    /// Not exactly three dot-separated parts.
    Format,
    /// A segment is not valid base64url or exceeds [`MAX_SEGMENT_SIZE`].
    Base64,
    /// A segment is not the expected JSON.
    Json,
}

impl CompactError {
    pub(crate) const fn describe(self) -> &'static str {
        match self {
            Self::Format => "expected 3 dot-separated parts",
            Self::Base64 => "invalid base64url encoding",
            Self::Json => "invalid json",
        }
    }
}

/// The protected header fields this crate inspects.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Header {
    pub(crate) alg: String,
    #[serde(default)]
    pub(crate) x5c: Vec<String>,
}

/// Splits `token` into its header, payload and signature segments.
pub(crate) fn split(token: &str) -> Result<[&str; 3], CompactError> {
    let mut it = token.split('.');
    let header = it.next().ok_or(CompactError::Format)?;
    let payload = it.next().ok_or(CompactError::Format)?;
    let signature = it.next().ok_or(CompactError::Format)?;
    if it.next().is_some() || header.is_empty() || payload.is_empty() {
        return Err(CompactError::Format);
    }
    Ok([header, payload, signature])
}

/// Decodes the protected header of `token`.
pub(crate) fn decode_header(token: &str) -> Result<Header, CompactError> {
    let [header, _, _] = split(token)?;
    decode_json_segment(header)
}

/// Decodes the payload segment of `token` as JSON **without** verifying the signature.
pub(crate) fn decode_unverified_payload<T: DeserializeOwned>(
    token: &str,
) -> Result<T, CompactError> {
    let [_, payload, _] = split(token)?;
    decode_json_segment(payload)
}

fn decode_json_segment<T: DeserializeOwned>(segment: &str) -> Result<T, CompactError> {
    let bytes = decode_b64url_to_vec(segment)?;
    serde_json::from_slice(&bytes).map_err(|_| CompactError::Json)
}

/// Decode base64url (no padding) into bytes.
///
/// Applies size limits to prevent excessive memory allocation from malicious input.
fn decode_b64url_to_vec(input: &str) -> Result<Vec<u8>, CompactError> {
    use base64ct::{Base64UrlUnpadded, Encoding as _};

    // Base64url expands data by ~33%, so the encoded length bounds the decoded size.
    if input.len() > MAX_SEGMENT_SIZE * 4 / 3 + 4 {
        return Err(CompactError::Base64);
    }

    let bytes = Base64UrlUnpadded::decode_vec(input).map_err(|_| CompactError::Base64)?;
    if bytes.len() > MAX_SEGMENT_SIZE {
        return Err(CompactError::Base64);
    }
    Ok(bytes)
}
