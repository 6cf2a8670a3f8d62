use crate::error::{ApiError, Error};
use crate::http::{ApiRequest, ApiResponse, Executor};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Fails responses whose status is not in the accepted set.
///
/// A rejected response becomes [`Error::Api`] if its body is the API's error
/// envelope, otherwise [`Error::UnexpectedStatus`] carrying the raw body.
#[derive(Debug, Clone)]
pub struct RequireStatus<E> {
    inner: E,
    accepted: Vec<StatusCode>,
}

impl<E> RequireStatus<E> {
    /// Wraps `inner`, accepting only the statuses in `accepted`.
    pub fn new<I>(inner: E, accepted: I) -> Self
    where
        I: IntoIterator<Item = StatusCode>,
    {
        Self {
            inner,
            accepted: accepted.into_iter().collect(),
        }
    }

    /// Returns the accepted statuses.
    pub fn accepted(&self) -> &[StatusCode] {
        &self.accepted
    }

    fn check(&self, response: ApiResponse) -> Result<ApiResponse, Error> {
        if self.accepted.contains(&response.status) {
            Ok(response)
        } else {
            Err(rejected(response))
        }
    }
}

impl<E: Executor> Executor for RequireStatus<E> {
    async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        let response = self.inner.execute(request, cancel).await?;
        self.check(response)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorEnvelope {
    error_code: i64,
    error_message: String,
}

/// Converts a response with an unaccepted status into an error.
pub(crate) fn rejected(response: ApiResponse) -> Error {
    match serde_json::from_slice::<ErrorEnvelope>(&response.body) {
        Ok(envelope) => Error::Api(ApiError {
            status: response.status,
            code: envelope.error_code,
            message: envelope.error_message,
            retry_after: retry_after(&response.headers),
        }),
        Err(_) => Error::UnexpectedStatus {
            status: response.status,
            body: response.body,
        },
    }
}

/// Reads `Retry-After` as UNIX time in milliseconds.
fn retry_after(headers: &HeaderMap) -> Option<OffsetDateTime> {
    let millis: i64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn error_envelope_becomes_api_error() {
        let mut response = ApiResponse::new(
            StatusCode::TOO_MANY_REQUESTS,
            br#"{"errorCode":4290000,"errorMessage":"Rate limit exceeded."}"#.to_vec(),
        );
        response
            .headers
            .insert(RETRY_AFTER, HeaderValue::from_static("1700000000000"));

        match rejected(response) {
            Error::Api(api) => {
                assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(api.code, 4_290_000);
                assert_eq!(api.message, "Rate limit exceeded.");
                assert_eq!(
                    api.retry_after,
                    Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap())
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_bodies_become_unexpected_status() {
        let response = ApiResponse::new(StatusCode::BAD_GATEWAY, b"<html>".to_vec());
        match rejected(response) {
            Error::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body, b"<html>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn retry_after_ignores_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers), None);
        assert_eq!(retry_after(&HeaderMap::new()), None);
    }
}
