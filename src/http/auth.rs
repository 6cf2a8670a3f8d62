use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse, Executor};
use crate::token::TokenManager;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Adds the App Store Server API bearer token to every request.
///
/// The token is fetched per attempt, so a retried request picks up a token
/// regenerated since the previous attempt.
pub struct BearerAuth<E> {
    inner: E,
    tokens: Arc<TokenManager>,
}

impl<E> BearerAuth<E> {
    /// Wraps `inner`, authenticating with tokens from `tokens`.
    pub fn new(inner: E, tokens: Arc<TokenManager>) -> Self {
        Self { inner, tokens }
    }

    /// Returns the token manager.
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.tokens
    }
}

impl<E: Executor> Executor for BearerAuth<E> {
    async fn execute(
        &self,
        mut request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        let token = self.tokens.generate_if_expired()?;
        request
            .headers
            .insert(AUTHORIZATION, bearer_header_value(&token)?);

        self.inner.execute(request, cancel).await
    }
}

impl<E: fmt::Debug> fmt::Debug for BearerAuth<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

fn bearer_header_value(token: &str) -> Result<HeaderValue, Error> {
    let mut value = HeaderValue::try_from(format!("Bearer {token}"))
        .map_err(Error::InvalidAuthorizationHeader)?;
    value.set_sensitive(true);
    Ok(value)
}
