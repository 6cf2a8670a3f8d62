use crate::constants::{DEFAULT_REQUEST_TIMEOUT, USER_AGENT};
use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse, Executor};
use std::error::Error as _;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A failure to send a request or read its response.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Error returned by the HTTP client.
    #[error("http request failed")]
    Http(#[from] reqwest::Error),

    /// I/O error reported by a custom [`Executor`].
    #[error("http connection error")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns `true` if the connection ended before a full response was read
    /// (unexpected EOF, reset, aborted, broken pipe, or a failed body read).
    pub fn is_interrupted(&self) -> bool {
        match self {
            Self::Http(e) => e.is_body() || source_chain_is_interrupted(e),
            Self::Io(e) => is_interrupted_kind(e.kind()),
        }
    }

    /// Returns `true` if the attempt timed out.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout(),
            Self::Io(e) => e.kind() == io::ErrorKind::TimedOut,
        }
    }
}

fn is_interrupted_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

fn source_chain_is_interrupted(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            if is_interrupted_kind(io_err.kind()) {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

/// [`Executor`] sending requests with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with the default per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be initialized.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a transport whose attempts time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be initialized.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client as is.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

impl Executor for HttpTransport {
    async fn execute(
        &self,
        request: ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, Error> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.send(request) => result.map_err(Error::from),
        }
    }
}
