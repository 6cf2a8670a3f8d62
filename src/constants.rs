//! Constants shared by the token, verification and request modules.

use std::time::Duration;

/// Base URL of the production App Store Server API.
pub const HOST_PRODUCTION: &str = "https://api.storekit.itunes.apple.com";

/// Base URL of the sandbox App Store Server API.
pub const HOST_SANDBOX: &str = "https://api.storekit-sandbox.itunes.apple.com";

/// Audience (`aud`) claim every App Store Server API bearer token must carry.
pub const TOKEN_AUDIENCE: &str = "appstoreconnect-v1";

/// Lifetime of a generated bearer token.
///
/// The API rejects tokens valid for more than 60 minutes.
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(20 * 60);

/// A cached token is replaced this long before its `exp` claim is reached.
pub const TOKEN_REFRESH_SKEW: Duration = Duration::from_secs(60);

/// `User-Agent` header sent with every request.
pub const USER_AGENT: &str = concat!("appstore-server-rust/", env!("CARGO_PKG_VERSION"));

/// Pause between two page requests issued by [`collect_pages`](crate::client::collect_pages).
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_millis(10);

/// Default timeout applied to a single HTTP attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of certificates in the `x5c` header of a signed payload: leaf, intermediate, root.
pub const CERT_CHAIN_LENGTH: usize = 3;
