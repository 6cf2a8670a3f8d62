use crate::constants::DEFAULT_PAGE_DELAY;
use crate::error::Error;
use crate::http::sleep_or_cancel;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A page of a paginated App Store Server API response.
///
/// Transaction history pages continue with `revision`, refund and
/// notification history pages with `revision` or `paginationToken`.
pub trait Page {
    /// Returns `true` if the server has more pages after this one.
    fn has_more(&self) -> bool;

    /// Returns the token to request the next page with.
    fn continuation(&self) -> Option<&str>;
}

/// Fetches pages until the server reports no more, returning them in order.
///
/// `fetch` receives `None` for the first page and the previous page's
/// continuation token afterwards. Fetching stops after a page with
/// `has_more() == false` or without a continuation token. `delay` is slept
/// between pages; [`DEFAULT_PAGE_DELAY`] is a good value.
///
/// # Errors
///
/// Returns the first error from `fetch`, or [`Error::Cancelled`] if `cancel`
/// fires between pages. Pages fetched before the failure are dropped.
pub async fn collect_pages<P, F, Fut>(
    mut fetch: F,
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<P>, Error>
where
    P: Page,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<P, Error>>,
{
    let mut pages = Vec::new();
    let mut continuation = None;

    loop {
        let page = fetch(continuation.take()).await?;
        let next = page
            .has_more()
            .then(|| page.continuation())
            .flatten()
            .filter(|token| !token.is_empty())
            .map(str::to_owned);
        pages.push(page);

        match next {
            Some(token) => continuation = Some(token),
            None => return Ok(pages),
        }

        if sleep_or_cancel(cancel, delay).await {
            return Err(Error::Cancelled);
        }
    }
}

/// [`collect_pages`] with [`DEFAULT_PAGE_DELAY`].
///
/// # Errors
///
/// See [`collect_pages`].
pub async fn collect_all_pages<P, F, Fut>(fetch: F, cancel: &CancellationToken) -> Result<Vec<P>, Error>
where
    P: Page,
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<P, Error>>,
{
    collect_pages(fetch, DEFAULT_PAGE_DELAY, cancel).await
}
