//! Paginated sequence adapter
//!
//! Billing APIs return results one page at a time together with an opaque
//! continuation token. [`paginate`] turns such an API into a lazy stream of
//! pages: the first request goes out without a token, every following request
//! carries the token of the previous page, and the stream ends when a page
//! comes back without one.
//!
//! The adapter only knows about the token through a [`ContinuationToken`]
//! accessor pair supplied by the caller. Responses following the usual
//! `next_page_token` / `next_token` naming can use the [`NextPageToken`] and
//! [`NextToken`] helpers.
//!
//! A fetch error is yielded once and ends the stream. Dropping the stream
//! stops paging: nothing is fetched unless the consumer polls for it.
//!
//! # Examples
//!
//! ```
//! use cloudcost_core::pagination::{paginate, ContinuationToken};
//! use futures::StreamExt;
//!
//! #[derive(Clone, Default)]
//! struct Request { token: Option<String> }
//! struct Page { values: Vec<u32>, next: Option<String> }
//!
//! # tokio_test::block_on(async {
//! let token = ContinuationToken::new(
//!     |page: &Page| page.next.as_deref(),
//!     |request: &mut Request, token| request.token = token,
//! );
//! let pages = paginate(Request::default(), token, |request: Request| async move {
//!     Ok::<_, std::io::Error>(match request.token.as_deref() {
//!         None => Page { values: vec![1, 2], next: Some("p2".into()) },
//!         Some(_) => Page { values: vec![3], next: None },
//!     })
//! });
//! let pages: Vec<_> = pages.collect().await;
//! assert_eq!(pages.len(), 2);
//! # });
//! ```

use crate::error::{BoxError, CloudCostError, Result};
use futures::stream::{Stream, StreamExt};
use std::future::Future;
use tracing::trace;

/// Accessor pair locating the continuation token of a request/page type pair
pub struct ContinuationToken<Req, Page> {
    get: fn(&Page) -> Option<&str>,
    set: fn(&mut Req, Option<String>),
}

impl<Req, Page> Clone for ContinuationToken<Req, Page> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Req, Page> Copy for ContinuationToken<Req, Page> {}

impl<Req, Page> ContinuationToken<Req, Page> {
    /// Build from an explicit getter (on the page) and setter (on the request)
    pub fn new(get: fn(&Page) -> Option<&str>, set: fn(&mut Req, Option<String>)) -> Self {
        Self { get, set }
    }

    /// Non-empty token carried by `page`
    pub fn next(&self, page: &Page) -> Option<String> {
        (self.get)(page)
            .filter(|token| !token.is_empty())
            .map(str::to_owned)
    }

    /// Write `token` into `request`
    pub fn apply(&self, request: &mut Req, token: Option<String>) {
        (self.set)(request, token);
    }
}

/// Request/response types using the `next_page_token` field convention
pub trait NextPageToken {
    fn next_page_token(&self) -> Option<&str>;
}

/// Request types that accept a `next_page_token`
pub trait SetNextPageToken {
    fn set_next_page_token(&mut self, token: Option<String>);
}

/// Request/response types using the `next_token` field convention
pub trait NextToken {
    fn next_token(&self) -> Option<&str>;
}

/// Request types that accept a `next_token`
pub trait SetNextToken {
    fn set_next_token(&mut self, token: Option<String>);
}

impl<Req: SetNextPageToken, Page: NextPageToken> ContinuationToken<Req, Page> {
    /// Accessors for the `next_page_token` convention
    pub fn next_page_token() -> Self {
        Self::new(Page::next_page_token, Req::set_next_page_token)
    }
}

impl<Req: SetNextToken, Page: NextToken> ContinuationToken<Req, Page> {
    /// Accessors for the `next_token` convention
    pub fn next_token() -> Self {
        Self::new(Page::next_token, Req::set_next_token)
    }
}

/// Lazily fetch every page of a paginated API
///
/// `fetch_page` receives a copy of the request descriptor with the current
/// continuation token written into it. The first call is made with the token
/// cleared.
pub fn paginate<'a, Req, Page, E, F, Fut>(
    request: Req,
    token: ContinuationToken<Req, Page>,
    mut fetch_page: F,
) -> impl Stream<Item = Result<Page>> + Send + 'a
where
    Req: Clone + Send + 'a,
    Page: Send + 'a,
    E: Into<BoxError> + Send + 'a,
    F: FnMut(Req) -> Fut + Send + 'a,
    Fut: Future<Output = std::result::Result<Page, E>> + Send + 'a,
{
    async_stream::stream! {
        let mut request = request;
        token.apply(&mut request, None);
        let mut page_number = 1usize;

        loop {
            let page = match fetch_page(request.clone()).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(CloudCostError::backend(
                        format!("error calling billing API (page {page_number})"),
                        e,
                    ));
                    return;
                }
            };

            let next = token.next(&page);
            trace!("Fetched page {page_number}, more pages: {}", next.is_some());
            yield Ok(page);

            match next {
                Some(next) => token.apply(&mut request, Some(next)),
                None => return,
            }
            page_number += 1;
        }
    }
}

/// Like [`paginate`], but yields the items extracted from each page
pub fn paginate_items<'a, Req, Page, Item, E, F, Fut, X>(
    request: Req,
    token: ContinuationToken<Req, Page>,
    fetch_page: F,
    mut extract: X,
) -> impl Stream<Item = Result<Item>> + Send + 'a
where
    Req: Clone + Send + 'a,
    Page: Send + 'a,
    Item: Send + 'a,
    E: Into<BoxError> + Send + 'a,
    F: FnMut(Req) -> Fut + Send + 'a,
    Fut: Future<Output = std::result::Result<Page, E>> + Send + 'a,
    X: FnMut(Page) -> Vec<Item> + Send + 'a,
{
    paginate(request, token, fetch_page).flat_map(move |page| {
        let items: Vec<Result<Item>> = match page {
            Ok(page) => extract(page).into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(items)
    })
}
