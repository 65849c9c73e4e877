//! Link-header pagination for GitHub list endpoints.
//!
//! GitHub paginates with a `Link` response header carrying a `rel="next"`
//! URL; the last page omits it. [`Paginator`] walks the chain lazily and
//! surfaces a failed page fetch as that item's `Err` — it never silently
//! truncates, so callers know exactly how many pages succeeded.

use tracing::warn;

use crate::error::Result;

/// One decoded page plus the continuation URL, if any.
#[derive(Debug, Clone)]
pub struct Page {
    pub body: serde_json::Value,
    pub next: Option<String>,
}

/// Fetches a single page by URL. Implemented over ureq in production and
/// over canned response queues in tests.
pub trait PageFetcher {
    fn fetch_page(&self, url: &str) -> Result<Page>;
}

/// Lazy iterator over a page chain. Restartable only by constructing a new
/// paginator from the initial URL; iteration ends after the first page
/// without a next relation, or after yielding a fetch error.
pub struct Paginator<'a> {
    fetcher: &'a dyn PageFetcher,
    next: Option<String>,
    failed: bool,
}

impl<'a> Paginator<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, initial_url: String) -> Self {
        Self {
            fetcher,
            next: Some(initial_url),
            failed: false,
        }
    }
}

impl Iterator for Paginator<'_> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let url = self.next.take()?;
        match self.fetcher.fetch_page(&url) {
            Ok(page) => {
                self.next = page.next.clone();
                Some(Ok(page))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walk the whole chain, keeping the pages that succeeded. A mid-stream
/// failure is logged with the succeeded-page count and the partial result
/// is returned; the review pass proceeds with what was fetched.
pub fn collect_pages(fetcher: &dyn PageFetcher, initial_url: String) -> Vec<serde_json::Value> {
    let mut bodies = Vec::new();
    for page in Paginator::new(fetcher, initial_url) {
        match page {
            Ok(page) => bodies.push(page.body),
            Err(e) => {
                warn!(
                    pages_fetched = bodies.len(),
                    error = %e,
                    "pagination stopped short, continuing with fetched pages"
                );
                break;
            }
        }
    }
    bodies
}

/// Extract the `rel="next"` URL from a `Link` header value.
pub fn parse_next_link(header: &str) -> Option<String> {
    for part in header.split(',') {
        let mut sections = part.split(';');
        let url = sections.next()?.trim();
        let is_next = sections
            .any(|attr| attr.trim().eq_ignore_ascii_case(r#"rel="next""#));
        if is_next && url.starts_with('<') && url.ends_with('>') {
            return Some(url[1..url.len() - 1].to_string());
        }
    }
    None
}
