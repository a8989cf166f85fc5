use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use reqwest::{Client, StatusCode, Url};

use crate::{
    error::FetchError,
    proxy::ProxyPool,
    schema::{Page, RawPage},
};

/// PageSource is the seam between the collection strategy and the
/// upstream listing API.
///
/// CONTRACT:
/// - One call = one request for one page
/// - `cursor = None` requests the head of the listing
/// - Must not touch shared collection state (cursor bookkeeping
///   belongs to the caller)
///
/// THREAD SAFETY:
/// - Must be Send + Sync, several fetches may be in flight at once
///
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError>;
}

/// HTTP implementation of [`PageSource`] going through the proxy pool.
pub struct HttpPageFetcher {
    base_url: Url,
    direct: Client,
    proxies: ProxyPool,
}

impl HttpPageFetcher {
    /// Creates a fetcher for `listing_url`.
    ///
    /// `timeout` bounds every direct request; proxied requests use the
    /// timeout their route was built with.
    pub fn new(listing_url: &str, timeout: Duration, proxies: ProxyPool) -> Result<Self> {
        let base_url = Url::parse(listing_url)
            .with_context(|| format!("invalid listing url '{}'", listing_url))?;

        let direct = Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .context("building direct http client")?;

        Ok(Self {
            base_url,
            direct,
            proxies,
        })
    }

    /// Listing URL with the continuation token appended, if any.
    pub fn page_url(&self, cursor: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        if let Some(cursor) = cursor {
            url.query_pairs_mut().append_pair("cursor", cursor);
        }
        url
    }
}

#[async_trait::async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        // Fresh pick per attempt
        let client = match self.proxies.pick() {
            Some(route) => &route.client,
            None => &self.direct,
        };

        let resp = client.get(self.page_url(cursor)).send().await?;
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.bytes().await?;
        let raw: RawPage =
            serde_json::from_slice(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
        let page = Page::from(raw);

        debug!(
            "[FETCH] cursor={:?} items={} next={}",
            cursor,
            page.items.len(),
            page.next_cursor.is_some()
        );

        Ok(page)
    }
}
