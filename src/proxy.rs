use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::seq::IndexedRandom;
use reqwest::{Client, Proxy, Url};

use crate::util;

/// One outbound route: a normalized proxy URI and the client bound to it.
///
/// reqwest binds proxies per client, so each proxy owns its own client.
/// Clients are cheap to clone and share one connection pool per route.
#[derive(Clone, Debug)]
pub struct ProxyRoute {
    pub uri: String,
    pub client: Client,
}

/// Pool of outbound proxies, built once at startup.
///
/// DESIGN:
/// - Selection is uniform and memoryless (no round-robin)
/// - Failed proxies stay eligible (no health tracking)
/// - An empty pool means direct connections
///
#[derive(Clone, Debug, Default)]
pub struct ProxyPool {
    routes: Vec<ProxyRoute>,
}

impl ProxyPool {
    /// Creates an empty pool (direct connections only).
    pub fn direct() -> Self {
        Self::default()
    }

    /// Builds a pool from a raw comma-separated proxy list.
    ///
    /// Entries are normalized with [`util::normalize_proxy`]. Entries
    /// that are not http(s) URIs, or that reqwest cannot turn into a
    /// proxy, are logged and skipped.
    pub fn from_spec(raw: &str, timeout: Duration) -> Result<Self> {
        let mut routes = Vec::new();

        for uri in util::parse_proxy_list(raw) {
            if !is_http_proxy(&uri) {
                warn!("[INIT] skipping proxy entry '{}': unsupported scheme", redact(&uri));
                continue;
            }

            let proxy = match Proxy::all(uri.as_str()) {
                Ok(p) => p,
                Err(e) => {
                    warn!("[INIT] skipping proxy entry '{}': {}", redact(&uri), e);
                    continue;
                }
            };

            let client = Client::builder()
                .proxy(proxy)
                .timeout(timeout)
                .build()
                .with_context(|| format!("building client for proxy {}", redact(&uri)))?;

            routes.push(ProxyRoute { uri, client });
        }

        if routes.is_empty() {
            warn!("[INIT] no proxies configured – using direct connections");
        } else {
            info!("[INIT] {} proxies loaded", routes.len());
        }

        Ok(Self { routes })
    }

    /// Picks one route uniformly at random, `None` for direct connection.
    pub fn pick(&self) -> Option<&ProxyRoute> {
        self.routes.choose(&mut rand::rng())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|r| r.uri.as_str())
    }
}

/// Only http and https proxies can be used by the fetch clients.
fn is_http_proxy(uri: &str) -> bool {
    Url::parse(uri)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Hides credentials of a proxy URI for logging.
pub fn redact(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &uri[..scheme_end + 3], &uri[at..])
        }
        _ => uri.to_string(),
    }
}
