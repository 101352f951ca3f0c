use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};

const UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0 Safari/537.36";
const MAX_REDIRECTS: usize = 5;

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(UA));
    headers.insert(ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers
}

/// A fetched upstream response, whatever its status.
#[derive(Debug, Clone)]
pub struct Page {
    pub status: u16,
    pub final_url: String,
    pub body: String,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    /// The site's `/ajax/...` endpoints only answer XHR-looking requests.
    Ajax,
}

/// Route a client through `FLIX_HTTP_PROXY` when one is configured.
pub fn with_proxy(builder: reqwest::ClientBuilder, cfg: &Config) -> ProxyResult<reqwest::ClientBuilder> {
    match cfg.http_proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(proxy) => {
            let px = reqwest::Proxy::all(proxy).map_err(|e| ProxyError::upstream(proxy, e))?;
            Ok(builder.proxy(px))
        }
        None => Ok(builder),
    }
}

#[derive(Clone)]
pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(cfg: &Config) -> ProxyResult<Self> {
        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(cfg.timeout())
            .cookie_store(true);
        builder = with_proxy(builder, cfg)?;
        let client = builder.build().map_err(|e| ProxyError::upstream("client", e))?;
        Ok(Self { client })
    }

    /// GET without judging the status; callers decide whether the body is usable.
    pub async fn fetch(&self, url: &str, referer: Option<&str>, kind: RequestKind) -> ProxyResult<Page> {
        self.send(url, referer, kind, None).await
    }

    pub async fn fetch_with_timeout(&self, url: &str, referer: Option<&str>, timeout: Duration) -> ProxyResult<Page> {
        self.send(url, referer, RequestKind::Ajax, Some(timeout)).await
    }

    /// GET that fails with `UpstreamUnavailable` on any non-2xx status.
    pub async fn fetch_ok(&self, url: &str, referer: Option<&str>, kind: RequestKind) -> ProxyResult<Page> {
        let page = self.fetch(url, referer, kind).await?;
        if !page.is_success() {
            return Err(ProxyError::upstream(url, format!("status {}", page.status)));
        }
        Ok(page)
    }

    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str, referer: Option<&str>) -> ProxyResult<T> {
        let page = self.fetch_ok(url, referer, RequestKind::Ajax).await?;
        serde_json::from_str(&page.body).map_err(|e| ProxyError::upstream(url, format!("invalid json: {}", e)))
    }

    async fn send(&self, url: &str, referer: Option<&str>, kind: RequestKind, timeout: Option<Duration>) -> ProxyResult<Page> {
        debug!(url, ?kind, "GET");
        let mut req = self.client.get(url);
        if let Some(r) = referer {
            if let Ok(hv) = HeaderValue::from_str(r) { req = req.header(REFERER, hv); }
        }
        if kind == RequestKind::Ajax {
            req = req.header(HeaderName::from_static("x-requested-with"), HeaderValue::from_static("XMLHttpRequest"));
        }
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req.send().await.map_err(|e| ProxyError::upstream(url, e))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await.map_err(|e| ProxyError::upstream(url, e))?;
        debug!(url, status, bytes = body.len(), "fetched");
        Ok(Page { status, final_url, body })
    }
}
