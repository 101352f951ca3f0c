use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::fetcher::with_proxy;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

static PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*?\)\s*").expect("parens regex"));
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("non-word regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("spaces regex"));
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    fn search_path(self) -> &'static str {
        match self {
            MediaKind::Movie => "search/movie",
            MediaKind::Tv => "search/tv",
        }
    }
}

/// Raw title and year as scraped; the cleaned title is only used for the query.
pub type CacheKey = (MediaKind, String, Option<String>);
pub type LookupCache = TtlCache<CacheKey, Option<u64>>;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: u64,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    first_air_date: Option<String>,
}

impl SearchResult {
    fn date(&self, kind: MediaKind) -> Option<&str> {
        match kind {
            MediaKind::Movie => self.release_date.as_deref(),
            MediaKind::Tv => self.first_air_date.as_deref(),
        }
    }
}

pub fn clean_title(title: &str) -> String {
    let t = PARENS.replace_all(title, " ");
    let t = NON_WORD.replace_all(&t, " ");
    SPACES.replace_all(&t, " ").trim().to_lowercase()
}

pub fn extract_year(text: &str) -> Option<String> {
    YEAR.find(text).map(|m| m.as_str().to_string())
}

/// Resolves TMDB ids for scraped titles. Never fails; a miss is `None`.
pub struct MetadataEnricher {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    cache: Arc<LookupCache>,
}

impl MetadataEnricher {
    pub fn new(cfg: &Config, cache: Arc<LookupCache>) -> ProxyResult<Self> {
        let builder = with_proxy(reqwest::Client::builder().timeout(LOOKUP_TIMEOUT), cfg)?;
        let client = builder.build().map_err(|e| ProxyError::upstream("tmdb client", e))?;
        Ok(Self {
            client,
            api_key: cfg.tmdb_key().map(str::to_string),
            base_url: cfg.tmdb_base_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn resolve(&self, kind: MediaKind, title: &str, year: Option<&str>) -> Option<u64> {
        let api_key = match &self.api_key {
            Some(k) => k,
            None => return None,
        };
        if title.trim().is_empty() {
            return None;
        }
        let key: CacheKey = (kind, title.to_string(), year.map(str::to_string));
        if let Some(hit) = self.cache.get(&key) {
            debug!(title, ?year, ?hit, "tmdb cache hit");
            return hit;
        }
        match self.search(api_key, kind, title, year).await {
            Ok(id) => {
                self.cache.insert(key, id);
                id
            }
            Err(e) => {
                warn!(title, error = %e, "tmdb lookup failed");
                None
            }
        }
    }

    async fn search(&self, api_key: &str, kind: MediaKind, title: &str, year: Option<&str>) -> Result<Option<u64>> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, kind.search_path())).context("tmdb base url")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("api_key", api_key)
                .append_pair("query", &clean_title(title))
                .append_pair("language", "en-US")
                .append_pair("page", "1");
            if let Some(y) = year {
                match kind {
                    MediaKind::Movie => {
                        q.append_pair("year", y).append_pair("primary_release_year", y);
                    }
                    MediaKind::Tv => {
                        q.append_pair("first_air_date_year", y);
                    }
                }
            }
        }

        let resp: SearchResponse = self
            .client
            .get(url)
            .send()
            .await
            .context("tmdb request failed")?
            .error_for_status()
            .context("tmdb non-success status")?
            .json()
            .await
            .context("tmdb parse json failed")?;

        Ok(best_match(&resp.results, kind, year))
    }
}

/// Year-filtered first match, else the API's own first result.
fn best_match(results: &[SearchResult], kind: MediaKind, year: Option<&str>) -> Option<u64> {
    let first = results.first()?;
    if let Some(y) = year {
        if let Some(m) = results.iter().find(|r| r.date(kind).is_some_and(|d| d.starts_with(y))) {
            return Some(m.id);
        }
    }
    Some(first.id)
}
