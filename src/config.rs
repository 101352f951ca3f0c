use std::time::Duration;

use clap::Args;

pub const DEFAULT_BASE_URL: &str = "https://flixhq-tv.lol";
pub const DEFAULT_TMDB_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Upstream and enrichment settings. Every field can come from the environment.
#[derive(Args, Debug, Clone)]
pub struct Config {
    /// Base URL of the scraped site
    #[arg(long, env = "FLIX_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Outbound HTTP proxy for upstream requests
    #[arg(long, env = "FLIX_HTTP_PROXY", global = true)]
    pub http_proxy: Option<String>,

    /// Per-request upstream timeout in seconds
    #[arg(long, env = "FLIX_TIMEOUT_SECS", default_value_t = 15, global = true)]
    pub timeout_secs: u64,

    /// TMDB API key; enrichment is skipped when unset
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true, global = true)]
    pub tmdb_api_key: Option<String>,

    #[arg(long, env = "TMDB_BASE_URL", default_value = DEFAULT_TMDB_BASE_URL, global = true)]
    pub tmdb_base_url: String,

    #[arg(long, env = "TMDB_CACHE_CAPACITY", default_value_t = 2048, global = true)]
    pub tmdb_cache_capacity: usize,

    #[arg(long, env = "TMDB_CACHE_TTL_SECS", default_value_t = 86_400, global = true)]
    pub tmdb_cache_ttl_secs: u64,
}

impl Config {
    /// Defaults with the given upstream; enrichment off.
    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Config {
            base_url: base_url.into(),
            http_proxy: None,
            timeout_secs: 15,
            tmdb_api_key: None,
            tmdb_base_url: DEFAULT_TMDB_BASE_URL.to_string(),
            tmdb_cache_capacity: 2048,
            tmdb_cache_ttl_secs: 86_400,
        }
    }

    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tmdb_cache_ttl_secs)
    }

    pub fn tmdb_key(&self) -> Option<&str> {
        self.tmdb_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_counts_as_unset() {
        let mut cfg = Config::with_base_url("http://localhost/");
        cfg.tmdb_api_key = Some("   ".into());
        assert!(cfg.tmdb_key().is_none());
        assert_eq!(cfg.base(), "http://localhost");
    }

    #[test]
    fn zero_timeout_is_clamped() {
        let mut cfg = Config::with_base_url("http://localhost");
        cfg.timeout_secs = 0;
        assert_eq!(cfg.timeout(), Duration::from_secs(1));
    }
}
