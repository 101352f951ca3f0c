use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info};
use urlencoding::encode;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::extract;
use crate::fetcher::{Fetcher, RequestKind};
use crate::sources::iframe::{Candidate, SourceExtractor};
use crate::sources::tmdb::{extract_year, LookupCache, MediaKind, MetadataEnricher};
use crate::types::{
    DetailRecord, Episode, EpisodeRef, HomePage, ListingItem, Season, Server, SourceResult, StreamSource,
    UpstreamSource,
};

/// Lookups in flight per listing; order of the listing is kept.
const ENRICH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct SourceRequest {
    pub server_id: Option<String>,
    pub episode_id: Option<String>,
    pub debug: bool,
}

/// Fetch, extract, enrich. One instance is shared by every request.
pub struct Scraper {
    cfg: Config,
    fetcher: Fetcher,
    enricher: MetadataEnricher,
    sources: SourceExtractor,
}

impl Scraper {
    pub fn new(cfg: Config) -> ProxyResult<Self> {
        let cache = Arc::new(TtlCache::new(cfg.tmdb_cache_capacity, cfg.cache_ttl()));
        Self::with_cache(cfg, cache)
    }

    pub fn with_cache(cfg: Config, cache: Arc<LookupCache>) -> ProxyResult<Self> {
        let fetcher = Fetcher::new(&cfg)?;
        let enricher = MetadataEnricher::new(&cfg, cache)?;
        if !enricher.enabled() {
            info!("TMDB_API_KEY not set, tmdb enrichment disabled");
        }
        let sources = SourceExtractor::new(fetcher.clone());
        Ok(Self { cfg, fetcher, enricher, sources })
    }

    /// Entries currently held by the enrichment cache.
    pub fn cache_size(&self) -> usize {
        self.enricher.cache_len()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.cfg.base(), path)
    }

    fn referer(&self) -> String {
        format!("{}/", self.cfg.base())
    }

    pub async fn home(&self) -> ProxyResult<HomePage> {
        let url = self.url("/home");
        let page = self.fetcher.fetch_ok(&url, Some(&self.referer()), RequestKind::Document).await?;
        let mut home = extract::parse_home(&page.body);
        debug!(
            spotlight = home.spotlight.len(),
            trending_movies = home.trending.movies.len(),
            trending_tv = home.trending.tv_series.len(),
            "home parsed"
        );
        home.trending.movies = self.enrich(std::mem::take(&mut home.trending.movies)).await;
        home.trending.tv_series = self.enrich(std::mem::take(&mut home.trending.tv_series)).await;
        home.latest_movies = self.enrich(std::mem::take(&mut home.latest_movies)).await;
        home.latest_tv_series = self.enrich(std::mem::take(&mut home.latest_tv_series)).await;
        home.coming_soon = self.enrich(std::mem::take(&mut home.coming_soon)).await;
        Ok(home)
    }

    pub async fn detail(&self, id: &str) -> ProxyResult<DetailRecord> {
        let url = self.url(&format!("/watch-movie/watch-{}", encode(id)));
        let page = self.fetcher.fetch_ok(&url, Some(&url), RequestKind::Document).await?;
        let detail = extract::parse_detail(&page.body);
        debug!(id, kind = ?detail.kind, stats = detail.stats.len(), related = detail.related.len(), "detail parsed");
        Ok(detail)
    }

    pub async fn search(&self, query: &str) -> ProxyResult<Vec<ListingItem>> {
        let q = query.trim();
        if q.is_empty() {
            return Err(ProxyError::MissingRequiredParameter("q"));
        }
        let slug = q.split_whitespace().collect::<Vec<_>>().join("-");
        let url = self.url(&format!("/search/{}", encode(&slug)));
        let page = self.fetcher.fetch_ok(&url, Some(&self.referer()), RequestKind::Document).await?;
        let items = extract::parse_listing(&page.body);
        debug!(query = q, hits = items.len(), "search parsed");
        Ok(self.enrich(items).await)
    }

    pub async fn seasons(&self, id: &str) -> ProxyResult<Vec<Season>> {
        let url = self.url(&format!("/ajax/season/list/{}", encode(id)));
        let page = self.fetcher.fetch_ok(&url, Some(&self.referer()), RequestKind::Ajax).await?;
        Ok(extract::parse_seasons(&page.body))
    }

    pub async fn episodes(&self, season_id: Option<&str>) -> ProxyResult<Vec<Episode>> {
        let season_id = required(season_id, "seasonId")?;
        let url = self.url(&format!("/ajax/season/episodes/{}", encode(season_id)));
        let page = self.fetcher.fetch_ok(&url, Some(&self.referer()), RequestKind::Ajax).await?;
        Ok(extract::parse_episodes(&page.body))
    }

    pub async fn servers(&self, episode_id: Option<&str>) -> ProxyResult<Vec<Server>> {
        let episode_id = required(episode_id, "episodeId")?;
        let url = self.url(&format!("/ajax/episode/servers/{}", encode(episode_id)));
        let page = self.fetcher.fetch_ok(&url, Some(&self.referer()), RequestKind::Ajax).await?;
        Ok(extract::parse_servers(&page.body))
    }

    /// Resolve a server's embed and mine it for a manifest. A miss is a normal
    /// result with `stream_url: None`; only the sources lookup itself can fail.
    pub async fn sources(&self, req: &SourceRequest) -> ProxyResult<SourceResult> {
        let server_id = required(req.server_id.as_deref(), "serverId")?;
        let url = self.url(&format!("/ajax/episode/sources/{}", encode(server_id)));
        let upstream: UpstreamSource = self.fetcher.fetch_json(&url, Some(&self.referer())).await?;

        let mut result = SourceResult {
            success: false,
            error: None,
            server_id: server_id.to_string(),
            kind: upstream.kind.clone(),
            link: upstream.link.clone(),
            stream_url: None,
            sources: Vec::new(),
            server: None,
            episode: None,
            debug_info: None,
        };
        if upstream.kind != "iframe" || upstream.link.trim().is_empty() {
            info!(server_id, kind = %upstream.kind, "no iframe source");
            result.error = Some("No iframe source found".to_string());
            return Ok(result);
        }

        let extraction = self.sources.extract(upstream.link.trim(), &self.referer()).await;
        result.success = true;
        result.stream_url = extraction.stream_url;
        result.sources = extraction.candidates.iter().map(stream_source).collect();
        result.sources.extend(extraction.direct.iter().map(|u| direct_source(u)));

        if let Some(episode_id) = req.episode_id.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            result.episode = Some(EpisodeRef { id: episode_id.to_string() });
            match self.servers(Some(episode_id)).await {
                Ok(servers) => result.server = servers.into_iter().find(|s| s.id == server_id),
                Err(e) => debug!(episode_id, error = %e, "server lookup failed"),
            }
        }
        if req.debug {
            result.debug_info = Some(extraction.debug);
        }
        Ok(result)
    }

    async fn enrich(&self, items: Vec<ListingItem>) -> Vec<ListingItem> {
        if !self.enricher.enabled() || items.is_empty() {
            return items;
        }
        stream::iter(items)
            .map(|item| self.enrich_one(item))
            .buffered(ENRICH_CONCURRENCY)
            .collect()
            .await
    }

    async fn enrich_one(&self, mut item: ListingItem) -> ListingItem {
        match &mut item {
            ListingItem::Movie(m) => {
                let year = extract_year(&m.stats.year);
                m.tmdb_id = self.enricher.resolve(MediaKind::Movie, &m.title, year.as_deref()).await;
            }
            ListingItem::TvSeries(t) => {
                t.tmdb_id = self.enricher.resolve(MediaKind::Tv, &t.title, t.year.as_deref()).await;
            }
        }
        item
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> ProxyResult<&'a str> {
    value.map(str::trim).filter(|v| !v.is_empty()).ok_or(ProxyError::MissingRequiredParameter(name))
}

fn quality_label(url: &str, fallback: &str) -> String {
    ["1080", "720", "480", "360"]
        .iter()
        .find(|q| url.contains(*q))
        .map(|q| format!("{}p", q))
        .unwrap_or_else(|| fallback.to_string())
}

fn stream_source(c: &Candidate) -> StreamSource {
    StreamSource { url: c.url.clone(), quality: quality_label(&c.url, "auto"), is_m3u8: true }
}

/// Progressive files carry no variant playlist; unlabelled ones are assumed 720p.
fn direct_source(url: &str) -> StreamSource {
    StreamSource { url: url.to_string(), quality: quality_label(url, "720p"), is_m3u8: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn scraper_for(server: &MockServer, tmdb: Option<&MockServer>) -> Scraper {
        let mut cfg = Config::with_base_url(server.base_url());
        if let Some(t) = tmdb {
            cfg.tmdb_base_url = t.base_url();
            cfg.tmdb_api_key = Some("key".into());
        }
        Scraper::with_cache(cfg, Arc::new(TtlCache::new(64, Duration::from_secs(60)))).unwrap()
    }

    const LISTING: &str = r#"<div class="flw-item">
        <h3 class="film-name"><a href="/movie/watch-dune-2021-12345" title="Dune (2021)">Dune</a></h3>
        <div class="fd-infor"><span class="fdi-item">2021</span><span class="fdi-item fdi-duration">155m</span><span class="fdi-type">Movie</span></div>
    </div>
    <div class="flw-item">
        <h3 class="film-name"><a href="/tv/watch-dark-67890" title="Dark">Dark</a></h3>
        <div class="fd-infor"><span class="fdi-item">SS 3</span><span class="dot"></span><span class="fdi-item">EPS 8</span><span class="fdi-type">TV</span></div>
    </div>"#;

    #[test]
    fn required_rejects_blank() {
        assert!(matches!(required(None, "serverId"), Err(ProxyError::MissingRequiredParameter("serverId"))));
        assert!(required(Some("  "), "serverId").is_err());
        assert_eq!(required(Some(" 42 "), "serverId").unwrap(), "42");
    }

    #[test]
    fn quality_label_reads_resolution_hint() {
        assert_eq!(quality_label("https://x/1080/index.m3u8", "auto"), "1080p");
        assert_eq!(quality_label("https://x/master.m3u8", "auto"), "auto");
        assert_eq!(direct_source("https://x/movie.mp4").quality, "720p");
        assert!(!direct_source("https://x/movie.mp4").is_m3u8);
    }

    #[tokio::test]
    async fn search_enriches_items_in_order() {
        let site = MockServer::start_async().await;
        let tmdb = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/search/dune-dark");
            then.status(200).body(LISTING);
        })
        .await;
        tmdb.mock_async(|when, then| {
            when.method(GET).path("/search/movie").query_param("query", "dune").query_param("year", "2021");
            then.status(200).json_body(json!({ "results": [{ "id": 438631, "release_date": "2021-09-15" }] }));
        })
        .await;
        tmdb.mock_async(|when, then| {
            when.method(GET).path("/search/tv").query_param("query", "dark");
            then.status(200).json_body(json!({ "results": [{ "id": 70523, "first_air_date": "2017-12-01" }] }));
        })
        .await;

        let items = scraper_for(&site, Some(&tmdb)).search("  dune   dark ").await.unwrap();
        assert_eq!(items.len(), 2);
        match (&items[0], &items[1]) {
            (ListingItem::Movie(m), ListingItem::TvSeries(t)) => {
                assert_eq!(m.id, "12345");
                assert_eq!(m.tmdb_id, Some(438631));
                assert_eq!(t.id, "67890");
                assert_eq!(t.tmdb_id, Some(70523));
            }
            other => panic!("unexpected items {:?}", other),
        }
    }

    #[tokio::test]
    async fn sources_without_server_id_makes_no_call() {
        let site = MockServer::start_async().await;
        let any = site
            .mock_async(|when, then| {
                when.any_request();
                then.status(200);
            })
            .await;

        let err = scraper_for(&site, None).sources(&SourceRequest::default()).await.unwrap_err();
        assert!(matches!(err, ProxyError::MissingRequiredParameter("serverId")));
        any.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn sources_resolves_manifest_and_server_name() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/ajax/episode/sources/777");
            then.status(200).json_body(json!({ "type": "iframe", "link": site.url("/embed-2/e-1/abc") }));
        })
        .await;
        site.mock_async(|when, then| {
            when.method(GET).path("/embed-2/e-1/abc");
            then.status(200).body(r#"<script>player.setup({ file: "https://cdn.example.com/hls/abc/master.m3u8" });</script>"#);
        })
        .await;
        site.mock_async(|when, then| {
            when.method(GET).path("/ajax/episode/servers/5001");
            then.status(200).body(r#"<li class="nav-item"><a data-id="777" title="Server UpCloud"></a></li>"#);
        })
        .await;

        let req = SourceRequest { server_id: Some("777".into()), episode_id: Some("5001".into()), debug: true };
        let res = scraper_for(&site, None).sources(&req).await.unwrap();
        assert!(res.success);
        assert_eq!(res.kind, "iframe");
        assert_eq!(res.stream_url.as_deref(), Some("https://cdn.example.com/hls/abc/master.m3u8"));
        assert_eq!(res.sources[0].quality, "auto");
        assert!(res.sources[0].is_m3u8);
        assert_eq!(res.server, Some(Server { id: "777".into(), name: "UpCloud".into() }));
        assert_eq!(res.episode, Some(EpisodeRef { id: "5001".into() }));
        assert!(res.debug_info.is_some());
    }

    #[tokio::test]
    async fn mp4_only_embed_lists_direct_source_without_stream_url() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/ajax/episode/sources/31");
            then.status(200).json_body(json!({ "type": "iframe", "link": site.url("/embed-4/mp4") }));
        })
        .await;
        site.mock_async(|when, then| {
            when.method(GET).path("/embed-4/mp4");
            then.status(200).body(r#"<script>player.setup({ file: "https://cdn.example.com/v/movie_1080.mp4" });</script>"#);
        })
        .await;

        let req = SourceRequest { server_id: Some("31".into()), ..Default::default() };
        let res = scraper_for(&site, None).sources(&req).await.unwrap();
        assert!(res.success);
        assert!(res.stream_url.is_none());
        assert_eq!(
            res.sources,
            vec![StreamSource { url: "https://cdn.example.com/v/movie_1080.mp4".into(), quality: "1080p".into(), is_m3u8: false }]
        );
    }

    #[tokio::test]
    async fn non_iframe_source_is_reported_not_failed() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/ajax/episode/sources/9");
            then.status(200).json_body(json!({ "type": "direct", "link": "" }));
        })
        .await;

        let req = SourceRequest { server_id: Some("9".into()), ..Default::default() };
        let res = scraper_for(&site, None).sources(&req).await.unwrap();
        assert!(!res.success);
        assert_eq!(res.error.as_deref(), Some("No iframe source found"));
        assert!(res.stream_url.is_none());
    }

    #[tokio::test]
    async fn detail_upstream_failure_is_an_error() {
        let site = MockServer::start_async().await;
        site.mock_async(|when, then| {
            when.method(GET).path("/watch-movie/watch-42");
            then.status(503);
        })
        .await;

        let err = scraper_for(&site, None).detail("42").await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamUnavailable { .. }));
    }
}
