//! Manifest discovery inside an embed (iframe) page.
//!
//! The embed page is a moving target, so discovery is a fold over independent
//! [`ManifestMatcher`] strategies. Every raw match is unescaped, resolved
//! against the embed's origin, validated and scored; the best one wins. When
//! nothing survives, API-looking URLs in the page are fetched and scanned with
//! a reduced strategy set.
//!
//! Scoring policy: strategy weight (20/15/12/10/5 in cascade order), +10 for
//! https, +5 over 50 chars, +5 more over 100, +3 for a quality hint, +3 for a
//! CDN hint, +5 when the URL ends in `.m3u8`.

use std::collections::HashSet;
use std::time::Duration;

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;

pub const MANIFEST_EXT: &str = ".m3u8";
pub const DIRECT_EXT: &str = ".mp4";
const MIN_URL_LEN: usize = 20;
const SAMPLE_LEN: usize = 500;
const MAX_PROBES: usize = 5;
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

const QUALITY_HINTS: &[&str] = &["master", "playlist", "index", "1080", "720", "480", "360"];
const CDN_HINTS: &[&str] = &["cdn", "hls", "stream", "edge"];
const PROBE_HINTS: &[&str] = &["/api/", "/ajax/", "getsources", "/sources"];
const STATIC_EXTS: &[&str] = &[".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".woff", ".woff2", ".vtt"];

/// `atob` tolerates missing padding, so these do too.
const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

static PLAIN_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>()\\,;\]\}]+?\.m3u8[^\s"'<>()\\,;\]\}]*"#).expect("plain url regex")
});
static DIRECT_VIDEO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"https?://[^\s"'<>()\\,;\]\}]+?\.mp4[^\s"'<>()\\,;\]\}]*"#).expect("direct video regex")
});
static KEYED_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?\b(?:file|src|source|url|hls|playlist|stream)["']?\s*[:=]\s*["']([^"']+)["']"#)
        .expect("keyed property regex")
});
static FUNCTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[A-Za-z_$][\w$.]*\(\s*["']([^"']*\.m3u8[^"']*)["']"#).expect("function call regex")
});
static BASE64_PAYLOAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"atob\(\s*["']([A-Za-z0-9+/=_-]+)["']\s*\)|["']([A-Za-z0-9+/]{24,}={0,2})["']"#)
        .expect("base64 regex")
});
static LONG_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"["']([^"'\s]{20,})["']"#).expect("long quoted regex"));
static ENDPOINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']((?:https?:)?//[^"'\s<>]+|/[A-Za-z0-9_\-./?=&%]+)["']"#).expect("endpoint regex")
});

/// One way of pulling raw manifest candidates out of a body.
pub trait ManifestMatcher: Send + Sync {
    fn name(&self) -> &'static str;
    /// Base score for candidates this strategy finds.
    fn weight(&self) -> i32;
    fn attempt(&self, body: &str) -> Vec<String>;
}

fn captures(re: &Regex, body: &str) -> Vec<String> {
    re.captures_iter(body)
        .filter_map(|c| c.iter().skip(1).flatten().next().map(|m| m.as_str().to_string()))
        .collect()
}

pub struct PlainUrl;

impl ManifestMatcher for PlainUrl {
    fn name(&self) -> &'static str { "plain-url" }
    fn weight(&self) -> i32 { 20 }
    fn attempt(&self, body: &str) -> Vec<String> {
        PLAIN_URL.find_iter(body).map(|m| m.as_str().to_string()).collect()
    }
}

pub struct KeyedProperty;

impl ManifestMatcher for KeyedProperty {
    fn name(&self) -> &'static str { "keyed-property" }
    fn weight(&self) -> i32 { 15 }
    fn attempt(&self, body: &str) -> Vec<String> {
        captures(&KEYED_PROPERTY, body).into_iter().filter(|v| v.contains(MANIFEST_EXT)).collect()
    }
}

pub struct FunctionCall;

impl ManifestMatcher for FunctionCall {
    fn name(&self) -> &'static str { "function-call" }
    fn weight(&self) -> i32 { 12 }
    fn attempt(&self, body: &str) -> Vec<String> {
        captures(&FUNCTION_CALL, body)
    }
}

pub struct Base64Payload;

impl Base64Payload {
    fn decode(payload: &str) -> Option<String> {
        let bytes = STANDARD_LENIENT.decode(payload).or_else(|_| URL_SAFE_LENIENT.decode(payload)).ok()?;
        String::from_utf8(bytes).ok()
    }
}

impl ManifestMatcher for Base64Payload {
    fn name(&self) -> &'static str { "base64-payload" }
    fn weight(&self) -> i32 { 10 }
    fn attempt(&self, body: &str) -> Vec<String> {
        let mut out = Vec::new();
        for payload in captures(&BASE64_PAYLOAD, body) {
            let decoded = match Self::decode(&payload) {
                Some(d) if d.contains(MANIFEST_EXT) => d,
                _ => continue,
            };
            let urls: Vec<String> = PLAIN_URL.find_iter(&decoded).map(|m| m.as_str().to_string()).collect();
            if !urls.is_empty() {
                out.extend(urls);
            } else if !decoded.trim().contains(char::is_whitespace) {
                out.push(decoded.trim().to_string());
            }
        }
        out
    }
}

pub struct LongQuoted;

impl ManifestMatcher for LongQuoted {
    fn name(&self) -> &'static str { "long-quoted" }
    fn weight(&self) -> i32 { 5 }
    fn attempt(&self, body: &str) -> Vec<String> {
        captures(&LONG_QUOTED, body).into_iter().filter(|v| v.contains(MANIFEST_EXT)).collect()
    }
}

pub fn default_strategies() -> Vec<Box<dyn ManifestMatcher>> {
    vec![Box::new(PlainUrl), Box::new(KeyedProperty), Box::new(FunctionCall), Box::new(Base64Payload), Box::new(LongQuoted)]
}

pub fn probe_strategies() -> Vec<Box<dyn ManifestMatcher>> {
    vec![Box::new(PlainUrl), Box::new(KeyedProperty)]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub score: i32,
    pub strategy: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyReport {
    pub name: &'static str,
    pub matches: usize,
    pub accepted: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateReport {
    pub strategy: &'static str,
    pub raw: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    pub verdict: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub sample: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub iframe_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_error: Option<String>,
    pub iframe_sample: String,
    pub strategies: Vec<StrategyReport>,
    pub candidates: Vec<CandidateReport>,
    pub probes: Vec<ProbeReport>,
}

/// Result of one scan: surviving candidates best-first, plus what was tried.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub candidates: Vec<Candidate>,
    pub strategies: Vec<StrategyReport>,
    pub reports: Vec<CandidateReport>,
}

impl ScanOutcome {
    pub fn best(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub stream_url: Option<String>,
    pub candidates: Vec<Candidate>,
    /// Progressive `.mp4` links seen in the embed; never chosen as the stream.
    pub direct: Vec<String>,
    pub debug: DebugInfo,
}

fn sample(s: &str) -> String {
    s.chars().take(SAMPLE_LEN).collect()
}

fn unescape(raw: &str) -> String {
    raw.trim().replace("\\/", "/").replace("&amp;", "&")
}

/// Resolve protocol-relative and absolute-path candidates against the embed origin.
pub fn normalize(raw: &str, origin: Option<&Url>) -> Option<String> {
    let s = unescape(raw);
    if s.starts_with("http://") || s.starts_with("https://") {
        return Some(s);
    }
    let origin = origin?;
    if let Some(rest) = s.strip_prefix("//") {
        return Some(format!("{}://{}", origin.scheme(), rest));
    }
    if s.starts_with('/') {
        return origin.join(&s).ok().map(|u| u.to_string());
    }
    None
}

pub fn validate(url: &str) -> Result<(), &'static str> {
    let bare = url.trim_start_matches('.').to_ascii_lowercase();
    if bare == "m3u8" {
        return Err("degenerate value");
    }
    if url.len() < MIN_URL_LEN {
        return Err("too short");
    }
    if !url.contains(MANIFEST_EXT) {
        return Err("no manifest extension");
    }
    match Url::parse(url) {
        Ok(u) if matches!(u.scheme(), "http" | "https") && u.host_str().is_some() => Ok(()),
        _ => Err("not an http url"),
    }
}

pub fn score(url: &str, weight: i32) -> i32 {
    let lower = url.to_ascii_lowercase();
    let mut s = weight;
    if lower.starts_with("https://") { s += 10; }
    if url.len() > 50 { s += 5; }
    if url.len() > 100 { s += 5; }
    if QUALITY_HINTS.iter().any(|h| lower.contains(h)) { s += 3; }
    if CDN_HINTS.iter().any(|h| lower.contains(h)) { s += 3; }
    if lower.ends_with(MANIFEST_EXT) { s += 5; }
    s
}

/// Fold the strategies over `body`. Candidates come back best-first, deduplicated.
pub fn scan(body: &str, origin: Option<&Url>, strategies: &[Box<dyn ManifestMatcher>]) -> ScanOutcome {
    let body = body.replace("\\/", "/");
    strategies.iter().fold(ScanOutcome::default(), |mut out, strategy| {
        let raws = strategy.attempt(&body);
        let mut report = StrategyReport { name: strategy.name(), matches: raws.len(), accepted: 0 };
        for raw in raws {
            let verdict = normalize(&raw, origin)
                .ok_or("unresolvable")
                .and_then(|url| validate(&url).map(|_| url));
            match verdict {
                Ok(url) => {
                    let sc = score(&url, strategy.weight());
                    report.accepted += 1;
                    out.reports.push(CandidateReport {
                        strategy: strategy.name(),
                        raw: sample(&raw),
                        url: Some(url.clone()),
                        score: Some(sc),
                        verdict: "accepted".into(),
                    });
                    match out.candidates.iter_mut().find(|c| c.url == url) {
                        Some(existing) if existing.score < sc => {
                            existing.score = sc;
                            existing.strategy = strategy.name();
                        }
                        Some(_) => {}
                        None => out.candidates.push(Candidate { url, score: sc, strategy: strategy.name() }),
                    }
                }
                Err(reason) => out.reports.push(CandidateReport {
                    strategy: strategy.name(),
                    raw: sample(&raw),
                    url: None,
                    score: None,
                    verdict: reason.into(),
                }),
            }
        }
        out.strategies.push(report);
        out.candidates.sort_by(|a, b| b.score.cmp(&a.score));
        out
    })
}

/// Absolute `.mp4` links in `body`, in order of appearance.
pub fn direct_videos(body: &str) -> Vec<String> {
    let body = body.replace("\\/", "/");
    let mut seen = HashSet::new();
    DIRECT_VIDEO
        .find_iter(&body)
        .map(|m| unescape(m.as_str()))
        .filter(|u| Url::parse(u).is_ok_and(|p| p.host_str().is_some()))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

/// API-looking URLs in the body, resolved against the embed origin.
pub fn probe_endpoints(body: &str, origin: Option<&Url>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for raw in captures(&ENDPOINT, &body.replace("\\/", "/")) {
        let lower = raw.to_ascii_lowercase();
        if !PROBE_HINTS.iter().any(|h| lower.contains(h)) || lower.contains(MANIFEST_EXT) {
            continue;
        }
        let path = lower.split(['?', '#']).next().unwrap_or_default();
        if STATIC_EXTS.iter().any(|e| path.ends_with(e)) {
            continue;
        }
        let resolved = match (Url::parse(&raw), origin) {
            (Ok(u), _) => Some(u),
            (Err(_), Some(o)) => o.join(&raw).ok(),
            (Err(_), None) => None,
        };
        if let Some(u) = resolved.filter(|u| matches!(u.scheme(), "http" | "https")) {
            if seen.insert(u.to_string()) {
                out.push(u.to_string());
            }
        }
        if out.len() >= MAX_PROBES {
            break;
        }
    }
    out
}

pub struct SourceExtractor {
    fetcher: Fetcher,
    strategies: Vec<Box<dyn ManifestMatcher>>,
    probe_strategies: Vec<Box<dyn ManifestMatcher>>,
}

impl SourceExtractor {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher, strategies: default_strategies(), probe_strategies: probe_strategies() }
    }

    /// Never fails: an unreachable embed or an exhausted cascade gives `stream_url: None`.
    pub async fn extract(&self, iframe_url: &str, referer: &str) -> Extraction {
        let mut dbg = DebugInfo { iframe_url: iframe_url.to_string(), ..Default::default() };
        let page = match self.fetcher.fetch(iframe_url, Some(referer), crate::fetcher::RequestKind::Document).await {
            Ok(p) => p,
            Err(e) => {
                warn!(iframe_url, error = %e, "embed fetch failed");
                dbg.iframe_error = Some(e.to_string());
                return Extraction { debug: dbg, ..Default::default() };
            }
        };
        dbg.iframe_status = Some(page.status);
        dbg.iframe_sample = sample(&page.body);
        let direct = direct_videos(&page.body);

        let origin = Url::parse(&page.final_url).or_else(|_| Url::parse(iframe_url)).ok();
        let outcome = scan(&page.body, origin.as_ref(), &self.strategies);
        dbg.strategies = outcome.strategies;
        dbg.candidates = outcome.reports;
        if let Some(best) = outcome.candidates.first() {
            info!(iframe_url, url = %best.url, score = best.score, strategy = best.strategy, "manifest found");
            return Extraction { stream_url: Some(best.url.clone()), candidates: outcome.candidates, direct, debug: dbg };
        }

        for endpoint in probe_endpoints(&page.body, origin.as_ref()) {
            let mut report = ProbeReport { url: endpoint.clone(), ..Default::default() };
            match self.fetcher.fetch_with_timeout(&endpoint, Some(iframe_url), PROBE_TIMEOUT).await {
                Ok(resp) => {
                    report.status = Some(resp.status);
                    report.sample = sample(&resp.body);
                    let probe_origin = Url::parse(&resp.final_url).ok();
                    let found = scan(&resp.body, probe_origin.as_ref(), &self.probe_strategies);
                    if let Some(best) = found.best() {
                        info!(endpoint, url = %best.url, "manifest found via api probe");
                        report.found = Some(best.url.clone());
                        dbg.probes.push(report);
                        return Extraction {
                            stream_url: Some(best.url.clone()),
                            candidates: found.candidates,
                            direct,
                            debug: dbg,
                        };
                    }
                }
                Err(e) => {
                    warn!(endpoint, error = %e, "api probe failed");
                    report.error = Some(e.to_string());
                }
            }
            dbg.probes.push(report);
        }

        debug!(iframe_url, direct = direct.len(), "no manifest found");
        Extraction { direct, debug: dbg, ..Default::default() }
    }
}
