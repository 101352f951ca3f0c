use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MovieStats {
    pub year: String,
    pub duration: String,
    pub rating: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TvSeriesStats {
    pub seasons: String,
    pub episodes: String,
    pub rating: String,
}

/// One card in a list view. The variant is decided once, by `.fdi-type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ListingItem {
    Movie(MovieItem),
    TvSeries(TvSeriesItem),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovieItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    pub stats: MovieStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TvSeriesItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,
    /// Year parsed from the card, only used for enrichment.
    #[serde(skip)]
    pub year: Option<String>,
    pub stats: TvSeriesStats,
}

impl ListingItem {
    pub fn id(&self) -> &str {
        match self {
            ListingItem::Movie(m) => &m.id,
            ListingItem::TvSeries(t) => &t.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ListingItem::Movie(m) => &m.title,
            ListingItem::TvSeries(t) => &t.title,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            ListingItem::Movie(_) => "movie",
            ListingItem::TvSeries(_) => "tv",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpotlightItem {
    pub id: String,
    pub title: String,
    pub banner: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trending {
    pub movies: Vec<ListingItem>,
    pub tv_series: Vec<ListingItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub spotlight: Vec<SpotlightItem>,
    pub trending: Trending,
    pub latest_movies: Vec<ListingItem>,
    pub latest_tv_series: Vec<ListingItem>,
    pub coming_soon: Vec<ListingItem>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    Movie,
    TvSeries,
    #[default]
    Unknown,
}

/// A stat cell holds plain text, or the anchor texts when it lists links.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum StatValue {
    Single(String),
    Multi(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stat {
    pub name: String,
    pub value: StatValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelatedItem {
    pub id: String,
    pub title: String,
    pub poster: String,
    pub href: String,
    pub stats: MovieStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailRecord {
    pub title: String,
    pub description: String,
    pub poster: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<String>,
    pub stats: Vec<Stat>,
    pub related: Vec<RelatedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Season {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Server {
    pub id: String,
    pub name: String,
}

/// Upstream `/ajax/episode/sources/{id}` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamSource {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    pub url: String,
    pub quality: String,
    #[serde(rename = "isM3U8")]
    pub is_m3u8: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpisodeRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub server_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
    pub stream_url: Option<String>,
    pub sources: Vec<StreamSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<Server>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<EpisodeRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<crate::sources::iframe::DebugInfo>,
}
