//! HTML to typed records. Nothing here fails: missing markup gives empty fields.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::sources::tmdb::extract_year;
use crate::types::{
    ContentKind, DetailRecord, Episode, HomePage, ListingItem, MovieItem, MovieStats, RelatedItem, Season, Server,
    SpotlightItem, Stat, StatValue, TvSeriesItem, TvSeriesStats,
};

static BANNER_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"url\(['"]?(.*?)['"]?\)"#).expect("banner regex"));
static SCRIPT_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"type:\s*['"](\d+)['"]"#).expect("type regex"));
static SCRIPT_EPISODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)episode_?id\s*:\s*['"]([^'"]+)['"]"#).expect("episode regex"));

/// Literal selectors only.
fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn text_of(el: ElementRef, css: &str) -> String {
    el.select(&sel(css)).next().map(text).unwrap_or_default()
}

fn attr_of(el: ElementRef, css: &str, attr: &str) -> Option<String> {
    el.select(&sel(css))
        .next()
        .and_then(|n| n.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First non-empty text among `selectors`, in order.
fn first_text(el: ElementRef, selectors: &[&str]) -> String {
    selectors.iter().map(|css| text_of(el, *css)).find(|t| !t.is_empty()).unwrap_or_default()
}

/// First non-empty attribute among `(selector, attribute)` pairs, in order.
fn first_attr(el: ElementRef, candidates: &[(&str, &str)]) -> Option<String> {
    candidates.iter().find_map(|(css, attr)| attr_of(el, *css, *attr))
}

/// Id is whatever follows the last `-` of the href; no hyphen means no id.
pub fn id_from_href(href: &str) -> String {
    href.rsplit_once('-').map(|(_, id)| id.trim_end_matches('/').to_string()).unwrap_or_default()
}

fn card_href_and_title(el: ElementRef) -> (String, String) {
    let href = attr_of(el, "h3.film-name a", "href").unwrap_or_default();
    let title = attr_of(el, "h3.film-name a", "title").unwrap_or_else(|| text_of(el, "h3.film-name a"));
    (href, title)
}

fn card_poster(el: ElementRef) -> Option<String> {
    first_attr(el, &[("img.film-poster-img", "data-src"), ("img.film-poster-img", "src")])
}

pub fn parse_movie(el: ElementRef) -> MovieItem {
    let (href, title) = card_href_and_title(el);
    MovieItem {
        id: id_from_href(&href),
        title,
        poster: card_poster(el),
        tmdb_id: None,
        stats: MovieStats {
            year: text_of(el, ".fd-infor .fdi-item"),
            duration: text_of(el, ".fd-infor .fdi-duration"),
            rating: String::new(),
        },
    }
}

pub fn parse_tv_series(el: ElementRef) -> TvSeriesItem {
    let (href, title) = card_href_and_title(el);
    TvSeriesItem {
        id: id_from_href(&href),
        title,
        poster: card_poster(el),
        tmdb_id: None,
        year: extract_year(&text_of(el, ".fd-infor .fdi-item")),
        stats: TvSeriesStats {
            seasons: text_of(el, ".fd-infor > span:nth-child(1)"),
            episodes: text_of(el, ".fd-infor > span:nth-child(3)"),
            rating: String::new(),
        },
    }
}

/// The one place a card becomes a movie or a series.
pub fn classify(el: ElementRef) -> ListingItem {
    if text_of(el, ".fdi-type") == "TV" {
        ListingItem::TvSeries(parse_tv_series(el))
    } else {
        ListingItem::Movie(parse_movie(el))
    }
}

fn parse_spotlight(el: ElementRef) -> SpotlightItem {
    let href = attr_of(el, "a.slide-link", "href").unwrap_or_default();
    let style = el.value().attr("style").unwrap_or_default();
    let banner = BANNER_URL
        .captures(style)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let rating = el
        .select(&sel(".scd-item"))
        .find(|n| text(*n).contains("IMDB"))
        .map(|n| text_of(n, "strong"))
        .filter(|r| !r.is_empty());
    SpotlightItem {
        id: id_from_href(&href),
        title: text_of(el, "h3.film-title a"),
        description: text_of(el, "p.sc-desc"),
        banner,
        rating,
    }
}

pub fn parse_home(body: &str) -> HomePage {
    let doc = Html::parse_document(body);
    let root = doc.root_element();
    let mut page = HomePage::default();

    page.spotlight = root
        .select(&sel("#slider .swiper-wrapper .swiper-slide:not(.swiper-slide-duplicate)"))
        .map(parse_spotlight)
        .collect();

    let items = sel(".flw-item");
    for section in root.select(&sel("section.block_area_home")) {
        match text_of(section, "h2.cat-heading").as_str() {
            "Trending" => {
                page.trending.movies = section
                    .select(&sel("#trending-movies .flw-item"))
                    .map(|el| ListingItem::Movie(parse_movie(el)))
                    .collect();
                page.trending.tv_series = section
                    .select(&sel("#trending-tv .flw-item"))
                    .map(|el| ListingItem::TvSeries(parse_tv_series(el)))
                    .collect();
            }
            "Latest Movies" => {
                page.latest_movies = section.select(&items).map(|el| ListingItem::Movie(parse_movie(el))).collect();
            }
            "Latest TV Shows" => {
                page.latest_tv_series =
                    section.select(&items).map(|el| ListingItem::TvSeries(parse_tv_series(el))).collect();
            }
            "Coming Soon" => {
                page.coming_soon = section.select(&items).map(classify).collect();
            }
            _ => {}
        }
    }
    page
}

pub fn parse_listing(body: &str) -> Vec<ListingItem> {
    let doc = Html::parse_document(body);
    doc.root_element().select(&sel(".flw-item")).map(classify).collect()
}

/// Reads the inline `const movie = { ... }` block: `type: '1'` is a movie,
/// anything else a series. Movies also carry the episode id four lines down.
pub fn classify_script(body: &str) -> (ContentKind, Option<String>) {
    let lines: Vec<&str> = body.lines().collect();
    let start = match lines.iter().rposition(|l| l.contains("const movie = {")) {
        Some(i) => i,
        None => return (ContentKind::Unknown, None),
    };
    let end = lines[start..].iter().position(|l| l.contains('}')).map(|p| start + p).unwrap_or(lines.len() - 1);
    let block = lines[start..=end.min(start + 12)].join("\n");

    let is_movie = SCRIPT_TYPE.captures(&block).and_then(|c| c.get(1)).is_some_and(|m| m.as_str() == "1");
    if !is_movie {
        return (ContentKind::TvSeries, None);
    }
    let episode_id = SCRIPT_EPISODE
        .captures(&block)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| lines.get(start + 4).and_then(|l| l.split('\'').nth(1)).map(str::to_string))
        .filter(|id| !id.is_empty());
    (ContentKind::Movie, episode_id)
}

fn parse_stat(row: ElementRef) -> Stat {
    let anchors: Vec<String> = row.select(&sel(".value a")).map(text).collect();
    let value = if anchors.is_empty() { StatValue::Single(text_of(row, ".value")) } else { StatValue::Multi(anchors) };
    Stat { name: text_of(row, ".name"), value }
}

fn parse_related(el: ElementRef) -> Option<RelatedItem> {
    let href = first_attr(el, &[("a", "href"), (".film-poster-ahref", "href")]).unwrap_or_default();
    let id = id_from_href(&href);
    let mut title = first_text(el, &[".film-name", ".movie-name", "h3", ".title"]);
    if title.is_empty() {
        title = attr_of(el, "a", "title").unwrap_or_default();
    }
    if id.is_empty() || title.is_empty() {
        return None;
    }
    let poster = first_attr(
        el,
        &[("img", "src"), ("img", "data-src"), (".film-poster-img", "src"), (".film-poster-img", "data-src")],
    )
    .unwrap_or_default();
    Some(RelatedItem {
        id,
        title,
        poster,
        href,
        stats: MovieStats {
            year: first_text(el, &[".fdi-item", ".year"]),
            duration: first_text(el, &[".fdi-duration", ".duration"]),
            rating: first_text(el, &[".fdi-rating", ".rating", ".imdb"]),
        },
    })
}

pub fn parse_detail(body: &str) -> DetailRecord {
    let doc = Html::parse_document(body);
    let root = doc.root_element();

    let poster = first_attr(
        root,
        &[
            (".movie-detail .movie-image img", "src"),
            (".movie-detail .movie-image img", "data-src"),
            (".movie-poster img", "src"),
            (".movie-poster img", "data-src"),
            (".film-poster img", "src"),
            (".film-poster img", "data-src"),
        ],
    )
    .unwrap_or_default();

    let stats = root.select(&sel(".movie-detail .is-sub > div")).map(parse_stat).collect();

    let mut related: Vec<RelatedItem> = Vec::new();
    for container in [sel(".section-related .item"), sel(".film_related .flw-item")] {
        related = root.select(&container).filter_map(parse_related).collect();
        if !related.is_empty() {
            break;
        }
    }

    let (kind, episode_id) = classify_script(body);
    DetailRecord {
        title: text_of(root, ".movie-detail h3.movie-name"),
        description: text_of(root, ".movie-detail .is-description .dropdown-menu .dropdown-text"),
        poster,
        kind,
        episode_id,
        stats,
        related,
    }
}

pub fn parse_seasons(body: &str) -> Vec<Season> {
    let doc = Html::parse_fragment(body);
    doc.root_element()
        .select(&sel(".dropdown-item[data-id], .ss-item[data-id]"))
        .filter_map(|el| {
            let id = el.value().attr("data-id")?.trim().to_string();
            Some(Season { id, title: text(el) })
        })
        .collect()
}

pub fn parse_episodes(body: &str) -> Vec<Episode> {
    let doc = Html::parse_fragment(body);
    doc.root_element()
        .select(&sel(".nav-item a[data-id], .eps-item[data-id]"))
        .filter_map(|el| {
            let id = el.value().attr("data-id")?.trim().to_string();
            let title = el.value().attr("title").map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).unwrap_or_else(|| text(el));
            Some(Episode { id, title })
        })
        .collect()
}

pub fn parse_servers(body: &str) -> Vec<Server> {
    let doc = Html::parse_fragment(body);
    doc.root_element()
        .select(&sel(".nav-item a[data-id], .nav-item a[data-linkid], .link-item[data-id]"))
        .filter_map(|el| {
            let id = el.value().attr("data-id").or_else(|| el.value().attr("data-linkid"))?.trim().to_string();
            let name = el
                .value()
                .attr("title")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .or_else(|| Some(text_of(el, "span")).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| text(el));
            let name = name.strip_prefix("Server ").map(str::to_string).unwrap_or(name);
            Some(Server { id, name })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOME: &str = r#"
<html><body>
<div id="slider"><div class="swiper-wrapper">
  <div class="swiper-slide" style="background-image: url(https://img.example.com/banner1.jpg);">
    <a class="slide-link" href="/movie/watch-dune-part-two-105555"></a>
    <h3 class="film-title"><a>Dune: Part Two</a></h3>
    <p class="sc-desc"> Paul Atreides unites with the Fremen. </p>
    <div class="scd-item">HD</div>
    <div class="scd-item">IMDB: <strong>8.6</strong></div>
  </div>
  <div class="swiper-slide swiper-slide-duplicate" style="background-image: url('x.jpg')">
    <a class="slide-link" href="/movie/watch-dup-1"></a>
  </div>
</div></div>
<section class="block_area_home">
  <h2 class="cat-heading">Trending</h2>
  <div id="trending-movies">
    <div class="flw-item">
      <img class="film-poster-img" data-src="https://img.example.com/p1.jpg" src="placeholder.png">
      <h3 class="film-name"><a href="/movie/watch-oppenheimer-98446" title="Oppenheimer">Oppen...</a></h3>
      <div class="fd-infor"><span class="fdi-item">2023</span><span class="dot"></span><span class="fdi-item fdi-duration">180m</span><span class="fdi-type">Movie</span></div>
    </div>
  </div>
  <div id="trending-tv">
    <div class="flw-item">
      <h3 class="film-name"><a href="/tv/watch-the-bear-90522" title="The Bear">The Bear</a></h3>
      <div class="fd-infor"><span class="fdi-item">SS 3</span><span class="dot"></span><span class="fdi-item">EPS 10</span><span class="fdi-type">TV</span></div>
    </div>
  </div>
</section>
<section class="block_area_home">
  <h2 class="cat-heading">Coming Soon</h2>
  <div class="flw-item">
    <h3 class="film-name"><a href="/tv/watch-severance-74123" title="Severance">Severance</a></h3>
    <div class="fd-infor"><span class="fdi-item">SS 2</span><span class="dot"></span><span class="fdi-item">EPS 1</span><span class="fdi-type">TV</span></div>
  </div>
  <div class="flw-item">
    <h3 class="film-name"><a href="nohyphen" title="Mystery">Mystery</a></h3>
  </div>
</section>
</body></html>"#;

    #[test]
    fn id_is_text_after_last_hyphen() {
        assert_eq!(id_from_href("/movie/watch-oppenheimer-98446"), "98446");
        assert_eq!(id_from_href("/tv/watch-the-bear-90522/"), "90522");
        assert_eq!(id_from_href("nohyphen"), "");
        assert_eq!(id_from_href(""), "");
    }

    #[test]
    fn home_sections_are_parsed() {
        let page = parse_home(HOME);

        assert_eq!(page.spotlight.len(), 1);
        let s = &page.spotlight[0];
        assert_eq!(s.id, "105555");
        assert_eq!(s.title, "Dune: Part Two");
        assert_eq!(s.banner, "https://img.example.com/banner1.jpg");
        assert_eq!(s.description, "Paul Atreides unites with the Fremen.");
        assert_eq!(s.rating.as_deref(), Some("8.6"));

        assert_eq!(page.trending.movies.len(), 1);
        match &page.trending.movies[0] {
            ListingItem::Movie(m) => {
                assert_eq!(m.id, "98446");
                assert_eq!(m.title, "Oppenheimer");
                assert_eq!(m.poster.as_deref(), Some("https://img.example.com/p1.jpg"));
                assert_eq!(m.stats.year, "2023");
                assert_eq!(m.stats.duration, "180m");
            }
            other => panic!("expected movie, got {:?}", other),
        }
        match &page.trending.tv_series[0] {
            ListingItem::TvSeries(t) => {
                assert_eq!(t.id, "90522");
                assert_eq!(t.stats.seasons, "SS 3");
                assert_eq!(t.stats.episodes, "EPS 10");
                assert!(t.poster.is_none());
            }
            other => panic!("expected series, got {:?}", other),
        }
        assert!(page.latest_movies.is_empty());
    }

    #[test]
    fn coming_soon_is_classified_and_tolerates_partial_cards() {
        let page = parse_home(HOME);
        assert_eq!(page.coming_soon.len(), 2);
        assert!(matches!(page.coming_soon[0], ListingItem::TvSeries(_)));
        match &page.coming_soon[1] {
            ListingItem::Movie(m) => {
                assert_eq!(m.id, "");
                assert_eq!(m.title, "Mystery");
                assert_eq!(m.stats, MovieStats::default());
            }
            other => panic!("missing type marker should default to movie, got {:?}", other),
        }
    }

    const DETAIL: &str = r#"<html><body>
<div class="movie-detail">
  <div class="movie-image"><img src="https://img.example.com/poster.jpg"></div>
  <h3 class="movie-name"> Oppenheimer </h3>
  <div class="is-description"><div class="dropdown-menu"><div class="dropdown-text">The story of J. Robert Oppenheimer.</div></div></div>
  <div class="is-sub">
    <div><span class="name">Genre:</span><span class="value"><a>Drama</a><a>History</a></span></div>
    <div><span class="name">Duration:</span><span class="value"> 180 min </span></div>
  </div>
</div>
<div class="section-related">
  <div class="item"><a href="/movie/watch-barbie-99001" title="Barbie"></a><img data-src="b.jpg"><span class="fdi-item">2023</span></div>
  <div class="item"><a href="/broken"></a><h3>No id here</h3></div>
</div>
<script>
    const movie = {
        id: '98446',
        type: '1',
        name: 'Oppenheimer',
        episode: '1234567',
    };
</script>
</body></html>"#;

    #[test]
    fn detail_fields_are_parsed() {
        let d = parse_detail(DETAIL);
        assert_eq!(d.title, "Oppenheimer");
        assert_eq!(d.description, "The story of J. Robert Oppenheimer.");
        assert_eq!(d.poster, "https://img.example.com/poster.jpg");
        assert_eq!(d.kind, ContentKind::Movie);
        assert_eq!(d.episode_id.as_deref(), Some("1234567"));
        assert_eq!(
            d.stats,
            vec![
                Stat { name: "Genre:".into(), value: StatValue::Multi(vec!["Drama".into(), "History".into()]) },
                Stat { name: "Duration:".into(), value: StatValue::Single("180 min".into()) },
            ]
        );
        assert_eq!(d.related.len(), 1);
        assert_eq!(d.related[0].id, "99001");
        assert_eq!(d.related[0].title, "Barbie");
        assert_eq!(d.related[0].poster, "b.jpg");
        assert_eq!(d.related[0].stats.year, "2023");
    }

    #[test]
    fn script_marker_decides_content_kind() {
        let tv = "const movie = {\n  id: '1',\n  type: '2',\n  name: 'x',\n  episode: '9',\n};";
        assert_eq!(classify_script(tv), (ContentKind::TvSeries, None));
        assert_eq!(classify_script("<html></html>"), (ContentKind::Unknown, None));
        let keyed = "const movie = {\n type: '1',\n episode_id: '55'\n}";
        assert_eq!(classify_script(keyed), (ContentKind::Movie, Some("55".into())));
    }

    #[test]
    fn empty_document_gives_empty_detail() {
        let d = parse_detail("");
        assert_eq!(d.title, "");
        assert!(d.stats.is_empty());
        assert!(d.related.is_empty());
        assert_eq!(d.kind, ContentKind::Unknown);
    }

    #[test]
    fn ajax_fragments_are_parsed() {
        let seasons = parse_seasons(r#"<div class="dropdown-menu"><a class="dropdown-item ss-item" data-id="101">Season 1</a><a class="dropdown-item" data-id="102">Season 2</a></div>"#);
        assert_eq!(seasons, vec![Season { id: "101".into(), title: "Season 1".into() }, Season { id: "102".into(), title: "Season 2".into() }]);

        let episodes = parse_episodes(r#"<ul><li class="nav-item"><a data-id="5001" title="Eps 1: Pilot">Episode 1</a></li><li class="nav-item"><a data-id="5002">Episode 2</a></li></ul>"#);
        assert_eq!(episodes[0], Episode { id: "5001".into(), title: "Eps 1: Pilot".into() });
        assert_eq!(episodes[1].title, "Episode 2");

        let servers = parse_servers(r#"<ul><li class="nav-item"><a data-id="777" title="Server UpCloud"><span>UpCloud</span></a></li><li class="nav-item"><a data-linkid="778"><span>Vidcloud</span></a></li></ul>"#);
        assert_eq!(servers, vec![Server { id: "777".into(), name: "UpCloud".into() }, Server { id: "778".into(), name: "Vidcloud".into() }]);
    }
}
