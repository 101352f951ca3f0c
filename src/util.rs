use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::types::{DetailRecord, Episode, HomePage, ListingItem, Season, Server, SourceResult, StatValue};

pub fn print_output<T: Serialize + std::fmt::Debug>(value: &T, json: bool) {
    if json {
        match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(_) => println!("{:?}", value),
        }
    } else {
        println!("{:?}", value);
    }
}

/// Spinner on stderr while a pipeline runs; hidden for `--json`.
pub fn spinner(msg: &str, json: bool) -> ProgressBar {
    if json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn stats_cell(item: &ListingItem) -> String {
    match item {
        ListingItem::Movie(m) => [&m.stats.year, &m.stats.duration]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" · "),
        ListingItem::TvSeries(t) => [&t.stats.seasons, &t.stats.episodes]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" · "),
    }
}

fn tmdb_cell(item: &ListingItem) -> String {
    let id = match item {
        ListingItem::Movie(m) => m.tmdb_id,
        ListingItem::TvSeries(t) => t.tmdb_id,
    };
    id.map(|i| i.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn print_listing_table(items: &[ListingItem]) {
    println!("{} {}", "Total".bold(), items.len());

    let index_header = "#";
    let id_header = "ID";
    let kind_header = "Kind";
    let tmdb_header = "TMDB";
    let title_header = "Title";

    let index_width = std::cmp::max(index_header.len(), format!("{}", items.len()).len());
    let id_width = std::cmp::max(id_header.len(), items.iter().map(|i| i.id().len()).max().unwrap_or(0));
    let tmdb_width = std::cmp::max(tmdb_header.len(), items.iter().map(|i| tmdb_cell(i).len()).max().unwrap_or(0));

    println!(
        "{:<iw$}  {:<dw$}  {:<5}  {:<tw$}  {}",
        index_header.bold(),
        id_header.bold(),
        kind_header.bold(),
        tmdb_header.bold(),
        title_header.bold(),
        iw = index_width,
        dw = id_width,
        tw = tmdb_width
    );
    println!(
        "{:<iw$}  {:<dw$}  {:<5}  {:<tw$}  {}",
        "-".repeat(index_width),
        "-".repeat(id_width),
        "-".repeat(5),
        "-".repeat(tmdb_width),
        "-".repeat(10),
        iw = index_width,
        dw = id_width,
        tw = tmdb_width
    );

    for (idx, item) in items.iter().enumerate() {
        let stats = stats_cell(item);
        let title = if stats.is_empty() { item.title().to_string() } else { format!("{} {}", item.title(), stats.dimmed()) };
        println!(
            "{:<iw$}  {:<dw$}  {:<5}  {:<tw$}  {}",
            idx + 1,
            item.id(),
            item.kind_label(),
            tmdb_cell(item),
            title,
            iw = index_width,
            dw = id_width,
            tw = tmdb_width
        );
    }
}

pub fn print_home_human(home: &HomePage) {
    if !home.spotlight.is_empty() {
        println!("{}", "Spotlight".green().bold());
        for (i, s) in home.spotlight.iter().enumerate() {
            let rating = s.rating.as_deref().map(|r| format!(" (IMDB {})", r)).unwrap_or_default();
            println!("  {}. {} [{}]{}", i + 1, s.title.bold(), s.id, rating);
        }
        println!();
    }
    let sections: [(&str, &[ListingItem]); 5] = [
        ("Trending Movies", home.trending.movies.as_slice()),
        ("Trending TV", home.trending.tv_series.as_slice()),
        ("Latest Movies", home.latest_movies.as_slice()),
        ("Latest TV Shows", home.latest_tv_series.as_slice()),
        ("Coming Soon", home.coming_soon.as_slice()),
    ];
    for (name, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("{}", name.green().bold());
        print_listing_table(items);
        println!();
    }
}

pub fn print_detail_human(detail: &DetailRecord) {
    println!("Title: {}", detail.title.bold());
    println!("Type:  {:?}", detail.kind);
    if let Some(ep) = &detail.episode_id {
        println!("Episode id: {}", ep);
    }
    if !detail.poster.is_empty() {
        println!("Poster: {}", detail.poster);
    }
    for stat in &detail.stats {
        let value = match &stat.value {
            StatValue::Single(s) => s.clone(),
            StatValue::Multi(v) => v.join(", "),
        };
        println!("{}: {}", stat.name.trim_end_matches(':'), value);
    }
    if !detail.description.is_empty() {
        println!("Overview:\n{}", detail.description);
    }
    if !detail.related.is_empty() {
        println!("{}", "Related:".yellow().bold());
        for (i, r) in detail.related.iter().enumerate() {
            println!("  {}. {} [{}] {}", i + 1, r.title, r.id, r.stats.year.dimmed());
        }
    }
}

pub fn print_seasons_human(seasons: &[Season]) {
    for s in seasons {
        println!("{:<10}  {}", s.id.cyan(), s.title);
    }
}

pub fn print_episodes_human(episodes: &[Episode]) {
    for e in episodes {
        println!("{:<10}  {}", e.id.cyan(), e.title);
    }
}

pub fn print_servers_human(servers: &[Server]) {
    for s in servers {
        println!("{:<10}  {}", s.id.cyan(), s.name);
    }
}

pub fn print_sources_human(res: &SourceResult, verbose: bool) {
    println!("Server: {}{}", res.server_id.bold(), res.server.as_ref().map(|s| format!(" ({})", s.name)).unwrap_or_default());
    println!("Type:   {}", res.kind);
    if !res.link.is_empty() {
        println!("Embed:  {}", res.link);
    }
    if let Some(err) = &res.error {
        println!("{}", err.red().bold());
    }
    match &res.stream_url {
        Some(url) => println!("{} {}", "Stream:".green().bold(), url.cyan()),
        None => println!("{}", "No stream URL found".red().bold()),
    }
    if res.sources.len() > 1 {
        println!("{}", "Candidates:".yellow().bold());
        for (i, s) in res.sources.iter().enumerate() {
            println!("  {}. [{}] {}", i + 1, s.quality, s.url);
        }
    }
    if let (true, Some(debug)) = (verbose, &res.debug_info) {
        println!("{}", "Strategies:".yellow().bold());
        for s in &debug.strategies {
            println!("  {:<16} matches {:<3} accepted {}", s.name, s.matches, s.accepted);
        }
        for c in &debug.candidates {
            println!("  {:<16} {} {}", c.strategy, c.verdict, c.raw.dimmed());
        }
        for p in &debug.probes {
            let status = p.status.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            println!("  probe {} {} {}", status, p.url, p.found.as_deref().unwrap_or(""));
        }
    }
}
