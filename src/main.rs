use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cache;
mod config;
mod error;
mod extract;
mod fetcher;
mod logging;
mod scraper;
mod server;
mod sources;
mod types;
mod util;

use config::Config;
use scraper::{Scraper, SourceRequest};

#[derive(Parser, Debug)]
#[command(name = "flixscrape", version, about = "Scrape listings, details and HLS streams from a flixhq-style site", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the JSON HTTP API
    Serve {
        #[arg(long, env = "FLIX_LISTEN", default_value = "0.0.0.0:3030")]
        listen: String,
    },

    /// Spotlight, trending, latest and coming-soon lists
    Home,

    /// Details for a title id
    Detail { id: String },

    /// Search titles
    Search { query: String },

    /// Seasons of a series
    Seasons { id: String },

    /// Episodes of a season
    Episodes { season_id: String },

    /// Streaming servers of an episode
    Servers { episode_id: String },

    /// Resolve the HLS stream behind a server
    #[command(visible_alias = "src")]
    Sources {
        server_id: String,
        #[arg(long)]
        episode_id: Option<String>,
        /// Show what each matcher found
        #[arg(short, long)]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    let scraper = Scraper::new(cli.config.clone()).context("failed to build http client")?;
    let json = cli.json;

    match cli.command {
        Commands::Serve { listen } => server::run(scraper, &listen).await,
        Commands::Home => {
            let pb = util::spinner("fetching home", json);
            let home = scraper.home().await.context("home failed")?;
            pb.finish_and_clear();
            if json {
                util::print_output(&home, true);
            } else {
                util::print_home_human(&home);
            }
            Ok(())
        }
        Commands::Detail { id } => {
            let pb = util::spinner("fetching detail", json);
            let detail = scraper.detail(&id).await.with_context(|| format!("detail {} failed", id))?;
            pb.finish_and_clear();
            if json {
                util::print_output(&detail, true);
            } else {
                util::print_detail_human(&detail);
            }
            Ok(())
        }
        Commands::Search { query } => {
            let pb = util::spinner("searching", json);
            let items = scraper.search(&query).await.with_context(|| format!("search {:?} failed", query))?;
            pb.finish_and_clear();
            if json {
                util::print_output(&items, true);
            } else {
                util::print_listing_table(&items);
            }
            Ok(())
        }
        Commands::Seasons { id } => {
            let seasons = scraper.seasons(&id).await.with_context(|| format!("seasons of {} failed", id))?;
            if json {
                util::print_output(&seasons, true);
            } else {
                util::print_seasons_human(&seasons);
            }
            Ok(())
        }
        Commands::Episodes { season_id } => {
            let episodes = scraper
                .episodes(Some(season_id.as_str()))
                .await
                .with_context(|| format!("episodes of season {} failed", season_id))?;
            if json {
                util::print_output(&episodes, true);
            } else {
                util::print_episodes_human(&episodes);
            }
            Ok(())
        }
        Commands::Servers { episode_id } => {
            let servers = scraper
                .servers(Some(episode_id.as_str()))
                .await
                .with_context(|| format!("servers of episode {} failed", episode_id))?;
            if json {
                util::print_output(&servers, true);
            } else {
                util::print_servers_human(&servers);
            }
            Ok(())
        }
        Commands::Sources { server_id, episode_id, verbose } => {
            let pb = util::spinner("resolving stream", json);
            let req = SourceRequest { server_id: Some(server_id.clone()), episode_id, debug: verbose };
            let res = scraper.sources(&req).await.with_context(|| format!("sources of server {} failed", server_id))?;
            pb.finish_and_clear();
            if json {
                util::print_output(&res, true);
            } else {
                util::print_sources_human(&res, verbose);
            }
            Ok(())
        }
    }
}
