use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise `--debug` picks the level.
pub fn init_logging(debug: bool) {
    let default = if debug { "flixscrape=debug,tower_http=debug" } else { "flixscrape=info,tower_http=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_writer(std::io::stderr)
        .try_init();
}
