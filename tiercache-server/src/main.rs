use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tiercache_server::{AppState, ServerConfig, TieredCache, UpstreamClient, create_router};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "tiercache-server")]
#[command(about = "Tiered response cache for expensive API calls", long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    config.apply_env_overrides();
    if let Some(port) = args.port {
        config.server.port = port;
    }

    init_tracing(&config);

    info!("Starting Tiercache Server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!("Loaded configuration from {}", path.display());
    }

    tiercache_server::metrics::init_metrics();

    // Create cache engine and its sweepers/reporter
    let cache = TieredCache::new(config.to_cache_config());
    let _background = cache.start_background_tasks();

    let upstream = UpstreamClient::from_config(&config.upstream)?;
    match &upstream {
        Some(client) => info!("Proxying cached calls to {}", client.base_url()),
        None => info!("No upstream configured, /cache/call is disabled"),
    }

    // Create router
    let app = create_router(AppState::new(cache, upstream));

    // Bind server
    let addr = config.server_addr();
    info!("Listening on http://{}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
