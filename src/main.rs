// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use clinic_sync::config::SyncConfig;
use clinic_sync::poller::ChangePoller;
use clinic_sync::server::{self, db};

#[derive(Parser, Debug)]
#[command(
    name = "clinic-sync",
    about = "Change-notification service for the clinic management app"
)]
struct Cli {
    /// Database to watch (overrides CLINIC_DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Address for the observer endpoint (overrides CLINIC_SYNC_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Poll interval in seconds, at least 1 (overrides CLINIC_SYNC_INTERVAL)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    interval: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(secs) = cli.interval {
        config.poll_interval = Duration::from_secs(secs);
    }

    info!("Starting clinic-sync");
    info!("{}", config.summary());

    // Refuse to start without a reachable database; once running, store
    // outages only pause delivery.
    let pool = match db::create_pool(&config.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("{}", e);
            error!("Check that the database exists and CLINIC_DATABASE_URL is correct");
            std::process::exit(1);
        }
    };
    if let Err(e) = db::probe(&pool).await {
        error!("{}", e);
        std::process::exit(1);
    }

    let poller = Arc::new(ChangePoller::new(
        pool,
        config.tables.clone(),
        config.row_cap,
    ));
    poller.start(config.poll_interval).await;

    let app = server::router(poller.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Observer endpoint listening on http://{}", config.bind_address);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    poller.stop().await;
    Ok(())
}
