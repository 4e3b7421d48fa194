use tokio_util::sync::CancellationToken;

use tweet_uploader::{config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loaded before the logger exists so its level can come from the file
    let config = config::load_config()?;
    let level = config
        .log_level
        .parse::<log::LevelFilter>()
        .unwrap_or(log::LevelFilter::Info);

    // RUST_LOG, when set, overrides the configured level
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    log::info!("Starting tweet uploader");

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Shutdown requested, cancelling in-flight uploads");
                signal_token.cancel();
            }
            Err(e) => log::error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server::serve(&config, shutdown).await?;
    Ok(())
}
