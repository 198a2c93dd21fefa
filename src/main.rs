use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_fetch_bot::downloader::utils::ensure_download_dir;
use media_fetch_bot::downloader::{FetchCoordinator, Guard, YtDlpExtractor};
use media_fetch_bot::registry::TokenRegistry;
use media_fetch_bot::{telegram, Router, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_fetch_bot=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::parse();
    settings.validate().context("invalid configuration")?;

    let work_dir = ensure_download_dir(&settings.download_dir).with_context(|| {
        format!(
            "cannot create download directory {}",
            settings.download_dir.display()
        )
    })?;

    let ytdlp = settings.ytdlp_config();
    info!(
        binary = %ytdlp.binary,
        proxy = ytdlp.proxy.is_some(),
        work_dir = %work_dir.display(),
        max_concurrent = settings.max_concurrent_fetches,
        "starting media fetch bot"
    );

    let extractor = Arc::new(YtDlpExtractor::new(ytdlp));
    let coordinator = FetchCoordinator::new(extractor, settings.max_concurrent_fetches, work_dir);
    let registry = Arc::new(TokenRegistry::new(settings.registry_limits()));
    let router = Arc::new(Router::new(
        coordinator,
        registry,
        Guard::new(),
        settings.budgets(),
        settings.search_results,
    ));

    telegram::run(Bot::new(&settings.bot_token), router).await;
    Ok(())
}
