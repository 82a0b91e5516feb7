use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use reqwest::Client;
use tokio::time;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telereddit::{bot::Bot, config::Config, pipeline::Pipeline, telegram::TelegramClient};

/// Pause after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to configuration file.
    #[arg(long, default_value = ".telereddit.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let Args { config } = Args::parse();

    let cfg = match Config::from_path(&config) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load config {}: {e}", config.display());
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match Pipeline::new(&cfg) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to set up clients: {e}");
            return ExitCode::FAILURE;
        }
    };
    let telegram = TelegramClient::new(Client::new(), &cfg.telegram_token, &cfg.telegram);
    let bot = Arc::new(Bot::new(pipeline, telegram));

    info!("Polling for updates");
    let mut offset = 0;
    loop {
        let updates = match bot.telegram.get_updates(offset, cfg.telegram.poll_timeout).await {
            Ok(v) => v,
            Err(e) => {
                error!("Failed to get updates: {e}");
                time::sleep(POLL_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let bot = Arc::clone(&bot);
            tokio::spawn(async move { bot.handle(update).await });
        }
    }
}
