use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;

use report_bot::bot::{Dispatcher, ReportBot};
use report_bot::channels::{Channel, CliChannel, TelegramChannel};
use report_bot::config::{BotConfig, scrub_credentials};

/// Console plus a daily rolling file under `log_dir`. The guard must live
/// until exit or buffered lines are lost.
fn init_tracing(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "report-bot.log"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match BotConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_tracing(&config.log_dir)?;

    eprintln!("📝 Report Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Config: {}", config.source_path.display());
    eprintln!("   Template: {}", config.template_path.display());
    eprintln!("   Storage: {}", config.storage_dir.display());

    if !config.template_path.is_file() {
        tracing::warn!(
            path = %config.template_path.display(),
            "Template not found; reports will fail until it exists"
        );
    }

    let bot = ReportBot::from_config(&config)
        .await
        .with_context(|| format!("opening storage in {}", config.storage_dir.display()))?;

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.bot_token {
        Some(token) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if config.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    config.allowed_users.join(", ")
                }
            );
            Arc::new(TelegramChannel::new(
                token.clone(),
                config.allowed_users.clone(),
            ))
        }
        None => {
            eprintln!("   No BOT_TOKEN set, using the console. /foto <ruta> sends a photo.\n");
            Arc::new(CliChannel::new())
        }
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), error = %e, "Health check failed");
    }

    let dispatcher = Dispatcher::new(bot, Arc::clone(&channel));
    let stream = channel.start().await.context("starting channel")?;

    tokio::select! {
        _ = dispatcher.run(stream) => {
            tracing::info!("Channel stream ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    if let Err(e) = channel.shutdown().await {
        tracing::warn!(error = %e, "Channel shutdown failed");
    }

    if config.scrub_on_exit {
        match scrub_credentials(&config.source_path) {
            Ok(()) => tracing::info!(path = %config.source_path.display(), "Credentials scrubbed"),
            Err(e) => tracing::error!(error = %e, "Credential scrub failed"),
        }
    }

    Ok(())
}
