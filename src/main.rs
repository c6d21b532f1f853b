use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use news_relay::api::relay_routes;
use news_relay::channels::{SharedChannelClient, TelegramChannel, TelegramConfig};
use news_relay::config::RelayConfig;
use news_relay::control::RelayController;
use news_relay::llm::{LlmConfig, create_provider};
use news_relay::pipeline::PromptTemplates;

/// How long shutdown waits for an in-flight message to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let relay_config = RelayConfig::from_env()?;
    let llm_config = LlmConfig::from_env()?;
    let telegram_config = TelegramConfig::from_env()?;
    let templates = PromptTemplates::from_dir_or_builtin(relay_config.prompts_dir.as_deref())?;

    eprintln!("📰 News Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({:?})", llm_config.model, llm_config.backend);
    eprintln!("   Bot API: {}", telegram_config.api_base);
    eprintln!(
        "   Prompts: {}",
        relay_config
            .prompts_dir
            .as_deref()
            .map_or_else(|| "built-in".to_string(), |p| p.display().to_string())
    );
    eprintln!("   Control API: http://{}/start | /stop | /status\n", relay_config.bind_addr);

    let llm = create_provider(&llm_config)?;

    // The channel client is connected once and shared by every run.
    let client = SharedChannelClient::new(TelegramChannel::new(telegram_config));
    client
        .connect()
        .await
        .context("Failed to connect to the Telegram Bot API")?;

    let controller = Arc::new(RelayController::new(
        client,
        llm,
        templates,
        &relay_config,
    ));
    let app = relay_routes(Arc::clone(&controller), &relay_config.cors_origins);

    let listener = tokio::net::TcpListener::bind(&relay_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", relay_config.bind_addr))?;
    tracing::info!("Control API listening on http://{}", relay_config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
        })
        .await
        .context("Control API server failed")?;

    if tokio::time::timeout(SHUTDOWN_GRACE, controller.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            "Relay run did not finish within {}s, exiting anyway",
            SHUTDOWN_GRACE.as_secs()
        );
    }

    Ok(())
}
