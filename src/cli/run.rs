//! `chatrelay run`: the relay itself.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use chatrelay::agent::DispatchEngine;
use chatrelay::bus::MessageBus;
use chatrelay::channels::{ChannelManager, TelegramChannel, TelegramClient};
use chatrelay::config::{validate, Config};
use chatrelay::providers::select_backend;
use chatrelay::tools::build_registry;
use chatrelay::utils::logging::init_logging;

/// How long shutdown waits for an in-flight dispatch cycle.
const ENGINE_STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) async fn cmd_run(config: Config) -> Result<()> {
    init_logging(&config.logging).with_context(|| "Failed to initialize logging")?;

    for diagnostic in validate::validate(&config) {
        warn!("{}", diagnostic);
    }
    validate::ensure_valid(&config)?;

    let provider = select_backend(&config)?;
    let tools = build_registry(&config).await;
    let bus = Arc::new(MessageBus::with_buffer_size(config.dispatch.queue_capacity));
    let client = Arc::new(TelegramClient::new(&config.bot.token)?);

    let engine = Arc::new(
        DispatchEngine::new(config.clone(), bus.clone(), provider, client.clone())
            .with_tools(tools),
    );

    let manager = ChannelManager::new(bus.clone());
    manager
        .register(Box::new(TelegramChannel::new(
            config.bot.clone(),
            bus.clone(),
            client,
        )))
        .await;
    manager
        .start_all()
        .await
        .with_context(|| "Failed to start channels")?;

    let runner = Arc::clone(&engine);
    let engine_handle = tokio::spawn(async move {
        if let Err(e) = runner.start().await {
            error!("Dispatch loop error: {}", e);
        }
    });

    info!(bot = %config.bot.username, "Relay is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await?;
    info!("Shutting down...");

    engine.stop();
    manager
        .stop_all()
        .await
        .with_context(|| "Failed to stop channels")?;
    if tokio::time::timeout(ENGINE_STOP_TIMEOUT, engine_handle)
        .await
        .is_err()
    {
        warn!("Dispatch loop did not stop within timeout");
    }

    info!("Relay stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).with_context(|| "Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.with_context(|| "Failed to listen for Ctrl+C")?,
        _ = terminate.recv() => info!("Received SIGTERM"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl+C")
}
