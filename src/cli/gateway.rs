//! Gateway command: run the full system until Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use femtoclaw::bus::MessageBus;
use femtoclaw::channels::{ChannelManager, ConsoleChannel};
use femtoclaw::config::Config;
use femtoclaw::log_component;

use super::common::create_agent;

/// Start the agent loop, the console channel and the scheduler.
pub(crate) async fn cmd_gateway() -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let scheduler_enabled = config.scheduler.enabled;

    let bus = Arc::new(MessageBus::from_config(&config.bus));
    let runtime = create_agent(config, bus.clone()).await?;
    let agent = runtime.agent;
    let cron = runtime.cron;

    let channels = ChannelManager::new(bus.clone());
    channels
        .register(Arc::new(ConsoleChannel::new(bus.clone(), "direct")))
        .await?;
    channels
        .start_all()
        .await
        .with_context(|| "Failed to start channels")?;
    log_component!(info, "gateway", "Channels started", count = channels.channel_count().await);

    if scheduler_enabled {
        cron.start().await.with_context(|| "Failed to start scheduler")?;
        log_component!(info, "gateway", "Scheduler started");
    }

    let agent_task = {
        let agent = Arc::clone(&agent);
        tokio::spawn(async move {
            if let Err(e) = agent.start().await {
                error!(error = %e, "Agent loop exited with error");
            }
        })
    };

    println!();
    println!("Gateway is running. Type a message, or press Ctrl+C to stop.");
    println!();

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "Failed to listen for Ctrl+C")?;

    println!();
    println!("Shutting down...");

    if scheduler_enabled {
        cron.stop().await;
    }
    agent.stop();
    if let Err(e) = agent_task.await {
        error!(error = %e, "Agent task panicked");
    }
    channels
        .stop_all()
        .await
        .with_context(|| "Failed to stop channels")?;

    info!("Gateway stopped");
    Ok(())
}
