//! Shared CLI helpers used across multiple command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use femtoclaw::agent::AgentLoop;
use femtoclaw::bus::MessageBus;
use femtoclaw::config::Config;
use femtoclaw::cron::CronService;
use femtoclaw::providers::build_provider;
use femtoclaw::session::SessionManager;
use femtoclaw::tools::cron::CronTool;
use femtoclaw::tools::message::MessageTool;

/// Everything a command needs to run turns.
pub(crate) struct Runtime {
    pub agent: Arc<AgentLoop>,
    pub cron: Arc<CronService>,
}

/// Create the agent loop with persistent sessions, the configured provider
/// and the standard tool set.
///
/// A missing provider is only a warning: the agent still starts and every
/// turn reports that no provider is configured.
pub(crate) async fn create_agent(config: Config, bus: Arc<MessageBus>) -> Result<Runtime> {
    let sessions = SessionManager::with_path(config.sessions_path())
        .with_context(|| "Failed to open session store")?;

    let cron = Arc::new(CronService::from_config(&config, bus.clone()));
    cron.load()
        .await
        .with_context(|| format!("Failed to load cron store {:?}", cron.store_path()))?;

    let provider = build_provider(&config);
    let agent = Arc::new(AgentLoop::new(config, Arc::new(sessions), bus.clone()));

    match provider {
        Ok(provider) => agent.set_provider(provider).await,
        Err(e) => {
            warn!(error = %e, "No model provider available");
            eprintln!("Warning: {}", e);
            eprintln!("Set FEMTOCLAW_PROVIDERS_OPENAI_API_KEY or add a key to {:?}", Config::path());
            eprintln!();
        }
    }

    agent.register_tool(MessageTool::new(bus)).await?;
    agent.register_tool(CronTool::new(cron.clone())).await?;
    info!(tools = agent.tool_count().await, "Agent created");

    Ok(Runtime { agent, cron })
}
