//! Session command handlers.

use anyhow::{bail, Context, Result};

use femtoclaw::config::Config;
use femtoclaw::session::{SessionKey, SessionManager, SessionStore};
use femtoclaw::utils::string::preview;

use super::SessionAction;

pub(crate) async fn cmd_session(action: SessionAction) -> Result<()> {
    let config = Config::load().with_context(|| "Failed to load configuration")?;
    let sessions = SessionManager::with_path(config.sessions_path())
        .with_context(|| "Failed to open session store")?;

    match action {
        SessionAction::List => {
            let keys = sessions.list().await?;
            if keys.is_empty() {
                println!("No sessions.");
            }
            for key in keys {
                let turns = sessions
                    .get(&key)
                    .await?
                    .map(|s| s.message_count())
                    .unwrap_or(0);
                println!("{:<40} {} turns", key.to_string(), turns);
            }
        }
        SessionAction::Show { key, limit } => {
            let key = parse_key(&key)?;
            let Some(session) = sessions.get(&key).await? else {
                bail!("No session '{}'", key);
            };
            let turns = match limit {
                Some(n) => session.history(n),
                None => &session.messages[..],
            };
            for turn in turns {
                let mut line = format!("[{}] {}", turn.role, preview(&turn.content, 200));
                if let Some(calls) = &turn.tool_calls {
                    let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
                    line.push_str(&format!(" (tools: {})", names.join(", ")));
                }
                println!("{}", line);
            }
        }
        SessionAction::Delete { key } => {
            let key = parse_key(&key)?;
            if !sessions.exists(&key).await {
                bail!("No session '{}'", key);
            }
            sessions.delete(&key).await?;
            println!("Deleted session {}", key);
        }
    }

    Ok(())
}

fn parse_key(raw: &str) -> Result<SessionKey> {
    raw.parse::<SessionKey>()
        .with_context(|| format!("Invalid session key '{}'", raw))
}
