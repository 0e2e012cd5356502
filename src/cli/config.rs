//! Config command handlers.

use anyhow::{Context, Result};

use femtoclaw::config::Config;

use super::ConfigAction;

pub(crate) fn cmd_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Config::load().with_context(|| "Failed to load configuration")?;
            let json = serde_json::to_string_pretty(&redacted(config))?;
            println!("{}", json);
        }
        ConfigAction::Path => {
            println!("{}", Config::path().display());
        }
    }
    Ok(())
}

fn redacted(mut config: Config) -> Config {
    if let Some(openai) = config.providers.openai.as_mut() {
        if openai.api_key.is_some() {
            openai.api_key = Some("***".to_string());
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use femtoclaw::config::ProviderConfig;

    #[test]
    fn test_redacted_hides_api_key() {
        let mut config = Config::default();
        config.providers.openai = Some(ProviderConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        });
        let json = serde_json::to_string(&redacted(config)).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("***"));
    }
}
