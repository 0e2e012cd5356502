//! Providers module - LLM completion clients
//!
//! Defines the `LLMProvider` trait the agent talks to, the OpenAI-compatible
//! client, and the retry decorator that absorbs transient failures before the
//! agent sees them.
//!
//! # Example
//!
//! ```rust,ignore
//! use femtoclaw::config::Config;
//! use femtoclaw::providers::{build_provider, ChatOptions};
//! use femtoclaw::session::Message;
//!
//! async fn example() {
//!     let provider = build_provider(&Config::load().unwrap()).unwrap();
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(1000);
//!
//!     let response = provider.chat(messages, vec![], None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod openai;
pub mod retry;
mod types;

use tracing::info;

use crate::config::Config;
use crate::error::Result;

pub use openai::OpenAIProvider;
pub use retry::RetryProvider;
pub use types::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

/// Build the configured model client, wrapped in [`RetryProvider`] unless
/// `providers.retry.enabled` is false.
pub fn build_provider(config: &Config) -> Result<Box<dyn LLMProvider>> {
    let base: Box<dyn LLMProvider> = Box::new(OpenAIProvider::from_config(config)?);
    let retry = &config.providers.retry;
    if !retry.enabled {
        return Ok(base);
    }
    info!(
        max_retries = retry.max_retries,
        base_delay_ms = retry.base_delay_ms,
        "Provider retry enabled"
    );
    Ok(Box::new(RetryProvider::from_config(base, retry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn test_build_provider_requires_openai_key() {
        assert!(build_provider(&Config::default()).is_err());
    }

    #[test]
    fn test_build_provider_uses_configured_model() {
        let mut config = Config::default();
        config.agents.defaults.model = "my-model".to_string();
        config.providers.openai = Some(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            api_base: None,
        });
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "my-model");

        config.providers.retry.enabled = false;
        assert_eq!(build_provider(&config).unwrap().default_model(), "my-model");
    }
}
