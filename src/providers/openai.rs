//! OpenAI Provider Implementation
//!
//! Implements the `LLMProvider` trait for OpenAI-compatible Chat Completions
//! APIs, handling message conversion, function tools, and error
//! classification.
//!
//! # Example
//!
//! ```rust,ignore
//! use femtoclaw::providers::{ChatOptions, LLMProvider, OpenAIProvider};
//! use femtoclaw::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![
//!         Message::system("You are a helpful assistant."),
//!         Message::user("Hello!"),
//!     ];
//!     let response = provider
//!         .chat(messages, vec![], None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("OpenAI: {}", response.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::{FemtoError, ProviderError, Result};
use crate::session::{Message, Role};

use super::{ChatOptions, LLMProvider, LLMResponse, LLMToolCall, ToolDefinition, Usage};

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI model to use.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// OpenAI API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in OpenAI's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    /// Role: "system", "user", "assistant", or "tool"
    role: &'static str,
    /// Message content (null for assistant with tool_calls)
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    r#type: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: OpenAIFunctionDef,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ============================================================================
// OpenAI API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallResponse>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIToolCallResponse {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI LLM provider.
pub struct OpenAIProvider {
    api_key: String,
    api_base: String,
    default_model: String,
    client: Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    ///
    /// ```
    /// use femtoclaw::providers::{LLMProvider, OpenAIProvider};
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create a provider for an OpenAI-compatible endpoint. A trailing slash
    /// on `api_base` is removed.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(api_key, api_base, client)
    }

    /// Create a provider with a custom HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    /// Build the provider from `providers.openai`, using the configured
    /// agent model as the default.
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai = config.providers.openai.as_ref();
        let api_key = openai
            .and_then(|p| p.api_key.as_deref())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                FemtoError::Config(
                    "providers.openai.api_key is not set (or FEMTOCLAW_PROVIDERS_OPENAI_API_KEY)"
                        .to_string(),
                )
            })?;
        let api_base = openai
            .and_then(|p| p.api_base.as_deref())
            .unwrap_or(OPENAI_API_URL);
        Ok(Self::with_base_url(api_key, api_base)
            .with_default_model(&config.agents.defaults.model))
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::Tool => "tool",
            };

            let tool_calls = msg.tool_calls.filter(|tcs| !tcs.is_empty()).map(|tcs| {
                tcs.into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function",
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments,
                        },
                    })
                    .collect()
            });

            OpenAIMessage {
                role,
                content: if msg.content.is_empty() && tool_calls.is_some() {
                    None
                } else {
                    Some(msg.content)
                },
                tool_calls,
                tool_call_id: msg.tool_call_id,
            }
        })
        .collect()
}

fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|t| OpenAITool {
            r#type: "function",
            function: OpenAIFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

fn convert_response(response: OpenAIResponse) -> Result<LLMResponse> {
    let choice = response.choices.into_iter().next().ok_or_else(|| {
        FemtoError::from(ProviderError::Format(
            "response contained no choices".to_string(),
        ))
    })?;

    let content = choice.message.content.unwrap_or_default();
    let tool_calls: Vec<LLMToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| LLMToolCall::new(&tc.id, &tc.function.name, &tc.function.arguments))
        .collect();

    let mut llm_response = LLMResponse::with_tools(&content, tool_calls);
    if let Some(usage) = response.usage {
        llm_response =
            llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    Ok(llm_response)
}

fn classify_transport_error(e: reqwest::Error) -> FemtoError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string()).into()
    } else if e.is_connect() {
        ProviderError::ServerError(format!("connection failed: {}", e)).into()
    } else {
        FemtoError::Http(e)
    }
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(&self.default_model);
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: convert_messages(messages),
            tools: if tools.is_empty() {
                None
            } else {
                Some(convert_tools(tools))
            },
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!(model, "OpenAI request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ProviderError::from_status(status.as_u16(), &detail).into());
        }

        let body = response.text().await.map_err(classify_transport_error)?;
        let parsed: OpenAIResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Format(format!("unparseable response: {}", e)))?;

        let result = convert_response(parsed)?;
        debug!(
            model,
            tool_calls = result.tool_calls.len(),
            "OpenAI response received"
        );
        Ok(result)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "openai"
    }
}
