//! Agent loop implementation
//!
//! One turn moves through
//! `Received -> ContextBuilt -> ModelCalled -> (ToolsPending -> ModelCalled)* -> Done -> Replied`.
//! The tool loop is bounded by `agents.defaults.max_tool_iterations` and the
//! whole turn by `agents.defaults.agent_timeout_secs`.
//!
//! Only the user turn and the final assistant turn are written to the
//! session. Tool calls and their results live in the in-flight message list
//! and are discarded when the turn ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::bus::{InboundMessage, MessageBus, OutboundMessage};
use crate::config::Config;
use crate::error::{FemtoError, Result};
use crate::providers::{ChatOptions, LLMProvider, LLMToolCall};
use crate::session::{Message, SessionKey, SessionStore, ToolCall};
use crate::tools::{Tool, ToolCallRequest, ToolContext, ToolRegistry, ToolResult};

use super::context::ContextAssembler;

/// Session used by [`AgentLoop::process_direct`] when none is given.
pub const DIRECT_SESSION_KEY: &str = "cli:direct";

/// Reply used when the model finishes with no text.
pub const EMPTY_RESPONSE_FALLBACK: &str = "I've completed processing but have no response to give.";

/// Turn states, logged at debug level as a turn progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Received,
    ContextBuilt,
    ModelCalled,
    ToolsPending,
    Done,
    Replied,
}

fn enter(state: TurnState, iteration: u32) {
    debug!(state = ?state, iteration, "Turn state");
}

/// Where a message is recorded and what the model sees as the user turn.
#[derive(Debug, Clone, PartialEq)]
struct Route {
    key: SessionKey,
    user_text: String,
}

impl Route {
    /// System messages carry their origin conversation as `channel:chat_id`
    /// in `chat_id`; a bare id is treated as a CLI chat.
    fn for_message(msg: &InboundMessage) -> Self {
        let (key, text) = if msg.is_system() {
            let key = match msg.chat_id.split_once(':') {
                Some((channel, chat_id)) if !channel.is_empty() => {
                    SessionKey::new(channel, chat_id)
                }
                _ => SessionKey::new("cli", &msg.chat_id),
            };
            (key, format!("[System: {}] {}", msg.sender_id, msg.content))
        } else {
            (msg.session_key(), msg.content.clone())
        };

        let mut user_text = text;
        for media in &msg.media {
            if !user_text.is_empty() {
                user_text.push('\n');
            }
            user_text.push_str(&media.describe());
        }
        Self { key, user_text }
    }
}

/// The main agent loop that consumes inbound messages and coordinates with
/// the model provider, tool registry and session store.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use femtoclaw::agent::AgentLoop;
/// use femtoclaw::bus::MessageBus;
/// use femtoclaw::config::Config;
/// use femtoclaw::session::SessionManager;
///
/// let bus = Arc::new(MessageBus::new());
/// let agent = Arc::new(AgentLoop::new(
///     Config::default(),
///     Arc::new(SessionManager::new_memory()),
///     bus,
/// ));
/// agent.set_provider(Box::new(my_provider)).await;
/// agent.register_tool(my_tool).await?;
///
/// let runner = Arc::clone(&agent);
/// tokio::spawn(async move { runner.start().await });
/// // ...
/// agent.stop();
/// ```
pub struct AgentLoop {
    config: Config,
    sessions: Arc<dyn SessionStore>,
    bus: Arc<MessageBus>,
    provider: Arc<RwLock<Option<Arc<dyn LLMProvider>>>>,
    tools: Arc<RwLock<ToolRegistry>>,
    context: ContextAssembler,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    /// Per-session locks so two turns for one conversation never overlap
    session_locks: Arc<Mutex<HashMap<SessionKey, Arc<Mutex<()>>>>>,
}

impl AgentLoop {
    /// Create an agent loop with the standard context providers for
    /// `config`.
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use femtoclaw::agent::AgentLoop;
    /// use femtoclaw::bus::MessageBus;
    /// use femtoclaw::config::Config;
    /// use femtoclaw::session::SessionManager;
    ///
    /// let agent = AgentLoop::new(
    ///     Config::default(),
    ///     Arc::new(SessionManager::new_memory()),
    ///     Arc::new(MessageBus::new()),
    /// );
    /// assert!(!agent.is_running());
    /// ```
    pub fn new(config: Config, sessions: Arc<dyn SessionStore>, bus: Arc<MessageBus>) -> Self {
        let context = ContextAssembler::from_config(&config);
        Self::with_context_assembler(config, sessions, bus, context)
    }

    /// Create an agent loop with a custom context assembler.
    pub fn with_context_assembler(
        config: Config,
        sessions: Arc<dyn SessionStore>,
        bus: Arc<MessageBus>,
        context: ContextAssembler,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            sessions,
            bus,
            provider: Arc::new(RwLock::new(None)),
            tools: Arc::new(RwLock::new(ToolRegistry::new())),
            context,
            running: AtomicBool::new(false),
            shutdown_tx,
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Set the model provider.
    pub async fn set_provider(&self, provider: Box<dyn LLMProvider>) {
        *self.provider.write().await = Some(Arc::from(provider));
    }

    /// Register a tool. Fails if a tool with the same name exists.
    pub async fn register_tool<T: Tool + 'static>(&self, tool: T) -> Result<()> {
        self.tools.write().await.register(tool)
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn has_tool(&self, name: &str) -> bool {
        self.tools.read().await.has(name)
    }

    /// Run one turn for `msg` and return the reply text.
    ///
    /// On success the user turn and the reply are appended to the session.
    /// On failure only the user turn is appended, then the error is
    /// returned. A failed append is itself an error.
    pub async fn process_message(&self, msg: &InboundMessage) -> Result<String> {
        let route = Route::for_message(msg);

        let session_lock = {
            let mut locks = self.session_locks.lock().await;
            locks
                .entry(route.key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let outcome = {
            let _session_guard = session_lock.lock().await;
            self.process_locked(msg, &route).await
        };
        self.release_session_lock(&route.key, session_lock).await;
        outcome
    }

    /// Drop the per-session lock entry once no other turn holds or awaits it.
    async fn release_session_lock(&self, key: &SessionKey, lock: Arc<Mutex<()>>) {
        let mut locks = self.session_locks.lock().await;
        // Held only by the map and by `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    async fn process_locked(&self, msg: &InboundMessage, route: &Route) -> Result<String> {
        enter(TurnState::Received, 0);

        let user_turn = Message::user(&route.user_text);
        let timeout_secs = self.config.agents.defaults.agent_timeout_secs;
        let outcome = if timeout_secs > 0 {
            match tokio::time::timeout(
                Duration::from_secs(timeout_secs),
                self.run_turn(msg, route, user_turn.clone()),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(FemtoError::Timeout(format!(
                    "turn exceeded {}s",
                    timeout_secs
                ))),
            }
        } else {
            self.run_turn(msg, route, user_turn.clone()).await
        };

        match outcome {
            Ok(reply) => {
                self.sessions.append(&route.key, user_turn).await?;
                self.sessions
                    .append(&route.key, Message::assistant(&reply))
                    .await?;
                Ok(reply)
            }
            Err(e) => {
                if let Err(persist_err) = self.sessions.append(&route.key, user_turn).await {
                    error!(session = %route.key, error = %persist_err, "Failed to record user turn after error");
                }
                Err(e)
            }
        }
    }

    /// Run one turn outside the bus and return the reply text.
    ///
    /// `session_key` is a `channel:chat_id` string such as
    /// [`DIRECT_SESSION_KEY`].
    pub async fn process_direct(&self, content: &str, session_key: &str) -> Result<String> {
        let key: SessionKey = session_key.parse()?;
        let msg = InboundMessage::new(&key.channel, "user", &key.chat_id, content);
        self.process_message(&msg).await
    }

    async fn run_turn(
        &self,
        msg: &InboundMessage,
        route: &Route,
        user_turn: Message,
    ) -> Result<String> {
        // Clone the provider out so no lock is held across model calls.
        let provider = {
            let guard = self.provider.read().await;
            Arc::clone(
                guard
                    .as_ref()
                    .ok_or_else(|| FemtoError::Provider("No provider configured".into()))?,
            )
        };

        let session = self.sessions.get_or_create(&route.key).await?;
        let mut messages = self.context.build(&session, user_turn).to_chat_messages();
        enter(TurnState::ContextBuilt, 0);

        let defaults = &self.config.agents.defaults;
        let model = msg
            .metadata
            .get("model")
            .filter(|m| !m.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| defaults.model.clone());
        let options = ChatOptions::new()
            .with_max_tokens(defaults.max_tokens)
            .with_temperature(defaults.temperature);
        let workspace = self.config.workspace_path();
        let tool_ctx = ToolContext::new()
            .with_channel(&route.key.channel, &route.key.chat_id)
            .with_workspace(&workspace.to_string_lossy());

        let max_iterations = defaults.max_tool_iterations.max(1);
        for iteration in 1..=max_iterations {
            let tool_definitions = self.tools.read().await.definitions();
            enter(TurnState::ModelCalled, iteration);
            let response = provider
                .chat(
                    messages.clone(),
                    tool_definitions,
                    Some(model.as_str()),
                    options.clone(),
                )
                .await?;
            if let Some(usage) = response.usage.as_ref() {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "Model usage"
                );
            }

            if !response.has_tool_calls() {
                enter(TurnState::Done, iteration);
                if response.content.trim().is_empty() {
                    return Ok(EMPTY_RESPONSE_FALLBACK.to_string());
                }
                return Ok(response.content);
            }

            enter(TurnState::ToolsPending, iteration);
            let calls: Vec<ToolCall> = response.tool_calls.iter().map(ToolCall::from).collect();
            messages.push(Message::assistant_with_tools(&response.content, calls));

            for call in &response.tool_calls {
                let result = self.execute_tool(call, &tool_ctx).await;
                messages.push(Message::tool_result(&result.call_id, &result.for_model()));
            }
        }

        warn!(max_iterations, "Tool loop reached its iteration cap");
        Err(FemtoError::IterationLimit(max_iterations))
    }

    /// Execute one model-issued call. Always yields a result carrying the
    /// call's own id.
    async fn execute_tool(&self, call: &LLMToolCall, ctx: &ToolContext) -> ToolResult {
        info!(tool = %call.name, id = %call.id, "Executing tool");
        let start = Instant::now();

        let result = match call.parse_arguments() {
            Ok(arguments) => {
                let request = ToolCallRequest::new(&call.id, &call.name, arguments);
                self.tools.read().await.execute(&request, ctx).await
            }
            Err(e) => {
                let request = ToolCallRequest::new(&call.id, &call.name, serde_json::Value::Null);
                ToolResult::error(
                    &request,
                    format!("Invalid arguments JSON for '{}': {}", call.name, e),
                )
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;
        if result.is_error {
            warn!(tool = %call.name, latency_ms, error = %result.output, "Tool returned an error");
        } else {
            debug!(tool = %call.name, latency_ms, "Tool executed successfully");
        }
        result
    }

    /// Process one bus message and publish exactly one reply: the answer,
    /// or `Error: ...` when the turn failed.
    async fn handle_inbound(&self, msg: InboundMessage) {
        info!("Processing message");
        let start = Instant::now();
        let key = Route::for_message(&msg).key;

        let content = match self.process_message(&msg).await {
            Ok(reply) => {
                info!(
                    latency_ms = start.elapsed().as_millis() as u64,
                    response_len = reply.len(),
                    "Request completed"
                );
                reply
            }
            Err(e) => {
                error!(latency_ms = start.elapsed().as_millis() as u64, error = %e, "Request failed");
                format!("Error: {}", e)
            }
        };

        if let Err(e) = self
            .bus
            .publish_outbound(OutboundMessage::to_session(&key, &content))
            .await
        {
            error!(error = %e, "Failed to publish outbound message");
            return;
        }
        enter(TurnState::Replied, 0);
    }

    /// Consume inbound messages until [`AgentLoop::stop`] is called.
    ///
    /// Turns run one at a time in arrival order.
    ///
    /// # Errors
    /// Returns an error if the loop is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FemtoError::Config("Agent loop already running".into()));
        }
        info!("Starting agent loop");

        // Discard a stop signal left over from a previous run.
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    let Some(msg) = msg else {
                        info!("Inbound channel closed");
                        break;
                    };
                    let request_span = info_span!(
                        "request",
                        request_id = %uuid::Uuid::new_v4(),
                        channel = %msg.channel,
                        chat_id = %msg.chat_id,
                        sender = %msg.sender_id,
                    );
                    self.handle_inbound(msg).instrument(request_span).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Agent loop stopped");
        Ok(())
    }

    /// Signal the loop to stop after the turn in progress.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
