//! Context assembly for agent turns
//!
//! The system prompt is a fold over an ordered list of [`ContextProvider`]s.
//! Each provider contributes an optional block; blocks are joined with a
//! horizontal rule. A provider that returns `Ok(None)` is skipped silently,
//! one that fails is logged and skipped, so a broken source never prevents a
//! turn from running.
//!
//! The default order is identity, bootstrap documents, long-term memory and
//! skills.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::session::{Message, Session};
use crate::skills::{check_requirements, SkillsLoader};

/// Bootstrap documents read from the workspace root, in prompt order.
pub const BOOTSTRAP_FILES: &[&str] = &["AGENTS.md", "SOUL.md", "USER.md", "TOOLS.md", "IDENTITY.md"];

/// Long-term memory file, relative to the workspace.
pub const MEMORY_FILE: &str = "memory/MEMORY.md";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const DEFAULT_IDENTITY: &str = r#"You are femtoclaw, a personal AI assistant.

You have access to tools to help accomplish tasks. Use them when needed.

Be concise but helpful. Focus on completing the user's request efficiently."#;

/// One source of system-prompt text.
pub trait ContextProvider: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Produce this source's block for `session`, or `None` when there is
    /// nothing to contribute.
    fn provide(&self, session: &Session) -> Result<Option<String>>;
}

// ============================================================================
// Providers
// ============================================================================

/// Identity block: who the agent is and where it is running.
///
/// ```rust
/// use femtoclaw::agent::{ContextProvider, IdentityProvider};
/// use femtoclaw::session::{Session, SessionKey};
///
/// let provider = IdentityProvider::new("/home/user/workspace");
/// let session = Session::new(SessionKey::new("telegram", "42"));
/// let block = provider.provide(&session).unwrap().unwrap();
/// assert!(block.contains("## Runtime Context"));
/// assert!(block.contains("- Channel: telegram"));
/// assert!(block.contains("- Workspace: /home/user/workspace"));
/// ```
pub struct IdentityProvider {
    identity: String,
    workspace: String,
}

impl IdentityProvider {
    pub fn new(workspace: &str) -> Self {
        Self {
            identity: DEFAULT_IDENTITY.to_string(),
            workspace: workspace.to_string(),
        }
    }

    /// Replace the built-in identity paragraph.
    pub fn with_identity(mut self, identity: &str) -> Self {
        self.identity = identity.to_string();
        self
    }
}

impl ContextProvider for IdentityProvider {
    fn name(&self) -> &str {
        "identity"
    }

    fn provide(&self, session: &Session) -> Result<Option<String>> {
        let runtime = [
            format!("- Channel: {}", session.key.channel),
            format!("- Current time: {}", chrono::Utc::now().to_rfc3339()),
            format!(
                "- Platform: {} {}",
                std::env::consts::OS,
                std::env::consts::ARCH
            ),
            format!("- Workspace: {}", self.workspace),
        ];
        Ok(Some(format!(
            "{}\n\n## Runtime Context\n\n{}",
            self.identity,
            runtime.join("\n")
        )))
    }
}

/// Static instruction files from the workspace root.
///
/// Files that do not exist are skipped. A file that exists but cannot be
/// read is logged and skipped without affecting the others.
pub struct BootstrapDocsProvider {
    workspace: PathBuf,
    files: Vec<String>,
}

impl BootstrapDocsProvider {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            files: BOOTSTRAP_FILES.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl ContextProvider for BootstrapDocsProvider {
    fn name(&self) -> &str {
        "bootstrap"
    }

    fn provide(&self, _session: &Session) -> Result<Option<String>> {
        let mut sections = Vec::new();
        for file in &self.files {
            let path = self.workspace.join(file);
            if !path.is_file() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) if content.trim().is_empty() => {}
                Ok(content) => sections.push(format!("## {}\n\n{}", file, content.trim())),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable bootstrap document");
                }
            }
        }

        if sections.is_empty() {
            Ok(None)
        } else {
            Ok(Some(sections.join("\n\n")))
        }
    }
}

/// Long-term memory kept in `memory/MEMORY.md`.
pub struct MemoryProvider {
    path: PathBuf,
}

impl MemoryProvider {
    pub fn new(workspace: &Path) -> Self {
        Self {
            path: workspace.join(MEMORY_FILE),
        }
    }
}

impl ContextProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn provide(&self, _session: &Session) -> Result<Option<String>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("# Memory\n\n{}", content.trim())))
    }
}

/// Always-on skill bodies followed by a one-line directory of the rest.
pub struct SkillsProvider {
    loader: SkillsLoader,
}

impl SkillsProvider {
    pub fn new(loader: SkillsLoader) -> Self {
        Self { loader }
    }
}

impl ContextProvider for SkillsProvider {
    fn name(&self) -> &str {
        "skills"
    }

    fn provide(&self, _session: &Session) -> Result<Option<String>> {
        let always = self.loader.always_skills();
        let mut blocks = Vec::new();

        let active: Vec<String> = always
            .iter()
            .filter_map(|name| self.loader.load_skill(name))
            .map(|skill| format!("### Skill: {}\n\n{}", skill.name, skill.content))
            .collect();
        if !active.is_empty() {
            blocks.push(format!("# Active Skills\n\n{}", active.join("\n\n")));
        }

        let directory: Vec<String> = self
            .loader
            .list_skills(false)
            .into_iter()
            .filter(|info| !always.contains(&info.name))
            .filter_map(|info| self.loader.load_skill(&info.name))
            .map(|skill| {
                let marker = if check_requirements(&skill) {
                    ""
                } else {
                    " (unavailable)"
                };
                format!(
                    "- {}: {} ({}){}",
                    skill.name, skill.description, skill.path, marker
                )
            })
            .collect();
        if !directory.is_empty() {
            blocks.push(format!(
                "# Skills\n\nRead a skill's SKILL.md before using it.\n\n{}",
                directory.join("\n")
            ));
        }

        if blocks.is_empty() {
            Ok(None)
        } else {
            Ok(Some(blocks.join("\n\n")))
        }
    }
}

// ============================================================================
// Assembler
// ============================================================================

/// System prompt and replayed messages for one model call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_prompt: String,
    /// Recent history, oldest first, with the incoming turn last.
    pub messages: Vec<Message>,
}

impl AssembledContext {
    /// The message list to send to a provider: system prompt first.
    pub fn to_chat_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Builds the prompt for a turn from an ordered list of providers and the
/// session's recent history.
///
/// # Example
///
/// ```rust
/// use femtoclaw::agent::{ContextAssembler, IdentityProvider};
/// use femtoclaw::session::{Message, Session, SessionKey};
///
/// let assembler = ContextAssembler::new(2).with_provider(IdentityProvider::new("/tmp/ws"));
///
/// let mut session = Session::new(SessionKey::new("cli", "direct"));
/// session.messages.push(Message::user("one"));
/// session.messages.push(Message::assistant("two"));
/// session.messages.push(Message::user("three"));
///
/// let context = assembler.build(&session, Message::user("four"));
/// assert_eq!(context.messages.len(), 3);
/// assert_eq!(context.messages[0].content, "two");
/// assert_eq!(context.messages[2].content, "four");
/// assert!(context.system_prompt.contains("femtoclaw"));
/// ```
pub struct ContextAssembler {
    providers: Vec<Box<dyn ContextProvider>>,
    history_limit: usize,
}

impl ContextAssembler {
    /// An assembler with no providers, replaying at most `history_limit`
    /// stored turns.
    pub fn new(history_limit: usize) -> Self {
        Self {
            providers: Vec::new(),
            history_limit,
        }
    }

    /// The standard provider chain for `config`'s workspace.
    pub fn from_config(config: &Config) -> Self {
        let workspace = config.workspace_path();
        let mut assembler = Self::new(config.session.history_limit)
            .with_provider(IdentityProvider::new(&workspace.to_string_lossy()))
            .with_provider(BootstrapDocsProvider::new(&workspace))
            .with_provider(MemoryProvider::new(&workspace));
        if config.skills.enabled {
            let loader = SkillsLoader::from_config(&config.skills, &workspace);
            assembler = assembler.with_provider(SkillsProvider::new(loader));
        }
        assembler
    }

    /// Append a provider to the end of the chain.
    pub fn with_provider<P: ContextProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Provider names in prompt order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    pub fn build_system_prompt(&self, session: &Session) -> String {
        let mut sections = Vec::new();
        for provider in &self.providers {
            match provider.provide(session) {
                Ok(Some(block)) if !block.trim().is_empty() => sections.push(block),
                Ok(_) => debug!(provider = provider.name(), "Context source empty"),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Context source failed, skipping");
                }
            }
        }
        sections.join(SECTION_SEPARATOR)
    }

    /// Assemble the prompt for `incoming` against `session`. Only the prompt
    /// is trimmed; the session itself is left untouched.
    pub fn build(&self, session: &Session, incoming: Message) -> AssembledContext {
        let mut messages = session.history(self.history_limit).to_vec();
        messages.push(incoming);
        AssembledContext {
            system_prompt: self.build_system_prompt(session),
            messages,
        }
    }
}
