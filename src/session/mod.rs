//! Session module - durable, append-only conversation history
//!
//! Every session lives in its own JSON Lines file under the sessions
//! directory. The first line is a header; each later line is either a turn
//! or a metadata update. Lines are only ever appended, and every append is
//! synced to disk before it returns, so a crash can lose at most the turn
//! being written and never damages earlier lines.
//!
//! # Example
//!
//! ```
//! use femtoclaw::session::{Message, SessionKey, SessionManager, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionManager::new_memory();
//!     let key = SessionKey::new("telegram", "chat123");
//!
//!     store.append(&key, Message::user("Hello!")).await.unwrap();
//!     store.append(&key, Message::assistant("Hi there!")).await.unwrap();
//!
//!     let recent = store.history(&key, 1).await.unwrap();
//!     assert_eq!(recent[0].content, "Hi there!");
//! }
//! ```

pub mod types;

pub use types::{Message, Role, Session, SessionKey, ToolCall};

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{FemtoError, Result};

/// Storage interface the agent uses for conversation state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for `key`, creating an empty one if absent.
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session>;

    /// Durably append one turn. When this returns `Ok`, the turn is on disk.
    async fn append(&self, key: &SessionKey, turn: Message) -> Result<()>;

    /// The most recent `max_turns` turns, oldest first. Unknown keys yield
    /// an empty list.
    async fn history(&self, key: &SessionKey, max_turns: usize) -> Result<Vec<Message>>;

    /// Remove the session and its stored history.
    async fn delete(&self, key: &SessionKey) -> Result<()>;
}

/// One line of a session file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum SessionRecord {
    Header {
        key: SessionKey,
        created_at: DateTime<Utc>,
    },
    Turn {
        at: DateTime<Utc>,
        message: Message,
    },
    Metadata {
        at: DateTime<Utc>,
        name: String,
        value: String,
    },
}

/// File-backed [`SessionStore`] with an in-memory cache.
///
/// The cache lock is never held across file I/O; a record is written first
/// and the cached copy is updated only once the write has succeeded.
pub struct SessionManager {
    /// In-memory cache of sessions
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
    /// Directory holding one `.jsonl` file per session; `None` keeps
    /// everything in memory
    storage_path: Option<PathBuf>,
    /// Most sessions kept cached when file-backed
    cache_capacity: usize,
}

/// Default number of file-backed sessions kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

impl SessionManager {
    /// Create a session manager rooted at `~/.femtoclaw/sessions`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_path(Config::dir().join("sessions"))
    }

    /// Create an in-memory session manager without persistence.
    pub fn new_memory() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    /// Create a session manager with a custom storage directory.
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            storage_path: Some(path),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        })
    }

    /// Keep at most `capacity` file-backed sessions in memory, dropping the
    /// least recently updated ones first. Evicted sessions are reloaded from
    /// disk on next use. Memory-only managers never evict.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity.max(1);
        self
    }

    /// Look up a session without creating it.
    pub async fn get(&self, key: &SessionKey) -> Result<Option<Session>> {
        if let Some(session) = self.sessions.read().await.get(key) {
            return Ok(Some(session.clone()));
        }

        let Some(path) = self.file_path(key) else {
            return Ok(None);
        };
        match load_session(&path, key).await? {
            Some(session) => {
                let mut sessions = self.sessions.write().await;
                let cached = sessions.entry(key.clone()).or_insert(session).clone();
                self.trim_cache(&mut sessions, key);
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    /// Record a metadata value on the session, appending it to the file.
    pub async fn set_metadata(&self, key: &SessionKey, name: &str, value: &str) -> Result<()> {
        self.get_or_create(key).await?;
        let record = SessionRecord::Metadata {
            at: Utc::now(),
            name: name.to_string(),
            value: value.to_string(),
        };
        if let Some(path) = self.file_path(key) {
            append_record(&path, key, &record).await?;
        }

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(key) {
            session.metadata.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    /// List all session keys, from memory and disk, sorted.
    pub async fn list(&self) -> Result<Vec<SessionKey>> {
        let mut keys: Vec<SessionKey> = self.sessions.read().await.keys().cloned().collect();

        if let Some(ref storage_path) = self.storage_path {
            let mut dir_entries = tokio::fs::read_dir(storage_path).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let path = entry.path();
                if path.extension().map(|e| e != "jsonl").unwrap_or(true) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                match unsanitize_key(stem).parse::<SessionKey>() {
                    Ok(key) if !keys.contains(&key) => keys.push(key),
                    Ok(_) => {}
                    Err(e) => warn!(file = %path.display(), error = %e, "Skipping unrecognised session file"),
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Check if a session exists in memory or on disk.
    pub async fn exists(&self, key: &SessionKey) -> bool {
        if self.sessions.read().await.contains_key(key) {
            return true;
        }
        self.file_path(key).map(|p| p.exists()).unwrap_or(false)
    }

    /// Drop all cached sessions; stored files are untouched.
    pub async fn clear_cache(&self) {
        self.sessions.write().await.clear();
    }

    /// Get the number of sessions in memory.
    pub async fn cache_size(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn trim_cache(&self, sessions: &mut HashMap<SessionKey, Session>, keep: &SessionKey) {
        if self.storage_path.is_none() {
            return;
        }
        while sessions.len() > self.cache_capacity {
            let oldest = sessions
                .iter()
                .filter(|(k, _)| *k != keep)
                .min_by_key(|(_, s)| s.updated_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!(session = %k, "Evicting session from cache");
                    sessions.remove(&k);
                }
                None => break,
            }
        }
    }

    fn file_path(&self, key: &SessionKey) -> Option<PathBuf> {
        self.storage_path
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", sanitize_key(&key.to_string()))))
    }
}

#[async_trait]
impl SessionStore for SessionManager {
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(session) = self.get(key).await? {
            return Ok(session);
        }

        let session = Session::new(key.clone());
        if let Some(path) = self.file_path(key) {
            let header = SessionRecord::Header {
                key: key.clone(),
                created_at: session.created_at,
            };
            match create_with_header(&path, &header).await {
                Ok(()) => debug!(session = %key, "Created session file"),
                // Another caller created it in the meantime.
                Err(FemtoError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(existing) = self.get(key).await? {
                        return Ok(existing);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let mut sessions = self.sessions.write().await;
        let cached = sessions.entry(key.clone()).or_insert(session).clone();
        self.trim_cache(&mut sessions, key);
        Ok(cached)
    }

    async fn append(&self, key: &SessionKey, turn: Message) -> Result<()> {
        self.get_or_create(key).await?;

        let at = Utc::now();
        if let Some(path) = self.file_path(key) {
            let record = SessionRecord::Turn {
                at,
                message: turn.clone(),
            };
            append_record(&path, key, &record).await?;
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(key.clone())
            .or_insert_with(|| Session::new(key.clone()));
        session.messages.push(turn);
        session.updated_at = at;
        self.trim_cache(&mut sessions, key);
        Ok(())
    }

    async fn history(&self, key: &SessionKey, max_turns: usize) -> Result<Vec<Message>> {
        Ok(self
            .get(key)
            .await?
            .map(|s| s.history(max_turns).to_vec())
            .unwrap_or_default())
    }

    async fn delete(&self, key: &SessionKey) -> Result<()> {
        self.sessions.write().await.remove(key);

        if let Some(path) = self.file_path(key) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            storage_path: self.storage_path.clone(),
            cache_capacity: self.cache_capacity,
        }
    }
}

impl Default for SessionManager {
    /// Creates an in-memory session manager.
    fn default() -> Self {
        Self::new_memory()
    }
}

// ============================================================================
// File format
// ============================================================================

async fn create_with_header(path: &Path, header: &SessionRecord) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    write_line(&mut file, header).await
}

/// Append one record. A missing or empty file (deleted behind the cache's
/// back, or cut back to nothing after a torn header) gets a header first.
async fn append_record(path: &Path, key: &SessionKey, record: &SessionRecord) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await
        .map_err(|e| {
            FemtoError::Session(format!("cannot open {} for append: {}", path.display(), e))
        })?;
    if file.metadata().await?.len() == 0 {
        warn!(file = %path.display(), "Session file missing or empty, writing header");
        let header = SessionRecord::Header {
            key: key.clone(),
            created_at: Utc::now(),
        };
        write_line(&mut file, &header).await?;
    }
    write_line(&mut file, record).await
}

async fn write_line(file: &mut tokio::fs::File, record: &SessionRecord) -> Result<()> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Rebuild a session from its file. Lines that fail to parse (such as a
/// torn final line after a crash) are skipped. A file without a readable
/// header still yields a session for `key` holding whatever turns it has.
async fn load_session(path: &Path, key: &SessionKey) -> Result<Option<Session>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !content.is_empty() && !content.ends_with('\n') {
        truncate_torn_tail(path, &content).await?;
    }

    let mut session: Option<Session> = None;
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: SessionRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(file = %path.display(), line = lineno + 1, error = %e, "Skipping unreadable session record");
                continue;
            }
        };
        match record {
            SessionRecord::Header { key, created_at } => {
                let mut s = Session::new(key);
                s.created_at = created_at;
                s.updated_at = created_at;
                session = Some(s);
            }
            SessionRecord::Turn { at, message } => {
                let s = session.get_or_insert_with(|| headerless(path, key));
                s.messages.push(message);
                s.updated_at = at;
            }
            SessionRecord::Metadata { name, value, .. } => {
                session
                    .get_or_insert_with(|| headerless(path, key))
                    .metadata
                    .insert(name, value);
            }
        }
    }

    Ok(Some(session.unwrap_or_else(|| headerless(path, key))))
}

fn headerless(path: &Path, key: &SessionKey) -> Session {
    warn!(file = %path.display(), session = %key, "Session file has no header, recovering");
    Session::new(key.clone())
}

/// Cut a partially written last line so later appends start on a fresh line.
async fn truncate_torn_tail(path: &Path, content: &str) -> Result<()> {
    let keep = content.rfind('\n').map(|i| i + 1).unwrap_or(0);
    warn!(file = %path.display(), dropped_bytes = content.len() - keep, "Truncating torn session record");
    let file = tokio::fs::OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    file.sync_data().await?;
    Ok(())
}

/// Percent-encode characters that are unsafe in filenames so the mapping
/// from key to filename stays one-to-one.
///
/// - "telegram:chat123" → "telegram%3Achat123"
/// - "discord/server" → "discord%2Fserver"
fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' => {
                result.push_str(&format!("%{:02X}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

/// Inverse of [`sanitize_key`].
fn unsanitize_key(sanitized: &str) -> String {
    let bytes = sanitized.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
