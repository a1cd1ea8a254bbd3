//! File-backed session store

use super::model::{Message, Role, Session, SessionMetadata, UndoOutcome};
use crate::config::{SessionCacheConfig, StorageConfig};
use crate::errors::{AppError, Result};
use crate::metrics;
use chrono::Utc;
use dashmap::DashMap;
use moka::sync::Cache;
use rand::{distributions::Alphanumeric, Rng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

const MAX_SESSION_ID_LEN: usize = 128;

/// New session id: `YYYYMMDD_HHMMSS_<suffix>`
pub fn generate_session_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), suffix)
}

/// Session ids become file names; restrict them to a safe alphabet
pub fn validate_session_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
        return Err(AppError::invalid(
            "session_id",
            format!("session id must be 1-{} characters", MAX_SESSION_ID_LEN),
        ));
    }
    if !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AppError::invalid(
            "session_id",
            "session id may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// What a locked mutation did to the session
enum Change<T> {
    Persist(T),
    Unchanged(T),
}

/// Exclusive hold on one session.
///
/// The lock entry leaves the map when the last holder or waiter goes away.
struct SessionGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Durable per-session message history.
///
/// The JSON document on disk is the source of truth. A bounded cache holds
/// recently used sessions and is refreshed on every write.
pub struct SessionStore {
    dir: PathBuf,
    cache: Cache<String, Arc<Session>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>, cache_config: &SessionCacheConfig) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| AppError::Storage {
            message: format!("Cannot create sessions directory {}: {}", dir.display(), e),
        })?;

        let cache = Cache::builder()
            .max_capacity(cache_config.cache_capacity)
            .time_to_idle(Duration::from_secs(cache_config.cache_idle_secs))
            .build();

        info!(dir = %dir.display(), "Session store opened");

        Ok(Self {
            dir,
            cache,
            locks: DashMap::new(),
        })
    }

    pub async fn from_config(storage: &StorageConfig, cache: &SessionCacheConfig) -> Result<Self> {
        Self::open(storage.sessions_dir.clone(), cache).await
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a session, creating it when absent. `None` mints a new id.
    #[instrument(skip(self))]
    pub async fn get_or_create(&self, session_id: Option<&str>) -> Result<Session> {
        let id = match session_id {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None => generate_session_id(),
        };

        let _guard = self.lock_session(&id).await;

        if let Some(existing) = self.load(&id).await? {
            return Ok((*existing).clone());
        }

        let session = Session::new(&id);
        self.persist(&session).await?;
        metrics::record_session_write("create");
        info!(session_id = %id, "Session created");
        Ok(session)
    }

    /// Fetch an existing session
    pub async fn get(&self, session_id: &str) -> Result<Session> {
        validate_session_id(session_id)?;
        self.load(session_id)
            .await?
            .map(|s| (*s).clone())
            .ok_or_else(|| AppError::SessionNotFound { id: session_id.to_string() })
    }

    /// Append a message, creating the session if it does not exist yet
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<Message> {
        validate_session_id(session_id)?;
        self.mutate(session_id, true, "append", |session| {
            let message = Message::new(role, content);
            session.history.push(message.clone());
            Ok(Change::Persist(message))
        })
        .await
    }

    /// Remove the last two messages
    #[instrument(skip(self))]
    pub async fn undo(&self, session_id: &str) -> Result<UndoOutcome> {
        validate_session_id(session_id)?;
        self.mutate(session_id, false, "undo", |session| {
            let len = session.history.len();
            if len < 2 {
                return Ok(Change::Unchanged(UndoOutcome::NotEnoughMessages { remaining: len }));
            }
            session.history.truncate(len - 2);
            Ok(Change::Persist(UndoOutcome::Undone { remaining: len - 2 }))
        })
        .await
    }

    /// Replace the content of the message at `index`
    #[instrument(skip(self, new_content))]
    pub async fn edit(&self, session_id: &str, index: usize, new_content: &str) -> Result<Message> {
        validate_session_id(session_id)?;
        if new_content.trim().is_empty() {
            return Err(AppError::invalid("content", "content must not be empty"));
        }

        self.mutate(session_id, false, "edit", |session| {
            let len = session.history.len();
            let message = session.history.get_mut(index).ok_or_else(|| {
                AppError::invalid(
                    "index",
                    format!("message index {} out of range for {} messages", index, len),
                )
            })?;
            message.content = new_content.to_string();
            message.edited_at = Some(Utc::now());
            Ok(Change::Persist(message.clone()))
        })
        .await
    }

    /// Markdown transcript of the whole session
    pub async fn export(&self, session_id: &str) -> Result<String> {
        let session = self.get(session_id).await?;
        if session.history.is_empty() {
            return Err(AppError::invalid("session_id", "session has no messages to export"));
        }
        Ok(session.transcript())
    }

    /// Trailing history window; empty for unknown or empty sessions
    pub async fn get_recent(&self, session_id: &str, max_messages: usize) -> Result<String> {
        validate_session_id(session_id)?;
        Ok(self
            .load(session_id)
            .await?
            .map(|s| s.recent_context(max_messages))
            .unwrap_or_default())
    }

    /// All stored session ids, sorted
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_session_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub async fn metadata(&self, session_id: &str) -> Result<SessionMetadata> {
        Ok(self.get(session_id).await?.metadata())
    }

    async fn lock_session(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = self.locks.entry(session_id.to_string()).or_default().clone();
        let mut held = SessionGuard {
            locks: &self.locks,
            session_id: session_id.to_string(),
            guard: None,
        };
        // Dropped before `held` if cancelled while waiting
        let acquire = lock.lock_owned();
        held.guard = Some(acquire.await);
        held
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", session_id))
    }

    /// Run `op` against the latest session document under the session lock
    async fn mutate<T, F>(&self, session_id: &str, create: bool, operation: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<Change<T>>,
    {
        if !create && self.load(session_id).await?.is_none() {
            return Err(AppError::SessionNotFound { id: session_id.to_string() });
        }
        let _guard = self.lock_session(session_id).await;

        let mut session = match self.load(session_id).await? {
            Some(existing) => (*existing).clone(),
            None if create => Session::new(session_id),
            None => return Err(AppError::SessionNotFound { id: session_id.to_string() }),
        };

        match op(&mut session)? {
            Change::Persist(value) => {
                session.updated_at = Utc::now();
                self.persist(&session).await?;
                metrics::record_session_write(operation);
                debug!(
                    session_id = %session_id,
                    operation,
                    messages = session.history.len(),
                    "Session updated"
                );
                Ok(value)
            }
            Change::Unchanged(value) => Ok(value),
        }
    }

    async fn load(&self, session_id: &str) -> Result<Option<Arc<Session>>> {
        if let Some(cached) = self.cache.get(session_id) {
            metrics::record_cache(true, "sessions");
            return Ok(Some(cached));
        }
        metrics::record_cache(false, "sessions");

        let bytes = match tokio::fs::read(self.path_for(session_id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session = Arc::new(serde_json::from_slice::<Session>(&bytes)?);
        self.cache.insert(session_id.to_string(), session.clone());
        Ok(Some(session))
    }

    /// Write to a sibling temp file, then rename over the document
    async fn persist(&self, session: &Session) -> Result<()> {
        let path = self.path_for(&session.session_id);
        let tmp = self.dir.join(format!(".{}.json.tmp", session.session_id));

        let body = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        self.cache.insert(session.session_id.clone(), Arc::new(session.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(dir.path(), &SessionCacheConfig::default())
            .await
            .unwrap();
        (dir, store)
    }

    async fn seed(store: &SessionStore, id: &str, contents: &[&str]) {
        for (i, content) in contents.iter().enumerate() {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store.append(id, role, content).await.unwrap();
        }
    }

    #[test]
    fn test_generated_id_shape() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 6);
        assert_eq!(parts[2].len(), 6);
        assert!(validate_session_id(&id).is_ok());
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        assert!(validate_session_id("../etc/passwd").is_err());
        assert!(validate_session_id("a/b").is_err());
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id("20240310_101500").is_ok());
    }

    #[tokio::test]
    async fn test_get_or_create_persists_new_session() {
        let (dir, store) = store().await;
        let session = store.get_or_create(None).await.unwrap();
        assert!(session.history.is_empty());
        assert!(dir.path().join(format!("{}.json", session.session_id)).exists());

        let again = store.get_or_create(Some(&session.session_id)).await.unwrap();
        assert_eq!(again.created_at, session.created_at);
    }

    #[tokio::test]
    async fn test_get_unknown_session() {
        let (_dir, store) = store().await;
        let err = store.get("nobody").await.unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_append_order_survives_reopen() {
        let (dir, store) = store().await;
        seed(&store, "s1", &["A", "B"]).await;

        let reopened = SessionStore::open(dir.path(), &SessionCacheConfig::default())
            .await
            .unwrap();
        let session = reopened.get("s1").await.unwrap();
        let contents: Vec<&str> = session.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["A", "B"]);
        assert_eq!(session.history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_undo_removes_last_exchange() {
        let (_dir, store) = store().await;
        seed(&store, "s1", &["u1", "a1", "u2", "a2"]).await;

        let outcome = store.undo("s1").await.unwrap();
        assert_eq!(outcome, UndoOutcome::Undone { remaining: 2 });

        let session = store.get("s1").await.unwrap();
        let contents: Vec<&str> = session.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["u1", "a1"]);
    }

    #[tokio::test]
    async fn test_undo_with_single_message_is_noop() {
        let (_dir, store) = store().await;
        seed(&store, "s1", &["u1"]).await;

        let outcome = store.undo("s1").await.unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.remaining(), 1);
        assert_eq!(store.get("s1").await.unwrap().history.len(), 1);
    }

    #[tokio::test]
    async fn test_undo_unknown_session() {
        let (_dir, store) = store().await;
        assert!(matches!(
            store.undo("ghost").await.unwrap_err(),
            AppError::SessionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_edit_bounds_and_stamp() {
        let (_dir, store) = store().await;
        seed(&store, "s1", &["u1", "a1"]).await;
        let before = store.get("s1").await.unwrap().history[0].clone();

        let err = store.edit("s1", 2, "late").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument { .. }));

        let err = store.edit("s1", 0, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument { .. }));

        let edited = store.edit("s1", 0, "I open the door").await.unwrap();
        assert_eq!(edited.content, "I open the door");
        assert_eq!(edited.role, before.role);
        assert_eq!(edited.timestamp, before.timestamp);
        assert!(edited.edited_at.is_some());
    }

    #[tokio::test]
    async fn test_get_recent_window() {
        let (_dir, store) = store().await;
        seed(&store, "s1", &["u1", "a1", "u2", "a2", "u3", "a3", "u4", "a4"]).await;

        let recent = store.get_recent("s1", 6).await.unwrap();
        assert!(recent.starts_with("You: u2\n\n"));
        assert!(recent.ends_with("AI: a4\n\n"));
        assert!(!recent.contains("u1"));

        assert_eq!(store.get_recent("empty", 6).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_export_requires_messages() {
        let (_dir, store) = store().await;
        let session = store.get_or_create(Some("quiet")).await.unwrap();
        assert!(matches!(
            store.export(&session.session_id).await.unwrap_err(),
            AppError::InvalidArgument { .. }
        ));

        seed(&store, "quiet", &["hello"]).await;
        let transcript = store.export("quiet").await.unwrap();
        assert!(transcript.contains("**Session ID:** quiet"));
        assert!(transcript.contains("hello"));
    }

    #[tokio::test]
    async fn test_list_ids_and_metadata() {
        let (dir, store) = store().await;
        seed(&store, "b_session", &["x"]).await;
        seed(&store, "a_session", &["y", "z"]).await;
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list_ids().await.unwrap(), vec!["a_session", "b_session"]);

        let meta = store.metadata("a_session").await.unwrap();
        assert_eq!(meta.message_count, 2);
        assert!(meta.updated >= meta.created);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_use() {
        let (_dir, store) = store().await;

        for i in 0..50 {
            store.get_or_create(Some(&format!("s{}", i))).await.unwrap();
            store.append(&format!("s{}", i), Role::User, "hello").await.unwrap();
        }
        for i in 0..20 {
            let ghost = format!("ghost{}", i);
            assert!(store.undo(&ghost).await.is_err());
            assert!(store.edit(&ghost, 0, "x").await.is_err());
        }
        store.undo("s0").await.unwrap();
        store.edit("s1", 0, "changed").await.unwrap();

        assert_eq!(store.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_lock_entry() {
        let (_dir, store) = store().await;
        let held = store.lock_session("busy").await;

        let waiter = tokio::time::timeout(
            Duration::from_millis(20),
            store.append("busy", Role::User, "blocked"),
        )
        .await;
        assert!(waiter.is_err());
        assert_eq!(store.locks.len(), 1);

        drop(held);
        assert_eq!(store.locks.len(), 0);
        assert!(matches!(
            store.get("busy").await.unwrap_err(),
            AppError::SessionNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_appends_both_land() {
        let (_dir, store) = store().await;
        let store = Arc::new(store);
        store.get_or_create(Some("race")).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.append("race", Role::User, &format!("msg {}", i)).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let session = store.get("race").await.unwrap();
        assert_eq!(session.history.len(), 16);
        for i in 0..16 {
            let expected = format!("msg {}", i);
            assert!(session.history.iter().any(|m| m.content == expected));
        }
        assert_eq!(store.locks.len(), 0);
    }
}
