//! Conversation-scoped session storage.
//!
//! A [`SessionStore`] maps a conversation key (a chat id, a CLI `--chat`
//! name) to the little state the router keeps between turns: the domain the
//! user last settled on and the locale they write in. Stores lock only
//! around their own map; a caller that reads, modifies and writes back one
//! conversation should use [`SessionStore::update`] or serialize the cycle
//! itself.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::atomic::{load_json, write_json};
use crate::error::{PersistenceError, Result};

/// State kept for one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Domain the conversation was last routed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_domain: Option<String>,
    /// Language the user writes in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Step of whatever multi-turn flow is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Free-form data owned by the flow named in `state`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Default for StoredSession {
    fn default() -> Self {
        Self {
            selected_domain: None,
            locale: None,
            state: None,
            updated_at: Utc::now(),
            extra: Map::new(),
        }
    }
}

impl StoredSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.selected_domain = Some(domain.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Drop flow state and extra data; the selected domain and locale stay.
    pub fn reset_flow(&mut self) {
        self.state = None;
        self.extra.clear();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Get / set / clear capability scoped by conversation key.
///
/// Keys must be non-empty. Every write refreshes `updated_at`.
pub trait SessionStore: Send + Sync {
    /// Session for `key`, if one was stored.
    fn get(&self, key: &str) -> Result<Option<StoredSession>>;

    /// Store `session` under `key`, replacing any previous value.
    fn set(&self, key: &str, session: StoredSession) -> Result<()>;

    /// Remove the session for `key`. Returns whether one existed.
    fn clear(&self, key: &str) -> Result<bool>;

    /// Apply `apply` to the session for `key` (a fresh one if absent), store
    /// and return the result.
    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut StoredSession),
    ) -> Result<StoredSession> {
        let mut session = self.get(key)?.unwrap_or_default();
        apply(&mut session);
        self.set(key, session.clone())?;
        Ok(session)
    }

    /// Reset flow state for `key` but keep its selected domain and locale.
    /// Missing sessions are left missing.
    fn clear_state(&self, key: &str) -> Result<()> {
        if let Some(mut session) = self.get(key)? {
            session.reset_flow();
            self.set(key, session)?;
        }
        Ok(())
    }
}

fn check_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(PersistenceError::EmptyKey);
    }
    Ok(())
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<StoredSession>> {
        check_key(key)?;
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sessions.get(key).cloned())
    }

    fn set(&self, key: &str, mut session: StoredSession) -> Result<()> {
        check_key(key)?;
        session.touch();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), session);
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(removed.is_some())
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut StoredSession),
    ) -> Result<StoredSession> {
        check_key(key)?;
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.entry(key.to_string()).or_default();
        apply(session);
        session.touch();
        Ok(session.clone())
    }
}

/// Store backed by one JSON object file keyed by conversation.
///
/// Every write rewrites the whole file through an atomic rename, so a crash
/// leaves either the previous or the new map on disk.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

type SessionMap = BTreeMap<String, StoredSession>;

impl FileSessionStore {
    /// Open a store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored sessions, keyed by conversation.
    pub fn all(&self) -> Result<SessionMap> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_map()
    }

    fn read_map(&self) -> Result<SessionMap> {
        Ok(load_json(&self.path)?.unwrap_or_default())
    }

    fn write_map(&self, map: &SessionMap) -> Result<()> {
        write_json(&self.path, map)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<StoredSession>> {
        check_key(key)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, mut session: StoredSession) -> Result<()> {
        check_key(key)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        session.touch();
        map.insert(key.to_string(), session);
        self.write_map(&map)
    }

    fn clear(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        if map.remove(key).is_none() {
            return Ok(false);
        }
        self.write_map(&map)?;
        Ok(true)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(&mut StoredSession),
    ) -> Result<StoredSession> {
        check_key(key)?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        let session = map.entry(key.to_string()).or_default();
        apply(session);
        session.touch();
        let updated = session.clone();
        self.write_map(&map)?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn exercise_store(store: &dyn SessionStore) {
        assert!(store.get("chat-1").unwrap().is_none());

        store
            .set("chat-1", StoredSession::new().with_domain("food").with_locale("en"))
            .unwrap();
        let loaded = store.get("chat-1").unwrap().unwrap();
        assert_eq!(loaded.selected_domain.as_deref(), Some("food"));
        assert_eq!(loaded.locale.as_deref(), Some("en"));
        assert!(store.get("chat-2").unwrap().is_none());

        assert!(store.clear("chat-1").unwrap());
        assert!(!store.clear("chat-1").unwrap());
        assert!(store.get("chat-1").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_get_set_clear() {
        let store = MemorySessionStore::new();
        exercise_store(&store);
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_get_set_clear() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions.json"));
        exercise_store(&store);
    }

    #[test]
    fn test_empty_key_rejected() {
        let store = MemorySessionStore::new();
        assert!(matches!(
            store.get("  ").unwrap_err(),
            PersistenceError::EmptyKey
        ));
        assert!(matches!(
            store.set("", StoredSession::new()).unwrap_err(),
            PersistenceError::EmptyKey
        ));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("runtime/sessions.json");

        FileSessionStore::new(&path)
            .set("42", StoredSession::new().with_domain("real_estate"))
            .unwrap();

        let reopened = FileSessionStore::new(&path);
        let session = reopened.get("42").unwrap().unwrap();
        assert_eq!(session.selected_domain.as_deref(), Some("real_estate"));
        assert_eq!(reopened.all().unwrap().len(), 1);
    }

    #[test]
    fn test_update_creates_and_merges() {
        let store = MemorySessionStore::new();

        let first = store
            .update("chat", &mut |s: &mut StoredSession| {
                s.locale = Some("ru".to_string())
            })
            .unwrap();
        assert_eq!(first.locale.as_deref(), Some("ru"));
        assert!(first.selected_domain.is_none());

        let second = store
            .update("chat", &mut |s: &mut StoredSession| {
                s.selected_domain = Some("food".to_string())
            })
            .unwrap();
        assert_eq!(second.locale.as_deref(), Some("ru"));
        assert_eq!(second.selected_domain.as_deref(), Some("food"));
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_clear_state_keeps_domain() {
        let dir = tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("sessions.json"));

        let mut session = StoredSession::new().with_domain("add_service").with_locale("en");
        session.state = Some("awaiting_title".to_string());
        session
            .extra
            .insert("title".to_string(), Value::String("Pho Bar".to_string()));
        store.set("7", session).unwrap();

        store.clear_state("7").unwrap();
        let session = store.get("7").unwrap().unwrap();
        assert_eq!(session.selected_domain.as_deref(), Some("add_service"));
        assert_eq!(session.locale.as_deref(), Some("en"));
        assert!(session.state.is_none());
        assert!(session.extra.is_empty());

        store.clear_state("missing").unwrap();
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_file_format_is_keyed_object() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = FileSessionStore::new(&path);
        store
            .set("100", StoredSession::new().with_domain("food"))
            .unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["100"]["selected_domain"], "food");
        assert!(raw["100"].get("state").is_none());
        assert!(raw["100"]["updated_at"].is_string());
    }

    #[test]
    fn test_file_store_reads_minimal_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, r#"{"5": {"selected_domain": "business"}}"#).unwrap();

        let store = FileSessionStore::new(&path);
        let session = store.get("5").unwrap().unwrap();
        assert_eq!(session.selected_domain.as_deref(), Some("business"));
        assert!(session.locale.is_none());
    }

    #[test]
    fn test_file_store_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, "[1, 2").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(matches!(
            store.get("1").unwrap_err(),
            PersistenceError::Json(_)
        ));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileSessionStore::new(dir.path().join("sessions.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .update(&format!("chat-{i}"), &mut |s: &mut StoredSession| {
                            s.selected_domain = Some("food".to_string())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.all().unwrap().len(), 8);
    }
}
