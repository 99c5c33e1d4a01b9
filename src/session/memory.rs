use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::SessionError;
use crate::session::SessionStore;

type SessionMap = HashMap<String, HashMap<String, String>>;

/// InMemorySessionStore はプロセス内で完結するセッションストア。
/// テストや単一プロセス構成で Redis の代わりに使う。
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<SessionMap>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// ユーザーの全セッション（セッションキー -> メタデータ）を返す。
    pub async fn sessions(&self, identity: &str) -> HashMap<String, String> {
        self.sessions
            .read()
            .await
            .get(identity)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn add_session(
        &self,
        identity: &str,
        session_key: &str,
        metadata: &str,
    ) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .entry(identity.to_string())
            .or_default()
            .insert(session_key.to_string(), metadata.to_string());
        Ok(())
    }

    async fn has_session(&self, identity: &str, session_key: &str) -> Result<bool, SessionError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(identity)
            .is_some_and(|s| s.contains_key(session_key)))
    }

    async fn remove_session(&self, identity: &str, session_key: &str) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        if let Some(entries) = sessions.get_mut(identity) {
            entries.remove(session_key);
            // Redis のハッシュと同様、最後のフィールドが消えたらキーごと消す
            if entries.is_empty() {
                sessions.remove(identity);
            }
        }
        Ok(())
    }

    async fn remove_all_sessions(&self, identity: &str) -> Result<(), SessionError> {
        self.sessions.write().await.remove(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_has_session() {
        let store = InMemorySessionStore::new();
        store.add_session("u1", "payload-1", "agent").await.unwrap();

        assert!(store.has_session("u1", "payload-1").await.unwrap());
        assert!(!store.has_session("u1", "payload-2").await.unwrap());
        assert!(!store.has_session("u2", "payload-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_add_session_upserts_metadata() {
        let store = InMemorySessionStore::new();
        store.add_session("u1", "p", "old-agent").await.unwrap();
        store.add_session("u1", "p", "new-agent").await.unwrap();

        let sessions = store.sessions("u1").await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.get("p").unwrap(), "new-agent");
    }

    #[tokio::test]
    async fn test_multiple_devices() {
        let store = InMemorySessionStore::new();
        store.add_session("u1", "phone", "ios").await.unwrap();
        store.add_session("u1", "laptop", "firefox").await.unwrap();

        assert_eq!(store.sessions("u1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_session() {
        let store = InMemorySessionStore::new();
        store.add_session("u1", "phone", "ios").await.unwrap();
        store.add_session("u1", "laptop", "firefox").await.unwrap();

        store.remove_session("u1", "phone").await.unwrap();

        assert!(!store.has_session("u1", "phone").await.unwrap());
        assert!(store.has_session("u1", "laptop").await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_missing_session_is_ok() {
        let store = InMemorySessionStore::new();
        store.remove_session("nobody", "p").await.unwrap();
        store.remove_all_sessions("nobody").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_all_sessions() {
        let store = InMemorySessionStore::new();
        store.add_session("u1", "phone", "ios").await.unwrap();
        store.add_session("u1", "laptop", "firefox").await.unwrap();
        store.add_session("u2", "phone", "android").await.unwrap();

        store.remove_all_sessions("u1").await.unwrap();

        assert!(store.sessions("u1").await.is_empty());
        assert!(store.has_session("u2", "phone").await.unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemorySessionStore::new();
        let clone = store.clone();
        store.add_session("u1", "p", "agent").await.unwrap();
        assert!(clone.has_session("u1", "p").await.unwrap());
    }
}
