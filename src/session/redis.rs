use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, IntoConnectionInfo, RedisError};
use tracing::{info, warn};

use crate::config::RedisSessionConfig;
use crate::error::SessionError;
use crate::session::SessionStore;

/// RedisSessionStore は Redis のハッシュでセッションを管理する。
///
/// キー設計:
///   - `{prefix}{identity}`: ハッシュ。フィールドがセッションキー、値が User-Agent
///
/// 接続は `pool_size` 本の ConnectionManager をラウンドロビンで使い分ける。
/// ConnectionManager は切断時に自動で再接続する。
#[derive(Clone)]
pub struct RedisSessionStore {
    pool: Arc<Vec<ConnectionManager>>,
    next: Arc<AtomicUsize>,
    key_prefix: Option<String>,
}

impl RedisSessionStore {
    /// 設定に従って Redis に接続する。接続確立はダイヤルタイムアウトで打ち切る。
    pub async fn connect(config: &RedisSessionConfig) -> Result<Self, SessionError> {
        let mut info = format!("redis://{}/{}", config.addr, config.db)
            .into_connection_info()
            .map_err(map_redis_error)?;
        if let Some(password) = config.password.as_ref().filter(|p| !p.is_empty()) {
            info.redis.password = Some(password.clone());
        }
        let client = Client::open(info).map_err(map_redis_error)?;

        let size = config.pool_size.max(1);
        let mut pool = Vec::with_capacity(size);
        for _ in 0..size {
            let manager = tokio::time::timeout(config.dial_timeout(), ConnectionManager::new(client.clone()))
                .await
                .map_err(|_| {
                    warn!(addr = %config.addr, "Redis への接続がタイムアウトしました");
                    SessionError::Timeout
                })?
                .map_err(map_redis_error)?;
            pool.push(manager);
        }

        info!(addr = %config.addr, pool_size = size, "Redis セッションストアに接続しました");

        let store = Self::from_connections(pool);
        Ok(match &config.key_prefix {
            Some(prefix) => store.with_prefix(prefix.clone()),
            None => store,
        })
    }

    /// 既存の接続からストアを生成する。空の場合は呼び出し側のバグ。
    pub fn from_connections(pool: Vec<ConnectionManager>) -> Self {
        Self {
            pool: Arc::new(pool),
            next: Arc::new(AtomicUsize::new(0)),
            key_prefix: None,
        }
    }

    /// キープレフィックスを設定する。
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn session_key(&self, identity: &str) -> String {
        prefixed_key(self.key_prefix.as_deref(), identity)
    }

    fn conn(&self) -> Result<ConnectionManager, SessionError> {
        if self.pool.is_empty() {
            return Err(SessionError::Connection("connection pool is empty".into()));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        Ok(self.pool[index].clone())
    }
}

fn prefixed_key(prefix: Option<&str>, identity: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}{}", prefix, identity),
        None => identity.to_string(),
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn add_session(
        &self,
        identity: &str,
        session_key: &str,
        metadata: &str,
    ) -> Result<(), SessionError> {
        let mut conn = self.conn()?;
        // HSET {identity} {session_key} {metadata}
        conn.hset::<_, _, _, ()>(self.session_key(identity), session_key, metadata)
            .await
            .map_err(map_redis_error)
    }

    async fn has_session(&self, identity: &str, session_key: &str) -> Result<bool, SessionError> {
        let mut conn = self.conn()?;
        conn.hexists(self.session_key(identity), session_key)
            .await
            .map_err(map_redis_error)
    }

    async fn remove_session(&self, identity: &str, session_key: &str) -> Result<(), SessionError> {
        let mut conn = self.conn()?;
        conn.hdel::<_, _, ()>(self.session_key(identity), session_key)
            .await
            .map_err(map_redis_error)
    }

    async fn remove_all_sessions(&self, identity: &str) -> Result<(), SessionError> {
        let mut conn = self.conn()?;
        conn.del::<_, ()>(self.session_key(identity))
            .await
            .map_err(map_redis_error)
    }
}

fn map_redis_error(err: RedisError) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        SessionError::Connection(err.to_string())
    } else {
        SessionError::Internal(err.to_string())
    }
}
