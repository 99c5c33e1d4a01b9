//! セッションストアクライアント。
//!
//! ユーザー識別子ごとに `{セッションキー -> メタデータ}` のハッシュを保持する。
//! セッションキーは発行時の Claims セグメントそのもので、1 ユーザーが複数端末から
//! 同時にログインしている状態を表現できる。

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;

use crate::error::SessionError;

pub use memory::InMemorySessionStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisSessionStore;

/// SessionStore は外部セッションストアへの 4 つのコマンドを抽象化するトレイト。
///
/// 各操作は個別にアトミックであればよく、操作をまたぐトランザクションは提供しない。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// `(identity, session_key)` にメタデータ（User-Agent 等）を登録する。既存なら上書きする。
    async fn add_session(
        &self,
        identity: &str,
        session_key: &str,
        metadata: &str,
    ) -> Result<(), SessionError>;

    /// セッションが存在するかを返す。リクエストごとの失効チェックに使う。
    async fn has_session(&self, identity: &str, session_key: &str) -> Result<bool, SessionError>;

    /// 1 セッションを削除する（ログアウト）。
    async fn remove_session(&self, identity: &str, session_key: &str) -> Result<(), SessionError>;

    /// ユーザーの全セッションを削除する（退会・全端末ログアウト）。
    async fn remove_all_sessions(&self, identity: &str) -> Result<(), SessionError>;
}
