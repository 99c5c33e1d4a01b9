//! k1s0-session-auth: HMAC 署名セッショントークンによる認証・認可ライブラリ
//!
//! HS256 相当の署名付きトークンを発行・検証し、ルートテンプレートごとの
//! 必要権限レベルとセッションストア上の失効状態に基づいてリクエストを判定する。
//!
//! # 使い方
//!
//! ```ignore
//! use std::sync::Arc;
//! use k1s0_session_auth::{config, Authenticator, RedisSessionStore, Scopes};
//!
//! let cfg = config::load("config/auth.yaml")?;
//! let store = Arc::new(RedisSessionStore::connect(&cfg.session_store).await?);
//! let auth = Authenticator::from_config(&cfg, store)?;
//!
//! let issued = auth.issue_session("u1", vec![7], Scopes::shop(44), "Mozilla/5.0").await?;
//! let decision = auth.authenticate("/api/orders/1", &headers).await;
//! ```

pub mod authenticator;
pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod middleware;
pub mod rbac;
pub mod retry;
pub mod route;
pub mod session;
pub mod signer;

pub use authenticator::{
    extract_bearer_token, Authenticator, Clock, Decision, IssuedToken, SystemClock,
};
pub use claims::{Claims, Header, Scopes};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, SessionError};
pub use middleware::{auth_middleware, AuthClaims, AuthErrorResponse, AuthState, ERROR_CODE_HEADER};
pub use rbac::{satisfies, ADMIN, ALL_USERS};
pub use retry::RetryConfig;
pub use route::{PermissionTable, RouteTemplate};
pub use session::{InMemorySessionStore, SessionStore};
pub use signer::Signer;

#[cfg(feature = "redis")]
pub use session::RedisSessionStore;

#[cfg(feature = "mock")]
pub use session::MockSessionStore;

#[cfg(test)]
mod tests;
