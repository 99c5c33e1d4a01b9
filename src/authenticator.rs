//! 認証・認可パイプライン。
//!
//! リクエストごとに次の順で判定し、最初に失敗した段階の理由で拒否する。
//! 失敗以降の段階（特にセッションストアへの問い合わせ）は実行しない。
//!
//! 1. Authorization ヘッダー（`Bearer ` 形式）
//! 2. トークンの 3 セグメント分割
//! 3. Claims のデコード
//! 4. 署名検証
//! 5. 有効期限
//! 6. エンドポイント権限テーブルの検索（未定義は拒否）
//! 7. ロール判定
//! 8. セッションストアでの失効チェック

use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use tracing::{debug, info, warn};

use crate::claims::{Claims, Header, Scopes};
use crate::codec::{self, TokenParts};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::rbac;
use crate::retry::{with_timeout_and_retry, RetryConfig};
use crate::route::PermissionTable;
use crate::session::SessionStore;
use crate::signer::Signer;

const BEARER: &str = "Bearer ";

/// トークンの有効期間のデフォルト値（30 分）。
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// セッションストア 1 回あたりのタイムアウトのデフォルト値。
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Clock は現在時刻（Unix 秒）の取得を抽象化するトレイト。
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// SystemClock はシステム時計を使う Clock。
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Decision は 1 リクエストの判定結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// 許可。Claims はそのリクエストの処理中だけハンドラーに渡す。
    Allow(Claims),
    Deny(AuthError),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn into_result(self) -> Result<Claims, AuthError> {
        match self {
            Decision::Allow(claims) => Ok(claims),
            Decision::Deny(err) => Err(err),
        }
    }
}

impl From<Result<Claims, AuthError>> for Decision {
    fn from(result: Result<Claims, AuthError>) -> Self {
        match result {
            Ok(claims) => Decision::Allow(claims),
            Err(err) => Decision::Deny(err),
        }
    }
}

/// IssuedToken は発行したトークンとセッション登録に必要な情報。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    /// セッションストアのキー（Claims セグメント）
    pub session_key: String,
    pub claims: Claims,
}

/// Authenticator はトークン発行と認証・認可判定を行う。
///
/// 署名鍵と権限テーブルは生成後に変更されないため、`Arc` で共有して
/// 並行に呼び出してよい。可変な状態はすべてセッションストア側にある。
pub struct Authenticator {
    signer: Signer,
    header: Header,
    ttl_secs: i64,
    permissions: PermissionTable,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
    retry: RetryConfig,
}

impl Authenticator {
    pub fn new(signer: Signer, permissions: PermissionTable, store: Arc<dyn SessionStore>) -> Self {
        Self {
            signer,
            header: Header::default(),
            ttl_secs: duration_secs(DEFAULT_TTL),
            permissions,
            store,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    /// 設定から生成する。シークレットが未設定なら `MissingSecret`。
    pub fn from_config(config: &AuthConfig, store: Arc<dyn SessionStore>) -> Result<Self, AuthError> {
        let secret = config.jwt.resolved_secret().ok_or(AuthError::MissingSecret)?;
        let signer = Signer::new(secret)?;
        let permissions = PermissionTable::from_map(&config.endpoint_permissions);
        Ok(Self::new(signer, permissions, store)
            .with_ttl(config.jwt.ttl())
            .with_header(config.jwt.header())
            .with_store_timeout(config.session_store.command_timeout())
            .with_retry(config.session_store.retry.clone()))
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = duration_secs(ttl);
        self
    }

    pub fn with_header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn permissions(&self) -> &PermissionTable {
        &self.permissions
    }

    // ---- 発行 ----

    /// トークンを発行する。セッションストアには登録しない。
    ///
    /// 登録は `add_session` を別途呼ぶこと。両者はアトミックではないため、
    /// 登録に失敗したトークンは破棄すること（`issue_session` はこれを行う）。
    pub fn create_token(
        &self,
        identity: &str,
        roles: Vec<i32>,
        scopes: Scopes,
    ) -> Result<IssuedToken, AuthError> {
        let claims = Claims::new(identity, roles, scopes, self.clock.now(), self.ttl_secs);
        let segments = codec::encode(&self.header, &claims)?;
        let signature = self.signer.sign(segments.signing_input().as_bytes());
        Ok(IssuedToken {
            token: codec::join(&segments, &signature),
            session_key: segments.claims,
            claims,
        })
    }

    /// トークンを発行し、セッションを登録する。登録に失敗した場合はトークンを返さない。
    pub async fn issue_session(
        &self,
        identity: &str,
        roles: Vec<i32>,
        scopes: Scopes,
        user_agent: &str,
    ) -> Result<IssuedToken, AuthError> {
        let issued = self.create_token(identity, roles, scopes)?;
        self.add_session(identity, &issued.session_key, user_agent)
            .await?;
        Ok(issued)
    }

    // ---- 判定 ----

    /// リクエストのパスとヘッダーから許可・拒否を判定する。
    pub async fn authenticate(&self, path: &str, headers: &HeaderMap) -> Decision {
        let decision: Decision = self.evaluate(path, headers).await.into();
        if let Decision::Deny(ref err) = decision {
            if err.is_denial() {
                debug!(path = path, code = err.code(), "リクエストを拒否しました");
            } else {
                warn!(path = path, code = err.code(), error = %err, "認可判定を完了できませんでした");
            }
        }
        decision
    }

    async fn evaluate(&self, path: &str, headers: &HeaderMap) -> Result<Claims, AuthError> {
        let token = extract_bearer_token(headers)?;
        let (parts, claims) = self.verify_parts(token)?;

        let required = self
            .permissions
            .resolve(path)
            .ok_or(AuthError::NoPermissionDefined)?;
        if !rbac::satisfies(&claims.roles, required) {
            return Err(AuthError::InsufficientRole);
        }

        let store = &self.store;
        let identity = claims.identity.as_str();
        let exists = with_timeout_and_retry(&self.retry, self.store_timeout, || {
            store.has_session(identity, parts.claims)
        })
        .await?;
        if !exists {
            return Err(AuthError::SessionNotFound);
        }

        Ok(claims)
    }

    /// 署名と有効期限だけを検証して Claims を返す。権限・セッションは確認しない。
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_parts(token).map(|(_, claims)| claims)
    }

    fn verify_parts<'t>(&self, token: &'t str) -> Result<(TokenParts<'t>, Claims), AuthError> {
        let parts = codec::split(token)?;
        let claims = codec::decode_claims(parts.claims)?;
        if !self
            .signer
            .verify(parts.signing_input().as_bytes(), parts.signature)
        {
            return Err(AuthError::InvalidSignature);
        }
        if claims.is_expired_at(self.clock.now()) {
            return Err(AuthError::Expired);
        }
        Ok((parts, claims))
    }

    // ---- セッション管理 ----

    pub async fn add_session(
        &self,
        identity: &str,
        session_key: &str,
        user_agent: &str,
    ) -> Result<(), AuthError> {
        let store = &self.store;
        with_timeout_and_retry(&RetryConfig::new(1), self.store_timeout, || {
            store.add_session(identity, session_key, user_agent)
        })
        .await?;
        info!(identity = identity, "セッションを登録しました");
        Ok(())
    }

    pub async fn has_session(&self, identity: &str, session_key: &str) -> Result<bool, AuthError> {
        let store = &self.store;
        Ok(
            with_timeout_and_retry(&self.retry, self.store_timeout, || {
                store.has_session(identity, session_key)
            })
            .await?,
        )
    }

    pub async fn remove_session(&self, identity: &str, session_key: &str) -> Result<(), AuthError> {
        let store = &self.store;
        with_timeout_and_retry(&RetryConfig::new(1), self.store_timeout, || {
            store.remove_session(identity, session_key)
        })
        .await?;
        info!(identity = identity, "セッションを削除しました");
        Ok(())
    }

    pub async fn remove_all_sessions(&self, identity: &str) -> Result<(), AuthError> {
        let store = &self.store;
        with_timeout_and_retry(&RetryConfig::new(1), self.store_timeout, || {
            store.remove_all_sessions(identity)
        })
        .await?;
        info!(identity = identity, "全セッションを削除しました");
        Ok(())
    }

    /// トークンに対応するセッションを削除する（ログアウト）。
    ///
    /// 期限切れのトークンでもセッションの後始末ができるよう、署名と有効期限は
    /// 確認しない。削除対象はトークン自身の識別子とセッションキーに限られる。
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let parts = codec::split(token)?;
        let claims = codec::decode_claims(parts.claims)?;
        self.remove_session(&claims.identity, parts.claims).await
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("header", &self.header)
            .field("ttl_secs", &self.ttl_secs)
            .field("permissions", &self.permissions.len())
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

/// `Authorization: Bearer <token>` からトークン部分を取り出す。
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER))
        .ok_or(AuthError::MissingOrMalformedHeader)
}

fn duration_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
