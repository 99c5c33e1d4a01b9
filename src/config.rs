//! YAML 設定の読み込みとバリデーション。

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::claims::{Header, DEFAULT_ALG, DEFAULT_TYP};
use crate::retry::RetryConfig;

/// シークレットキーを設定ファイルより優先して読み込む環境変数名。
pub const SECRET_ENV_VAR: &str = "AUTH_JWT_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("validation error: {0}")]
    Validation(String),
}

fn default_ttl_minutes() -> u64 {
    30
}

/// `ttl_minutes * 60` が i64 秒に収まる上限。
const MAX_TTL_MINUTES: u64 = (i64::MAX / 60).unsigned_abs();

fn default_typ() -> String {
    DEFAULT_TYP.to_string()
}

fn default_alg() -> String {
    DEFAULT_ALG.to_string()
}

fn default_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_pool_size() -> usize {
    4
}

fn default_dial_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    2_000
}

/// AuthConfig は認証ライブラリ全体の設定。
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    #[serde(default)]
    pub session_store: RedisSessionConfig,
    /// ルートテンプレート -> 必要権限レベル
    #[serde(default)]
    pub endpoint_permissions: BTreeMap<String, i32>,
}

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    /// HMAC 署名鍵。環境変数 `AUTH_JWT_SECRET` があればそちらを優先する。
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,
    #[serde(default = "default_typ")]
    pub typ: String,
    #[serde(default = "default_alg")]
    pub alg: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("ttl_minutes", &self.ttl_minutes)
            .field("typ", &self.typ)
            .field("alg", &self.alg)
            .finish()
    }
}

impl JwtConfig {
    /// 環境変数 → 設定ファイルの順にシークレットを解決する。空文字列は未設定扱い。
    pub fn resolved_secret(&self) -> Option<String> {
        std::env::var(SECRET_ENV_VAR)
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.secret.clone().filter(|s| !s.is_empty()))
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes.saturating_mul(60))
    }

    pub fn header(&self) -> Header {
        Header {
            typ: self.typ.clone(),
            alg: self.alg.clone(),
        }
    }
}

/// RedisSessionConfig はセッションストアへの接続設定。
#[derive(Clone, Deserialize)]
pub struct RedisSessionConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub db: i64,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,
    /// 1 コマンドあたりのタイムアウト
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RedisSessionConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            password: None,
            db: 0,
            pool_size: default_pool_size(),
            dial_timeout_ms: default_dial_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            key_prefix: None,
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for RedisSessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionConfig")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("db", &self.db)
            .field("pool_size", &self.pool_size)
            .field("dial_timeout_ms", &self.dial_timeout_ms)
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("key_prefix", &self.key_prefix)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RedisSessionConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// YAML ファイルを読み込み、バリデーション済みの AuthConfig を返す。
pub fn load(path: &str) -> Result<AuthConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    from_yaml_str(&contents)
}

/// YAML 文字列から AuthConfig を生成し、バリデーションする。
pub fn from_yaml_str(contents: &str) -> Result<AuthConfig, ConfigError> {
    let config: AuthConfig = serde_yaml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

/// 設定値のバリデーション。
pub fn validate(config: &AuthConfig) -> Result<(), ConfigError> {
    if config.jwt.resolved_secret().is_none() {
        return Err(ConfigError::Validation(format!(
            "jwt.secret is required (or set {})",
            SECRET_ENV_VAR
        )));
    }
    if config.jwt.ttl_minutes == 0 {
        return Err(ConfigError::Validation(
            "jwt.ttl_minutes must be > 0".into(),
        ));
    }
    if config.jwt.ttl_minutes > MAX_TTL_MINUTES {
        return Err(ConfigError::Validation(format!(
            "jwt.ttl_minutes must be <= {}",
            MAX_TTL_MINUTES
        )));
    }
    if config.session_store.addr.is_empty() {
        return Err(ConfigError::Validation(
            "session_store.addr is required".into(),
        ));
    }
    if config.session_store.pool_size == 0 {
        return Err(ConfigError::Validation(
            "session_store.pool_size must be > 0".into(),
        ));
    }
    if config.session_store.command_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "session_store.command_timeout_ms must be > 0".into(),
        ));
    }
    if config.session_store.retry.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "session_store.retry.max_attempts must be > 0".into(),
        ));
    }
    Ok(())
}
