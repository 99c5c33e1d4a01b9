//! トークンのヘッダーと Claims 構造体。

use serde::{Deserialize, Serialize};

/// デフォルトのトークン種別。
pub const DEFAULT_TYP: &str = "JWT";

/// デフォルトの署名アルゴリズム名。署名は常に HMAC-SHA256 で行う。
pub const DEFAULT_ALG: &str = "HS256";

/// Header はトークンの先頭セグメント。署名対象に含まれるが、検証時の分岐には使わない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub typ: String,
    pub alg: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            typ: DEFAULT_TYP.to_string(),
            alg: DEFAULT_ALG.to_string(),
        }
    }
}

/// Claims はトークンのペイロード。
///
/// `shop_id` / `company_id` は「未設定」と「0」を区別するため `Option` で保持し、
/// 未設定時は JSON から省略する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// ユーザーの一意識別子
    #[serde(rename = "uuid")]
    pub identity: String,

    /// ロールコードの一覧
    #[serde(default)]
    pub roles: Vec<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// 有効期限（Unix タイムスタンプ秒）
    #[serde(default)]
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// 発行時刻（Unix タイムスタンプ秒）
    #[serde(default)]
    pub iat: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// Scopes はトークン発行時に任意で付与するスコープ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scopes {
    pub shop_id: Option<i64>,
    pub company_id: Option<i64>,
}

impl Scopes {
    pub fn shop(shop_id: i64) -> Self {
        Self {
            shop_id: Some(shop_id),
            company_id: None,
        }
    }

    pub fn company(company_id: i64) -> Self {
        Self {
            shop_id: None,
            company_id: Some(company_id),
        }
    }

    pub fn with_shop(mut self, shop_id: i64) -> Self {
        self.shop_id = Some(shop_id);
        self
    }

    pub fn with_company(mut self, company_id: i64) -> Self {
        self.company_id = Some(company_id);
        self
    }
}

impl Claims {
    /// 発行時刻と TTL 秒数から Claims を生成する。`exp = iat + ttl_secs`（`i64::MAX` で飽和）。
    pub fn new(identity: &str, roles: Vec<i32>, scopes: Scopes, iat: i64, ttl_secs: i64) -> Self {
        Self {
            identity: identity.to_string(),
            roles,
            shop_id: scopes.shop_id,
            company_id: scopes.company_id,
            aud: None,
            exp: iat.saturating_add(ttl_secs),
            jti: None,
            iat,
            iss: None,
            nbf: None,
            sub: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn shop_id(&self) -> Option<i64> {
        self.shop_id
    }

    pub fn company_id(&self) -> Option<i64> {
        self.company_id
    }

    /// `now` 時点で期限切れかを判定する。`exp == now` は有効とみなす。
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp < now
    }
}

impl std::fmt::Display for Claims {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Claims{{uuid={}, roles={:?}, shop_id={:?}, company_id={:?}, exp={}}}",
            self.identity, self.roles, self.shop_id, self.company_id, self.exp,
        )
    }
}
