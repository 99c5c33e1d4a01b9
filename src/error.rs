//! 認証・認可パイプラインとセッションストアのエラー型。

use http::StatusCode;
use thiserror::Error;

/// AuthError は認証・認可の判定結果として返る拒否理由と、判定を妨げた障害を表す。
///
/// `StoreUnavailable` / `MissingSecret` / `Encoding` 以外はすべて利用者に返す拒否（4xx）であり、
/// リトライしない。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization ヘッダーがないか、Bearer 形式ではありません")]
    MissingOrMalformedHeader,

    #[error("トークンの形式が不正です")]
    MalformedToken,

    #[error("トークンのペイロードが不正です")]
    InvalidPayload,

    #[error("トークンの署名が一致しません")]
    InvalidSignature,

    #[error("トークンの有効期限が切れています")]
    Expired,

    #[error("このエンドポイントには権限が定義されていません")]
    NoPermissionDefined,

    #[error("このエンドポイントにアクセスする権限がありません")]
    InsufficientRole,

    #[error("ユーザーセッションが見つかりません")]
    SessionNotFound,

    #[error("セッションストアに接続できません: {0}")]
    StoreUnavailable(String),

    #[error("JWT シークレットキーが設定されていません")]
    MissingSecret,

    #[error("トークンのエンコードに失敗しました: {0}")]
    Encoding(String),
}

impl AuthError {
    /// HTTP レスポンスのステータスコードを返す。
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingOrMalformedHeader | Self::InvalidSignature | Self::SessionNotFound => {
                StatusCode::UNAUTHORIZED
            }
            Self::MalformedToken | Self::InvalidPayload => StatusCode::BAD_REQUEST,
            Self::Expired | Self::NoPermissionDefined | Self::InsufficientRole => {
                StatusCode::FORBIDDEN
            }
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingSecret | Self::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// ログ出力用の安定したエラーコードを返す。
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingOrMalformedHeader => "SYS_AUTH_MISSING_OR_MALFORMED_HEADER",
            Self::MalformedToken => "SYS_AUTH_MALFORMED_TOKEN",
            Self::InvalidPayload => "SYS_AUTH_INVALID_PAYLOAD",
            Self::InvalidSignature => "SYS_AUTH_INVALID_SIGNATURE",
            Self::Expired => "SYS_AUTH_TOKEN_EXPIRED",
            Self::NoPermissionDefined => "SYS_AUTH_NO_PERMISSION_DEFINED",
            Self::InsufficientRole => "SYS_AUTH_INSUFFICIENT_ROLE",
            Self::SessionNotFound => "SYS_AUTH_SESSION_NOT_FOUND",
            Self::StoreUnavailable(_) => "SYS_AUTH_STORE_UNAVAILABLE",
            Self::MissingSecret => "SYS_AUTH_MISSING_SECRET",
            Self::Encoding(_) => "SYS_AUTH_ENCODING_ERROR",
        }
    }

    /// 利用者起因の拒否であれば true。インフラ障害・内部エラーは false。
    pub fn is_denial(&self) -> bool {
        !matches!(
            self,
            Self::StoreUnavailable(_) | Self::MissingSecret | Self::Encoding(_)
        )
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        AuthError::StoreUnavailable(err.to_string())
    }
}

/// SessionError はセッションストアとの通信エラーを表す。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("接続エラー: {0}")]
    Connection(String),

    #[error("セッションストアの応答がタイムアウトしました")]
    Timeout,

    #[error("内部エラー: {0}")]
    Internal(String),
}
