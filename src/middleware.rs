//! axum 用の認証ミドルウェアとハンドラー向けの Claims アクセサ。

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{request::Parts, HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::authenticator::{Authenticator, Decision};
use crate::claims::Claims;
use crate::error::AuthError;

/// 拒否理由の機械可読コード（`SYS_AUTH_*`）を返すレスポンスヘッダー。
pub const ERROR_CODE_HEADER: &str = "x-error-code";

/// AuthState はミドルウェアが使用する共有状態。
#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<Authenticator>,
}

impl AuthState {
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self { authenticator }
    }
}

/// auth_middleware は保護対象エンドポイントの前段で認証・認可を判定する。
/// 許可された場合は Claims をリクエストエクステンションに格納して後続に渡す。
///
/// `Router::nest` 配下では `req.uri()` からマウント先のプレフィックスが除かれるため、
/// 権限テーブルの照合には `OriginalUri` のパスを使う。
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| req.uri().path(), |uri| uri.0.path())
        .to_string();
    match state.authenticator.authenticate(&path, req.headers()).await {
        Decision::Allow(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Decision::Deny(err) => AuthErrorResponse::from(err).into_response(),
    }
}

/// リクエストエクステンションから Claims を取得する。
pub fn get_claims(req: &Request<Body>) -> Option<&Claims> {
    req.extensions().get::<Claims>()
}

/// 認証済みユーザーの識別子を取得する。
pub fn get_identity(req: &Request<Body>) -> Option<&str> {
    get_claims(req).map(Claims::identity)
}

pub fn get_shop_id(req: &Request<Body>) -> Option<i64> {
    get_claims(req).and_then(Claims::shop_id)
}

pub fn get_company_id(req: &Request<Body>) -> Option<i64> {
    get_claims(req).and_then(Claims::company_id)
}

/// AuthClaims はハンドラー引数で Claims を受け取るためのエクストラクタ。
/// auth_middleware の後ろでのみ使用すること。
#[derive(Debug, Clone)]
pub struct AuthClaims(pub Claims);

impl AuthClaims {
    pub fn identity(&self) -> &str {
        self.0.identity()
    }

    pub fn shop_id(&self) -> Option<i64> {
        self.0.shop_id()
    }

    pub fn company_id(&self) -> Option<i64> {
        self.0.company_id()
    }
}

impl<S> FromRequestParts<S> for AuthClaims
where
    S: Send + Sync,
{
    type Rejection = AuthErrorResponse;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthClaims)
            .ok_or_else(|| AuthErrorResponse::from(AuthError::MissingOrMalformedHeader))
    }
}

/// ResponseBody は拒否レスポンスの JSON 本文。
#[derive(Debug, Serialize)]
struct ResponseBody {
    message: String,
    data: Option<()>,
}

/// AuthErrorResponse は認証・認可エラーの HTTP レスポンス。
#[derive(Debug)]
pub struct AuthErrorResponse {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl From<AuthError> for AuthErrorResponse {
    fn from(err: AuthError) -> Self {
        // ストア障害の詳細（接続先など）は利用者に返さない
        let message = match err {
            AuthError::StoreUnavailable(_) => "セッションストアに接続できません".to_string(),
            ref other => other.to_string(),
        };
        Self {
            status: err.status_code(),
            code: err.code(),
            message,
        }
    }
}

impl IntoResponse for AuthErrorResponse {
    fn into_response(self) -> Response {
        let body = ResponseBody {
            message: self.message,
            data: None,
        };
        (
            self.status,
            [(
                HeaderName::from_static(ERROR_CODE_HEADER),
                HeaderValue::from_static(self.code),
            )],
            Json(body),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Scopes;
    use crate::rbac::ALL_USERS;
    use crate::route::PermissionTable;
    use crate::session::{InMemorySessionStore, MockSessionStore, SessionStore};
    use crate::signer::Signer;
    use crate::error::SessionError;
    use axum::middleware;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn app(store: Arc<dyn SessionStore>) -> (Router, Arc<Authenticator>) {
        let table = PermissionTable::new()
            .route("/api/test/:id/user/:name", ALL_USERS)
            .route("/api/shop", 4);
        let authenticator = Arc::new(Authenticator::new(
            Signer::new("secret_key").unwrap(),
            table,
            store,
        ));
        let state = AuthState::new(authenticator.clone());

        let router = Router::new()
            .route(
                "/api/test/{id}/user/{name}",
                get(|claims: AuthClaims| async move {
                    Json(serde_json::json!({ "uuid": claims.identity() }))
                }),
            )
            .route(
                "/api/shop",
                get(|claims: AuthClaims| async move {
                    Json(serde_json::json!({ "shop_id": claims.shop_id() }))
                }),
            )
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state);

        (router, authenticator)
    }

    async fn send(router: Router, uri: &str, auth: Option<&str>) -> (StatusCode, serde_json::Value) {
        let (status, _, json) = send_with_headers(router, uri, auth).await;
        (status, json)
    }

    async fn send_with_headers(
        router: Router,
        uri: &str,
        auth: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let resp = router
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_missing_header_returns_401() {
        let (router, _) = app(Arc::new(InMemorySessionStore::new()));
        let (status, json) = send(router, "/api/test/1/user/taro", None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(json["data"].is_null());
        assert_eq!(
            json["message"],
            AuthError::MissingOrMalformedHeader.to_string()
        );
    }

    #[tokio::test]
    async fn test_valid_token_passes_claims_to_handler() {
        let (router, auth) = app(Arc::new(InMemorySessionStore::new()));
        let issued = auth
            .issue_session("uuid3", vec![99], Scopes::default(), "user agent")
            .await
            .unwrap();

        let header = format!("Bearer {}", issued.token);
        let (status, json) = send(router, "/api/test/1/user/taro", Some(&header)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["uuid"], "uuid3");
    }

    #[tokio::test]
    async fn test_scope_accessor() {
        let (router, auth) = app(Arc::new(InMemorySessionStore::new()));
        let issued = auth
            .issue_session("uuid3", vec![4], Scopes::shop(44), "user agent")
            .await
            .unwrap();

        let header = format!("Bearer {}", issued.token);
        let (status, json) = send(router, "/api/shop", Some(&header)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["shop_id"], 44);
    }

    #[tokio::test]
    async fn test_insufficient_role_returns_403() {
        let (router, auth) = app(Arc::new(InMemorySessionStore::new()));
        let issued = auth
            .issue_session("uuid3", vec![99], Scopes::default(), "user agent")
            .await
            .unwrap();

        let header = format!("Bearer {}", issued.token);
        let (status, headers, json) = send_with_headers(router, "/api/shop", Some(&header)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            headers.get(ERROR_CODE_HEADER).unwrap(),
            "SYS_AUTH_INSUFFICIENT_ROLE"
        );
        assert!(json.get("code").is_none());
    }

    #[tokio::test]
    async fn test_store_failure_returns_503_without_details() {
        let mut mock = MockSessionStore::new();
        mock.expect_has_session()
            .returning(|_, _| Err(SessionError::Connection("10.0.0.5:6379 refused".into())));
        let (router, auth) = app(Arc::new(mock));
        let issued = auth.create_token("uuid3", vec![99], Scopes::default()).unwrap();

        let header = format!("Bearer {}", issued.token);
        let (status, json) = send(router, "/api/test/1/user/taro", Some(&header)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!json["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[test]
    fn test_get_claims_helpers() {
        let claims = Claims::new("u1", vec![1], Scopes::company(9), 0, 60);
        let mut req = Request::builder().body(Body::empty()).unwrap();
        assert!(get_claims(&req).is_none());

        req.extensions_mut().insert(claims);
        assert_eq!(get_identity(&req), Some("u1"));
        assert_eq!(get_shop_id(&req), None);
        assert_eq!(get_company_id(&req), Some(9));
    }
}
