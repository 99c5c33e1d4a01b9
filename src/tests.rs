//! テスト: トークン発行から判定・ログアウトまでの一連の流れ

#[cfg(test)]
mod tests {
    use crate::authenticator::{Authenticator, Clock, Decision};
    use crate::claims::Scopes;
    use crate::codec;
    use crate::config;
    use crate::error::AuthError;
    use crate::session::{InMemorySessionStore, SessionStore};
    use http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    const YAML: &str = r#"
jwt:
  secret: "secret_key"
  ttl_minutes: 30
endpoint_permissions:
  "/api/orders/:id": 7
  "/api/admin": 1
  "/api/public": 999
"#;

    struct StepClock(AtomicI64);

    impl Clock for StepClock {
        fn now(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn setup() -> (Authenticator, Arc<InMemorySessionStore>, Arc<StepClock>) {
        let cfg = config::from_yaml_str(YAML).unwrap();
        let store = Arc::new(InMemorySessionStore::new());
        let clock = Arc::new(StepClock(AtomicI64::new(1_700_000_000)));
        let auth = Authenticator::from_config(&cfg, store.clone())
            .unwrap()
            .with_clock(clock.clone());
        (auth, store, clock)
    }

    fn denied(decision: Decision) -> AuthError {
        match decision {
            Decision::Deny(err) => err,
            Decision::Allow(claims) => panic!("Expected Deny, got Allow({})", claims),
        }
    }

    #[tokio::test]
    async fn test_issue_authorize_revoke() {
        let (auth, store, _) = setup();
        let issued = auth
            .issue_session("u1", vec![7], Scopes::default(), "Mozilla/5.0")
            .await
            .unwrap();
        let h = headers(&format!("Bearer {}", issued.token));

        match auth.authenticate("/api/orders/1", &h).await {
            Decision::Allow(claims) => {
                assert_eq!(claims.identity(), "u1");
                assert_eq!(claims.roles, vec![7]);
            }
            Decision::Deny(err) => panic!("Expected Allow, got {:?}", err),
        }
        assert_eq!(
            store.sessions("u1").await.get(&issued.session_key),
            Some(&"Mozilla/5.0".to_string())
        );

        store.remove_session("u1", &issued.session_key).await.unwrap();
        assert_eq!(
            denied(auth.authenticate("/api/orders/1", &h).await),
            AuthError::SessionNotFound
        );
    }

    #[tokio::test]
    async fn test_admin_route_requires_admin_role() {
        let (auth, _, _) = setup();
        let user = auth
            .issue_session("u1", vec![7], Scopes::default(), "ua")
            .await
            .unwrap();
        let admin = auth
            .issue_session("root", vec![1, 7], Scopes::default(), "ua")
            .await
            .unwrap();

        let err = denied(
            auth.authenticate("/api/admin", &headers(&format!("Bearer {}", user.token)))
                .await,
        );
        assert_eq!(err, AuthError::InsufficientRole);
        assert!(auth
            .authenticate("/api/admin", &headers(&format!("Bearer {}", admin.token)))
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_wrong_scheme_and_expired_are_distinguishable() {
        let (auth, _, clock) = setup();
        let issued = auth
            .issue_session("u1", vec![7], Scopes::default(), "ua")
            .await
            .unwrap();
        clock.0.fetch_add(31 * 60, Ordering::SeqCst);

        let scheme = denied(auth.authenticate("/api/orders/1", &headers("Token xyz")).await);
        let expired = denied(
            auth.authenticate("/api/orders/1", &headers(&format!("Bearer {}", issued.token)))
                .await,
        );

        assert_eq!(scheme, AuthError::MissingOrMalformedHeader);
        assert_eq!(expired, AuthError::Expired);
        assert_ne!(scheme.code(), expired.code());
        assert_eq!(scheme.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(expired.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unlisted_route_is_denied_even_for_admin() {
        let (auth, _, _) = setup();
        let issued = auth
            .issue_session("root", vec![1], Scopes::default(), "ua")
            .await
            .unwrap();
        let err = denied(
            auth.authenticate("/api/unknown", &headers(&format!("Bearer {}", issued.token)))
                .await,
        );
        assert_eq!(err, AuthError::NoPermissionDefined);
    }

    #[tokio::test]
    async fn test_logout_revokes_only_that_session() {
        let (auth, _, clock) = setup();
        let first = auth
            .issue_session("u1", vec![7], Scopes::default(), "phone")
            .await
            .unwrap();
        clock.0.fetch_add(1, Ordering::SeqCst);
        let second = auth
            .issue_session("u1", vec![7], Scopes::default(), "laptop")
            .await
            .unwrap();

        auth.logout(&first.token).await.unwrap();

        let err = denied(
            auth.authenticate("/api/public", &headers(&format!("Bearer {}", first.token)))
                .await,
        );
        assert_eq!(err, AuthError::SessionNotFound);
        assert!(auth
            .authenticate("/api/public", &headers(&format!("Bearer {}", second.token)))
            .await
            .is_allowed());
    }

    #[tokio::test]
    async fn test_issued_payload_is_readable_without_secret() {
        let (auth, _, _) = setup();
        let issued = auth
            .issue_session("u1", vec![7], Scopes::shop(10).with_company(20), "ua")
            .await
            .unwrap();

        let claims = codec::peek_claims(&issued.token).unwrap();
        assert_eq!(claims.identity(), "u1");
        assert_eq!(claims.shop_id(), Some(10));
        assert_eq!(claims.company_id(), Some(20));
    }
}
