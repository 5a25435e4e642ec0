use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use std::sync::Arc;
use sweet_shop::{
    AppConfig, AppError, AppState, InMemoryRepository, Repository, TokenService,
    auth::{AdminUser, AuthUser, require_admin, resolve_identity},
};

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    }
}

async fn seeded_repo() -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    repo.create_user("member@example.com", "unused-hash", false)
        .await
        .unwrap();
    repo.create_user("admin@example.com", "unused-hash", true)
        .await
        .unwrap();
    repo
}

fn create_app_state(repo: Arc<InMemoryRepository>) -> AppState {
    AppState::new(repo, test_config())
}

/// Helper to get the mutable Parts struct from a generated Request
fn get_request_parts(method: Method, uri: Uri, bearer: Option<&str>) -> Parts {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let (parts, _) = builder.body(axum::body::Body::empty()).unwrap().into_parts();
    parts
}

// --- Token Service ---

#[test]
fn test_token_valid_just_before_ttl_and_rejected_just_after() {
    let tokens = TokenService::new(TEST_JWT_SECRET, Duration::minutes(30));
    let issued = Utc::now();
    let token = tokens.issue_at("member@example.com", issued).unwrap();

    let before = issued + Duration::minutes(30) - Duration::seconds(1);
    assert_eq!(
        tokens.validate_at(&token, before).unwrap(),
        "member@example.com"
    );

    let after = issued + Duration::minutes(30) + Duration::seconds(1);
    assert!(matches!(
        tokens.validate_at(&token, after),
        Err(AppError::Unauthenticated(_))
    ));
}

#[test]
fn test_token_signed_with_other_secret_is_rejected() {
    let issuer = TokenService::new("some-other-secret", Duration::minutes(30));
    let verifier = TokenService::new(TEST_JWT_SECRET, Duration::minutes(30));
    let token = issuer.issue("member@example.com").unwrap();

    assert!(matches!(
        verifier.validate(&token),
        Err(AppError::Unauthenticated(_))
    ));
}

#[test]
fn test_tampered_and_malformed_tokens_are_rejected() {
    let tokens = TokenService::new(TEST_JWT_SECRET, Duration::minutes(30));
    let token = tokens.issue("member@example.com").unwrap();

    // Swap the payload segment for one claiming a different subject.
    let other = tokens.issue("admin@example.com").unwrap();
    let mut segments: Vec<&str> = token.split('.').collect();
    let forged_payload = other.split('.').nth(1).unwrap();
    segments[1] = forged_payload;
    let forged = segments.join(".");
    assert!(tokens.validate(&forged).is_err());

    assert!(tokens.validate("not-a-jwt").is_err());
    assert!(tokens.validate("").is_err());
}

#[test]
fn test_token_without_subject_is_rejected() {
    #[derive(Serialize)]
    struct NoSubject {
        exp: i64,
    }

    let token = encode(
        &Header::default(),
        &NoSubject {
            exp: (Utc::now() + Duration::minutes(5)).timestamp(),
        },
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap();

    let tokens = TokenService::new(TEST_JWT_SECRET, Duration::minutes(30));
    assert!(matches!(
        tokens.validate(&token),
        Err(AppError::Unauthenticated(_))
    ));
}

// --- Authorization Guard ---

#[tokio::test]
async fn test_resolve_identity_returns_stored_user() {
    let repo = seeded_repo().await;
    let tokens = TokenService::from_config(&test_config());
    let token = tokens.issue("admin@example.com").unwrap();

    let identity = resolve_identity(&tokens, repo.as_ref(), &token).await.unwrap();
    assert_eq!(identity.email, "admin@example.com");
    assert!(identity.is_admin);
}

#[tokio::test]
async fn test_deleted_account_and_bad_token_are_indistinguishable() {
    let repo = seeded_repo().await;
    let tokens = TokenService::from_config(&test_config());
    let token = tokens.issue("member@example.com").unwrap();
    repo.remove_user("member@example.com").await.unwrap();

    let deleted = resolve_identity(&tokens, repo.as_ref(), &token)
        .await
        .unwrap_err();
    let garbage = resolve_identity(&tokens, repo.as_ref(), "garbage")
        .await
        .unwrap_err();

    assert_eq!(deleted.to_string(), garbage.to_string());
    assert_eq!(deleted.kind(), "unauthenticated");
    assert_eq!(garbage.kind(), "unauthenticated");
}

#[tokio::test]
async fn test_require_admin_rejects_member_even_with_fresh_token() {
    let repo = seeded_repo().await;
    let tokens = TokenService::from_config(&test_config());
    let token = tokens.issue("member@example.com").unwrap();

    let identity = resolve_identity(&tokens, repo.as_ref(), &token).await.unwrap();
    let err = require_admin(identity).unwrap_err();
    assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
}

// --- Extractors ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let repo = seeded_repo().await;
    let state = create_app_state(repo);
    let token = state.tokens.issue("member@example.com").unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), Some(token.as_str()));
    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();

    assert_eq!(user.email, "member@example.com");
    assert!(!user.is_admin);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let state = create_app_state(seeded_repo().await);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), None);

    let err = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let state = create_app_state(seeded_repo().await);
    let issued = Utc::now() - Duration::minutes(31);
    let token = state.tokens.issue_at("member@example.com", issued).unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), Some(token.as_str()));
    let err = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));
}

#[tokio::test]
async fn test_admin_extractor_forbids_member() {
    let state = create_app_state(seeded_repo().await);
    let token = state.tokens.issue("member@example.com").unwrap();

    let mut parts = get_request_parts(Method::DELETE, "/".parse().unwrap(), Some(token.as_str()));
    let err = AdminUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_admin_extractor_accepts_admin() {
    let state = create_app_state(seeded_repo().await);
    let token = state.tokens.issue("admin@example.com").unwrap();

    let mut parts = get_request_parts(Method::DELETE, "/".parse().unwrap(), Some(token.as_str()));
    let AdminUser(admin) = AdminUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert_eq!(admin.email, "admin@example.com");
}

#[tokio::test]
async fn test_admin_extractor_without_token_is_unauthenticated() {
    let state = create_app_state(seeded_repo().await);
    let mut parts = get_request_parts(Method::DELETE, "/".parse().unwrap(), None);

    let err = AdminUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated(_)));
}

#[tokio::test]
async fn test_store_lookup_is_fresh_per_request() {
    let repo = seeded_repo().await;
    let state = create_app_state(repo.clone());
    let token = state.tokens.issue("member@example.com").unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), Some(token.as_str()));
    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_ok());

    repo.remove_user("member@example.com").await;
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), Some(token.as_str()));
    assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());

    assert!(
        repo.find_user_by_email("admin@example.com")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_identity_resolved_earlier_in_the_request_is_reused() {
    let state = create_app_state(seeded_repo().await);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap(), None);
    parts.extensions.insert(AuthUser {
        id: 7,
        email: "member@example.com".to_string(),
        is_admin: false,
    });

    let user = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap();
    assert_eq!(user.id, 7);

    let err = AdminUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}
