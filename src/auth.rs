use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};

use crate::{
    error::AppError,
    models::User,
    repository::{Repository, RepositoryState},
    token::TokenService,
};

/// AuthUser
///
/// The resolved identity of an authenticated request: an immutable value handed to the
/// handler, never a shared "current user". Handlers that take it as an argument are
/// reachable by any authenticated account.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

/// AdminUser
///
/// An `AuthUser` that has passed `require_admin`. Taking it as a handler argument is how an
/// endpoint declares that it is admin-only.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub AuthUser);

/// Pulls the credential out of an `Authorization: Bearer <token>` header. The scheme is
/// matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// resolve_identity
///
/// Validates the token, then looks its subject up in the credential store.
///
/// A bad token and a subject that no longer resolves (e.g. a deleted account) both fail with
/// the same `Unauthenticated` error, so the caller can't tell which case occurred. Store
/// failures propagate as they are.
pub async fn resolve_identity(
    tokens: &TokenService,
    repo: &dyn Repository,
    token: &str,
) -> Result<AuthUser, AppError> {
    let subject = tokens.validate(token)?;

    match repo.find_user_by_email(&subject).await? {
        Some(user) => Ok(AuthUser::from(user)),
        None => {
            tracing::debug!("token subject does not resolve to a user");
            Err(AppError::unauthenticated())
        }
    }
}

/// require_admin
///
/// Pure capability gate: passes the already-resolved identity through when it carries the
/// admin flag, otherwise fails with `Forbidden`. No fresh lookup is performed.
pub fn require_admin(identity: AuthUser) -> Result<AdminUser, AppError> {
    if identity.is_admin {
        Ok(AdminUser(identity))
    } else {
        Err(AppError::Forbidden(
            "The user does not have admin privileges".to_string(),
        ))
    }
}

/// AuthUser Extractor Implementation
///
/// Makes `AuthUser` usable as a handler argument. Resolution:
/// 1. Dependency Resolution: repository and token service from the application state.
/// 2. Token Extraction: the bearer credential from the `Authorization` header.
/// 3. `resolve_identity`: signature, expiry and subject checks plus the store lookup.
///
/// An identity the auth route layer already stored in the request extensions is reused, so
/// the token is checked and the user looked up once per request.
///
/// Rejection: `AppError::Unauthenticated` (401 with a `WWW-Authenticate: Bearer` challenge).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // Already resolved by the route layer for this request.
        if let Some(identity) = parts.extensions.get::<AuthUser>() {
            return Ok(identity.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let tokens = TokenService::from_ref(state);

        let token = bearer_token(&parts.headers).ok_or_else(AppError::unauthenticated)?;

        resolve_identity(&tokens, repo.as_ref(), token).await
    }
}

/// AdminUser Extractor Implementation
///
/// Authenticates exactly like `AuthUser`, then applies `require_admin`.
///
/// Rejection: 401 for an unauthenticated request, 403 for a non-admin identity.
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    TokenService: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = AuthUser::from_request_parts(parts, state).await?;
        require_admin(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token(&headers_with("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers_with("bearer abc.def")), Some("abc.def"));
    }

    #[test]
    fn other_schemes_and_empty_tokens_are_ignored() {
        assert_eq!(bearer_token(&headers_with("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&headers_with("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn require_admin_gates_on_the_flag_only() {
        let member = AuthUser {
            id: 1,
            email: "member@example.com".into(),
            is_admin: false,
        };
        assert!(matches!(
            require_admin(member),
            Err(AppError::Forbidden(_))
        ));

        let admin = AuthUser {
            id: 2,
            email: "admin@example.com".into(),
            is_admin: true,
        };
        assert_eq!(require_admin(admin.clone()).unwrap(), AdminUser(admin));
    }
}
