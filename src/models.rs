use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};

use crate::error::AppError;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A row of the `users` table. The password hash never leaves the process: it is skipped
/// on serialization and absent from every response type.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default, PartialEq)]
pub struct User {
    pub id: i64,
    // Unique, case-sensitive login identity.
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_admin: bool,
}

/// Sweet
///
/// A catalog item from the `sweets` table. `quantity` is the in-stock count and is never
/// negative.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Sweet {
    #[ts(type = "number")]
    pub id: i64,
    pub name: String,
    pub category: String,
    pub price: f64,
    #[ts(type = "number")]
    pub quantity: i64,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for `POST /api/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[schema(example = "test@example.com")]
    pub email: String,
    pub password: String,
}

impl RegisterUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let email = self.email.trim();
        let mut parts = email.split('@');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(local), Some(domain), None) if !local.is_empty() && !domain.is_empty()
        );
        if !well_formed || self.email.chars().any(char::is_whitespace) {
            return Err(AppError::Validation(
                "email must be a valid email address".to_string(),
            ));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("password must not be empty".to_string()));
        }
        Ok(())
    }
}

/// LoginForm
///
/// Form-encoded credentials for `POST /api/auth/login`. The identity travels in the
/// `username` field, as OAuth2 password-flow clients send it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// SweetPayload
///
/// The full set of mutable Sweet fields, used for both create and full-replace update.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SweetPayload {
    #[schema(example = "Ladoo")]
    pub name: String,
    #[schema(example = "Indian")]
    pub category: String,
    #[schema(example = 10.0)]
    pub price: f64,
    #[ts(type = "number")]
    #[schema(example = 5)]
    pub quantity: i64,
}

impl SweetPayload {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".to_string()));
        }
        if self.category.trim().is_empty() {
            return Err(AppError::Validation("category must not be empty".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AppError::Validation(
                "price must be a non-negative number".to_string(),
            ));
        }
        if self.quantity < 0 {
            return Err(AppError::Validation(
                "quantity must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// StockChangeRequest
///
/// Body of the purchase and restock endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StockChangeRequest {
    #[ts(type = "number")]
    #[schema(example = 3)]
    pub amount: i64,
}

/// Rejects zero and negative stock adjustments. Every quantity-changing store operation
/// calls this before touching a row.
pub fn check_amount(amount: i64) -> Result<(), AppError> {
    if amount < 1 {
        return Err(AppError::Validation(
            "amount must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// SweetSearch
///
/// Query parameters for `GET /api/sweets/search`. All filters are optional and combined
/// with AND; absent filters impose no constraint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams, TS)]
#[into_params(parameter_in = Query)]
#[ts(export)]
pub struct SweetSearch {
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    /// Case-insensitive substring of the category.
    pub category: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    pub max_price: Option<f64>,
}

impl SweetSearch {
    /// In-process evaluation of the filter, equivalent to the SQL the Postgres repository builds.
    pub fn matches(&self, sweet: &Sweet) -> bool {
        fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_ref()
                .is_none_or(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
        }

        contains_ci(&sweet.name, &self.name)
            && contains_ci(&sweet.category, &self.category)
            && self.min_price.is_none_or(|min| sweet.price >= min)
            && self.max_price.is_none_or(|max| sweet.price <= max)
    }
}

// --- Response Schemas (Output) ---

/// UserOut
///
/// Public view of a registered account.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct UserOut {
    #[ts(type = "number")]
    pub id: i64,
    pub email: String,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
        }
    }
}

/// UserProfile
///
/// The authenticated caller's identity (`GET /api/auth/me`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserProfile {
    #[ts(type = "number")]
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
}

/// TokenResponse
///
/// Output of a successful login.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`.
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}
