use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, error::AppError};

/// Claims
///
/// The payload signed into every access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the email of the user the token was issued for.
    pub sub: String,
    /// Expiration Time (exp): seconds since the epoch after which the token is rejected.
    pub exp: i64,
    /// Issued At (iat)
    pub iat: i64,
}

/// TokenService
///
/// Issues and validates stateless HS256 bearer tokens. There is no server-side session
/// record: validity is a pure function of the signature and the clock, so tokens cannot be
/// revoked before they expire.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        // Out-of-range lifetimes saturate; `issue` then reports the overflow as an error.
        let ttl = Duration::try_minutes(config.token_ttl_minutes).unwrap_or(Duration::MAX);
        Self::new(&config.jwt_secret, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` expiring one TTL from now.
    pub fn issue(&self, subject: &str) -> Result<String, AppError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn issue_at(&self, subject: &str, issued_at: DateTime<Utc>) -> Result<String, AppError> {
        let expires_at = issued_at
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token lifetime out of range".to_string()))?;
        let claims = Claims {
            sub: subject.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    /// Validate a token against the current time and return its subject unmodified.
    pub fn validate(&self, token: &str) -> Result<String, AppError> {
        self.validate_at(token, Utc::now())
    }

    /// Validate a token as of `now`.
    ///
    /// Fails with `Unauthenticated` on a bad signature, a malformed token, a missing or empty
    /// subject, or `now` past the expiry. The expiry comparison is strict and has no leeway.
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the supplied clock.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(reason = ?e.kind(), "token rejected");
            AppError::unauthenticated()
        })?;

        if now.timestamp() > data.claims.exp {
            tracing::debug!(exp = data.claims.exp, "token expired");
            return Err(AppError::unauthenticated());
        }

        if data.claims.sub.is_empty() {
            return Err(AppError::unauthenticated());
        }

        Ok(data.claims.sub)
    }
}
