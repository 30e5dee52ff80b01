//! Account registration, login, and bearer-token verification.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use axum::extract::FromRef;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{new_id, UserRecord};
use crate::store::DataStore;

/// Claims carried inside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Authenticated user id.
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Login email.
    pub email: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    /// Issue time, seconds since the epoch.
    pub iat: u64,
}

/// HS256 signing/verification keys plus the configured token lifetime.
pub struct JwtAuth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtAuth {
    /// Builds keys from the shared secret.
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    /// Token lifetime in whole seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    /// Issues a signed token for the user.
    pub fn issue(&self, user_id: &str, email: &str) -> Result<String, ApiError> {
        let now = Utc::now().timestamp().max(0) as u64;
        let claims = Claims {
            user_id: user_id.to_string(),
            email: email.to_string(),
            exp: now + self.ttl.as_secs(),
            iat: now,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| ApiError::upstream(anyhow!(err).context("failed to sign token")))
    }

    /// Verifies a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| ApiError::Auth("could not validate credentials".to_string()))
    }
}

/// Authenticated caller, extracted from the bearer token on protected routes.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// Verified user id.
    pub user_id: String,
    /// Verified login email.
    pub email: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtAuth>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<JwtAuth>::from_ref(state);
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Auth("missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| ApiError::Auth("missing bearer token".to_string()))?;
        let claims = auth.verify(token.trim())?;
        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.email,
        })
    }
}

/// Hashes a password on a blocking thread.
pub async fn hash_password(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(&password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|err| anyhow!("hash task join error: {err}"))?
        .context("failed to hash password")
}

/// Checks a password against its stored hash on a blocking thread.
pub async fn verify_password(password: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(&password, &hash))
        .await
        .map_err(|err| anyhow!("verify task join error: {err}"))?
        .context("failed to verify password")
}

/// Registers a new account; duplicate emails fail with a conflict.
pub async fn register(
    store: &dyn DataStore,
    email: &str,
    password: &str,
) -> Result<UserRecord, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation("a valid email is required".to_string()));
    }
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".to_string(),
        ));
    }
    if store
        .find_user_by_email(&email)
        .await
        .map_err(ApiError::upstream)?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "user with this email already exists".to_string(),
        ));
    }
    let user = UserRecord {
        user_id: new_id(),
        email,
        password_hash: hash_password(password.to_string())
            .await
            .map_err(ApiError::upstream)?,
        created_at: Utc::now(),
    };
    store.create_user(&user).await.map_err(ApiError::upstream)?;
    tracing::info!(user_id = %user.user_id, "registered user");
    Ok(user)
}

/// Verifies credentials and issues an access token.
pub async fn login(
    store: &dyn DataStore,
    auth: &JwtAuth,
    email: &str,
    password: &str,
) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    let user = store
        .find_user_by_email(&email)
        .await
        .map_err(ApiError::upstream)?
        .ok_or_else(|| ApiError::Auth("invalid email or password".to_string()))?;
    let ok = verify_password(password.to_string(), user.password_hash.clone())
        .await
        .map_err(ApiError::upstream)?;
    if !ok {
        return Err(ApiError::Auth("invalid email or password".to_string()));
    }
    auth.issue(&user.user_id, &user.email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> JwtAuth {
        JwtAuth::new("test-secret", Duration::from_secs(3600))
    }

    #[test]
    fn issued_token_round_trips() {
        let auth = auth();
        let token = auth.issue("u-1", "a@example.com").expect("issue");
        let claims = auth.verify(&token).expect("verify");
        assert_eq!(claims.user_id, "u-1");
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = auth();
        let past = (Utc::now().timestamp() - 7200).max(0) as u64;
        let claims = Claims {
            user_id: "u-1".to_string(),
            email: "a@example.com".to_string(),
            exp: past,
            iat: past.saturating_sub(10),
        };
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .expect("encode");
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let token = JwtAuth::new("other-secret", Duration::from_secs(3600))
            .issue("u-1", "a@example.com")
            .expect("issue");
        assert!(auth().verify(&token).is_err());
    }

    #[tokio::test]
    async fn password_hash_round_trips() {
        let hash = hash_password("correct horse battery".to_string())
            .await
            .expect("hash");
        assert!(verify_password("correct horse battery".to_string(), hash.clone())
            .await
            .expect("verify"));
        assert!(!verify_password("wrong".to_string(), hash)
            .await
            .expect("verify"));
    }
}
