//! Sessions and password handling.
//!
//! Sessions are HS256 JWTs carried either as `Authorization: Bearer <jwt>`
//! or in the `disciplo_session` cookie. The account is re-read from the store
//! on every request, so role changes and deletions take effect immediately.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::account::{Account, AccountStatus, Role};
use crate::AppState;

pub const SESSION_COOKIE: &str = "disciplo_session";

pub fn session_ttl() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, account: &Account) -> anyhow::Result<String> {
        self.issue_at(account, Utc::now())
    }

    pub fn issue_at(&self, account: &Account, now: DateTime<Utc>) -> anyhow::Result<String> {
        let claims = SessionClaims {
            sub: account.id,
            role: account.role,
            iat: now.timestamp(),
            exp: (now + session_ttl()).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("failed to sign session token")
    }

    /// `None` for anything that is not a valid, unexpired session we signed.
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                None
            }
        }
    }
}

pub async fn hash_password(password: String, cost: u32) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

/// Malformed stored hashes count as a mismatch.
pub async fn verify_password(password: String, password_hash: String) -> anyhow::Result<bool> {
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
        .await
        .context("password verification task failed")?;
    match result {
        Ok(valid) => Ok(valid),
        Err(e) => {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            Ok(false)
        }
    }
}

pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        SESSION_COOKIE,
        token,
        session_ttl().num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn clear_session_cookie(secure: bool) -> String {
    let mut cookie = format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", SESSION_COOKIE);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Bearer header first, then the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|t| !t.is_empty())
}

/// Any logged-in, accepted account.
pub struct CurrentAccount(pub Account);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for CurrentAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        let claims = state.sessions.verify(&token).ok_or(AppError::Unauthorized)?;

        let account = state
            .store
            .get_account(claims.sub)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if account.status != AccountStatus::Accepted {
            return Err(AppError::Unauthorized);
        }

        Ok(CurrentAccount(account))
    }
}

/// A logged-in administrator.
pub struct AdminAccount(pub Account);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAccount {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let CurrentAccount(account) = CurrentAccount::from_request_parts(parts, state).await?;
        if !account.is_admin() {
            tracing::warn!(account_id = %account.id, "admin route denied");
            return Err(AppError::Forbidden);
        }
        Ok(AdminAccount(account))
    }
}
