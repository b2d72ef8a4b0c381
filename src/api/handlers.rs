use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{self, AdminAccount, CurrentAccount};
use crate::errors::AppError;
use crate::models::account::{normalize_email, Account, AccountStatus, LinkState};
use crate::models::community::{Community, CommunityKind, NewCommunity};
use crate::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub account: Account,
}

#[derive(Serialize)]
pub struct DashboardView {
    pub account: Account,
    pub role_label: &'static str,
    pub link_state: LinkState,
    pub linked_handle: Option<String>,
    /// Deep link for a still-valid pending token.
    pub link: Option<String>,
    pub link_expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct LinkTokenResponse {
    pub token: String,
    pub link: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct LinkStatusResponse {
    pub connected: bool,
    pub state: LinkState,
}

#[derive(Deserialize)]
pub struct CreateCommunityRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub telegram_chat_id: Option<i64>,
    #[serde(default)]
    pub kind: CommunityKind,
}

// ── Session ──────────────────────────────────────────────────

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let email = normalize_email(&payload.email);
    let account = match state.store.find_account_by_email(&email).await? {
        Some(a) => a,
        None => {
            tracing::info!(email = %email, "login for unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    let valid = auth::verify_password(payload.password, account.password_hash.clone()).await?;
    if !valid {
        tracing::info!(account_id = %account.id, "login with wrong password");
        return Err(AppError::InvalidCredentials);
    }
    if account.status == AccountStatus::Pending {
        return Err(AppError::PendingApproval);
    }

    let token = state.sessions.issue(&account)?;
    tracing::info!(account_id = %account.id, role = ?account.role, "login");

    let cookie = auth::session_cookie(&token, state.config.secure_cookies());
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(LoginResponse { token, account }),
    )
        .into_response())
}

pub async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, auth::clear_session_cookie(state.config.secure_cookies()))],
    )
}

/// Browser variant: clears the cookie and sends the user home.
pub async fn logout_redirect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, auth::clear_session_cookie(state.config.secure_cookies()))],
        Redirect::to("/"),
    )
}

// ── Member area ──────────────────────────────────────────────

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    CurrentAccount(account): CurrentAccount,
) -> Response {
    if account.is_admin() {
        return Redirect::to("/api/admin/dashboard").into_response();
    }

    let now = Utc::now();
    let fresh = account
        .token_issued_at
        .map(|issued| now < issued + state.linker.ttl())
        .unwrap_or(false);
    let (link, link_expires_at) = match (&account.pending_token, account.token_issued_at) {
        (Some(token), Some(issued)) if fresh => {
            (state.start_link(token), Some(issued + state.linker.ttl()))
        }
        _ => (None, None),
    };

    Json(DashboardView {
        role_label: account.role.label(),
        link_state: account.link_state(),
        linked_handle: account.linked_account_handle.clone(),
        link,
        link_expires_at,
        account,
    })
    .into_response()
}

pub async fn get_profile(CurrentAccount(account): CurrentAccount) -> Json<Account> {
    Json(account)
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    CurrentAccount(account): CurrentAccount,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<Account>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("name must not be empty".into()));
    }

    state.store.update_account_name(account.id, name).await?;
    let updated = state
        .store
        .get_account(account.id)
        .await?
        .ok_or(AppError::NotFound("account"))?;
    Ok(Json(updated))
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentAccount(account): CurrentAccount,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<StatusCode, AppError> {
    if payload.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "new password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let valid =
        auth::verify_password(payload.current_password, account.password_hash.clone()).await?;
    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    let hash = auth::hash_password(payload.new_password, state.config.password_cost).await?;
    state.store.update_password_hash(account.id, &hash).await?;
    tracing::info!(account_id = %account.id, "password changed");

    Ok(StatusCode::NO_CONTENT)
}

/// "Reconnect Telegram": issue a fresh token for the caller.
pub async fn create_link_token(
    State(state): State<Arc<AppState>>,
    CurrentAccount(account): CurrentAccount,
) -> Result<Json<LinkTokenResponse>, AppError> {
    let issued = state.linker.issue_link_token(account.id).await?;
    Ok(Json(LinkTokenResponse {
        link: state.start_link(issued.token.as_str()),
        token: issued.token.into_string(),
        expires_at: issued.expires_at,
    }))
}

pub async fn link_status(CurrentAccount(account): CurrentAccount) -> Json<LinkStatusResponse> {
    Json(LinkStatusResponse {
        connected: account.linked,
        state: account.link_state(),
    })
}

// ── Administration ───────────────────────────────────────────

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    AdminAccount(_admin): AdminAccount,
) -> Result<Json<Vec<Account>>, AppError> {
    let accounts = state.store.list_accounts().await?;
    Ok(Json(accounts))
}

pub async fn list_communities(
    State(state): State<Arc<AppState>>,
    AdminAccount(_admin): AdminAccount,
) -> Result<Json<Vec<Community>>, AppError> {
    let communities = state.store.list_communities().await?;
    Ok(Json(communities))
}

pub async fn create_community(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Json(payload): Json<CreateCommunityRequest>,
) -> Result<(StatusCode, Json<Community>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("community name must not be empty".into()));
    }

    let community = state
        .store
        .insert_community(&NewCommunity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: payload.description.trim().to_string(),
            telegram_chat_id: payload.telegram_chat_id,
            kind: payload.kind,
        })
        .await?;
    tracing::info!(community_id = %community.id, created_by = %admin.id, "community created");

    Ok((StatusCode::CREATED, Json(community)))
}
