use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::auth::AdminAccount;
use crate::errors::AppError;
use crate::models::account::{Account, Role};
use crate::models::request::{Decision, MembershipRequest};
use crate::AppState;

pub const PENDING_PAGE_SIZE: i64 = 50;

#[derive(Serialize)]
pub struct AdminDashboard {
    pub admin: Account,
    pub pending_requests: i64,
    pub members: usize,
    pub linked_members: usize,
}

#[derive(Serialize)]
pub struct ApproveResponse {
    pub request_id: Uuid,
    pub account_id: Uuid,
    pub email: String,
    /// Deep link to hand to the new member; `None` without a bot username.
    pub link: Option<String>,
    pub token_expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct RejectResponse {
    pub request_id: Uuid,
    pub status: &'static str,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
) -> Result<Json<AdminDashboard>, AppError> {
    let pending_requests = state.store.count_pending_requests().await?;
    let accounts = state.store.list_accounts().await?;
    let members: Vec<&Account> = accounts.iter().filter(|a| a.role == Role::Member).collect();

    Ok(Json(AdminDashboard {
        pending_requests,
        members: members.len(),
        linked_members: members.iter().filter(|a| a.linked).count(),
        admin,
    }))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    AdminAccount(_admin): AdminAccount,
) -> Result<Json<Vec<MembershipRequest>>, AppError> {
    let requests = state.store.list_pending_requests(PENDING_PAGE_SIZE).await?;
    Ok(Json(requests))
}

/// Create the member account, then issue its first link token.
pub async fn approve_request(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<Uuid>,
) -> Result<Json<ApproveResponse>, AppError> {
    let approval = state.approve_request(id, &admin).await?;

    Ok(Json(ApproveResponse {
        request_id: approval.request_id,
        account_id: approval.account.id,
        email: approval.account.email,
        link: approval.link,
        token_expires_at: approval.token.expires_at,
    }))
}

pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    AdminAccount(admin): AdminAccount,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<RejectResponse>), AppError> {
    match state.store.reject_request(id).await? {
        Decision::Done(()) => {
            tracing::info!(request_id = %id, rejected_by = %admin.id, "membership request rejected");
            Ok((
                StatusCode::OK,
                Json(RejectResponse {
                    request_id: id,
                    status: "rejected",
                }),
            ))
        }
        Decision::NotFound => Err(AppError::NotFound("request")),
        Decision::NotPending(status) => Err(AppError::Conflict(format!(
            "request is already {}",
            status.as_str()
        ))),
        Decision::EmailTaken => Err(AppError::Conflict(
            "an account with this email already exists".into(),
        )),
    }
}
