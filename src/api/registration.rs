//! Public membership application.
//!
//! A submitted form becomes a `pending` membership request. Nothing is
//! created in `accounts` until an administrator approves it.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth;
use super::handlers::MIN_PASSWORD_LEN;
use crate::config::RegistrationOptions;
use crate::errors::AppError;
use crate::models::account::normalize_email;
use crate::models::request::NewMembershipRequest;
use crate::AppState;

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    pub city: String,
    pub location: String,
    pub job_field: String,
    #[serde(default)]
    pub interests: Vec<String>,
    pub why_join: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub request_id: Uuid,
    pub status: &'static str,
    pub message: String,
}

#[derive(Deserialize)]
pub struct CheckEmailRequest {
    pub email: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmailKind {
    User,
    Pending,
    None,
}

#[derive(Serialize)]
pub struct CheckEmailResponse {
    pub exists: bool,
    #[serde(rename = "type")]
    pub kind: EmailKind,
    pub message: &'static str,
}

/// Form checks that need no storage access.
pub fn validate(
    form: &RegisterRequest,
    options: &RegistrationOptions,
    today: NaiveDate,
) -> Result<NaiveDate, String> {
    if form.name.trim().is_empty() {
        return Err("name is required".into());
    }
    if !EMAIL_REGEX.is_match(form.email.trim()) {
        return Err("email address is not valid".into());
    }
    if form.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }

    let dob = NaiveDate::parse_from_str(form.date_of_birth.trim(), "%Y-%m-%d")
        .map_err(|_| "date of birth must be formatted as YYYY-MM-DD".to_string())?;
    if dob >= today {
        return Err("date of birth must be in the past".into());
    }

    if form.city.trim().is_empty() {
        return Err("city is required".into());
    }
    if !options.locations.iter().any(|l| l == &form.location) {
        return Err(format!("unknown location: {}", form.location));
    }
    if !options.job_fields.iter().any(|j| j == &form.job_field) {
        return Err(format!("unknown job field: {}", form.job_field));
    }
    if form.interests.is_empty() {
        return Err("select at least one interest".into());
    }
    if let Some(unknown) = form
        .interests
        .iter()
        .find(|i| !options.interests.contains(i))
    {
        return Err(format!("unknown interest: {}", unknown));
    }
    if form.why_join.trim().is_empty() {
        return Err("tell us why you want to join".into());
    }

    Ok(dob)
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(form): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let options = &state.config.registration;
    if !options.enabled {
        return Err(AppError::Validation("registration is currently closed".into()));
    }

    let dob = validate(&form, options, Utc::now().date_naive()).map_err(AppError::Validation)?;

    let email = normalize_email(&form.email);
    if state.store.find_account_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict("an account with this email already exists".into()));
    }
    if state.store.has_pending_request(&email).await? {
        return Err(AppError::Conflict(
            "a membership request for this email is already pending".into(),
        ));
    }

    let password_hash = auth::hash_password(form.password, state.config.password_cost).await?;
    let request = state
        .store
        .insert_request(&NewMembershipRequest {
            id: Uuid::new_v4(),
            name: form.name.trim().to_string(),
            email: email.clone(),
            password_hash,
            date_of_birth: dob,
            city: form.city.trim().to_string(),
            location: form.location,
            job_field: form.job_field,
            interests: form.interests,
            why_join: form.why_join.trim().to_string(),
        })
        .await?;

    tracing::info!(request_id = %request.id, email = %request.email, "membership request submitted");
    state.notifier.spawn_new_request(
        request.id,
        request.name.clone(),
        request.email.clone(),
        format!("{}/admin/requests", state.config.host.trim_end_matches('/')),
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            request_id: request.id,
            status: "pending",
            message: "Your request has been received and will be reviewed by an administrator."
                .into(),
        }),
    ))
}

pub async fn check_email(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CheckEmailRequest>,
) -> Result<Json<CheckEmailResponse>, AppError> {
    let email = normalize_email(&payload.email);

    let response = if state.store.find_account_by_email(&email).await?.is_some() {
        CheckEmailResponse {
            exists: true,
            kind: EmailKind::User,
            message: "An account with this email already exists. Please log in.",
        }
    } else if state.store.has_pending_request(&email).await? {
        CheckEmailResponse {
            exists: true,
            kind: EmailKind::Pending,
            message: "A membership request for this email is awaiting approval.",
        }
    } else {
        CheckEmailResponse {
            exists: false,
            kind: EmailKind::None,
            message: "Email available",
        }
    };

    Ok(Json(response))
}
