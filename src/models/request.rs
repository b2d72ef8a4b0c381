use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::Account;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MembershipRequest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub date_of_birth: NaiveDate,
    pub city: String,
    pub location: String,
    pub job_field: String,
    pub interests: sqlx::types::Json<Vec<String>>,
    pub why_join: String,
    pub status: RequestStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMembershipRequest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub date_of_birth: NaiveDate,
    pub city: String,
    pub location: String,
    pub job_field: String,
    pub interests: Vec<String>,
    pub why_join: String,
}

/// Result of deciding on a request. Only `pending` requests can be decided.
#[derive(Debug)]
pub enum Decision<T> {
    Done(T),
    NotFound,
    NotPending(RequestStatus),
    /// An account with the request's email already exists.
    EmailTaken,
}

pub type ApprovalOutcome = Decision<Account>;
