use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "Administrator",
            Role::Member => "Member",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Accepted,
}

/// Where an account stands in the Telegram linking flow.
#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Unlinked,
    PendingLink,
    Linked,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub status: AccountStatus,
    #[serde(skip_serializing)]
    pub pending_token: Option<String>,
    pub token_issued_at: Option<DateTime<Utc>>,
    pub linked_account_id: Option<i64>,
    pub linked_account_handle: Option<String>,
    pub linked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// A re-issued token puts a linked account back into `PendingLink`.
    pub fn link_state(&self) -> LinkState {
        if self.pending_token.is_some() {
            LinkState::PendingLink
        } else if self.linked {
            LinkState::Linked
        } else {
            LinkState::Unlinked
        }
    }
}

/// Insert payload; ids are generated by the caller so both stores agree.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
    pub status: AccountStatus,
}

impl NewAccount {
    pub fn member(email: &str, name: &str, password_hash: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: normalize_email(email),
            name: name.trim().to_string(),
            role: Role::Member,
            password_hash: password_hash.to_string(),
            status: AccountStatus::Accepted,
        }
    }

    pub fn admin(email: &str, name: &str, password_hash: &str) -> Self {
        Self {
            role: Role::Admin,
            ..Self::member(email, name, password_hash)
        }
    }
}

/// Messaging-platform identity of whoever presented a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub id: i64,
    pub handle: Option<String>,
    pub display_name: Option<String>,
}

/// Emails are compared case-insensitively everywhere, so they are stored lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        let now = Utc::now();
        Account {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            name: "A".into(),
            role: Role::Member,
            password_hash: "x".into(),
            status: AccountStatus::Accepted,
            pending_token: None,
            token_issued_at: None,
            linked_account_id: None,
            linked_account_handle: None,
            linked: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_link_state_transitions() {
        let mut a = account();
        assert_eq!(a.link_state(), LinkState::Unlinked);

        a.pending_token = Some("tok".into());
        assert_eq!(a.link_state(), LinkState::PendingLink);

        a.pending_token = None;
        a.linked = true;
        assert_eq!(a.link_state(), LinkState::Linked);

        // reconnect from a linked account
        a.pending_token = Some("tok2".into());
        assert_eq!(a.link_state(), LinkState::PendingLink);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut a = account();
        a.pending_token = Some("secret-token".into());
        let json = serde_json::to_string(&a).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("password_hash"));
        assert!(json.contains("\"role\":\"member\""));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
