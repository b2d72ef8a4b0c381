//! Telegram account linking.
//!
//! An account moves `Unlinked -> PendingLink -> Linked`. Issuing a token
//! (approval, dashboard reconnect, bootstrap, CLI) stores it on the account
//! together with its issue time; the bot consumes it when the user sends
//! `/start <token>`. Consumption is a single conditional update in the store,
//! so a token can be spent at most once no matter how many processes race.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::account::{Account, ExternalIdentity};
use crate::store::{ConsumeOutcome, Store};

pub mod token;

pub use token::LinkToken;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("token generator failed: {0}")]
    GeneratorFailure(#[source] rand::Error),

    #[error("invalid link token")]
    InvalidToken,

    #[error("link token expired")]
    ExpiredToken,

    #[error("account not found")]
    AccountNotFound,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] anyhow::Error),
}

impl LinkError {
    /// Errors the user can fix by asking for a new link.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, LinkError::InvalidToken | LinkError::ExpiredToken)
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: LinkToken,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Linker {
    store: Arc<dyn Store>,
    ttl: Duration,
}

impl Linker {
    pub fn new(store: Arc<dyn Store>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn issue_link_token(&self, account_id: Uuid) -> Result<IssuedToken, LinkError> {
        self.issue_link_token_at(account_id, Utc::now()).await
    }

    /// Generate a token and store it on the account, replacing any pending one.
    pub async fn issue_link_token_at(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, LinkError> {
        let token = token::issue()?;

        let updated = self
            .store
            .set_pending_token(account_id, token.as_str(), now)
            .await
            .map_err(LinkError::StorageUnavailable)?;
        if !updated {
            return Err(LinkError::AccountNotFound);
        }

        tracing::info!(
            account_id = %account_id,
            token_prefix = token::prefix(token.as_str()),
            "issued link token"
        );

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: now
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        })
    }

    pub async fn consume_token(
        &self,
        token: &str,
        identity: &ExternalIdentity,
    ) -> Result<Account, LinkError> {
        self.consume_token_at(token, identity, Utc::now()).await
    }

    /// Spend `token` on behalf of `identity`. Matching is exact; a token is
    /// valid while `now < issued_at + ttl`.
    pub async fn consume_token_at(
        &self,
        token: &str,
        identity: &ExternalIdentity,
        now: DateTime<Utc>,
    ) -> Result<Account, LinkError> {
        if token.trim().is_empty() {
            return Err(LinkError::InvalidToken);
        }

        let cutoff = now
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let outcome = self
            .store
            .consume_pending_token(token, identity, cutoff)
            .await
            .map_err(LinkError::StorageUnavailable)?;

        match outcome {
            ConsumeOutcome::NotFound => {
                tracing::warn!(
                    external_id = identity.id,
                    token_prefix = token::prefix(token),
                    "link attempt with unknown token"
                );
                Err(LinkError::InvalidToken)
            }
            ConsumeOutcome::Expired(account) => {
                tracing::warn!(
                    account_id = %account.id,
                    external_id = identity.id,
                    "link attempt with expired token"
                );
                Err(LinkError::ExpiredToken)
            }
            ConsumeOutcome::Linked(account) => {
                tracing::info!(
                    account_id = %account.id,
                    email = %account.email,
                    role = ?account.role,
                    external_id = identity.id,
                    handle = identity.handle.as_deref().unwrap_or(""),
                    "account linked"
                );
                Ok(account)
            }
        }
    }
}
