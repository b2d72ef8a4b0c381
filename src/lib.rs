//! Disciplo: membership portal with Telegram account linking.
//!
//! The binary in `main.rs` wires these modules together; integration tests
//! in `tests/` drive them directly.

use std::sync::Arc;

pub mod api;
pub mod bootstrap;
pub mod bot;
pub mod cli;
pub mod config;
pub mod errors;
pub mod jobs;
pub mod linking;
pub mod models;
pub mod notification;
pub mod store;

use api::auth::SessionKeys;
use errors::AppError;
use linking::{IssuedToken, Linker};
use models::account::{Account, NewAccount};
use models::request::Decision;
use notification::slack::SlackNotifier;
use store::Store;
use uuid::Uuid;

/// A membership request turned into an account with its first link token.
pub struct Approval {
    pub request_id: Uuid,
    pub account: Account,
    pub token: IssuedToken,
    /// `None` without a bot username.
    pub link: Option<String>,
    /// Pending admin webhook notice. Dropping it leaves the notice running.
    pub notice: tokio::task::JoinHandle<()>,
}

/// Shared application state passed to handlers, the bot and the CLI.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub linker: Linker,
    pub sessions: SessionKeys,
    pub notifier: SlackNotifier,
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config, store: Arc<dyn Store>) -> Self {
        Self {
            linker: Linker::new(store.clone(), config.link_token_ttl),
            sessions: SessionKeys::new(&config.session_secret),
            notifier: SlackNotifier::new(config.admin_webhook_url.clone()),
            store,
            config,
        }
    }

    /// Deep link that starts the bot with `token`, or `None` without a bot username.
    pub fn start_link(&self, token: &str) -> Option<String> {
        if self.config.bot_username.is_empty() {
            return None;
        }
        Some(bot::start_link(&self.config.bot_username, token))
    }

    /// Approve a pending request on behalf of `admin`.
    ///
    /// Creates the member account, issues its first link token and posts the
    /// deep link to the admin webhook. Used by the HTTP handler and the CLI.
    pub async fn approve_request(
        &self,
        request_id: Uuid,
        admin: &Account,
    ) -> Result<Approval, AppError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(AppError::NotFound("request"))?;

        let new_account = NewAccount::member(&request.email, &request.name, &request.password_hash);
        let account = match self
            .store
            .approve_request(request_id, admin.id, &new_account)
            .await?
        {
            Decision::Done(account) => account,
            Decision::NotFound => return Err(AppError::NotFound("request")),
            Decision::NotPending(status) => {
                return Err(AppError::Conflict(format!(
                    "request is already {}",
                    status.as_str()
                )))
            }
            Decision::EmailTaken => {
                return Err(AppError::Conflict(
                    "an account with this email already exists".into(),
                ))
            }
        };

        tracing::info!(
            request_id = %request_id,
            account_id = %account.id,
            approved_by = %admin.id,
            "membership request approved"
        );

        let token = self.linker.issue_link_token(account.id).await?;
        let link = self.start_link(token.token.as_str());
        let notice = self.notifier.spawn_request_approved(
            request_id,
            account.email.clone(),
            admin.email.clone(),
            link.clone(),
        );

        Ok(Approval {
            request_id,
            account,
            token,
            link,
            notice,
        })
    }
}
