//! First-run administrator provisioning.

use anyhow::Context;

use crate::api::auth;
use crate::linking::token;
use crate::models::account::{normalize_email, Account, NewAccount};
use crate::AppState;

/// Create the configured administrator if it does not exist yet and, while it
/// is not linked, issue a fresh link token so the operator can connect it.
///
/// Returns `None` when no administrator is configured.
pub async fn ensure_admin(state: &AppState) -> anyhow::Result<Option<Account>> {
    let Some(admin) = &state.config.admin else {
        tracing::info!("ADMIN_EMAIL/ADMIN_PASSWORD not set, skipping admin bootstrap");
        return Ok(None);
    };

    let email = normalize_email(&admin.email);
    let account = match state.store.find_account_by_email(&email).await? {
        Some(existing) => existing,
        None => {
            let hash = auth::hash_password(admin.password.clone(), state.config.password_cost).await?;
            let created = state
                .store
                .insert_account(&NewAccount::admin(&email, &admin.name, &hash))
                .await
                .context("failed to create bootstrap admin")?;
            tracing::info!(account_id = %created.id, email = %created.email, "created admin account");
            created
        }
    };

    if account.linked {
        return Ok(Some(account));
    }

    let issued = state.linker.issue_link_token(account.id).await?;
    tracing::info!(
        account_id = %account.id,
        token_prefix = token::prefix(issued.token.as_str()),
        expires_at = %issued.expires_at,
        "admin Telegram account not linked, issued link token"
    );
    if state.config.dev_mode {
        if let Some(link) = state.start_link(issued.token.as_str()) {
            tracing::debug!(link = %link, "admin link");
        }
    }

    let refreshed = state.store.get_account(account.id).await?;
    Ok(refreshed.or(Some(account)))
}
