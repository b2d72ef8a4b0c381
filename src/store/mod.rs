//! Persistence seam.
//!
//! Handlers, the linker and the bot dispatcher only see `dyn Store`. The
//! Postgres store is used in production; the in-memory store backs tests and
//! local demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::account::{Account, ExternalIdentity, NewAccount};
use crate::models::community::{Community, NewCommunity};
use crate::models::request::{ApprovalOutcome, Decision, MembershipRequest, NewMembershipRequest};

pub mod memory;
pub mod postgres;

/// Outcome of the atomic token consumption.
#[derive(Debug)]
pub enum ConsumeOutcome {
    /// No account currently holds this token.
    NotFound,
    /// The token matched but was issued at or before the cutoff. It has been cleared.
    Expired(Account),
    /// The token matched and was fresh; the account is now linked.
    Linked(Account),
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- Accounts --

    async fn insert_account(&self, account: &NewAccount) -> anyhow::Result<Account>;

    async fn get_account(&self, id: Uuid) -> anyhow::Result<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> anyhow::Result<Option<Account>>;

    /// Most recently updated account linked to this messaging identity.
    async fn find_account_by_linked_id(&self, external_id: i64) -> anyhow::Result<Option<Account>>;

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>>;

    async fn update_account_name(&self, id: Uuid, name: &str) -> anyhow::Result<bool>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool>;

    // -- Linking --

    /// Overwrite the account's pending token. Returns `false` if the account does not exist.
    async fn set_pending_token(
        &self,
        id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Single read-modify-write keyed on the token value.
    ///
    /// Tokens issued after `cutoff` link the account to `identity`; older ones
    /// are cleared and reported as expired. Either way the token cannot match
    /// again, and concurrent callers with the same token see `NotFound`.
    async fn consume_pending_token(
        &self,
        token: &str,
        identity: &ExternalIdentity,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<ConsumeOutcome>;

    /// Clear every pending token issued at or before `cutoff`. Returns the number cleared.
    async fn clear_expired_tokens(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;

    // -- Membership requests --

    async fn insert_request(&self, request: &NewMembershipRequest) -> anyhow::Result<MembershipRequest>;

    async fn get_request(&self, id: Uuid) -> anyhow::Result<Option<MembershipRequest>>;

    async fn has_pending_request(&self, email: &str) -> anyhow::Result<bool>;

    async fn count_pending_requests(&self) -> anyhow::Result<i64>;

    /// Pending requests, oldest first.
    async fn list_pending_requests(&self, limit: i64) -> anyhow::Result<Vec<MembershipRequest>>;

    /// Create the member account and mark the request approved, atomically.
    async fn approve_request(
        &self,
        id: Uuid,
        approved_by: Uuid,
        account: &NewAccount,
    ) -> anyhow::Result<ApprovalOutcome>;

    async fn reject_request(&self, id: Uuid) -> anyhow::Result<Decision<()>>;

    // -- Communities --

    async fn list_communities(&self) -> anyhow::Result<Vec<Community>>;

    async fn insert_community(&self, community: &NewCommunity) -> anyhow::Result<Community>;
}
