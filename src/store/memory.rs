//! In-process `Store` used by tests and local demos.
//!
//! All state sits behind one mutex and no lock is held across an await, so
//! every operation is atomic with respect to every other.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{ConsumeOutcome, Store};
use crate::models::account::{normalize_email, Account, ExternalIdentity, NewAccount};
use crate::models::community::{Community, NewCommunity};
use crate::models::request::{
    ApprovalOutcome, Decision, MembershipRequest, NewMembershipRequest, RequestStatus,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    /// pending_token -> account id; mirrors the unique index in Postgres.
    tokens: HashMap<String, Uuid>,
    requests: HashMap<Uuid, MembershipRequest>,
    communities: HashMap<Uuid, Community>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

impl Inner {
    fn create_account(&mut self, new: &NewAccount) -> anyhow::Result<Account> {
        let email = normalize_email(&new.email);
        if self.accounts.values().any(|a| a.email == email) {
            anyhow::bail!("account with email {} already exists", email);
        }
        let now = Utc::now();
        let account = Account {
            id: new.id,
            email,
            name: new.name.clone(),
            role: new.role,
            password_hash: new.password_hash.clone(),
            status: new.status,
            pending_token: None,
            token_issued_at: None,
            linked_account_id: None,
            linked_account_handle: None,
            linked: false,
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(account.id, account.clone());
        Ok(account)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_account(&self, account: &NewAccount) -> anyhow::Result<Account> {
        self.lock()?.create_account(account)
    }

    async fn get_account(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let email = normalize_email(email);
        Ok(self
            .lock()?
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_account_by_linked_id(&self, external_id: i64) -> anyhow::Result<Option<Account>> {
        Ok(self
            .lock()?
            .accounts
            .values()
            .filter(|a| a.linked && a.linked_account_id == Some(external_id))
            .max_by_key(|a| a.updated_at)
            .cloned())
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let mut accounts: Vec<Account> = self.lock()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn update_account_name(&self, id: Uuid, name: &str) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        Ok(match inner.accounts.get_mut(&id) {
            Some(account) => {
                account.name = name.to_string();
                account.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        Ok(match inner.accounts.get_mut(&id) {
            Some(account) => {
                account.password_hash = password_hash.to_string();
                account.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn set_pending_token(
        &self,
        id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut inner = self.lock()?;
        if inner.tokens.get(token).is_some_and(|owner| *owner != id) {
            anyhow::bail!("pending token already assigned to another account");
        }
        let previous = match inner.accounts.get_mut(&id) {
            Some(account) => {
                let previous = account.pending_token.replace(token.to_string());
                account.token_issued_at = Some(issued_at);
                account.updated_at = Utc::now();
                previous
            }
            None => return Ok(false),
        };
        if let Some(old) = previous {
            inner.tokens.remove(&old);
        }
        inner.tokens.insert(token.to_string(), id);
        Ok(true)
    }

    async fn consume_pending_token(
        &self,
        token: &str,
        identity: &ExternalIdentity,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<ConsumeOutcome> {
        let mut inner = self.lock()?;
        let Some(id) = inner.tokens.remove(token) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        let Some(account) = inner.accounts.get_mut(&id) else {
            return Ok(ConsumeOutcome::NotFound);
        };

        let fresh = account.token_issued_at.is_some_and(|issued| issued > cutoff);
        account.pending_token = None;
        account.token_issued_at = None;
        account.updated_at = Utc::now();

        if !fresh {
            return Ok(ConsumeOutcome::Expired(account.clone()));
        }

        account.linked = true;
        account.linked_account_id = Some(identity.id);
        account.linked_account_handle = identity.handle.clone();
        Ok(ConsumeOutcome::Linked(account.clone()))
    }

    async fn clear_expired_tokens(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut inner = self.lock()?;
        let mut expired = Vec::new();
        for account in inner.accounts.values_mut() {
            let stale = account.pending_token.is_some()
                && account.token_issued_at.map_or(true, |issued| issued <= cutoff);
            if stale {
                if let Some(token) = account.pending_token.take() {
                    expired.push(token);
                }
                account.token_issued_at = None;
                account.updated_at = Utc::now();
            }
        }
        for token in &expired {
            inner.tokens.remove(token);
        }
        Ok(expired.len() as u64)
    }

    async fn insert_request(&self, request: &NewMembershipRequest) -> anyhow::Result<MembershipRequest> {
        let mut inner = self.lock()?;
        let email = normalize_email(&request.email);
        if inner
            .requests
            .values()
            .any(|r| r.email == email && r.status == RequestStatus::Pending)
        {
            anyhow::bail!("pending request for {} already exists", email);
        }
        let row = MembershipRequest {
            id: request.id,
            name: request.name.clone(),
            email,
            password_hash: request.password_hash.clone(),
            date_of_birth: request.date_of_birth,
            city: request.city.clone(),
            location: request.location.clone(),
            job_field: request.job_field.clone(),
            interests: sqlx::types::Json(request.interests.clone()),
            why_join: request.why_join.clone(),
            status: RequestStatus::Pending,
            approved_by: None,
            approved_at: None,
            created_account_id: None,
            created_at: Utc::now(),
        };
        inner.requests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_request(&self, id: Uuid) -> anyhow::Result<Option<MembershipRequest>> {
        Ok(self.lock()?.requests.get(&id).cloned())
    }

    async fn has_pending_request(&self, email: &str) -> anyhow::Result<bool> {
        let email = normalize_email(email);
        Ok(self
            .lock()?
            .requests
            .values()
            .any(|r| r.email == email && r.status == RequestStatus::Pending))
    }

    async fn count_pending_requests(&self) -> anyhow::Result<i64> {
        let count = self
            .lock()?
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .count();
        Ok(i64::try_from(count)?)
    }

    async fn list_pending_requests(&self, limit: i64) -> anyhow::Result<Vec<MembershipRequest>> {
        let mut rows: Vec<MembershipRequest> = self
            .lock()?
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn approve_request(
        &self,
        id: Uuid,
        approved_by: Uuid,
        account: &NewAccount,
    ) -> anyhow::Result<ApprovalOutcome> {
        let mut inner = self.lock()?;
        match inner.requests.get(&id).map(|r| r.status) {
            None => return Ok(Decision::NotFound),
            Some(RequestStatus::Pending) => {}
            Some(other) => return Ok(Decision::NotPending(other)),
        }
        let email = normalize_email(&account.email);
        if inner.accounts.values().any(|a| a.email == email) {
            return Ok(Decision::EmailTaken);
        }

        let created = inner.create_account(account)?;
        if let Some(request) = inner.requests.get_mut(&id) {
            request.status = RequestStatus::Approved;
            request.approved_by = Some(approved_by);
            request.approved_at = Some(Utc::now());
            request.created_account_id = Some(created.id);
        }
        Ok(Decision::Done(created))
    }

    async fn reject_request(&self, id: Uuid) -> anyhow::Result<Decision<()>> {
        let mut inner = self.lock()?;
        Ok(match inner.requests.get_mut(&id) {
            None => Decision::NotFound,
            Some(r) if r.status != RequestStatus::Pending => Decision::NotPending(r.status),
            Some(r) => {
                r.status = RequestStatus::Rejected;
                Decision::Done(())
            }
        })
    }

    async fn list_communities(&self) -> anyhow::Result<Vec<Community>> {
        let mut rows: Vec<Community> = self.lock()?.communities.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn insert_community(&self, community: &NewCommunity) -> anyhow::Result<Community> {
        let row = Community {
            id: community.id,
            name: community.name.clone(),
            description: community.description.clone(),
            telegram_chat_id: community.telegram_chat_id,
            kind: community.kind,
            created_at: Utc::now(),
        };
        self.lock()?.communities.insert(row.id, row.clone());
        Ok(row)
    }
}
