use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{ConsumeOutcome, Store};
use crate::models::account::{normalize_email, Account, ExternalIdentity, NewAccount};
use crate::models::community::{Community, NewCommunity};
use crate::models::request::{
    ApprovalOutcome, Decision, MembershipRequest, NewMembershipRequest, RequestStatus,
};

const ACCOUNT_COLUMNS: &str = "id, email, name, role, password_hash, status, pending_token, token_issued_at, linked_account_id, linked_account_handle, linked, created_at, updated_at";

const REQUEST_COLUMNS: &str = "id, name, email, password_hash, date_of_birth, city, location, job_field, interests, why_join, status, approved_by, approved_at, created_account_id, created_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Row returned by the consume statement: the updated account plus whether the token was fresh.
#[derive(sqlx::FromRow)]
struct ConsumedRow {
    #[sqlx(flatten)]
    account: Account,
    fresh: bool,
}

#[async_trait]
impl Store for PgStore {
    // -- Account Operations --

    async fn insert_account(&self, account: &NewAccount) -> anyhow::Result<Account> {
        let row = sqlx::query_as::<_, Account>(&format!(
            r#"INSERT INTO accounts (id, email, name, role, password_hash, status)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {ACCOUNT_COLUMNS}"#
        ))
        .bind(account.id)
        .bind(normalize_email(&account.email))
        .bind(&account.name)
        .bind(account.role)
        .bind(&account.password_hash)
        .bind(account.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_account(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_account_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_account_by_linked_id(&self, external_id: i64) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE linked_account_id = $1 AND linked = true ORDER BY updated_at DESC LIMIT 1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_accounts(&self) -> anyhow::Result<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn update_account_name(&self, id: Uuid, name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE accounts SET name = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> anyhow::Result<bool> {
        let result =
            sqlx::query("UPDATE accounts SET password_hash = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(password_hash)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    // -- Linking Operations --

    async fn set_pending_token(
        &self,
        id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"UPDATE accounts
               SET pending_token = $2, token_issued_at = $3, updated_at = NOW()
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(token)
        .bind(issued_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume_pending_token(
        &self,
        token: &str,
        identity: &ExternalIdentity,
        cutoff: DateTime<Utc>,
    ) -> anyhow::Result<ConsumeOutcome> {
        // FOR UPDATE makes a concurrent caller wait for the row lock and then
        // re-check `pending_token = $1` against the committed row, which no
        // longer matches. Exactly one caller gets a row back.
        let row = sqlx::query_as::<_, ConsumedRow>(
            r#"WITH target AS (
                   SELECT id, COALESCE(token_issued_at > $3, FALSE) AS fresh
                   FROM accounts
                   WHERE pending_token = $1
                   FOR UPDATE
               )
               UPDATE accounts AS a
               SET pending_token = NULL,
                   token_issued_at = NULL,
                   linked = CASE WHEN t.fresh THEN TRUE ELSE a.linked END,
                   linked_account_id = CASE WHEN t.fresh THEN $2 ELSE a.linked_account_id END,
                   linked_account_handle = CASE WHEN t.fresh THEN $4 ELSE a.linked_account_handle END,
                   updated_at = NOW()
               FROM target AS t
               WHERE a.id = t.id
               RETURNING a.id, a.email, a.name, a.role, a.password_hash, a.status,
                         a.pending_token, a.token_issued_at, a.linked_account_id,
                         a.linked_account_handle, a.linked, a.created_at, a.updated_at,
                         t.fresh"#,
        )
        .bind(token)
        .bind(identity.id)
        .bind(cutoff)
        .bind(&identity.handle)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => ConsumeOutcome::NotFound,
            Some(ConsumedRow { account, fresh: true }) => ConsumeOutcome::Linked(account),
            Some(ConsumedRow { account, fresh: false }) => ConsumeOutcome::Expired(account),
        })
    }

    async fn clear_expired_tokens(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"UPDATE accounts
               SET pending_token = NULL, token_issued_at = NULL, updated_at = NOW()
               WHERE pending_token IS NOT NULL
                 AND (token_issued_at IS NULL OR token_issued_at <= $1)"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // -- Membership Request Operations --

    async fn insert_request(&self, request: &NewMembershipRequest) -> anyhow::Result<MembershipRequest> {
        let row = sqlx::query_as::<_, MembershipRequest>(&format!(
            r#"INSERT INTO membership_requests
                   (id, name, email, password_hash, date_of_birth, city, location, job_field, interests, why_join)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING {REQUEST_COLUMNS}"#
        ))
        .bind(request.id)
        .bind(&request.name)
        .bind(normalize_email(&request.email))
        .bind(&request.password_hash)
        .bind(request.date_of_birth)
        .bind(&request.city)
        .bind(&request.location)
        .bind(&request.job_field)
        .bind(sqlx::types::Json(&request.interests))
        .bind(&request.why_join)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn get_request(&self, id: Uuid) -> anyhow::Result<Option<MembershipRequest>> {
        let row = sqlx::query_as::<_, MembershipRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn has_pending_request(&self, email: &str) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM membership_requests WHERE email = $1 AND status = 'pending')",
        )
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn count_pending_requests(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM membership_requests WHERE status = 'pending'",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn list_pending_requests(&self, limit: i64) -> anyhow::Result<Vec<MembershipRequest>> {
        let rows = sqlx::query_as::<_, MembershipRequest>(&format!(
            "SELECT {REQUEST_COLUMNS} FROM membership_requests WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn approve_request(
        &self,
        id: Uuid,
        approved_by: Uuid,
        account: &NewAccount,
    ) -> anyhow::Result<ApprovalOutcome> {
        let mut tx = self.pool.begin().await?;

        let status = sqlx::query_scalar::<_, RequestStatus>(
            "SELECT status FROM membership_requests WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        match status {
            None => return Ok(Decision::NotFound),
            Some(RequestStatus::Pending) => {}
            Some(other) => return Ok(Decision::NotPending(other)),
        }

        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)",
        )
        .bind(normalize_email(&account.email))
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Ok(Decision::EmailTaken);
        }

        let created = sqlx::query_as::<_, Account>(&format!(
            r#"INSERT INTO accounts (id, email, name, role, password_hash, status)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING {ACCOUNT_COLUMNS}"#
        ))
        .bind(account.id)
        .bind(normalize_email(&account.email))
        .bind(&account.name)
        .bind(account.role)
        .bind(&account.password_hash)
        .bind(account.status)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"UPDATE membership_requests
               SET status = 'approved', approved_by = $2, approved_at = NOW(), created_account_id = $3
               WHERE id = $1"#,
        )
        .bind(id)
        .bind(approved_by)
        .bind(created.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Decision::Done(created))
    }

    async fn reject_request(&self, id: Uuid) -> anyhow::Result<Decision<()>> {
        let result = sqlx::query(
            "UPDATE membership_requests SET status = 'rejected' WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(Decision::Done(()));
        }

        let status = sqlx::query_scalar::<_, RequestStatus>(
            "SELECT status FROM membership_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match status {
            None => Decision::NotFound,
            Some(s) => Decision::NotPending(s),
        })
    }

    // -- Community Operations --

    async fn list_communities(&self) -> anyhow::Result<Vec<Community>> {
        let rows = sqlx::query_as::<_, Community>(
            "SELECT id, name, description, telegram_chat_id, kind, created_at FROM communities ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn insert_community(&self, community: &NewCommunity) -> anyhow::Result<Community> {
        let row = sqlx::query_as::<_, Community>(
            r#"INSERT INTO communities (id, name, description, telegram_chat_id, kind)
               VALUES ($1, $2, $3, $4, $5)
               RETURNING id, name, description, telegram_chat_id, kind, created_at"#,
        )
        .bind(community.id)
        .bind(&community.name)
        .bind(&community.description)
        .bind(community.telegram_chat_id)
        .bind(community.kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }
}
