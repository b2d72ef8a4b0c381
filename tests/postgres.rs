//! `PgStore` against a real database.
//!
//! **Requirements:**
//! - PostgreSQL running at DATABASE_URL (migrations are applied on connect)
//! - Run with `cargo test --test postgres -- --ignored`
//!
//! Every test works on its own freshly inserted accounts, so they can share
//! one database and run in parallel.

mod pg_store_tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use disciplo::linking::{LinkError, Linker};
    use disciplo::models::account::{Account, ExternalIdentity, LinkState, NewAccount};
    use disciplo::store::postgres::PgStore;
    use disciplo::store::{ConsumeOutcome, Store};

    async fn store() -> Arc<PgStore> {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
        let store = PgStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        Arc::new(store)
    }

    async fn account(store: &PgStore) -> Account {
        let email = format!("pg-{}@example.com", Uuid::new_v4());
        store
            .insert_account(&NewAccount::member(&email, "Pg Member", "hash"))
            .await
            .unwrap()
    }

    fn sender(id: i64) -> ExternalIdentity {
        ExternalIdentity {
            id,
            handle: Some(format!("tg{}", id)),
            display_name: None,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_link_scenario() {
        let store = store().await;
        let linker = Linker::new(store.clone(), Duration::days(7));
        let member = account(&store).await;

        let issued = linker.issue_link_token(member.id).await.unwrap();
        let stored = store.get_account(member.id).await.unwrap().unwrap();
        assert_eq!(stored.link_state(), LinkState::PendingLink);
        assert_eq!(stored.pending_token.as_deref(), Some(issued.token.as_str()));

        let err = linker.consume_token("wrong", &sender(42)).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken));

        let linked = linker.consume_token(issued.token.as_str(), &sender(42)).await.unwrap();
        assert_eq!(linked.id, member.id);
        assert!(linked.linked);
        assert_eq!(linked.linked_account_id, Some(42));
        assert_eq!(linked.linked_account_handle.as_deref(), Some("tg42"));
        assert!(linked.pending_token.is_none());
        assert!(linked.token_issued_at.is_none());

        // spent: a second identity cannot reuse it
        let err = linker.consume_token(issued.token.as_str(), &sender(99)).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken));
        let stored = store.get_account(member.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_account_id, Some(42));
        assert_eq!(stored.link_state(), LinkState::Linked);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_expired_token_is_cleared_without_linking() {
        let store = store().await;
        let linker = Linker::new(store.clone(), Duration::days(7));
        let member = account(&store).await;

        let issued_at = Utc::now() - Duration::days(7) - Duration::seconds(1);
        let issued = linker.issue_link_token_at(member.id, issued_at).await.unwrap();

        let err = linker.consume_token(issued.token.as_str(), &sender(7)).await.unwrap_err();
        assert!(matches!(err, LinkError::ExpiredToken));

        let stored = store.get_account(member.id).await.unwrap().unwrap();
        assert!(!stored.linked);
        assert!(stored.linked_account_id.is_none());
        assert!(stored.pending_token.is_none());
        assert!(stored.token_issued_at.is_none());

        let err = linker.consume_token(issued.token.as_str(), &sender(7)).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_reissue_invalidates_previous_token() {
        let store = store().await;
        let linker = Linker::new(store.clone(), Duration::days(7));
        let member = account(&store).await;

        let first = linker.issue_link_token(member.id).await.unwrap().token;
        let second = linker.issue_link_token(member.id).await.unwrap().token;
        assert_ne!(first.as_str(), second.as_str());

        let err = linker.consume_token(first.as_str(), &sender(1)).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken));

        let linked = linker.consume_token(second.as_str(), &sender(1)).await.unwrap();
        assert_eq!(linked.id, member.id);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_set_pending_token_for_missing_account() {
        let store = store().await;
        let updated = store
            .set_pending_token(Uuid::new_v4(), "orphan-token", Utc::now())
            .await
            .unwrap();
        assert!(!updated);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires DATABASE_URL"]
    async fn test_concurrent_consume_single_winner() {
        let store = store().await;
        let member = account(&store).await;
        let token = format!("race-{}", Uuid::new_v4().simple());
        store.set_pending_token(member.id, &token, Utc::now()).await.unwrap();
        let cutoff = Utc::now() - Duration::days(7);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move {
                store.consume_pending_token(&token, &sender(i), cutoff).await
            }));
        }

        let mut winners = Vec::new();
        for h in handles {
            match h.await.unwrap().unwrap() {
                ConsumeOutcome::Linked(account) => winners.push(account),
                ConsumeOutcome::NotFound => {}
                ConsumeOutcome::Expired(_) => panic!("fresh token reported as expired"),
            }
        }
        assert_eq!(winners.len(), 1);

        let stored = store.get_account(member.id).await.unwrap().unwrap();
        assert!(stored.linked);
        assert_eq!(stored.linked_account_id, winners[0].linked_account_id);
        assert!(stored.pending_token.is_none());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn test_clear_expired_tokens_keeps_fresh_ones() {
        let store = store().await;
        let stale = account(&store).await;
        let fresh = account(&store).await;
        let now = Utc::now();
        let stale_token = format!("stale-{}", Uuid::new_v4().simple());
        let fresh_token = format!("fresh-{}", Uuid::new_v4().simple());
        store
            .set_pending_token(stale.id, &stale_token, now - Duration::days(60))
            .await
            .unwrap();
        store.set_pending_token(fresh.id, &fresh_token, now).await.unwrap();

        // far enough back to leave the other tests' rows alone
        let cleared = store.clear_expired_tokens(now - Duration::days(30)).await.unwrap();
        assert!(cleared >= 1);

        let stale = store.get_account(stale.id).await.unwrap().unwrap();
        assert!(stale.pending_token.is_none());
        assert!(stale.token_issued_at.is_none());
        let fresh = store.get_account(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh.pending_token.as_deref(), Some(fresh_token.as_str()));
    }
}
