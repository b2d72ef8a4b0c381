//! Dispatcher polling loop against a mocked Telegram Bot API.

mod dispatcher_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::watch;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use disciplo::bot::telegram::TelegramClient;
    use disciplo::bot::Dispatcher;
    use disciplo::models::account::NewAccount;
    use disciplo::store::memory::MemoryStore;
    use disciplo::{config, AppState};

    fn state() -> AppState {
        let cfg = config::from_lookup(|k| match k {
            "BOT_USERNAME" => Some("DisciploBot".into()),
            _ => None,
        })
        .unwrap();
        AppState::new(cfg, Arc::new(MemoryStore::new()))
    }

    fn update(update_id: i64, from: i64, text: &str) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "from": {"id": from, "is_bot": false, "first_name": "Maria", "username": "maria"},
                "chat": {"id": from, "type": "private"},
                "text": text
            }
        })
    }

    async fn wait_for_send(server: &MockServer) {
        for _ in 0..100 {
            let sent = server
                .received_requests()
                .await
                .unwrap_or_default()
                .iter()
                .any(|r| r.url.path().ends_with("/sendMessage"));
            if sent {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("dispatcher never replied");
    }

    #[tokio::test]
    async fn test_start_command_links_account_and_replies() {
        let state = state();
        let account = state
            .store
            .insert_account(&NewAccount::member("maria@example.com", "Maria", "hash"))
            .await
            .unwrap();
        let issued = state.linker.issue_link_token(account.id).await.unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    update(500, 42, "hello"),
                    update(501, 42, &format!("/start {}", issued.token)),
                ]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .and(body_string_contains("\"offset\":502"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .and(body_string_contains("Welcome, Maria"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 9, "chat": {"id": 42}, "text": "ok"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(&state, TelegramClient::new(&server.uri(), "TEST"))
            .with_timings(0, Duration::from_millis(10));
        let handle = tokio::spawn(dispatcher.run(rx));

        wait_for_send(&server).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();

        let stored = state.store.get_account(account.id).await.unwrap().unwrap();
        assert!(stored.linked);
        assert_eq!(stored.linked_account_id, Some(42));
        assert_eq!(stored.linked_account_handle.as_deref(), Some("maria"));
    }

    #[tokio::test]
    async fn test_bad_token_gets_rejection_and_loop_survives_api_errors() {
        let state = state();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [update(1, 7, "/start not-a-real-token")]
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTEST/getUpdates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": true, "result": []}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTEST/sendMessage"))
            .and(body_string_contains("not valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 1, "chat": {"id": 7}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (tx, rx) = watch::channel(false);
        let dispatcher = Dispatcher::new(&state, TelegramClient::new(&server.uri(), "TEST"))
            .with_timings(0, Duration::from_millis(10));
        let handle = tokio::spawn(dispatcher.run(rx));

        wait_for_send(&server).await;
        drop(tx);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }
}
