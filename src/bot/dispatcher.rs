use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::messages;
use super::telegram::{Message, TelegramClient, Update};
use super::{parse_command, Command};
use crate::linking::Linker;
use crate::store::Store;
use crate::AppState;

const POLL_TIMEOUT_SECS: u32 = 60;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Long-polls Telegram and answers bot commands.
pub struct Dispatcher {
    client: TelegramClient,
    linker: Linker,
    store: Arc<dyn Store>,
    bot_username: String,
    app_name: String,
    dashboard_url: String,
    poll_timeout: u32,
    backoff: Duration,
}

impl Dispatcher {
    pub fn new(state: &AppState, client: TelegramClient) -> Self {
        Self {
            client,
            linker: state.linker.clone(),
            store: state.store.clone(),
            bot_username: state.config.bot_username.clone(),
            app_name: state.config.app_name.clone(),
            dashboard_url: state.config.dashboard_url(),
            poll_timeout: POLL_TIMEOUT_SECS,
            backoff: ERROR_BACKOFF,
        }
    }

    /// Shorter polls and back-off, for tests against a mock API.
    pub fn with_timings(mut self, poll_timeout: u32, backoff: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self.backoff = backoff;
        self
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped). An
    /// in-flight long poll is abandoned on shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(bot = %self.bot_username, "telegram dispatcher started");
        let mut offset: i64 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                res = self.client.get_updates(offset, self.poll_timeout) => res,
            };

            match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(&update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "getUpdates failed, retrying");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                }
            }
        }

        tracing::info!("telegram dispatcher stopped");
    }

    pub async fn handle_update(&self, update: &Update) {
        let Some(message) = &update.message else {
            return;
        };
        let Some(reply) = self.reply_for(message).await else {
            return;
        };
        if let Err(e) = self.client.send_message(message.chat.id, &reply).await {
            tracing::warn!(chat_id = message.chat.id, error = %e, "failed to send reply");
        }
    }

    /// The reply for `message`, or `None` when it is not a command for us.
    pub async fn reply_for(&self, message: &Message) -> Option<String> {
        let text = message.text.as_deref()?;
        let command = parse_command(text, &self.bot_username)?;
        let sender = message.from.as_ref()?;
        if sender.is_bot {
            return None;
        }
        let identity = sender.identity();

        let body = match command {
            Command::Start(Some(token)) => match self.linker.consume_token(token, &identity).await {
                Ok(account) => messages::linked(&account),
                Err(e) if e.is_user_facing() => messages::link_rejected(&e),
                Err(e) => {
                    tracing::error!(external_id = identity.id, error = %e, "link failed");
                    messages::link_failed()
                }
            },
            Command::Start(None) => messages::welcome(&self.app_name),
            Command::Help => messages::help(),
            Command::Status => match self.store.find_account_by_linked_id(identity.id).await {
                Ok(account) => messages::status(&identity, account.as_ref()),
                Err(e) => {
                    tracing::error!(external_id = identity.id, error = %e, "status lookup failed");
                    messages::link_failed()
                }
            },
            Command::Unknown(name) => {
                tracing::debug!(command = name, "unknown bot command");
                messages::unknown_command(name)
            }
        };

        Some(messages::with_dashboard(body, &self.dashboard_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::telegram::{Chat, User};
    use crate::config;
    use crate::models::account::NewAccount;
    use crate::store::memory::MemoryStore;

    fn state() -> AppState {
        let cfg = config::from_lookup(|k| match k {
            "BOT_USERNAME" => Some("DisciploBot".into()),
            "DISCIPLO_HOST" => Some("https://members.example.org".into()),
            _ => None,
        })
        .unwrap();
        AppState::new(cfg, Arc::new(MemoryStore::new()))
    }

    fn message(from_id: i64, text: &str) -> Message {
        Message {
            message_id: 1,
            from: Some(User {
                id: from_id,
                is_bot: false,
                first_name: "Ada".into(),
                last_name: None,
                username: Some("ada".into()),
            }),
            chat: Chat { id: from_id },
            text: Some(text.into()),
        }
    }

    fn dispatcher(state: &AppState) -> Dispatcher {
        // never contacted by reply_for
        Dispatcher::new(state, TelegramClient::new("http://127.0.0.1:9", "TEST"))
    }

    #[tokio::test]
    async fn test_start_with_valid_token_links() {
        let state = state();
        let account = state
            .store
            .insert_account(&NewAccount::member("m@example.com", "Maria", "hash"))
            .await
            .unwrap();
        let issued = state.linker.issue_link_token(account.id).await.unwrap();
        let d = dispatcher(&state);

        let reply = d
            .reply_for(&message(42, &format!("/start {}", issued.token)))
            .await
            .unwrap();
        assert!(reply.contains("Welcome, Maria"));
        assert!(reply.ends_with("Dashboard: https://members.example.org/dashboard"));

        let stored = state.store.get_account(account.id).await.unwrap().unwrap();
        assert_eq!(stored.linked_account_id, Some(42));

        // spent
        let reply = d
            .reply_for(&message(99, &format!("/start {}", issued.token)))
            .await
            .unwrap();
        assert!(reply.contains("not valid"));
    }

    #[tokio::test]
    async fn test_admin_confirmation_wording() {
        let state = state();
        let admin = state
            .store
            .insert_account(&NewAccount::admin("root@example.com", "Root", "hash"))
            .await
            .unwrap();
        let issued = state.linker.issue_link_token(admin.id).await.unwrap();

        let reply = dispatcher(&state)
            .reply_for(&message(7, &format!("/start@DisciploBot {}", issued.token)))
            .await
            .unwrap();
        assert!(reply.contains("Administrator account connected"));
    }

    #[tokio::test]
    async fn test_other_commands() {
        let state = state();
        let d = dispatcher(&state);

        assert!(d.reply_for(&message(1, "/start")).await.unwrap().contains("invitation link"));
        assert!(d.reply_for(&message(1, "/help")).await.unwrap().contains("/status"));
        assert!(d
            .reply_for(&message(1, "/status"))
            .await
            .unwrap()
            .contains("Not connected"));
        assert!(d
            .reply_for(&message(1, "/dance"))
            .await
            .unwrap()
            .contains("Unknown command /dance"));
        assert!(d.reply_for(&message(1, "just chatting")).await.is_none());
    }
}
