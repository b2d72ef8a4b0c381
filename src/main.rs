use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use disciplo::bot::telegram::TelegramClient;
use disciplo::bot::Dispatcher;
use disciplo::cli;
use disciplo::config::{self, Config};
use disciplo::errors::AppError;
use disciplo::models::account::normalize_email;
use disciplo::models::request::Decision;
use disciplo::store::postgres::PgStore;
use disciplo::{api, bootstrap, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = cli::Cli::parse();
    let cfg = config::load()?;

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Bot) => run_bot(cfg).await,
        Some(cli::Commands::Account { command }) => {
            let state = connect_state(cfg).await?;
            handle_account_command(command, &state).await
        }
        Some(cli::Commands::Request { command }) => {
            let state = connect_state(cfg).await?;
            handle_request_command(command, &state).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "disciplo=debug,tower_http=info".into()),
    );
    let json = std::env::var("DISCIPLO_LOG_FORMAT").is_ok_and(|v| v == "json");
    let (plain_layer, json_layer) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain_layer)
        .with(json_layer)
        .init();
}

async fn connect_state(cfg: Config) -> anyhow::Result<Arc<AppState>> {
    let db = PgStore::connect(&cfg.database_url)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(AppState::new(cfg, Arc::new(db))))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    tracing::info!("Connecting to database...");
    let db = PgStore::connect(&cfg.database_url)
        .await
        .context("failed to connect to database")?;

    tracing::info!("Running migrations...");
    db.migrate().await?;

    let state = Arc::new(AppState::new(cfg, Arc::new(db)));
    bootstrap::ensure_admin(&state).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    jobs::cleanup::spawn(
        state.store.clone(),
        state.config.link_token_ttl,
        shutdown_rx.clone(),
    );
    tracing::info!("Background cleanup job started (expired link tokens every 1h)");

    let bot = match &state.config.bot_token {
        Some(token) => {
            let client = TelegramClient::new(&state.config.telegram_api_url, token);
            let dispatcher = Dispatcher::new(&state, client);
            Some(tokio::spawn(dispatcher.run(shutdown_rx.clone())))
        }
        None => {
            tracing::warn!("BOT_TOKEN not set, Telegram bot disabled");
            None
        }
    };

    let app = api::router(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("{} listening on {} (public URL {})", state.config.app_name, addr, state.config.host);

    let mut server_shutdown = shutdown_rx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    if let Some(handle) = bot {
        if let Err(e) = handle.await {
            tracing::error!("bot task panicked: {}", e);
        }
    }
    tracing::info!("Server shut down");
    Ok(())
}

/// `disciplo bot`: the dispatcher without the web server.
async fn run_bot(cfg: Config) -> anyhow::Result<()> {
    let token = cfg
        .bot_token
        .clone()
        .context("BOT_TOKEN must be set to run the bot")?;
    let state = connect_state(cfg).await?;

    let client = TelegramClient::new(&state.config.telegram_api_url, &token);
    let me = client.get_me().await.context("BOT_TOKEN rejected by Telegram")?;
    tracing::info!(username = me.username.as_deref().unwrap_or(""), "authorized bot");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    Dispatcher::new(&state, client).run(shutdown_rx).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn handle_account_command(
    cmd: cli::AccountCommands,
    state: &Arc<AppState>,
) -> anyhow::Result<()> {
    match cmd {
        cli::AccountCommands::List => {
            let accounts = state.store.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }
            println!(
                "{:<38} {:<32} {:<8} {:<14} TELEGRAM",
                "ID", "EMAIL", "ROLE", "LINK"
            );
            for a in accounts {
                println!(
                    "{:<38} {:<32} {:<8} {:<14} {}",
                    a.id,
                    a.email,
                    format!("{:?}", a.role).to_lowercase(),
                    format!("{:?}", a.link_state()),
                    a.linked_account_handle
                        .as_deref()
                        .map(|h| format!("@{}", h))
                        .unwrap_or_default()
                );
            }
        }
        cli::AccountCommands::Link { email } => {
            let account = state
                .store
                .find_account_by_email(&normalize_email(&email))
                .await?
                .ok_or_else(|| anyhow::anyhow!("no account with email {}", email))?;
            let issued = state.linker.issue_link_token(account.id).await?;
            println!("Link token issued for {}:", account.email);
            println!("  Expires: {}", issued.expires_at);
            match state.start_link(issued.token.as_str()) {
                Some(link) => println!("  Link:    {}", link),
                None => println!("  Token:   {} (set BOT_USERNAME to get a link)", issued.token),
            }
        }
    }
    Ok(())
}

async fn handle_request_command(
    cmd: cli::RequestCommands,
    state: &Arc<AppState>,
) -> anyhow::Result<()> {
    match cmd {
        cli::RequestCommands::List => {
            let requests = state.store.list_pending_requests(50).await?;
            if requests.is_empty() {
                println!("No pending requests.");
                return Ok(());
            }
            println!("{:<38} {:<32} {:<24} SUBMITTED", "ID", "EMAIL", "NAME");
            for r in requests {
                println!(
                    "{:<38} {:<32} {:<24} {}",
                    r.id,
                    r.email,
                    r.name,
                    r.created_at.format("%Y-%m-%d")
                );
            }
        }
        cli::RequestCommands::Approve { request_id, by } => {
            let id = uuid::Uuid::parse_str(&request_id).context("Invalid request ID")?;
            let admin_email = by
                .or_else(|| state.config.admin.as_ref().map(|a| a.email.clone()))
                .context("pass --by <admin email> or set ADMIN_EMAIL")?;
            let admin = state
                .store
                .find_account_by_email(&normalize_email(&admin_email))
                .await?
                .filter(|a| a.is_admin())
                .ok_or_else(|| anyhow::anyhow!("{} is not an administrator", admin_email))?;

            match state.approve_request(id, &admin).await {
                Ok(approval) => {
                    println!(
                        "Request {} approved, account {} created.",
                        id, approval.account.id
                    );
                    match approval.link {
                        Some(link) => println!("  Send this link to {}: {}", approval.account.email, link),
                        None => println!(
                            "  Token:   {} (set BOT_USERNAME to get a link)",
                            approval.token.token
                        ),
                    }
                    let _ = approval.notice.await;
                }
                Err(AppError::NotFound(_)) => println!("Request {} not found.", id),
                Err(AppError::Conflict(reason)) => println!("Request {} not approved: {}.", id, reason),
                Err(e) => return Err(e.into()),
            }
        }
        cli::RequestCommands::Reject { request_id } => {
            let id = uuid::Uuid::parse_str(&request_id).context("Invalid request ID")?;
            match state.store.reject_request(id).await? {
                Decision::Done(()) => println!("Request {} rejected.", id),
                Decision::NotFound => println!("Request {} not found.", id),
                Decision::NotPending(status) => {
                    println!("Request {} is already {}.", id, status.as_str())
                }
                Decision::EmailTaken => println!("Request {} could not be rejected.", id),
            }
        }
    }
    Ok(())
}
