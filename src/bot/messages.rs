//! Chat replies. Plain text, so user-supplied names never need escaping.

use crate::linking::LinkError;
use crate::models::account::{Account, ExternalIdentity};

pub fn linked(account: &Account) -> String {
    if account.is_admin() {
        format!(
            "✅ Administrator account connected.\n\n{} ({}) is now linked to this Telegram account.",
            account.name, account.email
        )
    } else {
        format!(
            "✅ Welcome, {}!\n\nYour membership account is now connected to Telegram.",
            account.name
        )
    }
}

pub fn link_rejected(err: &LinkError) -> String {
    let reason = match err {
        LinkError::ExpiredToken => "This link has expired.",
        _ => "This link is not valid or has already been used.",
    };
    format!(
        "❌ {}\n\nAsk for a new link from your dashboard (\"Reconnect Telegram\") or contact an administrator.",
        reason
    )
}

pub fn link_failed() -> String {
    "⚠️ Connection failed because of a temporary problem. Please try the same link again in a few minutes.".to_string()
}

pub fn welcome(app_name: &str) -> String {
    format!(
        "Welcome to {}! 🎉\n\nTo connect your Telegram account you need an invitation link.\n\n\
         1. Apply for membership on the website\n\
         2. Wait for an administrator to approve your request\n\
         3. Open the link you receive to come back here with your token",
        app_name
    )
}

pub fn help() -> String {
    "Available commands\n\n\
     /start <token> - connect your account\n\
     /help - show this message\n\
     /status - show your connection status"
        .to_string()
}

pub fn status(identity: &ExternalIdentity, account: Option<&Account>) -> String {
    let mut out = format!("📊 Your Telegram account\n\nID: {}", identity.id);
    if let Some(handle) = &identity.handle {
        out.push_str(&format!("\nUsername: @{}", handle));
    }
    if let Some(name) = &identity.display_name {
        out.push_str(&format!("\nName: {}", name));
    }

    match account {
        Some(acct) => out.push_str(&format!(
            "\n\n🔗 Connected to {} ({})",
            acct.email,
            acct.role.label()
        )),
        None => out.push_str("\n\nNot connected to any account."),
    }
    out
}

pub fn unknown_command(name: &str) -> String {
    format!("Unknown command /{}. Send /help to see what I can do.", name)
}

pub fn with_dashboard(body: String, dashboard_url: &str) -> String {
    format!("{}\n\nDashboard: {}", body, dashboard_url)
}
