use clap::{Parser, Subcommand};

/// Disciplo: membership portal with Telegram account linking
#[derive(Parser)]
#[command(name = "disciplo", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server (and the Telegram bot when BOT_TOKEN is set)
    Serve {
        /// Port to bind, overrides DISCIPLO_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run only the Telegram bot
    Bot,

    /// Manage accounts
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },

    /// Review membership requests
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// List all accounts with their link state
    List,
    /// Issue a new Telegram link token for an account
    Link {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
pub enum RequestCommands {
    /// List pending membership requests
    List,
    /// Approve a pending request
    Approve {
        request_id: String,
        /// Approving administrator, defaults to ADMIN_EMAIL
        #[arg(long)]
        by: Option<String>,
    },
    /// Reject a pending request
    Reject { request_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["disciplo", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Serve { port: Some(9000) })));

        let cli = Cli::try_parse_from(["disciplo", "account", "link", "--email", "a@b.c"]).unwrap();
        match cli.command {
            Some(Commands::Account {
                command: AccountCommands::Link { email },
            }) => assert_eq!(email, "a@b.c"),
            _ => panic!("expected account link"),
        }

        let cli = Cli::try_parse_from(["disciplo"]).unwrap();
        assert!(cli.command.is_none());
    }
}
