//! Telegram bot: long-polls for messages and turns `/start <token>` into an
//! account link.

pub mod dispatcher;
pub mod messages;
pub mod telegram;

pub use dispatcher::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/start` with its optional payload (the link token).
    Start(Option<&'a str>),
    Help,
    Status,
    Unknown(&'a str),
}

/// Parse a bot command. Returns `None` for ordinary text and for commands
/// addressed to a different bot (`/start@OtherBot`).
pub fn parse_command<'a>(text: &'a str, bot_username: &str) -> Option<Command<'a>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };

    let name = match head.split_once('@') {
        Some((name, target)) => {
            let ours = bot_username.trim_start_matches('@');
            if !ours.is_empty() && !target.eq_ignore_ascii_case(ours) {
                return None;
            }
            name
        }
        None => head,
    };

    let command = match name {
        "start" => Command::Start(args.split_whitespace().next()),
        "help" => Command::Help,
        "status" => Command::Status,
        other => Command::Unknown(other),
    };
    Some(command)
}

/// Deep link that opens the bot and sends `/start <token>`.
pub fn start_link(bot_username: &str, token: &str) -> String {
    format!(
        "https://t.me/{}?start={}",
        bot_username.trim_start_matches('@'),
        token
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        assert_eq!(
            parse_command("/start abc123", "DisciploBot"),
            Some(Command::Start(Some("abc123")))
        );
        assert_eq!(parse_command("/start", "DisciploBot"), Some(Command::Start(None)));
        assert_eq!(
            parse_command("  /start   tok  extra", ""),
            Some(Command::Start(Some("tok")))
        );
    }

    #[test]
    fn test_parse_addressed_commands() {
        assert_eq!(
            parse_command("/start@DisciploBot tok", "DisciploBot"),
            Some(Command::Start(Some("tok")))
        );
        assert_eq!(
            parse_command("/help@disciplobot", "@DisciploBot"),
            Some(Command::Help)
        );
        assert_eq!(parse_command("/help@OtherBot", "DisciploBot"), None);
    }

    #[test]
    fn test_parse_other_input() {
        assert_eq!(parse_command("/status", ""), Some(Command::Status));
        assert_eq!(parse_command("/weather now", ""), Some(Command::Unknown("weather")));
        assert_eq!(parse_command("hello there", ""), None);
        assert_eq!(parse_command("", ""), None);
    }

    #[test]
    fn test_start_link() {
        assert_eq!(
            start_link("@DisciploBot", "tok"),
            "https://t.me/DisciploBot?start=tok"
        );
    }
}
