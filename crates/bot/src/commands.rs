//! Bot command table and parser.

use relay_notifier::transport::BotCommand;

/// Commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Subscribe,
    Unsubscribe,
    /// Show the metrics snapshot for `source`, or the default source.
    Metrics { source: Option<String> },
    /// Reply with the caller's chat id.
    Identify,
}

/// `(command, description)` pairs registered as the bot menu.
const MENU: &[(&str, &str)] = &[
    ("start", "Start the bot"),
    ("help", "List available commands"),
    ("subscribe", "Receive notifications in this chat"),
    ("unsubscribe", "Stop receiving notifications"),
    ("metrics", "Latest metrics snapshot (optionally: /metrics <source>)"),
    ("id", "Show this chat's id"),
];

impl Command {
    /// Parse the first whitespace-delimited token of `text` as a command.
    ///
    /// Returns `None` for plain text, unknown commands, and commands addressed
    /// to a different bot (`/start@other_bot`).
    pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Self> {
        let mut tokens = text.split_whitespace();
        let head = tokens.next()?.strip_prefix('/')?;

        let name = match head.split_once('@') {
            Some((name, target)) => {
                if let Some(username) = bot_username
                    && !target.eq_ignore_ascii_case(username)
                {
                    return None;
                }
                name
            }
            None => head,
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "subscribe" => Command::Subscribe,
            "unsubscribe" => Command::Unsubscribe,
            "metrics" => Command::Metrics {
                source: tokens.next().map(str::to_string),
            },
            "id" | "identify" => Command::Identify,
            _ => return None,
        };
        Some(command)
    }

    /// Whether the sender must already be a subscriber (dynamic directory only).
    pub fn requires_subscription(&self) -> bool {
        !matches!(self, Command::Start | Command::Help | Command::Subscribe)
    }

    /// Command menu for `setMyCommands`.
    pub fn menu() -> Vec<BotCommand> {
        MENU.iter()
            .map(|(command, description)| BotCommand::new(command, description))
            .collect()
    }
}

/// Help text listing every command.
pub fn help_text() -> String {
    let mut text = String::from("Available commands:\n");
    for (command, description) in MENU {
        text.push_str(&format!("/{} - {}\n", command, description));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        assert_eq!(Command::parse("/start", None), Some(Command::Start));
        assert_eq!(Command::parse("/help", None), Some(Command::Help));
        assert_eq!(Command::parse("/subscribe", None), Some(Command::Subscribe));
        assert_eq!(Command::parse("/unsubscribe", None), Some(Command::Unsubscribe));
        assert_eq!(Command::parse("/id", None), Some(Command::Identify));
        assert_eq!(Command::parse("/identify", None), Some(Command::Identify));
    }

    #[test]
    fn test_parse_metrics_source() {
        assert_eq!(
            Command::parse("/metrics", None),
            Some(Command::Metrics { source: None })
        );
        assert_eq!(
            Command::parse("  /metrics   staging extra", None),
            Some(Command::Metrics {
                source: Some("staging".to_string())
            })
        );
    }

    #[test]
    fn test_plain_and_unknown_text_ignored() {
        assert_eq!(Command::parse("hello there", None), None);
        assert_eq!(Command::parse("", None), None);
        assert_eq!(Command::parse("/deploy", None), None);
        assert_eq!(Command::parse("start", None), None);
    }

    #[test]
    fn test_bot_mention_suffix() {
        assert_eq!(
            Command::parse("/start@relay_bot", Some("relay_bot")),
            Some(Command::Start)
        );
        assert_eq!(
            Command::parse("/start@Relay_Bot", Some("relay_bot")),
            Some(Command::Start)
        );
        assert_eq!(Command::parse("/start@other_bot", Some("relay_bot")), None);
        // Unknown own username: accept any mention
        assert_eq!(Command::parse("/help@whatever", None), Some(Command::Help));
    }

    #[test]
    fn test_subscription_gate_table() {
        assert!(!Command::Start.requires_subscription());
        assert!(!Command::Help.requires_subscription());
        assert!(!Command::Subscribe.requires_subscription());
        assert!(Command::Unsubscribe.requires_subscription());
        assert!(Command::Metrics { source: None }.requires_subscription());
        assert!(Command::Identify.requires_subscription());
    }

    #[test]
    fn test_menu_matches_help() {
        let menu = Command::menu();
        assert_eq!(menu.len(), 6);
        let help = help_text();
        for entry in &menu {
            assert!(help.contains(&format!("/{}", entry.command)));
            assert!(Command::parse(&format!("/{}", entry.command), None).is_some());
        }
    }
}
