//! Chat command parsing.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Subscribe {
        url: String,
        /// Destination chat; `None` means the invoking chat.
        channel_id: Option<i64>,
    },
    /// The id is kept raw: a value that is not a number is simply not found.
    Unsubscribe { id: String },
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("message is not a command")]
    NotACommand,
    #[error("commande inconnue `{0}`")]
    UnknownCommand(String),
    #[error("argument manquant `{0}`")]
    MissingArgument(&'static str),
    #[error("identifiant de salon invalide `{0}`")]
    InvalidChatId(String),
}

/// Parse a chat message into a command. A trailing `@botname` on the command
/// word is ignored.
pub fn parse_command(text: &str) -> Result<ChatCommand, CommandParseError> {
    let mut parts = text.split_whitespace();
    let Some(raw_command) = parts.next() else {
        return Err(CommandParseError::NotACommand);
    };
    if !raw_command.starts_with('/') {
        return Err(CommandParseError::NotACommand);
    }

    let command = raw_command
        .split_once('@')
        .map_or(raw_command, |(head, _)| head)
        .to_lowercase();

    match command.as_str() {
        "/start" | "/help" => Ok(ChatCommand::Help),
        "/abonner" | "/subscribe" => {
            let url = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("url"))?
                .to_string();
            let channel_id = parts
                .next()
                .map(|raw| {
                    raw.parse::<i64>()
                        .map_err(|_| CommandParseError::InvalidChatId(raw.to_string()))
                })
                .transpose()?;
            Ok(ChatCommand::Subscribe { url, channel_id })
        }
        "/desabonner" | "/désabonner" | "/unsubscribe" => {
            let id = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("id"))?
                .to_string();
            Ok(ChatCommand::Unsubscribe { id })
        }
        "/abonnements" | "/subscriptions" | "/list" => Ok(ChatCommand::List),
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

/// Help text returned by `/start` and `/help`.
#[must_use]
pub const fn command_help() -> &'static str {
    "📋 Commandes\n\n\
    /abonner <url> [chat_id] - 🔔 S'abonner à une recherche Vinted\n\
    /desabonner <id> - 🔕 Se désabonner d'une recherche\n\
    /abonnements - 📜 Lister les abonnements actifs"
}

/// (command, description) pairs for the Telegram "/" menu.
///
/// Only ASCII names are listed; Telegram rejects accented command names.
#[must_use]
pub fn bot_commands() -> Vec<(&'static str, &'static str)> {
    vec![
        ("abonner", "S'abonner à une recherche Vinted"),
        ("desabonner", "Se désabonner d'une recherche"),
        ("abonnements", "Accéder à la liste de tous vos abonnements"),
        ("help", "Afficher les commandes"),
    ]
}
