//! Chat side of vwatch: admin commands and the Telegram gateway.

pub mod auth;
pub mod command;
pub mod handler;
pub mod telegram;

pub use auth::AdminAllowList;
pub use command::{bot_commands, command_help, parse_command, ChatCommand, CommandParseError};
pub use handler::{CommandHandler, CommandReply};
pub use telegram::{run_bot, TelegramNotifier};

pub const CRATE_NAME: &str = "vwatch-bot";
