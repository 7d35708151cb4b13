//! Telegram gateway: listing delivery and the inbound command loop.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    BotCommand, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode,
};
use teloxide::utils::html;
use teloxide::{ApiError, RequestError};
use tracing::{error, info, warn};
use url::Url;
use vwatch_sync::{ListingNotice, Notifier, NotifyError, PollScheduler};

use crate::command::bot_commands;
use crate::handler::CommandHandler;

/// Telegram caps photo captions at 1024 characters; titles are cut well below that.
const MAX_TITLE_CHARS: usize = 200;

/// Status line shown as the bot's short description.
pub fn presence() -> String {
    format!("Vinted BOT | v{}", env!("CARGO_PKG_VERSION"))
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// HTML caption for a listing notice.
pub fn format_notice_caption(notice: &ListingNotice) -> String {
    let title = html::escape(&truncate_chars(&notice.title, MAX_TITLE_CHARS));
    let mut caption = format!("🟢 {}\n\n", html::bold(&html::link(&notice.url, &title)));
    for field in &notice.fields {
        caption.push_str(&format!(
            "{} : {}\n",
            html::bold(field.name),
            html::escape(&field.value)
        ));
    }
    caption.push_str(&format!(
        "\n{} · {}",
        html::italic(&html::escape(&notice.footer)),
        notice.timestamp.format("%d/%m/%Y %H:%M UTC")
    ));
    caption
}

/// One row of URL buttons; actions whose URL does not parse are left out.
pub fn notice_keyboard(notice: &ListingNotice) -> InlineKeyboardMarkup {
    let row: Vec<InlineKeyboardButton> = notice
        .actions
        .iter()
        .filter_map(|action| match Url::parse(&action.url) {
            Ok(url) => Some(InlineKeyboardButton::url(
                format!("{} {}", action.emoji, action.label),
                url,
            )),
            Err(err) => {
                warn!(error = %err, url = %action.url, "skipping button with invalid url");
                None
            }
        })
        .collect();
    InlineKeyboardMarkup::new(vec![row])
}

fn classify(channel_id: i64, err: RequestError) -> NotifyError {
    match err {
        RequestError::Api(ApiError::ChatNotFound) => NotifyError::UnknownChannel { channel_id },
        other => NotifyError::Delivery(other.to_string()),
    }
}

#[derive(Clone)]
pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn send_text(
        &self,
        chat: ChatId,
        caption: String,
        keyboard: InlineKeyboardMarkup,
    ) -> Result<(), RequestError> {
        self.bot
            .send_message(chat, caption)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_listing(&self, channel_id: i64, notice: &ListingNotice) -> Result<(), NotifyError> {
        let chat = ChatId(channel_id);
        let caption = format_notice_caption(notice);
        let keyboard = notice_keyboard(notice);

        let photo = notice
            .image_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok());
        let Some(photo) = photo else {
            return self
                .send_text(chat, caption, keyboard)
                .await
                .map_err(|err| classify(channel_id, err));
        };

        match self
            .bot
            .send_photo(chat, InputFile::url(photo))
            .caption(caption.clone())
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard.clone())
            .await
        {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::ChatNotFound)) => {
                Err(NotifyError::UnknownChannel { channel_id })
            }
            Err(err) => {
                // Telegram could not fetch the image; announce without it.
                warn!(error = %err, channel_id, "photo rejected; sending text notice");
                self.send_text(chat, caption, keyboard)
                    .await
                    .map_err(|err| classify(channel_id, err))
            }
        }
    }
}

async fn register_bot_commands(bot: &Bot) -> Result<(), RequestError> {
    let commands: Vec<BotCommand> = bot_commands()
        .into_iter()
        .map(|(cmd, desc)| BotCommand::new(cmd, desc))
        .collect();

    bot.set_my_commands(commands).await?;
    info!("registered bot commands with Telegram");
    Ok(())
}

/// Connect, start polling and serve commands until the process is interrupted.
pub async fn run_bot(
    bot: Bot,
    scheduler: Arc<PollScheduler>,
    handler: Arc<CommandHandler>,
) -> Result<()> {
    let me = bot.get_me().await.context("connecting to Telegram")?;
    info!(
        username = me.user.username.as_deref().unwrap_or_default(),
        bot_id = me.user.id.0,
        "connected to Telegram"
    );

    if let Err(err) = register_bot_commands(&bot).await {
        warn!(error = %err, "failed to register bot commands with Telegram");
    }
    if let Err(err) = bot
        .set_my_short_description()
        .short_description(presence())
        .await
    {
        warn!(error = %err, "failed to set bot presence");
    }

    scheduler.reset_first_sync();
    let _jobs = Arc::clone(&scheduler).start().await?;

    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let handler = Arc::clone(&handler);
        async move {
            let Some(text) = msg.text() else {
                return respond(());
            };
            let sender = msg.from.as_ref().map(|user| user.id.0);

            if let Some(reply) = handler.respond(text, sender, msg.chat.id.0).await {
                for body in std::iter::once(reply.reply).chain(reply.followups) {
                    if let Err(err) = bot.send_message(msg.chat.id, body).await {
                        error!(error = %err, "failed to send command reply");
                        break;
                    }
                }
            }

            respond(())
        }
    })
    .await;

    info!("Telegram dispatcher stopped");
    Ok(())
}
