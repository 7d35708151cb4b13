use std::sync::Arc;

use tracing::{error, info, warn};
use vwatch_core::{NewSubscription, Subscription};
use vwatch_storage::{StoreError, SubscriptionStore};
use vwatch_sync::{chunk_subscriptions, LIST_CHUNK_LIMIT};

use crate::auth::AdminAllowList;
use crate::command::{command_help, parse_command, ChatCommand, CommandParseError};

pub const UNAUTHORIZED_REPLY: &str = "❌ Vous ne disposez pas des droits pour effectuer cette action !";
pub const SUBSCRIBED_REPLY: &str = "✅ Votre abonnement a été créé avec succès !";
pub const UNSUBSCRIBED_REPLY: &str = "✅ Abonnement supprimé avec succès !";
pub const NOT_FOUND_REPLY: &str = "❌ Aucun abonnement trouvé pour votre recherche...";
pub const LIST_HEADER: &str = "Utilisez la commande /desabonner pour supprimer un abonnement !";
/// Separator between [`LIST_HEADER`] and the subscription blocks of a followup.
const LIST_HEADER_SEPARATOR: &str = "\n\n";
pub const STORE_FAILURE_REPLY: &str = "❌ Une erreur est survenue, veuillez réessayer plus tard.";

/// Immediate reply plus any further messages for the invoking chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReply {
    pub reply: String,
    pub followups: Vec<String>,
}

impl CommandReply {
    fn text(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            followups: Vec::new(),
        }
    }
}

fn describe(subscription: &Subscription) -> String {
    format!("URL: {}\nSalon: {}", subscription.url, subscription.channel_id)
}

#[derive(Clone)]
pub struct CommandHandler {
    store: Arc<dyn SubscriptionStore>,
    admins: AdminAllowList,
}

impl CommandHandler {
    pub fn new(store: Arc<dyn SubscriptionStore>, admins: AdminAllowList) -> Self {
        if admins.is_empty() {
            warn!("no admin user ids configured; every command will be rejected");
        }
        Self { store, admins }
    }

    /// Reply to one inbound message, or `None` when it is not a command.
    ///
    /// The sender is checked against the allow-list before the command runs.
    pub async fn respond(
        &self,
        text: &str,
        sender_id: Option<u64>,
        invoking_chat: i64,
    ) -> Option<CommandReply> {
        let parsed = parse_command(text);
        if parsed == Err(CommandParseError::NotACommand) {
            return None;
        }
        if !self.admins.is_admin(sender_id) {
            return Some(CommandReply::text(UNAUTHORIZED_REPLY));
        }

        match parsed {
            Ok(command) => Some(self.execute(command, invoking_chat).await),
            Err(err) => Some(CommandReply::text(format!(
                "❌ Commande invalide : {err}\n\n{}",
                command_help()
            ))),
        }
    }

    pub async fn execute(&self, command: ChatCommand, invoking_chat: i64) -> CommandReply {
        let result = match command {
            ChatCommand::Help => Ok(CommandReply::text(command_help())),
            ChatCommand::Subscribe { url, channel_id } => {
                self.subscribe(url, channel_id.unwrap_or(invoking_chat)).await
            }
            ChatCommand::Unsubscribe { id } => self.unsubscribe(&id).await,
            ChatCommand::List => self.list().await,
        };

        result.unwrap_or_else(|err| {
            error!(error = %err, "command failed against the subscription store");
            CommandReply::text(STORE_FAILURE_REPLY)
        })
    }

    async fn subscribe(&self, url: String, channel_id: i64) -> Result<CommandReply, StoreError> {
        let subscription = self.store.create(NewSubscription::new(url, channel_id)).await?;
        info!(
            subscription_id = subscription.id,
            channel_id, "subscription created"
        );
        Ok(CommandReply::text(format!(
            "{SUBSCRIBED_REPLY}\n{}",
            describe(&subscription)
        )))
    }

    async fn unsubscribe(&self, raw_id: &str) -> Result<CommandReply, StoreError> {
        let Ok(id) = raw_id.trim().parse::<i64>() else {
            return Ok(CommandReply::text(NOT_FOUND_REPLY));
        };
        let Some(subscription) = self.store.find_active_by_id(id).await? else {
            return Ok(CommandReply::text(NOT_FOUND_REPLY));
        };

        self.store.deactivate(id).await?;
        info!(subscription_id = id, "subscription deactivated");
        Ok(CommandReply::text(format!(
            "{UNSUBSCRIBED_REPLY}\n{}",
            describe(&subscription)
        )))
    }

    async fn list(&self) -> Result<CommandReply, StoreError> {
        let subscriptions = self.store.find_active().await?;
        // The header shares the message body with the blocks.
        let body_limit = LIST_CHUNK_LIMIT
            - LIST_HEADER.chars().count()
            - LIST_HEADER_SEPARATOR.chars().count();
        let followups = chunk_subscriptions(&subscriptions, body_limit)
            .into_iter()
            .map(|chunk| format!("{LIST_HEADER}{LIST_HEADER_SEPARATOR}{chunk}"))
            .collect();
        Ok(CommandReply {
            reply: format!("✅ {} abonnements sont actifs !", subscriptions.len()),
            followups,
        })
    }
}
