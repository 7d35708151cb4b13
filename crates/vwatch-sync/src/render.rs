//! Platform-neutral message rendering for listing notices and subscription listings.

use chrono::{DateTime, Utc};
use vwatch_core::{Listing, Subscription};

pub const ACCENT_COLOR: u32 = 0x008000;
pub const EMPTY_FIELD_PLACEHOLDER: &str = "vide";
/// Upper bound, in characters, of one subscription-listing message body.
pub const LIST_CHUNK_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeField {
    pub name: &'static str,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkAction {
    pub label: &'static str,
    pub emoji: &'static str,
    pub url: String,
}

/// Everything a chat gateway needs to announce one listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingNotice {
    pub title: String,
    pub url: String,
    pub image_url: Option<String>,
    pub accent_color: u32,
    pub timestamp: DateTime<Utc>,
    pub footer: String,
    pub fields: Vec<NoticeField>,
    pub actions: Vec<LinkAction>,
}

fn field(name: &'static str, value: Option<&str>) -> NoticeField {
    NoticeField {
        name,
        value: value
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(EMPTY_FIELD_PLACEHOLDER)
            .to_string(),
        inline: true,
    }
}

pub fn render_listing(
    subscription: &Subscription,
    listing: &Listing,
    merchant_domain: &str,
) -> ListingNotice {
    ListingNotice {
        title: listing.title.clone(),
        url: listing.url.clone(),
        image_url: listing.primary_photo().map(str::to_string),
        accent_color: ACCENT_COLOR,
        timestamp: listing.created_at,
        footer: format!("Article lié à la recherche : {}", subscription.id),
        fields: vec![
            field("Taille", listing.size.as_deref()),
            field("Prix", listing.price.as_deref()),
            field("Condition", listing.status.as_deref()),
        ],
        actions: vec![
            LinkAction {
                label: "Détails",
                emoji: "🔎",
                url: listing.url.clone(),
            },
            LinkAction {
                label: "Acheter",
                emoji: "💸",
                url: listing.buy_url(merchant_domain),
            },
        ],
    }
}

pub fn subscription_block(subscription: &Subscription) -> String {
    format!(
        "ID: {}\nURL: {}\nSalon: {}\n",
        subscription.id, subscription.url, subscription.channel_id
    )
}

/// Pack subscription blocks greedily into message bodies of at most `limit`
/// characters, blocks separated by a newline.
///
/// A block is never split; one that alone exceeds `limit` gets its own body.
pub fn chunk_subscriptions(subscriptions: &[Subscription], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for subscription in subscriptions {
        let block = subscription_block(subscription);
        let block_len = block.chars().count();

        if current.is_empty() {
            current = block;
            current_len = block_len;
            continue;
        }

        if current_len + 1 + block_len > limit {
            chunks.push(std::mem::take(&mut current));
            current = block;
            current_len = block_len;
        } else {
            current.push('\n');
            current.push_str(&block);
            current_len += 1 + block_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Log line summarising what one synchronisation announced.
pub fn sync_summary(count: usize, subscription_id: i64) -> String {
    if count > 1 {
        format!("👕 {count} nouveaux articles trouvés pour la recherche {subscription_id} !")
    } else {
        format!("👕 {count} nouvel article trouvé pour la recherche {subscription_id} !")
    }
}
