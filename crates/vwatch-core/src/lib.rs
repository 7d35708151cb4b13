//! Core domain model for vwatch: saved searches and the listings they surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "vwatch-core";

/// Marketplace host used when a query does not name one.
pub const DEFAULT_MERCHANT_DOMAIN: &str = "www.vinted.fr";

/// Number of listings requested per search.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Persisted saved search bound to a destination chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    /// Search query or catalog URL, passed verbatim to the marketplace client.
    pub url: String,
    pub channel_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Creation time of the newest listing already announced.
    pub latest_item_date: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Whether `candidate` would move the watermark forward.
    pub fn advances_watermark(&self, candidate: DateTime<Utc>) -> bool {
        match self.latest_item_date {
            Some(current) => candidate > current,
            None => true,
        }
    }

    /// Whether a listing created at `created_at` has not been announced yet.
    pub fn is_unseen(&self, created_at: DateTime<Utc>) -> bool {
        self.advances_watermark(created_at)
    }
}

/// Insert contract for the store; id, active flag and watermark are assigned there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    pub url: String,
    pub channel_id: i64,
    pub created_at: DateTime<Utc>,
}

impl NewSubscription {
    pub fn new(url: impl Into<String>, channel_id: i64) -> Self {
        Self {
            url: url.into(),
            channel_id,
            created_at: Utc::now(),
        }
    }
}

/// A marketplace listing as returned by one search. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub id: u64,
    pub title: String,
    pub price: Option<String>,
    pub size: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub photo_urls: Vec<String>,
    /// Canonical detail page.
    pub url: String,
}

impl Listing {
    pub fn primary_photo(&self) -> Option<&str> {
        self.photo_urls.first().map(String::as_str)
    }

    /// Purchase-initiation link for this listing on `domain`.
    pub fn buy_url(&self, domain: &str) -> String {
        format!(
            "https://{domain}/transaction/buy/new?source_screen=item&transaction%5Bitem_id%5D={}",
            self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn subscription(latest: Option<i64>) -> Subscription {
        Subscription {
            id: 7,
            url: "https://www.vinted.fr/catalog?search_text=veste".into(),
            channel_id: -100123,
            is_active: true,
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            latest_item_date: latest.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn unset_watermark_accepts_everything() {
        let sub = subscription(None);
        assert!(sub.is_unseen(Utc.timestamp_opt(1, 0).unwrap()));
    }

    #[test]
    fn watermark_is_strict() {
        let sub = subscription(Some(200));
        assert!(!sub.is_unseen(Utc.timestamp_opt(200, 0).unwrap()));
        assert!(!sub.is_unseen(Utc.timestamp_opt(150, 0).unwrap()));
        assert!(sub.is_unseen(Utc.timestamp_opt(201, 0).unwrap()));
    }

    #[test]
    fn buy_url_embeds_item_id() {
        let listing = Listing {
            id: 4242,
            title: "Veste".into(),
            price: Some("12.0".into()),
            size: None,
            status: None,
            created_at: Utc.timestamp_opt(10, 0).unwrap(),
            photo_urls: vec![],
            url: "https://www.vinted.fr/items/4242-veste".into(),
        };
        assert_eq!(
            listing.buy_url("www.vinted.fr"),
            "https://www.vinted.fr/transaction/buy/new?source_screen=item&transaction%5Bitem_id%5D=4242"
        );
        assert_eq!(listing.primary_photo(), None);
    }

    #[test]
    fn subscription_serializes_with_optional_watermark() {
        let json = serde_json::to_value(subscription(None)).unwrap();
        assert!(json["latest_item_date"].is_null());
        assert_eq!(json["channel_id"], -100123);
    }
}
