use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use vwatch_adapters::Marketplace;
use vwatch_core::{Listing, Subscription, DEFAULT_MERCHANT_DOMAIN, DEFAULT_PAGE_SIZE};
use vwatch_storage::SubscriptionStore;

use crate::render::{render_listing, sync_summary, ListingNotice};

/// A watermark write is attempted this many times before giving up.
const WATERMARK_WRITE_ATTEMPTS: usize = 2;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("destination chat {channel_id} is unavailable")]
    UnknownChannel { channel_id: i64 },
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_listing(&self, channel_id: i64, notice: &ListingNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The marketplace call failed; nothing changed.
    SearchFailed,
    /// The marketplace answered without an item list; nothing changed.
    EmptyResponse,
    /// No listing is newer than the watermark.
    NothingNew,
    Announced {
        announced: usize,
        watermark: DateTime<Utc>,
        watermark_persisted: bool,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub subscriptions: usize,
    pub announced: usize,
    pub failed_searches: usize,
    pub empty_responses: usize,
    pub unpersisted_watermarks: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &SyncOutcome) {
        self.subscriptions += 1;
        match outcome {
            SyncOutcome::SearchFailed => self.failed_searches += 1,
            SyncOutcome::EmptyResponse => self.empty_responses += 1,
            SyncOutcome::NothingNew => {}
            SyncOutcome::Announced {
                announced,
                watermark_persisted,
                ..
            } => {
                self.announced += announced;
                if !watermark_persisted {
                    self.unpersisted_watermarks += 1;
                }
            }
        }
    }
}

/// Which of the unseen listings (sorted newest first) get announced, in send order.
///
/// Cold starts and subscriptions without a watermark only get the newest
/// listing; otherwise the whole batch goes out oldest first.
pub fn select_announcements(
    unseen_newest_first: Vec<Listing>,
    first_sync: bool,
    has_watermark: bool,
) -> Vec<Listing> {
    let mut unseen = unseen_newest_first;
    if first_sync || !has_watermark {
        unseen.truncate(1);
    } else {
        unseen.reverse();
    }
    unseen
}

/// Listings strictly newer than the subscription's watermark, newest first.
pub fn unseen_listings(subscription: &Subscription, mut listings: Vec<Listing>) -> Vec<Listing> {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    listings.retain(|listing| subscription.is_unseen(listing.created_at));
    listings
}

pub struct Synchronizer {
    marketplace: Arc<dyn Marketplace>,
    store: Arc<dyn SubscriptionStore>,
    notifier: Arc<dyn Notifier>,
    page_size: u32,
    merchant_domain: String,
}

impl Synchronizer {
    pub fn new(
        marketplace: Arc<dyn Marketplace>,
        store: Arc<dyn SubscriptionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            marketplace,
            store,
            notifier,
            page_size: DEFAULT_PAGE_SIZE,
            merchant_domain: DEFAULT_MERCHANT_DOMAIN.to_string(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_merchant_domain(mut self, domain: impl Into<String>) -> Self {
        self.merchant_domain = domain.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.store
    }

    pub async fn sync_subscription(&self, subscription: &Subscription, first_sync: bool) -> SyncOutcome {
        let span = info_span!("sync_subscription", subscription_id = subscription.id);
        self.sync_subscription_inner(subscription, first_sync)
            .instrument(span)
            .await
    }

    async fn sync_subscription_inner(&self, subscription: &Subscription, first_sync: bool) -> SyncOutcome {
        let page = match self.marketplace.search(&subscription.url, self.page_size).await {
            Ok(page) => page,
            Err(err) => {
                warn!(error = %err, "search failed; skipping subscription this cycle");
                return SyncOutcome::SearchFailed;
            }
        };

        let Some(items) = page.items else {
            warn!("search returned no item list; skipping subscription this cycle");
            return SyncOutcome::EmptyResponse;
        };

        let unseen = unseen_listings(subscription, items);
        let Some(newest) = unseen.first() else {
            return SyncOutcome::NothingNew;
        };

        let watermark = newest.created_at;
        let watermark_persisted = if subscription.advances_watermark(watermark) {
            self.persist_watermark(subscription.id, watermark).await
        } else {
            true
        };

        let to_send = select_announcements(
            unseen,
            first_sync,
            subscription.latest_item_date.is_some(),
        );
        for listing in &to_send {
            let notice = render_listing(subscription, listing, &self.merchant_domain);
            if let Err(err) = self
                .notifier
                .send_listing(subscription.channel_id, &notice)
                .await
            {
                error!(
                    error = %err,
                    channel_id = subscription.channel_id,
                    item_id = listing.id,
                    "failed to deliver listing notice"
                );
            }
        }

        if !to_send.is_empty() {
            info!("{}", sync_summary(to_send.len(), subscription.id));
        }

        SyncOutcome::Announced {
            announced: to_send.len(),
            watermark,
            watermark_persisted,
        }
    }

    async fn persist_watermark(&self, subscription_id: i64, watermark: DateTime<Utc>) -> bool {
        for attempt in 1..=WATERMARK_WRITE_ATTEMPTS {
            match self.store.update_watermark(subscription_id, watermark).await {
                Ok(()) => return true,
                Err(err) if attempt < WATERMARK_WRITE_ATTEMPTS => {
                    warn!(error = %err, attempt, "watermark write failed; retrying");
                }
                Err(err) => {
                    error!(
                        error = %err,
                        %watermark,
                        "watermark write failed; listings may be announced again next cycle"
                    );
                }
            }
        }
        false
    }

    /// Synchronise every subscription concurrently and wait for all of them.
    pub async fn run_cycle(&self, subscriptions: &[Subscription], first_sync: bool) -> CycleReport {
        let outcomes = join_all(
            subscriptions
                .iter()
                .map(|subscription| self.sync_subscription(subscription, first_sync)),
        )
        .await;

        let mut report = CycleReport::default();
        for outcome in &outcomes {
            report.record(outcome);
        }
        report
    }
}
