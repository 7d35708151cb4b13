#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Semaphore;
use vwatch_adapters::{AdapterError, Marketplace, SearchPage};
use vwatch_core::{Listing, Subscription};
use vwatch_storage::MemorySubscriptionStore;
use vwatch_sync::{ListingNotice, Notifier, NotifyError, Synchronizer};

pub fn at(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).unwrap()
}

pub fn listing(id: u64, ts: i64) -> Listing {
    Listing {
        id,
        title: format!("item {id}"),
        price: Some(format!("{id}.0 EUR")),
        size: Some("M".into()),
        status: None,
        created_at: at(ts),
        photo_urls: vec![format!("https://images.example/{id}.jpg")],
        url: format!("https://www.vinted.fr/items/{id}"),
    }
}

pub fn subscription(id: i64, url: &str, channel_id: i64, watermark: Option<i64>) -> Subscription {
    Subscription {
        id,
        url: url.to_string(),
        channel_id,
        is_active: true,
        created_at: at(0),
        latest_item_date: watermark.map(at),
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Page(SearchPage),
    Fail,
}

/// Marketplace double answering per query; optionally gated so a search blocks
/// until the test releases permits.
#[derive(Default)]
pub struct FakeMarketplace {
    responses: Mutex<HashMap<String, Scripted>>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl FakeMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn respond(&self, query: &str, response: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .insert(query.to_string(), response);
    }

    pub fn items(&self, query: &str, items: Vec<Listing>) {
        self.respond(query, Scripted::Page(SearchPage::with_items(items)));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Marketplace for FakeMarketplace {
    async fn search(&self, query: &str, _per_page: u32) -> Result<SearchPage, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        let scripted = self.responses.lock().unwrap().get(query).cloned();
        match scripted {
            Some(Scripted::Page(page)) => Ok(page),
            Some(Scripted::Fail) | None => Err(AdapterError::Status {
                status: 503,
                url: query.to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(i64, ListingNotice)>>,
    failing_channels: Mutex<Vec<i64>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel_id: i64) {
        self.failing_channels.lock().unwrap().push(channel_id);
    }

    pub fn sent(&self) -> Vec<(i64, ListingNotice)> {
        self.sent.lock().unwrap().clone()
    }

    /// Titles delivered to `channel_id`, in send order.
    pub fn titles_for(&self, channel_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(channel, _)| *channel == channel_id)
            .map(|(_, notice)| notice.title)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_listing(&self, channel_id: i64, notice: &ListingNotice) -> Result<(), NotifyError> {
        if self.failing_channels.lock().unwrap().contains(&channel_id) {
            return Err(NotifyError::UnknownChannel { channel_id });
        }
        self.sent.lock().unwrap().push((channel_id, notice.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub marketplace: Arc<FakeMarketplace>,
    pub store: Arc<MemorySubscriptionStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub synchronizer: Arc<Synchronizer>,
}

impl Harness {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self::with_marketplace(FakeMarketplace::new(), subscriptions)
    }

    pub fn with_marketplace(marketplace: FakeMarketplace, subscriptions: Vec<Subscription>) -> Self {
        let marketplace = Arc::new(marketplace);
        let store = Arc::new(MemorySubscriptionStore::with_subscriptions(subscriptions));
        let notifier = Arc::new(RecordingNotifier::new());
        let synchronizer = Arc::new(Synchronizer::new(
            marketplace.clone(),
            store.clone(),
            notifier.clone(),
        ));
        Self {
            marketplace,
            store,
            notifier,
            synchronizer,
        }
    }

    pub async fn watermark(&self, id: i64) -> Option<DateTime<Utc>> {
        self.store
            .snapshot()
            .await
            .into_iter()
            .find(|s| s.id == id)
            .and_then(|s| s.latest_item_date)
    }
}
