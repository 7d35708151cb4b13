//! Subscription persistence for vwatch: a store trait plus SQLite and in-memory backends.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use vwatch_core::{NewSubscription, Subscription};

pub const CRATE_NAME: &str = "vwatch-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("no subscription with id {id}")]
    NotFound { id: i64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Record operations used by the synchronizer and the command handler.
///
/// There is no optimistic concurrency: a patch overwrites whatever was written
/// between the caller's read and its write.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Active subscriptions, ordered by id.
    async fn find_active(&self) -> Result<Vec<Subscription>, StoreError>;

    async fn find_active_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError>;

    /// Lookup that ignores the active flag.
    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError>;

    async fn create(&self, new: NewSubscription) -> Result<Subscription, StoreError>;

    async fn update_watermark(&self, id: i64, latest: DateTime<Utc>) -> Result<(), StoreError>;

    async fn deactivate(&self, id: i64) -> Result<(), StoreError>;
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: i64,
    url: String,
    channel_id: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    latest_item_date: Option<DateTime<Utc>>,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            channel_id: row.channel_id,
            is_active: row.is_active,
            created_at: row.created_at,
            latest_item_date: row.latest_item_date,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    /// Open (creating if needed) the database behind `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        debug!(database_url, "connected subscription store");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("subscription store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn find_active(&self) -> Result<Vec<Subscription>, StoreError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, channel_id, is_active, created_at, latest_item_date
            FROM subscriptions
            WHERE is_active = TRUE
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Subscription::from).collect())
    }

    async fn find_active_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, channel_id, is_active, created_at, latest_item_date
            FROM subscriptions
            WHERE is_active = TRUE AND id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, url, channel_id, is_active, created_at, latest_item_date
            FROM subscriptions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Subscription::from))
    }

    async fn create(&self, new: NewSubscription) -> Result<Subscription, StoreError> {
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (url, channel_id, is_active, created_at, latest_item_date)
            VALUES (?1, ?2, TRUE, ?3, NULL)
            RETURNING id, url, channel_id, is_active, created_at, latest_item_date
            "#,
        )
        .bind(&new.url)
        .bind(new.channel_id)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_watermark(&self, id: i64, latest: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET latest_item_date = ?1 WHERE id = ?2")
            .bind(latest)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    async fn deactivate(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE subscriptions SET is_active = FALSE WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: Vec<Subscription>,
}

/// Process-local store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    state: Mutex<MemoryState>,
    failing_writes: AtomicBool,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records; new ids continue after the highest seeded id.
    pub fn with_subscriptions(rows: Vec<Subscription>) -> Self {
        let next_id = rows.iter().map(|s| s.id).max().unwrap_or(0);
        Self {
            state: Mutex::new(MemoryState { next_id, rows }),
            failing_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write return [`StoreError::Unavailable`].
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> Vec<Subscription> {
        self.state.lock().await.rows.clone()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn find_active(&self) -> Result<Vec<Subscription>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<_> = state.rows.iter().filter(|s| s.is_active).cloned().collect();
        rows.sort_by_key(|s| s.id);
        Ok(rows)
    }

    async fn find_active_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .iter()
            .find(|s| s.is_active && s.id == id)
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, new: NewSubscription) -> Result<Subscription, StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let subscription = Subscription {
            id: state.next_id,
            url: new.url,
            channel_id: new.channel_id,
            is_active: true,
            created_at: new.created_at,
            latest_item_date: None,
        };
        state.rows.push(subscription.clone());
        Ok(subscription)
    }

    async fn update_watermark(&self, id: i64, latest: DateTime<Utc>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound { id })?;
        row.latest_item_date = Some(latest);
        Ok(())
    }

    async fn deactivate(&self, id: i64) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let row = state
            .rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound { id })?;
        row.is_active = false;
        Ok(())
    }
}
