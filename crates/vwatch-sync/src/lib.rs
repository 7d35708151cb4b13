//! Polling pipeline for vwatch: per-subscription synchronisation, the poll
//! scheduler, notice rendering and process configuration.

pub mod config;
pub mod render;
pub mod scheduler;
pub mod synchronizer;

pub use config::{AppConfig, ConfigError, LogFormat};
pub use render::{
    chunk_subscriptions, render_listing, LinkAction, ListingNotice, NoticeField, LIST_CHUNK_LIMIT,
};
pub use scheduler::{PollScheduler, SchedulerState, TickResult};
pub use synchronizer::{CycleReport, Notifier, NotifyError, SyncOutcome, Synchronizer};

pub const CRATE_NAME: &str = "vwatch-sync";
