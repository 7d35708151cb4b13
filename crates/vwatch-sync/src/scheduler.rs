use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;
use vwatch_storage::SubscriptionStore;

use crate::synchronizer::{CycleReport, Synchronizer};

/// Flags shared between poll ticks.
#[derive(Debug)]
pub struct SchedulerState {
    in_flight: AtomicBool,
    first_sync: AtomicBool,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            first_sync: AtomicBool::new(true),
        }
    }
}

impl SchedulerState {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_first_sync(&self) -> bool {
        self.first_sync.load(Ordering::SeqCst)
    }

    /// Claim the in-flight flag; `false` when a cycle already holds it.
    fn try_begin(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn release(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    fn complete_cycle(&self) {
        self.first_sync.store(false, Ordering::SeqCst);
        self.release();
    }

    fn reset_first_sync(&self) {
        self.first_sync.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickResult {
    /// A previous cycle still holds the in-flight flag.
    Skipped,
    /// Active subscriptions could not be loaded.
    StoreUnavailable,
    Completed(CycleReport),
}

/// Fixed-interval driver for synchronisation cycles.
///
/// The in-flight flag is also cleared by a fallback timer armed at the start
/// of each cycle, whether or not that cycle has finished. A cycle running
/// longer than `fallback_timeout` can therefore overlap the next one.
pub struct PollScheduler {
    synchronizer: Arc<Synchronizer>,
    store: Arc<dyn SubscriptionStore>,
    state: Arc<SchedulerState>,
    poll_interval: Duration,
    fallback_timeout: Duration,
}

impl PollScheduler {
    pub fn new(synchronizer: Arc<Synchronizer>) -> Self {
        let store = Arc::clone(synchronizer.store());
        Self {
            synchronizer,
            store,
            state: Arc::new(SchedulerState::default()),
            poll_interval: Duration::from_secs(15),
            fallback_timeout: Duration::from_secs(20),
        }
    }

    pub fn with_timings(mut self, poll_interval: Duration, fallback_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.fallback_timeout = fallback_timeout;
        self
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Re-enter cold-start mode, e.g. after the chat session reconnects.
    pub fn reset_first_sync(&self) {
        self.state.reset_first_sync();
    }

    pub async fn tick(&self) -> TickResult {
        if !self.state.try_begin() {
            debug!("previous poll cycle still in flight; skipping tick");
            return TickResult::Skipped;
        }

        let fallback_state = Arc::clone(&self.state);
        let fallback = self.fallback_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(fallback).await;
            fallback_state.release();
        });

        let cycle_id = Uuid::new_v4();
        let span = info_span!("poll_cycle", %cycle_id);
        async {
            info!("synchronising with marketplace");

            let subscriptions = match self.store.find_active().await {
                Ok(subscriptions) => subscriptions,
                Err(err) => {
                    error!(error = %err, "could not load active subscriptions");
                    self.state.release();
                    return TickResult::StoreUnavailable;
                }
            };

            let first_sync = self.state.is_first_sync();
            let report = self.synchronizer.run_cycle(&subscriptions, first_sync).await;
            self.state.complete_cycle();

            debug!(
                subscriptions = report.subscriptions,
                announced = report.announced,
                failed_searches = report.failed_searches,
                first_sync,
                "poll cycle finished"
            );
            TickResult::Completed(report)
        }
        .instrument(span)
        .await
    }

    /// Run one cycle right away, then one every `poll_interval`.
    pub async fn start(self: Arc<Self>) -> Result<JobScheduler> {
        let immediate = Arc::clone(&self);
        tokio::spawn(async move {
            immediate.tick().await;
        });

        let sched = JobScheduler::new().await.context("creating poll scheduler")?;
        let scheduler = Arc::clone(&self);
        let job = Job::new_repeated_async(self.poll_interval, move |_uuid, _l| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                scheduler.tick().await;
            })
        })
        .context("creating poll job")?;
        sched.add(job).await.context("adding poll job")?;
        sched.start().await.context("starting poll scheduler")?;

        info!(
            interval_secs = self.poll_interval.as_secs(),
            fallback_secs = self.fallback_timeout.as_secs(),
            "poll scheduler started"
        );
        Ok(sched)
    }
}
