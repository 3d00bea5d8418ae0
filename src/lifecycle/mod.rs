use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::store::EventStore;
use crate::utils::error::AppError;

/// Events still pending after this long mean verdict writes are going
/// missing somewhere.
const STALE_PENDING_HOURS: i64 = 1;

/// Periodically retires events whose time has passed. One tick deactivates
/// every live event past its end, then purges inactive events past the
/// retention grace period. Both steps are bulk writes keyed on the event's
/// own end time, so a missed or repeated tick converges to the same state.
pub struct LifecycleScheduler {
    store: Arc<dyn EventStore>,
    tick_interval: Duration,
    grace_days: i64,
    started: AtomicBool,
    last_tick: RwLock<Option<TickReport>>,
}

/// Outcome of the most recent successful tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    pub deactivated: u64,
    pub purged: u64,
    /// `None` when the stale-pending count could not be read.
    pub stale_pending: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub store_job_active: bool,
    pub last_tick: Option<TickReport>,
}

impl LifecycleScheduler {
    pub fn new(store: Arc<dyn EventStore>, tick_interval: Duration, grace_days: i64) -> Self {
        Self {
            store,
            tick_interval,
            grace_days,
            started: AtomicBool::new(false),
            last_tick: RwLock::new(None),
        }
    }

    /// Spawn the sweep loop. The first tick runs immediately, later ones at
    /// `tick_interval`. Calling this twice is a no-op the second time.
    pub fn start(self: Arc<Self>) -> Option<JoinHandle<()>> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Lifecycle scheduler already running");
            return None;
        }

        Some(tokio::spawn(async move {
            self.run().await;
        }))
    }

    async fn run(&self) {
        match self.store.has_native_lifecycle_job().await {
            Ok(true) => {
                // The sweep is idempotent, so running alongside a database
                // job is harmless. Worth a note for the operator though.
                warn!("Store-side lifecycle job detected, in-process sweep keeps running");
            }
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "Could not check for a store-side lifecycle job");
            }
        }

        let mut interval = tokio::time::interval(self.tick_interval);
        // A tick that overruns its slot must not cause a burst of catch-up
        // ticks afterwards.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(err) = self.run_tick(Utc::now()).await {
                error!(error = %err, "Lifecycle tick failed, waiting for the next one");
            }
        }
    }

    async fn run_tick(&self, now: DateTime<Utc>) -> Result<TickReport, AppError> {
        let deactivated = self.store.deactivate_expired(now).await?;
        let purged = self
            .store
            .purge_stale_inactive(self.purge_cutoff(now))
            .await?;

        // Both sweeps are done at this point and the tick has its report.
        // The stale-pending count only feeds the alarm, so a failure here
        // must not void the tick.
        let stale_cutoff = now - chrono::Duration::hours(STALE_PENDING_HOURS);
        let stale_pending = match self.store.count_stale_pending(stale_cutoff).await {
            Ok(count) => {
                if count > 0 {
                    error!(
                        stale_pending = count,
                        "Events stuck in pending, moderation verdicts are going missing"
                    );
                }
                Some(count)
            }
            Err(err) => {
                warn!(error = %err, "Could not count stale pending events");
                None
            }
        };

        info!(deactivated, purged, "Lifecycle tick complete");

        let report = TickReport {
            at: now,
            deactivated,
            purged,
            stale_pending,
        };
        *self.last_tick.write().await = Some(report);

        Ok(report)
    }

    /// Inactive events are kept this long past their end time before being
    /// purged.
    fn purge_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::days(self.grace_days)
    }

    pub async fn status(&self) -> SchedulerStatus {
        let store_job_active = self.store.has_native_lifecycle_job().await.unwrap_or(false);
        SchedulerStatus {
            running: self.started.load(Ordering::SeqCst),
            store_job_active,
            last_tick: *self.last_tick.read().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    use crate::models::{Event, EventStatus, ModerationVerdict};

    /// Store stub that records sweep calls in order and plays back scripted
    /// results; empty scripts answer as if nothing qualified.
    struct SweepStore {
        deactivate_replies: Mutex<VecDeque<Result<u64, AppError>>>,
        purge_replies: Mutex<VecDeque<Result<u64, AppError>>>,
        stale_replies: Mutex<VecDeque<Result<i64, AppError>>>,
        native_job: Result<bool, ()>,
        ops: Mutex<Vec<&'static str>>,
        deactivate_calls: Mutex<Vec<DateTime<Utc>>>,
        purge_calls: Mutex<Vec<DateTime<Utc>>>,
        stale_calls: Mutex<Vec<DateTime<Utc>>>,
    }

    impl Default for SweepStore {
        fn default() -> Self {
            Self {
                deactivate_replies: Mutex::new(VecDeque::new()),
                purge_replies: Mutex::new(VecDeque::new()),
                stale_replies: Mutex::new(VecDeque::new()),
                native_job: Ok(false),
                ops: Mutex::new(Vec::new()),
                deactivate_calls: Mutex::new(Vec::new()),
                purge_calls: Mutex::new(Vec::new()),
                stale_calls: Mutex::new(Vec::new()),
            }
        }
    }

    fn storage_error() -> AppError {
        AppError::DatabaseError(sqlx::Error::PoolTimedOut)
    }

    #[async_trait]
    impl EventStore for SweepStore {
        async fn finalize_moderation(
            &self,
            _id: Uuid,
            _verdict: ModerationVerdict,
        ) -> Result<bool, AppError> {
            Ok(true)
        }

        async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
            self.ops.lock().unwrap().push("deactivate");
            self.deactivate_calls.lock().unwrap().push(now);
            self.deactivate_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(0))
        }

        async fn purge_stale_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
            self.ops.lock().unwrap().push("purge");
            self.purge_calls.lock().unwrap().push(cutoff);
            self.purge_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(0))
        }

        async fn count_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<i64, AppError> {
            self.ops.lock().unwrap().push("stale");
            self.stale_calls.lock().unwrap().push(cutoff);
            self.stale_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(0))
        }

        async fn has_native_lifecycle_job(&self) -> Result<bool, AppError> {
            self.native_job.map_err(|_| storage_error())
        }
    }

    /// Store fake holding real rows, filtered with the same rules as the
    /// Postgres queries, for tests that watch events actually change state.
    struct MemoryStore {
        rows: Mutex<Vec<Event>>,
        clock: DateTime<Utc>,
    }

    impl MemoryStore {
        fn with_rows(clock: DateTime<Utc>, rows: Vec<Event>) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(rows),
                clock,
            })
        }

        fn row(&self, id: Uuid) -> Event {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .find(|event| event.id == id)
                .cloned()
                .unwrap()
        }

        fn snapshot(&self) -> Vec<(Uuid, EventStatus, DateTime<Utc>)> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .map(|event| (event.id, event.status, event.updated_at))
                .collect()
        }
    }

    #[async_trait]
    impl EventStore for MemoryStore {
        async fn finalize_moderation(
            &self,
            id: Uuid,
            verdict: ModerationVerdict,
        ) -> Result<bool, AppError> {
            let mut rows = self.rows.lock().unwrap();
            match rows
                .iter_mut()
                .find(|event| event.id == id && event.status == EventStatus::Pending)
            {
                Some(event) => {
                    event.status = verdict.status();
                    event.updated_at = self.clock;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
            let mut affected = 0;
            for event in self.rows.lock().unwrap().iter_mut() {
                if event.status.is_live() && event.end_at < now {
                    event.status = EventStatus::Inactive;
                    event.updated_at = self.clock;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn purge_stale_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
            let mut affected = 0;
            for event in self.rows.lock().unwrap().iter_mut() {
                if event.status == EventStatus::Inactive && event.end_at < cutoff {
                    event.status = EventStatus::Deleted;
                    event.updated_at = self.clock;
                    affected += 1;
                }
            }
            Ok(affected)
        }

        async fn count_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<i64, AppError> {
            let stale = self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|event| event.status == EventStatus::Pending && event.created_at < cutoff)
                .count();
            Ok(stale as i64)
        }

        async fn has_native_lifecycle_job(&self) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    fn scheduler<S: EventStore + 'static>(store: &Arc<S>) -> LifecycleScheduler {
        LifecycleScheduler::new(store.clone(), Duration::from_secs(3600), 14)
    }

    fn event(status: EventStatus, end_at: DateTime<Utc>) -> Event {
        let created_at = end_at - chrono::Duration::days(2);
        Event {
            id: Uuid::new_v4(),
            title: "Sunday league final".to_string(),
            description: None,
            location: "Riverside pitch 3".to_string(),
            start_at: end_at - chrono::Duration::hours(2),
            end_at,
            status,
            created_at,
            updated_at: created_at,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn tick_deactivates_before_purging() {
        let store = Arc::new(SweepStore::default());
        store.deactivate_replies.lock().unwrap().push_back(Ok(2));
        store.purge_replies.lock().unwrap().push_back(Ok(1));

        let report = scheduler(&store).run_tick(Utc::now()).await.unwrap();

        assert_eq!(*store.ops.lock().unwrap(), ["deactivate", "purge", "stale"]);
        assert_eq!(report.deactivated, 2);
        assert_eq!(report.purged, 1);
        assert_eq!(report.stale_pending, Some(0));
    }

    #[tokio::test]
    async fn failed_deactivation_abandons_the_tick() {
        let store = Arc::new(SweepStore::default());
        store
            .deactivate_replies
            .lock()
            .unwrap()
            .push_back(Err(storage_error()));

        let sched = scheduler(&store);
        assert!(sched.run_tick(Utc::now()).await.is_err());

        // The purge must not run against a half-swept table.
        assert_eq!(*store.ops.lock().unwrap(), ["deactivate"]);
        assert!(sched.status().await.last_tick.is_none());
    }

    #[tokio::test]
    async fn tick_passes_now_and_derived_cutoffs_to_the_store() {
        let store = Arc::new(SweepStore::default());
        let now = at("2026-03-01T12:00:00Z");

        scheduler(&store).run_tick(now).await.unwrap();

        assert_eq!(*store.deactivate_calls.lock().unwrap(), [now]);
        assert_eq!(
            *store.purge_calls.lock().unwrap(),
            [at("2026-02-15T12:00:00Z")]
        );
        assert_eq!(
            *store.stale_calls.lock().unwrap(),
            [at("2026-03-01T11:00:00Z")]
        );
    }

    #[test]
    fn purge_cutoff_boundaries() {
        let store: Arc<SweepStore> = Arc::new(SweepStore::default());
        let sched = scheduler(&store);
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cutoff = sched.purge_cutoff(now);

        // Ended 13 days 23 hours ago: still inside the grace period.
        let recent = now - chrono::Duration::hours(13 * 24 + 23);
        assert!(recent > cutoff);

        // Ended 14 days and a minute ago: eligible.
        let old = now - chrono::Duration::minutes(14 * 24 * 60 + 1);
        assert!(old < cutoff);

        // Ended exactly 14 days ago: a strict comparison keeps it one more
        // tick.
        assert_eq!(now - chrono::Duration::days(14), cutoff);
    }

    #[tokio::test]
    async fn tick_retires_live_events_that_have_ended() {
        let now = at("2024-01-02T00:00:00Z");
        let ended = at("2024-01-01T00:00:00Z");

        let expired = event(EventStatus::Approved, ended);
        let overdue = event(EventStatus::Active, ended);
        let upcoming = event(EventStatus::Approved, at("2024-01-03T00:00:00Z"));
        let unmoderated = event(EventStatus::Pending, ended);
        let rejected = event(EventStatus::Spam, ended);

        let store = MemoryStore::with_rows(
            now,
            vec![
                expired.clone(),
                overdue.clone(),
                upcoming.clone(),
                unmoderated.clone(),
                rejected.clone(),
            ],
        );
        let report = scheduler(&store).run_tick(now).await.unwrap();

        assert_eq!(report.deactivated, 2);
        assert_eq!(report.purged, 0);
        assert_eq!(report.stale_pending, Some(1));

        let retired = store.row(expired.id);
        assert_eq!(retired.status, EventStatus::Inactive);
        assert_eq!(retired.updated_at, now);
        assert_eq!(store.row(overdue.id).status, EventStatus::Inactive);

        // Only live events that have ended are the sweep's to touch.
        assert_eq!(store.row(upcoming.id).status, EventStatus::Approved);
        assert_eq!(store.row(unmoderated.id).status, EventStatus::Pending);
        assert_eq!(store.row(unmoderated.id).updated_at, unmoderated.updated_at);
        assert_eq!(store.row(rejected.id).status, EventStatus::Spam);
        assert_eq!(store.row(rejected.id).updated_at, rejected.updated_at);
    }

    #[tokio::test]
    async fn tick_purges_inactive_events_past_the_grace_period() {
        let now = at("2024-01-15T12:00:00Z");

        let aged_out = event(EventStatus::Inactive, at("2023-12-31T12:00:00Z"));
        // Ended 13 days 23 hours ago, one hour short of the grace period.
        let lingering = event(EventStatus::Inactive, at("2024-01-01T13:00:00Z"));
        let rejected = event(EventStatus::Spam, at("2023-12-31T12:00:00Z"));

        let store = MemoryStore::with_rows(
            now,
            vec![aged_out.clone(), lingering.clone(), rejected.clone()],
        );
        let report = scheduler(&store).run_tick(now).await.unwrap();

        assert_eq!(report.deactivated, 0);
        assert_eq!(report.purged, 1);

        let purged = store.row(aged_out.id);
        assert_eq!(purged.status, EventStatus::Deleted);
        assert_eq!(purged.updated_at, now);
        assert_eq!(store.row(lingering.id).status, EventStatus::Inactive);
        assert_eq!(store.row(lingering.id).updated_at, lingering.updated_at);
        assert_eq!(store.row(rejected.id).status, EventStatus::Spam);
    }

    #[tokio::test]
    async fn a_quiet_second_tick_touches_no_rows() {
        let now = at("2024-01-02T00:00:00Z");

        let store = MemoryStore::with_rows(
            now,
            vec![
                event(EventStatus::Approved, at("2024-01-01T00:00:00Z")),
                event(EventStatus::Inactive, at("2023-12-01T00:00:00Z")),
                event(EventStatus::Approved, at("2024-02-01T00:00:00Z")),
            ],
        );
        let sched = scheduler(&store);

        let first = sched.run_tick(now).await.unwrap();
        assert_eq!(first.deactivated, 1);
        assert_eq!(first.purged, 1);

        let settled = store.snapshot();
        let second = sched.run_tick(now).await.unwrap();

        assert_eq!(second.deactivated, 0);
        assert_eq!(second.purged, 0);
        assert_eq!(store.snapshot(), settled);
    }

    #[tokio::test]
    async fn stale_pending_count_lands_in_the_report() {
        let store = Arc::new(SweepStore::default());
        store.stale_replies.lock().unwrap().push_back(Ok(3));

        let report = scheduler(&store).run_tick(Utc::now()).await.unwrap();

        assert_eq!(report.stale_pending, Some(3));
    }

    #[tokio::test]
    async fn a_failed_stale_pending_count_does_not_void_the_tick() {
        let store = Arc::new(SweepStore::default());
        store.deactivate_replies.lock().unwrap().push_back(Ok(2));
        store.purge_replies.lock().unwrap().push_back(Ok(1));
        store
            .stale_replies
            .lock()
            .unwrap()
            .push_back(Err(storage_error()));

        let sched = scheduler(&store);
        let report = sched.run_tick(Utc::now()).await.unwrap();

        // The sweeps did their work, so the tick still counts.
        assert_eq!(report.deactivated, 2);
        assert_eq!(report.purged, 1);
        assert_eq!(report.stale_pending, None);
        assert_eq!(sched.status().await.last_tick, Some(report));
    }

    #[tokio::test]
    async fn status_reflects_the_last_tick_and_the_store_job() {
        let store = Arc::new(SweepStore {
            native_job: Ok(true),
            ..SweepStore::default()
        });
        let sched = scheduler(&store);
        let now = Utc::now();

        sched.run_tick(now).await.unwrap();
        let status = sched.status().await;

        assert!(!status.running);
        assert!(status.store_job_active);
        assert_eq!(status.last_tick.map(|t| t.at), Some(now));
    }

    #[tokio::test]
    async fn failed_store_job_check_reads_as_absent() {
        let store = Arc::new(SweepStore {
            native_job: Err(()),
            ..SweepStore::default()
        });

        let status = scheduler(&store).status().await;

        assert!(!status.store_job_active);
    }

    #[tokio::test(start_paused = true)]
    async fn start_ticks_immediately_then_hourly_and_spawns_once() {
        let store = Arc::new(SweepStore::default());
        let sched = Arc::new(scheduler(&store));

        assert!(sched.clone().start().is_some());
        assert!(sched.clone().start().is_none());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(sched.status().await.running);
        assert_eq!(store.deactivate_calls.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(store.deactivate_calls.lock().unwrap().len(), 2);
    }
}
