//! Anomaly sweep scheduler
//!
//! Background task that periodically scans the audit store for users whose
//! action count within a trailing window reaches the threshold, and flips
//! their monitored flag. Flags are sticky: the sweep never clears them,
//! and users below the threshold are left untouched.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::store::AuditStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};

/// Sweeper lifecycle events for monitoring
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// Scheduler started
    Started,
    /// Scheduler stopped
    Stopped,
    /// One scheduled pass finished
    Completed { evaluated: usize, flagged: usize },
    /// One scheduled pass failed; the next tick proceeds
    Failed { error: String },
}

/// Outcome of one sweep pass
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Start of the evaluated trailing window
    pub window_start: DateTime<Utc>,

    /// Users with at least one record in the window
    pub evaluated: usize,

    /// Users newly flagged in this pass
    pub flagged: usize,
}

/// Periodic anomaly sweep over the audit store
///
/// The window is always computed relative to the sweep's own execution
/// time, so a stalled scheduler that catches up late still evaluates the
/// correct trailing interval.
pub struct AnomalySweeper {
    /// Storage backend
    store: Arc<dyn AuditStore>,
    /// Engine configuration
    config: MonitorConfig,
    /// Event broadcaster
    event_tx: broadcast::Sender<SweepEvent>,
    /// Scheduler running flag
    running: Arc<RwLock<bool>>,
    /// Serializes sweep passes (single-flight)
    gate: Arc<Mutex<()>>,
}

impl AnomalySweeper {
    /// Create a sweeper over a store
    ///
    /// Fails on invalid configuration; this is the only point where
    /// configuration aborts anything.
    pub fn new(store: Arc<dyn AuditStore>, config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            store,
            config,
            event_tx,
            running: Arc::new(RwLock::new(false)),
            gate: Arc::new(Mutex::new(())),
        })
    }

    /// Subscribe to sweeper events
    pub fn subscribe(&self) -> broadcast::Receiver<SweepEvent> {
        self.event_tx.subscribe()
    }

    /// Run one sweep pass
    ///
    /// Passes are serialized: a pass started while another is still
    /// running waits for it to finish. Safe to call manually while the
    /// scheduler is active.
    pub async fn sweep_once(&self) -> Result<SweepOutcome> {
        let _pass = self.gate.lock().await;

        let window = chrono::Duration::from_std(self.config.window)
            .map_err(|e| MonitorError::Config(format!("window out of range: {}", e)))?;
        let window_start = Utc::now() - window;

        let counts = self
            .bounded(self.store.count_by_user(window_start))
            .await?;

        let evaluated = counts.len();
        let mut flagged = 0;

        for (user_id, count) in &counts {
            if *count < self.config.threshold {
                continue;
            }
            // Redundant set on an already-monitored user is a no-op
            if self.bounded(self.store.set_monitored(user_id)).await? {
                flagged += 1;
                tracing::warn!(
                    user = %user_id,
                    count = *count,
                    "User flagged as suspicious"
                );
            }
        }

        tracing::debug!(evaluated, flagged, "Sweep pass completed");
        Ok(SweepOutcome {
            window_start,
            evaluated,
            flagged,
        })
    }

    /// Start the scheduler background task
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.write().await;
        if *running {
            return Ok(());
        }
        *running = true;
        drop(running);

        let _ = self.event_tx.send(SweepEvent::Started);
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            window_secs = self.config.window.as_secs(),
            threshold = self.config.threshold,
            "Anomaly sweeper started"
        );

        let store = self.store.clone();
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            let mut ticker = interval(config.sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                // Check if still running
                if !*running.read().await {
                    break;
                }

                // Create a temporary sweeper for this pass
                let sweeper = AnomalySweeper {
                    store: store.clone(),
                    config: config.clone(),
                    event_tx: event_tx.clone(),
                    running: running.clone(),
                    gate: gate.clone(),
                };

                match sweeper.sweep_once().await {
                    Ok(outcome) => {
                        let _ = event_tx.send(SweepEvent::Completed {
                            evaluated: outcome.evaluated,
                            flagged: outcome.flagged,
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Sweep pass failed");
                        let _ = event_tx.send(SweepEvent::Failed {
                            error: e.to_string(),
                        });
                    }
                }
            }

            let _ = event_tx.send(SweepEvent::Stopped);
            tracing::info!("Anomaly sweeper stopped");
        });

        Ok(())
    }

    /// Stop the scheduler
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// Check if the scheduler is running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Bound a store operation by the configured timeout
    async fn bounded<T>(&self, op: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.store_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(MonitorError::StorageTimeout(
                self.config.store_timeout.as_millis() as u64,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuditStore;
    use crate::types::{
        ActionKind, ActionLogPage, ActivityBucket, AuditRecord, RecordFilter, UserFlag,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_config(threshold: u64) -> MonitorConfig {
        MonitorConfig::default()
            .with_threshold(threshold)
            .with_window(Duration::from_secs(15 * 60))
            .with_sweep_interval(Duration::from_millis(25))
    }

    async fn inject(store: &MemoryAuditStore, user: &str, count: usize, minutes_ago: i64) {
        for _ in 0..count {
            store
                .append(
                    AuditRecord::new(user, ActionKind::Create, "CPU")
                        .with_timestamp(Utc::now() - chrono::Duration::minutes(minutes_ago)),
                )
                .await
                .unwrap();
        }
    }

    /// Fails `count_by_user` a fixed number of times, then delegates
    struct FlakyStore {
        inner: MemoryAuditStore,
        failures_left: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryAuditStore::new(),
                failures_left: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl AuditStore for FlakyStore {
        async fn append(&self, record: AuditRecord) -> Result<u64> {
            self.inner.append(record).await
        }
        async fn count_by_user(&self, since: DateTime<Utc>) -> Result<HashMap<String, u64>> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MonitorError::Storage("store offline".to_string()));
            }
            self.inner.count_by_user(since).await
        }
        async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditRecord>> {
            self.inner.recent_for_user(user_id, limit).await
        }
        async fn stats_for_user(
            &self,
            user_id: &str,
            since: DateTime<Utc>,
        ) -> Result<Vec<ActivityBucket>> {
            self.inner.stats_for_user(user_id, since).await
        }
        async fn query(
            &self,
            filter: &RecordFilter,
            page: usize,
            per_page: usize,
        ) -> Result<ActionLogPage> {
            self.inner.query(filter, page, per_page).await
        }
        async fn set_monitored(&self, user_id: &str) -> Result<bool> {
            self.inner.set_monitored(user_id).await
        }
        async fn flag_for_user(&self, user_id: &str) -> Result<Option<UserFlag>> {
            self.inner.flag_for_user(user_id).await
        }
        async fn monitored_users(&self) -> Result<Vec<UserFlag>> {
            self.inner.monitored_users().await
        }
        async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
            self.inner.touch_login(user_id, at).await
        }
    }

    /// Tracks the maximum number of concurrent `count_by_user` calls
    struct ProbeStore {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ProbeStore {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AuditStore for ProbeStore {
        async fn append(&self, _record: AuditRecord) -> Result<u64> {
            unimplemented!()
        }
        async fn count_by_user(&self, _since: DateTime<Utc>) -> Result<HashMap<String, u64>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(HashMap::new())
        }
        async fn recent_for_user(
            &self,
            _user_id: &str,
            _limit: usize,
        ) -> Result<Vec<AuditRecord>> {
            unimplemented!()
        }
        async fn stats_for_user(
            &self,
            _user_id: &str,
            _since: DateTime<Utc>,
        ) -> Result<Vec<ActivityBucket>> {
            unimplemented!()
        }
        async fn query(
            &self,
            _filter: &RecordFilter,
            _page: usize,
            _per_page: usize,
        ) -> Result<ActionLogPage> {
            unimplemented!()
        }
        async fn set_monitored(&self, _user_id: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn flag_for_user(&self, _user_id: &str) -> Result<Option<UserFlag>> {
            unimplemented!()
        }
        async fn monitored_users(&self) -> Result<Vec<UserFlag>> {
            unimplemented!()
        }
        async fn touch_login(&self, _user_id: &str, _at: DateTime<Utc>) -> Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn test_sweep_flags_user_at_threshold() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "bursty", 5, 2).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        let outcome = sweeper.sweep_once().await.unwrap();

        assert_eq!(outcome.flagged, 1);
        assert!(store.flag_for_user("bursty").await.unwrap().unwrap().monitored);
    }

    #[tokio::test]
    async fn test_sweep_leaves_under_threshold_untouched() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "quiet", 4, 2).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        let outcome = sweeper.sweep_once().await.unwrap();

        assert_eq!(outcome.flagged, 0);
        assert_eq!(outcome.evaluated, 1);
        assert!(store.flag_for_user("quiet").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_ignores_records_outside_window() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "historic", 10, 120).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        let outcome = sweeper.sweep_once().await.unwrap();

        assert_eq!(outcome.flagged, 0);
        assert!(store.flag_for_user("historic").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_idempotent() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "bursty", 8, 2).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();

        let first = sweeper.sweep_once().await.unwrap();
        assert_eq!(first.flagged, 1);

        let second = sweeper.sweep_once().await.unwrap();
        assert_eq!(second.flagged, 0);
        assert!(store.flag_for_user("bursty").await.unwrap().unwrap().monitored);
    }

    #[tokio::test]
    async fn test_sweep_flags_multiple_users() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "a", 6, 1).await;
        inject(&store, "b", 7, 1).await;
        inject(&store, "c", 2, 1).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        let outcome = sweeper.sweep_once().await.unwrap();

        assert_eq!(outcome.evaluated, 3);
        assert_eq!(outcome.flagged, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let store = Arc::new(MemoryAuditStore::new());
        let result = AnomalySweeper::new(store, MonitorConfig::default().with_threshold(0));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_stop() {
        let store = Arc::new(MemoryAuditStore::new());
        let sweeper = AnomalySweeper::new(store, test_config(5)).unwrap();

        assert!(!sweeper.is_running().await);
        sweeper.start().await.unwrap();
        assert!(sweeper.is_running().await);

        // Starting twice is a no-op
        sweeper.start().await.unwrap();

        sweeper.stop().await;
        assert!(!sweeper.is_running().await);
    }

    #[tokio::test]
    async fn test_scheduler_flags_in_background() {
        let store = Arc::new(MemoryAuditStore::new());
        inject(&store, "bursty", 6, 1).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        sweeper.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        sweeper.stop().await;

        assert!(store.flag_for_user("bursty").await.unwrap().unwrap().monitored);
    }

    #[tokio::test]
    async fn test_scheduler_survives_store_failure() {
        let store = Arc::new(FlakyStore::new(2));
        inject(&store.inner, "bursty", 6, 1).await;

        let sweeper = AnomalySweeper::new(store.clone(), test_config(5)).unwrap();
        let mut events = sweeper.subscribe();

        sweeper.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        sweeper.stop().await;

        // The store failed twice, then the sweep recovered and flagged
        assert!(store.inner.flag_for_user("bursty").await.unwrap().unwrap().monitored);

        let mut saw_failure = false;
        let mut saw_completion = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SweepEvent::Failed { .. } => saw_failure = true,
                SweepEvent::Completed { .. } => saw_completion = true,
                _ => {}
            }
        }
        assert!(saw_failure);
        assert!(saw_completion);
    }

    #[tokio::test]
    async fn test_sweeps_are_single_flight() {
        let store = Arc::new(ProbeStore::new());
        let sweeper = Arc::new(AnomalySweeper::new(store.clone(), test_config(5)).unwrap());

        let a = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.sweep_once().await })
        };
        let b = {
            let sweeper = sweeper.clone();
            tokio::spawn(async move { sweeper.sweep_once().await })
        };

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_timeout_reported() {
        struct StalledStore;

        #[async_trait]
        impl AuditStore for StalledStore {
            async fn append(&self, _record: AuditRecord) -> Result<u64> {
                unimplemented!()
            }
            async fn count_by_user(
                &self,
                _since: DateTime<Utc>,
            ) -> Result<HashMap<String, u64>> {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(HashMap::new())
            }
            async fn recent_for_user(
                &self,
                _user_id: &str,
                _limit: usize,
            ) -> Result<Vec<AuditRecord>> {
                unimplemented!()
            }
            async fn stats_for_user(
                &self,
                _user_id: &str,
                _since: DateTime<Utc>,
            ) -> Result<Vec<ActivityBucket>> {
                unimplemented!()
            }
            async fn query(
                &self,
                _filter: &RecordFilter,
                _page: usize,
                _per_page: usize,
            ) -> Result<ActionLogPage> {
                unimplemented!()
            }
            async fn set_monitored(&self, _user_id: &str) -> Result<bool> {
                unimplemented!()
            }
            async fn flag_for_user(&self, _user_id: &str) -> Result<Option<UserFlag>> {
                unimplemented!()
            }
            async fn monitored_users(&self) -> Result<Vec<UserFlag>> {
                unimplemented!()
            }
            async fn touch_login(&self, _user_id: &str, _at: DateTime<Utc>) -> Result<()> {
                unimplemented!()
            }
        }

        let config = test_config(5).with_store_timeout(Duration::from_millis(50));
        let sweeper = AnomalySweeper::new(Arc::new(StalledStore), config).unwrap();

        let result = sweeper.sweep_once().await;
        assert!(matches!(result, Err(MonitorError::StorageTimeout(_))));
    }
}
