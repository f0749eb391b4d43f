//! Flag and stats query service
//!
//! Read-only facade over the audit store for operator inspection.
//! Nothing here writes records or flags, so checking on a suspicious
//! user is never itself counted as suspicious activity.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::store::AuditStore;
use crate::types::{ActionLogPage, ActivityBucket, MonitoredUser, RecordFilter};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Number of recent records attached to each monitored user
pub const RECENT_ACTIONS_LIMIT: usize = 10;

/// Read-only queries over flag state and audit history
pub struct ActivityQuery {
    store: Arc<dyn AuditStore>,
    config: MonitorConfig,
}

impl ActivityQuery {
    /// Create a query service over a store
    pub fn new(store: Arc<dyn AuditStore>, config: MonitorConfig) -> Self {
        Self { store, config }
    }

    /// All monitored users, each with their most recent records
    /// (timestamp descending, at most [`RECENT_ACTIONS_LIMIT`])
    pub async fn monitored_users(&self) -> Result<Vec<MonitoredUser>> {
        let flags = self.store.monitored_users().await?;

        let mut users = Vec::with_capacity(flags.len());
        for flag in flags {
            let recent_actions = self
                .store
                .recent_for_user(&flag.user_id, RECENT_ACTIONS_LIMIT)
                .await?;
            users.push(MonitoredUser {
                flag,
                recent_actions,
            });
        }
        Ok(users)
    }

    /// Per-user activity histogram over the configured window,
    /// ordered by count descending
    pub async fn activity_stats(&self, user_id: &str) -> Result<Vec<ActivityBucket>> {
        self.activity_stats_within(user_id, self.config.window)
            .await
    }

    /// Per-user activity histogram over an explicit trailing window
    pub async fn activity_stats_within(
        &self,
        user_id: &str,
        window: Duration,
    ) -> Result<Vec<ActivityBucket>> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| MonitorError::Config(format!("window out of range: {}", e)))?;
        self.store
            .stats_for_user(user_id, Utc::now() - window)
            .await
    }

    /// Filtered audit log listing, timestamp descending
    ///
    /// `per_page` falls back to the default page size and is clamped to
    /// the maximum; `page` is 1-based. Filter time bounds are inclusive
    /// at both ends.
    pub async fn action_log(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: Option<usize>,
    ) -> Result<ActionLogPage> {
        let per_page = per_page
            .unwrap_or(self.config.default_page_size)
            .min(self.config.max_page_size)
            .max(1);
        self.store.query(filter, page.max(1), per_page).await
    }
}
