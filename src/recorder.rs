//! Audit ingestion
//!
//! Synchronous recorder invoked by request-handling collaborators after a
//! state-changing operation succeeds. Auditing is best-effort: a storage
//! failure is logged and swallowed, never surfaced to the operation being
//! audited. Success gating is the caller's concern; the recorder inspects
//! nothing about the operation's outcome.

use crate::config::MonitorConfig;
use crate::store::AuditStore;
use crate::types::{ActionKind, AuditRecord};
use std::sync::Arc;
use std::time::Duration;

/// Best-effort audit recorder
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    store_timeout: Duration,
}

impl AuditRecorder {
    /// Create a recorder over a store
    pub fn new(store: Arc<dyn AuditStore>, config: &MonitorConfig) -> Self {
        Self {
            store,
            store_timeout: config.store_timeout,
        }
    }

    /// Append one audit record with `timestamp = now()`
    ///
    /// Returns whether the record was persisted. Failures (empty user id,
    /// storage error, timeout) are logged and swallowed.
    pub async fn record(
        &self,
        user_id: impl Into<String>,
        action: ActionKind,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
        details: Option<serde_json::Value>,
    ) -> bool {
        let user_id = user_id.into();
        if user_id.is_empty() {
            tracing::warn!("Audit record dropped: empty user id");
            return false;
        }

        let mut record = AuditRecord::new(user_id.clone(), action, entity_type);
        record.entity_id = entity_id;
        record.details = details;

        match tokio::time::timeout(self.store_timeout, self.store.append(record)).await {
            Ok(Ok(id)) => {
                tracing::debug!(user = %user_id, action = %action, id, "Audit record appended");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(
                    user = %user_id,
                    action = %action,
                    error = %e,
                    "Failed to append audit record"
                );
                false
            }
            Err(_) => {
                tracing::error!(
                    user = %user_id,
                    action = %action,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Audit append timed out"
                );
                false
            }
        }
    }
}
