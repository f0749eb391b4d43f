//! Audit record and flag state persistence
//!
//! Provides pluggable storage backends for the append-only audit log and
//! the per-user monitored flag state.

use crate::error::Result;
use crate::types::{ActionKind, ActionLogPage, ActivityBucket, AuditRecord, RecordFilter, UserFlag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

/// Audit storage trait
///
/// Records are append-only: nothing updates or deletes them. Flag state
/// is a small upserted map keyed by user. Implementations must tolerate
/// concurrent append, aggregate reads, and flag updates.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record, assigning its sequence number
    async fn append(&self, record: AuditRecord) -> Result<u64>;

    /// Count records per user with `timestamp >= since`
    async fn count_by_user(&self, since: DateTime<Utc>) -> Result<HashMap<String, u64>>;

    /// Most recent records for a user, timestamp descending
    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Per-user histogram of `{action, entityType}` counts since `since`,
    /// ordered by count descending
    async fn stats_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityBucket>>;

    /// Filtered listing, timestamp descending; `page` is 1-based
    async fn query(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: usize,
    ) -> Result<ActionLogPage>;

    /// Set a user's monitored flag, upserting flag state
    ///
    /// Returns true if the user was not already monitored. The flag is
    /// sticky: no store operation clears it.
    async fn set_monitored(&self, user_id: &str) -> Result<bool>;

    /// Flag state for one user
    async fn flag_for_user(&self, user_id: &str) -> Result<Option<UserFlag>>;

    /// All users currently flagged, ordered by user id
    async fn monitored_users(&self) -> Result<Vec<UserFlag>>;

    /// Record a login time, upserting flag state
    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;
}

// ============================================================================
// Shared aggregate logic
// ============================================================================

fn counts_since(records: &[AuditRecord], since: DateTime<Utc>) -> HashMap<String, u64> {
    let mut counts: HashMap<String, u64> = HashMap::new();
    for record in records {
        if record.timestamp >= since {
            *counts.entry(record.user_id.clone()).or_insert(0) += 1;
        }
    }
    counts
}

fn recent_of(records: &[AuditRecord], user_id: &str, limit: usize) -> Vec<AuditRecord> {
    let mut recent: Vec<AuditRecord> = records
        .iter()
        .filter(|r| r.user_id == user_id)
        .cloned()
        .collect();
    recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
    recent.truncate(limit);
    recent
}

fn stats_of(records: &[AuditRecord], user_id: &str, since: DateTime<Utc>) -> Vec<ActivityBucket> {
    let mut counts: HashMap<(ActionKind, String), u64> = HashMap::new();
    for record in records {
        if record.user_id == user_id && record.timestamp >= since {
            *counts
                .entry((record.action, record.entity_type.clone()))
                .or_insert(0) += 1;
        }
    }

    let mut buckets: Vec<ActivityBucket> = counts
        .into_iter()
        .map(|((action, entity_type), count)| ActivityBucket {
            action,
            entity_type,
            count,
        })
        .collect();
    buckets.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.entity_type.cmp(&b.entity_type))
            .then_with(|| a.action.as_str().cmp(b.action.as_str()))
    });
    buckets
}

fn page_of(
    records: &[AuditRecord],
    filter: &RecordFilter,
    page: usize,
    per_page: usize,
) -> ActionLogPage {
    let page = page.max(1);
    let per_page = per_page.max(1);

    let mut matches: Vec<AuditRecord> = records
        .iter()
        .filter(|r| filter.matches(r))
        .cloned()
        .collect();
    matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

    let total = matches.len();
    let total_pages = (total + per_page - 1) / per_page;
    let start = (page - 1) * per_page;
    let records = if start < total {
        matches[start..(start + per_page).min(total)].to_vec()
    } else {
        Vec::new()
    };

    ActionLogPage {
        records,
        total,
        page,
        total_pages,
    }
}

// ============================================================================
// File-based Store
// ============================================================================

/// File-based audit store
///
/// Records are appended to a JSONL file, one record per line, mirroring
/// the append-only contract. Flag state lives in a JSON map written
/// atomically via temp file + rename:
/// ```text
/// <dir>/
///   records.jsonl   # Append-only audit log
///   flags.json      # Per-user flag state
/// ```
/// Flag state is loaded once at creation and written through on mutation,
/// so a single store instance should own the directory.
pub struct FileAuditStore {
    records_path: PathBuf,
    flags_path: PathBuf,
    flags: RwLock<HashMap<String, UserFlag>>,
    next_id: AtomicU64,
}

impl FileAuditStore {
    /// Create a store rooted at the given directory
    pub async fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let records_path = dir.join("records.jsonl");
        let flags_path = dir.join("flags.json");

        let flags = if flags_path.exists() {
            let content = fs::read_to_string(&flags_path).await?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };

        // Resume id assignment after the highest persisted record
        let max_id = load_records(&records_path)
            .await?
            .iter()
            .map(|r| r.id)
            .max()
            .unwrap_or(0);

        Ok(Self {
            records_path,
            flags_path,
            flags: RwLock::new(flags),
            next_id: AtomicU64::new(max_id + 1),
        })
    }

    /// Write flag state through to disk
    ///
    /// Callers hold the flags write lock across the save, so writes never
    /// contend on the temp file and disk order matches memory order.
    async fn save_flags(&self, flags: &HashMap<String, UserFlag>) -> Result<()> {
        let json = serde_json::to_string_pretty(flags)?;

        // Write atomically
        let temp_path = self.flags_path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, &self.flags_path).await?;

        tracing::debug!(path = %self.flags_path.display(), "Flag state saved");
        Ok(())
    }
}

/// Read records from a JSONL file, skipping malformed lines
///
/// A missing file is an empty log (nothing appended yet); any other I/O
/// failure propagates to the caller.
async fn load_records(path: &Path) -> Result<Vec<AuditRecord>> {
    let file = match fs::File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let reader = BufReader::new(file);
    let mut lines = reader.lines();
    let mut records = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if let Ok(record) = serde_json::from_str::<AuditRecord>(&line) {
            records.push(record);
        }
    }
    Ok(records)
}

#[async_trait]
impl AuditStore for FileAuditStore {
    async fn append(&self, mut record: AuditRecord) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;

        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.records_path)
            .await?;
        file.write_all(line.as_bytes()).await?;

        Ok(id)
    }

    async fn count_by_user(&self, since: DateTime<Utc>) -> Result<HashMap<String, u64>> {
        let records = load_records(&self.records_path).await?;
        Ok(counts_since(&records, since))
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = load_records(&self.records_path).await?;
        Ok(recent_of(&records, user_id, limit))
    }

    async fn stats_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityBucket>> {
        let records = load_records(&self.records_path).await?;
        Ok(stats_of(&records, user_id, since))
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: usize,
    ) -> Result<ActionLogPage> {
        let records = load_records(&self.records_path).await?;
        Ok(page_of(&records, filter, page, per_page))
    }

    async fn set_monitored(&self, user_id: &str) -> Result<bool> {
        let mut flags = self.flags.write().await;
        let flag = flags
            .entry(user_id.to_string())
            .or_insert_with(|| UserFlag::new(user_id));

        if flag.monitored {
            return Ok(false);
        }
        flag.monitored = true;

        self.save_flags(&flags).await?;
        Ok(true)
    }

    async fn flag_for_user(&self, user_id: &str) -> Result<Option<UserFlag>> {
        let flags = self.flags.read().await;
        Ok(flags.get(user_id).cloned())
    }

    async fn monitored_users(&self) -> Result<Vec<UserFlag>> {
        let flags = self.flags.read().await;
        let mut monitored: Vec<UserFlag> =
            flags.values().filter(|f| f.monitored).cloned().collect();
        monitored.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(monitored)
    }

    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut flags = self.flags.write().await;
        flags
            .entry(user_id.to_string())
            .or_insert_with(|| UserFlag::new(user_id))
            .last_login_at = Some(at);

        self.save_flags(&flags).await
    }
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// In-memory audit store for testing and single-process use
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
    flags: RwLock<HashMap<String, UserFlag>>,
    next_id: AtomicU64,
}

impl MemoryAuditStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            flags: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(&self, mut record: AuditRecord) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        record.id = id;

        let mut records = self.records.write().await;
        records.push(record);
        Ok(id)
    }

    async fn count_by_user(&self, since: DateTime<Utc>) -> Result<HashMap<String, u64>> {
        let records = self.records.read().await;
        Ok(counts_since(&records, since))
    }

    async fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.records.read().await;
        Ok(recent_of(&records, user_id, limit))
    }

    async fn stats_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ActivityBucket>> {
        let records = self.records.read().await;
        Ok(stats_of(&records, user_id, since))
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        page: usize,
        per_page: usize,
    ) -> Result<ActionLogPage> {
        let records = self.records.read().await;
        Ok(page_of(&records, filter, page, per_page))
    }

    async fn set_monitored(&self, user_id: &str) -> Result<bool> {
        let mut flags = self.flags.write().await;
        let flag = flags
            .entry(user_id.to_string())
            .or_insert_with(|| UserFlag::new(user_id));

        if flag.monitored {
            return Ok(false);
        }
        flag.monitored = true;
        Ok(true)
    }

    async fn flag_for_user(&self, user_id: &str) -> Result<Option<UserFlag>> {
        let flags = self.flags.read().await;
        Ok(flags.get(user_id).cloned())
    }

    async fn monitored_users(&self) -> Result<Vec<UserFlag>> {
        let flags = self.flags.read().await;
        let mut monitored: Vec<UserFlag> =
            flags.values().filter(|f| f.monitored).cloned().collect();
        monitored.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(monitored)
    }

    async fn touch_login(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut flags = self.flags.write().await;
        flags
            .entry(user_id.to_string())
            .or_insert_with(|| UserFlag::new(user_id))
            .last_login_at = Some(at);
        Ok(())
    }
}
