//! Core domain types for activity monitoring and catalog fanout
//!
//! All types use camelCase JSON serialization for wire compatibility.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Kind of audited operation, derived from the HTTP verb
///
/// Classification never rejects: unrecognized verbs map to `Unknown`,
/// and unrecognized wire values deserialize to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum ActionKind {
    Create,
    Read,
    Update,
    Delete,
    Unknown,
}

impl ActionKind {
    /// Map an HTTP verb to an action kind
    pub fn from_verb(verb: &str) -> Self {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Self::Read,
            "POST" => Self::Create,
            "PUT" | "PATCH" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Unknown,
        }
    }

    /// Canonical uppercase name, as stored on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "CREATE" => Self::Create,
            "READ" => Self::Read,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit record describing a completed state-changing operation
///
/// Records are immutable once appended: the store assigns `id` and
/// nothing updates or deletes them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// Store-assigned sequence number (0 until appended)
    #[serde(default)]
    pub id: u64,

    /// Owning actor, never empty
    pub user_id: String,

    /// Kind of operation performed
    pub action: ActionKind,

    /// Logical resource category (e.g. "CPU", "MANUFACTURER", "FILE")
    pub entity_type: String,

    /// Identifier of the affected resource, when applicable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Structured request payload retained for forensic replay
    ///
    /// Opaque to the anomaly logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Creation time, the sole ordering and windowing key
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Create a new record with `timestamp = now()`
    pub fn new(
        user_id: impl Into<String>,
        action: ActionKind,
        entity_type: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            user_id: user_id.into(),
            action,
            entity_type: entity_type.into(),
            entity_id: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the affected resource's identifier
    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Attach a forensic detail payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the creation timestamp (backfill and replay tooling)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Per-user flag state maintained by the anomaly sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFlag {
    /// Account identifier
    pub user_id: String,

    /// Sticky anomaly flag
    ///
    /// Set true by the sweep when the user crosses the threshold.
    /// Cleared only by an external administrative action.
    #[serde(default)]
    pub monitored: bool,

    /// Last login time, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl UserFlag {
    /// Create an unflagged entry for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            monitored: false,
            last_login_at: None,
        }
    }
}

/// A flagged user together with their most recent audit records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredUser {
    /// Current flag state
    #[serde(flatten)]
    pub flag: UserFlag,

    /// Most recent records, timestamp descending, at most ten
    pub recent_actions: Vec<AuditRecord>,
}

/// One row of a per-user activity histogram
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityBucket {
    /// Kind of operation
    pub action: ActionKind,

    /// Resource category the operation targeted
    pub entity_type: String,

    /// Number of matching records in the window
    pub count: u64,
}

/// Filters for audit log queries
///
/// All fields are optional; an empty filter matches every record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Inclusive lower bound on `timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on `timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Check if a record matches this filter
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(ref user_id) = self.user_id {
            if record.user_id != *user_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if record.action != action {
                return false;
            }
        }
        if let Some(ref entity_type) = self.entity_type {
            if record.entity_type != *entity_type {
                return false;
            }
        }
        if let Some(ref entity_id) = self.entity_id {
            if record.entity_id.as_deref() != Some(entity_id.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// One page of audit log results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogPage {
    /// Matching records, timestamp descending
    pub records: Vec<AuditRecord>,

    /// Total matches across all pages
    pub total: usize,

    /// 1-based page number
    pub page: usize,

    /// Total number of pages
    pub total_pages: usize,
}

/// One benchmark catalog entry, the projection broadcast to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Catalog-assigned sequence number
    pub id: u64,

    /// Full model designation (e.g. "Intel Core i7-13th 542")
    pub cpu_model: String,

    /// Benchmark score
    pub score: u32,

    /// Core count
    pub nr_cores: u32,

    /// Base clock in GHz
    pub clock_speed: f64,

    /// Manufacturing date
    pub manufacturing_date: NaiveDate,

    /// Retail price
    #[serde(rename = "priceUSD")]
    pub price_usd: f64,
}

/// A page slice of the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    /// Entries in insertion order
    pub data: Vec<CatalogEntry>,

    /// Total entries in the catalog
    pub total: usize,

    /// Whether entries remain beyond this page
    pub has_more: bool,
}

/// Push-channel messages delivered to connected observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum HubMessage {
    /// Catalog snapshot, always the first message after connect
    #[serde(rename_all = "camelCase")]
    InitialData {
        data: Vec<CatalogEntry>,
        total: usize,
        has_more: bool,
    },

    /// A newly appended catalog entry
    NewEntry { entry: CatalogEntry },

    /// Burst progress, sent only to the requester
    Progress {
        current: usize,
        total: usize,
        entry: CatalogEntry,
    },

    /// Burst completion
    Complete { message: String },
}
