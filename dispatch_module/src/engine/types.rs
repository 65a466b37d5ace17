use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Fixed external contract: callers and UI messaging quote this number, so it
/// must not change without a version bump.
pub const MAX_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    Immediate,
    Scheduled,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Active,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Html,
    Text,
}

macro_rules! str_enum {
    ($name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($label => Ok(Self::$variant),)+
                    other => Err(format!(concat!("unknown ", stringify!($name), " '{}'"), other)),
                }
            }
        }
    };
}

str_enum!(DispatchMode {
    Immediate => "immediate",
    Scheduled => "scheduled",
    Recurring => "recurring",
});

str_enum!(RecurrenceInterval {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

str_enum!(CampaignStatus {
    Draft => "draft",
    Scheduled => "scheduled",
    Sending => "sending",
    Active => "active",
    Paused => "paused",
    Completed => "completed",
});

str_enum!(ContentType {
    Html => "html",
    Text => "text",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub from_address: String,
    pub content_type: ContentType,
    pub dispatch_mode: DispatchMode,
    pub schedule_time: Option<DateTime<Utc>>,
    pub recurrence_interval: Option<RecurrenceInterval>,
    pub status: CampaignStatus,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == CampaignStatus::Scheduled
            && self.schedule_time.map(|at| at <= now).unwrap_or(false)
    }
}

/// A contact with a normalized (lowercase, trimmed) email identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i64,
    pub email: String,
    pub display_name: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
}

str_enum!(SendStatus {
    Sent => "sent",
    Failed => "failed",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub campaign_id: Uuid,
    pub recipient_id: i64,
    pub email: String,
    pub send_status: SendStatus,
    pub batch_seq: usize,
    pub sent_at: DateTime<Utc>,
}

/// Ephemeral grouping of at most [`MAX_BATCH_SIZE`] recipients, identified by
/// its sequence number within one dispatch run.
#[derive(Debug, Clone)]
pub struct Batch {
    pub seq: usize,
    pub recipients: Vec<Recipient>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipientOutcome {
    pub recipient_id: i64,
    pub email: String,
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub sent: usize,
    pub failed: usize,
    pub outcomes: Vec<RecipientOutcome>,
}

/// How a send request names its targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecipientSelector {
    ExplicitIds { ids: Vec<i64> },
    AllUnsent,
}

/// Final tally returned to every dispatch caller. Partial success is the
/// expected common case at scale, so a bare boolean would be useless.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped_duplicates: usize,
    pub skipped_already_sent: usize,
    pub skipped_invalid: usize,
    pub total_batches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub campaign_id: Uuid,
    pub total_recipients: usize,
    pub total_sent: usize,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub processing_batches: usize,
    pub progress_percentage: f64,
    pub batch_cap: usize,
}

/// Read-only dedup view served before any send is committed.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateStats {
    pub total_recipients: usize,
    pub unique_emails: usize,
    pub duplicate_count: usize,
    pub sent_emails: usize,
    pub fresh_unique_emails: usize,
    pub batch_cap: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    pub mode: DispatchMode,
    #[serde(default)]
    pub schedule_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub recurrence_interval: Option<RecurrenceInterval>,
    pub recipient_ids: Vec<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    UuidParse(#[from] uuid::Error),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("campaign {0} not found")]
    CampaignNotFound(Uuid),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    #[error("cannot {action} campaign in status {from}")]
    InvalidTransition { from: CampaignStatus, action: String },
    #[error("campaign {0} is already dispatching")]
    ConcurrentDispatch(Uuid),
}
