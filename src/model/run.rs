//! Run bookkeeping types

use super::kinds::{ChangeStatus, RecordKind, RunStatus, Source};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Create a new random RunId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One harvest attempt for a (source, kind, change-status) triple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub source: Source,
    pub kind: RecordKind,
    pub change_status: ChangeStatus,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    /// Set exactly once, when the run leaves `Started`
    pub end_time: Option<DateTime<Utc>>,
    pub error_count: usize,
}

impl Run {
    /// A freshly started run
    pub fn start(source: Source, kind: RecordKind, change_status: ChangeStatus) -> Self {
        Self {
            id: RunId::new(),
            source,
            kind,
            change_status,
            status: RunStatus::Started,
            start_time: Utc::now(),
            end_time: None,
            error_count: 0,
        }
    }

    /// Wall-clock duration, once the run is closed
    pub fn elapsed(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

/// A failure recorded against a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub run_id: RunId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl RunError {
    pub fn new(run_id: RunId, message: impl Into<String>) -> Self {
        Self {
            run_id,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}
