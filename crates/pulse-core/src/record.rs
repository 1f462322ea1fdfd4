//! Record types stored in the append-only console log.
//!
//! A record is either a log message or a network task. Records are immutable once
//! created; a task that completes is replaced by a new snapshot under the same id.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable record identifier assigned by the store, monotonically increasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discriminant of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Log,
    Task,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Task => "task",
        }
    }
}

/// Log severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub const ALL: [LogLevel; 7] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warning,
        Self::Error,
        Self::Critical,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|level| level.as_str() == value)
    }

    /// Numeric rank used for sorting and numeric comparisons.
    pub fn rank(self) -> i64 {
        self as i64
    }

    pub fn is_error(self) -> bool {
        self >= Self::Error
    }
}

/// Lifecycle of a network task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Success,
    Failure,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub label: String,
    pub message: String,
    /// Network task this message was written for, if any.
    pub task_id: Option<RecordId>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, label: &str, message: &str) -> Self {
        Self {
            level,
            label: label.to_owned(),
            message: message.to_owned(),
            task_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_task(mut self, task_id: RecordId) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTask {
    pub url: String,
    pub host: String,
    pub method: String,
    pub status_code: Option<u16>,
    pub state: TaskState,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub request_bytes: u64,
    pub response_bytes: u64,
}

impl NetworkTask {
    /// A pending task; the host is derived from the url.
    pub fn pending(method: &str, url: &str) -> Self {
        Self {
            url: url.to_owned(),
            host: host_of(url).to_owned(),
            method: method.trim().to_ascii_uppercase(),
            status_code: None,
            state: TaskState::Pending,
            duration_ms: None,
            error: None,
            request_bytes: 0,
            response_bytes: 0,
        }
    }

    /// Failed tasks are either transport failures or HTTP 4xx/5xx responses.
    pub fn is_failure(&self) -> bool {
        self.state == TaskState::Failure || self.status_code.is_some_and(|code| code >= 400)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordBody {
    Log(LogEntry),
    Task(NetworkTask),
}

/// Record before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub created_at: DateTime<Utc>,
    pub session: Uuid,
    pub body: RecordBody,
}

impl NewRecord {
    pub fn log(session: Uuid, entry: LogEntry) -> Self {
        Self {
            created_at: Utc::now(),
            session,
            body: RecordBody::Log(entry),
        }
    }

    pub fn task(session: Uuid, task: NetworkTask) -> Self {
        Self {
            created_at: Utc::now(),
            session,
            body: RecordBody::Task(task),
        }
    }

    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub session: Uuid,
    pub body: RecordBody,
}

impl Record {
    pub fn from_new(id: RecordId, new: NewRecord) -> Self {
        Self {
            id,
            created_at: new.created_at,
            session: new.session,
            body: new.body,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self.body {
            RecordBody::Log(_) => RecordKind::Log,
            RecordBody::Task(_) => RecordKind::Task,
        }
    }

    pub fn as_log(&self) -> Option<&LogEntry> {
        match &self.body {
            RecordBody::Log(entry) => Some(entry),
            RecordBody::Task(_) => None,
        }
    }

    pub fn as_task(&self) -> Option<&NetworkTask> {
        match &self.body {
            RecordBody::Task(task) => Some(task),
            RecordBody::Log(_) => None,
        }
    }

    /// Lowercased text searched by the free-form filter term.
    pub fn search_text(&self) -> String {
        match &self.body {
            RecordBody::Log(entry) => {
                format!("{}\n{}", entry.message, entry.label).to_lowercase()
            }
            RecordBody::Task(task) => format!(
                "{} {}\n{}\n{}",
                task.method,
                task.url,
                task.host,
                task.error.as_deref().unwrap_or_default()
            )
            .to_lowercase(),
        }
    }
}

/// Host portion of a url, or the empty string when it has none.
pub fn host_of(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    match authority.rfind(':') {
        Some(idx) if !authority.ends_with(']') => &authority[..idx],
        _ => authority,
    }
}

#[cfg(test)]
mod tests {
    use super::{host_of, LogLevel, NetworkTask, TaskState};

    #[test]
    fn host_is_extracted_from_url() {
        assert_eq!(host_of("https://api.example.com/v1/users?q=1"), "api.example.com");
        assert_eq!(host_of("http://user@localhost:8080/health"), "localhost");
        assert_eq!(host_of("example.org"), "example.org");
        assert_eq!(host_of(""), "");
    }

    #[test]
    fn levels_order_by_severity() {
        assert!(LogLevel::Critical > LogLevel::Error);
        assert!(LogLevel::Error.is_error());
        assert!(!LogLevel::Warning.is_error());
        assert_eq!(LogLevel::parse(" Warning "), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn http_error_status_counts_as_failure() {
        let mut task = NetworkTask::pending("get", "https://example.com/a");
        assert_eq!(task.method, "GET");
        assert!(!task.is_failure());
        task.state = TaskState::Success;
        task.status_code = Some(503);
        assert!(task.is_failure());
    }
}
