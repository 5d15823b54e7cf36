//! Task data model.
//!
//! A task is one recurring piece of audit work. A maker performs it, checker1
//! reviews it, checker2 gives final approval. Status only moves through the
//! transition table in [`crate::engine::transition`].

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserId;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of audit work tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub frequency: Frequency,
    pub is_recurring: bool,
    pub due_date: NaiveDate,

    /// Whether the audit found anything. Must be set before the maker submits.
    pub observation_status: Option<ObservationStatus>,

    /// Maker.
    pub assigned_to: UserId,
    /// First reviewer.
    pub checker1: UserId,
    /// Final reviewer.
    pub checker2: UserId,

    pub status: Status,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stamped on every entry into `submitted`.
    pub submitted_at: Option<DateTime<Utc>>,

    /// Append-only.
    pub comments: Vec<Comment>,
    pub attachments: Vec<Attachment>,

    /// Optimistic concurrency token. Bumped by the repository on every save.
    pub version: i64,
}

impl Task {
    /// Ids of the three assignees, in workflow order.
    pub fn assignees(&self) -> [&UserId; 3] {
        [&self.assigned_to, &self.checker1, &self.checker2]
    }
}

/// Newtype for task ids. Opaque strings; new ids are UUIDv4.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Created, nobody has touched it yet.
    Pending,
    /// Maker is working on it.
    InProgress,
    /// Waiting for checker1.
    Submitted,
    /// Waiting for checker2.
    #[serde(rename = "checker1-approved")]
    Checker1Approved,
    /// Done. Terminal.
    Approved,
    /// Sent back to the maker. Re-entrant.
    Rejected,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Pending,
        Status::InProgress,
        Status::Submitted,
        Status::Checker1Approved,
        Status::Approved,
        Status::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Submitted => "submitted",
            Status::Checker1Approved => "checker1-approved",
            Status::Approved => "approved",
            Status::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Status::Approved
    }

    /// Statuses in which the maker still owns the task.
    pub fn is_editable(self) -> bool {
        matches!(self, Status::Pending | Status::InProgress | Status::Rejected)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Something an actor asks the engine to do to a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    Start,
    Submit,
    #[serde(rename = "checker1-approve")]
    Checker1Approve,
    #[serde(rename = "checker2-approve")]
    Checker2Approve,
    Reject,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Start,
        Action::Submit,
        Action::Checker1Approve,
        Action::Checker2Approve,
        Action::Reject,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Submit => "submit",
            Action::Checker1Approve => "checker1-approve",
            Action::Checker2Approve => "checker2-approve",
            Action::Reject => "reject",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown action: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            _ => Err(Error::Validation(format!("unknown priority: {s}"))),
        }
    }
}

/// How often a recurring task comes around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    Daily,
    Weekly,
    Fortnightly,
    #[default]
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
    OneTime,
}

impl Frequency {
    pub const ALL: [Frequency; 8] = [
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Fortnightly,
        Frequency::Monthly,
        Frequency::Quarterly,
        Frequency::HalfYearly,
        Frequency::Yearly,
        Frequency::OneTime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Fortnightly => "fortnightly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::HalfYearly => "half-yearly",
            Frequency::Yearly => "yearly",
            Frequency::OneTime => "one-time",
        }
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Frequency::ALL
            .into_iter()
            .find(|freq| freq.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown frequency: {s}")))
    }
}

/// Whether audit observations were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Yes,
    No,
    Mixed,
}

impl ObservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationStatus::Yes => "yes",
            ObservationStatus::No => "no",
            ObservationStatus::Mixed => "mixed",
        }
    }
}

impl std::fmt::Display for ObservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObservationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "yes" => Ok(ObservationStatus::Yes),
            "no" => Ok(ObservationStatus::No),
            "mixed" => Ok(ObservationStatus::Mixed),
            _ => Err(Error::Validation(format!("unknown observation status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Owned collections
// ---------------------------------------------------------------------------

/// A comment on a task, attributed to the user who wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub author_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Attachment metadata. The bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: i64,
    /// Location in the external blob store.
    pub storage_key: String,
    pub uploaded_by: UserId,
    pub uploaded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for new tasks. Admins create tasks through
/// [`crate::engine::TaskWorkflowEngine::create_task`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTask {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) description: String,
    #[serde(default)]
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) priority: Priority,
    #[serde(default)]
    pub(crate) frequency: Frequency,
    #[serde(default)]
    pub(crate) is_recurring: bool,
    pub(crate) due_date: NaiveDate,
    #[serde(alias = "maker")]
    pub(crate) assigned_to: UserId,
    pub(crate) checker1: UserId,
    pub(crate) checker2: UserId,
}

impl NewTask {
    pub fn new(
        name: impl Into<String>,
        due_date: NaiveDate,
        maker: impl Into<UserId>,
        checker1: impl Into<UserId>,
        checker2: impl Into<UserId>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: String::new(),
            priority: Priority::default(),
            frequency: Frequency::default(),
            is_recurring: false,
            due_date,
            assigned_to: maker.into(),
            checker1: checker1.into(),
            checker2: checker2.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }

    pub fn recurring(mut self, is_recurring: bool) -> Self {
        self.is_recurring = is_recurring;
        self
    }

    /// Check the invariants a task must hold from birth.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("task name must not be empty".to_string()));
        }
        let ids = [&self.assigned_to, &self.checker1, &self.checker2];
        if ids.iter().any(|id| id.as_str().trim().is_empty()) {
            return Err(Error::Validation(
                "maker, checker1 and checker2 must all be assigned".to_string(),
            ));
        }
        if ids[0] == ids[1] || ids[0] == ids[2] || ids[1] == ids[2] {
            return Err(Error::Validation(
                "maker, checker1 and checker2 must be different users".to_string(),
            ));
        }
        Ok(())
    }

    /// Materialize a `pending` task. Version starts at zero.
    pub(crate) fn into_task(self, now: DateTime<Utc>) -> Task {
        Task {
            id: TaskId::new(),
            name: self.name,
            description: self.description,
            category: self.category,
            priority: self.priority,
            frequency: self.frequency,
            is_recurring: self.is_recurring,
            due_date: self.due_date,
            observation_status: None,
            assigned_to: self.assigned_to,
            checker1: self.checker1,
            checker2: self.checker2,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            comments: Vec::new(),
            attachments: Vec::new(),
            version: 0,
        }
    }
}
