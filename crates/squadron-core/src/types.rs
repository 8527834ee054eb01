use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Liveness status of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// No heartbeat seen recently.
    Offline,
    /// Alive with no task in progress.
    Idle,
    /// Alive with at least one task in progress.
    Active,
    /// Currently executing a task.
    Busy,
}

impl AgentStatus {
    /// The canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Offline => "offline",
            AgentStatus::Idle => "idle",
            AgentStatus::Active => "active",
            AgentStatus::Busy => "busy",
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(AgentStatus::Offline),
            "idle" => Ok(AgentStatus::Idle),
            "active" => Ok(AgentStatus::Active),
            "busy" => Ok(AgentStatus::Busy),
            other => Err(format!("unknown agent status '{other}'")),
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An autonomous worker identity in the fleet.
///
/// Created by operator action; status is mutated only by heartbeat processing
/// and task assignment. Never hard-deleted by this subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique id (uuid v4 as text; `"system"` is reserved).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Capability key used by the auto-assigner.
    pub codename: String,
    /// Current liveness status.
    pub status: AgentStatus,
    /// Timestamp of the last accepted heartbeat.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Cumulative count of approved tasks.
    pub tasks_completed: i64,
    /// Cumulative tokens consumed.
    pub tokens_used: i64,
    /// Cumulative spend in USD.
    pub cost_usd: f64,
    /// Creation time; drives heartbeat stagger ordering.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a new offline agent with a fresh id.
    pub fn new(name: impl Into<String>, codename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            codename: codename.into(),
            status: AgentStatus::Offline,
            last_heartbeat: None,
            tasks_completed: 0,
            tokens_used: 0,
            cost_usd: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not yet queued (possibly blocked on dependencies).
    Backlog,
    /// Ready for an agent to pick up.
    Todo,
    /// Being worked on.
    InProgress,
    /// Held for human judgement.
    Review,
    /// Approved and finished.
    Done,
}

impl TaskStatus {
    /// The canonical snake_case string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Nice to have.
    Low,
    /// Default.
    Medium,
    /// Should be picked up soon.
    High,
    /// Drop everything.
    Critical,
}

impl TaskPriority {
    /// The canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TaskPriority::Low),
            "medium" => Ok(TaskPriority::Medium),
            "high" => Ok(TaskPriority::High),
            "critical" => Ok(TaskPriority::Critical),
            other => Err(format!("unknown task priority '{other}'")),
        }
    }
}

/// A unit of work with lifecycle state, an optional assignee, and a result
/// history.
///
/// Invariants: `completed_at` is set if and only if `status` is
/// [`TaskStatus::Done`]; a task has at most one assignee, and reassignment is
/// a full replace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique id (uuid v4 as text).
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Longer description; also scanned by the auto-assigner.
    pub description: String,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// The assigned agent, if any.
    pub assignee_id: Option<String>,
    /// Free-form tags; drive assignment and review policy.
    pub tags: Vec<String>,
    /// Ids of tasks that must be done/review before this one unlocks.
    pub depends_on: Vec<String>,
    /// Token budget estimated at creation time (0 = no estimate).
    pub estimated_tokens: i64,
    /// Tokens actually consumed so far.
    pub actual_tokens: i64,
    /// Number of automated revise round-trips so far.
    pub retry_count: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Completion time; set exactly when the task reaches `done`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new backlog task with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Backlog,
            priority: TaskPriority::Medium,
            assignee_id: None,
            tags: Vec::new(),
            depends_on: Vec::new(),
            estimated_tokens: 0,
            actual_tokens: 0,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the lifecycle status.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the tag list.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Sets the dependency list.
    pub fn with_depends_on(mut self, depends_on: Vec<String>) -> Self {
        self.depends_on = depends_on;
        self
    }

    /// Sets the assignee.
    pub fn with_assignee(mut self, agent_id: impl Into<String>) -> Self {
        self.assignee_id = Some(agent_id.into());
        self
    }

    /// Sets the estimated token budget.
    pub fn with_estimated_tokens(mut self, tokens: i64) -> Self {
        self.estimated_tokens = tokens;
        self
    }
}

/// Status of one completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// The attempt produced output.
    Completed,
    /// The attempt errored out.
    Failed,
}

impl ResultStatus {
    /// The canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Completed => "completed",
            ResultStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for ResultStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(ResultStatus::Completed),
            "failed" => Ok(ResultStatus::Failed),
            other => Err(format!("unknown result status '{other}'")),
        }
    }
}

/// One completion attempt's output and metrics, ordered by creation time.
///
/// The "current result" for a task is the most recently created row; `seq` is
/// the insertion-order tie-break when timestamps collide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Unique id (uuid v4 as text).
    pub id: String,
    /// The task this attempt belongs to.
    pub task_id: String,
    /// The agent that produced it, when known.
    pub agent_id: Option<String>,
    /// The attempt's output text.
    pub response: String,
    /// Tokens consumed by the attempt.
    pub tokens_used: i64,
    /// Spend in USD for the attempt.
    pub cost_usd: f64,
    /// Wall-clock duration of the attempt.
    pub duration_ms: i64,
    /// Whether the attempt completed or failed.
    pub status: ResultStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Monotonic insertion sequence assigned by the store.
    pub seq: i64,
}

impl TaskResult {
    /// Creates a new completed result with a fresh id. `seq` is assigned by
    /// the store on insert.
    pub fn completed(task_id: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            agent_id: None,
            response: response.into(),
            tokens_used: 0,
            cost_usd: 0.0,
            duration_ms: 0,
            status: ResultStatus::Completed,
            created_at: Utc::now(),
            seq: 0,
        }
    }

    /// Sets the producing agent.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the token/cost metrics.
    pub fn with_metrics(mut self, tokens_used: i64, cost_usd: f64, duration_ms: i64) -> Self {
        self.tokens_used = tokens_used;
        self.cost_usd = cost_usd;
        self.duration_ms = duration_ms;
        self
    }
}

/// Decision produced by the auto-review engine.
///
/// Ordered by strictness: `Escalate` > `Revise` > `Approve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    /// All checks passed; the task is done.
    Approve,
    /// Send the task back to the queue for another attempt.
    Revise,
    /// Hold the task for human judgement.
    Escalate,
}

impl ReviewDecision {
    /// The canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewDecision::Approve => "approve",
            ReviewDecision::Revise => "revise",
            ReviewDecision::Escalate => "escalate",
        }
    }

    /// Numeric strictness used to resolve ties toward the harsher outcome.
    pub fn strictness(&self) -> u8 {
        match self {
            ReviewDecision::Approve => 0,
            ReviewDecision::Revise => 1,
            ReviewDecision::Escalate => 2,
        }
    }
}

impl std::str::FromStr for ReviewDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(ReviewDecision::Approve),
            "revise" => Ok(ReviewDecision::Revise),
            "escalate" => Ok(ReviewDecision::Escalate),
            other => Err(format!("unknown review decision '{other}'")),
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single automated review check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCheck {
    /// Stable check identifier (kebab-case).
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable outcome detail.
    pub reason: String,
}

impl ReviewCheck {
    /// Creates a passing check outcome.
    pub fn pass(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            reason: reason.into(),
        }
    }

    /// Creates a failing check outcome.
    pub fn fail(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            reason: reason.into(),
        }
    }
}

/// The structured output of one automated review pass.
///
/// A verdict refers to exactly one [`TaskResult`] snapshot; re-running review
/// on a newer result appends a new verdict row, never updates a prior one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Unique id (uuid v4 as text).
    pub id: String,
    /// The reviewed task.
    pub task_id: String,
    /// The exact result snapshot this verdict judged.
    pub result_id: String,
    /// The aggregated decision.
    pub decision: ReviewDecision,
    /// Why the decision was made, one entry per failed (or summary) reason.
    pub reasons: Vec<String>,
    /// Every check's outcome, in battery order.
    pub checks: Vec<ReviewCheck>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Monotonic insertion sequence assigned by the store.
    pub seq: i64,
}

/// Kind of a persisted [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Ordinary agent-to-agent communication.
    Message,
    /// Operational notice from the system agent.
    System,
    /// Something needing human attention.
    Alert,
    /// A relayed mailbox notification.
    Notification,
    /// An @-mention.
    Mention,
}

impl MessageKind {
    /// The canonical lowercase string stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "message",
            MessageKind::System => "system",
            MessageKind::Alert => "alert",
            MessageKind::Notification => "notification",
            MessageKind::Mention => "mention",
        }
    }
}

impl std::str::FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(MessageKind::Message),
            "system" => Ok(MessageKind::System),
            "alert" => Ok(MessageKind::Alert),
            "notification" => Ok(MessageKind::Notification),
            "mention" => Ok(MessageKind::Mention),
            other => Err(format!("unknown message kind '{other}'")),
        }
    }
}

/// A persisted record of agent-to-agent or system communication.
///
/// The `read` flag flips monotonically false→true when the recipient's
/// heartbeat drains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique id (uuid v4 as text).
    pub id: String,
    /// Sending agent.
    pub from_agent_id: String,
    /// Receiving agent; `None` is a broadcast.
    pub to_agent_id: Option<String>,
    /// Message body.
    pub content: String,
    /// Message kind.
    pub kind: MessageKind,
    /// Whether the recipient has observed the message.
    pub read: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates a new unread message with a fresh id.
    pub fn new(
        from_agent_id: impl Into<String>,
        to_agent_id: Option<String>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from_agent_id: from_agent_id.into(),
            to_agent_id,
            content: content.into(),
            kind,
            read: false,
            created_at: Utc::now(),
        }
    }
}

/// A transient mailbox entry for one agent, consumed at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification body.
    pub content: String,
    /// Related task, if any.
    pub task_id: Option<String>,
    /// Originating agent, if any (system otherwise).
    pub source_agent_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a new notification.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            task_id: None,
            source_agent_id: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the related task.
    pub fn about_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Sets the originating agent.
    pub fn from_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.source_agent_id = Some(agent_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn task_status_round_trips() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Done,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::from_str("paused").is_err());
    }

    #[test]
    fn agent_status_round_trips() {
        for status in [
            AgentStatus::Offline,
            AgentStatus::Idle,
            AgentStatus::Active,
            AgentStatus::Busy,
        ] {
            assert_eq!(AgentStatus::from_str(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn decision_strictness_orders_escalate_highest() {
        assert!(ReviewDecision::Escalate.strictness() > ReviewDecision::Revise.strictness());
        assert!(ReviewDecision::Revise.strictness() > ReviewDecision::Approve.strictness());
    }

    #[test]
    fn new_task_starts_in_backlog_without_completion() {
        let task = Task::new("Draft the launch plan");
        assert_eq!(task.status, TaskStatus::Backlog);
        assert!(task.assignee_id.is_none());
        assert!(task.completed_at.is_none());
        assert_eq!(task.retry_count, 0);
    }

    #[test]
    fn task_serialization_uses_snake_case_status() {
        let task = Task::new("Ship it").with_status(TaskStatus::InProgress);
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"in_progress\""));
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.status, TaskStatus::InProgress);
    }

    #[test]
    fn message_starts_unread() {
        let msg = Message::new("a-1", Some("a-2".to_string()), "hello", MessageKind::Message);
        assert!(!msg.read);
        assert_eq!(msg.kind.as_str(), "message");
    }
}
