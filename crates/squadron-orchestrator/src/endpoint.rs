use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use squadron_core::{AgentStatus, MessageKind, SquadronError, SquadronResult, TaskPriority, TaskStatus};
use squadron_store::StoreGateway;
use std::sync::Arc;
use std::time::Duration;

/// Liveness probe payload sent for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPing {
    /// The probed agent.
    pub agent_id: String,
    /// Computed liveness status (`active` when the agent has work in
    /// progress, `idle` otherwise).
    pub status: AgentStatus,
}

/// A short view of an open task, echoed back so the agent sees its plate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBrief {
    /// Task id.
    pub id: String,
    /// Task title.
    pub title: String,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Scheduling priority.
    pub priority: TaskPriority,
}

/// One unread message returned by the liveness endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadMessage {
    /// Message id.
    pub id: String,
    /// Sending agent.
    pub from_agent_id: String,
    /// Receiving agent; `None` for broadcasts.
    pub to_agent_id: Option<String>,
    /// Message body.
    pub content: String,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Response to a liveness probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatPulse {
    /// Whether the endpoint accepted the heartbeat.
    pub received: bool,
    /// Endpoint-side timestamp of the probe.
    pub timestamp: DateTime<Utc>,
    /// Open tasks assigned to the agent, most urgent first.
    pub pending_tasks: Vec<TaskBrief>,
    /// Unread messages addressed to the agent (directed or broadcast),
    /// marked read by the endpoint as a side effect of this call.
    pub unread_messages: Vec<UnreadMessage>,
}

/// The external liveness endpoint every probe talks to.
///
/// Implementations must bound their own latency; a timeout surfaces as
/// [`SquadronError::ProbeFailure`] and is isolated to the probed agent.
#[async_trait]
pub trait LivenessEndpoint: Send + Sync {
    /// Delivers one heartbeat and returns the agent's unread backlog.
    async fn ping(&self, ping: &HeartbeatPing) -> SquadronResult<HeartbeatPulse>;
}

/// In-process endpoint backed directly by the store.
///
/// Accepting a heartbeat records the heartbeat row, updates the agent's
/// status and last-heartbeat timestamp, and drains (marks read) the agent's
/// unread messages.
pub struct StoreLivenessEndpoint {
    store: Arc<StoreGateway>,
    unread_limit: i64,
}

impl StoreLivenessEndpoint {
    /// Creates a store-backed endpoint with the default unread cap of 10.
    pub fn new(store: Arc<StoreGateway>) -> Self {
        Self {
            store,
            unread_limit: 10,
        }
    }
}

#[async_trait]
impl LivenessEndpoint for StoreLivenessEndpoint {
    async fn ping(&self, ping: &HeartbeatPing) -> SquadronResult<HeartbeatPulse> {
        let agent = self
            .store
            .get_agent(&ping.agent_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("agent {}", ping.agent_id)))?;

        let now = Utc::now();
        self.store.record_heartbeat(&agent.id, ping.status, now)?;

        let pending_tasks = self
            .store
            .pending_tasks_for(&agent.id)?
            .into_iter()
            .map(|t| TaskBrief {
                id: t.id,
                title: t.title,
                status: t.status,
                priority: t.priority,
            })
            .collect();

        let unread_messages = self
            .store
            .unread_messages_for(&agent.id, self.unread_limit)?
            .into_iter()
            .map(|m| UnreadMessage {
                id: m.id,
                from_agent_id: m.from_agent_id,
                to_agent_id: m.to_agent_id,
                content: m.content,
                kind: m.kind,
                created_at: m.created_at,
            })
            .collect();
        self.store.mark_messages_read(&agent.id)?;

        Ok(HeartbeatPulse {
            received: true,
            timestamp: now,
            pending_tasks,
            unread_messages,
        })
    }
}

/// Endpoint reached over HTTP, for fleets whose liveness service runs out of
/// process.
pub struct HttpLivenessEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpLivenessEndpoint {
    /// Creates an HTTP endpoint with the given request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> SquadronResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SquadronError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LivenessEndpoint for HttpLivenessEndpoint {
    async fn ping(&self, ping: &HeartbeatPing) -> SquadronResult<HeartbeatPulse> {
        let response = self
            .client
            .post(&self.url)
            .json(ping)
            .send()
            .await
            .map_err(|e| {
                SquadronError::ProbeFailure(format!("agent {}: {e}", ping.agent_id))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SquadronError::Upstream {
                status: status.as_u16(),
                message: format!("liveness endpoint rejected heartbeat for {}", ping.agent_id),
            });
        }

        response
            .json::<HeartbeatPulse>()
            .await
            .map_err(|e| SquadronError::ProbeFailure(format!("agent {}: {e}", ping.agent_id)))
    }
}
