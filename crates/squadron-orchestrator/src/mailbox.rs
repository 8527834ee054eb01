use regex::Regex;
use squadron_core::{Notification, SquadronResult, SYSTEM_AGENT_ID};
use squadron_store::StoreGateway;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide per-agent queue of pending notifications.
///
/// Each agent's queue is drained exactly once per heartbeat cycle: a drain
/// returns the pending entries and clears them, so a notification is relayed
/// in exactly one cycle, never duplicated across the synchronous and
/// staggered passes.
pub struct NotificationMailbox {
    queues: Arc<RwLock<HashMap<String, Vec<Notification>>>>,
}

impl NotificationMailbox {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Enqueues a notification for the destination agent.
    pub async fn push(&self, agent_id: &str, notification: Notification) {
        let mut queues = self.queues.write().await;
        queues
            .entry(agent_id.to_string())
            .or_default()
            .push(notification);
    }

    /// Convenience: enqueue a plain content notification from an agent about
    /// a task.
    pub async fn notify_agent(
        &self,
        agent_id: &str,
        content: impl Into<String>,
        task_id: Option<String>,
        source_agent_id: Option<String>,
    ) {
        let mut notification = Notification::new(content);
        notification.task_id = task_id;
        notification.source_agent_id = source_agent_id;
        self.push(agent_id, notification).await;
    }

    /// Removes and returns every pending notification for the agent.
    pub async fn drain(&self, agent_id: &str) -> Vec<Notification> {
        let mut queues = self.queues.write().await;
        queues.remove(agent_id).unwrap_or_default()
    }

    /// Number of pending notifications for the agent.
    pub async fn pending_count(&self, agent_id: &str) -> usize {
        let queues = self.queues.read().await;
        queues.get(agent_id).map_or(0, Vec::len)
    }

    /// Scans `text` for `@Name` / `@CODENAME` mentions and enqueues the text
    /// for each mentioned agent. `@all` fans out to every agent except the
    /// source and the system agent.
    pub async fn process_mentions(
        &self,
        store: &StoreGateway,
        text: &str,
        task_id: Option<&str>,
        source_agent_id: &str,
    ) -> SquadronResult<usize> {
        let pattern = Regex::new(r"@(\w+)").map_err(|e| {
            squadron_core::SquadronError::Config(format!("mention pattern: {e}"))
        })?;
        let mentions: Vec<String> = pattern
            .captures_iter(text)
            .map(|c| c[1].to_string())
            .collect();
        if mentions.is_empty() {
            return Ok(0);
        }

        let roster = store.roster()?;
        let mut delivered = 0;
        if mentions.iter().any(|m| m.eq_ignore_ascii_case("all")) {
            for agent in &roster {
                if agent.id != source_agent_id {
                    self.notify_agent(
                        &agent.id,
                        text,
                        task_id.map(str::to_string),
                        Some(source_agent_id.to_string()),
                    )
                    .await;
                    delivered += 1;
                }
            }
            return Ok(delivered);
        }

        for mention in mentions {
            let matched = roster.iter().find(|a| {
                a.codename.eq_ignore_ascii_case(&mention) || a.name.eq_ignore_ascii_case(&mention)
            });
            if let Some(agent) = matched {
                if agent.id != source_agent_id && agent.id != SYSTEM_AGENT_ID {
                    self.notify_agent(
                        &agent.id,
                        text,
                        task_id.map(str::to_string),
                        Some(source_agent_id.to_string()),
                    )
                    .await;
                    delivered += 1;
                }
            }
        }
        Ok(delivered)
    }
}

impl Default for NotificationMailbox {
    fn default() -> Self {
        Self::new()
    }
}
