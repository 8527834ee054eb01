use crate::endpoint::{HeartbeatPing, LivenessEndpoint};
use crate::mailbox::NotificationMailbox;
use crate::schedule::{build_schedule_with, ScheduleEntry, DEFAULT_INTERVAL_MINUTES, DEFAULT_STAGGER_MINUTES};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use squadron_core::{AgentStatus, Message, MessageKind, SquadronError, SquadronResult, SYSTEM_AGENT_ID};
use squadron_store::StoreGateway;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum characters of the original message echoed in an acknowledgement.
const ACK_PREVIEW_CHARS: usize = 80;

/// Heartbeat cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Minutes between consecutive agents' probes within one cycle.
    #[serde(default = "default_stagger_minutes")]
    pub stagger_minutes: u64,
    /// Minutes between full cycles.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// Cron expression driving the daemon loop
    /// (7-field format: sec min hour dom month dow year).
    #[serde(default = "default_cycle_cron")]
    pub cycle_cron: String,
}

fn default_stagger_minutes() -> u64 {
    DEFAULT_STAGGER_MINUTES
}
fn default_interval_minutes() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}
fn default_cycle_cron() -> String {
    "0 0/15 * * * * *".to_string()
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            stagger_minutes: default_stagger_minutes(),
            interval_minutes: default_interval_minutes(),
            cycle_cron: default_cycle_cron(),
        }
    }
}

/// What one executed probe accomplished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    /// The probed agent.
    pub agent_id: String,
    /// Display name.
    pub agent_name: String,
    /// Liveness status delivered with the heartbeat.
    pub status: AgentStatus,
    /// Unread messages the endpoint returned.
    pub unread_count: usize,
    /// Directed messages acknowledged back to their senders.
    pub acknowledged: usize,
    /// Mailbox notifications relayed as delivery messages.
    pub notifications_delivered: usize,
}

/// Per-agent outcome of one heartbeat cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ProbeOutcome {
    /// The probe ran synchronously and finished.
    Completed(ProbeReport),
    /// The probe was deferred; it fires after its stagger offset elapses.
    Scheduled {
        /// The agent whose probe was deferred.
        agent_id: String,
        /// Display name.
        agent_name: String,
        /// Minutes until the probe fires.
        offset_minutes: u64,
    },
    /// The synchronous probe failed; siblings were unaffected.
    Failed {
        /// The agent whose probe failed.
        agent_id: String,
        /// Failure description.
        reason: String,
    },
}

/// Executes heartbeat cycles over the current roster.
///
/// The first schedule entry probes synchronously; every later entry is
/// spawned onto the runtime to fire after its stagger offset, each with its
/// own error boundary so one agent's failure never aborts a sibling probe or
/// the cycle. There is no intra-cycle retry — the next cycle is the retry
/// mechanism — and a deferred probe has no cancellation path once staggered.
#[derive(Clone)]
pub struct HeartbeatRunner {
    store: Arc<StoreGateway>,
    mailbox: Arc<NotificationMailbox>,
    endpoint: Arc<dyn LivenessEndpoint>,
    config: HeartbeatConfig,
}

impl HeartbeatRunner {
    /// Creates a runner over the given store, mailbox, and endpoint.
    pub fn new(
        store: Arc<StoreGateway>,
        mailbox: Arc<NotificationMailbox>,
        endpoint: Arc<dyn LivenessEndpoint>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            store,
            mailbox,
            endpoint,
            config,
        }
    }

    /// Runs one full cycle. Returns one outcome per roster agent:
    /// `Completed`/`Failed` for the synchronous first probe, `Scheduled`
    /// placeholders for the deferred rest.
    pub async fn run_cycle(&self) -> SquadronResult<Vec<ProbeOutcome>> {
        let schedule = build_schedule_with(
            &self.store,
            self.config.stagger_minutes,
            self.config.interval_minutes,
        )?;
        info!(agents = schedule.len(), "heartbeat cycle starting");

        let mut outcomes = Vec::with_capacity(schedule.len());
        let mut entries = schedule.into_iter();

        if let Some(first) = entries.next() {
            match self.probe_agent(&first).await {
                Ok(report) => outcomes.push(ProbeOutcome::Completed(report)),
                Err(e) => {
                    warn!(agent_id = %first.agent_id, error = %e, "heartbeat probe failed");
                    outcomes.push(ProbeOutcome::Failed {
                        agent_id: first.agent_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        for entry in entries {
            outcomes.push(ProbeOutcome::Scheduled {
                agent_id: entry.agent_id.clone(),
                agent_name: entry.agent_name.clone(),
                offset_minutes: entry.offset_minutes,
            });
            let runner = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(entry.offset_minutes * 60)).await;
                if let Err(e) = runner.probe_agent(&entry).await {
                    warn!(
                        agent_id = %entry.agent_id,
                        error = %e,
                        "staggered heartbeat probe failed"
                    );
                }
            });
        }

        Ok(outcomes)
    }

    /// Probes the Nth agent of the current schedule directly (manual
    /// trigger). Fails with `NotFound` when the index is out of range.
    pub async fn trigger_index(&self, index: usize) -> SquadronResult<ProbeReport> {
        let schedule = build_schedule_with(
            &self.store,
            self.config.stagger_minutes,
            self.config.interval_minutes,
        )?;
        let entry = schedule.get(index).ok_or_else(|| {
            SquadronError::NotFound(format!(
                "agent index {index} out of range (roster size {})",
                schedule.len()
            ))
        })?;
        self.probe_agent(entry).await
    }

    /// Executes one probe: computes liveness, delivers the heartbeat,
    /// acknowledges directed unread messages, and relays drained mailbox
    /// notifications.
    pub async fn probe_agent(&self, entry: &ScheduleEntry) -> SquadronResult<ProbeReport> {
        let in_progress = self.store.count_in_progress_for(&entry.agent_id)?;
        let status = if in_progress > 0 {
            AgentStatus::Active
        } else {
            AgentStatus::Idle
        };

        let pulse = self
            .endpoint
            .ping(&HeartbeatPing {
                agent_id: entry.agent_id.clone(),
                status,
            })
            .await?;

        let mut acknowledged = 0;
        for msg in &pulse.unread_messages {
            if msg.to_agent_id.as_deref() == Some(entry.agent_id.as_str()) {
                self.store.insert_message(&Message::new(
                    entry.agent_id.clone(),
                    Some(msg.from_agent_id.clone()),
                    format!("Acknowledged: \"{}\"", preview(&msg.content, ACK_PREVIEW_CHARS)),
                    MessageKind::System,
                ))?;
                acknowledged += 1;
            }
        }

        let drained = self.mailbox.drain(&entry.agent_id).await;
        let notifications_delivered = drained.len();
        for notification in drained {
            let from = notification
                .source_agent_id
                .unwrap_or_else(|| SYSTEM_AGENT_ID.to_string());
            self.store.insert_message(&Message::new(
                from,
                Some(entry.agent_id.clone()),
                notification.content,
                MessageKind::Notification,
            ))?;
        }

        info!(
            agent_id = %entry.agent_id,
            status = %status,
            unread = pulse.unread_messages.len(),
            delivered = notifications_delivered,
            "heartbeat probe complete"
        );

        Ok(ProbeReport {
            agent_id: entry.agent_id.clone(),
            agent_name: entry.agent_name.clone(),
            status,
            unread_count: pulse.unread_messages.len(),
            acknowledged,
            notifications_delivered,
        })
    }

    /// Computes the next fire time for the daemon's cron expression.
    pub fn next_fire_time(cron_expr: &str) -> SquadronResult<DateTime<Utc>> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| {
            SquadronError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })?;
        schedule.upcoming(Utc).next().ok_or_else(|| {
            SquadronError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Starts the daemon loop: sleep until the next cron fire time, run a
    /// cycle, repeat. The cron expression is validated before spawning.
    ///
    /// Returns the [`tokio::task::JoinHandle`] so the caller can abort or
    /// await it.
    pub fn start_daemon(self) -> SquadronResult<tokio::task::JoinHandle<()>> {
        Self::next_fire_time(&self.config.cycle_cron)?;
        Ok(tokio::spawn(async move {
            loop {
                let next = match Self::next_fire_time(&self.config.cycle_cron) {
                    Ok(next) => next,
                    Err(e) => {
                        warn!(error = %e, "heartbeat daemon: bad cron expression, sleeping 60s");
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        continue;
                    }
                };
                let now = Utc::now();
                if next > now {
                    let wait = (next - now).to_std().unwrap_or_default();
                    info!("heartbeat daemon: sleeping {:?} until next cycle", wait);
                    tokio::time::sleep(wait).await;
                }
                match self.run_cycle().await {
                    Ok(outcomes) => {
                        info!(outcomes = outcomes.len(), "heartbeat cycle dispatched");
                    }
                    Err(e) => warn!(error = %e, "heartbeat cycle failed"),
                }
            }
        }))
    }
}

/// Truncates `content` to `max` characters, appending an ellipsis when
/// anything was cut.
fn preview(content: &str, max: usize) -> String {
    if content.chars().count() > max {
        let head: String = content.chars().take(max).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::StoreLivenessEndpoint;
    use squadron_core::Agent;

    fn runner_with_agents(names: &[&str]) -> (HeartbeatRunner, Vec<Agent>) {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let mut agents = Vec::new();
        for (i, name) in names.iter().enumerate() {
            let mut agent = Agent::new(*name, name.to_uppercase());
            agent.created_at = Utc::now() + chrono::Duration::seconds(i as i64);
            store.insert_agent(&agent).unwrap();
            agents.push(agent);
        }
        let endpoint = Arc::new(StoreLivenessEndpoint::new(Arc::clone(&store)));
        let runner = HeartbeatRunner::new(
            store,
            Arc::new(NotificationMailbox::new()),
            endpoint,
            HeartbeatConfig::default(),
        );
        (runner, agents)
    }

    #[test]
    fn preview_truncates_past_eighty_chars() {
        let long = "x".repeat(100);
        let short = "short message";
        assert_eq!(preview(&long, 80).chars().count(), 83);
        assert!(preview(&long, 80).ends_with("..."));
        assert_eq!(preview(short, 80), short);
    }

    #[tokio::test]
    async fn trigger_index_out_of_range_is_not_found() {
        let (runner, _) = runner_with_agents(&["Alpha"]);
        let err = runner.trigger_index(5).await.unwrap_err();
        assert!(matches!(err, SquadronError::NotFound(_)));
    }

    #[tokio::test]
    async fn trigger_index_probes_the_nth_agent() {
        let (runner, agents) = runner_with_agents(&["Alpha", "Bravo"]);
        let report = runner.trigger_index(1).await.unwrap();
        assert_eq!(report.agent_id, agents[1].id);
        assert_eq!(report.status, AgentStatus::Idle);
    }

    #[tokio::test]
    async fn bad_cron_expression_is_rejected_upfront() {
        let (mut runner, _) = runner_with_agents(&[]);
        runner.config.cycle_cron = "not a cron".to_string();
        assert!(runner.start_daemon().is_err());
    }

    #[test]
    fn next_fire_time_is_in_the_future() {
        let next = HeartbeatRunner::next_fire_time("0 * * * * * *").unwrap();
        assert!(next > Utc::now());
    }
}
