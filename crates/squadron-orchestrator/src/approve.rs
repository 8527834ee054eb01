use crate::queue_trigger::QueueTrigger;
use squadron_core::{
    Message, MessageKind, ReviewDecision, SquadronError, SquadronResult, Task, TaskStatus,
    Verdict, SYSTEM_AGENT_ID,
};
use squadron_store::StoreGateway;
use std::sync::Arc;
use tracing::{info, warn};

/// Revise round-trips allowed before a task is held for human review.
pub const MAX_REVISE_ATTEMPTS: i64 = 3;

/// Applies a verdict's decision to its task, exactly once per verdict.
///
/// Safe to call repeatedly: the executor checks whether the task already
/// reflects the verdict's target state before transitioning, so re-runs are
/// no-ops and side effects (messages, counters) never double-apply. It also
/// re-checks that the verdict still references the current completed result;
/// a stale verdict is never applied.
pub struct AutoApproveExecutor {
    store: Arc<StoreGateway>,
    queue: Arc<QueueTrigger>,
}

impl AutoApproveExecutor {
    /// Creates an executor over the given store and queue trigger.
    pub fn new(store: Arc<StoreGateway>, queue: Arc<QueueTrigger>) -> Self {
        Self { store, queue }
    }

    /// Loads the task's latest verdict and executes its decision. Returns the
    /// task's final status.
    pub fn process(&self, task_id: &str) -> SquadronResult<TaskStatus> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("task {task_id}")))?;
        let verdict = self
            .store
            .latest_verdict(task_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("no verdict for task {task_id}")))?;

        if let Some(settled) = self.already_applied(&task, &verdict) {
            info!(task_id, decision = %verdict.decision, "verdict already applied, no-op");
            return Ok(settled);
        }

        // The verdict judged one exact result snapshot; if a newer result
        // landed since, applying the old decision would be silently wrong.
        let current = self.store.latest_completed_result(task_id)?;
        if current.map(|r| r.id).as_deref() != Some(verdict.result_id.as_str()) {
            return Err(SquadronError::TransitionConflict(format!(
                "verdict {} does not reference task {task_id}'s current result",
                verdict.id
            )));
        }

        let final_status = match verdict.decision {
            ReviewDecision::Approve => self.apply_approve(&task, &verdict)?,
            ReviewDecision::Revise => self.apply_revise(&task, &verdict)?,
            ReviewDecision::Escalate => self.apply_escalate(&task, &verdict)?,
        };

        // A drained agent means the pipeline should produce more work.
        if let Some(assignee) = &task.assignee_id {
            if self.store.count_open_for(assignee)? == 0 {
                self.queue.trigger_if_needed()?;
            }
        }

        Ok(final_status)
    }

    /// Whether the task already reflects this verdict's target state.
    fn already_applied(&self, task: &Task, verdict: &Verdict) -> Option<TaskStatus> {
        match verdict.decision {
            ReviewDecision::Approve if task.status == TaskStatus::Done => Some(TaskStatus::Done),
            ReviewDecision::Escalate if task.status == TaskStatus::Review => {
                Some(TaskStatus::Review)
            }
            ReviewDecision::Revise if task.status == TaskStatus::Todo => Some(TaskStatus::Todo),
            ReviewDecision::Revise
                if task.status == TaskStatus::Review
                    && task.retry_count >= MAX_REVISE_ATTEMPTS =>
            {
                Some(TaskStatus::Review)
            }
            _ => None,
        }
    }

    fn apply_approve(&self, task: &Task, verdict: &Verdict) -> SquadronResult<TaskStatus> {
        self.store.set_task_status(&task.id, TaskStatus::Done)?;
        if let Some(assignee) = &task.assignee_id {
            self.store.increment_tasks_completed(assignee)?;
        }

        let passed: Vec<&str> = verdict
            .checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.name.as_str())
            .collect();
        self.post_system_message(
            format!(
                "Auto-approved: {}. Checks passed: {}.",
                task.title,
                passed.join(", ")
            ),
            MessageKind::System,
            None,
        )?;

        self.unlock_dependent_tasks(&task.id)?;
        self.queue.trigger_if_needed()?;
        info!(task_id = %task.id, "task auto-approved");
        Ok(TaskStatus::Done)
    }

    fn apply_revise(&self, task: &Task, verdict: &Verdict) -> SquadronResult<TaskStatus> {
        let attempts = task.retry_count + 1;
        if attempts >= MAX_REVISE_ATTEMPTS {
            self.store.set_task_status(&task.id, TaskStatus::Review)?;
            self.store.set_retry_count(&task.id, attempts)?;
            self.post_system_message(
                format!(
                    "Revision limit reached for {}: holding for human review. Reasons: {}.",
                    task.title,
                    verdict.reasons.join(", ")
                ),
                MessageKind::Alert,
                task.assignee_id.clone(),
            )?;
            warn!(task_id = %task.id, attempts, "revise limit reached, escalating");
            return Ok(TaskStatus::Review);
        }

        self.store.set_task_status(&task.id, TaskStatus::Todo)?;
        self.store.set_retry_count(&task.id, attempts)?;
        // Clear the judged output so the next attempt starts fresh.
        self.store.delete_completed_results(&task.id)?;
        self.post_system_message(
            format!(
                "Revision requested: {}. Reasons: {}. Attempt {}/{}.",
                task.title,
                verdict.reasons.join(", "),
                attempts + 1,
                MAX_REVISE_ATTEMPTS
            ),
            MessageKind::System,
            None,
        )?;
        self.queue.trigger_if_needed()?;
        info!(task_id = %task.id, attempts, "task returned for revision");
        Ok(TaskStatus::Todo)
    }

    fn apply_escalate(&self, task: &Task, verdict: &Verdict) -> SquadronResult<TaskStatus> {
        self.store.set_task_status(&task.id, TaskStatus::Review)?;
        self.post_system_message(
            format!(
                "Flagged for review: {}. Reasons: {}.",
                task.title,
                verdict.reasons.join(", ")
            ),
            MessageKind::Alert,
            task.assignee_id.clone(),
        )?;
        info!(task_id = %task.id, "task escalated to human review");
        Ok(TaskStatus::Review)
    }

    /// After a completion, moves backlog tasks whose dependencies are now all
    /// done (or in review) up to todo.
    fn unlock_dependent_tasks(&self, completed_task_id: &str) -> SquadronResult<()> {
        for candidate in self.store.backlog_with_dependencies()? {
            if !candidate
                .depends_on
                .iter()
                .any(|dep| dep == completed_task_id)
            {
                continue;
            }
            let mut all_done = true;
            for dep in &candidate.depends_on {
                match self.store.task_status(dep)? {
                    Some(TaskStatus::Done) | Some(TaskStatus::Review) => {}
                    _ => {
                        all_done = false;
                        break;
                    }
                }
            }
            if all_done {
                self.store.set_task_status(&candidate.id, TaskStatus::Todo)?;
                info!(task_id = %candidate.id, "dependent task unlocked");
            }
        }
        Ok(())
    }

    fn post_system_message(
        &self,
        content: String,
        kind: MessageKind,
        to_agent_id: Option<String>,
    ) -> SquadronResult<()> {
        self.store
            .insert_message(&Message::new(SYSTEM_AGENT_ID, to_agent_id, content, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue_trigger::QueueTriggerConfig;
    use crate::review::{AutoReviewEngine, ReviewConfig};
    use squadron_core::{Agent, TaskResult};
    use tokio::sync::mpsc;

    struct Fixture {
        store: Arc<StoreGateway>,
        executor: AutoApproveExecutor,
        engine: AutoReviewEngine,
        queue_rx: mpsc::Receiver<()>,
        agent: Agent,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let agent = Agent::new("Nova", "NOVA");
        store.insert_agent(&agent).unwrap();
        let (queue, queue_rx) =
            QueueTrigger::new(Arc::clone(&store), QueueTriggerConfig::default());
        Fixture {
            executor: AutoApproveExecutor::new(Arc::clone(&store), queue),
            engine: AutoReviewEngine::new(Arc::clone(&store), ReviewConfig::default()),
            store,
            queue_rx,
            agent,
        }
    }

    fn reviewed_task(fx: &Fixture, response: &str) -> Task {
        let task = Task::new("Summarize churn drivers")
            .with_status(TaskStatus::InProgress)
            .with_assignee(fx.agent.id.clone());
        fx.store.insert_task(&task).unwrap();
        fx.store
            .insert_result(&TaskResult::completed(&task.id, response).with_agent(&fx.agent.id))
            .unwrap();
        fx.engine.auto_review(&task.id).unwrap();
        task
    }

    const GOOD_RESPONSE: &str = "Churn concentrates in the first two weeks of trial. Users who \
        complete the onboarding playlist retain at twice the baseline rate.";

    #[test]
    fn approve_marks_done_and_increments_counter_once() {
        let mut fx = fixture();
        let task = reviewed_task(&fx, GOOD_RESPONSE);

        let status = fx.executor.process(&task.id).unwrap();
        assert_eq!(status, TaskStatus::Done);

        let reloaded = fx.store.get_task(&task.id).unwrap().unwrap();
        assert!(reloaded.completed_at.is_some());
        assert_eq!(
            fx.store.get_agent(&fx.agent.id).unwrap().unwrap().tasks_completed,
            1
        );
        // The drained queue floor fires a production cycle.
        assert!(fx.queue_rx.try_recv().is_ok());

        // Idempotent: a second run changes nothing and never double-counts.
        let status = fx.executor.process(&task.id).unwrap();
        assert_eq!(status, TaskStatus::Done);
        assert_eq!(
            fx.store.get_agent(&fx.agent.id).unwrap().unwrap().tasks_completed,
            1
        );
        let messages = fx.store.messages_from(SYSTEM_AGENT_ID).unwrap();
        assert_eq!(messages.len(), 1, "approval message posted exactly once");
    }

    #[test]
    fn revise_returns_to_todo_and_clears_results() {
        let fx = fixture();
        // Long enough for the floor but far under the 500-char blog minimum.
        let task = Task::new("Write a blog post on practice habits")
            .with_status(TaskStatus::InProgress)
            .with_assignee(fx.agent.id.clone());
        fx.store.insert_task(&task).unwrap();
        fx.store
            .insert_result(&TaskResult::completed(&task.id, GOOD_RESPONSE))
            .unwrap();
        fx.engine.auto_review(&task.id).unwrap();

        let status = fx.executor.process(&task.id).unwrap();
        assert_eq!(status, TaskStatus::Todo);

        let reloaded = fx.store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.retry_count, 1);
        assert!(fx.store.latest_completed_result(&task.id).unwrap().is_none());

        // Re-running is a no-op: the task is already back in todo.
        assert_eq!(fx.executor.process(&task.id).unwrap(), TaskStatus::Todo);
        assert_eq!(
            fx.store.get_task(&task.id).unwrap().unwrap().retry_count,
            1
        );
    }

    #[test]
    fn third_revise_holds_for_human_review() {
        let fx = fixture();
        let mut task = Task::new("Write a blog post on practice habits")
            .with_status(TaskStatus::InProgress)
            .with_assignee(fx.agent.id.clone());
        task.retry_count = MAX_REVISE_ATTEMPTS - 1;
        fx.store.insert_task(&task).unwrap();
        fx.store
            .insert_result(&TaskResult::completed(&task.id, GOOD_RESPONSE))
            .unwrap();
        fx.engine.auto_review(&task.id).unwrap();

        let status = fx.executor.process(&task.id).unwrap();
        assert_eq!(status, TaskStatus::Review);
        let reloaded = fx.store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.retry_count, MAX_REVISE_ATTEMPTS);

        // Settled: re-processing the same verdict stays put.
        assert_eq!(fx.executor.process(&task.id).unwrap(), TaskStatus::Review);
    }

    #[test]
    fn escalate_holds_for_review_with_an_alert() {
        let fx = fixture();
        let task = Task::new("Draft captions")
            .with_status(TaskStatus::InProgress)
            .with_tags(vec!["social".to_string()])
            .with_assignee(fx.agent.id.clone());
        fx.store.insert_task(&task).unwrap();
        fx.store
            .insert_result(&TaskResult::completed(&task.id, GOOD_RESPONSE))
            .unwrap();
        fx.engine.auto_review(&task.id).unwrap();

        let status = fx.executor.process(&task.id).unwrap();
        assert_eq!(status, TaskStatus::Review);

        let alerts: Vec<_> = fx
            .store
            .messages_from(SYSTEM_AGENT_ID)
            .unwrap()
            .into_iter()
            .filter(|m| m.kind == MessageKind::Alert)
            .collect();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].to_agent_id.as_deref(), Some(fx.agent.id.as_str()));
    }

    #[test]
    fn stale_verdict_is_a_transition_conflict() {
        let fx = fixture();
        let task = reviewed_task(&fx, GOOD_RESPONSE);

        // A newer result lands between review and approve execution.
        fx.store
            .insert_result(&TaskResult::completed(
                &task.id,
                "A fresh attempt the recorded verdict has never seen, well past the length floor.",
            ))
            .unwrap();

        let err = fx.executor.process(&task.id).unwrap_err();
        assert!(matches!(err, SquadronError::TransitionConflict(_)));
        // Nothing was applied.
        let reloaded = fx.store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::InProgress);
        assert_eq!(
            fx.store.get_agent(&fx.agent.id).unwrap().unwrap().tasks_completed,
            0
        );
    }

    #[test]
    fn approve_unlocks_dependent_backlog_tasks() {
        let fx = fixture();
        let task = reviewed_task(&fx, GOOD_RESPONSE);

        let blocked = Task::new("Follow-up analysis")
            .with_depends_on(vec![task.id.clone()]);
        fx.store.insert_task(&blocked).unwrap();
        let still_blocked = Task::new("Needs two tasks")
            .with_depends_on(vec![task.id.clone(), "t-unfinished".to_string()]);
        fx.store.insert_task(&still_blocked).unwrap();

        fx.executor.process(&task.id).unwrap();

        assert_eq!(
            fx.store.get_task(&blocked.id).unwrap().unwrap().status,
            TaskStatus::Todo
        );
        assert_eq!(
            fx.store.get_task(&still_blocked.id).unwrap().unwrap().status,
            TaskStatus::Backlog
        );
    }

    #[test]
    fn missing_verdict_is_not_found() {
        let fx = fixture();
        let task = Task::new("Never reviewed").with_status(TaskStatus::Review);
        fx.store.insert_task(&task).unwrap();
        assert!(matches!(
            fx.executor.process(&task.id).unwrap_err(),
            SquadronError::NotFound(_)
        ));
    }
}
