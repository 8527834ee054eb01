use crate::gateway::{parse_enum, parse_ts, StoreGateway};
use rusqlite::{params, Row};
use squadron_core::{SquadronResult, TaskResult};

const RESULT_COLUMNS: &str =
    "id, task_id, agent_id, response, tokens_used, cost_usd, duration_ms, status, created_at, seq";

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<TaskResult> {
    Ok(TaskResult {
        id: row.get(0)?,
        task_id: row.get(1)?,
        agent_id: row.get(2)?,
        response: row.get(3)?,
        tokens_used: row.get(4)?,
        cost_usd: row.get(5)?,
        duration_ms: row.get(6)?,
        status: parse_enum(7, row.get::<_, String>(7)?)?,
        created_at: parse_ts(8, row.get::<_, String>(8)?)?,
        seq: row.get(9)?,
    })
}

impl StoreGateway {
    /// Appends a completion attempt; returns the store-assigned sequence
    /// number used as the insertion-order tie-break.
    pub fn insert_result(&self, result: &TaskResult) -> SquadronResult<i64> {
        self.execute(
            "INSERT INTO task_results (id, task_id, agent_id, response, tokens_used, cost_usd, \
             duration_ms, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                result.id,
                result.task_id,
                result.agent_id,
                result.response,
                result.tokens_used,
                result.cost_usd,
                result.duration_ms,
                result.status.as_str(),
                result.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.last_insert_rowid())
    }

    /// The current result for a task: the most recently created `completed`
    /// row, with `seq` breaking timestamp ties.
    pub fn latest_completed_result(&self, task_id: &str) -> SquadronResult<Option<TaskResult>> {
        self.query_one(
            &format!(
                "SELECT {RESULT_COLUMNS} FROM task_results \
                 WHERE task_id = ?1 AND status = 'completed' \
                 ORDER BY created_at DESC, seq DESC LIMIT 1"
            ),
            params![task_id],
            result_from_row,
        )
    }

    /// Deletes the task's completed results so a revised attempt starts
    /// fresh. Failed attempts are kept for the audit trail.
    pub fn delete_completed_results(&self, task_id: &str) -> SquadronResult<usize> {
        self.execute(
            "DELETE FROM task_results WHERE task_id = ?1 AND status = 'completed'",
            params![task_id],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use squadron_core::{ResultStatus, Task, TaskStatus};

    fn store_with_task() -> (StoreGateway, Task) {
        let store = StoreGateway::in_memory().unwrap();
        let task = Task::new("Produce output").with_status(TaskStatus::Review);
        store.insert_task(&task).unwrap();
        (store, task)
    }

    #[test]
    fn latest_completed_uses_seq_to_break_timestamp_ties() {
        let (store, task) = store_with_task();
        let shared_ts = Utc::now();

        let mut older = TaskResult::completed(&task.id, "first attempt");
        older.created_at = shared_ts;
        let mut newer = TaskResult::completed(&task.id, "second attempt");
        newer.created_at = shared_ts;

        store.insert_result(&older).unwrap();
        store.insert_result(&newer).unwrap();

        let latest = store.latest_completed_result(&task.id).unwrap().unwrap();
        assert_eq!(latest.response, "second attempt");
    }

    #[test]
    fn failed_attempts_are_not_the_current_result() {
        let (store, task) = store_with_task();

        let completed = TaskResult::completed(&task.id, "good output");
        store.insert_result(&completed).unwrap();

        let mut failed = TaskResult::completed(&task.id, "connection reset");
        failed.status = ResultStatus::Failed;
        store.insert_result(&failed).unwrap();

        let latest = store.latest_completed_result(&task.id).unwrap().unwrap();
        assert_eq!(latest.id, completed.id);
    }

    #[test]
    fn delete_completed_keeps_failed_rows() {
        let (store, task) = store_with_task();
        store
            .insert_result(&TaskResult::completed(&task.id, "output"))
            .unwrap();
        let mut failed = TaskResult::completed(&task.id, "boom");
        failed.status = ResultStatus::Failed;
        store.insert_result(&failed).unwrap();

        assert_eq!(store.delete_completed_results(&task.id).unwrap(), 1);
        assert!(store.latest_completed_result(&task.id).unwrap().is_none());
        let remaining = store
            .query(
                "SELECT COUNT(*) FROM task_results WHERE task_id = ?1",
                params![task.id],
                |row| row.get::<_, i64>(0),
            )
            .unwrap();
        assert_eq!(remaining, vec![1]);
    }
}
