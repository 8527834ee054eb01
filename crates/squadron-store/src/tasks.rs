use crate::gateway::{parse_enum, parse_ts, StoreGateway};
use chrono::Utc;
use rusqlite::{params, Row};
use squadron_core::{SquadronResult, Task, TaskStatus};

const TASK_COLUMNS: &str = "id, title, description, status, priority, assignee_id, tags, \
                            depends_on, estimated_tokens, actual_tokens, retry_count, \
                            created_at, updated_at, completed_at";

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    let tags_json: String = row.get(6)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let depends_on: String = row.get(7)?;
    let depends_on = depends_on
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_enum(3, row.get::<_, String>(3)?)?,
        priority: parse_enum(4, row.get::<_, String>(4)?)?,
        assignee_id: row.get(5)?,
        tags,
        depends_on,
        estimated_tokens: row.get(8)?,
        actual_tokens: row.get(9)?,
        retry_count: row.get(10)?,
        created_at: parse_ts(11, row.get::<_, String>(11)?)?,
        updated_at: parse_ts(12, row.get::<_, String>(12)?)?,
        completed_at: row
            .get::<_, Option<String>>(13)?
            .map(|ts| parse_ts(13, ts))
            .transpose()?,
    })
}

impl StoreGateway {
    /// Inserts a new task row. Tags are stored as a JSON array, dependencies
    /// as a comma-separated id list.
    pub fn insert_task(&self, task: &Task) -> SquadronResult<()> {
        let tags = serde_json::to_string(&task.tags)?;
        self.execute(
            "INSERT INTO tasks (id, title, description, status, priority, assignee_id, tags, \
             depends_on, estimated_tokens, actual_tokens, retry_count, created_at, updated_at, \
             completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority.as_str(),
                task.assignee_id,
                tags,
                task.depends_on.join(","),
                task.estimated_tokens,
                task.actual_tokens,
                task.retry_count,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.completed_at.map(|ts| ts.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Fetches a task by id.
    pub fn get_task(&self, id: &str) -> SquadronResult<Option<Task>> {
        self.query_one(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
            params![id],
            task_from_row,
        )
    }

    /// Replaces the task's assignee and bumps its modification time.
    pub fn set_assignee(&self, task_id: &str, agent_id: &str) -> SquadronResult<usize> {
        self.execute(
            "UPDATE tasks SET assignee_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![agent_id, Utc::now().to_rfc3339(), task_id],
        )
    }

    /// Moves a task to a new lifecycle status, maintaining the
    /// `completed_at` iff `done` invariant.
    pub fn set_task_status(&self, task_id: &str, status: TaskStatus) -> SquadronResult<usize> {
        let now = Utc::now().to_rfc3339();
        let completed_at = (status == TaskStatus::Done).then(|| now.clone());
        self.execute(
            "UPDATE tasks SET status = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![status.as_str(), completed_at, now, task_id],
        )
    }

    /// Overwrites the task's revise round-trip counter.
    pub fn set_retry_count(&self, task_id: &str, retry_count: i64) -> SquadronResult<usize> {
        self.execute(
            "UPDATE tasks SET retry_count = ?1, updated_at = ?2 WHERE id = ?3",
            params![retry_count, Utc::now().to_rfc3339(), task_id],
        )
    }

    /// Number of `in_progress` tasks assigned to the agent. Drives the
    /// active/idle liveness computation.
    pub fn count_in_progress_for(&self, agent_id: &str) -> SquadronResult<i64> {
        Ok(self
            .query_one(
                "SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1 AND status = 'in_progress'",
                params![agent_id],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }

    /// Number of open (`todo` + `in_progress`) tasks assigned to the agent.
    pub fn count_open_for(&self, agent_id: &str) -> SquadronResult<i64> {
        Ok(self
            .query_one(
                "SELECT COUNT(*) FROM tasks WHERE assignee_id = ?1 \
                 AND status IN ('todo', 'in_progress')",
                params![agent_id],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }

    /// Total outstanding (`todo` + `in_progress`) tasks across the fleet.
    pub fn count_outstanding(&self) -> SquadronResult<i64> {
        Ok(self
            .query_one(
                "SELECT COUNT(*) FROM tasks WHERE status IN ('todo', 'in_progress')",
                [],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }

    /// Open tasks assigned to the agent, most urgent first. Returned by the
    /// liveness endpoint so an agent sees its plate on every heartbeat.
    pub fn pending_tasks_for(&self, agent_id: &str) -> SquadronResult<Vec<Task>> {
        self.query(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks WHERE assignee_id = ?1 \
                 AND status IN ('todo', 'in_progress') \
                 ORDER BY CASE priority \
                   WHEN 'critical' THEN 0 WHEN 'high' THEN 1 \
                   WHEN 'medium' THEN 2 ELSE 3 END, created_at ASC"
            ),
            params![agent_id],
            task_from_row,
        )
    }

    /// Backlog tasks that declare at least one dependency. Scanned after a
    /// completion to unlock newly unblocked work.
    pub fn backlog_with_dependencies(&self) -> SquadronResult<Vec<Task>> {
        self.query(
            &format!(
                "SELECT {TASK_COLUMNS} FROM tasks \
                 WHERE status = 'backlog' AND depends_on != ''"
            ),
            [],
            task_from_row,
        )
    }

    /// The status of a single task, if it exists.
    pub fn task_status(&self, task_id: &str) -> SquadronResult<Option<TaskStatus>> {
        self.query_one(
            "SELECT status FROM tasks WHERE id = ?1",
            params![task_id],
            |row| parse_enum(0, row.get::<_, String>(0)?),
        )
    }
}
