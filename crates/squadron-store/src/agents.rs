use crate::gateway::{parse_enum, parse_ts, StoreGateway};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use squadron_core::{Agent, AgentStatus, SquadronResult, SYSTEM_AGENT_ID};

const AGENT_COLUMNS: &str = "id, name, codename, status, last_heartbeat, tasks_completed, \
                             tokens_used, cost_usd, created_at, updated_at";

fn agent_from_row(row: &Row<'_>) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        codename: row.get(2)?,
        status: parse_enum(3, row.get::<_, String>(3)?)?,
        last_heartbeat: row
            .get::<_, Option<String>>(4)?
            .map(|ts| parse_ts(4, ts))
            .transpose()?,
        tasks_completed: row.get(5)?,
        tokens_used: row.get(6)?,
        cost_usd: row.get(7)?,
        created_at: parse_ts(8, row.get::<_, String>(8)?)?,
        updated_at: parse_ts(9, row.get::<_, String>(9)?)?,
    })
}

impl StoreGateway {
    /// Inserts a new agent row.
    pub fn insert_agent(&self, agent: &Agent) -> SquadronResult<()> {
        self.execute(
            "INSERT INTO agents (id, name, codename, status, last_heartbeat, tasks_completed, \
             tokens_used, cost_usd, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                agent.id,
                agent.name,
                agent.codename,
                agent.status.as_str(),
                agent.last_heartbeat.map(|ts| ts.to_rfc3339()),
                agent.tasks_completed,
                agent.tokens_used,
                agent.cost_usd,
                agent.created_at.to_rfc3339(),
                agent.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetches an agent by id.
    pub fn get_agent(&self, id: &str) -> SquadronResult<Option<Agent>> {
        self.query_one(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?1"),
            params![id],
            agent_from_row,
        )
    }

    /// Fetches the first agent with the given codename, if any.
    pub fn get_agent_by_codename(&self, codename: &str) -> SquadronResult<Option<Agent>> {
        self.query_one(
            &format!("SELECT {AGENT_COLUMNS} FROM agents WHERE codename = ?1 LIMIT 1"),
            params![codename],
            agent_from_row,
        )
    }

    /// The heartbeat roster: every non-system agent, ordered by creation time
    /// ascending. This ordering drives the stagger offsets.
    pub fn roster(&self) -> SquadronResult<Vec<Agent>> {
        self.query(
            &format!(
                "SELECT {AGENT_COLUMNS} FROM agents WHERE id != ?1 ORDER BY created_at ASC, id ASC"
            ),
            params![SYSTEM_AGENT_ID],
            agent_from_row,
        )
    }

    /// Records an accepted heartbeat: appends the heartbeat row and updates
    /// the agent's status and last-heartbeat timestamp.
    pub fn record_heartbeat(
        &self,
        agent_id: &str,
        status: AgentStatus,
        at: DateTime<Utc>,
    ) -> SquadronResult<()> {
        let ts = at.to_rfc3339();
        self.execute(
            "INSERT INTO heartbeats (agent_id, status, timestamp) VALUES (?1, ?2, ?3)",
            params![agent_id, status.as_str(), ts],
        )?;
        self.execute(
            "UPDATE agents SET last_heartbeat = ?1, status = ?2, updated_at = ?1 WHERE id = ?3",
            params![ts, status.as_str(), agent_id],
        )?;
        Ok(())
    }

    /// Increments the agent's approved-task counter.
    pub fn increment_tasks_completed(&self, agent_id: &str) -> SquadronResult<usize> {
        self.execute(
            "UPDATE agents SET tasks_completed = tasks_completed + 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), agent_id],
        )
    }

    /// Number of heartbeat rows recorded for the agent.
    pub fn heartbeat_count(&self, agent_id: &str) -> SquadronResult<i64> {
        Ok(self
            .query_one(
                "SELECT COUNT(*) FROM heartbeats WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )?
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn roster_excludes_system_and_orders_by_creation() {
        let store = StoreGateway::in_memory().unwrap();
        let t0 = Utc::now();

        let mut system = Agent::new("System", "SYSTEM");
        system.id = SYSTEM_AGENT_ID.to_string();
        store.insert_agent(&system).unwrap();

        let mut second = Agent::new("Second", "SECOND");
        second.created_at = t0 + Duration::minutes(5);
        let mut first = Agent::new("First", "FIRST");
        first.created_at = t0;
        store.insert_agent(&second).unwrap();
        store.insert_agent(&first).unwrap();

        let roster = store.roster().unwrap();
        let names: Vec<&str> = roster.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn record_heartbeat_updates_agent_and_appends_row() {
        let store = StoreGateway::in_memory().unwrap();
        let agent = Agent::new("Nova", "NOVA");
        store.insert_agent(&agent).unwrap();

        let at = Utc::now();
        store
            .record_heartbeat(&agent.id, AgentStatus::Active, at)
            .unwrap();

        let reloaded = store.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(reloaded.status, AgentStatus::Active);
        assert!(reloaded.last_heartbeat.is_some());
        assert_eq!(store.heartbeat_count(&agent.id).unwrap(), 1);
    }

    #[test]
    fn codename_lookup_misses_cleanly() {
        let store = StoreGateway::in_memory().unwrap();
        assert!(store.get_agent_by_codename("GHOST").unwrap().is_none());
    }

    #[test]
    fn tasks_completed_increments_by_one() {
        let store = StoreGateway::in_memory().unwrap();
        let agent = Agent::new("Nova", "NOVA");
        store.insert_agent(&agent).unwrap();
        store.increment_tasks_completed(&agent.id).unwrap();
        store.increment_tasks_completed(&agent.id).unwrap();
        let reloaded = store.get_agent(&agent.id).unwrap().unwrap();
        assert_eq!(reloaded.tasks_completed, 2);
    }
}
