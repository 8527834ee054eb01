use serde::{Deserialize, Serialize};
use squadron_core::SquadronResult;
use squadron_store::StoreGateway;

/// Default per-agent stagger between probes within one cycle.
pub const DEFAULT_STAGGER_MINUTES: u64 = 2;
/// Default interval between full heartbeat cycles.
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;

/// One derived heartbeat slot for an agent.
///
/// Never persisted or cached: the schedule is recomputed from the roster on
/// every pass, so roster changes take effect at the next cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// The agent to probe.
    pub agent_id: String,
    /// Display name, carried along for log/outcome readability.
    pub agent_name: String,
    /// Minutes after cycle start at which this probe fires.
    pub offset_minutes: u64,
    /// Minutes between cycles, shared by every entry.
    pub interval_minutes: u64,
}

/// Builds the heartbeat schedule: one entry per non-system agent, ordered by
/// creation time ascending, the Nth agent offset by `N × stagger` minutes.
///
/// Pure function of the current roster; safe to call repeatedly.
pub fn build_schedule(store: &StoreGateway) -> SquadronResult<Vec<ScheduleEntry>> {
    build_schedule_with(store, DEFAULT_STAGGER_MINUTES, DEFAULT_INTERVAL_MINUTES)
}

/// [`build_schedule`] with explicit stagger/interval settings.
pub fn build_schedule_with(
    store: &StoreGateway,
    stagger_minutes: u64,
    interval_minutes: u64,
) -> SquadronResult<Vec<ScheduleEntry>> {
    let roster = store.roster()?;
    Ok(roster
        .into_iter()
        .enumerate()
        .map(|(index, agent)| ScheduleEntry {
            agent_id: agent.id,
            agent_name: agent.name,
            offset_minutes: index as u64 * stagger_minutes,
            interval_minutes,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use squadron_core::{Agent, SYSTEM_AGENT_ID};

    fn agent_created_at(name: &str, minutes_after_epoch: i64) -> Agent {
        let mut agent = Agent::new(name, name.to_uppercase());
        agent.created_at = Utc::now() + Duration::minutes(minutes_after_epoch);
        agent
    }

    #[test]
    fn offsets_step_by_stagger_in_creation_order() {
        let store = StoreGateway::in_memory().unwrap();
        // Inserted out of creation order on purpose.
        store.insert_agent(&agent_created_at("Charlie", 2)).unwrap();
        store.insert_agent(&agent_created_at("Alpha", 0)).unwrap();
        store.insert_agent(&agent_created_at("Bravo", 1)).unwrap();

        let schedule = build_schedule(&store).unwrap();
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0].agent_name, "Alpha");
        assert_eq!(schedule[1].agent_name, "Bravo");
        assert_eq!(schedule[2].agent_name, "Charlie");

        let offsets: Vec<u64> = schedule.iter().map(|e| e.offset_minutes).collect();
        assert_eq!(offsets, vec![0, 2, 4]);
        assert!(schedule.iter().all(|e| e.interval_minutes == 15));
    }

    #[test]
    fn system_agent_is_excluded() {
        let store = StoreGateway::in_memory().unwrap();
        let mut system = Agent::new("System", "SYSTEM");
        system.id = SYSTEM_AGENT_ID.to_string();
        store.insert_agent(&system).unwrap();
        store.insert_agent(&agent_created_at("Alpha", 0)).unwrap();

        let schedule = build_schedule(&store).unwrap();
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule[0].agent_name, "Alpha");
        assert_eq!(schedule[0].offset_minutes, 0);
    }

    #[test]
    fn empty_roster_yields_empty_schedule() {
        let store = StoreGateway::in_memory().unwrap();
        assert!(build_schedule(&store).unwrap().is_empty());
    }

    #[test]
    fn rebuild_reflects_roster_changes() {
        let store = StoreGateway::in_memory().unwrap();
        store.insert_agent(&agent_created_at("Alpha", 0)).unwrap();
        assert_eq!(build_schedule(&store).unwrap().len(), 1);

        store.insert_agent(&agent_created_at("Bravo", 1)).unwrap();
        let schedule = build_schedule(&store).unwrap();
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule[1].offset_minutes, 2);
    }
}
