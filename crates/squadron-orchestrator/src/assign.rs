use squadron_core::{SquadronError, SquadronResult};
use squadron_store::StoreGateway;
use std::sync::Arc;
use tracing::info;

/// One keyword-dispatch rule: any keyword hit routes to the codename.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentRule {
    /// Substrings matched against lowercase tag/description text.
    pub keywords: &'static [&'static str],
    /// Capability codename of the agent that takes the work.
    pub codename: &'static str,
}

/// Ordered dispatch table. First-match priority is a documented contract:
/// earlier rules win over later ones whenever both match, so order changes
/// here change routing.
pub const ASSIGNMENT_RULES: &[AssignmentRule] = &[
    AssignmentRule { keywords: &["lick", "tab", "guitar"], codename: "TabSmith" },
    AssignmentRule { keywords: &["course", "curriculum", "lesson"], codename: "LessonArchitect" },
    AssignmentRule { keywords: &["backing", "track", "audio", "music"], codename: "TrackMaster" },
    AssignmentRule { keywords: &["theory"], codename: "TheoryBot" },
    AssignmentRule { keywords: &["practice", "coach", "plan"], codename: "CoachAI" },
    AssignmentRule { keywords: &["progress", "analytics", "churn"], codename: "FeedbackLoop" },
    AssignmentRule { keywords: &["blog", "content", "newsletter", "email"], codename: "ContentMill" },
    AssignmentRule { keywords: &["seo", "keyword"], codename: "SEOHawk" },
    AssignmentRule { keywords: &["community", "social", "discord"], codename: "CommunityPulse" },
    AssignmentRule { keywords: &["revenue", "kpi", "financial", "metric"], codename: "BizOps" },
];

/// Scans the rule table in declared order; the first rule with any keyword
/// contained in the lowercase text wins.
fn find_codename(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    ASSIGNMENT_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|kw| lower.contains(kw)))
        .map(|rule| rule.codename)
}

/// Resolves unassigned tasks to capable agents by keyword.
pub struct AutoAssigner {
    store: Arc<StoreGateway>,
}

impl AutoAssigner {
    /// Creates an assigner over the given store.
    pub fn new(store: Arc<StoreGateway>) -> Self {
        Self { store }
    }

    /// Pure resolution: tags first, description as the fallback. Returns the
    /// winning codename without touching the store.
    pub fn resolve_codename(tags: &[String], description: &str) -> Option<&'static str> {
        let tag_text = tags.join(" ");
        find_codename(&tag_text).or_else(|| find_codename(description))
    }

    /// Resolves and applies an assignee for the task.
    ///
    /// Idempotent: an already-assigned task keeps its assignee (use
    /// [`reassign`](Self::reassign) to force a fresh resolution). No rule
    /// match, or a matched codename with no live agent, leaves the task
    /// unassigned and returns `Ok(None)`.
    pub fn assign(&self, task_id: &str) -> SquadronResult<Option<String>> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("task {task_id}")))?;

        if let Some(existing) = task.assignee_id {
            return Ok(Some(existing));
        }
        self.resolve_and_apply(task_id, &task.tags, &task.description)
    }

    /// Re-resolves the assignee even when one is already set. Reassignment is
    /// a full replace, never additive.
    pub fn reassign(&self, task_id: &str) -> SquadronResult<Option<String>> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("task {task_id}")))?;
        self.resolve_and_apply(task_id, &task.tags, &task.description)
    }

    fn resolve_and_apply(
        &self,
        task_id: &str,
        tags: &[String],
        description: &str,
    ) -> SquadronResult<Option<String>> {
        let Some(codename) = Self::resolve_codename(tags, description) else {
            return Ok(None);
        };
        let Some(agent) = self.store.get_agent_by_codename(codename)? else {
            return Ok(None);
        };
        self.store.set_assignee(task_id, &agent.id)?;
        info!(task_id, agent_id = %agent.id, codename, "task auto-assigned");
        Ok(Some(agent.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squadron_core::{Agent, Task};

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tags_beat_description() {
        let resolved = AutoAssigner::resolve_codename(
            &tags(&["theory"]),
            "write a blog post about practice plans",
        );
        assert_eq!(resolved, Some("TheoryBot"));
    }

    #[test]
    fn description_is_the_fallback() {
        let resolved =
            AutoAssigner::resolve_codename(&tags(&["urgent"]), "draft the newsletter for June");
        assert_eq!(resolved, Some("ContentMill"));
    }

    #[test]
    fn first_declared_rule_wins_on_overlap() {
        // "tab" (rule 1) and "lesson" (rule 2) both match; rule order decides.
        let resolved = AutoAssigner::resolve_codename(&tags(&["lesson", "tab"]), "");
        assert_eq!(resolved, Some("TabSmith"));
    }

    #[test]
    fn no_keyword_resolves_to_none() {
        assert_eq!(
            AutoAssigner::resolve_codename(&tags(&["misc"]), "tidy the backlog"),
            None
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let t = tags(&["lick", "beginner"]);
        let first = AutoAssigner::resolve_codename(&t, "");
        let second = AutoAssigner::resolve_codename(&t, "");
        assert_eq!(first, Some("TabSmith"));
        assert_eq!(first, second);
    }

    #[test]
    fn assign_sets_assignee_and_is_idempotent() {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let agent = Agent::new("Tabby", "TabSmith");
        store.insert_agent(&agent).unwrap();
        let task = Task::new("Write five licks").with_tags(tags(&["lick", "beginner"]));
        store.insert_task(&task).unwrap();

        let assigner = AutoAssigner::new(Arc::clone(&store));
        let assigned = assigner.assign(&task.id).unwrap();
        assert_eq!(assigned.as_deref(), Some(agent.id.as_str()));

        // A second call converges on the same assignee.
        let again = assigner.assign(&task.id).unwrap();
        assert_eq!(again, assigned);

        let reloaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.assignee_id.as_deref(), Some(agent.id.as_str()));
    }

    #[test]
    fn missing_codename_agent_leaves_task_unassigned() {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let task = Task::new("Write five licks").with_tags(tags(&["lick"]));
        store.insert_task(&task).unwrap();

        let assigner = AutoAssigner::new(Arc::clone(&store));
        assert_eq!(assigner.assign(&task.id).unwrap(), None);
        let reloaded = store.get_task(&task.id).unwrap().unwrap();
        assert!(reloaded.assignee_id.is_none());
    }

    #[test]
    fn assign_never_steals_an_assigned_task_but_reassign_does() {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let tabby = Agent::new("Tabby", "TabSmith");
        let other = Agent::new("Owner", "OWNER");
        store.insert_agent(&tabby).unwrap();
        store.insert_agent(&other).unwrap();
        let task = Task::new("Write five licks")
            .with_tags(tags(&["lick"]))
            .with_assignee(other.id.clone());
        store.insert_task(&task).unwrap();

        let assigner = AutoAssigner::new(Arc::clone(&store));
        assert_eq!(
            assigner.assign(&task.id).unwrap().as_deref(),
            Some(other.id.as_str())
        );

        let reassigned = assigner.reassign(&task.id).unwrap();
        assert_eq!(reassigned.as_deref(), Some(tabby.id.as_str()));
        let reloaded = store.get_task(&task.id).unwrap().unwrap();
        assert_eq!(reloaded.assignee_id.as_deref(), Some(tabby.id.as_str()));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let store = Arc::new(StoreGateway::in_memory().unwrap());
        let assigner = AutoAssigner::new(store);
        assert!(matches!(
            assigner.assign("ghost").unwrap_err(),
            SquadronError::NotFound(_)
        ));
    }
}
