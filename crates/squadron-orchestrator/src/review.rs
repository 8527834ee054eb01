use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use squadron_core::{
    ReviewCheck, ReviewDecision, SquadronError, SquadronResult, Task, TaskResult, Verdict,
};
use squadron_store::StoreGateway;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Markers whose presence means the output is an error dump, a prompt echo,
/// or unfinished placeholder text rather than real work.
const ERROR_MARKERS: &[&str] = &[
    "OUTPUT FORMAT RULES",
    "MANDATORY",
    "[Tool use loop exceeded",
    "Traceback (most recent call last)",
    "PLACEHOLDER",
    "lorem ipsum",
];

/// Checks whose failure is a hard-fail category: the verdict escalates to a
/// human instead of a revision round-trip.
const HARD_FAIL_CHECKS: &[&str] = &[
    "no-error-markers",
    "tab-notation",
    "human-review-tags",
    "cost-sanity",
];

/// Tags marking public-facing content that always goes to a human.
const PUBLIC_FACING_TAGS: &[&str] = &["social", "email", "caption"];
/// Tags that force human review regardless of content quality.
const FORCED_REVIEW_TAGS: &[&str] = &["review-required", "external"];

/// Review thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Absolute cost ceiling per attempt, in USD.
    #[serde(default = "default_max_cost_usd")]
    pub max_cost_usd: f64,
    /// Escalate when tokens used exceed this multiple of the task estimate.
    #[serde(default = "default_token_overrun_factor")]
    pub token_overrun_factor: i64,
}

fn default_max_cost_usd() -> f64 {
    1.0
}
fn default_token_overrun_factor() -> i64 {
    3
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_cost_usd: default_max_cost_usd(),
            token_overrun_factor: default_token_overrun_factor(),
        }
    }
}

/// Evaluates a completed task result against the check battery and persists
/// the verdict.
pub struct AutoReviewEngine {
    store: Arc<StoreGateway>,
    config: ReviewConfig,
}

impl AutoReviewEngine {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<StoreGateway>, config: ReviewConfig) -> Self {
        Self { store, config }
    }

    /// Reviews the task's current completed result and appends a new verdict
    /// row referencing that exact snapshot.
    ///
    /// Fails with `NotFound` when the task is missing and `NotReviewable`
    /// when no completed result exists. Pure function of the snapshot:
    /// re-running on an unchanged result produces an identical decision and
    /// check list (in a fresh row — verdicts are never updated in place).
    pub fn auto_review(&self, task_id: &str) -> SquadronResult<Verdict> {
        let task = self
            .store
            .get_task(task_id)?
            .ok_or_else(|| SquadronError::NotFound(format!("task {task_id}")))?;
        let result = self.store.latest_completed_result(task_id)?.ok_or_else(|| {
            SquadronError::NotReviewable(format!("task {task_id} has no completed result"))
        })?;

        let checks = run_checks(&task, &result, &self.config);
        let (decision, reasons) = decide(&checks);

        let mut verdict = Verdict {
            id: Uuid::new_v4().to_string(),
            task_id: task.id.clone(),
            result_id: result.id.clone(),
            decision,
            reasons,
            checks,
            created_at: Utc::now(),
            seq: 0,
        };
        verdict.seq = self.store.insert_verdict(&verdict)?;

        info!(
            task_id = %task.id,
            result_id = %result.id,
            decision = %decision,
            "auto-review verdict recorded"
        );
        Ok(verdict)
    }
}

/// Runs the full check battery. Checks are independent and all run even when
/// an early one fails; the caller aggregates every reason.
pub fn run_checks(task: &Task, result: &TaskResult, config: &ReviewConfig) -> Vec<ReviewCheck> {
    let response = result.response.as_str();
    let mut checks = Vec::with_capacity(7);

    // 1. Instant floor: an empty-ish response can't be real work.
    let trimmed_len = response.trim().len();
    checks.push(if trimmed_len >= 20 {
        ReviewCheck::pass("minimum-length", format!("{} chars", response.len()))
    } else {
        ReviewCheck::fail(
            "minimum-length",
            format!("Only {} chars, minimum is 20", response.len()),
        )
    });

    // 2. Error / placeholder / prompt-echo markers.
    checks.push(match ERROR_MARKERS.iter().find(|m| response.contains(**m)) {
        None => ReviewCheck::pass("no-error-markers", "no error or placeholder markers"),
        Some(marker) => ReviewCheck::fail(
            "no-error-markers",
            format!("response contains marker \"{marker}\""),
        ),
    });

    // 3. Structural validity for JSON-shaped responses.
    checks.push(json_check(response));

    // 4. Tab notation for tab/lick tasks.
    checks.push(tab_check(task, response));

    // 5. Tags that always route to a human.
    checks.push(human_review_tag_check(task));

    // 6. Content length scaled to the task kind.
    let min_length = min_length_for(task);
    checks.push(if response.len() >= min_length {
        ReviewCheck::pass(
            "content-length",
            format!("{} chars (min {min_length})", response.len()),
        )
    } else {
        ReviewCheck::fail(
            "content-length",
            format!("Only {} chars, expected at least {min_length}", response.len()),
        )
    });

    // 7. Cost and token sanity.
    checks.push(cost_check(task, result, config));

    checks
}

/// Aggregates check outcomes into a decision and reason list.
///
/// `approve` when all pass; `escalate` when any hard-fail category fired;
/// otherwise `revise`. Ties always resolve toward the stricter outcome.
pub fn decide(checks: &[ReviewCheck]) -> (ReviewDecision, Vec<String>) {
    let failed: Vec<&ReviewCheck> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        return (
            ReviewDecision::Approve,
            vec!["All automated checks passed".to_string()],
        );
    }

    let decision = failed
        .iter()
        .map(|c| {
            if HARD_FAIL_CHECKS.contains(&c.name.as_str()) {
                ReviewDecision::Escalate
            } else {
                ReviewDecision::Revise
            }
        })
        .max_by_key(ReviewDecision::strictness)
        .unwrap_or(ReviewDecision::Revise);

    let reasons = failed.iter().map(|c| c.reason.clone()).collect();
    (decision, reasons)
}

fn json_check(response: &str) -> ReviewCheck {
    let trimmed = response.trim();
    let json_shaped =
        trimmed.starts_with("```") || trimmed.starts_with('[') || trimmed.starts_with('{');
    if !json_shaped {
        return ReviewCheck::pass("valid-json", "not a JSON response");
    }

    static FENCE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fence pattern is valid")
    });
    let content = fence
        .captures(response)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_else(|| trimmed.to_string());

    if serde_json::from_str::<serde_json::Value>(&content).is_ok() {
        return ReviewCheck::pass("valid-json", "valid as-is");
    }

    // One repair attempt: truncate to the last closing brace/bracket.
    let cut = content.rfind('}').max(content.rfind(']'));
    if let Some(idx) = cut {
        let repaired = &content[..=idx];
        if serde_json::from_str::<serde_json::Value>(repaired).is_ok() {
            return ReviewCheck::pass("valid-json", "valid after repair");
        }
    }
    ReviewCheck::fail("valid-json", "malformed JSON that cannot be repaired")
}

fn tab_check(task: &Task, response: &str) -> ReviewCheck {
    let is_tab_task = task
        .tags
        .iter()
        .any(|t| matches!(t.to_lowercase().as_str(), "tab" | "lick"));
    if !is_tab_task {
        return ReviewCheck::pass("tab-notation", "not a tab task");
    }
    static NOTATION: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let notation = NOTATION.get_or_init(|| {
        Regex::new(r"[eEbBgGdDaA]\|[0-9hpbsx/\\~|\s-]+").expect("tab pattern is valid")
    });
    if notation.is_match(response) {
        ReviewCheck::pass("tab-notation", "tab notation present")
    } else {
        ReviewCheck::fail("tab-notation", "no tab notation found in response")
    }
}

fn human_review_tag_check(task: &Task) -> ReviewCheck {
    let lower: Vec<String> = task.tags.iter().map(|t| t.to_lowercase()).collect();
    if lower.iter().any(|t| PUBLIC_FACING_TAGS.contains(&t.as_str())) {
        return ReviewCheck::fail(
            "human-review-tags",
            "public-facing content requires human review",
        );
    }
    if lower.iter().any(|t| FORCED_REVIEW_TAGS.contains(&t.as_str())) {
        return ReviewCheck::fail("human-review-tags", "tagged for mandatory human review");
    }
    ReviewCheck::pass("human-review-tags", "no forced-review tags")
}

/// Minimum content length by task kind: tab/lick 100, lesson 300, blog/post
/// 500, everything else 50.
fn min_length_for(task: &Task) -> usize {
    let title = task.title.to_lowercase();
    let lower: Vec<String> = task.tags.iter().map(|t| t.to_lowercase()).collect();
    let has_tag = |name: &str| lower.iter().any(|t| t == name);

    if has_tag("lick") || has_tag("tab") || title.contains("lick") || title.contains("tab") {
        100
    } else if has_tag("lesson") || title.contains("lesson") {
        300
    } else if title.contains("blog") || title.contains("post") {
        500
    } else {
        50
    }
}

fn cost_check(task: &Task, result: &TaskResult, config: &ReviewConfig) -> ReviewCheck {
    if task.estimated_tokens > 0
        && result.tokens_used > task.estimated_tokens * config.token_overrun_factor
    {
        return ReviewCheck::fail(
            "cost-sanity",
            format!(
                "{} tokens used, over {}x the {} estimate",
                result.tokens_used, config.token_overrun_factor, task.estimated_tokens
            ),
        );
    }
    if result.cost_usd > config.max_cost_usd {
        return ReviewCheck::fail(
            "cost-sanity",
            format!(
                "cost ${:.4} exceeds the ${:.2} ceiling",
                result.cost_usd, config.max_cost_usd
            ),
        );
    }
    ReviewCheck::pass(
        "cost-sanity",
        format!("{} tokens, ${:.4}", result.tokens_used, result.cost_usd),
    )
}
