//! Core types and error definitions for the Squadron fleet coordinator.
//!
//! This crate provides the foundational types shared across all Squadron
//! crates: the error taxonomy, the persisted domain records (agents, tasks,
//! results, verdicts, messages), and the transient notification type.
//!
//! # Main types
//!
//! - [`SquadronError`] — Unified error enum for all Squadron subsystems.
//! - [`SquadronResult`] — Convenience alias for `Result<T, SquadronError>`.
//! - [`Agent`] / [`AgentStatus`] — A fleet worker and its liveness state.
//! - [`Task`] / [`TaskStatus`] — A unit of work and its lifecycle state.
//! - [`TaskResult`] — One completion attempt's output and metrics.
//! - [`Verdict`] / [`ReviewDecision`] — Automated review output.
//! - [`Message`] — Persisted agent-to-agent or system communication.
//! - [`Notification`] — Transient per-agent mailbox entry.

/// Persisted domain records and status enums.
pub mod types;

pub use types::{
    Agent, AgentStatus, Message, MessageKind, Notification, ResultStatus, ReviewCheck,
    ReviewDecision, Task, TaskPriority, TaskResult, TaskStatus, Verdict,
};

/// Reserved id of the system agent. It posts operational messages and is
/// excluded from the heartbeat roster.
pub const SYSTEM_AGENT_ID: &str = "system";

// --- Error types ---

/// Top-level error type for the Squadron fleet coordinator.
///
/// Each variant corresponds to a failure class with its own propagation
/// policy: batch operations isolate `ProbeFailure`s per agent, idempotent
/// callers treat `TransitionConflict` on an already-transitioned task as
/// success, and `NotFound`/`NotReviewable` surface directly to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SquadronError {
    /// An agent, task, result, or verdict does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A task has no completed result to review yet.
    #[error("Not reviewable: {0}")]
    NotReviewable(String),

    /// A liveness probe failed (network error or timeout). Isolated to the
    /// probed agent; sibling probes and the cycle continue.
    #[error("Probe failure: {0}")]
    ProbeFailure(String),

    /// A task-state transition could not be applied because the task (or its
    /// reviewed result) moved underneath the caller.
    #[error("Transition conflict: {0}")]
    TransitionConflict(String),

    /// A third-party call returned a non-success status.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP-equivalent status code reported by the upstream service.
        status: u16,
        /// Human-readable upstream failure description.
        message: String,
    },

    /// An error from the persistent store.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`SquadronError`].
pub type SquadronResult<T> = Result<T, SquadronError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_identifier() {
        let err = SquadronError::NotFound("task abc-123".to_string());
        assert_eq!(err.to_string(), "Not found: task abc-123");
    }

    #[test]
    fn upstream_error_carries_status() {
        let err = SquadronError::Upstream {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
    }
}
