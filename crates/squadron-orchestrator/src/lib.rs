//! Agent heartbeat and task-lifecycle orchestration for the Squadron fleet.
//!
//! Coordinates autonomous agent workers: fires per-agent liveness probes on a
//! staggered cadence, auto-assigns unassigned tasks by keyword, judges
//! completed work, applies the resulting task-state transitions, and wakes
//! the production pipeline when the queue runs low.
//!
//! # Main types
//!
//! - [`HeartbeatRunner`] — Executes heartbeat cycles (one sync probe, N-1
//!   staggered probes) and relays acknowledgements and notifications.
//! - [`NotificationMailbox`] — Per-agent transient queue drained exactly once
//!   per cycle.
//! - [`AutoAssigner`] — First-match keyword dispatch of tasks to agents.
//! - [`AutoReviewEngine`] — Check battery over a completed result, producing
//!   a persisted [`squadron_core::Verdict`].
//! - [`AutoApproveExecutor`] — Idempotently applies a verdict's decision to
//!   the task.
//! - [`QueueTrigger`] — Debounced single-flight production-cycle signal.

/// Auto-approve executor: verdict → task-state transition.
pub mod approve;
/// Keyword-driven task auto-assignment.
pub mod assign;
/// Liveness endpoint abstraction and its store/HTTP implementations.
pub mod endpoint;
/// Heartbeat cycle runner and cron-paced daemon loop.
pub mod heartbeat;
/// Per-agent transient notification queue.
pub mod mailbox;
/// Debounced production-queue trigger.
pub mod queue_trigger;
/// Auto-review check battery and decision policy.
pub mod review;
/// Stagger schedule construction.
pub mod schedule;

pub use approve::{AutoApproveExecutor, MAX_REVISE_ATTEMPTS};
pub use assign::{AutoAssigner, ASSIGNMENT_RULES};
pub use endpoint::{
    HeartbeatPing, HeartbeatPulse, HttpLivenessEndpoint, LivenessEndpoint, StoreLivenessEndpoint,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatRunner, ProbeOutcome, ProbeReport};
pub use mailbox::NotificationMailbox;
pub use queue_trigger::{QueueTrigger, QueueTriggerConfig};
pub use review::{AutoReviewEngine, ReviewConfig};
pub use schedule::{build_schedule, ScheduleEntry, DEFAULT_INTERVAL_MINUTES, DEFAULT_STAGGER_MINUTES};
