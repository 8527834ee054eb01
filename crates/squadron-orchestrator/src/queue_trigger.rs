use serde::{Deserialize, Serialize};
use squadron_core::SquadronResult;
use squadron_store::StoreGateway;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Queue trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTriggerConfig {
    /// Enqueue a production cycle when outstanding (todo + in-progress) work
    /// drops to this count or below.
    #[serde(default = "default_floor")]
    pub floor: i64,
}

fn default_floor() -> i64 {
    3
}

impl Default for QueueTriggerConfig {
    fn default() -> Self {
        Self {
            floor: default_floor(),
        }
    }
}

/// Debounced signal that wakes the production pipeline when work-in-flight
/// runs low.
///
/// Single-flight: the `cycle_pending` guard ensures concurrent calls within
/// one evaluation window enqueue at most one cycle. The pipeline re-arms the
/// guard with [`cycle_finished`](Self::cycle_finished) once it has picked the
/// signal up and run.
pub struct QueueTrigger {
    store: Arc<StoreGateway>,
    floor: i64,
    cycle_pending: AtomicBool,
    tx: mpsc::Sender<()>,
}

impl QueueTrigger {
    /// Creates a trigger and the receiver the production pipeline listens on.
    pub fn new(
        store: Arc<StoreGateway>,
        config: QueueTriggerConfig,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Arc::new(Self {
                store,
                floor: config.floor,
                cycle_pending: AtomicBool::new(false),
                tx,
            }),
            rx,
        )
    }

    /// Checks outstanding work against the floor and enqueues at most one
    /// production cycle. Returns whether a new cycle was enqueued.
    pub fn trigger_if_needed(&self) -> SquadronResult<bool> {
        let outstanding = self.store.count_outstanding()?;
        if outstanding > self.floor {
            return Ok(false);
        }
        if self.cycle_pending.swap(true, Ordering::SeqCst) {
            // A cycle is already pending; this call is debounced away.
            return Ok(false);
        }
        match self.tx.try_send(()) {
            Ok(()) => {
                info!(outstanding, floor = self.floor, "production cycle enqueued");
                Ok(true)
            }
            Err(mpsc::error::TrySendError::Full(())) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("production pipeline receiver is gone; trigger disarmed");
                self.cycle_pending.store(false, Ordering::SeqCst);
                Ok(false)
            }
        }
    }

    /// Re-arms the trigger after the pipeline finishes a cycle.
    pub fn cycle_finished(&self) {
        self.cycle_pending.store(false, Ordering::SeqCst);
    }
}
