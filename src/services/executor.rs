/// Deadline-bounded execution of blocking computations.
///
/// Each computation runs on its own detached OS thread and reports back over a
/// oneshot channel. The caller waits on that channel with `tokio::time::timeout`:
/// whichever comes first, completion or deadline, releases the caller.
///
/// Timeouts are detected, never enforced. A computation that misses its deadline
/// keeps running until it finishes on its own (possibly never) and its result is
/// dropped. Repeated timeouts therefore leave threads behind; `lingering()` reports
/// how many abandoned computations are still alive so the leak stays visible.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const ABANDONED: u8 = 2;

/// Result of one bounded invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome<T, E> {
    /// The computation finished in time and returned a value
    Success(T),
    /// The deadline elapsed first; the computation was left running
    TimedOut,
    /// The computation finished in time but failed
    Failed(ExecutionFailure<E>),
}

impl<T, E> ExecutionOutcome<T, E> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ExecutionOutcome::TimedOut)
    }
}

/// Why a computation failed
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionFailure<E> {
    /// The computation returned an error
    Error(E),
    /// The computation panicked; carries the panic message
    Panicked(String),
    /// No thread could be started for the computation
    Spawn(String),
}

impl<E: std::fmt::Display> std::fmt::Display for ExecutionFailure<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionFailure::Error(e) => write!(f, "{}", e),
            ExecutionFailure::Panicked(message) => write!(f, "computation panicked: {}", message),
            ExecutionFailure::Spawn(reason) => write!(f, "could not start computation: {}", reason),
        }
    }
}

/// Runs computations under a hard wall-clock deadline
#[derive(Debug, Clone, Default)]
pub struct BoundedExecutor {
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    timeouts: AtomicU64,
    lingering: AtomicU64,
}

/// Marks the computation finished when dropped, even on unwind
struct CompletionGuard {
    status: Arc<AtomicU8>,
    counters: Arc<Counters>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        let swapped =
            self.status
                .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire);
        if swapped.is_err() {
            // Caller gave up on us earlier and counted us as lingering
            self.counters.lingering.fetch_sub(1, Ordering::AcqRel);
            tracing::debug!("Abandoned computation finished; result discarded");
        }
    }
}

impl BoundedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `computation` on a fresh thread and waits at most `deadline` for it.
    ///
    /// Never blocks the caller past the deadline (plus scheduling overhead) and never
    /// panics, whatever the computation does.
    pub async fn run_with_deadline<F, T, E>(
        &self,
        computation: F,
        deadline: Duration,
    ) -> ExecutionOutcome<T, E>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let started = Instant::now();
        let status = Arc::new(AtomicU8::new(RUNNING));
        let (tx, rx) = oneshot::channel();

        let guard = CompletionGuard {
            status: status.clone(),
            counters: self.counters.clone(),
        };

        let spawned = std::thread::Builder::new()
            .name("bounded-exec".to_string())
            .spawn(move || {
                let _guard = guard;
                let result = panic::catch_unwind(AssertUnwindSafe(computation));
                // Receiver is gone when the caller timed out
                let _ = tx.send(result);
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "Failed to spawn computation thread");
            return ExecutionOutcome::Failed(ExecutionFailure::Spawn(e.to_string()));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(Ok(value)))) => {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Computation completed"
                );
                ExecutionOutcome::Success(value)
            }
            Ok(Ok(Ok(Err(error)))) => ExecutionOutcome::Failed(ExecutionFailure::Error(error)),
            Ok(Ok(Err(payload))) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(panic = %message, "Computation panicked");
                ExecutionOutcome::Failed(ExecutionFailure::Panicked(message))
            }
            Ok(Err(_)) => ExecutionOutcome::Failed(ExecutionFailure::Panicked(
                "computation ended without reporting a result".to_string(),
            )),
            Err(_) => {
                self.abandon(&status);
                tracing::warn!(
                    deadline_ms = deadline.as_millis() as u64,
                    lingering = self.lingering(),
                    "Computation exceeded its deadline; abandoning it"
                );
                ExecutionOutcome::TimedOut
            }
        }
    }

    /// Total number of invocations that hit their deadline
    pub fn timeouts(&self) -> u64 {
        self.counters.timeouts.load(Ordering::Acquire)
    }

    /// Abandoned computations that have not finished yet
    pub fn lingering(&self) -> u64 {
        self.counters.lingering.load(Ordering::Acquire)
    }

    fn abandon(&self, status: &AtomicU8) {
        self.counters.timeouts.fetch_add(1, Ordering::AcqRel);
        // Count first so a concurrent finish can never decrement below zero
        self.counters.lingering.fetch_add(1, Ordering::AcqRel);
        let swapped =
            status.compare_exchange(RUNNING, ABANDONED, Ordering::AcqRel, Ordering::Acquire);
        if swapped.is_err() {
            // Finished right at the deadline; nothing is left running
            self.counters.lingering.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
