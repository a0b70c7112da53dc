use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::models::DeviceState;

/// Device state shared between the telemetry task and foreground code
///
/// All access goes through `read` (a full copy) and `update` (one atomic mutation),
/// so no caller can observe a half-applied change. Once sealed, updates are ignored.
#[derive(Clone)]
pub struct SharedDeviceState {
    inner: Arc<RwLock<Slot>>,
}

struct Slot {
    state: DeviceState,
    sealed: bool,
}

impl Default for SharedDeviceState {
    fn default() -> Self {
        Self::new(DeviceState::new())
    }
}

impl SharedDeviceState {
    pub fn new(state: DeviceState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slot {
                state,
                sealed: false,
            })),
        }
    }

    /// Returns a snapshot of the current state
    pub fn read(&self) -> DeviceState {
        self.inner.read().state.clone()
    }

    /// Applies `mutator` atomically and refreshes the last-update timestamp.
    ///
    /// Returns `false` when the state has been sealed and nothing was applied.
    pub fn update<F>(&self, mutator: F) -> bool
    where
        F: FnOnce(&mut DeviceState),
    {
        let mut slot = self.inner.write();
        if slot.sealed {
            tracing::debug!("Ignoring device update after session shutdown");
            return false;
        }
        Self::apply(&mut slot.state, mutator);
        true
    }

    /// Like `update`, but skipped when `token` is cancelled.
    ///
    /// The token is checked under the write lock, so once `token` has been cancelled
    /// and `barrier` has returned, no update guarded by it can land.
    pub(crate) fn update_unless_cancelled<F>(&self, token: &CancellationToken, mutator: F) -> bool
    where
        F: FnOnce(&mut DeviceState),
    {
        let mut slot = self.inner.write();
        if slot.sealed || token.is_cancelled() {
            return false;
        }
        Self::apply(&mut slot.state, mutator);
        true
    }

    /// Waits for any in-progress update to finish
    pub(crate) fn barrier(&self) {
        drop(self.inner.write());
    }

    /// Rejects every later update
    pub fn seal(&self) {
        self.inner.write().sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.read().sealed
    }

    fn apply<F>(state: &mut DeviceState, mutator: F)
    where
        F: FnOnce(&mut DeviceState),
    {
        let previous_counters = state.counters;
        let session_id = state.session_id;

        mutator(state);

        state.session_id = session_id;
        state.counters.never_below(&previous_counters);
        state.clamp_to_ranges();
        state.last_update = Utc::now();
    }
}
