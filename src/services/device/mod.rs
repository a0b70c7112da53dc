/// Simulated device session: shared state, telemetry and interaction recording.

use std::time::Duration;

use crate::models::DeviceState;

pub mod interaction;
pub mod state;
pub mod telemetry;

pub use interaction::{InteractionRecorder, InteractionTiming};
pub use state::SharedDeviceState;
pub use telemetry::{TelemetryLoop, TelemetryReading, DEFAULT_TELEMETRY_PERIOD};

/// One running device session
///
/// Owns the shared state and the telemetry task. `shutdown` consumes the session and
/// seals the state, so recorder clones still held elsewhere can no longer mutate it.
pub struct DeviceSession {
    state: SharedDeviceState,
    telemetry: TelemetryLoop,
    recorder: InteractionRecorder,
}

impl DeviceSession {
    /// Creates a session with default readings and starts its telemetry task
    pub fn start(telemetry_period: Duration, timing: InteractionTiming) -> Self {
        let state = SharedDeviceState::new(DeviceState::new());
        let telemetry = TelemetryLoop::new(state.clone(), telemetry_period);
        let recorder = InteractionRecorder::new(state.clone(), timing);

        telemetry.start();
        tracing::info!(session_id = %state.read().session_id, "Device session started");

        Self {
            state,
            telemetry,
            recorder,
        }
    }

    /// Handle for reading device state
    pub fn state(&self) -> SharedDeviceState {
        self.state.clone()
    }

    pub fn recorder(&self) -> InteractionRecorder {
        self.recorder.clone()
    }

    pub fn telemetry(&self) -> &TelemetryLoop {
        &self.telemetry
    }

    /// Stops telemetry, seals the state and returns its final snapshot
    pub fn shutdown(self) -> DeviceState {
        self.telemetry.stop();
        self.state.seal();

        let last = self.state.read();
        tracing::info!(
            session_id = %last.session_id,
            interactions = last.counters.total_interactions(),
            recommendations = last.counters.recommendations,
            "Device session stopped"
        );
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InteractionKind;

    #[tokio::test]
    async fn test_session_lifecycle() {
        let session = DeviceSession::start(Duration::from_millis(5), InteractionTiming::instant());
        assert!(session.telemetry().is_running());

        let recorder = session.recorder();
        recorder.record(InteractionKind::Button).await;

        let state = session.state();
        let last = session.shutdown();
        assert_eq!(last.counters.button, 1);
        assert!(state.is_sealed());

        // Recorder outlives the session but can no longer write
        recorder.record(InteractionKind::Button).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.read(), last);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_telemetry_and_interactions_stress() {
        let session = DeviceSession::start(Duration::from_millis(1), InteractionTiming::instant());
        let state = session.state();

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let recorder = session.recorder();
                tokio::spawn(async move {
                    let kinds = [
                        InteractionKind::Voice,
                        InteractionKind::Tilt,
                        InteractionKind::Button,
                        InteractionKind::MultiSensory,
                    ];
                    for n in 0..50 {
                        recorder.record(kinds[(i + n) % kinds.len()]).await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        let reader = {
            let state = state.clone();
            tokio::spawn(async move {
                let mut last_total = 0;
                for _ in 0..300 {
                    let snapshot = state.read();
                    assert!(snapshot.within_ranges());
                    let total = snapshot.counters.total_interactions();
                    assert!(total >= last_total, "counters went backwards");
                    last_total = total;
                    tokio::task::yield_now().await;
                }
            })
        };

        for writer in writers {
            writer.await.unwrap();
        }
        reader.await.unwrap();

        let last = session.shutdown();
        // 200 records, 50 of each kind; multi-sensory also bumps voice, tilt and button
        assert_eq!(last.counters.multi_sensory, 50);
        assert_eq!(last.counters.voice, 100);
        assert_eq!(last.counters.tilt, 100);
        assert_eq!(last.counters.button, 100);
        assert_eq!(last.counters.recommendations, 200);
    }
}
