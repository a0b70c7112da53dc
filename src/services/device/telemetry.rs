/// Background telemetry generator.
///
/// Regenerates the synthetic sensor readings on a fixed period. The loop runs as its
/// own tokio task and only ever talks to the device through `SharedDeviceState`.

use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::SharedDeviceState;
use crate::models::device::{MEMORY_USAGE_RANGE, TEMPERATURE_RANGE, VOLUME_RANGE};
use crate::models::{DeviceState, TiltVector};

/// Default telemetry period (2 seconds).
pub const DEFAULT_TELEMETRY_PERIOD: Duration = Duration::from_secs(2);

/// One generated set of sensor readings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryReading {
    pub tilt: TiltVector,
    pub volume: f64,
    pub temperature_c: f64,
    pub memory_usage_pct: f64,
}

impl TelemetryReading {
    /// Draws every reading uniformly from its simulated range
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            tilt: TiltVector {
                x: rng.gen_range(-0.5..=0.5),
                y: rng.gen_range(-0.5..=0.5),
                z: rng.gen_range(0.8..=1.2),
            },
            volume: rng.gen_range(VOLUME_RANGE.0..=VOLUME_RANGE.1),
            temperature_c: rng.gen_range(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1),
            memory_usage_pct: rng.gen_range(MEMORY_USAGE_RANGE.0..=MEMORY_USAGE_RANGE.1),
        }
    }

    pub fn apply(&self, state: &mut DeviceState) {
        state.tilt = self.tilt;
        state.microphone.volume = self.volume;
        state.temperature_c = self.temperature_c;
        state.memory_usage_pct = self.memory_usage_pct;
    }
}

struct RunningLoop {
    token: CancellationToken,
    // Kept only so the task is owned by the loop; never joined on stop
    _handle: JoinHandle<()>,
}

/// Periodic telemetry task with idempotent start/stop
pub struct TelemetryLoop {
    state: SharedDeviceState,
    period: Duration,
    running: Mutex<Option<RunningLoop>>,
}

impl TelemetryLoop {
    pub fn new(state: SharedDeviceState, period: Duration) -> Self {
        Self {
            state,
            period,
            running: Mutex::new(None),
        }
    }

    /// Spawns the telemetry task. Must be called from within a tokio runtime.
    ///
    /// Returns `false` if the loop was already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            tracing::debug!("Telemetry loop already running");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(Self::run(self.state.clone(), self.period, token.clone()));
        *running = Some(RunningLoop {
            token,
            _handle: handle,
        });

        tracing::info!(period_ms = self.period.as_millis() as u64, "Telemetry loop started");
        true
    }

    /// Stops the loop without waiting for the task to exit.
    ///
    /// Once this returns no further telemetry write is applied. Returns `false` if the
    /// loop was not running.
    pub fn stop(&self) -> bool {
        let Some(running) = self.running.lock().take() else {
            tracing::debug!("Telemetry loop already stopped");
            return false;
        };

        running.token.cancel();
        // A write that grabbed the lock before the cancel is allowed to finish;
        // every later one sees the cancelled token.
        self.state.barrier();

        tracing::info!("Telemetry loop stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    async fn run(state: SharedDeviceState, period: Duration, token: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let reading = TelemetryReading::generate(&mut rand::thread_rng());
            if !state.update_unless_cancelled(&token, |s| reading.apply(s)) {
                break;
            }

            tracing::trace!(
                temperature_c = reading.temperature_c,
                memory_usage_pct = reading.memory_usage_pct,
                volume = reading.volume,
                "Telemetry tick"
            );
        }

        tracing::debug!("Telemetry task exited");
    }
}

impl Drop for TelemetryLoop {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FAST: Duration = Duration::from_millis(10);

    #[test]
    fn test_generated_readings_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let reading = TelemetryReading::generate(&mut rng);
            assert!((-0.5..=0.5).contains(&reading.tilt.x));
            assert!((-0.5..=0.5).contains(&reading.tilt.y));
            assert!((0.8..=1.2).contains(&reading.tilt.z));
            assert!((0.0..=100.0).contains(&reading.volume));
            assert!((20.0..=35.0).contains(&reading.temperature_c));
            assert!((40.0..=75.0).contains(&reading.memory_usage_pct));
        }
    }

    #[tokio::test]
    async fn test_loop_mutates_state() {
        let state = SharedDeviceState::default();
        let telemetry = TelemetryLoop::new(state.clone(), FAST);
        let initial = state.read().last_update;

        assert!(telemetry.start());
        tokio::time::sleep(Duration::from_millis(60)).await;

        let current = state.read();
        assert!(current.last_update > initial);
        assert!(current.within_ranges());
        telemetry.stop();
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let state = SharedDeviceState::default();
        let telemetry = TelemetryLoop::new(state, FAST);

        assert!(!telemetry.stop());
        assert!(telemetry.start());
        assert!(!telemetry.start());
        assert!(telemetry.is_running());

        assert!(telemetry.stop());
        assert!(!telemetry.stop());
        assert!(!telemetry.is_running());
    }

    #[tokio::test]
    async fn test_no_mutation_after_stop() {
        let state = SharedDeviceState::default();
        let telemetry = TelemetryLoop::new(state.clone(), Duration::from_millis(1));

        telemetry.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        telemetry.stop();

        let frozen = state.read();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(state.read(), frozen);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let state = SharedDeviceState::default();
        let telemetry = TelemetryLoop::new(state.clone(), FAST);

        telemetry.start();
        telemetry.stop();
        let stopped_at = state.read().last_update;

        assert!(telemetry.start());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(state.read().last_update > stopped_at);
        telemetry.stop();
    }
}
