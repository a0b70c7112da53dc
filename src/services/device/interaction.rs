use std::time::Duration;

use rand::Rng;

use super::state::SharedDeviceState;
use crate::config::Config;
use crate::models::{IndicatorMode, InteractionKind, TiltVector};

/// How long the transient device flags are held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionTiming {
    /// Microphone stays in listening mode this long
    pub voice_hold: Duration,
    /// Pause after the tilt gesture inside a multi-sensory sequence
    pub tilt_hold: Duration,
    /// Button stays pressed this long
    pub button_hold: Duration,
}

impl Default for InteractionTiming {
    fn default() -> Self {
        Self {
            voice_hold: Duration::from_millis(1_000),
            tilt_hold: Duration::from_millis(1_000),
            button_hold: Duration::from_millis(500),
        }
    }
}

impl InteractionTiming {
    /// No holds at all, for tests and headless use
    pub fn instant() -> Self {
        Self {
            voice_hold: Duration::ZERO,
            tilt_hold: Duration::ZERO,
            button_hold: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            voice_hold: Duration::from_millis(config.voice_hold_ms),
            tilt_hold: Duration::from_millis(config.tilt_hold_ms),
            button_hold: Duration::from_millis(config.button_hold_ms),
        }
    }
}

/// Records discrete user interactions on the device
///
/// Counter bumps are single atomic updates; the transient flag sequences use
/// cooperative sleeps so they never hold up the telemetry task.
#[derive(Clone)]
pub struct InteractionRecorder {
    state: SharedDeviceState,
    timing: InteractionTiming,
}

impl InteractionRecorder {
    pub fn new(state: SharedDeviceState, timing: InteractionTiming) -> Self {
        Self { state, timing }
    }

    /// Records one interaction and plays its transient sequence
    pub async fn record(&self, kind: InteractionKind) {
        tracing::info!(interaction = %kind, "Recording device interaction");

        match kind {
            InteractionKind::Voice => self.voice_sequence().await,
            InteractionKind::Tilt => self.tilt_sequence(Duration::ZERO).await,
            InteractionKind::Button => self.button_sequence().await,
            InteractionKind::MultiSensory => {
                self.voice_sequence().await;
                self.tilt_sequence(self.timing.tilt_hold).await;
                self.button_sequence().await;
                self.state
                    .update(|s| s.counters.increment(InteractionKind::MultiSensory));
            }
        }

        self.state.update(|s| {
            s.counters.recommendations = s.counters.recommendations.saturating_add(1);
        });
    }

    /// Records a model comparison: no counters besides recommendations, no flags
    pub fn record_comparison(&self) {
        self.state.update(|s| {
            s.counters.recommendations = s.counters.recommendations.saturating_add(1);
        });
        tracing::info!("Model comparison recorded");
    }

    /// Sets the indicator mode
    pub fn indicate(&self, mode: IndicatorMode) {
        self.state.update(|s| s.indicator = mode);
        tracing::debug!(mode = %mode, color = mode.color(), "Indicator updated");
    }

    /// Shows a message on the device display
    pub fn display(&self, message: &str) {
        self.state.update(|s| s.display.on = true);
        tracing::info!(message = %message, "Device display");
    }

    async fn voice_sequence(&self) {
        self.state.update(|s| {
            s.counters.increment(InteractionKind::Voice);
            s.microphone.listening = true;
        });
        hold(self.timing.voice_hold).await;
        self.state.update(|s| s.microphone.listening = false);
    }

    async fn tilt_sequence(&self, pause: Duration) {
        let gesture = gesture_reading(&mut rand::thread_rng());
        self.state.update(|s| {
            s.counters.increment(InteractionKind::Tilt);
            s.tilt = gesture;
        });
        hold(pause).await;
    }

    async fn button_sequence(&self) {
        self.state.update(|s| {
            s.counters.increment(InteractionKind::Button);
            s.button.press_count = s.button.press_count.saturating_add(1);
            s.button.pressed = true;
        });
        hold(self.timing.button_hold).await;
        self.state.update(|s| s.button.pressed = false);
    }
}

/// A tilt reading from a deliberate gesture, wider than the idle drift
fn gesture_reading<R: Rng + ?Sized>(rng: &mut R) -> TiltVector {
    TiltVector {
        x: rng.gen_range(-1.0..=1.0),
        y: rng.gen_range(-1.0..=1.0),
        z: rng.gen_range(0.5..=1.5),
    }
}

async fn hold(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
