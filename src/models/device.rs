/// Simulated device readings and interaction counters.
///
/// `DeviceState` is a plain value type. Sharing and synchronisation live in
/// `services::device::SharedDeviceState`; this module only defines the record,
/// its declared ranges and how it is rendered.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const VOLUME_RANGE: (f64, f64) = (0.0, 100.0);
pub const TEMPERATURE_RANGE: (f64, f64) = (20.0, 35.0);
pub const MEMORY_USAGE_RANGE: (f64, f64) = (40.0, 75.0);
pub const MAX_BRIGHTNESS: u8 = 100;

/// Accelerometer tilt reading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TiltVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for TiltVector {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, z: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Microphone {
    pub listening: bool,
    /// Input level, 0-100
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ButtonState {
    pub pressed: bool,
    pub press_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayState {
    pub on: bool,
    /// 0-100
    pub brightness: u8,
}

impl Default for DisplayState {
    fn default() -> Self {
        Self {
            on: true,
            brightness: MAX_BRIGHTNESS,
        }
    }
}

/// Status indicator (LED) mode
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorMode {
    #[default]
    Ready,
    Processing,
    Success,
    Error,
}

impl IndicatorMode {
    pub fn color(&self) -> &'static str {
        match self {
            IndicatorMode::Ready => "blue",
            IndicatorMode::Processing => "yellow",
            IndicatorMode::Success => "green",
            IndicatorMode::Error => "red",
        }
    }
}

impl fmt::Display for IndicatorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IndicatorMode::Ready => "ready",
            IndicatorMode::Processing => "processing",
            IndicatorMode::Success => "success",
            IndicatorMode::Error => "error",
        };
        write!(f, "{}", label)
    }
}

/// Discrete user-triggered event kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Voice,
    Tilt,
    Button,
    MultiSensory,
}

impl InteractionKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "voice" | "voice_command" => Some(InteractionKind::Voice),
            "tilt" | "tilt_gesture" => Some(InteractionKind::Tilt),
            "button" | "button_press" => Some(InteractionKind::Button),
            "multi_sensory" | "multi" => Some(InteractionKind::MultiSensory),
            _ => None,
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InteractionKind::Voice => "voice",
            InteractionKind::Tilt => "tilt",
            InteractionKind::Button => "button",
            InteractionKind::MultiSensory => "multi_sensory",
        };
        write!(f, "{}", label)
    }
}

/// Monotonic interaction counters
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InteractionCounters {
    pub voice: u64,
    pub tilt: u64,
    pub button: u64,
    pub multi_sensory: u64,
    /// Recommendation actions served (interactions plus comparisons)
    pub recommendations: u64,
}

impl InteractionCounters {
    pub fn get(&self, kind: InteractionKind) -> u64 {
        match kind {
            InteractionKind::Voice => self.voice,
            InteractionKind::Tilt => self.tilt,
            InteractionKind::Button => self.button,
            InteractionKind::MultiSensory => self.multi_sensory,
        }
    }

    pub fn increment(&mut self, kind: InteractionKind) {
        let counter = match kind {
            InteractionKind::Voice => &mut self.voice,
            InteractionKind::Tilt => &mut self.tilt,
            InteractionKind::Button => &mut self.button,
            InteractionKind::MultiSensory => &mut self.multi_sensory,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn total_interactions(&self) -> u64 {
        self.voice + self.tilt + self.button + self.multi_sensory
    }

    /// Raises every counter to at least its value in `previous`
    pub fn never_below(&mut self, previous: &InteractionCounters) {
        self.voice = self.voice.max(previous.voice);
        self.tilt = self.tilt.max(previous.tilt);
        self.button = self.button.max(previous.button);
        self.multi_sensory = self.multi_sensory.max(previous.multi_sensory);
        self.recommendations = self.recommendations.max(previous.recommendations);
    }
}

/// Full device record. Always handed out by value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceState {
    pub session_id: Uuid,
    pub tilt: TiltVector,
    pub microphone: Microphone,
    pub button: ButtonState,
    pub display: DisplayState,
    pub indicator: IndicatorMode,
    /// Ambient temperature in degrees Celsius
    pub temperature_c: f64,
    /// Memory usage, percent
    pub memory_usage_pct: f64,
    pub counters: InteractionCounters,
    pub last_update: DateTime<Utc>,
}

impl DeviceState {
    /// Defaults for a freshly started device session
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            tilt: TiltVector::default(),
            microphone: Microphone::default(),
            button: ButtonState::default(),
            display: DisplayState::default(),
            indicator: IndicatorMode::Ready,
            temperature_c: 25.0,
            memory_usage_pct: 45.0,
            counters: InteractionCounters::default(),
            last_update: Utc::now(),
        }
    }

    /// Pulls every ranged field back inside its declared range
    pub fn clamp_to_ranges(&mut self) {
        self.microphone.volume = clamp(self.microphone.volume, VOLUME_RANGE);
        self.temperature_c = clamp(self.temperature_c, TEMPERATURE_RANGE);
        self.memory_usage_pct = clamp(self.memory_usage_pct, MEMORY_USAGE_RANGE);
        self.display.brightness = self.display.brightness.min(MAX_BRIGHTNESS);
    }

    /// True when every ranged field is inside its declared range
    pub fn within_ranges(&self) -> bool {
        in_range(self.microphone.volume, VOLUME_RANGE)
            && in_range(self.temperature_c, TEMPERATURE_RANGE)
            && in_range(self.memory_usage_pct, MEMORY_USAGE_RANGE)
            && self.display.brightness <= MAX_BRIGHTNESS
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp(value: f64, (low, high): (f64, f64)) -> f64 {
    if value.is_nan() {
        low
    } else {
        value.clamp(low, high)
    }
}

fn in_range(value: f64, (low, high): (f64, f64)) -> bool {
    (low..=high).contains(&value)
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device status (session {})", self.session_id)?;
        writeln!(f, "─────────────────────────────────────────")?;
        writeln!(f, "Last update: {}", self.last_update.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Temperature: {:.1}°C", self.temperature_c)?;
        writeln!(f, "Memory usage: {:.1}%", self.memory_usage_pct)?;
        writeln!(f)?;

        writeln!(f, "Interactions:")?;
        writeln!(f, "  Voice: {}", self.counters.voice)?;
        writeln!(f, "  Tilt: {}", self.counters.tilt)?;
        writeln!(f, "  Button: {}", self.counters.button)?;
        writeln!(f, "  Multi-sensory: {}", self.counters.multi_sensory)?;
        writeln!(f, "  Total: {}", self.counters.total_interactions())?;
        writeln!(f, "  Recommendations served: {}", self.counters.recommendations)?;
        writeln!(f)?;

        writeln!(f, "Sensors:")?;
        writeln!(
            f,
            "  Tilt: X:{:6.2} Y:{:6.2} Z:{:6.2}",
            self.tilt.x, self.tilt.y, self.tilt.z
        )?;
        writeln!(
            f,
            "  Microphone: {} (volume {:.0}%)",
            if self.microphone.listening { "listening" } else { "idle" },
            self.microphone.volume
        )?;
        writeln!(
            f,
            "  Button: {} (total presses {})",
            if self.button.pressed { "pressed" } else { "ready" },
            self.button.press_count
        )?;
        writeln!(
            f,
            "  Display: {} (brightness {}%)",
            if self.display.on { "on" } else { "off" },
            self.display.brightness
        )?;
        write!(f, "  Indicator: {} ({})", self.indicator, self.indicator.color())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_defaults() {
        let state = DeviceState::new();
        assert_eq!(state.tilt, TiltVector { x: 0.0, y: 0.0, z: 1.0 });
        assert!(state.display.on);
        assert_eq!(state.display.brightness, 100);
        assert_eq!(state.indicator, IndicatorMode::Ready);
        assert_eq!(state.counters.total_interactions(), 0);
        assert!(state.within_ranges());
    }

    #[test]
    fn test_clamp_to_ranges() {
        let mut state = DeviceState::new();
        state.microphone.volume = 140.0;
        state.temperature_c = 5.0;
        state.memory_usage_pct = f64::NAN;
        state.display.brightness = 250;
        assert!(!state.within_ranges());

        state.clamp_to_ranges();
        assert_eq!(state.microphone.volume, 100.0);
        assert_eq!(state.temperature_c, 20.0);
        assert_eq!(state.memory_usage_pct, 40.0);
        assert_eq!(state.display.brightness, 100);
        assert!(state.within_ranges());
    }

    #[test]
    fn test_counters_increment_per_kind() {
        let mut counters = InteractionCounters::default();
        counters.increment(InteractionKind::Voice);
        counters.increment(InteractionKind::MultiSensory);
        counters.increment(InteractionKind::MultiSensory);
        assert_eq!(counters.get(InteractionKind::Voice), 1);
        assert_eq!(counters.get(InteractionKind::MultiSensory), 2);
        assert_eq!(counters.total_interactions(), 3);
    }

    #[test]
    fn test_interaction_kind_parse() {
        assert_eq!(InteractionKind::parse("voice"), Some(InteractionKind::Voice));
        assert_eq!(InteractionKind::parse("TILT"), Some(InteractionKind::Tilt));
        assert_eq!(InteractionKind::parse("button_press"), Some(InteractionKind::Button));
        assert_eq!(InteractionKind::parse("multi_sensory"), Some(InteractionKind::MultiSensory));
        assert_eq!(InteractionKind::parse("shake"), None);
    }

    #[test]
    fn test_status_rendering_mentions_counters() {
        let mut state = DeviceState::new();
        state.counters.increment(InteractionKind::Button);
        let rendered = state.to_string();
        assert!(rendered.contains("Button: 1"));
        assert!(rendered.contains("Indicator: ready (blue)"));
    }
}
