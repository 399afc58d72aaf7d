use crate::error::{MorseError, Result};
use crate::transport::TransportEvent;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_UNIT: f64 = 0.08;
pub const DEFAULT_FREQUENCY: f64 = 500.0;
pub const DEFAULT_VOLUME: f64 = 100.0;

/// Units in the word "PARIS" including its trailing word gap.
pub const PARIS_UNITS: f64 = 50.0;

pub type Listener = Arc<dyn Fn(&TransportEvent) + Send + Sync>;
pub type EndedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl FromStr for Waveform {
    type Err = MorseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "sawtooth" => Ok(Waveform::Sawtooth),
            "triangle" => Ok(Waveform::Triangle),
            other => Err(MorseError::InvalidOptions(format!(
                "Unknown waveform: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    pub frequency: f64,
    /// Legacy completion hook, runs alongside [`TransportEvent::Ended`].
    pub on_ended: Option<EndedCallback>,
}

impl Default for Oscillator {
    fn default() -> Self {
        Self {
            waveform: Waveform::Sine,
            frequency: DEFAULT_FREQUENCY,
            on_ended: None,
        }
    }
}

impl fmt::Debug for Oscillator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Oscillator")
            .field("waveform", &self.waveform)
            .field("frequency", &self.frequency)
            .field("on_ended", &self.on_ended.is_some())
            .finish()
    }
}

/// Seconds per dot unit and per word-gap unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub unit: f64,
    pub fw_unit: f64,
}

impl Timing {
    pub fn from_wpm(wpm: f64) -> Self {
        let unit = 60.0 / (wpm * PARIS_UNITS);
        Self { unit, fw_unit: unit }
    }
}

#[derive(Clone)]
pub struct Options {
    pub dot: String,
    pub dash: String,
    pub space: String,
    pub separator: String,
    pub invalid: String,
    pub priority: u8,
    pub wpm: Option<f64>,
    pub unit: f64,
    pub fw_unit: f64,
    pub volume: f64,
    pub oscillator: Oscillator,
    pub events: Vec<Listener>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            dot: ".".into(),
            dash: "-".into(),
            space: "/".into(),
            separator: " ".into(),
            invalid: "#".into(),
            priority: 1,
            wpm: None,
            unit: DEFAULT_UNIT,
            fw_unit: DEFAULT_UNIT,
            volume: DEFAULT_VOLUME,
            oscillator: Oscillator::default(),
            events: Vec::new(),
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("dot", &self.dot)
            .field("dash", &self.dash)
            .field("space", &self.space)
            .field("separator", &self.separator)
            .field("invalid", &self.invalid)
            .field("priority", &self.priority)
            .field("wpm", &self.wpm)
            .field("unit", &self.unit)
            .field("fw_unit", &self.fw_unit)
            .field("volume", &self.volume)
            .field("oscillator", &self.oscillator)
            .field("events", &self.events.len())
            .finish()
    }
}

impl Options {
    /// Effective timing. A set `wpm` overrides `unit` and `fw_unit`.
    pub fn timing(&self) -> Timing {
        match self.wpm {
            Some(wpm) => Timing::from_wpm(wpm),
            None => Timing {
                unit: self.unit,
                fw_unit: self.fw_unit,
            },
        }
    }

    pub fn tone_gain(&self) -> f64 {
        (self.volume / 100.0).clamp(0.0, 1.0)
    }

    pub fn with_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&TransportEvent) + Send + Sync + 'static,
    {
        self.events.push(Arc::new(listener));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(wpm) = self.wpm {
            if !(wpm.is_finite() && wpm > 0.0) {
                return Err(MorseError::InvalidOptions(format!(
                    "wpm must be positive, got {}",
                    wpm
                )));
            }
        }

        let timing = self.timing();
        if !(timing.unit.is_finite() && timing.unit > 0.0) {
            return Err(MorseError::InvalidOptions(format!(
                "unit must be positive, got {}",
                timing.unit
            )));
        }
        if !(timing.fw_unit.is_finite() && timing.fw_unit > 0.0) {
            return Err(MorseError::InvalidOptions(format!(
                "fw_unit must be positive, got {}",
                timing.fw_unit
            )));
        }

        if !(0.0..=100.0).contains(&self.volume) {
            return Err(MorseError::InvalidOptions(format!(
                "volume must be within 0-100, got {}",
                self.volume
            )));
        }

        if !(self.oscillator.frequency.is_finite() && self.oscillator.frequency > 0.0) {
            return Err(MorseError::InvalidOptions(format!(
                "frequency must be positive, got {}",
                self.oscillator.frequency
            )));
        }

        if self.dot.is_empty() || self.dash.is_empty() {
            return Err(MorseError::InvalidOptions(
                "dot and dash symbols must not be empty".into(),
            ));
        }

        if self.separator.is_empty() {
            return Err(MorseError::InvalidOptions(
                "character separator must not be empty".into(),
            ));
        }

        Ok(())
    }
}
