use crate::error::{MorseError, Result};
use crate::options::{Oscillator, Waveform};
use crate::timeline::Timeline;
use std::f64::consts::PI;

/// Turns a gain timeline into mono samples without touching an output device.
pub trait OfflineRenderer: Send + Sync {
    fn render(&self, timeline: &Timeline, sample_rate: u32) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Synthesizer {
    waveform: Waveform,
    frequency: f64,
}

impl Synthesizer {
    pub fn new(oscillator: &Oscillator) -> Self {
        Self {
            waveform: oscillator.waveform,
            frequency: oscillator.frequency,
        }
    }

    pub fn buffer_len(duration: f64, sample_rate: u32) -> usize {
        (sample_rate as f64 * duration).ceil().max(0.0) as usize
    }
}

impl OfflineRenderer for Synthesizer {
    fn render(&self, timeline: &Timeline, sample_rate: u32) -> Result<Vec<f32>> {
        if sample_rate == 0 {
            return Err(MorseError::Render("sample rate must be positive".into()));
        }
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(MorseError::Render(format!(
                "oscillator frequency must be positive, got {}",
                self.frequency
            )));
        }

        let num_samples = Self::buffer_len(timeline.duration(), sample_rate);
        let rate = sample_rate as f64;
        let step = self.frequency / rate;
        let events = timeline.events();

        let mut samples = Vec::with_capacity(num_samples);
        let mut cursor = 0;
        let mut gain = 0.0;
        let mut phase = 0.0;

        for i in 0..num_samples {
            let t = i as f64 / rate;
            while cursor < events.len() && events[cursor].at <= t {
                gain = events[cursor].gain;
                cursor += 1;
            }

            samples.push((oscillate(self.waveform, phase) * gain) as f32);
            phase = (phase + step).fract();
        }

        Ok(samples)
    }
}

/// One period of `waveform` sampled at `phase` in [0, 1). Every shape starts at zero.
fn oscillate(waveform: Waveform, phase: f64) -> f64 {
    match waveform {
        Waveform::Sine => (2.0 * PI * phase).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Sawtooth => {
            if phase < 0.5 {
                2.0 * phase
            } else {
                2.0 * phase - 2.0
            }
        }
        Waveform::Triangle => {
            if phase < 0.25 {
                4.0 * phase
            } else if phase < 0.75 {
                2.0 - 4.0 * phase
            } else {
                4.0 * phase - 4.0
            }
        }
    }
}
