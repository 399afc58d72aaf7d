use crate::options::Options;

pub const DOT_UNITS: f64 = 1.0;
pub const DASH_UNITS: f64 = 3.0;
pub const INTRA_CHARACTER_GAP: f64 = 1.0;
pub const INTER_CHARACTER_GAP: f64 = 3.0;
pub const WORD_GAP: f64 = 7.0;
pub const TRAILING_SILENCE: f64 = 7.0;

/// Gain applied from `at` seconds until the next event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainEvent {
    pub gain: f64,
    pub at: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Dot,
    Dash,
    Space,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    events: Vec<GainEvent>,
    duration: f64,
}

struct Builder {
    events: Vec<GainEvent>,
    time: f64,
    unit: f64,
    fw_unit: f64,
    tone_gain: f64,
}

impl Builder {
    fn add(&mut self, gain: f64, units: f64, word_unit: bool) {
        self.events.push(GainEvent {
            gain,
            at: self.time,
        });
        self.time += units * if word_unit { self.fw_unit } else { self.unit };
    }

    fn tone(&mut self, units: f64) {
        self.add(self.tone_gain, units, false);
    }

    fn silence(&mut self, units: f64) {
        self.add(0.0, units, false);
    }

    fn gap(&mut self, units: f64) {
        self.add(0.0, units, true);
    }
}

impl Timeline {
    /// Builds the gain envelope for a morse string written with the
    /// symbols configured in `options`.
    pub fn build(morse: &str, options: &Options) -> Self {
        let timing = options.timing();
        let mut builder = Builder {
            events: vec![GainEvent { gain: 0.0, at: 0.0 }],
            time: 0.0,
            unit: timing.unit,
            fw_unit: timing.fw_unit,
            tone_gain: options.tone_gain(),
        };

        let symbols = tokenize(morse, options);
        let mut needs_silence = false;

        for (i, symbol) in symbols.iter().enumerate() {
            match symbol {
                Symbol::Space => {
                    builder.gap(WORD_GAP);
                    needs_silence = false;
                }
                Symbol::Dot | Symbol::Dash => {
                    if needs_silence {
                        builder.silence(INTRA_CHARACTER_GAP);
                    }
                    let units = if *symbol == Symbol::Dot {
                        DOT_UNITS
                    } else {
                        DASH_UNITS
                    };
                    builder.tone(units);
                    needs_silence = true;
                }
                Symbol::Other => {
                    let prev = i.checked_sub(1).map(|j| symbols[j]);
                    let next = symbols.get(i + 1).copied();
                    let between_characters = matches!(prev, Some(p) if p != Symbol::Space)
                        && matches!(next, Some(n) if n != Symbol::Space);
                    if between_characters {
                        builder.gap(INTER_CHARACTER_GAP);
                        needs_silence = false;
                    }
                }
            }
        }

        builder.gap(TRAILING_SILENCE);

        Self {
            events: builder.events,
            duration: builder.time,
        }
    }

    pub fn events(&self) -> &[GainEvent] {
        &self.events
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Gain in effect at `time`; the later of two events at the same instant wins.
    pub fn gain_at(&self, time: f64) -> f64 {
        self.events
            .iter()
            .take_while(|event| event.at <= time)
            .last()
            .map_or(0.0, |event| event.gain)
    }
}

fn tokenize(morse: &str, options: &Options) -> Vec<Symbol> {
    let candidates = [
        (options.space.as_str(), Symbol::Space),
        (options.dot.as_str(), Symbol::Dot),
        (options.dash.as_str(), Symbol::Dash),
    ];

    let mut symbols = Vec::with_capacity(morse.len());
    let mut rest = morse;

    while let Some(c) = rest.chars().next() {
        let matched = candidates
            .iter()
            .find(|(text, _)| !text.is_empty() && rest.starts_with(text));

        match matched {
            Some((text, symbol)) => {
                symbols.push(*symbol);
                rest = &rest[text.len()..];
            }
            None => {
                symbols.push(Symbol::Other);
                rest = &rest[c.len_utf8()..];
            }
        }
    }

    symbols
}
