#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use crate::{
    ctc::CtcTable, synth::OfflineRenderer, timeline::Timeline, wav, Options, Synthesizer,
    Translator, Waveform, SAMPLE_RATE,
};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub struct PolymorseWasm {
    options: Options,
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
impl PolymorseWasm {
    #[wasm_bindgen(constructor)]
    pub fn new(priority: u8) -> Self {
        console_error_panic_hook::set_once();

        Self {
            options: Options {
                priority,
                ..Default::default()
            },
        }
    }

    #[wasm_bindgen]
    pub fn set_symbols(&mut self, dot: &str, dash: &str, space: &str, separator: &str) {
        self.options.dot = dot.to_string();
        self.options.dash = dash.to_string();
        self.options.space = space.to_string();
        self.options.separator = separator.to_string();
    }

    #[wasm_bindgen]
    pub fn set_wpm(&mut self, wpm: f64) {
        self.options.wpm = Some(wpm);
    }

    #[wasm_bindgen]
    pub fn set_volume(&mut self, volume: f64) {
        self.options.volume = volume.clamp(0.0, 100.0);
    }

    #[wasm_bindgen]
    pub fn set_oscillator(&mut self, waveform: &str, frequency: f64) -> Result<(), JsValue> {
        self.options.oscillator.waveform = waveform
            .parse::<Waveform>()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.options.oscillator.frequency = frequency;
        Ok(())
    }

    #[wasm_bindgen]
    pub fn encode(&self, text: &str) -> String {
        Translator::new(self.options.clone()).encode(text)
    }

    #[wasm_bindgen]
    pub fn decode(&self, morse: &str) -> String {
        Translator::new(self.options.clone()).decode(morse)
    }

    #[wasm_bindgen]
    pub fn decode_cn(&self, text: &str) -> String {
        CtcTable::builtin().decode_groups(text)
    }

    /// Mono samples for `morse` at [`SAMPLE_RATE`].
    #[wasm_bindgen]
    pub fn render(&self, morse: &str) -> Result<Vec<f32>, JsValue> {
        self.options
            .validate()
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let timeline = Timeline::build(morse, &self.options);
        Synthesizer::new(&self.options.oscillator)
            .render(&timeline, SAMPLE_RATE)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn wave(&self, text: &str) -> Result<Vec<u8>, JsValue> {
        let samples = self.render(&self.encode(text))?;
        wav::encode(&samples, SAMPLE_RATE).map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn total_time(&self, morse: &str) -> f64 {
        Timeline::build(morse, &self.options).duration()
    }

    #[wasm_bindgen]
    pub fn get_sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn init() {
    console_error_panic_hook::set_once();
}
