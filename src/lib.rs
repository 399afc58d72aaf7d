pub mod audio;
pub mod ctc;
pub mod error;
pub mod hangul;
pub mod kana;
pub mod options;
pub mod resolver;
pub mod synth;
pub mod tables;
pub mod timeline;
pub mod translator;
pub mod transport;
pub mod wav;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use audio::{HeadlessContext, PlaybackContext, PlaybackSource};
#[cfg(feature = "device")]
pub use audio::{list_audio_devices, DeviceContext};
pub use ctc::CtcTable;
pub use error::*;
pub use options::*;
pub use resolver::Characters;
pub use synth::{OfflineRenderer, Synthesizer};
pub use tables::{Script, ScriptSet};
pub use timeline::{GainEvent, Timeline};
pub use translator::Translator;
pub use transport::{AudioResult, AudioState, TransportEvent, DEFAULT_WAVE_FILENAME};

use std::sync::Arc;

pub const SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

pub fn encode(text: &str, options: &Options) -> String {
    Translator::new(options.clone()).encode(text)
}

pub fn decode(morse: &str, options: &Options) -> String {
    Translator::new(options.clone()).decode(morse)
}

/// Replaces four digit Chinese Telegraph Code groups with their characters.
pub fn decode_cn(text: &str) -> String {
    CtcTable::builtin().decode_groups(text)
}

/// Character tables by rank. With `use_priority`, rank 0 holds the preferred table.
pub fn characters(options: &Options, use_priority: bool) -> Characters {
    resolver::CharacterResolver::new(tables::builtin(), options).characters(use_priority)
}

pub fn hanzi_to_ctc(character: char) -> Option<&'static str> {
    CtcTable::builtin().hanzi_to_code(character)
}

pub fn ctc_to_hanzi(code: &str) -> Option<char> {
    CtcTable::builtin().code_to_hanzi(code)
}

/// Prepares playback of `text` on the default output device.
///
/// A non-empty `morse` is played as given instead of encoding `text`.
/// Nothing is rendered until the first call that needs samples.
pub fn audio(text: &str, options: &Options, morse: Option<&str>) -> Result<AudioResult> {
    let morse = match morse {
        Some(morse) if !morse.is_empty() => morse.to_string(),
        _ => encode(text, options),
    };

    let context = audio::default_context()?;
    AudioResult::with_backend(
        &morse,
        options,
        context,
        Arc::new(Synthesizer::new(&options.oscillator)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let options = Options::default();
        assert_eq!(encode("SOS", &options), "... --- ...");
        assert_eq!(encode("the", &options), "- .... .");
        assert_eq!(encode("Hello World", &options), ".... . .-.. .-.. --- / .-- --- .-. .-.. -..");
        assert_eq!(decode("... --- ...", &options), "SOS");
        assert_eq!(decode(".... . .-.. .-.. --- / .-- --- .-. .-.. -..", &options), "HELLO WORLD");
    }

    #[test]
    fn test_numerals() {
        let options = Options::default();
        assert_eq!(encode("1234567890", &options), ".---- ..--- ...-- ....- ..... -.... --... ---.. ----. -----");
        assert_eq!(decode(".---- ..--- ...-- ....- ..... -.... --... ---.. ----. -----", &options), "1234567890");
    }

    #[test]
    fn test_priority_changes_decoding() {
        let latin = Options::default();
        assert_eq!(decode(".--", &latin), "W");

        let greek = Options {
            priority: 6,
            ..Default::default()
        };
        assert_eq!(decode(".--", &greek), "Ω");
        assert_eq!(decode("... --- ...", &greek), "ΣΟΣ");
    }

    #[test]
    fn test_characters() {
        let options = Options::default();
        let all = characters(&options, false);
        assert!(!all.contains_key(&0));
        assert_eq!(all[&1][&'A'], ".-");

        let custom = Options {
            dot: "*".into(),
            dash: "_".into(),
            priority: 2,
            ..Default::default()
        };
        let preferred = characters(&custom, true);
        assert_eq!(preferred[&0], preferred[&2]);
        assert_eq!(preferred[&1][&'A'], "*_");
    }

    #[test]
    fn test_ctc_lookup() {
        assert_eq!(hanzi_to_ctc('中'), Some("0022"));
        assert_eq!(ctc_to_hanzi("2429"), Some('文'));
        assert_eq!(ctc_to_hanzi("ABCD"), None);
        assert_eq!(decode_cn("0022 2429"), "中 文");
        assert_eq!(hanzi_to_ctc('你'), Some("0132"));
        assert_eq!(hanzi_to_ctc('好'), Some("1170"));
        assert_eq!(ctc_to_hanzi("0554"), Some('北'));
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn test_audio_requires_device() {
        assert!(matches!(
            audio("SOS", &Options::default(), None),
            Err(MorseError::AudioDevice(_))
        ));
    }
}
