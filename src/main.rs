use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use polymorse_core::{
    AudioResult, CtcTable, Options, Oscillator, Translator, Waveform, DEFAULT_FREQUENCY,
    DEFAULT_UNIT, DEFAULT_VOLUME, DEFAULT_WAVE_FILENAME,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "polymorse")]
#[command(about = "Multi-script Morse code translator and tone renderer", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text to Morse code
    Encode {
        /// Text to encode (if not provided, reads from stdin)
        text: Option<String>,

        #[command(flatten)]
        symbols: SymbolArgs,
    },

    /// Decode Morse code to text
    Decode {
        /// Morse code to decode (if not provided, reads from stdin)
        morse: Option<String>,

        /// Also turn four digit telegraph code groups into Chinese characters
        #[arg(long)]
        cn: bool,

        #[command(flatten)]
        symbols: SymbolArgs,
    },

    /// Print the character tables
    Chars {
        /// Only print the table with this rank (0 is the preferred table)
        #[arg(long)]
        rank: Option<u8>,

        #[command(flatten)]
        symbols: SymbolArgs,
    },

    /// Render text as a Morse tone WAV file
    Wav {
        /// Text to render (if not provided, reads from stdin)
        text: Option<String>,

        /// Render this Morse code instead of encoding text
        #[arg(long)]
        morse: Option<String>,

        /// Output file
        #[arg(short, long, default_value = DEFAULT_WAVE_FILENAME)]
        output: PathBuf,

        #[command(flatten)]
        symbols: SymbolArgs,

        #[command(flatten)]
        tone: ToneArgs,
    },

    /// Play text as Morse tones on the default output device
    #[cfg(feature = "device")]
    Play {
        /// Text to play (if not provided, reads from stdin)
        text: Option<String>,

        /// Play this Morse code instead of encoding text
        #[arg(long)]
        morse: Option<String>,

        #[command(flatten)]
        symbols: SymbolArgs,

        #[command(flatten)]
        tone: ToneArgs,
    },

    /// List available audio output devices
    #[cfg(feature = "device")]
    Devices,
}

#[derive(Args)]
struct SymbolArgs {
    /// Symbol for a dot
    #[arg(long, default_value = ".")]
    dot: String,

    /// Symbol for a dash
    #[arg(long, default_value = "-")]
    dash: String,

    /// Symbol for a word space
    #[arg(long, default_value = "/")]
    space: String,

    /// Separator between characters
    #[arg(long, default_value = " ")]
    separator: String,

    /// Placeholder for characters without a pattern
    #[arg(long, default_value = "#")]
    invalid: String,

    /// Rank of the script table consulted first (1-12)
    #[arg(long, short, default_value = "1")]
    priority: u8,

    /// Telegraph code table (tab separated or Unihan_OtherMappings.txt) replacing the built-in one
    #[arg(long)]
    ctc_table: Option<PathBuf>,
}

#[derive(Args)]
struct ToneArgs {
    /// Words per minute (overrides --unit and --fw-unit)
    #[arg(long)]
    wpm: Option<f64>,

    /// Dot length in seconds
    #[arg(long, default_value_t = DEFAULT_UNIT)]
    unit: f64,

    /// Unit for character and word gaps in seconds (defaults to --unit)
    #[arg(long)]
    fw_unit: Option<f64>,

    /// Volume level (0 - 100)
    #[arg(long, default_value_t = DEFAULT_VOLUME)]
    volume: f64,

    /// Tone frequency in Hz
    #[arg(long, short, default_value_t = DEFAULT_FREQUENCY)]
    frequency: f64,

    /// Oscillator waveform: sine, square, sawtooth or triangle
    #[arg(long, default_value = "sine")]
    waveform: Waveform,
}

impl SymbolArgs {
    fn options(&self) -> Options {
        Options {
            dot: self.dot.clone(),
            dash: self.dash.clone(),
            space: self.space.clone(),
            separator: self.separator.clone(),
            invalid: self.invalid.clone(),
            priority: self.priority,
            ..Default::default()
        }
    }

    fn ctc_table(&self) -> Result<Option<CtcTable>> {
        match &self.ctc_table {
            Some(path) => {
                let table = CtcTable::load(path)?;
                log::info!("Loaded {} telegraph codes from {}", table.len(), path.display());
                Ok(Some(table))
            }
            None => Ok(None),
        }
    }
}

impl ToneArgs {
    fn apply(&self, options: Options) -> Options {
        Options {
            wpm: self.wpm,
            unit: self.unit,
            fw_unit: self.fw_unit.unwrap_or(self.unit),
            volume: self.volume,
            oscillator: Oscillator {
                waveform: self.waveform,
                frequency: self.frequency,
                on_ended: None,
            },
            ..options
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Encode { text, symbols } => {
            let text = input_or_stdin(text)?;
            let morse = encode(&text, &symbols, symbols.options())?;
            println!("{}", morse);
        }

        Commands::Decode { morse, cn, symbols } => {
            let morse = input_or_stdin(morse)?;
            let table = symbols.ctc_table()?;
            let translator = Translator::new(symbols.options());
            let translator = match &table {
                Some(table) => translator.with_ctc(table),
                None => translator,
            };

            let text = translator.decode(&morse);
            if cn {
                println!("{}", translator.decode_cn(&text));
            } else {
                println!("{}", text);
            }
        }

        Commands::Chars { rank, symbols } => {
            let options = symbols.options();
            let tables = polymorse_core::characters(&options, true);
            let mut stdout = io::stdout().lock();
            for (table_rank, entries) in &tables {
                if rank.is_some_and(|wanted| wanted != *table_rank) {
                    continue;
                }
                for (character, pattern) in entries {
                    writeln!(stdout, "{}\t{}\t{}", table_rank, character, pattern)?;
                }
            }
        }

        Commands::Wav {
            text,
            morse,
            output,
            symbols,
            tone,
        } => {
            let options = tone.apply(symbols.options());
            let morse = match morse {
                Some(morse) => morse,
                None => encode(&input_or_stdin(text)?, &symbols, options.clone())?,
            };

            let audio = AudioResult::headless(&morse, &options)?;
            eprintln!("Morse: {}", audio.morse());
            eprintln!("Audio duration: {:.2} s", audio.total_time());

            audio.export_wave(&output).await?;
            eprintln!("Wrote {}", output.display());
        }

        #[cfg(feature = "device")]
        Commands::Play {
            text,
            morse,
            symbols,
            tone,
        } => {
            let options = tone.apply(symbols.options());
            let morse = match morse {
                Some(morse) => morse,
                None => encode(&input_or_stdin(text)?, &symbols, options.clone())?,
            };
            play(&morse, &options).await?;
        }

        #[cfg(feature = "device")]
        Commands::Devices => {
            let devices = polymorse_core::list_audio_devices();
            println!("Available output devices:");
            for device in devices {
                println!("  {}", device);
            }
        }
    }

    Ok(())
}

fn input_or_stdin(input: Option<String>) -> Result<String> {
    let input = match input {
        Some(input) => input,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    if input.trim().is_empty() {
        bail!("No input given");
    }
    Ok(input)
}

fn encode(text: &str, symbols: &SymbolArgs, options: Options) -> Result<String> {
    let table = symbols.ctc_table()?;
    let translator = Translator::new(options);
    let morse = match &table {
        Some(table) => translator.with_ctc(table).encode(text),
        None => translator.encode(text),
    };
    Ok(morse)
}

#[cfg(feature = "device")]
async fn play(morse: &str, options: &Options) -> Result<()> {
    use polymorse_core::TransportEvent;
    use std::sync::Arc;
    use tokio::sync::Notify;

    let audio = polymorse_core::audio("", options, Some(morse))?;
    let finished = Arc::new(Notify::new());
    let notify = Arc::clone(&finished);
    audio.subscribe(move |event| {
        if *event == TransportEvent::Ended {
            notify.notify_one();
        }
    });

    eprintln!("Morse: {}", morse);
    eprintln!("Audio duration: {:.2} s", audio.total_time());

    audio.play().await?;
    finished.notified().await;
    audio.dispose();
    eprintln!("Playback complete!");

    Ok(())
}
