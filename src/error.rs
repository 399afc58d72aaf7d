use thiserror::Error;

#[derive(Error, Debug)]
pub enum MorseError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Audio buffer not available")]
    BufferReleased,

    #[error("Audio has been disposed")]
    Disposed,

    #[error("Invalid CTC table: {0}")]
    InvalidCtc(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MorseError>;
