use thiserror::Error;

/// Errors raised by the frame transcoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    #[error("invalid sample rate: {0} Hz")]
    InvalidRate(u32),

    #[error("a {duration_ms} ms frame at {rate} Hz holds no samples")]
    EmptyFrame { rate: u32, duration_ms: u32 },

    #[error("input of {len} bytes is not a whole number of {width}-byte samples")]
    Misaligned { len: usize, width: usize },
}

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Voice profile not found: {0}")]
    ProfileNotFound(String),

    #[error("frame sink error: {0}")]
    Sink(String),
}
