use std::sync::Arc;

use thiserror::Error;

use crate::tags::TagError;

/// Main error type for the encode/decode orchestration
#[derive(Error, Debug)]
pub enum CodecError {
    /// A tag contains a reserved delimiter
    #[error("Invalid tag: {0}")]
    Tag(#[from] TagError),

    /// The caller supplied a malformed buffer or option
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine broke its side of the capability contract
    #[error("Engine contract violation: {0}")]
    ContractViolation(String),

    /// The engine runtime failed to start; every waiter of the attempt gets it
    #[error("Engine initialization failed: {0}")]
    Initialization(Arc<CodecError>),

    /// The engine reported a failure while encoding
    #[error("Engine error: {0}")]
    Engine(String),

    /// The host decode service failed
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error originating from the FFmpeg reference engine
    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),
}

impl CodecError {
    /// Caller-correctable errors, raised before any engine resource exists.
    pub fn is_validation(&self) -> bool {
        matches!(self, CodecError::Tag(_) | CodecError::InvalidInput(_))
    }

    /// Fatal errors that point at a mismatched or broken engine build.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            CodecError::ContractViolation(_) => true,
            CodecError::Initialization(inner) => inner.is_contract_violation(),
            _ => false,
        }
    }
}

/// FFmpeg-specific errors
#[cfg(feature = "ffmpeg")]
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to open input file: {0}")]
    OpenInput(String),

    #[error("Failed to find decoder: {0}")]
    DecoderNotFound(String),

    #[error("Failed to create decoder: {0}")]
    DecoderCreate(String),

    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    #[error("Failed to configure encoder: {0}")]
    EncoderConfigure(String),

    #[error("Failed to create resampler: {0}")]
    ResamplerCreate(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    #[error("Failed to decode packet: {0}")]
    DecodePacket(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Failed to read frame: {0}")]
    ReadFrame(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::ReservedChar;

    #[test]
    fn test_error_classes() {
        let tag = CodecError::from(TagError::ReservedInName {
            name: "a=b".into(),
            character: ReservedChar::Equals,
        });
        assert!(tag.is_validation());
        assert!(!tag.is_contract_violation());

        let null = CodecError::ContractViolation("engine returned a null session".into());
        assert!(null.is_contract_violation());
        assert!(!null.is_validation());

        assert!(!CodecError::Engine("boom".into()).is_validation());

        let shared = CodecError::Initialization(Arc::new(null));
        assert!(shared.is_contract_violation());
    }

    #[test]
    fn test_error_display() {
        let err = CodecError::InvalidInput("quality 2 is outside [-0.1, 1.0]".into());
        assert_eq!(
            err.to_string(),
            "Invalid input: quality 2 is outside [-0.1, 1.0]"
        );
    }
}
