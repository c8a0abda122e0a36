//! Chunked Ogg encoding on top of a handle-based codec engine
//!
//! The engine does the actual compression. This crate orchestrates it:
//! - [`gate`]: one-time engine initialization shared by every caller
//! - [`tags`]: the packed `NAME=VALUE` tab-separated comment format
//! - [`bridge`]: copying samples in and encoded bytes out
//! - [`session`]: one engine session with guaranteed release
//! - [`scheduler`]: the chunked feed/drain/flush loop
//! - [`api`]: the [`OggCodec`] facade tying it together
//!
//! A reference engine backed by FFmpeg lives behind the `ffmpeg` feature.

pub mod api;
pub mod bridge;
pub mod config;
pub mod config_file;
pub mod engine;
pub mod error;
pub mod gate;
pub mod scheduler;
pub mod session;
pub mod tags;
pub mod types;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(test)]
pub(crate) mod tests;

pub use api::OggCodec;
pub use config::{EncoderConfig, LoggingConfig};
pub use config_file::ConfigFile;
pub use engine::{AnalysisBuffer, AudioDecoder, Engine, EngineSession, SessionParams};
pub use error::{CodecError, Result};
#[cfg(feature = "ffmpeg")]
pub use error::FfmpegError;
pub use gate::{EngineGate, GateState};
pub use scheduler::{ChunkScheduler, EncodeReport};
pub use session::EncoderSession;
pub use tags::TagError;
pub use types::{AudioBuffer, DecodedAudio, EncodeOptions, EncodedBlob, Tag, OGG_MIME_TYPE};
