//! FFmpeg reference engine
//!
//! - [`engine`]: libvorbis sessions muxed to Ogg in memory
//! - [`decoder`]: container and file decoding to planar `f32`
//! - [`resampler`]: sample-format conversion for decoded frames
//! - [`io`]: the in-memory AVIO sink
//! - [`helpers`]: safe wrappers around raw FFI access

pub mod decoder;
pub mod engine;
pub mod helpers;
pub mod io;
pub mod resampler;

pub use decoder::{decode_file, FfmpegDecoder};
pub use engine::{is_vorbis_encoder_available, FfmpegEngine, FfmpegSession};
pub use ffmpeg_next as ffmpeg;

use crate::error::FfmpegError;

/// Initialize the FFmpeg library. Safe to call more than once.
pub fn init() -> Result<(), FfmpegError> {
    ffmpeg::init().map_err(|e| FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e)))?;
    tracing::debug!("FFmpeg initialized");
    Ok(())
}

/// Match FFmpeg's own log output to the application's log level.
///
/// FFmpeg logs straight to stderr, so it is kept quieter than the
/// application: `info` and above only show FFmpeg warnings.
pub fn set_log_level(level: &str) {
    use ffmpeg::util::log::Level;
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => Level::Debug,
        "debug" => Level::Info,
        "error" => Level::Error,
        "off" => Level::Quiet,
        _ => Level::Warning,
    };
    ffmpeg::util::log::set_level(level);
}

/// Version of the linked libavutil, as `major.minor.micro`.
pub fn version_info() -> String {
    let version = ffmpeg::util::version();
    format!(
        "libavutil {}.{}.{}",
        version >> 16,
        (version >> 8) & 0xff,
        version & 0xff
    )
}
