//! Sample-format conversion for decoded audio
//!
//! Decoders hand out whatever layout their codec uses (packed s16, planar
//! float, ...). `AudioResampler` turns every frame into planar `f32`, keeping
//! the source rate and optionally folding down to fewer channels.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::software::resampling;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use crate::error::{FfmpegError, Result};

/// Sample format of every frame the resampler produces
pub const PLANAR_F32: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);

/// Wraps FFmpeg's `SwrContext`
pub struct AudioResampler {
    context: resampling::Context,
    output_rate: u32,
    output_channels: usize,
}

/// The layout of a frame, guessed from its channel count when unset.
pub fn frame_layout(frame: &ffmpeg::util::frame::Audio) -> ChannelLayout {
    if frame.channel_layout().bits() != 0 {
        return frame.channel_layout();
    }
    match frame.channels() {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        n => ChannelLayout::default(n as i32),
    }
}

impl AudioResampler {
    /// Build a resampler for frames shaped like `src_frame`.
    ///
    /// With `max_channels` set, sources with more channels are downmixed to
    /// stereo (or mono when the limit is 1).
    pub fn new(src_frame: &ffmpeg::util::frame::Audio, max_channels: Option<usize>) -> Result<Self> {
        let src_layout = frame_layout(src_frame);
        let src_channels = src_frame.channels() as usize;

        let (output_layout, output_channels) = match max_channels {
            Some(1) if src_channels > 1 => (ChannelLayout::MONO, 1),
            Some(limit) if src_channels > limit => (ChannelLayout::STEREO, 2),
            _ => (src_layout, src_channels),
        };

        let context = resampling::Context::get(
            src_frame.format(),
            src_layout,
            src_frame.rate(),
            PLANAR_F32,
            output_layout,
            src_frame.rate(),
        )
        .map_err(|e| {
            FfmpegError::ResamplerCreate(format!("Failed to create resampling context: {}", e))
        })?;

        Ok(Self {
            context,
            output_rate: src_frame.rate(),
            output_channels,
        })
    }

    /// Convert one decoded frame. `None` when the resampler is still
    /// buffering.
    pub fn convert(
        &mut self,
        frame: &ffmpeg::util::frame::Audio,
    ) -> Result<Option<ffmpeg::util::frame::Audio>> {
        // The output frame must start empty; swr allocates it from the
        // context configuration.
        let mut out = ffmpeg::util::frame::Audio::empty();
        self.context
            .run(frame, &mut out)
            .map_err(|e| FfmpegError::ReadFrame(format!("Resampling error: {}", e)))?;

        Ok((out.samples() > 0).then_some(out))
    }

    /// Drain samples the resampler still holds.
    ///
    /// A passthrough context has nothing buffered and reports an error on
    /// flush, which is treated as "nothing left".
    pub fn flush(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut out = ffmpeg::util::frame::Audio::empty();
        if let Err(e) = self.context.flush(&mut out) {
            tracing::debug!("Resampler flush returned non-fatal error: {}", e);
            return Ok(None);
        }
        Ok((out.samples() > 0).then_some(out))
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }
}
