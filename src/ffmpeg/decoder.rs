//! Container decoding through FFmpeg
//!
//! [`FfmpegDecoder`] is the host decode service: it turns an encoded
//! container (or any FFmpeg-readable file) back into planar `f32` samples.

use std::io::Write;
use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::engine::AudioDecoder;
use crate::error::{CodecError, FfmpegError, Result};
use crate::ffmpeg::helpers::{audio_plane_data, fltp_plane_as_f32};
use crate::ffmpeg::resampler::AudioResampler;
use crate::types::AudioBuffer;

/// Packet-level decoder for one audio stream
struct StreamDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl StreamDecoder {
    fn open(stream: &ffmpeg::format::stream::Stream) -> Result<Self> {
        let stream_index = stream.index();
        let context =
            ffmpeg::codec::Context::from_parameters(stream.parameters()).map_err(|e| {
                FfmpegError::DecoderCreate(format!(
                    "Failed to create codec context for stream {}: {}",
                    stream_index, e
                ))
            })?;
        let decoder = context.decoder().audio().map_err(|e| {
            FfmpegError::DecoderNotFound(format!(
                "Failed to open audio decoder for stream {}: {}",
                stream_index, e
            ))
        })?;
        Ok(Self {
            decoder,
            stream_index,
        })
    }

    fn send_packet(&mut self, packet: &ffmpeg::codec::packet::Packet) -> Result<()> {
        match self.decoder.send_packet(packet) {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::InvalidData) => {
                tracing::debug!(
                    stream_index = self.stream_index,
                    "skipping undecodable packet"
                );
                Ok(())
            }
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_packet error on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) => Ok(()),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(()),
            Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(FfmpegError::DecodePacket(format!(
                "send_eof error on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }

    fn receive_frame(&mut self) -> Result<Option<ffmpeg::util::frame::Audio>> {
        let mut frame = ffmpeg::util::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(FfmpegError::ReadFrame(format!(
                "receive_frame error on stream {}: {}",
                self.stream_index, e
            ))
            .into()),
        }
    }
}

/// Accumulates resampled planar frames into per-channel sample vectors
struct PlanarSink {
    resampler: Option<AudioResampler>,
    max_channels: Option<usize>,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PlanarSink {
    fn new(max_channels: Option<usize>) -> Self {
        Self {
            resampler: None,
            max_channels,
            channels: Vec::new(),
            sample_rate: 0,
        }
    }

    fn push(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<()> {
        if self.resampler.is_none() {
            tracing::debug!(
                sample_rate = frame.rate(),
                channels = frame.channels(),
                format = ?frame.format(),
                "creating resampler from first frame"
            );
            let resampler = AudioResampler::new(frame, self.max_channels)?;
            self.sample_rate = resampler.output_rate();
            self.channels = vec![Vec::new(); resampler.output_channels()];
            self.resampler = Some(resampler);
        }

        let converted = self
            .resampler
            .as_mut()
            .map(|r| r.convert(frame))
            .transpose()?
            .flatten();
        if let Some(out) = converted {
            self.append(&out)?;
        }
        Ok(())
    }

    fn append(&mut self, frame: &ffmpeg::util::frame::Audio) -> Result<()> {
        let samples = frame.samples();
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let plane = fltp_plane_as_f32(audio_plane_data(frame, index), samples)
                .ok_or_else(|| {
                    FfmpegError::ReadFrame(format!("channel {} plane is not planar f32", index))
                })?;
            channel.extend_from_slice(plane);
        }
        Ok(())
    }

    fn finish(mut self) -> Result<AudioBuffer> {
        let Some(mut resampler) = self.resampler.take() else {
            return Err(CodecError::Decode("no audio frames decoded".into()));
        };
        if let Some(out) = resampler.flush()? {
            self.append(&out)?;
        }
        AudioBuffer::new(self.sample_rate, self.channels)
    }
}

/// Decode the best audio stream of a file into planar `f32`.
///
/// With `max_channels` set, sources with more channels are downmixed.
pub fn decode_file<P: AsRef<Path>>(path: P, max_channels: Option<usize>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let mut input = ffmpeg::format::input(&path)
        .map_err(|e| FfmpegError::OpenInput(format!("Failed to open {:?}: {}", path, e)))?;

    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .ok_or_else(|| CodecError::Decode(format!("{:?} has no audio stream", path)))?;
    let stream_index = stream.index();
    let mut decoder = StreamDecoder::open(&stream)?;

    let mut sink = PlanarSink::new(max_channels);
    for (stream, packet) in input.packets() {
        if stream.index() != stream_index {
            continue;
        }
        decoder.send_packet(&packet)?;
        while let Some(frame) = decoder.receive_frame()? {
            sink.push(&frame)?;
        }
    }

    decoder.send_eof()?;
    while let Some(frame) = decoder.receive_frame()? {
        sink.push(&frame)?;
    }

    let buffer = sink.finish()?;
    tracing::debug!(
        path = ?path,
        channels = buffer.channel_count(),
        sample_rate = buffer.sample_rate(),
        samples = buffer.len(),
        "file decoded"
    );
    Ok(buffer)
}

/// Write `container` to a temporary file so FFmpeg can probe and seek it.
pub(crate) fn spool(container: &[u8]) -> Result<tempfile::NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("chunked-ogg-")
        .suffix(".ogg")
        .tempfile()?;
    file.write_all(container)?;
    file.flush()?;
    Ok(file)
}

/// Host decode service backed by FFmpeg
#[derive(Debug, Clone, Default)]
pub struct FfmpegDecoder {
    max_channels: Option<usize>,
}

impl FfmpegDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Downmix sources with more than `max_channels` channels.
    pub fn with_channel_limit(mut self, max_channels: usize) -> Self {
        self.max_channels = Some(max_channels.max(1));
        self
    }
}

impl AudioDecoder for FfmpegDecoder {
    fn decode(&self, container: &[u8]) -> Result<AudioBuffer> {
        let file = spool(container)?;
        decode_file(file.path(), self.max_channels).map_err(|e| match e {
            CodecError::Ffmpeg(inner) => CodecError::Decode(inner.to_string()),
            other => other,
        })
    }
}
