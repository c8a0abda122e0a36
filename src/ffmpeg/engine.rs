//! Reference engine: libvorbis into an in-memory Ogg muxer
//!
//! Each [`FfmpegSession`] owns one opened libvorbis encoder and one Ogg
//! muxer whose IO goes to a [`MemoryWriter`]. Staged samples are queued per
//! channel and cut into encoder-sized frames; every muxed byte is handed out
//! by `transfer`.

use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;

use crate::engine::{AnalysisBuffer, Engine, EngineSession, SessionParams};
use crate::error::{CodecError, FfmpegError, Result};
use crate::ffmpeg::decoder::spool;
use crate::ffmpeg::helpers::{
    audio_plane_data_mut, channel_layout, encoder_codec_parameters, fltp_plane_as_f32_mut,
    set_global_header, set_vbr_quality,
};
use crate::ffmpeg::io::{create_memory_io, flush_memory_io, free_memory_io, MemoryWriter};
use crate::ffmpeg::resampler::PLANAR_F32;
use crate::tags;
use crate::types::Tag;

/// Samples per channel accepted by one `process` call
pub const MAX_CHUNK_SAMPLES: usize = 8192;
/// FFmpeg encoder used for every session
pub const ENCODER_NAME: &str = "libvorbis";
/// Tag added to every container unless the caller sets its own `ENCODER`
pub const ENCODER_TAG_NAME: &str = "ENCODER";
pub const ENCODER_TAG_VALUE: &str = "chunked-ogg";
/// Frame size used when the encoder does not announce one
const FALLBACK_FRAME_SIZE: usize = 1024;

/// Check whether the linked FFmpeg build includes libvorbis.
pub fn is_vorbis_encoder_available() -> bool {
    ffmpeg::encoder::find_by_name(ENCODER_NAME).is_some()
}

/// FFmpeg-backed engine
#[derive(Debug)]
pub struct FfmpegEngine {
    ready: AtomicBool,
    max_chunk: usize,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            max_chunk: MAX_CHUNK_SAMPLES,
        }
    }

    /// Use a smaller staging region.
    pub fn with_max_chunk(mut self, samples: usize) -> Self {
        self.max_chunk = samples.max(1);
        self
    }
}

impl Engine for FfmpegEngine {
    fn readiness(&self) -> Option<bool> {
        Some(self.ready.load(Ordering::Acquire))
    }

    async fn initialize(&self) -> Result<()> {
        crate::ffmpeg::init()?;
        if !is_vorbis_encoder_available() {
            return Err(FfmpegError::EncoderNotFound(format!(
                "{} encoder not found in this FFmpeg build",
                ENCODER_NAME
            ))
            .into());
        }
        self.ready.store(true, Ordering::Release);
        tracing::info!(version = %crate::ffmpeg::version_info(), "FFmpeg engine ready");
        Ok(())
    }

    fn max_chunk_samples(&self) -> usize {
        self.max_chunk
    }

    fn open(
        &self,
        params: &SessionParams,
        tags: Option<&CStr>,
    ) -> Result<Option<Box<dyn EngineSession>>> {
        let session = FfmpegSession::open(params, tags, self.max_chunk)?;
        Ok(Some(Box::new(session)))
    }

    fn read_comments(&self, container: &[u8]) -> Result<Option<CString>> {
        read_comments(container)
    }
}

/// Ogg muxer writing into memory
///
/// Frees its custom IO before the output context is dropped.
struct OggMuxer {
    output: ffmpeg::format::context::Output,
    writer: Box<MemoryWriter>,
}

impl OggMuxer {
    fn new() -> Result<Self> {
        let (output, writer) = create_memory_io("ogg")?;
        Ok(Self { output, writer })
    }

    fn needs_global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER)
    }

    fn flush(&mut self) {
        flush_memory_io(&mut self.output);
    }
}

impl Drop for OggMuxer {
    fn drop(&mut self) {
        free_memory_io(&mut self.output);
    }
}

/// One libvorbis encode in progress
pub struct FfmpegSession {
    encoder: ffmpeg::codec::encoder::audio::Encoder,
    muxer: OggMuxer,
    layout: ChannelLayout,
    channel_count: usize,
    sample_rate: u32,
    frame_size: usize,
    capacity: usize,
    staging: Vec<f32>,
    pending: Vec<Vec<f32>>,
    next_pts: i64,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    transferred: Vec<u8>,
    finished: bool,
}

/// Tags for the stream metadata, with the encoder tag added when missing.
fn stream_metadata(tag_buffer: Option<&CStr>) -> ffmpeg::Dictionary<'static> {
    let mut tags = tags::deserialize(tag_buffer);
    if !tags
        .iter()
        .any(|t| t.name.eq_ignore_ascii_case(ENCODER_TAG_NAME))
    {
        tags.push(Tag::new(ENCODER_TAG_NAME, ENCODER_TAG_VALUE));
    }

    let mut metadata = ffmpeg::Dictionary::new();
    for tag in &tags {
        metadata.set(&tag.name, &tag.value);
    }
    metadata
}

impl FfmpegSession {
    pub fn open(params: &SessionParams, tags: Option<&CStr>, capacity: usize) -> Result<Self> {
        let layout = channel_layout(params.channel_count).ok_or_else(|| {
            FfmpegError::EncoderConfigure(format!(
                "{} encodes mono or stereo, got {} channels",
                ENCODER_NAME, params.channel_count
            ))
        })?;
        let rate = i32::try_from(params.sample_rate).map_err(|_| {
            FfmpegError::EncoderConfigure(format!("sample rate {} too large", params.sample_rate))
        })?;

        let codec = ffmpeg::encoder::find_by_name(ENCODER_NAME).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{} encoder not found in this FFmpeg build",
                ENCODER_NAME
            ))
        })?;

        let mut muxer = OggMuxer::new()?;

        let context = ffmpeg::codec::Context::new_with_codec(codec);
        let mut audio = context.encoder().audio().map_err(|e| {
            FfmpegError::EncoderConfigure(format!("Cannot get audio encoder handle: {}", e))
        })?;
        let encoder_time_base = ffmpeg::Rational::new(1, rate);
        audio.set_rate(rate);
        audio.set_format(PLANAR_F32);
        audio.set_channel_layout(layout);
        audio.set_time_base(encoder_time_base);
        set_vbr_quality(&mut audio, params.quality);
        if muxer.needs_global_header() {
            set_global_header(&mut audio);
        }

        let encoder = audio.open_as(codec).map_err(|e| {
            FfmpegError::EncoderConfigure(format!("Failed to open {}: {}", ENCODER_NAME, e))
        })?;
        let frame_size = match encoder.frame_size() as usize {
            0 => FALLBACK_FRAME_SIZE,
            n => n,
        };

        let stream_index = {
            let mut stream = muxer
                .output
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
                .map_err(|e| FfmpegError::MuxerCreate(format!("Failed to add stream: {}", e)))?;
            stream.set_parameters(encoder_codec_parameters(&encoder));
            stream.set_time_base(encoder_time_base);
            stream.set_metadata(stream_metadata(tags));
            stream.index()
        };

        muxer
            .output
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(e.to_string()))?;
        muxer.flush();

        // The muxer may pick its own time base while writing the header.
        let stream_time_base = muxer
            .output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        tracing::debug!(
            channels = params.channel_count,
            sample_rate = params.sample_rate,
            quality = params.quality,
            frame_size,
            header_bytes = muxer.writer.len(),
            "{} session opened",
            ENCODER_NAME
        );

        Ok(Self {
            encoder,
            muxer,
            layout,
            channel_count: params.channel_count,
            sample_rate: params.sample_rate,
            frame_size,
            capacity,
            staging: vec![0.0; params.channel_count * capacity],
            pending: vec![Vec::new(); params.channel_count],
            next_pts: 0,
            stream_index,
            encoder_time_base,
            stream_time_base,
            transferred: Vec::new(),
            finished: false,
        })
    }

    /// Encode queued samples in whole frames; with `flush` the short tail too.
    fn encode_pending(&mut self, flush: bool) -> Result<()> {
        let available = self.pending.first().map_or(0, Vec::len);
        let mut start = 0;
        while available - start >= self.frame_size || (flush && start < available) {
            let count = self.frame_size.min(available - start);
            self.encode_frame(start, count)?;
            start += count;
        }
        for queue in &mut self.pending {
            queue.drain(..start);
        }
        Ok(())
    }

    fn encode_frame(&mut self, start: usize, count: usize) -> Result<()> {
        let mut frame = ffmpeg::util::frame::Audio::new(PLANAR_F32, count, self.layout);
        frame.set_rate(self.sample_rate);
        frame.set_pts(Some(self.next_pts));

        for (index, queue) in self.pending.iter().enumerate() {
            let plane = fltp_plane_as_f32_mut(audio_plane_data_mut(&mut frame, index), count)
                .ok_or_else(|| {
                    FfmpegError::EncodeFrame(format!("frame plane {} is not planar f32", index))
                })?;
            plane.copy_from_slice(&queue[start..start + count]);
        }
        self.next_pts += count as i64;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame: {}", e)))?;
        self.write_packets()
    }

    /// Move every packet the encoder has ready into the muxer.
    fn write_packets(&mut self) -> Result<()> {
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
                    packet
                        .write_interleaved(&mut self.muxer.output)
                        .map_err(|e| FfmpegError::WritePacket(e.to_string()))?;
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    return Err(
                        FfmpegError::EncodeFrame(format!("receive_packet: {}", e)).into()
                    )
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.encode_pending(true)?;
        self.encoder
            .send_eof()
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_eof: {}", e)))?;
        self.write_packets()?;
        self.muxer
            .output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(e.to_string()))?;
        self.muxer.flush();
        self.finished = true;
        tracing::debug!(samples = self.next_pts, "{} session flushed", ENCODER_NAME);
        Ok(())
    }
}

impl EngineSession for FfmpegSession {
    fn analysis_buffer(&mut self, sample_count: usize) -> Result<AnalysisBuffer<'_>> {
        if sample_count > self.capacity {
            return Err(CodecError::Engine(format!(
                "{} samples requested, staging region holds {}",
                sample_count, self.capacity
            )));
        }
        AnalysisBuffer::planar(&mut self.staging, self.channel_count, self.capacity)
    }

    fn process(&mut self, sample_count: usize) -> Result<()> {
        if self.finished {
            return Err(CodecError::Engine("session already flushed".into()));
        }
        if sample_count == 0 {
            return self.finish();
        }
        if sample_count > self.capacity {
            return Err(CodecError::Engine(format!(
                "{} samples exceed staging capacity {}",
                sample_count, self.capacity
            )));
        }

        for (channel, queue) in self.pending.iter_mut().enumerate() {
            let base = channel * self.capacity;
            queue.extend_from_slice(&self.staging[base..base + sample_count]);
        }
        self.encode_pending(false)?;
        self.muxer.flush();
        Ok(())
    }

    fn ready_len(&self) -> usize {
        self.muxer.writer.len()
    }

    fn transfer(&mut self) -> &[u8] {
        self.transferred = self.muxer.writer.take();
        &self.transferred
    }

    fn clear(self: Box<Self>) {
        tracing::trace!(
            total_bytes = self.muxer.writer.total_written(),
            "{} session cleared",
            ENCODER_NAME
        );
    }
}

/// Pack the Vorbis comments of a container as `NAME=VALUE\t...`.
///
/// Stream comments come first, then container-level ones not already seen.
/// Entries that cannot be represented in the packed form are skipped.
pub fn read_comments(container: &[u8]) -> Result<Option<CString>> {
    let file = spool(container)?;
    let input = match ffmpeg::format::input(&file.path()) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!(error = %e, "container could not be opened for comments");
            return Ok(None);
        }
    };

    let mut found: Vec<Tag> = Vec::new();
    if let Some(stream) = input.streams().best(ffmpeg::media::Type::Audio) {
        collect_tags(&stream.metadata(), &mut found);
    }
    collect_tags(&input.metadata(), &mut found);

    Ok(tags::serialize(&found)?)
}

fn collect_tags(metadata: &ffmpeg::DictionaryRef<'_>, found: &mut Vec<Tag>) {
    for (name, value) in metadata.iter() {
        let tag = Tag::new(name, value);
        if tags::validate(&tag).is_ok() && !found.contains(&tag) {
            found.push(tag);
        }
    }
}
