//! Capability interface of the external codec engine
//!
//! The engine is a handle-based, non-reentrant codec. This crate only ever
//! talks to it through these traits:
//! - [`Engine`]: one-time initialization, session factory, comment reader
//! - [`EngineSession`]: one in-progress encode (analysis buffer, process,
//!   ready length, transfer, clear)
//! - [`AudioDecoder`]: the host service that turns a container back into samples

use std::ffi::{CStr, CString};
use std::future::Future;

use crate::error::{CodecError, Result};
use crate::types::AudioBuffer;

/// Parameters the engine needs to open a session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionParams {
    pub channel_count: usize,
    pub sample_rate: u32,
    pub quality: f32,
}

/// The external codec engine
pub trait Engine: Send + Sync {
    /// The engine's readiness flag.
    ///
    /// `None` means the engine never exposes the flag at all, which is a
    /// broken build rather than a pending initialization.
    fn readiness(&self) -> Option<bool>;

    /// Bring the engine runtime up. Called at most once per successful gate.
    fn initialize(&self) -> impl Future<Output = Result<()>> + Send;

    /// Largest number of samples per channel one `process` call accepts.
    fn max_chunk_samples(&self) -> usize;

    /// Open an encode session. `Ok(None)` is the engine's null handle.
    fn open(
        &self,
        params: &SessionParams,
        tags: Option<&CStr>,
    ) -> Result<Option<Box<dyn EngineSession>>>;

    /// Read the packed comment buffer from a container's metadata section
    /// without decoding audio. `Ok(None)` when no comments could be found.
    fn read_comments(&self, container: &[u8]) -> Result<Option<CString>>;
}

/// One open, stateful engine session
pub trait EngineSession: Send {
    /// The staging region for the next `process` call.
    fn analysis_buffer(&mut self, sample_count: usize) -> Result<AnalysisBuffer<'_>>;

    /// Consume `sample_count` staged samples per channel. Zero flushes.
    fn process(&mut self, sample_count: usize) -> Result<()>;

    /// Number of encoded bytes ready to transfer.
    fn ready_len(&self) -> usize;

    /// Hand out the ready bytes. The slice is only valid until the next call
    /// into the session.
    fn transfer(&mut self) -> &[u8];

    /// Release every engine-side resource of the session.
    fn clear(self: Box<Self>);
}

/// Host audio-decoding service
pub trait AudioDecoder {
    fn decode(&self, container: &[u8]) -> Result<AudioBuffer>;
}

/// Mutable view of an engine's staging region
///
/// Channel `i` occupies `region[offsets[i]..offsets[i] + capacity]`. The
/// view borrows its session mutably, so it cannot be kept across a
/// `process` call; it must be obtained again for every chunk, and offsets
/// may move between calls.
#[derive(Debug)]
pub struct AnalysisBuffer<'a> {
    region: &'a mut [f32],
    offsets: Vec<usize>,
    capacity: usize,
}

impl<'a> AnalysisBuffer<'a> {
    /// Describe a staging region. Fails if any channel window falls outside
    /// the region.
    pub fn new(region: &'a mut [f32], offsets: Vec<usize>, capacity: usize) -> Result<Self> {
        for (channel, offset) in offsets.iter().enumerate() {
            let end = offset.checked_add(capacity).ok_or_else(|| {
                CodecError::ContractViolation(format!("channel {} window overflows", channel))
            })?;
            if end > region.len() {
                return Err(CodecError::ContractViolation(format!(
                    "channel {} window {}..{} exceeds staging region of {} samples",
                    channel,
                    offset,
                    end,
                    region.len()
                )));
            }
        }
        Ok(Self {
            region,
            offsets,
            capacity,
        })
    }

    /// Contiguous planar layout: channel `i` starts at `i * capacity`.
    pub fn planar(region: &'a mut [f32], channel_count: usize, capacity: usize) -> Result<Self> {
        let offsets = (0..channel_count).map(|c| c * capacity).collect();
        Self::new(region, offsets, capacity)
    }

    pub fn channel_count(&self) -> usize {
        self.offsets.len()
    }

    /// Samples per channel the buffer can hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_offset(&self, channel: usize) -> Option<usize> {
        self.offsets.get(channel).copied()
    }

    /// The window for one channel.
    pub fn channel_mut(&mut self, channel: usize) -> Option<&mut [f32]> {
        let base = *self.offsets.get(channel)?;
        self.region.get_mut(base..base + self.capacity)
    }
}
