//! Data model shared by the encoder and decoder paths

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// MIME type of every container this crate produces
pub const OGG_MIME_TYPE: &str = "audio/ogg";

/// Lowest accepted quality
pub const MIN_QUALITY: f32 = -0.1;
/// Highest accepted quality
pub const MAX_QUALITY: f32 = 1.0;
/// Quality used when the caller does not pick one
pub const DEFAULT_QUALITY: f32 = 0.5;

/// A name/value metadata pair embedded in the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Options for one encode call
///
/// Fields left out of a serialized form fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// VBR quality between -0.1 (lowest) and 1.0 (highest)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f32>,
    /// Ordered tags written into the container
    pub tags: Vec<Tag>,
}

impl EncodeOptions {
    /// The quality to encode with, falling back to [`DEFAULT_QUALITY`].
    pub fn quality(&self) -> f32 {
        self.quality.unwrap_or(DEFAULT_QUALITY)
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag::new(name, value));
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Reject qualities the engine contract does not cover.
    pub fn validate(&self) -> Result<()> {
        let quality = self.quality();
        if !quality.is_finite() || !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(CodecError::InvalidInput(format!(
                "quality {} is outside [{}, {}]",
                quality, MIN_QUALITY, MAX_QUALITY
            )));
        }
        Ok(())
    }
}

/// In-memory multi-channel audio, one `f32` array per channel
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    length: usize,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data.
    ///
    /// Requires at least one channel, a non-zero sample rate, and channels of
    /// equal length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(CodecError::InvalidInput("sample rate must be > 0".into()));
        }
        let Some(first) = channels.first() else {
            return Err(CodecError::InvalidInput(
                "audio buffer needs at least one channel".into(),
            ));
        };
        let length = first.len();
        if let Some((index, channel)) = channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != length)
        {
            return Err(CodecError::InvalidInput(format!(
                "channel {} has {} samples, expected {}",
                index,
                channel.len(),
                length
            )));
        }

        Ok(Self {
            sample_rate,
            length,
            channels,
        })
    }

    /// Build a buffer from interleaved samples (`L R L R ...`).
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Result<Self> {
        if channel_count == 0 {
            return Err(CodecError::InvalidInput(
                "audio buffer needs at least one channel".into(),
            ));
        }
        if samples.len() % channel_count != 0 {
            return Err(CodecError::InvalidInput(format!(
                "{} interleaved samples do not divide into {} channels",
                samples.len(),
                channel_count
            )));
        }

        let length = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(length); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, sample) in channels.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn duration_secs(&self) -> f64 {
        self.length as f64 / self.sample_rate as f64
    }
}

/// The complete encoded container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub mime_type: &'static str,
    pub data: Bytes,
}

impl EncodedBlob {
    pub fn ogg(data: Bytes) -> Self {
        Self {
            mime_type: OGG_MIME_TYPE,
            data,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Samples and tags recovered from a container
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub buffer: AudioBuffer,
    pub tags: Vec<Tag>,
}
