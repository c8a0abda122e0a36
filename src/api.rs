//! Public encode/decode entry points

use std::sync::Arc;

use crate::config::EncoderConfig;
use crate::engine::{AudioDecoder, Engine};
use crate::error::{CodecError, Result};
use crate::gate::EngineGate;
use crate::scheduler::ChunkScheduler;
use crate::tags;
use crate::types::{AudioBuffer, DecodedAudio, EncodeOptions, EncodedBlob, Tag};

/// Encoder/decoder facade over one engine
pub struct OggCodec<E: Engine> {
    engine: Arc<E>,
    gate: Arc<EngineGate>,
    config: EncoderConfig,
}

impl<E: Engine> OggCodec<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_gate(engine, Arc::new(EngineGate::new()))
    }

    /// Share a readiness gate with other codecs over the same engine.
    pub fn with_gate(engine: Arc<E>, gate: Arc<EngineGate>) -> Self {
        Self {
            engine,
            gate,
            config: EncoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn gate(&self) -> &Arc<EngineGate> {
        &self.gate
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Options with the configured defaults applied: an unset quality takes
    /// the configured one, and configured tags come first.
    pub fn resolve_options(&self, options: &EncodeOptions) -> EncodeOptions {
        let quality = Some(options.quality.unwrap_or(self.config.default_quality));
        let tags = self
            .config
            .default_tags
            .iter()
            .chain(&options.tags)
            .cloned()
            .collect();
        EncodeOptions { quality, tags }
    }

    /// Encode a whole buffer into an Ogg container.
    ///
    /// Options and tags are validated before the engine is touched. On any
    /// failure no partial output is returned.
    pub async fn encode(&self, buffer: &AudioBuffer, options: &EncodeOptions) -> Result<EncodedBlob> {
        let options = self.resolve_options(options);
        options.validate()?;
        let tag_buffer = tags::serialize(&options.tags)?;

        self.gate.wait(self.engine.as_ref()).await?;

        let mut scheduler = ChunkScheduler::new(self.engine.as_ref())
            .with_yield(self.config.yield_between_chunks);
        if let Some(ceiling) = self.config.chunk_ceiling {
            scheduler = scheduler.with_chunk_ceiling(ceiling);
        }

        tracing::info!(
            channels = buffer.channel_count(),
            sample_rate = buffer.sample_rate(),
            samples = buffer.len(),
            quality = options.quality(),
            tags = options.tags.len(),
            chunk_ceiling = scheduler.chunk_ceiling(),
            "encoding audio buffer"
        );

        let report = scheduler
            .run(buffer, options.quality(), tag_buffer.as_deref())
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "encode failed");
                e
            })?;

        tracing::info!(
            chunks = report.chunks_fed,
            bytes = report.data.len(),
            "encode complete"
        );
        Ok(EncodedBlob::ogg(report.data))
    }

    /// Decode a container into samples through the host decode service.
    pub async fn decode<D: AudioDecoder>(&self, container: &[u8], decoder: &D) -> Result<AudioBuffer> {
        if container.is_empty() {
            return Err(CodecError::InvalidInput("container is empty".into()));
        }
        self.gate.wait(self.engine.as_ref()).await?;

        let buffer = decoder.decode(container)?;
        tracing::debug!(
            bytes = container.len(),
            channels = buffer.channel_count(),
            samples = buffer.len(),
            "container decoded"
        );
        Ok(buffer)
    }

    /// Read the tags of a container without decoding its audio.
    ///
    /// A container whose comments cannot be found yields no tags.
    pub async fn decode_tags(&self, container: &[u8]) -> Result<Vec<Tag>> {
        self.gate.wait(self.engine.as_ref()).await?;

        let packed = self.engine.read_comments(container)?;
        if packed.is_none() {
            tracing::debug!(bytes = container.len(), "no comments found in container");
        }
        Ok(tags::deserialize(packed.as_deref()))
    }

    /// Decode samples and tags together.
    pub async fn decode_with_tags<D: AudioDecoder>(
        &self,
        container: &[u8],
        decoder: &D,
    ) -> Result<DecodedAudio> {
        let buffer = self.decode(container, decoder).await?;
        let tags = self.decode_tags(container).await?;
        Ok(DecodedAudio { buffer, tags })
    }
}
