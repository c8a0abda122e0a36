//! Chunked encode loop
//!
//! Drives a full in-memory buffer through one [`EncoderSession`] in slices no
//! larger than the engine's analysis ceiling, yielding to the executor
//! between slices so a long encode does not starve other tasks.

use std::ffi::CStr;

use bytes::{Bytes, BytesMut};

use crate::bridge;
use crate::engine::{Engine, SessionParams};
use crate::error::Result;
use crate::session::EncoderSession;
use crate::types::AudioBuffer;

/// Result of one scheduler run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    /// The concatenated container bytes
    pub data: Bytes,
    /// Number of non-flush `feed` calls
    pub chunks_fed: usize,
}

pub struct ChunkScheduler<'e, E: Engine> {
    engine: &'e E,
    chunk_ceiling: usize,
    yield_between_chunks: bool,
}

impl<'e, E: Engine> ChunkScheduler<'e, E> {
    pub fn new(engine: &'e E) -> Self {
        Self {
            engine,
            chunk_ceiling: engine.max_chunk_samples().max(1),
            yield_between_chunks: true,
        }
    }

    /// Lower the chunk ceiling. The engine's own ceiling always wins.
    pub fn with_chunk_ceiling(mut self, ceiling: usize) -> Self {
        self.chunk_ceiling = ceiling.clamp(1, self.engine.max_chunk_samples().max(1));
        self
    }

    pub fn with_yield(mut self, yield_between_chunks: bool) -> Self {
        self.yield_between_chunks = yield_between_chunks;
        self
    }

    pub fn chunk_ceiling(&self) -> usize {
        self.chunk_ceiling
    }

    /// Number of non-flush feeds needed for `samples` samples per channel.
    pub fn chunk_count(&self, samples: usize) -> usize {
        samples.div_ceil(self.chunk_ceiling)
    }

    /// Encode the whole buffer. The session is closed on every exit path.
    pub async fn run(
        &self,
        buffer: &AudioBuffer,
        quality: f32,
        tags: Option<&CStr>,
    ) -> Result<EncodeReport> {
        let params = SessionParams {
            channel_count: buffer.channel_count(),
            sample_rate: buffer.sample_rate(),
            quality,
        };
        let mut session = EncoderSession::open(self.engine, &params, tags)?;
        let session_id = session.id();

        let total = buffer.len();
        let channels = buffer.channels();
        let mut output = BytesMut::new();
        let mut offset = 0;
        let mut chunks_fed = 0;

        while offset < total {
            let count = self.chunk_ceiling.min(total - offset);
            {
                let mut analysis = session.analysis_buffer(count)?;
                bridge::write_chunk(&mut analysis, channels, offset, count)?;
            }
            session.feed(count)?;

            let chunk = bridge::drain(&mut session)?;
            if !chunk.is_empty() {
                output.extend_from_slice(&chunk);
            }
            offset += count;
            chunks_fed += 1;

            tracing::debug!(
                session = %session_id,
                offset,
                total,
                chunk_bytes = chunk.len(),
                "chunk fed"
            );

            if self.yield_between_chunks {
                tokio::task::yield_now().await;
            }
        }

        session.feed(0)?;
        let tail = bridge::drain(&mut session)?;
        output.extend_from_slice(&tail);
        session.close();

        tracing::debug!(
            session = %session_id,
            chunks = chunks_fed,
            bytes = output.len(),
            "flush complete"
        );

        Ok(EncodeReport {
            data: output.freeze(),
            chunks_fed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock_engine::{Call, MockDecoder, MockEngine};
    use crate::engine::AudioDecoder;

    fn ramp(channels: usize, len: usize) -> AudioBuffer {
        let data = (0..channels)
            .map(|c| {
                (0..len)
                    .map(|i| (((i + c * 7) % 200) as f32 / 100.0) - 1.0)
                    .collect()
            })
            .collect();
        AudioBuffer::new(22050, data).unwrap()
    }

    #[test]
    fn test_ceiling_is_clamped_to_engine() {
        let engine = MockEngine::new().with_max_chunk(512);
        assert_eq!(ChunkScheduler::new(&engine).chunk_ceiling(), 512);
        assert_eq!(
            ChunkScheduler::new(&engine)
                .with_chunk_ceiling(100_000)
                .chunk_ceiling(),
            512
        );
        assert_eq!(
            ChunkScheduler::new(&engine)
                .with_chunk_ceiling(0)
                .chunk_ceiling(),
            1
        );
    }

    #[test]
    fn test_chunk_count() {
        let engine = MockEngine::new().with_max_chunk(256);
        let scheduler = ChunkScheduler::new(&engine);
        assert_eq!(scheduler.chunk_count(0), 0);
        assert_eq!(scheduler.chunk_count(256), 1);
        assert_eq!(scheduler.chunk_count(257), 2);
    }

    #[tokio::test]
    async fn test_last_chunk_is_partial() {
        let engine = MockEngine::new().with_max_chunk(1000);
        let buffer = ramp(1, 2500);
        let report = ChunkScheduler::new(&engine)
            .run(&buffer, 0.5, None)
            .await
            .unwrap();

        assert_eq!(report.chunks_fed, 3);
        let feeds: Vec<_> = engine
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Process(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(feeds, vec![1000, 1000, 500, 0]);
    }

    #[tokio::test]
    async fn test_fresh_buffer_before_every_feed() {
        let engine = MockEngine::new().with_max_chunk(300);
        let buffer = ramp(2, 1000);
        ChunkScheduler::new(&engine)
            .run(&buffer, 0.5, None)
            .await
            .unwrap();

        let calls = engine.calls();
        for (i, call) in calls.iter().enumerate() {
            if let Call::Process(n) = call {
                if *n > 0 {
                    assert_eq!(calls[i - 1], Call::AnalysisBuffer(*n));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_samples_survive_relocating_buffer() {
        let engine = MockEngine::new().with_max_chunk(333);
        let buffer = ramp(2, 2000);
        let report = ChunkScheduler::new(&engine)
            .run(&buffer, 0.5, None)
            .await
            .unwrap();

        let decoded = MockDecoder.decode(&report.data).unwrap();
        assert_eq!(decoded.channel_count(), 2);
        assert_eq!(decoded.len(), 2000);
        for (original, decoded) in buffer.channels().iter().zip(decoded.channels()) {
            for (a, b) in original.iter().zip(decoded) {
                assert!((a - b).abs() < 0.01, "{} vs {}", a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_without_yield() {
        let engine = MockEngine::new().with_max_chunk(100);
        let buffer = ramp(1, 450);
        let report = ChunkScheduler::new(&engine)
            .with_yield(false)
            .run(&buffer, 0.5, None)
            .await
            .unwrap();
        assert_eq!(report.chunks_fed, 5);
        assert_eq!(engine.clears(), 1);
    }
}
