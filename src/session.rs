//! One open engine session
//!
//! `EncoderSession` binds a single engine handle to the feed/drain protocol.
//! The handle is released exactly once: by [`EncoderSession::close`] on the
//! normal path, or by `Drop` when the owning scope unwinds through an error,
//! a panic, or a cancelled future.

use std::ffi::CStr;

use uuid::Uuid;

use crate::engine::{AnalysisBuffer, Engine, EngineSession, SessionParams};
use crate::error::{CodecError, Result};

pub struct EncoderSession {
    id: Uuid,
    inner: Option<Box<dyn EngineSession>>,
    samples_fed: usize,
}

impl EncoderSession {
    /// Open a session. A null handle from the engine is a contract violation.
    pub fn open<E: Engine + ?Sized>(
        engine: &E,
        params: &SessionParams,
        tags: Option<&CStr>,
    ) -> Result<Self> {
        let inner = engine.open(params, tags)?.ok_or_else(|| {
            CodecError::ContractViolation(format!(
                "engine returned a null session for {} channel(s) at {} Hz",
                params.channel_count, params.sample_rate
            ))
        })?;

        let id = Uuid::new_v4();
        tracing::debug!(
            session = %id,
            channels = params.channel_count,
            sample_rate = params.sample_rate,
            quality = params.quality,
            "encoder session opened"
        );

        Ok(Self {
            id,
            inner: Some(inner),
            samples_fed: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Samples per channel fed so far
    pub fn samples_fed(&self) -> usize {
        self.samples_fed
    }

    fn inner(&self) -> Result<&dyn EngineSession> {
        self.inner
            .as_deref()
            .ok_or_else(|| CodecError::ContractViolation("session already closed".into()))
    }

    fn inner_mut(&mut self) -> Result<&mut (dyn EngineSession + 'static)> {
        self.inner
            .as_deref_mut()
            .ok_or_else(|| CodecError::ContractViolation("session already closed".into()))
    }

    /// A fresh staging buffer for the next chunk.
    pub fn analysis_buffer(&mut self, sample_count: usize) -> Result<AnalysisBuffer<'_>> {
        self.inner_mut()?.analysis_buffer(sample_count)
    }

    /// Tell the engine to consume `sample_count` staged samples. Zero flushes.
    pub fn feed(&mut self, sample_count: usize) -> Result<()> {
        self.inner_mut()?.process(sample_count)?;
        self.samples_fed += sample_count;
        Ok(())
    }

    pub fn ready_len(&self) -> usize {
        self.inner().map(|s| s.ready_len()).unwrap_or(0)
    }

    pub fn transfer(&mut self) -> &[u8] {
        match self.inner.as_deref_mut() {
            Some(session) => session.transfer(),
            None => &[],
        }
    }

    /// Release the engine session.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.clear();
            tracing::debug!(session = %self.id, samples = self.samples_fed, "encoder session closed");
        }
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock_engine::{Call, MockEngine, OpenBehavior};

    fn params() -> SessionParams {
        SessionParams {
            channel_count: 2,
            sample_rate: 44100,
            quality: 0.3,
        }
    }

    #[test]
    fn test_close_runs_once() {
        let engine = MockEngine::new();
        let session = EncoderSession::open(&engine, &params(), None).unwrap();
        session.close();
        assert_eq!(engine.clears(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let engine = MockEngine::new();
        {
            let _session = EncoderSession::open(&engine, &params(), None).unwrap();
        }
        assert_eq!(engine.clears(), 1);
    }

    #[test]
    fn test_null_session_is_contract_violation() {
        let engine = MockEngine::new().with_open(OpenBehavior::Null);
        let err = EncoderSession::open(&engine, &params(), None)
            .err()
            .unwrap();
        assert!(err.is_contract_violation());
        assert_eq!(engine.clears(), 0);
    }

    #[test]
    fn test_open_failure_never_clears() {
        let engine = MockEngine::new().with_open(OpenBehavior::Fail);
        assert!(EncoderSession::open(&engine, &params(), None).is_err());
        assert_eq!(engine.opens(), 1);
        assert_eq!(engine.clears(), 0);
    }

    #[test]
    fn test_open_passes_params_and_tags() {
        let engine = MockEngine::new();
        let tags = std::ffi::CString::new("TITLE=Song").unwrap();
        EncoderSession::open(&engine, &params(), Some(&tags))
            .unwrap()
            .close();
        assert_eq!(
            engine.calls()[0],
            Call::Open {
                channel_count: 2,
                sample_rate: 44100,
                quality: 0.3,
                tags: Some("TITLE=Song".into()),
            }
        );
    }

    #[test]
    fn test_feed_error_still_releases() {
        let engine = MockEngine::new().failing_process(1);
        let result = (|| -> Result<()> {
            let mut session = EncoderSession::open(&engine, &params(), None)?;
            session.feed(0)?;
            session.close();
            Ok(())
        })();
        assert!(result.is_err());
        assert_eq!(engine.clears(), 1);
    }

    #[test]
    fn test_samples_fed() {
        let engine = MockEngine::new();
        let mut session = EncoderSession::open(&engine, &params(), None).unwrap();
        session.analysis_buffer(10).unwrap();
        session.feed(10).unwrap();
        session.feed(0).unwrap();
        assert_eq!(session.samples_fed(), 10);
        session.close();
    }
}
