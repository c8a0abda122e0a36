//! Sample and byte marshalling between caller memory and the engine
//!
//! Samples go in through a fresh [`AnalysisBuffer`]; encoded bytes come out
//! through the session's transfer region, which is copied before returning.

use bytes::Bytes;

use crate::engine::AnalysisBuffer;
use crate::error::{CodecError, Result};
use crate::session::EncoderSession;

/// Copy `count` samples starting at `from` from every channel into its window
/// of the analysis buffer.
pub fn write_chunk(
    buffer: &mut AnalysisBuffer<'_>,
    channels: &[Vec<f32>],
    from: usize,
    count: usize,
) -> Result<()> {
    if channels.len() != buffer.channel_count() {
        return Err(CodecError::ContractViolation(format!(
            "analysis buffer has {} channels, input has {}",
            buffer.channel_count(),
            channels.len()
        )));
    }
    if count > buffer.capacity() {
        return Err(CodecError::ContractViolation(format!(
            "chunk of {} samples exceeds analysis buffer capacity {}",
            count,
            buffer.capacity()
        )));
    }

    let end = from
        .checked_add(count)
        .ok_or_else(|| CodecError::InvalidInput("chunk range overflows".into()))?;

    for (index, samples) in channels.iter().enumerate() {
        let source = samples.get(from..end).ok_or_else(|| {
            CodecError::InvalidInput(format!(
                "chunk {}..{} is outside channel {} of {} samples",
                from,
                end,
                index,
                samples.len()
            ))
        })?;
        let window = buffer.channel_mut(index).ok_or_else(|| {
            CodecError::ContractViolation(format!("analysis buffer lost channel {}", index))
        })?;
        window[..count].copy_from_slice(source);
    }
    Ok(())
}

/// Copy out whatever the engine has ready. An empty result means "nothing
/// yet", not an error.
pub fn drain(session: &mut EncoderSession) -> Result<Bytes> {
    let len = session.ready_len();
    if len == 0 {
        return Ok(Bytes::new());
    }

    let transferred = session.transfer();
    if transferred.len() < len {
        return Err(CodecError::ContractViolation(format!(
            "engine announced {} bytes but transferred {}",
            len,
            transferred.len()
        )));
    }
    Ok(Bytes::copy_from_slice(&transferred[..len]))
}
