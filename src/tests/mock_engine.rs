//! Recording mock engine
//!
//! Container layout produced by the mock:
//! `MOCK` | channels (u8) | sample rate (u32 LE) | tag length (u32 LE) | tag bytes
//! | one i8 per sample, interleaved | `EOS`
//!
//! Encoded samples are held back until a full page has accumulated, so early
//! drains return nothing, like a real page-oriented encoder.

use std::ffi::{CStr, CString};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{AnalysisBuffer, AudioDecoder, Engine, EngineSession, SessionParams};
use crate::error::{CodecError, Result};
use crate::types::AudioBuffer;

pub const MAGIC: &[u8] = b"MOCK";
pub const TRAILER: &[u8] = b"EOS";
pub const PAGE_SAMPLES: usize = 1000;

/// One call into the engine, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open {
        channel_count: usize,
        sample_rate: u32,
        quality: f32,
        tags: Option<String>,
    },
    AnalysisBuffer(usize),
    Process(usize),
    Transfer(usize),
    Clear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpenBehavior {
    Normal,
    Null,
    Fail,
}

pub struct MockEngine {
    log: Arc<Mutex<Vec<Call>>>,
    init_calls: AtomicUsize,
    ready: AtomicBool,
    expose_readiness: bool,
    init_delay: usize,
    fail_init: bool,
    max_chunk: usize,
    open_behavior: OpenBehavior,
    fail_on_process: Option<usize>,
    short_transfer: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            init_calls: AtomicUsize::new(0),
            ready: AtomicBool::new(false),
            expose_readiness: true,
            init_delay: 0,
            fail_init: false,
            max_chunk: 4096,
            open_behavior: OpenBehavior::Normal,
            fail_on_process: None,
            short_transfer: false,
        }
    }

    /// Yield this many times inside `initialize`.
    pub fn with_init_delay(mut self, yields: usize) -> Self {
        self.init_delay = yields;
        self
    }

    pub fn with_max_chunk(mut self, samples: usize) -> Self {
        self.max_chunk = samples;
        self
    }

    pub fn already_ready(self) -> Self {
        self.ready.store(true, Ordering::SeqCst);
        self
    }

    pub fn without_readiness_flag(mut self) -> Self {
        self.expose_readiness = false;
        self
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn with_open(mut self, behavior: OpenBehavior) -> Self {
        self.open_behavior = behavior;
        self
    }

    /// Fail the `n`th `process` call (1-based, flush included).
    pub fn failing_process(mut self, n: usize) -> Self {
        self.fail_on_process = Some(n);
        self
    }

    pub fn with_short_transfer(mut self) -> Self {
        self.short_transfer = true;
        self
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.log.lock().iter().filter(|c| matches(c)).count()
    }

    pub fn opens(&self) -> usize {
        self.count(|c| matches!(c, Call::Open { .. }))
    }

    pub fn clears(&self) -> usize {
        self.count(|c| matches!(c, Call::Clear))
    }

    /// The `open`, `process` and `clear` calls only.
    pub fn lifecycle(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Open { .. } | Call::Process(_) | Call::Clear))
            .collect()
    }
}

impl Engine for MockEngine {
    fn readiness(&self) -> Option<bool> {
        self.expose_readiness
            .then(|| self.ready.load(Ordering::SeqCst))
    }

    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.init_delay {
            tokio::task::yield_now().await;
        }
        if self.fail_init {
            return Err(CodecError::Engine("runtime failed to start".into()));
        }
        self.ready.store(true, Ordering::SeqCst);
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
        self.log.lock().push(Call::Open {
            channel_count: params.channel_count,
            sample_rate: params.sample_rate,
            quality: params.quality,
            tags: tags.map(|t| t.to_string_lossy().into_owned()),
        });

        match self.open_behavior {
            OpenBehavior::Null => return Ok(None),
            OpenBehavior::Fail => return Err(CodecError::Engine("open failed".into())),
            OpenBehavior::Normal => {}
        }

        let tag_bytes = tags.map(CStr::to_bytes).unwrap_or_default();
        let mut ready = Vec::new();
        ready.extend_from_slice(MAGIC);
        ready.push(params.channel_count as u8);
        ready.extend_from_slice(&params.sample_rate.to_le_bytes());
        ready.extend_from_slice(&(tag_bytes.len() as u32).to_le_bytes());
        ready.extend_from_slice(tag_bytes);

        Ok(Some(Box::new(MockSession {
            log: self.log.clone(),
            channels: params.channel_count,
            capacity: self.max_chunk,
            region: vec![f32::NAN; (params.channel_count + 1) * self.max_chunk],
            offsets: Vec::new(),
            generation: 0,
            pending: Vec::new(),
            ready,
            transferred: Vec::new(),
            process_calls: 0,
            fail_on_process: self.fail_on_process,
            short_transfer: self.short_transfer,
        })))
    }

    fn read_comments(&self, container: &[u8]) -> Result<Option<CString>> {
        let Some(header) = parse_header(container) else {
            return Ok(None);
        };
        Ok(CString::new(header.tags).ok())
    }
}

struct MockSession {
    log: Arc<Mutex<Vec<Call>>>,
    channels: usize,
    capacity: usize,
    region: Vec<f32>,
    offsets: Vec<usize>,
    generation: usize,
    pending: Vec<u8>,
    ready: Vec<u8>,
    transferred: Vec<u8>,
    process_calls: usize,
    fail_on_process: Option<usize>,
    short_transfer: bool,
}

fn quantize(sample: f32) -> u8 {
    ((sample.clamp(-1.0, 1.0) * 127.0).round() as i8) as u8
}

impl EngineSession for MockSession {
    fn analysis_buffer(&mut self, sample_count: usize) -> Result<AnalysisBuffer<'_>> {
        self.log.lock().push(Call::AnalysisBuffer(sample_count));
        // Rotate the channel windows on every call so stale offsets would
        // read the wrong data.
        self.generation += 1;
        let slots = self.channels + 1;
        self.offsets = (0..self.channels)
            .map(|c| ((c + self.generation) % slots) * self.capacity)
            .collect();
        AnalysisBuffer::new(&mut self.region, self.offsets.clone(), self.capacity)
    }

    fn process(&mut self, sample_count: usize) -> Result<()> {
        self.log.lock().push(Call::Process(sample_count));
        self.process_calls += 1;
        if self.fail_on_process == Some(self.process_calls) {
            return Err(CodecError::Engine(format!(
                "process call {} failed",
                self.process_calls
            )));
        }

        if sample_count == 0 {
            self.ready.append(&mut self.pending);
            self.ready.extend_from_slice(TRAILER);
            return Ok(());
        }

        if sample_count > self.capacity {
            return Err(CodecError::Engine("chunk larger than analysis buffer".into()));
        }
        for i in 0..sample_count {
            for offset in &self.offsets {
                self.pending.push(quantize(self.region[offset + i]));
            }
        }
        // Staged samples are consumed.
        self.region.fill(f32::NAN);

        let page = PAGE_SAMPLES * self.channels;
        while self.pending.len() >= page {
            let rest = self.pending.split_off(page);
            let full = std::mem::replace(&mut self.pending, rest);
            self.ready.extend_from_slice(&full);
        }
        Ok(())
    }

    fn ready_len(&self) -> usize {
        self.ready.len()
    }

    fn transfer(&mut self) -> &[u8] {
        self.transferred = std::mem::take(&mut self.ready);
        if self.short_transfer {
            self.transferred.pop();
        }
        self.log.lock().push(Call::Transfer(self.transferred.len()));
        &self.transferred
    }

    fn clear(self: Box<Self>) {
        self.log.lock().push(Call::Clear);
    }
}

pub struct MockHeader<'a> {
    pub channels: usize,
    pub sample_rate: u32,
    pub tags: &'a [u8],
    pub body: &'a [u8],
}

pub fn parse_header(container: &[u8]) -> Option<MockHeader<'_>> {
    let rest = container.strip_prefix(MAGIC)?;
    let (&channels, rest) = rest.split_first()?;
    let sample_rate = u32::from_le_bytes(rest.get(0..4)?.try_into().ok()?);
    let tag_len = u32::from_le_bytes(rest.get(4..8)?.try_into().ok()?) as usize;
    let tags = rest.get(8..8 + tag_len)?;
    let body = rest.get(8 + tag_len..)?;
    Some(MockHeader {
        channels: channels as usize,
        sample_rate,
        tags,
        body,
    })
}

/// Decodes the mock container back into (quantized) samples
pub struct MockDecoder;

impl AudioDecoder for MockDecoder {
    fn decode(&self, container: &[u8]) -> Result<AudioBuffer> {
        let header = parse_header(container)
            .ok_or_else(|| CodecError::Decode("not a mock container".into()))?;
        let body = header
            .body
            .strip_suffix(TRAILER)
            .ok_or_else(|| CodecError::Decode("truncated mock container".into()))?;
        let samples: Vec<f32> = body.iter().map(|b| (*b as i8) as f32 / 127.0).collect();
        AudioBuffer::from_interleaved(header.sample_rate, header.channels, &samples)
    }
}
