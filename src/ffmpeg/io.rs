//! In-memory AVIO sink for the Ogg muxer
//!
//! The muxer writes pages through a custom `AVIOContext` into a
//! [`MemoryWriter`]. The writer is append-only: the context is created without
//! a seek callback, which the Ogg muxer never needs.
//!
//! `MemoryWriter` is not thread-safe. Each one belongs to exactly one session
//! and is only touched from inside that session's calls.

use ffmpeg_next as ffmpeg;
use std::ffi::{c_void, CString};
use std::io::Write;
use std::ptr;

use crate::error::FfmpegError;

const AVIO_BUFFER_SIZE: usize = 4096;

/// Append-only byte sink
pub struct MemoryWriter {
    buffer: Vec<u8>,
    total: u64,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(AVIO_BUFFER_SIZE),
            total: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Hand out everything written since the previous call.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Bytes written over the writer's lifetime
    pub fn total_written(&self) -> u64 {
        self.total
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.total += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Default for MemoryWriter {
    fn default() -> Self {
        Self::new()
    }
}

unsafe extern "C" fn write_packet(opaque: *mut c_void, buf: *const u8, buf_size: i32) -> i32 {
    if buf_size < 0 {
        return -1;
    }
    let writer = &mut *(opaque as *mut MemoryWriter);
    let slice = std::slice::from_raw_parts(buf, buf_size as usize);
    match writer.write(slice) {
        Ok(n) => n as i32,
        Err(_) => -1,
    }
}

/// Create an output context for `format_name` whose IO goes to a fresh
/// [`MemoryWriter`].
///
/// The writer must outlive the context, and the context must be released with
/// [`free_memory_io`] before it is dropped.
pub fn create_memory_io(
    format_name: &str,
) -> Result<(ffmpeg::format::context::Output, Box<MemoryWriter>), FfmpegError> {
    let format = CString::new(format_name)
        .map_err(|_| FfmpegError::MuxerCreate(format!("bad format name {:?}", format_name)))?;
    let filename = CString::new(format!("memory.{}", format_name))
        .map_err(|_| FfmpegError::MuxerCreate(format!("bad format name {:?}", format_name)))?;

    unsafe {
        let writer_ptr = Box::into_raw(Box::new(MemoryWriter::new()));

        let buffer = ffmpeg::ffi::av_malloc(AVIO_BUFFER_SIZE) as *mut u8;
        if buffer.is_null() {
            drop(Box::from_raw(writer_ptr));
            return Err(FfmpegError::InitFailed(
                "Failed to allocate AVIO buffer".to_string(),
            ));
        }

        let mut avio_ctx = ffmpeg::ffi::avio_alloc_context(
            buffer,
            AVIO_BUFFER_SIZE as i32,
            1,
            writer_ptr as *mut c_void,
            None,
            Some(write_packet),
            None,
        );
        if avio_ctx.is_null() {
            ffmpeg::ffi::av_free(buffer as *mut c_void);
            drop(Box::from_raw(writer_ptr));
            return Err(FfmpegError::InitFailed(
                "Failed to allocate AVIO context".to_string(),
            ));
        }

        let mut output_ptr: *mut ffmpeg::ffi::AVFormatContext = ptr::null_mut();
        let ret = ffmpeg::ffi::avformat_alloc_output_context2(
            &mut output_ptr,
            ptr::null_mut(),
            format.as_ptr(),
            filename.as_ptr(),
        );
        if ret < 0 || output_ptr.is_null() {
            // The AVIO buffer may have been replaced, so free whatever it holds now.
            ffmpeg::ffi::av_freep(&mut (*avio_ctx).buffer as *mut *mut u8 as *mut c_void);
            ffmpeg::ffi::avio_context_free(&mut avio_ctx);
            drop(Box::from_raw(writer_ptr));
            return Err(FfmpegError::MuxerCreate(format!(
                "Failed to create {} output context",
                format_name
            )));
        }

        (*output_ptr).pb = avio_ctx;
        (*output_ptr).flags |= ffmpeg::ffi::AVFMT_FLAG_CUSTOM_IO as i32;

        let output = ffmpeg::format::context::Output::wrap(output_ptr);
        Ok((output, Box::from_raw(writer_ptr)))
    }
}

/// Push whatever the AVIO layer is still buffering into the writer.
pub fn flush_memory_io(output: &mut ffmpeg::format::context::Output) {
    // SAFETY: `pb` is either null or the context installed by
    // `create_memory_io`, which stays valid until `free_memory_io`.
    unsafe {
        let ctx = output.as_mut_ptr();
        if !ctx.is_null() && !(*ctx).pb.is_null() {
            ffmpeg::ffi::avio_flush((*ctx).pb);
        }
    }
}

/// Detach and free the custom AVIO context of `output`.
///
/// After this the output no longer references the writer, so dropping it
/// cannot touch freed memory or close a context it does not own.
pub fn free_memory_io(output: &mut ffmpeg::format::context::Output) {
    // SAFETY: `pb` was allocated by `avio_alloc_context` in
    // `create_memory_io`; it is nulled before freeing so it is freed once.
    unsafe {
        let ctx = output.as_mut_ptr();
        if ctx.is_null() || (*ctx).pb.is_null() {
            return;
        }
        let mut pb = (*ctx).pb;
        (*ctx).pb = ptr::null_mut();
        ffmpeg::ffi::av_freep(&mut (*pb).buffer as *mut *mut u8 as *mut c_void);
        ffmpeg::ffi::avio_context_free(&mut pb);
    }
}
