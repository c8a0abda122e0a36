//! Safe wrappers around the FFmpeg FFI calls the reference engine needs.
//!
//! All `unsafe` blocks of the engine and decoder live here with their safety
//! arguments; callers never write `unsafe` for routine access.

use ffmpeg_next as ffmpeg;
use ffmpeg_next::util::channel_layout::ChannelLayout;

/// Set VBR quality on an encoder that has not been opened yet.
///
/// `quality` is on the Vorbis scale (-0.1 ..= 1.0). FFmpeg expects it scaled
/// to `global_quality` in lambda units together with the qscale flag.
pub fn set_vbr_quality(encoder: &mut ffmpeg::codec::encoder::Audio, quality: f32) {
    let lambda = ffmpeg::ffi::FF_QP2LAMBDA as f32;
    // SAFETY: `as_mut_ptr` is valid for the lifetime of `encoder`; both fields
    // are plain integers read by `avcodec_open2`.
    unsafe {
        let ctx = encoder.as_mut_ptr();
        (*ctx).global_quality = (quality * 10.0 * lambda).round() as i32;
        (*ctx).flags |= ffmpeg::ffi::AV_CODEC_FLAG_QSCALE as i32;
    }
}

/// Ask the encoder to put its setup headers into extradata.
pub fn set_global_header(encoder: &mut ffmpeg::codec::encoder::Audio) {
    // SAFETY: same as `set_vbr_quality`.
    unsafe {
        (*encoder.as_mut_ptr()).flags |= ffmpeg::ffi::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
    }
}

/// Allocate a fresh `AVCodecParameters` and copy the opened encoder into it.
pub fn encoder_codec_parameters(
    encoder: &ffmpeg::codec::encoder::audio::Encoder,
) -> ffmpeg::codec::Parameters {
    use std::rc::Rc;
    let ctx: &ffmpeg::codec::Context = encoder;
    // SAFETY: `avcodec_parameters_from_context` copies fields out of a live,
    // opened encoder context into a newly allocated struct that `wrap` owns.
    unsafe {
        let params = ffmpeg::ffi::avcodec_parameters_alloc();
        ffmpeg::ffi::avcodec_parameters_from_context(params, ctx.as_ptr());
        ffmpeg::codec::Parameters::wrap(params, None::<Rc<dyn std::any::Any>>)
    }
}

/// Channel layout for a channel count the Vorbis encoder accepts.
pub fn channel_layout(channels: usize) -> Option<ChannelLayout> {
    match channels {
        1 => Some(ChannelLayout::MONO),
        2 => Some(ChannelLayout::STEREO),
        _ => None,
    }
}

/// Reinterpret an FLTP plane as `&[f32]`.
///
/// `None` if the plane is misaligned or shorter than `sample_count` floats.
pub fn fltp_plane_as_f32(byte_slice: &[u8], sample_count: usize) -> Option<&[f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    // SAFETY: alignment and length are checked above. FLTP planes hold
    // native-endian f32 values laid out contiguously.
    Some(unsafe { std::slice::from_raw_parts(ptr as *const f32, sample_count) })
}

/// Mutable version of [`fltp_plane_as_f32`].
pub fn fltp_plane_as_f32_mut(byte_slice: &mut [u8], sample_count: usize) -> Option<&mut [f32]> {
    let expected_bytes = sample_count.checked_mul(4)?;
    if byte_slice.len() < expected_bytes {
        return None;
    }
    let ptr = byte_slice.as_mut_ptr();
    if (ptr as usize) % std::mem::align_of::<f32>() != 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts_mut(ptr as *mut f32, sample_count) })
}

/// One data plane of a planar audio frame.
///
/// `ffmpeg-next`'s `Audio::data(index)` stops counting planes when
/// `linesize[1] == 0`, but FFmpeg only fills `linesize[0]` for planar audio.
/// This reads `extended_data` directly.
pub fn audio_plane_data(frame: &ffmpeg::util::frame::Audio, index: usize) -> &[u8] {
    // SAFETY: the plane pointer and `linesize[0]` come from a live frame and
    // describe one allocated plane; indexes past the channel count are
    // rejected first.
    unsafe {
        let f = frame.as_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;
        if !frame.format().is_planar() || index >= channels {
            return &[];
        }
        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &[];
        }
        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &[];
        }
        std::slice::from_raw_parts(plane_ptr, (*f).linesize[0] as usize)
    }
}

/// Mutable version of [`audio_plane_data`].
pub fn audio_plane_data_mut(frame: &mut ffmpeg::util::frame::Audio, index: usize) -> &mut [u8] {
    unsafe {
        let f = frame.as_mut_ptr();
        let channels = (*f).ch_layout.nb_channels as usize;
        if !frame.format().is_planar() || index >= channels {
            return &mut [];
        }
        let ptrs = (*f).extended_data;
        if ptrs.is_null() {
            return &mut [];
        }
        let plane_ptr = *ptrs.add(index);
        if plane_ptr.is_null() {
            return &mut [];
        }
        std::slice::from_raw_parts_mut(plane_ptr, (*f).linesize[0] as usize)
    }
}
