//! Decoder core for Propellerhead ReCycle REX2 (`.rx2`) files and their
//! `.rexwav` sidecar format.
//!
//! [`parse`] walks a REX2 file's IFF chunk tree, decodes its `SDAT` payload
//! with the DWOP codec, and assembles a [`RexFile`] with slice boundaries
//! resolved against the decoded PCM. [`parse_rexwav`] reads the simpler,
//! already-decoded REXWAV sidecar format produced by offline SDK tooling.
//!
//! Encoding, streaming/resumable decode, and seekable random access are out
//! of scope; see `dwop`/`dwvw`/`iff`/`rexwav` for the individual pieces.

extern crate byteorder;

mod bitreader;
mod dwop;
mod dwvw;
mod error;
mod iff;
mod rexwav;

pub use bitreader::BitReader;
pub use dwop::DwopDecoder;
pub use dwvw::DwvwDecoder;
pub use error::RexError;

use log::warn;

/// Hard cap on decoded frames per file (~3.8 minutes at 44.1kHz stereo),
/// matching the original decoder's sanity bound.
const MAX_SAMPLES: usize = 10_000_000;

/// Per-file slice-table cap; also enforced while walking `SLCE` chunks.
pub(crate) const MAX_SLICES: usize = 256;

/// One playable slice: an offset and length in decoded samples (frames),
/// relative to the start of the file's PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RexSlice {
    pub sample_offset: u32,
    pub sample_length: u32,
}

/// A fully parsed and decoded REX2 or REXWAV file.
#[derive(Debug, Clone, PartialEq)]
pub struct RexFile {
    pub tempo_bpm: f32,
    pub bars: u16,
    pub beats: u8,
    pub time_sig_num: u8,
    pub time_sig_den: u8,

    pub sample_rate: u32,
    pub channels: u8,
    pub bytes_per_sample: u8,

    /// Declared total sample length from `SINF` (0 for REXWAV-unused field).
    pub total_sample_length: u32,

    pub slices: Vec<RexSlice>,

    /// Interleaved 16-bit PCM, `channels` samples per frame.
    pub pcm: Vec<i16>,
}

impl RexFile {
    /// Number of decoded frames (`pcm.len() / channels`).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.pcm.len() / self.channels as usize
        }
    }
}

fn tag_at(data: &[u8], offset: usize, tag: &[u8; 4]) -> bool {
    data.get(offset..offset + 4).map_or(false, |t| t == tag)
}

/// Recomputes each slice's length from the gap to the next slice's offset,
/// with the final slice extending to the end of the decoded audio. Used as
/// a fallback when the lengths read directly from `SLCE` chunks look
/// degenerate; see `parse`.
fn compute_slice_lengths(slices: &mut [RexSlice], total_sample_length: u32, pcm_frames: usize) {
    let n = slices.len();
    for i in 0..n {
        if i + 1 < n {
            let next_off = slices[i + 1].sample_offset;
            let this_off = slices[i].sample_offset;
            if next_off > this_off {
                slices[i].sample_length = next_off - this_off;
            }
        } else if total_sample_length > slices[i].sample_offset {
            slices[i].sample_length = total_sample_length - slices[i].sample_offset;
        } else if pcm_frames as u32 > slices[i].sample_offset {
            slices[i].sample_length = pcm_frames as u32 - slices[i].sample_offset;
        }
    }
}

/// Clamps every slice to `pcm_frames`, zeroing the length of any slice that
/// starts past the end of the decoded audio entirely.
fn clamp_slices(slices: &mut [RexSlice], pcm_frames: usize) {
    let pcm_frames = pcm_frames as u32;
    for s in slices.iter_mut() {
        if s.sample_offset.saturating_add(s.sample_length) > pcm_frames {
            if s.sample_offset >= pcm_frames {
                s.sample_length = 0;
            } else {
                s.sample_length = pcm_frames - s.sample_offset;
            }
        }
    }
}

/// Parses a REX2 (`.rx2`/`.rex`) file from an in-memory buffer: walks its
/// IFF chunk tree, decodes the `SDAT` payload with DWOP, and resolves slice
/// boundaries against the decoded audio.
///
/// Only DWOP is ever used to decode `SDAT`, for mono or stereo depending on
/// the declared channel count (see `dwop::decode_mono`/`decode_stereo`).
/// DWVW remains available as [`DwvwDecoder`] for callers who already know a
/// particular payload predates DWOP; `parse` never selects it automatically
/// since REX2 files carry no marker distinguishing the two codecs.
pub fn parse(data: &[u8]) -> Result<RexFile, RexError> {
    if data.len() < 12 {
        return Err(RexError::TooSmall { len: data.len(), minimum: 12 });
    }
    if !tag_at(data, 0, b"CAT ") {
        return Err(RexError::NotContainer);
    }

    let meta = iff::walk(data);

    let sdat = meta.sdat.ok_or(RexError::NoAudioData)?;
    if sdat.is_empty() {
        return Err(RexError::EmptyPayload);
    }

    let mut max_frames = if meta.total_sample_length > 0 {
        meta.total_sample_length as usize
    } else {
        sdat.len() * 2 + 1024
    };
    if max_frames > MAX_SAMPLES {
        warn!("clamping decode budget from {} to {} frames", max_frames, MAX_SAMPLES);
        max_frames = MAX_SAMPLES;
    }

    let (pcm, frames_decoded) = if meta.channels == 2 {
        let mut pcm = vec![0i16; max_frames * 2];
        let n = dwop::decode_stereo(sdat, &mut pcm, max_frames);
        pcm.truncate(n * 2);
        (pcm, n)
    } else {
        let mut pcm = vec![0i16; max_frames];
        let n = dwop::decode_mono(sdat, &mut pcm);
        pcm.truncate(n);
        (pcm, n)
    };

    if frames_decoded == 0 {
        return Err(RexError::NoAudioData);
    }

    let mut slices = meta.slices;

    // Step 7 (assembler cross-check): a SLCE chunk's second field is taken
    // as an encoded length. But if the lengths we read look degenerate --
    // more than one slice, yet they cover under half the decoded audio --
    // fall back to inferring lengths from the gaps between consecutive
    // offsets (the scheme the reference decoder always uses), and log it.
    let encoded_total: u64 = slices.iter().map(|s| s.sample_length as u64).sum();
    if slices.len() > 1 && encoded_total < frames_decoded as u64 / 2 {
        warn!("encoded slice lengths cover only {}/{} frames; falling back to gap-inferred lengths", encoded_total, frames_decoded);
        compute_slice_lengths(&mut slices, meta.total_sample_length, frames_decoded);
    }

    // If zero slices were retained (e.g. every SLCE was a transient marker)
    // or lengths are still all zero, synthesize a single slice spanning the
    // whole decoded audio rather than reporting silence.
    if slices.is_empty() || slices.iter().all(|s| s.sample_length == 0) {
        warn!("no playable slices retained; falling back to a single full-length slice");
        slices = vec![RexSlice { sample_offset: 0, sample_length: frames_decoded as u32 }];
    }

    clamp_slices(&mut slices, frames_decoded);

    Ok(RexFile {
        tempo_bpm: meta.tempo_bpm,
        bars: meta.bars,
        beats: meta.beats,
        time_sig_num: meta.time_sig_num,
        time_sig_den: meta.time_sig_den,
        sample_rate: meta.sample_rate,
        channels: meta.channels,
        bytes_per_sample: meta.bytes_per_sample,
        total_sample_length: meta.total_sample_length,
        slices,
        pcm,
    })
}

/// Parses a `.rexwav` sidecar file: already-decoded PCM plus a slice table,
/// produced offline by the `rex2rexwav` converter. See `rexwav::parse`.
pub fn parse_rexwav(data: &[u8]) -> Result<RexFile, RexError> {
    rexwav::parse(data)
}
