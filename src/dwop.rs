//! DWOP (Delta Width Optimized Predictor) decode.
//!
//! A 5-predictor adaptive lossless codec: each sample picks the
//! lowest-energy predictor, reads a unary quotient plus an adaptive
//! range-coded remainder, un-zigzags to a doubled delta, and folds that
//! delta into all five predictor accumulators before un-doubling the
//! output. See `decode_one` for the full per-sample algorithm.
//!
//! Mono and stereo share `decode_one`: stereo runs two independent
//! `ChannelState`s against one shared `BitReader`, with the right channel's
//! output being the left sample plus the right channel's own decoded delta.

use crate::bitreader::BitReader;

const ENERGY_INIT: i32 = 2560;
const MAX_UNARY_BITS: u32 = 50_000;

/// Energy-index -> prediction-order remap. Energy slot `i` does not
/// correspond to prediction order `i`; this table is load-bearing.
const PRED_MAP: [u8; 5] = [0, 1, 4, 2, 3];

/// Per-channel DWOP predictor/range-coder state.
#[derive(Clone)]
pub struct ChannelState {
    /// Predictor accumulators in doubled representation: the true sample is
    /// `s[0] >> 1`.
    s: [i32; 5],
    /// Energy estimators, one per predictor order.
    e: [i32; 5],
    /// Range-coder range, always a power of two >= 1.
    rv: u32,
    /// Range-coder bit budget, carried across samples.
    ba: i32,
}

impl ChannelState {
    pub fn new() -> ChannelState {
        ChannelState { s: [0; 5], e: [ENERGY_INIT; 5], rv: 2, ba: 0 }
    }

    /// Returns `true` if the channel's invariants (§8) still hold. Exposed
    /// for tests; never checked on the hot decode path.
    #[cfg(test)]
    fn invariants_hold(&self) -> bool {
        self.e.iter().all(|&e| e >= 0) && self.rv >= 1 && self.rv.is_power_of_two()
    }
}

impl Default for ChannelState {
    fn default() -> ChannelState {
        ChannelState::new()
    }
}

/// Decodes a single sample from `channel`, advancing `reader`. Returns
/// `None` if the unary quotient or range-coder grow branch overran their
/// safety caps -- the caller should stop decoding.
fn decode_one(channel: &mut ChannelState, reader: &mut BitReader) -> Option<i16> {
    // 1. Predictor selection: lowest energy wins, ties go to the lowest index.
    let mut min_e = channel.e[0] as u32;
    let mut p_idx = 0usize;
    for i in 1..5 {
        let ei = channel.e[i] as u32;
        if ei < min_e {
            min_e = ei;
            p_idx = i;
        }
    }

    // 2. Quantizer step.
    let step = (min_e.wrapping_mul(3).wrapping_add(0x24)) >> 7;

    // 3. Unary-coded quotient; `cs` quadruples every 7 zero-bits.
    let mut acc: u32 = 0;
    let mut cs = step;
    let mut qc = 7u32;
    let mut unary_len = 0u32;
    loop {
        if reader.bit() == 1 {
            break;
        }
        acc = acc.wrapping_add(cs);
        qc -= 1;
        if qc == 0 {
            cs <<= 2;
            qc = 7;
        }
        unary_len += 1;
        if unary_len > MAX_UNARY_BITS {
            return None;
        }
    }

    // 4. Range coder for the remainder.
    let mut nb = channel.ba;
    if cs >= channel.rv {
        while cs >= channel.rv {
            channel.rv <<= 1;
            if channel.rv == 0 {
                return None;
            }
            nb += 1;
        }
    } else {
        nb += 1;
        let mut t = channel.rv;
        loop {
            channel.rv = t;
            t >>= 1;
            nb -= 1;
            if cs >= t {
                break;
            }
        }
    }

    let ext = if nb > 0 { reader.bits(nb as u32) } else { 0 };
    let co = channel.rv - cs;
    let rem = if ext < co {
        ext
    } else {
        let x = reader.bit();
        co.wrapping_add((ext - co).wrapping_mul(2)).wrapping_add(x)
    };

    let val = acc.wrapping_add(rem);
    channel.ba = nb;

    // 5. DWOP zigzag: doubled signed delta, no halving.
    let d = (val ^ (val & 1).wrapping_neg()) as i32;

    // 6. Predictor update (doubled state).
    let o = channel.s;
    let s = &mut channel.s;
    match PRED_MAP[p_idx] {
        0 => {
            s[0] = d;
            s[1] = d.wrapping_sub(o[0]);
            s[2] = s[1].wrapping_sub(o[1]);
            s[3] = s[2].wrapping_sub(o[2]);
            s[4] = s[3].wrapping_sub(o[3]);
        }
        1 => {
            s[0] = o[0].wrapping_add(d);
            s[1] = d;
            s[2] = d.wrapping_sub(o[1]);
            s[3] = s[2].wrapping_sub(o[2]);
            s[4] = s[3].wrapping_sub(o[3]);
        }
        4 => {
            s[1] = o[1].wrapping_add(d);
            s[0] = o[0].wrapping_add(s[1]);
            s[2] = d;
            s[3] = d.wrapping_sub(o[2]);
            s[4] = s[3].wrapping_sub(o[3]);
        }
        2 => {
            s[2] = o[2].wrapping_add(d);
            s[1] = o[1].wrapping_add(s[2]);
            s[0] = o[0].wrapping_add(s[1]);
            s[3] = d;
            s[4] = d.wrapping_sub(o[3]);
        }
        3 => {
            s[3] = o[3].wrapping_add(d);
            s[2] = o[2].wrapping_add(s[3]);
            s[1] = o[1].wrapping_add(s[2]);
            s[0] = o[0].wrapping_add(s[1]);
            s[4] = d;
        }
        _ => unreachable!("PRED_MAP only contains 0..=4"),
    }

    // 7. Energy update: branchless abs via arithmetic-shift XOR.
    for i in 0..5 {
        let as_ = channel.s[i] ^ (channel.s[i] >> 31);
        channel.e[i] = channel.e[i]
            .wrapping_add(as_)
            .wrapping_sub(((channel.e[i] as u32) >> 5) as i32);
    }

    // 8. Output: un-double via arithmetic right shift.
    Some((channel.s[0] >> 1) as i16)
}

/// A per-payload DWOP decoder. Lets a caller who has already extracted a
/// raw `SDAT` payload (e.g. a test harness, or a caller with its own
/// container parser) decode it directly without going through `iff::walk`.
pub struct DwopDecoder<'a> {
    reader: BitReader<'a>,
    left: ChannelState,
    /// `Some` for stereo payloads; the right channel's output is the left
    /// sample plus this channel's own decoded delta.
    right: Option<ChannelState>,
}

impl<'a> DwopDecoder<'a> {
    pub fn new(data: &'a [u8], stereo: bool) -> DwopDecoder<'a> {
        DwopDecoder {
            reader: BitReader::new(data),
            left: ChannelState::new(),
            right: if stereo { Some(ChannelState::new()) } else { None },
        }
    }

    /// Decodes into `out`: for mono, one sample per slot; for stereo,
    /// interleaved `[L, R, L, R, ...]` frames (`out.len()` should be even).
    /// Returns the number of samples (mono) or frames (stereo) actually
    /// written, which may be less than requested if a safety cap was hit.
    pub fn decode(&mut self, out: &mut [i16]) -> usize {
        match &mut self.right {
            None => {
                let mut n = 0;
                for slot in out.iter_mut() {
                    match decode_one(&mut self.left, &mut self.reader) {
                        Some(sample) => {
                            *slot = sample;
                            n += 1;
                        }
                        None => break,
                    }
                }
                n
            }
            Some(right) => {
                let max_frames = out.len() / 2;
                let mut n = 0;
                for i in 0..max_frames {
                    let l = match decode_one(&mut self.left, &mut self.reader) {
                        Some(sample) => sample,
                        None => break,
                    };
                    let delta = match decode_one(right, &mut self.reader) {
                        Some(sample) => sample,
                        None => break,
                    };
                    out[i * 2] = l;
                    out[i * 2 + 1] = l.wrapping_add(delta);
                    n += 1;
                }
                n
            }
        }
    }
}

/// Decodes a single DWOP channel into `out`, returning the number of
/// samples actually written (may be less than `out.len()` if the unary or
/// range-coder safety caps were hit).
pub fn decode_mono(data: &[u8], out: &mut [i16]) -> usize {
    DwopDecoder::new(data, false).decode(out)
}

/// Decodes an interleaved stereo DWOP payload into `out` (length
/// `2 * max_frames`), returning the number of frames actually written.
/// The right channel is a delta relative to the left: `R = L + delta`.
pub fn decode_stereo(data: &[u8], out: &mut [i16], max_frames: usize) -> usize {
    debug_assert!(out.len() >= max_frames * 2);
    DwopDecoder::new(data, true).decode(&mut out[..max_frames * 2])
}
