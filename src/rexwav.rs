//! REXWAV sidecar reader.
//!
//! REXWAV files carry audio that the REX SDK has already decoded to PCM
//! offline (by the `rex2rexwav` desktop converter); there is no DWOP/DWVW
//! bitstream to decode, just a fixed 64-byte little-endian header, a flat
//! slice table, and interleaved 16-bit PCM. Slice lengths here are
//! SDK-authoritative, so unlike `iff::walk` there is no gap-based fallback.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::RexError;
use crate::{RexFile, RexSlice, MAX_SLICES};

const HEADER_LEN: usize = 64;

/// Parses a REXWAV buffer (magic `"RXWV"`) into the same `RexFile` shape
/// produced by [`crate::parse`].
pub fn parse(data: &[u8]) -> Result<RexFile, RexError> {
    if data.len() < HEADER_LEN {
        return Err(RexError::TooSmall { len: data.len(), minimum: HEADER_LEN });
    }
    if &data[0..4] != b"RXWV" {
        return Err(RexError::NotContainer);
    }

    let version = LittleEndian::read_u32(&data[4..8]);
    if version != 1 {
        return Err(RexError::BadVersion(version));
    }

    let sample_rate = LittleEndian::read_u32(&data[8..12]);
    let channels = LittleEndian::read_u32(&data[12..16]);
    let slice_count = LittleEndian::read_u32(&data[16..20]);
    let total_frames = LittleEndian::read_u32(&data[20..24]);
    let tempo_mbpm = LittleEndian::read_u32(&data[24..28]);
    let time_sig_num = data[28];
    let time_sig_den = data[29];

    if slice_count as usize > MAX_SLICES {
        return Err(RexError::TooManySlices(slice_count));
    }

    let slice_table_len = slice_count as usize * 8;
    let pcm_len = total_frames as usize * channels.max(1) as usize * 2;
    let expected = HEADER_LEN + slice_table_len + pcm_len;
    if data.len() < expected {
        return Err(RexError::Truncated { expected, actual: data.len() });
    }

    let mut slices = Vec::with_capacity(slice_count as usize);
    let stab = &data[HEADER_LEN..HEADER_LEN + slice_table_len];
    for i in 0..slice_count as usize {
        let sample_offset = LittleEndian::read_u32(&stab[i * 8..i * 8 + 4]);
        let sample_length = LittleEndian::read_u32(&stab[i * 8 + 4..i * 8 + 8]);
        slices.push(RexSlice { sample_offset, sample_length });
    }

    let pcm_bytes = &data[HEADER_LEN + slice_table_len..HEADER_LEN + slice_table_len + pcm_len];
    let mut pcm = vec![0i16; total_frames as usize * channels.max(1) as usize];
    LittleEndian::read_i16_into(pcm_bytes, &mut pcm);

    if pcm.is_empty() {
        return Err(RexError::NoAudioData);
    }

    Ok(RexFile {
        tempo_bpm: tempo_mbpm as f32 / 1000.0,
        bars: 0,
        beats: 0,
        time_sig_num,
        time_sig_den,
        sample_rate,
        channels: channels as u8,
        bytes_per_sample: 2,
        total_sample_length: total_frames,
        slices,
        pcm,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(version: u32, sample_rate: u32, channels: u32, slices: &[(u32, u32)], frames: &[i16]) -> Vec<u8> {
        let channel_count = channels.max(1);
        let total_frames = (frames.len() / channel_count as usize) as u32;
        let mut data = vec![0u8; HEADER_LEN];
        data[0..4].copy_from_slice(b"RXWV");
        LittleEndian::write_u32(&mut data[4..8], version);
        LittleEndian::write_u32(&mut data[8..12], sample_rate);
        LittleEndian::write_u32(&mut data[12..16], channels);
        LittleEndian::write_u32(&mut data[16..20], slices.len() as u32);
        LittleEndian::write_u32(&mut data[20..24], total_frames);
        LittleEndian::write_u32(&mut data[24..28], 120_000);
        data[28] = 4;
        data[29] = 4;

        for &(offset, length) in slices {
            let mut entry = [0u8; 8];
            LittleEndian::write_u32(&mut entry[0..4], offset);
            LittleEndian::write_u32(&mut entry[4..8], length);
            data.extend_from_slice(&entry);
        }

        for &sample in frames {
            let mut b = [0u8; 2];
            LittleEndian::write_i16(&mut b, sample);
            data.extend_from_slice(&b);
        }
        data
    }

    #[test]
    fn parses_header_slices_and_pcm() {
        let data = build(1, 44_100, 1, &[(0, 4), (4, 4)], &[1, 2, 3, 4, 5, 6, 7, 8]);
        let rex = parse(&data).unwrap();
        assert_eq!(rex.sample_rate, 44_100);
        assert_eq!(rex.channels, 1);
        assert_eq!(rex.tempo_bpm, 120.0);
        assert_eq!(rex.time_sig_num, 4);
        assert_eq!(rex.slices.len(), 2);
        assert_eq!(rex.slices[1].sample_offset, 4);
        assert_eq!(rex.pcm, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build(1, 44_100, 1, &[], &[]);
        data[0] = b'X';
        assert_eq!(parse(&data), Err(RexError::NotContainer));
    }

    #[test]
    fn rejects_unsupported_version() {
        let data = build(2, 44_100, 1, &[], &[0; 4]);
        assert_eq!(parse(&data), Err(RexError::BadVersion(2)));
    }

    #[test]
    fn rejects_truncated_pcm() {
        let mut data = build(1, 44_100, 1, &[], &[1, 2, 3, 4]);
        data.truncate(data.len() - 2);
        assert!(matches!(parse(&data), Err(RexError::Truncated { .. })));
    }

    #[test]
    fn rejects_too_many_slices() {
        let mut data = vec![0u8; HEADER_LEN];
        data[0..4].copy_from_slice(b"RXWV");
        LittleEndian::write_u32(&mut data[4..8], 1);
        LittleEndian::write_u32(&mut data[16..20], (MAX_SLICES as u32) + 1);
        assert_eq!(parse(&data), Err(RexError::TooManySlices((MAX_SLICES as u32) + 1)));
    }
}
