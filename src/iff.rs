//! Recursive IFF-style chunk walker for REX2's `CAT` container format.
//!
//! Big-endian IFF: 4-byte ASCII tag, 4-byte length, payload, one pad byte if
//! the length is odd. `CAT ` chunks are containers (4-byte form type
//! followed by nested chunks); everything else is a leaf chunk.

use byteorder::{BigEndian, ByteOrder};
use log::{info, warn};

use crate::{RexSlice, MAX_SLICES};

/// Recursion cap for nested `CAT` containers. REX2 nesting is rarely
/// deeper than 3; this only guards against pathological/malicious input.
const MAX_DEPTH: u32 = 64;

/// Metadata and the raw `SDAT` payload collected by a single walk of a
/// REX2 file's chunk tree.
pub struct ParsedMeta<'a> {
    pub tempo_bpm: f32,
    pub bars: u16,
    pub beats: u8,
    pub time_sig_num: u8,
    pub time_sig_den: u8,
    pub sample_rate: u32,
    pub channels: u8,
    pub bytes_per_sample: u8,
    pub total_sample_length: u32,
    pub slices: Vec<RexSlice>,
    pub sdat: Option<&'a [u8]>,
}

impl<'a> Default for ParsedMeta<'a> {
    fn default() -> Self {
        ParsedMeta {
            tempo_bpm: 0.0,
            bars: 0,
            beats: 0,
            time_sig_num: 0,
            time_sig_den: 0,
            sample_rate: 44_100,
            channels: 1,
            bytes_per_sample: 0,
            total_sample_length: 0,
            slices: Vec::new(),
            sdat: None,
        }
    }
}

fn tag_is(tag: &[u8], name: &[u8; 4]) -> bool {
    tag == name
}

fn parse_glob(meta: &mut ParsedMeta, data: &[u8]) {
    if data.len() < 20 {
        return;
    }
    meta.bars = BigEndian::read_u16(&data[4..6]);
    meta.beats = data[6];
    meta.time_sig_num = data[7];
    meta.time_sig_den = data[8];
    meta.tempo_bpm = BigEndian::read_u32(&data[16..20]) as f32 / 1000.0;
}

fn parse_head(meta: &mut ParsedMeta, data: &[u8]) {
    if data.len() < 6 {
        return;
    }
    meta.bytes_per_sample = data[5];
}

fn parse_sinf(meta: &mut ParsedMeta, data: &[u8]) {
    if data.len() < 10 {
        return;
    }
    let channels = data[0];
    if channels == 1 || channels == 2 {
        meta.channels = channels;
    }
    let sample_rate = BigEndian::read_u16(&data[4..6]);
    if sample_rate > 0 {
        meta.sample_rate = sample_rate as u32;
    }
    meta.total_sample_length = BigEndian::read_u32(&data[6..10]);
}

fn parse_slce(meta: &mut ParsedMeta, data: &[u8]) {
    if data.len() < 8 {
        return;
    }
    let sample_offset = BigEndian::read_u32(&data[0..4]);
    let sample_length = BigEndian::read_u32(&data[4..8]);
    if sample_length <= 1 {
        // Transient marker, not a playable slice.
        return;
    }
    if meta.slices.len() >= MAX_SLICES {
        warn!("slice cap ({}) reached; dropping further SLCE entries", MAX_SLICES);
        return;
    }
    meta.slices.push(RexSlice { sample_offset, sample_length });
}

/// Walks chunks in `data[offset..boundary]`, filling in `meta` as
/// recognized chunks are encountered. `boundary` never exceeds the
/// enclosing `CAT`'s end, and is re-derived (never trusted blindly) from
/// each chunk's own declared length before recursing into it.
fn walk_chunks<'a>(data: &'a [u8], boundary: usize, offset: usize, depth: u32, meta: &mut ParsedMeta<'a>) {
    if depth > MAX_DEPTH {
        warn!("CAT nesting exceeded depth cap ({}); stopping this branch", MAX_DEPTH);
        return;
    }

    let mut offset = offset;
    while offset.checked_add(8).map_or(false, |end| end <= boundary) {
        let tag = &data[offset..offset + 4];
        let chunk_len = BigEndian::read_u32(&data[offset + 4..offset + 8]) as usize;
        let padded_len = if chunk_len % 2 == 1 { chunk_len + 1 } else { chunk_len };

        // Untrusted length: never let it overflow the bounds check.
        let chunk_end = match offset.checked_add(8).and_then(|v| v.checked_add(padded_len)) {
            Some(v) if v <= boundary => v,
            _ => break,
        };

        let chunk_data = &data[offset + 8..offset + 8 + chunk_len.min(data.len() - offset - 8)];

        if tag_is(tag, b"CAT ") {
            if chunk_len >= 4 {
                let cat_boundary = offset + 8 + chunk_len;
                walk_chunks(data, cat_boundary, offset + 12, depth + 1, meta);
            }
        } else if tag_is(tag, b"GLOB") {
            parse_glob(meta, chunk_data);
        } else if tag_is(tag, b"HEAD") {
            parse_head(meta, chunk_data);
        } else if tag_is(tag, b"SINF") {
            parse_sinf(meta, chunk_data);
        } else if tag_is(tag, b"SLCE") {
            parse_slce(meta, chunk_data);
        } else if tag_is(tag, b"SDAT") {
            if meta.sdat.is_none() {
                meta.sdat = Some(chunk_data);
            } else {
                warn!("ignoring additional SDAT chunk; only the first is decoded");
            }
        } else {
            info!(
                "ignoring unknown chunk: tag={}, len={}",
                String::from_utf8_lossy(tag),
                chunk_len
            );
        }

        offset = chunk_end;
    }
}

/// Walks a whole REX2 byte buffer (already verified to start with `CAT `)
/// and returns the collected metadata, slice table, and `SDAT` payload.
pub fn walk(data: &[u8]) -> ParsedMeta {
    let mut meta = ParsedMeta::default();
    walk_chunks(data, data.len(), 0, 0, &mut meta);
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn be32(v: u32) -> [u8; 4] {
        v.to_be_bytes()
    }

    fn chunk(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(tag);
        out.extend_from_slice(&be32(payload.len() as u32));
        out.extend_from_slice(payload);
        if payload.len() % 2 == 1 {
            out.push(0);
        }
        out
    }

    fn glob_payload(bars: u16, beats: u8, num: u8, den: u8, tempo_mbpm: u32) -> Vec<u8> {
        let mut p = vec![0u8; 20];
        p[4..6].copy_from_slice(&bars.to_be_bytes());
        p[6] = beats;
        p[7] = num;
        p[8] = den;
        p[16..20].copy_from_slice(&tempo_mbpm.to_be_bytes());
        p
    }

    fn sinf_payload(channels: u8, sample_rate: u16, total: u32) -> Vec<u8> {
        let mut p = vec![0u8; 10];
        p[0] = channels;
        p[4..6].copy_from_slice(&sample_rate.to_be_bytes());
        p[6..10].copy_from_slice(&total.to_be_bytes());
        p
    }

    fn slce_payload(offset: u32, length: u32) -> Vec<u8> {
        let mut p = vec![0u8; 8];
        p[0..4].copy_from_slice(&offset.to_be_bytes());
        p[4..8].copy_from_slice(&length.to_be_bytes());
        p
    }

    fn wrap_cat(inner: &[u8]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"REX2"); // form type
        payload.extend_from_slice(inner);
        chunk(b"CAT ", &payload)
    }

    #[test]
    fn extracts_metadata_and_sdat() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&chunk(b"GLOB", &glob_payload(4, 2, 4, 4, 120_000)));
        inner.extend_from_slice(&chunk(b"SINF", &sinf_payload(1, 44_100, 1000)));
        inner.extend_from_slice(&chunk(b"SDAT", &[0xAB, 0xCD, 0xEF]));
        let data = wrap_cat(&inner);

        let meta = walk(&data);
        assert_eq!(meta.bars, 4);
        assert_eq!(meta.beats, 2);
        assert_eq!(meta.time_sig_num, 4);
        assert_eq!(meta.time_sig_den, 4);
        assert_eq!(meta.tempo_bpm, 120.0);
        assert_eq!(meta.sample_rate, 44_100);
        assert_eq!(meta.channels, 1);
        assert_eq!(meta.total_sample_length, 1000);
        assert_eq!(meta.sdat, Some(&[0xABu8, 0xCD, 0xEF][..]));
    }

    #[test]
    fn transient_markers_are_dropped() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&chunk(b"SLCE", &slce_payload(0, 100)));
        inner.extend_from_slice(&chunk(b"SLCE", &slce_payload(100, 1))); // transient
        inner.extend_from_slice(&chunk(b"SLCE", &slce_payload(101, 50)));
        let data = wrap_cat(&inner);

        let meta = walk(&data);
        assert_eq!(meta.slices.len(), 2);
        assert_eq!(meta.slices[0].sample_offset, 0);
        assert_eq!(meta.slices[0].sample_length, 100);
        assert_eq!(meta.slices[1].sample_offset, 101);
        assert_eq!(meta.slices[1].sample_length, 50);
    }

    #[test]
    fn all_transient_markers_yields_no_slices() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&chunk(b"SLCE", &slce_payload(0, 0)));
        inner.extend_from_slice(&chunk(b"SLCE", &slce_payload(10, 1)));
        let data = wrap_cat(&inner);

        let meta = walk(&data);
        assert!(meta.slices.is_empty());
    }

    #[test]
    fn malformed_chunk_length_stops_walk_without_reading_oob() {
        // A chunk claiming a length far beyond the buffer must not be
        // walked into; the boundary check must stop this level cleanly.
        let mut data = Vec::new();
        data.extend_from_slice(b"CAT ");
        data.extend_from_slice(&be32(0xFFFF_FFF0)); // huge declared length
        data.extend_from_slice(b"REX2");
        data.extend_from_slice(&[1, 2, 3, 4]); // short actual payload

        // Must return promptly with nothing populated, not panic or hang.
        let meta = walk(&data);
        assert!(meta.sdat.is_none());
        assert!(meta.slices.is_empty());
    }

    #[test]
    fn unknown_chunks_are_skipped_without_error() {
        let mut inner = Vec::new();
        inner.extend_from_slice(&chunk(b"XYZZ", &[1, 2, 3]));
        inner.extend_from_slice(&chunk(b"SINF", &sinf_payload(2, 48_000, 500)));
        let data = wrap_cat(&inner);

        let meta = walk(&data);
        assert_eq!(meta.channels, 2);
        assert_eq!(meta.sample_rate, 48_000);
    }
}
