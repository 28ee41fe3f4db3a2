//! The chunk I/O pipeline: the prepare/commit split between decoding a
//! stored chunk into application bytes and committing application bytes
//! back to their stored form (spec.md §4.4).
//!
//! Chunk storage comes in two shapes. Raw chunks are the `sectors_per_chunk
//! * bytes_per_sector` payload followed by a literal 4-byte trailing
//! checksum (`stored_size = logical_size + 4`). Compressed chunks are a
//! zlib stream whose *decompressed* output is that same payload-plus-
//! checksum — the checksum is never a separate on-disk field for a
//! compressed chunk, it falls out of inflation.

use crate::error::{EwfError, ErrorKind, Result};
use crate::ewf::checksum;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

const TRAILER_SIZE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferState {
    Empty,
    Raw,
    Prepared,
    Committed,
}

/// Working buffers for one chunk's round trip through the pipeline.
/// Mirrors the teacher's single-chunk `ChunkCache`, split into explicit
/// raw/compression scratch space so read and write share one type.
#[derive(Default)]
pub struct ChunkBuffer {
    pub state: BufferState,
    pub raw: Vec<u8>,
    pub compression: Vec<u8>,
    pub data_in_compression_buffer: bool,
}

impl Default for BufferState {
    fn default() -> Self {
        BufferState::Empty
    }
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = BufferState::Empty;
        self.raw.clear();
        self.compression.clear();
        self.data_in_compression_buffer = false;
    }
}

/// Result of preparing a stored chunk for read: the decoded application
/// bytes and whether its checksum validated.
pub struct PreparedRead {
    pub data: Vec<u8>,
    pub checksum_ok: bool,
}

/// Decode `stored` (the bytes read verbatim from the segment file) into
/// `chunk_size` bytes of application data, per `compressed`. On a checksum
/// mismatch, `checksum_ok` is `false`; the caller decides whether to wipe
/// or preserve `data` based on `wipe_on_error` — this function never fails
/// on a mismatch, matching `libewf`'s preference for compensating recovery
/// over hard aborts (spec.md §7: `ChecksumMismatch` is not a propagated
/// error).
pub fn prepare_read_chunk(stored: &[u8], compressed: bool, chunk_size: usize, wipe_on_error: bool) -> Result<PreparedRead> {
    let plain = if compressed {
        let mut decoder = ZlibDecoder::new(stored);
        let mut out = Vec::with_capacity(chunk_size + TRAILER_SIZE);
        decoder.read_to_end(&mut out).map_err(|e| {
            EwfError::from(ErrorKind::InvalidFormat(format!("could not inflate chunk: {e}")))
        })?;
        out
    } else {
        stored.to_vec()
    };

    if plain.len() < TRAILER_SIZE {
        return Err(EwfError::from(ErrorKind::InvalidFormat(format!(
            "decoded chunk is shorter than the trailer ({} bytes)",
            plain.len()
        ))));
    }

    let (body, trailer) = plain.split_at(plain.len() - TRAILER_SIZE);
    let stored_checksum = u32::from_le_bytes(trailer.try_into().unwrap());
    let checksum_ok = checksum::verify(body, stored_checksum);

    let data = if checksum_ok || !wipe_on_error {
        body.to_vec()
    } else {
        vec![0u8; body.len()]
    };

    Ok(PreparedRead { data, checksum_ok })
}

/// Compression preference for the write path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMode {
    None,
    Fast,
    Best,
}

impl CompressionMode {
    fn level(self) -> Option<Compression> {
        match self {
            CompressionMode::None => None,
            CompressionMode::Fast => Some(Compression::fast()),
            CompressionMode::Best => Some(Compression::best()),
        }
    }
}

pub struct PreparedWrite {
    pub stored: Vec<u8>,
    pub compressed: bool,
}

/// Append the checksum trailer to `data` and, if `mode` requests it,
/// compress the result — keeping whichever representation is smaller.
/// Compression is skipped entirely for `CompressionMode::None`, and a
/// compressed candidate that didn't beat the raw trailer form is
/// discarded (raw wins ties).
pub fn prepare_write_chunk(data: &[u8], mode: CompressionMode) -> PreparedWrite {
    let mut raw_with_trailer = Vec::with_capacity(data.len() + TRAILER_SIZE);
    raw_with_trailer.extend_from_slice(data);
    raw_with_trailer.extend_from_slice(&checksum::compute(data).to_le_bytes());

    let level = match mode.level() {
        Some(level) => level,
        None => {
            return PreparedWrite {
                stored: raw_with_trailer,
                compressed: false,
            }
        }
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder
        .write_all(&raw_with_trailer)
        .expect("in-memory zlib write");
    let compressed = encoder.finish().expect("in-memory zlib finish");

    if compressed.len() < raw_with_trailer.len() {
        PreparedWrite {
            stored: compressed,
            compressed: true,
        }
    } else {
        PreparedWrite {
            stored: raw_with_trailer,
            compressed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_raw_chunk() {
        let data = vec![0x41u8; 1024];
        let written = prepare_write_chunk(&data, CompressionMode::None);
        assert!(!written.compressed);

        let read = prepare_read_chunk(&written.stored, false, data.len(), true).unwrap();
        assert!(read.checksum_ok);
        assert_eq!(read.data, data);
    }

    #[test]
    fn round_trips_compressed_chunk() {
        let data = vec![b'a'; 8192];
        let written = prepare_write_chunk(&data, CompressionMode::Best);
        assert!(written.compressed);
        assert!(written.stored.len() < data.len());

        let read = prepare_read_chunk(&written.stored, true, data.len(), true).unwrap();
        assert!(read.checksum_ok);
        assert_eq!(read.data, data);
    }

    #[test]
    fn random_data_falls_back_to_raw() {
        let data: Vec<u8> = (0..4096u32).map(|i| (i * 2654435761) as u8).collect();
        let written = prepare_write_chunk(&data, CompressionMode::Best);
        assert!(!written.compressed);
        assert_eq!(written.stored.len(), data.len() + TRAILER_SIZE);
    }

    #[test]
    fn wipes_corrupted_chunk_when_requested() {
        let data = vec![0x7fu8; 512];
        let mut written = prepare_write_chunk(&data, CompressionMode::None);
        written.stored[0] ^= 0xff;

        let wiped = prepare_read_chunk(&written.stored, false, data.len(), true).unwrap();
        assert!(!wiped.checksum_ok);
        assert!(wiped.data.iter().all(|&b| b == 0));

        let preserved = prepare_read_chunk(&written.stored, false, data.len(), false).unwrap();
        assert!(!preserved.checksum_ok);
        assert_eq!(preserved.data.len(), data.len());
    }
}
