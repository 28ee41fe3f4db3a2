//! `volume` / `disk` section: acquired-media geometry (spec.md §3).

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

/// Geometry of the acquired medium. Invariant:
/// `media_size <= number_of_chunks * sectors_per_chunk * bytes_per_sector`;
/// the last chunk may be short.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaGeometry {
    pub bytes_per_sector: u32,
    pub sectors_per_chunk: u32,
    pub number_of_chunks: u32,
    pub total_sector_count: u64,
}

impl MediaGeometry {
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.sectors_per_chunk as usize * self.bytes_per_sector as usize
    }

    #[inline]
    pub fn media_size(&self) -> u64 {
        self.total_sector_count * self.bytes_per_sector as u64
    }

    /// Number of whole-or-partial chunks needed to hold `media_size` bytes.
    pub fn chunks_for_size(media_size: u64, chunk_size: usize) -> u32 {
        if media_size == 0 {
            return 0;
        }
        ((media_size + chunk_size as u64 - 1) / chunk_size as u64) as u32
    }
}

/// Parse a `volume`/`disk` section body at `offset` (the teacher's layout:
/// a 4-byte reserved field, then three little-endian `u32`s).
pub fn parse(file: &mut File, offset: u64) -> Result<MediaGeometry> {
    let mut buf = [0u8; 20];
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(&mut buf)?;

    let chunk_count = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let sectors_per_chunk = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let bytes_per_sector = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let total_sector_count = u32::from_le_bytes(buf[16..20].try_into().unwrap());

    Ok(MediaGeometry {
        bytes_per_sector,
        sectors_per_chunk,
        number_of_chunks: chunk_count,
        total_sector_count: total_sector_count as u64,
    })
}

/// Serialize a `volume` section body matching [`parse`]'s layout.
pub fn emit(geometry: &MediaGeometry) -> Vec<u8> {
    let mut buf = vec![0u8; 20];
    buf[4..8].copy_from_slice(&geometry.number_of_chunks.to_le_bytes());
    buf[8..12].copy_from_slice(&geometry.sectors_per_chunk.to_le_bytes());
    buf[12..16].copy_from_slice(&geometry.bytes_per_sector.to_le_bytes());
    buf[16..20].copy_from_slice(&(geometry.total_sector_count as u32).to_le_bytes());
    buf
}

pub fn write(file: &mut File, geometry: &MediaGeometry) -> Result<()> {
    file.write_all(&emit(geometry))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn round_trips_geometry() {
        let geometry = MediaGeometry {
            bytes_per_sector: 512,
            sectors_per_chunk: 64,
            number_of_chunks: 26,
            total_sector_count: 26 * 64,
        };
        let mut file = tempfile().unwrap();
        write(&mut file, &geometry).unwrap();
        let parsed = parse(&mut file, 0).unwrap();
        assert_eq!(parsed, geometry);
        assert_eq!(parsed.chunk_size(), 32768);
    }

    #[test]
    fn chunks_for_size_handles_short_tail() {
        assert_eq!(MediaGeometry::chunks_for_size(0, 32768), 0);
        assert_eq!(MediaGeometry::chunks_for_size(1, 32768), 1);
        assert_eq!(MediaGeometry::chunks_for_size(32768, 32768), 1);
        assert_eq!(MediaGeometry::chunks_for_size(32769, 32768), 2);
    }
}
