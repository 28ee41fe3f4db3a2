//! The offset table: a dense, append-indexed map from chunk number to
//! on-disk location and compression state (spec.md §3, §4.2).
//!
//! Grounded on `libewf_offset_table.h` (`original_source/libewf/`): the
//! same field set (`segment_number`, `offset`, `size`, `compressed`,
//! `dirty`) and the same three operations (`fill`, `calculate_last_offset`,
//! `compare`), renamed to idiomatic snake_case without the `_table_t`
//! suffix.

use crate::error::{EwfError, ErrorKind, Result};
use crate::ewf::checksum;
use crate::ewf::section::{tags, SectionRecord};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

const COMPRESSED_FLAG: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7FFF_FFFF;
const TABLE_HEADER_SIZE: usize = 24;
const TABLE_TRAILER_SIZE: usize = 4;

/// One chunk's location and storage state. `dirty` marks a chunk rewritten
/// after the original acquisition (delta file semantics) — the write path
/// in this crate never produces delta files, so it is always `false` for
/// chunks this crate writes, but is preserved when cross-validating an
/// image that was.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OffsetEntry {
    pub segment_id: u16,
    pub file_offset: u64,
    pub stored_size: u32,
    pub compressed: bool,
    pub checksum_embedded: bool,
    pub dirty: bool,
}

/// How strictly to treat a `table` vs `table2` disagreement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorTolerance {
    /// Any mismatch fails with `CorruptIndex` (`InvalidFormat`).
    Strict,
    /// The healthier side wins; ties favor `table`.
    Compensate,
}

#[derive(Default)]
pub struct OffsetTable {
    entries: Vec<OffsetEntry>,
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest defined chunk index, if any.
    pub fn last(&self) -> Option<u32> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.len() as u32 - 1)
        }
    }

    pub fn amount(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn get(&self, chunk: u32) -> Option<&OffsetEntry> {
        self.entries.get(chunk as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OffsetEntry> {
        self.entries.iter()
    }

    /// Append `raw_entries.len()` rows decoded from a `table`/`table2`
    /// section's 32-bit offset words. The high bit of each word flags
    /// compression; the low 31 bits are a delta from `base_offset`.
    /// Returns the index range of the newly appended rows, for
    /// [`Self::calculate_last_offset`] to size afterwards.
    pub fn fill(&mut self, base_offset: u64, raw_entries: &[u32], segment_id: u16) -> Range<u32> {
        let start = self.entries.len() as u32;
        for &word in raw_entries {
            let delta = (word & OFFSET_MASK) as u64;
            let compressed = (word & COMPRESSED_FLAG) != 0;
            self.entries.push(OffsetEntry {
                segment_id,
                file_offset: base_offset + delta,
                stored_size: 0,
                compressed,
                checksum_embedded: !compressed,
                dirty: false,
            });
        }
        start..self.entries.len() as u32
    }

    /// Explicit per-field set used by the write path. Chunks must be
    /// appended in strictly increasing order — gaps are forbidden.
    pub fn set(
        &mut self,
        chunk: u32,
        segment_id: u16,
        file_offset: u64,
        stored_size: u32,
        compressed: bool,
        checksum_embedded: bool,
        dirty: bool,
    ) -> Result<()> {
        let next = self.entries.len() as u32;
        if chunk != next {
            return Err(EwfError::from(ErrorKind::SequenceViolation(format!(
                "offset table set() out of order: chunk {chunk}, expected {next}"
            ))));
        }
        self.entries.push(OffsetEntry {
            segment_id,
            file_offset,
            stored_size,
            compressed,
            checksum_embedded,
            dirty,
        });
        Ok(())
    }

    /// Size the rows appended in `range` by the distance to the next
    /// chunk's offset, or — for the last chunk of the batch — the start of
    /// the first non-chunk section following it in `section_list`
    /// (`LIBEWF_OFFSET_TABLE_calculate_last_offset` style).
    pub fn calculate_last_offset(&mut self, range: Range<u32>, section_list: &[SectionRecord]) -> Result<()> {
        for i in range {
            let idx = i as usize;
            let this_offset = self.entries[idx].file_offset;
            let next_offset = if let Some(next) = self.entries.get(idx + 1) {
                next.file_offset
            } else {
                section_list
                    .iter()
                    .filter(|s| s.offset > this_offset)
                    .map(|s| s.offset)
                    .min()
                    .ok_or_else(|| {
                        EwfError::from(ErrorKind::InvalidFormat(format!(
                            "no terminating section found after chunk offset 0x{this_offset:x}"
                        )))
                    })?
            };
            if next_offset < this_offset {
                return Err(EwfError::from(ErrorKind::InvalidFormat(format!(
                    "chunk at 0x{this_offset:x} has a negative computed size"
                ))));
            }
            self.entries[idx].stored_size = (next_offset - this_offset) as u32;
        }
        Ok(())
    }

    /// Equality over `{segment_id, file_offset, stored_size, compressed}`,
    /// used to cross-validate a `table` section against its `table2` twin.
    pub fn compare(&self, other: &OffsetTable) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().zip(other.entries.iter()).all(|(a, b)| {
            a.segment_id == b.segment_id && a.file_offset == b.file_offset && a.stored_size == b.stored_size && a.compressed == b.compressed
        })
    }

    /// Resolve a `table` vs `table2` disagreement per `tolerance`.
    /// `table2` missing entirely is treated as compensating-tolerance
    /// success (spec.md §9 Open Questions), so callers should only invoke
    /// this when both are present.
    pub fn reconcile(table: OffsetTable, table2: OffsetTable, tolerance: ErrorTolerance) -> Result<OffsetTable> {
        if table.compare(&table2) {
            return Ok(table);
        }
        match tolerance {
            ErrorTolerance::Strict => Err(EwfError::from(ErrorKind::InvalidFormat(
                "table and table2 disagree under strict error tolerance".to_string(),
            ))),
            ErrorTolerance::Compensate => Ok(table),
        }
    }

    /// Encode back to the raw 32-bit offset words a `table`/`table2`
    /// section stores, relative to `base_offset`.
    pub fn encode(&self, base_offset: u64) -> Vec<u32> {
        self.entries
            .iter()
            .map(|e| {
                let delta = (e.file_offset - base_offset) as u32 & OFFSET_MASK;
                if e.compressed {
                    delta | COMPRESSED_FLAG
                } else {
                    delta
                }
            })
            .collect()
    }
}

pub fn section_has_table_marker(section: &SectionRecord) -> bool {
    section.is(tags::TABLE) || section.is(tags::TABLE2)
}

/// Read a `table`/`table2` section body at `offset`: a 24-byte header
/// (entry count, padding, base offset, padding, header checksum) followed
/// by `count` 32-bit offset words and a trailing checksum over those
/// words.
pub fn read_table_body(file: &mut File, offset: u64) -> Result<(u64, Vec<u32>)> {
    file.seek(SeekFrom::Start(offset))?;
    let mut header = [0u8; TABLE_HEADER_SIZE];
    file.read_exact(&mut header)?;

    let count = u32::from_le_bytes(header[0..4].try_into().unwrap());
    let base_offset = u64::from_le_bytes(header[8..16].try_into().unwrap());
    let stored_checksum = u32::from_le_bytes(header[20..24].try_into().unwrap());
    if !checksum::verify(&header[0..20], stored_checksum) {
        return Err(EwfError::from(ErrorKind::InvalidFormat(format!(
            "table section header checksum mismatch at offset 0x{offset:x}"
        ))));
    }

    let mut entry_bytes = vec![0u8; count as usize * 4];
    file.read_exact(&mut entry_bytes)?;
    let entries: Vec<u32> = entry_bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect();

    Ok((base_offset, entries))
}

/// Serialize a `table`/`table2` body in the layout [`read_table_body`]
/// reads, ready to be appended after a section descriptor.
pub fn write_table_body(file: &mut File, base_offset: u64, entries: &[u32]) -> Result<()> {
    let mut header = [0u8; TABLE_HEADER_SIZE];
    header[0..4].copy_from_slice(&(entries.len() as u32).to_le_bytes());
    header[8..16].copy_from_slice(&base_offset.to_le_bytes());
    let crc = checksum::compute(&header[0..20]);
    header[20..24].copy_from_slice(&crc.to_le_bytes());
    file.write_all(&header)?;

    let mut entry_bytes = Vec::with_capacity(entries.len() * 4);
    for entry in entries {
        entry_bytes.extend_from_slice(&entry.to_le_bytes());
    }
    file.write_all(&entry_bytes)?;

    let trailer_crc = checksum::compute(&entry_bytes);
    file.write_all(&trailer_crc.to_le_bytes())?;
    Ok(())
}

pub const fn table_body_size(entry_count: usize) -> u64 {
    (TABLE_HEADER_SIZE + entry_count * 4 + TABLE_TRAILER_SIZE) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(section_type: &str, offset: u64) -> SectionRecord {
        SectionRecord {
            section_type: section_type.to_string(),
            offset,
            next_offset: 0,
            size: 0,
        }
    }

    #[test]
    fn fill_decodes_compressed_flag_and_base_offset() {
        let mut table = OffsetTable::new();
        let raw = [0x10u32, 0x8000_0030];
        let range = table.fill(0x1000, &raw, 1);
        assert_eq!(range, 0..2);
        assert_eq!(table.get(0).unwrap().file_offset, 0x1010);
        assert!(!table.get(0).unwrap().compressed);
        assert_eq!(table.get(1).unwrap().file_offset, 0x1030);
        assert!(table.get(1).unwrap().compressed);
    }

    #[test]
    fn calculate_last_offset_uses_next_chunk_then_terminator() {
        let mut table = OffsetTable::new();
        let raw = [0u32, 100u32, 250u32];
        let range = table.fill(0, &raw, 1);
        let sections = vec![section("sectors", 0), section("done", 400)];
        table.calculate_last_offset(range, &sections).unwrap();

        assert_eq!(table.get(0).unwrap().stored_size, 100);
        assert_eq!(table.get(1).unwrap().stored_size, 150);
        assert_eq!(table.get(2).unwrap().stored_size, 150);
    }

    #[test]
    fn set_rejects_out_of_order_chunks() {
        let mut table = OffsetTable::new();
        table.set(0, 1, 0, 10, false, true, false).unwrap();
        assert!(table.set(2, 1, 20, 10, false, true, false).is_err());
    }

    #[test]
    fn reconcile_prefers_table_under_compensation() {
        let mut a = OffsetTable::new();
        a.fill(0, &[10, 20], 1);
        let mut b = OffsetTable::new();
        b.fill(0, &[10, 999], 1);

        let strict = OffsetTable::reconcile(
            {
                let mut t = OffsetTable::new();
                t.fill(0, &[10, 20], 1);
                t
            },
            {
                let mut t = OffsetTable::new();
                t.fill(0, &[10, 999], 1);
                t
            },
            ErrorTolerance::Strict,
        );
        assert!(strict.is_err());

        let compensated = OffsetTable::reconcile(a, b, ErrorTolerance::Compensate).unwrap();
        assert_eq!(compensated.get(1).unwrap().file_offset, 20);
    }

    #[test]
    fn encode_round_trips_fill() {
        let mut table = OffsetTable::new();
        let raw = [0x10u32, 0x8000_0030];
        table.fill(0x1000, &raw, 1);
        assert_eq!(table.encode(0x1000), raw.to_vec());
    }
}
