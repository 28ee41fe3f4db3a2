//! `header` / `header2` section: zlib-deflated acquisition metadata
//! (case number, examiner, notes, acquisition/system dates, ...).
//!
//! Parsing logic is carried over from the teacher's `EwfHeaderSection`
//! almost unchanged — it already copes with the BOM, blank-line, and
//! "one entry per line" fallback variants seen across EWF writers.

use crate::error::{EwfError, ErrorKind, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::{Read, Write};

/// Canonical display order and human labels for the well-known identifiers,
/// used by [`crate::ewf::handle::EwfHandle::print_info`].
pub const DISPLAY_ORDER: &[(&str, &str)] = &[
    ("c", "Case Number"),
    ("cn", "Case Number"),
    ("n", "Evidence Number"),
    ("en", "Evidence Number"),
    ("a", "Description"),
    ("e", "Examiner"),
    ("ex", "Examiner"),
    ("t", "Notes"),
    ("nt", "Notes"),
    ("av", "Application Version"),
    ("ov", "OS Version"),
    ("m", "Acquisition Date"),
    ("u", "System Date"),
    ("p", "Password Hash"),
    ("r", "Reserved"),
];

#[derive(Default, Clone, Debug)]
pub struct HeaderSection {
    pub metadata: HashMap<String, String>,
}

impl HeaderSection {
    fn decode(raw: &[u8]) -> String {
        if let Ok(txt) = String::from_utf8(raw.to_vec()) {
            return txt;
        }
        if raw.len() % 2 == 0 {
            let utf16: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            if let Ok(txt) = String::from_utf16(&utf16) {
                return txt;
            }
        }
        String::new()
    }

    fn table_to_map(keys: &str, vals: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        for (k, v) in keys.split('\t').zip(vals.split('\t')) {
            map.insert(
                k.trim_matches('\0').to_string(),
                v.trim_matches('\0').to_string(),
            );
        }
        map
    }

    fn parse_metadata(raw: &[u8]) -> HashMap<String, String> {
        let txt = Self::decode(raw);
        let mut lines: Vec<&str> = txt
            .split(|c| c == '\n' || c == '\r')
            .filter(|l| !l.trim().is_empty())
            .collect();

        if let Some(first) = lines.first_mut() {
            *first = first.trim_start_matches('\u{FEFF}');
        }

        for i in 0..lines.len().saturating_sub(1) {
            if lines[i].contains('\t') && lines[i + 1].contains('\t') {
                return Self::table_to_map(lines[i], lines[i + 1]);
            }
        }

        let mut map = HashMap::new();
        for l in lines {
            if let Some((k, v)) = l.split_once('\t') {
                map.insert(
                    k.trim_matches('\0').to_string(),
                    v.trim_matches('\0').to_string(),
                );
            }
        }
        map
    }

    /// Inflate `compressed` (the raw section body) and parse its metadata.
    pub fn parse(compressed: &[u8]) -> Result<Self> {
        let mut decoder = ZlibDecoder::new(compressed);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data).map_err(|e| {
            EwfError::from(ErrorKind::InvalidFormat(format!(
                "could not inflate header section: {e}"
            )))
        })?;
        Ok(HeaderSection {
            metadata: Self::parse_metadata(&data),
        })
    }

    /// Merge `other`'s entries into `self`, with `other` winning on
    /// conflicting keys (used when a `header2` UTF-16 table overrides the
    /// ASCII `header` table — spec.md §3 calls this out explicitly).
    pub fn merge_overriding(&mut self, other: HeaderSection) {
        self.metadata.extend(other.metadata);
    }

    /// Serialize to the classic tab-separated two-line table and deflate
    /// it, for the write path.
    pub fn emit(&self, keys_in_order: &[&str]) -> Vec<u8> {
        let key_line = keys_in_order.join("\t");
        let val_line = keys_in_order
            .iter()
            .map(|k| self.metadata.get(*k).map(String::as_str).unwrap_or(""))
            .collect::<Vec<_>>()
            .join("\t");
        let text = format!("1\n{key_line}\n{val_line}\n");

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(text.as_bytes()).expect("in-memory zlib write");
        encoder.finish().expect("in-memory zlib finish")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_case_metadata() {
        let mut header = HeaderSection::default();
        header.metadata.insert("c".to_string(), "CASE-1".to_string());
        header.metadata.insert("e".to_string(), "J. Doe".to_string());
        let compressed = header.emit(&["c", "e"]);

        let parsed = HeaderSection::parse(&compressed).unwrap();
        assert_eq!(parsed.metadata.get("c"), Some(&"CASE-1".to_string()));
        assert_eq!(parsed.metadata.get("e"), Some(&"J. Doe".to_string()));
    }

    #[test]
    fn header2_overrides_header() {
        let mut base = HeaderSection::default();
        base.metadata.insert("c".to_string(), "ascii-case".to_string());
        let mut header2 = HeaderSection::default();
        header2.metadata.insert("c".to_string(), "utf16-case".to_string());

        base.merge_overriding(header2);
        assert_eq!(base.metadata.get("c"), Some(&"utf16-case".to_string()));
    }
}
