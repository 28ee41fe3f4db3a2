//! Verification driver: streaming re-read of the media stream with
//! rolling MD5/SHA-1, reporting computed-vs-stored without ever comparing
//! itself (spec.md §4.5, §6).
//!
//! Grounded on `verification_handle.c` (`original_source/ewftools/`):
//! `prepare_read_buffer` + `read_buffer` + `update_integrity_hash` collapse
//! here into [`VerificationHandle::run`]'s chunk loop, and `finalize`
//! keeps the same "report both sides, let the caller decide" contract.
//! `checksum_errors_fprint`'s habit of collapsing consecutive identical
//! segment filenames when printing sector ranges is preserved in
//! [`VerificationHandle::checksum_errors_fprint`].

use crate::error::{EwfError, ErrorKind, Result};
use crate::ewf::handle::EwfHandle;
use md5::{Digest, Md5};
use sha1::Sha1;
use std::fmt::Write as _;

pub struct VerificationReport {
    pub md5_computed: Option<String>,
    pub md5_stored: Option<String>,
    pub md5_available: bool,
    pub sha1_computed: Option<String>,
    pub sha1_stored: Option<String>,
    pub sha1_available: bool,
    pub number_of_checksum_errors: usize,
}

pub struct VerificationHandle {
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    bytes_hashed: u64,
}

impl VerificationHandle {
    pub fn initialize(calc_md5: bool, calc_sha1: bool) -> Self {
        VerificationHandle {
            md5: calc_md5.then(Md5::new),
            sha1: calc_sha1.then(Sha1::new),
            bytes_hashed: 0,
        }
    }

    pub fn update_integrity_hash(&mut self, data: &[u8]) {
        if let Some(md5) = &mut self.md5 {
            md5.update(data);
        }
        if let Some(sha1) = &mut self.sha1 {
            sha1.update(data);
        }
        self.bytes_hashed += data.len() as u64;
    }

    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }

    /// Linear scan of `handle`'s media, chunk 0 .. `number_of_chunks`,
    /// feeding each chunk's bytes (truncated to the remaining media size
    /// for a short last chunk) into the selected digests. Stops with
    /// `Aborted` the moment the handle's abort flag is observed.
    pub fn run(&mut self, handle: &mut EwfHandle) -> Result<VerificationReport> {
        let media_size = handle.get_media_size();
        let mut remaining = media_size;
        let mut chunk_number = 0u32;

        while remaining > 0 {
            if handle.is_aborted() {
                return Err(EwfError::from(ErrorKind::Aborted));
            }
            let data = handle.read_chunk(chunk_number)?;
            let take = remaining.min(data.len() as u64) as usize;
            self.update_integrity_hash(&data[..take]);
            remaining -= take as u64;
            chunk_number += 1;
        }

        Ok(self.finalize(handle))
    }

    fn finalize(&self, handle: &EwfHandle) -> VerificationReport {
        let md5_computed = self.md5.clone().map(|d| hex::encode(d.finalize()));
        let sha1_computed = self.sha1.clone().map(|d| hex::encode(d.finalize()));
        let md5_stored = handle.get_hash_value("MD5");
        let sha1_stored = handle.get_hash_value("SHA1");

        VerificationReport {
            md5_available: md5_stored.is_some(),
            sha1_available: sha1_stored.is_some(),
            md5_computed,
            md5_stored,
            sha1_computed,
            sha1_stored,
            number_of_checksum_errors: handle.get_number_of_checksum_errors(),
        }
    }

    pub fn additional_hash_values_fprint(&self, report: &VerificationReport) -> String {
        let mut out = String::new();
        if let Some(computed) = &report.md5_computed {
            let _ = writeln!(out, "MD5 hash calculated over data:\t{computed}");
            if report.md5_available {
                let _ = writeln!(out, "MD5 hash stored in file:\t{}", report.md5_stored.as_deref().unwrap_or(""));
            } else {
                let _ = writeln!(out, "MD5 hash stored in file:\tN/A");
            }
        }
        if let Some(computed) = &report.sha1_computed {
            let _ = writeln!(out, "SHA1 hash calculated over data:\t{computed}");
            if report.sha1_available {
                let _ = writeln!(out, "SHA1 hash stored in file:\t{}", report.sha1_stored.as_deref().unwrap_or(""));
            } else {
                let _ = writeln!(out, "SHA1 hash stored in file:\tN/A");
            }
        }
        out
    }

    /// Render `handle`'s checksum error list as sector ranges, collapsing
    /// consecutive entries that share the same segment filename into one
    /// line (`verification_handle.c`'s `checksum_errors_fprint` habit).
    pub fn checksum_errors_fprint(&self, handle: &EwfHandle) -> String {
        let mut out = String::new();
        let errors = handle.checksum_errors();
        if errors.is_empty() {
            return out;
        }

        let mut i = 0;
        while i < errors.len() {
            let start = errors[i].start_sector;
            let mut count = errors[i].sector_count;
            let filename = errors[i].filename.clone();
            let mut j = i + 1;
            while j < errors.len() && errors[j].filename == filename && errors[j].start_sector == start + count {
                count += errors[j].sector_count;
                j += 1;
            }
            let _ = writeln!(out, "{start}\t{count}\t{filename}");
            i = j;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_media_hashes_match_known_digests() {
        let mut verifier = VerificationHandle::initialize(true, true);
        verifier.update_integrity_hash(&[]);
        let md5 = hex::encode(verifier.md5.clone().unwrap().finalize());
        let sha1 = hex::encode(verifier.sha1.clone().unwrap().finalize());
        assert_eq!(md5, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(sha1, "da39a3ee5e6b4b01b49c1478f1a9a4e18b8a0e40");
    }

    #[test]
    fn checksum_errors_fprint_collapses_adjacent_ranges() {
        use crate::ewf::handle::EwfHandle;

        let mut handle = EwfHandle::initialize();
        handle.append_checksum_error("case.E01".to_string(), 0, 64);
        handle.append_checksum_error("case.E01".to_string(), 64, 64);
        handle.append_checksum_error("case.E02".to_string(), 128, 64);

        let verifier = VerificationHandle::initialize(false, false);
        let rendered = verifier.checksum_errors_fprint(&handle);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "0\t128\tcase.E01");
        assert_eq!(lines[1], "128\t64\tcase.E02");
    }
}
