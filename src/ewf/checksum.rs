//! The format's own per-section and per-chunk checksum.
//!
//! EWF calls this an "Adler-32" checksum; libewf in fact computes a plain
//! Adler-32 over the covered bytes. The algorithm itself is out of scope
//! here (spec.md §1) — this module is a thin, named wrapper around the
//! `adler32` crate so every call site states its intent (`section` vs.
//! `chunk`) instead of reaching for the primitive directly.

use adler32::RollingAdler32;

/// Adler-32-style checksum over `data`, as stored (little-endian) in every
/// section header and every chunk trailer.
pub fn compute(data: &[u8]) -> u32 {
    RollingAdler32::from_buffer(data).hash()
}

pub fn verify(data: &[u8], expected: u32) -> bool {
    compute(data) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_stable() {
        assert_eq!(compute(&[]), compute(&[]));
    }

    #[test]
    fn detects_single_bit_flip() {
        let a = vec![0x41u8; 4096];
        let mut b = a.clone();
        b[100] ^= 0x01;
        assert_ne!(compute(&a), compute(&b));
    }
}
