//! Acquisition hash values: the `hash`/`digest` sections record the MD5
//! and SHA-1 the acquisition tool computed over the media while writing
//! the image (spec.md §3, §9).
//!
//! Two on-disk shapes exist. The legacy `hash` section is a fixed binary
//! layout (MD5 digest + reserved + checksum); `digest` additionally
//! carries SHA-1. Either can be shadowed by a `hash`-identifier table
//! stored the same way as the acquisition metadata table in
//! [`crate::ewf::header`]. Per spec.md §9's resolution of the two-source
//! ambiguity, callers should prefer the hash-value table and fall back to
//! the binary stored digest.

use crate::error::{EwfError, ErrorKind, Result};
use crate::ewf::checksum;
use std::collections::HashMap;

const LEGACY_HASH_SECTION_SIZE: usize = 36;
const DIGEST_SECTION_SIZE: usize = 84;

/// `{identifier -> hex digest}`, e.g. `"MD5" -> "d41d8cd9..."`, decoded
/// from a `hash`/`digest`'s identifier table the same way `header` is.
#[derive(Default, Clone, Debug)]
pub struct HashValues {
    by_id: HashMap<String, String>,
}

impl HashValues {
    pub fn from_table(by_id: HashMap<String, String>) -> Self {
        Self { by_id }
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.by_id.get(identifier).map(String::as_str)
    }

    pub fn insert(&mut self, identifier: impl Into<String>, value: impl Into<String>) {
        self.by_id.insert(identifier.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.by_id.iter()
    }
}

/// Parse the legacy binary `hash` section: 16-byte MD5, 16 bytes reserved,
/// 4-byte checksum over the first 32 bytes.
pub fn parse_legacy_hash_section(body: &[u8]) -> Result<[u8; 16]> {
    if body.len() < LEGACY_HASH_SECTION_SIZE {
        return Err(EwfError::from(ErrorKind::InvalidFormat(format!(
            "hash section body too short ({} bytes)",
            body.len()
        ))));
    }
    let stored_checksum = u32::from_le_bytes(body[32..36].try_into().unwrap());
    if !checksum::verify(&body[0..32], stored_checksum) {
        return Err(EwfError::from(ErrorKind::InvalidFormat(
            "hash section checksum mismatch".to_string(),
        )));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&body[0..16]);
    Ok(md5)
}

pub fn emit_legacy_hash_section(md5: &[u8; 16]) -> Vec<u8> {
    let mut body = vec![0u8; LEGACY_HASH_SECTION_SIZE];
    body[0..16].copy_from_slice(md5);
    let crc = checksum::compute(&body[0..32]);
    body[32..36].copy_from_slice(&crc.to_le_bytes());
    body
}

/// Parse the `digest` section: 16-byte MD5, 20-byte SHA-1, 44 bytes
/// padding, 4-byte checksum over the first 80 bytes.
pub fn parse_digest_section(body: &[u8]) -> Result<([u8; 16], [u8; 20])> {
    if body.len() < DIGEST_SECTION_SIZE {
        return Err(EwfError::from(ErrorKind::InvalidFormat(format!(
            "digest section body too short ({} bytes)",
            body.len()
        ))));
    }
    let stored_checksum = u32::from_le_bytes(body[80..84].try_into().unwrap());
    if !checksum::verify(&body[0..80], stored_checksum) {
        return Err(EwfError::from(ErrorKind::InvalidFormat(
            "digest section checksum mismatch".to_string(),
        )));
    }
    let mut md5 = [0u8; 16];
    md5.copy_from_slice(&body[0..16]);
    let mut sha1 = [0u8; 20];
    sha1.copy_from_slice(&body[16..36]);
    Ok((md5, sha1))
}

pub fn emit_digest_section(md5: &[u8; 16], sha1: &[u8; 20]) -> Vec<u8> {
    let mut body = vec![0u8; DIGEST_SECTION_SIZE];
    body[0..16].copy_from_slice(md5);
    body[16..36].copy_from_slice(sha1);
    let crc = checksum::compute(&body[0..80]);
    body[80..84].copy_from_slice(&crc.to_le_bytes());
    body
}

/// Resolve a stored digest for `identifier` ("MD5" or "SHA1"), preferring
/// the hash-value table and falling back to the binary stored digest.
pub fn resolve_stored(identifier: &str, table: &HashValues, legacy_md5: Option<&[u8; 16]>, digest: Option<(&[u8; 16], &[u8; 20])>) -> Option<String> {
    if let Some(v) = table.get(identifier) {
        return Some(v.to_string());
    }
    match identifier {
        "MD5" => digest
            .map(|(md5, _)| hex::encode(md5))
            .or_else(|| legacy_md5.map(hex::encode)),
        "SHA1" => digest.map(|(_, sha1)| hex::encode(sha1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_legacy_hash_section() {
        let md5 = [0xAAu8; 16];
        let body = emit_legacy_hash_section(&md5);
        assert_eq!(parse_legacy_hash_section(&body).unwrap(), md5);
    }

    #[test]
    fn round_trips_digest_section() {
        let md5 = [0x11u8; 16];
        let sha1 = [0x22u8; 20];
        let body = emit_digest_section(&md5, &sha1);
        let (parsed_md5, parsed_sha1) = parse_digest_section(&body).unwrap();
        assert_eq!(parsed_md5, md5);
        assert_eq!(parsed_sha1, sha1);
    }

    #[test]
    fn resolve_prefers_hash_value_table_over_binary() {
        let mut map = HashMap::new();
        map.insert("MD5".to_string(), "deadbeef".to_string());
        let table = HashValues::from_table(map);
        let legacy = [0xAAu8; 16];
        let resolved = resolve_stored("MD5", &table, Some(&legacy), None);
        assert_eq!(resolved.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn resolve_falls_back_to_binary_when_table_empty() {
        let table = HashValues::default();
        let legacy = [0xABu8; 16];
        let resolved = resolve_stored("MD5", &table, Some(&legacy), None);
        assert_eq!(resolved.as_deref(), Some(hex::encode(legacy)).as_deref());
    }
}
