//! Segment file framing: the 13-byte file header every `.E01`/`.E02`/...
//! member starts with, and discovery of the sibling segments that make up
//! one multi-part image (spec.md §4.1, §6).
//!
//! `find_segments` is the teacher's `find_files` almost verbatim — it
//! globs the parent directory for the same basename with its numeric
//! suffix wildcarded out, which is the convention `ewfacquire` itself
//! uses when splitting an image across `.E01`, `.E02`, ...

use crate::error::{EwfError, ErrorKind, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const FILE_HEADER_SIZE: u64 = 13;

const SIGNATURE_E01: [u8; 8] = [0x45, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];
const SIGNATURE_L01: [u8; 8] = [0x4d, 0x56, 0x46, 0x09, 0x0d, 0x0a, 0xff, 0x00];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flavor {
    E01,
    L01,
}

impl Flavor {
    fn signature(self) -> [u8; 8] {
        match self {
            Flavor::E01 => SIGNATURE_E01,
            Flavor::L01 => SIGNATURE_L01,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SegmentFileHeader {
    pub flavor: Flavor,
    pub segment_number: u16,
}

/// Parse and validate the 13-byte header at the start of a segment file.
pub fn read_header(file: &mut File) -> Result<SegmentFileHeader> {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut header)?;

    let signature: [u8; 8] = header[0..8].try_into().unwrap();
    let flavor = if signature == SIGNATURE_E01 {
        Flavor::E01
    } else if signature == SIGNATURE_L01 {
        Flavor::L01
    } else {
        return Err(EwfError::from(ErrorKind::InvalidFormat(
            "segment file signature matches neither E01 nor L01".to_string(),
        )));
    };

    if header[8] != 1 || header[11..13] != [0u8; 2] {
        return Err(EwfError::from(ErrorKind::InvalidFormat(
            "segment file header control fields are not the expected constants".to_string(),
        )));
    }

    Ok(SegmentFileHeader {
        flavor,
        segment_number: u16::from_le_bytes(header[9..11].try_into().unwrap()),
    })
}

/// Write the 13-byte segment file header.
pub fn write_header(file: &mut File, flavor: Flavor, segment_number: u16) -> Result<()> {
    let mut header = [0u8; FILE_HEADER_SIZE as usize];
    header[0..8].copy_from_slice(&flavor.signature());
    header[8] = 1;
    header[9..11].copy_from_slice(&segment_number.to_le_bytes());
    file.write_all(&header)?;
    Ok(())
}

/// Locate every segment of the image `path` belongs to: glob the parent
/// directory for the same basename with its two-character numeric suffix
/// wildcarded, then sort (`.E01` < `.E02` < ... < `.EAA` alphabetically,
/// matching the on-disk segment-number order).
pub fn find_segments(path: &Path) -> Result<Vec<PathBuf>> {
    let path = path.canonicalize().map_err(|e| {
        EwfError::from(ErrorKind::NotFound(format!(
            "cannot resolve path {}: {e}",
            path.display()
        )))
    })?;
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| EwfError::from(ErrorKind::InvalidArgument("invalid file name".to_string())))?;

    if filename.len() < 2 {
        return Err(EwfError::from(ErrorKind::InvalidArgument(
            "file name too short to carry a segment suffix".to_string(),
        )));
    }

    let base_filename = &filename[..filename.len() - 2];
    let parent = path
        .parent()
        .ok_or_else(|| EwfError::from(ErrorKind::InvalidArgument("no parent directory".to_string())))?;

    let mut pattern_path = PathBuf::from(parent);
    pattern_path.push(format!("{base_filename}??"));
    let pattern = pattern_path
        .to_str()
        .ok_or_else(|| EwfError::from(ErrorKind::InvalidArgument("non-UTF-8 path".to_string())))?;

    let matches = glob::glob(pattern).map_err(|e| {
        EwfError::from(ErrorKind::InvalidArgument(format!("glob pattern error: {e}")))
    })?;
    let mut paths: Vec<PathBuf> = matches.filter_map(std::result::Result::ok).collect();
    paths.sort();

    if paths.is_empty() {
        return Err(EwfError::from(ErrorKind::NotFound(format!(
            "no segment files matched pattern {pattern}"
        ))));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_segment_header() {
        let mut file = tempfile::tempfile().unwrap();
        write_header(&mut file, Flavor::E01, 1).unwrap();
        let header = read_header(&mut file).unwrap();
        assert_eq!(header.flavor, Flavor::E01);
        assert_eq!(header.segment_number, 1);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0u8; FILE_HEADER_SIZE as usize]).unwrap();
        assert!(read_header(&mut file).is_err());
    }

    #[test]
    fn finds_sibling_segments_sorted() {
        let dir = tempdir().unwrap();
        for name in ["case.E02", "case.E01", "case.E03"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let segments = find_segments(&dir.path().join("case.E01")).unwrap();
        let names: Vec<_> = segments
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["case.E01", "case.E02", "case.E03"]);
    }
}
