//! Expert Witness Compression Format reader/writer engine.
//!
//! Module layout mirrors the teacher's single-file `ewf.rs`, split along
//! the seams spec.md draws between the wire codec (`section`, `header`,
//! `volume`, `offset_table`, `segment_file`), the chunk pipeline
//! (`checksum`, `pipeline`, `cache`), the public façade (`handle`) and the
//! acquisition-hash surfaces (`hash`, `verify`).

pub mod cache;
pub mod checksum;
pub mod handle;
pub mod hash;
pub mod header;
pub mod offset_table;
pub mod pipeline;
pub mod section;
pub mod segment_file;
pub mod verify;
pub mod volume;

pub use handle::EwfHandle;
pub use pipeline::CompressionMode;
pub use verify::{VerificationHandle, VerificationReport};
