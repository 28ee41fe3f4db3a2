//! Reader/writer engine for the Expert Witness Compression Format
//! (EWF/E01): a block-device abstraction over a set of segment files,
//! with per-chunk compression and checksums and an acquisition-hash
//! verification workflow.
//!
//! See [`ewf::handle::EwfHandle`] for the media handle and
//! [`ewf::verify::VerificationHandle`] for the verification driver.

pub mod error;
pub mod ewf;

pub use error::{EwfError, ErrorKind, Result};
pub use ewf::{CompressionMode, EwfHandle, VerificationHandle, VerificationReport};
