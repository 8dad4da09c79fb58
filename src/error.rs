//! Error types for image lookup and load-command decoding.

use thiserror::Error;

/// Everything that can go wrong while locating an image or walking its
/// load commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// No loaded image has this base name, or the command stream lacks
    /// the requested record.
    #[error("not found: {0}")]
    NotFound(String),

    /// The loader has no header for this index (out of range or unloaded).
    #[error("no header for image index {index}")]
    InvalidHeader {
        /// The index that was queried.
        index: u32,
    },

    /// The header is not a native-endian 64-bit Mach-O header.
    #[error("unsupported image format (magic {magic:#010x})")]
    UnsupportedFormat {
        /// The magic number read from the header.
        magic: u32,
    },

    /// The command stream does not fit inside its declared bounds.
    #[error("malformed load command at offset {offset:#x}: {reason}")]
    Malformed {
        /// Byte offset from the start of the header.
        offset: usize,
        /// What check failed.
        reason: &'static str,
    },

    /// Growing the section collection failed.
    #[error("allocation failure while collecting sections")]
    AllocationFailure,
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
