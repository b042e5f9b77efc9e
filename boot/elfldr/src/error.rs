//! # Error Types
//!
//! Failures the loader reports back to its caller. Everything after the
//! point of no return is unreported: control either reaches the image or
//! never comes back.

use core::fmt;

use helix_relocation::RelocError;

/// Result type for loader operations
pub type LoadResult<T> = Result<T, LoadError>;

/// Loader error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// Storage open/stat/read failed with the collaborator's negative code
    Storage(i32),
    /// Device-tree blob exceeds the staging region
    DeviceTreeTooLarge {
        /// Blob size in bytes
        size: usize,
        /// Largest accepted size in bytes
        max: usize,
    },
    /// The transfer trampoline could not be bound
    Relocation(RelocError),
    /// A caller passed a negative buffer length
    InvalidLength(i32),
}

impl LoadError {
    /// Negative integer code for C-style callers
    pub fn errno(&self) -> i32 {
        match self {
            Self::Storage(code) => *code,
            Self::DeviceTreeTooLarge { .. } => -27, // EFBIG
            Self::Relocation(_) => -8,              // ENOEXEC
            Self::InvalidLength(_) => -22,          // EINVAL
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(code) => write!(f, "Storage error {}", code),
            Self::DeviceTreeTooLarge { max, .. } => {
                write!(f, "Device tree too big (> {} bytes) !", max)
            },
            Self::Relocation(e) => write!(f, "Relocation error: {}", e),
            Self::InvalidLength(len) => write!(f, "Invalid buffer length {}", len),
        }
    }
}

/// Buffer length as passed by C callers
///
/// Checked before any slice is formed over the buffer.
pub fn buffer_len(len: i32) -> LoadResult<usize> {
    usize::try_from(len).map_err(|_| LoadError::InvalidLength(len))
}

impl From<RelocError> for LoadError {
    fn from(e: RelocError) -> Self {
        Self::Relocation(e)
    }
}
