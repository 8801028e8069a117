//! FAT32 structural engine.
use thiserror::Error;

pub mod bs;
pub mod date;
pub mod dir;
pub mod dirent;
#[expect(clippy::module_inception, reason = "FS is named after this table")]
pub mod fat;
pub mod file;
pub mod layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Cluster(u32);

impl Cluster {
    /// Marker used by empty files, which own no cluster.
    pub const FREE: Self = Self(0);
    /// First cluster of the data region.
    pub const FIRST_DATA: Self = Self(2);

    const MAX_VALID: u32 = 0x0FFF_FFF6;

    #[must_use]
    #[inline]
    pub const fn new(cluster: u32) -> Self {
        Self(cluster)
    }

    #[must_use]
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns true if this cluster can hold data.
    pub const fn is_valid(self) -> bool {
        self.0 >= Self::FIRST_DATA.0 && self.0 <= Self::MAX_VALID
    }

    #[must_use]
    #[inline]
    pub const fn is_free(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for Cluster {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Error type for filesystem operations
pub enum FsError {
    #[error("Medium read failed")]
    MediumReadFailed,
    #[error("Medium write failed")]
    MediumWriteFailed,
    #[error("Boot signature mismatch")]
    SignatureMismatch,
    #[error("Unsupported filesystem")]
    UnsupportedFilesystem,
    #[error("Invalid partition number")]
    InvalidPartition,
    #[error("File not found")]
    FileNotFound,
    #[error("Not a directory")]
    NotADirectory,
    #[error("Invalid file name")]
    InvalidName,
    #[error("End of cluster chain")]
    EndOfChain,
    #[error("Corrupted cluster chain")]
    CorruptedChain,
    #[error("No free cluster left")]
    NoSpace,
    #[error("Invalid offset")]
    InvalidOffset,
    #[error("Access denied")]
    AccessDenied,
    #[error("Unsupported open mode")]
    UnsupportedMode,
}

pub type FsResult<T> = Result<T, FsError>;

/// Little-endian field accessors over raw records.
///
/// Callers guarantee that `offset + width` lies within the slice.
pub(crate) mod le {
    #[must_use]
    #[inline]
    pub fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    #[must_use]
    #[inline]
    pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[inline]
    pub fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
        bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
        bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
