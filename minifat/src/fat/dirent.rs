//! 32-byte directory entries and 8.3 short names.
use super::{Cluster, FsError, FsResult, date::DateTime, le};

/// Size of a directory entry in bytes (always 32 bytes)
pub const DIR_ENTRY_SIZE: usize = 32;

/// Byte offsets inside a directory entry.
mod offset {
    pub const NAME: usize = 0;
    pub const ATTRIBUTES: usize = 11;
    pub const NT_FLAGS: usize = 12;
    pub const CREATION_TENTHS: usize = 13;
    pub const CREATION_TIME: usize = 14;
    pub const CREATION_DATE: usize = 16;
    pub const ACCESS_DATE: usize = 18;
    pub const CLUSTER_HIGH: usize = 0x14;
    pub const WRITE_TIME: usize = 22;
    pub const WRITE_DATE: usize = 24;
    pub const CLUSTER_LOW: usize = 0x1A;
    pub const FILE_SIZE: usize = 0x1C;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Directory entry attributes
pub struct Attributes(u8);

impl Attributes {
    /// Read-only attribute
    pub const READ_ONLY: u8 = 0x01;
    /// Hidden attribute
    pub const HIDDEN: u8 = 0x02;
    /// System attribute
    pub const SYSTEM: u8 = 0x04;
    /// Volume ID attribute
    pub const VOLUME_ID: u8 = 0x08;
    /// Directory attribute
    pub const DIRECTORY: u8 = 0x10;
    /// Archive attribute
    pub const ARCHIVE: u8 = 0x20;
    /// Long file name attribute
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    /// Long file name mask
    pub const LONG_NAME_MASK: u8 = Self::LONG_NAME | Self::DIRECTORY | Self::ARCHIVE;

    #[must_use]
    #[inline]
    pub const fn new(attributes: u8) -> Self {
        Self(attributes)
    }

    #[must_use]
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is read-only
    pub const fn is_read_only(self) -> bool {
        self.0 & Self::READ_ONLY != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a volume ID
    pub const fn is_volume_id(self) -> bool {
        self.0 & Self::VOLUME_ID != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a directory
    pub const fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a long file name fragment
    pub const fn is_long_name(self) -> bool {
        (self.0 & Self::LONG_NAME_MASK) == Self::LONG_NAME
    }
}

/// Characters that may not appear in a short name.
const FORBIDDEN: &[u8] = b"\"*+,/:;<=>?[\\]|.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// An 8.3 name, uppercased and space padded as stored on disk.
pub struct ShortName {
    raw: [u8; 11],
    /// Lowercase hints stored in the NT reserved byte.
    case_flags: u8,
}

impl ShortName {
    /// Dot entry (current directory)
    pub const DOT: Self = Self::from_raw(*b".          ");
    /// Dotdot entry (parent directory)
    pub const DOTDOT: Self = Self::from_raw(*b"..         ");

    const BASE_LEN: usize = 8;
    const EXT_LEN: usize = 3;
    const LOWERCASE_BASE: u8 = 0x08;
    const LOWERCASE_EXT: u8 = 0x10;

    #[must_use]
    #[inline]
    pub const fn from_raw(raw: [u8; 11]) -> Self {
        Self { raw, case_flags: 0 }
    }

    /// Encodes a `name.ext` path component.
    ///
    /// Fails with `InvalidName` if the component does not fit the 8.3 format.
    pub fn new(name: &str) -> FsResult<Self> {
        match name {
            "." => return Ok(Self::DOT),
            ".." => return Ok(Self::DOTDOT),
            _ => {}
        }

        let (base, ext) = name.split_once('.').unwrap_or((name, ""));
        if base.is_empty() || base.len() > Self::BASE_LEN || ext.len() > Self::EXT_LEN {
            return Err(FsError::InvalidName);
        }

        let mut raw = [b' '; 11];
        let base_lower = Self::encode_part(base, &mut raw[..Self::BASE_LEN])?;
        let ext_lower = Self::encode_part(ext, &mut raw[Self::BASE_LEN..])?;

        let mut case_flags = 0;
        if base_lower {
            case_flags |= Self::LOWERCASE_BASE;
        }
        if ext_lower && !ext.is_empty() {
            case_flags |= Self::LOWERCASE_EXT;
        }
        Ok(Self { raw, case_flags })
    }

    /// Copies `part` uppercased into `dst`.
    ///
    /// Returns true if `part` had no uppercase letter.
    fn encode_part(part: &str, dst: &mut [u8]) -> FsResult<bool> {
        let mut lowercase = true;
        for (slot, &byte) in dst.iter_mut().zip(part.as_bytes()) {
            if !byte.is_ascii_graphic() || FORBIDDEN.contains(&byte) {
                return Err(FsError::InvalidName);
            }
            lowercase &= !byte.is_ascii_uppercase();
            *slot = byte.to_ascii_uppercase();
        }
        Ok(lowercase)
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 11] {
        &self.raw
    }

    #[must_use]
    #[inline]
    /// Returns the flags to store in the NT reserved byte.
    pub const fn case_flags(&self) -> u8 {
        self.case_flags
    }

    #[must_use]
    /// Returns true if the stored name `raw` designates this name.
    pub fn matches(&self, raw: &[u8]) -> bool {
        raw.len() >= self.raw.len() && raw[..self.raw.len()].eq_ignore_ascii_case(&self.raw)
    }
}

impl core::fmt::Display for ShortName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let base = self.raw[..Self::BASE_LEN].trim_ascii_end();
        let ext = self.raw[Self::BASE_LEN..].trim_ascii_end();
        for &byte in base {
            write!(f, "{}", char::from(byte))?;
        }
        if !ext.is_empty() {
            f.write_str(".")?;
            for &byte in ext {
                write!(f, "{}", char::from(byte))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// State of a directory slot, read from its first bytes.
pub enum SlotKind {
    /// The slot and every following one are unused.
    End,
    /// The slot held an entry that was deleted.
    Deleted,
    /// The slot holds a long file name fragment.
    LongName,
    /// The slot holds a short entry.
    Used,
}

impl SlotKind {
    /// Deleted entry marker (first byte)
    pub const DELETED_ENTRY: u8 = 0xE5;
    /// End of directory marker (first byte)
    pub const END_OF_ENTRIES: u8 = 0x00;

    #[must_use]
    pub fn of(slot: &[u8]) -> Self {
        match slot[offset::NAME] {
            Self::END_OF_ENTRIES => Self::End,
            Self::DELETED_ENTRY => Self::Deleted,
            _ if Attributes::new(slot[offset::ATTRIBUTES]).is_long_name() => Self::LongName,
            _ => Self::Used,
        }
    }

    #[must_use]
    #[inline]
    /// Returns true if a new entry may be stored in the slot.
    pub const fn is_reusable(self) -> bool {
        matches!(self, Self::End | Self::Deleted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A short directory entry, along with its location in the parent directory.
pub struct DirEntry {
    name: ShortName,
    attributes: Attributes,
    file_size: u32,
    starting_cluster: Cluster,
    modified: DateTime,
    parent_cluster: Cluster,
    parent_offset: u16,
}

impl DirEntry {
    #[must_use]
    /// Decodes the 32-byte `slot` found at `parent_offset` within `parent_cluster`.
    pub fn decode(slot: &[u8], parent_cluster: Cluster, parent_offset: u16) -> Self {
        let mut raw = [0; 11];
        raw.copy_from_slice(&slot[offset::NAME..offset::NAME + 11]);
        let high = u32::from(le::u16_at(slot, offset::CLUSTER_HIGH));
        let low = u32::from(le::u16_at(slot, offset::CLUSTER_LOW));

        Self {
            name: ShortName::from_raw(raw),
            attributes: Attributes::new(slot[offset::ATTRIBUTES]),
            file_size: le::u32_at(slot, offset::FILE_SIZE),
            starting_cluster: Cluster::new((high << 16) | low),
            modified: DateTime::decode(
                le::u16_at(slot, offset::WRITE_DATE),
                le::u16_at(slot, offset::WRITE_TIME),
            ),
            parent_cluster,
            parent_offset,
        }
    }

    #[must_use]
    /// Creates an empty archive entry named `name`, created at `stamp`.
    pub const fn new(
        name: ShortName,
        parent_cluster: Cluster,
        parent_offset: u16,
        stamp: DateTime,
    ) -> Self {
        Self {
            name,
            attributes: Attributes::new(Attributes::ARCHIVE),
            file_size: 0,
            starting_cluster: Cluster::FREE,
            modified: stamp,
            parent_cluster,
            parent_offset,
        }
    }

    /// Writes the whole entry into `slot`, using the modification time as creation time.
    pub fn encode(&self, slot: &mut [u8]) {
        let time = self.modified.time();
        slot[..DIR_ENTRY_SIZE].fill(0);
        slot[offset::NAME..offset::NAME + 11].copy_from_slice(self.name.as_bytes());
        slot[offset::NT_FLAGS] = self.name.case_flags();
        slot[offset::CREATION_TENTHS] = time.encode_tenths();
        le::put_u16(slot, offset::CREATION_TIME, time.encode());
        le::put_u16(slot, offset::CREATION_DATE, self.modified.date().encode());
        self.encode_metadata(slot);
    }

    /// Rewrites the entry stored in `slot`, keeping its name, case flags and creation time.
    pub fn encode_metadata(&self, slot: &mut [u8]) {
        let time = self.modified.time();
        let date = self.modified.date().encode();
        let [c0, c1, c2, c3] = self.starting_cluster.value().to_le_bytes();

        slot[offset::ATTRIBUTES] = self.attributes.bits();
        le::put_u16(slot, offset::ACCESS_DATE, date);
        le::put_u16(slot, offset::CLUSTER_HIGH, u16::from_le_bytes([c2, c3]));
        le::put_u16(slot, offset::CLUSTER_LOW, u16::from_le_bytes([c0, c1]));
        le::put_u16(slot, offset::WRITE_TIME, time.encode());
        le::put_u16(slot, offset::WRITE_DATE, date);
        le::put_u32(slot, offset::FILE_SIZE, self.file_size);
    }

    #[must_use]
    #[inline]
    pub const fn name(&self) -> &ShortName {
        &self.name
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        self.attributes
    }

    #[must_use]
    #[inline]
    pub const fn file_size(&self) -> u32 {
        self.file_size
    }

    #[must_use]
    #[inline]
    /// Returns the first cluster of the entry's data, `Cluster::FREE` for an empty file.
    pub const fn starting_cluster(&self) -> Cluster {
        self.starting_cluster
    }

    #[must_use]
    #[inline]
    /// Returns the last write time of the entry.
    pub const fn modified(&self) -> DateTime {
        self.modified
    }

    #[must_use]
    #[inline]
    /// Returns the cluster of the parent directory holding this entry.
    pub const fn parent_cluster(&self) -> Cluster {
        self.parent_cluster
    }

    #[must_use]
    #[inline]
    /// Returns the byte offset of this entry within `parent_cluster`.
    pub const fn parent_offset(&self) -> u16 {
        self.parent_offset
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.attributes.is_directory()
    }

    #[inline]
    pub(crate) const fn set_file_size(&mut self, file_size: u32) {
        self.file_size = file_size;
    }

    #[inline]
    pub(crate) const fn set_starting_cluster(&mut self, cluster: Cluster) {
        self.starting_cluster = cluster;
    }

    #[inline]
    pub(crate) const fn set_modified(&mut self, stamp: DateTime) {
        self.modified = stamp;
    }

    #[inline]
    pub(crate) const fn starting_cluster_mut(&mut self) -> &mut Cluster {
        &mut self.starting_cluster
    }
}
