//! FAT32 volume boot record.
//!
//! The record is decoded field by field from the raw block, using the
//! offsets below, rather than by overlaying a packed structure.
use super::{FsError, FsResult, le};
use minifat_core::{
    static_assert,
    storage::{BLOCK_SIZE, Block},
};

/// Byte offsets of the fields used by minifat.
mod offset {
    pub const JUMP: usize = 0x00;
    pub const OEM_NAME: usize = 0x03;
    pub const BYTES_PER_SECTOR: usize = 0x0B;
    pub const SECTORS_PER_CLUSTER: usize = 0x0D;
    pub const RESERVED_SECTORS: usize = 0x0E;
    pub const FAT_COUNT: usize = 0x10;
    pub const TOTAL_SECTORS_16: usize = 0x13;
    pub const MEDIA_DESCRIPTOR: usize = 0x15;
    pub const SECTORS_PER_TRACK: usize = 0x18;
    pub const HEADS: usize = 0x1A;
    pub const HIDDEN_SECTORS: usize = 0x1C;
    pub const TOTAL_SECTORS_32: usize = 0x20;
    pub const SECTORS_PER_FAT: usize = 0x24;
    pub const ROOT_CLUSTER: usize = 0x2C;
    pub const FS_INFO_SECTOR: usize = 0x30;
    pub const BACKUP_BOOT_SECTOR: usize = 0x32;
    pub const DRIVE_NUMBER: usize = 0x40;
    pub const BOOT_SIGNATURE: usize = 0x42;
    pub const VOLUME_ID: usize = 0x43;
    pub const VOLUME_LABEL: usize = 0x47;
    pub const FS_TYPE: usize = 0x52;
    pub const SIGNATURE: usize = 0x1FE;
}

static_assert!(offset::SIGNATURE + BOOT_SIGNATURE.len() == BLOCK_SIZE);

/// Filesystem type string of a FAT32 boot sector.
const FS_TYPE: &[u8; 8] = b"FAT32   ";
/// Only the first five bytes are significant when identifying FAT32.
const FS_TYPE_SIGNIFICANT: usize = 5;

/// Trailing signature of boot records.
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 boot sector fields.
pub struct BootSector {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    total_sectors: u32,
    media_descriptor: u8,
    hidden_sectors: u32,
    sectors_per_fat: u32,
    root_cluster: u32,
    fs_info_sector: u16,
    backup_boot_sector: u16,
    volume_id: u32,
    volume_label: [u8; 11],
}

impl Default for BootSector {
    fn default() -> Self {
        Self {
            bytes_per_sector: 512,
            sectors_per_cluster: 8,
            reserved_sectors: 32,
            fat_count: 2,
            total_sectors: 0,
            media_descriptor: 0xF8,
            hidden_sectors: 0,
            sectors_per_fat: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            volume_id: 0,
            volume_label: *b"NO NAME    ",
        }
    }
}

impl BootSector {
    /// Decodes the boot sector held in `block`.
    ///
    /// Fails with `UnsupportedFilesystem` if the block does not describe a FAT32 volume.
    pub fn decode(block: &Block) -> FsResult<Self> {
        if block[offset::FS_TYPE..offset::FS_TYPE + FS_TYPE_SIGNIFICANT]
            != FS_TYPE[..FS_TYPE_SIGNIFICANT]
        {
            return Err(FsError::UnsupportedFilesystem);
        }

        let total_sectors = match le::u16_at(block, offset::TOTAL_SECTORS_16) {
            0 => le::u32_at(block, offset::TOTAL_SECTORS_32),
            small => u32::from(small),
        };

        let mut volume_label = [0; 11];
        volume_label.copy_from_slice(&block[offset::VOLUME_LABEL..offset::VOLUME_LABEL + 11]);

        Ok(Self {
            bytes_per_sector: le::u16_at(block, offset::BYTES_PER_SECTOR),
            sectors_per_cluster: block[offset::SECTORS_PER_CLUSTER],
            reserved_sectors: le::u16_at(block, offset::RESERVED_SECTORS),
            fat_count: block[offset::FAT_COUNT],
            total_sectors,
            media_descriptor: block[offset::MEDIA_DESCRIPTOR],
            hidden_sectors: le::u32_at(block, offset::HIDDEN_SECTORS),
            sectors_per_fat: le::u32_at(block, offset::SECTORS_PER_FAT),
            root_cluster: le::u32_at(block, offset::ROOT_CLUSTER),
            fs_info_sector: le::u16_at(block, offset::FS_INFO_SECTOR),
            backup_boot_sector: le::u16_at(block, offset::BACKUP_BOOT_SECTOR),
            volume_id: le::u32_at(block, offset::VOLUME_ID),
            volume_label,
        })
    }

    /// Encodes the boot sector into `block`, signature included.
    pub fn encode(&self, block: &mut Block) {
        block.fill(0);
        block[offset::JUMP..offset::JUMP + 3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        block[offset::OEM_NAME..offset::OEM_NAME + 8].copy_from_slice(b"MINIFAT ");
        le::put_u16(block, offset::BYTES_PER_SECTOR, self.bytes_per_sector);
        block[offset::SECTORS_PER_CLUSTER] = self.sectors_per_cluster;
        le::put_u16(block, offset::RESERVED_SECTORS, self.reserved_sectors);
        block[offset::FAT_COUNT] = self.fat_count;
        match u16::try_from(self.total_sectors) {
            Ok(small) => le::put_u16(block, offset::TOTAL_SECTORS_16, small),
            Err(_) => le::put_u32(block, offset::TOTAL_SECTORS_32, self.total_sectors),
        }
        block[offset::MEDIA_DESCRIPTOR] = self.media_descriptor;
        le::put_u16(block, offset::SECTORS_PER_TRACK, 63);
        le::put_u16(block, offset::HEADS, 255);
        le::put_u32(block, offset::HIDDEN_SECTORS, self.hidden_sectors);
        le::put_u32(block, offset::SECTORS_PER_FAT, self.sectors_per_fat);
        le::put_u32(block, offset::ROOT_CLUSTER, self.root_cluster);
        le::put_u16(block, offset::FS_INFO_SECTOR, self.fs_info_sector);
        le::put_u16(block, offset::BACKUP_BOOT_SECTOR, self.backup_boot_sector);
        block[offset::DRIVE_NUMBER] = 0x80;
        block[offset::BOOT_SIGNATURE] = 0x29;
        le::put_u32(block, offset::VOLUME_ID, self.volume_id);
        block[offset::VOLUME_LABEL..offset::VOLUME_LABEL + 11].copy_from_slice(&self.volume_label);
        block[offset::FS_TYPE..offset::FS_TYPE + 8].copy_from_slice(FS_TYPE);
        block[offset::SIGNATURE..].copy_from_slice(&BOOT_SIGNATURE);
    }

    /// Checks that the geometry can be handled by minifat.
    pub fn validate(&self) -> FsResult<()> {
        let supported = usize::from(self.bytes_per_sector) == BLOCK_SIZE
            && self.sectors_per_cluster.is_power_of_two()
            && self.reserved_sectors > 0
            && self.fat_count > 0
            && self.sectors_per_fat > 0
            && self.root_cluster >= 2;
        if supported {
            Ok(())
        } else {
            Err(FsError::UnsupportedFilesystem)
        }
    }

    #[must_use]
    #[inline]
    pub const fn with_sectors_per_cluster(mut self, sectors_per_cluster: u8) -> Self {
        self.sectors_per_cluster = sectors_per_cluster;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_reserved_sectors(mut self, reserved_sectors: u16) -> Self {
        self.reserved_sectors = reserved_sectors;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_fat_count(mut self, fat_count: u8) -> Self {
        self.fat_count = fat_count;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_total_sectors(mut self, total_sectors: u32) -> Self {
        self.total_sectors = total_sectors;
        self
    }

    #[must_use]
    #[inline]
    /// Sets the number of sectors preceding the volume on the medium.
    pub const fn with_hidden_sectors(mut self, hidden_sectors: u32) -> Self {
        self.hidden_sectors = hidden_sectors;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_sectors_per_fat(mut self, sectors_per_fat: u32) -> Self {
        self.sectors_per_fat = sectors_per_fat;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_root_cluster(mut self, root_cluster: u32) -> Self {
        self.root_cluster = root_cluster;
        self
    }

    #[must_use]
    #[inline]
    /// Sets the FSInfo and backup boot sector locations, relative to the volume start.
    ///
    /// `0` means absent.
    pub const fn with_aux_sectors(mut self, fs_info_sector: u16, backup_boot_sector: u16) -> Self {
        self.fs_info_sector = fs_info_sector;
        self.backup_boot_sector = backup_boot_sector;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_volume_id(mut self, volume_id: u32) -> Self {
        self.volume_id = volume_id;
        self
    }

    #[must_use]
    #[inline]
    pub const fn with_volume_label(mut self, volume_label: [u8; 11]) -> Self {
        self.volume_label = volume_label;
        self
    }

    #[must_use]
    #[inline]
    /// Returns the number of bytes per sector.
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors per cluster.
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors before the first FAT.
    pub const fn reserved_sectors(&self) -> u16 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    /// Returns the number of FATs.
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors in the volume, or 0 if unknown.
    pub const fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    #[must_use]
    #[inline]
    /// Returns the media descriptor.
    ///
    /// Example: 0xF8 for fixed disk and 0xF0 for removable disk.
    pub const fn media_descriptor(&self) -> u8 {
        self.media_descriptor
    }

    #[must_use]
    #[inline]
    pub const fn hidden_sectors(&self) -> u32 {
        self.hidden_sectors
    }

    #[must_use]
    #[inline]
    /// Returns the number of sectors in each FAT.
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    /// Returns the first cluster of the root directory.
    pub const fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn fs_info_sector(&self) -> u16 {
        self.fs_info_sector
    }

    #[must_use]
    #[inline]
    pub const fn backup_boot_sector(&self) -> u16 {
        self.backup_boot_sector
    }

    #[must_use]
    #[inline]
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }

    #[must_use]
    #[inline]
    pub const fn volume_label(&self) -> &[u8; 11] {
        &self.volume_label
    }
}
