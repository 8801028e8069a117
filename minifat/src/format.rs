//! Creation of blank FAT32 volumes.
use crate::{
    BlockMedium,
    cache::SectorCache,
    fat::{
        FsError, FsResult,
        bs::BootSector,
        fat::{FatEntry, fat32},
        layout::{SLOTS_PER_BLOCK, VolumeLayout},
        le,
    },
    partition::{FAT32_LBA, PartitionEntry},
};

mod fs_info {
    pub const LEAD_SIGNATURE: usize = 0;
    pub const STRUCT_SIGNATURE: usize = 484;
    pub const FREE_COUNT: usize = 488;
    pub const NEXT_FREE: usize = 492;
    pub const TRAIL_SIGNATURE: usize = 508;

    pub const LEAD: u32 = 0x4161_5252;
    pub const STRUCT: u32 = 0x6141_7272;
    pub const TRAIL: u32 = 0xAA55_0000;
    /// Free count and next free hint are not maintained.
    pub const UNKNOWN: u32 = 0xFFFF_FFFF;
}

/// Value of the first reserved FAT slot, the media descriptor in the low byte.
const MEDIA_SLOT: u32 = 0x0FFF_FFF8;
/// Reserved sector that holds the backup boot sector when there is room for it.
const BACKUP_BOOT_SECTOR: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Geometry of a volume created by [`format`].
pub struct FormatOptions {
    partition_start: u32,
    partition_sectors: u32,
    sectors_per_cluster: u8,
    reserved_sectors: u16,
    fat_count: u8,
    sectors_per_fat: u32,
    root_cluster: u32,
    volume_id: u32,
    volume_label: [u8; 11],
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            partition_start: 2048,
            partition_sectors: 0,
            sectors_per_cluster: 8,
            reserved_sectors: 32,
            fat_count: 2,
            sectors_per_fat: 16,
            root_cluster: 2,
            volume_id: 0x4D46_4154,
            volume_label: *b"MINIFAT    ",
        }
    }
}

impl FormatOptions {
    #[must_use]
    #[inline]
    pub const fn with_partition_start(mut self, partition_start: u32) -> Self {
        self.partition_start = partition_start;
        self
    }

    #[must_use]
    #[inline]
    /// A size of 0 sizes the partition to the clusters the FAT can address.
    pub const fn with_partition_sectors(mut self, partition_sectors: u32) -> Self {
        self.partition_sectors = partition_sectors;
        self
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
    pub const fn partition_start(&self) -> u32 {
        self.partition_start
    }

    /// Returns the size of the partition in blocks, computing it if unset.
    pub fn partition_sectors(&self) -> FsResult<u32> {
        if self.partition_sectors != 0 {
            return Ok(self.partition_sectors);
        }
        let clusters = self
            .sectors_per_fat
            .checked_mul(SLOTS_PER_BLOCK)
            .and_then(|slots| slots.checked_sub(2));
        let fats = u32::from(self.fat_count).checked_mul(self.sectors_per_fat);
        clusters
            .zip(fats)
            .and_then(|(clusters, fats)| {
                clusters
                    .checked_mul(u32::from(self.sectors_per_cluster))?
                    .checked_add(fats)?
                    .checked_add(u32::from(self.reserved_sectors))
            })
            .ok_or(FsError::UnsupportedFilesystem)
    }

    /// Builds the boot sector describing these options.
    pub fn boot_sector(&self) -> FsResult<BootSector> {
        let fs_info_sector = u16::from(self.reserved_sectors > 1);
        let backup_boot_sector = if self.reserved_sectors > BACKUP_BOOT_SECTOR {
            BACKUP_BOOT_SECTOR
        } else {
            0
        };

        let bs = BootSector::default()
            .with_sectors_per_cluster(self.sectors_per_cluster)
            .with_reserved_sectors(self.reserved_sectors)
            .with_fat_count(self.fat_count)
            .with_total_sectors(self.partition_sectors()?)
            .with_hidden_sectors(self.partition_start)
            .with_sectors_per_fat(self.sectors_per_fat)
            .with_root_cluster(self.root_cluster)
            .with_aux_sectors(fs_info_sector, backup_boot_sector)
            .with_volume_id(self.volume_id)
            .with_volume_label(self.volume_label);
        bs.validate()?;
        Ok(bs)
    }
}

/// Writes an MBR and an empty FAT32 volume in its first partition.
///
/// The medium must hold at least `partition_start + partition_sectors` blocks.
pub fn format<M: BlockMedium>(medium: M, options: &FormatOptions) -> FsResult<()> {
    // The MBR lives in block 0.
    if options.partition_start == 0 {
        return Err(FsError::UnsupportedFilesystem);
    }
    let bs = options.boot_sector()?;
    let start = options.partition_start;
    let layout = VolumeLayout::new(start, &bs)?;
    let mut cache = SectorCache::new(medium);

    cache.raw_buffer_mut().fill(0);
    PartitionEntry::new(FAT32_LBA, start, bs.total_sectors()).encode(cache.raw_buffer_mut(), 0)?;
    cache.write_block(0)?;

    bs.encode(cache.raw_buffer_mut());
    cache.write_block(start)?;
    if bs.backup_boot_sector() != 0 {
        cache.write_block(start + u32::from(bs.backup_boot_sector()))?;
    }

    if bs.fs_info_sector() != 0 {
        let block = cache.raw_buffer_mut();
        block.fill(0);
        le::put_u32(block, fs_info::LEAD_SIGNATURE, fs_info::LEAD);
        le::put_u32(block, fs_info::STRUCT_SIGNATURE, fs_info::STRUCT);
        le::put_u32(block, fs_info::FREE_COUNT, fs_info::UNKNOWN);
        le::put_u32(block, fs_info::NEXT_FREE, fs_info::UNKNOWN);
        le::put_u32(block, fs_info::TRAIL_SIGNATURE, fs_info::TRAIL);
        cache.write_block(start + u32::from(bs.fs_info_sector()))?;
    }

    let (root_block, root_offset) = layout.fat_slot(layout.root_cluster());
    let root_sector = root_block - layout.fat_start_block();
    for copy in 0..u32::from(layout.fat_count()) {
        for sector in 0..layout.sectors_per_fat() {
            let block = cache.raw_buffer_mut();
            block.fill(0);
            if sector == 0 {
                le::put_u32(block, 0, MEDIA_SLOT);
                fat32::write_fat_entry(block, 4, FatEntry::EndOfChain);
            }
            if sector == root_sector {
                fat32::write_fat_entry(block, root_offset, FatEntry::EndOfChain);
            }
            cache.write_block(layout.fat_start_block() + copy * layout.sectors_per_fat() + sector)?;
        }
    }

    let root_start = layout.cluster_to_block(layout.root_cluster());
    cache.raw_buffer_mut().fill(0);
    for sector in 0..u32::from(layout.sectors_per_cluster()) {
        cache.write_block(root_start + sector)?;
    }

    log::info!(
        "Formatted FAT32 partition at {start}: {} sectors, {} clusters",
        bs.total_sectors(),
        layout.cluster_count()
    );
    Ok(())
}
