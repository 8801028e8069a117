use super::{Cluster, FsError, FsResult, bs::BootSector};
use minifat_core::storage::BLOCK_SIZE;

/// Size of a FAT32 table slot in bytes.
pub const FAT_SLOT_SIZE: u32 = 4;
/// Number of FAT32 slots in a block.
pub const SLOTS_PER_BLOCK: u32 = BLOCK_SIZE as u32 / FAT_SLOT_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Geometry of a mounted FAT32 volume.
///
/// Block numbers are absolute on the medium.
pub struct VolumeLayout {
    bytes_per_sector: u16,
    sectors_per_cluster: u8,
    fat_count: u8,
    root_cluster: Cluster,
    sectors_per_fat: u32,
    fat_start_block: u32,
    data_start_block: u32,
    cluster_count: u32,
}

impl VolumeLayout {
    /// Builds the layout of the volume starting at `partition_start`.
    pub fn new(partition_start: u32, bs: &BootSector) -> FsResult<Self> {
        bs.validate()?;

        let fat_start_block = partition_start
            .checked_add(u32::from(bs.reserved_sectors()))
            .ok_or(FsError::UnsupportedFilesystem)?;
        let data_start_block = u32::from(bs.fat_count())
            .checked_mul(bs.sectors_per_fat())
            .and_then(|fats| fats.checked_add(fat_start_block))
            .ok_or(FsError::UnsupportedFilesystem)?;

        let table_clusters = bs.sectors_per_fat().saturating_mul(SLOTS_PER_BLOCK) - 2;
        let cluster_count = match bs.total_sectors() {
            0 => table_clusters,
            total => {
                let overhead = data_start_block - partition_start;
                let data_sectors = total
                    .checked_sub(overhead)
                    .ok_or(FsError::UnsupportedFilesystem)?;
                (data_sectors / u32::from(bs.sectors_per_cluster())).min(table_clusters)
            }
        };

        // Every block of the data region must be addressable.
        cluster_count
            .checked_mul(u32::from(bs.sectors_per_cluster()))
            .and_then(|sectors| sectors.checked_add(data_start_block))
            .ok_or(FsError::UnsupportedFilesystem)?;

        let layout = Self {
            bytes_per_sector: bs.bytes_per_sector(),
            sectors_per_cluster: bs.sectors_per_cluster(),
            fat_count: bs.fat_count(),
            root_cluster: Cluster::new(bs.root_cluster()),
            sectors_per_fat: bs.sectors_per_fat(),
            fat_start_block,
            data_start_block,
            cluster_count,
        };
        if !layout.contains(layout.root_cluster) {
            return Err(FsError::UnsupportedFilesystem);
        }
        Ok(layout)
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    /// Returns the number of FAT copies kept on the volume.
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> Cluster {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    /// Returns the first block of the first FAT.
    pub const fn fat_start_block(&self) -> u32 {
        self.fat_start_block
    }

    #[must_use]
    #[inline]
    /// Returns the block holding cluster 2.
    pub const fn data_start_block(&self) -> u32 {
        self.data_start_block
    }

    #[must_use]
    #[inline]
    /// Returns the number of data clusters on the volume.
    pub const fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    #[must_use]
    #[inline]
    /// Returns the size of a cluster in bytes.
    pub const fn cluster_bytes(&self) -> u32 {
        self.sectors_per_cluster as u32 * BLOCK_SIZE as u32
    }

    #[must_use]
    #[inline]
    /// Returns true if `cluster` is a data cluster of this volume.
    pub const fn contains(&self, cluster: Cluster) -> bool {
        cluster.is_valid() && cluster.value() - Cluster::FIRST_DATA.value() < self.cluster_count
    }

    #[must_use]
    #[inline]
    /// Returns the first block of `cluster`, which must be contained in the volume.
    pub const fn cluster_to_block(&self, cluster: Cluster) -> u32 {
        self.data_start_block + (cluster.value() - 2) * self.sectors_per_cluster as u32
    }

    #[must_use]
    #[inline]
    /// Returns the block and byte offset of the FAT slot of `cluster` in the first FAT.
    pub const fn fat_slot(&self, cluster: Cluster) -> (u32, usize) {
        let byte = cluster.value() * FAT_SLOT_SIZE;
        (
            self.fat_start_block + byte / BLOCK_SIZE as u32,
            (byte % BLOCK_SIZE as u32) as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> VolumeLayout {
        let bs = BootSector::default()
            .with_sectors_per_cluster(4)
            .with_reserved_sectors(1)
            .with_fat_count(2)
            .with_sectors_per_fat(8)
            .with_total_sectors(4096);
        VolumeLayout::new(2048, &bs).unwrap()
    }

    #[test]
    fn test_geometry() {
        let layout = layout();
        assert_eq!(layout.fat_start_block(), 2049);
        assert_eq!(layout.data_start_block(), 2049 + 16);
        assert_eq!(layout.cluster_bytes(), 2048);
        assert_eq!(layout.cluster_count(), (4096 - 17) / 4);
        assert_eq!(layout.root_cluster(), Cluster::new(2));
    }

    #[test]
    fn test_cluster_to_block() {
        let layout = layout();
        assert_eq!(layout.cluster_to_block(Cluster::new(2)), 2065);
        assert_eq!(layout.cluster_to_block(Cluster::new(3)), 2069);
        assert_eq!(layout.cluster_to_block(Cluster::new(10)), 2065 + 32);
    }

    #[test]
    fn test_fat_slot() {
        let layout = layout();
        assert_eq!(layout.fat_slot(Cluster::new(2)), (2049, 8));
        assert_eq!(layout.fat_slot(Cluster::new(127)), (2049, 508));
        assert_eq!(layout.fat_slot(Cluster::new(128)), (2050, 0));
        assert_eq!(layout.fat_slot(Cluster::new(300)), (2051, 176));
    }

    #[test]
    fn test_contains() {
        let layout = layout();
        assert!(!layout.contains(Cluster::new(1)));
        assert!(layout.contains(Cluster::new(2)));
        assert!(layout.contains(Cluster::new(1020)));
        assert!(!layout.contains(Cluster::new(1021)));
        assert!(!layout.contains(Cluster::new(0x0FFF_FFF8)));
    }

    #[test]
    fn test_table_bounds_cluster_count() {
        let bs = BootSector::default()
            .with_sectors_per_cluster(1)
            .with_reserved_sectors(1)
            .with_fat_count(1)
            .with_sectors_per_fat(1)
            .with_total_sectors(60_000);
        let layout = VolumeLayout::new(0, &bs).unwrap();
        assert_eq!(layout.cluster_count(), 126);
    }

    #[test]
    fn test_data_region_past_last_block() {
        let bs = BootSector::default()
            .with_sectors_per_cluster(128)
            .with_reserved_sectors(1)
            .with_fat_count(1)
            .with_sectors_per_fat(1 << 20)
            .with_total_sectors(u32::MAX);
        assert_eq!(
            VolumeLayout::new(0x1000_0000, &bs),
            Err(FsError::UnsupportedFilesystem)
        );
    }

    #[test]
    fn test_volume_too_small() {
        let bs = BootSector::default()
            .with_reserved_sectors(32)
            .with_sectors_per_fat(8)
            .with_total_sectors(40);
        assert_eq!(
            VolumeLayout::new(0, &bs),
            Err(FsError::UnsupportedFilesystem)
        );
    }
}
