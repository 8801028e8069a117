use super::{
    Cluster, FsError, FsResult,
    date::DateTime,
    dirent::{DIR_ENTRY_SIZE, DirEntry, ShortName, SlotKind},
    fat::FatTable,
    layout::VolumeLayout,
};
use crate::{BlockMedium, cache::SectorCache};
use minifat_core::storage::BLOCK_SIZE;

/// Directory entry lookup, creation and update within a directory's cluster chain.
pub struct Directory<'a, M: BlockMedium> {
    cache: &'a mut SectorCache<M>,
    layout: &'a VolumeLayout,
    stamp: DateTime,
}

impl<'a, M: BlockMedium> Directory<'a, M> {
    #[must_use]
    #[inline]
    /// `stamp` is the timestamp written into created or updated entries.
    pub const fn new(
        cache: &'a mut SectorCache<M>,
        layout: &'a VolumeLayout,
        stamp: DateTime,
    ) -> Self {
        Self {
            cache,
            layout,
            stamp,
        }
    }

    /// Looks `name` up in the directory starting at `dir`.
    ///
    /// The scan stops at the first never-used slot, so later clusters
    /// of the directory are not visited past it.
    pub fn find_entry(&mut self, dir: Cluster, name: &ShortName) -> FsResult<DirEntry> {
        self.check(dir)?;
        let mut cluster = dir;
        let mut visited = 0;
        loop {
            let first_block = self.layout.cluster_to_block(cluster);
            for sector in 0..u32::from(self.layout.sectors_per_cluster()) {
                self.cache.read_block(first_block + sector)?;
                let slots = self.cache.raw_buffer().chunks_exact(DIR_ENTRY_SIZE);
                for (index, slot) in slots.enumerate() {
                    match SlotKind::of(slot) {
                        SlotKind::End => return Err(FsError::FileNotFound),
                        SlotKind::Used if name.matches(slot) => {
                            let offset = slot_offset(sector, index);
                            let entry = DirEntry::decode(slot, cluster, offset);
                            if !entry.attributes().is_volume_id() {
                                return Ok(entry);
                            }
                        }
                        _ => {}
                    }
                }
            }

            visited += 1;
            cluster = match self.next_cluster(cluster, visited)? {
                Some(next) => next,
                None => return Err(FsError::FileNotFound),
            };
        }
    }

    /// Creates an empty entry named `name` in the directory starting at `dir`.
    ///
    /// The first unused or deleted slot is taken; the directory grows by one
    /// cluster if it has none left. The entry is only written to the cache.
    pub fn create_entry(&mut self, dir: Cluster, name: &ShortName) -> FsResult<DirEntry> {
        self.check(dir)?;
        let mut cluster = dir;
        let mut visited = 0;
        loop {
            let first_block = self.layout.cluster_to_block(cluster);
            for sector in 0..u32::from(self.layout.sectors_per_cluster()) {
                self.cache.read_block(first_block + sector)?;
                let free = self
                    .cache
                    .raw_buffer()
                    .chunks_exact(DIR_ENTRY_SIZE)
                    .position(|slot| SlotKind::of(slot).is_reusable());

                if let Some(index) = free {
                    let offset = slot_offset(sector, index);
                    let entry = DirEntry::new(*name, cluster, offset, self.stamp);
                    let start = index * DIR_ENTRY_SIZE;
                    let slot = &mut self.cache.raw_buffer_mut()[start..start + DIR_ENTRY_SIZE];
                    entry.encode(slot);
                    self.cache.mark_dirty();
                    log::debug!("Created entry {name} in directory {dir}");
                    return Ok(entry);
                }
            }

            visited += 1;
            cluster = match self.next_cluster(cluster, visited)? {
                Some(next) => next,
                None => FatTable::new(self.cache, self.layout).allocate(cluster)?,
            };
        }
    }

    /// Stamps `entry` as modified, writes its metadata back to its slot and persists it.
    pub fn update_entry(&mut self, entry: &mut DirEntry) -> FsResult<()> {
        self.check(entry.parent_cluster())?;
        entry.set_modified(self.stamp);
        let offset = usize::from(entry.parent_offset());
        let block = self.layout.cluster_to_block(entry.parent_cluster())
            + u32::try_from(offset / BLOCK_SIZE).map_err(|_| FsError::InvalidOffset)?;
        let start = offset % BLOCK_SIZE;

        self.cache.read_block(block)?;
        let slot = &mut self.cache.raw_buffer_mut()[start..start + DIR_ENTRY_SIZE];
        entry.encode_metadata(slot);
        self.cache.write_block(block)
    }

    /// Directory clusters come from disk and are checked before any block is computed.
    fn check(&self, cluster: Cluster) -> FsResult<()> {
        if self.layout.contains(cluster) {
            Ok(())
        } else {
            log::warn!("Directory cluster {cluster} is outside the volume");
            Err(FsError::CorruptedChain)
        }
    }

    /// Returns the cluster after `cluster`, or `None` at the end of the directory.
    fn next_cluster(&mut self, cluster: Cluster, visited: u32) -> FsResult<Option<Cluster>> {
        if visited >= self.layout.cluster_count() {
            return Err(FsError::CorruptedChain);
        }
        match FatTable::new(self.cache, self.layout).find_next(cluster) {
            Ok(next) => Ok(Some(next)),
            Err(FsError::EndOfChain) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Byte offset within its cluster of slot `index` of `sector`.
#[expect(clippy::cast_possible_truncation, reason = "Clusters are at most 64 KiB")]
const fn slot_offset(sector: u32, index: usize) -> u16 {
    (sector as usize * BLOCK_SIZE + index * DIR_ENTRY_SIZE) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fat::{bs::BootSector, dirent::Attributes, le};
    use minifat_core::storage::MemoryMedium;

    const FAT: u32 = 1;
    const DATA: u32 = 2;

    /// 1 reserved sector, 1 FAT of 1 sector, 2 sectors per cluster.
    fn layout() -> VolumeLayout {
        let bs = BootSector::default()
            .with_sectors_per_cluster(2)
            .with_reserved_sectors(1)
            .with_fat_count(1)
            .with_sectors_per_fat(1)
            .with_total_sectors(DATA + 2 * 16);
        VolumeLayout::new(0, &bs).unwrap()
    }

    fn medium() -> MemoryMedium {
        let mut medium = MemoryMedium::new(DATA + 2 * 16);
        let fat = FAT as usize * BLOCK_SIZE;
        let bytes = medium.as_bytes_mut();
        le::put_u32(bytes, fat, 0x0FFF_FFF8);
        le::put_u32(bytes, fat + 4, 0x0FFF_FFFF);
        le::put_u32(bytes, fat + 8, 0x0FFF_FFFF);
        medium
    }

    fn put_entry(medium: &mut MemoryMedium, index: usize, name: &[u8; 11], cluster: u16) {
        let at = DATA as usize * BLOCK_SIZE + index * DIR_ENTRY_SIZE;
        let bytes = medium.as_bytes_mut();
        bytes[at..at + 11].copy_from_slice(name);
        bytes[at + 11] = Attributes::ARCHIVE;
        le::put_u16(bytes, at + 0x1A, cluster);
        le::put_u32(bytes, at + 0x1C, u32::from(cluster) * 10);
    }

    fn name(name: &str) -> ShortName {
        ShortName::new(name).unwrap()
    }

    #[test]
    fn test_find_entry() {
        let layout = layout();
        let mut medium = medium();
        for index in 1..17 {
            put_entry(&mut medium, index, b"FILLER  BIN", 3);
        }
        put_entry(&mut medium, 0, b"FIRST   TXT", 5);
        put_entry(&mut medium, 17, b"SECOND  BIN", 6);
        put_entry(&mut medium, 20, b"HIDDEN  TXT", 7);
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        let entry = dir.find_entry(Cluster::new(2), &name("second.bin")).unwrap();
        assert_eq!(entry.starting_cluster(), Cluster::new(6));
        assert_eq!(entry.file_size(), 60);
        assert_eq!(entry.parent_cluster(), Cluster::new(2));
        assert_eq!(entry.parent_offset(), 17 * 32);
        assert!(dir.find_entry(Cluster::new(2), &name("FIRST.TXT")).is_ok());

        // Slot 18 was never used, so the scan stops before slot 20.
        assert_eq!(
            dir.find_entry(Cluster::new(2), &name("hidden.txt")),
            Err(FsError::FileNotFound)
        );
        assert_eq!(
            dir.find_entry(Cluster::new(2), &name("missing")),
            Err(FsError::FileNotFound)
        );
    }

    #[test]
    fn test_find_skips_deleted() {
        let layout = layout();
        let mut medium = medium();
        put_entry(&mut medium, 0, b"GONE    TXT", 5);
        put_entry(&mut medium, 1, b"KEPT    TXT", 6);
        medium.as_bytes_mut()[DATA as usize * BLOCK_SIZE] = 0xE5;
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        let entry = dir.find_entry(Cluster::new(2), &name("kept.txt")).unwrap();
        assert_eq!(entry.parent_offset(), 32);
    }

    #[test]
    fn test_create_reuses_deleted_slot() {
        let layout = layout();
        let mut medium = medium();
        put_entry(&mut medium, 0, b"KEPT    TXT", 5);
        put_entry(&mut medium, 1, b"GONE    TXT", 6);
        put_entry(&mut medium, 2, b"LAST    TXT", 7);
        medium.as_bytes_mut()[DATA as usize * BLOCK_SIZE + 32] = 0xE5;
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        let entry = dir.create_entry(Cluster::new(2), &name("new.txt")).unwrap();
        assert_eq!(entry.parent_offset(), 32);
        assert_eq!(entry.starting_cluster(), Cluster::FREE);
        assert!(cache.is_dirty());
        cache.flush().unwrap();
        drop(cache);

        let slot = &medium.block(DATA).unwrap()[32..64];
        assert_eq!(&slot[..11], b"NEW     TXT");
        assert_eq!(le::u32_at(slot, 0x1C), 0);
    }

    #[test]
    fn test_create_grows_directory() {
        let layout = layout();
        let mut medium = medium();
        for index in 0..32 {
            put_entry(&mut medium, index, b"FILLER  BIN", 3);
        }
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        let entry = dir.create_entry(Cluster::new(2), &name("extra")).unwrap();
        assert_eq!(entry.parent_cluster(), Cluster::new(3));
        assert_eq!(entry.parent_offset(), 0);

        let found = dir.find_entry(Cluster::new(2), &name("extra")).unwrap();
        assert_eq!(found.parent_cluster(), Cluster::new(3));
        drop(cache);
        assert_eq!(le::u32_at(medium.block(FAT).unwrap(), 8), 3);
    }

    #[test]
    fn test_directory_outside_volume() {
        let layout = layout();
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        for cluster in [0, 1, 18, 0x0FFF_FF00] {
            assert_eq!(
                dir.find_entry(Cluster::new(cluster), &name("a.txt")),
                Err(FsError::CorruptedChain)
            );
            assert_eq!(
                dir.create_entry(Cluster::new(cluster), &name("a.txt")),
                Err(FsError::CorruptedChain)
            );
        }
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_update_entry() {
        let layout = layout();
        let mut medium = medium();
        for index in 0..20 {
            put_entry(&mut medium, index, b"FILLER  BIN", 3);
        }
        put_entry(&mut medium, 20, b"DATA    LOG", 0);
        let mut cache = SectorCache::new(&mut medium);
        let mut dir = Directory::new(&mut cache, &layout, DateTime::PLACEHOLDER);

        let mut entry = dir.find_entry(Cluster::new(2), &name("data.log")).unwrap();
        entry.set_starting_cluster(Cluster::new(0x0001_0009));
        entry.set_file_size(1234);
        dir.update_entry(&mut entry).unwrap();
        assert!(!cache.is_dirty());
        drop(cache);

        let slot = &medium.block(DATA + 1).unwrap()[(20 - 16) * 32..(21 - 16) * 32];
        assert_eq!(&slot[..11], b"DATA    LOG");
        assert_eq!(le::u16_at(slot, 0x14), 1);
        assert_eq!(le::u16_at(slot, 0x1A), 9);
        assert_eq!(le::u32_at(slot, 0x1C), 1234);
    }
}
