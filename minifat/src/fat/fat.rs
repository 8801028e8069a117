use super::{
    Cluster, FsError, FsResult,
    layout::{SLOTS_PER_BLOCK, VolumeLayout},
};
use crate::{BlockMedium, cache::SectorCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 table entry
pub enum FatEntry {
    /// Free cluster
    Free,
    /// Used cluster, pointing to the next cluster in the chain
    Next(Cluster),
    /// Last cluster in the chain
    EndOfChain,
    /// Bad cluster
    Bad,
    /// Reserved cluster
    Reserved,
}

/// FAT32 entry handling
pub(crate) mod fat32 {
    use super::{Cluster, FatEntry};
    use crate::fat::le;

    /// Value written to terminate a chain.
    pub const END_OF_CHAIN: u32 = 0x0FFF_FFFF;
    const VALUE_MASK: u32 = 0x0FFF_FFFF;

    #[must_use]
    pub fn read_fat_entry(block: &[u8], offset: usize) -> FatEntry {
        // Only the lower 28 bits are meaningful
        match le::u32_at(block, offset) & VALUE_MASK {
            0 => FatEntry::Free,
            0x0FFF_FFF7 => FatEntry::Bad,
            0x0FFF_FFF0..=0x0FFF_FFF6 => FatEntry::Reserved,
            0x0FFF_FFF8..=0x0FFF_FFFF => FatEntry::EndOfChain,
            val => FatEntry::Next(Cluster::new(val)),
        }
    }

    pub fn write_fat_entry(block: &mut [u8], offset: usize, entry: FatEntry) {
        let value = match entry {
            FatEntry::Free => 0,
            FatEntry::Next(next) => next.value() & VALUE_MASK,
            FatEntry::EndOfChain => END_OF_CHAIN,
            FatEntry::Bad => 0x0FFF_FFF7,
            FatEntry::Reserved => 0x0FFF_FFF6,
        };
        // Preserve the high 4 bits
        let old = le::u32_at(block, offset);
        le::put_u32(block, offset, (old & !VALUE_MASK) | value);
    }
}

/// View over the File Allocation Table of a mounted volume.
///
/// The table is never loaded as a whole: every access goes through
/// the sector cache, one FAT block at a time. Updates are written to
/// every FAT copy.
pub struct FatTable<'a, M: BlockMedium> {
    cache: &'a mut SectorCache<M>,
    layout: &'a VolumeLayout,
}

impl<'a, M: BlockMedium> FatTable<'a, M> {
    #[must_use]
    #[inline]
    pub const fn new(cache: &'a mut SectorCache<M>, layout: &'a VolumeLayout) -> Self {
        Self { cache, layout }
    }

    /// Returns the table entry of `cluster`.
    pub fn entry(&mut self, cluster: Cluster) -> FsResult<FatEntry> {
        if !self.layout.contains(cluster) {
            return Err(FsError::CorruptedChain);
        }
        let (block, offset) = self.layout.fat_slot(cluster);
        self.cache.read_block(block)?;
        Ok(fat32::read_fat_entry(self.cache.raw_buffer(), offset))
    }

    /// Returns the cluster following `cluster` in its chain.
    ///
    /// Fails with `EndOfChain` if `cluster` is the last one.
    pub fn find_next(&mut self, cluster: Cluster) -> FsResult<Cluster> {
        match self.entry(cluster)? {
            FatEntry::EndOfChain => Err(FsError::EndOfChain),
            FatEntry::Next(next) if self.layout.contains(next) => Ok(next),
            other => {
                log::warn!("Cluster {cluster} links to {other:?}");
                Err(FsError::CorruptedChain)
            }
        }
    }

    /// Allocates the first free cluster and appends it to the chain ending with `last`.
    ///
    /// A `last` of `Cluster::FREE` starts a new chain.
    /// The new cluster is zero-filled before being returned.
    pub fn allocate(&mut self, last: Cluster) -> FsResult<Cluster> {
        let new = self.find_free()?;

        self.set_entry(new, FatEntry::EndOfChain)?;
        if !last.is_free() {
            self.set_entry(last, FatEntry::Next(new))?;
        }

        let first_block = self.layout.cluster_to_block(new);
        for sector in (0..u32::from(self.layout.sectors_per_cluster())).rev() {
            self.cache.raw_buffer_mut().fill(0);
            self.cache.write_block(first_block + sector)?;
        }

        log::debug!("Allocated cluster {new} after {last}");
        Ok(new)
    }

    /// Releases every cluster of the chain starting at `first`, then resets `first`.
    ///
    /// Nothing is read or written for an empty chain.
    pub fn free_chain(&mut self, first: &mut Cluster) -> FsResult<()> {
        let mut pending = None;
        let walked = self.zero_chain(*first, &mut pending);
        if let Some(block) = pending {
            self.sync_fat_block(block)?;
        }
        let freed = walked?;

        log::debug!("Freed {freed} cluster(s) starting at {first}");
        *first = Cluster::FREE;
        Ok(())
    }

    /// Returns the number of clusters in the chain starting at `first`.
    pub fn chain_len(&mut self, first: Cluster) -> FsResult<u32> {
        let mut len = 0;
        let mut current = first;
        while !current.is_free() {
            len += 1;
            if len > self.layout.cluster_count() {
                return Err(FsError::CorruptedChain);
            }
            current = match self.find_next(current) {
                Ok(next) => next,
                Err(FsError::EndOfChain) => Cluster::FREE,
                Err(err) => return Err(err),
            };
        }
        Ok(len)
    }

    /// Zeroes the slots of the chain, deferring the write of the FAT block
    /// currently being modified to the caller through `pending`.
    fn zero_chain(&mut self, first: Cluster, pending: &mut Option<u32>) -> FsResult<u32> {
        let mut freed = 0;
        let mut current = first;
        while !current.is_free() {
            if !self.layout.contains(current) || freed >= self.layout.cluster_count() {
                return Err(FsError::CorruptedChain);
            }
            let (block, offset) = self.layout.fat_slot(current);
            if let Some(previous) = pending.filter(|&previous| previous != block) {
                self.sync_fat_block(previous)?;
            }

            self.cache.read_block(block)?;
            let entry = fat32::read_fat_entry(self.cache.raw_buffer(), offset);
            fat32::write_fat_entry(self.cache.raw_buffer_mut(), offset, FatEntry::Free);
            self.cache.mark_dirty();
            *pending = Some(block);
            freed += 1;
            log::trace!("Released cluster {current}");

            current = match entry {
                FatEntry::Next(next) => next,
                FatEntry::EndOfChain => Cluster::FREE,
                other => {
                    log::warn!("Cluster {current} links to {other:?}");
                    return Err(FsError::CorruptedChain);
                }
            };
        }
        Ok(freed)
    }

    /// First-fit search for a free slot, skipping the two reserved ones.
    fn find_free(&mut self) -> FsResult<Cluster> {
        let end = self.layout.cluster_count() + Cluster::FIRST_DATA.value();
        for block in 0..end.div_ceil(SLOTS_PER_BLOCK) {
            self.cache.read_block(self.layout.fat_start_block() + block)?;
            let first = block * SLOTS_PER_BLOCK;
            let slots = (first..end.min(first + SLOTS_PER_BLOCK))
                .filter(|&cluster| cluster >= Cluster::FIRST_DATA.value());
            for cluster in slots {
                let offset = ((cluster - first) * 4) as usize;
                if fat32::read_fat_entry(self.cache.raw_buffer(), offset) == FatEntry::Free {
                    return Ok(Cluster::new(cluster));
                }
            }
        }
        Err(FsError::NoSpace)
    }

    /// Loads the FAT block of `cluster`, rewrites its slot and persists it.
    fn set_entry(&mut self, cluster: Cluster, entry: FatEntry) -> FsResult<()> {
        let (block, offset) = self.layout.fat_slot(cluster);
        self.cache.read_block(block)?;
        fat32::write_fat_entry(self.cache.raw_buffer_mut(), offset, entry);
        self.sync_fat_block(block)
    }

    /// Writes the cached FAT block `block` to every FAT copy.
    ///
    /// The primary copy is written last so that the cache ends up holding it.
    fn sync_fat_block(&mut self, block: u32) -> FsResult<()> {
        for copy in 1..u32::from(self.layout.fat_count()) {
            self.cache
                .write_block(block + copy * self.layout.sectors_per_fat())?;
        }
        self.cache.write_block(block)
    }
}
