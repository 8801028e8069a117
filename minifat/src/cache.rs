//! Single-sector write-back cache.
//!
//! Every byte of the filesystem goes through the one block held here.
//! Modifications are deferred until another block is requested or the
//! owner flushes explicitly.
use crate::{
    BlockMedium,
    fat::{FsError, FsResult},
};
use minifat_core::storage::{BLOCK_SIZE, Block};

pub struct SectorCache<M: BlockMedium> {
    medium: M,
    held: Option<u32>,
    dirty: bool,
    buffer: Block,
}

impl<M: BlockMedium> SectorCache<M> {
    #[must_use]
    #[inline]
    /// Creates an empty cache over `medium`.
    pub const fn new(medium: M) -> Self {
        Self {
            medium,
            held: None,
            dirty: false,
            buffer: [0; BLOCK_SIZE],
        }
    }

    #[must_use]
    #[inline]
    /// Returns the index of the block currently held, if any.
    pub const fn held_block(&self) -> Option<u32> {
        self.held
    }

    #[must_use]
    #[inline]
    /// Returns true if the buffer holds modifications not yet on the medium.
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Makes block `index` the held block.
    ///
    /// This is a no-op if the block is already held. Otherwise a dirty
    /// buffer is written back first. A failed write-back is reported as
    /// `MediumWriteFailed` but the cache still moves on to `index`, so
    /// the pending modification is lost.
    pub fn read_block(&mut self, index: u32) -> FsResult<()> {
        if self.held == Some(index) {
            return Ok(());
        }

        let mut result = Ok(());
        if self.dirty {
            self.dirty = false;
            if let Some(held) = self.held {
                log::trace!("Evicting dirty block {held}");
                if let Err(err) = self.medium.write_block(held, &self.buffer) {
                    log::warn!("Write-back of block {held} failed: {err}");
                    result = Err(FsError::MediumWriteFailed);
                }
            }
        }

        log::trace!("Cache miss on block {index}");
        if let Err(err) = self.medium.read_block(index, &mut self.buffer) {
            log::warn!("Read of block {index} failed: {err}");
            self.held = None;
            return Err(FsError::MediumReadFailed);
        }
        self.held = Some(index);

        result
    }

    /// Persists the buffer to block `index`, whatever block is held.
    ///
    /// Afterwards the cache holds `index` and is clean.
    pub fn write_block(&mut self, index: u32) -> FsResult<()> {
        self.dirty = false;
        self.held = Some(index);
        self.medium.write_block(index, &self.buffer).map_err(|err| {
            log::warn!("Write of block {index} failed: {err}");
            FsError::MediumWriteFailed
        })
    }

    /// Writes the held block back if it is dirty.
    pub fn flush(&mut self) -> FsResult<()> {
        match self.held {
            Some(held) if self.dirty => {
                log::trace!("Flushing block {held}");
                self.write_block(held)
            }
            _ => Ok(()),
        }
    }

    #[inline]
    /// Records that the buffer was modified in place.
    pub const fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[must_use]
    #[inline]
    pub const fn raw_buffer(&self) -> &Block {
        &self.buffer
    }

    #[must_use]
    #[inline]
    pub const fn raw_buffer_mut(&mut self) -> &mut Block {
        &mut self.buffer
    }

    #[must_use]
    #[inline]
    /// Gives the medium back, dropping any unflushed modification.
    pub fn into_medium(self) -> M {
        self.medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minifat_core::storage::MemoryMedium;

    fn medium() -> MemoryMedium {
        let mut medium = MemoryMedium::new(8);
        for (i, block) in medium.as_bytes_mut().chunks_mut(BLOCK_SIZE).enumerate() {
            block.fill(u8::try_from(i).unwrap());
        }
        medium
    }

    #[test]
    fn test_hit_does_not_touch_medium() {
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(3).unwrap();
        cache.read_block(3).unwrap();
        assert_eq!(cache.raw_buffer()[0], 3);
        drop(cache);
        assert_eq!(medium.reads(), 1);
    }

    #[test]
    fn test_block_zero_is_cached() {
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(0).unwrap();
        cache.read_block(0).unwrap();
        drop(cache);
        assert_eq!(medium.reads(), 1);
    }

    #[test]
    fn test_dirty_block_flushed_before_eviction() {
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(1).unwrap();
        cache.raw_buffer_mut()[10] = 0xEE;
        cache.mark_dirty();
        assert!(cache.is_dirty());

        cache.read_block(2).unwrap();
        assert!(!cache.is_dirty());
        assert_eq!(cache.held_block(), Some(2));
        drop(cache);
        assert_eq!(medium.writes(), 1);
        assert_eq!(medium.block(1).unwrap()[10], 0xEE);
        assert_eq!(medium.block(1).unwrap()[11], 1);
    }

    #[test]
    fn test_write_block_ignores_held_block() {
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(1).unwrap();
        cache.mark_dirty();
        cache.write_block(5).unwrap();
        assert_eq!(cache.held_block(), Some(5));
        assert!(!cache.is_dirty());
        drop(cache);
        assert_eq!(medium.block(5).unwrap()[0], 1);
        assert_eq!(medium.block(1).unwrap()[0], 1);
    }

    #[test]
    fn test_failed_write_back_still_advances() {
        let mut medium = medium();
        medium.set_write_fault(Some(1));
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(1).unwrap();
        cache.mark_dirty();
        assert_eq!(cache.read_block(4), Err(FsError::MediumWriteFailed));
        assert_eq!(cache.held_block(), Some(4));
        assert_eq!(cache.raw_buffer()[0], 4);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_failed_read_invalidates() {
        let mut medium = medium();
        medium.set_read_fault(Some(6));
        let mut cache = SectorCache::new(&mut medium);
        cache.read_block(1).unwrap();
        assert_eq!(cache.read_block(6), Err(FsError::MediumReadFailed));
        assert_eq!(cache.held_block(), None);
    }

    #[test]
    fn test_flush_only_when_dirty() {
        let mut medium = medium();
        let mut cache = SectorCache::new(&mut medium);
        cache.flush().unwrap();
        cache.read_block(2).unwrap();
        cache.flush().unwrap();
        cache.mark_dirty();
        cache.flush().unwrap();
        cache.flush().unwrap();
        drop(cache);
        assert_eq!(medium.writes(), 1);
    }
}
