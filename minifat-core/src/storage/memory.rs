//! In-memory block medium.
use super::{BLOCK_SIZE, Block, BlockMedium, MediumError};
use alloc::{vec, vec::Vec};

/// A block medium backed by a heap buffer.
///
/// It counts every read and write that reaches it and can be told
/// to fail accesses to a given block, which makes it the medium of
/// choice for host-side tests and disk images.
pub struct MemoryMedium {
    data: Vec<u8>,
    reads: usize,
    writes: usize,
    read_fault: Option<u32>,
    write_fault: Option<u32>,
}

impl MemoryMedium {
    #[must_use]
    /// Creates a zeroed medium of `block_count` blocks.
    pub fn new(block_count: u32) -> Self {
        Self::from_bytes(vec![0; block_count as usize * BLOCK_SIZE])
    }

    #[must_use]
    /// Wraps an existing image.
    ///
    /// A trailing partial block is unreachable.
    pub const fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            data,
            reads: 0,
            writes: 0,
            read_fault: None,
            write_fault: None,
        }
    }

    #[must_use]
    #[inline]
    /// Returns the number of whole blocks in the medium.
    pub fn block_count(&self) -> u32 {
        u32::try_from(self.data.len() / BLOCK_SIZE).unwrap_or(u32::MAX)
    }

    #[must_use]
    #[inline]
    /// Returns the raw image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    #[inline]
    /// Returns the raw image mutably, bypassing the access counters.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[must_use]
    /// Returns the content of the block at `index`, if it exists.
    pub fn block(&self, index: u32) -> Option<&[u8]> {
        let start = index as usize * BLOCK_SIZE;
        self.data.get(start..start + BLOCK_SIZE)
    }

    #[must_use]
    #[inline]
    /// Returns how many block reads reached the medium.
    pub const fn reads(&self) -> usize {
        self.reads
    }

    #[must_use]
    #[inline]
    /// Returns how many block writes reached the medium.
    pub const fn writes(&self) -> usize {
        self.writes
    }

    #[inline]
    pub const fn reset_counters(&mut self) {
        self.reads = 0;
        self.writes = 0;
    }

    #[inline]
    /// Makes every read of `block` fail with `MediumError::Io`.
    pub const fn set_read_fault(&mut self, block: Option<u32>) {
        self.read_fault = block;
    }

    #[inline]
    /// Makes every write to `block` fail with `MediumError::Io`.
    pub const fn set_write_fault(&mut self, block: Option<u32>) {
        self.write_fault = block;
    }

    fn range(&self, index: u32) -> Result<core::ops::Range<usize>, MediumError> {
        let start = index as usize * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        if end > self.data.len() {
            return Err(MediumError::OutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockMedium for MemoryMedium {
    fn read_block(&mut self, index: u32, dst: &mut Block) -> Result<(), MediumError> {
        if self.read_fault == Some(index) {
            log::trace!("Injected read fault on block {index}");
            return Err(MediumError::Io);
        }
        let range = self.range(index)?;
        dst.copy_from_slice(&self.data[range]);
        self.reads += 1;
        Ok(())
    }

    fn write_block(&mut self, index: u32, src: &Block) -> Result<(), MediumError> {
        if self.write_fault == Some(index) {
            log::trace!("Injected write fault on block {index}");
            return Err(MediumError::Io);
        }
        let range = self.range(index)?;
        self.data[range].copy_from_slice(src);
        self.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_block() {
        let mut medium = MemoryMedium::new(4);
        let mut block = [0xAB; BLOCK_SIZE];
        medium.write_block(2, &block).unwrap();

        block.fill(0);
        medium.read_block(2, &mut block).unwrap();
        assert!(block.iter().all(|&b| b == 0xAB));
        assert_eq!(medium.block(1).unwrap(), &[0; BLOCK_SIZE][..]);
        assert_eq!((medium.reads(), medium.writes()), (1, 1));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut medium = MemoryMedium::new(2);
        let mut block = [0; BLOCK_SIZE];
        assert_eq!(
            medium.read_block(2, &mut block),
            Err(MediumError::OutOfBounds)
        );
        assert_eq!(medium.write_block(7, &block), Err(MediumError::OutOfBounds));
        assert_eq!(medium.writes(), 0);
    }

    #[test]
    fn test_faults() {
        let mut medium = MemoryMedium::new(2);
        let mut block = [0; BLOCK_SIZE];
        medium.set_read_fault(Some(1));
        medium.set_write_fault(Some(0));
        assert_eq!(medium.read_block(1, &mut block), Err(MediumError::Io));
        assert_eq!(medium.write_block(0, &block), Err(MediumError::Io));
        assert!(medium.read_block(0, &mut block).is_ok());

        medium.set_read_fault(None);
        assert!(medium.read_block(1, &mut block).is_ok());
    }

    #[test]
    fn test_mut_ref_forwarding() {
        fn fill<M: BlockMedium>(mut medium: M) {
            medium.write_block(0, &[7; BLOCK_SIZE]).unwrap();
        }

        let mut medium = MemoryMedium::new(1);
        fill(&mut medium);
        assert_eq!(medium.block(0).unwrap()[511], 7);
        assert_eq!(medium.block_count(), 1);
    }
}
