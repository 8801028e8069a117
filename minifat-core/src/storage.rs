use thiserror::Error;

mod memory;
pub use memory::MemoryMedium;

/// Size of a block in bytes.
///
/// Every medium handled by minifat exposes 512-byte blocks.
pub const BLOCK_SIZE: usize = 512;

/// A single block of a medium.
pub type Block = [u8; BLOCK_SIZE];

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// An error that can occur when performing block medium operations.
pub enum MediumError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Medium not ready")]
    NotReady,
}

/// A trait for block media.
///
/// These are physical devices (such as SD cards) or in-memory images
/// that read and write whole 512-byte blocks, addressed by block index.
pub trait BlockMedium {
    /// Read the block at `index` into `dst`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed.
    fn read_block(&mut self, index: u32, dst: &mut Block) -> Result<(), MediumError>;
    /// Write `src` to the block at `index`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed.
    fn write_block(&mut self, index: u32, src: &Block) -> Result<(), MediumError>;
}

impl<M: BlockMedium + ?Sized> BlockMedium for &mut M {
    #[inline]
    fn read_block(&mut self, index: u32, dst: &mut Block) -> Result<(), MediumError> {
        (**self).read_block(index, dst)
    }

    #[inline]
    fn write_block(&mut self, index: u32, src: &Block) -> Result<(), MediumError> {
        (**self).write_block(index, src)
    }
}
