//! MBR partition table.
use crate::{
    BlockMedium,
    cache::SectorCache,
    fat::{FsError, FsResult, bs::BOOT_SIGNATURE, le},
};
use minifat_core::storage::Block;

/// Offset of the partition table in the MBR.
const TABLE_OFFSET: usize = 0x1BE;
/// Size of a partition table entry.
const ENTRY_SIZE: usize = 16;
/// Number of primary partitions.
pub const MAX_PARTITIONS: u8 = 4;
const SIGNATURE_OFFSET: usize = 510;

mod offset {
    pub const KIND: usize = 4;
    pub const START: usize = 8;
    pub const SECTORS: usize = 12;
}

/// Partition type of a FAT32 partition addressed through LBA.
pub const FAT32_LBA: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    kind: u8,
    start: u32,
    sectors: u32,
}

impl PartitionEntry {
    #[must_use]
    #[inline]
    pub const fn new(kind: u8, start: u32, sectors: u32) -> Self {
        Self {
            kind,
            start,
            sectors,
        }
    }

    /// Reads entry `number` from the MBR held in `mbr`.
    pub fn decode(mbr: &Block, number: u8) -> FsResult<Self> {
        if mbr[SIGNATURE_OFFSET..] != BOOT_SIGNATURE {
            return Err(FsError::SignatureMismatch);
        }
        let at = entry_offset(number)?;
        let entry = &mbr[at..at + ENTRY_SIZE];
        Ok(Self {
            kind: entry[offset::KIND],
            start: le::u32_at(entry, offset::START),
            sectors: le::u32_at(entry, offset::SECTORS),
        })
    }

    /// Stores the entry in slot `number` of `mbr` and signs the record.
    ///
    /// CHS fields are left zeroed; only LBA addressing is supported.
    pub fn encode(&self, mbr: &mut Block, number: u8) -> FsResult<()> {
        let at = entry_offset(number)?;
        let entry = &mut mbr[at..at + ENTRY_SIZE];
        entry.fill(0);
        entry[offset::KIND] = self.kind;
        le::put_u32(entry, offset::START, self.start);
        le::put_u32(entry, offset::SECTORS, self.sectors);
        mbr[SIGNATURE_OFFSET..].copy_from_slice(&BOOT_SIGNATURE);
        Ok(())
    }

    #[must_use]
    #[inline]
    /// Returns the partition type byte.
    pub const fn kind(&self) -> u8 {
        self.kind
    }

    #[must_use]
    #[inline]
    /// Returns the first block of the partition.
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    #[inline]
    pub const fn sectors(&self) -> u32 {
        self.sectors
    }
}

fn entry_offset(number: u8) -> FsResult<usize> {
    if number >= MAX_PARTITIONS {
        return Err(FsError::InvalidPartition);
    }
    Ok(TABLE_OFFSET + usize::from(number) * ENTRY_SIZE)
}

/// Reads the MBR from block 0 and returns partition `number`.
pub fn find_partition<M: BlockMedium>(
    cache: &mut SectorCache<M>,
    number: u8,
) -> FsResult<PartitionEntry> {
    cache.read_block(0)?;
    let entry = PartitionEntry::decode(cache.raw_buffer(), number)?;
    log::debug!(
        "Partition {number}: type {:#04x}, start {}, {} sectors",
        entry.kind(),
        entry.start(),
        entry.sectors()
    );
    Ok(entry)
}
