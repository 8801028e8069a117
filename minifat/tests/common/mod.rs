#![allow(dead_code)]

use minifat::{BLOCK_SIZE, FormatOptions, MemoryMedium, OpenMode, Volume, format};

pub const PARTITION_START: u32 = 2048;
pub const FAT_BLOCK: u32 = PARTITION_START + 1;
pub const SECTORS_PER_FAT: u32 = 8;
pub const ROOT_BLOCK: u32 = FAT_BLOCK + 2 * SECTORS_PER_FAT;
pub const CLUSTER_BYTES: usize = 4 * BLOCK_SIZE;

/// 1 reserved sector, 2 FATs of 8 sectors, 4 sectors per cluster, root in cluster 2.
pub fn options() -> FormatOptions {
    FormatOptions::default()
        .with_partition_start(PARTITION_START)
        .with_reserved_sectors(1)
        .with_fat_count(2)
        .with_sectors_per_fat(SECTORS_PER_FAT)
        .with_sectors_per_cluster(4)
        .with_root_cluster(2)
}

/// A freshly formatted medium.
pub fn image() -> MemoryMedium {
    let options = options();
    let mut medium = MemoryMedium::new(PARTITION_START + options.partition_sectors().unwrap());
    format(&mut medium, &options).unwrap();
    medium
}

pub fn mount(medium: &mut MemoryMedium) -> Volume<&mut MemoryMedium> {
    Volume::mount(medium, 0).unwrap()
}

pub fn write_file(medium: &mut MemoryMedium, path: &str, data: &[u8]) {
    let mut volume = mount(medium);
    let mut file = volume.open(path, OpenMode::Write).unwrap();
    assert_eq!(file.write(&mut volume, data).unwrap(), data.len());
    file.close(&mut volume).unwrap();
    volume.unmount().unwrap();
}

pub fn read_file(medium: &mut MemoryMedium, path: &str) -> Vec<u8> {
    let mut volume = mount(medium);
    let mut file = volume.open(path, OpenMode::Read).unwrap();
    let mut data = vec![0; file.size() as usize];
    assert_eq!(file.read(&mut volume, &mut data).unwrap(), data.len());
    assert!(file.eof());
    file.close(&mut volume).unwrap();
    data
}

/// Returns `len` bytes that differ from one sector to the next.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// Returns the FAT slot of `cluster` in FAT copy `copy`.
pub fn fat_slot(medium: &MemoryMedium, copy: u32, cluster: u32) -> u32 {
    let block = FAT_BLOCK + copy * SECTORS_PER_FAT + cluster / 128;
    u32_at(medium.block(block).unwrap(), (cluster % 128) as usize * 4)
}

/// Writes a raw 32-byte entry into slot `index` of the directory starting at `block`.
pub fn put_entry(
    medium: &mut MemoryMedium,
    block: u32,
    index: usize,
    name: &[u8; 11],
    attributes: u8,
    cluster: u32,
) {
    let at = block as usize * BLOCK_SIZE + index * 32;
    let slot = &mut medium.as_bytes_mut()[at..at + 32];
    slot.fill(0);
    slot[..11].copy_from_slice(name);
    slot[11] = attributes;
    slot[0x14..0x16].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    slot[0x1A..0x1C].copy_from_slice(&(cluster as u16).to_le_bytes());
}

/// Marks `cluster` as the end of a chain in both FAT copies.
pub fn mark_end_of_chain(medium: &mut MemoryMedium, cluster: u32) {
    for copy in 0..2 {
        let block = FAT_BLOCK + copy * SECTORS_PER_FAT + cluster / 128;
        let at = block as usize * BLOCK_SIZE + (cluster % 128) as usize * 4;
        medium.as_bytes_mut()[at..at + 4].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
    }
}
