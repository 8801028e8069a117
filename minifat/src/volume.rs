//! Mounted FAT32 volumes.
use crate::{
    BlockMedium,
    cache::SectorCache,
    fat::{
        Cluster, FsError, FsResult,
        bs::BootSector,
        date::DateTime,
        dir::Directory,
        dirent::{DirEntry, ShortName},
        fat::FatTable,
        file::{FileHandle, OpenMode},
        layout::VolumeLayout,
    },
    partition,
};

/// A FAT32 volume mounted from a partition of a block medium.
///
/// The volume owns the medium through its sector cache. Nothing is written
/// back when it is dropped: call [`Volume::sync`] or [`Volume::unmount`].
pub struct Volume<M: BlockMedium> {
    cache: SectorCache<M>,
    layout: VolumeLayout,
    stamp: DateTime,
}

impl<M: BlockMedium> Volume<M> {
    /// Mounts the FAT32 volume held by primary partition `partition` of `medium`.
    pub fn mount(medium: M, partition: u8) -> FsResult<Self> {
        let mut cache = SectorCache::new(medium);
        let entry = partition::find_partition(&mut cache, partition)?;

        cache.read_block(entry.start())?;
        let bs = BootSector::decode(cache.raw_buffer())?;
        let layout = VolumeLayout::new(entry.start(), &bs)?;

        log::info!(
            "Mounted FAT32 partition {partition}: {} clusters of {} bytes, FAT at {}, data at {}",
            layout.cluster_count(),
            layout.cluster_bytes(),
            layout.fat_start_block(),
            layout.data_start_block()
        );

        Ok(Self {
            cache,
            layout,
            stamp: DateTime::default(),
        })
    }

    #[must_use]
    #[inline]
    pub const fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    #[inline]
    /// Sets the timestamp written into created and updated entries.
    pub const fn set_timestamp(&mut self, stamp: DateTime) {
        self.stamp = stamp;
    }

    #[inline]
    /// Opens the file at `path`, a `/`-separated list of 8.3 names from the root.
    pub fn open(&mut self, path: &str, mode: OpenMode) -> FsResult<FileHandle> {
        FileHandle::open(self, path, mode)
    }

    /// Returns the directory entry at `path` without opening it.
    pub fn lookup(&mut self, path: &str) -> FsResult<DirEntry> {
        let (dir, name) = self.resolve_parent(path)?;
        self.directory().find_entry(dir, &name)
    }

    /// Returns the number of clusters in the chain starting at `first`.
    pub fn chain_len(&mut self, first: Cluster) -> FsResult<u32> {
        self.fat().chain_len(first)
    }

    /// Writes the cached block back if it holds modifications.
    ///
    /// Open files keep their entry in memory until they are flushed or closed.
    pub fn sync(&mut self) -> FsResult<()> {
        self.cache.flush()
    }

    /// Flushes the cache and gives the medium back.
    pub fn unmount(mut self) -> FsResult<M> {
        self.sync()?;
        log::info!("Unmounted volume");
        Ok(self.cache.into_medium())
    }

    /// Resolves every component of `path` but the last one.
    ///
    /// Returns the first cluster of the parent directory and the name of the last component.
    pub(crate) fn resolve_parent(&mut self, path: &str) -> FsResult<(Cluster, ShortName)> {
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        let mut dir = self.layout.root_cluster();

        while let Some(component) = components.next() {
            let name = ShortName::new(component)?;
            if components.peek().is_none() {
                return Ok((dir, name));
            }

            let entry = self.directory().find_entry(dir, &name)?;
            if !entry.is_directory() {
                return Err(FsError::NotADirectory);
            }
            // `..` entries of first-level directories point to cluster 0.
            dir = match entry.starting_cluster() {
                Cluster::FREE => self.layout.root_cluster(),
                cluster => cluster,
            };
        }

        Err(FsError::InvalidName)
    }

    #[must_use]
    #[inline]
    pub(crate) const fn fat(&mut self) -> FatTable<'_, M> {
        FatTable::new(&mut self.cache, &self.layout)
    }

    #[must_use]
    #[inline]
    pub(crate) const fn directory(&mut self) -> Directory<'_, M> {
        Directory::new(&mut self.cache, &self.layout, self.stamp)
    }

    #[must_use]
    #[inline]
    pub(crate) const fn cache_mut(&mut self) -> &mut SectorCache<M> {
        &mut self.cache
    }
}
