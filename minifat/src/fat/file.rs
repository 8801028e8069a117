//! Open files and stdio-like byte, line and block I/O.
use super::{Cluster, FsError, FsResult, dirent::DirEntry, layout::VolumeLayout};
use crate::{BlockMedium, volume::Volume};
use minifat_core::storage::BLOCK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// How a file is opened.
pub enum OpenMode {
    /// The file must exist and is only read.
    Read,
    /// The file is truncated, or created if it does not exist.
    Write,
    /// The file must exist; every write lands at its end.
    Append,
}

impl OpenMode {
    #[must_use]
    #[inline]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Read)
    }
}

impl core::str::FromStr for OpenMode {
    type Err = FsError;

    /// Parses the `fopen` style mode strings `r`, `w` and `a`.
    fn from_str(mode: &str) -> FsResult<Self> {
        match mode {
            "r" => Ok(Self::Read),
            "w" => Ok(Self::Write),
            "a" => Ok(Self::Append),
            _ => Err(FsError::UnsupportedMode),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Seek origin, with the same meaning as `std::io::SeekFrom`.
pub enum SeekFrom {
    Start(u32),
    Current(i64),
    End(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Outcome of a line read.
pub enum LineStatus {
    /// A whole line, CR LF included, was copied.
    Complete(usize),
    /// The buffer filled up before the end of the line.
    Truncated(usize),
    /// The file ended before the end of the line.
    EndOfFile(usize),
}

impl LineStatus {
    #[must_use]
    #[inline]
    /// Returns the number of bytes copied.
    pub const fn len(self) -> usize {
        match self {
            Self::Complete(len) | Self::Truncated(len) | Self::EndOfFile(len) => len,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    #[must_use]
    #[inline]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Progress of the CR LF search, kept between runs and between calls.
enum LineState {
    #[default]
    Idle,
    SawCr,
}

impl LineState {
    /// Scans `bytes` for the end of the line.
    ///
    /// Returns how many bytes belong to the line and whether it is complete.
    fn scan(&mut self, bytes: &[u8]) -> (usize, bool) {
        for (i, &byte) in bytes.iter().enumerate() {
            *self = match (*self, byte) {
                (Self::SawCr, b'\n') => {
                    *self = Self::Idle;
                    return (i + 1, true);
                }
                (_, b'\r') => Self::SawCr,
                _ => Self::Idle,
            };
        }
        (bytes.len(), false)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An open file.
///
/// The handle is a plain value: each operation borrows the volume it was opened on.
/// Handles to the same file are not coordinated, the last one written back wins.
pub struct FileHandle {
    entry: DirEntry,
    mode: OpenMode,
    /// Cluster holding the byte before the cursor when it sits on a cluster boundary,
    /// the byte under the cursor otherwise.
    current_cluster: Cluster,
    offset: u32,
    line: LineState,
}

impl FileHandle {
    pub(crate) fn open<M: BlockMedium>(
        volume: &mut Volume<M>,
        path: &str,
        mode: OpenMode,
    ) -> FsResult<Self> {
        let (dir, name) = volume.resolve_parent(path)?;
        let found = volume.directory().find_entry(dir, &name);
        let entry = match found {
            Ok(entry) => entry,
            Err(FsError::FileNotFound) if mode == OpenMode::Write => {
                volume.directory().create_entry(dir, &name)?
            }
            Err(err) => return Err(err),
        };

        let attributes = entry.attributes();
        if attributes.is_directory()
            || attributes.is_volume_id()
            || (mode.is_write() && attributes.is_read_only())
        {
            return Err(FsError::AccessDenied);
        }
        let first = entry.starting_cluster();
        if !first.is_free() && !volume.layout().contains(first) {
            log::warn!("{path} starts at cluster {first}, outside the volume");
            return Err(FsError::CorruptedChain);
        }

        let mut file = Self {
            entry,
            mode,
            current_cluster: first,
            offset: 0,
            line: LineState::Idle,
        };
        match mode {
            OpenMode::Read => {}
            OpenMode::Write => file.truncate(volume)?,
            OpenMode::Append => {
                file.seek(volume, SeekFrom::End(0))?;
            }
        }

        log::debug!("Opened {path} ({mode:?}, {} bytes)", file.size());
        Ok(file)
    }

    /// Writes the entry back if the file was opened for writing.
    pub fn close<M: BlockMedium>(mut self, volume: &mut Volume<M>) -> FsResult<()> {
        self.flush(volume)
    }

    /// Persists the size and first cluster of a file opened for writing.
    ///
    /// Data written so far reaches the medium at the latest when the
    /// directory block is loaded into the cache.
    pub fn flush<M: BlockMedium>(&mut self, volume: &mut Volume<M>) -> FsResult<()> {
        if self.mode.is_write() {
            volume.directory().update_entry(&mut self.entry)?;
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes and returns how many were read.
    ///
    /// Returns 0 at the end of the file.
    pub fn read<M: BlockMedium>(
        &mut self,
        volume: &mut Volume<M>,
        buf: &mut [u8],
    ) -> FsResult<usize> {
        self.require_read()?;
        let mut done = 0;
        while done < buf.len() && !self.eof() {
            let (cluster, block, at) = self.locate(volume, false)?;
            let run = (buf.len() - done)
                .min(BLOCK_SIZE - at)
                .min(self.remaining() as usize);

            let cache = volume.cache_mut();
            cache.read_block(block)?;
            buf[done..done + run].copy_from_slice(&cache.raw_buffer()[at..at + run]);
            self.advance(cluster, run);
            done += run;
        }
        Ok(done)
    }

    /// Writes `data` at the cursor, growing the file as needed.
    pub fn write<M: BlockMedium>(
        &mut self,
        volume: &mut Volume<M>,
        data: &[u8],
    ) -> FsResult<usize> {
        self.require_write()?;
        if self.mode == OpenMode::Append && !self.eof() {
            self.seek(volume, SeekFrom::End(0))?;
        }

        let mut done = 0;
        while done < data.len() {
            let room = u32::MAX - self.offset;
            if room == 0 {
                return Err(FsError::NoSpace);
            }
            let (cluster, block, at) = self.locate(volume, true)?;
            let run = (data.len() - done)
                .min(BLOCK_SIZE - at)
                .min(room as usize);

            let cache = volume.cache_mut();
            cache.read_block(block)?;
            cache.raw_buffer_mut()[at..at + run].copy_from_slice(&data[done..done + run]);
            cache.mark_dirty();
            self.advance(cluster, run);
            done += run;
            if self.offset > self.size() {
                self.entry.set_file_size(self.offset);
            }
        }
        Ok(done)
    }

    /// Reads one byte, `None` at the end of the file.
    pub fn fgetc<M: BlockMedium>(&mut self, volume: &mut Volume<M>) -> FsResult<Option<u8>> {
        let mut byte = [0];
        Ok((self.read(volume, &mut byte)? == 1).then_some(byte[0]))
    }

    pub fn fputc<M: BlockMedium>(&mut self, volume: &mut Volume<M>, byte: u8) -> FsResult<()> {
        self.write(volume, &[byte]).map(|_| ())
    }

    pub fn fputs<M: BlockMedium>(&mut self, volume: &mut Volume<M>, text: &str) -> FsResult<()> {
        self.write(volume, text.as_bytes()).map(|_| ())
    }

    /// Reads a CR LF terminated line into `buf`, terminator included.
    ///
    /// A CR at the very end of a truncated read is remembered, so that
    /// a following call starting with LF completes the line.
    pub fn fgets<M: BlockMedium>(
        &mut self,
        volume: &mut Volume<M>,
        buf: &mut [u8],
    ) -> FsResult<LineStatus> {
        self.require_read()?;
        let mut len = 0;
        while len < buf.len() {
            if self.eof() {
                return Ok(LineStatus::EndOfFile(len));
            }
            let (cluster, block, at) = self.locate(volume, false)?;
            let run = (buf.len() - len)
                .min(BLOCK_SIZE - at)
                .min(self.remaining() as usize);

            let cache = volume.cache_mut();
            cache.read_block(block)?;
            let bytes = &cache.raw_buffer()[at..at + run];
            let (run, complete) = self.line.scan(bytes);
            buf[len..len + run].copy_from_slice(&bytes[..run]);
            self.advance(cluster, run);
            len += run;
            if complete {
                return Ok(LineStatus::Complete(len));
            }
        }
        Ok(LineStatus::Truncated(len))
    }

    /// Moves the cursor and returns its new position.
    ///
    /// Targets before the start or past the end of the file fail with
    /// `InvalidOffset` and leave the cursor where it was.
    pub fn seek<M: BlockMedium>(&mut self, volume: &mut Volume<M>, pos: SeekFrom) -> FsResult<u32> {
        let size = i64::from(self.size());
        let target = match pos {
            SeekFrom::Start(offset) => Some(i64::from(offset)),
            SeekFrom::Current(delta) => i64::from(self.offset).checked_add(delta),
            SeekFrom::End(delta) => size.checked_add(delta),
        }
        .filter(|target| (0..=size).contains(target))
        .and_then(|target| u32::try_from(target).ok())
        .ok_or(FsError::InvalidOffset)?;

        let cluster_bytes = volume.layout().cluster_bytes();
        let mut steps = target / cluster_bytes;
        if steps > 0 && target % cluster_bytes == 0 {
            steps -= 1;
        }

        let mut cluster = self.entry.starting_cluster();
        if !cluster.is_free() {
            let mut fat = volume.fat();
            for _ in 0..steps {
                cluster = fat.find_next(cluster)?;
            }
        }

        self.current_cluster = cluster;
        self.offset = target;
        self.line = LineState::Idle;
        Ok(target)
    }

    #[must_use]
    #[inline]
    pub const fn tell(&self) -> u32 {
        self.offset
    }

    #[must_use]
    #[inline]
    pub const fn eof(&self) -> bool {
        self.offset >= self.entry.file_size()
    }

    #[must_use]
    #[inline]
    pub const fn size(&self) -> u32 {
        self.entry.file_size()
    }

    #[must_use]
    #[inline]
    pub const fn mode(&self) -> OpenMode {
        self.mode
    }

    #[must_use]
    #[inline]
    /// Returns the in-memory copy of the file's directory entry.
    pub const fn entry(&self) -> &DirEntry {
        &self.entry
    }

    /// Frees the clusters of the file and empties it.
    fn truncate<M: BlockMedium>(&mut self, volume: &mut Volume<M>) -> FsResult<()> {
        volume.fat().free_chain(self.entry.starting_cluster_mut())?;
        self.entry.set_file_size(0);
        self.current_cluster = Cluster::FREE;
        self.offset = 0;
        Ok(())
    }

    /// Returns the cluster, block and offset in block of the byte under the cursor.
    ///
    /// Crossing into a new cluster follows the chain, extending it when `grow` is set.
    /// The cursor itself is only moved by `advance`.
    fn locate<M: BlockMedium>(
        &mut self,
        volume: &mut Volume<M>,
        grow: bool,
    ) -> FsResult<(Cluster, u32, usize)> {
        let layout: VolumeLayout = *volume.layout();
        let in_cluster = self.offset % layout.cluster_bytes();

        let cluster = if self.current_cluster.is_free() {
            // Only an empty file has no cluster yet.
            if !grow || self.offset != 0 {
                return Err(FsError::CorruptedChain);
            }
            let first = volume.fat().allocate(Cluster::FREE)?;
            self.entry.set_starting_cluster(first);
            self.current_cluster = first;
            first
        } else if self.offset == 0 || in_cluster != 0 {
            self.current_cluster
        } else {
            let mut fat = volume.fat();
            match fat.find_next(self.current_cluster) {
                Ok(next) => next,
                Err(FsError::EndOfChain) if grow => fat.allocate(self.current_cluster)?,
                Err(err) => return Err(err),
            }
        };

        let block = layout.cluster_to_block(cluster) + in_cluster / BLOCK_SIZE as u32;
        Ok((cluster, block, (in_cluster % BLOCK_SIZE as u32) as usize))
    }

    #[expect(clippy::cast_possible_truncation, reason = "Runs never exceed a block")]
    fn advance(&mut self, cluster: Cluster, run: usize) {
        self.current_cluster = cluster;
        self.offset += run as u32;
    }

    const fn remaining(&self) -> u32 {
        self.entry.file_size().saturating_sub(self.offset)
    }

    const fn require_read(&self) -> FsResult<()> {
        match self.mode {
            OpenMode::Read => Ok(()),
            OpenMode::Write | OpenMode::Append => Err(FsError::AccessDenied),
        }
    }

    const fn require_write(&self) -> FsResult<()> {
        match self.mode {
            OpenMode::Read => Err(FsError::AccessDenied),
            OpenMode::Write | OpenMode::Append => Ok(()),
        }
    }
}
