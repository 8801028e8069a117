//! A small FAT32 driver for block media with 512-byte sectors.
//!
//! Every access to the medium goes through a single-sector write-back cache,
//! which keeps the memory footprint to one block. Files are addressed by
//! `/`-separated 8.3 names and accessed through stdio-like handles.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

extern crate alloc;

pub use minifat_core::storage::{BLOCK_SIZE, BlockMedium, MediumError, MemoryMedium};

pub mod cache;
pub mod fat;
mod format;
pub mod partition;
mod volume;

pub use fat::{
    Cluster, FsError, FsResult,
    date::{Date, DateTime, Time},
    dirent::DirEntry,
    file::{FileHandle, LineStatus, OpenMode, SeekFrom},
};
pub use format::{FormatOptions, format};
pub use volume::Volume;
