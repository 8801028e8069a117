//! SD card driver over SPI.
//!
//! The card is driven in SPI mode with single-block reads and writes, which
//! is all a [`BlockMedium`](minifat_core::storage::BlockMedium) needs.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

mod card;
pub mod command;
mod spi;

pub use card::{CardKind, SdCard, SdConfig, SdError, SdResult};
pub use spi::SpiBus;
