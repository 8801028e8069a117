use crate::{
    SpiBus,
    command::{
        Command, DATA_ACCEPTED, DATA_RESPONSE_MASK, DUMMY_BYTE, HCS_ARG, IF_COND_ARG, Ocr, R1,
        START_BLOCK_TOKEN,
    },
};
use minifat_core::storage::{BLOCK_SIZE, Block, BlockMedium, MediumError};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SdError {
    #[error("Card did not respond")]
    Timeout,
    #[error("Card did not enter the idle state")]
    ResetFailed,
    #[error("Card did not leave the idle state")]
    InitFailed,
    #[error("Unsupported card or voltage range")]
    Unsupported,
    #[error("No data token received")]
    ReadFailed,
    #[error("Misaligned address")]
    AddressError,
    #[error("Address out of range")]
    OutOfRange,
    #[error("Data block rejected")]
    WriteRejected,
    #[error("Card stayed busy after a write")]
    WriteTimeout,
    #[error("Card not initialized")]
    NotInitialized,
}

pub type SdResult<T> = Result<T, SdError>;

impl From<SdError> for MediumError {
    fn from(err: SdError) -> Self {
        match err {
            SdError::NotInitialized => Self::NotReady,
            SdError::OutOfRange | SdError::AddressError => Self::OutOfBounds,
            _ => Self::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardKind {
    /// Not initialized, or initialization failed.
    #[default]
    Unknown,
    /// Version 1.x standard capacity card.
    V1Sc,
    /// Version 2.0 standard capacity card.
    V2Sc,
    /// Version 2.0 high capacity card.
    V2Hc,
}

impl CardKind {
    #[must_use]
    #[inline]
    /// Returns true if data commands take a sector number rather than a byte address.
    pub const fn is_block_addressed(self) -> bool {
        matches!(self, Self::V2Hc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Timeouts of the card, counted in bytes clocked on the bus.
pub struct SdConfig {
    /// Dummy bytes sent with the card deselected before reset.
    pub reset_cycles: u16,
    /// ACMD41 attempts while waiting for the card to leave the idle state.
    pub init_attempts: u16,
    /// Bytes polled for a command response.
    pub command_attempts: u16,
    /// Bytes polled for a data token.
    pub access_attempts: u16,
    /// Bytes polled while the card is busy programming a block.
    pub busy_attempts: u32,
}

impl SdConfig {
    pub const DEFAULT: Self = Self {
        reset_cycles: 10,
        init_attempts: 200,
        command_attempts: 100,
        access_attempts: 200,
        busy_attempts: 2000,
    };
}

impl Default for SdConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// An SD card driven in SPI mode.
pub struct SdCard<S: SpiBus> {
    spi: S,
    config: SdConfig,
    kind: CardKind,
}

impl<S: SpiBus> SdCard<S> {
    #[must_use]
    #[inline]
    pub const fn new(spi: S) -> Self {
        Self::with_config(spi, SdConfig::DEFAULT)
    }

    #[must_use]
    #[inline]
    pub const fn with_config(spi: S, config: SdConfig) -> Self {
        Self {
            spi,
            config,
            kind: CardKind::Unknown,
        }
    }

    #[must_use]
    #[inline]
    pub const fn kind(&self) -> CardKind {
        self.kind
    }

    #[must_use]
    #[inline]
    pub fn into_inner(self) -> S {
        self.spi
    }

    /// Resets the card into SPI mode and waits for it to be ready.
    ///
    /// On failure the card is left `Unknown` and data commands are refused.
    pub fn init(&mut self) -> SdResult<CardKind> {
        self.kind = CardKind::Unknown;

        // At least 74 clock cycles with the card deselected.
        self.spi.select(false);
        for _ in 0..self.config.reset_cycles {
            self.spi.transfer(DUMMY_BYTE);
        }

        let result = self.transaction(Self::power_up);
        match result {
            Ok(kind) => {
                log::info!("SD card ready: {kind:?}");
                self.kind = kind;
            }
            Err(err) => log::warn!("SD card initialization failed: {err}"),
        }
        result
    }

    /// Reads sector `sector` into `dst`.
    pub fn read_sector(&mut self, sector: u32, dst: &mut Block) -> SdResult<()> {
        let address = self.address(sector)?;
        self.transaction(|card| {
            card.data_command(Command::ReadSingleBlock, address)?;
            card.await_token()?;
            for byte in dst.iter_mut() {
                *byte = card.spi.transfer(DUMMY_BYTE);
            }
            // CRC
            card.spi.transfer(DUMMY_BYTE);
            card.spi.transfer(DUMMY_BYTE);
            Ok(())
        })
    }

    /// Writes `src` to sector `sector` and waits for the card to program it.
    pub fn write_sector(&mut self, sector: u32, src: &Block) -> SdResult<()> {
        let address = self.address(sector)?;
        self.transaction(|card| {
            card.data_command(Command::WriteBlock, address)?;
            card.spi.transfer(DUMMY_BYTE);
            card.spi.transfer(START_BLOCK_TOKEN);
            for &byte in src {
                card.spi.transfer(byte);
            }
            // CRC is not checked in SPI mode.
            card.spi.transfer(DUMMY_BYTE);
            card.spi.transfer(DUMMY_BYTE);

            let response = card.spi.transfer(DUMMY_BYTE) & DATA_RESPONSE_MASK;
            if response != DATA_ACCEPTED {
                log::warn!("Sector {sector} rejected with data response {response:#04x}");
                return Err(SdError::WriteRejected);
            }
            card.wait_not_busy()
        })
    }

    fn power_up(&mut self) -> SdResult<CardKind> {
        if self.command(Command::GoIdleState, 0)? != R1::IDLE {
            return Err(SdError::ResetFailed);
        }

        let (r1, echo) = self.exchange(Command::SendIfCond, IF_COND_ARG)?;
        if !r1.contains(R1::IDLE) {
            return Err(SdError::Timeout);
        }
        let mut kind = if r1.contains(R1::ILLEGAL_COMMAND) {
            CardKind::V1Sc
        } else {
            let [.., voltage, pattern] = echo;
            if pattern != 0xAA || voltage & 0x0F != 0x01 {
                return Err(SdError::Unsupported);
            }
            CardKind::V2Sc
        };

        if !self.read_ocr()?.supports_3v3() {
            return Err(SdError::Unsupported);
        }
        self.wait_ready()?;

        if kind == CardKind::V2Sc {
            let ocr = self.read_ocr()?;
            if !ocr.is_powered_up() {
                return Err(SdError::InitFailed);
            }
            if ocr.is_high_capacity() {
                kind = CardKind::V2Hc;
            }
        }
        Ok(kind)
    }

    /// Sends ACMD41 until the card leaves the idle state.
    fn wait_ready(&mut self) -> SdResult<()> {
        for attempt in 0..self.config.init_attempts {
            self.command(Command::AppCmd, 0)?;
            if self.command(Command::SdSendOpCond, HCS_ARG)?.is_empty() {
                log::debug!("SD card left idle state after {} ACMD41", attempt + 1);
                return Ok(());
            }
        }
        Err(SdError::InitFailed)
    }

    fn read_ocr(&mut self) -> SdResult<Ocr> {
        let (_, ocr) = self.exchange(Command::ReadOcr, 0)?;
        Ok(Ocr::new(ocr))
    }

    /// Sends `command` and returns its R1 response.
    fn command(&mut self, command: Command, arg: u32) -> SdResult<R1> {
        self.exchange(command, arg).map(|(r1, _)| r1)
    }

    /// Sends `command` and returns its R1 response along with the R3/R7 payload.
    ///
    /// Commands without a payload leave the trailing bytes zeroed.
    fn exchange(&mut self, command: Command, arg: u32) -> SdResult<(R1, [u8; 4])> {
        for byte in command.frame(arg) {
            self.spi.transfer(byte);
        }

        let mut response = None;
        for _ in 0..self.config.command_attempts {
            let byte = self.spi.transfer(DUMMY_BYTE);
            if R1::is_response(byte) {
                response = Some(byte);
                break;
            }
        }
        let mut trailing = [0; 4];
        if response.is_some() {
            for byte in &mut trailing[..command.trailing_len()] {
                *byte = self.spi.transfer(DUMMY_BYTE);
            }
        }
        self.spi.transfer(DUMMY_BYTE);

        let r1 = response.ok_or(SdError::Timeout)?;
        log::trace!("CMD{} ({arg:#010x}) -> {r1:#04x}", command.index());
        Ok((R1::from_bits_retain(r1), trailing))
    }

    fn data_command(&mut self, command: Command, address: u32) -> SdResult<()> {
        let r1 = self.command(command, address)?;
        if r1.contains(R1::ADDRESS_ERROR) {
            Err(SdError::AddressError)
        } else if r1.contains(R1::PARAMETER_ERROR) {
            Err(SdError::OutOfRange)
        } else {
            Ok(())
        }
    }

    fn await_token(&mut self) -> SdResult<()> {
        for _ in 0..self.config.access_attempts {
            if self.spi.transfer(DUMMY_BYTE) == START_BLOCK_TOKEN {
                return Ok(());
            }
        }
        Err(SdError::ReadFailed)
    }

    /// The card holds the line low while it programs the block.
    fn wait_not_busy(&mut self) -> SdResult<()> {
        for _ in 0..self.config.busy_attempts {
            if self.spi.transfer(DUMMY_BYTE) != 0x00 {
                return Ok(());
            }
        }
        Err(SdError::WriteTimeout)
    }

    fn address(&self, sector: u32) -> SdResult<u32> {
        if self.kind == CardKind::Unknown {
            Err(SdError::NotInitialized)
        } else if self.kind.is_block_addressed() {
            Ok(sector)
        } else {
            sector
                .checked_mul(BLOCK_SIZE as u32)
                .ok_or(SdError::OutOfRange)
        }
    }

    /// Runs `f` with the card selected, deselecting it whatever the outcome.
    fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> SdResult<T>) -> SdResult<T> {
        self.spi.select(true);
        let result = f(self);
        self.spi.select(false);
        result
    }
}

impl<S: SpiBus> BlockMedium for SdCard<S> {
    fn read_block(&mut self, index: u32, dst: &mut Block) -> Result<(), MediumError> {
        self.read_sector(index, dst).map_err(|err| {
            log::warn!("SD read of sector {index} failed: {err}");
            err.into()
        })
    }

    fn write_block(&mut self, index: u32, src: &Block) -> Result<(), MediumError> {
        self.write_sector(index, src).map_err(|err| {
            log::warn!("SD write of sector {index} failed: {err}");
            err.into()
        })
    }
}
