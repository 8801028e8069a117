//! SPI mode commands and responses.
use bitflags::bitflags;

/// Byte clocked out while only listening to the card.
pub const DUMMY_BYTE: u8 = 0xFF;
/// Token preceding a data block, in both directions.
pub const START_BLOCK_TOKEN: u8 = 0xFE;
/// Bits of the data response token that carry the status.
pub const DATA_RESPONSE_MASK: u8 = 0x1F;
/// Data response status of an accepted block.
pub const DATA_ACCEPTED: u8 = 0x05;
/// CMD8 argument: 2.7-3.6 V supply and the `0xAA` check pattern.
pub const IF_COND_ARG: u32 = 0x0000_01AA;
/// ACMD41 argument announcing high capacity support.
pub const HCS_ARG: u32 = 0x4000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GoIdleState = 0,
    SendIfCond = 8,
    ReadSingleBlock = 17,
    WriteBlock = 24,
    SdSendOpCond = 41,
    AppCmd = 55,
    ReadOcr = 58,
}

impl Command {
    #[must_use]
    #[inline]
    pub const fn index(self) -> u8 {
        self as u8
    }

    #[must_use]
    #[inline]
    /// Number of bytes following R1 in the response to this command.
    pub const fn trailing_len(self) -> usize {
        match self {
            Self::SendIfCond | Self::ReadOcr => 4,
            _ => 0,
        }
    }

    #[must_use]
    #[inline]
    /// Only CMD0 and CMD8 are checked in SPI mode, the others just carry the stop bit.
    pub const fn crc(self) -> u8 {
        match self {
            Self::GoIdleState => 0x95,
            Self::SendIfCond => 0x87,
            _ => 0x01,
        }
    }

    #[must_use]
    /// Returns the six bytes sent on the bus: start bits and index, big-endian argument, CRC.
    pub const fn frame(self, arg: u32) -> [u8; 6] {
        let [a0, a1, a2, a3] = arg.to_be_bytes();
        [0x40 | self.index(), a0, a1, a2, a3, self.crc()]
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// R1 response byte.
    pub struct R1: u8 {
        const IDLE = 1 << 0;
        const ERASE_RESET = 1 << 1;
        const ILLEGAL_COMMAND = 1 << 2;
        const CRC_ERROR = 1 << 3;
        const ERASE_SEQUENCE_ERROR = 1 << 4;
        const ADDRESS_ERROR = 1 << 5;
        const PARAMETER_ERROR = 1 << 6;
    }
}

impl R1 {
    /// Bit that is clear in every response byte.
    pub const START_BIT: u8 = 0x80;

    #[must_use]
    #[inline]
    /// Returns true if `byte` can be the start of a response.
    pub const fn is_response(byte: u8) -> bool {
        byte & Self::START_BIT == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Operating conditions register, as returned by CMD58.
pub struct Ocr([u8; 4]);

impl Ocr {
    const POWER_UP: u8 = 0x80;
    const CARD_CAPACITY: u8 = 0x40;
    const VDD_3V2_3V3: u8 = 0x08;

    #[must_use]
    #[inline]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    #[must_use]
    #[inline]
    /// Returns true once the card has finished its power up routine.
    pub const fn is_powered_up(self) -> bool {
        self.0[0] & Self::POWER_UP != 0
    }

    #[must_use]
    #[inline]
    /// Returns true for block-addressed (SDHC/SDXC) cards.
    ///
    /// Only meaningful once the card is powered up.
    pub const fn is_high_capacity(self) -> bool {
        self.0[0] & Self::CARD_CAPACITY != 0
    }

    #[must_use]
    #[inline]
    pub const fn supports_3v3(self) -> bool {
        self.0[1] & Self::VDD_3V2_3V3 != 0
    }
}
