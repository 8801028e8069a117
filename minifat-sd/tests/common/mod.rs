#![allow(dead_code)]

use minifat_sd::SpiBus;
use std::collections::VecDeque;

pub const SECTOR: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    V1,
    V2,
    V2HighCapacity,
}

enum Receive {
    /// Waiting for a command frame.
    Command,
    /// CMD24 was accepted, waiting for the start token.
    Token { sector: u32 },
    /// Collecting a data block and its CRC.
    Data { sector: u32, bytes: Vec<u8> },
}

/// A scripted SD card answering in SPI mode.
pub struct SimulatedCard {
    pub generation: Generation,
    pub sectors: Vec<[u8; SECTOR]>,
    /// ACMD41 answers left before the card leaves the idle state.
    pub init_polls: u32,
    /// Dummy bytes before a read data token.
    pub token_delay: usize,
    /// Bytes the card stays busy after a write.
    pub busy_len: usize,
    /// Data response token returned for written blocks.
    pub data_response: u8,
    pub idle_on_reset: bool,
    pub vdd_window: bool,
    pub bad_echo: bool,
    /// Commands received, with their argument.
    pub commands: Vec<(u8, u32)>,
    pub selected: bool,
    idle: bool,
    frame: Vec<u8>,
    receive: Receive,
    outgoing: VecDeque<u8>,
}

impl SimulatedCard {
    pub fn new(generation: Generation, sector_count: usize) -> Self {
        Self {
            generation,
            sectors: vec![[0; SECTOR]; sector_count],
            init_polls: 3,
            token_delay: 4,
            busy_len: 8,
            data_response: 0xE5,
            idle_on_reset: true,
            vdd_window: true,
            bad_echo: false,
            commands: Vec::new(),
            selected: false,
            idle: false,
            frame: Vec::new(),
            receive: Receive::Command,
            outgoing: VecDeque::new(),
        }
    }

    fn respond(&mut self, r1: u8, trailing: &[u8]) {
        // One byte of command response latency.
        self.outgoing.push_back(0xFF);
        self.outgoing.push_back(r1);
        self.outgoing.extend(trailing);
    }

    fn idle_bit(&self) -> u8 {
        u8::from(self.idle)
    }

    /// Maps a data command argument to a sector, or returns an R1 error bit.
    fn sector(&self, arg: u32) -> Result<u32, u8> {
        let sector = if self.generation == Generation::V2HighCapacity {
            arg
        } else if arg % SECTOR as u32 != 0 {
            return Err(0x20);
        } else {
            arg / SECTOR as u32
        };
        if (sector as usize) < self.sectors.len() {
            Ok(sector)
        } else {
            Err(0x40)
        }
    }

    fn execute(&mut self, index: u8, arg: u32) {
        self.commands.push((index, arg));
        match index {
            0 => {
                self.idle = self.idle_on_reset;
                let r1 = self.idle_bit();
                self.respond(r1, &[]);
            }
            8 if self.generation == Generation::V1 => self.respond(0x05, &[]),
            8 => {
                let pattern = if self.bad_echo { 0x55 } else { arg as u8 };
                self.respond(0x01, &[0, 0, (arg >> 8) as u8 & 0x0F, pattern]);
            }
            58 => {
                let mut status = 0;
                if !self.idle {
                    status |= 0x80;
                    if self.generation == Generation::V2HighCapacity {
                        status |= 0x40;
                    }
                }
                let window = if self.vdd_window { 0xFF } else { 0x00 };
                let r1 = self.idle_bit();
                self.respond(r1, &[status, window, 0x80, 0x00]);
            }
            55 => {
                let r1 = self.idle_bit();
                self.respond(r1, &[]);
            }
            41 => {
                if self.init_polls > 0 {
                    self.init_polls -= 1;
                }
                self.idle = self.init_polls > 0;
                let r1 = self.idle_bit();
                self.respond(r1, &[]);
            }
            17 => match self.sector(arg) {
                Ok(sector) => {
                    self.respond(0x00, &[]);
                    // Trailing byte of the command, then the access delay.
                    self.outgoing.push_back(0xFF);
                    self.outgoing.extend(std::iter::repeat_n(0xFF, self.token_delay));
                    self.outgoing.push_back(0xFE);
                    self.outgoing.extend(self.sectors[sector as usize]);
                    self.outgoing.extend([0x12, 0x34]);
                }
                Err(r1) => self.respond(r1, &[]),
            },
            24 => match self.sector(arg) {
                Ok(sector) => {
                    self.respond(0x00, &[]);
                    self.receive = Receive::Token { sector };
                }
                Err(r1) => self.respond(r1, &[]),
            },
            _ => self.respond(0x04, &[]),
        }
    }

    fn receive(&mut self, byte: u8) {
        match &mut self.receive {
            Receive::Command => {
                if self.frame.is_empty() && byte & 0xC0 != 0x40 {
                    return;
                }
                self.frame.push(byte);
                if self.frame.len() == 6 {
                    let index = self.frame[0] & 0x3F;
                    let arg = u32::from_be_bytes([
                        self.frame[1],
                        self.frame[2],
                        self.frame[3],
                        self.frame[4],
                    ]);
                    self.frame.clear();
                    self.execute(index, arg);
                }
            }
            Receive::Token { sector } => {
                if byte == 0xFE {
                    self.receive = Receive::Data {
                        sector: *sector,
                        bytes: Vec::with_capacity(SECTOR + 2),
                    };
                }
            }
            Receive::Data { sector, bytes } => {
                bytes.push(byte);
                if bytes.len() == SECTOR + 2 {
                    let sector = *sector as usize;
                    let accepted = self.data_response & 0x1F == 0x05;
                    if accepted {
                        self.sectors[sector].copy_from_slice(&bytes[..SECTOR]);
                    }
                    self.receive = Receive::Command;
                    self.outgoing.push_back(self.data_response);
                    if accepted {
                        self.outgoing.extend(std::iter::repeat_n(0x00, self.busy_len));
                    }
                }
            }
        }
    }
}

impl SpiBus for SimulatedCard {
    fn transfer(&mut self, byte: u8) -> u8 {
        if !self.selected {
            return 0xFF;
        }
        let out = self.outgoing.pop_front().unwrap_or(0xFF);
        self.receive(byte);
        out
    }

    fn select(&mut self, selected: bool) {
        self.selected = selected;
        if !selected {
            self.outgoing.clear();
            self.frame.clear();
            self.receive = Receive::Command;
        }
    }
}
