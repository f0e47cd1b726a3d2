//! Scripted target for unit tests
//!
//! Answers query reads from a table, status reads from a script, and
//! array reads from a sparse memory map. Every bus write is logged.

use super::command::BusWord;
use crate::error::{Error, Result};
use crate::target::{Endianness, RegParam, Target, WorkingArea};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Array,
    Query,
    Status,
}

pub struct MockTarget {
    pub endianness: Endianness,
    pub halted: bool,
    pub base: u32,
    pub chip_width: u32,
    pub bus_width: u32,
    pub query: Vec<u8>,
    pub mode: Mode,
    pub statuses: VecDeque<u8>,
    pub memory: BTreeMap<u32, u8>,
    /// (address, numeric bus value) of every write
    pub writes: Vec<(u32, u32)>,
    /// (address, numeric bus value) of every programmed word
    pub programmed: Vec<(u32, u32)>,
    pub delays: u32,
    pending_program: bool,
}

impl MockTarget {
    pub fn new(chip_width: u32, bus_width: u32, query: Vec<u8>) -> Self {
        Self {
            endianness: Endianness::Little,
            halted: true,
            base: 0,
            chip_width,
            bus_width,
            query,
            mode: Mode::Array,
            statuses: VecDeque::new(),
            memory: BTreeMap::new(),
            writes: Vec::new(),
            programmed: Vec::new(),
            delays: 0,
            pending_program: false,
        }
    }

    /// Commands (chip 0 byte) written so far
    pub fn commands(&self) -> Vec<u8> {
        self.writes.iter().map(|&(_, v)| v as u8).collect()
    }

    fn replicate(&self, byte: u8) -> BusWord {
        BusWord::command(byte, self.chip_width, self.bus_width)
    }
}

/// Query table of an Intel-style x16 device with its extension at 0x31
pub fn intel_query_table(dev_size_exp: u8, regions: &[u32], features: u32) -> Vec<u8> {
    let mut t = vec![0u8; 0x31 + 0x13];
    t[0x10..0x13].copy_from_slice(b"QRY");
    t[0x13] = 0x01; // pri id
    t[0x15] = 0x31; // pri addr
    t[0x1B] = 0x27;
    t[0x1C] = 0x36;
    t[0x1F] = 4; // word write typ
    t[0x21] = 10; // block erase typ
    t[0x23] = 4;
    t[0x25] = 4;
    t[0x27] = dev_size_exp;
    t[0x28] = 0x01;
    t[0x2A] = 0x05;
    t[0x2C] = regions.len() as u8;
    for (i, r) in regions.iter().enumerate() {
        let at = 0x2D + 4 * i;
        t[at..at + 4].copy_from_slice(&r.to_le_bytes());
    }
    let ext = 0x31;
    t[ext..ext + 3].copy_from_slice(b"PRI");
    t[ext + 3] = b'1';
    t[ext + 4] = b'1';
    t[ext + 5..ext + 9].copy_from_slice(&features.to_le_bytes());
    t[ext + 0x0A] = 0x01; // block status reports lock bit
    t[ext + 0x0E] = 0x01;
    t[ext + 0x0F] = 0x80;
    t
}

impl Target for MockTarget {
    fn endianness(&self) -> Endianness {
        self.endianness
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn read_memory(&mut self, address: u32, size: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = (size * count) as usize;
        match self.mode {
            Mode::Array => {
                for (i, b) in buf[..len].iter_mut().enumerate() {
                    *b = *self.memory.get(&(address + i as u32)).unwrap_or(&0xFF);
                }
            }
            Mode::Query => {
                let offset = ((address - self.base) / self.bus_width) as usize;
                let byte = self.query.get(offset).copied().unwrap_or(0);
                let word = self.replicate(byte).to_bytes(self.endianness);
                buf[..len].copy_from_slice(&word[..len]);
            }
            Mode::Status => {
                let status = self.statuses.pop_front().unwrap_or(0x80);
                let word = self.replicate(status).to_bytes(self.endianness);
                buf[..len].copy_from_slice(&word[..len]);
            }
        }
        Ok(())
    }

    fn write_memory(&mut self, address: u32, size: u32, count: u32, data: &[u8]) -> Result<()> {
        let len = (size * count) as usize;
        let value = BusWord::from_bytes(&data[..len], self.endianness).value();
        self.writes.push((address, value));
        if self.pending_program {
            self.pending_program = false;
            self.programmed.push((address, value));
            for (i, &b) in data[..len].iter().enumerate() {
                let cell = self.memory.entry(address + i as u32).or_insert(0xFF);
                *cell &= b;
            }
            self.mode = Mode::Status;
            return Ok(());
        }
        self.pending_program = value as u8 == 0x40;
        self.mode = match value as u8 {
            0x98 | 0x90 => Mode::Query,
            0xFF | 0xF0 => Mode::Array,
            0x50 => self.mode,
            _ => Mode::Status,
        };
        Ok(())
    }

    fn alloc_working_area(&mut self, _size: u32) -> Result<WorkingArea> {
        Err(Error::ResourceUnavailable)
    }

    fn free_working_area(&mut self, _area: WorkingArea) {}

    fn run_algorithm(
        &mut self,
        _entry: u32,
        _exit: u32,
        _params: &mut [RegParam],
        _timeout_ms: u32,
    ) -> Result<()> {
        Err(Error::AlgorithmFailed)
    }

    fn delay_us(&mut self, _us: u32) {
        self.delays += 1;
    }
}
