//! Emulated CFI NOR bank
//!
//! One state machine drives the whole bus: commands are decoded from chip
//! 0's lane, query and status data are replicated into every chip lane, and
//! programmed data is ANDed into the array byte for byte.

use alloc::vec;
use alloc::vec::Vec;
use cfiflash_core::cfi::command::{opcodes, BusWord, QUERY_OFFSET};
use cfiflash_core::cfi::{CommandSet, EraseRegion, IntelFeatures, AMD_UNLOCK1, AMD_UNLOCK2};
use cfiflash_core::target::Endianness;

const STATUS_READY: u8 = 0x80;
const STATUS_ERASE_ERROR: u8 = 0x20;
const STATUS_PROGRAM_ERROR: u8 = 0x10;
const STATUS_LOCKED: u8 = 0x02;

const DQ6_TOGGLE: u8 = 0x40;
const DQ5_TIMEOUT: u8 = 0x20;

/// Alternate Intel word-program opcode
const PROGRAM_SETUP_ALT: u8 = 0x10;
/// AMD chip erase confirm
const AMD_CHIP_ERASE: u8 = 0x10;

/// Description of the emulated device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipConfig {
    /// Command set the device speaks
    pub command_set: CommandSet,
    /// Manufacturer id in identifier mode
    pub manufacturer_id: u8,
    /// Device id in identifier mode
    pub device_id: u16,
    /// Erase regions in table order
    pub regions: Vec<EraseRegion>,
    /// Intel/Sharp feature word
    pub features: IntelFeatures,
    /// First AMD unlock address (chip-relative word)
    pub unlock1: u32,
    /// Second AMD unlock address (chip-relative word)
    pub unlock2: u32,
    /// Whether the device answers the query command
    pub cfi: bool,
}

impl ChipConfig {
    /// Intel/Sharp device with individual block locking
    pub fn intel(regions: &[EraseRegion]) -> Self {
        Self {
            command_set: CommandSet::IntelSharp,
            manufacturer_id: 0x89,
            device_id: 0x0018,
            regions: regions.to_vec(),
            features: IntelFeatures::ERASE_SUSPEND
                | IntelFeatures::PROGRAM_SUSPEND
                | IntelFeatures::INDIVIDUAL_LOCK,
            unlock1: AMD_UNLOCK1,
            unlock2: AMD_UNLOCK2,
            cfi: true,
        }
    }

    /// AMD/Fujitsu device with the standard unlock addresses
    pub fn amd(regions: &[EraseRegion]) -> Self {
        Self {
            command_set: CommandSet::AmdFujitsu,
            manufacturer_id: 0x01,
            device_id: 0x227E,
            regions: regions.to_vec(),
            features: IntelFeatures::empty(),
            unlock1: AMD_UNLOCK1,
            unlock2: AMD_UNLOCK2,
            cfi: true,
        }
    }

    /// SST part without a query table, `sectors` blocks of 4 KiB
    pub fn sst(device_id: u16, sectors: u32) -> Self {
        Self {
            manufacturer_id: 0xBF,
            device_id,
            unlock1: 0x5555,
            unlock2: 0x2AAA,
            cfi: false,
            ..Self::amd(&[EraseRegion::new(sectors, 4096)])
        }
    }

    /// Size of the array in bytes
    pub fn size(&self) -> u64 {
        self.regions.iter().map(|r| r.total_size()).sum()
    }

    fn pri_id(&self) -> u16 {
        match self.command_set {
            CommandSet::IntelSharp => 0x0001,
            CommandSet::AmdFujitsu => 0x0002,
            CommandSet::Unsupported(id) => id,
        }
    }

    /// Query table as seen through chip-relative word offsets
    pub fn query_table(&self) -> Vec<u8> {
        let ext = (0x2D + 4 * self.regions.len()).max(0x31);
        let mut t = vec![0u8; ext + 0x13];

        t[0x10..0x13].copy_from_slice(b"QRY");
        t[0x13..0x15].copy_from_slice(&self.pri_id().to_le_bytes());
        t[0x15..0x17].copy_from_slice(&(ext as u16).to_le_bytes());
        t[0x1B] = 0x27; // Vcc min 2.7
        t[0x1C] = 0x36; // Vcc max 3.6
        t[0x1F] = 4; // word write 16 us
        t[0x21] = 10; // block erase 1 s
        t[0x23] = 4;
        t[0x25] = 4;
        t[0x27] = size_exponent(self.size());
        t[0x28] = 0x02;
        t[0x2A] = 0x05;
        t[0x2C] = self.regions.len() as u8;
        for (i, region) in self.regions.iter().enumerate() {
            let at = 0x2D + 4 * i;
            t[at..at + 4].copy_from_slice(&region.0.to_le_bytes());
        }

        t[ext..ext + 3].copy_from_slice(b"PRI");
        t[ext + 3] = b'1';
        t[ext + 4] = b'1';
        match self.command_set {
            CommandSet::AmdFujitsu => {
                t[ext + 6] = 0x02; // erase suspend, read and write
                t[ext + 7] = 0x01; // block protect
                t[ext + 9] = 0x04;
                t[ext + 0xD] = 0xB5;
                t[ext + 0xE] = 0xC5;
                t[ext + 0xF] = 0x02; // bottom boot
            }
            _ => {
                t[ext + 5..ext + 9].copy_from_slice(&self.features.bits().to_le_bytes());
                t[ext + 9] = 0x01;
                t[ext + 0xA] = 0x01; // block status reports the lock bit
                t[ext + 0xC] = 0x33;
                t[ext + 0xE] = 0x01;
                t[ext + 0xF] = 0x80;
                t[ext + 0x11] = 0x03;
                t[ext + 0x12] = 0x03;
            }
        }
        t
    }
}

fn size_exponent(size: u64) -> u8 {
    if size == 0 {
        0
    } else {
        (u64::BITS - 1 - size.leading_zeros()) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Array,
    Query,
    Status,
    Identifier,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cycle {
    Idle,
    IntelProgram,
    IntelErase,
    IntelLock,
    AmdUnlock1,
    AmdUnlocked,
    AmdProgram,
    AmdEraseSetup,
    AmdEraseUnlock1,
    AmdEraseUnlocked,
}

/// A bank of identical chips sharing one command state
#[derive(Debug, Clone)]
pub struct CfiChip {
    config: ChipConfig,
    endianness: Endianness,
    chip_width: u32,
    bus_width: u32,
    query: Vec<u8>,
    sectors: Vec<(u32, u32)>,
    memory: Vec<u8>,
    locks: Vec<bool>,
    mode: Mode,
    cycle: Cycle,
    status: u8,
    busy: u32,
    busy_per_op: u32,
    toggle: u8,
    stuck: bool,
    fail_next: bool,
    failed: bool,
    commands: Vec<(u32, u8)>,
    programmed: Vec<u32>,
}

impl CfiChip {
    /// Create an erased bank
    pub fn new(config: ChipConfig, chip_width: u32, bus_width: u32, endianness: Endianness) -> Self {
        let mut sectors = Vec::new();
        let mut offset = 0u32;
        for region in &config.regions {
            for _ in 0..region.block_count() {
                sectors.push((offset, region.block_size()));
                offset = offset.wrapping_add(region.block_size());
            }
        }
        let query = config.query_table();
        let size = config.size() as usize;
        Self {
            endianness,
            chip_width,
            bus_width,
            query,
            locks: vec![false; sectors.len()],
            sectors,
            memory: vec![0xFF; size],
            mode: Mode::Array,
            cycle: Cycle::Idle,
            status: STATUS_READY,
            busy: 0,
            busy_per_op: 0,
            toggle: 0,
            stuck: false,
            fail_next: false,
            failed: false,
            commands: Vec::new(),
            programmed: Vec::new(),
            config,
        }
    }

    /// Device description
    pub fn config(&self) -> &ChipConfig {
        &self.config
    }

    /// Array contents
    pub fn data(&self) -> &[u8] {
        &self.memory
    }

    /// Mutable array contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Number of erase blocks
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Set or clear a block's protection directly
    pub fn set_locked(&mut self, sector: usize, locked: bool) {
        if let Some(lock) = self.locks.get_mut(sector) {
            *lock = locked;
        }
    }

    /// Whether a block is protected
    pub fn is_locked(&self, sector: usize) -> bool {
        self.locks.get(sector).copied().unwrap_or(false)
    }

    /// Status reads that report busy after each embedded operation
    pub fn set_busy_reads(&mut self, reads: u32) {
        self.busy_per_op = reads;
    }

    /// Keep every following operation busy forever
    pub fn set_stuck(&mut self, stuck: bool) {
        self.stuck = stuck;
    }

    /// Make the next program or erase report a device error
    pub fn inject_failure(&mut self) {
        self.fail_next = true;
    }

    /// (bank offset, chip 0 byte) of every bus write
    pub fn commands(&self) -> &[(u32, u8)] {
        &self.commands
    }

    /// Bank offsets of every programmed bus word
    pub fn programmed(&self) -> &[u32] {
        &self.programmed
    }

    /// Forget the command and program logs
    pub fn clear_log(&mut self) {
        self.commands.clear();
        self.programmed.clear();
    }

    fn sector_index(&self, offset: u32) -> Option<usize> {
        self.sectors
            .iter()
            .position(|&(start, size)| offset >= start && offset - start < size)
    }

    fn replicate(&self, byte: u8) -> BusWord {
        BusWord::command(byte, self.chip_width, self.bus_width)
    }

    /// Bus read at a bank offset
    pub(crate) fn read(&mut self, offset: u32, buf: &mut [u8]) {
        if self.mode == Mode::Toggle && self.busy == 0 && !self.failed {
            self.mode = Mode::Array;
        }
        if self.mode == Mode::Array {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self
                    .memory
                    .get(offset as usize + i)
                    .copied()
                    .unwrap_or(0xFF);
            }
            return;
        }

        // non-array data is produced once per bus word
        let width = self.bus_width as usize;
        let mut pos = 0;
        while pos < buf.len() {
            let address = offset as usize + pos;
            let aligned = address - address % width;
            let byte = self.register_read(aligned as u32);
            let bytes = self.replicate(byte).to_bytes(self.endianness);
            let first = address - aligned;
            let n = (width - first).min(buf.len() - pos);
            buf[pos..pos + n].copy_from_slice(&bytes[first..first + n]);
            pos += n;
        }
    }

    fn register_read(&mut self, offset: u32) -> u8 {
        match self.mode {
            Mode::Query => self
                .query
                .get((offset / self.bus_width) as usize)
                .copied()
                .unwrap_or(0),
            Mode::Status => {
                if self.busy > 0 {
                    if !self.stuck {
                        self.busy -= 1;
                    }
                    self.status & !STATUS_READY
                } else {
                    self.status
                }
            }
            Mode::Identifier => self.identifier(offset),
            Mode::Toggle => {
                if !self.stuck && !self.failed {
                    self.busy -= 1;
                }
                self.toggle ^= DQ6_TOGGLE;
                if self.failed {
                    self.toggle | DQ5_TIMEOUT
                } else {
                    self.toggle
                }
            }
            Mode::Array => 0xFF,
        }
    }

    fn identifier(&self, offset: u32) -> u8 {
        let Some(index) = self.sector_index(offset) else {
            return 0;
        };
        let (start, _) = self.sectors[index];
        match (offset - start) / self.bus_width {
            0 => self.config.manufacturer_id,
            1 => self.config.device_id as u8,
            2 => self.locks[index] as u8,
            _ => 0,
        }
    }

    /// Bus write at a bank offset
    pub(crate) fn write(&mut self, offset: u32, data: &[u8]) {
        let width = self.bus_width as usize;
        for (i, chunk) in data.chunks(width).enumerate() {
            let address = offset + (i * width) as u32;
            let word = BusWord::from_bytes(chunk, self.endianness);
            self.commands
                .push((address, word.lane_byte(0, self.chip_width)));
            match self.config.command_set {
                CommandSet::AmdFujitsu => self.write_amd(address, word),
                _ => self.write_intel(address, word),
            }
        }
    }

    fn begin_operation(&mut self) {
        self.busy = if self.stuck { 1 } else { self.busy_per_op };
    }

    fn program(&mut self, offset: u32, word: BusWord) -> bool {
        self.programmed.push(offset);
        if self.sector_index(offset).is_some_and(|i| self.locks[i]) {
            log::debug!("program of locked block at 0x{:x}", offset);
            return false;
        }
        let bytes = word.to_bytes(self.endianness);
        for (i, &b) in bytes[..word.width() as usize].iter().enumerate() {
            if let Some(cell) = self.memory.get_mut(offset as usize + i) {
                *cell &= b;
            }
        }
        true
    }

    fn erase_sector(&mut self, offset: u32) -> bool {
        let Some(index) = self.sector_index(offset) else {
            return false;
        };
        if self.locks[index] {
            log::debug!("erase of locked block {}", index);
            return false;
        }
        let (start, size) = self.sectors[index];
        self.memory[start as usize..(start + size) as usize].fill(0xFF);
        true
    }

    fn write_intel(&mut self, offset: u32, word: BusWord) {
        let cmd = word.lane_byte(0, self.chip_width);

        match self.cycle {
            Cycle::IntelProgram => {
                self.cycle = Cycle::Idle;
                self.mode = Mode::Status;
                self.begin_operation();
                if self.fail_next {
                    self.fail_next = false;
                    self.status |= STATUS_PROGRAM_ERROR;
                } else if !self.program(offset, word) {
                    self.status |= STATUS_PROGRAM_ERROR | STATUS_LOCKED;
                }
                return;
            }
            Cycle::IntelErase => {
                self.cycle = Cycle::Idle;
                self.mode = Mode::Status;
                self.begin_operation();
                if cmd != opcodes::CONFIRM {
                    // command sequence error
                    self.status |= STATUS_ERASE_ERROR | STATUS_PROGRAM_ERROR;
                } else if self.fail_next {
                    self.fail_next = false;
                    self.status |= STATUS_ERASE_ERROR;
                } else if !self.erase_sector(offset) {
                    self.status |= STATUS_ERASE_ERROR | STATUS_LOCKED;
                }
                return;
            }
            Cycle::IntelLock => {
                self.cycle = Cycle::Idle;
                let index = self.sector_index(offset);
                match (cmd, index) {
                    (opcodes::LOCK_SET, Some(i)) => {
                        self.locks[i] = true;
                        self.mode = Mode::Status;
                        self.begin_operation();
                        return;
                    }
                    (opcodes::LOCK_CLEAR, Some(i)) => {
                        if self.config.features.contains(IntelFeatures::INDIVIDUAL_LOCK) {
                            self.locks[i] = false;
                        } else {
                            self.locks.fill(false);
                        }
                        self.mode = Mode::Status;
                        self.begin_operation();
                        return;
                    }
                    // an unconfirmed lock setup is abandoned
                    _ => {}
                }
            }
            _ => {}
        }

        match cmd {
            opcodes::QUERY if self.config.cfi => self.mode = Mode::Query,
            opcodes::READ_IDENTIFIER => self.mode = Mode::Identifier,
            opcodes::READ_ARRAY | opcodes::RESET => self.mode = Mode::Array,
            opcodes::CLEAR_STATUS => self.status = STATUS_READY,
            opcodes::READ_STATUS => self.mode = Mode::Status,
            opcodes::ERASE_SETUP => {
                self.cycle = Cycle::IntelErase;
                self.mode = Mode::Status;
            }
            opcodes::PROGRAM_SETUP | PROGRAM_SETUP_ALT => {
                self.cycle = Cycle::IntelProgram;
                self.mode = Mode::Status;
            }
            opcodes::LOCK_SETUP => {
                self.cycle = Cycle::IntelLock;
                self.mode = Mode::Status;
            }
            other => log::trace!("ignoring command 0x{:02x} at 0x{:x}", other, offset),
        }
    }

    fn start_toggle(&mut self) {
        self.mode = Mode::Toggle;
        self.begin_operation();
        if self.fail_next {
            self.fail_next = false;
            self.failed = true;
        }
    }

    fn write_amd(&mut self, offset: u32, word: BusWord) {
        let cmd = word.lane_byte(0, self.chip_width);
        let word_offset = offset / self.bus_width;
        let at_unlock1 = word_offset == self.config.unlock1;
        let at_unlock2 = word_offset == self.config.unlock2;

        if self.cycle == Cycle::AmdProgram {
            self.cycle = Cycle::Idle;
            if !self.fail_next {
                self.program(offset, word);
            }
            self.start_toggle();
            return;
        }
        if cmd == opcodes::RESET {
            self.mode = Mode::Array;
            self.cycle = Cycle::Idle;
            self.failed = false;
            self.busy = 0;
            return;
        }
        if self.mode == Mode::Toggle && (self.busy > 0 || self.failed) {
            log::trace!("write of 0x{:02x} while busy", cmd);
            return;
        }

        self.cycle = match (self.cycle, cmd) {
            (Cycle::Idle, opcodes::QUERY) if word_offset == QUERY_OFFSET && self.config.cfi => {
                self.mode = Mode::Query;
                Cycle::Idle
            }
            (Cycle::Idle, opcodes::AMD_UNLOCK1) if at_unlock1 => Cycle::AmdUnlock1,
            (Cycle::AmdUnlock1, opcodes::AMD_UNLOCK2) if at_unlock2 => Cycle::AmdUnlocked,
            (Cycle::AmdUnlocked, opcodes::AMD_PROGRAM) if at_unlock1 => Cycle::AmdProgram,
            (Cycle::AmdUnlocked, opcodes::AMD_ERASE_SETUP) if at_unlock1 => Cycle::AmdEraseSetup,
            (Cycle::AmdUnlocked, opcodes::READ_IDENTIFIER) if at_unlock1 => {
                self.mode = Mode::Identifier;
                Cycle::Idle
            }
            (Cycle::AmdEraseSetup, opcodes::AMD_UNLOCK1) if at_unlock1 => Cycle::AmdEraseUnlock1,
            (Cycle::AmdEraseUnlock1, opcodes::AMD_UNLOCK2) if at_unlock2 => {
                Cycle::AmdEraseUnlocked
            }
            (Cycle::AmdEraseUnlocked, opcodes::AMD_SECTOR_ERASE) => {
                if !self.fail_next {
                    self.erase_sector(offset);
                }
                self.start_toggle();
                Cycle::Idle
            }
            (Cycle::AmdEraseUnlocked, AMD_CHIP_ERASE) if at_unlock1 => {
                if !self.fail_next {
                    for i in 0..self.sectors.len() {
                        let (start, _) = self.sectors[i];
                        self.erase_sector(start);
                    }
                }
                self.start_toggle();
                Cycle::Idle
            }
            _ => Cycle::Idle,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intel_x16() -> CfiChip {
        CfiChip::new(
            ChipConfig::intel(&[EraseRegion::new(4, 0x1000)]),
            2,
            2,
            Endianness::Little,
        )
    }

    fn write_cmd(chip: &mut CfiChip, offset: u32, cmd: u8) {
        let bytes = BusWord::command(cmd, chip.chip_width, chip.bus_width).to_bytes(chip.endianness);
        chip.write(offset, &bytes[..chip.bus_width as usize]);
    }

    fn read_u16(chip: &mut CfiChip, offset: u32) -> u16 {
        let mut buf = [0u8; 2];
        chip.read(offset, &mut buf);
        u16::from_le_bytes(buf)
    }

    #[test]
    fn test_query_table_layout() {
        let config = ChipConfig::intel(&[EraseRegion::new(8, 0x2000), EraseRegion::new(2, 0x10000)]);
        let t = config.query_table();
        assert_eq!(&t[0x10..0x13], b"QRY");
        assert_eq!(t[0x13], 0x01);
        assert_eq!(t[0x15], 0x35);
        assert_eq!(t[0x27], 17); // 192 KiB rounds down
        assert_eq!(t[0x2C], 2);
        assert_eq!(&t[0x35..0x38], b"PRI");
    }

    #[test]
    fn test_query_mode_replicates_into_lanes() {
        let mut chip = CfiChip::new(
            ChipConfig::intel(&[EraseRegion::new(4, 0x1000)]),
            1,
            2,
            Endianness::Little,
        );
        write_cmd(&mut chip, 0xAA, opcodes::QUERY);
        assert_eq!(read_u16(&mut chip, 0x20), 0x5151); // 'Q'
        write_cmd(&mut chip, 0, opcodes::READ_ARRAY);
        assert_eq!(read_u16(&mut chip, 0x20), 0xFFFF);
    }

    #[test]
    fn test_intel_program_and_status() {
        let mut chip = intel_x16();
        chip.set_busy_reads(2);
        write_cmd(&mut chip, 0x100, opcodes::PROGRAM_SETUP);
        chip.write(0x100, &[0x34, 0x12]);
        assert_eq!(read_u16(&mut chip, 0), 0x0000);
        assert_eq!(read_u16(&mut chip, 0), 0x0000);
        assert_eq!(read_u16(&mut chip, 0), 0x0080);
        write_cmd(&mut chip, 0, opcodes::READ_ARRAY);
        assert_eq!(read_u16(&mut chip, 0x100), 0x1234);
        assert_eq!(chip.programmed(), &[0x100]);
    }

    #[test]
    fn test_intel_locked_block() {
        let mut chip = intel_x16();
        write_cmd(&mut chip, 0x1000, opcodes::LOCK_SETUP);
        write_cmd(&mut chip, 0x1000, opcodes::LOCK_SET);
        assert!(chip.is_locked(1));

        write_cmd(&mut chip, 0x1000, opcodes::ERASE_SETUP);
        write_cmd(&mut chip, 0x1000, opcodes::CONFIRM);
        assert_eq!(read_u16(&mut chip, 0), 0x00A2);

        write_cmd(&mut chip, 0, opcodes::CLEAR_STATUS);
        assert_eq!(read_u16(&mut chip, 0), 0x0080);

        write_cmd(&mut chip, 0x1000, opcodes::LOCK_SETUP);
        write_cmd(&mut chip, 0x1000, opcodes::LOCK_CLEAR);
        assert!(!chip.is_locked(1));
    }

    #[test]
    fn test_simultaneous_unlock_clears_all() {
        let mut config = ChipConfig::intel(&[EraseRegion::new(4, 0x1000)]);
        config.features = IntelFeatures::SIMULTANEOUS_UNLOCK;
        let mut chip = CfiChip::new(config, 2, 2, Endianness::Little);
        chip.set_locked(0, true);
        chip.set_locked(3, true);
        write_cmd(&mut chip, 0x2000, opcodes::LOCK_SETUP);
        write_cmd(&mut chip, 0x2000, opcodes::LOCK_CLEAR);
        assert!(!chip.is_locked(0));
        assert!(!chip.is_locked(3));
    }

    #[test]
    fn test_amd_sequences() {
        let mut chip = CfiChip::new(
            ChipConfig::amd(&[EraseRegion::new(4, 0x1000)]),
            1,
            1,
            Endianness::Little,
        );
        chip.set_busy_reads(2);
        chip.data_mut()[0x1000] = 0x00;

        for (offset, cmd) in [(0x555, 0xAA), (0x2AA, 0x55), (0x555, 0x80), (0x555, 0xAA), (0x2AA, 0x55)] {
            write_cmd(&mut chip, offset, cmd);
        }
        write_cmd(&mut chip, 0x1000, opcodes::AMD_SECTOR_ERASE);

        let mut a = [0u8];
        let mut b = [0u8];
        chip.read(0x1000, &mut a);
        chip.read(0x1000, &mut b);
        assert_eq!((a[0] ^ b[0]) & DQ6_TOGGLE, DQ6_TOGGLE);
        chip.read(0x1000, &mut a);
        assert_eq!(a[0], 0xFF);

        // a wrong unlock address aborts the sequence
        write_cmd(&mut chip, 0x554, 0xAA);
        write_cmd(&mut chip, 0x2AA, 0x55);
        write_cmd(&mut chip, 0x555, opcodes::AMD_PROGRAM);
        write_cmd(&mut chip, 0x10, 0x00);
        assert!(chip.programmed().is_empty());
    }

    #[test]
    fn test_amd_failure_holds_dq5_until_reset() {
        let mut chip = CfiChip::new(
            ChipConfig::amd(&[EraseRegion::new(4, 0x1000)]),
            1,
            1,
            Endianness::Little,
        );
        chip.inject_failure();
        for (offset, cmd) in [(0x555, 0xAA), (0x2AA, 0x55), (0x555, 0xA0), (0x10, 0x00)] {
            write_cmd(&mut chip, offset, cmd);
        }
        let mut a = [0u8];
        chip.read(0x10, &mut a);
        assert_eq!(a[0] & DQ5_TIMEOUT, DQ5_TIMEOUT);
        assert_eq!(chip.data()[0x10], 0xFF);

        write_cmd(&mut chip, 0, opcodes::RESET);
        chip.read(0x10, &mut a);
        assert_eq!(a[0], 0xFF);
    }

    #[test]
    fn test_non_cfi_device_ignores_query() {
        let mut chip = CfiChip::new(ChipConfig::sst(0xD4, 16), 1, 1, Endianness::Little);
        write_cmd(&mut chip, 0x55, opcodes::QUERY);
        let mut q = [0u8];
        chip.read(0x10, &mut q);
        assert_eq!(q[0], 0xFF);

        for (offset, cmd) in [(0x5555, 0xAA), (0x2AAA, 0x55), (0x5555, 0x90)] {
            write_cmd(&mut chip, offset, cmd);
        }
        chip.read(0, &mut q);
        assert_eq!(q[0], 0xBF);
        chip.read(1, &mut q);
        assert_eq!(q[0], 0xD4);
    }
}
