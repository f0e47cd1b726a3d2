//! Command sequencer
//!
//! CFI commands are single bytes, but a bank's data bus may be made of
//! several chips side by side. A command must reach every chip, so the byte
//! is replicated into the low-order byte of each chip lane. Addresses are
//! chip-relative word offsets and are scaled by the bus width.
//!
//! Bus words are kept numerically in [`BusWord`]: chip `n` owns bits
//! `8 * chip_width * n` upwards, and the value is converted to target byte
//! order only at the memory accessor boundary.

use crate::error::Result;
use crate::flash::FlashBank;
use crate::target::{Endianness, Target};
use maybe_async::maybe_async;

/// Command opcodes
pub mod opcodes {
    /// Enter CFI query mode (at offset 0x55)
    pub const QUERY: u8 = 0x98;
    /// Return to read-array mode (Intel/Sharp)
    pub const READ_ARRAY: u8 = 0xFF;
    /// Reset to read-array mode (AMD/Fujitsu)
    pub const RESET: u8 = 0xF0;
    /// Clear the status register
    pub const CLEAR_STATUS: u8 = 0x50;
    /// Read status register
    pub const READ_STATUS: u8 = 0x70;
    /// Block erase setup
    pub const ERASE_SETUP: u8 = 0x20;
    /// Erase confirm / lock clear
    pub const CONFIRM: u8 = 0xD0;
    /// Word program setup
    pub const PROGRAM_SETUP: u8 = 0x40;
    /// Lock-bit setup
    pub const LOCK_SETUP: u8 = 0x60;
    /// Set lock bit (after lock setup)
    pub const LOCK_SET: u8 = 0x01;
    /// Clear lock bit(s) (after lock setup)
    pub const LOCK_CLEAR: u8 = 0xD0;
    /// Read identifier / autoselect
    pub const READ_IDENTIFIER: u8 = 0x90;

    /// AMD first unlock cycle data
    pub const AMD_UNLOCK1: u8 = 0xAA;
    /// AMD second unlock cycle data
    pub const AMD_UNLOCK2: u8 = 0x55;
    /// AMD erase setup
    pub const AMD_ERASE_SETUP: u8 = 0x80;
    /// AMD sector erase confirm
    pub const AMD_SECTOR_ERASE: u8 = 0x30;
    /// AMD word program
    pub const AMD_PROGRAM: u8 = 0xA0;
}

/// Chip-relative offset the query and identifier commands are written to
pub const QUERY_OFFSET: u32 = 0x55;

/// Byte offset of the block status inside a block in identifier mode
pub const BLOCK_STATUS_OFFSET: u32 = 0x02;

/// One bus-width data word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusWord {
    value: u32,
    width: u32,
}

impl BusWord {
    /// Zero word of `width` bytes
    pub const fn new(width: u32) -> Self {
        Self { value: 0, width }
    }

    /// Word with a known numeric value
    pub fn from_value(value: u32, width: u32) -> Self {
        Self {
            value: value & Self::mask(width),
            width,
        }
    }

    /// Replicate `cmd` into the low byte of every chip lane
    pub fn command(cmd: u8, chip_width: u32, bus_width: u32) -> Self {
        let mut value = 0u32;
        let mut shift = 0;
        while shift < bus_width * 8 {
            value |= (cmd as u32) << shift;
            shift += chip_width * 8;
        }
        Self::from_value(value, bus_width)
    }

    /// Decode a word from target memory order
    pub fn from_bytes(bytes: &[u8], endianness: Endianness) -> Self {
        let width = bytes.len() as u32;
        let value = match endianness {
            Endianness::Little => bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32),
            Endianness::Big => bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32),
        };
        Self::from_value(value, width)
    }

    /// Numeric value
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Width in bytes
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Encode into target memory order; only the first `width` bytes are used
    pub fn to_bytes(&self, endianness: Endianness) -> [u8; 4] {
        let mut out = [0u8; 4];
        let w = self.width as usize;
        match endianness {
            Endianness::Little => out[..w].copy_from_slice(&self.value.to_le_bytes()[..w]),
            Endianness::Big => out[..w].copy_from_slice(&self.value.to_be_bytes()[4 - w..]),
        }
        out
    }

    /// Append the next byte in address order
    ///
    /// After `width` pushes the word holds the pushed bytes exactly as they
    /// would sit in memory. Little-endian shifts the value down and enters
    /// the byte at the top lane; big-endian shifts up and enters it at the
    /// bottom lane.
    pub fn push_byte(&mut self, byte: u8, endianness: Endianness) {
        let top = 8 * (self.width - 1);
        self.value = match endianness {
            Endianness::Little => (self.value >> 8) | ((byte as u32) << top),
            Endianness::Big => ((self.value << 8) | byte as u32) & Self::mask(self.width),
        };
    }

    /// Low byte of chip `chip`'s lane
    pub fn lane_byte(&self, chip: u32, chip_width: u32) -> u8 {
        (self.value >> (8 * chip_width * chip)) as u8
    }

    /// OR of the low byte of every chip lane
    pub fn or_lanes(&self, chip_width: u32) -> u8 {
        (0..self.width / chip_width).fold(0u8, |acc, chip| acc | self.lane_byte(chip, chip_width))
    }

    fn mask(width: u32) -> u32 {
        if width >= 4 {
            u32::MAX
        } else {
            (1u32 << (8 * width)) - 1
        }
    }
}

/// Target address of a chip-relative word offset inside a sector
pub fn flash_address(bank: &FlashBank, sector_offset: u32, offset: u32) -> u32 {
    bank.base()
        .wrapping_add(sector_offset)
        .wrapping_add(offset.wrapping_mul(bank.bus_width()))
}

/// Address of a sector's first word, or the bank base without sectors
pub fn sector_address(bank: &FlashBank, sector: usize) -> u32 {
    let offset = bank.sectors().get(sector).map(|s| s.offset).unwrap_or(0);
    flash_address(bank, offset, 0)
}

/// Write one bus word
#[maybe_async]
pub async fn write_word<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    word: &BusWord,
    address: u32,
) -> Result<()> {
    let bytes = word.to_bytes(target.endianness());
    let width = bank.bus_width();
    target
        .write_memory(address, width, 1, &bytes[..width as usize])
        .await
}

/// Read one bus word
#[maybe_async]
pub async fn read_word<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    address: u32,
) -> Result<BusWord> {
    let width = bank.bus_width();
    let mut bytes = [0u8; 4];
    target
        .read_memory(address, width, 1, &mut bytes[..width as usize])
        .await?;
    Ok(BusWord::from_bytes(
        &bytes[..width as usize],
        target.endianness(),
    ))
}

/// Issue a command byte to every chip at `address`
#[maybe_async]
pub async fn send<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    cmd: u8,
    address: u32,
) -> Result<()> {
    let word = BusWord::command(cmd, bank.chip_width(), bank.bus_width());
    write_word(target, bank, &word, address).await
}

/// Issue a command at a chip-relative offset from the bank base
#[maybe_async]
pub async fn send_at<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    cmd: u8,
    offset: u32,
) -> Result<()> {
    send(target, bank, cmd, flash_address(bank, 0, offset)).await
}

/// Read chip 0's byte at a word offset
///
/// All chips of a bank are assumed identical, so query data only comes from
/// the first one.
#[maybe_async]
pub async fn query_u8<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    sector_offset: u32,
    offset: u32,
) -> Result<u8> {
    let word = read_word(target, bank, flash_address(bank, sector_offset, offset)).await?;
    Ok(word.lane_byte(0, bank.chip_width()))
}

/// Read a little-endian u16 spread over two query offsets
#[maybe_async]
pub async fn query_u16<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    sector_offset: u32,
    offset: u32,
) -> Result<u16> {
    let lo = query_u8(target, bank, sector_offset, offset).await?;
    let hi = query_u8(target, bank, sector_offset, offset + 1).await?;
    Ok(u16::from_le_bytes([lo, hi]))
}

/// Read a little-endian u32 spread over four query offsets
#[maybe_async]
pub async fn query_u32<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    sector_offset: u32,
    offset: u32,
) -> Result<u32> {
    let mut bytes = [0u8; 4];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = query_u8(target, bank, sector_offset, offset + i as u32).await?;
    }
    Ok(u32::from_le_bytes(bytes))
}

/// Read a byte at a word offset, ORed across all chips
#[maybe_async]
pub async fn get_u8<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    sector_offset: u32,
    offset: u32,
) -> Result<u8> {
    let word = read_word(target, bank, flash_address(bank, sector_offset, offset)).await?;
    Ok(word.or_lanes(bank.chip_width()))
}

/// Return every chip to read-array mode (`0xF0` then `0xFF`)
#[maybe_async]
pub async fn read_array<T: Target + ?Sized>(target: &mut T, bank: &FlashBank) -> Result<()> {
    send_at(target, bank, opcodes::RESET, 0).await?;
    send_at(target, bank, opcodes::READ_ARRAY, 0).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_replication() {
        assert_eq!(BusWord::command(0x98, 1, 1).value(), 0x98);
        assert_eq!(BusWord::command(0x98, 2, 2).value(), 0x0098);
        assert_eq!(BusWord::command(0x98, 1, 2).value(), 0x9898);
        assert_eq!(BusWord::command(0x98, 2, 4).value(), 0x0098_0098);
        assert_eq!(BusWord::command(0x98, 1, 4).value(), 0x9898_9898);
        assert_eq!(BusWord::command(0x40, 4, 4).value(), 0x0000_0040);
    }

    #[test]
    fn test_command_byte_order() {
        // two x16 chips on a 32-bit bus: each lane's low byte gets the command
        let word = BusWord::command(0x50, 2, 4);
        assert_eq!(
            &word.to_bytes(Endianness::Little)[..4],
            &[0x50, 0x00, 0x50, 0x00]
        );
        assert_eq!(
            &word.to_bytes(Endianness::Big)[..4],
            &[0x00, 0x50, 0x00, 0x50]
        );

        let single = BusWord::command(0xFF, 2, 2);
        assert_eq!(&single.to_bytes(Endianness::Big)[..2], &[0x00, 0xFF]);
    }

    #[test]
    fn test_push_byte_preserves_memory_order() {
        for endian in [Endianness::Little, Endianness::Big] {
            let mut word = BusWord::new(4);
            for b in [0x11, 0x22, 0x33, 0x44] {
                word.push_byte(b, endian);
            }
            assert_eq!(&word.to_bytes(endian)[..4], &[0x11, 0x22, 0x33, 0x44]);
        }

        let mut le = BusWord::new(2);
        le.push_byte(0xAB, Endianness::Little);
        assert_eq!(le.value(), 0xAB00);
        let mut be = BusWord::new(2);
        be.push_byte(0xAB, Endianness::Big);
        assert_eq!(be.value(), 0x00AB);
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let le = BusWord::from_bytes(&[0x80, 0x00, 0x90, 0x00], Endianness::Little);
        assert_eq!(le.value(), 0x0090_0080);
        assert_eq!(le.lane_byte(0, 2), 0x80);
        assert_eq!(le.lane_byte(1, 2), 0x90);
        assert_eq!(le.or_lanes(2), 0x90);

        let be = BusWord::from_bytes(&[0x00, 0x90, 0x00, 0x80], Endianness::Big);
        assert_eq!(be.value(), 0x0090_0080);
        assert_eq!(be.lane_byte(0, 2), 0x80);
    }
}
