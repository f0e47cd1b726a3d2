//! Target-resident flash routines
//!
//! Programming a flash word through the debug transport costs a command
//! sequence plus a status poll, each a full round trip. The routines in this
//! module run on the target CPU instead: the host downloads one of them into
//! a working area, fills a scratch buffer, and lets the target poll its own
//! flash bus until the whole buffer is done.
//!
//! # Calling convention
//!
//! Block write (one routine per bus width):
//!
//! | Register | Direction | Meaning |
//! |----------|-----------|---------|
//! | `r0` | in  | source address in the scratch buffer |
//! | `r1` | in  | flash destination address |
//! | `r2` | in  | number of bus words to program |
//! | `r3` | in  | program-setup command pattern (`0x40` per chip lane) |
//! | `r4` | out | last status word read from the flash |
//!
//! The routine stops at its exit instruction after the last word or as soon
//! as a status word shows any error bit. The host compares `r4` with the
//! ready pattern (`0x80` per chip lane).
//!
//! Erase check:
//!
//! | Register | Direction | Meaning |
//! |----------|-----------|---------|
//! | `r0` | in     | start address |
//! | `r1` | in     | byte count |
//! | `r2` | in/out | AND accumulator, seeded with `0xFF` |
//!
//! A sector is erased when `r2` still reads `0xFF` at the exit point.
//!
//! Other architectures plug in by supplying their own [`AlgorithmSet`].

pub mod armv4;

use crate::target::Endianness;
use alloc::vec::Vec;

/// One downloadable routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Algorithm {
    /// Short name for logs
    pub name: &'static str,
    /// Instruction words
    pub code: &'static [u32],
    /// Byte offset of the instruction the routine halts on
    pub exit_offset: u32,
}

impl Algorithm {
    /// Size of the routine in bytes
    pub fn size(&self) -> u32 {
        (self.code.len() * 4) as u32
    }

    /// Instruction stream in target byte order
    pub fn code_bytes(&self, endianness: Endianness) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.code.len() * 4);
        for word in self.code {
            match endianness {
                Endianness::Little => bytes.extend_from_slice(&word.to_le_bytes()),
                Endianness::Big => bytes.extend_from_slice(&word.to_be_bytes()),
            }
        }
        bytes
    }
}

/// The routines one CPU architecture provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlgorithmSet {
    /// Architecture name for logs
    pub arch: &'static str,
    /// Block write for an 8-bit bus
    pub write_8: Algorithm,
    /// Block write for a 16-bit bus
    pub write_16: Algorithm,
    /// Block write for a 32-bit bus
    pub write_32: Algorithm,
    /// AND-reduction over a byte range
    pub erase_check: Algorithm,
}

impl AlgorithmSet {
    /// Block write routine for the given bus width in bytes
    pub fn write_for_bus_width(&self, bus_width: u32) -> Option<&Algorithm> {
        match bus_width {
            1 => Some(&self.write_8),
            2 => Some(&self.write_16),
            4 => Some(&self.write_32),
            _ => None,
        }
    }
}
