//! Flash bank and sector geometry

use crate::error::{Error, Result};
use alloc::vec::Vec;

/// Erase status of a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EraseState {
    /// Not checked since the sector list was built
    #[default]
    Unknown,
    /// Every byte reads back as 0xFF
    Erased,
    /// At least one programmed bit
    NotErased,
}

/// Protection status of a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtectState {
    /// Not checked since the sector list was built
    #[default]
    Unknown,
    /// Lock bit set
    Protected,
    /// Lock bit clear
    Unprotected,
}

/// One erase sector of a bank
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sector {
    /// Offset relative to the bank base
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
    /// Last known erase status
    pub erase_state: EraseState,
    /// Last known protection status
    pub protect_state: ProtectState,
}

impl Sector {
    /// Create a sector with unknown erase and protect status
    pub const fn new(offset: u32, size: u32) -> Self {
        Self {
            offset,
            size,
            erase_state: EraseState::Unknown,
            protect_state: ProtectState::Unknown,
        }
    }

    /// Offset one past the last byte of the sector
    pub const fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// Static description of a flash bank, as given by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BankConfig {
    /// Base address in the target's address space
    #[cfg_attr(feature = "serde", serde(deserialize_with = "crate::hex::deserialize_u32"))]
    pub base: u32,
    /// Total size in bytes
    #[cfg_attr(feature = "serde", serde(deserialize_with = "crate::hex::deserialize_u32"))]
    pub size: u32,
    /// Data width of one chip in bytes (1, 2 or 4)
    pub chip_width: u8,
    /// Data width of the whole bus in bytes (1, 2 or 4)
    pub bus_width: u8,
}

impl BankConfig {
    /// Create a bank description
    pub const fn new(base: u32, size: u32, chip_width: u8, bus_width: u8) -> Self {
        Self {
            base,
            size,
            chip_width,
            bus_width,
        }
    }

    /// Check widths and size for consistency
    pub fn validate(&self) -> Result<()> {
        let valid_width = |w: u8| matches!(w, 1 | 2 | 4);
        if !valid_width(self.chip_width) || !valid_width(self.bus_width) {
            return Err(Error::InvalidBankConfig);
        }
        if self.chip_width > self.bus_width || self.bus_width % self.chip_width != 0 {
            return Err(Error::InvalidBankConfig);
        }
        if self.size == 0 || self.base.checked_add(self.size - 1).is_none() {
            return Err(Error::InvalidBankConfig);
        }
        Ok(())
    }
}

/// A flash bank: configuration plus the sector list found by probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashBank {
    config: BankConfig,
    sectors: Vec<Sector>,
}

impl FlashBank {
    /// Create a bank with an empty sector list
    pub fn new(config: BankConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sectors: Vec::new(),
        })
    }

    /// The configuration this bank was built from
    pub fn config(&self) -> &BankConfig {
        &self.config
    }

    /// Base address
    pub fn base(&self) -> u32 {
        self.config.base
    }

    /// Total size in bytes
    pub fn size(&self) -> u32 {
        self.config.size
    }

    /// Bus width in bytes
    pub fn bus_width(&self) -> u32 {
        self.config.bus_width as u32
    }

    /// Chip width in bytes
    pub fn chip_width(&self) -> u32 {
        self.config.chip_width as u32
    }

    /// Number of chips sharing the bus
    pub fn chip_count(&self) -> u32 {
        self.bus_width() / self.chip_width()
    }

    /// Sector list in ascending offset order
    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Mutable access to a single sector
    pub fn sector_mut(&mut self, index: usize) -> Option<&mut Sector> {
        self.sectors.get_mut(index)
    }

    /// Number of sectors
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Replace the whole sector list
    pub fn set_sectors(&mut self, sectors: Vec<Sector>) {
        self.sectors = sectors;
    }

    /// Sum of all sector sizes
    pub fn sectors_total_size(&self) -> u64 {
        self.sectors.iter().map(|s| s.size as u64).sum()
    }

    /// Validate an inclusive sector range
    pub fn check_range(&self, first: usize, last: usize) -> Result<()> {
        if first > last || last >= self.sectors.len() {
            return Err(Error::InvalidSectorRange);
        }
        Ok(())
    }

    /// Index of the sector containing the given bank offset
    pub fn sector_at(&self, offset: u32) -> Option<usize> {
        self.sectors
            .iter()
            .position(|s| offset >= s.offset && offset < s.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_config_validation() {
        assert!(BankConfig::new(0, 0x10000, 2, 2).validate().is_ok());
        assert!(BankConfig::new(0, 0x10000, 1, 4).validate().is_ok());
        assert!(BankConfig::new(0, 0x10000, 2, 4).validate().is_ok());
        assert_eq!(
            BankConfig::new(0, 0x10000, 4, 2).validate(),
            Err(Error::InvalidBankConfig)
        );
        assert_eq!(
            BankConfig::new(0, 0x10000, 3, 3).validate(),
            Err(Error::InvalidBankConfig)
        );
        assert_eq!(
            BankConfig::new(0, 0, 1, 1).validate(),
            Err(Error::InvalidBankConfig)
        );
        assert_eq!(
            BankConfig::new(0xFFFF_0000, 0x20000, 1, 1).validate(),
            Err(Error::InvalidBankConfig)
        );
    }

    #[test]
    fn test_check_range() {
        let mut bank = FlashBank::new(BankConfig::new(0, 0x4000, 1, 1)).unwrap();
        assert_eq!(bank.check_range(0, 0), Err(Error::InvalidSectorRange));

        bank.set_sectors(vec![
            Sector::new(0, 0x1000),
            Sector::new(0x1000, 0x1000),
            Sector::new(0x2000, 0x2000),
        ]);
        assert!(bank.check_range(0, 2).is_ok());
        assert!(bank.check_range(1, 1).is_ok());
        assert_eq!(bank.check_range(2, 1), Err(Error::InvalidSectorRange));
        assert_eq!(bank.check_range(0, 3), Err(Error::InvalidSectorRange));
        assert_eq!(bank.sectors_total_size(), 0x4000);
        assert_eq!(bank.sector_at(0x2fff), Some(2));
        assert_eq!(bank.sector_at(0x4000), None);
    }
}
