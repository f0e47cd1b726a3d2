//! Target configuration file
//!
//! Describes the flash bank and the emulated device behind it:
//!
//! ```toml
//! accelerate = true
//!
//! [bank]
//! base = "0x00000000"
//! chip_width = 2
//! bus_width = 2
//!
//! [device]
//! command_set = "intel"
//! endianness = "little"
//! regions = [{ blocks = 32, size = "0x2000" }]
//! image = "flash.bin"
//!
//! [ram]
//! base = "0x20000000"
//! size = "0x10000"
//!
//! [timeouts]
//! worst_case = false
//! poll_interval_us = 1000
//!
//! [quirk]
//! manufacturer = 0xBF
//! device = 0xD4
//! ```
//!
//! Every section is optional; missing values fall back to a 256 KiB x16
//! Intel/Sharp bank.

use cfiflash_core::cfi::{CommandSet, EraseRegion, IntelFeatures, TimeoutConfig};
use cfiflash_core::flash::BankConfig;
use cfiflash_core::hex;
use cfiflash_core::target::Endianness;
use cfiflash_dummy::{ChipConfig, DummyConfig};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Inconsistent device description
    #[error("Invalid device description: {0}")]
    Device(String),

    /// Rejected bank geometry
    #[error("Invalid bank configuration: {0}")]
    Bank(#[source] cfiflash_core::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum DeviceKind {
    Intel,
    Amd,
    Sst,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegionSection {
    blocks: u32,
    #[serde(deserialize_with = "hex::deserialize_u32")]
    size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BankSection {
    #[serde(deserialize_with = "hex::deserialize_u32")]
    base: u32,
    #[serde(deserialize_with = "hex::deserialize_opt_u32")]
    size: Option<u32>,
    chip_width: u8,
    bus_width: u8,
}

impl Default for BankSection {
    fn default() -> Self {
        Self {
            base: 0,
            size: None,
            chip_width: 2,
            bus_width: 2,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct DeviceSection {
    command_set: DeviceKind,
    endianness: Endianness,
    regions: Vec<RegionSection>,
    device_id: Option<u16>,
    individual_lock: bool,
    image: Option<PathBuf>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            command_set: DeviceKind::Intel,
            endianness: Endianness::Little,
            regions: vec![RegionSection {
                blocks: 32,
                size: 0x2000,
            }],
            device_id: None,
            individual_lock: true,
            image: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RamSection {
    #[serde(deserialize_with = "hex::deserialize_u32")]
    base: u32,
    #[serde(deserialize_with = "hex::deserialize_u32")]
    size: u32,
}

impl Default for RamSection {
    fn default() -> Self {
        Self {
            base: 0x2000_0000,
            size: 0x1_0000,
        }
    }
}

/// Manufacturer and device id of a part without a query table
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuirkIds {
    pub manufacturer: u8,
    pub device: u16,
}

/// Parsed configuration file
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Run block writes and erase checks on the target CPU
    pub accelerate: bool,
    bank: BankSection,
    device: DeviceSection,
    ram: RamSection,
    /// Status-poll bounds
    pub timeouts: TimeoutConfig,
    /// Ids to look up when the device has no query table
    pub quirk: Option<QuirkIds>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accelerate: true,
            bank: BankSection::default(),
            device: DeviceSection::default(),
            ram: RamSection::default(),
            timeouts: TimeoutConfig::default(),
            quirk: None,
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    fn chip(&self) -> Result<ChipConfig, ConfigError> {
        if self.device.regions.is_empty() {
            return Err(ConfigError::Device("no erase regions".into()));
        }
        let mut regions = Vec::with_capacity(self.device.regions.len());
        for r in &self.device.regions {
            if r.blocks == 0 || r.blocks > 0x1_0000 || r.size < 256 || r.size % 256 != 0 {
                return Err(ConfigError::Device(format!(
                    "region of {} blocks of 0x{:x} bytes can't be described",
                    r.blocks, r.size
                )));
            }
            regions.push(EraseRegion::new(r.blocks, r.size));
        }

        let mut chip = match self.device.command_set {
            DeviceKind::Intel => ChipConfig::intel(&regions),
            DeviceKind::Amd => ChipConfig::amd(&regions),
            DeviceKind::Sst => {
                let device = self.device.device_id.unwrap_or(0xD4);
                ChipConfig {
                    regions,
                    ..ChipConfig::sst(device, 1)
                }
            }
        };
        if let Some(id) = self.device.device_id {
            chip.device_id = id;
        }
        if chip.command_set == CommandSet::IntelSharp && !self.device.individual_lock {
            chip.features.remove(IntelFeatures::INDIVIDUAL_LOCK);
            chip.features.insert(IntelFeatures::SIMULTANEOUS_UNLOCK);
        }
        Ok(chip)
    }

    /// Emulated target description
    pub fn target(&self) -> Result<DummyConfig, ConfigError> {
        Ok(DummyConfig {
            endianness: self.device.endianness,
            flash_base: self.bank.base,
            chip_width: self.bank.chip_width,
            bus_width: self.bank.bus_width,
            chip: self.chip()?,
            ram_base: self.ram.base,
            ram_size: self.ram.size,
        })
    }

    /// Bank geometry, defaulting the size to the emulated device's
    pub fn bank(&self, target: &DummyConfig) -> Result<BankConfig, ConfigError> {
        let mut bank = target.bank_config();
        if let Some(size) = self.bank.size {
            bank.size = size;
        }
        bank.validate().map_err(ConfigError::Bank)?;
        Ok(bank)
    }

    /// Initial flash contents, if any
    pub fn image(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        match &self.device.image {
            None => Ok(None),
            Some(path) => fs::read(path).map(Some).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        let target = config.target().unwrap();
        let bank = config.bank(&target).unwrap();
        assert!(config.accelerate);
        assert_eq!(bank.size, 0x4_0000);
        assert_eq!(bank.bus_width, 2);
        assert_eq!(target.chip.command_set, CommandSet::IntelSharp);
    }

    #[test]
    fn test_amd_big_endian() {
        let config = Config::from_toml_str(
            r#"
            accelerate = false

            [bank]
            base = "0x10000000"
            chip_width = 1
            bus_width = 2

            [device]
            command_set = "amd"
            endianness = "big"
            regions = [{ blocks = 8, size = "0x2000" }, { blocks = 15, size = 0x10000 }]

            [timeouts]
            block_erase = 5000
            "#,
        )
        .unwrap();
        let target = config.target().unwrap();
        assert_eq!(target.flash_base, 0x1000_0000);
        assert_eq!(target.endianness, Endianness::Big);
        assert_eq!(target.chip.size(), 0x10_0000);
        assert_eq!(config.timeouts.block_erase, Some(5000));
        assert_eq!(config.timeouts.poll_interval_us, 1000);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            Config::from_toml_str("[bank]\nwidth = 2"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[ram]\nsize = \"0xZZ\""),
            Err(ConfigError::Parse(_))
        ));

        let config = Config::from_toml_str("[device]\nregions = [{ blocks = 4, size = 100 }]").unwrap();
        assert!(matches!(config.target(), Err(ConfigError::Device(_))));

        let config = Config::from_toml_str("[bank]\nchip_width = 4\nbus_width = 2").unwrap();
        let target = config.target().unwrap();
        assert!(matches!(config.bank(&target), Err(ConfigError::Bank(_))));
    }

    #[test]
    fn test_sst_quirk() {
        let config = Config::from_toml_str(
            r#"
            [bank]
            chip_width = 1
            bus_width = 1

            [device]
            command_set = "sst"
            device_id = 0xD5
            regions = [{ blocks = 32, size = 4096 }]

            [quirk]
            manufacturer = 0xBF
            device = 0xD5
            "#,
        )
        .unwrap();
        let target = config.target().unwrap();
        assert!(!target.chip.cfi);
        assert_eq!(target.chip.device_id, 0xD5);
        assert_eq!(config.quirk.map(|q| q.device), Some(0xD5));
    }
}
