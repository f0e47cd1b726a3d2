//! cfiflash-dummy - Emulated debug target for testing
//!
//! This crate provides a [`Target`] implementation backed by host memory: a
//! RAM region with a working-area allocator and a memory-mapped CFI NOR
//! bank that follows the Intel/Sharp or AMD/Fujitsu command protocol. The
//! emulated CPU can run the stock ARMv4 flash routines, so the accelerated
//! paths of the driver are exercised end to end without real hardware.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod chip;
mod runner;

pub use chip::{CfiChip, ChipConfig};

use alloc::vec;
use alloc::vec::Vec;
use cfiflash_core::cfi::EraseRegion;
use cfiflash_core::error::{Error, Result};
use cfiflash_core::flash::BankConfig;
use cfiflash_core::target::{Endianness, RegParam, Target, WorkingArea};

/// Configuration for the emulated target
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Byte order of the emulated CPU and bus
    pub endianness: Endianness,
    /// Address of the flash bank
    pub flash_base: u32,
    /// Width of one chip in bytes
    pub chip_width: u8,
    /// Width of the data bus in bytes
    pub bus_width: u8,
    /// The device behind the bank
    pub chip: ChipConfig,
    /// Address of the RAM handed out as working areas
    pub ram_base: u32,
    /// RAM size in bytes
    pub ram_size: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            endianness: Endianness::Little,
            flash_base: 0x0000_0000,
            chip_width: 2,
            bus_width: 2,
            chip: ChipConfig::intel(&[EraseRegion::new(32, 0x2000)]), // 256 KiB
            ram_base: 0x2000_0000,
            ram_size: 0x1_0000,
        }
    }
}

impl DummyConfig {
    /// Bank description matching the emulated device
    pub fn bank_config(&self) -> BankConfig {
        BankConfig::new(
            self.flash_base,
            self.chip.size() as u32,
            self.chip_width,
            self.bus_width,
        )
    }
}

enum Region {
    Flash(u32),
    Ram(usize),
}

/// Emulated debug target
pub struct DummyTarget {
    config: DummyConfig,
    chip: CfiChip,
    ram: Vec<u8>,
    areas: Vec<WorkingArea>,
    halted: bool,
    fail_allocations: bool,
    algorithm_runs: u32,
    elapsed_us: u64,
}

impl DummyTarget {
    /// Create a halted target with an erased bank
    pub fn new(config: DummyConfig) -> Self {
        let chip = CfiChip::new(
            config.chip.clone(),
            config.chip_width as u32,
            config.bus_width as u32,
            config.endianness,
        );
        Self {
            ram: vec![0; config.ram_size as usize],
            chip,
            config,
            areas: Vec::new(),
            halted: true,
            fail_allocations: false,
            algorithm_runs: 0,
            elapsed_us: 0,
        }
    }

    /// Create a target with the default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// The emulated flash bank
    pub fn chip(&self) -> &CfiChip {
        &self.chip
    }

    /// Mutable access to the emulated flash bank
    pub fn chip_mut(&mut self) -> &mut CfiChip {
        &mut self.chip
    }

    /// Flash array contents
    pub fn flash(&self) -> &[u8] {
        self.chip.data()
    }

    /// Halt or resume the emulated CPU
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Refuse every working-area allocation
    pub fn set_alloc_failure(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    /// Working areas currently allocated
    pub fn allocated(&self) -> &[WorkingArea] {
        &self.areas
    }

    /// Number of completed routine runs
    pub fn algorithm_runs(&self) -> u32 {
        self.algorithm_runs
    }

    /// Total time spent in `delay_us`
    pub fn elapsed_us(&self) -> u64 {
        self.elapsed_us
    }

    fn region(&self, address: u32, len: usize) -> Result<Region> {
        let start = address as u64;
        let end = start + len as u64;

        let flash = self.config.flash_base as u64;
        if start >= flash && end <= flash + self.chip.data().len() as u64 {
            return Ok(Region::Flash(address - self.config.flash_base));
        }
        let ram = self.config.ram_base as u64;
        if start >= ram && end <= ram + self.ram.len() as u64 {
            return Ok(Region::Ram((start - ram) as usize));
        }

        log::error!("access to unmapped memory 0x{:08x}+{}", address, len);
        Err(Error::TargetAccess)
    }
}

impl Target for DummyTarget {
    fn endianness(&self) -> Endianness {
        self.config.endianness
    }

    fn is_halted(&self) -> bool {
        self.halted
    }

    fn read_memory(&mut self, address: u32, size: u32, count: u32, buf: &mut [u8]) -> Result<()> {
        let len = (size * count) as usize;
        let buf = buf.get_mut(..len).ok_or(Error::TargetAccess)?;
        match self.region(address, len)? {
            Region::Flash(offset) => self.chip.read(offset, buf),
            Region::Ram(offset) => buf.copy_from_slice(&self.ram[offset..offset + len]),
        }
        Ok(())
    }

    fn write_memory(&mut self, address: u32, size: u32, count: u32, data: &[u8]) -> Result<()> {
        let len = (size * count) as usize;
        let data = data.get(..len).ok_or(Error::TargetAccess)?;
        match self.region(address, len)? {
            Region::Flash(offset) => self.chip.write(offset, data),
            Region::Ram(offset) => self.ram[offset..offset + len].copy_from_slice(data),
        }
        Ok(())
    }

    fn alloc_working_area(&mut self, size: u32) -> Result<WorkingArea> {
        if self.fail_allocations || size == 0 {
            return Err(Error::ResourceUnavailable);
        }
        let size = size.checked_add(3).ok_or(Error::ResourceUnavailable)? & !3;

        // first fit
        self.areas.sort_by_key(|a| a.address);
        let mut candidate = self.config.ram_base as u64;
        for area in &self.areas {
            if candidate + size as u64 <= area.address as u64 {
                break;
            }
            candidate = candidate.max(area.address as u64 + area.size as u64);
        }
        if candidate + size as u64 > self.config.ram_base as u64 + self.ram.len() as u64 {
            log::debug!("no working area of {} bytes", size);
            return Err(Error::ResourceUnavailable);
        }

        let area = WorkingArea {
            address: candidate as u32,
            size,
        };
        self.areas.push(area);
        Ok(area)
    }

    fn free_working_area(&mut self, area: WorkingArea) {
        let before = self.areas.len();
        self.areas.retain(|a| *a != area);
        if self.areas.len() == before {
            log::warn!("freeing unknown working area at 0x{:08x}", area.address);
        }
    }

    fn run_algorithm(
        &mut self,
        entry: u32,
        exit: u32,
        params: &mut [RegParam],
        timeout_ms: u32,
    ) -> Result<()> {
        self.execute(entry, exit, params, timeout_ms)
    }

    fn delay_us(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfiflash_core::algorithm::armv4;
    use cfiflash_core::cfi::{quirks, CfiFlash, CommandSet, TimeoutConfig};
    use cfiflash_core::flash::{EraseState, FlashDriver, FlashDriverExt, ProtectState};

    fn driver(config: DummyConfig) -> CfiFlash<DummyTarget> {
        let bank = config.bank_config();
        let mut flash = CfiFlash::new(DummyTarget::new(config), bank).unwrap();
        flash.probe().unwrap();
        flash
    }

    fn accelerated(config: DummyConfig) -> CfiFlash<DummyTarget> {
        let bank = config.bank_config();
        let mut flash = CfiFlash::new(DummyTarget::new(config), bank)
            .unwrap()
            .with_algorithms(&armv4::ALGORITHMS);
        flash.probe().unwrap();
        flash
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    fn amd_config() -> DummyConfig {
        DummyConfig {
            chip_width: 1,
            bus_width: 1,
            chip: ChipConfig::amd(&[EraseRegion::new(16, 0x1000)]),
            ..DummyConfig::default()
        }
    }

    #[test]
    fn test_probe_default_bank() {
        let flash = driver(DummyConfig::default());
        let identity = flash.identity().unwrap();
        assert_eq!(identity.command_set(), CommandSet::IntelSharp);
        assert!(identity.geometry_mismatch.is_none());
        assert_eq!(flash.bank().sector_count(), 32);
        assert_eq!(flash.bank().sectors()[31].offset, 31 * 0x2000);
        assert!(flash.info().contains("erase region[0]: 32 blocks of size 0x2000"));
    }

    #[test]
    fn test_erase_write_readback() {
        let mut flash = driver(DummyConfig::default());
        flash.target_mut().chip_mut().data_mut()[..0x4000].fill(0x00);

        flash.erase(0, 1).unwrap();
        assert!(flash.target().flash()[..0x4000].iter().all(|&b| b == 0xFF));
        assert_eq!(flash.erased_sector_count(), 2);

        let data = pattern(100);
        flash.write(&data, 0x10).unwrap();
        assert_eq!(&flash.target().flash()[0x10..0x74], &data[..]);

        let mut readback = vec![0u8; 100];
        flash.target_mut().read_buffer(0x10, &mut readback).unwrap();
        assert_eq!(readback, data);
    }

    #[test]
    fn test_accelerated_write_matches_word_writes() {
        let data = pattern(5000);
        let mut plain = driver(DummyConfig::default());
        let mut fast = accelerated(DummyConfig::default());

        plain.write(&data, 0x1003).unwrap();
        fast.write(&data, 0x1003).unwrap();

        assert_eq!(plain.target().flash(), fast.target().flash());
        assert_eq!(&fast.target().flash()[0x1003..0x1003 + 5000], &data[..]);
        assert_eq!(fast.target().flash()[0x1002], 0xFF);
        assert_eq!(fast.target().flash()[0x1003 + 5000], 0xFF);

        assert_eq!(plain.target().algorithm_runs(), 0);
        assert_eq!(fast.target().algorithm_runs(), 1);
        // the scalar path only handles the partial words at either end
        assert_eq!(fast.target().chip().programmed().len(), 2 + 4998 / 2);

        // routine stays resident, scratch buffer is gone
        assert_eq!(fast.resident_algorithms().count(), 1);
        assert_eq!(fast.target().allocated().len(), 1);
        fast.release_working_areas();
        assert!(fast.target().allocated().is_empty());
    }

    #[test]
    fn test_erase_then_erase_check_reports_erased() {
        let banks = [
            (driver(DummyConfig::default()), 0),
            (accelerated(DummyConfig::default()), 32),
        ];
        for (mut flash, check_runs) in banks {
            flash.write(&vec![0u8; 8 * 0x2000], 0).unwrap();
            flash.erase(2, 5).unwrap();

            let runs = flash.target().algorithm_runs();
            flash.erase_check().unwrap();
            assert_eq!(flash.target().algorithm_runs() - runs, check_runs);

            let states: Vec<EraseState> =
                flash.bank().sectors().iter().map(|s| s.erase_state).collect();
            assert!(states[2..=5].iter().all(|&s| s == EraseState::Erased));
            assert!(states[..2]
                .iter()
                .chain(&states[6..8])
                .all(|&s| s == EraseState::NotErased));
            assert_eq!(flash.erased_sector_count(), 28);
        }
    }

    #[test]
    fn test_bank_at_top_of_address_space() {
        let config = DummyConfig {
            flash_base: 0xFFFF_0000,
            chip: ChipConfig::intel(&[EraseRegion::new(8, 0x2000)]),
            ..DummyConfig::default()
        };

        let mut flash = driver(config.clone());
        flash.write(&[0x12], 0xFFFF).unwrap();
        assert_eq!(&flash.target().flash()[0xFFFE..], &[0xFF, 0x12]);

        flash.erase(7, 7).unwrap();
        flash.write(&[0x12, 0x34], 0xFFFE).unwrap();
        assert_eq!(&flash.target().flash()[0xFFFE..], &[0x12, 0x34]);

        let mut fast = accelerated(config);
        let data = pattern(0x100);
        fast.write(&data, 0xFF00).unwrap();
        assert_eq!(fast.target().algorithm_runs(), 1);
        assert_eq!(&fast.target().flash()[0xFF00..], &data[..]);
    }

    #[test]
    fn test_small_ram_splits_into_chunks() {
        let config = DummyConfig {
            ram_size: 0x1000,
            ..DummyConfig::default()
        };
        let data = pattern(5000);
        let mut flash = accelerated(config);
        flash.write(&data, 0x4000).unwrap();

        // 52 bytes of code leave room for a 2 KiB buffer
        assert_eq!(flash.target().algorithm_runs(), 3);
        assert_eq!(&flash.target().flash()[0x4000..0x4000 + 5000], &data[..]);
    }

    #[test]
    fn test_tiny_ram_falls_back_to_word_writes() {
        let config = DummyConfig {
            ram_size: 0x200,
            ..DummyConfig::default()
        };
        let data = pattern(64);
        let mut flash = accelerated(config);
        flash.write(&data, 0x100).unwrap();

        assert_eq!(flash.target().algorithm_runs(), 0);
        assert_eq!(flash.resident_algorithms().count(), 0);
        assert!(flash.target().allocated().is_empty());
        assert_eq!(&flash.target().flash()[0x100..0x140], &data[..]);
    }

    #[test]
    fn test_no_working_area_falls_back() {
        let mut flash = accelerated(DummyConfig::default());
        flash.target_mut().set_alloc_failure(true);
        flash.write(&pattern(16), 0).unwrap();
        assert_eq!(flash.target().algorithm_runs(), 0);
        assert_eq!(&flash.target().flash()[..16], &pattern(16)[..]);
    }

    #[test]
    fn test_block_write_reports_device_error() {
        let mut flash = accelerated(DummyConfig::default());
        flash.target_mut().chip_mut().inject_failure();
        assert_eq!(flash.write(&pattern(32), 0), Err(Error::OperationFailed));
        assert!(flash.target().flash()[..32].iter().all(|&b| b == 0xFF));

        // the device is usable again afterwards
        flash.write(&pattern(32), 0).unwrap();
        assert_eq!(&flash.target().flash()[..32], &pattern(32)[..]);
    }

    #[test]
    fn test_word_write_timeout() {
        let config = DummyConfig::default();
        let bank = config.bank_config();
        let timeouts = TimeoutConfig {
            word_write: Some(5),
            ..TimeoutConfig::default()
        };
        let mut flash = CfiFlash::new(DummyTarget::new(config), bank)
            .unwrap()
            .with_timeouts(timeouts);
        flash.probe().unwrap();

        flash.target_mut().chip_mut().set_stuck(true);
        assert_eq!(flash.write(&[0x12, 0x34], 0), Err(Error::Timeout));
        assert_eq!(flash.target().elapsed_us(), 5 * 1000);
    }

    #[test]
    fn test_busy_status_is_polled() {
        let mut flash = driver(DummyConfig::default());
        flash.target_mut().chip_mut().set_busy_reads(3);
        flash.erase(4, 4).unwrap();
        assert_eq!(flash.target().elapsed_us(), 3 * 1000);
    }

    #[test]
    fn test_erase_check_on_target_and_host() {
        let mut flash = accelerated(DummyConfig::default());
        flash.target_mut().chip_mut().data_mut()[5 * 0x2000 + 0x1FFF] = 0xFE;

        flash.erase_check().unwrap();
        assert_eq!(flash.target().algorithm_runs(), 32);
        let states: Vec<EraseState> = flash.bank().sectors().iter().map(|s| s.erase_state).collect();
        assert_eq!(states[5], EraseState::NotErased);
        assert_eq!(states.iter().filter(|&&s| s == EraseState::Erased).count(), 31);

        flash.target_mut().set_halted(false);
        flash.target_mut().chip_mut().data_mut()[0] = 0x00;
        flash.erase_check().unwrap();
        assert_eq!(flash.target().algorithm_runs(), 32);
        assert_eq!(flash.bank().sectors()[0].erase_state, EraseState::NotErased);
        assert_eq!(flash.bank().sectors()[5].erase_state, EraseState::NotErased);
        assert_eq!(flash.erased_sector_count(), 30);

        let target = flash.into_target();
        assert!(target.allocated().is_empty());
    }

    #[test]
    fn test_intel_protect_blocks_erase() {
        let mut flash = driver(DummyConfig::default());
        flash.protect(true, 2, 2).unwrap();
        assert!(flash.target().chip().is_locked(2));

        flash.protect_check().unwrap();
        let states: Vec<ProtectState> =
            flash.bank().sectors().iter().map(|s| s.protect_state).collect();
        assert_eq!(states[2], ProtectState::Protected);
        assert_eq!(states[1], ProtectState::Unprotected);
        assert_eq!(states[3], ProtectState::Unprotected);

        assert_eq!(flash.erase(0, 3), Err(Error::OperationFailed));
        assert_eq!(flash.bank().sectors()[0].erase_state, EraseState::Erased);
        assert_eq!(flash.bank().sectors()[1].erase_state, EraseState::Erased);
        assert_eq!(flash.bank().sectors()[3].erase_state, EraseState::Unknown);

        flash.protect(false, 2, 2).unwrap();
        assert!(!flash.target().chip().is_locked(2));
        flash.erase(2, 3).unwrap();
    }

    #[test]
    fn test_amd_erase_write_and_protect_check() {
        let mut flash = accelerated(amd_config());
        assert_eq!(
            flash.identity().unwrap().command_set(),
            CommandSet::AmdFujitsu
        );
        flash.target_mut().chip_mut().set_busy_reads(3);
        flash.target_mut().chip_mut().data_mut()[0x3000..0x4000].fill(0);

        flash.erase(3, 3).unwrap();
        assert!(flash.target().flash()[0x3000..0x4000].iter().all(|&b| b == 0xFF));

        let data = pattern(40);
        flash.write(&data, 0x3005).unwrap();
        assert_eq!(&flash.target().flash()[0x3005..0x3005 + 40], &data[..]);
        // no accelerator for this command set
        assert_eq!(flash.target().algorithm_runs(), 0);

        assert_eq!(flash.protect(true, 0, 0), Err(Error::OperationFailed));

        flash.target_mut().chip_mut().set_locked(7, true);
        flash.protect_check().unwrap();
        assert_eq!(flash.bank().sectors()[7].protect_state, ProtectState::Protected);
        assert_eq!(flash.bank().sectors()[6].protect_state, ProtectState::Unprotected);
    }

    #[test]
    fn test_amd_device_error() {
        let mut flash = driver(amd_config());
        flash.target_mut().chip_mut().inject_failure();
        assert_eq!(flash.erase(0, 1), Err(Error::OperationFailed));
        assert_eq!(flash.bank().sectors()[0].erase_state, EraseState::Unknown);

        flash.erase(0, 1).unwrap();
        assert_eq!(flash.erased_sector_count(), 2);
    }

    #[test]
    fn test_big_endian_two_chip_bus() {
        let config = DummyConfig {
            endianness: Endianness::Big,
            chip_width: 1,
            bus_width: 2,
            chip: ChipConfig::intel(&[EraseRegion::new(16, 0x1000)]),
            ..DummyConfig::default()
        };
        let mut flash = accelerated(config);
        assert_eq!(flash.bank().sector_count(), 16);

        let data = pattern(7);
        flash.write(&data, 1).unwrap();
        assert_eq!(flash.target().flash()[0], 0xFF);
        assert_eq!(&flash.target().flash()[1..8], &data[..]);
        assert_eq!(flash.target().flash()[8], 0xFF);
        assert_eq!(flash.target().algorithm_runs(), 1);

        // 0x98 went to both chips
        assert_eq!(flash.target().chip().commands()[0], (0xAA, 0x98));
    }

    #[test]
    fn test_non_cfi_device_through_quirks() {
        let config = DummyConfig {
            chip_width: 1,
            bus_width: 1,
            chip: ChipConfig::sst(0xD4, 16),
            ..DummyConfig::default()
        };
        let bank = config.bank_config();
        let mut flash = CfiFlash::new(DummyTarget::new(config), bank).unwrap();
        assert_eq!(flash.probe(), Err(Error::NotCfiCompliant));

        flash.identify_quirk(quirks::MFR_SST, 0xD4).unwrap();
        assert!(flash.identity().unwrap().geometry_mismatch.is_none());
        flash.target_mut().chip_mut().data_mut()[0x1000] = 0;
        flash.erase(1, 1).unwrap();
        flash.write(&[0xA5, 0x5A], 0x1000).unwrap();
        assert_eq!(&flash.target().flash()[0x1000..0x1002], &[0xA5, 0x5A]);
    }

    #[test]
    fn test_unmapped_access() {
        let mut target = DummyTarget::new_default();
        let mut buf = [0u8; 4];
        assert_eq!(
            target.read_memory(0x1000_0000, 4, 1, &mut buf),
            Err(Error::TargetAccess)
        );
    }

    #[test]
    fn test_working_area_allocator() {
        let mut target = DummyTarget::new_default();
        let a = target.alloc_working_area(10).unwrap();
        let b = target.alloc_working_area(0x100).unwrap();
        assert_eq!(a, WorkingArea { address: 0x2000_0000, size: 12 });
        assert_eq!(b.address, 0x2000_000C);
        assert_eq!(
            target.alloc_working_area(0x1_0000),
            Err(Error::ResourceUnavailable)
        );

        target.free_working_area(a);
        let c = target.alloc_working_area(8).unwrap();
        assert_eq!(c.address, 0x2000_0000);
    }
}
