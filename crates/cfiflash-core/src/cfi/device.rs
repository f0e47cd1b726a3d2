//! CFI flash driver
//!
//! [`CfiFlash`] owns the target accessor and the bank, and implements
//! [`FlashDriver`] by dispatching on the command set found at probe time.

use super::accelerator;
use super::amd;
use super::command::{self, opcodes, BusWord};
use super::intel::{self, Poll};
use super::parser;
use super::quirks;
use super::timeout::{TimeoutConfig, LOCK_POLL_ITERATIONS};
use super::types::{CfiIdentity, PrimaryExtension, TimedOperation, TimeoutExponents};
use crate::algorithm::{Algorithm, AlgorithmSet};
use crate::error::{Error, Result};
use crate::flash::{BankConfig, FlashBank, FlashDriver};
use crate::target::{Target, WorkingArea};
use alloc::format;
use alloc::string::String;
use maybe_async::maybe_async;

/// Driver for a memory-mapped CFI NOR bank
///
/// Block writes and erase checks run on the target when an
/// [`AlgorithmSet`] for its CPU is attached with
/// [`with_algorithms`](Self::with_algorithms); otherwise every word goes
/// through the debug transport.
///
/// The routines stay resident in target RAM between calls. Call
/// [`release_working_areas`](Self::release_working_areas) (or
/// [`into_target`](Self::into_target)) to give that RAM back.
///
/// # Example
///
/// ```ignore
/// use cfiflash_core::algorithm::armv4;
/// use cfiflash_core::cfi::CfiFlash;
/// use cfiflash_core::flash::{BankConfig, FlashDriver};
///
/// let mut flash = CfiFlash::new(target, BankConfig::new(0, 0x20_0000, 2, 2))?
///     .with_algorithms(&armv4::ALGORITHMS);
/// flash.probe()?;
/// flash.erase(0, 3)?;
/// flash.write(&image, 0)?;
/// let target = flash.into_target();
/// ```
pub struct CfiFlash<T: Target> {
    target: T,
    bank: FlashBank,
    identity: Option<CfiIdentity>,
    timeouts: TimeoutConfig,
    algorithms: Option<&'static AlgorithmSet>,
    write_algorithm: Option<WorkingArea>,
    erase_check_algorithm: Option<WorkingArea>,
}

impl<T: Target> CfiFlash<T> {
    /// Create a driver for an unprobed bank
    pub fn new(target: T, config: BankConfig) -> Result<Self> {
        Ok(Self {
            target,
            bank: FlashBank::new(config)?,
            identity: None,
            timeouts: TimeoutConfig::default(),
            algorithms: None,
            write_algorithm: None,
            erase_check_algorithm: None,
        })
    }

    /// Attach target-side routines for the target's CPU
    pub fn with_algorithms(mut self, algorithms: &'static AlgorithmSet) -> Self {
        self.algorithms = Some(algorithms);
        self
    }

    /// Override the status-poll bounds
    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Identification result, once probed
    pub fn identity(&self) -> Option<&CfiIdentity> {
        self.identity.as_ref()
    }

    /// Status-poll bounds in use
    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// The target accessor
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Mutable access to the target accessor
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Working areas currently holding a routine
    pub fn resident_algorithms(&self) -> impl Iterator<Item = &WorkingArea> {
        self.write_algorithm
            .iter()
            .chain(self.erase_check_algorithm.iter())
    }

    /// Identify a non-CFI device from its manufacturer and device ids
    ///
    /// The ids come from the caller; the identity is taken from the quirks
    /// table and the sector list rebuilt from it.
    pub fn identify_quirk(&mut self, manufacturer: u8, device: u16) -> Result<()> {
        let mut identity = quirks::apply_quirk(manufacturer, device)?;
        identity.check_geometry(self.bank.size());
        if let Some(mismatch) = &identity.geometry_mismatch {
            log::warn!("{}", mismatch);
        }
        log::info!(
            "using quirk entry for non-CFI device 0x{:02x}/0x{:04x}",
            manufacturer,
            device
        );
        self.install(identity);
        Ok(())
    }

    /// Free the resident routines
    #[maybe_async]
    pub async fn release_working_areas(&mut self) {
        if let Some(area) = self.write_algorithm.take() {
            self.target.free_working_area(area).await;
        }
        if let Some(area) = self.erase_check_algorithm.take() {
            self.target.free_working_area(area).await;
        }
    }

    /// Free the resident routines and hand back the target
    #[maybe_async]
    pub async fn into_target(mut self) -> T {
        self.release_working_areas().await;
        self.target
    }

    fn install(&mut self, identity: CfiIdentity) {
        self.bank.set_sectors(identity.sectors());
        self.identity = Some(identity);
    }

    fn check_halted(&self) -> Result<()> {
        if self.target.is_halted() {
            Ok(())
        } else {
            Err(Error::TargetBusy)
        }
    }

    fn check_probed(&self) -> Result<()> {
        match self.identity {
            Some(_) => Ok(()),
            None => Err(Error::NotProbed),
        }
    }

    /// Extension and timing of the probed device
    fn probed(&self) -> Result<(PrimaryExtension, TimeoutExponents)> {
        let identity = self.identity.as_ref().ok_or(Error::NotProbed)?;
        match identity.extension {
            Some(ext) => Ok((ext, identity.timeouts)),
            None => Err(Error::UnsupportedCommandSet(identity.pri_id)),
        }
    }

    fn poll(&self, op: TimedOperation, exponents: &TimeoutExponents) -> Poll {
        Poll::new(
            self.timeouts.iterations(op, exponents),
            self.timeouts.poll_interval_us,
        )
    }

    fn block_write_algorithm(&self, ext: &PrimaryExtension) -> Option<&'static Algorithm> {
        match ext {
            PrimaryExtension::Intel(_) => self
                .algorithms
                .and_then(|set| set.write_for_bus_width(self.bank.bus_width())),
            PrimaryExtension::Amd(_) => None,
        }
    }

    /// Program one bus word with the scalar path
    #[maybe_async]
    async fn program_word(
        &mut self,
        ext: &PrimaryExtension,
        poll: Poll,
        word: &BusWord,
        address: u32,
    ) -> Result<()> {
        match ext {
            PrimaryExtension::Intel(_) => {
                intel::write_word(&mut self.target, &self.bank, word, address, poll).await
            }
            PrimaryExtension::Amd(amd_ext) => {
                amd::write_word(&mut self.target, &self.bank, amd_ext, word, address, poll).await
            }
        }
    }

    /// Current flash contents of the bus word at `address`
    #[maybe_async]
    async fn read_back(&mut self, address: u32) -> Result<[u8; 4]> {
        command::read_array(&mut self.target, &self.bank).await?;
        let mut bytes = [0u8; 4];
        let width = self.bank.bus_width() as usize;
        self.target
            .read_buffer(address, &mut bytes[..width])
            .await?;
        Ok(bytes)
    }

    #[maybe_async]
    async fn write_inner(
        &mut self,
        ext: &PrimaryExtension,
        exponents: &TimeoutExponents,
        mut data: &[u8],
        offset: u32,
    ) -> Result<()> {
        let bus_width = self.bank.bus_width();
        let width = bus_width as usize;
        let endianness = self.target.endianness();
        let poll = self.poll(TimedOperation::WordWrite, exponents);

        let address = self.bank.base() + offset;
        let mut write_p = address & !(bus_width - 1);

        // leading partial word: merge with what the flash already holds
        if write_p != address {
            let align = (address - write_p) as usize;
            let current = self.read_back(write_p).await?;
            let take = (width - align).min(data.len());

            let mut word = BusWord::new(bus_width);
            for &b in current[..align]
                .iter()
                .chain(&data[..take])
                .chain(&current[align + take..width])
            {
                word.push_byte(b, endianness);
            }
            self.program_word(ext, poll, &word, write_p).await?;

            data = &data[take..];
            write_p = write_p.wrapping_add(bus_width);
        }

        let body_len = data.len() / width * width;
        let (mut body, tail) = data.split_at(body_len);

        if !body.is_empty() {
            if let Some(algorithm) = self.block_write_algorithm(ext) {
                match accelerator::write_block(
                    &mut self.target,
                    &self.bank,
                    &mut self.write_algorithm,
                    algorithm,
                    body,
                    write_p,
                )
                .await
                {
                    Ok(()) => {
                        write_p = write_p.wrapping_add(body_len as u32);
                        body = &[];
                    }
                    Err(Error::ResourceUnavailable) => {
                        log::info!("falling back to word writes");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        for chunk in body.chunks_exact(width) {
            let word = BusWord::from_bytes(chunk, endianness);
            self.program_word(ext, poll, &word, write_p).await?;
            write_p = write_p.wrapping_add(bus_width);
        }

        // trailing partial word
        if !tail.is_empty() {
            let current = self.read_back(write_p).await?;
            let mut word = BusWord::new(bus_width);
            for &b in tail.iter().chain(&current[tail.len()..width]) {
                word.push_byte(b, endianness);
            }
            self.program_word(ext, poll, &word, write_p).await?;
        }

        Ok(())
    }
}

#[maybe_async(AFIT)]
impl<T: Target> FlashDriver for CfiFlash<T> {
    fn bank(&self) -> &FlashBank {
        &self.bank
    }

    async fn probe(&mut self) -> Result<()> {
        self.identity = None;
        self.bank.set_sectors(alloc::vec::Vec::new());

        let identity = parser::probe(&mut self.target, &self.bank).await?;
        log::info!(
            "found CFI flash at 0x{:08x}: {} command set, {} sectors",
            self.bank.base(),
            identity.command_set(),
            identity.sectors().len()
        );
        self.install(identity);
        Ok(())
    }

    async fn erase(&mut self, first: usize, last: usize) -> Result<()> {
        self.check_probed()?;
        self.check_halted()?;
        self.bank.check_range(first, last)?;
        let (ext, exponents) = self.probed()?;

        log::info!("erasing sectors {}..={}", first, last);
        let poll = self.poll(TimedOperation::BlockErase, &exponents);
        let result = match &ext {
            PrimaryExtension::Intel(_) => {
                intel::erase(&mut self.target, &mut self.bank, first, last, poll).await
            }
            PrimaryExtension::Amd(amd_ext) => {
                amd::erase(&mut self.target, &mut self.bank, amd_ext, first, last, poll).await
            }
        };
        let reset = command::read_array(&mut self.target, &self.bank).await;
        result.and(reset)
    }

    async fn protect(&mut self, set: bool, first: usize, last: usize) -> Result<()> {
        self.check_probed()?;
        self.check_halted()?;
        self.bank.check_range(first, last)?;
        let (ext, _) = self.probed()?;

        let intel_ext = match &ext {
            PrimaryExtension::Intel(intel_ext) => intel_ext,
            PrimaryExtension::Amd(_) => {
                log::error!("sector protection is not available through the AMD command set");
                return Err(Error::OperationFailed);
            }
        };

        log::info!(
            "{} sectors {}..={}",
            if set { "protecting" } else { "unprotecting" },
            first,
            last
        );
        let poll = Poll::new(LOCK_POLL_ITERATIONS, self.timeouts.poll_interval_us);
        let result = intel::protect(
            &mut self.target,
            &mut self.bank,
            intel_ext,
            set,
            first,
            last,
            poll,
        )
        .await;
        let reset = command::send_at(&mut self.target, &self.bank, opcodes::READ_ARRAY, 0).await;
        result.and(reset)
    }

    async fn write(&mut self, data: &[u8], offset: u32) -> Result<()> {
        self.check_probed()?;
        self.check_halted()?;
        if offset as u64 + data.len() as u64 > self.bank.size() as u64 {
            return Err(Error::AddressOutOfBounds);
        }
        let (ext, exponents) = self.probed()?;
        if data.is_empty() {
            return Ok(());
        }

        log::info!("writing {} bytes at offset 0x{:x}", data.len(), offset);
        let result = self.write_inner(&ext, &exponents, data, offset).await;
        let reset = command::read_array(&mut self.target, &self.bank).await;
        result.and(reset)
    }

    async fn erase_check(&mut self) -> Result<()> {
        if self.identity.is_none() {
            return Err(Error::NotProbed);
        }
        let algorithm = self.algorithms.map(|set| &set.erase_check);
        accelerator::erase_check(
            &mut self.target,
            &mut self.bank,
            &mut self.erase_check_algorithm,
            algorithm,
        )
        .await
    }

    async fn protect_check(&mut self) -> Result<()> {
        self.check_probed()?;
        self.check_halted()?;
        let (ext, _) = self.probed()?;
        match &ext {
            PrimaryExtension::Intel(intel_ext) => {
                intel::protect_check(&mut self.target, &mut self.bank, intel_ext).await
            }
            PrimaryExtension::Amd(amd_ext) => {
                amd::protect_check(&mut self.target, &mut self.bank, amd_ext).await
            }
        }
    }

    fn info(&self) -> String {
        match &self.identity {
            None => String::from("CFI flash bank not probed yet\n"),
            Some(identity) => format!(
                "CFI flash bank at 0x{:08x}, size 0x{:x}, bus width {}, chip width {}\n\n{}",
                self.bank.base(),
                self.bank.size(),
                self.bank.bus_width(),
                self.bank.chip_width(),
                identity
            ),
        }
    }
}
