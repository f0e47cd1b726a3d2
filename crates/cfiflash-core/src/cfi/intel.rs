//! Intel/Sharp extended command set (ids 1 and 3)
//!
//! Every operation is a short command sequence followed by a poll of the
//! status register until its ready bit is set.

use super::command::{self, opcodes, BusWord, BLOCK_STATUS_OFFSET, QUERY_OFFSET};
use super::types::{IntelFeatures, IntelPrimaryExtension};
use crate::error::{Error, Result};
use crate::flash::{EraseState, FlashBank, ProtectState};
use crate::target::Target;
use bitflags::bitflags;
use maybe_async::maybe_async;

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntelStatus: u8 {
        /// Write state machine ready
        const READY             = 0x80;
        /// Block erase suspended
        const ERASE_SUSPENDED   = 0x40;
        /// Error in block erase or clear lock bits
        const ERASE_ERROR       = 0x20;
        /// Error in program or set lock bit
        const PROGRAM_ERROR     = 0x10;
        /// Programming voltage too low
        const LOW_VOLTAGE       = 0x08;
        /// Program suspended
        const PROGRAM_SUSPENDED = 0x04;
        /// Operation aborted on a locked block
        const LOCK_VIOLATION    = 0x02;
    }
}

/// Status poll parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poll {
    /// Maximum number of sleeps before giving up
    pub iterations: u32,
    /// Sleep between status reads
    pub interval_us: u32,
}

impl Poll {
    /// Poll bound with the given iteration count
    pub const fn new(iterations: u32, interval_us: u32) -> Self {
        Self {
            iterations,
            interval_us,
        }
    }
}

/// Log every error bit of a status byte
pub fn log_status_errors(status: u8) {
    let bits = IntelStatus::from_bits_retain(status);
    log::error!("status register: 0x{:02x}", status);
    if bits.contains(IntelStatus::LOCK_VIOLATION) {
        log::error!("block lock-bit detected, operation aborted");
    }
    if bits.contains(IntelStatus::PROGRAM_SUSPENDED) {
        log::error!("program suspended");
    }
    if bits.contains(IntelStatus::LOW_VOLTAGE) {
        log::error!("low programming voltage detected, operation aborted");
    }
    if bits.contains(IntelStatus::PROGRAM_ERROR) {
        log::error!("program error or error in setting lock bit");
    }
    if bits.contains(IntelStatus::ERASE_ERROR) {
        log::error!("error in block erasure or clearing lock bits");
    }
    if bits.contains(IntelStatus::ERASE_SUSPENDED) {
        log::error!("block erase suspended");
    }
}

/// Clear the status register
#[maybe_async]
pub async fn clear_status<T: Target + ?Sized>(target: &mut T, bank: &FlashBank) -> Result<()> {
    command::send_at(target, bank, opcodes::CLEAR_STATUS, 0).await
}

/// Poll the status register until ready
///
/// Succeeds only when the final status is exactly ready with no error bits.
/// Any other outcome logs the decoded bits, clears the status register and
/// returns `Timeout` (ready never seen) or `OperationFailed`.
#[maybe_async]
pub async fn wait_status_busy<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    poll: Poll,
) -> Result<()> {
    let mut remaining = poll.iterations;
    let status = loop {
        let status = command::get_u8(target, bank, 0, 0).await?;
        if status & IntelStatus::READY.bits() != 0 {
            break status;
        }
        if remaining == 0 {
            log::error!(
                "timeout while waiting for the write state machine, status 0x{:02x}",
                status
            );
            log_status_errors(status);
            clear_status(target, bank).await?;
            return Err(Error::Timeout);
        }
        remaining -= 1;
        log::trace!("status: 0x{:02x}", status);
        target.delay_us(poll.interval_us).await;
    };

    log::debug!("status: 0x{:02x}", status);
    if status != IntelStatus::READY.bits() {
        log_status_errors(status);
        clear_status(target, bank).await?;
        return Err(Error::OperationFailed);
    }
    Ok(())
}

/// Erase sectors `first..=last`
///
/// Sectors erased before a failure keep their `Erased` mark.
#[maybe_async]
pub async fn erase<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    first: usize,
    last: usize,
    poll: Poll,
) -> Result<()> {
    for i in first..=last {
        let address = command::sector_address(bank, i);
        clear_status(target, bank).await?;
        command::send(target, bank, opcodes::ERASE_SETUP, address).await?;
        command::send(target, bank, opcodes::CONFIRM, address).await?;

        if let Err(e) = wait_status_busy(target, bank, poll).await {
            log::error!("couldn't erase block {} of bank at 0x{:08x}", i, bank.base());
            return Err(e);
        }
        if let Some(sector) = bank.sector_mut(i) {
            sector.erase_state = EraseState::Erased;
        }
        log::debug!("erased block {} at 0x{:08x}", i, address);
    }
    Ok(())
}

/// Set or clear lock bits of sectors `first..=last`
///
/// Devices with only the legacy "clear all" unlock lose every lock bit on
/// an unlock; the blocks still recorded as protected are locked again
/// afterwards.
#[maybe_async]
pub async fn protect<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    ext: &IntelPrimaryExtension,
    set: bool,
    first: usize,
    last: usize,
    poll: Poll,
) -> Result<()> {
    if !ext.features.can_protect() {
        log::error!(
            "device supports neither individual nor simultaneous lock bit changes (features 0x{:x})",
            ext.features.bits()
        );
        return Err(Error::OperationFailed);
    }

    clear_status(target, bank).await?;

    let confirm = if set {
        opcodes::LOCK_SET
    } else {
        opcodes::LOCK_CLEAR
    };
    for i in first..=last {
        let address = command::sector_address(bank, i);
        command::send(target, bank, opcodes::LOCK_SETUP, address).await?;
        command::send(target, bank, confirm, address).await?;
        if let Some(sector) = bank.sector_mut(i) {
            sector.protect_state = if set {
                ProtectState::Protected
            } else {
                ProtectState::Unprotected
            };
        }
        wait_status_busy(target, bank, poll).await?;
    }

    if !set && !ext.features.contains(IntelFeatures::INDIVIDUAL_LOCK) {
        log::debug!("restoring lock bits after simultaneous unlock");
        for i in 0..bank.sector_count() {
            let protected = bank.sectors()[i].protect_state == ProtectState::Protected;
            let address = command::sector_address(bank, i);
            clear_status(target, bank).await?;
            command::send(target, bank, opcodes::LOCK_SETUP, address).await?;
            if protected {
                command::send(target, bank, opcodes::LOCK_SET, address).await?;
            }
            wait_status_busy(target, bank, poll).await?;
        }
    }

    Ok(())
}

/// Program one bus word through the debug transport
#[maybe_async]
pub async fn write_word<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    word: &BusWord,
    address: u32,
    poll: Poll,
) -> Result<()> {
    clear_status(target, bank).await?;
    command::send(target, bank, opcodes::PROGRAM_SETUP, address).await?;
    command::write_word(target, bank, word, address).await?;

    if let Err(e) = wait_status_busy(target, bank, poll).await {
        log::error!(
            "couldn't write word at base 0x{:08x}, address 0x{:08x}",
            bank.base(),
            address
        );
        return Err(e);
    }
    Ok(())
}

/// Read every sector's lock bit
#[maybe_async]
pub async fn protect_check<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    ext: &IntelPrimaryExtension,
) -> Result<()> {
    if ext.blk_status_reg_mask & 0x1 == 0 {
        log::error!("device doesn't report block lock bits");
        return Err(Error::OperationFailed);
    }

    command::send_at(target, bank, opcodes::READ_IDENTIFIER, QUERY_OFFSET).await?;

    for i in 0..bank.sector_count() {
        let offset = bank.sectors()[i].offset;
        let block_status = command::get_u8(target, bank, offset, BLOCK_STATUS_OFFSET).await?;
        if let Some(sector) = bank.sector_mut(i) {
            sector.protect_state = if block_status & 0x1 != 0 {
                ProtectState::Protected
            } else {
                ProtectState::Unprotected
            };
        }
    }

    command::send_at(target, bank, opcodes::READ_ARRAY, 0).await
}
