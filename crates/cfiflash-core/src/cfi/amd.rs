//! AMD/Fujitsu standard command set (id 2)
//!
//! Commands are preceded by a two-cycle unlock sequence. Completion is
//! detected by DQ6 toggling on consecutive reads while the embedded
//! algorithm runs; DQ5 flags an internal timeout.

use super::command::{self, opcodes, BusWord, BLOCK_STATUS_OFFSET};
use super::intel::Poll;
use super::types::AmdPrimaryExtension;
use crate::error::{Error, Result};
use crate::flash::{EraseState, FlashBank, ProtectState};
use crate::target::Target;
use maybe_async::maybe_async;

const DQ6_TOGGLE: u8 = 0x40;
const DQ5_TIMEOUT: u8 = 0x20;

#[maybe_async]
async fn unlock<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    ext: &AmdPrimaryExtension,
) -> Result<()> {
    command::send_at(target, bank, opcodes::AMD_UNLOCK1, ext.unlock1).await?;
    command::send_at(target, bank, opcodes::AMD_UNLOCK2, ext.unlock2).await
}

/// Return to read mode
#[maybe_async]
pub async fn reset<T: Target + ?Sized>(target: &mut T, bank: &FlashBank) -> Result<()> {
    command::send_at(target, bank, opcodes::RESET, 0).await
}

/// Wait for the embedded algorithm at `address` to finish
#[maybe_async]
pub async fn wait_toggle<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    address: u32,
    poll: Poll,
) -> Result<()> {
    let toggle = BusWord::command(DQ6_TOGGLE, bank.chip_width(), bank.bus_width()).value();
    let timeout = BusWord::command(DQ5_TIMEOUT, bank.chip_width(), bank.bus_width()).value();
    let mut remaining = poll.iterations;

    loop {
        let first = command::read_word(target, bank, address).await?.value();
        let second = command::read_word(target, bank, address).await?.value();
        if (first ^ second) & toggle == 0 {
            return Ok(());
        }

        if second & timeout != 0 {
            // DQ5 may have been set just as the operation finished
            let first = command::read_word(target, bank, address).await?.value();
            let second = command::read_word(target, bank, address).await?.value();
            if (first ^ second) & toggle == 0 {
                return Ok(());
            }
            log::error!(
                "embedded algorithm exceeded its time limit at 0x{:08x} (status 0x{:x})",
                address,
                second
            );
            reset(target, bank).await?;
            return Err(Error::OperationFailed);
        }

        if remaining == 0 {
            log::error!("timeout while waiting for toggle bit at 0x{:08x}", address);
            reset(target, bank).await?;
            return Err(Error::Timeout);
        }
        remaining -= 1;
        target.delay_us(poll.interval_us).await;
    }
}

/// Erase sectors `first..=last`
#[maybe_async]
pub async fn erase<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    ext: &AmdPrimaryExtension,
    first: usize,
    last: usize,
    poll: Poll,
) -> Result<()> {
    for i in first..=last {
        let address = command::sector_address(bank, i);
        unlock(target, bank, ext).await?;
        command::send_at(target, bank, opcodes::AMD_ERASE_SETUP, ext.unlock1).await?;
        unlock(target, bank, ext).await?;
        command::send(target, bank, opcodes::AMD_SECTOR_ERASE, address).await?;

        if let Err(e) = wait_toggle(target, bank, address, poll).await {
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

/// Program one bus word
#[maybe_async]
pub async fn write_word<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    ext: &AmdPrimaryExtension,
    word: &BusWord,
    address: u32,
    poll: Poll,
) -> Result<()> {
    unlock(target, bank, ext).await?;
    command::send_at(target, bank, opcodes::AMD_PROGRAM, ext.unlock1).await?;
    command::write_word(target, bank, word, address).await?;

    if let Err(e) = wait_toggle(target, bank, address, poll).await {
        log::error!(
            "couldn't write word at base 0x{:08x}, address 0x{:08x}",
            bank.base(),
            address
        );
        return Err(e);
    }
    Ok(())
}

/// Read every sector's protection status through autoselect
#[maybe_async]
pub async fn protect_check<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    ext: &AmdPrimaryExtension,
) -> Result<()> {
    unlock(target, bank, ext).await?;
    command::send_at(target, bank, opcodes::READ_IDENTIFIER, ext.unlock1).await?;

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

    reset(target, bank).await
}
