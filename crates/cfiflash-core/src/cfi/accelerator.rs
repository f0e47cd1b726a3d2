//! Target-side block write and erase check
//!
//! See [`crate::algorithm`] for the routines and their calling convention.

use super::command::{self, opcodes, BusWord};
use super::intel::{self, Poll};
use crate::algorithm::Algorithm;
use crate::error::{Error, Result};
use crate::flash::{EraseState, FlashBank};
use crate::target::{RegParam, Target, WorkingArea};
use maybe_async::maybe_async;

/// First scratch buffer size tried
const MAX_BUFFER_SIZE: u32 = 32 * 1024;

/// Give up once the halved buffer size drops to this
const MIN_BUFFER_SIZE: u32 = 256;

/// Limit for one run of a downloaded routine
pub const ALGORITHM_TIMEOUT_MS: u32 = 10_000;

/// Chunk size of the host-side erase check
const HOST_CHECK_CHUNK: u32 = 4096;

/// Download `algorithm` into a fresh working area
#[maybe_async]
async fn load<T: Target + ?Sized>(target: &mut T, algorithm: &Algorithm) -> Result<WorkingArea> {
    let area = target.alloc_working_area(algorithm.size()).await?;
    let code = algorithm.code_bytes(target.endianness());
    if let Err(e) = target.load_code(&area, &code).await {
        target.free_working_area(area).await;
        return Err(e);
    }
    log::debug!(
        "loaded {} ({} bytes) at 0x{:08x}",
        algorithm.name,
        code.len(),
        area.address
    );
    Ok(area)
}

/// Largest scratch buffer the target can spare, halving from 32 KiB
#[maybe_async]
async fn alloc_buffer<T: Target + ?Sized>(target: &mut T) -> Option<WorkingArea> {
    let mut size = MAX_BUFFER_SIZE;
    loop {
        match target.alloc_working_area(size).await {
            Ok(area) => return Some(area),
            Err(_) => {
                size /= 2;
                if size <= MIN_BUFFER_SIZE {
                    return None;
                }
            }
        }
    }
}

/// Program `data` at `address` with the block write routine
///
/// `data.len()` must be a multiple of the bus width. The routine stays
/// loaded in `slot` for later calls; the scratch buffer is freed before
/// returning. Returns `ResourceUnavailable` when no working area can be
/// had, in which case nothing has been programmed and the caller should
/// fall back to word writes.
#[maybe_async]
pub async fn write_block<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    slot: &mut Option<WorkingArea>,
    algorithm: &Algorithm,
    data: &[u8],
    address: u32,
) -> Result<()> {
    intel::clear_status(target, bank).await?;

    let code = match *slot {
        Some(area) => area,
        None => match load(target, algorithm).await {
            Ok(area) => {
                *slot = Some(area);
                area
            }
            Err(Error::ResourceUnavailable) => {
                log::warn!("no working area available, can't do block memory writes");
                return Err(Error::ResourceUnavailable);
            }
            Err(e) => return Err(e),
        },
    };

    let Some(source) = alloc_buffer(target).await else {
        // release the routine as well
        if let Some(area) = slot.take() {
            target.free_working_area(area).await;
        }
        log::warn!("no large enough working area available, can't do block memory writes");
        return Err(Error::ResourceUnavailable);
    };
    log::debug!(
        "block write buffer of {} bytes at 0x{:08x}",
        source.size,
        source.address
    );

    let result = run_chunks(target, bank, &code, algorithm, &source, data, address).await;
    target.free_working_area(source).await;
    result
}

#[maybe_async]
async fn run_chunks<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    code: &WorkingArea,
    algorithm: &Algorithm,
    source: &WorkingArea,
    data: &[u8],
    mut address: u32,
) -> Result<()> {
    let bus_width = bank.bus_width();
    let chip_width = bank.chip_width();
    let program = BusWord::command(opcodes::PROGRAM_SETUP, chip_width, bus_width).value();
    let ready = BusWord::command(intel::IntelStatus::READY.bits(), chip_width, bus_width).value();

    for chunk in data.chunks(source.size as usize) {
        target.write_buffer(source.address, chunk).await?;

        let mut params = [
            RegParam::input("r0", source.address),
            RegParam::input("r1", address),
            RegParam::input("r2", chunk.len() as u32 / bus_width),
            RegParam::input("r3", program),
            RegParam::output("r4"),
        ];
        let entry = code.address;
        let exit = code.address + algorithm.exit_offset;
        if let Err(e) = target
            .run_algorithm(entry, exit, &mut params, ALGORITHM_TIMEOUT_MS)
            .await
        {
            log::error!("block write routine failed at 0x{:08x}: {}", address, e);
            intel::clear_status(target, bank).await?;
            return Err(Error::OperationFailed);
        }

        let status = params[4].value;
        if status != ready {
            log::error!(
                "block write stopped near 0x{:08x} with status 0x{:x}",
                address,
                status
            );
            // a status read decodes and logs the error bits
            let _ = intel::wait_status_busy(target, bank, Poll::new(100, 1000)).await;
            intel::clear_status(target, bank).await?;
            return Err(Error::OperationFailed);
        }

        address = address.wrapping_add(chunk.len() as u32);
    }
    Ok(())
}

/// Refresh every sector's erase status
///
/// Uses the erase check routine when one is supplied and the target is
/// halted; the routine is loaded into `slot` on first use and kept there.
/// Otherwise the sectors are read back to the host in 4 KiB chunks.
#[maybe_async]
pub async fn erase_check<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    slot: &mut Option<WorkingArea>,
    algorithm: Option<&Algorithm>,
) -> Result<()> {
    if slot.is_none() && target.is_halted() {
        if let Some(algorithm) = algorithm {
            match load(target, algorithm).await {
                Ok(area) => *slot = Some(area),
                Err(Error::ResourceUnavailable) => {
                    log::warn!("no working area available, falling back to slow memory reads")
                }
                Err(e) => return Err(e),
            }
        }
    }

    match (*slot, algorithm) {
        (Some(area), Some(algorithm)) if target.is_halted() => {
            erase_check_on_target(target, bank, &area, algorithm).await
        }
        _ => erase_check_on_host(target, bank).await,
    }
}

#[maybe_async]
async fn erase_check_on_target<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
    area: &WorkingArea,
    algorithm: &Algorithm,
) -> Result<()> {
    for i in 0..bank.sector_count() {
        let sector = bank.sectors()[i];
        let mut params = [
            RegParam::input("r0", command::flash_address(bank, sector.offset, 0)),
            RegParam::input("r1", sector.size),
            RegParam::in_out("r2", 0xFF),
        ];
        let exit = area.address + algorithm.exit_offset;
        if let Err(e) = target
            .run_algorithm(area.address, exit, &mut params, ALGORITHM_TIMEOUT_MS)
            .await
        {
            log::error!("erase check routine failed on sector {}: {}", i, e);
            return Err(Error::OperationFailed);
        }
        if let Some(s) = bank.sector_mut(i) {
            s.erase_state = if params[2].value == 0xFF {
                EraseState::Erased
            } else {
                EraseState::NotErased
            };
        }
    }
    Ok(())
}

#[maybe_async]
async fn erase_check_on_host<T: Target + ?Sized>(
    target: &mut T,
    bank: &mut FlashBank,
) -> Result<()> {
    let mut buffer = alloc::vec![0u8; HOST_CHECK_CHUNK as usize];

    for i in 0..bank.sector_count() {
        let sector = bank.sectors()[i];
        let mut address = command::flash_address(bank, sector.offset, 0);
        let mut remaining = sector.size;
        let mut erased = true;

        while remaining > 0 {
            let len = remaining.min(HOST_CHECK_CHUNK);
            let chunk = &mut buffer[..len as usize];
            if len % 4 == 0 {
                target.read_memory(address, 4, len / 4, chunk).await?;
            } else {
                target.read_memory(address, 1, len, chunk).await?;
            }
            if chunk.iter().fold(0xFFu8, |acc, &b| acc & b) != 0xFF {
                erased = false;
                break;
            }
            remaining -= len;
            address = address.wrapping_add(len);
        }

        if let Some(s) = bank.sector_mut(i) {
            s.erase_state = if erased {
                EraseState::Erased
            } else {
                EraseState::NotErased
            };
        }
    }
    Ok(())
}
