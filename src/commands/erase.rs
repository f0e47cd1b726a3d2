//! Erase and erase-check commands

use super::spinner;
use crate::cli::SectorRange;
use cfiflash_core::flash::{EraseState, FlashDriver, FlashDriverExt};

/// Run the erase command
pub fn run_erase<D: FlashDriver>(
    flash: &mut D,
    range: SectorRange,
) -> Result<(), Box<dyn std::error::Error>> {
    let (first, last) = range.resolve(flash.bank().sector_count())?;

    let pb = spinner(format!("Erasing sectors {} through {}...", first, last))?;
    match flash.erase(first, last) {
        Ok(()) => {
            pb.finish_with_message(format!("Erased sectors {} through {}", first, last));
            Ok(())
        }
        Err(e) => {
            pb.abandon_with_message("Erase failed");
            Err(e.into())
        }
    }
}

/// Run the erase-check command
pub fn run_erase_check<D: FlashDriver>(flash: &mut D) -> Result<(), Box<dyn std::error::Error>> {
    let pb = spinner("Checking sectors...".to_string())?;
    let result = flash.erase_check();
    pb.finish_and_clear();
    result?;

    for (i, sector) in flash.bank().sectors().iter().enumerate() {
        let state = match sector.erase_state {
            EraseState::Erased => "erased",
            EraseState::NotErased => "not erased",
            EraseState::Unknown => "unknown",
        };
        println!(
            "  #{:<4} 0x{:08X} ({:>4} KiB)  {}",
            i,
            sector.offset,
            sector.size / 1024,
            state
        );
    }
    println!(
        "{} of {} sectors erased",
        flash.erased_sector_count(),
        flash.bank().sector_count()
    );
    Ok(())
}
