//! Protect, unprotect and protect-check commands

use crate::cli::SectorRange;
use cfiflash_core::flash::{FlashDriver, ProtectState};

/// Set (`set == true`) or clear the lock bits of a sector range
pub fn run_protect<D: FlashDriver>(
    flash: &mut D,
    set: bool,
    range: SectorRange,
) -> Result<(), Box<dyn std::error::Error>> {
    let (first, last) = range.resolve(flash.bank().sector_count())?;
    flash.protect(set, first, last)?;
    println!(
        "{} sectors {} through {}",
        if set { "Protected" } else { "Unprotected" },
        first,
        last
    );
    Ok(())
}

/// Run the protect-check command
pub fn run_protect_check<D: FlashDriver>(flash: &mut D) -> Result<(), Box<dyn std::error::Error>> {
    flash.protect_check()?;

    let mut protected = 0;
    for (i, sector) in flash.bank().sectors().iter().enumerate() {
        let state = match sector.protect_state {
            ProtectState::Protected => {
                protected += 1;
                "protected"
            }
            ProtectState::Unprotected => "unprotected",
            ProtectState::Unknown => "unknown",
        };
        println!("  #{:<4} 0x{:08X}  {}", i, sector.offset, state);
    }
    println!(
        "{} of {} sectors protected",
        protected,
        flash.bank().sector_count()
    );
    Ok(())
}
