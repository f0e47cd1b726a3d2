//! Probe and info commands

use crate::config::QuirkIds;
use cfiflash_core::cfi::CfiFlash;
use cfiflash_core::flash::FlashDriver;
use cfiflash_core::target::Target;
use cfiflash_core::Error;

/// Identify the bank, looking the part up in the quirks table when it has
/// no query table and ids were configured
pub fn identify<T: Target>(
    flash: &mut CfiFlash<T>,
    quirk: Option<QuirkIds>,
) -> Result<(), Box<dyn std::error::Error>> {
    match (flash.probe(), quirk) {
        (Ok(()), _) => Ok(()),
        (Err(Error::NotCfiCompliant), Some(ids)) => {
            log::info!(
                "No CFI query table, using ids 0x{:02x}/0x{:04x}",
                ids.manufacturer,
                ids.device
            );
            flash.identify_quirk(ids.manufacturer, ids.device)?;
            Ok(())
        }
        (Err(e), _) => Err(e.into()),
    }
}

/// Run the probe command
pub fn run_probe<T: Target>(flash: &CfiFlash<T>) -> Result<(), Box<dyn std::error::Error>> {
    let identity = flash.identity().ok_or(Error::NotProbed)?;
    let bank = flash.bank();

    println!("Found CFI flash at 0x{:08X}:", bank.base());
    println!("  Command set: {}", identity.command_set());
    println!(
        "  Size:        {} bytes ({} KiB)",
        identity.device_size(),
        identity.device_size() / 1024
    );
    println!(
        "  Bus:         {} x{} chip(s) on a {}-bit bus",
        bank.chip_count(),
        bank.chip_width() * 8,
        bank.bus_width() * 8
    );
    println!("  Sectors:     {}", bank.sector_count());
    for (i, region) in identity.erase_regions.iter().enumerate() {
        println!(
            "    Region {}: {} blocks of 0x{:X} bytes",
            i,
            region.block_count(),
            region.block_size()
        );
    }

    if identity.not_cfi {
        println!("  Identity taken from the quirks table");
    }
    if let Some(mismatch) = &identity.geometry_mismatch {
        println!("  Warning: {}", mismatch);
    }

    Ok(())
}

/// Run the info command
pub fn run_info<T: Target>(flash: &CfiFlash<T>) {
    print!("{}", flash.info());
}
