//! Write command implementation

use super::spinner;
use cfiflash_core::cfi::CfiFlash;
use cfiflash_core::flash::FlashDriver;
use cfiflash_core::target::Target;
use std::fs;
use std::path::Path;

/// Run the write command
pub fn run_write<T: Target>(
    flash: &mut CfiFlash<T>,
    input: &Path,
    offset: u32,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let bank_size = flash.bank().size();
    if offset as u64 + data.len() as u64 > bank_size as u64 {
        return Err(format!(
            "{} bytes at offset 0x{:X} don't fit in the bank (0x{:X} bytes)",
            data.len(),
            offset,
            bank_size
        )
        .into());
    }

    let pb = spinner(format!("Writing {} bytes at 0x{:08X}...", data.len(), offset))?;
    if let Err(e) = flash.write(&data, offset) {
        pb.abandon_with_message("Write failed");
        return Err(e.into());
    }
    pb.finish_with_message(format!("Wrote {} bytes", data.len()));

    if verify {
        let mut readback = vec![0u8; data.len()];
        let address = flash.bank().base() + offset;
        flash.target_mut().read_buffer(address, &mut readback)?;

        if let Some(pos) = readback.iter().zip(&data).position(|(a, b)| a != b) {
            return Err(format!(
                "Verification failed at offset 0x{:08X}: expected 0x{:02X}, got 0x{:02X}",
                offset as usize + pos,
                data[pos],
                readback[pos]
            )
            .into());
        }
        println!("Verified");
    }

    Ok(())
}
