//! cfiflash - CFI NOR flash programmer
//!
//! Drives memory-mapped Common Flash Interface parts through a debug
//! target. The target here is an emulated CPU with RAM and a flash bank,
//! described by a TOML file (see `config`), so every command runs the real
//! identification, erase, lock and program sequences against a model that
//! answers like the hardware would. `--dump` saves the resulting flash
//! contents.

mod cli;
mod commands;
mod config;

use cfiflash_core::algorithm::armv4;
use cfiflash_core::cfi::CfiFlash;
use cfiflash_dummy::DummyTarget;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let target_config = config.target()?;
    let bank = config.bank(&target_config)?;
    let mut target = DummyTarget::new(target_config);

    if let Some(image) = config.image()? {
        let contents = target.chip_mut().data_mut();
        if image.len() > contents.len() {
            log::warn!(
                "Image is {} bytes, only the first {} fit in the device",
                image.len(),
                contents.len()
            );
        }
        let len = image.len().min(contents.len());
        contents[..len].copy_from_slice(&image[..len]);
    }

    let mut flash = CfiFlash::new(target, bank)?.with_timeouts(config.timeouts);
    if config.accelerate {
        flash = flash.with_algorithms(&armv4::ALGORITHMS);
    }

    commands::identify(&mut flash, config.quirk)?;

    let result = match cli.command {
        Commands::Probe => commands::run_probe(&flash),
        Commands::Info => {
            commands::run_info(&flash);
            Ok(())
        }
        Commands::Erase { range } => commands::run_erase(&mut flash, range),
        Commands::Protect { range } => commands::run_protect(&mut flash, true, range),
        Commands::Unprotect { range } => commands::run_protect(&mut flash, false, range),
        Commands::Write {
            input,
            offset,
            no_verify,
        } => commands::run_write(&mut flash, &input, offset, !no_verify),
        Commands::EraseCheck => commands::run_erase_check(&mut flash),
        Commands::ProtectCheck => commands::run_protect_check(&mut flash),
    };

    let target = flash.into_target();
    if let Some(path) = &cli.dump {
        std::fs::write(path, target.flash())?;
        log::info!("Saved flash contents to {}", path.display());
    }

    result
}
