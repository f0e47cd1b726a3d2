//! CLI argument parsing

use cfiflash_core::hex::parse_number;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cfiflash")]
#[command(author, version, about = "CFI NOR flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Target description (TOML); defaults to a 256 KiB x16 Intel/Sharp bank
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Save the flash contents to this file when done
    #[arg(long, global = true)]
    pub dump: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sector range options shared across commands
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct SectorRange {
    /// First sector (default: 0)
    #[arg(long)]
    pub first: Option<usize>,

    /// Last sector, inclusive (default: the last one)
    #[arg(long)]
    pub last: Option<usize>,
}

impl SectorRange {
    /// Fill in the defaults for a bank of `count` sectors
    pub fn resolve(&self, count: usize) -> Result<(usize, usize), String> {
        if count == 0 {
            return Err("bank has no sectors".into());
        }
        Ok((self.first.unwrap_or(0), self.last.unwrap_or(count - 1)))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Identify the flash bank
    Probe,

    /// Show the identification data
    Info,

    /// Erase sectors
    Erase {
        #[command(flatten)]
        range: SectorRange,
    },

    /// Set sector lock bits
    Protect {
        #[command(flatten)]
        range: SectorRange,
    },

    /// Clear sector lock bits
    Unprotect {
        #[command(flatten)]
        range: SectorRange,
    },

    /// Write a file to flash
    Write {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Byte offset into the bank (hex or decimal)
        #[arg(short, long, value_parser = parse_number, default_value = "0")]
        offset: u32,

        /// Skip reading the data back afterwards
        #[arg(long)]
        no_verify: bool,
    },

    /// Find out which sectors are erased
    EraseCheck,

    /// Read the sector lock bits
    ProtectCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_write() {
        let cli = Cli::parse_from(["cfiflash", "-vv", "write", "-i", "img.bin", "-o", "0x100"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Write {
                input,
                offset,
                no_verify,
            } => {
                assert_eq!(input, PathBuf::from("img.bin"));
                assert_eq!(offset, 0x100);
                assert!(!no_verify);
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn test_sector_range_defaults() {
        let cli = Cli::parse_from(["cfiflash", "erase", "--first", "3"]);
        let Commands::Erase { range } = cli.command else {
            panic!("expected erase");
        };
        assert_eq!(range.resolve(8), Ok((3, 7)));
        assert!(SectorRange::default().resolve(0).is_err());
    }
}
