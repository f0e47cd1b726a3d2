//! Common Flash Interface support
//!
//! This module identifies memory-mapped NOR flash through the CFI query
//! protocol and drives it with the vendor command set it advertises.
//!
//! # Overview
//!
//! - [`parser`]: query mode, `QRY` table and vendor extension tables
//! - [`command`]: command replication across parallel chips, bus-word
//!   encoding in target byte order
//! - [`intel`] / [`amd`]: erase, protect and program state machines
//! - [`accelerator`]: block writes and erase checks run by the target CPU
//! - [`quirks`]: synthesized identities for parts without a query table
//! - [`CfiFlash`]: the [`FlashDriver`](crate::flash::FlashDriver)
//!   implementation tying these together
//!
//! # Usage
//!
//! ```ignore
//! use cfiflash_core::cfi::CfiFlash;
//! use cfiflash_core::flash::{BankConfig, FlashDriver};
//!
//! let mut flash = CfiFlash::new(target, BankConfig::new(0x1000_0000, 0x40_0000, 2, 2))?;
//! flash.probe()?;
//! println!("{}", flash.info());
//! ```

pub mod accelerator;
pub mod amd;
pub mod command;
mod device;
pub mod intel;
mod parser;
pub mod quirks;
mod timeout;
mod types;

#[cfg(all(test, feature = "is_sync"))]
mod mock;

pub use device::CfiFlash;
pub use parser::probe;
pub use timeout::{TimeoutConfig, LOCK_POLL_ITERATIONS};
pub use types::*;
