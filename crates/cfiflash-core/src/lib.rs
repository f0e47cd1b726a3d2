//! cfiflash-core - CFI flash programming engine
//!
//! This crate drives memory-mapped Common Flash Interface (CFI) NOR flash
//! through a debug target's memory accessor. It identifies the device,
//! builds the sector map, and runs the erase/protect/program state machines
//! of the supported vendor command sets. Bulk programming and erase
//! verification can be offloaded to small machine-code loops that run on
//! the target CPU itself.
//!
//! The crate is `no_std` but needs an allocator for the sector list.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes the serde
//!   derives for configuration types)
//! - `is_sync` - Compile the `maybe_async` traits and operations as blocking
//!   code (enabled by default)
//!
//! # Example
//!
//! ```ignore
//! use cfiflash_core::cfi::CfiFlash;
//! use cfiflash_core::flash::{BankConfig, FlashDriver};
//!
//! fn program<T: cfiflash_core::target::Target>(target: T, image: &[u8]) {
//!     let config = BankConfig::new(0x0000_0000, 0x40_0000, 2, 2);
//!     let mut flash = CfiFlash::new(target, config).unwrap();
//!     flash.probe().unwrap();
//!     flash.erase(0, flash.bank().sector_count() - 1).unwrap();
//!     flash.write(image, 0).unwrap();
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod algorithm;
pub mod cfi;
pub mod error;
pub mod flash;
#[cfg(feature = "serde")]
pub mod hex;
pub mod target;

pub use error::{Error, Result};
