//! Flash bank model and the driver contract
//!
//! A [`FlashBank`] describes where a bank sits in the target address space,
//! how its data bus is built from parallel chips, and the sector list that
//! identification discovered. [`FlashDriver`] is the operation set every
//! flash controller implementation exposes to the layers above.

mod bank;
mod driver;

pub use bank::{BankConfig, EraseState, FlashBank, ProtectState, Sector};
pub use driver::{FlashDriver, FlashDriverExt};
