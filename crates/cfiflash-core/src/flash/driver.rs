//! Flash driver contract
//!
//! Uses `maybe_async` to support both sync and async modes.

use super::FlashBank;
use crate::error::Result;
use alloc::string::String;
use maybe_async::maybe_async;

/// Operations every flash controller implementation provides
///
/// Implementations share one precondition and error taxonomy so that calling
/// code does not care which controller it is driving:
///
/// * `NotProbed` before a successful [`probe`](FlashDriver::probe)
/// * `TargetBusy` when the target is running
/// * `InvalidSectorRange` for an empty, reversed or out-of-range sector span
///
/// Failures never roll back earlier progress. If erasing sector 5 of 0..=9
/// fails, sectors 0..=4 stay marked `Erased` and can be inspected through
/// [`bank`](FlashDriver::bank).
///
/// # Example
///
/// ```ignore
/// use cfiflash_core::flash::FlashDriver;
///
/// fn reflash<D: FlashDriver>(driver: &mut D, image: &[u8]) -> Result<()> {
///     driver.probe()?;
///     let last = driver.bank().sector_count() - 1;
///     driver.protect(false, 0, last)?;
///     driver.erase(0, last)?;
///     driver.write(image, 0)
/// }
/// ```
#[maybe_async(AFIT)]
pub trait FlashDriver {
    /// Bank geometry and per-sector status
    fn bank(&self) -> &FlashBank;

    /// Identify the device and (re)build the sector list
    async fn probe(&mut self) -> Result<()>;

    /// Erase sectors `first..=last`
    async fn erase(&mut self, first: usize, last: usize) -> Result<()>;

    /// Set (`set = true`) or clear the lock bits of sectors `first..=last`
    async fn protect(&mut self, set: bool, first: usize, last: usize) -> Result<()>;

    /// Program `data` at `offset` bytes from the bank base
    ///
    /// The target range should be erased first. `offset` and `data.len()`
    /// need not be aligned to the bus width.
    async fn write(&mut self, data: &[u8], offset: u32) -> Result<()>;

    /// Refresh the erase status of every sector
    async fn erase_check(&mut self) -> Result<()>;

    /// Refresh the protection status of every sector
    async fn protect_check(&mut self) -> Result<()>;

    /// Human-readable identification summary
    fn info(&self) -> String;
}

/// Convenience operations built on [`FlashDriver`]
#[maybe_async(AFIT)]
pub trait FlashDriverExt: FlashDriver {
    /// Erase every sector of the bank
    async fn erase_all(&mut self) -> Result<()> {
        let count = self.bank().sector_count();
        if count == 0 {
            return Err(crate::error::Error::NotProbed);
        }
        self.erase(0, count - 1).await
    }

    /// Number of sectors currently marked erased
    fn erased_sector_count(&self) -> usize {
        self.bank()
            .sectors()
            .iter()
            .filter(|s| s.erase_state == super::EraseState::Erased)
            .count()
    }
}

impl<D: FlashDriver + ?Sized> FlashDriverExt for D {}
