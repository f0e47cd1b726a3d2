//! CLI command implementations
//!
//! Every command runs against an identified [`CfiFlash`] bank; `identify`
//! takes care of the query table and the quirks fallback beforehand.
//!
//! [`CfiFlash`]: cfiflash_core::cfi::CfiFlash

mod erase;
mod probe;
mod protect;
mod write;

pub use erase::{run_erase, run_erase_check};
pub use probe::{identify, run_info, run_probe};
pub use protect::{run_protect, run_protect_check};
pub use write::run_write;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Start a spinner for an operation that reports no progress of its own
fn spinner(message: String) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}
