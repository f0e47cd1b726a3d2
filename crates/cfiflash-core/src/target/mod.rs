//! Debug target access
//!
//! The flash engine never talks to a debug transport directly. Everything
//! goes through the [`Target`] trait: sized memory accesses, scratch RAM
//! ("working areas") and running a downloaded routine on the target CPU.

mod traits;

pub use traits::{Endianness, ParamDirection, RegParam, Target, WorkingArea};
