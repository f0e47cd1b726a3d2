//! Target accessor trait definitions
//!
//! These traits use `maybe_async` to support both sync and async modes.
//! - By default, traits are async (suitable for network debug servers)
//! - With the `is_sync` feature, traits become synchronous

use crate::error::{Error, Result};
use maybe_async::maybe_async;

/// Byte order of the target's data bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Endianness {
    /// Least significant byte at the lowest address
    #[default]
    Little,
    /// Most significant byte at the lowest address
    Big,
}

/// A block of target RAM reserved for host-downloaded code or data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingArea {
    /// Start address in the target's address space
    pub address: u32,
    /// Size in bytes
    pub size: u32,
}

/// Direction of a register argument passed to [`Target::run_algorithm`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    /// Written to the register before the routine starts
    In,
    /// Read back from the register after the routine stops
    Out,
    /// Both written and read back
    InOut,
}

/// A register argument for a downloaded routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegParam {
    /// Architectural register name, e.g. `"r0"`
    pub name: &'static str,
    /// Whether the value is passed in, read out or both
    pub direction: ParamDirection,
    /// Register value
    pub value: u32,
}

impl RegParam {
    /// Argument passed into the routine
    pub const fn input(name: &'static str, value: u32) -> Self {
        Self {
            name,
            direction: ParamDirection::In,
            value,
        }
    }

    /// Result read back from the routine
    pub const fn output(name: &'static str) -> Self {
        Self {
            name,
            direction: ParamDirection::Out,
            value: 0,
        }
    }

    /// Argument that is also read back
    pub const fn in_out(name: &'static str, value: u32) -> Self {
        Self {
            name,
            direction: ParamDirection::InOut,
            value,
        }
    }

    /// True if the target should load this value before running
    pub fn is_input(&self) -> bool {
        matches!(self.direction, ParamDirection::In | ParamDirection::InOut)
    }

    /// True if the target should store the register back after running
    pub fn is_output(&self) -> bool {
        matches!(self.direction, ParamDirection::Out | ParamDirection::InOut)
    }
}

/// Debug target memory accessor (sync or async depending on `is_sync` feature)
///
/// This is the narrow interface the flash engine consumes from the
/// target-control layer. Halting, register caches and the transport itself
/// are the implementor's business.
///
/// Memory buffers are always in target address order: `buf[0]` is the byte
/// at `address`, regardless of endianness. `size` is the access width in
/// bytes (1, 2 or 4) and `count` the number of accesses, so exactly
/// `size * count` bytes are transferred.
///
/// ## Example
///
/// ```ignore
/// #[maybe_async]
/// impl Target for MyProbe {
///     fn endianness(&self) -> Endianness { Endianness::Little }
///     fn is_halted(&self) -> bool { self.core.halted() }
///
///     async fn read_memory(&mut self, address: u32, size: u32, count: u32, buf: &mut [u8]) -> Result<()> {
///         self.core.read(address, size, count, buf).await
///     }
///     // ...
/// }
/// ```
#[maybe_async(AFIT)]
pub trait Target {
    /// Byte order of the target
    fn endianness(&self) -> Endianness;

    /// Whether the target CPU is currently halted
    fn is_halted(&self) -> bool;

    /// Read `count` accesses of `size` bytes starting at `address`
    async fn read_memory(&mut self, address: u32, size: u32, count: u32, buf: &mut [u8])
        -> Result<()>;

    /// Write `count` accesses of `size` bytes starting at `address`
    async fn write_memory(&mut self, address: u32, size: u32, count: u32, data: &[u8])
        -> Result<()>;

    /// Bulk byte write, used for downloading code and data into RAM
    async fn write_buffer(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.write_memory(address, 1, data.len() as u32, data).await
    }

    /// Bulk byte read
    async fn read_buffer(&mut self, address: u32, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u32;
        self.read_memory(address, 1, len, buf).await
    }

    /// Reserve `size` bytes of target RAM
    ///
    /// Returns `ResourceUnavailable` when no region of that size is free.
    async fn alloc_working_area(&mut self, size: u32) -> Result<WorkingArea>;

    /// Release a region previously returned by `alloc_working_area`
    async fn free_working_area(&mut self, area: WorkingArea);

    /// Copy a routine into a working area
    async fn load_code(&mut self, area: &WorkingArea, code: &[u8]) -> Result<()> {
        if code.len() as u64 > area.size as u64 {
            return Err(Error::ResourceUnavailable);
        }
        self.write_buffer(area.address, code).await
    }

    /// Run a downloaded routine from `entry` until the PC reaches `exit`
    ///
    /// Input parameters are loaded into their registers first; output
    /// parameters are updated in place once the routine stops. Fails with
    /// `AlgorithmFailed` if `exit` is not reached within `timeout_ms`.
    async fn run_algorithm(
        &mut self,
        entry: u32,
        exit: u32,
        params: &mut [RegParam],
        timeout_ms: u32,
    ) -> Result<()>;

    /// Delay for the specified number of microseconds
    async fn delay_us(&mut self, us: u32);
}
