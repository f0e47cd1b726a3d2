//! Error types for cfiflash-core
//!
//! This module provides a no_std compatible error type shared by the
//! identification code, the command-set state machines and the target
//! accessor trait.

use core::fmt;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Bank state
    /// Operation attempted before a successful probe
    NotProbed,
    /// The device did not answer the CFI query with `QRY`/`PRI`
    NotCfiCompliant,
    /// Probed, but the primary command set has no implementation
    UnsupportedCommandSet(u16),
    /// No quirk entry exists for the manufacturer/device pair
    UnknownDevice,
    /// Bank configuration is inconsistent (widths, size)
    InvalidBankConfig,

    // Target errors
    /// Target is not halted
    TargetBusy,
    /// Memory access through the debug transport failed
    TargetAccess,
    /// Scratch RAM allocation failed
    ResourceUnavailable,
    /// Downloaded algorithm did not reach its exit point
    AlgorithmFailed,

    // Operation errors
    /// Sector range is empty, reversed or beyond the sector list
    InvalidSectorRange,
    /// Address range is beyond the bank
    AddressOutOfBounds,
    /// Status register reported an error after a command sequence
    OperationFailed,
    /// Status poll loop exhausted its bound
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotProbed => write!(f, "flash bank not probed"),
            Self::NotCfiCompliant => write!(f, "device is not CFI compliant"),
            Self::UnsupportedCommandSet(id) => {
                write!(f, "CFI primary command set 0x{:04X} unsupported", id)
            }
            Self::UnknownDevice => write!(f, "no quirk entry for device"),
            Self::InvalidBankConfig => write!(f, "invalid flash bank configuration"),
            Self::TargetBusy => write!(f, "target not halted"),
            Self::TargetAccess => write!(f, "target memory access failed"),
            Self::ResourceUnavailable => write!(f, "no working area available"),
            Self::AlgorithmFailed => write!(f, "target algorithm did not complete"),
            Self::InvalidSectorRange => write!(f, "invalid sector range"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::OperationFailed => write!(f, "flash operation failed"),
            Self::Timeout => write!(f, "flash operation timed out"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
