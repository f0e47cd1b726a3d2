//! CFI data structures
//!
//! Types describing what the query table and the vendor extension tables
//! report about a device.

use crate::flash::Sector;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt;

/// Query-table signature at offsets 0x10-0x12
pub const QRY_SIGNATURE: [u8; 3] = *b"QRY";

/// Vendor extension signature at the start of the primary table
pub const PRI_SIGNATURE: [u8; 3] = *b"PRI";

// ============================================================================
// Command set
// ============================================================================

/// Primary vendor command set advertised by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSet {
    /// Intel/Sharp extended command set (ids 1 and 3)
    IntelSharp,
    /// AMD/Fujitsu standard command set (id 2)
    AmdFujitsu,
    /// Any other id
    Unsupported(u16),
}

impl CommandSet {
    /// Map a CFI command-set id to a variant
    pub fn from_id(id: u16) -> Self {
        match id {
            0x0001 | 0x0003 => Self::IntelSharp,
            0x0002 => Self::AmdFujitsu,
            other => Self::Unsupported(other),
        }
    }
}

impl fmt::Display for CommandSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntelSharp => write!(f, "Intel/Sharp extended"),
            Self::AmdFujitsu => write!(f, "AMD/Fujitsu standard"),
            Self::Unsupported(id) => write!(f, "unsupported (0x{:04X})", id),
        }
    }
}

// ============================================================================
// Erase regions
// ============================================================================

/// One erase-region descriptor from the query table
///
/// Packed as a 32-bit word: bits 15:0 hold the block count minus one, bits
/// 31:16 the block size in units of 256 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EraseRegion(pub u32);

impl EraseRegion {
    /// Build a descriptor from a block count and a block size in bytes
    pub const fn new(blocks: u32, block_size: u32) -> Self {
        Self(((block_size / 256) << 16) | ((blocks - 1) & 0xFFFF))
    }

    /// Number of blocks in the region
    pub fn block_count(&self) -> u32 {
        (self.0 & 0xFFFF) + 1
    }

    /// Size of each block in bytes
    pub fn block_size(&self) -> u32 {
        (self.0 >> 16) * 256
    }

    /// Total bytes covered by the region
    pub fn total_size(&self) -> u64 {
        self.block_count() as u64 * self.block_size() as u64
    }
}

// ============================================================================
// Timing
// ============================================================================

/// Operation categories with their own timeout entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimedOperation {
    /// Single word program
    WordWrite,
    /// Multi-byte buffer program
    BufferWrite,
    /// Single block erase
    BlockErase,
    /// Full chip erase
    ChipErase,
}

impl TimedOperation {
    const fn index(self) -> usize {
        match self {
            Self::WordWrite => 0,
            Self::BufferWrite => 1,
            Self::BlockErase => 2,
            Self::ChipErase => 3,
        }
    }
}

/// Per-operation timeout exponents from the query table
///
/// The typical time is `2^typical`; the maximum is `2^maximum` times the
/// typical time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeoutExponents {
    /// Typical exponents, indexed word/buffer/block/chip
    pub typical: [u8; 4],
    /// Maximum multiplier exponents, same order
    pub maximum: [u8; 4],
}

impl TimeoutExponents {
    /// Typical exponent for an operation
    pub fn typical(&self, op: TimedOperation) -> u8 {
        self.typical[op.index()]
    }

    /// Maximum multiplier exponent for an operation
    pub fn maximum(&self, op: TimedOperation) -> u8 {
        self.maximum[op.index()]
    }

    /// `2^typical`
    pub fn typical_units(&self, op: TimedOperation) -> u64 {
        pow2(self.typical(op))
    }

    /// `2^typical * 2^maximum`
    pub fn maximum_units(&self, op: TimedOperation) -> u64 {
        pow2(self.typical(op)).saturating_mul(pow2(self.maximum(op)))
    }
}

fn pow2(exp: u8) -> u64 {
    1u64.checked_shl(exp as u32).unwrap_or(u64::MAX)
}

/// Shift `base` left by `exp`, clamping at `u32::MAX`
pub(crate) fn saturating_shl(base: u32, exp: u8) -> u32 {
    if exp >= 32 || base > (u32::MAX >> exp) {
        u32::MAX
    } else {
        base << exp
    }
}

/// Voltage byte: BCD volts in the high nibble, tenths in the low one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Voltage(pub u8);

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}.{:x}", self.0 >> 4, self.0 & 0x0F)
    }
}

// ============================================================================
// Intel/Sharp extension
// ============================================================================

bitflags! {
    /// Optional feature support word of the Intel/Sharp extension
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IntelFeatures: u32 {
        /// Chip erase supported
        const CHIP_ERASE          = 1 << 0;
        /// Erase suspend supported
        const ERASE_SUSPEND       = 1 << 1;
        /// Program suspend supported
        const PROGRAM_SUSPEND     = 1 << 2;
        /// Legacy lock/unlock: clear-lock unlocks every block at once
        const SIMULTANEOUS_UNLOCK = 1 << 3;
        /// Queued erase supported
        const QUEUED_ERASE        = 1 << 4;
        /// Instant individual block locking
        const INDIVIDUAL_LOCK     = 1 << 5;
        /// Protection bits supported
        const PROTECTION_BITS     = 1 << 6;
        /// Page-mode read supported
        const PAGE_READ           = 1 << 7;
        /// Synchronous read supported
        const SYNC_READ           = 1 << 8;
    }
}

impl IntelFeatures {
    /// Whether the lock-setup sequence does anything on this device
    pub fn can_protect(&self) -> bool {
        self.intersects(Self::INDIVIDUAL_LOCK | Self::SIMULTANEOUS_UNLOCK)
    }
}

/// Intel/Sharp primary extended query table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntelPrimaryExtension {
    /// Major version (ASCII)
    pub major_version: u8,
    /// Minor version (ASCII)
    pub minor_version: u8,
    /// Optional feature support
    pub features: IntelFeatures,
    /// Functions supported after suspend
    pub suspend_cmd_support: u8,
    /// Block status register mask; bit 0 means lock bits are reported
    pub blk_status_reg_mask: u16,
    /// Optimal Vcc
    pub vcc_optimal: Voltage,
    /// Optimal Vpp
    pub vpp_optimal: Voltage,
    /// Number of protection register fields
    pub num_protection_fields: u8,
    /// Protection register address
    pub prot_reg_addr: u16,
    /// Factory pre-programmed protection bytes, as a power of two
    pub fact_prot_reg_size: u8,
    /// User programmable protection bytes, as a power of two
    pub user_prot_reg_size: u8,
}

impl fmt::Display for IntelPrimaryExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Intel primary algorithm extended information:")?;
        writeln!(
            f,
            "pri: 'PRI', version: {}.{}",
            self.major_version as char, self.minor_version as char
        )?;
        writeln!(
            f,
            "feature_support: 0x{:x}, suspend_cmd_support: 0x{:x}, blk_status_reg_mask: 0x{:x}",
            self.features.bits(),
            self.suspend_cmd_support,
            self.blk_status_reg_mask
        )?;
        writeln!(
            f,
            "Vcc opt: {}, Vpp opt: {}",
            self.vcc_optimal, self.vpp_optimal
        )?;
        writeln!(
            f,
            "protection_fields: {}, prot_reg_addr: 0x{:x}, factory pre-programmed: {}, user programmable: {}",
            self.num_protection_fields,
            self.prot_reg_addr,
            pow2(self.fact_prot_reg_size),
            pow2(self.user_prot_reg_size)
        )
    }
}

// ============================================================================
// AMD/Fujitsu extension
// ============================================================================

/// Default first unlock address (chip-relative word offset)
pub const AMD_UNLOCK1: u32 = 0x555;
/// Default second unlock address
pub const AMD_UNLOCK2: u32 = 0x2AA;

/// AMD/Fujitsu primary extended query table plus unlock addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmdPrimaryExtension {
    /// Major version (ASCII)
    pub major_version: u8,
    /// Minor version (ASCII)
    pub minor_version: u8,
    /// Address-sensitive unlock and silicon revision
    pub silicon_revision: u8,
    /// Erase suspend support
    pub erase_suspend: u8,
    /// Block protect group size
    pub blk_prot: u8,
    /// Temporary block unprotect support
    pub tmp_blk_unprotect: u8,
    /// Block protect/unprotect scheme
    pub blk_prot_unprot: u8,
    /// Simultaneous operation support
    pub simultaneous_ops: u8,
    /// Burst mode type
    pub burst_mode: u8,
    /// Page mode type
    pub page_mode: u8,
    /// Minimum acceleration supply
    pub vpp_min: Voltage,
    /// Maximum acceleration supply
    pub vpp_max: Voltage,
    /// Top/bottom boot block flag
    pub top_bottom: u8,
    /// First unlock cycle address
    pub unlock1: u32,
    /// Second unlock cycle address
    pub unlock2: u32,
}

impl AmdPrimaryExtension {
    /// Extension with every optional field zeroed
    pub const fn minimal(unlock1: u32, unlock2: u32) -> Self {
        Self {
            major_version: b'1',
            minor_version: b'0',
            silicon_revision: 0,
            erase_suspend: 0,
            blk_prot: 0,
            tmp_blk_unprotect: 0,
            blk_prot_unprot: 0,
            simultaneous_ops: 0,
            burst_mode: 0,
            page_mode: 0,
            vpp_min: Voltage(0),
            vpp_max: Voltage(0),
            top_bottom: 0,
            unlock1,
            unlock2,
        }
    }
}

impl fmt::Display for AmdPrimaryExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "AMD primary algorithm extended information:")?;
        writeln!(
            f,
            "pri: 'PRI', version: {}.{}",
            self.major_version as char, self.minor_version as char
        )?;
        writeln!(
            f,
            "silicon revision: 0x{:x}, erase suspend: 0x{:x}, block protect: 0x{:x}",
            self.silicon_revision, self.erase_suspend, self.blk_prot
        )?;
        writeln!(
            f,
            "temporary unprotect: 0x{:x}, protect scheme: 0x{:x}, simultaneous ops: 0x{:x}",
            self.tmp_blk_unprotect, self.blk_prot_unprot, self.simultaneous_ops
        )?;
        writeln!(
            f,
            "burst mode: 0x{:x}, page mode: 0x{:x}, Vpp min: {}, Vpp max: {}, top/bottom: 0x{:x}",
            self.burst_mode, self.page_mode, self.vpp_min, self.vpp_max, self.top_bottom
        )?;
        writeln!(
            f,
            "unlock addresses: 0x{:x}/0x{:x}",
            self.unlock1, self.unlock2
        )
    }
}

/// Parsed vendor extension table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryExtension {
    /// Intel/Sharp layout
    Intel(IntelPrimaryExtension),
    /// AMD/Fujitsu layout
    Amd(AmdPrimaryExtension),
}

// ============================================================================
// Identity
// ============================================================================

/// Configured bank size disagrees with the device size exponent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryMismatch {
    /// Size from the bank configuration
    pub configured: u32,
    /// `2^device_size_exponent`
    pub detected: u64,
}

impl fmt::Display for GeometryMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration specifies 0x{:x} size, but a 0x{:x} size flash was found",
            self.configured, self.detected
        )
    }
}

/// Everything identification found out about a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfiIdentity {
    /// Query signature, always `QRY` once identified
    pub qry: [u8; 3],
    /// Synthesized from the quirks table instead of read from the device
    pub not_cfi: bool,
    /// Primary command-set id
    pub pri_id: u16,
    /// Primary extended table address
    pub pri_addr: u16,
    /// Alternate command-set id
    pub alt_id: u16,
    /// Alternate extended table address
    pub alt_addr: u16,
    /// Minimum Vcc
    pub vcc_min: Voltage,
    /// Maximum Vcc
    pub vcc_max: Voltage,
    /// Minimum Vpp
    pub vpp_min: Voltage,
    /// Maximum Vpp
    pub vpp_max: Voltage,
    /// Timeout exponents
    pub timeouts: TimeoutExponents,
    /// Device size as a power of two
    pub dev_size_exp: u8,
    /// Interface description code
    pub interface_desc: u16,
    /// Maximum buffer write size as a power of two
    pub max_buf_write_size: u16,
    /// Erase regions in table order
    pub erase_regions: Vec<EraseRegion>,
    /// Vendor extension, if the command set has a parser
    pub extension: Option<PrimaryExtension>,
    /// Set when the bank configuration disagrees with the device size
    pub geometry_mismatch: Option<GeometryMismatch>,
}

impl CfiIdentity {
    /// Primary command set
    pub fn command_set(&self) -> CommandSet {
        CommandSet::from_id(self.pri_id)
    }

    /// Device size in bytes
    pub fn device_size(&self) -> u64 {
        pow2(self.dev_size_exp)
    }

    /// Intel/Sharp extension, if present
    pub fn intel_extension(&self) -> Option<&IntelPrimaryExtension> {
        match &self.extension {
            Some(PrimaryExtension::Intel(ext)) => Some(ext),
            _ => None,
        }
    }

    /// AMD/Fujitsu extension, if present
    pub fn amd_extension(&self) -> Option<&AmdPrimaryExtension> {
        match &self.extension {
            Some(PrimaryExtension::Amd(ext)) => Some(ext),
            _ => None,
        }
    }

    /// Compare against a configured bank size
    pub fn check_geometry(&mut self, configured: u32) {
        let detected = self.device_size();
        self.geometry_mismatch = if detected != configured as u64 {
            Some(GeometryMismatch {
                configured,
                detected,
            })
        } else {
            None
        };
    }

    /// Expand the erase regions into a sector list
    ///
    /// Sectors follow table order with strictly increasing offsets.
    pub fn sectors(&self) -> Vec<Sector> {
        let total: u32 = self.erase_regions.iter().map(|r| r.block_count()).sum();
        let mut sectors = Vec::with_capacity(total as usize);
        let mut offset = 0u32;
        for region in &self.erase_regions {
            let size = region.block_size();
            for _ in 0..region.block_count() {
                sectors.push(Sector::new(offset, size));
                offset = offset.wrapping_add(size);
            }
        }
        sectors
    }
}

impl fmt::Display for CfiIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CFI information:")?;
        if self.not_cfi {
            writeln!(f, "(synthesized, device is not CFI compliant)")?;
        }
        writeln!(
            f,
            "qry: '{}{}{}', pri_id: 0x{:04x}, pri_addr: 0x{:04x}, alt_id: 0x{:04x}, alt_addr: 0x{:04x}",
            self.qry[0] as char,
            self.qry[1] as char,
            self.qry[2] as char,
            self.pri_id,
            self.pri_addr,
            self.alt_id,
            self.alt_addr
        )?;
        writeln!(
            f,
            "Vcc min: {}, Vcc max: {}, Vpp min: {}, Vpp max: {}",
            self.vcc_min, self.vcc_max, self.vpp_min, self.vpp_max
        )?;
        let t = &self.timeouts;
        writeln!(
            f,
            "typ. word write timeout: {}, typ. buf write timeout: {}, typ. block erase timeout: {}, typ. chip erase timeout: {}",
            t.typical_units(TimedOperation::WordWrite),
            t.typical_units(TimedOperation::BufferWrite),
            t.typical_units(TimedOperation::BlockErase),
            t.typical_units(TimedOperation::ChipErase)
        )?;
        writeln!(
            f,
            "max. word write timeout: {}, max. buf write timeout: {}, max. block erase timeout: {}, max. chip erase timeout: {}",
            t.maximum_units(TimedOperation::WordWrite),
            t.maximum_units(TimedOperation::BufferWrite),
            t.maximum_units(TimedOperation::BlockErase),
            t.maximum_units(TimedOperation::ChipErase)
        )?;
        writeln!(
            f,
            "size: 0x{:x}, interface desc: {}, max buffer write size: 0x{:x}",
            self.device_size(),
            self.interface_desc,
            self.max_buf_write_size
        )?;
        for (i, region) in self.erase_regions.iter().enumerate() {
            writeln!(
                f,
                "erase region[{}]: {} blocks of size 0x{:x}",
                i,
                region.block_count(),
                region.block_size()
            )?;
        }
        match &self.extension {
            Some(PrimaryExtension::Intel(ext)) => write!(f, "\n{}", ext),
            Some(PrimaryExtension::Amd(ext)) => write!(f, "\n{}", ext),
            None => writeln!(f, "\nno extension table for {}", self.command_set()),
        }
    }
}
