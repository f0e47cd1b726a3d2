//! Devices without a usable query table
//!
//! Some parts answer the manufacturer/device id command but not the CFI
//! query. For those, a static table supplies a synthesized identity so the
//! regular command-set state machines can drive them.

use super::types::*;
use crate::error::{Error, Result};
use alloc::vec;

/// SST manufacturer id
pub const MFR_SST: u8 = 0xBF;

/// Static description of a non-CFI device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quirk {
    /// Manufacturer id
    pub manufacturer: u8,
    /// Device id
    pub device: u16,
    /// Command set the device behaves like
    pub pri_id: u16,
    /// Device size as a power of two
    pub dev_size_exp: u8,
    /// Interface description code
    pub interface_desc: u16,
    /// Maximum buffer write size as a power of two
    pub max_buf_write_size: u16,
    /// The single erase region
    pub erase_region: EraseRegion,
    /// First unlock address
    pub unlock1: u32,
    /// Second unlock address
    pub unlock2: u32,
}

const fn sst(device: u16, dev_size_exp: u8, sectors: u32) -> Quirk {
    Quirk {
        manufacturer: MFR_SST,
        device,
        pri_id: 0x0002,
        dev_size_exp,
        interface_desc: 0,
        max_buf_write_size: 0,
        erase_region: EraseRegion::new(sectors, 4096),
        unlock1: 0x5555,
        unlock2: 0x2AAA,
    }
}

/// Known non-CFI devices
pub static QUIRKS: &[Quirk] = &[
    sst(0xD4, 0x10, 16),  // SST39xF512
    sst(0xD5, 0x11, 32),  // SST39xF010
    sst(0xD6, 0x12, 64),  // SST39xF020
    sst(0xD7, 0x13, 128), // SST39xF040
];

/// Find the table entry for a manufacturer/device pair
pub fn lookup(manufacturer: u8, device: u16) -> Option<&'static Quirk> {
    QUIRKS
        .iter()
        .find(|q| q.manufacturer == manufacturer && q.device == device)
}

/// Build an identity for a non-CFI device
///
/// Fails with `UnknownDevice` if the pair is not in the table and with
/// `UnsupportedCommandSet` if the entry asks for a command set that cannot
/// be synthesized.
pub fn apply_quirk(manufacturer: u8, device: u16) -> Result<CfiIdentity> {
    let quirk = lookup(manufacturer, device).ok_or(Error::UnknownDevice)?;
    synthesize(quirk)
}

/// Build an identity from a table entry
pub fn synthesize(quirk: &Quirk) -> Result<CfiIdentity> {
    let extension = match CommandSet::from_id(quirk.pri_id) {
        CommandSet::AmdFujitsu => {
            PrimaryExtension::Amd(AmdPrimaryExtension::minimal(quirk.unlock1, quirk.unlock2))
        }
        CommandSet::IntelSharp | CommandSet::Unsupported(_) => {
            log::error!(
                "non-CFI device 0x{:02x}/0x{:04x} with command set 0x{:04x} unsupported",
                quirk.manufacturer,
                quirk.device,
                quirk.pri_id
            );
            return Err(Error::UnsupportedCommandSet(quirk.pri_id));
        }
    };

    Ok(CfiIdentity {
        qry: QRY_SIGNATURE,
        not_cfi: true,
        pri_id: quirk.pri_id,
        pri_addr: 0,
        alt_id: 0,
        alt_addr: 0,
        vcc_min: Voltage(0),
        vcc_max: Voltage(0),
        vpp_min: Voltage(0),
        vpp_max: Voltage(0),
        timeouts: TimeoutExponents::default(),
        dev_size_exp: quirk.dev_size_exp,
        interface_desc: quirk.interface_desc,
        max_buf_write_size: quirk.max_buf_write_size,
        erase_regions: vec![quirk.erase_region],
        extension: Some(extension),
        geometry_mismatch: None,
    })
}
