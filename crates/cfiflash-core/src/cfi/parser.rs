//! CFI identification
//!
//! Reads the query table and the vendor extension table of a bank.

use super::command::{self, opcodes, QUERY_OFFSET};
use super::types::*;
use crate::error::{Error, Result};
use crate::flash::FlashBank;
use crate::target::Target;
use alloc::vec::Vec;
use maybe_async::maybe_async;

// Query table offsets (chip-relative words)
const QRY_OFFSET: u32 = 0x10;
const PRI_ID_OFFSET: u32 = 0x13;
const PRI_ADDR_OFFSET: u32 = 0x15;
const ALT_ID_OFFSET: u32 = 0x17;
const ALT_ADDR_OFFSET: u32 = 0x19;
const VOLTAGE_OFFSET: u32 = 0x1B;
const TIMEOUT_TYP_OFFSET: u32 = 0x1F;
const TIMEOUT_MAX_OFFSET: u32 = 0x23;
const DEV_SIZE_OFFSET: u32 = 0x27;
const INTERFACE_OFFSET: u32 = 0x28;
const MAX_BUF_OFFSET: u32 = 0x2A;
const NUM_REGIONS_OFFSET: u32 = 0x2C;
const REGIONS_OFFSET: u32 = 0x2D;

/// Identify the device behind `bank`
///
/// Enters query mode, validates the `QRY` signature, reads the geometry and
/// timing tables and parses the vendor extension of the primary command set.
/// The device is returned to read-array mode whatever the outcome.
///
/// A command set without an extension parser is not an error here; the
/// identity simply carries no extension and later operations report
/// `UnsupportedCommandSet`.
#[maybe_async]
pub async fn probe<T: Target + ?Sized>(target: &mut T, bank: &FlashBank) -> Result<CfiIdentity> {
    command::send_at(target, bank, opcodes::QUERY, QUERY_OFFSET).await?;
    let result = read_identity(target, bank).await;
    command::read_array(target, bank).await?;

    let mut identity = result?;
    identity.check_geometry(bank.size());
    if let Some(mismatch) = &identity.geometry_mismatch {
        log::warn!("{}", mismatch);
    }
    Ok(identity)
}

#[maybe_async]
async fn read_identity<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
) -> Result<CfiIdentity> {
    let mut qry = [0u8; 3];
    for (i, b) in qry.iter_mut().enumerate() {
        *b = command::query_u8(target, bank, 0, QRY_OFFSET + i as u32).await?;
    }
    if qry != QRY_SIGNATURE {
        log::debug!(
            "CFI signature invalid: {:02X} {:02X} {:02X}",
            qry[0],
            qry[1],
            qry[2]
        );
        return Err(Error::NotCfiCompliant);
    }

    let pri_id = command::query_u16(target, bank, 0, PRI_ID_OFFSET).await?;
    let pri_addr = command::query_u16(target, bank, 0, PRI_ADDR_OFFSET).await?;
    let alt_id = command::query_u16(target, bank, 0, ALT_ID_OFFSET).await?;
    let alt_addr = command::query_u16(target, bank, 0, ALT_ADDR_OFFSET).await?;

    log::debug!(
        "qry: 'QRY', pri_id: 0x{:04x}, pri_addr: 0x{:04x}, alt_id: 0x{:04x}, alt_addr: 0x{:04x}",
        pri_id,
        pri_addr,
        alt_id,
        alt_addr
    );

    let mut voltages = [0u8; 4];
    for (i, v) in voltages.iter_mut().enumerate() {
        *v = command::query_u8(target, bank, 0, VOLTAGE_OFFSET + i as u32).await?;
    }

    let mut timeouts = TimeoutExponents::default();
    for i in 0..4 {
        timeouts.typical[i] =
            command::query_u8(target, bank, 0, TIMEOUT_TYP_OFFSET + i as u32).await?;
        timeouts.maximum[i] =
            command::query_u8(target, bank, 0, TIMEOUT_MAX_OFFSET + i as u32).await?;
    }

    let dev_size_exp = command::query_u8(target, bank, 0, DEV_SIZE_OFFSET).await?;
    let interface_desc = command::query_u16(target, bank, 0, INTERFACE_OFFSET).await?;
    let max_buf_write_size = command::query_u16(target, bank, 0, MAX_BUF_OFFSET).await?;
    let num_regions = command::query_u8(target, bank, 0, NUM_REGIONS_OFFSET).await?;

    log::debug!(
        "size exponent: {}, interface desc: {}, max buffer write size: 0x{:x}, erase regions: {}",
        dev_size_exp,
        interface_desc,
        max_buf_write_size,
        num_regions
    );

    let mut erase_regions = Vec::with_capacity(num_regions as usize);
    for i in 0..num_regions as u32 {
        let raw = command::query_u32(target, bank, 0, REGIONS_OFFSET + 4 * i).await?;
        let region = EraseRegion(raw);
        log::debug!(
            "erase region[{}]: {} blocks of size 0x{:x}",
            i,
            region.block_count(),
            region.block_size()
        );
        erase_regions.push(region);
    }

    let extension = match CommandSet::from_id(pri_id) {
        CommandSet::IntelSharp => Some(PrimaryExtension::Intel(
            read_intel_extension(target, bank, pri_addr as u32).await?,
        )),
        CommandSet::AmdFujitsu => Some(PrimaryExtension::Amd(
            read_amd_extension(target, bank, pri_addr as u32).await?,
        )),
        CommandSet::Unsupported(id) => {
            log::error!("CFI primary command set 0x{:04x} unsupported", id);
            None
        }
    };

    Ok(CfiIdentity {
        qry,
        not_cfi: false,
        pri_id,
        pri_addr,
        alt_id,
        alt_addr,
        vcc_min: Voltage(voltages[0]),
        vcc_max: Voltage(voltages[1]),
        vpp_min: Voltage(voltages[2]),
        vpp_max: Voltage(voltages[3]),
        timeouts,
        dev_size_exp,
        interface_desc,
        max_buf_write_size,
        erase_regions,
        extension,
        geometry_mismatch: None,
    })
}

/// Check the `PRI` signature and return the version bytes
#[maybe_async]
async fn read_extension_header<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    base: u32,
) -> Result<(u8, u8)> {
    let mut pri = [0u8; 3];
    for (i, b) in pri.iter_mut().enumerate() {
        *b = command::query_u8(target, bank, 0, base + i as u32).await?;
    }
    if pri != PRI_SIGNATURE {
        log::debug!(
            "extended query signature invalid at 0x{:x}: {:02X} {:02X} {:02X}",
            base,
            pri[0],
            pri[1],
            pri[2]
        );
        return Err(Error::NotCfiCompliant);
    }
    let major = command::query_u8(target, bank, 0, base + 3).await?;
    let minor = command::query_u8(target, bank, 0, base + 4).await?;
    log::debug!("pri: 'PRI', version: {}.{}", major as char, minor as char);
    Ok((major, minor))
}

#[maybe_async]
async fn read_intel_extension<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    base: u32,
) -> Result<IntelPrimaryExtension> {
    let (major_version, minor_version) = read_extension_header(target, bank, base).await?;

    let features = command::query_u32(target, bank, 0, base + 0x05).await?;
    let suspend_cmd_support = command::query_u8(target, bank, 0, base + 0x09).await?;
    let blk_status_reg_mask = command::query_u16(target, bank, 0, base + 0x0A).await?;
    log::debug!(
        "feature_support: 0x{:x}, suspend_cmd_support: 0x{:x}, blk_status_reg_mask: 0x{:x}",
        features,
        suspend_cmd_support,
        blk_status_reg_mask
    );

    let vcc_optimal = Voltage(command::query_u8(target, bank, 0, base + 0x0C).await?);
    let vpp_optimal = Voltage(command::query_u8(target, bank, 0, base + 0x0D).await?);

    let num_protection_fields = command::query_u8(target, bank, 0, base + 0x0E).await?;
    if num_protection_fields != 1 {
        log::warn!(
            "expected one protection register field, but found {}",
            num_protection_fields
        );
    }
    let prot_reg_addr = command::query_u16(target, bank, 0, base + 0x0F).await?;
    let fact_prot_reg_size = command::query_u8(target, bank, 0, base + 0x11).await?;
    let user_prot_reg_size = command::query_u8(target, bank, 0, base + 0x12).await?;

    Ok(IntelPrimaryExtension {
        major_version,
        minor_version,
        features: IntelFeatures::from_bits_retain(features),
        suspend_cmd_support,
        blk_status_reg_mask,
        vcc_optimal,
        vpp_optimal,
        num_protection_fields,
        prot_reg_addr,
        fact_prot_reg_size,
        user_prot_reg_size,
    })
}

#[maybe_async]
async fn read_amd_extension<T: Target + ?Sized>(
    target: &mut T,
    bank: &FlashBank,
    base: u32,
) -> Result<AmdPrimaryExtension> {
    let (major_version, minor_version) = read_extension_header(target, bank, base).await?;

    let mut fields = [0u8; 11];
    for (i, f) in fields.iter_mut().enumerate() {
        *f = command::query_u8(target, bank, 0, base + 0x05 + i as u32).await?;
    }

    let ext = AmdPrimaryExtension {
        major_version,
        minor_version,
        silicon_revision: fields[0],
        erase_suspend: fields[1],
        blk_prot: fields[2],
        tmp_blk_unprotect: fields[3],
        blk_prot_unprot: fields[4],
        simultaneous_ops: fields[5],
        burst_mode: fields[6],
        page_mode: fields[7],
        vpp_min: Voltage(fields[8]),
        vpp_max: Voltage(fields[9]),
        top_bottom: fields[10],
        unlock1: AMD_UNLOCK1,
        unlock2: AMD_UNLOCK2,
    };
    log::debug!(
        "silicon revision: 0x{:x}, erase suspend: 0x{:x}, top/bottom: 0x{:x}",
        ext.silicon_revision,
        ext.erase_suspend,
        ext.top_bottom
    );
    Ok(ext)
}

#[cfg(all(test, feature = "is_sync"))]
mod tests {
    use super::super::mock::{intel_query_table, MockTarget, Mode};
    use super::*;
    use crate::flash::BankConfig;
    use crate::target::Endianness;

    fn bank(size: u32, chip_width: u8, bus_width: u8) -> FlashBank {
        FlashBank::new(BankConfig::new(0, size, chip_width, bus_width)).unwrap()
    }

    #[test]
    fn test_probe_single_region() {
        let mut target = MockTarget::new(2, 2, intel_query_table(16, &[0x0010_000F], 0x20));
        let bank = bank(0x10000, 2, 2);

        let id = probe(&mut target, &bank).unwrap();
        assert_eq!(id.qry, *b"QRY");
        assert_eq!(id.command_set(), CommandSet::IntelSharp);
        assert_eq!(id.device_size(), 0x10000);
        assert!(id.geometry_mismatch.is_none());

        let sectors = id.sectors();
        assert_eq!(sectors.len(), 16);
        for (i, s) in sectors.iter().enumerate() {
            assert_eq!(s.offset, i as u32 * 4096);
            assert_eq!(s.size, 4096);
        }

        let ext = id.intel_extension().unwrap();
        assert!(ext.features.contains(IntelFeatures::INDIVIDUAL_LOCK));
        assert_eq!(ext.blk_status_reg_mask, 1);
        assert_eq!(ext.prot_reg_addr, 0x80);

        // query entry at word 0x55, then back to read-array
        assert_eq!(target.writes.first(), Some(&(0xAA, 0x98)));
        let n = target.writes.len();
        assert_eq!(&target.writes[n - 2..], &[(0, 0xF0), (0, 0xFF)]);
        assert_eq!(target.mode, Mode::Array);
    }

    #[test]
    fn test_probe_rejects_missing_signature() {
        let mut table = intel_query_table(16, &[0x0010_000F], 0);
        table[0x12] = b'X';
        let mut target = MockTarget::new(2, 2, table);

        assert_eq!(
            probe(&mut target, &bank(0x10000, 2, 2)),
            Err(Error::NotCfiCompliant)
        );
        assert_eq!(target.mode, Mode::Array);
    }

    #[test]
    fn test_probe_rejects_bad_extension() {
        let mut table = intel_query_table(16, &[0x0010_000F], 0);
        table[0x31] = b'X';
        let mut target = MockTarget::new(2, 2, table);

        assert_eq!(
            probe(&mut target, &bank(0x10000, 2, 2)),
            Err(Error::NotCfiCompliant)
        );
        assert_eq!(target.mode, Mode::Array);
    }

    #[test]
    fn test_probe_is_idempotent() {
        let table = intel_query_table(21, &[0x0020_0007, 0x0100_001E], 0x28);
        let mut target = MockTarget::new(2, 2, table);
        let bank = bank(0x20_0000, 2, 2);

        let first = probe(&mut target, &bank).unwrap();
        let second = probe(&mut target, &bank).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.sectors(), second.sectors());
    }

    #[test]
    fn test_geometry_mismatch_is_not_fatal() {
        let mut target = MockTarget::new(2, 2, intel_query_table(16, &[0x0010_000F], 0));
        let id = probe(&mut target, &bank(0x20000, 2, 2)).unwrap();
        let mismatch = id.geometry_mismatch.unwrap();
        assert_eq!(mismatch.configured, 0x20000);
        assert_eq!(mismatch.detected, 0x10000);
    }

    #[test]
    fn test_unsupported_command_set_has_no_extension() {
        let mut table = intel_query_table(16, &[0x0010_000F], 0);
        table[0x13] = 0x04;
        let mut target = MockTarget::new(2, 2, table);

        let id = probe(&mut target, &bank(0x10000, 2, 2)).unwrap();
        assert_eq!(id.command_set(), CommandSet::Unsupported(4));
        assert!(id.extension.is_none());
    }

    #[test]
    fn test_probe_two_chips_big_endian() {
        // two x8 chips on a 16-bit bus
        let mut target = MockTarget::new(1, 2, intel_query_table(16, &[0x0010_000F], 0));
        target.endianness = Endianness::Big;

        let id = probe(&mut target, &bank(0x10000, 1, 2)).unwrap();
        assert_eq!(id.sectors().len(), 16);
        assert_eq!(target.writes.first(), Some(&(0xAA, 0x9898)));
    }
}
