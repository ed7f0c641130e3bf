//! Startup integrity check, migration and defaulting
//!
//! Evaluated once per boot, with the store guard held:
//!
//! 1. Integrity check. A CRC mismatch resets the blob to defaults.
//! 2. The stored `(VERSION, FEATURES)` pair selects a [`Migration`]:
//!    nothing to do, a legacy layout conversion, or a generic conversion.
//! 3. A conversion that fails resets the blob to defaults.
//!
//! There is no persisted "migration done" flag: the VERSION, FEATURES and
//! CRC32 fields are the only state, so running this on a ready blob reads
//! the device and writes nothing. Every path that writes builds the full
//! new blob in memory and stores it with a single device write.

use tracing::{debug, info, warn};

use crate::blob::Blob;
use crate::crc;
use crate::device::StorageDevice;
use crate::error::StoreResult;
use crate::schema::{
    self, var, DATASIZE, EEPROM_ADDRESS, FEATURES, LAST_VERSION_WITHOUT_CRC, MAX_DATASIZE,
    MIN_DATASIZE, VERSION,
};
use crate::variant::Variant;

/// Outcome of the startup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    /// Stored blob was valid and current
    Normal,
    /// Stored blob was converted from an older layout
    Upgraded,
    /// Stored blob was replaced with defaults
    Defaulted,
}

/// Older on-device layouts that can be converted field by field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFormat {
    /// Layout of the Marlin-era firmware, VERSION 2, no CRC
    MarlinV2,
}

impl LegacyFormat {
    /// VERSION value that identifies this layout
    pub const fn version(self) -> u16 {
        match self {
            LegacyFormat::MarlinV2 => 2,
        }
    }

    fn from_version(version: u16) -> Option<Self> {
        [LegacyFormat::MarlinV2]
            .into_iter()
            .find(|format| format.version() == version)
    }
}

/// Conversion required for a stored blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Blob is in the current format
    None,
    /// Blob uses a known legacy layout
    Legacy(LegacyFormat),
    /// Blob uses another version or feature set of the schema
    Generic { version: u16, features: u16 },
}

/// Select the conversion for a stored `(version, features)` pair
pub fn select(version: u16, features: u16) -> Migration {
    if let Some(format) = LegacyFormat::from_version(version) {
        return Migration::Legacy(format);
    }
    if version != VERSION || features != FEATURES {
        return Migration::Generic { version, features };
    }
    Migration::None
}

/// Header fields that are read before the rest of the schema is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub features: u16,
    pub datasize: u16,
}

impl Header {
    const SIZE: usize = 6;

    /// Read the header at the blob base address
    pub fn read<D: StorageDevice + ?Sized>(device: &mut D) -> StoreResult<Self> {
        let mut raw = [0u8; Self::SIZE];
        device.read_bytes(EEPROM_ADDRESS, &mut raw)?;
        Ok(Self {
            version: u16::from_le_bytes([raw[0], raw[1]]),
            features: u16::from_le_bytes([raw[2], raw[3]]),
            datasize: u16::from_le_bytes([raw[4], raw[5]]),
        })
    }

    /// Whether this version predates the CRC trailer
    pub fn without_crc(&self) -> bool {
        self.version <= LAST_VERSION_WITHOUT_CRC
    }

    fn datasize_plausible(&self) -> bool {
        (MIN_DATASIZE..=MAX_DATASIZE).contains(&self.datasize)
            && (self.datasize as usize - crc::CRC_SIZE) % 4 == 0
    }
}

/// Check the stored blob against its CRC32 trailer
///
/// Versions without a CRC pass unconditionally. Otherwise the stored
/// DATASIZE bounds the checksummed range and must itself be plausible.
pub fn check_integrity<D: StorageDevice + ?Sized>(device: &mut D) -> StoreResult<bool> {
    let header = Header::read(device)?;
    if header.without_crc() {
        debug!("Version {} predates CRC, skipping check", header.version);
        return Ok(true);
    }
    if !header.datasize_plausible() {
        debug!("Implausible stored DATASIZE {}", header.datasize);
        return Ok(false);
    }

    let mut blob = vec![0u8; header.datasize as usize];
    device.read_bytes(EEPROM_ADDRESS, &mut blob)?;
    Ok(crc::verify_blob(&blob))
}

/// Write the compiled-in defaults over the whole blob
pub fn write_defaults<D: StorageDevice + ?Sized>(device: &mut D) -> StoreResult<()> {
    let blob = Blob::defaults();
    device.write_bytes(EEPROM_ADDRESS, blob.as_bytes())?;
    info!("Wrote default configuration ({} bytes)", DATASIZE);
    Ok(())
}

/// Run the startup sequence against `device`
pub fn run<D: StorageDevice + ?Sized>(device: &mut D) -> StoreResult<InitStatus> {
    if !check_integrity(device)? {
        warn!("Stored configuration failed integrity check, resetting to defaults");
        write_defaults(device)?;
        return Ok(InitStatus::Defaulted);
    }

    let header = Header::read(device)?;
    let converted = match select(header.version, header.features) {
        Migration::None => return Ok(InitStatus::Normal),
        Migration::Legacy(format) => convert_legacy(device, format)?,
        Migration::Generic { version, features } => convert_generic(version, features),
    };

    match converted {
        Some(blob) => {
            device.write_bytes(EEPROM_ADDRESS, blob.as_bytes())?;
            info!(
                "Upgraded configuration from version {} to {}",
                header.version, VERSION
            );
            Ok(InitStatus::Upgraded)
        }
        None => {
            warn!(
                "Could not convert configuration version {} (features {:#06x}), resetting to defaults",
                header.version, header.features
            );
            write_defaults(device)?;
            Ok(InitStatus::Defaulted)
        }
    }
}

/// Device addresses of the values recovered from the Marlin-era layout
mod marlin_v2 {
    use crate::schema::EEPROM_ADDRESS;

    pub const FILAMENT_TYPE: u16 = EEPROM_ADDRESS + 3;
    pub const ZOFFSET: u16 = 0x010E;
    pub const PID_NOZ: u16 = 0x017D;
    pub const PID_BED: u16 = 0x019D;

    /// Plausible range of a stored Z calibration offset
    pub const ZOFFSET_MIN: f32 = -2.0;
    pub const ZOFFSET_MAX: f32 = 0.0;
}

/// Build a current blob from a legacy layout
///
/// Returns `None` when the recovered calibration offset is implausible,
/// in which case nothing is carried over.
fn convert_legacy<D: StorageDevice + ?Sized>(
    device: &mut D,
    format: LegacyFormat,
) -> StoreResult<Option<Blob>> {
    match format {
        LegacyFormat::MarlinV2 => {
            let zoffset = read_f32s::<D, 1>(device, marlin_v2::ZOFFSET)?[0];
            if !(marlin_v2::ZOFFSET_MIN..=marlin_v2::ZOFFSET_MAX).contains(&zoffset) {
                warn!("Legacy Z offset {} out of range, not converting", zoffset);
                return Ok(None);
            }

            let mut filament_type = [0u8; 1];
            device.read_bytes(marlin_v2::FILAMENT_TYPE, &mut filament_type)?;
            let pid_noz = read_f32s::<D, 3>(device, marlin_v2::PID_NOZ)?;
            let pid_bed = read_f32s::<D, 3>(device, marlin_v2::PID_BED)?;

            let mut blob = Blob::defaults();
            blob.set(var::FILAMENT_TYPE, &Variant::u8(filament_type[0]))?;
            blob.set(var::ZOFFSET, &Variant::f32(zoffset))?;
            for (id, value) in [var::PID_NOZ_P, var::PID_NOZ_I, var::PID_NOZ_D]
                .into_iter()
                .zip(pid_noz)
            {
                blob.set(id, &Variant::f32(value))?;
            }
            for (id, value) in [var::PID_BED_P, var::PID_BED_I, var::PID_BED_D]
                .into_iter()
                .zip(pid_bed)
            {
                blob.set(id, &Variant::f32(value))?;
            }
            blob.seal();
            debug!(
                "Recovered legacy values: filament {}, z offset {}",
                filament_type[0], zoffset
            );
            Ok(Some(blob))
        }
    }
}

// TODO: field-by-field conversion between schema versions once a second
// CRC-carrying format ships; until then every mismatch falls back to defaults.
fn convert_generic(version: u16, features: u16) -> Option<Blob> {
    debug!(
        "No conversion from version {} features {:#06x} to version {} features {:#06x}",
        version,
        features,
        schema::VERSION,
        FEATURES
    );
    None
}

fn read_f32s<D: StorageDevice + ?Sized, const N: usize>(
    device: &mut D,
    address: u16,
) -> StoreResult<[f32; N]> {
    let mut raw = vec![0u8; N * 4];
    device.read_bytes(address, &mut raw)?;
    let mut values = [0f32; N];
    for (value, chunk) in values.iter_mut().zip(raw.chunks_exact(4)) {
        *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn legacy_device(zoffset: f32) -> MemoryDevice {
        let mut device = MemoryDevice::new();
        device.poke(EEPROM_ADDRESS, &2u16.to_le_bytes());
        device.poke(marlin_v2::FILAMENT_TYPE, &[2]);
        device.poke(marlin_v2::ZOFFSET, &zoffset.to_le_bytes());
        let pid: Vec<u8> = [8.5f32, 0.6, 40.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        device.poke(marlin_v2::PID_NOZ, &pid);
        let pid: Vec<u8> = [100.0f32, 1.0, 500.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        device.poke(marlin_v2::PID_BED, &pid);
        device
    }

    fn stored_blob(device: &MemoryDevice) -> Blob {
        Blob::from_bytes(device.peek(EEPROM_ADDRESS, DATASIZE as usize)).unwrap()
    }

    #[test]
    fn test_select() {
        assert_eq!(select(VERSION, FEATURES), Migration::None);
        assert_eq!(select(2, 0), Migration::Legacy(LegacyFormat::MarlinV2));
        assert_eq!(
            select(3, FEATURES),
            Migration::Generic {
                version: 3,
                features: FEATURES
            }
        );
        assert_eq!(
            select(VERSION, FEATURES & !schema::feature::CONNECT),
            Migration::Generic {
                version: VERSION,
                features: FEATURES & !schema::feature::CONNECT
            }
        );
    }

    #[test]
    fn test_erased_device_gets_defaults() {
        let mut device = MemoryDevice::new();
        assert!(!check_integrity(&mut device).unwrap());

        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
        let blob = stored_blob(&device);
        assert!(blob.is_sealed());
        assert_eq!(blob.get(var::VERSION).unwrap().as_u16(), Some(VERSION));
        assert!(check_integrity(&mut device).unwrap());
    }

    #[test]
    fn test_ready_blob_is_untouched() {
        let mut device = MemoryDevice::new();
        run(&mut device).unwrap();
        let writes = device.write_count();
        let before = device.contents().to_vec();

        assert_eq!(run(&mut device).unwrap(), InitStatus::Normal);
        assert_eq!(run(&mut device).unwrap(), InitStatus::Normal);
        assert_eq!(device.write_count(), writes);
        assert_eq!(device.contents(), &before[..]);
    }

    #[test]
    fn test_corrupted_blob_gets_defaults() {
        let mut device = MemoryDevice::new();
        run(&mut device).unwrap();
        let zoffset_addr = schema::address_of(var::ZOFFSET).unwrap();
        device.poke(zoffset_addr, &(-1.0f32).to_le_bytes());

        assert!(!check_integrity(&mut device).unwrap());
        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
        assert_eq!(
            stored_blob(&device).get(var::ZOFFSET).unwrap(),
            Variant::f32(0.0)
        );
    }

    #[test]
    fn test_implausible_datasize_fails_check() {
        let mut device = MemoryDevice::new();
        run(&mut device).unwrap();
        device.poke(EEPROM_ADDRESS + 4, &1000u16.to_le_bytes());
        assert!(!check_integrity(&mut device).unwrap());
    }

    #[test]
    fn test_legacy_conversion() {
        let mut device = legacy_device(-1.25);
        assert!(check_integrity(&mut device).unwrap());

        assert_eq!(run(&mut device).unwrap(), InitStatus::Upgraded);
        let blob = stored_blob(&device);
        assert!(blob.is_sealed());
        assert_eq!(blob.get(var::VERSION).unwrap().as_u16(), Some(VERSION));
        assert_eq!(blob.get(var::ZOFFSET).unwrap().as_f32(), Some(-1.25));
        assert_eq!(blob.get(var::FILAMENT_TYPE).unwrap().as_u8(), Some(2));
        assert_eq!(blob.get(var::PID_NOZ_P).unwrap().as_f32(), Some(8.5));
        assert_eq!(blob.get(var::PID_BED_D).unwrap().as_f32(), Some(500.0));
        assert_eq!(
            blob.get(var::LAN_HOSTNAME).unwrap().as_str().unwrap(),
            schema::DEFAULT_HOSTNAME
        );

        assert_eq!(run(&mut device).unwrap(), InitStatus::Normal);
    }

    #[test]
    fn test_legacy_conversion_aborts_on_bad_zoffset() {
        let mut device = legacy_device(5.0);

        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
        assert_eq!(stored_blob(&device), Blob::defaults());
    }

    #[test]
    fn test_legacy_conversion_rejects_nan() {
        let mut device = legacy_device(f32::NAN);
        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
    }

    #[test]
    fn test_other_version_gets_defaults() {
        let mut device = MemoryDevice::new();
        device.poke(EEPROM_ADDRESS, &3u16.to_le_bytes());

        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
        assert_eq!(stored_blob(&device), Blob::defaults());
    }

    #[test]
    fn test_feature_mismatch_gets_defaults() {
        let mut device = MemoryDevice::new();
        let mut blob = Blob::defaults();
        blob.set(var::FEATURES, &Variant::u16(schema::feature::LAN))
            .unwrap();
        blob.set(var::FILAMENT_TYPE, &Variant::u8(4)).unwrap();
        blob.seal();
        device.poke(EEPROM_ADDRESS, blob.as_bytes());

        assert_eq!(run(&mut device).unwrap(), InitStatus::Defaulted);
        assert_eq!(stored_blob(&device), Blob::defaults());
    }

    #[test]
    fn test_device_fault_aborts() {
        let mut device = MemoryDevice::new();
        device.inject_fault();
        assert!(run(&mut device).is_err());
    }
}
