//! Configuration store
//!
//! The `Store` owns the storage device behind a single mutex, created with
//! the store. Every operation holds the lock from its first device access
//! to its last, so the read-recompute-write of the CRC trailer that follows
//! each field write can never interleave with another caller's write.
//!
//! Atomicity is per call. A caller that reads a field and writes it back
//! in two calls is not protected against another thread writing in between.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::open(FileDevice::open(&config.image_path())?)?;
//!
//! store.set(var::LAN_FLAG, Variant::u8(1));
//! let hostname = store.hostname();
//! ```

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::blob::Blob;
use crate::crc::{self, CRC_SIZE};
use crate::device::{StorageDevice, ERASED};
use crate::error::{StoreError, StoreResult};
use crate::migration::{self, InitStatus};
use crate::schema::{self, var, CONNECT_TOKEN_LEN, DATASIZE, EEPROM_ADDRESS, LAN_HOSTNAME_MAX_LEN};
use crate::variant::Variant;

/// Word size used when erasing the device
const CLEAR_WORD: usize = 4;

/// Persistent configuration store over a storage device
pub struct Store<D: StorageDevice> {
    device: Mutex<D>,
}

impl<D: StorageDevice> Store<D> {
    /// Wrap a device without touching it
    ///
    /// Call [`Store::init`] before relying on stored values.
    pub fn new(device: D) -> Self {
        Self {
            device: Mutex::new(device),
        }
    }

    /// Wrap a device and run the startup sequence
    pub fn open(device: D) -> StoreResult<Self> {
        let store = Self::new(device);
        store.init()?;
        Ok(store)
    }

    /// Run the startup integrity check and migration
    ///
    /// Safe to call on every boot; a ready blob is left untouched.
    pub fn init(&self) -> StoreResult<InitStatus> {
        let status = self.with_device(|device| migration::run(device))?;
        info!("Configuration store ready ({:?})", status);
        Ok(status)
    }

    /// Read variable `id`
    ///
    /// Fails with [`StoreError::OutOfRange`] without touching the device when
    /// `id` is not in the schema.
    pub fn try_get(&self, id: u8) -> StoreResult<Variant> {
        let entry = schema::entry(id).ok_or(StoreError::OutOfRange {
            id,
            len: schema::len(),
        })?;
        let address = schema::address_of(id).unwrap_or(EEPROM_ADDRESS);
        let mut raw = vec![0u8; entry.size() as usize];
        self.with_device(|device| {
            device.read_bytes(address, &mut raw)?;
            Ok(())
        })?;
        Variant::decode(entry.kind, entry.count, &raw)
    }

    /// Write variable `id` and refresh the CRC trailer
    ///
    /// The value must have exactly the schema entry's kind and count. The
    /// header fields and the CRC32 trailer are rejected with
    /// [`StoreError::ReadOnly`].
    pub fn try_set(&self, id: u8, value: Variant) -> StoreResult<()> {
        let entry = schema::entry(id).ok_or(StoreError::OutOfRange {
            id,
            len: schema::len(),
        })?;
        if schema::is_managed(id) {
            return Err(StoreError::ReadOnly { name: entry.name });
        }
        if !entry.accepts(&value) {
            return Err(StoreError::TypeMismatch {
                name: entry.name,
                expected: entry.kind,
                expected_count: entry.count,
                found: value.kind(),
                found_count: value.count(),
            });
        }
        let address = schema::address_of(id).unwrap_or(EEPROM_ADDRESS);

        self.with_device(|device| {
            device.write_bytes(address, value.encode())?;
            debug!("Wrote {} = {}", entry.name, schema::format_value(id, &value));
            update_crc(device)
        })
    }

    /// Read variable `id`, or the empty sentinel on any failure
    pub fn get(&self, id: u8) -> Variant {
        match self.try_get(id) {
            Ok(value) => value,
            Err(e) => {
                warn!("get({}) failed: {}", id, e);
                Variant::empty()
            }
        }
    }

    /// Write variable `id`, ignoring rejected ids and mismatched values
    pub fn set(&self, id: u8, value: Variant) {
        if let Err(e) = self.try_set(id, value) {
            warn!("set({}) ignored: {}", id, e);
        }
    }

    /// Read variable `id`, falling back to its compiled-in default
    pub fn get_or_default(&self, id: u8) -> Variant {
        self.try_get(id)
            .unwrap_or_else(|_| schema::default_value(id))
    }

    /// Reset the whole blob to compiled-in defaults
    pub fn defaults(&self) -> StoreResult<()> {
        self.with_device(|device| migration::write_defaults(device))
    }

    /// Fill the device user area with the erased pattern
    ///
    /// Bypasses the schema; the next [`Store::init`] writes defaults.
    pub fn clear(&self) -> StoreResult<()> {
        self.with_device(|device| {
            let word = [ERASED; CLEAR_WORD];
            let capacity = device.capacity() as usize;
            for address in (0..capacity).step_by(CLEAR_WORD) {
                let len = CLEAR_WORD.min(capacity - address);
                device.write_bytes(address as u16, &word[..len])?;
            }
            info!("Cleared {} bytes of storage", capacity);
            Ok(())
        })
    }

    /// Verify the stored blob against its CRC32 trailer
    pub fn check(&self) -> StoreResult<bool> {
        self.with_device(|device| migration::check_integrity(device))
    }

    /// Read the whole blob in one guarded transaction
    pub fn snapshot(&self) -> StoreResult<Blob> {
        let mut bytes = vec![0u8; DATASIZE as usize];
        self.with_device(|device| {
            device.read_bytes(EEPROM_ADDRESS, &mut bytes)?;
            Ok(())
        })?;
        Blob::from_bytes(bytes)
    }

    /// LAN hostname, empty on failure
    pub fn hostname(&self) -> String {
        self.get(var::LAN_HOSTNAME)
            .as_str()
            .map(|s| s.into_owned())
            .unwrap_or_default()
    }

    /// Store the LAN hostname, truncated to its field capacity
    pub fn set_hostname(&self, hostname: &str) -> StoreResult<()> {
        self.try_set(
            var::LAN_HOSTNAME,
            Variant::chars(LAN_HOSTNAME_MAX_LEN, hostname),
        )
    }

    /// Remote-service security token, empty on failure
    pub fn connect_token(&self) -> String {
        self.get(var::CONNECT_TOKEN)
            .as_str()
            .map(|s| s.into_owned())
            .unwrap_or_default()
    }

    /// Store the remote-service security token, truncated to its field capacity
    pub fn set_connect_token(&self, token: &str) -> StoreResult<()> {
        self.try_set(var::CONNECT_TOKEN, Variant::chars(CONNECT_TOKEN_LEN, token))
    }

    /// Run `f` with exclusive access to the device
    pub(crate) fn with_device<R>(
        &self,
        f: impl FnOnce(&mut D) -> StoreResult<R>,
    ) -> StoreResult<R> {
        let mut device = self.device.lock();
        f(&mut device)
    }

    /// Give back the device
    pub fn into_device(self) -> D {
        self.device.into_inner()
    }
}

/// Re-read the whole blob and rewrite its CRC32 trailer
fn update_crc<D: StorageDevice + ?Sized>(device: &mut D) -> StoreResult<()> {
    let mut blob = vec![0u8; DATASIZE as usize];
    device.read_bytes(EEPROM_ADDRESS, &mut blob)?;
    let crc = crc::compute_crc(&blob[..blob.len() - CRC_SIZE]);
    device.write_bytes(EEPROM_ADDRESS + DATASIZE - CRC_SIZE as u16, &crc.to_le_bytes())?;
    debug!("Updated CRC32 trailer to {:#010x}", crc);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryDevice, DEVICE_SIZE};
    use crate::schema::SCHEMA;
    use crate::variant::Kind;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;

    fn ready_store() -> Store<MemoryDevice> {
        Store::open(MemoryDevice::new()).unwrap()
    }

    /// A value of the right kind and count for `id` that differs from its default
    fn sample_value(id: u8) -> Variant {
        let entry = &SCHEMA[id as usize];
        match entry.kind {
            Kind::U8 => Variant::u8(0x5A),
            Kind::U16 => Variant::u16(0x1234),
            Kind::U32 => Variant::u32(0xDEADBEEF),
            Kind::F32 => Variant::f32(-1.5),
            Kind::Chars => Variant::chars(entry.count, "sample"),
            Kind::Bytes => Variant::bytes(entry.count, &[0xAB; 32]),
            _ => unreachable!("schema has no {:?} entries", entry.kind),
        }
    }

    #[test]
    fn test_fresh_device_defaults() {
        let store = Store::new(MemoryDevice::new());
        assert_eq!(store.init().unwrap(), InitStatus::Defaulted);
        assert_eq!(store.get(var::VERSION).as_u16(), Some(schema::VERSION));
        assert_eq!(store.hostname(), schema::DEFAULT_HOSTNAME);
        assert!(store.check().unwrap());
    }

    #[test]
    fn test_round_trip_every_field() {
        let store = ready_store();
        // The header and trailer are read-only.
        for id in (var::DATASIZE + 1)..var::CRC32 {
            let value = sample_value(id);
            store.try_set(id, value.clone()).unwrap();
            assert_eq!(store.try_get(id).unwrap(), value, "field {}", id);
        }
        assert!(store.check().unwrap());
    }

    #[test]
    fn test_type_guard() {
        let store = ready_store();
        let before = store.get(var::ZOFFSET);

        let err = store.try_set(var::ZOFFSET, Variant::u32(7)).unwrap_err();
        assert!(matches!(err, StoreError::TypeMismatch { .. }));

        store.set(var::ZOFFSET, Variant::i32(7));
        assert_eq!(store.get(var::ZOFFSET), before);
    }

    #[test]
    fn test_managed_fields_are_read_only() {
        let store = ready_store();
        let before = store.snapshot().unwrap();

        let err = store
            .try_set(var::DATASIZE, Variant::u16(DATASIZE - 4))
            .unwrap_err();
        assert!(matches!(err, StoreError::ReadOnly { name: "DATASIZE" }));

        store.set(var::VERSION, Variant::u16(2));
        store.set(var::FEATURES, Variant::u16(0));
        store.set(var::CRC32, Variant::u32(0));

        assert_eq!(store.snapshot().unwrap(), before);
        assert!(store.check().unwrap());
        assert_eq!(store.init().unwrap(), InitStatus::Normal);
    }

    #[test]
    fn test_count_guard() {
        let store = ready_store();
        store.set(var::LAN_HOSTNAME, Variant::chars(19, "short"));
        assert_eq!(store.hostname(), schema::DEFAULT_HOSTNAME);
    }

    #[test]
    fn test_crc_valid_after_writes() {
        let store = ready_store();
        store.set(var::FILAMENT_TYPE, Variant::u8(2));
        store.set(var::ZOFFSET, Variant::f32(-0.75));
        store.set(var::LAN_IP4_ADDR, Variant::ipv4(Ipv4Addr::new(10, 0, 0, 2)));
        store.set_hostname("printer").unwrap();
        assert!(store.check().unwrap());

        let blob = store.snapshot().unwrap();
        assert!(blob.is_sealed());
        assert_eq!(blob.get(var::ZOFFSET).unwrap().as_f32(), Some(-0.75));
    }

    #[test]
    fn test_hostname_padding() {
        let store = ready_store();
        store.try_set(var::LAN_HOSTNAME, Variant::chars(20, "host")).unwrap();

        let device = store.into_device();
        let address = schema::address_of(var::LAN_HOSTNAME).unwrap();
        let mut expected = b"host".to_vec();
        expected.extend_from_slice(&[0u8; 16]);
        assert_eq!(device.peek(address, 20), expected);

        let store = Store::new(device);
        assert_eq!(store.get(var::LAN_HOSTNAME).as_str().unwrap(), "host");
    }

    #[test]
    fn test_hostname_full_capacity() {
        let store = ready_store();
        store.set_hostname("abcdefghijklmnopqrstuvwxyz").unwrap();
        assert_eq!(store.hostname(), "abcdefghijklmnopqrst");
    }

    #[test]
    fn test_hostname_multibyte_truncation() {
        let store = ready_store();
        store.set_hostname(&format!("a{}", "é".repeat(10))).unwrap();
        assert_eq!(store.hostname(), format!("a{}", "é".repeat(9)));
    }

    #[test]
    fn test_connect_token() {
        let store = ready_store();
        assert_eq!(store.connect_token(), "");
        store.set_connect_token("s3cr3t-t0ken").unwrap();
        assert_eq!(store.connect_token(), "s3cr3t-t0ken");
    }

    #[test]
    fn test_out_of_range_touches_nothing() {
        let store = ready_store();
        let id = schema::len() as u8;

        let mut device = store.into_device();
        device.inject_fault();
        let store = Store::new(device);

        // An armed fault would trip on any device access.
        assert!(store.get(id).is_empty());
        assert!(matches!(
            store.try_get(id),
            Err(StoreError::OutOfRange { .. })
        ));
        store.set(id, Variant::u8(1));

        let device = store.into_device();
        let store = Store::new(device);
        assert!(store.try_get(var::VERSION).is_err());
    }

    #[test]
    fn test_get_or_default() {
        let store = ready_store();
        let mut device = store.into_device();
        device.inject_fault();
        let store = Store::new(device);
        assert_eq!(store.get_or_default(var::CONNECT_PORT), Variant::u16(80));
    }

    #[test]
    fn test_device_failure_aborts_set() {
        let store = ready_store();
        let mut device = store.into_device();
        device.inject_fault();
        let store = Store::new(device);

        let err = store.try_set(var::LAN_FLAG, Variant::u8(1)).unwrap_err();
        assert!(matches!(err, StoreError::Device(_)));
        assert!(store.check().unwrap());
    }

    #[test]
    fn test_defaults_resets() {
        let store = ready_store();
        store.set(var::FILAMENT_TYPE, Variant::u8(3));
        store.defaults().unwrap();
        assert_eq!(store.get(var::FILAMENT_TYPE).as_u8(), Some(0));
        assert_eq!(store.snapshot().unwrap(), Blob::defaults());
    }

    #[test]
    fn test_clear_erases_everything() {
        let store = ready_store();
        store.clear().unwrap();
        assert!(!store.check().unwrap());

        let device = store.into_device();
        assert_eq!(device.contents().len(), DEVICE_SIZE as usize);
        assert!(device.contents().iter().all(|&b| b == ERASED));

        let store = Store::new(device);
        assert_eq!(store.init().unwrap(), InitStatus::Defaulted);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let device = ready_store().into_device();
        let writes = device.write_count();
        let before = device.contents().to_vec();

        let store = Store::new(device);
        assert_eq!(store.init().unwrap(), InitStatus::Normal);
        assert_eq!(store.init().unwrap(), InitStatus::Normal);

        let device = store.into_device();
        assert_eq!(device.write_count(), writes);
        assert_eq!(device.contents(), &before[..]);
    }

    #[test]
    fn test_concurrent_sets_keep_crc_valid() {
        let store = Arc::new(ready_store());

        let handles: Vec<_> = [
            (var::LAN_IP4_ADDR, Variant::ipv4(Ipv4Addr::new(192, 168, 1, 50))),
            (var::CONNECT_PORT, Variant::u16(8080)),
        ]
        .into_iter()
        .map(|(id, value)| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..50 {
                    store.try_set(id, value.clone()).unwrap();
                }
            })
        })
        .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(store.check().unwrap());
        assert_eq!(
            store.get(var::LAN_IP4_ADDR).as_ipv4(),
            Some(Ipv4Addr::new(192, 168, 1, 50))
        );
        assert_eq!(store.get(var::CONNECT_PORT).as_u16(), Some(8080));
    }
}
