//! In-memory storage device
//!
//! Models the storage chip in RAM for tests and tooling. Supports:
//! - Write counting, to verify that an operation did not touch the device
//! - Raw peek/poke for preparing legacy or corrupted images
//! - One-shot fault injection for exercising device failure paths

use super::{check_range, StorageDevice, DEVICE_SIZE, ERASED};
use crate::error::DeviceError;

/// In-memory storage chip, initially erased
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    storage: Vec<u8>,
    writes: usize,
    fail_next: bool,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    /// Create an erased device of [`DEVICE_SIZE`] bytes
    pub fn new() -> Self {
        Self {
            storage: vec![ERASED; DEVICE_SIZE as usize],
            writes: 0,
            fail_next: false,
        }
    }

    /// Create a device from an existing image
    ///
    /// The image is truncated or padded with erased bytes to [`DEVICE_SIZE`].
    pub fn from_image(image: &[u8]) -> Self {
        let mut device = Self::new();
        let len = image.len().min(device.storage.len());
        device.storage[..len].copy_from_slice(&image[..len]);
        device
    }

    /// Whole device contents
    pub fn contents(&self) -> &[u8] {
        &self.storage
    }

    /// Copy of `len` bytes at `address`, bypassing write accounting
    pub fn peek(&self, address: u16, len: usize) -> Vec<u8> {
        let start = address as usize;
        self.storage[start..start + len].to_vec()
    }

    /// Overwrite bytes at `address`, bypassing write accounting
    pub fn poke(&mut self, address: u16, data: &[u8]) {
        let start = address as usize;
        self.storage[start..start + data.len()].copy_from_slice(data);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Make the next read or write fail with a device fault
    pub fn inject_fault(&mut self) {
        self.fail_next = true;
    }

    fn take_fault(&mut self, address: u16) -> Result<(), DeviceError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(DeviceError::Fault {
                address,
                details: "injected fault".to_string(),
            });
        }
        Ok(())
    }
}

impl StorageDevice for MemoryDevice {
    fn capacity(&self) -> u16 {
        DEVICE_SIZE
    }

    fn read_bytes(&mut self, address: u16, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_range(address, buf.len(), DEVICE_SIZE)?;
        self.take_fault(address)?;
        let start = address as usize;
        buf.copy_from_slice(&self.storage[start..start + buf.len()]);
        Ok(())
    }

    fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        check_range(address, data.len(), DEVICE_SIZE)?;
        self.take_fault(address)?;
        let start = address as usize;
        self.storage[start..start + data.len()].copy_from_slice(data);
        self.writes += 1;
        Ok(())
    }
}
