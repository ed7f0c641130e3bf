//! Storage device abstraction
//!
//! The store talks to the chip through exactly two blocking operations:
//! read a byte range and write a byte range. Both either complete or fail;
//! there is no partial-write signaling.
//!
//! # Memory Layout
//!
//! ```text
//! [Legacy area]   0x0000 - 0x0500 (older firmware layouts)
//! [Blob]          0x0500 - 0x0500 + DATASIZE
//! [Unused]        up to 0x0800
//! ```

pub mod file;
pub mod memory;

pub use file::FileDevice;
pub use memory::MemoryDevice;

use crate::error::DeviceError;

/// Size of the user area of the storage chip
pub const DEVICE_SIZE: u16 = 0x0800;

/// Byte value of erased storage
pub const ERASED: u8 = 0xFF;

/// Byte-addressable non-volatile storage
///
/// Implementations must reject ranges that do not fit within
/// [`StorageDevice::capacity`] with [`DeviceError::OutOfBounds`].
pub trait StorageDevice: Send {
    /// Number of addressable bytes
    fn capacity(&self) -> u16;

    /// Read `buf.len()` bytes starting at `address`
    fn read_bytes(&mut self, address: u16, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Write `data` starting at `address`
    fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<(), DeviceError>;
}

/// Validate that `len` bytes at `address` fit on a device of `capacity` bytes
pub(crate) fn check_range(address: u16, len: usize, capacity: u16) -> Result<(), DeviceError> {
    if address as usize + len > capacity as usize {
        return Err(DeviceError::OutOfBounds {
            address,
            len,
            capacity,
        });
    }
    Ok(())
}
