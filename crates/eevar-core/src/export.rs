//! Bulk import and export of the device contents
//!
//! Binary exports cover the whole device user area and are meant for
//! offline backup and restore between devices of the same build. Text
//! exports list every variable as `NAME=value` for diagnostics only; they
//! are not read back.
//!
//! Device transfers move [`CHUNK_SIZE`] bytes at a time while holding the
//! store's device lock for the whole transfer. Files are written through a
//! temporary file and renamed into place.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tracing::info;

use crate::device::StorageDevice;
use crate::error::{StoreError, StoreResult};
use crate::schema::{self, SCHEMA};
use crate::store::Store;

/// Bytes moved per device transaction
pub const CHUNK_SIZE: usize = 64;

/// Bytes per hex dump line
const DUMP_LINE: usize = 16;

impl<D: StorageDevice> Store<D> {
    /// Copy the whole device user area to `path`
    ///
    /// The file is replaced only after the whole device has been read, so a
    /// failed export leaves any previous file at `path` untouched.
    pub fn save_binary(&self, path: &Path) -> StoreResult<()> {
        let image = self.read_device()?;
        atomic_write(path, &image)?;
        info!("Exported {} bytes to {:?}", image.len(), path);
        Ok(())
    }

    /// Write the contents of a binary export at `path` back onto the device
    ///
    /// The file must be exactly the device size; anything else is rejected
    /// before the device is written. The incoming bytes are not otherwise
    /// validated. Run [`Store::init`] afterwards to check them.
    pub fn load_binary(&self, path: &Path) -> StoreResult<()> {
        let image = fs::read(path).map_err(io_error(path))?;

        self.with_device(|device| {
            let capacity = device.capacity() as usize;
            if image.len() < capacity {
                return Err(StoreError::ShortTransfer {
                    path: path.to_path_buf(),
                    transferred: image.len(),
                    expected: capacity,
                });
            }
            if image.len() > capacity {
                return Err(StoreError::Oversized {
                    path: path.to_path_buf(),
                    size: image.len() as u64,
                    capacity,
                });
            }

            for (i, chunk) in image.chunks(CHUNK_SIZE).enumerate() {
                device.write_bytes((i * CHUNK_SIZE) as u16, chunk)?;
            }
            Ok(())
        })?;

        info!("Imported {} bytes from {:?}", image.len(), path);
        Ok(())
    }

    /// Render every variable as a `NAME=value` line
    ///
    /// IPv4 fields are shown as dotted quads.
    pub fn to_text(&self) -> StoreResult<String> {
        let blob = self.snapshot()?;
        let mut text = String::new();
        for (id, entry) in SCHEMA.iter().enumerate() {
            let id = id as u8;
            let value = blob.get(id)?;
            // Writing to a String cannot fail.
            let _ = writeln!(text, "{}={}", entry.name, schema::format_value(id, &value));
        }
        Ok(text)
    }

    /// Write the text rendering to `path`
    pub fn save_text(&self, path: &Path) -> StoreResult<()> {
        let text = self.to_text()?;
        atomic_write(path, text.as_bytes())?;
        info!("Exported variables as text to {:?}", path);
        Ok(())
    }

    /// Hex dump of the device user area
    ///
    /// Sixteen bytes per line, each line prefixed with its 4-digit offset.
    pub fn hex_dump(&self) -> StoreResult<String> {
        let bytes = self.read_device()?;

        let mut dump = String::with_capacity(bytes.len() * 3 + bytes.len() / DUMP_LINE * 5);
        for (i, line) in bytes.chunks(DUMP_LINE).enumerate() {
            let _ = write!(dump, "{:04x}", i * DUMP_LINE);
            for b in line {
                let _ = write!(dump, " {:02x}", b);
            }
            dump.push('\n');
        }
        Ok(dump)
    }

    /// Read the whole device user area in chunks under one lock
    fn read_device(&self) -> StoreResult<Vec<u8>> {
        self.with_device(|device| {
            let mut bytes = vec![0u8; device.capacity() as usize];
            for (i, chunk) in bytes.chunks_mut(CHUNK_SIZE).enumerate() {
                device.read_bytes((i * CHUNK_SIZE) as u16, chunk)?;
            }
            Ok(bytes)
        })
    }
}

/// Write data to a file atomically
///
/// Writes to a temporary file next to `path`, syncs it, then renames it over
/// `path`. Parent directories are created as needed.
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
    }

    let temp_path = path.with_extension("tmp");
    let result = File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        })
        .map_err(io_error(&temp_path))
        .and_then(|()| fs::rename(&temp_path, path).map_err(io_error(path)));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |e| StoreError::from_io(e, path)
}
