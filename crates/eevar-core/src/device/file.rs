//! File-backed storage device
//!
//! Treats a chip image file as the storage device. A missing image is
//! created in the erased state. Every write is synced before returning, so
//! a completed write survives a crash of the host process.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{check_range, StorageDevice, DEVICE_SIZE, ERASED};
use crate::error::DeviceError;

/// Storage device backed by an image file of [`DEVICE_SIZE`] bytes
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: File,
}

impl FileDevice {
    /// Open the image at `path`, creating an erased one if it does not exist
    ///
    /// A shorter existing image is extended with erased bytes.
    pub fn open(path: &Path) -> Result<Self, DeviceError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len < DEVICE_SIZE as u64 {
            debug!("Extending device image {:?} from {} bytes", path, len);
            file.seek(SeekFrom::Start(len))?;
            let fill = vec![ERASED; DEVICE_SIZE as usize - len as usize];
            file.write_all(&fill)?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the backing image
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageDevice for FileDevice {
    fn capacity(&self) -> u16 {
        DEVICE_SIZE
    }

    fn read_bytes(&mut self, address: u16, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_range(address, buf.len(), DEVICE_SIZE)?;
        self.file.seek(SeekFrom::Start(address as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_bytes(&mut self, address: u16, data: &[u8]) -> Result<(), DeviceError> {
        check_range(address, data.len(), DEVICE_SIZE)?;
        self.file.seek(SeekFrom::Start(address as u64))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }
}
