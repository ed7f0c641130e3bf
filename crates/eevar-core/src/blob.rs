//! In-memory image of the persisted blob
//!
//! A [`Blob`] holds exactly [`DATASIZE`] bytes laid out by the schema table.
//! Fields are written one at a time through the codec, never by casting a
//! whole structure, so the layout depends only on [`SCHEMA`].

use crate::crc;
use crate::error::{StoreError, StoreResult};
use crate::schema::{self, DATASIZE, SCHEMA};
use crate::variant::{Kind, Variant};

/// Blob image of the current format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Vec<u8>,
}

impl Blob {
    /// A sealed blob with every field at its compiled-in default
    pub fn defaults() -> Self {
        let mut blob = Self {
            bytes: vec![0u8; DATASIZE as usize],
        };
        for id in 0..SCHEMA.len() as u8 {
            // Defaults always match their schema entry.
            let _ = blob.set(id, &schema::default_value(id));
        }
        blob.seal();
        blob
    }

    /// Wrap raw bytes read from the device
    pub fn from_bytes(bytes: Vec<u8>) -> StoreResult<Self> {
        if bytes.len() != DATASIZE as usize {
            return Err(StoreError::InvalidValue {
                kind: Kind::Bytes,
                value: format!("{} bytes", bytes.len()),
                details: format!("blob must be {} bytes", DATASIZE),
            });
        }
        Ok(Self { bytes })
    }

    /// Read field `id`
    pub fn get(&self, id: u8) -> StoreResult<Variant> {
        let entry = schema::entry(id).ok_or(StoreError::OutOfRange {
            id,
            len: SCHEMA.len(),
        })?;
        let range = field_range(id);
        Variant::decode(entry.kind, entry.count, &self.bytes[range])
    }

    /// Write field `id`; the trailer is left stale until [`Blob::seal`]
    pub fn set(&mut self, id: u8, value: &Variant) -> StoreResult<()> {
        let entry = schema::entry(id).ok_or(StoreError::OutOfRange {
            id,
            len: SCHEMA.len(),
        })?;
        if !entry.accepts(value) {
            return Err(StoreError::TypeMismatch {
                name: entry.name,
                expected: entry.kind,
                expected_count: entry.count,
                found: value.kind(),
                found_count: value.count(),
            });
        }
        let range = field_range(id);
        self.bytes[range].copy_from_slice(value.encode());
        Ok(())
    }

    /// Recompute the CRC32 trailer
    pub fn seal(&mut self) -> u32 {
        // DATASIZE always exceeds the trailer size.
        crc::seal_blob(&mut self.bytes).unwrap_or_default()
    }

    /// Whether the trailer matches the contents
    pub fn is_sealed(&self) -> bool {
        crc::verify_blob(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn field_range(id: u8) -> std::ops::Range<usize> {
    let start = schema::offset_of(id).unwrap_or(0) as usize;
    start..start + schema::size_of(id) as usize
}
