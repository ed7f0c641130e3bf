//! CRC32 trailer computation
//!
//! The trailer covers every blob byte before it. The covered range is a
//! whole number of 32-bit words, so the checksum is the IEEE CRC-32 of
//! those words in their on-device byte order.

use crc32fast::Hasher;

/// Size of the CRC trailer in bytes
pub const CRC_SIZE: usize = 4;

/// Compute the CRC32 of the bytes preceding the trailer
pub fn compute_crc(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Read the trailer stored at the end of `blob`
pub fn stored_crc(blob: &[u8]) -> Option<u32> {
    let start = blob.len().checked_sub(CRC_SIZE)?;
    let bytes: [u8; CRC_SIZE] = blob[start..].try_into().ok()?;
    Some(u32::from_le_bytes(bytes))
}

/// Check that the trailer of `blob` matches its contents
pub fn verify_blob(blob: &[u8]) -> bool {
    match stored_crc(blob) {
        Some(stored) => compute_crc(&blob[..blob.len() - CRC_SIZE]) == stored,
        None => false,
    }
}

/// Recompute and store the trailer of `blob` in place
///
/// Returns the new checksum, or `None` if the blob is too short to hold one.
pub fn seal_blob(blob: &mut [u8]) -> Option<u32> {
    let start = blob.len().checked_sub(CRC_SIZE)?;
    let crc = compute_crc(&blob[..start]);
    blob[start..].copy_from_slice(&crc.to_le_bytes());
    Some(crc)
}
