//! Store error handling
//!
//! Provides typed errors for device and store operations with descriptive
//! messages and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::variant::Kind;

/// Errors reported by a storage device
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Requested byte range does not fit on the device
    #[error("Address range {address:#06x}+{len} is outside the device (capacity {capacity:#06x})")]
    OutOfBounds {
        address: u16,
        len: usize,
        capacity: u16,
    },

    /// The device reported a bus or hardware fault
    #[error("Device fault at {address:#06x}: {details}")]
    Fault { address: u16, details: String },

    /// I/O error from a file-backed device image
    #[error("Device I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that can occur during store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Variable id is beyond the schema table
    #[error("Variable id {id} is out of range (schema has {len} entries)")]
    OutOfRange { id: u8, len: usize },

    /// Value kind/count disagrees with the schema entry
    #[error("Type mismatch for '{name}': schema is {expected:?}[{expected_count}], value is {found:?}[{found_count}]")]
    TypeMismatch {
        name: &'static str,
        expected: Kind,
        expected_count: u8,
        found: Kind,
        found_count: u8,
    },

    /// Variable is maintained by the store and cannot be written directly
    #[error("Variable '{name}' is managed by the store and cannot be set")]
    ReadOnly { name: &'static str },

    /// Text could not be parsed into a value of the requested kind
    #[error("Invalid value '{value}' for {kind:?}: {details}")]
    InvalidValue {
        kind: Kind,
        value: String,
        details: String,
    },

    /// Underlying device operation failed
    #[error("Storage device error: {0}")]
    Device(#[from] DeviceError),

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File not found (when expected to exist)
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Import/export stopped before the whole device range was transferred
    #[error("Short transfer on '{path}': {transferred} of {expected} bytes")]
    ShortTransfer {
        path: PathBuf,
        transferred: usize,
        expected: usize,
    },

    /// Import file holds more bytes than the device
    #[error("Image '{path}' is {size} bytes, larger than the {capacity}-byte device")]
    Oversized {
        path: PathBuf,
        size: u64,
        capacity: usize,
    },
}

impl StoreError {
    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind.
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StoreError::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => StoreError::NotFound { path },
            io::ErrorKind::UnexpectedEof => StoreError::ReadError {
                path,
                source: error,
            },
            _ => StoreError::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Check if this error is recoverable by the operator
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::PermissionDenied { .. }
                | StoreError::NotFound { .. }
                | StoreError::ShortTransfer { .. }
                | StoreError::Oversized { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::PermissionDenied { .. } => {
                Some("Check file and directory permissions.")
            }
            StoreError::NotFound { .. } => Some("Check the path and try again."),
            StoreError::ShortTransfer { .. } | StoreError::Oversized { .. } => {
                Some("The backup file does not match the device size. Use a complete binary export of the same device.")
            }
            StoreError::Device(_) => {
                Some("The storage device did not complete the operation. Retry, and check the device image or bus.")
            }
            _ => None,
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
