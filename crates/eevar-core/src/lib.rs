//! eevar Core Library
//!
//! This crate provides a schema-driven persistent configuration store for
//! a printer controller's non-volatile memory chip.
//!
//! # Architecture
//!
//! - **Schema**: a static table of typed variables defines the blob layout
//! - **CRC32 trailer**: every write keeps the blob's checksum current
//! - **Migration**: startup validates the blob and upgrades or resets it
//!
//! All device access goes through one lock owned by the [`Store`].
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open(FileDevice::open(&config.image_path())?)?;
//!
//! // Read and write variables
//! store.try_set(var::ZOFFSET, Variant::f32(-0.8))?;
//! let offset = store.get(var::ZOFFSET).as_f32();
//!
//! // Diagnostics
//! println!("{}", store.to_text()?);
//! ```
//!
//! # Modules
//!
//! - `store`: Store handle (main entry point)
//! - `schema`: Variable table, defaults and address resolution
//! - `variant`: Tagged values and their byte encoding
//! - `blob`: In-memory image of the blob with field-wise access
//! - `crc`: CRC32 trailer
//! - `migration`: Startup integrity check and format migration
//! - `device`: Storage device trait with memory and file-backed devices
//! - `export`: Binary backup/restore, text export and hex dump
//! - `config`: Application configuration
//! - `error`: Typed device and store errors

pub mod blob;
pub mod config;
pub mod crc;
pub mod device;
pub mod error;
pub mod export;
pub mod migration;
pub mod schema;
pub mod store;
pub mod variant;

pub use blob::Blob;
pub use config::Config;
pub use device::{FileDevice, MemoryDevice, StorageDevice};
pub use error::{DeviceError, StoreError, StoreResult};
pub use migration::InitStatus;
pub use schema::var;
pub use store::Store;
pub use variant::{Kind, Variant};
