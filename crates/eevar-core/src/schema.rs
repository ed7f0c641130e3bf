//! Schema table and address resolution
//!
//! The schema is the on-device layout contract. Every variable is a
//! `(kind, count)` entry in a fixed, ordered table; its byte offset is the
//! sum of the sizes of every entry before it, with no padding between
//! entries. Changing the table requires bumping [`VERSION`].
//!
//! ```text
//! offset 0:       VERSION   (u16)
//! offset 2:       FEATURES  (u16)
//! offset 4:       DATASIZE  (u16)
//! ...             remaining entries in table order
//! offset N-4:     CRC32     (u32, over bytes [0, N-4))
//! ```

use std::net::Ipv4Addr;

use crate::error::{StoreError, StoreResult};
use crate::variant::{Kind, Variant};

/// Device address of the first byte of the blob
pub const EEPROM_ADDRESS: u16 = 0x0500;

/// Current format version
pub const VERSION: u16 = 4;

/// Newest format version written without a CRC trailer
pub const LAST_VERSION_WITHOUT_CRC: u16 = 3;

/// Upper bound for a stored DATASIZE to be considered plausible
pub const MAX_DATASIZE: u16 = 256;

/// Smallest stored DATASIZE that can hold the header and the trailer
pub const MIN_DATASIZE: u16 = 10;

/// Capacity of the LAN hostname field
pub const LAN_HOSTNAME_MAX_LEN: u8 = 20;

/// Capacity of the remote-service security token field
pub const CONNECT_TOKEN_LEN: u8 = 20;

/// Hostname written by a reset to defaults
pub const DEFAULT_HOSTNAME: &str = "MINI";

/// Feature bits recorded in the FEATURES field
pub mod feature {
    pub const PID_NOZ: u16 = 0x0001;
    pub const PID_BED: u16 = 0x0002;
    pub const LAN: u16 = 0x0004;
    pub const CONNECT: u16 = 0x0008;
}

/// Feature mask of the current format
pub const FEATURES: u16 = feature::PID_NOZ | feature::PID_BED | feature::LAN | feature::CONNECT;

/// Variable ids, indexes into [`SCHEMA`]
pub mod var {
    pub const VERSION: u8 = 0;
    pub const FEATURES: u8 = 1;
    pub const DATASIZE: u8 = 2;
    pub const FILAMENT_TYPE: u8 = 3;
    pub const FILAMENT_COLOR: u8 = 4;
    pub const RUN_SELFTEST: u8 = 5;
    pub const RUN_XYZCALIB: u8 = 6;
    pub const RUN_FIRSTLAY: u8 = 7;
    pub const FSENSOR_ENABLED: u8 = 8;
    pub const ZOFFSET: u8 = 9;
    pub const PID_NOZ_P: u8 = 10;
    pub const PID_NOZ_I: u8 = 11;
    pub const PID_NOZ_D: u8 = 12;
    pub const PID_BED_P: u8 = 13;
    pub const PID_BED_I: u8 = 14;
    pub const PID_BED_D: u8 = 15;
    pub const LAN_FLAG: u8 = 16;
    pub const LAN_IP4_ADDR: u8 = 17;
    pub const LAN_IP4_MSK: u8 = 18;
    pub const LAN_IP4_GW: u8 = 19;
    pub const LAN_IP4_DNS1: u8 = 20;
    pub const LAN_IP4_DNS2: u8 = 21;
    pub const LAN_HOSTNAME: u8 = 22;
    pub const CONNECT_IP4: u8 = 23;
    pub const CONNECT_PORT: u8 = 24;
    pub const CONNECT_TOKEN: u8 = 25;
    pub const PADDING: u8 = 26;
    pub const CRC32: u8 = 27;
}

/// One variable of the on-device layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaEntry {
    pub name: &'static str,
    pub kind: Kind,
    pub count: u8,
}

impl SchemaEntry {
    const fn new(name: &'static str, kind: Kind, count: u8) -> Self {
        Self { name, kind, count }
    }

    /// Size of this entry in bytes
    pub const fn size(&self) -> u16 {
        self.kind.size() as u16 * self.count as u16
    }

    /// Whether `value` has exactly this entry's kind and count
    pub fn accepts(&self, value: &Variant) -> bool {
        value.kind() == self.kind && value.count() == self.count
    }
}

/// The layout table, in on-device order
pub const SCHEMA: &[SchemaEntry] = &[
    SchemaEntry::new("VERSION", Kind::U16, 1),
    SchemaEntry::new("FEATURES", Kind::U16, 1),
    SchemaEntry::new("DATASIZE", Kind::U16, 1),
    SchemaEntry::new("FILAMENT_TYPE", Kind::U8, 1),
    SchemaEntry::new("FILAMENT_COLOR", Kind::U32, 1),
    SchemaEntry::new("RUN_SELFTEST", Kind::U8, 1),
    SchemaEntry::new("RUN_XYZCALIB", Kind::U8, 1),
    SchemaEntry::new("RUN_FIRSTLAY", Kind::U8, 1),
    SchemaEntry::new("FSENSOR_ENABLED", Kind::U8, 1),
    SchemaEntry::new("ZOFFSET", Kind::F32, 1),
    SchemaEntry::new("PID_NOZ_P", Kind::F32, 1),
    SchemaEntry::new("PID_NOZ_I", Kind::F32, 1),
    SchemaEntry::new("PID_NOZ_D", Kind::F32, 1),
    SchemaEntry::new("PID_BED_P", Kind::F32, 1),
    SchemaEntry::new("PID_BED_I", Kind::F32, 1),
    SchemaEntry::new("PID_BED_D", Kind::F32, 1),
    SchemaEntry::new("LAN_FLAG", Kind::U8, 1),
    SchemaEntry::new("LAN_IP4_ADDR", Kind::U32, 1),
    SchemaEntry::new("LAN_IP4_MSK", Kind::U32, 1),
    SchemaEntry::new("LAN_IP4_GW", Kind::U32, 1),
    SchemaEntry::new("LAN_IP4_DNS1", Kind::U32, 1),
    SchemaEntry::new("LAN_IP4_DNS2", Kind::U32, 1),
    SchemaEntry::new("LAN_HOSTNAME", Kind::Chars, LAN_HOSTNAME_MAX_LEN),
    SchemaEntry::new("CONNECT_IP4", Kind::U32, 1),
    SchemaEntry::new("CONNECT_PORT", Kind::U16, 1),
    SchemaEntry::new("CONNECT_TOKEN", Kind::Chars, CONNECT_TOKEN_LEN),
    SchemaEntry::new("PADDING", Kind::Bytes, 2),
    SchemaEntry::new("CRC32", Kind::U32, 1),
];

const fn blob_size() -> u16 {
    let mut total = 0;
    let mut i = 0;
    while i < SCHEMA.len() {
        total += SCHEMA[i].size();
        i += 1;
    }
    total
}

/// Total blob size in bytes, trailer included
pub const DATASIZE: u16 = blob_size();

// The checksummed range must be whole 32-bit words.
const _: () = assert!((DATASIZE - 4) % 4 == 0);
const _: () = assert!(DATASIZE <= MAX_DATASIZE);

/// Number of schema entries
pub fn len() -> usize {
    SCHEMA.len()
}

/// Schema entry for `id`
pub fn entry(id: u8) -> Option<&'static SchemaEntry> {
    SCHEMA.get(id as usize)
}

/// Name of variable `id`
pub fn name(id: u8) -> Option<&'static str> {
    entry(id).map(|e| e.name)
}

/// Look up a variable id by name (case-insensitive)
pub fn find(name: &str) -> Option<u8> {
    SCHEMA
        .iter()
        .position(|e| e.name.eq_ignore_ascii_case(name))
        .map(|i| i as u8)
}

/// Size in bytes of variable `id`, or 0 when out of range
pub fn size_of(id: u8) -> u16 {
    entry(id).map(SchemaEntry::size).unwrap_or(0)
}

/// Offset of variable `id` from the start of the blob
///
/// Recomputed from the table on every call.
pub fn offset_of(id: u8) -> Option<u16> {
    if id as usize >= SCHEMA.len() {
        return None;
    }
    Some(SCHEMA[..id as usize].iter().map(SchemaEntry::size).sum())
}

/// Device address of variable `id`
pub fn address_of(id: u8) -> Option<u16> {
    offset_of(id).map(|offset| EEPROM_ADDRESS + offset)
}

/// Whether variable `id` is maintained by the store rather than callers
///
/// The header steers the startup check and the trailer is recomputed on
/// every write.
pub fn is_managed(id: u8) -> bool {
    matches!(
        id,
        var::VERSION | var::FEATURES | var::DATASIZE | var::CRC32
    )
}

/// Whether variable `id` holds an IPv4 address
pub fn is_ipv4(id: u8) -> bool {
    matches!(
        id,
        var::LAN_IP4_ADDR
            | var::LAN_IP4_MSK
            | var::LAN_IP4_GW
            | var::LAN_IP4_DNS1
            | var::LAN_IP4_DNS2
            | var::CONNECT_IP4
    )
}

/// Compiled-in default value of variable `id`
///
/// Returns the empty sentinel when `id` is out of range. The CRC32
/// default is a placeholder; the real trailer is computed when the blob
/// is sealed.
pub fn default_value(id: u8) -> Variant {
    match id {
        var::VERSION => Variant::u16(VERSION),
        var::FEATURES => Variant::u16(FEATURES),
        var::DATASIZE => Variant::u16(DATASIZE),
        var::RUN_SELFTEST | var::RUN_XYZCALIB | var::RUN_FIRSTLAY => Variant::u8(1),
        var::PID_NOZ_P => Variant::f32(7.0),
        var::PID_NOZ_I => Variant::f32(0.5),
        var::PID_NOZ_D => Variant::f32(45.0),
        var::PID_BED_P => Variant::f32(120.0),
        var::PID_BED_I => Variant::f32(1.5),
        var::PID_BED_D => Variant::f32(600.0),
        var::LAN_HOSTNAME => Variant::chars(LAN_HOSTNAME_MAX_LEN, DEFAULT_HOSTNAME),
        var::CONNECT_PORT => Variant::u16(80),
        var::CONNECT_TOKEN => Variant::chars(CONNECT_TOKEN_LEN, ""),
        _ => match entry(id) {
            Some(e) => zeroed(e),
            None => Variant::empty(),
        },
    }
}

fn zeroed(entry: &SchemaEntry) -> Variant {
    let raw = vec![0u8; entry.size() as usize];
    Variant::decode(entry.kind, entry.count, &raw).unwrap_or_else(|_| Variant::empty())
}

/// Format a value of variable `id` for text dumps
///
/// IPv4 fields render as dotted quads; everything else uses the default
/// formatter.
pub fn format_value(id: u8, value: &Variant) -> String {
    if is_ipv4(id) {
        if let Some(addr) = value.as_ipv4() {
            return addr.to_string();
        }
    }
    value.to_string()
}

/// Parse text into a value for variable `id`
///
/// IPv4 fields also accept dotted quads.
pub fn parse_value(id: u8, text: &str) -> StoreResult<Variant> {
    let entry = entry(id).ok_or(StoreError::OutOfRange {
        id,
        len: SCHEMA.len(),
    })?;
    if is_ipv4(id) {
        if let Ok(addr) = text.trim().parse::<Ipv4Addr>() {
            return Ok(Variant::ipv4(addr));
        }
    }
    Variant::parse(entry.kind, entry.count, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_entries_first() {
        assert_eq!(SCHEMA[var::VERSION as usize].name, "VERSION");
        assert_eq!(SCHEMA[var::FEATURES as usize].name, "FEATURES");
        assert_eq!(SCHEMA[var::DATASIZE as usize].name, "DATASIZE");
        assert_eq!(offset_of(var::VERSION), Some(0));
        assert_eq!(offset_of(var::FEATURES), Some(2));
        assert_eq!(offset_of(var::DATASIZE), Some(4));
    }

    #[test]
    fn test_crc_is_last_entry() {
        assert_eq!(var::CRC32 as usize, SCHEMA.len() - 1);
        assert_eq!(offset_of(var::CRC32), Some(DATASIZE - 4));
        assert_eq!(size_of(var::CRC32), 4);
    }

    #[test]
    fn test_addresses_are_contiguous() {
        for id in 0..(SCHEMA.len() as u8 - 1) {
            let here = address_of(id).unwrap();
            let next = address_of(id + 1).unwrap();
            assert_eq!(here + size_of(id), next, "gap or overlap after {}", name(id).unwrap());
        }
        let last = var::CRC32;
        assert_eq!(address_of(last).unwrap() + size_of(last), EEPROM_ADDRESS + DATASIZE);
    }

    #[test]
    fn test_known_layout() {
        assert_eq!(DATASIZE, 116);
        assert_eq!(offset_of(var::ZOFFSET), Some(15));
        assert_eq!(offset_of(var::LAN_HOSTNAME), Some(64));
        assert_eq!(size_of(var::LAN_HOSTNAME), 20);
        assert_eq!(offset_of(var::CONNECT_TOKEN), Some(90));
    }

    #[test]
    fn test_out_of_range() {
        let id = SCHEMA.len() as u8;
        assert_eq!(size_of(id), 0);
        assert_eq!(offset_of(id), None);
        assert_eq!(address_of(id), None);
        assert_eq!(name(id), None);
        assert!(default_value(id).is_empty());
        assert!(matches!(
            parse_value(id, "1"),
            Err(StoreError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_find_by_name() {
        assert_eq!(find("LAN_HOSTNAME"), Some(var::LAN_HOSTNAME));
        assert_eq!(find("zoffset"), Some(var::ZOFFSET));
        assert_eq!(find("NOPE"), None);
    }

    #[test]
    fn test_defaults_match_schema() {
        for (id, entry) in SCHEMA.iter().enumerate() {
            let value = default_value(id as u8);
            assert!(entry.accepts(&value), "default of {} has wrong type", entry.name);
        }
        assert_eq!(default_value(var::VERSION).as_u16(), Some(VERSION));
        assert_eq!(
            default_value(var::LAN_HOSTNAME).as_str().unwrap(),
            DEFAULT_HOSTNAME
        );
    }

    #[test]
    fn test_ipv4_formatting() {
        let addr = Variant::ipv4(Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(format_value(var::LAN_IP4_GW, &addr), "10.0.0.1");
        assert_eq!(format_value(var::FILAMENT_COLOR, &Variant::u32(7)), "7");
    }

    #[test]
    fn test_parse_value() {
        let v = parse_value(var::CONNECT_IP4, "192.168.0.5").unwrap();
        assert_eq!(v.as_ipv4(), Some(Ipv4Addr::new(192, 168, 0, 5)));

        let v = parse_value(var::CONNECT_PORT, "8080").unwrap();
        assert_eq!(v.as_u16(), Some(8080));

        let v = parse_value(var::LAN_HOSTNAME, "printer").unwrap();
        assert!(SCHEMA[var::LAN_HOSTNAME as usize].accepts(&v));
    }

    #[test]
    fn test_managed_ids() {
        let managed: Vec<u8> = (0..len() as u8).filter(|&id| is_managed(id)).collect();
        assert_eq!(managed, vec![var::VERSION, var::FEATURES, var::DATASIZE, var::CRC32]);
    }
}
