//! Tagged values and their byte codec
//!
//! A [`Variant`] carries its kind and element count next to the raw bytes
//! backing it. Scalars occupy 1, 2 or 4 bytes; array kinds occupy `count`
//! bytes. Scalars are kept in the controller's little-endian representation,
//! so encoding is a plain copy of `data`.
//!
//! Character arrays are fixed-capacity: shorter text is zero-padded up to
//! the capacity, longer text is truncated at it. A full-capacity string has
//! no terminator.

use std::borrow::Cow;
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{StoreError, StoreResult};

/// Value type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// No value (sentinel returned for failed reads)
    Empty,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    /// Fixed-capacity character array
    Chars,
    /// Fixed-capacity raw byte array
    Bytes,
}

impl Kind {
    /// Size in bytes of a single element of this kind
    pub const fn size(self) -> usize {
        match self {
            Kind::Empty => 0,
            Kind::I8 | Kind::U8 | Kind::Chars | Kind::Bytes => 1,
            Kind::I16 | Kind::U16 => 2,
            Kind::I32 | Kind::U32 | Kind::F32 => 4,
        }
    }

    /// Whether `count` may exceed one
    pub const fn is_array(self) -> bool {
        matches!(self, Kind::Chars | Kind::Bytes)
    }

    /// Short lowercase type name, as used in text dumps
    pub const fn name(self) -> &'static str {
        match self {
            Kind::Empty => "empty",
            Kind::I8 => "i8",
            Kind::U8 => "u8",
            Kind::I16 => "i16",
            Kind::U16 => "u16",
            Kind::I32 => "i32",
            Kind::U32 => "u32",
            Kind::F32 => "f32",
            Kind::Chars => "chars",
            Kind::Bytes => "bytes",
        }
    }
}

/// A value tagged with its kind and element count
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Variant {
    kind: Kind,
    count: u8,
    data: Vec<u8>,
}

impl Variant {
    /// The empty sentinel
    pub fn empty() -> Self {
        Self {
            kind: Kind::Empty,
            count: 0,
            data: Vec::new(),
        }
    }

    fn scalar(kind: Kind, bytes: &[u8]) -> Self {
        Self {
            kind,
            count: 1,
            data: bytes.to_vec(),
        }
    }

    pub fn i8(value: i8) -> Self {
        Self::scalar(Kind::I8, &value.to_le_bytes())
    }

    pub fn u8(value: u8) -> Self {
        Self::scalar(Kind::U8, &value.to_le_bytes())
    }

    pub fn i16(value: i16) -> Self {
        Self::scalar(Kind::I16, &value.to_le_bytes())
    }

    pub fn u16(value: u16) -> Self {
        Self::scalar(Kind::U16, &value.to_le_bytes())
    }

    pub fn i32(value: i32) -> Self {
        Self::scalar(Kind::I32, &value.to_le_bytes())
    }

    pub fn u32(value: u32) -> Self {
        Self::scalar(Kind::U32, &value.to_le_bytes())
    }

    pub fn f32(value: f32) -> Self {
        Self::scalar(Kind::F32, &value.to_le_bytes())
    }

    /// An IPv4 address stored as a u32 whose bytes are the octets in order
    pub fn ipv4(addr: Ipv4Addr) -> Self {
        Self::scalar(Kind::U32, &addr.octets())
    }

    /// Fixed-capacity character array
    ///
    /// Text stops at the first NUL, is truncated at `capacity` on a
    /// character boundary and zero-padded up to it.
    pub fn chars(capacity: u8, text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut end = bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(bytes.len())
            .min(capacity as usize);
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        Self::padded(Kind::Chars, capacity, &bytes[..end])
    }

    /// Fixed-capacity byte array, zero-padded or truncated to `count`
    pub fn bytes(count: u8, data: &[u8]) -> Self {
        Self::padded(Kind::Bytes, count, data)
    }

    fn padded(kind: Kind, count: u8, src: &[u8]) -> Self {
        let mut data = vec![0u8; count as usize];
        let len = src.len().min(data.len());
        data[..len].copy_from_slice(&src[..len]);
        Self { kind, count, data }
    }

    /// Decode raw bytes as a value of the given kind and count
    pub fn decode(kind: Kind, count: u8, raw: &[u8]) -> StoreResult<Self> {
        let valid_count = if kind.is_array() {
            count > 0
        } else {
            count == 1 || (kind == Kind::Empty && count == 0)
        };
        if !valid_count || raw.len() != kind.size() * count as usize {
            return Err(StoreError::InvalidValue {
                kind,
                value: format!("{} bytes", raw.len()),
                details: format!("expected {} element(s) of {} bytes", count, kind.size()),
            });
        }
        Ok(Self {
            kind,
            count,
            data: raw.to_vec(),
        })
    }

    /// Raw bytes of this value, exactly `kind.size() * count` long
    pub fn encode(&self) -> &[u8] {
        &self.data
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.kind == Kind::Empty
    }

    fn array<const N: usize>(&self, kind: Kind) -> Option<[u8; N]> {
        if self.kind != kind {
            return None;
        }
        self.data.as_slice().try_into().ok()
    }

    pub fn as_i8(&self) -> Option<i8> {
        self.array(Kind::I8).map(i8::from_le_bytes)
    }

    pub fn as_u8(&self) -> Option<u8> {
        self.array(Kind::U8).map(u8::from_le_bytes)
    }

    pub fn as_i16(&self) -> Option<i16> {
        self.array(Kind::I16).map(i16::from_le_bytes)
    }

    pub fn as_u16(&self) -> Option<u16> {
        self.array(Kind::U16).map(u16::from_le_bytes)
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.array(Kind::I32).map(i32::from_le_bytes)
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.array(Kind::U32).map(u32::from_le_bytes)
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.array(Kind::F32).map(f32::from_le_bytes)
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        self.array::<4>(Kind::U32).map(Ipv4Addr::from)
    }

    /// Text of a character array, up to the first NUL
    pub fn as_str(&self) -> Option<Cow<'_, str>> {
        if self.kind != Kind::Chars {
            return None;
        }
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data.len());
        Some(String::from_utf8_lossy(&self.data[..end]))
    }

    /// Parse text into a value of the given kind and count
    ///
    /// Unsigned integers accept a `0x` prefix. Byte arrays are written as
    /// hex pairs, optionally separated by spaces.
    pub fn parse(kind: Kind, count: u8, text: &str) -> StoreResult<Self> {
        let text = text.trim();
        let invalid = |details: String| StoreError::InvalidValue {
            kind,
            value: text.to_string(),
            details,
        };

        let value = match kind {
            Kind::Empty => return Err(invalid("cannot parse into an empty value".to_string())),
            Kind::I8 => Self::i8(text.parse().map_err(|e| invalid(format!("{}", e)))?),
            Kind::I16 => Self::i16(text.parse().map_err(|e| invalid(format!("{}", e)))?),
            Kind::I32 => Self::i32(text.parse().map_err(|e| invalid(format!("{}", e)))?),
            Kind::U8 => {
                let v = parse_unsigned(text).map_err(&invalid)?;
                Self::u8(u8::try_from(v).map_err(|e| invalid(e.to_string()))?)
            }
            Kind::U16 => {
                let v = parse_unsigned(text).map_err(&invalid)?;
                Self::u16(u16::try_from(v).map_err(|e| invalid(e.to_string()))?)
            }
            Kind::U32 => Self::u32(parse_unsigned(text).map_err(&invalid)?),
            Kind::F32 => Self::f32(text.parse().map_err(|e| invalid(format!("{}", e)))?),
            Kind::Chars => Self::chars(count, text),
            Kind::Bytes => {
                let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
                if !digits.is_ascii() {
                    return Err(invalid("expected hex digits".to_string()));
                }
                if digits.len() % 2 != 0 {
                    return Err(invalid("odd number of hex digits".to_string()));
                }
                let raw = (0..digits.len())
                    .step_by(2)
                    .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
                    .collect::<Result<Vec<u8>, _>>()
                    .map_err(|e| invalid(e.to_string()))?;
                if raw.len() > count as usize {
                    return Err(invalid(format!("more than {} bytes", count)));
                }
                Self::bytes(count, &raw)
            }
        };
        Ok(value)
    }
}

fn parse_unsigned(text: &str) -> Result<u32, String> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| e.to_string())
}

/// Default formatter: decimal scalars, text for character arrays, hex for bytes
impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Kind::Empty => Ok(()),
            Kind::I8 => write!(f, "{}", self.as_i8().unwrap_or_default()),
            Kind::U8 => write!(f, "{}", self.as_u8().unwrap_or_default()),
            Kind::I16 => write!(f, "{}", self.as_i16().unwrap_or_default()),
            Kind::U16 => write!(f, "{}", self.as_u16().unwrap_or_default()),
            Kind::I32 => write!(f, "{}", self.as_i32().unwrap_or_default()),
            Kind::U32 => write!(f, "{}", self.as_u32().unwrap_or_default()),
            Kind::F32 => write!(f, "{}", self.as_f32().unwrap_or_default()),
            Kind::Chars => write!(f, "{}", self.as_str().unwrap_or_default()),
            Kind::Bytes => {
                let hex: Vec<String> = self.data.iter().map(|b| format!("{:02x}", b)).collect();
                write!(f, "{}", hex.join(" "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_sizes() {
        assert_eq!(Variant::u8(7).encode().len(), 1);
        assert_eq!(Variant::i16(-2).encode().len(), 2);
        assert_eq!(Variant::u32(1).encode().len(), 4);
        assert_eq!(Variant::f32(1.5).encode().len(), 4);
        assert_eq!(Variant::empty().encode().len(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(Variant::u16(0x0102).encode(), &[0x02, 0x01]);
        assert_eq!(Variant::u32(0xAABBCCDD).encode(), &[0xDD, 0xCC, 0xBB, 0xAA]);
    }

    #[test]
    fn test_chars_zero_padded() {
        let v = Variant::chars(20, "host");
        assert_eq!(v.count(), 20);
        assert_eq!(&v.encode()[..4], b"host");
        assert!(v.encode()[4..].iter().all(|&b| b == 0));
        assert_eq!(v.as_str().unwrap(), "host");
    }

    #[test]
    fn test_chars_truncated_at_capacity() {
        let v = Variant::chars(4, "abcdefgh");
        assert_eq!(v.encode(), b"abcd");
        assert_eq!(v.as_str().unwrap(), "abcd");
    }

    #[test]
    fn test_chars_truncated_on_char_boundary() {
        // "é" is two bytes; the tenth would straddle the 20-byte capacity.
        let text = format!("a{}", "é".repeat(10));
        let v = Variant::chars(20, &text);
        assert_eq!(v.count(), 20);
        assert_eq!(v.as_str().unwrap(), format!("a{}", "é".repeat(9)));
        assert_eq!(v.encode()[19], 0);
    }

    #[test]
    fn test_chars_stop_at_nul() {
        let v = Variant::chars(8, "ab\0cd");
        assert_eq!(v.encode(), &[b'a', b'b', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_checks_length() {
        assert!(Variant::decode(Kind::U16, 1, &[1, 2]).is_ok());
        assert!(Variant::decode(Kind::U16, 1, &[1, 2, 3]).is_err());
        assert!(Variant::decode(Kind::U32, 2, &[0; 8]).is_err());
        assert!(Variant::decode(Kind::Chars, 3, b"abc").is_ok());
    }

    #[test]
    fn test_decode_matches_constructor() {
        let v = Variant::f32(-0.25);
        let decoded = Variant::decode(Kind::F32, 1, v.encode()).unwrap();
        assert_eq!(decoded, v);
        assert_eq!(decoded.as_f32(), Some(-0.25));
    }

    #[test]
    fn test_accessors_check_kind() {
        let v = Variant::u16(5);
        assert_eq!(v.as_u16(), Some(5));
        assert_eq!(v.as_u8(), None);
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn test_ipv4_byte_order() {
        let v = Variant::ipv4(Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(v.kind(), Kind::U32);
        assert_eq!(v.encode(), &[192, 168, 1, 10]);
        assert_eq!(v.as_ipv4(), Some(Ipv4Addr::new(192, 168, 1, 10)));
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(Variant::parse(Kind::U8, 1, "12").unwrap(), Variant::u8(12));
        assert_eq!(Variant::parse(Kind::U32, 1, "0xff").unwrap(), Variant::u32(255));
        assert_eq!(Variant::parse(Kind::I16, 1, "-3").unwrap(), Variant::i16(-3));
        assert_eq!(Variant::parse(Kind::F32, 1, "-0.5").unwrap(), Variant::f32(-0.5));
        assert!(Variant::parse(Kind::U8, 1, "256").is_err());
        assert!(Variant::parse(Kind::U16, 1, "abc").is_err());
    }

    #[test]
    fn test_parse_arrays() {
        let v = Variant::parse(Kind::Bytes, 4, "01 ff").unwrap();
        assert_eq!(v.encode(), &[0x01, 0xff, 0, 0]);
        assert!(Variant::parse(Kind::Bytes, 1, "0102").is_err());

        let s = Variant::parse(Kind::Chars, 20, "printer").unwrap();
        assert_eq!(s.as_str().unwrap(), "printer");
    }

    #[test]
    fn test_display() {
        assert_eq!(Variant::u16(4).to_string(), "4");
        assert_eq!(Variant::f32(0.5).to_string(), "0.5");
        assert_eq!(Variant::chars(8, "MINI").to_string(), "MINI");
        assert_eq!(Variant::bytes(2, &[0, 0xab]).to_string(), "00 ab");
        assert_eq!(Variant::empty().to_string(), "");
    }
}
