//! Defines the canonical, deterministic byte codec for all hash-critical values.
//!
//! Every content ID, event ID and signing payload in the protocol is a hash of
//! the output of this module, so the encoding must be byte-identical across
//! runs, hosts and process restarts. The format is the canonical subset of
//! CBOR: definite lengths only, minimal-length integer heads, map keys sorted
//! by their UTF-8 bytes, and no floating-point values. Decoding is strict and
//! rejects anything outside that subset, which gives the round-trip contract
//! `encode(decode(x)) == x` for every byte string this module produces.

use crate::error::CodecError;
use std::collections::BTreeMap;

const MAJOR_UINT: u8 = 0;
const MAJOR_NINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;

const SIMPLE_FALSE: u8 = 0xf4;
const SIMPLE_TRUE: u8 = 0xf5;
const SIMPLE_NULL: u8 = 0xf6;

/// A structured value in the canonical domain.
///
/// Integers cover the full CBOR range `[-2^64, 2^64-1]`; floats are not
/// representable. Map keys are text and kept sorted by `BTreeMap`'s
/// byte-lexicographic `String` ordering, which is exactly the canonical key
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i128),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from key/value pairs. Later duplicate keys win,
    /// matching `BTreeMap::insert`.
    pub fn map<K: Into<String>, I: IntoIterator<Item = (K, Value)>>(entries: I) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect(),
        )
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn array(items: impl Into<Vec<Value>>) -> Value {
        Value::Array(items.into())
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_int().and_then(|n| u64::try_from(n).ok())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Map lookup helper for body payloads.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Int(v as i128)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i128)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v as i128)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Encodes a value into its canonical byte representation.
///
/// This is the single source of truth for hash preimages. Fails only when an
/// integer falls outside the CBOR range.
pub fn encode(v: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(64);
    encode_into(v, &mut out)?;
    Ok(out)
}

/// Encodes a value and renders the result as lowercase hex.
pub fn encode_hex(v: &Value) -> Result<String, CodecError> {
    Ok(hex::encode(encode(v)?))
}

fn encode_into(v: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match v {
        Value::Null => out.push(SIMPLE_NULL),
        Value::Bool(false) => out.push(SIMPLE_FALSE),
        Value::Bool(true) => out.push(SIMPLE_TRUE),
        Value::Int(n) => {
            if *n >= 0 {
                let u = u64::try_from(*n).map_err(|_| CodecError::IntOutOfRange(*n))?;
                write_head(out, MAJOR_UINT, u);
            } else {
                // CBOR major 1 encodes -1 - n.
                let m = u64::try_from(-1 - *n).map_err(|_| CodecError::IntOutOfRange(*n))?;
                write_head(out, MAJOR_NINT, m);
            }
        }
        Value::Bytes(b) => {
            write_head(out, MAJOR_BYTES, b.len() as u64);
            out.extend_from_slice(b);
        }
        Value::Text(s) => {
            write_head(out, MAJOR_TEXT, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_head(out, MAJOR_ARRAY, items.len() as u64);
            for item in items {
                encode_into(item, out)?;
            }
        }
        Value::Map(entries) => {
            // BTreeMap iteration is already byte-lexicographic over keys.
            write_head(out, MAJOR_MAP, entries.len() as u64);
            for (k, item) in entries {
                write_head(out, MAJOR_TEXT, k.len() as u64);
                out.extend_from_slice(k.as_bytes());
                encode_into(item, out)?;
            }
        }
    }
    Ok(())
}

/// Minimal-length CBOR head for the given major type and argument.
fn write_head(out: &mut Vec<u8>, major: u8, n: u64) {
    let m = major << 5;
    if n < 24 {
        out.push(m | n as u8);
    } else if n <= 0xff {
        out.push(m | 24);
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(m | 25);
        out.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        out.push(m | 26);
        out.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        out.push(m | 27);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

/// Decodes a canonical byte representation back into a value.
///
/// Strict by construction: indefinite lengths, non-minimal heads, floats,
/// tags, non-text map keys, unsorted or duplicate keys, and trailing bytes
/// all fail. Accepting any of them would break the round-trip contract.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let mut r = Reader { buf: bytes, pos: 0 };
    let v = decode_value(&mut r)?;
    if r.pos != r.buf.len() {
        return Err(CodecError::TrailingBytes(r.buf.len() - r.pos));
    }
    Ok(v)
}

/// Decodes a hex rendering of a canonical encoding.
pub fn decode_hex(s: &str) -> Result<Value, CodecError> {
    let bytes = hex::decode(s).map_err(|_| CodecError::InvalidHex)?;
    decode(&bytes)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn next_byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(n).ok_or(CodecError::Truncated)?;
        let slice = self.buf.get(self.pos..end).ok_or(CodecError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }
}

/// Reads a head and returns `(major, argument)`, enforcing minimal encoding.
fn read_head(r: &mut Reader<'_>) -> Result<(u8, u64), CodecError> {
    let initial = r.next_byte()?;
    let major = initial >> 5;
    let info = initial & 0x1f;
    let arg = match info {
        0..=23 => info as u64,
        24 => {
            let v = r.next_byte()? as u64;
            if v < 24 {
                return Err(CodecError::NonMinimalLength);
            }
            v
        }
        25 => {
            let v = u16::from_be_bytes(r.take(2)?.try_into().expect("len 2")) as u64;
            if v <= 0xff {
                return Err(CodecError::NonMinimalLength);
            }
            v
        }
        26 => {
            let v = u32::from_be_bytes(r.take(4)?.try_into().expect("len 4")) as u64;
            if v <= 0xffff {
                return Err(CodecError::NonMinimalLength);
            }
            v
        }
        27 => {
            let v = u64::from_be_bytes(r.take(8)?.try_into().expect("len 8"));
            if v <= 0xffff_ffff {
                return Err(CodecError::NonMinimalLength);
            }
            v
        }
        31 => return Err(CodecError::IndefiniteLength),
        _ => return Err(CodecError::ReservedHead(initial)),
    };
    Ok((major, arg))
}

fn decode_value(r: &mut Reader<'_>) -> Result<Value, CodecError> {
    // Peek at major 7 simple values before the generic head parse, because
    // their info bits are not a length argument.
    let initial = *r.buf.get(r.pos).ok_or(CodecError::Truncated)?;
    if initial >> 5 == 7 {
        r.pos += 1;
        return match initial {
            SIMPLE_FALSE => Ok(Value::Bool(false)),
            SIMPLE_TRUE => Ok(Value::Bool(true)),
            SIMPLE_NULL => Ok(Value::Null),
            0xf9 | 0xfa | 0xfb => Err(CodecError::FloatRejected),
            _ => Err(CodecError::ReservedHead(initial)),
        };
    }

    let (major, arg) = read_head(r)?;
    match major {
        MAJOR_UINT => Ok(Value::Int(arg as i128)),
        MAJOR_NINT => Ok(Value::Int(-1 - arg as i128)),
        MAJOR_BYTES => {
            let data = r.take(usize::try_from(arg).map_err(|_| CodecError::Truncated)?)?;
            Ok(Value::Bytes(data.to_vec()))
        }
        MAJOR_TEXT => {
            let data = r.take(usize::try_from(arg).map_err(|_| CodecError::Truncated)?)?;
            let s = std::str::from_utf8(data).map_err(|_| CodecError::InvalidUtf8)?;
            Ok(Value::Text(s.to_string()))
        }
        MAJOR_ARRAY => {
            let mut items = Vec::new();
            for _ in 0..arg {
                items.push(decode_value(r)?);
            }
            Ok(Value::Array(items))
        }
        MAJOR_MAP => {
            let mut entries = BTreeMap::new();
            let mut last_key: Option<String> = None;
            for _ in 0..arg {
                let (kmajor, klen) = read_head(r)?;
                if kmajor != MAJOR_TEXT {
                    return Err(CodecError::NonTextKey);
                }
                let kdata = r.take(usize::try_from(klen).map_err(|_| CodecError::Truncated)?)?;
                let key = std::str::from_utf8(kdata)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_string();
                if let Some(prev) = &last_key {
                    if key.as_bytes() <= prev.as_bytes() {
                        return Err(CodecError::UnsortedKey(key));
                    }
                }
                let val = decode_value(r)?;
                last_key = Some(key.clone());
                entries.insert(key, val);
            }
            Ok(Value::Map(entries))
        }
        6 => Err(CodecError::TagRejected),
        _ => Err(CodecError::ReservedHead(initial)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn roundtrip(v: &Value) -> Value {
        let bytes = encode(v).unwrap();
        decode(&bytes).unwrap()
    }

    #[test]
    fn encodes_primitives_canonically() {
        assert_eq!(encode(&Value::Null).unwrap(), vec![0xf6]);
        assert_eq!(encode(&Value::Bool(true)).unwrap(), vec![0xf5]);
        assert_eq!(encode(&Value::Int(0)).unwrap(), vec![0x00]);
        assert_eq!(encode(&Value::Int(23)).unwrap(), vec![0x17]);
        assert_eq!(encode(&Value::Int(24)).unwrap(), vec![0x18, 24]);
        assert_eq!(encode(&Value::Int(-1)).unwrap(), vec![0x20]);
        assert_eq!(encode(&Value::Int(256)).unwrap(), vec![0x19, 0x01, 0x00]);
        assert_eq!(
            encode(&Value::text("a")).unwrap(),
            vec![0x61, b'a']
        );
    }

    #[test]
    fn map_keys_sort_by_utf8_bytes() {
        let v = Value::map([
            ("zz", Value::Int(1)),
            ("a", Value::Int(2)),
            ("ab", Value::Int(3)),
        ]);
        let bytes = encode(&v).unwrap();
        // a3 (map of 3), then keys in order a, ab, zz.
        assert_eq!(bytes[0], 0xa3);
        assert_eq!(&bytes[1..3], &[0x61, b'a']);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn semantically_equal_maps_encode_identically() {
        let a = Value::map([("x", Value::Int(1)), ("y", Value::Int(2))]);
        let b = Value::map([("y", Value::Int(2)), ("x", Value::Int(1))]);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn rejects_non_minimal_heads() {
        // 0x18 0x05 is "5" encoded with a one-byte argument.
        assert!(matches!(
            decode(&[0x18, 0x05]),
            Err(CodecError::NonMinimalLength)
        ));
        // 0x19 0x00 0x20 is "32" with a two-byte argument.
        assert!(matches!(
            decode(&[0x19, 0x00, 0x20]),
            Err(CodecError::NonMinimalLength)
        ));
    }

    #[test]
    fn rejects_floats_tags_and_indefinite_lengths() {
        assert!(matches!(
            decode(&[0xfb, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(CodecError::FloatRejected)
        ));
        assert!(matches!(decode(&[0xc0, 0x00]), Err(CodecError::TagRejected)));
        assert!(matches!(
            decode(&[0x9f, 0xff]),
            Err(CodecError::IndefiniteLength)
        ));
    }

    #[test]
    fn rejects_unsorted_and_duplicate_map_keys() {
        // {"b":1,"a":2} with keys out of order.
        let unsorted = [0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(
            decode(&unsorted),
            Err(CodecError::UnsortedKey(_))
        ));
        // {"a":1,"a":2} with a duplicate key.
        let dup = [0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02];
        assert!(matches!(decode(&dup), Err(CodecError::UnsortedKey(_))));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(matches!(
            decode(&[0x01, 0x02]),
            Err(CodecError::TrailingBytes(1))
        ));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<u64>().prop_map(|n| Value::Int(n as i128)),
            any::<i64>().prop_map(|n| Value::Int(n as i128)),
            ".{0,24}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..48).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map(".{0,12}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn roundtrip_is_identity(v in arb_value()) {
            let bytes = encode(&v).unwrap();
            let back = decode(&bytes).unwrap();
            prop_assert_eq!(&back, &v);
            // Re-encoding the decoded value reproduces the exact bytes.
            prop_assert_eq!(encode(&back).unwrap(), bytes);
        }
    }
}
