//! The universal signed event envelope.
//!
//! Everything that mutates coordinator state arrives as an `EventV1`. The
//! envelope is signed over the canonical encoding of its signing payload;
//! the hash of that payload is the event's identity. Free events (zero
//! sats) additionally carry a proof-of-work nonce.

use crate::cid::{cid_from_value, Hex32};
use crate::codec::{self, Value};
use crate::constants::EVENT_MAX_BODY;
use crate::error::{CodecError, EventError};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Recognised event kinds. The wire form is the raw discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Credit a bounty pool attached to `ref`.
    Fund = 0x01,
    /// A host announces it serves the content at `ref`.
    Announce = 0x02,
    /// Publish an asset.
    Post = 0x03,
    /// Register or update a host record.
    Host = 0x04,
    /// A host refuses to serve `ref`.
    Refusal = 0x05,
    /// Attest to third-party content or behaviour.
    Attest = 0x06,
    /// Publish a curated list.
    List = 0x07,
    /// Publish a pinning policy.
    PinPolicy = 0x08,
    /// Coordinator-authored materialisation marker (e.g. epoch summaries).
    Materializer = 0x09,
}

impl EventKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Fund),
            0x02 => Some(Self::Announce),
            0x03 => Some(Self::Post),
            0x04 => Some(Self::Host),
            0x05 => Some(Self::Refusal),
            0x06 => Some(Self::Attest),
            0x07 => Some(Self::List),
            0x08 => Some(Self::PinPolicy),
            0x09 => Some(Self::Materializer),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        EventKind::from_u8(raw)
            .ok_or_else(|| de::Error::custom(format!("unknown event kind {raw:#04x}")))
    }
}

/// The signed event envelope, version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventV1 {
    /// Envelope version; always 1.
    pub v: u8,
    pub kind: EventKind,
    /// Signer public key.
    pub from: Hex32,
    /// Referenced entity, or the zero hash when none.
    pub r#ref: Hex32,
    /// Hex-rendered canonical encoding of the kind-specific body.
    pub body: String,
    /// Sats attached to the event. Zero-sat events require proof-of-work.
    pub sats: u64,
    /// Client wall-clock milliseconds.
    pub ts: u64,
    /// Base64 Ed25519 signature over the canonical signing payload.
    pub sig: String,
    /// Proof-of-work nonce; present iff `sats == 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
    /// Proof-of-work hash; present iff `sats == 0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pow_hash: Option<Hex32>,
}

impl EventV1 {
    /// The payload covered by the signature and hashed into the event ID.
    /// The signature, nonce and pow hash are excluded.
    pub fn signing_value(&self) -> Value {
        Value::map([
            ("v", Value::from(self.v)),
            ("kind", Value::from(self.kind.as_u8())),
            ("from", Value::from(self.from)),
            ("ref", Value::from(self.r#ref)),
            ("body", Value::text(self.body.clone())),
            ("sats", Value::from(self.sats)),
            ("ts", Value::from(self.ts)),
        ])
    }

    /// Content ID of the signing payload.
    pub fn event_id(&self) -> Result<Hex32, CodecError> {
        cid_from_value(&self.signing_value())
    }

    /// Whether this event must carry proof-of-work.
    pub fn requires_pow(&self) -> bool {
        self.sats == 0
    }

    /// Raw bytes of the body (hex-decoded canonical encoding).
    pub fn body_bytes(&self) -> Result<Vec<u8>, EventError> {
        hex::decode(&self.body).map_err(|_| EventError::InvalidField("body"))
    }

    /// Decodes the body back into a structured value.
    pub fn decode_body(&self) -> Result<Value, EventError> {
        let bytes = self.body_bytes()?;
        Ok(codec::decode(&bytes)?)
    }

    /// Structural validation: version, body shape and size, pow presence.
    /// Signature and pow verification are cryptographic and live in the
    /// crypto layer.
    pub fn validate_shape(&self) -> Result<(), EventError> {
        if self.v != 1 {
            return Err(EventError::InvalidField("v"));
        }
        let body = self.body_bytes()?;
        if body.len() > EVENT_MAX_BODY {
            return Err(EventError::BodyTooLarge(body.len()));
        }
        if !body.is_empty() {
            codec::decode(&body)?;
        }
        if self.requires_pow() && (self.nonce.is_none() || self.pow_hash.is_none()) {
            return Err(EventError::PowMissing);
        }
        Ok(())
    }
}

/// Canonically encodes a body value and renders it as hex, enforcing the
/// body size cap.
pub fn encode_event_body(body: &Value) -> Result<String, EventError> {
    let bytes = codec::encode(body)?;
    if bytes.len() > EVENT_MAX_BODY {
        return Err(EventError::BodyTooLarge(bytes.len()));
    }
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EventV1 {
        EventV1 {
            v: 1,
            kind: EventKind::Fund,
            from: Hex32::from_bytes([0xaa; 32]),
            r#ref: Hex32::from_bytes([0x11; 32]),
            body: encode_event_body(&Value::map([("amount", Value::from(21u64))])).unwrap(),
            sats: 500,
            ts: 1_700_000_000_000,
            sig: String::new(),
            nonce: None,
            pow_hash: None,
        }
    }

    #[test]
    fn event_id_ignores_signature_and_pow() {
        let mut a = sample_event();
        let mut b = sample_event();
        a.sig = "AAAA".into();
        b.sig = "BBBB".into();
        b.nonce = Some(7);
        assert_eq!(a.event_id().unwrap(), b.event_id().unwrap());
    }

    #[test]
    fn event_id_changes_with_payload() {
        let a = sample_event();
        let mut b = sample_event();
        b.sats = 501;
        assert_ne!(a.event_id().unwrap(), b.event_id().unwrap());
    }

    #[test]
    fn body_size_cap_is_enforced() {
        let big = Value::Bytes(vec![0u8; EVENT_MAX_BODY + 1]);
        assert!(matches!(
            encode_event_body(&big),
            Err(EventError::BodyTooLarge(_))
        ));
    }

    #[test]
    fn free_events_must_declare_pow() {
        let mut e = sample_event();
        e.sats = 0;
        assert!(matches!(e.validate_shape(), Err(EventError::PowMissing)));
        e.nonce = Some(1);
        e.pow_hash = Some(Hex32::ZERO);
        assert!(e.validate_shape().is_ok());
    }

    #[test]
    fn kind_roundtrips_through_serde_as_u8() {
        let json = serde_json::to_string(&EventKind::Host).unwrap();
        assert_eq!(json, "4");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::Host);
        assert!(serde_json::from_str::<EventKind>("42").is_err());
    }

    #[test]
    fn envelope_serde_roundtrip() {
        let e = sample_event();
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"ref\""));
        let back: EventV1 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
