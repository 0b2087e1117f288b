//! Ed25519 signing over canonical payloads.
//!
//! Keys are raw 32-byte seeds; public keys travel as `Hex32`, signatures as
//! base64 of the 64-byte form. Verification never raises: any structural
//! problem (bad hex, bad base64, wrong length, crypto failure) is `false`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use caravel_types::codec::{self, Value};
use caravel_types::{CodecError, EventV1, Hex32};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

/// An Ed25519 key pair held as its signing key.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    signing: SigningKey,
}

impl Ed25519KeyPair {
    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a key pair from a raw 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// The raw 32-byte seed.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// The public key in protocol form.
    pub fn public(&self) -> Hex32 {
        Hex32::from_bytes(self.signing.verifying_key().to_bytes())
    }

    /// Signs raw bytes, returning the 64-byte signature.
    pub fn sign_raw(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }

    /// Signs raw bytes, returning base64.
    pub fn sign_raw_b64(&self, message: &[u8]) -> String {
        BASE64.encode(self.sign_raw(message))
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never prints the seed.
        write!(f, "Ed25519KeyPair({})", self.public())
    }
}

/// Signs the canonical encoding of a value, returning base64.
pub fn sign_payload_b64(keypair: &Ed25519KeyPair, payload: &Value) -> Result<String, CodecError> {
    let bytes = codec::encode(payload)?;
    Ok(keypair.sign_raw_b64(&bytes))
}

/// Verifies a raw signature against a public key. False on any failure.
pub fn verify_raw(pubkey: &Hex32, signature: &[u8], message: &[u8]) -> bool {
    let Ok(vk) = VerifyingKey::from_bytes(pubkey.as_bytes()) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let sig = Signature::from_bytes(&sig_bytes);
    vk.verify(message, &sig).is_ok()
}

/// Verifies a base64 signature over the canonical encoding of a value.
/// False on any failure, including encoding failure.
pub fn verify_payload(pubkey: &Hex32, sig_b64: &str, payload: &Value) -> bool {
    let Ok(signature) = BASE64.decode(sig_b64) else {
        return false;
    };
    let Ok(bytes) = codec::encode(payload) else {
        return false;
    };
    verify_raw(pubkey, &signature, &bytes)
}

/// Signs an event envelope in place: sets `sig` over the signing payload.
/// The caller is responsible for `from` matching the key.
pub fn sign_event(keypair: &Ed25519KeyPair, event: &mut EventV1) -> Result<(), CodecError> {
    event.sig = sign_payload_b64(keypair, &event.signing_value())?;
    Ok(())
}

/// Verifies an event envelope's signature against its `from` key.
pub fn verify_event(event: &EventV1) -> bool {
    verify_payload(&event.from, &event.sig, &event.signing_value())
}

#[cfg(test)]
mod tests;
