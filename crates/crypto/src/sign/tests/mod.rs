use super::*;
use caravel_types::EventKind;

fn keypair() -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed(&[7u8; 32])
}

#[test]
fn seed_roundtrip_reproduces_the_key() {
    let original = Ed25519KeyPair::generate();
    let restored = Ed25519KeyPair::from_seed(&original.seed());
    assert_eq!(original.public(), restored.public());

    let message = b"deterministic";
    assert_eq!(original.sign_raw(message), restored.sign_raw(message));
}

#[test]
fn payload_sign_verify_roundtrip() {
    let kp = keypair();
    let payload = Value::map([("a", Value::from(1u64)), ("b", Value::text("x"))]);
    let sig = sign_payload_b64(&kp, &payload).unwrap();
    assert!(verify_payload(&kp.public(), &sig, &payload));
}

#[test]
fn altered_payload_or_key_fails_without_raising() {
    let kp = keypair();
    let payload = Value::map([("a", Value::from(1u64))]);
    let sig = sign_payload_b64(&kp, &payload).unwrap();

    let tampered = Value::map([("a", Value::from(2u64))]);
    assert!(!verify_payload(&kp.public(), &sig, &tampered));

    let other = Ed25519KeyPair::from_seed(&[8u8; 32]);
    assert!(!verify_payload(&other.public(), &sig, &payload));

    // Structural garbage: all false, no panic.
    assert!(!verify_payload(&kp.public(), "not base64!!", &payload));
    assert!(!verify_payload(&kp.public(), "QUJD", &payload)); // wrong length
    assert!(!verify_raw(&Hex32::ZERO, &[0u8; 64], b"msg"));
}

#[test]
fn event_sign_verify() {
    let kp = keypair();
    let mut event = EventV1 {
        v: 1,
        kind: EventKind::Post,
        from: kp.public(),
        r#ref: Hex32::ZERO,
        body: String::new(),
        sats: 10,
        ts: 1_700_000_000_000,
        sig: String::new(),
        nonce: None,
        pow_hash: None,
    };
    sign_event(&kp, &mut event).unwrap();
    assert!(verify_event(&event));

    event.sats = 11;
    assert!(!verify_event(&event));
}
