use crate::crypto::{ed25519_verify, EphemeralKeypair, LongTermKeypair};

#[test]
fn ed25519_sign_verify_round_trip() {
    let keypair = LongTermKeypair::generate();
    let signature = keypair.sign(b"accessory info");
    assert!(ed25519_verify(&keypair.public_bytes(), b"accessory info", &signature).is_ok());
}

#[test]
fn ed25519_rejects_tampered_message() {
    let keypair = LongTermKeypair::generate();
    let signature = keypair.sign(b"accessory info");
    assert!(ed25519_verify(&keypair.public_bytes(), b"accessory lnfo", &signature).is_err());
}

#[test]
fn ed25519_keypair_bytes_round_trip() {
    let keypair = LongTermKeypair::generate();
    let stored = keypair.to_keypair_bytes();

    let restored = LongTermKeypair::from_keypair_bytes(&stored).unwrap();
    assert_eq!(restored.public_bytes(), keypair.public_bytes());
    assert_eq!(restored.sign(b"msg"), keypair.sign(b"msg"));
}

#[test]
fn ed25519_rejects_bad_key_lengths() {
    let keypair = LongTermKeypair::generate();
    let signature = keypair.sign(b"m");
    assert!(ed25519_verify(&[0u8; 31], b"m", &signature).is_err());
    assert!(ed25519_verify(&keypair.public_bytes(), b"m", &signature[..63]).is_err());
}

#[test]
fn x25519_shared_secret_agrees() {
    let ours = EphemeralKeypair::generate();
    let theirs = EphemeralKeypair::generate();

    let lhs = ours.diffie_hellman(&theirs.public_bytes()).unwrap();
    let rhs = theirs.diffie_hellman(&ours.public_bytes()).unwrap();
    assert_eq!(lhs, rhs);
}

#[test]
fn x25519_rejects_short_peer_key() {
    let ours = EphemeralKeypair::generate();
    assert!(ours.diffie_hellman(&[0u8; 31]).is_err());
}
