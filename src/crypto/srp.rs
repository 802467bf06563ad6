//! SRP-6a server over the RFC 5054 3072-bit group with SHA-512
//!
//! `HomeKit` runs SRP with the proof layout
//! `M = H(H(N) ⊕ H(g) | H(I) | s | A | B | K)`, which differs from the
//! stock RFC 5054 proof, so the group arithmetic is carried out directly
//! on big integers here. Group elements cross these functions as
//! big-endian byte strings at their natural (minimal) length; only the
//! `u` scrambling parameter hashes zero-padded operands.

use num_bigint::BigUint;
use num_traits::Zero;
use rand::RngCore;
use sha2::{Digest, Sha512};

use super::{lengths, CryptoError};

/// Byte length of the SRP modulus (and of padded group elements)
pub const MODULUS_SIZE: usize = 384;

// RFC 5054 3072-bit MODP group modulus
static MODULUS: [u8; MODULUS_SIZE] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xc9, 0x0f, 0xda, 0xa2,
    0x21, 0x68, 0xc2, 0x34, 0xc4, 0xc6, 0x62, 0x8b, 0x80, 0xdc, 0x1c, 0xd1,
    0x29, 0x02, 0x4e, 0x08, 0x8a, 0x67, 0xcc, 0x74, 0x02, 0x0b, 0xbe, 0xa6,
    0x3b, 0x13, 0x9b, 0x22, 0x51, 0x4a, 0x08, 0x79, 0x8e, 0x34, 0x04, 0xdd,
    0xef, 0x95, 0x19, 0xb3, 0xcd, 0x3a, 0x43, 0x1b, 0x30, 0x2b, 0x0a, 0x6d,
    0xf2, 0x5f, 0x14, 0x37, 0x4f, 0xe1, 0x35, 0x6d, 0x6d, 0x51, 0xc2, 0x45,
    0xe4, 0x85, 0xb5, 0x76, 0x62, 0x5e, 0x7e, 0xc6, 0xf4, 0x4c, 0x42, 0xe9,
    0xa6, 0x37, 0xed, 0x6b, 0x0b, 0xff, 0x5c, 0xb6, 0xf4, 0x06, 0xb7, 0xed,
    0xee, 0x38, 0x6b, 0xfb, 0x5a, 0x89, 0x9f, 0xa5, 0xae, 0x9f, 0x24, 0x11,
    0x7c, 0x4b, 0x1f, 0xe6, 0x49, 0x28, 0x66, 0x51, 0xec, 0xe4, 0x5b, 0x3d,
    0xc2, 0x00, 0x7c, 0xb8, 0xa1, 0x63, 0xbf, 0x05, 0x98, 0xda, 0x48, 0x36,
    0x1c, 0x55, 0xd3, 0x9a, 0x69, 0x16, 0x3f, 0xa8, 0xfd, 0x24, 0xcf, 0x5f,
    0x83, 0x65, 0x5d, 0x23, 0xdc, 0xa3, 0xad, 0x96, 0x1c, 0x62, 0xf3, 0x56,
    0x20, 0x85, 0x52, 0xbb, 0x9e, 0xd5, 0x29, 0x07, 0x70, 0x96, 0x96, 0x6d,
    0x67, 0x0c, 0x35, 0x4e, 0x4a, 0xbc, 0x98, 0x04, 0xf1, 0x74, 0x6c, 0x08,
    0xca, 0x18, 0x21, 0x7c, 0x32, 0x90, 0x5e, 0x46, 0x2e, 0x36, 0xce, 0x3b,
    0xe3, 0x9e, 0x77, 0x2c, 0x18, 0x0e, 0x86, 0x03, 0x9b, 0x27, 0x83, 0xa2,
    0xec, 0x07, 0xa2, 0x8f, 0xb5, 0xc5, 0x5d, 0xf0, 0x6f, 0x4c, 0x52, 0xc9,
    0xde, 0x2b, 0xcb, 0xf6, 0x95, 0x58, 0x17, 0x18, 0x39, 0x95, 0x49, 0x7c,
    0xea, 0x95, 0x6a, 0xe5, 0x15, 0xd2, 0x26, 0x18, 0x98, 0xfa, 0x05, 0x10,
    0x15, 0x72, 0x8e, 0x5a, 0x8a, 0xaa, 0xc4, 0x2d, 0xad, 0x33, 0x17, 0x0d,
    0x04, 0x50, 0x7a, 0x33, 0xa8, 0x55, 0x21, 0xab, 0xdf, 0x1c, 0xba, 0x64,
    0xec, 0xfb, 0x85, 0x04, 0x58, 0xdb, 0xef, 0x0a, 0x8a, 0xea, 0x71, 0x57,
    0x5d, 0x06, 0x0c, 0x7d, 0xb3, 0x97, 0x0f, 0x85, 0xa6, 0xe1, 0xe4, 0xc7,
    0xab, 0xf5, 0xae, 0x8c, 0xdb, 0x09, 0x33, 0xd7, 0x1e, 0x8c, 0x94, 0xe0,
    0x4a, 0x25, 0x61, 0x9d, 0xce, 0xe3, 0xd2, 0x26, 0x1a, 0xd2, 0xee, 0x6b,
    0xf1, 0x2f, 0xfa, 0x06, 0xd9, 0x8a, 0x08, 0x64, 0xd8, 0x76, 0x02, 0x73,
    0x3e, 0xc8, 0x6a, 0x64, 0x52, 0x1f, 0x2b, 0x18, 0x17, 0x7b, 0x20, 0x0c,
    0xbb, 0xe1, 0x17, 0x57, 0x7a, 0x61, 0x5d, 0x6c, 0x77, 0x09, 0x88, 0xc0,
    0xba, 0xd9, 0x46, 0xe2, 0x08, 0xe2, 0x4f, 0xa0, 0x74, 0xe5, 0xab, 0x31,
    0x43, 0xdb, 0x5b, 0xfc, 0xe0, 0xfd, 0x10, 0x8e, 0x4b, 0x82, 0xd1, 0x20,
    0xa9, 0x3a, 0xd2, 0xca, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];

// Group generator
const GENERATOR: u8 = 5;

fn modulus() -> BigUint {
    BigUint::from_bytes_be(&MODULUS)
}

fn generator() -> BigUint {
    BigUint::from(u32::from(GENERATOR))
}

// Zero-left-pad to the modulus length; oversized input passes through
fn pad(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; MODULUS_SIZE.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

// k = H(N | PAD(g))
fn multiplier() -> BigUint {
    let k = sha512(&[&MODULUS, &pad(&[GENERATOR])]);
    BigUint::from_bytes_be(&k)
}

// x = H(s | H(I | ":" | P))
fn private_x(username: &str, password: &str, salt: &[u8]) -> BigUint {
    let inner = sha512(&[username.as_bytes(), b":", password.as_bytes()]);
    let x = sha512(&[salt, &inner]);
    BigUint::from_bytes_be(&x)
}

/// Generate the 16-byte SRP salt
#[must_use]
pub fn generate_salt() -> [u8; lengths::SRP_SALT] {
    let mut salt = [0u8; lengths::SRP_SALT];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate the 32-byte server private value `b`
#[must_use]
pub fn generate_private_key() -> [u8; 32] {
    let mut b = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut b);
    b
}

/// Password verifier `v = g^x mod N`, big-endian at natural length
#[must_use]
pub fn compute_verifier(username: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    let x = private_x(username, password, salt);
    generator().modpow(&x, &modulus()).to_bytes_be()
}

/// Server public value `B = (k*v + g^b) mod N`, big-endian at natural length
#[must_use]
pub fn compute_public_key(verifier: &[u8], b: &[u8]) -> Vec<u8> {
    let n = modulus();
    let v = BigUint::from_bytes_be(verifier);
    let b = BigUint::from_bytes_be(b);

    let kv = multiplier() * v;
    let gb = generator().modpow(&b, &n);
    ((kv + gb) % n).to_bytes_be()
}

// u = H(PAD(A) | PAD(B))
fn scrambler(a_pub: &[u8], b_pub: &[u8]) -> BigUint {
    let a_min = BigUint::from_bytes_be(a_pub).to_bytes_be();
    let b_min = BigUint::from_bytes_be(b_pub).to_bytes_be();
    let u = sha512(&[&pad(&a_min), &pad(&b_min)]);
    BigUint::from_bytes_be(&u)
}

/// Session key `K = H(S)` with `S = (A * v^u)^b mod N`
///
/// # Errors
///
/// Rejects a client public value congruent to zero and a zero scrambling
/// parameter, both of which would let a bogus client force `S = 0`.
pub fn session_key(
    a_pub: &[u8],
    b_pub: &[u8],
    b: &[u8],
    verifier: &[u8],
) -> Result<[u8; 64], CryptoError> {
    let n = modulus();
    let a = BigUint::from_bytes_be(a_pub);
    if (&a % &n).is_zero() {
        return Err(CryptoError::SrpError("client public value is zero mod N"));
    }

    let u = scrambler(a_pub, b_pub);
    if u.is_zero() {
        return Err(CryptoError::SrpError("scrambling parameter is zero"));
    }

    let v = BigUint::from_bytes_be(verifier);
    let b = BigUint::from_bytes_be(b);

    let base = (a * v.modpow(&u, &n)) % &n;
    let premaster = base.modpow(&b, &n);
    Ok(sha512(&[&premaster.to_bytes_be()]))
}

/// Expected client proof `M = H(H(N) ⊕ H(g) | H(I) | s | A | B | K)`
///
/// `A` and `B` are hashed at natural length, the salt and session key raw.
#[must_use]
pub fn proof_m(
    username: &str,
    salt: &[u8],
    a_pub: &[u8],
    b_pub: &[u8],
    session_key: &[u8],
) -> [u8; 64] {
    let mut group_hash = sha512(&[&MODULUS]);
    let generator_hash = sha512(&[&[GENERATOR]]);
    for (lhs, rhs) in group_hash.iter_mut().zip(generator_hash.iter()) {
        *lhs ^= rhs;
    }

    let identity_hash = sha512(&[username.as_bytes()]);
    let a_min = BigUint::from_bytes_be(a_pub).to_bytes_be();
    let b_min = BigUint::from_bytes_be(b_pub).to_bytes_be();

    sha512(&[&group_hash, &identity_hash, salt, &a_min, &b_min, session_key])
}

/// Server proof `H(A | M | K)`, with `A` exactly as received on the wire
#[must_use]
pub fn server_proof(a_pub: &[u8], m: &[u8], session_key: &[u8]) -> [u8; 64] {
    sha512(&[a_pub, m, session_key])
}

/// Compare the client proof against the expected `M`
#[must_use]
pub fn verify_client_proof(expected_m: &[u8; 64], client_proof: &[u8]) -> bool {
    client_proof.len() == expected_m.len()
        && expected_m
            .iter()
            .zip(client_proof.iter())
            .fold(0u8, |acc, (lhs, rhs)| acc | (lhs ^ rhs))
            == 0
}
