//! Cryptographic primitives for `HomeKit` pairing
//!
//! Thin wrappers over the RustCrypto and dalek stacks, plus a hand-rolled
//! SRP-6a server (the `HomeKit` proof layout is incompatible with the
//! stock RFC 5054 crates).

mod chacha;
mod ed25519;
mod error;
mod hkdf;
pub mod srp;
mod uuid;
mod x25519;

#[cfg(test)]
mod tests;

pub use self::chacha::CryptoEnvelope;
pub use self::ed25519::{verify as ed25519_verify, LongTermKeypair};
pub use self::error::CryptoError;
pub use self::hkdf::derive_key;
pub use self::uuid::derive_uuid;
pub use self::x25519::EphemeralKeypair;

/// Lengths of the fixed-size cryptographic values
pub mod lengths {
    /// Ed25519 public key
    pub const ED25519_PUBLIC_KEY: usize = 32;
    /// Ed25519 keypair bytes as persisted (seed ‖ public)
    pub const ED25519_KEYPAIR: usize = 64;
    /// Ed25519 signature
    pub const ED25519_SIGNATURE: usize = 64;
    /// X25519 public key
    pub const X25519_PUBLIC_KEY: usize = 32;
    /// X25519 shared secret
    pub const X25519_SHARED_SECRET: usize = 32;
    /// ChaCha20-Poly1305 key
    pub const CHACHA_KEY: usize = 32;
    /// ChaCha20-Poly1305 nonce
    pub const CHACHA_NONCE: usize = 12;
    /// Poly1305 tag
    pub const CHACHA_TAG: usize = 16;
    /// SRP salt
    pub const SRP_SALT: usize = 16;
    /// SHA-512 output and SRP session key
    pub const SHA512: usize = 64;
    /// Pairing identifier (hyphenated UUID ASCII)
    pub const PAIRING_ID: usize = 36;
}
