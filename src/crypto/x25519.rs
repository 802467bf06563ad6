use x25519_dalek::{PublicKey, StaticSecret};

use super::{lengths, CryptoError};

/// Ephemeral Curve25519 keypair for the verify exchange
///
/// The secret lives for the duration of one Pair-Verify attempt (M1..M4),
/// hence `StaticSecret` rather than the single-use dalek ephemeral type.
pub struct EphemeralKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl EphemeralKeypair {
    /// Generate a fresh keypair (clamped secret)
    #[must_use]
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Public key bytes
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// ECDH against a peer public key, yielding the 32-byte shared secret
    ///
    /// # Errors
    ///
    /// Returns an error if the peer key is not 32 bytes.
    pub fn diffie_hellman(&self, peer_public: &[u8]) -> Result<[u8; 32], CryptoError> {
        let bytes: [u8; 32] =
            peer_public
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: lengths::X25519_PUBLIC_KEY,
                    actual: peer_public.len(),
                })?;
        let shared = self.secret.diffie_hellman(&PublicKey::from(bytes));
        Ok(shared.to_bytes())
    }
}
