use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use super::{lengths, CryptoError};

/// Ed25519 long-term identity keypair
///
/// Persisted as 32 public bytes plus the 64-byte keypair form
/// (seed followed by public key), matching the storage header layout.
pub struct LongTermKeypair {
    signing_key: SigningKey,
}

impl LongTermKeypair {
    /// Generate a fresh identity
    #[must_use]
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild from the persisted 64-byte keypair form
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid keypair.
    pub fn from_keypair_bytes(bytes: &[u8; 64]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_keypair_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { signing_key })
    }

    /// 64-byte keypair form for persistence
    #[must_use]
    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.signing_key.to_keypair_bytes()
    }

    /// Public key bytes
    #[must_use]
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign a message
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

/// Verify an Ed25519 signature against raw public key bytes
///
/// # Errors
///
/// Returns [`CryptoError::InvalidPublicKey`] for a malformed key and
/// [`CryptoError::VerificationFailed`] when the signature does not match.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    if public_key.len() != lengths::ED25519_PUBLIC_KEY {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::ED25519_PUBLIC_KEY,
            actual: public_key.len(),
        });
    }
    if signature.len() != lengths::ED25519_SIGNATURE {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::ED25519_SIGNATURE,
            actual: signature.len(),
        });
    }

    let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
    let verifying_key =
        VerifyingKey::from_bytes(&key_bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig_bytes: [u8; 64] = signature
        .try_into()
        .map_err(|_| CryptoError::VerificationFailed)?;

    verifying_key
        .verify(message, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| CryptoError::VerificationFailed)
}
