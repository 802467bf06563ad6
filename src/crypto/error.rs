use thiserror::Error;

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key or signature buffer has the wrong size
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length supplied by the caller
        actual: usize,
    },

    /// Key bytes do not decode to a valid public key
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Ed25519 signature check failed
    #[error("signature verification failed")]
    VerificationFailed,

    /// AEAD open failed (bad tag or malformed envelope)
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD seal failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// HKDF expansion failed
    #[error("key derivation failed")]
    KeyDerivationFailed,

    /// SRP group arithmetic rejected its input
    #[error("SRP error: {0}")]
    SrpError(&'static str),
}
