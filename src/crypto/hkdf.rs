use hkdf::Hkdf;
use sha2::Sha512;

use super::CryptoError;

/// One-shot HKDF-SHA-512 producing the 32-byte envelope keys the pairing
/// state machines consume.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivationFailed`] if expansion fails.
pub fn derive_key(salt: &[u8], ikm: &[u8], info: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut okm = [0u8; 32];
    Hkdf::<Sha512>::new(Some(salt), ikm)
        .expand(info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivationFailed)?;
    Ok(okm)
}
