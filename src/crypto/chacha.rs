use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, Key, Nonce, Tag};
use zeroize::Zeroize;

use super::{lengths, CryptoError};

/// One ChaCha20-Poly1305 seal or open operation
///
/// Mirrors the envelope the pairing state machines pass through the
/// dispatcher: key, short ASCII nonce, optional AAD, and exactly one of
/// ciphertext or plaintext populated. A successful decrypt consumes the
/// ciphertext, so [`CryptoEnvelope::decrypt_succeeded`] is simply "the
/// ciphertext is gone".
pub struct CryptoEnvelope {
    key: [u8; 32],
    nonce: Vec<u8>,
    aad: Vec<u8>,
    /// Ciphertext without the trailing tag
    pub ciphertext: Option<Vec<u8>>,
    /// Poly1305 tag
    pub tag: [u8; 16],
    /// Recovered or to-be-sealed plaintext
    pub plaintext: Option<Vec<u8>>,
}

impl Drop for CryptoEnvelope {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl CryptoEnvelope {
    /// Build an envelope around received `ciphertext ‖ tag` wire bytes
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::DecryptionFailed`] if the wire data is too
    /// short to carry a tag, or an error for an out-of-range nonce.
    pub fn for_decrypt(key: [u8; 32], nonce: &[u8], wire: &[u8]) -> Result<Self, CryptoError> {
        if wire.len() < lengths::CHACHA_TAG {
            return Err(CryptoError::DecryptionFailed);
        }
        let (data, tag) = wire.split_at(wire.len() - lengths::CHACHA_TAG);
        let mut envelope = Self::empty(key, nonce)?;
        envelope.ciphertext = Some(data.to_vec());
        envelope.tag.copy_from_slice(tag);
        Ok(envelope)
    }

    /// Build an envelope around plaintext to be sealed
    ///
    /// # Errors
    ///
    /// Returns an error for an out-of-range nonce.
    pub fn for_encrypt(key: [u8; 32], nonce: &[u8], plaintext: Vec<u8>) -> Result<Self, CryptoError> {
        let mut envelope = Self::empty(key, nonce)?;
        envelope.plaintext = Some(plaintext);
        Ok(envelope)
    }

    fn empty(key: [u8; 32], nonce: &[u8]) -> Result<Self, CryptoError> {
        if nonce.is_empty() || nonce.len() > lengths::CHACHA_NONCE {
            return Err(CryptoError::InvalidKeyLength {
                expected: lengths::CHACHA_NONCE,
                actual: nonce.len(),
            });
        }
        Ok(Self {
            key,
            nonce: nonce.to_vec(),
            aad: Vec::new(),
            ciphertext: None,
            tag: [0u8; 16],
            plaintext: None,
        })
    }

    /// Attach associated data
    #[must_use]
    pub fn with_aad(mut self, aad: &[u8]) -> Self {
        self.aad = aad.to_vec();
        self
    }

    /// Open the ciphertext in place.
    ///
    /// On success the ciphertext is released and the plaintext populated;
    /// on tag failure the envelope is left untouched so the caller can
    /// observe the failure via [`CryptoEnvelope::decrypt_succeeded`].
    pub fn decrypt(&mut self) {
        let Some(ciphertext) = self.ciphertext.as_ref() else {
            return;
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut buffer = ciphertext.clone();
        let outcome = cipher.decrypt_in_place_detached(
            Nonce::from_slice(&self.padded_nonce()),
            &self.aad,
            &mut buffer,
            Tag::from_slice(&self.tag),
        );

        if outcome.is_ok() {
            self.plaintext = Some(buffer);
            self.ciphertext = None;
        }
    }

    /// Whether the last [`CryptoEnvelope::decrypt`] authenticated
    #[must_use]
    pub fn decrypt_succeeded(&self) -> bool {
        self.ciphertext.is_none()
    }

    /// Seal the plaintext in place, producing ciphertext and tag
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailed`] if sealing fails.
    pub fn encrypt(&mut self) -> Result<(), CryptoError> {
        let Some(plaintext) = self.plaintext.take() else {
            return Err(CryptoError::EncryptionFailed);
        };

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let mut buffer = plaintext;
        let tag = cipher
            .encrypt_in_place_detached(
                Nonce::from_slice(&self.padded_nonce()),
                &self.aad,
                &mut buffer,
            )
            .map_err(|_| CryptoError::EncryptionFailed)?;

        self.tag.copy_from_slice(&tag);
        self.ciphertext = Some(buffer);
        Ok(())
    }

    /// `ciphertext ‖ tag` for the wire
    #[must_use]
    pub fn wire_output(&self) -> Option<Vec<u8>> {
        let ciphertext = self.ciphertext.as_ref()?;
        let mut out = Vec::with_capacity(ciphertext.len() + lengths::CHACHA_TAG);
        out.extend_from_slice(ciphertext);
        out.extend_from_slice(&self.tag);
        Some(out)
    }

    // Short nonces occupy the low-order bytes of the 12-byte buffer
    fn padded_nonce(&self) -> [u8; 12] {
        let mut padded = [0u8; 12];
        padded[lengths::CHACHA_NONCE - self.nonce.len()..].copy_from_slice(&self.nonce);
        padded
    }
}
