use sha2::{Digest, Sha512};

/// Derive a stable RFC 4122 v4-shaped UUID from arbitrary input.
///
/// The first 16 bytes of SHA-512(input) are stamped with the version and
/// variant bits and rendered as the hyphenated 36-character ASCII form.
/// Used to turn the configured device id into the accessory pairing
/// identifier.
#[must_use]
pub fn derive_uuid(input: &str) -> String {
    let digest = Sha512::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);

    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let mut out = String::with_capacity(36);
    for (i, byte) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
