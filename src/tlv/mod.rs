//! TLV8 codec for `HomeKit` pairing messages
//!
//! Pairing bodies are sequences of type-length-value items with one-byte
//! types and lengths. A logical value longer than 255 bytes is carried as a
//! run of items of the same type whose lengths, except the last, are exactly
//! 255. A run whose final fragment is exactly 255 bytes is terminated by a
//! zero-length [`TlvType::Separator`] so that a following item of the same
//! type is not folded into the value.
//!
//! Parsed chains borrow the request buffer ([`Bytes`] slices); constructed
//! chains own their value bytes.

use bytes::Bytes;
use thiserror::Error;


/// Largest value a single TLV fragment can carry
pub const FRAGMENT_SIZE: usize = 255;

/// TLV type codes used in `HomeKit` pairing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvType {
    /// Pairing method
    Method = 0x00,
    /// Pairing identifier
    Identifier = 0x01,
    /// Salt for SRP
    Salt = 0x02,
    /// Public key (SRP or Curve25519)
    PublicKey = 0x03,
    /// SRP proof
    Proof = 0x04,
    /// Encrypted data with trailing auth tag
    EncryptedData = 0x05,
    /// Pairing state/sequence number
    State = 0x06,
    /// Error code
    Error = 0x07,
    /// Retry delay
    RetryDelay = 0x08,
    /// Certificate
    Certificate = 0x09,
    /// Ed25519 signature
    Signature = 0x0A,
    /// Pairing permissions
    Permissions = 0x0B,
    /// Fragment data
    FragmentData = 0x0C,
    /// Fragment last
    FragmentLast = 0x0D,
    /// Zero-length item separating runs of same-typed items
    Separator = 0xFF,
}

/// TLV codec errors
#[derive(Debug, Error)]
pub enum TlvError {
    /// A required type is absent from the chain
    #[error("missing required TLV type 0x{0:02x}")]
    MissingType(u8),

    /// A value has the wrong length for its field
    #[error("invalid length for TLV type 0x{0:02x}: {1}")]
    InvalidLength(u8, usize),
}

/// One parsed or constructed TLV item
#[derive(Debug, Clone)]
pub struct TlvItem {
    kind: u8,
    value: Bytes,
    offset: usize,
}

impl TlvItem {
    /// Item type byte
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Fragment length (0..=255)
    #[must_use]
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the fragment carries no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// A doubly-traversable chain of TLV items
#[derive(Debug, Clone, Default)]
pub struct TlvChain {
    items: Vec<TlvItem>,
}

impl TlvChain {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a buffer into a chain, strictly left to right.
    ///
    /// No validation is performed beyond buffer bounds: an item whose
    /// declared length runs past the end of the buffer is silently
    /// truncated, as is a trailing lone type byte. Upstream validates
    /// required types and lengths.
    #[must_use]
    pub fn parse(data: &Bytes) -> Self {
        let mut items = Vec::new();
        let mut pos = 0usize;

        while pos + 2 <= data.len() {
            let kind = data[pos];
            let declared = data[pos + 1] as usize;
            let start = pos + 2;
            let end = (start + declared).min(data.len());

            items.push(TlvItem {
                kind,
                value: data.slice(start..end),
                offset: 0,
            });
            pos = start + declared;
        }

        Self { items }
    }

    /// Number of items (fragments) in the chain
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Find the first item of the given type, searching from the chain head
    #[must_use]
    pub fn find(&self, kind: TlvType) -> Option<usize> {
        self.items.iter().position(|item| item.kind == kind as u8)
    }

    /// Find the next item of the given type after `index`
    #[must_use]
    pub fn find_next(&self, index: usize, kind: TlvType) -> Option<usize> {
        self.items
            .iter()
            .skip(index + 1)
            .position(|item| item.kind == kind as u8)
            .map(|i| index + 1 + i)
    }

    /// Total value length of the item at `index` plus all directly
    /// following items of the same type
    #[must_use]
    pub fn value_length(&self, index: usize) -> usize {
        let kind = self.items[index].kind;
        self.items[index..]
            .iter()
            .take_while(|item| item.kind == kind)
            .map(TlvItem::len)
            .sum()
    }

    /// Consume up to `buf.len()` bytes starting at the read offset of the
    /// item at `index`, crossing into following fragments only while they
    /// carry the same type and the current fragment is a full 255 bytes.
    ///
    /// The read offset is stateful; use [`TlvChain::reset`] to rewind the
    /// whole chain. Returns the number of bytes copied.
    pub fn read(&mut self, mut index: usize, buf: &mut [u8]) -> usize {
        let mut copied = 0usize;

        // Skip fragments a previous read exhausted
        while index < self.items.len() && self.items[index].offset == FRAGMENT_SIZE {
            match self.items.get(index + 1) {
                Some(next) if next.kind == self.items[index].kind => index += 1,
                _ => return copied,
            }
        }

        while index < self.items.len() && copied < buf.len() {
            let item = &mut self.items[index];
            let available = item.len() - item.offset;
            let take = available.min(buf.len() - copied);

            buf[copied..copied + take].copy_from_slice(&item.value[item.offset..item.offset + take]);
            item.offset += take;
            copied += take;

            if item.offset >= FRAGMENT_SIZE {
                match self.items.get(index + 1) {
                    Some(next) if next.kind == self.items[index].kind => index += 1,
                    _ => return copied,
                }
            } else if available == take {
                // Tail fragment fully consumed
                return copied;
            }
        }

        copied
    }

    /// Rewind every read offset in the chain
    pub fn reset(&mut self) {
        for item in &mut self.items {
            item.offset = 0;
        }
    }

    /// Prepend a value to the chain, splitting it into 255-byte fragments.
    ///
    /// If the final fragment is exactly 255 bytes a zero-length separator is
    /// appended to the new run so later concatenation of same-typed items
    /// does not silently extend the value.
    pub fn insert(&mut self, kind: TlvType, data: &[u8]) {
        let owned = Bytes::copy_from_slice(data);
        let mut run = Vec::with_capacity(owned.len() / FRAGMENT_SIZE + 2);

        if owned.is_empty() {
            run.push(TlvItem {
                kind: kind as u8,
                value: Bytes::new(),
                offset: 0,
            });
        }

        let mut pos = 0usize;
        while pos < owned.len() {
            let end = (pos + FRAGMENT_SIZE).min(owned.len());
            run.push(TlvItem {
                kind: kind as u8,
                value: owned.slice(pos..end),
                offset: 0,
            });
            pos = end;
        }

        if run.last().is_some_and(|item| item.len() == FRAGMENT_SIZE) {
            run.push(TlvItem {
                kind: TlvType::Separator as u8,
                value: Bytes::new(),
                offset: 0,
            });
        }

        run.append(&mut self.items);
        self.items = run;
    }

    /// Encoded length of the whole chain
    #[must_use]
    pub fn chain_length(&self) -> usize {
        self.items.iter().map(|item| 2 + item.len()).sum()
    }

    /// Emit `type, length, value` for every item in order
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.chain_length());
        for item in &self.items {
            out.push(item.kind);
            #[allow(clippy::cast_possible_truncation)]
            out.push(item.len() as u8);
            out.extend_from_slice(&item.value);
        }
        out
    }

    // === Typed accessors used by the pairing manager ===

    /// Reassembled value of the first run of the given type
    #[must_use]
    pub fn value_of(&self, kind: TlvType) -> Option<Vec<u8>> {
        let index = self.find(kind)?;
        let mut out = vec![0u8; self.value_length(index)];
        let mut probe = self.clone();
        probe.reset();
        let read = probe.read(index, &mut out);
        out.truncate(read);
        Some(out)
    }

    /// Single-byte value of the first item of the given type
    #[must_use]
    pub fn byte_of(&self, kind: TlvType) -> Option<u8> {
        let index = self.find(kind)?;
        self.items[index].value.first().copied()
    }

    /// Reassembled value, or a [`TlvError::MissingType`] error
    ///
    /// # Errors
    ///
    /// Returns an error if no item of the given type is present.
    pub fn require(&self, kind: TlvType) -> Result<Vec<u8>, TlvError> {
        self.value_of(kind).ok_or(TlvError::MissingType(kind as u8))
    }

    /// Reassembled value checked against an exact length
    ///
    /// # Errors
    ///
    /// Returns an error if the type is absent or the value length differs
    /// from `len`.
    pub fn require_exact(&self, kind: TlvType, len: usize) -> Result<Vec<u8>, TlvError> {
        let value = self.require(kind)?;
        if value.len() == len {
            Ok(value)
        } else {
            Err(TlvError::InvalidLength(kind as u8, value.len()))
        }
    }
}

/// Pairing method values carried in [`TlvType::Method`]
pub mod methods {
    /// Pair-Setup
    pub const PAIR_SETUP: u8 = 0;
    /// Pair-Setup with `MFi` auth
    pub const PAIR_SETUP_AUTH: u8 = 1;
    /// Pair-Verify
    pub const PAIR_VERIFY: u8 = 2;
    /// Add pairing
    pub const ADD_PAIRING: u8 = 3;
    /// Remove pairing
    pub const REMOVE_PAIRING: u8 = 4;
    /// List pairings
    pub const LIST_PAIRINGS: u8 = 5;
}
