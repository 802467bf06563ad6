//! Persistent accessory state
//!
//! A fixed 108-byte header followed by 72-byte dynamic blocks, version
//! 0x02 (all sizes padded to 32-bit multiples):
//!
//! ```text
//! 0x00  u32   version = 0x02
//! 0x04  u32   flags (byte 0 bit 0 = accessory long-term keys generated)
//! 0x08  [32]  accessory Ed25519 public key
//! 0x28  [64]  accessory Ed25519 keypair bytes
//! 0x68  u32   dynamic block count, big-endian
//! 0x6c        dynamic blocks: 36-byte id | 32-byte public key | 4-byte flags
//! ```
//!
//! A missing or mismatched version word reformats the medium at startup;
//! the v0x01 unpadded layout is not migrated.

use thiserror::Error;

mod backend;


pub use backend::{FileBackend, MemoryBackend, StorageBackend};

/// Storage format version word
pub const STORAGE_VERSION: u32 = 0x02;

/// Maximum number of paired-controller records
pub const MAX_PAIRED_DEVICES: u32 = 16;

/// Admin bit in a paired device's permission flags
pub const PERMISSION_ADMIN: u8 = 0x01;

const OFF_VERSION: u64 = 0x00;
const OFF_FLAGS: u64 = 0x04;
const OFF_LTPK: u64 = 0x08;
const OFF_LTSK: u64 = 0x28;
const OFF_COUNT: u64 = 0x68;
const OFF_DYNAMIC: u64 = 0x6c;

const FIXED_SIZE: usize = 0x6c;
const BLOCK_SIZE: u64 = 72;

const ID_LEN: usize = 36;
const KEY_LEN: usize = 32;

// Bit 0 of the cryptography flags byte
const FLAG_LT_KEYS: u8 = 0x01;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend I/O failure; fatal to the operation, no retry
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Paired-device table is full
    #[error("paired device table full")]
    TableFull,
}

/// One paired-controller record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    /// 36-byte pairing identifier
    pub identifier: [u8; ID_LEN],
    /// Controller Ed25519 long-term public key
    pub public_key: [u8; KEY_LEN],
    /// Permission flags, byte 0 carries the HAP permission bits
    pub flags: [u8; 4],
}

impl PairedDevice {
    /// Whether the controller holds admin permissions
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.flags[0] & PERMISSION_ADMIN != 0
    }
}

/// Persistent store for the accessory identity and paired controllers
pub struct PersistentStore {
    backend: Box<dyn StorageBackend>,
    flags: [u8; 4],
    count: u32,
}

impl PersistentStore {
    /// Open the store, formatting the medium if the version word is absent
    /// or not [`STORAGE_VERSION`]
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn new(backend: Box<dyn StorageBackend>) -> Result<Self, StorageError> {
        let mut store = Self {
            backend,
            flags: [0u8; 4],
            count: 0,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&mut self) -> Result<(), StorageError> {
        let mut word = [0u8; 4];
        let version = match self.backend.read(OFF_VERSION, &mut word) {
            Ok(()) => Some(u32::from_be_bytes(word)),
            Err(_) => None,
        };

        if version == Some(STORAGE_VERSION) {
            self.backend.read(OFF_FLAGS, &mut self.flags)?;
            self.backend.read(OFF_COUNT, &mut word)?;
            self.count = u32::from_be_bytes(word);
            Ok(())
        } else {
            tracing::warn!(?version, "storage version mismatch, formatting");
            self.format()
        }
    }

    /// Zero the fixed header and drop every dynamic block
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn format(&mut self) -> Result<(), StorageError> {
        self.backend.write(OFF_VERSION, &[0u8; FIXED_SIZE])?;
        self.backend
            .write(OFF_VERSION, &STORAGE_VERSION.to_be_bytes())?;
        self.flags = [0u8; 4];
        self.count = 0;
        self.backend.write(OFF_COUNT, &0u32.to_be_bytes())?;
        Ok(())
    }

    /// Whether accessory long-term keys have been generated and stored
    #[must_use]
    pub fn have_accessory_lt_keys(&self) -> bool {
        self.flags[0] & FLAG_LT_KEYS != 0
    }

    /// Store the accessory long-term keys and set the generated flag
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn set_accessory_lt_keys(
        &mut self,
        public_key: &[u8; 32],
        keypair: &[u8; 64],
    ) -> Result<(), StorageError> {
        self.backend.write(OFF_LTPK, public_key)?;
        self.backend.write(OFF_LTSK, keypair)?;
        self.flags[0] |= FLAG_LT_KEYS;
        self.write_flags()
    }

    /// Read back the accessory long-term keys
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn accessory_lt_keys(&mut self) -> Result<([u8; 32], [u8; 64]), StorageError> {
        let mut public_key = [0u8; 32];
        let mut keypair = [0u8; 64];
        self.backend.read(OFF_LTPK, &mut public_key)?;
        self.backend.read(OFF_LTSK, &mut keypair)?;
        Ok((public_key, keypair))
    }

    /// Read back the accessory long-term public key
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn accessory_ltpk(&mut self) -> Result<[u8; 32], StorageError> {
        let mut public_key = [0u8; 32];
        self.backend.read(OFF_LTPK, &mut public_key)?;
        Ok(public_key)
    }

    /// Number of paired controllers
    #[must_use]
    pub fn paired_device_count(&self) -> u32 {
        self.count
    }

    /// Store a paired controller, overwriting in place when the identifier
    /// already exists
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::TableFull`] when the table holds
    /// [`MAX_PAIRED_DEVICES`] records, or an I/O error.
    pub fn add_paired_device(
        &mut self,
        identifier: &[u8; ID_LEN],
        public_key: &[u8; KEY_LEN],
        flags: [u8; 4],
    ) -> Result<(), StorageError> {
        let record = PairedDevice {
            identifier: *identifier,
            public_key: *public_key,
            flags,
        };

        if let Some(slot) = self.find_slot(identifier)? {
            return self.write_block(slot, &record);
        }

        if self.count >= MAX_PAIRED_DEVICES {
            return Err(StorageError::TableFull);
        }

        self.write_block(self.count, &record)?;
        self.set_count(self.count + 1)
    }

    /// Remove a paired controller, returning whether a record was removed
    ///
    /// The vacated slot is filled with the final block so the table stays
    /// dense.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn remove_paired_device(&mut self, identifier: &[u8; ID_LEN]) -> Result<bool, StorageError> {
        let Some(slot) = self.find_slot(identifier)? else {
            return Ok(false);
        };

        let last = self.count - 1;
        if slot != last {
            let tail = self.read_block(last)?;
            self.write_block(slot, &tail)?;
        }
        self.set_count(last)?;
        Ok(true)
    }

    /// Look up a paired controller by identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn retrieve_paired_device(
        &mut self,
        identifier: &[u8; ID_LEN],
    ) -> Result<Option<PairedDevice>, StorageError> {
        match self.find_slot(identifier)? {
            Some(slot) => Ok(Some(self.read_block(slot)?)),
            None => Ok(None),
        }
    }

    /// All paired controllers in table order
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn paired_devices(&mut self) -> Result<Vec<PairedDevice>, StorageError> {
        (0..self.count).map(|slot| self.read_block(slot)).collect()
    }

    /// Drop every pairing, keeping the accessory identity
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub fn clear_pairings(&mut self) -> Result<(), StorageError> {
        self.set_count(0)
    }

    fn write_flags(&mut self) -> Result<(), StorageError> {
        self.backend.write(OFF_FLAGS, &self.flags)?;
        Ok(())
    }

    fn set_count(&mut self, count: u32) -> Result<(), StorageError> {
        self.backend.write(OFF_COUNT, &count.to_be_bytes())?;
        self.count = count;
        Ok(())
    }

    fn find_slot(&mut self, identifier: &[u8; ID_LEN]) -> Result<Option<u32>, StorageError> {
        for slot in 0..self.count {
            if self.read_block(slot)?.identifier == *identifier {
                return Ok(Some(slot));
            }
        }
        Ok(None)
    }

    fn read_block(&mut self, slot: u32) -> Result<PairedDevice, StorageError> {
        let base = OFF_DYNAMIC + u64::from(slot) * BLOCK_SIZE;
        let mut identifier = [0u8; ID_LEN];
        let mut public_key = [0u8; KEY_LEN];
        let mut flags = [0u8; 4];
        self.backend.read(base, &mut identifier)?;
        self.backend.read(base + ID_LEN as u64, &mut public_key)?;
        self.backend
            .read(base + (ID_LEN + KEY_LEN) as u64, &mut flags)?;
        Ok(PairedDevice {
            identifier,
            public_key,
            flags,
        })
    }

    fn write_block(&mut self, slot: u32, record: &PairedDevice) -> Result<(), StorageError> {
        let base = OFF_DYNAMIC + u64::from(slot) * BLOCK_SIZE;
        self.backend.write(base, &record.identifier)?;
        self.backend
            .write(base + ID_LEN as u64, &record.public_key)?;
        self.backend
            .write(base + (ID_LEN + KEY_LEN) as u64, &record.flags)?;
        Ok(())
    }
}
