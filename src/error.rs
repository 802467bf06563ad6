use std::io;
use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StorageError;
use crate::tlv::TlvError;

/// Errors surfaced by the accessory daemon
#[derive(Debug, Error)]
pub enum HapError {
    /// Persistent storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cryptographic primitive failure
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// TLV codec failure
    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),

    /// Socket-level failure
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Setup code does not match the `XXX-XX-XXX` format
    #[error("invalid setup code: {0:?}")]
    InvalidSetupCode(String),

    /// `begin` called while the listener is already bound
    #[error("accessory already running")]
    AlreadyRunning,

    /// Service advertisement failure
    #[error("announce error: {0}")]
    Announce(String),
}
