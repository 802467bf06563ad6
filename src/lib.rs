//! # hapd
//!
//! Accessory-side `HomeKit` Accessory Protocol pairing: Pair-Setup over
//! SRP-6a, Pair-Verify over ephemeral Curve25519, the `/pairings` admin
//! endpoint, the TLV8 codec framing it all, and the persistent store
//! holding the accessory identity and paired controllers.
//!
//! Everything runs on one cooperative thread: the dispatcher serializes
//! network activity and the multi-step SRP arithmetic as named events, so
//! a single `handle()` loop suffices even on small hosts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use hapd::{Accessory, AccessoryConfig};
//!
//! # fn main() -> Result<(), hapd::HapError> {
//! let config = AccessoryConfig::with_name("Thermostat")
//!     .setup_code("031-45-154")
//!     .storage_path("/var/lib/hapd/state.bin");
//!
//! let mut accessory = Accessory::new(config)?;
//! accessory.begin()?;
//! loop {
//!     accessory.handle();
//!     std::thread::sleep(std::time::Duration::from_millis(5));
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod accessory;
/// Service advertisement interfaces
pub mod announce;
/// Accessory configuration
pub mod config;
/// Cryptographic primitives
pub mod crypto;
mod error;
/// Cooperative event dispatcher
pub mod event;
mod net;
/// Pairing state machines
pub mod pairing;
/// Connection and session adapter
pub mod session;
/// Persistent accessory state
pub mod storage;
/// TLV8 codec
pub mod tlv;

pub use accessory::Accessory;
pub use config::AccessoryConfig;
pub use error::HapError;
pub use event::EventKind;
pub use session::{Connection, Method, Request, Session, SessionRef};
pub use tlv::{TlvChain, TlvType};
