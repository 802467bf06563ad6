//! Service advertisement
//!
//! The pairing core only decides *when* the `_hap._tcp` record changes
//! (the `SdNeededUpdate` event, fired when the pairing count crosses the
//! unpaired/paired boundary); publishing it is delegated to an
//! [`Announce`] implementation. The `mdns` feature ships one backed by
//! `mdns-sd`.

use crate::error::HapError;

#[cfg(feature = "mdns")]
mod mdns;

#[cfg(feature = "mdns")]
pub use mdns::MdnsAnnouncer;

/// Everything needed to (re)publish the accessory service record
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    /// Instance name
    pub name: String,
    /// Pairing endpoint port
    pub port: u16,
    /// TXT entries (`c#`, `ff`, `id`, `md`, `pv`, `s#`, `sf`, `ci`)
    pub txt: Vec<(String, String)>,
}

impl ServiceRecord {
    /// Value of one TXT entry
    #[must_use]
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

/// Publisher of the accessory service record
pub trait Announce {
    /// Publish or refresh the record
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying responder rejects the record.
    fn update(&mut self, record: &ServiceRecord) -> Result<(), HapError>;
}
