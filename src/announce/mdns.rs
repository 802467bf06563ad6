use std::collections::HashMap;

use mdns_sd::{ServiceDaemon, ServiceInfo};

use super::{Announce, ServiceRecord};
use crate::error::HapError;

const SERVICE_TYPE: &str = "_hap._tcp.local.";

/// `mdns-sd` backed announcer
pub struct MdnsAnnouncer {
    daemon: ServiceDaemon,
    registered: Option<String>,
}

impl MdnsAnnouncer {
    /// Start the mDNS responder
    ///
    /// # Errors
    ///
    /// Returns an error if the responder cannot start.
    pub fn new() -> Result<Self, HapError> {
        let daemon = ServiceDaemon::new().map_err(|error| HapError::Announce(error.to_string()))?;
        Ok(Self {
            daemon,
            registered: None,
        })
    }
}

impl Announce for MdnsAnnouncer {
    fn update(&mut self, record: &ServiceRecord) -> Result<(), HapError> {
        if let Some(fullname) = self.registered.take() {
            // Replacing the registration refreshes the TXT data
            let _ = self.daemon.unregister(&fullname);
        }

        let properties: HashMap<String, String> = record.txt.iter().cloned().collect();
        let hostname = format!("{}.local.", record.name.replace(' ', "-"));
        let info = ServiceInfo::new(
            SERVICE_TYPE,
            &record.name,
            &hostname,
            "",
            record.port,
            properties,
        )
        .map_err(|error| HapError::Announce(error.to_string()))?
        .enable_addr_auto();

        let fullname = info.get_fullname().to_string();
        self.daemon
            .register(info)
            .map_err(|error| HapError::Announce(error.to_string()))?;
        tracing::debug!(%fullname, "service record published");
        self.registered = Some(fullname);
        Ok(())
    }
}
