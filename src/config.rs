//! Accessory configuration

use std::path::PathBuf;

use crate::error::HapError;

/// Default TCP port for the pairing endpoint
pub const DEFAULT_PORT: u16 = 5001;

/// Accessory configuration
///
/// The setup code is the 8-digit code printed on the accessory, formatted
/// `XXX-XX-XXX`. It is fixed at construction time; there is no runtime
/// re-provisioning.
#[derive(Debug, Clone)]
pub struct AccessoryConfig {
    /// Device name shown to controllers
    pub name: String,

    /// Device id in MAC-address notation, also the mDNS `id` record
    pub device_id: String,

    /// Model name (e.g. "HomeKitDevice1,1")
    pub model: String,

    /// HAP accessory category identifier
    pub category: u8,

    /// Setup code, `XXX-XX-XXX`
    pub setup_code: String,

    /// TCP listen port
    pub port: u16,

    /// Backing file for persistent state (None = in-memory, non-persistent)
    pub storage_path: Option<PathBuf>,
}

impl Default for AccessoryConfig {
    fn default() -> Self {
        Self {
            name: "HomeKit Device".to_string(),
            device_id: "F6:A4:35:E3:0A:E2".to_string(),
            model: "HomeKitDevice1,1".to_string(),
            category: 8,
            setup_code: "816-32-958".to_string(),
            port: DEFAULT_PORT,
            storage_path: None,
        }
    }
}

impl AccessoryConfig {
    /// Create with a custom name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the listen port
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the setup code
    #[must_use]
    pub fn setup_code(mut self, code: impl Into<String>) -> Self {
        self.setup_code = code.into();
        self
    }

    /// Set the persistent storage path
    #[must_use]
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`HapError::InvalidSetupCode`] if the setup code is not
    /// eight ASCII digits in `XXX-XX-XXX` form.
    pub fn validate(&self) -> Result<(), HapError> {
        let bytes = self.setup_code.as_bytes();
        let well_formed = bytes.len() == 10
            && bytes[3] == b'-'
            && bytes[6] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| matches!(i, 3 | 6) || b.is_ascii_digit());

        if well_formed {
            Ok(())
        } else {
            Err(HapError::InvalidSetupCode(self.setup_code.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(AccessoryConfig::default().validate().is_ok());
    }

    #[test]
    fn malformed_setup_codes_rejected() {
        for code in ["12345678", "123-456-78", "abc-de-fgh", "031-45-15", ""] {
            let config = AccessoryConfig::default().setup_code(code);
            assert!(config.validate().is_err(), "accepted {code:?}");
        }
    }

    #[test]
    fn builder_round_trip() {
        let config = AccessoryConfig::with_name("Bridge")
            .port(5002)
            .setup_code("031-45-154");
        assert_eq!(config.name, "Bridge");
        assert_eq!(config.port, 5002);
        assert!(config.validate().is_ok());
    }
}
