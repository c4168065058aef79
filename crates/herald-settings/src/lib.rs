//! # herald-settings
//!
//! Layered configuration for the hub and the clients.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HeraldSettings::default()`]
//! 2. **User file**: `~/.herald/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HERALD_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = HeraldSettings::default();
        assert_eq!(settings.hub.port, 5000);
        assert_eq!(settings.hub.history_limit, 50);
        assert!(settings.hub.admin_token.is_none());
        assert_eq!(settings.client.hub_url, "http://127.0.0.1:5000");
        assert_eq!(settings.client.default_language, "en");
        assert!(settings.client.sound_enabled);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.validate().is_ok());
    }
}
