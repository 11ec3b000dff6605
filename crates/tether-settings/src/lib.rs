//! # tether-settings
//!
//! Configuration for the Tether relay and the synthetic device.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`TetherSettings::default()`])
//! 2. **Settings file**: JSON, deep-merged over defaults
//!    (`~/.tether/settings.json` unless a path is given)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! The binaries apply their CLI flags on top and call
//! [`TetherSettings::validate`] before starting.

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
    fn re_exports_work() {
        let _settings = TetherSettings::default();
        let _path = settings_path();
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = TetherSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.relay.listen, "127.0.0.1:1337");
        assert_eq!(settings.relay.device, "127.0.0.1:1242");
        assert_eq!(settings.device.listen, "127.0.0.1:1242");
        assert_eq!(settings.logging.level, "info");
    }
}
