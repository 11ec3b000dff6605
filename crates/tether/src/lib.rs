//! # tether
//!
//! Startup plumbing shared by the `tether-relay` and `tether-device`
//! binaries: settings resolution and logger initialization.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tether_settings::{LogFormat, LoggingSettings, TetherSettings};

/// Flags common to both binaries.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Settings file (defaults to `~/.tether/settings.json`).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `tether_server=trace`.
    #[arg(long)]
    pub log_level: Option<String>,
}

impl CommonArgs {
    /// Load settings from the chosen file plus `TETHER_*` overrides, then
    /// apply the flags.
    pub fn load_settings(&self) -> Result<TetherSettings> {
        let path = self.config.clone().unwrap_or_else(tether_settings::settings_path);
        let mut settings = load_from(&path)?;
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

fn load_from(path: &Path) -> Result<TetherSettings> {
    tether_settings::load_settings_from_path(path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

/// Validate the final settings, naming the offending value on failure.
pub fn validate(settings: &TetherSettings) -> Result<()> {
    settings.validate().context("Invalid settings")
}

/// Install the global tracing subscriber for the configured format.
pub fn init_logging(logging: &LoggingSettings) {
    match logging.format {
        LogFormat::Compact => tether_core::logging::init_subscriber(&logging.level),
        LogFormat::Json => tether_core::logging::init_json_subscriber(&logging.level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let args = CommonArgs {
            config: Some(dir.path().join("absent.json")),
            log_level: None,
        };
        let settings = args.load_settings().unwrap();
        assert_eq!(settings.relay.ws_path, "/ws");
    }

    #[test]
    fn file_values_and_flag_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"relay":{{"wsPath":"/stream"}},"logging":{{"level":"warn"}}}}"#
        )
        .unwrap();
        let args = CommonArgs {
            config: Some(file.path().to_path_buf()),
            log_level: Some("debug".into()),
        };
        let settings = args.load_settings().unwrap();
        assert_eq!(settings.relay.ws_path, "/stream");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn bad_json_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{nope").unwrap();
        let args = CommonArgs {
            config: Some(file.path().to_path_buf()),
            log_level: None,
        };
        let err = args.load_settings().unwrap_err();
        assert!(format!("{err:#}").contains("Failed to load settings"));
    }

    #[test]
    fn invalid_settings_rejected() {
        let mut settings = TetherSettings::default();
        settings.relay.ws_path = "nope".into();
        assert!(validate(&settings).is_err());
        assert!(validate(&TetherSettings::default()).is_ok());
    }
}
