//! Adapter configuration.
//!
//! Settings are loaded from a TOML file merged with environment variables
//! (prefixed `GUS_ADAPTER_`), e.g. `GUS_ADAPTER_PROFILES_DIR=/srv/profiles`.
//! Everything has a default so a bare adapter runs without a config file.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// Directory scanned by `GetTestProfiles`.
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: PathBuf,

    /// `OpenDevice` poll loop bounds.
    #[serde(default)]
    pub open_device: OpenDeviceSettings,

    /// Fixed identity strings reported in the status documents.
    #[serde(default)]
    pub identity: DeviceIdentity,
}

/// Bounds for the only blocking wait in the adapter: the `OpenDevice`
/// poll loop waiting for the hardware box to become ready.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDeviceSettings {
    /// Give up after this many milliseconds.
    #[serde(default = "default_open_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay between status polls.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Identity strings for the report documents. The address field is always
/// the live hardware serial, not configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// Device name attribute.
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Manufacturer attribute.
    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Model attribute.
    #[serde(default = "default_model")]
    pub model: String,

    /// Free-form remark attribute.
    #[serde(default = "default_remark")]
    pub remark: String,
}

fn default_profiles_dir() -> PathBuf {
    PathBuf::from("profiles")
}

fn default_open_timeout_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_device_name() -> String {
    "VibrationVIEW_Default".to_string()
}

fn default_manufacturer() -> String {
    "Vibration Research".to_string()
}

fn default_model() -> String {
    "VR9500".to_string()
}

fn default_remark() -> String {
    "Test Interface".to_string()
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            profiles_dir: default_profiles_dir(),
            open_device: OpenDeviceSettings::default(),
            identity: DeviceIdentity::default(),
        }
    }
}

impl Default for OpenDeviceSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_open_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            manufacturer: default_manufacturer(),
            model: default_model(),
            remark: default_remark(),
        }
    }
}

impl AdapterSettings {
    /// Load settings from `gus-adapter.toml` and the environment.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from("gus-adapter.toml")
    }

    /// Load settings from a specific file path merged with the
    /// environment. Missing file is fine; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        let settings: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("GUS_ADAPTER_"))
            .extract()?;
        settings.validate().map_err(figment::Error::from)?;
        Ok(settings)
    }

    /// Validate settings after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.open_device.timeout_ms == 0 {
            return Err("open_device.timeout_ms must be positive".to_string());
        }
        if self.open_device.poll_interval_ms == 0 {
            return Err("open_device.poll_interval_ms must be positive".to_string());
        }
        if self.open_device.poll_interval_ms > self.open_device.timeout_ms {
            return Err(format!(
                "open_device.poll_interval_ms ({}) exceeds timeout_ms ({})",
                self.open_device.poll_interval_ms, self.open_device.timeout_ms
            ));
        }
        Ok(())
    }

    /// Poll deadline as a `Duration`.
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_device.timeout_ms)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.open_device.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        let settings = AdapterSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.open_timeout(), Duration::from_secs(10));
        assert_eq!(settings.identity.model, "VR9500");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings =
            AdapterSettings::load_from("does-not-exist.toml").expect("defaults should apply");
        assert_eq!(settings.profiles_dir, PathBuf::from("profiles"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("adapter.toml");
        let mut file = std::fs::File::create(&path).expect("create config");
        writeln!(
            file,
            "profiles_dir = \"/srv/profiles\"\n[open_device]\ntimeout_ms = 2000\npoll_interval_ms = 100"
        )
        .expect("write config");

        let settings = AdapterSettings::load_from(&path).expect("load");
        assert_eq!(settings.profiles_dir, PathBuf::from("/srv/profiles"));
        assert_eq!(settings.open_timeout(), Duration::from_secs(2));
        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn interval_longer_than_timeout_is_rejected() {
        let mut settings = AdapterSettings::default();
        settings.open_device.timeout_ms = 100;
        settings.open_device.poll_interval_ms = 500;
        assert!(settings.validate().is_err());
    }
}
