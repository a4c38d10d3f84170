//! Persisted device configuration.
//!
//! Stored as a small JSON document:
//!
//! ```json
//! { "deviceName": "Kitchen", "bitrate": 160, "volume": 32767 }
//! ```
//!
//! A missing or empty file yields [`DeviceConfig::default`]. Absent fields fall
//! back to their defaults individually, and an unrecognised bitrate selects
//! 160 kbps.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use serde_json::json;

use crate::error::Result;

/// Device name used when none is configured.
pub const DEFAULT_DEVICE_NAME: &str = "mercury-client";

/// Device id used when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "142137fd329622137a14901634264e6f332e2411";

/// Volume used when none is configured (half of the 0..=65535 range).
pub const DEFAULT_VOLUME: u16 = 32767;

/// Audio stream format selected by bitrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioFormat {
    OggVorbis96,
    #[default]
    OggVorbis160,
    OggVorbis320,
}

impl AudioFormat {
    /// Map a bitrate in kbps to a format. Unknown values select 160 kbps.
    pub fn from_bitrate(kbps: u32) -> Self {
        match kbps {
            96 => AudioFormat::OggVorbis96,
            320 => AudioFormat::OggVorbis320,
            _ => AudioFormat::OggVorbis160,
        }
    }

    /// Like [`from_bitrate`](Self::from_bitrate) for a stored JSON number.
    /// Fractional or out-of-range values select 160 kbps.
    fn from_stored_bitrate(kbps: f64) -> Self {
        if kbps.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(&kbps) {
            Self::from_bitrate(kbps as u32)
        } else {
            AudioFormat::default()
        }
    }

    /// Bitrate in kbps.
    pub fn bitrate(self) -> u32 {
        match self {
            AudioFormat::OggVorbis96 => 96,
            AudioFormat::OggVorbis160 => 160,
            AudioFormat::OggVorbis320 => 320,
        }
    }
}

/// User-facing device settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_name: String,
    pub format: AudioFormat,
    /// 0..=65535
    pub volume: u16,
    /// Not persisted.
    pub device_id: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            format: AudioFormat::default(),
            volume: DEFAULT_VOLUME,
            device_id: DEFAULT_DEVICE_ID.to_string(),
        }
    }
}

/// On-disk shape. Numbers are read as floats so `20000.0` loads like `20000`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfig {
    device_name: Option<String>,
    bitrate: Option<f64>,
    volume: Option<f64>,
}

impl DeviceConfig {
    /// Load from `path`. A missing or blank file gives the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No device config, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_json(&contents)
    }

    /// Parse a JSON document. Blank input gives the defaults.
    pub fn from_json(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }

        let stored: StoredConfig = serde_json::from_str(contents)?;
        let mut config = Self::default();
        if let Some(name) = stored.device_name {
            config.device_name = name;
        }
        if let Some(bitrate) = stored.bitrate {
            config.format = AudioFormat::from_stored_bitrate(bitrate);
        }
        if let Some(volume) = stored.volume {
            config.volume = volume.clamp(0.0, f64::from(u16::MAX)) as u16;
        }
        Ok(config)
    }

    /// Serialize to the on-disk JSON document.
    pub fn to_json(&self) -> String {
        let value = json!({
            "deviceName": self.device_name,
            "bitrate": self.format.bitrate(),
            "volume": self.volume,
        });
        value.to_string()
    }

    /// Write to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = DeviceConfig {
            device_name: "Kitchen".to_string(),
            format: AudioFormat::from_bitrate(96),
            volume: 20000,
            ..DeviceConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = DeviceConfig::load(&path).unwrap();
        assert_eq!(loaded.device_name, "Kitchen");
        assert_eq!(loaded.format, AudioFormat::OggVorbis96);
        assert_eq!(loaded.volume, 20000);
    }

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = DeviceConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, DeviceConfig::default());
        assert_eq!(loaded.volume, 32767);
        assert_eq!(loaded.device_name, DEFAULT_DEVICE_NAME);
        assert_eq!(loaded.format, AudioFormat::OggVorbis160);
    }

    #[test]
    fn test_empty_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "").unwrap();
        assert_eq!(DeviceConfig::load(&path).unwrap(), DeviceConfig::default());
    }

    #[test]
    fn test_unknown_bitrate_falls_back_to_160() {
        let config = DeviceConfig::from_json(r#"{"bitrate": 256}"#).unwrap();
        assert_eq!(config.format, AudioFormat::OggVorbis160);
    }

    #[test]
    fn test_fractional_bitrate_falls_back_to_160() {
        let config = DeviceConfig::from_json(r#"{"bitrate": 96.9}"#).unwrap();
        assert_eq!(config.format, AudioFormat::OggVorbis160);
        let config = DeviceConfig::from_json(r#"{"bitrate": 96.0}"#).unwrap();
        assert_eq!(config.format, AudioFormat::OggVorbis96);
        let config = DeviceConfig::from_json(r#"{"bitrate": -96}"#).unwrap();
        assert_eq!(config.format, AudioFormat::OggVorbis160);
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config = DeviceConfig::from_json(r#"{"deviceName": "Den"}"#).unwrap();
        assert_eq!(config.device_name, "Den");
        assert_eq!(config.volume, DEFAULT_VOLUME);
        assert_eq!(config.format, AudioFormat::OggVorbis160);
        assert_eq!(config.device_id, DEFAULT_DEVICE_ID);
    }

    #[test]
    fn test_float_and_out_of_range_volume() {
        let config = DeviceConfig::from_json(r#"{"volume": 1234.0, "bitrate": 320}"#).unwrap();
        assert_eq!(config.volume, 1234);
        assert_eq!(config.format, AudioFormat::OggVorbis320);

        let config = DeviceConfig::from_json(r#"{"volume": 70000}"#).unwrap();
        assert_eq!(config.volume, u16::MAX);
        let config = DeviceConfig::from_json(r#"{"volume": -5}"#).unwrap();
        assert_eq!(config.volume, 0);
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(DeviceConfig::from_json("{not json").is_err());
    }

    #[test]
    fn test_saved_document_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&DeviceConfig::default().to_json()).unwrap();
        assert_eq!(value["deviceName"], DEFAULT_DEVICE_NAME);
        assert_eq!(value["bitrate"], 160);
        assert_eq!(value["volume"], 32767);
        assert!(value.get("deviceId").is_none());
    }
}
