use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub timeout_millis: u64,
    pub default_device: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timeout_millis: 500,
            default_device: None,
        }
    }
}

impl Settings {
    /// Loads the settings at `path`, a missing file gives the defaults.
    pub fn read(path: &Path) -> Result<Settings> {
        let reader = match File::open(path) {
            Ok(reader) => reader,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                return Ok(Settings::default());
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Unable to open SiS-PM settings {}", path.display()))
            }
        };

        serde_json::from_reader(reader)
            .with_context(|| format!("SiS-PM settings {} are not valid JSON", path.display()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            create_dir_all(parent).with_context(|| {
                format!("Unable to create settings directory {}", parent.display())
            })?;
        }

        let writer = File::create(path)
            .with_context(|| format!("Unable to create SiS-PM settings {}", path.display()))?;
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Unable to store SiS-PM settings {}", path.display()))?;
        debug!("Stored settings at {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::read(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.timeout_millis, 500);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "default_device": "01:02:03:04:05:06" }"#).unwrap();

        let settings = Settings::read(&path).unwrap();
        assert_eq!(settings.timeout_millis, 500);
        assert_eq!(
            settings.default_device.as_deref(),
            Some("01:02:03:04:05:06")
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let error = Settings::read(&path).unwrap_err();
        assert!(error.to_string().contains("are not valid JSON"));
    }

    #[test]
    fn written_settings_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            timeout_millis: 1200,
            default_device: Some(String::from("aa:bb:cc:dd:ee:ff")),
        };

        settings.write(&path).unwrap();
        assert_eq!(Settings::read(&path).unwrap(), settings);
    }
}
