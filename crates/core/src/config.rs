//! Hub configuration file.
//!
//! Stored as JSON at `<config dir>/rgb-hub/config.json`:
//! - Linux: `~/.config/rgb-hub/config.json`
//! - macOS: `~/Library/Application Support/rgb-hub/config.json`
//! - Windows: `%APPDATA%\rgb-hub\config.json`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::corsair::ColorMode;
use crate::error::{Error, Result};
use crate::protocol::{DEFAULT_PORT, MAX_WIRE_COUNT};
use crate::strip::{LedStrip, SerialStripPort, StripPort, UdpStripPort};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// How a strip is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StripPortConfig {
    Serial { path: String, baud: u32 },
    Udp { addr: String },
}

impl StripPortConfig {
    fn location(&self) -> String {
        match self {
            Self::Serial { path, .. } => path.clone(),
            Self::Udp { addr } => format!("udp://{addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripConfig {
    pub name: String,
    pub num_leds: usize,
    pub port: StripPortConfig,
}

impl StripConfig {
    /// Open the configured port and wrap it in a controller.
    pub fn open(&self) -> Result<LedStrip> {
        let port: Box<dyn StripPort> = match &self.port {
            StripPortConfig::Serial { path, baud } => Box::new(SerialStripPort::open(path, *baud)?),
            StripPortConfig::Udp { addr } => Box::new(UdpStripPort::connect(addr.as_str())?),
        };
        LedStrip::new(port, self.name.clone(), self.port.location(), self.num_leds)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub server: ServerConfig,
    pub keyboard_color_mode: ColorMode,
    pub strips: Vec<StripConfig>,
}

/// Platform default location of the config file.
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| Error::Config("failed to determine config directory".into()))?;
    Ok(dir.join("rgb-hub").join("config.json"))
}

impl HubConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        debug!(path = %path.display(), strips = config.strips.len(), "Loaded config");
        Ok(config)
    }

    /// Like [`HubConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write atomically through a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                Error::Config(format!("failed to create {}: {e}", dir.display()))
            })?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?;
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)
            .map_err(|e| Error::Config(format!("failed to write {}: {e}", temp_path.display())))?;
        fs::rename(&temp_path, path)
            .map_err(|e| Error::Config(format!("failed to replace {}: {e}", path.display())))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for strip in &self.strips {
            if strip.name.trim().is_empty() {
                return Err(Error::Config("strip name must not be empty".into()));
            }
            if strip.num_leds == 0 {
                return Err(Error::Config(format!(
                    "strip '{}' must have at least one LED",
                    strip.name
                )));
            }
            if strip.num_leds > MAX_WIRE_COUNT {
                return Err(Error::Config(format!(
                    "strip '{}' has {} LEDs, at most {MAX_WIRE_COUNT} are supported",
                    strip.name, strip.num_leds
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::Controller;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "server": { "port": 7000 },
        "keyboard_color_mode": "limited",
        "strips": [
            { "name": "Desk", "num_leds": 30,
              "port": { "type": "serial", "path": "/dev/ttyACM0", "baud": 115200 } },
            { "name": "Shelf", "num_leds": 60,
              "port": { "type": "udp", "addr": "192.168.1.40:21324" } }
        ]
    }"#;

    #[test]
    fn parses_full_file() {
        let config: HubConfig = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.keyboard_color_mode, ColorMode::Limited);
        assert_eq!(config.strips.len(), 2);
        assert_eq!(
            config.strips[1].port,
            StripPortConfig::Udp {
                addr: "192.168.1.40:21324".into()
            }
        );
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config: HubConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, HubConfig::default());
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.keyboard_color_mode, ColorMode::Full);
    }

    #[test]
    fn save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");
        let config: HubConfig = serde_json::from_str(SAMPLE).unwrap();

        config.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert_eq!(HubConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_or_default_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = HubConfig::load_or_default(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(HubConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn zero_led_strip_rejected() {
        let mut config: HubConfig = serde_json::from_str(SAMPLE).unwrap();
        config.strips[0].num_leds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_strip_rejected() {
        let mut config: HubConfig = serde_json::from_str(SAMPLE).unwrap();
        config.strips[1].num_leds = 70_000;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        assert!(HubConfig::load(&path).is_err());
    }

    #[test]
    fn default_path_ends_with_app_dir() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("rgb-hub/config.json"));
        }
    }

    #[test]
    fn udp_strip_opens() {
        let receiver = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let strip = StripConfig {
            name: "Shelf".into(),
            num_leds: 4,
            port: StripPortConfig::Udp {
                addr: receiver.local_addr().unwrap().to_string(),
            },
        };
        let strip = strip.open().unwrap();
        assert_eq!(strip.led_count(), 4);
        assert!(strip.location().starts_with("udp://"));
    }
}
