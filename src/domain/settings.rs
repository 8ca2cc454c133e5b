use crate::domain::models::ScreenSize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::Rotation;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_true")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    /// Relative paths are resolved under the user's local data directory
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_true(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

impl LogSettings {
    pub fn rotation(&self) -> Rotation {
        match self.rotation.to_lowercase().as_str() {
            "hourly" => Rotation::HOURLY,
            "minutely" => Rotation::MINUTELY,
            "never" => Rotation::NEVER,
            _ => Rotation::DAILY,
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        let dir = PathBuf::from(&self.log_dir);
        if dir.is_absolute() {
            return dir;
        }
        match dirs::data_local_dir() {
            Some(mut base) => {
                base.push(APP_DIR);
                base.push(dir);
                base
            }
            None => dir,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "lightgun_bridge".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

const APP_DIR: &str = "LightGunBridge";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Bluetooth address of the gun, `AA:BB:CC:DD:EE:FF`
    #[serde(default = "default_device_address")]
    pub device_address: String,
    #[serde(default = "default_data_uuid")]
    pub data_characteristic_uuid: String,
    /// How long to scan for the gun before a connection attempt fails
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    // Display the calibration targets are drawn on
    #[serde(default = "default_screen_width")]
    pub screen_width: u32,
    #[serde(default = "default_screen_height")]
    pub screen_height: u32,

    #[serde(default = "default_pointer_name")]
    pub pointer_device_name: String,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_address: default_device_address(),
            data_characteristic_uuid: default_data_uuid(),
            scan_timeout_ms: default_scan_timeout_ms(),
            screen_width: default_screen_width(),
            screen_height: default_screen_height(),
            pointer_device_name: default_pointer_name(),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn screen(&self) -> ScreenSize {
        ScreenSize::new(self.screen_width, self.screen_height)
    }
}

fn default_device_address() -> String {
    "3C:A5:08:0A:62:A9".to_string()
}
fn default_data_uuid() -> String {
    "0000ffe1-0000-1000-8000-00805f9b34fb".to_string()
}
fn default_scan_timeout_ms() -> u64 {
    10_000
}
fn default_screen_width() -> u32 {
    1920
}
fn default_screen_height() -> u32 {
    1080
}
fn default_pointer_name() -> String {
    "Virtual mouse".to_string()
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    /// Load settings from the user's config directory, writing the defaults
    /// there on first run.
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Self::with_path(settings_path)
    }

    pub fn with_path(settings_path: PathBuf) -> anyhow::Result<Self> {
        if !settings_path.exists() {
            let service = Self {
                settings: Settings::default(),
                settings_path,
            };
            service.save()?;
            return Ok(service);
        }

        let settings = Self::load_from_file(&settings_path)?;
        Ok(Self {
            settings,
            settings_path,
        })
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push(APP_DIR);
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Invalid settings file {}: {}", path.display(), e))?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}
