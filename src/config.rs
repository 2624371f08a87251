//! Configuration for the Vigil Sensor Agent.
//!
//! Each watcher takes a serde-deserializable option bag matching the host
//! property-bag contract (camelCase keys, every field defaulted, unknown
//! keys ignored). The agent-level [`Config`] groups them and persists as
//! JSON for the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options for the process watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessWatchOptions {
    /// Polling period in milliseconds.
    pub interval_ms: u64,
    /// Substrings matched case-insensitively against process name or path.
    pub blacklist: Vec<String>,
}

impl Default for ProcessWatchOptions {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            blacklist: Vec::new(),
        }
    }
}

/// Options for the removable-storage watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceWatchOptions {
    pub interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for DeviceWatchOptions {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            heartbeat_interval_ms: 5000,
        }
    }
}

/// Options for the focus/idle watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FocusIdleOptions {
    pub interval_ms: u64,
    /// Seconds without input before the session counts as idle.
    pub idle_threshold_sec: u64,
    /// Debounce for focus transitions to suppress app-switch flicker.
    pub focus_debounce_ms: u64,
    /// Exam application title (macOS frontmost-app comparison).
    pub exam_app_title: String,
    /// Exam window handle (Windows foreground comparison).
    pub window_handle: Option<u64>,
    pub enable_idle_detection: bool,
    pub enable_focus_detection: bool,
    pub enable_minimize_detection: bool,
    /// Heartbeat gap; a state-change event resets this timer.
    pub heartbeat_interval_ms: u64,
}

impl Default for FocusIdleOptions {
    fn default() -> Self {
        Self {
            interval_ms: 250,
            idle_threshold_sec: 30,
            focus_debounce_ms: 200,
            exam_app_title: String::new(),
            window_handle: None,
            enable_idle_detection: true,
            enable_focus_detection: true,
            enable_minimize_detection: true,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Clipboard privacy modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrivacyMode {
    /// No content fields at all.
    MetadataOnly,
    /// Short preview, replaced with `[REDACTED]` when sensitive.
    Redacted,
    /// Preview up to 256 chars, never redacted.
    Full,
}

impl PrivacyMode {
    /// Host contract: 0 / 1 / 2. Unknown codes degrade to the most private.
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => PrivacyMode::Full,
            1 => PrivacyMode::Redacted,
            _ => PrivacyMode::MetadataOnly,
        }
    }
}

/// Options for the clipboard watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClipboardOptions {
    pub interval_ms: u64,
    /// 0 = metadata only, 1 = redacted, 2 = full.
    pub privacy_mode: u8,
    /// Identical fingerprints within this window are dropped.
    pub min_event_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ClipboardOptions {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            privacy_mode: 1,
            min_event_interval_ms: 500,
            heartbeat_interval_ms: 30_000,
        }
    }
}

/// Options for the screen recording/overlay watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScreenWatchOptions {
    pub interval_ms: u64,
    /// Substrings matched against process name/path for recording tools.
    pub recording_blacklist: Vec<String>,
    /// Recording-confidence threshold for the recording state machine.
    pub recording_threshold: f64,
    pub heartbeat_interval_ms: u64,
}

impl Default for ScreenWatchOptions {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            recording_blacklist: default_recording_blacklist(),
            recording_threshold: 0.75,
            heartbeat_interval_ms: 10_000,
        }
    }
}

fn default_recording_blacklist() -> Vec<String> {
    [
        "obs", "bandicam", "camtasia", "sharex", "screenrec", "fraps",
        "action!", "xsplit", "streamlabs", "loom", "snagit", "quicktime",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Options for the smart-device policy engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SmartDeviceOptions {
    pub interval_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for SmartDeviceOptions {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            heartbeat_interval_ms: 10_000,
        }
    }
}

/// Agent-level configuration, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub process: ProcessWatchOptions,
    pub device: DeviceWatchOptions,
    pub focus_idle: FocusIdleOptions,
    pub clipboard: ClipboardOptions,
    pub screen: ScreenWatchOptions,
    pub smart_device: SmartDeviceOptions,
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vigil-sensor-agent")
            .join("config.json")
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
