//! Records produced by the platform probes.
//!
//! These are the raw observations the watchers consume. Each record is
//! created per probe and not retained across probes except inside a
//! watcher's previous-snapshot cache.

use serde::{Deserialize, Serialize};

/// A running process as seen by the process enumerator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: String,
    pub path: String,
    /// Loaded module names, where the platform can enumerate them.
    /// Advisory: the portable and macOS sources leave this empty.
    #[serde(default)]
    pub loaded_modules: Vec<String>,
    /// Evidence strings accumulated by detectors (blacklist hits, module hits).
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl ProcessRecord {
    pub fn new(pid: u32, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
            path: path.into(),
            loaded_modules: Vec::new(),
            evidence: Vec::new(),
        }
    }
}

/// A storage device. Identity (and equality) is `(id, path)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDevice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub path: String,
    pub is_external: bool,
}

impl StorageDevice {
    /// Build a device record with the stable id `name + "_" + path`.
    pub fn new(name: &str, path: &str, kind: &str, is_external: bool) -> Self {
        let name = sanitize_device_name(name);
        Self {
            id: format!("{name}_{path}"),
            kind: kind.to_string(),
            name,
            path: path.to_string(),
            is_external,
        }
    }
}

impl PartialEq for StorageDevice {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.path == other.path
    }
}

impl Eq for StorageDevice {}

/// Replace unreadable device names: strip non-printable characters, cap at
/// 256 chars, substitute a placeholder for empty results.
pub fn sanitize_device_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control())
        .take(256)
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "Unknown Device".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A visible top-level window as observed by the window enumerator.
///
/// Style flags use the Win32 vocabulary; the macOS source maps what it can
/// (layer-based topmost, alpha) and leaves the rest false.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRecord {
    pub handle: String,
    pub pid: u32,
    pub process_name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Position front-to-back; 0 is frontmost.
    pub z_order: i32,
    pub layered: bool,
    pub topmost: bool,
    pub tool_window: bool,
    pub click_through: bool,
    pub no_activate: bool,
    pub color_key: bool,
    /// Layered alpha in 0..=255 when the window sets one.
    pub alpha: Option<u8>,
}

/// Bounds of one display, used for screen-edge adjacency checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenBounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// An attached display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub is_primary: bool,
    pub is_external: bool,
    pub is_mirrored: bool,
}

/// Device category for the smart-device policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Mouse,
    Keyboard,
    Hid,
    Video,
    Storage,
    Audio,
    Network,
}

/// A raw input/peripheral device before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputDeviceRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub device_id: String,
    pub vendor_id: String,
    pub product_id: String,
    pub manufacturer: String,
    pub model: String,
}

impl InputDeviceRecord {
    pub fn new(name: impl Into<String>, kind: DeviceKind, device_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            device_id: device_id.into(),
            vendor_id: String::new(),
            product_id: String::new(),
            manufacturer: String::new(),
            model: String::new(),
        }
    }
}

/// A network interface with its assigned addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceRecord {
    pub name: String,
    pub ips: Vec<String>,
}

/// One clipboard observation.
#[derive(Debug, Clone)]
pub struct ClipboardCapture {
    /// Text content, already capped by the platform reader. None when the
    /// clipboard holds a non-text format.
    pub content: Option<String>,
    pub format: String,
    pub source_app: String,
    pub source_pid: u32,
    /// Platform change counter; watchers use it to skip unchanged state.
    pub sequence: u64,
}

/// Foreground window / frontmost application state.
#[derive(Debug, Clone)]
pub struct ForegroundInfo {
    pub app_name: String,
    pub window_title: String,
    pub window_handle: u64,
    pub is_minimized: bool,
}
