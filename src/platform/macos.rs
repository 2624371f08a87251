//! macOS platform sources.
//!
//! Window observations come from the CoreGraphics window list, displays
//! from CGDisplay, idle time from the event-source clock. Clipboard and
//! frontmost-application state go through `pbpaste`/`osascript`, which
//! work without a run loop; the peripheral inventory is parsed from
//! `system_profiler` JSON output.

use crate::platform::types::{
    ClipboardCapture, DeviceKind, DisplayRecord, ForegroundInfo, InputDeviceRecord,
    NetworkInterfaceRecord, ScreenBounds, WindowRecord,
};
use crate::platform::{ClipboardSource, InputStateSource, InventorySource, ScreenSource};
use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::CFDictionary;
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowListExcludeDesktopElements,
    kCGWindowListOptionOnScreenOnly,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::process::Command;

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGEventSourceSecondsSinceLastEventType(state: u32, event_type: u32) -> f64;
    fn CGDisplayIsInMirrorSet(display: u32) -> i32;
}

const COMBINED_SESSION_STATE: u32 = 0;
const ANY_INPUT_EVENT_TYPE: u32 = u32::MAX;

fn run_command(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn dict_number(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<f64> {
    dict.find(CFString::new(key))
        .and_then(|value| value.downcast::<CFNumber>())
        .and_then(|number| number.to_f64())
}

fn dict_string(dict: &CFDictionary<CFString, CFType>, key: &str) -> Option<String> {
    dict.find(CFString::new(key))
        .and_then(|value| value.downcast::<CFString>())
        .map(|s| s.to_string())
}

pub struct MacScreenSource;

impl MacScreenSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacScreenSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenSource for MacScreenSource {
    fn overlay_candidates(&mut self) -> Vec<WindowRecord> {
        let mut records = Vec::new();
        let Some(info) = copy_window_info(
            kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
            kCGNullWindowID,
        ) else {
            return records;
        };

        for item in info.iter() {
            let dict = unsafe {
                CFDictionary::<CFString, CFType>::wrap_under_get_rule(*item as *const _)
            };

            let layer = dict_number(&dict, "kCGWindowLayer").unwrap_or(0.0);
            let pid = dict_number(&dict, "kCGWindowOwnerPID").unwrap_or(0.0) as u32;
            let number = dict_number(&dict, "kCGWindowNumber").unwrap_or(0.0) as i64;
            let alpha = dict_number(&dict, "kCGWindowAlpha").unwrap_or(1.0);
            let owner = dict_string(&dict, "kCGWindowOwnerName").unwrap_or_default();

            let bounds = dict
                .find(CFString::new("kCGWindowBounds"))
                .and_then(|value| value.downcast::<CFDictionary>())
                .map(|bounds| {
                    let bounds = unsafe {
                        CFDictionary::<CFString, CFType>::wrap_under_get_rule(
                            bounds.as_concrete_TypeRef(),
                        )
                    };
                    (
                        dict_number(&bounds, "X").unwrap_or(0.0) as i32,
                        dict_number(&bounds, "Y").unwrap_or(0.0) as i32,
                        dict_number(&bounds, "Width").unwrap_or(0.0) as i32,
                        dict_number(&bounds, "Height").unwrap_or(0.0) as i32,
                    )
                })
                .unwrap_or((0, 0, 0, 0));

            // Only the layer and alpha map onto the style vocabulary here;
            // the Win32-specific flags stay false.
            let translucent = alpha < 1.0;
            records.push(WindowRecord {
                handle: format!("{number:#x}"),
                pid,
                process_name: owner,
                x: bounds.0,
                y: bounds.1,
                width: bounds.2,
                height: bounds.3,
                z_order: records.len() as i32,
                layered: translucent,
                topmost: layer > 0.0,
                tool_window: false,
                click_through: false,
                no_activate: false,
                color_key: false,
                alpha: translucent.then(|| (alpha * 255.0) as u8),
            });
        }
        records
    }

    fn screens(&mut self) -> Vec<ScreenBounds> {
        CGDisplay::active_displays()
            .unwrap_or_default()
            .into_iter()
            .map(|id| {
                let bounds = CGDisplay::new(id).bounds();
                ScreenBounds {
                    x: bounds.origin.x as i32,
                    y: bounds.origin.y as i32,
                    width: bounds.size.width as i32,
                    height: bounds.size.height as i32,
                }
            })
            .collect()
    }

    fn displays(&mut self) -> Vec<DisplayRecord> {
        CGDisplay::active_displays()
            .unwrap_or_default()
            .into_iter()
            .map(|id| {
                let display = CGDisplay::new(id);
                let bounds = display.bounds();
                let is_primary = display.is_main();
                DisplayRecord {
                    name: format!("display-{id}"),
                    width: bounds.size.width as i32,
                    height: bounds.size.height as i32,
                    is_primary,
                    is_external: !display.is_builtin(),
                    is_mirrored: unsafe { CGDisplayIsInMirrorSet(id) } != 0,
                }
            })
            .collect()
    }

    /// Virtual cameras ship as CoreMediaIO DAL plug-ins.
    fn virtual_cameras(&mut self) -> Vec<String> {
        const MARKERS: &[&str] = &["virtualcam", "virtual-cam", "obs", "manycam", "camtwist"];
        std::fs::read_dir("/Library/CoreMediaIO/Plug-Ins/DAL")
            .map(|entries| {
                entries
                    .flatten()
                    .filter_map(|entry| {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        let lower = name.to_lowercase();
                        MARKERS.iter().any(|m| lower.contains(m)).then_some(name)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct MacInputStateSource;

impl MacInputStateSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacInputStateSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputStateSource for MacInputStateSource {
    fn idle_seconds(&mut self) -> Option<u64> {
        let seconds = unsafe {
            CGEventSourceSecondsSinceLastEventType(COMBINED_SESSION_STATE, ANY_INPUT_EVENT_TYPE)
        };
        (seconds >= 0.0).then_some(seconds as u64)
    }

    fn foreground(&mut self) -> Option<ForegroundInfo> {
        if !self.accessibility_granted() {
            return None;
        }
        let app_name = run_command(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
        )?
        .trim()
        .to_string();
        if app_name.is_empty() {
            return None;
        }
        Some(ForegroundInfo {
            window_title: String::new(),
            window_handle: 0,
            is_minimized: false,
            app_name,
        })
    }

    fn accessibility_granted(&self) -> bool {
        crate::probes::permissions::accessibility_granted()
    }
}

pub struct MacClipboardSource {
    last_fingerprint: Option<u64>,
    sequence: u64,
}

impl MacClipboardSource {
    pub fn new() -> Self {
        // Fingerprint the current content so pre-existing clipboard state
        // does not surface as a change on the first poll.
        let mut source = Self {
            last_fingerprint: None,
            sequence: 0,
        };
        source.last_fingerprint = source.read_fingerprint().map(|(fp, _)| fp);
        source
    }

    fn read_fingerprint(&self) -> Option<(u64, String)> {
        let content = run_command("pbpaste", &[])?;
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        Some((hasher.finish(), content))
    }
}

impl Default for MacClipboardSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ClipboardSource for MacClipboardSource {
    fn poll(&mut self) -> Option<ClipboardCapture> {
        let (fingerprint, content) = self.read_fingerprint()?;
        if self.last_fingerprint == Some(fingerprint) {
            return None;
        }
        self.last_fingerprint = Some(fingerprint);
        self.sequence += 1;

        let source_app = run_command(
            "osascript",
            &[
                "-e",
                "tell application \"System Events\" to get name of first application process whose frontmost is true",
            ],
        )
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

        Some(ClipboardCapture {
            content: Some(content),
            format: "text".to_string(),
            source_app,
            source_pid: 0,
            sequence: self.sequence,
        })
    }
}

pub struct MacInventorySource {
    networks: sysinfo::Networks,
}

impl MacInventorySource {
    pub fn new() -> Self {
        Self {
            networks: sysinfo::Networks::new(),
        }
    }

    fn kind_from_name(name: &str) -> Option<DeviceKind> {
        let lower = name.to_lowercase();
        if lower.contains("mouse") || lower.contains("trackpad") {
            Some(DeviceKind::Mouse)
        } else if lower.contains("keyboard") {
            Some(DeviceKind::Keyboard)
        } else if lower.contains("camera") || lower.contains("webcam") {
            Some(DeviceKind::Video)
        } else if lower.contains("audio") || lower.contains("headset") || lower.contains("speaker")
        {
            Some(DeviceKind::Audio)
        } else if lower.contains("hub") || lower.contains("storage") || lower.contains("disk") {
            Some(DeviceKind::Storage)
        } else {
            None
        }
    }

    fn collect_usb(node: &serde_json::Value, devices: &mut Vec<InputDeviceRecord>) {
        if let Some(items) = node["_items"].as_array() {
            for item in items {
                let name = item["_name"].as_str().unwrap_or_default();
                if let Some(kind) = Self::kind_from_name(name) {
                    let mut record = InputDeviceRecord::new(
                        name,
                        kind,
                        item["location_id"].as_str().unwrap_or(name),
                    );
                    record.vendor_id = item["vendor_id"]
                        .as_str()
                        .unwrap_or_default()
                        .trim_start_matches("0x")
                        .chars()
                        .take(4)
                        .collect();
                    record.product_id = item["product_id"]
                        .as_str()
                        .unwrap_or_default()
                        .trim_start_matches("0x")
                        .chars()
                        .take(4)
                        .collect();
                    record.manufacturer =
                        item["manufacturer"].as_str().unwrap_or_default().to_string();
                    devices.push(record);
                }
                // USB topology nests hubs.
                Self::collect_usb(item, devices);
            }
        }
    }
}

impl Default for MacInventorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InventorySource for MacInventorySource {
    fn input_devices(&mut self) -> Vec<InputDeviceRecord> {
        let mut devices = Vec::new();
        if let Some(json) = run_command("system_profiler", &["SPUSBDataType", "-json"]) {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&json) {
                if let Some(buses) = parsed["SPUSBDataType"].as_array() {
                    for bus in buses {
                        Self::collect_usb(bus, &mut devices);
                    }
                }
            }
        }
        devices
    }

    fn network_interfaces(&mut self) -> Vec<NetworkInterfaceRecord> {
        self.networks.refresh_list();
        self.networks
            .iter()
            .map(|(name, data)| NetworkInterfaceRecord {
                name: name.clone(),
                ips: data
                    .ip_networks()
                    .iter()
                    .map(|ip| ip.addr.to_string())
                    .collect(),
            })
            .collect()
    }

    fn display_count(&mut self) -> usize {
        CGDisplay::active_displays()
            .map(|d| d.len())
            .unwrap_or(1)
    }
}
