//! Input-device classification.
//!
//! Each inventory record is classified into boolean traits (virtual,
//! spoofed, bluetooth, wireless, external) from its name, ids and
//! manufacturer strings. The policy engine consumes the classified view.

use crate::platform::types::{DeviceKind, InputDeviceRecord};

const VIRTUAL_MARKERS: &[&str] = &[
    "virtual", "vmware", "virtualbox", "hyper-v", "qemu", "parallels",
];

const SPOOF_MARKERS: &[&str] = &[
    "generic", "unknown", "fake", "dummy", "test", "emulated", "spoof", "sample", "demo",
];

const WIRELESS_MARKERS: &[&str] = &["wireless", "wifi", "2.4g", "radio"];

/// Names that mark a device as part of the machine rather than attached.
const BUILT_IN_MARKERS: &[&str] = &[
    "built-in",
    "internal",
    "microsoft",
    "hid-compliant",
    "standard",
    "generic",
    "ps/2",
    "trackpad",
    "touchpad",
];

/// Vendor ids whose marketing name should appear in the device strings.
/// A mismatch is a spoofing signal.
const KNOWN_VENDORS: &[(&str, &str)] = &[
    ("046d", "logitech"),
    ("045e", "microsoft"),
    ("05ac", "apple"),
    ("1532", "razer"),
    ("04f2", "chicony"),
    ("093a", "pixart"),
    ("1bcf", "sunplus"),
];

/// Camera vendors that only ship integrated modules; used to tell built-in
/// webcams from attached ones.
const BUILT_IN_CAMERA_VENDORS: &[&str] = &["04f2", "5986", "0bda", "13d3"];

const BUILT_IN_CAMERA_NAMES: &[&str] = &["integrated", "built-in", "facetime", "internal"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// An inventory record with its classification traits.
#[derive(Debug, Clone)]
pub struct ClassifiedDevice {
    pub record: InputDeviceRecord,
    pub is_virtual: bool,
    pub is_spoofed: bool,
    pub is_bluetooth: bool,
    pub is_wireless: bool,
    pub is_external: bool,
}

impl ClassifiedDevice {
    pub fn kind(&self) -> DeviceKind {
        self.record.kind
    }

    pub fn is_input(&self) -> bool {
        matches!(self.record.kind, DeviceKind::Mouse | DeviceKind::Keyboard)
    }

    /// True for wired (non-bluetooth, non-wireless) input devices.
    pub fn is_wired_input(&self) -> bool {
        self.is_input() && !self.is_bluetooth && !self.is_wireless
    }

    /// Threat level 0..=4, the maximum over all matching rules.
    pub fn threat_level(&self) -> u8 {
        let mut level = 0u8;
        if self.is_spoofed {
            level = level.max(4);
        }
        if self.is_virtual && self.record.kind == DeviceKind::Keyboard {
            level = level.max(4);
        }
        if self.is_virtual {
            level = level.max(3);
        }
        if self.is_bluetooth {
            level = level.max(3);
        }
        if self.is_wireless {
            level = level.max(3);
        }
        if self.is_external && self.is_input() {
            level = level.max(2);
        }
        if has_suspicious_manufacturer(&self.record) {
            level = level.max(2);
        }
        level
    }
}

fn has_suspicious_manufacturer(record: &InputDeviceRecord) -> bool {
    contains_any(&record.manufacturer.to_lowercase(), SPOOF_MARKERS)
}

fn vendor_mismatch(record: &InputDeviceRecord) -> bool {
    let vid = record.vendor_id.to_lowercase();
    let Some((_, vendor)) = KNOWN_VENDORS.iter().find(|(known, _)| *known == vid) else {
        return false;
    };
    let name = record.name.to_lowercase();
    let manufacturer = record.manufacturer.to_lowercase();
    !name.contains(vendor) && !manufacturer.contains(vendor)
}

/// True for cameras that are part of the machine.
pub fn is_built_in_camera(record: &InputDeviceRecord) -> bool {
    let vid = record.vendor_id.to_lowercase();
    BUILT_IN_CAMERA_VENDORS.contains(&vid.as_str())
        || contains_any(&record.name.to_lowercase(), BUILT_IN_CAMERA_NAMES)
}

/// Classify one inventory record.
pub fn classify(record: &InputDeviceRecord) -> ClassifiedDevice {
    let name = record.name.to_lowercase();
    let id = record.device_id.to_lowercase();
    let vid = record.vendor_id.trim().to_lowercase();
    let pid = record.product_id.trim().to_lowercase();

    let is_virtual =
        contains_any(&name, VIRTUAL_MARKERS) || contains_any(&id, VIRTUAL_MARKERS) || id.starts_with("root\\");

    // Empty ids mean the enumerator had none (ACPI devices), not spoofing.
    let bogus_id = |v: &str| v == "0000" || v == "ffff";
    let is_spoofed = bogus_id(&vid)
        || bogus_id(&pid)
        || contains_any(&name, SPOOF_MARKERS)
        || has_suspicious_manufacturer(record)
        || vendor_mismatch(record);

    let is_bluetooth =
        id.contains("bthenum") || id.contains("bluetooth") || name.contains("bluetooth");

    let is_wireless = contains_any(&name, WIRELESS_MARKERS) || is_bluetooth;

    let is_external = id.contains("usb") || id.contains("hid")
        || !contains_any(&name, BUILT_IN_MARKERS);

    ClassifiedDevice {
        record: record.clone(),
        is_virtual,
        is_spoofed,
        is_bluetooth,
        is_wireless,
        is_external,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, kind: DeviceKind, id: &str) -> InputDeviceRecord {
        InputDeviceRecord::new(name, kind, id)
    }

    #[test]
    fn test_bluetooth_classification() {
        let d = classify(&device(
            "MX Anywhere 3",
            DeviceKind::Mouse,
            "BTHENUM\\Dev_AABBCC",
        ));
        assert!(d.is_bluetooth);
        assert!(d.is_wireless);
        assert_eq!(d.threat_level(), 3);
    }

    #[test]
    fn test_virtual_keyboard_is_critical() {
        let d = classify(&device(
            "VMware Virtual Keyboard",
            DeviceKind::Keyboard,
            "ROOT\\vmkbd",
        ));
        assert!(d.is_virtual);
        assert_eq!(d.threat_level(), 4);

        let mouse = classify(&device("VMware Pointing", DeviceKind::Mouse, "ROOT\\vmmouse"));
        assert!(mouse.is_virtual);
        assert_eq!(mouse.threat_level(), 3);
    }

    #[test]
    fn test_spoofed_ids() {
        let mut r = device("HID device", DeviceKind::Mouse, "USB\\VID_0000&PID_FFFF");
        r.vendor_id = "0000".to_string();
        r.product_id = "ffff".to_string();
        let d = classify(&r);
        assert!(d.is_spoofed);
        assert_eq!(d.threat_level(), 4);
    }

    #[test]
    fn test_vendor_name_mismatch_is_spoofed() {
        let mut r = device("SuperPoint Mouse", DeviceKind::Mouse, "USB\\VID_046D");
        r.vendor_id = "046d".to_string();
        r.product_id = "c077".to_string();
        r.manufacturer = "SuperPoint Inc".to_string();
        assert!(classify(&r).is_spoofed);

        r.manufacturer = "Logitech".to_string();
        assert!(!classify(&r).is_spoofed);
    }

    #[test]
    fn test_built_in_input_is_not_external() {
        let d = classify(&device("PS/2 Standard Keyboard", DeviceKind::Keyboard, "ACPI\\kbd"));
        assert!(!d.is_external);
        assert_eq!(d.threat_level(), 0);

        let pad = classify(&device("Precision Touchpad", DeviceKind::Mouse, "ACPI\\tpd"));
        assert!(!pad.is_external);
    }

    #[test]
    fn test_external_wired_input_is_low_threat() {
        let mut r = device("Logitech G203", DeviceKind::Mouse, "USB\\VID_046D&PID_C084");
        r.vendor_id = "046d".to_string();
        r.product_id = "c084".to_string();
        r.manufacturer = "Logitech".to_string();
        let d = classify(&r);
        assert!(d.is_external);
        assert!(d.is_wired_input());
        assert_eq!(d.threat_level(), 2);
    }

    #[test]
    fn test_built_in_camera() {
        let mut cam = device("Integrated Camera", DeviceKind::Video, "USB\\VID_04F2");
        cam.vendor_id = "04f2".to_string();
        assert!(is_built_in_camera(&cam));

        let mut ext = device("Logitech C920", DeviceKind::Video, "USB\\VID_046D");
        ext.vendor_id = "046d".to_string();
        assert!(!is_built_in_camera(&ext));
    }
}
