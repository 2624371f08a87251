//! Device policy: profiles, violation records and the evaluation pass.
//!
//! A probe hands the classified inventory plus display and network
//! observations to [`evaluate`], which rebuilds the violation set from
//! scratch. Identity of a violation is `(device_id, violation_type)`; the
//! detector uses it to tell new violations from persistent ones.

use crate::platform::types::{DeviceKind, NetworkInterfaceRecord};
use crate::smartdevice::classify::{is_built_in_camera, ClassifiedDevice};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const VIRTUAL_AUDIO_MARKERS: &[&str] = &["vb-audio", "voicemeeter", "soundflower", "blackhole"];

const MOBILE_MARKERS: &[&str] = &["android", "iphone", "ipad", "galaxy", "pixel", "mobile"];

const WEARABLE_MARKERS: &[&str] = &["watch", "band", "fit", "wristband"];

const HOTSPOT_NAME_MARKERS: &[&str] = &["hotspot", "tether", "mobile broadband"];

/// IPv4 prefixes handed out by phone hotspots (Android AP, iOS personal
/// hotspot, Windows mobile hotspot).
const HOTSPOT_PREFIXES: &[&str] = &["192.168.43.", "172.20.10.", "192.168.137."];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    Desktop,
    Laptop,
    Tablet,
    Server,
    Unknown,
}

/// What the current system type permits. Both profiles share everything
/// except the wired input allowances.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    pub system_type: SystemType,
    pub allowed_mice: usize,
    pub allowed_keyboards: usize,
    pub allowed_displays: usize,
    pub allow_external_webcams: bool,
    pub strict_mode: bool,
}

impl SecurityProfile {
    /// Laptops need no attached input; desktops get one wired mouse and one
    /// wired keyboard.
    pub fn for_system(system_type: SystemType) -> Self {
        let (allowed_mice, allowed_keyboards) = match system_type {
            SystemType::Desktop | SystemType::Server => (1, 1),
            _ => (0, 0),
        };
        Self {
            system_type,
            allowed_mice,
            allowed_keyboards,
            allowed_displays: 1,
            allow_external_webcams: true,
            strict_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceViolation {
    pub device_id: String,
    pub device_name: String,
    pub violation_type: String,
    /// 1 (advisory) through 4 (critical).
    pub severity: u8,
    pub reason: String,
    pub evidence: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// False when first observed; true on re-emission while it lasts.
    pub persistent: bool,
}

impl DeviceViolation {
    fn new(
        device_id: &str,
        device_name: &str,
        violation_type: &str,
        severity: u8,
        reason: impl Into<String>,
        evidence: Vec<String>,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            violation_type: violation_type.to_string(),
            severity,
            reason: reason.into(),
            evidence,
            timestamp: Utc::now(),
            persistent: false,
        }
    }

    /// Stable identity used to match violations across probes.
    pub fn key(&self) -> String {
        format!("{}:{}", self.device_id, self.violation_type)
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn device_violation(
    device: &ClassifiedDevice,
    violation_type: &str,
    severity: u8,
    reason: impl Into<String>,
) -> DeviceViolation {
    let mut evidence = Vec::new();
    if device.is_virtual {
        evidence.push("virtual".to_string());
    }
    if device.is_spoofed {
        evidence.push("spoofed".to_string());
    }
    if device.is_bluetooth {
        evidence.push("bluetooth".to_string());
    }
    if device.is_wireless {
        evidence.push("wireless".to_string());
    }
    if device.is_external {
        evidence.push("external".to_string());
    }
    DeviceViolation::new(
        &device.record.device_id,
        &device.record.name,
        violation_type,
        severity,
        reason,
        evidence,
    )
}

/// Classify a non-input bluetooth device for strict-mode severity.
fn bluetooth_peripheral_violation(device: &ClassifiedDevice) -> DeviceViolation {
    let name = device.record.name.to_lowercase();
    let (violation_type, severity, reason) = if device.record.kind == DeviceKind::Audio {
        ("bluetooth-audio", 3, "bluetooth audio device present")
    } else if contains_any(&name, MOBILE_MARKERS) {
        ("bluetooth-mobile", 4, "mobile device paired over bluetooth")
    } else if contains_any(&name, WEARABLE_MARKERS) {
        ("bluetooth-wearable", 3, "wearable paired over bluetooth")
    } else {
        ("bluetooth-device", 2, "bluetooth device present")
    };
    device_violation(device, violation_type, severity, reason)
}

/// One probe's observations handed to the policy pass.
pub struct PolicyInput<'a> {
    pub devices: &'a [ClassifiedDevice],
    pub network_interfaces: &'a [NetworkInterfaceRecord],
    pub display_count: usize,
}

/// Rebuild the violation set for one probe.
pub fn evaluate(profile: &SecurityProfile, input: &PolicyInput<'_>) -> Vec<DeviceViolation> {
    let mut violations = Vec::new();

    // Bluetooth input accounting: with no wired input at all, one BT mouse
    // and one BT keyboard are tolerated; anything past that, or any BT
    // input next to wired peripherals, violates.
    let wired_mice = input
        .devices
        .iter()
        .filter(|d| d.record.kind == DeviceKind::Mouse && d.is_wired_input())
        .count();
    let wired_keyboards = input
        .devices
        .iter()
        .filter(|d| d.record.kind == DeviceKind::Keyboard && d.is_wired_input())
        .count();
    let bt_allowance_active = wired_mice == 0 && wired_keyboards == 0;
    let mut bt_mice_seen = 0usize;
    let mut bt_keyboards_seen = 0usize;

    for device in input.devices {
        let name = device.record.name.to_lowercase();

        // Virtual audio drivers route system audio to another consumer.
        if device.record.kind == DeviceKind::Audio && contains_any(&name, VIRTUAL_AUDIO_MARKERS) {
            violations.push(device_violation(
                device,
                "virtual-audio",
                4,
                "virtual audio routing driver",
            ));
            continue;
        }

        if device.is_spoofed {
            violations.push(device_violation(
                device,
                "spoofed-device",
                4,
                "device identifiers are spoofed or inconsistent",
            ));
            continue;
        }

        if device.is_virtual {
            let (violation_type, severity) = if device.record.kind == DeviceKind::Keyboard {
                ("virtual-keyboard", 4)
            } else {
                ("virtual-device", 3)
            };
            violations.push(device_violation(
                device,
                violation_type,
                severity,
                "virtual device driver",
            ));
            continue;
        }

        if device.is_bluetooth {
            if device.is_input() {
                if bt_allowance_active {
                    let seen = match device.record.kind {
                        DeviceKind::Mouse => {
                            bt_mice_seen += 1;
                            bt_mice_seen
                        }
                        _ => {
                            bt_keyboards_seen += 1;
                            bt_keyboards_seen
                        }
                    };
                    if seen > 1 {
                        violations.push(device_violation(
                            device,
                            "bluetooth-input-limit",
                            3,
                            "limit exceeded",
                        ));
                    }
                } else {
                    violations.push(device_violation(
                        device,
                        "bluetooth-input",
                        3,
                        "bluetooth input device alongside wired peripherals",
                    ));
                }
            } else if profile.strict_mode {
                violations.push(bluetooth_peripheral_violation(device));
            }
            continue;
        }

        if device.is_wireless && device.is_input() {
            violations.push(device_violation(
                device,
                "wireless-input",
                3,
                "wireless input device",
            ));
            continue;
        }

        if device.record.kind == DeviceKind::Storage && device.is_external {
            violations.push(device_violation(
                device,
                "external-storage",
                3,
                "external storage device",
            ));
            continue;
        }

        if contains_any(&name, MOBILE_MARKERS)
            || device.record.device_id.to_lowercase().contains("mtp")
            || device.record.device_id.to_lowercase().contains("adb")
        {
            let severity = if device.record.device_id.to_lowercase().contains("adb") {
                4
            } else {
                3
            };
            violations.push(device_violation(
                device,
                "mobile-device",
                severity,
                "mobile device attached",
            ));
            continue;
        }

        if device.record.kind == DeviceKind::Video {
            if !profile.allow_external_webcams && !is_built_in_camera(&device.record) {
                violations.push(device_violation(
                    device,
                    "external-webcam",
                    2,
                    "external webcam not permitted",
                ));
            }
            continue;
        }

        if device.is_external && device.is_input() {
            let (seen, allowed) = match device.record.kind {
                DeviceKind::Mouse => (wired_mice, profile.allowed_mice),
                _ => (wired_keyboards, profile.allowed_keyboards),
            };
            if seen > allowed {
                violations.push(device_violation(
                    device,
                    "external-input",
                    2,
                    format!("external input devices exceed allowance ({seen} > {allowed})"),
                ));
            }
        }
    }

    if input.display_count > profile.allowed_displays {
        violations.push(DeviceViolation::new(
            "displays",
            "attached displays",
            "secondary-display",
            3,
            format!(
                "{} displays attached, {} allowed",
                input.display_count, profile.allowed_displays
            ),
            vec![format!("displayCount:{}", input.display_count)],
        ));
    }

    for interface in input.network_interfaces {
        let name = interface.name.to_lowercase();
        let hotspot_ip = interface
            .ips
            .iter()
            .find(|ip| HOTSPOT_PREFIXES.iter().any(|p| ip.starts_with(p)));

        if let Some(ip) = hotspot_ip {
            violations.push(DeviceViolation::new(
                &interface.name,
                &interface.name,
                "hotspot-network",
                4,
                "interface address is in a phone-hotspot range",
                vec![format!("ip:{ip}")],
            ));
        } else if contains_any(&name, HOTSPOT_NAME_MARKERS) {
            violations.push(DeviceViolation::new(
                &interface.name,
                &interface.name,
                "hotspot-network",
                2,
                "interface name suggests tethering",
                vec![format!("name:{}", interface.name)],
            ));
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::InputDeviceRecord;
    use crate::smartdevice::classify::classify;

    fn classified(name: &str, kind: DeviceKind, id: &str) -> ClassifiedDevice {
        classify(&InputDeviceRecord::new(name, kind, id))
    }

    fn desktop() -> SecurityProfile {
        SecurityProfile::for_system(SystemType::Desktop)
    }

    fn input<'a>(devices: &'a [ClassifiedDevice]) -> PolicyInput<'a> {
        PolicyInput {
            devices,
            network_interfaces: &[],
            display_count: 1,
        }
    }

    #[test]
    fn test_profiles_differ_only_in_input_allowance() {
        let laptop = SecurityProfile::for_system(SystemType::Laptop);
        let desktop = desktop();
        assert_eq!(laptop.allowed_mice, 0);
        assert_eq!(laptop.allowed_keyboards, 0);
        assert_eq!(desktop.allowed_mice, 1);
        assert_eq!(desktop.allowed_keyboards, 1);
        assert_eq!(laptop.allowed_displays, desktop.allowed_displays);
        assert!(laptop.strict_mode && desktop.strict_mode);
    }

    #[test]
    fn test_desktop_bluetooth_allowance() {
        // No wired input: one BT mouse + one BT keyboard pass, the second
        // BT mouse violates with "limit exceeded".
        let devices = vec![
            classified("BT Mouse A", DeviceKind::Mouse, "BTHENUM\\a"),
            classified("BT Keyboard", DeviceKind::Keyboard, "BTHENUM\\b"),
            classified("BT Mouse B", DeviceKind::Mouse, "BTHENUM\\c"),
        ];
        let violations = evaluate(&desktop(), &input(&devices));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, "bluetooth-input-limit");
        assert_eq!(violations[0].severity, 3);
        assert_eq!(violations[0].reason, "limit exceeded");
        assert_eq!(violations[0].device_name, "BT Mouse B");
    }

    #[test]
    fn test_bluetooth_input_with_wired_present_violates() {
        let mut wired = InputDeviceRecord::new("Dell Wired Mouse", DeviceKind::Mouse, "USB\\dell");
        wired.vendor_id = "413c".to_string();
        let devices = vec![
            classify(&wired),
            classified("BT Mouse", DeviceKind::Mouse, "BTHENUM\\x"),
        ];
        let violations = evaluate(&desktop(), &input(&devices));
        let bt: Vec<_> = violations
            .iter()
            .filter(|v| v.violation_type == "bluetooth-input")
            .collect();
        assert_eq!(bt.len(), 1);
        assert_eq!(bt[0].severity, 3);
    }

    #[test]
    fn test_non_input_bluetooth_severities() {
        let devices = vec![
            classified("Bluetooth Headset", DeviceKind::Audio, "BTHENUM\\h"),
            classified("Galaxy S24 Bluetooth", DeviceKind::Hid, "BTHENUM\\p"),
            classified("Fitness Band Bluetooth", DeviceKind::Hid, "BTHENUM\\w"),
            classified("Bluetooth Gamepad", DeviceKind::Hid, "BTHENUM\\g"),
        ];
        let violations = evaluate(&desktop(), &input(&devices));
        let severity_of = |t: &str| {
            violations
                .iter()
                .find(|v| v.violation_type == t)
                .map(|v| v.severity)
        };
        assert_eq!(severity_of("bluetooth-audio"), Some(3));
        assert_eq!(severity_of("bluetooth-mobile"), Some(4));
        assert_eq!(severity_of("bluetooth-wearable"), Some(3));
        assert_eq!(severity_of("bluetooth-device"), Some(2));
    }

    #[test]
    fn test_virtual_audio_short_circuits() {
        let devices = vec![classified(
            "VB-Audio Virtual Cable",
            DeviceKind::Audio,
            "ROOT\\vbaudio",
        )];
        let violations = evaluate(&desktop(), &input(&devices));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, "virtual-audio");
        assert_eq!(violations[0].severity, 4);
    }

    #[test]
    fn test_secondary_display_violation() {
        let violations = evaluate(
            &desktop(),
            &PolicyInput {
                devices: &[],
                network_interfaces: &[],
                display_count: 2,
            },
        );
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, "secondary-display");
        assert_eq!(violations[0].severity, 3);

        // Cleared when back to one display.
        let violations = evaluate(&desktop(), &input(&[]));
        assert!(violations.is_empty());
    }

    #[test]
    fn test_hotspot_network_detection() {
        let interfaces = vec![
            NetworkInterfaceRecord {
                name: "wlan0".to_string(),
                ips: vec!["192.168.43.17".to_string()],
            },
            NetworkInterfaceRecord {
                name: "Mobile Hotspot Adapter".to_string(),
                ips: vec!["10.0.0.4".to_string()],
            },
            NetworkInterfaceRecord {
                name: "eth0".to_string(),
                ips: vec!["10.1.2.3".to_string()],
            },
        ];
        let violations = evaluate(
            &desktop(),
            &PolicyInput {
                devices: &[],
                network_interfaces: &interfaces,
                display_count: 1,
            },
        );
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].severity, 4);
        assert!(violations[0].evidence[0].starts_with("ip:192.168.43."));
        assert_eq!(violations[1].severity, 2);
    }

    #[test]
    fn test_violation_key_identity() {
        let devices = vec![classified("BT Mouse", DeviceKind::Mouse, "BTHENUM\\x")];
        let wired = classify(&{
            let mut r = InputDeviceRecord::new("Wired KB", DeviceKind::Keyboard, "USB\\kb");
            r.vendor_id = "045e".to_string();
            r.manufacturer = "Microsoft".to_string();
            r
        });
        let all: Vec<ClassifiedDevice> =
            devices.iter().cloned().chain(std::iter::once(wired)).collect();
        let first = evaluate(&desktop(), &input(&all));
        let second = evaluate(&desktop(), &input(&all));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].key(), second[0].key());
    }
}
