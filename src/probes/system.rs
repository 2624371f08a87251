//! Form-factor detection.
//!
//! The smart-device profile depends on whether this machine is a desktop
//! or something portable. The SMBIOS chassis code is the primary signal;
//! a present battery upgrades Desktop to Laptop since convertible desktops
//! with UPS batteries do not report one through the power APIs used here.

use crate::smartdevice::policy::SystemType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub system_type: SystemType,
    pub has_battery: bool,
    /// Raw chassis descriptor as reported by the firmware, for diagnostics.
    pub chassis_type: String,
}

/// Map an SMBIOS chassis code (table 17 of the SMBIOS spec) to a type.
pub fn system_type_from_chassis(code: u32) -> SystemType {
    match code {
        3..=7 | 15 | 16 | 24 => SystemType::Desktop,
        8..=14 => SystemType::Laptop,
        30..=32 => SystemType::Tablet,
        17 | 23 | 25 | 28 | 29 => SystemType::Server,
        _ => SystemType::Unknown,
    }
}

/// Combine the chassis code with battery presence.
pub fn resolve(chassis_code: Option<u32>, has_battery: bool) -> SystemInfo {
    let system_type = match chassis_code.map(system_type_from_chassis) {
        Some(SystemType::Desktop) if has_battery => SystemType::Laptop,
        Some(t) => t,
        None if has_battery => SystemType::Laptop,
        None => SystemType::Unknown,
    };
    SystemInfo {
        system_type,
        has_battery,
        chassis_type: chassis_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    }
}

/// Detect the current machine's form factor.
pub fn detect() -> SystemInfo {
    #[cfg(target_os = "windows")]
    {
        return resolve(windows_chassis_code(), windows_has_battery());
    }
    #[cfg(target_os = "macos")]
    {
        return resolve(None, macos_is_portable());
    }
    #[allow(unreachable_code)]
    resolve(None, portable_has_battery())
}

/// Battery presence via the power-supply class. Best effort; absence of
/// the directory reads as no battery.
#[allow(dead_code)]
fn portable_has_battery() -> bool {
    std::fs::read_dir("/sys/class/power_supply")
        .map(|entries| {
            entries
                .flatten()
                .any(|e| e.file_name().to_string_lossy().starts_with("BAT"))
        })
        .unwrap_or(false)
}

#[cfg(target_os = "macos")]
fn macos_is_portable() -> bool {
    // MacBooks report a model identifier containing "Book"; everything
    // else in the lineup is a desktop.
    std::process::Command::new("sysctl")
        .args(["-n", "hw.model"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains("Book"))
        .unwrap_or(false)
}

#[cfg(target_os = "windows")]
fn windows_has_battery() -> bool {
    use windows::Win32::System::Power::{GetSystemPowerStatus, SYSTEM_POWER_STATUS};

    let mut status = SYSTEM_POWER_STATUS::default();
    // BatteryFlag 128 means "no system battery".
    unsafe { GetSystemPowerStatus(&mut status) }.is_ok() && status.BatteryFlag != 128
}

/// Read the chassis code from the raw SMBIOS table (structure type 3).
#[cfg(target_os = "windows")]
fn windows_chassis_code() -> Option<u32> {
    use windows::Win32::System::SystemInformation::GetSystemFirmwareTable;

    // 'RSMB' — raw SMBIOS table provider.
    const PROVIDER: u32 = u32::from_be_bytes(*b"RSMB");

    let size = unsafe { GetSystemFirmwareTable(PROVIDER.into(), 0, None) };
    if size == 0 {
        return None;
    }
    let mut buffer = vec![0u8; size as usize];
    let written = unsafe { GetSystemFirmwareTable(PROVIDER.into(), 0, Some(&mut buffer)) };
    if written == 0 {
        return None;
    }
    buffer.truncate(written as usize);

    // RawSMBIOSData header is 8 bytes, then the structure table.
    let table = buffer.get(8..)?;
    let mut offset = 0usize;
    while offset + 4 <= table.len() {
        let struct_type = table[offset];
        let length = table[offset + 1] as usize;
        if length < 4 || offset + length > table.len() {
            return None;
        }
        if struct_type == 3 {
            // Chassis type is at byte 5 of structure type 3; bit 7 is the
            // lock flag.
            return table.get(offset + 5).map(|b| (b & 0x7f) as u32);
        }
        // Skip the formatted area plus the trailing string-set, which is
        // terminated by a double NUL.
        offset += length;
        while offset + 1 < table.len() && !(table[offset] == 0 && table[offset + 1] == 0) {
            offset += 1;
        }
        offset += 2;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chassis_mapping() {
        assert_eq!(system_type_from_chassis(3), SystemType::Desktop);
        assert_eq!(system_type_from_chassis(6), SystemType::Desktop);
        assert_eq!(system_type_from_chassis(9), SystemType::Laptop);
        assert_eq!(system_type_from_chassis(10), SystemType::Laptop);
        assert_eq!(system_type_from_chassis(30), SystemType::Tablet);
        assert_eq!(system_type_from_chassis(23), SystemType::Server);
        assert_eq!(system_type_from_chassis(2), SystemType::Unknown);
        assert_eq!(system_type_from_chassis(99), SystemType::Unknown);
    }

    #[test]
    fn test_battery_upgrades_desktop() {
        assert_eq!(resolve(Some(3), true).system_type, SystemType::Laptop);
        assert_eq!(resolve(Some(3), false).system_type, SystemType::Desktop);
        // A laptop chassis stays a laptop regardless.
        assert_eq!(resolve(Some(9), false).system_type, SystemType::Laptop);
    }

    #[test]
    fn test_unknown_chassis_falls_back_to_battery() {
        assert_eq!(resolve(None, true).system_type, SystemType::Laptop);
        assert_eq!(resolve(None, false).system_type, SystemType::Unknown);
        assert_eq!(resolve(None, false).chassis_type, "unknown");
    }
}
