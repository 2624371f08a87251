//! Bluetooth adapter status.
//!
//! Reports whether an adapter is present/enabled and which devices are
//! paired. Platforms without a supported query path return a disabled
//! status with the error field set rather than failing.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothDevice {
    pub name: String,
    pub address: String,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothStatus {
    pub enabled: bool,
    pub devices: Vec<BluetoothDevice>,
    pub error: Option<String>,
}

impl BluetoothStatus {
    fn unavailable(error: impl Into<String>) -> Self {
        Self {
            enabled: false,
            devices: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Query the adapter and the paired-device list.
pub fn status() -> BluetoothStatus {
    #[cfg(target_os = "windows")]
    {
        return windows_status();
    }
    #[cfg(target_os = "macos")]
    {
        return macos_status();
    }
    #[allow(unreachable_code)]
    BluetoothStatus::unavailable("bluetooth query not supported on this platform")
}

#[cfg(target_os = "windows")]
fn windows_status() -> BluetoothStatus {
    use windows::Win32::Devices::Bluetooth::{
        BluetoothFindDeviceClose, BluetoothFindFirstDevice, BluetoothFindNextDevice,
        BluetoothFindFirstRadio, BluetoothFindRadioClose, BLUETOOTH_DEVICE_INFO,
        BLUETOOTH_DEVICE_SEARCH_PARAMS, BLUETOOTH_FIND_RADIO_PARAMS,
    };
    use windows::Win32::Foundation::{CloseHandle, HANDLE};

    // Adapter presence: any radio found means bluetooth is on.
    let radio_params = BLUETOOTH_FIND_RADIO_PARAMS {
        dwSize: std::mem::size_of::<BLUETOOTH_FIND_RADIO_PARAMS>() as u32,
    };
    let mut radio: HANDLE = HANDLE::default();
    let enabled = match unsafe { BluetoothFindFirstRadio(&radio_params, &mut radio) } {
        Ok(find) => {
            unsafe {
                let _ = CloseHandle(radio);
                let _ = BluetoothFindRadioClose(find);
            }
            true
        }
        Err(_) => false,
    };
    if !enabled {
        return BluetoothStatus {
            enabled: false,
            devices: Vec::new(),
            error: None,
        };
    }

    let search = BLUETOOTH_DEVICE_SEARCH_PARAMS {
        dwSize: std::mem::size_of::<BLUETOOTH_DEVICE_SEARCH_PARAMS>() as u32,
        fReturnAuthenticated: true.into(),
        fReturnRemembered: true.into(),
        fReturnConnected: true.into(),
        fReturnUnknown: false.into(),
        fIssueInquiry: false.into(),
        cTimeoutMultiplier: 0,
        hRadio: HANDLE::default(),
    };
    let mut info = BLUETOOTH_DEVICE_INFO {
        dwSize: std::mem::size_of::<BLUETOOTH_DEVICE_INFO>() as u32,
        ..Default::default()
    };

    let mut devices = Vec::new();
    let find = match unsafe { BluetoothFindFirstDevice(&search, &mut info) } {
        Ok(find) => find,
        Err(_) => {
            return BluetoothStatus {
                enabled,
                devices,
                error: None,
            }
        }
    };
    loop {
        let name = String::from_utf16_lossy(&info.szName)
            .trim_end_matches('\0')
            .to_string();
        let address = unsafe { info.Address.Anonymous.rgBytes };
        devices.push(BluetoothDevice {
            name,
            address: address
                .iter()
                .rev()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(":"),
            connected: info.fConnected.as_bool(),
        });
        if unsafe { BluetoothFindNextDevice(find, &mut info) }.is_err() {
            break;
        }
    }
    unsafe {
        let _ = BluetoothFindDeviceClose(find);
    }

    BluetoothStatus {
        enabled,
        devices,
        error: None,
    }
}

#[cfg(target_os = "macos")]
fn macos_status() -> BluetoothStatus {
    use std::process::Command;

    let output = match Command::new("system_profiler")
        .args(["SPBluetoothDataType", "-json"])
        .output()
    {
        Ok(out) if out.status.success() => out.stdout,
        Ok(out) => {
            return BluetoothStatus::unavailable(format!(
                "system_profiler exited with {}",
                out.status
            ))
        }
        Err(e) => return BluetoothStatus::unavailable(e.to_string()),
    };

    let parsed: serde_json::Value = match serde_json::from_slice(&output) {
        Ok(v) => v,
        Err(e) => return BluetoothStatus::unavailable(e.to_string()),
    };

    let controller = &parsed["SPBluetoothDataType"][0];
    let enabled = controller["controller_properties"]["controller_state"]
        .as_str()
        .map(|s| s.contains("on"))
        .unwrap_or(false);

    let mut devices = Vec::new();
    for key in ["device_connected", "device_not_connected"] {
        if let Some(list) = controller[key].as_array() {
            let connected = key == "device_connected";
            for entry in list {
                if let Some(map) = entry.as_object() {
                    for (name, props) in map {
                        devices.push(BluetoothDevice {
                            name: name.clone(),
                            address: props["device_address"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                            connected,
                        });
                    }
                }
            }
        }
    }

    BluetoothStatus {
        enabled,
        devices,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_never_panics() {
        let status = status();
        // Whatever the platform, an error implies a disabled report.
        if status.error.is_some() {
            assert!(!status.enabled);
            assert!(status.devices.is_empty());
        }
    }

    #[test]
    fn test_wire_format() {
        let status = BluetoothStatus {
            enabled: true,
            devices: vec![BluetoothDevice {
                name: "Buds".to_string(),
                address: "AA:BB:CC:DD:EE:FF".to_string(),
                connected: true,
            }],
            error: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"enabled\":true"));
        assert!(json.contains("\"connected\":true"));
    }
}
