//! Portable probe implementations backed by sysinfo.
//!
//! These run on every target. Platform modules wrap or replace them where
//! the OS offers richer detail (loaded modules, device metadata).

use crate::platform::types::{
    InputDeviceRecord, NetworkInterfaceRecord, ProcessRecord, StorageDevice,
};
use crate::platform::{InventorySource, ProcessSource, StorageSource};
use sysinfo::{Disks, Networks, System};

/// Process enumeration via sysinfo.
pub struct PortableProcessSource {
    sys: System,
}

impl PortableProcessSource {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }
}

impl Default for PortableProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for PortableProcessSource {
    fn processes(&mut self) -> Vec<ProcessRecord> {
        self.sys.refresh_processes(sysinfo::ProcessesToUpdate::All);

        self.sys
            .processes()
            .iter()
            .map(|(pid, process)| {
                let path = process
                    .exe()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default();
                ProcessRecord::new(pid.as_u32(), process.name().to_string_lossy(), path)
            })
            .collect()
    }
}

/// Storage enumeration via sysinfo disks. Removable media is external.
pub struct PortableStorageSource {
    disks: Disks,
}

impl PortableStorageSource {
    pub fn new() -> Self {
        Self {
            disks: Disks::new(),
        }
    }
}

impl Default for PortableStorageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageSource for PortableStorageSource {
    fn devices(&mut self) -> Vec<StorageDevice> {
        self.disks.refresh_list();

        self.disks
            .iter()
            .map(|disk| {
                let name = disk.name().to_string_lossy();
                let path = disk.mount_point().to_string_lossy();
                let removable = disk.is_removable();
                let kind = if removable { "removable" } else { "fixed" };
                StorageDevice::new(&name, &path, kind, removable)
            })
            .collect()
    }
}

/// Network interfaces via sysinfo; no portable HID or display inventory.
pub struct PortableInventorySource {
    networks: Networks,
}

impl PortableInventorySource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new(),
        }
    }
}

impl Default for PortableInventorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InventorySource for PortableInventorySource {
    fn input_devices(&mut self) -> Vec<InputDeviceRecord> {
        Vec::new()
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
                    .map(|net| net.addr.to_string())
                    .collect(),
            })
            .collect()
    }

    fn display_count(&mut self) -> usize {
        0
    }
}
