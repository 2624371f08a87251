//! Virtualization detection.
//!
//! Declares a VM only on strong evidence: two independent indicator
//! classes (hypervisor CPUID bit, vendor MAC prefix, firmware strings) or
//! at least two distinct guest-tool processes. A single hit is reported in
//! the indicator list without flipping the verdict; hypervisor bits are
//! also set on hosts running Hyper-V or WSL.

use serde::{Deserialize, Serialize};
use sysinfo::{Networks, System};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmDetectionResult {
    pub is_inside_vm: bool,
    /// Product name of the matched hypervisor, when one was identified.
    pub detected_vm: Option<String>,
    pub detection_method: Option<String>,
    pub running_vm_processes: Vec<String>,
    pub vm_indicators: Vec<String>,
}

/// Guest-tool and hypervisor helper process names, with the product each
/// one implies.
const VM_PROCESSES: &[(&str, &str)] = &[
    ("vmtoolsd", "VMware"),
    ("vmware-tools", "VMware"),
    ("vboxservice", "VirtualBox"),
    ("vboxtray", "VirtualBox"),
    ("vboxclient", "VirtualBox"),
    ("prl_cc", "Parallels"),
    ("prl_tools", "Parallels"),
    ("qemu-ga", "QEMU"),
    ("spice-vdagent", "QEMU"),
    ("hv_kvp_daemon", "Hyper-V"),
];

/// Vendor-assigned MAC prefixes used by hypervisor NICs.
const VM_MAC_PREFIXES: &[(&str, &str)] = &[
    ("00:05:69", "VMware"),
    ("00:0c:29", "VMware"),
    ("00:1c:14", "VMware"),
    ("00:50:56", "VMware"),
    ("08:00:27", "VirtualBox"),
    ("00:15:5d", "Hyper-V"),
    ("52:54:00", "QEMU"),
    ("00:1c:42", "Parallels"),
];

/// Fuse the gathered evidence. Pure; `detect` feeds it live observations.
pub fn fuse(
    process_names: &[String],
    mac_addresses: &[String],
    hypervisor_bit: bool,
) -> VmDetectionResult {
    let mut running_vm_processes = Vec::new();
    let mut vm_indicators = Vec::new();
    let mut detected_vm = None;

    for name in process_names {
        let lower = name.to_lowercase();
        if let Some((needle, product)) = VM_PROCESSES
            .iter()
            .find(|(needle, _)| lower.contains(needle))
        {
            running_vm_processes.push(name.clone());
            vm_indicators.push(format!("process:{needle}"));
            detected_vm.get_or_insert_with(|| product.to_string());
        }
    }
    running_vm_processes.dedup();

    let mut strong_indicators = 0usize;

    for mac in mac_addresses {
        let lower = mac.to_lowercase();
        if let Some((prefix, product)) = VM_MAC_PREFIXES
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix))
        {
            vm_indicators.push(format!("mac:{prefix}"));
            detected_vm.get_or_insert_with(|| product.to_string());
            strong_indicators += 1;
            break;
        }
    }

    if hypervisor_bit {
        vm_indicators.push("cpuid:hypervisor".to_string());
        strong_indicators += 1;
    }

    let distinct_processes: std::collections::BTreeSet<&String> =
        running_vm_processes.iter().collect();
    let is_inside_vm = strong_indicators >= 2 || distinct_processes.len() >= 2;

    let detection_method = if is_inside_vm {
        Some(if distinct_processes.len() >= 2 {
            "guest-processes".to_string()
        } else {
            "hardware-indicators".to_string()
        })
    } else {
        None
    };

    VmDetectionResult {
        is_inside_vm,
        detected_vm: if is_inside_vm { detected_vm } else { None },
        detection_method,
        running_vm_processes,
        vm_indicators,
    }
}

fn hypervisor_bit() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        // ECX bit 31 of CPUID leaf 1.
        let leaf = unsafe { std::arch::x86_64::__cpuid(1) };
        return leaf.ecx & (1 << 31) != 0;
    }
    #[allow(unreachable_code)]
    false
}

/// Run the detection against the live system.
pub fn detect() -> VmDetectionResult {
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::All);
    let process_names: Vec<String> = system
        .processes()
        .values()
        .map(|p| p.name().to_string_lossy().into_owned())
        .collect();

    let networks = Networks::new_with_refreshed_list();
    let mac_addresses: Vec<String> = networks
        .values()
        .map(|data| data.mac_address().to_string())
        .collect();

    fuse(&process_names, &mac_addresses, hypervisor_bit())
}
