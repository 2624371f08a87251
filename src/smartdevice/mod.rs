//! Smart-device policy engine.
//!
//! Polls the peripheral inventory, classifies each device and evaluates it
//! against the security profile picked for this machine's form factor. The
//! active violation set is rebuilt every probe; a violation seen for the
//! first time emits as new, one still present re-emits marked persistent.

pub mod classify;
pub mod policy;

use crate::config::SmartDeviceOptions;
use crate::event::EventEncoder;
use crate::platform::{self, InventorySource};
use crate::probes::system;
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Heartbeat, Sensor, Worker};
use classify::{classify, ClassifiedDevice};
use policy::{evaluate, DeviceViolation, PolicyInput, SecurityProfile};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODULE: &str = "smart-device";

type InventoryFactory = Arc<dyn Fn() -> Box<dyn InventorySource> + Send + Sync>;

pub struct SmartDeviceDetector {
    options: SmartDeviceOptions,
    profile: Option<SecurityProfile>,
    worker: Worker,
    inventory_factory: InventoryFactory,
    state: Arc<Mutex<Vec<DeviceViolation>>>,
}

impl SmartDeviceDetector {
    pub fn new(options: SmartDeviceOptions) -> Self {
        Self::with_parts(options, None, Arc::new(platform::default_inventory_source))
    }

    /// Build with a fixed profile and inventory source. `profile=None`
    /// detects the form factor on first probe.
    pub fn with_parts(
        options: SmartDeviceOptions,
        profile: Option<SecurityProfile>,
        inventory_factory: InventoryFactory,
    ) -> Self {
        Self {
            options,
            profile,
            worker: Worker::new(),
            inventory_factory,
            state: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Sensor for SmartDeviceDetector {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn start(&mut self, sink: SharedSink) -> bool {
        let options = self.options.clone();
        let fixed_profile = self.profile.clone();
        let factory = self.inventory_factory.clone();
        let state = self.state.clone();

        self.worker.start(MODULE, move |ctx| {
            let profile = fixed_profile.unwrap_or_else(|| {
                let info = system::detect();
                SecurityProfile::for_system(info.system_type)
            });
            tracing::info!(
                system_type = ?profile.system_type,
                allowed_mice = profile.allowed_mice,
                allowed_keyboards = profile.allowed_keyboards,
                "smart-device profile selected"
            );

            let mut inventory = factory();
            let mut encoder = EventEncoder::new(MODULE);
            let interval = Duration::from_millis(options.interval_ms);
            let mut heartbeat = Heartbeat::new(Duration::from_millis(options.heartbeat_interval_ms));
            let mut active_keys: HashSet<String> = HashSet::new();

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    let devices: Vec<ClassifiedDevice> = inventory
                        .input_devices()
                        .iter()
                        .map(classify)
                        .collect();
                    let network_interfaces = inventory.network_interfaces();
                    let display_count = inventory.display_count();

                    let mut violations = evaluate(
                        &profile,
                        &PolicyInput {
                            devices: &devices,
                            network_interfaces: &network_interfaces,
                            display_count,
                        },
                    );

                    let mut next_keys = HashSet::new();
                    for violation in &mut violations {
                        let key = violation.key();
                        violation.persistent = active_keys.contains(&key);
                        next_keys.insert(key);
                        sink.deliver(encoder.encode(
                            "device-violation",
                            serde_json::json!({ "violation": violation }),
                        ));
                    }
                    active_keys = next_keys;

                    if heartbeat.due() {
                        sink.deliver(encoder.encode(
                            "heartbeat",
                            serde_json::json!({
                                "deviceCount": devices.len(),
                                "displayCount": display_count,
                                "activeViolations": violations.len(),
                                "maxSeverity": violations.iter().map(|v| v.severity).max().unwrap_or(0),
                            }),
                        ));
                    }

                    if let Ok(mut shared) = state.lock() {
                        *shared = violations;
                    }
                    Ok(())
                });

                ctx.sleep(interval);
            }
        })
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    fn snapshot(&self) -> Option<serde_json::Value> {
        self.state
            .lock()
            .ok()
            .and_then(|violations| serde_json::to_value(&*violations).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::{DeviceKind, InputDeviceRecord, NetworkInterfaceRecord};
    use crate::sink::MemorySink;
    use policy::SystemType;

    struct ScriptedInventory {
        devices: Vec<InputDeviceRecord>,
        displays: usize,
    }

    impl InventorySource for ScriptedInventory {
        fn input_devices(&mut self) -> Vec<InputDeviceRecord> {
            self.devices.clone()
        }

        fn network_interfaces(&mut self) -> Vec<NetworkInterfaceRecord> {
            Vec::new()
        }

        fn display_count(&mut self) -> usize {
            self.displays
        }
    }

    fn detector_with(
        devices: Vec<InputDeviceRecord>,
        system_type: SystemType,
    ) -> SmartDeviceDetector {
        SmartDeviceDetector::with_parts(
            SmartDeviceOptions {
                interval_ms: 20,
                heartbeat_interval_ms: 60_000,
            },
            Some(SecurityProfile::for_system(system_type)),
            Arc::new(move || {
                Box::new(ScriptedInventory {
                    devices: devices.clone(),
                    displays: 1,
                }) as Box<dyn InventorySource>
            }),
        )
    }

    #[test]
    fn test_desktop_bt_pair_is_quiet_excess_violates() {
        // One BT mouse and one BT keyboard on an otherwise bare desktop
        // produce no violations; a second BT mouse does.
        let quiet = vec![
            InputDeviceRecord::new("BT Mouse", DeviceKind::Mouse, "BTHENUM\\m1"),
            InputDeviceRecord::new("BT Keyboard", DeviceKind::Keyboard, "BTHENUM\\k1"),
        ];
        let mut detector = detector_with(quiet, SystemType::Desktop);
        let sink = MemorySink::new();
        assert!(detector.start(sink.clone()));
        std::thread::sleep(Duration::from_millis(120));
        detector.stop();
        assert!(sink
            .take()
            .iter()
            .all(|e| !e.contains("device-violation")));

        let excess = vec![
            InputDeviceRecord::new("BT Mouse", DeviceKind::Mouse, "BTHENUM\\m1"),
            InputDeviceRecord::new("BT Mouse 2", DeviceKind::Mouse, "BTHENUM\\m2"),
        ];
        let mut detector = detector_with(excess, SystemType::Desktop);
        let sink = MemorySink::new();
        detector.start(sink.clone());
        std::thread::sleep(Duration::from_millis(120));
        detector.stop();

        let events: Vec<serde_json::Value> = sink
            .take()
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .filter(|e: &serde_json::Value| e["eventType"] == "device-violation")
            .collect();
        assert!(!events.is_empty());
        assert_eq!(
            events[0]["violation"]["violationType"],
            "bluetooth-input-limit"
        );
        assert_eq!(events[0]["violation"]["reason"], "limit exceeded");
    }

    #[test]
    fn test_persistent_violations_reemit_marked() {
        let devices = vec![InputDeviceRecord::new(
            "VMware Virtual Keyboard",
            DeviceKind::Keyboard,
            "ROOT\\vmkbd",
        )];
        let mut detector = detector_with(devices, SystemType::Laptop);
        let sink = MemorySink::new();
        detector.start(sink.clone());
        std::thread::sleep(Duration::from_millis(150));
        detector.stop();

        let violations: Vec<serde_json::Value> = sink
            .take()
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .filter(|e: &serde_json::Value| e["eventType"] == "device-violation")
            .collect();

        // First emission is new, every later one is marked persistent.
        assert!(violations.len() >= 2);
        assert_eq!(violations[0]["violation"]["persistent"], false);
        assert!(violations[1..]
            .iter()
            .all(|v| v["violation"]["persistent"] == true));
        assert_eq!(violations[0]["violation"]["severity"], 4);
    }

    #[test]
    fn test_snapshot_reflects_active_set() {
        let devices = vec![InputDeviceRecord::new(
            "Bluetooth Headset",
            DeviceKind::Audio,
            "BTHENUM\\h",
        )];
        let mut detector = detector_with(devices, SystemType::Laptop);
        let sink = MemorySink::new();
        detector.start(sink);
        std::thread::sleep(Duration::from_millis(100));
        let snapshot = detector.snapshot().unwrap();
        detector.stop();

        assert_eq!(snapshot[0]["violationType"], "bluetooth-audio");
    }
}
