//! Sensor registry.
//!
//! The host builds the sensor set once from configuration, then drives it
//! through the registry by module name. The registry owns the sensors;
//! dropping it stops every worker.

use crate::config::Config;
use crate::screen::ScreenWatcher;
use crate::sink::SharedSink;
use crate::smartdevice::SmartDeviceDetector;
use crate::watcher::clipboard::ClipboardWatcher;
use crate::watcher::device::DeviceWatcher;
use crate::watcher::focus_idle::FocusIdleWatcher;
use crate::watcher::process::ProcessWatcher;
use crate::watcher::Sensor;
use std::collections::BTreeMap;

pub struct SensorRegistry {
    sensors: BTreeMap<&'static str, Box<dyn Sensor>>,
}

impl SensorRegistry {
    /// Build the full sensor set from configuration.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ProcessWatcher::new(config.process.clone())));
        registry.register(Box::new(DeviceWatcher::new(config.device.clone())));
        registry.register(Box::new(FocusIdleWatcher::new(config.focus_idle.clone())));
        registry.register(Box::new(ClipboardWatcher::new(config.clipboard.clone())));
        registry.register(Box::new(ScreenWatcher::new(config.screen.clone())));
        registry.register(Box::new(SmartDeviceDetector::new(config.smart_device.clone())));
        registry
    }

    pub fn empty() -> Self {
        Self {
            sensors: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, sensor: Box<dyn Sensor>) {
        self.sensors.insert(sensor.name(), sensor);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sensors.keys().copied().collect()
    }

    /// Start one sensor. False when the name is unknown or the sensor is
    /// already running.
    pub fn start(&mut self, name: &str, sink: SharedSink) -> bool {
        match self.sensors.get_mut(name) {
            Some(sensor) => {
                let started = sensor.start(sink);
                if started {
                    tracing::info!(sensor = name, "sensor started");
                }
                started
            }
            None => {
                tracing::warn!(sensor = name, "unknown sensor");
                false
            }
        }
    }

    /// Start every registered sensor. Returns the names that started.
    pub fn start_all(&mut self, sink: &SharedSink) -> Vec<&'static str> {
        let mut started = Vec::new();
        for (name, sensor) in self.sensors.iter_mut() {
            if sensor.start(sink.clone()) {
                tracing::info!(sensor = name, "sensor started");
                started.push(*name);
            }
        }
        started
    }

    pub fn stop(&mut self, name: &str) {
        if let Some(sensor) = self.sensors.get_mut(name) {
            sensor.stop();
            tracing::info!(sensor = name, "sensor stopped");
        }
    }

    pub fn stop_all(&mut self) {
        for (name, sensor) in self.sensors.iter_mut() {
            if sensor.is_running() {
                sensor.stop();
                tracing::info!(sensor = name, "sensor stopped");
            }
        }
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.sensors
            .get(name)
            .map(|sensor| sensor.is_running())
            .unwrap_or(false)
    }

    pub fn snapshot(&self, name: &str) -> Option<serde_json::Value> {
        self.sensors.get(name).and_then(|sensor| sensor.snapshot())
    }
}

impl Drop for SensorRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, NullSink};

    struct FakeSensor {
        running: bool,
    }

    impl Sensor for FakeSensor {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn start(&mut self, _sink: SharedSink) -> bool {
            if self.running {
                return false;
            }
            self.running = true;
            true
        }

        fn stop(&mut self) {
            self.running = false;
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    #[test]
    fn test_start_unknown_sensor_is_false() {
        let mut registry = SensorRegistry::empty();
        let sink: SharedSink = std::sync::Arc::new(NullSink);
        assert!(!registry.start("nope", sink));
    }

    #[test]
    fn test_start_is_idempotent_per_name() {
        let mut registry = SensorRegistry::empty();
        registry.register(Box::new(FakeSensor { running: false }));

        let sink = MemorySink::new();
        assert!(registry.start("fake", sink.clone()));
        assert!(registry.is_running("fake"));
        assert!(!registry.start("fake", sink.clone()));

        registry.stop("fake");
        assert!(!registry.is_running("fake"));
        assert!(registry.start("fake", sink));
    }

    #[test]
    fn test_registry_names_are_sorted() {
        let registry = SensorRegistry::from_config(&Config::default());
        let names = registry.names();
        assert_eq!(
            names,
            vec![
                "clipboard",
                "device-watch",
                "focus-idle",
                "process-watch",
                "screen-watch",
                "smart-device",
            ]
        );
    }
}
