//! Removable-storage watcher.
//!
//! Polls the storage enumeration (the portable fallback when OS change
//! notifications are unavailable) and reports connects/removals as the
//! symmetric set difference against the previous snapshot. A heartbeat
//! every 5 s carries the full device list.

use crate::config::DeviceWatchOptions;
use crate::event::EventEncoder;
use crate::platform::types::StorageDevice;
use crate::platform::{self, StorageSource};
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Heartbeat, Sensor, Worker};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODULE: &str = "device-watch";

type SourceFactory = Arc<dyn Fn() -> Box<dyn StorageSource> + Send + Sync>;

/// Devices present in `current` but not in `previous`, by `(id, path)`
/// identity, and vice versa.
pub fn diff_devices(
    previous: &[StorageDevice],
    current: &[StorageDevice],
) -> (Vec<StorageDevice>, Vec<StorageDevice>) {
    let connected = current
        .iter()
        .filter(|device| !previous.contains(device))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|device| !current.contains(device))
        .cloned()
        .collect();
    (connected, removed)
}

pub struct DeviceWatcher {
    options: DeviceWatchOptions,
    worker: Worker,
    source_factory: SourceFactory,
    state: Arc<Mutex<Vec<StorageDevice>>>,
}

impl DeviceWatcher {
    pub fn new(options: DeviceWatchOptions) -> Self {
        Self::with_source(options, Arc::new(platform::default_storage_source))
    }

    pub fn with_source(options: DeviceWatchOptions, source_factory: SourceFactory) -> Self {
        Self {
            options,
            worker: Worker::new(),
            source_factory,
            state: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Sensor for DeviceWatcher {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn start(&mut self, sink: SharedSink) -> bool {
        let options = self.options.clone();
        let factory = self.source_factory.clone();
        let state = self.state.clone();

        self.worker.start(MODULE, move |ctx| {
            let mut source = factory();
            let mut encoder = EventEncoder::new(MODULE);
            let interval = Duration::from_millis(options.interval_ms);
            let mut heartbeat = Heartbeat::new(Duration::from_millis(options.heartbeat_interval_ms));
            let mut previous: Option<Vec<StorageDevice>> = None;

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    let devices = source.devices();

                    if let Some(prev) = previous.as_ref() {
                        let (connected, removed) = diff_devices(prev, &devices);
                        for device in connected {
                            sink.deliver(encoder.encode(
                                "device-connected",
                                serde_json::json!({
                                    "device": device,
                                    "total_devices": devices.len(),
                                }),
                            ));
                        }
                        for device in removed {
                            sink.deliver(encoder.encode(
                                "device-removed",
                                serde_json::json!({
                                    "device": device,
                                    "total_devices": devices.len(),
                                }),
                            ));
                        }
                    }

                    if heartbeat.due() {
                        sink.deliver(encoder.encode(
                            "heartbeat",
                            serde_json::json!({
                                "devices": devices,
                                "total_devices": devices.len(),
                            }),
                        ));
                    }

                    if let Ok(mut shared) = state.lock() {
                        *shared = devices.clone();
                    }
                    previous = Some(devices);
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
            .and_then(|devices| serde_json::to_value(&*devices).ok())
    }
}
