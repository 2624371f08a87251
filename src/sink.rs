//! Event sinks: serialized delivery of JSON strings from workers to the host.
//!
//! A sink accepts one UTF-8 JSON string per event and is safe to call from
//! any worker thread. Per-sensor FIFO follows from each sensor owning a
//! single worker; cross-sensor calls are serialized by the sink itself.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// Delivery contract shared by all sensors.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Takes ownership of the string. Must not panic.
    fn deliver(&self, json: String);
}

/// Shared handle to a sink; must outlive the last running sensor.
pub type SharedSink = Arc<dyn EventSink>;

/// Wraps a host callback behind a mutex so calls from concurrent workers are
/// serialized. Sensors never hold their own locks across `deliver`, so a
/// slow callback delays only the calling sensor.
pub struct CallbackSink {
    callback: Mutex<Box<dyn FnMut(String) + Send>>,
}

impl CallbackSink {
    pub fn new(callback: impl FnMut(String) + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Box::new(callback)),
        }
    }

    pub fn shared(callback: impl FnMut(String) + Send + 'static) -> SharedSink {
        Arc::new(Self::new(callback))
    }
}

impl EventSink for CallbackSink {
    fn deliver(&self, json: String) {
        // A poisoned lock means a previous callback panicked; keep delivering.
        match self.callback.lock() {
            Ok(mut cb) => cb(json),
            Err(poisoned) => (poisoned.into_inner())(json),
        }
    }
}

/// Channel-backed sink. The host consumes events from the receiver at its
/// own pace; a full channel drops the event rather than blocking a worker.
pub struct ChannelSink {
    sender: Sender<String>,
}

impl ChannelSink {
    /// Create a sink and its receiving end with the given capacity.
    pub fn bounded(capacity: usize) -> (SharedSink, Receiver<String>) {
        let (sender, receiver) = bounded(capacity);
        (Arc::new(Self { sender }), receiver)
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, json: String) {
        match self.sender.try_send(json) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Discards everything. Useful when only snapshots are of interest.
pub struct NullSink;

impl EventSink for NullSink {
    fn deliver(&self, _json: String) {}
}

/// Collects events in memory. Intended for tests and diagnostics.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain collected events.
    pub fn take(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|mut e| std::mem::take(&mut *e))
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn deliver(&self, json: String) {
        if let Ok(mut events) = self.events.lock() {
            events.push(json);
        }
    }
}
