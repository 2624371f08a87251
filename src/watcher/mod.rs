//! Watcher lifecycle base shared by every sensor.
//!
//! Each started sensor owns exactly one worker thread that performs an
//! initial probe and then loops with a cooperative shutdown check every
//! iteration. `stop` sets a shared flag and joins the worker; sleeps are
//! sliced so stop returns within the poll interval plus 200 ms.

pub mod clipboard;
pub mod device;
pub mod focus_idle;
pub mod process;

use crate::sink::SharedSink;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Maximum single sleep slice; bounds how long `stop` can wait on a worker.
const MAX_SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Common capability implemented by every sensor variant.
///
/// Platform differences are internal to each sensor, selected at compile
/// time; the host only ever talks through this trait.
pub trait Sensor: Send {
    /// Stable sensor tag, also used as the event `module` field.
    fn name(&self) -> &'static str;

    /// Spawn the worker. Returns false (with no side effects) when already
    /// running.
    fn start(&mut self, sink: SharedSink) -> bool;

    /// Signal shutdown and join the worker. No event is delivered after
    /// this returns. Safe to call on a stopped sensor.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Synchronous view of the sensor's current state, when it keeps one.
    fn snapshot(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Error raised by a single probe. One failed probe never terminates the
/// worker; it becomes an `eventType="error"` event and a log line.
#[derive(Debug)]
pub struct ProbeError(pub String);

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ProbeError {}

impl From<String> for ProbeError {
    fn from(s: String) -> Self {
        ProbeError(s)
    }
}

impl From<&str> for ProbeError {
    fn from(s: &str) -> Self {
        ProbeError(s.to_string())
    }
}

/// Handle passed into the worker body for cooperative shutdown.
#[derive(Clone)]
pub struct WorkerCtx {
    running: Arc<AtomicBool>,
}

impl WorkerCtx {
    pub fn active(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep up to `duration`, waking early on shutdown. Sliced into
    /// 200 ms chunks so `stop` never waits on a full poll interval.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.active() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(MAX_SLEEP_SLICE));
        }
    }
}

/// Owns the worker thread of one sensor: the shared running flag and the
/// join handle. Start/stop/is_running semantics are identical across all
/// sensors.
pub struct Worker {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl Worker {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the worker body on a named thread. Returns false when already
    /// running.
    pub fn start<F>(&mut self, name: &'static str, body: F) -> bool
    where
        F: FnOnce(WorkerCtx) + Send + 'static,
    {
        if self.running.load(Ordering::SeqCst) {
            return false;
        }
        self.running.store(true, Ordering::SeqCst);

        let ctx = WorkerCtx {
            running: self.running.clone(),
        };
        let running = self.running.clone();

        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                body(ctx);
                running.store(false, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                true
            }
            Err(e) => {
                tracing::error!(sensor = name, error = %e, "failed to spawn worker");
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Signal shutdown and join. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run one probe, converting a panic or error into a single error event.
/// The caller must not hold any lock across this call.
pub fn run_probe<F>(sensor: &'static str, encoder: &mut crate::event::EventEncoder, sink: &SharedSink, probe: F)
where
    F: FnOnce(&mut crate::event::EventEncoder, &SharedSink) -> Result<(), ProbeError>,
{
    let outcome = catch_unwind(AssertUnwindSafe(|| probe(encoder, sink)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(sensor, error = %e, "probe failed");
            sink.deliver(encoder.encode_error(&e.0));
        }
        Err(_) => {
            tracing::error!(sensor, "probe panicked");
            sink.deliver(encoder.encode_error("internal probe failure"));
        }
    }
}

/// Level-triggered heartbeat timer.
pub struct Heartbeat {
    interval: Duration,
    last: Instant,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// True when a heartbeat is due; arms the next one.
    pub fn due(&mut self) -> bool {
        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }

    /// Push the next heartbeat out. Used by sensors that gate heartbeats on
    /// activity: a state-change event resets the timer.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }
}
