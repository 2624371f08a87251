//! Process watcher: polls the process list and reports blacklist matches.
//!
//! Output is edge-triggered: an event is emitted only when the set of
//! matched processes (or the any-match boolean) differs from the previous
//! probe.

use crate::config::ProcessWatchOptions;
use crate::event::EventEncoder;
use crate::platform::types::ProcessRecord;
use crate::platform::{self, ProcessSource};
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Sensor, Worker};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODULE: &str = "process-watch";

type SourceFactory = Arc<dyn Fn() -> Box<dyn ProcessSource> + Send + Sync>;

/// Find processes whose name or path contains any blacklist entry
/// (case-insensitive substring). Matched entries are recorded as evidence.
pub fn find_blacklisted(processes: &[ProcessRecord], blacklist: &[String]) -> Vec<ProcessRecord> {
    if blacklist.is_empty() {
        return Vec::new();
    }

    let needles: Vec<String> = blacklist.iter().map(|b| b.to_lowercase()).collect();

    processes
        .iter()
        .filter_map(|process| {
            let name = process.name.to_lowercase();
            let path = process.path.to_lowercase();
            let hits: Vec<String> = needles
                .iter()
                .filter(|needle| !needle.is_empty() && (name.contains(*needle) || path.contains(*needle)))
                .map(|needle| format!("blacklist:{needle}"))
                .collect();

            if hits.is_empty() {
                None
            } else {
                let mut matched = process.clone();
                matched.evidence = hits;
                Some(matched)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Default, serde::Serialize)]
struct ProcessWatchState {
    blacklisted_found: bool,
    matches: Vec<ProcessRecord>,
    total_processes: usize,
}

pub struct ProcessWatcher {
    options: ProcessWatchOptions,
    worker: Worker,
    source_factory: SourceFactory,
    state: Arc<Mutex<ProcessWatchState>>,
}

impl ProcessWatcher {
    pub fn new(options: ProcessWatchOptions) -> Self {
        Self::with_source(options, Arc::new(platform::default_process_source))
    }

    /// Construct with an injected process source factory. The factory is
    /// invoked once per `start` so the watcher is restartable.
    pub fn with_source(options: ProcessWatchOptions, source_factory: SourceFactory) -> Self {
        Self {
            options,
            worker: Worker::new(),
            source_factory,
            state: Arc::new(Mutex::new(ProcessWatchState::default())),
        }
    }
}

impl Sensor for ProcessWatcher {
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
            let mut prev_pids: Option<BTreeSet<u32>> = None;

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    let processes = source.processes();
                    let matches = find_blacklisted(&processes, &options.blacklist);
                    let pids: BTreeSet<u32> = matches.iter().map(|p| p.pid).collect();

                    let changed = prev_pids.as_ref() != Some(&pids);
                    if changed {
                        let payload = serde_json::json!({
                            "blacklisted_found": !matches.is_empty(),
                            "matches": matches,
                            "total_processes": processes.len(),
                        });
                        sink.deliver(encoder.encode("process-scan", payload));
                    }

                    if let Ok(mut shared) = state.lock() {
                        shared.blacklisted_found = !matches.is_empty();
                        shared.total_processes = processes.len();
                        shared.matches = matches;
                    }
                    prev_pids = Some(pids);
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
            .and_then(|state| serde_json::to_value(&*state).ok())
    }
}
