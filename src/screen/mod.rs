//! Screen watcher: recording tools, suspicious overlays and sharing
//! sessions.
//!
//! Every probe fuses the process table and window enumeration into one
//! [`RecordingResult`]. State changes are edge-triggered: a probe emits at
//! most one transition event, recording changes taking priority over
//! overlay changes, with a heartbeat when nothing moved for 10 s.

pub mod overlay;
pub mod recording;
pub mod sharing;

use crate::config::ScreenWatchOptions;
use crate::event::EventEncoder;
use crate::platform::types::{DisplayRecord, ProcessRecord};
use crate::platform::{self, ProcessSource, ScreenSource};
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Heartbeat, Sensor, Worker};
use overlay::OverlayWindow;
use serde::{Deserialize, Serialize};
use sharing::ScreenSharingSession;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODULE: &str = "screen-watch";

type ProcessFactory = Arc<dyn Fn() -> Box<dyn ProcessSource> + Send + Sync>;
type ScreenFactory = Arc<dyn Fn() -> Box<dyn ScreenSource> + Send + Sync>;

/// One probe's fused view of capture activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingResult {
    pub is_recording: bool,
    /// The event this result was attached to (`recording-detected`,
    /// `heartbeat`, ...).
    pub event_type: String,
    pub recording_sources: Vec<ProcessRecord>,
    pub virtual_cameras: Vec<String>,
    pub overlay_windows: Vec<OverlayWindow>,
    pub recording_confidence: f64,
    pub overlay_confidence: f64,
}

/// Edge detector over the recording and overlay booleans. Reports at most
/// one transition per step; a recording transition masks a simultaneous
/// overlay transition, which is then reported on the next step.
#[derive(Debug, Default)]
pub struct EdgeState {
    recording: bool,
    overlay: bool,
    primed: bool,
}

impl EdgeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation; returns the event type of the transition, if
    /// any. The first observation only arms the state.
    pub fn step(&mut self, is_recording: bool, overlay_present: bool) -> Option<&'static str> {
        if !self.primed {
            self.primed = true;
            self.recording = is_recording;
            self.overlay = overlay_present;
            // Conditions already present at startup are still reported.
            if is_recording {
                return Some("recording-detected");
            }
            if overlay_present {
                return Some("overlay-detected");
            }
            return None;
        }

        if is_recording != self.recording {
            self.recording = is_recording;
            return Some(if is_recording {
                "recording-detected"
            } else {
                "recording-stopped"
            });
        }
        if overlay_present != self.overlay {
            self.overlay = overlay_present;
            return Some(if overlay_present {
                "overlay-detected"
            } else {
                "overlay-cleared"
            });
        }
        None
    }
}

/// Evaluate one probe: find recording sources, score overlays and classify
/// sharing sessions. Pure over its inputs.
pub fn evaluate_probe(
    options: &ScreenWatchOptions,
    processes: &[ProcessRecord],
    screen: &mut dyn ScreenSource,
) -> (RecordingResult, Vec<DisplayRecord>, Vec<ScreenSharingSession>) {
    let sources = recording::find_recording_sources(processes, &options.recording_blacklist);
    let virtual_cameras = screen.virtual_cameras();
    let recording_confidence = recording::recording_confidence(&sources, &virtual_cameras);

    let windows = screen.overlay_candidates();
    let screens = screen.screens();
    let overlays = overlay::collect_overlays(&windows, &screens);
    let overlay_confidence = overlay::aggregate_confidence(&overlays);

    let is_recording = recording_confidence >= options.recording_threshold
        || !sources.is_empty()
        || !virtual_cameras.is_empty();

    let displays = screen.displays();
    let mut sessions = sharing::classify_sessions(processes, screen.duplication_active());
    if let Some(mirroring) = sharing::mirroring_session(&displays) {
        sessions.push(mirroring);
    }

    let result = RecordingResult {
        is_recording,
        event_type: String::new(),
        recording_sources: sources,
        virtual_cameras,
        overlay_windows: overlays,
        recording_confidence,
        overlay_confidence,
    };
    (result, displays, sessions)
}

pub struct ScreenWatcher {
    options: ScreenWatchOptions,
    worker: Worker,
    process_factory: ProcessFactory,
    screen_factory: ScreenFactory,
    state: Arc<Mutex<Option<serde_json::Value>>>,
}

impl ScreenWatcher {
    pub fn new(options: ScreenWatchOptions) -> Self {
        Self::with_sources(
            options,
            Arc::new(platform::default_process_source),
            Arc::new(platform::default_screen_source),
        )
    }

    pub fn with_sources(
        options: ScreenWatchOptions,
        process_factory: ProcessFactory,
        screen_factory: ScreenFactory,
    ) -> Self {
        Self {
            options,
            worker: Worker::new(),
            process_factory,
            screen_factory,
            state: Arc::new(Mutex::new(None)),
        }
    }
}

impl Sensor for ScreenWatcher {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn start(&mut self, sink: SharedSink) -> bool {
        let options = self.options.clone();
        let process_factory = self.process_factory.clone();
        let screen_factory = self.screen_factory.clone();
        let state = self.state.clone();

        self.worker.start(MODULE, move |ctx| {
            let mut process_source = process_factory();
            let mut screen_source = screen_factory();
            let mut encoder = EventEncoder::new(MODULE);
            let interval = Duration::from_millis(options.interval_ms);
            let mut heartbeat = Heartbeat::new(Duration::from_millis(options.heartbeat_interval_ms));
            let mut edges = EdgeState::new();

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    let processes = process_source.processes();
                    let (mut result, displays, sessions) =
                        evaluate_probe(&options, &processes, screen_source.as_mut());

                    let transition =
                        edges.step(result.is_recording, !result.overlay_windows.is_empty());

                    let event_type = match transition {
                        Some(event_type) => {
                            heartbeat.reset();
                            Some(event_type)
                        }
                        None if heartbeat.due() => Some("heartbeat"),
                        None => None,
                    };

                    if let Some(event_type) = event_type {
                        result.event_type = event_type.to_string();
                        let mut payload = serde_json::to_value(&result)
                            .map_err(|e| e.to_string())?;
                        if let Some(map) = payload.as_object_mut() {
                            map.insert(
                                "displays".to_string(),
                                serde_json::to_value(&displays).map_err(|e| e.to_string())?,
                            );
                            map.insert(
                                "sharingSessions".to_string(),
                                serde_json::to_value(&sessions).map_err(|e| e.to_string())?,
                            );
                        }
                        sink.deliver(encoder.encode(event_type, payload.clone()));
                        if let Ok(mut shared) = state.lock() {
                            *shared = Some(payload);
                        }
                    } else if let Ok(mut shared) = state.lock() {
                        result.event_type = "probe".to_string();
                        *shared = serde_json::to_value(&result).ok();
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
        self.state.lock().ok().and_then(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::types::{ScreenBounds, WindowRecord};
    use crate::sink::MemorySink;

    #[test]
    fn test_edge_state_transitions() {
        let mut edges = EdgeState::new();
        assert_eq!(edges.step(false, false), None);
        assert_eq!(edges.step(true, false), Some("recording-detected"));
        assert_eq!(edges.step(true, false), None);
        assert_eq!(edges.step(false, false), Some("recording-stopped"));
        assert_eq!(edges.step(false, true), Some("overlay-detected"));
        assert_eq!(edges.step(false, false), Some("overlay-cleared"));
    }

    #[test]
    fn test_edge_state_recording_masks_overlay() {
        // Both flip at once: recording wins, overlay follows next step.
        let mut edges = EdgeState::new();
        assert_eq!(edges.step(false, false), None);
        assert_eq!(edges.step(true, true), Some("recording-detected"));
        assert_eq!(edges.step(true, true), Some("overlay-detected"));
        assert_eq!(edges.step(true, true), None);
    }

    #[test]
    fn test_edge_state_reports_initial_condition() {
        let mut edges = EdgeState::new();
        assert_eq!(edges.step(true, false), Some("recording-detected"));

        let mut edges = EdgeState::new();
        assert_eq!(edges.step(false, true), Some("overlay-detected"));
    }

    struct ScriptedScreen {
        windows: Vec<WindowRecord>,
        cameras: Vec<String>,
    }

    impl ScreenSource for ScriptedScreen {
        fn overlay_candidates(&mut self) -> Vec<WindowRecord> {
            self.windows.clone()
        }

        fn screens(&mut self) -> Vec<ScreenBounds> {
            vec![ScreenBounds {
                x: 0,
                y: 0,
                width: 1920,
                height: 1080,
            }]
        }

        fn displays(&mut self) -> Vec<DisplayRecord> {
            Vec::new()
        }

        fn virtual_cameras(&mut self) -> Vec<String> {
            self.cameras.clone()
        }
    }

    fn obs_process() -> ProcessRecord {
        ProcessRecord::new(42, "obs64.exe", "/usr/bin/obs64.exe")
    }

    #[test]
    fn test_evaluate_probe_blacklisted_process_is_recording() {
        let options = ScreenWatchOptions::default();
        let mut screen = ScriptedScreen {
            windows: Vec::new(),
            cameras: Vec::new(),
        };
        let (result, _, _) = evaluate_probe(&options, &[obs_process()], &mut screen);
        assert!(result.is_recording);
        assert_eq!(result.recording_sources.len(), 1);
        assert!(result.recording_confidence >= 0.6);
    }

    #[test]
    fn test_evaluate_probe_virtual_camera_alone_is_recording() {
        // Sources below the confidence threshold still flag when present.
        let options = ScreenWatchOptions::default();
        let mut screen = ScriptedScreen {
            windows: Vec::new(),
            cameras: vec!["OBS Virtual Camera".to_string()],
        };
        let (result, _, _) = evaluate_probe(&options, &[], &mut screen);
        assert!(result.is_recording);
        assert!(result.recording_confidence < options.recording_threshold);
    }

    #[test]
    fn test_evaluate_probe_clean_system() {
        let options = ScreenWatchOptions::default();
        let mut screen = ScriptedScreen {
            windows: Vec::new(),
            cameras: Vec::new(),
        };
        let clean = vec![ProcessRecord::new(1, "editor.exe", "")];
        let (result, _, sessions) = evaluate_probe(&options, &clean, &mut screen);
        assert!(!result.is_recording);
        assert!(result.overlay_windows.is_empty());
        assert!(sessions.is_empty());
    }

    struct ScriptedProcesses {
        snapshots: Arc<Mutex<Vec<Vec<ProcessRecord>>>>,
    }

    impl ProcessSource for ScriptedProcesses {
        fn processes(&mut self) -> Vec<ProcessRecord> {
            let mut snapshots = self.snapshots.lock().unwrap();
            if snapshots.len() > 1 {
                snapshots.remove(0)
            } else {
                snapshots.first().cloned().unwrap_or_default()
            }
        }
    }

    #[test]
    fn test_recording_start_stop_edges() {
        let snapshots = Arc::new(Mutex::new(vec![
            vec![],
            vec![obs_process()],
            vec![obs_process()],
            vec![],
            vec![],
        ]));
        let snapshots_factory = snapshots.clone();

        let options = ScreenWatchOptions {
            interval_ms: 20,
            heartbeat_interval_ms: 60_000,
            ..ScreenWatchOptions::default()
        };
        let mut watcher = ScreenWatcher::with_sources(
            options,
            Arc::new(move || {
                Box::new(ScriptedProcesses {
                    snapshots: snapshots_factory.clone(),
                }) as Box<dyn ProcessSource>
            }),
            Arc::new(|| {
                Box::new(ScriptedScreen {
                    windows: Vec::new(),
                    cameras: Vec::new(),
                }) as Box<dyn ScreenSource>
            }),
        );

        let sink = MemorySink::new();
        assert!(watcher.start(sink.clone()));
        std::thread::sleep(Duration::from_millis(250));
        watcher.stop();

        let events: Vec<serde_json::Value> = sink
            .take()
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .collect();

        let detected: Vec<_> = events
            .iter()
            .filter(|e| e["eventType"] == "recording-detected")
            .collect();
        let stopped: Vec<_> = events
            .iter()
            .filter(|e| e["eventType"] == "recording-stopped")
            .collect();

        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0]["isRecording"], true);
        assert_eq!(
            detected[0]["recordingSources"][0]["name"],
            "obs64.exe"
        );
        assert_eq!(stopped.len(), 1);
        assert_eq!(stopped[0]["isRecording"], false);
    }

    #[test]
    fn test_overlay_edge_and_snapshot() {
        let topmost_overlay = WindowRecord {
            handle: "0x2".to_string(),
            pid: 9,
            process_name: "widget.exe".to_string(),
            x: 1840,
            y: 0,
            width: 80,
            height: 80,
            layered: true,
            topmost: true,
            alpha: Some(128),
            ..WindowRecord::default()
        };

        let options = ScreenWatchOptions {
            interval_ms: 20,
            heartbeat_interval_ms: 60_000,
            ..ScreenWatchOptions::default()
        };
        let mut watcher = ScreenWatcher::with_sources(
            options,
            Arc::new(|| {
                Box::new(ScriptedProcesses {
                    snapshots: Arc::new(Mutex::new(vec![vec![]])),
                }) as Box<dyn ProcessSource>
            }),
            Arc::new(move || {
                Box::new(ScriptedScreen {
                    windows: vec![topmost_overlay.clone()],
                    cameras: Vec::new(),
                }) as Box<dyn ScreenSource>
            }),
        );

        let sink = MemorySink::new();
        watcher.start(sink.clone());
        std::thread::sleep(Duration::from_millis(150));
        let snapshot = watcher.snapshot();
        watcher.stop();

        let events: Vec<serde_json::Value> = sink
            .take()
            .iter()
            .map(|e| serde_json::from_str(e).unwrap())
            .collect();

        let detected: Vec<_> = events
            .iter()
            .filter(|e| e["eventType"] == "overlay-detected")
            .collect();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0]["overlayWindows"][0]["processName"], "widget.exe");
        assert!(detected[0]["overlayConfidence"].as_f64().unwrap() > 0.0);

        let snapshot = snapshot.expect("snapshot after first probe");
        assert_eq!(snapshot["isRecording"], false);
    }
}
