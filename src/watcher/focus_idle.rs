//! Focus / idle / minimize watcher.
//!
//! Tracks three booleans for the exam window: `is_idle`, `has_focus`,
//! `is_minimized`. Idle is driven by the OS seconds-since-last-input clock;
//! focus compares the foreground window against the configured exam window
//! handle or application title. Focus transitions are debounced to suppress
//! app-switch flicker. Without accessibility permission the watcher assumes
//! focused to avoid false positives.

use crate::config::FocusIdleOptions;
use crate::event::EventEncoder;
use crate::platform::types::ForegroundInfo;
use crate::platform::{self, InputStateSource};
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Heartbeat, Sensor, Worker};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const MODULE: &str = "focus-idle";

type SourceFactory = Arc<dyn Fn() -> Box<dyn InputStateSource> + Send + Sync>;

/// One observation fed into the tracker.
#[derive(Debug, Clone, Default)]
pub struct FocusIdleInputs {
    /// Seconds since last user input; None when the platform has no clock.
    pub idle_seconds: Option<u64>,
    /// Foreground state; None means unknown (assume focused).
    pub foreground: Option<ForegroundInfo>,
    /// Whether the exam window itself is minimized, when determinable.
    pub exam_minimized: Option<bool>,
}

/// State transition produced by one tracker step.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    IdleStart,
    IdleEnd { duration_sec: u64 },
    FocusLost { active_app: String },
    FocusGained,
    Minimized,
    Restored,
}

impl Transition {
    fn event_type(&self) -> &'static str {
        match self {
            Transition::IdleStart => "idle-start",
            Transition::IdleEnd { .. } => "idle-end",
            Transition::FocusLost { .. } => "focus-lost",
            Transition::FocusGained => "focus-gained",
            Transition::Minimized => "minimized",
            Transition::Restored => "restored",
        }
    }
}

/// Pure transition core. Owned by the worker; a snapshot copy of the three
/// booleans is shared with the handle.
pub struct FocusIdleTracker {
    options: FocusIdleOptions,
    is_idle: bool,
    idle_since: Option<Instant>,
    idle_at_start_sec: u64,
    has_focus: bool,
    is_minimized: bool,
    /// Candidate focus flip waiting out the debounce window.
    pending_focus: Option<(bool, Instant, String)>,
}

impl FocusIdleTracker {
    pub fn new(options: FocusIdleOptions) -> Self {
        Self {
            options,
            is_idle: false,
            idle_since: None,
            idle_at_start_sec: 0,
            has_focus: true,
            is_minimized: false,
            pending_focus: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    pub fn is_minimized(&self) -> bool {
        self.is_minimized
    }

    /// Whether the observed foreground state counts as exam-focused.
    fn observed_focus(&self, foreground: &Option<ForegroundInfo>) -> (bool, String) {
        let Some(fg) = foreground else {
            // Unknown foreground (e.g. no accessibility permission):
            // assume focused rather than produce false positives.
            return (true, String::new());
        };

        let focused = if let Some(handle) = self.options.window_handle {
            fg.window_handle == handle
        } else if !self.options.exam_app_title.is_empty() {
            let needle = self.options.exam_app_title.to_lowercase();
            fg.app_name.to_lowercase().contains(&needle)
                || fg.window_title.to_lowercase().contains(&needle)
        } else {
            true
        };

        (focused, fg.app_name.clone())
    }

    /// Advance the state machine with one observation.
    pub fn step(&mut self, inputs: &FocusIdleInputs, now: Instant) -> Vec<Transition> {
        let mut transitions = Vec::new();

        if self.options.enable_idle_detection {
            if let Some(idle_sec) = inputs.idle_seconds {
                let idle_now = idle_sec >= self.options.idle_threshold_sec;
                if idle_now && !self.is_idle {
                    self.is_idle = true;
                    self.idle_since = Some(now);
                    self.idle_at_start_sec = idle_sec;
                    transitions.push(Transition::IdleStart);
                } else if !idle_now && self.is_idle {
                    self.is_idle = false;
                    let elapsed = self
                        .idle_since
                        .take()
                        .map(|since| now.saturating_duration_since(since).as_secs())
                        .unwrap_or(0);
                    transitions.push(Transition::IdleEnd {
                        duration_sec: self.idle_at_start_sec + elapsed,
                    });
                }
            }
        }

        if self.options.enable_focus_detection {
            let (observed, active_app) = self.observed_focus(&inputs.foreground);
            if observed == self.has_focus {
                // Back to the settled state; cancel any pending flip.
                self.pending_focus = None;
            } else {
                let debounce = Duration::from_millis(self.options.focus_debounce_ms);
                match &self.pending_focus {
                    Some((target, since, _)) if *target == observed => {
                        if now.saturating_duration_since(*since) >= debounce {
                            self.has_focus = observed;
                            self.pending_focus = None;
                            if observed {
                                transitions.push(Transition::FocusGained);
                            } else {
                                transitions.push(Transition::FocusLost { active_app });
                            }
                        }
                    }
                    _ => {
                        self.pending_focus = Some((observed, now, active_app));
                    }
                }
            }
        }

        if self.options.enable_minimize_detection {
            if let Some(minimized) = inputs.exam_minimized {
                if minimized && !self.is_minimized {
                    self.is_minimized = true;
                    transitions.push(Transition::Minimized);
                } else if !minimized && self.is_minimized {
                    self.is_minimized = false;
                    transitions.push(Transition::Restored);
                }
            }
        }

        transitions
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
struct FocusIdleState {
    is_idle: bool,
    has_focus: bool,
    is_minimized: bool,
}

pub struct FocusIdleWatcher {
    options: FocusIdleOptions,
    worker: Worker,
    source_factory: SourceFactory,
    state: Arc<Mutex<FocusIdleState>>,
}

impl FocusIdleWatcher {
    pub fn new(options: FocusIdleOptions) -> Self {
        Self::with_source(options, Arc::new(platform::default_input_state_source))
    }

    pub fn with_source(options: FocusIdleOptions, source_factory: SourceFactory) -> Self {
        Self {
            options,
            worker: Worker::new(),
            source_factory,
            state: Arc::new(Mutex::new(FocusIdleState {
                has_focus: true,
                ..FocusIdleState::default()
            })),
        }
    }
}

impl Sensor for FocusIdleWatcher {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn start(&mut self, sink: SharedSink) -> bool {
        let options = self.options.clone();
        let factory = self.source_factory.clone();
        let state = self.state.clone();

        self.worker.start(MODULE, move |ctx| {
            let mut source = factory();
            let interval = Duration::from_millis(options.interval_ms);
            let mut encoder = EventEncoder::new(MODULE);
            // Heartbeats are gated on activity: any transition resets the gap.
            let mut heartbeat = Heartbeat::new(Duration::from_millis(options.heartbeat_interval_ms));
            let mut tracker = FocusIdleTracker::new(options.clone());
            let mut warned_no_foreground = false;

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    let foreground = source.foreground();
                    if foreground.is_none() && !warned_no_foreground && options.enable_focus_detection
                    {
                        warned_no_foreground = true;
                        tracing::warn!(
                            "foreground state unavailable, assuming exam window focused"
                        );
                    }

                    let inputs = FocusIdleInputs {
                        idle_seconds: source.idle_seconds(),
                        exam_minimized: foreground.as_ref().and_then(|fg| {
                            match options.window_handle {
                                Some(handle) if fg.window_handle == handle => {
                                    Some(fg.is_minimized)
                                }
                                _ => None,
                            }
                        }),
                        foreground,
                    };

                    let active_app = inputs
                        .foreground
                        .as_ref()
                        .map(|fg| fg.app_name.clone())
                        .unwrap_or_default();

                    for transition in tracker.step(&inputs, Instant::now()) {
                        let payload = match &transition {
                            Transition::IdleEnd { duration_sec } => serde_json::json!({
                                "idleDuration": duration_sec,
                                "threshold": options.idle_threshold_sec,
                            }),
                            Transition::FocusLost { active_app } => serde_json::json!({
                                "activeApp": active_app,
                            }),
                            Transition::IdleStart => serde_json::json!({
                                "threshold": options.idle_threshold_sec,
                            }),
                            _ => serde_json::json!({ "activeApp": active_app }),
                        };
                        sink.deliver(encoder.encode(transition.event_type(), payload));
                        heartbeat.reset();
                    }

                    if heartbeat.due() {
                        sink.deliver(encoder.encode(
                            "heartbeat",
                            serde_json::json!({
                                "isIdle": tracker.is_idle(),
                                "hasFocus": tracker.has_focus(),
                                "isMinimized": tracker.is_minimized(),
                            }),
                        ));
                    }

                    if let Ok(mut shared) = state.lock() {
                        shared.is_idle = tracker.is_idle();
                        shared.has_focus = tracker.has_focus();
                        shared.is_minimized = tracker.is_minimized();
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
            .and_then(|state| serde_json::to_value(*state).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(threshold: u64, debounce_ms: u64) -> FocusIdleOptions {
        FocusIdleOptions {
            idle_threshold_sec: threshold,
            focus_debounce_ms: debounce_ms,
            exam_app_title: "exam-browser".to_string(),
            ..FocusIdleOptions::default()
        }
    }

    fn fg(app: &str) -> Option<ForegroundInfo> {
        Some(ForegroundInfo {
            app_name: app.to_string(),
            window_title: app.to_string(),
            window_handle: 0,
            is_minimized: false,
        })
    }

    #[test]
    fn test_idle_start_and_end_with_duration() {
        let mut tracker = FocusIdleTracker::new(options(2, 200));
        let t0 = Instant::now();

        // Below threshold: nothing.
        assert!(tracker
            .step(
                &FocusIdleInputs {
                    idle_seconds: Some(1),
                    foreground: fg("exam-browser"),
                    exam_minimized: None,
                },
                t0,
            )
            .is_empty());

        // Threshold crossed at ~2 s idle.
        let transitions = tracker.step(
            &FocusIdleInputs {
                idle_seconds: Some(2),
                foreground: fg("exam-browser"),
                exam_minimized: None,
            },
            t0,
        );
        assert_eq!(transitions, vec![Transition::IdleStart]);
        assert!(tracker.is_idle());

        // Input one second later ends the idle period; duration counts from
        // the start of idleness, not from the threshold crossing.
        let transitions = tracker.step(
            &FocusIdleInputs {
                idle_seconds: Some(0),
                foreground: fg("exam-browser"),
                exam_minimized: None,
            },
            t0 + Duration::from_secs(1),
        );
        assert_eq!(transitions, vec![Transition::IdleEnd { duration_sec: 3 }]);
        assert!(!tracker.is_idle());
    }

    #[test]
    fn test_focus_debounce_suppresses_flicker() {
        let mut tracker = FocusIdleTracker::new(options(30, 200));
        let t0 = Instant::now();

        let inputs_away = FocusIdleInputs {
            idle_seconds: Some(0),
            foreground: fg("slack"),
            exam_minimized: None,
        };
        let inputs_exam = FocusIdleInputs {
            idle_seconds: Some(0),
            foreground: fg("exam-browser"),
            exam_minimized: None,
        };

        // A brief flick to another app that returns within the debounce
        // window emits nothing.
        assert!(tracker.step(&inputs_away, t0).is_empty());
        assert!(tracker
            .step(&inputs_exam, t0 + Duration::from_millis(100))
            .is_empty());
        assert!(tracker.has_focus());

        // A sustained switch emits focus-lost once the debounce elapses.
        assert!(tracker
            .step(&inputs_away, t0 + Duration::from_millis(300))
            .is_empty());
        let transitions = tracker.step(&inputs_away, t0 + Duration::from_millis(600));
        assert_eq!(
            transitions,
            vec![Transition::FocusLost {
                active_app: "slack".to_string()
            }]
        );
        assert!(!tracker.has_focus());

        // And focus-gained on the way back.
        assert!(tracker
            .step(&inputs_exam, t0 + Duration::from_millis(700))
            .is_empty());
        let transitions = tracker.step(&inputs_exam, t0 + Duration::from_millis(1000));
        assert_eq!(transitions, vec![Transition::FocusGained]);
    }

    #[test]
    fn test_unknown_foreground_assumes_focused() {
        let mut tracker = FocusIdleTracker::new(options(30, 200));
        let t0 = Instant::now();

        let inputs = FocusIdleInputs {
            idle_seconds: Some(0),
            foreground: None,
            exam_minimized: None,
        };
        assert!(tracker.step(&inputs, t0).is_empty());
        assert!(tracker
            .step(&inputs, t0 + Duration::from_secs(5))
            .is_empty());
        assert!(tracker.has_focus());
    }

    #[test]
    fn test_minimize_transitions() {
        let mut tracker = FocusIdleTracker::new(options(30, 200));
        let t0 = Instant::now();

        let minimized = FocusIdleInputs {
            idle_seconds: Some(0),
            foreground: fg("exam-browser"),
            exam_minimized: Some(true),
        };
        let restored = FocusIdleInputs {
            idle_seconds: Some(0),
            foreground: fg("exam-browser"),
            exam_minimized: Some(false),
        };

        assert_eq!(tracker.step(&minimized, t0), vec![Transition::Minimized]);
        // Unchanged state emits nothing.
        assert!(tracker
            .step(&minimized, t0 + Duration::from_millis(50))
            .is_empty());
        assert_eq!(
            tracker.step(&restored, t0 + Duration::from_millis(100)),
            vec![Transition::Restored]
        );
    }

    #[test]
    fn test_disabled_detections_stay_silent() {
        let mut opts = options(1, 0);
        opts.enable_idle_detection = false;
        opts.enable_focus_detection = false;
        let mut tracker = FocusIdleTracker::new(opts);

        let inputs = FocusIdleInputs {
            idle_seconds: Some(100),
            foreground: fg("slack"),
            exam_minimized: None,
        };
        let t0 = Instant::now();
        assert!(tracker.step(&inputs, t0).is_empty());
        assert!(tracker
            .step(&inputs, t0 + Duration::from_secs(1))
            .is_empty());
    }
}
