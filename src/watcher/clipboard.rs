//! Clipboard watcher.
//!
//! Observes clipboard changes through the platform source, fingerprints
//! each capture for deduplication, classifies sensitive content, and
//! applies the configured privacy mode before anything reaches the sink.

use crate::config::{ClipboardOptions, PrivacyMode};
use crate::event::EventEncoder;
use crate::platform::types::ClipboardCapture;
use crate::platform::{self, ClipboardSource};
use crate::sink::SharedSink;
use crate::watcher::{run_probe, Heartbeat, Sensor, Worker};
use regex::Regex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

pub const MODULE: &str = "clipboard";

/// Dedup entries older than this are purged on every probe.
const DEDUP_TTL: Duration = Duration::from_secs(300);

/// Minimum gap between any two emissions, regardless of fingerprint.
const MIN_EMIT_GAP: Duration = Duration::from_millis(100);

const PREVIEW_CAP_FULL: usize = 256;
const PREVIEW_CAP_REDACTED: usize = 64;

type SourceFactory = Arc<dyn Fn() -> Box<dyn ClipboardSource> + Send + Sync>;

fn sensitive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // Credit card numbers, with optional separators
            r"(?i)\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b",
            // US social security numbers
            r"\b\d{3}-\d{2}-\d{4}\b",
            // Email addresses
            r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
            // Credential keywords
            r"(?i)\b(password|passwd|pwd|secret|token|api[_-]?key|credential)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// Whether the content matches any sensitivity pattern.
pub fn is_sensitive(content: &str) -> bool {
    sensitive_patterns().iter().any(|re| re.is_match(content))
}

/// Short stable content hash (not cryptographic; used for fingerprints).
pub fn content_hash(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Fingerprint identifying one clipboard event for deduplication.
pub fn fingerprint(capture: &ClipboardCapture) -> String {
    let hash = capture
        .content
        .as_deref()
        .map(content_hash)
        .unwrap_or_else(|| "nocontent".to_string());
    format!("{hash}_{}_{}", capture.source_app, capture.source_pid)
}

fn truncate_chars(s: &str, cap: usize) -> String {
    s.chars().take(cap).collect()
}

/// Dedup + privacy pipeline. Owned by the worker; all state is private to
/// it.
pub struct ClipboardPipeline {
    privacy: PrivacyMode,
    min_event_interval: Duration,
    /// Fingerprint -> last emission time.
    dedup: HashMap<String, Instant>,
    last_emit: Option<Instant>,
    events_emitted: u64,
    events_deduped: u64,
}

impl ClipboardPipeline {
    pub fn new(options: &ClipboardOptions) -> Self {
        Self {
            privacy: PrivacyMode::from_code(options.privacy_mode),
            min_event_interval: Duration::from_millis(options.min_event_interval_ms),
            dedup: HashMap::new(),
            last_emit: None,
            events_emitted: 0,
            events_deduped: 0,
        }
    }

    pub fn set_privacy(&mut self, privacy: PrivacyMode) {
        self.privacy = privacy;
    }

    pub fn counters(&self) -> (u64, u64) {
        (self.events_emitted, self.events_deduped)
    }

    /// Process one capture. Returns the event payload, or None when the
    /// capture is rate-limited or a duplicate.
    pub fn process(&mut self, capture: &ClipboardCapture, now: Instant) -> Option<serde_json::Value> {
        self.dedup
            .retain(|_, last| now.saturating_duration_since(*last) < DEDUP_TTL);

        // Global rate limit: anything within 100 ms of the last emission.
        if let Some(last) = self.last_emit {
            if now.saturating_duration_since(last) < MIN_EMIT_GAP {
                self.events_deduped += 1;
                return None;
            }
        }

        let print = fingerprint(capture);
        if let Some(last) = self.dedup.get(&print) {
            if now.saturating_duration_since(*last) < self.min_event_interval {
                self.events_deduped += 1;
                return None;
            }
        }

        self.dedup.insert(print, now);
        self.last_emit = Some(now);
        self.events_emitted += 1;

        Some(self.build_payload(capture))
    }

    fn build_payload(&self, capture: &ClipboardCapture) -> serde_json::Value {
        let content = capture.content.as_deref().unwrap_or("");
        let sensitive = is_sensitive(content);

        let mut payload = serde_json::json!({
            "format": capture.format,
            "sourceApp": capture.source_app,
            "sourcePid": capture.source_pid,
            "contentLength": content.chars().count(),
            "isSensitive": sensitive,
            "contentHash": content_hash(content),
        });

        match self.privacy {
            PrivacyMode::MetadataOnly => {}
            PrivacyMode::Redacted => {
                let preview = if sensitive {
                    "[REDACTED]".to_string()
                } else {
                    truncate_chars(content, PREVIEW_CAP_REDACTED)
                };
                payload["contentPreview"] = serde_json::Value::String(preview);
            }
            PrivacyMode::Full => {
                payload["contentPreview"] =
                    serde_json::Value::String(truncate_chars(content, PREVIEW_CAP_FULL));
            }
        }

        payload
    }
}

pub struct ClipboardWatcher {
    options: ClipboardOptions,
    worker: Worker,
    source_factory: SourceFactory,
    counters: Arc<Mutex<(u64, u64)>>,
}

impl ClipboardWatcher {
    pub fn new(options: ClipboardOptions) -> Self {
        Self::with_source(options, Arc::new(platform::default_clipboard_source))
    }

    pub fn with_source(options: ClipboardOptions, source_factory: SourceFactory) -> Self {
        Self {
            options,
            worker: Worker::new(),
            source_factory,
            counters: Arc::new(Mutex::new((0, 0))),
        }
    }
}

impl Sensor for ClipboardWatcher {
    fn name(&self) -> &'static str {
        MODULE
    }

    fn start(&mut self, sink: SharedSink) -> bool {
        let options = self.options.clone();
        let factory = self.source_factory.clone();
        let counters = self.counters.clone();

        self.worker.start(MODULE, move |ctx| {
            let mut source = factory();
            let mut encoder = EventEncoder::new(MODULE);
            let interval = Duration::from_millis(options.interval_ms);
            let mut heartbeat = Heartbeat::new(Duration::from_millis(options.heartbeat_interval_ms));
            let mut pipeline = ClipboardPipeline::new(&options);

            while ctx.active() {
                run_probe(MODULE, &mut encoder, &sink, |encoder, sink| {
                    if let Some(capture) = source.poll() {
                        if let Some(payload) = pipeline.process(&capture, Instant::now()) {
                            sink.deliver(encoder.encode("clipboard-change", payload));
                        }
                    }

                    if heartbeat.due() {
                        let (emitted, deduped) = pipeline.counters();
                        sink.deliver(encoder.encode(
                            "heartbeat",
                            serde_json::json!({
                                "eventsEmitted": emitted,
                                "eventsDeduped": deduped,
                            }),
                        ));
                    }

                    if let Ok(mut shared) = counters.lock() {
                        *shared = pipeline.counters();
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
        self.counters.lock().ok().map(|counters| {
            let (emitted, deduped) = *counters;
            serde_json::json!({
                "eventsEmitted": emitted,
                "eventsDeduped": deduped,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(content: &str, app: &str, pid: u32) -> ClipboardCapture {
        ClipboardCapture {
            content: Some(content.to_string()),
            format: "text".to_string(),
            source_app: app.to_string(),
            source_pid: pid,
            sequence: 0,
        }
    }

    fn pipeline(privacy: u8) -> ClipboardPipeline {
        ClipboardPipeline::new(&ClipboardOptions {
            privacy_mode: privacy,
            ..ClipboardOptions::default()
        })
    }

    #[test]
    fn test_sensitivity_patterns() {
        assert!(is_sensitive("card 4111-1111-1111-1111"));
        assert!(is_sensitive("4111 1111 1111 1111"));
        assert!(is_sensitive("ssn 078-05-1120"));
        assert!(is_sensitive("mail me at alice@example.com"));
        assert!(is_sensitive("my PASSWORD is hunter2"));
        assert!(is_sensitive("export API_KEY=abc"));
        assert!(!is_sensitive("the quick brown fox"));
    }

    #[test]
    fn test_identical_content_within_interval_yields_one_event() {
        let mut p = pipeline(2);
        let t0 = Instant::now();
        let c = capture("hello", "notepad", 7);

        assert!(p.process(&c, t0).is_some());
        // Same fingerprint 200 ms later: dropped.
        assert!(p.process(&c, t0 + Duration::from_millis(200)).is_none());
        // After the 500 ms window it may emit again.
        assert!(p.process(&c, t0 + Duration::from_millis(600)).is_some());
        assert_eq!(p.counters(), (2, 1));
    }

    #[test]
    fn test_global_100ms_gap() {
        let mut p = pipeline(2);
        let t0 = Instant::now();

        assert!(p.process(&capture("a", "x", 1), t0).is_some());
        // Different content, but within 100 ms of the previous emission.
        assert!(p
            .process(&capture("b", "x", 1), t0 + Duration::from_millis(50))
            .is_none());
        assert!(p
            .process(&capture("b", "x", 1), t0 + Duration::from_millis(150))
            .is_some());
    }

    #[test]
    fn test_fingerprint_includes_source() {
        let a = fingerprint(&capture("same", "appA", 1));
        let b = fingerprint(&capture("same", "appB", 1));
        let c = fingerprint(&capture("same", "appA", 2));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_full_mode_carries_literal_content() {
        let mut p = pipeline(2);
        let payload = p
            .process(
                &capture("secret password 4111-1111-1111-1111", "browser", 3),
                Instant::now(),
            )
            .unwrap();

        assert_eq!(payload["isSensitive"], true);
        assert!(payload["contentPreview"]
            .as_str()
            .unwrap()
            .contains("4111-1111-1111-1111"));
        assert!(!payload["contentHash"].as_str().unwrap().is_empty());
    }

    #[test]
    fn test_redacted_mode_hides_sensitive_content() {
        let mut p = pipeline(1);
        let payload = p
            .process(
                &capture("secret password 4111-1111-1111-1111", "browser", 3),
                Instant::now(),
            )
            .unwrap();
        assert_eq!(payload["contentPreview"], "[REDACTED]");

        // Non-sensitive content keeps a short preview.
        let payload = p
            .process(
                &capture("meeting at noon", "browser", 3),
                Instant::now() + Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(payload["contentPreview"], "meeting at noon");
    }

    #[test]
    fn test_metadata_only_mode_has_no_preview() {
        let mut p = pipeline(0);
        let payload = p
            .process(&capture("anything", "app", 1), Instant::now())
            .unwrap();
        assert!(payload.get("contentPreview").is_none());
        assert_eq!(payload["contentLength"], 8);
    }

    #[test]
    fn test_dedup_cache_eviction() {
        let mut p = pipeline(2);
        let t0 = Instant::now();

        p.process(&capture("old", "app", 1), t0);
        assert_eq!(p.dedup.len(), 1);

        // Six minutes later the old entry is gone after the next probe.
        p.process(&capture("new", "app", 1), t0 + Duration::from_secs(360));
        assert_eq!(p.dedup.len(), 1);
        assert!(p.dedup.keys().all(|k| k.starts_with(&content_hash("new"))));
    }

    #[test]
    fn test_preview_caps() {
        let long = "x".repeat(1000);
        let mut p = pipeline(2);
        let payload = p.process(&capture(&long, "app", 1), Instant::now()).unwrap();
        assert_eq!(payload["contentPreview"].as_str().unwrap().len(), 256);

        let mut p = pipeline(1);
        let payload = p.process(&capture(&long, "app", 1), Instant::now()).unwrap();
        assert_eq!(payload["contentPreview"].as_str().unwrap().len(), 64);
    }
}
