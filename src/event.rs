//! Event envelope and JSON encoder.
//!
//! Every sensor emits records with a common envelope (`module`, `eventType`,
//! `ts`, `count`, `source`) plus a per-sensor payload. Events are encoded as
//! minified JSON; within a sensor, `ts` and `count` are non-decreasing.

use chrono::Utc;
use serde_json::{Map, Value};

/// Per-sensor event encoder.
///
/// Owned by the sensor's worker; the monotonic counter and timestamp clamp
/// are never shared across threads.
#[derive(Debug)]
pub struct EventEncoder {
    module: String,
    count: u64,
    last_ts: i64,
}

impl EventEncoder {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            count: 0,
            last_ts: 0,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Number of events encoded so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Encode one event as minified JSON.
    ///
    /// Envelope keys win over payload keys of the same name. A backwards
    /// clock step is clamped so `ts` never decreases within a sensor.
    pub fn encode(&mut self, event_type: &str, payload: Value) -> String {
        let now = Utc::now().timestamp_millis();
        let ts = now.max(self.last_ts);
        self.last_ts = ts;
        self.count += 1;

        let mut map = Map::new();
        map.insert("module".to_string(), Value::String(self.module.clone()));
        map.insert(
            "eventType".to_string(),
            Value::String(event_type.to_string()),
        );
        map.insert("ts".to_string(), Value::from(ts));
        map.insert("count".to_string(), Value::from(self.count));
        map.insert("source".to_string(), Value::String("native".to_string()));

        if let Value::Object(fields) = payload {
            for (key, value) in fields {
                map.entry(key).or_insert(value);
            }
        }

        Value::Object(map).to_string()
    }

    /// Encode an error event with a `reason` field. Errors never cross the
    /// sink boundary as anything other than this.
    pub fn encode_error(&mut self, reason: &str) -> String {
        self.encode("error", serde_json::json!({ "reason": reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_keys() {
        let mut enc = EventEncoder::new("process-watch");
        let json = enc.encode("heartbeat", serde_json::json!({ "total": 3 }));
        let v: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(v["module"], "process-watch");
        assert_eq!(v["eventType"], "heartbeat");
        assert_eq!(v["source"], "native");
        assert_eq!(v["count"], 1);
        assert_eq!(v["total"], 3);
        assert!(v["ts"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_count_and_ts_monotonic() {
        let mut enc = EventEncoder::new("test");
        let mut last_ts = 0i64;
        for i in 1..=20u64 {
            let json = enc.encode("tick", Value::Object(Map::new()));
            let v: Value = serde_json::from_str(&json).unwrap();
            assert_eq!(v["count"].as_u64().unwrap(), i);
            let ts = v["ts"].as_i64().unwrap();
            assert!(ts >= last_ts);
            last_ts = ts;
        }
    }

    #[test]
    fn test_payload_cannot_override_envelope() {
        let mut enc = EventEncoder::new("test");
        let json = enc.encode(
            "tick",
            serde_json::json!({ "module": "spoofed", "count": 999, "extra": true }),
        );
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["module"], "test");
        assert_eq!(v["count"], 1);
        assert_eq!(v["extra"], true);
    }

    #[test]
    fn test_output_is_minified_and_escaped() {
        let mut enc = EventEncoder::new("test");
        let json = enc.encode("tick", serde_json::json!({ "text": "a\"b\\c\nd\u{0001}" }));
        assert!(!json.contains('\n'));
        assert!(json.contains(r#"a\"b\\c\nd"#));
        // Well-formed round trip
        let _: Value = serde_json::from_str(&json).unwrap();
    }

    #[test]
    fn test_error_event() {
        let mut enc = EventEncoder::new("test");
        let json = enc.encode_error("probe failed");
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["eventType"], "error");
        assert_eq!(v["reason"], "probe failed");
    }
}
